//! Heuristic store classifier and long-tier promotion rule.
//!
//! Rules run in a fixed priority order. Code fences are checked before the
//! error-only rule so a code block mentioning "error" is still kept.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default length above which an `auto` output is promoted to the long tier.
pub const DEFAULT_PROMOTION_MIN_CHARS: usize = 800;

const ACKNOWLEDGEMENTS: &[&str] = &[
    "ok",
    "okay",
    "k",
    "thanks",
    "thank you",
    "thanks a lot",
    "thx",
    "ty",
    "done",
    "got it",
    "sure",
    "yes",
    "no",
    "yep",
    "nope",
    "great",
    "cool",
    "nice",
    "perfect",
    "noted",
    "will do",
    "sounds good",
    "alright",
];

static CODE_FENCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[^\n`]*\n(.*?)```|~~~[^\n~]*\n(.*?)~~~").expect("Invalid code fence regex")
});

static CODE_TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:fn|def|impl|struct|enum|elif|lambda|async|await|const|var|let|return|import|class|printf)\b|\bprintln!|console\.log|\bself\.|\bthis\.|#include|=>|->|::|\(\)|==|!=|&&|\|\|",
    )
    .expect("Invalid code token regex")
});

static DESIGN_KEYWORD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:design|architecture|architectural|security|secure|vulnerabilit(?:y|ies)|threat model|authentication|authorization|encryption|schema|trade-?offs?|scalability|invariants?|protocol|data model|interface contract)\b",
    )
    .expect("Invalid design keyword regex")
});

static ERROR_MARKER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:error|exception|traceback|failed|failure|panic(?:ked)?|fatal|stack trace)\b")
        .expect("Invalid error marker regex")
});

static RESOLUTION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:fix|fixed|fixes|resolve|resolved|resolution|solution|solved|workaround|because|caused by|instead|should|try)\b",
    )
    .expect("Invalid resolution regex")
});

/// Outcome of classification. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreDecision {
    Auto,
    Discard,
    Ask,
}

impl std::fmt::Display for StoreDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Discard => "discard",
            Self::Ask => "ask",
        })
    }
}

/// Classify `text`. Deterministic for identical input.
pub fn classify(text: &str) -> StoreDecision {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return StoreDecision::Discard;
    }
    if is_acknowledgement(trimmed) {
        return StoreDecision::Discard;
    }
    if has_code_fence(trimmed) {
        return StoreDecision::Auto;
    }
    if distinct_code_tokens(trimmed) >= 2 {
        return StoreDecision::Auto;
    }
    if has_design_keyword(trimmed) {
        return StoreDecision::Auto;
    }
    if is_error_only(trimmed) {
        return StoreDecision::Discard;
    }
    StoreDecision::Ask
}

/// Long-tier promotion rule for texts already stored in the mid tier.
pub fn should_promote(text: &str, min_chars: usize) -> bool {
    text.chars().count() > min_chars || has_code_fence(text) || has_design_keyword(text)
}

pub fn has_code_fence(text: &str) -> bool {
    CODE_FENCE_REGEX.is_match(text)
}

/// Body of the first fenced code block, without the fence lines.
pub fn extract_code_block(text: &str) -> Option<&str> {
    let caps = CODE_FENCE_REGEX.captures(text)?;
    caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str())
}

pub fn has_design_keyword(text: &str) -> bool {
    DESIGN_KEYWORD_REGEX.is_match(text)
}

fn is_acknowledgement(trimmed: &str) -> bool {
    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    if tokens.len() > 3 {
        return false;
    }
    let phrase = tokens
        .join(" ")
        .trim_end_matches(['.', '!', '?'])
        .to_lowercase();
    ACKNOWLEDGEMENTS.contains(&phrase.as_str())
}

fn distinct_code_tokens(text: &str) -> usize {
    CODE_TOKEN_REGEX
        .find_iter(text)
        .map(|m| m.as_str())
        .collect::<HashSet<_>>()
        .len()
}

fn is_error_only(text: &str) -> bool {
    ERROR_MARKER_REGEX.is_match(text) && !RESOLUTION_REGEX.is_match(text)
}
