//! Prompt assembly.

use std::collections::HashMap;

use tierflow_ai::LongTermHit;
use tierflow_ai::agent::INPUT_PLACEHOLDER;

/// Longest value shown per entry in a `Context:` snippet.
const CONTEXT_VALUE_LIMIT: usize = 2000;

/// Substitute `{{key}}` placeholders in one pass.
///
/// Inserted values are never rescanned, so an input containing `{{input}}`
/// stays literal. Unknown placeholders are kept unchanged.
pub fn render_single_pass(template: &str, values: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let Some(close) = rest[open..].find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        let placeholder = &rest[open..open + close + 2];
        out.push_str(values.get(placeholder).copied().unwrap_or(placeholder));
        rest = &rest[open + close + 2..];
    }
    out.push_str(rest);
    out
}

/// Agent prompt for `input`. Templates without `{{input}}` get the input
/// appended after a blank line.
pub fn render_prompt(template: &str, input: &str) -> String {
    if template.contains(INPUT_PLACEHOLDER) {
        let values = HashMap::from([(INPUT_PLACEHOLDER, input)]);
        return render_single_pass(template, &values);
    }
    match (template.trim().is_empty(), input.is_empty()) {
        (true, _) => input.to_string(),
        (false, true) => template.to_string(),
        (false, false) => format!("{template}\n\n{input}"),
    }
}

/// `Context:` block listing resolved keys and related long-tier texts.
/// `None` when there is nothing to show.
pub fn context_snippet(entries: &[(String, String)], related: &[LongTermHit]) -> Option<String> {
    if entries.is_empty() && related.is_empty() {
        return None;
    }

    let mut snippet = String::from("Context:");
    for (key, value) in entries {
        snippet.push_str(&format!("\n- {key}: {}", clip(value)));
    }
    for hit in related {
        snippet.push_str(&format!("\n- related ({}): {}", hit.key, clip(&hit.text)));
    }
    Some(snippet)
}

fn clip(value: &str) -> String {
    match value.char_indices().nth(CONTEXT_VALUE_LIMIT) {
        Some((end, _)) => format!("{}...", &value[..end]),
        None => value.to_string(),
    }
}
