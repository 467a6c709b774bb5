pub mod json;
pub mod table;

pub use crate::cli::OutputFormat;

/// First `max_chars` characters of `input` on one line.
pub fn preview_text(input: &str, max_chars: usize) -> String {
    let flat = input.replace(['\n', '\r'], " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut preview: String = flat.chars().take(max_chars).collect();
    preview.push('…');
    preview
}
