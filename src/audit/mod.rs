pub mod fix;
pub mod rules;
pub mod validate;

/// Comparison key for choice texts: whitespace runs collapsed, ends trimmed.
pub fn choice_key(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
