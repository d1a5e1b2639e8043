use regex::Regex;
use std::sync::LazyLock;

use crate::schema::EntityType;

static LEADING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```(?:json)?").expect("valid fence regex"));
static TRAILING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```$").expect("valid fence regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Remove a leading ```` ```json ```` / ```` ``` ```` marker and a trailing
/// ```` ``` ```` from an LLM response.
pub fn strip_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_leading = LEADING_FENCE.replace(trimmed, "");
    let without_trailing = TRAILING_FENCE.replace(without_leading.as_ref(), "");
    without_trailing.trim().to_string()
}

/// Graph id of an entity: `"{TYPE}:{trimmed name}"`.
pub fn entity_id(entity_type: EntityType, name: &str) -> String {
    format!("{}:{}", entity_type.as_str(), name.trim())
}

/// Upper-case relation label with spaces collapsed into underscores.
pub fn relation_type(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "RELATED_TO".to_string();
    }
    WHITESPACE.replace_all(trimmed, "_").to_uppercase()
}

/// Exact name equality ignoring case and surrounding whitespace.
pub fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}
