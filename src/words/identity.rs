use std::sync::LazyLock;

use regex::Regex;

static STRIP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s\-]").unwrap());
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Lowercase, drop everything but word chars / whitespace / hyphens,
/// collapse whitespace runs. Idempotent.
pub fn normalize(word: &str) -> String {
    let lowered = word.to_lowercase();
    let stripped = STRIP_RE.replace_all(lowered.trim(), "");
    SPACE_RE.replace_all(stripped.trim(), " ").into_owned()
}

/// Stable 32-hex-char key over `"{normalized word}_{lowercased category}"`.
/// Different categories are different terms.
pub fn identity(word: &str, category: &str) -> String {
    let key = format!("{}_{}", normalize(word), category.to_lowercase());
    format!("{:x}", md5::compute(key.as_bytes()))
}
