//! Cleanup of generated recipe text.
//!
//! Generators like to wrap answers in markdown fences or prefix them with a
//! language tag. The runtime needs the bare build script.

use std::sync::LazyLock;

use regex::Regex;

static FENCED_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```").expect("valid fence regex")
});

/// Extract the build script from a generator response.
///
/// - If the response contains a fenced code block, its body is used.
/// - A leading bare `Dockerfile` tag line is dropped.
/// - Stray backticks at either end are removed.
///
/// The result is trimmed and ends with a single newline (or is empty).
pub fn clean_recipe_text(response: &str) -> String {
    let body = match FENCED_BLOCK_RE.captures(response) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => response,
    };
    let body = body.trim().trim_matches('`').trim();

    let body = match body.split_once('\n') {
        Some((first, rest)) if first.trim().eq_ignore_ascii_case("dockerfile") => rest.trim(),
        _ if body.eq_ignore_ascii_case("dockerfile") => "",
        _ => body,
    };

    if body.is_empty() {
        return String::new();
    }
    format!("{body}\n")
}
