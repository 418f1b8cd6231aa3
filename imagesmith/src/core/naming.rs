//! Endpoint name sanitization.

/// Characters stripped from both ends of a generated endpoint name.
const EDGE_CHARS: &[char] = &['"', '\'', '`', '/', '\\', '(', ')'];

/// Strip quoting, slash, backslash and parenthesis characters (and
/// whitespace) from both ends of `raw`.
///
/// Returns `None` when nothing is left. Idempotent: sanitizing an already
/// sanitized name returns it unchanged.
pub fn sanitize_endpoint_name(raw: &str) -> Option<String> {
    let name = raw.trim_matches(|c: char| c.is_whitespace() || EDGE_CHARS.contains(&c));
    if name.is_empty() {
        return None;
    }
    Some(name.to_string())
}
