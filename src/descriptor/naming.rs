//! Wire-name resolution.
use once_cell::sync::Lazy;
use regex::Regex;

static ACRONYM_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").expect("valid regex"));
static LOWER_UPPER_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid regex"));
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\s.]+").expect("valid regex"));

/// Canonical lower snake case: `userName` → `user_name`, `HTTPServer` →
/// `http_server`, `max-retries` → `max_retries`.
pub fn to_snake_case(name: &str) -> String {
    let s = ACRONYM_BOUNDARY.replace_all(name, "${1}_${2}");
    let s = LOWER_UPPER_BOUNDARY.replace_all(&s, "${1}_${2}");
    let s = SEPARATORS.replace_all(&s, "_");
    let mut out = s.to_lowercase();
    while out.contains("__") {
        out = out.replace("__", "_");
    }
    out.trim_matches('_').to_string()
}

/// First non-empty name by precedence, mapping > flag > serde > identifier.
pub(crate) fn wire_name(
    mapping: Option<&str>,
    flag: Option<&str>,
    serde: Option<&str>,
    ident: &str,
) -> String {
    let chosen = [mapping, flag, serde]
        .into_iter()
        .flatten()
        .find(|n| !n.is_empty())
        .unwrap_or(ident);
    to_snake_case(chosen)
}
