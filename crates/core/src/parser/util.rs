//! Shared JSON field-extraction helpers used across the parser submodules.

use serde_json::Value;

/// First key present in `value` whose value is a JSON string.
pub(crate) fn first_string<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| value.get(*key).and_then(Value::as_str))
}

/// Lowercase, `snake_case` form of a tool or parameter name.
///
/// Splits camelCase boundaries, maps spaces/hyphens/dots/slashes to `_`,
/// strips any other non-alphanumeric character, then collapses runs of `_`
/// and trims the edges.
pub(crate) fn canonicalize_name(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower_or_digit = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            let next_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());

            if prev_lower_or_digit || (prev_upper && next_lower) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if matches!(c, ' ' | '-' | '.' | '/') {
            out.push('_');
        }
    }

    out.split('_').filter(|segment| !segment.is_empty()).collect::<Vec<_>>().join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_camel_case_and_acronym_runs() {
        assert_eq!(canonicalize_name("getHTTPResponse"), "get_http_response");
        assert_eq!(canonicalize_name("toolName"), "tool_name");
    }

    #[test]
    fn maps_separators_to_underscore_and_strips_the_rest() {
        assert_eq!(canonicalize_name("search-web.v2"), "search_web_v2");
        assert_eq!(canonicalize_name("weird!!name??"), "weirdname");
    }

    #[test]
    fn collapses_runs_and_trims_edges() {
        assert_eq!(canonicalize_name("__Search  Web__"), "search_web");
    }
}
