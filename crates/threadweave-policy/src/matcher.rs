//! Glob and regex matching for tool names and arguments.

use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("(?s)^");
    for ch in pattern.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    out
}

/// Full-string glob match: `*` is any run of characters, `?` exactly one,
/// everything else literal.
pub fn match_glob(value: &str, pattern: &str) -> bool {
    Regex::new(&glob_to_regex(pattern))
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

/// `Some(body)` when `pattern` has the `/regex/` form.
pub fn regex_body(pattern: &str) -> Option<&str> {
    if pattern.len() >= 2 && pattern.starts_with('/') && pattern.ends_with('/') {
        Some(&pattern[1..pattern.len() - 1])
    } else {
        None
    }
}

/// String form of an argument used for pattern tests.
pub fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(coerce_to_string)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

fn match_pattern(value: &str, pattern: &str) -> bool {
    match regex_body(pattern) {
        // Unanchored, like a search
        Some(body) => match Regex::new(body) {
            Ok(re) => re.is_match(value),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Invalid argument regex, treating as no match");
                false
            }
        },
        None => match_glob(value, pattern),
    }
}

/// Every named pattern must have a present argument that matches it.
pub fn match_args(args: &Value, patterns: &BTreeMap<String, String>) -> bool {
    patterns.iter().all(|(key, pattern)| {
        args.get(key)
            .is_some_and(|value| match_pattern(&coerce_to_string(value), pattern))
    })
}

/// Fewer `*` wildcards wins; on a tie the longer pattern wins.
///
/// Rule evaluation is strictly first-match-wins and does not consult this.
pub fn is_more_specific(a: &str, b: &str) -> bool {
    let wildcards = |p: &str| p.matches('*').count();
    let (wa, wb) = (wildcards(a), wildcards(b));
    if wa != wb {
        return wa < wb;
    }
    a.len() > b.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patterns(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_glob_wildcards() {
        assert!(match_glob("File.read", "File.*"));
        assert!(match_glob("File.read", "File.read"));
        assert!(!match_glob("FileXread", "File.read"));
        assert!(match_glob("ab", "a?"));
        assert!(!match_glob("abc", "a?"));
        assert!(match_glob("", "*"));
        assert!(!match_glob("xFile.read", "File.*"));
    }

    #[test]
    fn test_glob_escapes_regex_chars() {
        assert!(match_glob("a+b(c)", "a+b(c)"));
        assert!(!match_glob("aab(c)", "a+b(c)"));
        assert!(match_glob("[x]", "[x]"));
    }

    #[test]
    fn test_glob_spans_newlines() {
        assert!(match_glob("echo hi\nrm -rf /", "*rm -rf*"));
    }

    #[test]
    fn test_match_args_glob_and_regex() {
        let args = json!({"cmd": "rm -rf /", "depth": 3});
        assert!(match_args(&args, &patterns(&[("cmd", "*rm -rf*")])));
        assert!(match_args(&args, &patterns(&[("cmd", "/^rm\\s/")])));
        assert!(match_args(&args, &patterns(&[("depth", "3")])));
        assert!(!match_args(&args, &patterns(&[("cmd", "ls*")])));
    }

    #[test]
    fn test_match_args_missing_key() {
        let args = json!({"cmd": "ls"});
        assert!(!match_args(&args, &patterns(&[("path", "*")])));
        assert!(match_args(&args, &BTreeMap::new()));
    }

    #[test]
    fn test_invalid_regex_does_not_match() {
        let args = json!({"cmd": "ls"});
        assert!(!match_args(&args, &patterns(&[("cmd", "/[unclosed/")])));
    }

    #[test]
    fn test_coerce_to_string() {
        assert_eq!(coerce_to_string(&json!("x")), "x");
        assert_eq!(coerce_to_string(&json!(true)), "true");
        assert_eq!(coerce_to_string(&json!(null)), "null");
        assert_eq!(coerce_to_string(&json!([1, "a"])), "1,a");
    }

    #[test]
    fn test_is_more_specific() {
        assert!(is_more_specific("File.read", "File.*"));
        assert!(!is_more_specific("*", "File.*"));
        assert!(is_more_specific("File.*", "F*"));
        assert!(!is_more_specific("abc", "abc"));
    }
}
