//! Action matching.

use crate::types::{Tokens, SAFE_METHODS, WILDCARD};

const SAFE_METHODS_TOKEN: &str = "<safe_methods>";

/// Whether a statement's action tokens cover the requested action.
///
/// Tokens may name the action itself, `*`, a request method as
/// `<method:post>`, or `<safe_methods>` for `GET`, `HEAD` and `OPTIONS`.
pub fn matches(actions: &Tokens, method: &str, action: &str) -> bool {
    actions.contains(WILDCARD)
        || actions.contains(action)
        || actions.contains(&format!("<method:{}>", method.to_lowercase()))
        || (actions.contains(SAFE_METHODS_TOKEN) && SAFE_METHODS.contains(&method))
}

#[cfg(test)]
mod tests {
    use super::*;

    const METHODS: [&str; 4] = ["GET", "HEAD", "OPTIONS", "POST"];

    fn assert_matches(actions: Tokens, expected: bool, requested: &[&str], methods: &[&str]) {
        for method in methods {
            for action in requested {
                assert_eq!(
                    matches(&actions, method, action),
                    expected,
                    "action {action} with method {method} against {actions:?}"
                );
            }
        }
    }

    #[test]
    fn test_match_all() {
        assert_matches(Tokens::from("*"), true, &["post", "custom"], &METHODS);
    }

    #[test]
    fn test_match_custom() {
        assert_matches(Tokens::from("custom"), true, &["custom"], &METHODS);
        assert_matches(Tokens::from("custom"), false, &["post"], &METHODS);
    }

    #[test]
    fn test_match_method() {
        assert_matches(Tokens::from("<method:post>"), true, &["post", "custom"], &["POST"]);
        assert_matches(Tokens::from("<method:post>"), false, &["post", "custom"], &["GET"]);
    }

    #[test]
    fn test_match_safe_methods() {
        assert_matches(Tokens::from("<safe_methods>"), true, &["post", "custom"], &["GET", "HEAD", "OPTIONS"]);
        assert_matches(Tokens::from("<safe_methods>"), false, &["post", "custom"], &["POST"]);
    }

    #[test]
    fn test_match_any_of_several() {
        assert_matches(Tokens::from(["list", "retrieve"]), true, &["list", "retrieve"], &["GET"]);
        assert_matches(Tokens::from(["list", "retrieve"]), false, &["destroy"], &["DELETE"]);
    }
}
