//! Rule template translation.
//!
//! A rule template is a regular expression written by an operator, with two
//! conveniences: square brackets are always literal (log prefixes such as
//! `[INFO]` are common), and the placeholder [`FRAGMENT_PLACEHOLDER`] marks
//! where an embedded JSON fragment appears in the line.

use regex::Regex;

use crate::error::{LogMonError, Result};

/// Placeholder marking an embedded JSON fragment in a rule template.
pub const FRAGMENT_PLACEHOLDER: &str = "${json_content}";

/// Greedy capture group substituted for each placeholder.
const FRAGMENT_GROUP: &str = "(.*)";

/// Rewrites a rule template into regular expression source.
#[must_use]
pub fn translate(template: &str) -> String {
    template
        .replace('[', r"\[")
        .replace(']', r"\]")
        .replace(FRAGMENT_PLACEHOLDER, FRAGMENT_GROUP)
}

/// Translates and compiles a rule template.
///
/// # Errors
///
/// Returns [`LogMonError::PatternCompile`] if the translated expression is
/// not a valid regular expression.
pub fn compile(template: &str) -> Result<Regex> {
    Regex::new(&translate(template)).map_err(|source| LogMonError::PatternCompile {
        regular: template.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("REQ ${json_content}", r"REQ (.*)" ; "single placeholder")]
    #[test_case("[INFO] ${json_content}", r"\[INFO\] (.*)" ; "brackets escaped")]
    #[test_case("a=${json_content} b=${json_content}", r"a=(.*) b=(.*)" ; "two placeholders")]
    #[test_case("plain text", "plain text" ; "no placeholder")]
    fn translate_cases(template: &str, expected: &str) {
        assert_eq!(translate(template), expected);
    }

    #[test]
    fn compiled_pattern_captures_fragment() {
        let re = compile("[app] REQ ${json_content}").unwrap();
        let caps = re.captures(r#"[app] REQ {"latency":10}"#).unwrap();
        assert_eq!(&caps[1], r#"{"latency":10}"#);
    }

    #[test]
    fn bracket_is_literal_not_class() {
        let re = compile("[ab]").unwrap();
        assert!(re.is_match("[ab]"));
        assert!(!re.is_match("a"));
    }

    #[test]
    fn invalid_template_is_recoverable() {
        let err = compile("REQ (${json_content}").unwrap_err();
        match err {
            LogMonError::PatternCompile { regular, .. } => {
                assert_eq!(regular, "REQ (${json_content}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
