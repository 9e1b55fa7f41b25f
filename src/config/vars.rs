//! Environment variable interpolation for config files.
//!
//! Supports the following syntax:
//! - `${VAR}` - substitute with env var value, error if missing
//! - `${VAR:-default}` - use default if VAR is unset OR empty
//! - `${VAR-default}` - use default only if VAR is unset (empty is OK)
//! - `$$` - escape sequence for literal `$`
//!
//! Unbraced `$VAR` is deliberately not supported: YAML values regularly
//! contain bare dollar signs and the braced form keeps substitution explicit.

use regex::Regex;
use std::env;
use std::sync::LazyLock;

/// Matches `$$` escapes and `${VAR}` forms with an optional default clause.
static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                           # Escape sequence $$
        |
        \$\{                           # Opening ${
            (?P<name>[A-Za-z_][A-Za-z0-9_]*)
            (?:
                (?P<sep>:?-)           # :- or - introduces a default
                (?P<default>[^}]*)
            )?
        \}                             # Closing }
        ",
    )
    .expect("Invalid regex pattern")
});

/// Result of environment variable interpolation.
#[derive(Debug)]
pub struct InterpolationResult {
    /// The interpolated text.
    pub text: String,
    /// Any errors encountered during interpolation.
    pub errors: Vec<String>,
}

impl InterpolationResult {
    /// Returns true if there were no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Interpolate environment variables in the given text.
///
/// Errors are accumulated rather than short-circuited so a user sees every
/// missing variable in one pass.
pub fn interpolate(input: &str) -> InterpolationResult {
    let mut errors = Vec::new();

    let text = ENV_VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            let full_match = caps.get(0).unwrap().as_str();

            if full_match == "$$" {
                return "$".to_string();
            }

            let name = caps.name("name").map(|m| m.as_str()).unwrap_or("");
            let separator = caps.name("sep").map(|m| m.as_str());
            let default = caps.name("default").map(|m| m.as_str());

            match env::var(name) {
                Ok(value) => {
                    // A multi-line value would splice new YAML structure
                    // into the document
                    if value.contains('\n') || value.contains('\r') {
                        errors.push(format!(
                            "environment variable '{name}' contains newlines, which is not allowed"
                        ));
                        return full_match.to_string();
                    }

                    if value.is_empty() && separator == Some(":-") {
                        return default.unwrap_or("").to_string();
                    }

                    value
                }
                Err(_) => match default {
                    Some(default) => default.to_string(),
                    None => {
                        errors.push(format!("environment variable '{name}' is not set"));
                        full_match.to_string()
                    }
                },
            }
        })
        .to_string();

    InterpolationResult { text, errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        // Save original values
        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        // SAFETY: These tests run serially (not in parallel) and we restore values after
        for (key, value) in vars {
            match value {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        let result = f();

        // SAFETY: Restoring original environment state
        for (key, original) in originals {
            match original {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        result
    }

    #[test]
    fn test_braced_substitution() {
        with_env_vars(&[("FLOE_TEST_BRACED", Some("landing"))], || {
            let result = interpolate("url: s3://${FLOE_TEST_BRACED}/raw");
            assert!(result.is_ok());
            assert_eq!(result.text, "url: s3://landing/raw");
        });
    }

    #[test]
    fn test_unbraced_form_left_alone() {
        let result = interpolate("note: costs $FIVE dollars");
        assert!(result.is_ok());
        assert_eq!(result.text, "note: costs $FIVE dollars");
    }

    #[test]
    fn test_missing_variable_error() {
        with_env_vars(&[("FLOE_TEST_MISSING", None)], || {
            let result = interpolate("value: ${FLOE_TEST_MISSING}");
            assert!(!result.is_ok());
            assert_eq!(result.errors.len(), 1);
            assert!(result.errors[0].contains("FLOE_TEST_MISSING"));
            assert!(result.errors[0].contains("not set"));
        });
    }

    #[test]
    fn test_multiple_missing_variables_accumulate() {
        with_env_vars(&[("FLOE_TEST_MISS1", None), ("FLOE_TEST_MISS2", None)], || {
            let result = interpolate("a: ${FLOE_TEST_MISS1}, b: ${FLOE_TEST_MISS2}");
            assert!(!result.is_ok());
            assert_eq!(result.errors.len(), 2);
        });
    }

    #[test]
    fn test_default_value_unset() {
        with_env_vars(&[("FLOE_TEST_UNSET", None)], || {
            let result = interpolate("value: ${FLOE_TEST_UNSET:-fallback}");
            assert!(result.is_ok());
            assert_eq!(result.text, "value: fallback");
        });
    }

    #[test]
    fn test_default_value_empty_with_colon() {
        with_env_vars(&[("FLOE_TEST_EMPTY", Some(""))], || {
            let result = interpolate("value: ${FLOE_TEST_EMPTY:-fallback}");
            assert!(result.is_ok());
            assert_eq!(result.text, "value: fallback");
        });
    }

    #[test]
    fn test_default_value_empty_without_colon() {
        with_env_vars(&[("FLOE_TEST_EMPTY2", Some(""))], || {
            let result = interpolate("value: ${FLOE_TEST_EMPTY2-fallback}");
            assert!(result.is_ok());
            assert_eq!(result.text, "value: ");
        });
    }

    #[test]
    fn test_set_variable_beats_default() {
        with_env_vars(&[("FLOE_TEST_SET", Some("actual"))], || {
            let result = interpolate("value: ${FLOE_TEST_SET:-fallback}");
            assert!(result.is_ok());
            assert_eq!(result.text, "value: actual");
        });
    }

    #[test]
    fn test_escape_sequence() {
        let result = interpolate("price: $$100");
        assert!(result.is_ok());
        assert_eq!(result.text, "price: $100");
    }

    #[test]
    fn test_newline_injection_blocked() {
        with_env_vars(&[("FLOE_TEST_INJECT", Some("line1\nline2"))], || {
            let result = interpolate("value: ${FLOE_TEST_INJECT}");
            assert!(!result.is_ok());
            assert!(result.errors[0].contains("newlines"));
        });
    }

    #[test]
    fn test_no_interpolation_needed() {
        let result = interpolate("plain text without variables");
        assert!(result.is_ok());
        assert_eq!(result.text, "plain text without variables");
    }

    #[test]
    fn test_yaml_config_example() {
        with_env_vars(
            &[
                ("FLOE_TEST_BUCKET", Some("synthea-fhir-data-dump")),
                ("FLOE_TEST_AWS_KEY", Some("AKIA123")),
                ("FLOE_TEST_AWS_REGION", None),
            ],
            || {
                let yaml = r#"
source:
  url: "s3://${FLOE_TEST_BUCKET}/raw/patients"
  storage_options:
    aws_access_key_id: ${FLOE_TEST_AWS_KEY}
    aws_region: ${FLOE_TEST_AWS_REGION:-us-east-1}
"#;
                let result = interpolate(yaml);
                assert!(result.is_ok());
                assert!(
                    result
                        .text
                        .contains("s3://synthea-fhir-data-dump/raw/patients")
                );
                assert!(result.text.contains("aws_access_key_id: AKIA123"));
                assert!(result.text.contains("aws_region: us-east-1"));
            },
        );
    }
}
