//! Repository and owner name validation.
//!
//! Names reported by a provider become path segments on disk, so they have to
//! start with a word character and may only contain word characters, `-` and
//! `.` after that. This rules out empty names, `..`, separators and whitespace.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::NameError;

const NAME_PATTERN: &str = r"^\w[-.\w]*$";

fn name_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(NAME_PATTERN).expect("name pattern is a valid regex"))
}

/// A name that passed [`validate`] and is safe to use as a path segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValidName(String);

impl ValidName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Deref for ValidName {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ValidName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<std::path::Path> for ValidName {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

impl Borrow<str> for ValidName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate a repository or owner name, returning it unchanged on success.
pub fn validate(name: &str) -> Result<ValidName, NameError> {
    if name_regex().is_match(name) {
        Ok(ValidName(name.to_string()))
    } else {
        Err(NameError(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_accepts_common_names() {
        for name in [
            "repovault",
            "Hello-World",
            "my.github.io",
            "a",
            "_private",
            "9lives",
            "under_score-and.dot",
            "dotfiles.",
        ] {
            let valid = validate(name).expect("name should be accepted");
            assert_eq!(valid.as_str(), name);
        }
    }

    #[test]
    fn test_rejects_unsafe_names() {
        for name in [
            "",
            ".",
            "..",
            ".hidden",
            "-flag",
            "owner/repo",
            "../etc",
            "with space",
            " leading",
            "trailing ",
            "tab\there",
            "new\nline",
            "back\\slash",
        ] {
            assert_eq!(validate(name), Err(NameError(name.to_string())), "{name:?}");
        }
    }

    #[test]
    fn test_unicode_word_characters_are_accepted() {
        assert!(validate("café").is_ok());
        assert!(validate("日本語").is_ok());
    }

    #[test]
    fn test_error_message_names_the_input() {
        let err = validate("a/b").unwrap_err();
        assert_eq!(err.to_string(), "invalid name 'a/b'");
    }

    #[quickcheck]
    fn prop_accepted_names_are_safe_path_segments(name: String) -> bool {
        match validate(&name) {
            Ok(valid) => {
                valid.as_str() == name
                    && !name.is_empty()
                    && !name.contains('/')
                    && !name.contains('\\')
                    && !name.contains(char::is_whitespace)
                    && !name.starts_with('.')
                    && !name.starts_with('-')
            }
            Err(NameError(rejected)) => rejected == name,
        }
    }

    #[quickcheck]
    fn prop_names_containing_a_separator_are_rejected(head: String, tail: String) -> bool {
        validate(&format!("{head}/{tail}")).is_err()
    }

    #[quickcheck]
    fn prop_ascii_alphanumeric_names_are_accepted(name: String) -> bool {
        let name: String = name.chars().filter(char::is_ascii_alphanumeric).collect();
        name.is_empty() || validate(&name).map(|v| v.as_str() == name).unwrap_or(false)
    }
}
