//! Validated package/library names.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a candidate string failed to parse as a [`Name`].
///
/// Every invalid string maps to exactly one reason. Checks run in this fixed
/// priority order so the mapping stays total and deterministic: empty,
/// whitespace, capital letters, invalid characters, bad initial character,
/// trailing punctuation, adjacent punctuation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameError {
    #[error("name must not be empty")]
    Empty,
    #[error("name must not contain whitespace")]
    Whitespace,
    #[error("name must be all lowercase")]
    Capital,
    #[error("name contains a character that is not a lowercase letter, digit, '.', '_', or '-'")]
    InvalidChar,
    #[error("name must begin with a lowercase letter")]
    InitialNotAlpha,
    #[error("name must not end with punctuation")]
    EndPunct,
    #[error("name must not contain adjacent punctuation characters")]
    DoublePunct,
}

fn is_punct(c: char) -> bool {
    matches!(c, '.' | '_' | '-')
}

/// A validated package or library name: lowercase `[a-z0-9._-]`, starting
/// with a letter, with no adjacent, leading, or trailing punctuation, and no
/// whitespace. `Name` is never constructible from an invalid string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Name(String);

impl Name {
    pub fn parse(s: &str) -> Result<Name, NameError> {
        if s.is_empty() {
            return Err(NameError::Empty);
        }
        if s.chars().any(char::is_whitespace) {
            return Err(NameError::Whitespace);
        }
        if s.chars().any(char::is_uppercase) {
            return Err(NameError::Capital);
        }
        if s.chars().any(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || is_punct(c))) {
            return Err(NameError::InvalidChar);
        }
        let first = s.chars().next().expect("checked non-empty above");
        if !first.is_ascii_lowercase() {
            return Err(NameError::InitialNotAlpha);
        }
        let last = s.chars().last().expect("checked non-empty above");
        if is_punct(last) {
            return Err(NameError::EndPunct);
        }
        if s.chars().zip(s.chars().skip(1)).any(|(a, b)| is_punct(a) && is_punct(b)) {
            return Err(NameError::DoublePunct);
        }
        Ok(Name(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Name {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Name::parse(&value)
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Name::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_names() {
        for s in ["foo", "foo-bar", "foo.bar_baz", "a", "a1", "foo123"] {
            assert!(Name::parse(s).is_ok(), "expected {s:?} to be valid");
        }
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(Name::parse(""), Err(NameError::Empty));
    }

    #[test]
    fn rejects_whitespace() {
        assert_eq!(Name::parse("foo bar"), Err(NameError::Whitespace));
    }

    #[test]
    fn rejects_capitals() {
        assert_eq!(Name::parse("Foo"), Err(NameError::Capital));
    }

    #[test]
    fn rejects_invalid_char() {
        assert_eq!(Name::parse("foo$bar"), Err(NameError::InvalidChar));
    }

    #[test]
    fn rejects_bad_initial() {
        assert_eq!(Name::parse("1foo"), Err(NameError::InitialNotAlpha));
        assert_eq!(Name::parse("-foo"), Err(NameError::InitialNotAlpha));
    }

    #[test]
    fn rejects_trailing_punct() {
        assert_eq!(Name::parse("foo-"), Err(NameError::EndPunct));
    }

    #[test]
    fn rejects_double_punct() {
        assert_eq!(Name::parse("foo--bar"), Err(NameError::DoublePunct));
    }

    #[test]
    fn every_invalid_example_has_exactly_one_reason() {
        // Exercise property 1: each failing string triggers exactly one
        // reason. Since NameError is a single enum discriminant per string,
        // this reduces to every example below successfully returning *some*
        // single variant (compile-checked) rather than panicking.
        let bad = ["", "Foo", "1abc", "abc-", "a--b", "a b", "a@b"];
        for s in bad {
            assert!(Name::parse(s).is_err());
        }
    }
}
