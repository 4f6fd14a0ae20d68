use std::num::ParseIntError;

use thiserror::Error;

/// Errors that can occur when processing CPU list strings.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller provided a supposed CPU list string but it did not match the expected format.
    #[error("invalid cpu list syntax: '{invalid_value}' is invalid: {problem}")]
    InvalidSyntax {
        /// The specific item that was invalid.
        invalid_value: String,

        /// A human-readable description of the problem.
        problem: String,

        /// The integer parsing failure behind the problem, if there was one.
        #[source]
        source: Option<ParseIntError>,
    },
}

impl Error {
    pub(crate) fn new(invalid_value: impl Into<String>, problem: impl Into<String>) -> Self {
        Self::InvalidSyntax {
            invalid_value: invalid_value.into(),
            problem: problem.into(),
            source: None,
        }
    }

    pub(crate) fn caused_by(
        invalid_value: impl Into<String>,
        problem: impl Into<String>,
        source: ParseIntError,
    ) -> Self {
        Self::InvalidSyntax {
            invalid_value: invalid_value.into(),
            problem: problem.into(),
            source: Some(source),
        }
    }

    /// The item of the input string that caused the error.
    #[must_use]
    pub fn invalid_value(&self) -> &str {
        match self {
            Self::InvalidSyntax { invalid_value, .. } => invalid_value,
        }
    }
}

/// A specialized `Result` type for CPU list operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::error::Error as _;
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn display_names_offending_item() {
        let error = Error::new("7-x", "range end could not be parsed as an integer");

        assert_eq!(
            error.to_string(),
            "invalid cpu list syntax: '7-x' is invalid: range end could not be parsed as an integer"
        );
        assert_eq!(error.invalid_value(), "7-x");
        assert!(error.source().is_none());
    }

    #[test]
    fn caused_by_keeps_source() {
        let inner = "abc".parse::<u32>().unwrap_err();
        let error = Error::caused_by("abc", "not a number", inner);

        assert!(error.source().is_some());
    }
}
