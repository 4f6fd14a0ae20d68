use std::fmt::{self, Display};

use thiserror::Error;

/// The part of a hint record that an [`Error`] refers to.
///
/// In the JSON encoding these correspond to the keys `R`, `H`, `M` and `P`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "mirrors the fixed record structure shared by both encodings"
)]
pub enum Field {
    /// The resource name (`R`).
    Resource,

    /// The list of hints (`H`).
    Hints,

    /// The NUMA node mask of one hint (`M`).
    Mask,

    /// The preference flag of one hint (`P`).
    Preferred,
}

impl Field {
    /// The key used for this field in the JSON encoding.
    #[must_use]
    pub const fn json_key(self) -> &'static str {
        match self {
            Self::Resource => "R",
            Self::Hints => "H",
            Self::Mask => "M",
            Self::Preferred => "P",
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resource => "resource",
            Self::Hints => "hints",
            Self::Mask => "mask",
            Self::Preferred => "preferred",
        };

        write!(f, "{name} ({})", self.json_key())
    }
}

/// Errors that can occur when parsing hint records.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A required field was not present in the record.
    #[error("hint record {index}: missing field {field}")]
    MissingField {
        /// Position of the record in the input.
        index: usize,

        /// The field that was missing.
        field: Field,
    },

    /// A field was present but its value was not acceptable.
    #[error("hint record {index}: invalid field {field}: {problem}")]
    InvalidField {
        /// Position of the record in the input.
        index: usize,

        /// The field that was invalid.
        field: Field,

        /// A human-readable description of the problem, including the offending value.
        problem: String,
    },

    /// A record in the JSON encoding was not a valid JSON document.
    #[error("hint record {index}: not valid JSON")]
    InvalidJson {
        /// Position of the record in the input.
        index: usize,

        /// The underlying JSON parser failure.
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub(crate) fn missing(index: usize, field: Field) -> Self {
        Self::MissingField { index, field }
    }

    pub(crate) fn invalid(index: usize, field: Field, problem: impl Into<String>) -> Self {
        Self::InvalidField {
            index,
            field,
            problem: problem.into(),
        }
    }

    /// Position of the offending record in the input.
    #[must_use]
    pub fn record_index(&self) -> usize {
        match self {
            Self::MissingField { index, .. }
            | Self::InvalidField { index, .. }
            | Self::InvalidJson { index, .. } => *index,
        }
    }

    /// The offending field, if the error can be attributed to one.
    #[must_use]
    pub fn field(&self) -> Option<Field> {
        match self {
            Self::MissingField { field, .. } | Self::InvalidField { field, .. } => Some(*field),
            Self::InvalidJson { .. } => None,
        }
    }
}

/// Errors that can occur when building a [`NumaAffinity`][crate::NumaAffinity].
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum MaskError {
    /// The mask string contained no characters.
    #[error("mask is empty")]
    Empty,

    /// The mask string is wider than the supported number of NUMA nodes.
    #[error("mask '{mask}' has {width} positions but at most {max} NUMA nodes are supported", max = crate::MAX_NUMA_NODES)]
    TooWide {
        /// The offending mask.
        mask: String,

        /// Number of positions in the offending mask.
        width: usize,
    },

    /// The mask string contained something other than `0` or `1`.
    #[error("mask '{mask}' contains '{character}', only '0' and '1' are allowed")]
    InvalidCharacter {
        /// The offending mask.
        mask: String,

        /// The first offending character.
        character: char,
    },

    /// A NUMA node index does not fit in the mask.
    #[error("NUMA node {node} is out of range, at most {max} NUMA nodes are supported", max = crate::MAX_NUMA_NODES)]
    NodeOutOfRange {
        /// The offending node index.
        node: u32,
    },
}

/// A specialized `Result` type for hint parsing, returning the crate's [`Error`] type as the
/// error value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);
    assert_impl_all!(MaskError: Send, Sync, Debug);

    #[test]
    fn display_names_record_and_field() {
        let error = Error::invalid(3, Field::Preferred, "'yes' is not a boolean");

        assert_eq!(
            error.to_string(),
            "hint record 3: invalid field preferred (P): 'yes' is not a boolean"
        );
        assert_eq!(error.record_index(), 3);
        assert_eq!(error.field(), Some(Field::Preferred));

        let error = Error::missing(0, Field::Hints);
        assert_eq!(error.to_string(), "hint record 0: missing field hints (H)");
    }
}
