use std::io;
use std::path::PathBuf;

use crate::{DiscoveryError, EngineSetupError, QuantityError, RecordingError, TopologyLookupError};

/// A harness run could not be set up or its output could not be written.
///
/// Any of these ends the run. Failures of individual allocation requests are not setup errors;
/// the driver logs them and carries on.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SetupError {
    /// An input file could not be read.
    #[error("failed to read '{}'", path.display())]
    Read {
        /// The file that could not be read.
        path: PathBuf,

        /// The underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// An input file was read but its contents are not valid.
    #[error("failed to decode '{}'", path.display())]
    Decode {
        /// The file with invalid contents.
        path: PathBuf,

        /// What is wrong with the contents.
        #[source]
        source: DecodeError,
    },

    /// A CPU list on the command line is invalid.
    #[error("invalid CPU list '{value}'")]
    CpuList {
        /// The text that failed to parse.
        value: String,

        /// The parse failure.
        #[source]
        source: cpuset::Error,
    },

    /// A topology hint on the command line is invalid.
    #[error("invalid topology hint '{value}'")]
    Hint {
        /// The text that failed to parse.
        value: String,

        /// The parse failure.
        #[source]
        source: topology_hints::Error,
    },

    /// A topology hint on the command line parsed but does not name exactly one hint to use.
    #[error("topology hint '{value}' must describe exactly one resource with at least one hint")]
    AmbiguousHint {
        /// The offending text.
        value: String,
    },

    /// A workload has an invalid CPU quantity.
    #[error("invalid workload '{workload}'")]
    Workload {
        /// The template or file describing the workload.
        workload: String,

        /// The quantity that failed to parse.
        #[source]
        source: QuantityError,
    },

    /// No workload was given.
    #[error("no workloads to allocate")]
    NoWorkloads,

    /// The machine description is not a consistent topology.
    #[error("CPU topology discovery failed")]
    Discovery(#[from] DiscoveryError),

    /// The allocation engine could not be constructed.
    #[error("failed to create the allocation engine")]
    Engine(#[from] EngineSetupError),

    /// CPUs seeded into the tenancy ledger are not part of the topology.
    #[error("failed to seed reserved CPUs")]
    Seed(#[from] TopologyLookupError),

    /// The report could not be written.
    #[error("failed to write output")]
    Output(#[source] io::Error),
}

/// The contents of an input file could not be decoded.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// A JSON document is malformed or has the wrong shape.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A TOML document is malformed or has the wrong shape.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// A recording is well-formed TOML but holds invalid values.
    #[error(transparent)]
    Recording(#[from] RecordingError),
}

/// Renders `error` followed by each of its sources, separated by `: `.
#[must_use]
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();

    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }

    rendered
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(SetupError: Send, Sync, std::fmt::Debug, std::error::Error);
    assert_impl_all!(DecodeError: Send, Sync, std::fmt::Debug, std::error::Error);

    #[test]
    fn chain_includes_every_source() {
        let source = "1-x".parse::<cpuset::CpuSet>().unwrap_err();
        let error = SetupError::CpuList {
            value: "1-x".to_string(),
            source,
        };

        let rendered = error_chain(&error);

        assert!(rendered.starts_with("invalid CPU list '1-x': "), "{rendered}");
        assert!(rendered.contains("1-x"));
    }

    #[test]
    fn chain_of_leaf_error_is_its_message() {
        assert_eq!(error_chain(&SetupError::NoWorkloads), "no workloads to allocate");
    }

    #[test]
    fn decode_error_keeps_its_source() {
        let source = serde_json::from_str::<u32>("{").unwrap_err();
        let expected = source.to_string();
        let error = SetupError::Decode {
            path: PathBuf::from("/tmp/machine.json"),
            source: DecodeError::from(source),
        };

        assert_eq!(error.to_string(), "failed to decode '/tmp/machine.json'");
        assert!(std::error::Error::source(&error).is_some());
        assert_eq!(
            error_chain(&error),
            format!("failed to decode '/tmp/machine.json': {expected}")
        );
    }

    #[test]
    fn read_error_names_path() {
        let error = SetupError::Read {
            path: PathBuf::from("/tmp/machine.json"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };

        assert_eq!(error.to_string(), "failed to read '/tmp/machine.json'");
    }
}
