#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! NUMA topology hints, as produced by topology-aware resource managers, and the two textual
//! encodings used to write them down.
//!
//! A [`TopologyHint`] is a candidate [`NumaAffinity`] (the set of NUMA nodes an allocation would
//! be local to) plus a flag saying whether the candidate is preferred. A resource manager offers
//! an ordered list of hints per resource, collected in [`HintsByResource`].
//!
//! # Encodings
//!
//! Structured text, one record per resource:
//!
//! ```text
//! cpu:[{01 true} {10 true} {11 false}]
//! ```
//!
//! JSON, one object per resource:
//!
//! ```text
//! {"R":"cpu","H":[{"M":"01","P":true},{"M":"10","P":true},{"M":"11","P":false}]}
//! ```
//!
//! In both forms the mask is a string of `0` and `1` characters where the right-most character is
//! NUMA node 0. Both parse to the same value:
//!
//! ```
//! let text = topology_hints::parse_structured(&["cpu:[{01 true} {10 true} {11 false}]"]).unwrap();
//! let json = topology_hints::parse_json(&[
//!     r#"{"R":"cpu","H":[{"M":"01","P":true},{"M":"10","P":true},{"M":"11","P":false}]}"#,
//! ])
//! .unwrap();
//!
//! assert_eq!(text, json);
//! assert_eq!(text.get("cpu").unwrap().len(), 3);
//! ```

mod affinity;
mod error;
mod hint;
mod json;
mod structured;

pub use affinity::*;
pub use error::*;
pub use hint::*;
pub use json::*;
pub use structured::*;

/// Parses records that may use either encoding, choosing the JSON codec for records that start
/// with `{` and the structured-text codec for all others.
///
/// Record indexes in errors refer to positions in `records`.
pub fn parse_any<S: AsRef<str>>(records: &[S]) -> Result<HintsByResource> {
    let mut result = HintsByResource::new();

    for (index, record) in records.iter().enumerate() {
        let record = record.as_ref();

        let (resource, hints) = if record.trim_start().starts_with('{') {
            json::parse_record(index, record)?
        } else {
            structured::parse_record(index, record)?
        };

        result.append(resource, hints);
    }

    Ok(result)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn parse_any_accepts_mixed_records() {
        let hints = parse_any(&[
            r#"{"R":"memory","H":[{"M":"11","P":true}]}"#,
            "cpu:[{01 true}]",
        ])
        .unwrap();

        assert_eq!(hints.len(), 2);
        assert_eq!(
            hints.get("memory").unwrap(),
            &[TopologyHint::new(NumaAffinity::from_bits(0b11), true)]
        );
        assert_eq!(
            hints.get("cpu").unwrap(),
            &[TopologyHint::new(NumaAffinity::from_bits(0b01), true)]
        );
    }

    #[test]
    fn parse_any_reports_input_index() {
        let error = parse_any(&["cpu:[{01 true}]", r#"{"R":"cpu","H":[{"M":"2","P":true}]}"#])
            .unwrap_err();

        assert_eq!(error.record_index(), 1);
        assert_eq!(error.field(), Some(Field::Mask));
    }
}
