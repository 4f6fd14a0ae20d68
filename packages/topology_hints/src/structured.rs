use itertools::Itertools;

use crate::hint::common_width;
use crate::{Error, Field, HintsByResource, NumaAffinity, TopologyHint};

/// Parses hint records in the structured-text encoding, e.g.
/// `cpu:[{01 true} {10 true} {11 false}]`.
///
/// Each record describes one resource. If the same resource appears in several records, the
/// hints of later records are appended after those of earlier ones.
///
/// # Errors
///
/// Returns an error naming the record index and field if any record is malformed.
pub fn parse_structured<S: AsRef<str>>(records: &[S]) -> crate::Result<HintsByResource> {
    let mut result = HintsByResource::new();

    for (index, record) in records.iter().enumerate() {
        let (resource, hints) = parse_record(index, record.as_ref())?;
        result.append(resource, hints);
    }

    Ok(result)
}

/// Emits one structured-text record per resource, in ascending resource order.
///
/// Masks within one record are padded to a common width so the output lines up with the way
/// resource managers print them.
#[must_use]
pub fn encode_structured(hints: &HintsByResource) -> Vec<String> {
    hints
        .iter()
        .map(|(resource, hints)| {
            let width = common_width(hints);
            let groups = hints
                .iter()
                .map(|hint| {
                    format!(
                        "{{{} {}}}",
                        hint.affinity.to_mask_string(width),
                        hint.preferred
                    )
                })
                .join(" ");

            format!("{resource}:[{groups}]")
        })
        .collect()
}

pub(crate) fn parse_record(
    index: usize,
    record: &str,
) -> crate::Result<(String, Vec<TopologyHint>)> {
    let record = record.trim();

    let Some((resource, hint_list)) = record.split_once(':') else {
        return Err(Error::missing(index, Field::Hints));
    };

    let resource = resource.trim();
    if resource.is_empty() {
        return Err(Error::missing(index, Field::Resource));
    }

    let hint_list = hint_list.trim();
    let Some(groups) = hint_list
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    else {
        return Err(Error::invalid(
            index,
            Field::Hints,
            format!("'{hint_list}' is not enclosed in '[' and ']'"),
        ));
    };

    let hints = parse_groups(index, groups)?;

    Ok((resource.to_string(), hints))
}

fn parse_groups(index: usize, groups: &str) -> crate::Result<Vec<TopologyHint>> {
    let mut hints = Vec::new();
    let mut rest = groups.trim_start();

    while !rest.is_empty() {
        let Some(after_open) = rest.strip_prefix('{') else {
            return Err(Error::invalid(
                index,
                Field::Hints,
                format!("expected '{{' at '{rest}'"),
            ));
        };

        let Some((group, after_close)) = after_open.split_once('}') else {
            return Err(Error::invalid(
                index,
                Field::Hints,
                format!("unterminated hint group '{{{after_open}'"),
            ));
        };

        hints.push(parse_group(index, group)?);
        rest = after_close.trim_start();
    }

    Ok(hints)
}

fn parse_group(index: usize, group: &str) -> crate::Result<TopologyHint> {
    let mut tokens = group.split_whitespace();

    let Some(mask) = tokens.next() else {
        return Err(Error::missing(index, Field::Mask));
    };
    let Some(preferred) = tokens.next() else {
        return Err(Error::missing(index, Field::Preferred));
    };

    if let Some(extra) = tokens.next() {
        return Err(Error::invalid(
            index,
            Field::Hints,
            format!("unexpected '{extra}' in hint group '{{{group}}}'"),
        ));
    }

    let affinity = mask
        .parse::<NumaAffinity>()
        .map_err(|e| Error::invalid(index, Field::Mask, e.to_string()))?;

    Ok(TopologyHint::new(affinity, parse_preferred(index, preferred)?))
}

fn parse_preferred(index: usize, value: &str) -> crate::Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(Error::invalid(
            index,
            Field::Preferred,
            format!("'{other}' is not 'true' or 'false'"),
        )),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn hint(bits: u64, preferred: bool) -> TopologyHint {
        TopologyHint::new(NumaAffinity::from_bits(bits), preferred)
    }

    #[test]
    fn parses_multiple_resources() {
        let hints = parse_structured(&[
            "hugepages-2Mi:[{11 true}]",
            "memory:[{11 true}]",
            "cpu:[{01 true} {10 true} {11 false}]",
        ])
        .unwrap();

        let expected: HintsByResource = [
            ("hugepages-2Mi", vec![hint(0b11, true)]),
            ("memory", vec![hint(0b11, true)]),
            (
                "cpu",
                vec![hint(0b01, true), hint(0b10, true), hint(0b11, false)],
            ),
        ]
        .into_iter()
        .collect();

        assert_eq!(hints, expected);
    }

    #[test]
    fn tolerates_extra_whitespace() {
        let hints = parse_structured(&["  cpu : [ {01   true}{10 false} ]  "]).unwrap();

        assert_eq!(
            hints.get("cpu").unwrap(),
            &[hint(0b01, true), hint(0b10, false)]
        );
    }

    #[test]
    fn empty_hint_list_is_valid() {
        let hints = parse_structured(&["cpu:[]"]).unwrap();

        assert!(hints.get("cpu").unwrap().is_empty());
    }

    #[test]
    fn repeated_resource_appends() {
        let hints = parse_structured(&["cpu:[{01 true}]", "cpu:[{10 false}]"]).unwrap();

        assert_eq!(
            hints.get("cpu").unwrap(),
            &[hint(0b01, true), hint(0b10, false)]
        );
    }

    #[test]
    fn malformed_records_name_index_and_field() {
        let cases: &[(&str, Field)] = &[
            ("cpu", Field::Hints),
            (":[{01 true}]", Field::Resource),
            ("cpu:{01 true}", Field::Hints),
            ("cpu:[{01 true]", Field::Hints),
            ("cpu:[01 true]", Field::Hints),
            ("cpu:[{}]", Field::Mask),
            ("cpu:[{01}]", Field::Preferred),
            ("cpu:[{01 true extra}]", Field::Hints),
            ("cpu:[{0a true}]", Field::Mask),
            ("cpu:[{01 yes}]", Field::Preferred),
            ("cpu:[{01 True}]", Field::Preferred),
        ];

        for (record, field) in cases {
            let error = parse_structured(&["memory:[{1 true}]", *record]).unwrap_err();

            assert_eq!(error.record_index(), 1, "record '{record}'");
            assert_eq!(error.field(), Some(*field), "record '{record}'");
        }
    }

    #[test]
    fn encode_pads_to_common_width() {
        let hints: HintsByResource = [(
            "cpu",
            vec![hint(0b01, true), hint(0b10, true), hint(0b11, false)],
        )]
        .into_iter()
        .collect();

        let encoded = encode_structured(&hints);

        assert_eq!(encoded, vec!["cpu:[{01 true} {10 true} {11 false}]"]);
        assert_eq!(parse_structured(&encoded).unwrap(), hints);
    }
}
