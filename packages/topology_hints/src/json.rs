use serde_json::{Map, Value, json};

use crate::hint::common_width;
use crate::{Error, Field, HintsByResource, NumaAffinity, TopologyHint};

/// Parses hint records in the JSON encoding, e.g.
/// `{"R":"cpu","H":[{"M":"01","P":true},{"M":"11","P":false}]}`.
///
/// Each record describes one resource. If the same resource appears in several records, the
/// hints of later records are appended after those of earlier ones.
///
/// # Errors
///
/// Returns an error naming the record index and field if any record is malformed.
pub fn parse_json<S: AsRef<str>>(records: &[S]) -> crate::Result<HintsByResource> {
    let mut result = HintsByResource::new();

    for (index, record) in records.iter().enumerate() {
        let (resource, hints) = parse_record(index, record.as_ref())?;
        result.append(resource, hints);
    }

    Ok(result)
}

/// Emits one JSON record per resource, in ascending resource order.
#[must_use]
pub fn encode_json(hints: &HintsByResource) -> Vec<String> {
    hints
        .iter()
        .map(|(resource, hints)| {
            let width = common_width(hints);
            let encoded_hints: Vec<Value> = hints
                .iter()
                .map(|hint| {
                    json!({
                        "M": hint.affinity.to_mask_string(width),
                        "P": hint.preferred,
                    })
                })
                .collect();

            json!({ "R": resource, "H": encoded_hints }).to_string()
        })
        .collect()
}

pub(crate) fn parse_record(
    index: usize,
    record: &str,
) -> crate::Result<(String, Vec<TopologyHint>)> {
    let document: Value =
        serde_json::from_str(record).map_err(|source| Error::InvalidJson { index, source })?;

    let object = match document {
        Value::Object(object) => object,
        other => {
            return Err(Error::invalid(
                index,
                Field::Resource,
                format!("record must be a JSON object, got '{other}'"),
            ));
        }
    };

    let resource = match required(index, &object, Field::Resource)? {
        Value::String(name) if !name.is_empty() => name.clone(),
        other => {
            return Err(Error::invalid(
                index,
                Field::Resource,
                format!("expected a non-empty string, got '{other}'"),
            ));
        }
    };

    let Value::Array(encoded_hints) = required(index, &object, Field::Hints)? else {
        return Err(Error::invalid(index, Field::Hints, "expected an array"));
    };

    let hints = encoded_hints
        .iter()
        .map(|encoded| parse_hint(index, encoded))
        .collect::<crate::Result<Vec<_>>>()?;

    Ok((resource, hints))
}

fn parse_hint(index: usize, encoded: &Value) -> crate::Result<TopologyHint> {
    let Value::Object(object) = encoded else {
        return Err(Error::invalid(
            index,
            Field::Hints,
            format!("hint must be a JSON object, got '{encoded}'"),
        ));
    };

    let Value::String(mask) = required(index, object, Field::Mask)? else {
        return Err(Error::invalid(index, Field::Mask, "expected a string"));
    };

    let affinity = mask
        .parse::<NumaAffinity>()
        .map_err(|e| Error::invalid(index, Field::Mask, e.to_string()))?;

    let preferred = match required(index, object, Field::Preferred)? {
        Value::Bool(preferred) => *preferred,
        other => {
            return Err(Error::invalid(
                index,
                Field::Preferred,
                format!("'{other}' is not a boolean"),
            ));
        }
    };

    Ok(TopologyHint::new(affinity, preferred))
}

fn required<'a>(
    index: usize,
    object: &'a Map<String, Value>,
    field: Field,
) -> crate::Result<&'a Value> {
    object
        .get(field.json_key())
        .ok_or_else(|| Error::missing(index, field))
}
