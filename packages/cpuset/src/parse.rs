use itertools::Itertools;

use crate::{CpuId, MAX_CPU_ID};

/// Parses a [CPU list][crate] and returns the IDs in ascending order, removing duplicates.
///
/// An empty or whitespace-only string is valid input and returns an empty result.
///
/// See [package-level documentation][crate] for details.
pub fn parse(cpulist: &str) -> crate::Result<Vec<CpuId>> {
    if cpulist.trim().is_empty() {
        return Ok(vec![]);
    }

    let parts = cpulist.split(',');

    let item_ranges: crate::Result<Vec<Vec<CpuId>>> = parts.map(parse_part).collect();

    item_ranges.map(|x| x.into_iter().flatten().sorted_unstable().dedup().collect())
}

fn parse_part(part: &str) -> crate::Result<Vec<CpuId>> {
    let part = part.trim();

    if part.is_empty() {
        return Err(crate::Error::new(part, "empty item in list"));
    }

    if let Some((range_start, range_end_inc)) = part.split_once('-') {
        parse_range(part, range_start, range_end_inc)
    } else {
        parse_single(part).map(|item| vec![item])
    }
}

fn parse_range(part: &str, range_start: &str, range_end_inc: &str) -> crate::Result<Vec<CpuId>> {
    if range_start.is_empty() {
        return Err(crate::Error::new(
            part,
            "range start is missing or the value is negative",
        ));
    }

    let range_start = range_start.parse::<CpuId>().map_err(|inner| {
        crate::Error::caused_by(
            part,
            "range start could not be parsed as an integer",
            inner,
        )
    })?;

    let range_end_inc = range_end_inc.parse::<CpuId>().map_err(|inner| {
        crate::Error::caused_by(part, "range end could not be parsed as an integer", inner)
    })?;

    if range_start > range_end_inc {
        return Err(crate::Error::new(part, "range start must be <= end"));
    }

    if range_end_inc > MAX_CPU_ID {
        return Err(crate::Error::new(
            part,
            format!("range is too large, CPU IDs above {MAX_CPU_ID} are not supported"),
        ));
    }

    Ok((range_start..=range_end_inc).collect())
}

fn parse_single(single_item_part: &str) -> crate::Result<CpuId> {
    let id = single_item_part.parse::<CpuId>().map_err(|inner| {
        crate::Error::caused_by(
            single_item_part,
            "part was not a range but could not be parsed as an integer either",
            inner,
        )
    })?;

    if id > MAX_CPU_ID {
        return Err(crate::Error::new(
            single_item_part,
            format!("CPU IDs above {MAX_CPU_ID} are not supported"),
        ));
    }

    Ok(id)
}
