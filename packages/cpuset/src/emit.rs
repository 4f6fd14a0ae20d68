use std::fmt::Write;

use itertools::Itertools;

use crate::CpuId;

/// Generates a [CPU list][crate] in canonical form, which can be parsed by [`parse()`][crate::parse].
///
/// The canonical form lists IDs in ascending order, compressing every maximal run of consecutive
/// IDs into an inclusive `start-end` range and emitting isolated IDs as bare integers. Duplicate
/// input IDs are ignored. Emitting no IDs yields the empty string.
pub fn emit<'a>(items: impl IntoIterator<Item = &'a CpuId>) -> String {
    // Each run is (first, last) inclusive.
    let runs = items
        .into_iter()
        .copied()
        .sorted_unstable()
        .dedup()
        .map(|id| (id, id))
        .coalesce(|(first, last), (next, _)| {
            if last.checked_add(1) == Some(next) {
                Ok((first, next))
            } else {
                Err(((first, last), (next, next)))
            }
        });

    let mut result = String::new();

    for (first, last) in runs {
        if !result.is_empty() {
            result.push(',');
        }

        // Writing into a String cannot fail.
        _ = if first == last {
            write!(result, "{first}")
        } else {
            write!(result, "{first}-{last}")
        };
    }

    result
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::parse;

    #[test]
    fn emit_smoke_test() {
        assert_eq!(emit(&[]), "");

        assert_eq!(emit(&[555]), "555");

        assert_eq!(emit(&[555, 666]), "555,666");

        assert_eq!(emit(&[0, 1]), "0-1");

        assert_eq!(emit(&[0, 1, 2, 3]), "0-3");

        assert_eq!(emit(&[0, 1, 2, 3, 6, 7, 8, 11, 12, 13]), "0-3,6-8,11-13");

        assert_eq!(emit(&[3, 1, 2]), "1-3");

        assert_eq!(emit(&[0, 1, 3]), "0-1,3");

        assert_eq!(emit(&[0, 3, 5, 6, 8, 9, 11, 14]), "0,3,5-6,8-9,11,14");

        assert_eq!(emit(&[7, 7, 7]), "7");
    }

    #[test]
    fn emit_handles_id_space_end() {
        assert_eq!(emit(&[CpuId::MAX - 1, CpuId::MAX]), "4294967294-4294967295");
        assert_eq!(emit(&[0, CpuId::MAX]), "0,4294967295");
    }

    #[test]
    fn parse_of_emitted_preserves_membership() {
        for input in ["", "0", "0-3,8", "8,0-3", "1,3,5,7", "0-1,1-2,10-12,11", " 4 , 2 "] {
            let parsed = parse(input).unwrap();
            let reparsed = parse(&emit(&parsed)).unwrap();

            assert_eq!(parsed, reparsed, "membership changed for input '{input}'");
        }
    }
}
