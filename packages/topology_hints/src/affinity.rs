use std::fmt::{self, Display};
use std::str::FromStr;

use crate::MaskError;

/// Identifies one NUMA node.
pub type NumaNodeId = u32;

/// The number of NUMA nodes a [`NumaAffinity`] can describe.
pub const MAX_NUMA_NODES: usize = 64;

const DISPLAY_MIN_WIDTH: usize = 2;

/// A fixed-width bitmask over NUMA node indices. Bit `i` is set if node `i` is included.
///
/// The textual mask form lists one `0`/`1` character per node with node 0 as the right-most
/// character, so `"01"` is node 0, `"10"` is node 1 and `"11"` is both. The `Display` form is at
/// least two characters wide, the way the kubelet prints its bitmasks.
///
/// # Example
///
/// ```
/// use topology_hints::NumaAffinity;
///
/// let affinity: NumaAffinity = "110".parse().unwrap();
///
/// assert_eq!(affinity.nodes().collect::<Vec<_>>(), vec![1, 2]);
/// assert_eq!(affinity.to_string(), "110");
/// assert_eq!(NumaAffinity::from_bits(0b1).to_string(), "01");
/// assert_eq!(affinity.to_mask_string(5), "00110");
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct NumaAffinity {
    bits: u64,
}

impl NumaAffinity {
    /// Creates an affinity from its raw bitmask.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self { bits }
    }

    /// Creates an affinity that includes exactly the given nodes.
    ///
    /// # Errors
    ///
    /// Returns [`MaskError::NodeOutOfRange`] if a node index does not fit in the mask.
    pub fn from_nodes(nodes: impl IntoIterator<Item = NumaNodeId>) -> Result<Self, MaskError> {
        nodes.into_iter().try_fold(Self::default(), |acc, node| {
            let bit = 1_u64
                .checked_shl(node)
                .ok_or(MaskError::NodeOutOfRange { node })?;

            Ok(Self {
                bits: acc.bits | bit,
            })
        })
    }

    /// The raw bitmask.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.bits
    }

    /// Whether `node` is included.
    #[must_use]
    pub fn contains(self, node: NumaNodeId) -> bool {
        1_u64
            .checked_shl(node)
            .is_some_and(|bit| self.bits & bit != 0)
    }

    /// The number of included nodes.
    #[must_use]
    pub const fn count(self) -> u32 {
        self.bits.count_ones()
    }

    /// Whether no node is included.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    /// The minimal mask width that shows every included node (at least 1).
    #[must_use]
    pub const fn width(self) -> usize {
        if self.bits == 0 {
            1
        } else {
            (u64::BITS - self.bits.leading_zeros()) as usize
        }
    }

    /// Iterates over the included nodes in ascending order.
    pub fn nodes(self) -> impl Iterator<Item = NumaNodeId> {
        let mut remaining = self.bits;

        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }

            let node = remaining.trailing_zeros();
            // Clears the lowest set bit.
            remaining &= remaining.wrapping_sub(1);
            Some(node)
        })
    }

    /// Renders the mask with at least `width` positions, padding with `0` on the left.
    #[must_use]
    pub fn to_mask_string(self, width: usize) -> String {
        format!("{:0width$b}", self.bits)
    }
}

impl FromStr for NumaAffinity {
    type Err = MaskError;

    fn from_str(mask: &str) -> Result<Self, Self::Err> {
        if mask.is_empty() {
            return Err(MaskError::Empty);
        }

        let width = mask.chars().count();
        if width > MAX_NUMA_NODES {
            return Err(MaskError::TooWide {
                mask: mask.to_string(),
                width,
            });
        }

        let bits = mask.chars().try_fold(0_u64, |acc, c| {
            let bit = match c {
                '0' => 0,
                '1' => 1,
                character => {
                    return Err(MaskError::InvalidCharacter {
                        mask: mask.to_string(),
                        character,
                    });
                }
            };

            // Cannot overflow because the width was checked above.
            Ok((acc << 1) | bit)
        })?;

        Ok(Self { bits })
    }
}

impl Display for NumaAffinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_mask_string(self.width().max(DISPLAY_MIN_WIDTH)))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn right_most_character_is_node_zero() {
        assert_eq!("01".parse::<NumaAffinity>().unwrap().bits(), 0b01);
        assert_eq!("10".parse::<NumaAffinity>().unwrap().bits(), 0b10);
        assert_eq!("11".parse::<NumaAffinity>().unwrap().bits(), 0b11);
        assert_eq!("0001".parse::<NumaAffinity>().unwrap().bits(), 0b1);
    }

    #[test]
    fn from_nodes_matches_mask() {
        assert_eq!(
            NumaAffinity::from_nodes([0, 1]).unwrap(),
            "11".parse::<NumaAffinity>().unwrap()
        );
        assert_eq!(NumaAffinity::from_nodes([]).unwrap(), NumaAffinity::default());
        assert_eq!(
            NumaAffinity::from_nodes([64]).unwrap_err(),
            MaskError::NodeOutOfRange { node: 64 }
        );
        assert_eq!(NumaAffinity::from_nodes([63]).unwrap().bits(), 1 << 63);
    }

    #[test]
    fn node_queries() {
        let affinity = NumaAffinity::from_bits(0b1010);

        assert!(affinity.contains(1));
        assert!(affinity.contains(3));
        assert!(!affinity.contains(0));
        assert!(!affinity.contains(99));
        assert_eq!(affinity.count(), 2);
        assert_eq!(affinity.nodes().collect::<Vec<_>>(), vec![1, 3]);
        assert!(!affinity.is_empty());
        assert!(NumaAffinity::default().is_empty());
    }

    #[test]
    fn display_is_at_least_two_wide() {
        assert_eq!(NumaAffinity::from_bits(0b01).to_string(), "01");
        assert_eq!(NumaAffinity::from_bits(0b10).to_string(), "10");
        assert_eq!(NumaAffinity::from_bits(0b101).to_string(), "101");
        assert_eq!(NumaAffinity::default().to_string(), "00");
        assert_eq!(NumaAffinity::from_bits(0b01).to_mask_string(2), "01");
        assert_eq!(NumaAffinity::from_bits(0b111).to_mask_string(2), "111");
    }

    #[test]
    fn malformed_masks_are_rejected() {
        assert_eq!("".parse::<NumaAffinity>().unwrap_err(), MaskError::Empty);

        assert_eq!(
            "0x1".parse::<NumaAffinity>().unwrap_err(),
            MaskError::InvalidCharacter {
                mask: "0x1".to_string(),
                character: 'x',
            }
        );

        let too_wide = "1".repeat(MAX_NUMA_NODES + 1);
        assert!(matches!(
            too_wide.parse::<NumaAffinity>().unwrap_err(),
            MaskError::TooWide { width: 65, .. }
        ));

        let widest = "1".repeat(MAX_NUMA_NODES);
        assert_eq!(widest.parse::<NumaAffinity>().unwrap().bits(), u64::MAX);
    }
}
