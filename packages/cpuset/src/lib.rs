#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Immutable sets of logical processor IDs, together with parsing and emitting of the compact
//! list syntax used by Linux and Kubernetes tooling to describe them.
//!
//! Example list string: `0-3,8,10-11`
//!
//! # Format
//!
//! The value is a comma-separated list of zero or more items, where each item is either:
//!
//! * a single non-negative integer (e.g. `1`)
//! * an inclusive range of integers (e.g. `2-4`), where the start must not exceed the end
//!
//! Whitespace around items is ignored. An empty (or whitespace-only) string is the empty set.
//! Duplicate IDs across items are allowed and collapse into one.
//!
//! The IDs in the list are of size `u32` and may not exceed [`MAX_CPU_ID`].
//!
//! # Example
//!
//! ```
//! use cpuset::CpuSet;
//!
//! let reserved: CpuSet = "0-3, 8".parse().unwrap();
//! assert_eq!(reserved.to_vec(), vec![0, 1, 2, 3, 8]);
//!
//! let spare = CpuSet::from_iter([4, 5, 6, 7]);
//! let all = reserved.union(&spare);
//!
//! assert_eq!(all.to_string(), "0-8");
//! assert_eq!(all.difference(&reserved), spare);
//! ```
//!
//! The free functions [`parse()`] and [`emit()`] operate on plain ID sequences when a
//! [`CpuSet`] is not needed.

mod cpu_set;
mod emit;
mod error;
mod parse;

pub use cpu_set::*;
pub use emit::*;
pub use error::*;
pub use parse::*;

/// Identifies one logical processor (hardware thread).
pub type CpuId = u32;

/// The largest CPU ID accepted when parsing a CPU list. Matches the largest `NR_CPUS` the Linux
/// kernel can be configured with.
pub const MAX_CPU_ID: CpuId = 8191;
