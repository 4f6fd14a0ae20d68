#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Drives a CPU-pinning allocation engine with workload requests and reports how the resulting
//! CPU assignments map onto the physical cores of the machine.
//!
//! Two workloads that were each given "their own" CPUs may still end up on hardware threads of
//! the same physical core, competing for its execution units. This package detects that: every
//! allocation result is expanded to the physical cores it touches and a [`TenancyLedger`] records,
//! across the whole run, which tenants landed on which core. A core with more than one tenant is
//! *contended*.
//!
//! # Moving parts
//!
//! * [`CpuTopology`] maps CPUs to physical cores and their hardware-thread siblings. It is built
//!   once from a [`MachineInfo`] description (or a [`TopologyBuilder`] in tests).
//! * [`AllocationEngine`] is the external engine being audited. This package does not decide
//!   placement; [`ReplayEngine`] replays recorded decisions so the harness can run stand-alone.
//! * [`AllocationDriver`] feeds [`WorkloadRequest`]s to the engine one at a time, partitions each
//!   result with [`partition_by_core()`] and records tenancy.
//!
//! # Example
//!
//! ```
//! use cpu_tenancy::{TenancyLedger, TopologyBuilder, partition_by_core};
//! use cpuset::CpuSet;
//!
//! // Two physical cores with two hardware threads each.
//! let topology = TopologyBuilder::new()
//!     .core([0, 4])
//!     .core([1, 5])
//!     .build()
//!     .unwrap();
//!
//! let mut ledger = TenancyLedger::new();
//! ledger.seed("reserved", &CpuSet::from([0]), &topology).unwrap();
//!
//! let partition = partition_by_core(&CpuSet::from([4]), &topology).unwrap();
//! ledger.record_allocation("pod-a", &partition);
//!
//! let report = ledger.report();
//! assert_eq!(report.contended().count(), 1);
//! assert_eq!(report.to_string(), "00 -> [reserved pod-a] <---\n");
//! ```

mod commands;
mod discovery;
mod driver;
mod engine;
mod error;
mod harness_mode;
mod inputs;
mod machine_info;
mod pal;
mod primitive_types;
mod replay;
mod tenancy;
mod topology;
mod workload;

pub use commands::*;
pub use discovery::*;
pub use driver::*;
pub use engine::*;
pub use error::*;
pub use harness_mode::*;
pub use machine_info::*;
pub use primitive_types::*;
pub use replay::*;
pub use tenancy::*;
pub use topology::*;
pub use workload::*;
