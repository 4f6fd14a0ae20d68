use std::fmt::{self, Display};
use std::str::FromStr;

use cpuset::CpuSet;
use topology_hints::{HintsByResource, TopologyHint};

use crate::WorkloadRequest;

/// An engine that decides which CPUs a workload may run on.
///
/// The harness treats the engine as a black box: it hands over one request at a time and audits
/// the CPU set that comes back.
#[cfg_attr(test, mockall::automock)]
pub trait AllocationEngine {
    /// Assigns CPUs to the container named by `request`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError`] if the engine refuses or cannot serve the request.
    fn allocate(&mut self, request: &WorkloadRequest) -> Result<CpuSet, AllocationError>;

    /// The NUMA placement candidates the engine would offer for `request`, by resource.
    fn topology_hints(&self, request: &WorkloadRequest) -> HintsByResource;
}

/// The allocation policy an engine applies.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Policy {
    /// Guaranteed whole-CPU requests get CPUs for their exclusive use.
    #[default]
    Static,

    /// Every request is served from the shared pool.
    None,
}

impl Policy {
    /// The name of the policy as used on the command line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::None => "none",
        }
    }
}

impl FromStr for Policy {
    type Err = EngineSetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(Self::Static),
            "none" => Ok(Self::None),
            other => Err(EngineSetupError::UnknownPolicy {
                name: other.to_string(),
            }),
        }
    }
}

impl Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything needed to construct an allocation engine.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct EngineParams {
    /// The allocation policy.
    pub policy: Policy,

    /// The name of the topology manager policy the engine cooperates with.
    pub topology_policy: String,

    /// CPUs held back for the system. They are never assigned exclusively.
    pub reserved_cpus: CpuSet,

    /// The NUMA affinity the topology manager hands to the engine, if any.
    pub affinity: Option<TopologyHint>,
}

impl EngineParams {
    /// Creates parameters with no affinity and the `none` topology manager policy.
    #[must_use]
    pub fn new(policy: Policy, reserved_cpus: CpuSet) -> Self {
        Self {
            policy,
            topology_policy: "none".to_string(),
            reserved_cpus,
            affinity: None,
        }
    }

    /// Sets the topology manager policy and the affinity it hands out.
    #[must_use]
    pub fn with_topology_policy(
        mut self,
        name: impl Into<String>,
        affinity: Option<TopologyHint>,
    ) -> Self {
        self.topology_policy = name.into();
        self.affinity = affinity;
        self
    }
}

/// An allocation engine refused a request.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum AllocationError {
    /// The engine has no decision for this container.
    #[error("no allocation is recorded for container '{container}' of '{tenant}'")]
    NotRecorded {
        /// Tenant of the request.
        tenant: String,

        /// Container of the request.
        container: String,
    },

    /// The decision on record does not have the requested number of CPUs.
    #[error("'{tenant}' requested {requested} CPUs but the recorded allocation is [{recorded}]")]
    SizeMismatch {
        /// Tenant of the request.
        tenant: String,

        /// Number of CPUs requested.
        requested: usize,

        /// The recorded CPUs.
        recorded: CpuSet,
    },

    /// Some CPUs of the decision cannot be assigned exclusively.
    #[error("CPUs [{cpus}] cannot be assigned exclusively to '{tenant}'")]
    Unavailable {
        /// Tenant of the request.
        tenant: String,

        /// The CPUs that are unknown, reserved or already assigned.
        cpus: CpuSet,
    },

    /// Not enough CPUs remain for an exclusive assignment.
    #[error("'{tenant}' requested {requested} CPUs but only {available} are available")]
    Insufficient {
        /// Tenant of the request.
        tenant: String,

        /// Number of CPUs requested.
        requested: usize,

        /// Number of CPUs that can still be assigned exclusively.
        available: usize,
    },
}

/// An allocation engine could not be constructed.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum EngineSetupError {
    /// The policy name is not known.
    #[error("unknown CPU manager policy '{name}', expected 'static' or 'none'")]
    UnknownPolicy {
        /// The unrecognized name.
        name: String,
    },

    /// The static policy needs at least one reserved CPU.
    #[error("the static policy requires at least one reserved CPU")]
    NoReservedCpus,

    /// Reserved CPUs do not exist on the machine.
    #[error("reserved CPUs [{cpus}] are not part of the discovered topology")]
    ReservedOutsideTopology {
        /// The unknown CPUs.
        cpus: CpuSet,
    },
}
