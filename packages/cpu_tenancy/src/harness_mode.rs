//! Collaborators an allocation engine expects from a running node agent, in the form used by a
//! single-shot harness run where no real workloads exist.
//!
//! An engine that reconciles its decisions against running containers needs to ask for the status
//! of tenants, push CPU sets to a container runtime and wait for its configuration sources to be
//! ready. The single-shot implementations here answer every question with "nothing to do", which
//! keeps the engine from ever reconciling: the harness only wants allocation decisions.

use std::fmt::Debug;

use cpuset::CpuSet;
use topology_hints::{HintsByResource, TopologyHint};
use tracing::trace;

/// What the node agent knows about a running tenant.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct TenantStatus {
    /// Containers of the tenant that are currently running.
    pub running_containers: Vec<String>,
}

/// Looks up the status of running tenants.
pub trait PodStatusProvider: Debug {
    /// The status of `tenant`, if the tenant is known to be running.
    fn pod_status(&self, tenant: &str) -> Option<TenantStatus>;
}

/// Applies CPU sets to running containers.
pub trait ContainerRuntime: Debug {
    /// Restricts `container` of `tenant` to `cpus`.
    ///
    /// # Errors
    ///
    /// Returns a description of the failure if the runtime rejects the update.
    fn update_container_cpus(
        &self,
        tenant: &str,
        container: &str,
        cpus: &CpuSet,
    ) -> Result<(), String>;
}

/// Tells whether all configuration sources of the node agent have been seen.
pub trait SourcesReady: Debug {
    /// Registers a configuration source.
    fn add_source(&self, source: &str);

    /// Whether every registered source has delivered its configuration.
    fn all_ready(&self) -> bool;
}

/// Gives out the NUMA affinity the topology manager decided on for a container.
pub trait AffinityStore: Debug {
    /// The affinity for `container` of `tenant`.
    fn affinity(&self, tenant: &str, container: &str) -> TopologyHint;

    /// The name of the topology manager policy in effect.
    fn policy_name(&self) -> &str;

    /// Merges the hints of several resource providers into one affinity, returning it together
    /// with whether the policy admits a workload with that affinity.
    fn merge(&self, providers: &[HintsByResource]) -> (TopologyHint, bool);
}

/// A [`PodStatusProvider`] that never knows any tenant.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRunningTenants;

impl PodStatusProvider for NoRunningTenants {
    fn pod_status(&self, tenant: &str) -> Option<TenantStatus> {
        trace!(tenant, "pod status requested in single-shot mode");
        None
    }
}

/// A [`ContainerRuntime`] that accepts every update and does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRuntime;

impl ContainerRuntime for NoopRuntime {
    fn update_container_cpus(
        &self,
        tenant: &str,
        container: &str,
        cpus: &CpuSet,
    ) -> Result<(), String> {
        trace!(tenant, container, %cpus, "container update ignored in single-shot mode");
        Ok(())
    }
}

/// A [`SourcesReady`] that never becomes ready.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverReady;

impl SourcesReady for NeverReady {
    fn add_source(&self, source: &str) {
        trace!(source, "source registered in single-shot mode");
    }

    fn all_ready(&self) -> bool {
        false
    }
}

/// An [`AffinityStore`] that gives every container the same configured affinity.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FixedAffinity {
    policy_name: String,
    hint: TopologyHint,
}

impl FixedAffinity {
    /// Creates a store that answers with `hint` under the named topology manager policy.
    #[must_use]
    pub fn new(policy_name: impl Into<String>, hint: TopologyHint) -> Self {
        Self {
            policy_name: policy_name.into(),
            hint,
        }
    }
}

impl AffinityStore for FixedAffinity {
    fn affinity(&self, _tenant: &str, _container: &str) -> TopologyHint {
        self.hint
    }

    fn policy_name(&self) -> &str {
        &self.policy_name
    }

    fn merge(&self, providers: &[HintsByResource]) -> (TopologyHint, bool) {
        trace!(
            providers = providers.len(),
            "hint merge refused in single-shot mode"
        );
        (TopologyHint::default(), false)
    }
}

/// The collaborators of a single-shot harness run, bundled.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct SingleShotMode {
    /// Tenant status lookups always miss.
    pub pod_status: NoRunningTenants,

    /// Container updates are accepted and ignored.
    pub runtime: NoopRuntime,

    /// Configuration sources are never ready.
    pub sources_ready: NeverReady,

    /// Every container gets the same affinity.
    pub affinity: FixedAffinity,
}

impl SingleShotMode {
    /// Creates the collaborators, with `hint` as the affinity of every container.
    #[must_use]
    pub fn new(topology_policy: impl Into<String>, hint: TopologyHint) -> Self {
        Self {
            pod_status: NoRunningTenants,
            runtime: NoopRuntime,
            sources_ready: NeverReady,
            affinity: FixedAffinity::new(topology_policy, hint),
        }
    }
}
