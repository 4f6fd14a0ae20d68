use std::collections::BTreeMap;

use cpuset::CpuSet;
use serde::Deserialize;
use topology_hints::HintsByResource;
use tracing::{debug, info, warn};

use crate::{
    AffinityStore, AllocationEngine, AllocationError, ContainerRuntime, CpuTopology,
    EngineParams, EngineSetupError, Policy, PodStatusProvider, SourcesReady, WorkloadRequest,
};

/// One allocation decision taken from a recording.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct RecordedAllocation {
    /// The tenant the decision was made for.
    pub tenant: String,

    /// The container the decision was made for. `None` matches every container of the tenant.
    pub container: Option<String>,

    /// The CPUs the engine assigned.
    pub cpus: CpuSet,

    /// The topology hints the engine offered.
    pub hints: HintsByResource,
}

impl RecordedAllocation {
    /// Creates a decision for every container of `tenant`, without hints.
    #[must_use]
    pub fn new(tenant: impl Into<String>, cpus: CpuSet) -> Self {
        Self {
            tenant: tenant.into(),
            container: None,
            cpus,
            hints: HintsByResource::new(),
        }
    }

    /// Restricts the decision to one container.
    #[must_use]
    pub fn for_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    /// Attaches the hints the engine offered.
    #[must_use]
    pub fn with_hints(mut self, hints: HintsByResource) -> Self {
        self.hints = hints;
        self
    }

    fn matches(&self, request: &WorkloadRequest) -> bool {
        self.tenant == request.tenant
            && self
                .container
                .as_ref()
                .is_none_or(|container| *container == request.container)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecordingDocument {
    #[serde(default)]
    policy: Option<String>,

    #[serde(default, rename = "allocation")]
    allocations: Vec<AllocationDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AllocationDocument {
    tenant: String,

    #[serde(default)]
    container: Option<String>,

    cpus: String,

    #[serde(default)]
    hints: Vec<String>,
}

/// Allocation decisions captured from an engine, to be replayed by a [`ReplayEngine`].
///
/// The TOML form lists one `[[allocation]]` table per decision:
///
/// ```toml
/// policy = "static"
///
/// [[allocation]]
/// tenant = "web-pod"
/// container = "web-cnt"
/// cpus = "2,6"
/// hints = ["cpu:[{01 true} {11 false}]"]
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Recording {
    policy: Option<Policy>,
    allocations: Vec<RecordedAllocation>,
}

impl Recording {
    /// Creates an empty recording.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a recording from its TOML form.
    ///
    /// # Errors
    ///
    /// Returns [`RecordingError`] if the document is malformed or contains an invalid CPU list,
    /// hint record or policy name.
    pub fn from_toml(text: &str) -> Result<Self, RecordingError> {
        let document: RecordingDocument = toml::from_str(text)?;

        let policy = document
            .policy
            .as_deref()
            .map(str::parse::<Policy>)
            .transpose()?;

        let allocations = document
            .allocations
            .into_iter()
            .enumerate()
            .map(|(index, allocation)| {
                let cpus = allocation
                    .cpus
                    .parse::<CpuSet>()
                    .map_err(|source| RecordingError::Cpus { index, source })?;
                let hints = topology_hints::parse_any(&allocation.hints)
                    .map_err(|source| RecordingError::Hints { index, source })?;

                Ok(RecordedAllocation {
                    tenant: allocation.tenant,
                    container: allocation.container,
                    cpus,
                    hints,
                })
            })
            .collect::<Result<Vec<_>, RecordingError>>()?;

        Ok(Self {
            policy,
            allocations,
        })
    }

    /// Adds a decision. Earlier decisions take precedence over later ones for the same container.
    #[must_use]
    pub fn with_allocation(mut self, allocation: RecordedAllocation) -> Self {
        self.allocations.push(allocation);
        self
    }

    /// The policy the decisions were recorded under, if the recording says.
    #[must_use]
    pub fn policy(&self) -> Option<Policy> {
        self.policy
    }

    /// The first decision that applies to `request`.
    #[must_use]
    pub fn find(&self, request: &WorkloadRequest) -> Option<&RecordedAllocation> {
        self.allocations
            .iter()
            .find(|allocation| allocation.matches(request))
    }

    /// The number of decisions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    /// Whether there are no decisions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

/// A recording could not be decoded.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RecordingError {
    /// The document is not valid TOML or does not have the expected shape.
    #[error(transparent)]
    Document(#[from] toml::de::Error),

    /// The policy name is not known.
    #[error(transparent)]
    Policy(#[from] EngineSetupError),

    /// An allocation has an invalid CPU list.
    #[error("allocation #{index} has an invalid CPU list")]
    Cpus {
        /// Position of the allocation in the recording.
        index: usize,

        /// The parse failure.
        #[source]
        source: cpuset::Error,
    },

    /// An allocation has an invalid hint record.
    #[error("allocation #{index} has invalid hints")]
    Hints {
        /// Position of the allocation in the recording.
        index: usize,

        /// The parse failure.
        #[source]
        source: topology_hints::Error,
    },
}

/// An [`AllocationEngine`] that replays recorded decisions instead of making its own.
///
/// The bookkeeping follows the static CPU manager policy of the kubelet:
///
/// * Requests that do not qualify for exclusive CPUs (see [`WorkloadRequest::exclusive_cpus()`])
///   get the shared pool, which is every CPU of the machine minus the CPUs assigned exclusively so
///   far. Reserved CPUs stay in the shared pool.
/// * Requests that do qualify get their recorded CPUs, provided the recording matches the request
///   size and every recorded CPU is still assignable.
/// * A container that already holds an exclusive assignment gets the same assignment again.
///
/// Under [`Policy::None`], every request gets the shared pool.
#[derive(Debug)]
pub struct ReplayEngine {
    policy: Policy,
    reserved: CpuSet,
    all_cpus: CpuSet,
    topology: CpuTopology,
    recording: Recording,
    assignments: BTreeMap<(String, String), CpuSet>,
    affinity: Box<dyn AffinityStore>,
}

impl ReplayEngine {
    /// Creates an engine that replays `recording` on `topology`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineSetupError`] if a reserved CPU is not part of `topology` or the static
    /// policy is used without reserved CPUs.
    pub fn new(
        params: &EngineParams,
        topology: &CpuTopology,
        recording: Recording,
        affinity: Box<dyn AffinityStore>,
    ) -> Result<Self, EngineSetupError> {
        let all_cpus = topology.cpus();

        let unknown = params.reserved_cpus.difference(&all_cpus);
        if !unknown.is_empty() {
            return Err(EngineSetupError::ReservedOutsideTopology { cpus: unknown });
        }

        if params.policy == Policy::Static && params.reserved_cpus.is_empty() {
            return Err(EngineSetupError::NoReservedCpus);
        }

        if let Some(recorded) = recording.policy() {
            if recorded != params.policy {
                warn!(
                    recorded = %recorded,
                    replaying = %params.policy,
                    "recording was made under a different policy"
                );
            }
        }

        info!(
            policy = %params.policy,
            reserved = %params.reserved_cpus,
            recorded = recording.len(),
            "replay engine created"
        );

        Ok(Self {
            policy: params.policy,
            reserved: params.reserved_cpus.clone(),
            all_cpus,
            topology: topology.clone(),
            recording,
            assignments: BTreeMap::new(),
            affinity,
        })
    }

    /// Runs one reconciliation pass, pushing exclusive assignments to the containers that are
    /// running. Returns the number of containers updated.
    ///
    /// Nothing happens until all configuration sources are ready.
    pub fn start(
        &self,
        pod_status: &dyn PodStatusProvider,
        runtime: &dyn ContainerRuntime,
        sources_ready: &dyn SourcesReady,
    ) -> usize {
        sources_ready.add_source("replay");

        if !sources_ready.all_ready() {
            debug!("configuration sources not ready, skipping reconciliation");
            return 0;
        }

        let mut updated = 0_usize;

        for ((tenant, container), cpus) in &self.assignments {
            let Some(status) = pod_status.pod_status(tenant) else {
                continue;
            };

            if !status.running_containers.contains(container) {
                continue;
            }

            match runtime.update_container_cpus(tenant, container, cpus) {
                Ok(()) => updated = updated.saturating_add(1),
                Err(problem) => warn!(
                    tenant = %tenant,
                    container = %container,
                    %problem,
                    "container update failed"
                ),
            }
        }

        updated
    }

    /// CPUs not exclusively assigned to any container, including the reserved CPUs.
    #[must_use]
    pub fn shared_pool(&self) -> CpuSet {
        self.assignments
            .values()
            .fold(self.all_cpus.clone(), |pool, assigned| {
                pool.difference(assigned)
            })
    }

    /// CPUs that can still be assigned exclusively.
    #[must_use]
    pub fn assignable(&self) -> CpuSet {
        self.shared_pool().difference(&self.reserved)
    }

    /// The exclusive assignment held by `container` of `tenant`.
    #[must_use]
    pub fn assignment(&self, tenant: &str, container: &str) -> Option<&CpuSet> {
        self.assignments
            .get(&(tenant.to_string(), container.to_string()))
    }

    fn allocate_exclusive(
        &self,
        request: &WorkloadRequest,
        count: usize,
    ) -> Result<CpuSet, AllocationError> {
        let recorded = self
            .recording
            .find(request)
            .ok_or_else(|| AllocationError::NotRecorded {
                tenant: request.tenant.clone(),
                container: request.container.clone(),
            })?;

        let assignable = self.assignable();

        if count > assignable.len() {
            return Err(AllocationError::Insufficient {
                tenant: request.tenant.clone(),
                requested: count,
                available: assignable.len(),
            });
        }

        if recorded.cpus.len() != count {
            return Err(AllocationError::SizeMismatch {
                tenant: request.tenant.clone(),
                requested: count,
                recorded: recorded.cpus.clone(),
            });
        }

        let unavailable = recorded.cpus.difference(&assignable);
        if !unavailable.is_empty() {
            return Err(AllocationError::Unavailable {
                tenant: request.tenant.clone(),
                cpus: unavailable,
            });
        }

        Ok(recorded.cpus.clone())
    }

    /// Warns if `cpus` reach outside the NUMA nodes the topology manager picked.
    fn audit_affinity(&self, request: &WorkloadRequest, cpus: &CpuSet) {
        if self.affinity.policy_name() == "none" {
            return;
        }

        let hint = self
            .affinity
            .affinity(&request.tenant, &request.container);
        if hint.affinity.is_empty() {
            return;
        }

        let outside: CpuSet = cpus
            .iter()
            .filter(|cpu| {
                self.topology
                    .numa_node_of(*cpu)
                    .is_none_or(|node| !hint.affinity.contains(node))
            })
            .collect();

        if !outside.is_empty() {
            warn!(
                tenant = request.tenant.as_str(),
                container = request.container.as_str(),
                %outside,
                %hint,
                "CPUs fall outside the topology manager affinity"
            );
        }
    }
}

impl AllocationEngine for ReplayEngine {
    fn allocate(&mut self, request: &WorkloadRequest) -> Result<CpuSet, AllocationError> {
        let exclusive = match self.policy {
            Policy::Static => request.exclusive_cpus(),
            Policy::None => None,
        };

        let Some(count) = exclusive else {
            debug!(request = %request, "serving request from the shared pool");
            return Ok(self.shared_pool());
        };

        if let Some(existing) = self.assignment(&request.tenant, &request.container) {
            debug!(request = %request, cpus = %existing, "container already has an assignment");
            return Ok(existing.clone());
        }

        let cpus = self.allocate_exclusive(request, count)?;
        self.audit_affinity(request, &cpus);

        self.assignments.insert(
            (request.tenant.clone(), request.container.clone()),
            cpus.clone(),
        );

        Ok(cpus)
    }

    fn topology_hints(&self, request: &WorkloadRequest) -> HintsByResource {
        self.recording
            .find(request)
            .map(|recorded| recorded.hints.clone())
            .unwrap_or_default()
    }
}
