use std::collections::{BTreeMap, BTreeSet};

use cpuset::CpuSet;
use topology_hints::NumaAffinity;

use crate::{CoreId, CpuId, DiscoveryError, NumaNodeId, SocketId};

/// Where a single CPU sits in the machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Placement {
    core: CoreId,
    socket: SocketId,
    numa_node: NumaNodeId,
}

/// An immutable map from CPUs to the physical cores that host them.
///
/// Each physical core is identified by a [`CoreId`] and owns a set of hardware threads (its
/// *siblings*), each visible to the operating system as one CPU. The topology also knows the socket
/// and NUMA node of every CPU.
///
/// Build one from a machine description via [`TopologyDiscovery`][crate::TopologyDiscovery] or
/// directly with a [`TopologyBuilder`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CpuTopology {
    cpus: BTreeMap<CpuId, Placement>,
    cores: BTreeMap<CoreId, CpuSet>,
}

impl CpuTopology {
    /// Resolves the physical core of `cpu`, returning the core ID and the full set of hardware
    /// threads on that core (including `cpu` itself).
    ///
    /// # Errors
    ///
    /// Returns [`TopologyLookupError`] if `cpu` is not part of this topology.
    pub fn core_of(&self, cpu: CpuId) -> Result<(CoreId, &CpuSet), TopologyLookupError> {
        let core = self
            .cpus
            .get(&cpu)
            .map(|placement| placement.core)
            .ok_or(TopologyLookupError { cpu })?;

        let siblings = self
            .cores
            .get(&core)
            .ok_or(TopologyLookupError { cpu })?;

        Ok((core, siblings))
    }

    /// All CPUs of the machine.
    #[must_use]
    pub fn cpus(&self) -> CpuSet {
        self.cpus.keys().copied().collect()
    }

    /// The number of CPUs (hardware threads) of the machine.
    #[must_use]
    pub fn cpu_count(&self) -> usize {
        self.cpus.len()
    }

    /// The number of physical cores of the machine.
    #[must_use]
    pub fn core_count(&self) -> usize {
        self.cores.len()
    }

    /// Iterates over `(core, siblings)` pairs in ascending core order.
    pub fn cores(&self) -> impl Iterator<Item = (CoreId, &CpuSet)> {
        self.cores.iter().map(|(core, siblings)| (*core, siblings))
    }

    /// The hardware threads of `core`, if such a core exists.
    #[must_use]
    pub fn siblings(&self, core: CoreId) -> Option<&CpuSet> {
        self.cores.get(&core)
    }

    /// The socket that hosts `cpu`, if `cpu` is part of the topology.
    #[must_use]
    pub fn socket_of(&self, cpu: CpuId) -> Option<SocketId> {
        self.cpus.get(&cpu).map(|placement| placement.socket)
    }

    /// The NUMA node that hosts `cpu`, if `cpu` is part of the topology.
    #[must_use]
    pub fn numa_node_of(&self, cpu: CpuId) -> Option<NumaNodeId> {
        self.cpus.get(&cpu).map(|placement| placement.numa_node)
    }

    /// The NUMA nodes that host at least one CPU, in ascending order.
    #[must_use]
    pub fn numa_nodes(&self) -> BTreeSet<NumaNodeId> {
        self.cpus
            .values()
            .map(|placement| placement.numa_node)
            .collect()
    }

    /// The sockets that host at least one CPU, in ascending order.
    #[must_use]
    pub fn sockets(&self) -> BTreeSet<SocketId> {
        self.cpus.values().map(|placement| placement.socket).collect()
    }

    /// The CPUs in NUMA node `node`. Empty if the node is unknown.
    #[must_use]
    pub fn cpus_in_numa_node(&self, node: NumaNodeId) -> CpuSet {
        self.cpus
            .iter()
            .filter(|(_, placement)| placement.numa_node == node)
            .map(|(cpu, _)| *cpu)
            .collect()
    }
}

/// A CPU was looked up that the topology does not contain.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("CPU {cpu} is not part of the discovered topology")]
pub struct TopologyLookupError {
    /// The CPU that could not be resolved.
    pub cpu: CpuId,
}

#[derive(Clone, Debug)]
struct CoreSpec {
    socket: SocketId,
    numa_node: NumaNodeId,
    threads: Vec<CpuId>,
}

/// Assembles a [`CpuTopology`] core by core.
///
/// The ID of each core is the smallest CPU ID among its hardware threads.
///
/// # Example
///
/// ```
/// use cpu_tenancy::TopologyBuilder;
///
/// // One socket, two cores, two hardware threads per core.
/// let topology = TopologyBuilder::new()
///     .core([0, 2])
///     .core([1, 3])
///     .build()
///     .unwrap();
///
/// assert_eq!(topology.core_count(), 2);
/// assert_eq!(topology.core_of(3).unwrap().0, 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct TopologyBuilder {
    cores: Vec<CoreSpec>,
}

impl TopologyBuilder {
    /// Creates a builder with no cores.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for a symmetric machine, numbering CPUs the way Linux usually does:
    /// the first hardware thread of every core comes first, then the second thread of every core,
    /// and so on. Each socket is its own NUMA node.
    ///
    /// For example, 2 sockets with 2 cores each and 2 threads per core yields the cores
    /// `{0,4}`, `{1,5}` (socket 0) and `{2,6}`, `{3,7}` (socket 1).
    #[must_use]
    pub fn symmetric(sockets: u32, cores_per_socket: u32, threads_per_core: u32) -> Self {
        let total_cores = sockets.saturating_mul(cores_per_socket);

        let mut builder = Self::new();

        for socket in 0..sockets {
            for core_in_socket in 0..cores_per_socket {
                let core_index = socket
                    .saturating_mul(cores_per_socket)
                    .saturating_add(core_in_socket);
                let threads = (0..threads_per_core)
                    .map(|thread| core_index.saturating_add(thread.saturating_mul(total_cores)));

                builder = builder.core_in(socket, socket, threads);
            }
        }

        builder
    }

    /// Adds a core on socket 0, NUMA node 0.
    #[must_use]
    pub fn core(self, threads: impl IntoIterator<Item = CpuId>) -> Self {
        self.core_in(0, 0, threads)
    }

    /// Adds a core on the given socket and NUMA node.
    #[must_use]
    pub fn core_in(
        mut self,
        socket: SocketId,
        numa_node: NumaNodeId,
        threads: impl IntoIterator<Item = CpuId>,
    ) -> Self {
        self.cores.push(CoreSpec {
            socket,
            numa_node,
            threads: threads.into_iter().collect(),
        });
        self
    }

    /// Validates the configured cores and builds the topology.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] if no cores were added, a core has no hardware threads, a CPU is
    /// listed more than once or a NUMA node ID cannot be represented in a topology hint.
    pub fn build(self) -> Result<CpuTopology, DiscoveryError> {
        if self.cores.is_empty() {
            return Err(DiscoveryError::EmptyTopology);
        }

        let mut cpus = BTreeMap::new();
        let mut cores = BTreeMap::new();

        for spec in self.cores {
            if NumaAffinity::from_nodes([spec.numa_node]).is_err() {
                return Err(DiscoveryError::NumaNodeOutOfRange {
                    numa_node: spec.numa_node,
                });
            }

            let Some(core) = spec.threads.iter().min().copied() else {
                return Err(DiscoveryError::EmptyCore {
                    socket: spec.socket,
                    numa_node: spec.numa_node,
                });
            };

            for cpu in &spec.threads {
                let placement = Placement {
                    core,
                    socket: spec.socket,
                    numa_node: spec.numa_node,
                };

                if cpus.insert(*cpu, placement).is_some() {
                    return Err(DiscoveryError::DuplicateCpu { cpu: *cpu });
                }
            }

            cores.insert(core, spec.threads.into_iter().collect::<CpuSet>());
        }

        Ok(CpuTopology { cpus, cores })
    }
}
