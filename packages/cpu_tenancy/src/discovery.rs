use tracing::{debug, warn};

use crate::{CpuId, CpuTopology, MachineInfo, NumaNodeId, SocketId, TopologyBuilder};

/// Produces a [`CpuTopology`] from some description of the machine.
pub trait TopologyDiscovery {
    /// Discovers the topology.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] if the description is not a consistent topology.
    fn discover(&self) -> Result<CpuTopology, DiscoveryError>;
}

impl TopologyDiscovery for MachineInfo {
    fn discover(&self) -> Result<CpuTopology, DiscoveryError> {
        let mut builder = TopologyBuilder::new();

        for node in &self.topology {
            for core in &node.cores {
                builder = builder.core_in(
                    core.socket_id,
                    node.node_id,
                    core.thread_ids.iter().copied(),
                );
            }
        }

        let topology = builder.build()?;

        // The counts are informational in the description; the core lists are authoritative.
        let reported = usize::try_from(self.num_cores).ok();
        if self.num_cores != 0 && reported != Some(topology.cpu_count()) {
            warn!(
                reported = self.num_cores,
                discovered = topology.cpu_count(),
                "machine description reports a different number of CPUs than it lists"
            );
        }

        debug!(
            cpus = topology.cpu_count(),
            cores = topology.core_count(),
            sockets = topology.sockets().len(),
            numa_nodes = topology.numa_nodes().len(),
            "discovered CPU topology"
        );

        Ok(topology)
    }
}

/// The machine description does not form a consistent CPU topology.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// No cores were described at all.
    #[error("the machine description contains no CPU cores")]
    EmptyTopology,

    /// A core lists no hardware threads.
    #[error("a core on socket {socket} in NUMA node {numa_node} lists no hardware threads")]
    EmptyCore {
        /// Socket of the empty core.
        socket: SocketId,

        /// NUMA node of the empty core.
        numa_node: NumaNodeId,
    },

    /// The same CPU is listed more than once.
    #[error("CPU {cpu} is listed more than once")]
    DuplicateCpu {
        /// The repeated CPU.
        cpu: CpuId,
    },

    /// A NUMA node ID too large to appear in a NUMA affinity mask.
    #[error("NUMA node {numa_node} is beyond the supported range")]
    NumaNodeOutOfRange {
        /// The offending NUMA node ID.
        numa_node: NumaNodeId,
    },
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use cpuset::CpuSet;
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(DiscoveryError: Send, Sync, std::error::Error);

    #[test]
    fn per_socket_core_ids_do_not_collide() {
        // Both sockets number their cores from zero, as Linux reports them.
        let info = MachineInfo::from_json(
            r#"{
                "num_cores": 8,
                "topology": [
                    {"node_id": 0, "cores": [
                        {"core_id": 0, "thread_ids": [0, 4], "socket_id": 0},
                        {"core_id": 1, "thread_ids": [1, 5], "socket_id": 0}
                    ]},
                    {"node_id": 1, "cores": [
                        {"core_id": 0, "thread_ids": [2, 6], "socket_id": 1},
                        {"core_id": 1, "thread_ids": [3, 7], "socket_id": 1}
                    ]}
                ]
            }"#,
        )
        .unwrap();

        let topology = info.discover().unwrap();

        assert_eq!(topology.core_count(), 4);
        assert_eq!(topology.core_of(6).unwrap(), (2, &CpuSet::from([2, 6])));
        assert_eq!(topology.socket_of(7), Some(1));
        assert_eq!(topology.numa_node_of(7), Some(1));
    }

    #[test]
    fn empty_description_fails() {
        let info = MachineInfo::from_json(r#"{"topology": []}"#).unwrap();

        assert!(matches!(info.discover(), Err(DiscoveryError::EmptyTopology)));
    }

    #[test]
    fn core_without_threads_fails() {
        let info = MachineInfo::from_json(
            r#"{"topology": [{"node_id": 0, "cores": [{"core_id": 0, "thread_ids": []}]}]}"#,
        )
        .unwrap();

        assert!(matches!(
            info.discover(),
            Err(DiscoveryError::EmptyCore { numa_node: 0, .. })
        ));
    }

    #[test]
    fn duplicate_thread_fails() {
        let info = MachineInfo::from_json(
            r#"{"topology": [{"node_id": 0, "cores": [
                {"core_id": 0, "thread_ids": [0, 1]},
                {"core_id": 1, "thread_ids": [1, 2]}
            ]}]}"#,
        )
        .unwrap();

        assert!(matches!(
            info.discover(),
            Err(DiscoveryError::DuplicateCpu { cpu: 1 })
        ));
    }

    #[test]
    fn mismatched_count_is_tolerated() {
        let info = MachineInfo::from_json(
            r#"{"num_cores": 64, "topology": [{"node_id": 0, "cores": [{"core_id": 0, "thread_ids": [0]}]}]}"#,
        )
        .unwrap();

        assert_eq!(info.discover().unwrap().cpu_count(), 1);
    }
}
