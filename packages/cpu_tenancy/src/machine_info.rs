use serde::Deserialize;

use crate::{CpuId, NumaNodeId, SocketId};

/// A machine description in the shape published by cAdvisor's `/api/v*/machine` endpoint.
///
/// Only the fields needed for topology discovery are modeled. Unknown fields are ignored, so a
/// complete cAdvisor document can be used as-is.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[non_exhaustive]
pub struct MachineInfo {
    /// Number of logical CPUs the machine reports.
    #[serde(default)]
    pub num_cores: u32,

    /// Number of physical cores the machine reports.
    #[serde(default)]
    pub num_physical_cores: u32,

    /// Number of processor sockets the machine reports.
    #[serde(default)]
    pub num_sockets: u32,

    /// NUMA nodes with the cores they contain.
    #[serde(default)]
    pub topology: Vec<NodeInfo>,
}

/// One NUMA node of a [`MachineInfo`].
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[non_exhaustive]
pub struct NodeInfo {
    /// The NUMA node ID.
    pub node_id: NumaNodeId,

    /// Physical cores in this NUMA node.
    #[serde(default)]
    pub cores: Vec<CoreInfo>,
}

/// One physical core of a [`NodeInfo`].
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[non_exhaustive]
pub struct CoreInfo {
    /// Core ID as numbered by the operating system. This is often only unique within a socket.
    pub core_id: u32,

    /// The logical CPUs (hardware threads) of this core.
    #[serde(default)]
    pub thread_ids: Vec<CpuId>,

    /// The socket that hosts this core.
    #[serde(default)]
    pub socket_id: SocketId,
}

impl MachineInfo {
    /// Decodes a machine description from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the document is not valid JSON or does not have the
    /// expected shape.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn decodes_cadvisor_document() {
        let json = r#"{
            "num_cores": 4,
            "num_physical_cores": 2,
            "num_sockets": 1,
            "cpu_frequency_khz": 2400000,
            "memory_capacity": 16777216,
            "topology": [{
                "node_id": 0,
                "memory": 16777216,
                "cores": [
                    {"core_id": 0, "thread_ids": [0, 2], "caches": [], "socket_id": 0},
                    {"core_id": 1, "thread_ids": [1, 3], "caches": [], "socket_id": 0}
                ],
                "caches": []
            }]
        }"#;

        let info = MachineInfo::from_json(json).unwrap();

        assert_eq!(info.num_cores, 4);
        assert_eq!(info.num_sockets, 1);
        assert_eq!(info.topology.len(), 1);
        assert_eq!(info.topology[0].cores[1].thread_ids, vec![1, 3]);
    }

    #[test]
    fn missing_optional_fields_default() {
        let info = MachineInfo::from_json(r#"{"topology":[{"node_id":1}]}"#).unwrap();

        assert_eq!(info.num_cores, 0);
        assert_eq!(info.topology[0].node_id, 1);
        assert!(info.topology[0].cores.is_empty());
    }

    #[test]
    fn wrong_shape_is_rejected() {
        MachineInfo::from_json(r#"{"topology":{"node_id":0}}"#).unwrap_err();
        MachineInfo::from_json("not json").unwrap_err();
    }
}
