pub use cpuset::CpuId;
pub use topology_hints::NumaNodeId;

/// Identifies a physical processor core.
///
/// A core ID is the smallest CPU ID among the hardware threads of the core, which keeps core IDs
/// unique across sockets even when the machine description numbers cores per socket.
pub type CoreId = u32;

/// Identifies a processor socket (package).
pub type SocketId = u32;
