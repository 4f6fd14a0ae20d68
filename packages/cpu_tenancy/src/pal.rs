// Platform abstraction layer for cpu_tenancy.
//
// Input files (machine descriptions, workload specs, recordings) are read through this layer so
// that loading logic can be tested against a mocked filesystem.

mod filesystem;

pub(crate) use filesystem::*;
