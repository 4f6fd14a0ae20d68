//! Tests of the allocation driver against a scripted engine, checking the tenancy guarantees
//! that hold for any engine.

use std::collections::VecDeque;

use cpu_tenancy::{
    AllocationDriver, AllocationEngine, AllocationError, CpuId, CpuQuantity, CpuTopology,
    TopologyBuilder, WorkloadRequest, partition_by_core,
};
use cpuset::CpuSet;
use topology_hints::HintsByResource;

/// Answers each request with the next scripted result.
#[derive(Debug, Default)]
struct ScriptedEngine {
    script: VecDeque<Result<CpuSet, AllocationError>>,
}

impl ScriptedEngine {
    fn new(script: impl IntoIterator<Item = Result<CpuSet, AllocationError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl AllocationEngine for ScriptedEngine {
    fn allocate(&mut self, _request: &WorkloadRequest) -> Result<CpuSet, AllocationError> {
        self.script.pop_front().expect("script ran out of results")
    }

    fn topology_hints(&self, _request: &WorkloadRequest) -> HintsByResource {
        HintsByResource::default()
    }
}

fn machine() -> CpuTopology {
    TopologyBuilder::symmetric(2, 2, 2).build().unwrap()
}

fn request(tenant: &str) -> WorkloadRequest {
    WorkloadRequest::new(
        tenant,
        "app",
        CpuQuantity::from_cpus(1),
        CpuQuantity::from_cpus(1),
    )
}

fn refusal(tenant: &str) -> AllocationError {
    AllocationError::NotRecorded {
        tenant: tenant.to_string(),
        container: "app".to_string(),
    }
}

#[test]
fn partition_covers_every_allocated_cpu_exactly_once() {
    let topology = machine();
    let cpus = CpuSet::from([0, 2, 4, 7]);

    let partition = partition_by_core(&cpus, &topology).unwrap();

    let mut seen: Vec<CpuId> = Vec::new();
    for (core, siblings) in &partition {
        assert_eq!(topology.siblings(*core), Some(siblings));
        seen.extend(siblings.intersection(&cpus).iter());
    }
    seen.sort_unstable();

    assert_eq!(seen, cpus.to_vec());
}

#[test]
fn siblings_of_different_tenants_contend() {
    let topology = machine();
    // Linux numbering: CPU n and n + 4 are the two threads of one core.
    let engine = ScriptedEngine::new([Ok(CpuSet::from([1])), Ok(CpuSet::from([5]))]);

    let mut driver = AllocationDriver::new(engine, &topology);
    driver.process(&request("a"));
    driver.process(&request("b"));

    let report = driver.ledger().report();
    let contended: Vec<_> = report.contended().collect();
    assert_eq!(contended.len(), 1);
    assert_eq!(contended[0].core, 1);
    assert_eq!(contended[0].tenants, ["a", "b"]);
}

#[test]
fn disjoint_cores_do_not_contend() {
    let topology = machine();
    let engine = ScriptedEngine::new([Ok(CpuSet::from([1, 5])), Ok(CpuSet::from([2, 6]))]);

    let mut driver = AllocationDriver::new(engine, &topology);
    driver.process(&request("a"));
    driver.process(&request("b"));

    assert_eq!(driver.ledger().report().contended().count(), 0);
    assert_eq!(driver.ledger().len(), 2);
}

#[test]
fn refusals_leave_no_trace_and_later_requests_proceed() {
    let topology = machine();
    let engine = ScriptedEngine::new([
        Err(refusal("a")),
        Ok(CpuSet::from([3])),
        Err(refusal("c")),
        Ok(CpuSet::from([7])),
    ]);

    let mut driver = AllocationDriver::new(engine, &topology);
    let requests = [request("a"), request("b"), request("c"), request("d")];
    let mut out = Vec::new();

    let summary = driver.run(&requests, &mut out).unwrap();

    assert_eq!(summary.allocated, 2);
    assert_eq!(summary.failed, 2);
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "b: 3 -> [ 3=[3,7] ]\nd: 7 -> [ 3=[3,7] ]\n"
    );
    assert_eq!(driver.ledger().report().to_string(), "03 -> [b d] <---\n");
}

#[test]
fn same_tenant_twice_on_one_core_counts_as_contention() {
    let topology = machine();
    let engine = ScriptedEngine::new([Ok(CpuSet::from([0])), Ok(CpuSet::from([4]))]);

    let mut driver = AllocationDriver::new(engine, &topology);
    driver.process(&request("a"));
    driver.process(&request("a"));

    let ledger = driver.into_ledger();
    assert_eq!(ledger.tenants(0).unwrap(), ["a", "a"]);
    assert!(ledger.is_contended(0));
}

#[test]
fn reserved_cpus_share_cores_with_workloads() {
    let topology = machine();
    let engine = ScriptedEngine::new([Ok(CpuSet::from([4, 5]))]);

    let mut driver = AllocationDriver::new(engine, &topology);
    driver.seed("reserved", &CpuSet::from([0])).unwrap();
    driver.process(&request("web"));

    assert_eq!(
        driver.ledger().report().to_string(),
        "00 -> [reserved web] <---\n01 -> [web]\n"
    );
}
