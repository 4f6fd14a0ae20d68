use std::fmt::{self, Display};
use std::io::{self, Write};

use cpuset::CpuSet;
use tracing::{debug, error, info};

use crate::{
    AllocationEngine, AllocationError, CorePartition, CpuTopology, TenancyLedger,
    TopologyLookupError, WorkloadRequest, partition_by_core,
};

/// The outcome of one successful allocation: the CPUs the tenant got and the physical cores they
/// occupy.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct AllocationLine {
    /// The tenant that made the request.
    pub tenant: String,

    /// The CPUs the engine assigned.
    pub cpus: CpuSet,

    /// The physical cores touched by `cpus`.
    pub partition: CorePartition,
}

/// Renders as `<tenant>: <cpus> -> [ <core>=[<siblings>] ... ]`.
impl Display for AllocationLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> [ ", self.tenant, self.cpus)?;

        for (core, siblings) in &self.partition {
            write!(f, "{core}=[{siblings}] ")?;
        }

        write!(f, "]")
    }
}

/// What happened to one request.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum RequestOutcome {
    /// The engine assigned CPUs and the tenancy was recorded.
    Allocated(AllocationLine),

    /// The engine refused the request.
    Refused(AllocationError),

    /// The engine assigned a CPU that is not part of the topology.
    OutsideTopology(TopologyLookupError),
}

impl RequestOutcome {
    /// The allocation, if the request succeeded.
    #[must_use]
    pub fn allocation(&self) -> Option<&AllocationLine> {
        match self {
            Self::Allocated(line) => Some(line),
            Self::Refused(_) | Self::OutsideTopology(_) => None,
        }
    }
}

/// Counts of processed requests.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct RunSummary {
    /// Requests that produced an allocation.
    pub allocated: usize,

    /// Requests that were skipped because of an error.
    pub failed: usize,
}

/// Feeds workload requests to an [`AllocationEngine`] one at a time and records which physical
/// cores each tenant ends up on.
///
/// A request that fails, whether the engine refuses it or returns CPUs outside the topology, is
/// logged and skipped. It contributes nothing to the ledger and later requests are still processed.
#[derive(Debug)]
pub struct AllocationDriver<'t, E> {
    engine: E,
    topology: &'t CpuTopology,
    ledger: TenancyLedger,
    summary: RunSummary,
}

impl<'t, E: AllocationEngine> AllocationDriver<'t, E> {
    /// Creates a driver with an empty ledger.
    #[must_use]
    pub fn new(engine: E, topology: &'t CpuTopology) -> Self {
        Self {
            engine,
            topology,
            ledger: TenancyLedger::new(),
            summary: RunSummary::default(),
        }
    }

    /// Records `tenant` on the cores of `cpus` before any request is processed, typically to mark
    /// the CPUs reserved for the system.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyLookupError`] if `cpus` contains a CPU outside the topology.
    pub fn seed(&mut self, tenant: &str, cpus: &CpuSet) -> Result<(), TopologyLookupError> {
        let partition = self.ledger.seed(tenant, cpus, self.topology)?;

        debug!(tenant, %cpus, cores = partition.len(), "seeded tenancy");

        Ok(())
    }

    /// Processes one request.
    pub fn process(&mut self, request: &WorkloadRequest) -> RequestOutcome {
        debug!(request = %request, "allocating");

        let outcome = self.try_process(request);

        match &outcome {
            RequestOutcome::Allocated(line) => {
                self.summary.allocated = self.summary.allocated.saturating_add(1);
                info!(
                    tenant = line.tenant.as_str(),
                    cpus = %line.cpus,
                    cores = line.partition.len(),
                    "allocated"
                );
            }
            RequestOutcome::Refused(e) => {
                self.summary.failed = self.summary.failed.saturating_add(1);
                error!(tenant = request.tenant.as_str(), error = %e, "allocation failed");
            }
            RequestOutcome::OutsideTopology(e) => {
                self.summary.failed = self.summary.failed.saturating_add(1);
                error!(
                    tenant = request.tenant.as_str(),
                    cpu = e.cpu,
                    "engine assigned a CPU outside the topology"
                );
            }
        }

        outcome
    }

    fn try_process(&mut self, request: &WorkloadRequest) -> RequestOutcome {
        let cpus = match self.engine.allocate(request) {
            Ok(cpus) => cpus,
            Err(e) => return RequestOutcome::Refused(e),
        };

        let partition = match partition_by_core(&cpus, self.topology) {
            Ok(partition) => partition,
            Err(e) => return RequestOutcome::OutsideTopology(e),
        };

        self.ledger.record_allocation(&request.tenant, &partition);

        RequestOutcome::Allocated(AllocationLine {
            tenant: request.tenant.clone(),
            cpus,
            partition,
        })
    }

    /// Processes every request in order, writing one line per successful allocation to `out`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if writing to `out` fails. Failed requests are not errors.
    pub fn run<'r>(
        &mut self,
        requests: impl IntoIterator<Item = &'r WorkloadRequest>,
        out: &mut impl Write,
    ) -> io::Result<RunSummary> {
        for request in requests {
            if let RequestOutcome::Allocated(line) = self.process(request) {
                writeln!(out, "{line}")?;
            }
        }

        Ok(self.summary)
    }

    /// Counts of the requests processed so far.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    /// The tenancy recorded so far.
    #[must_use]
    pub fn ledger(&self) -> &TenancyLedger {
        &self.ledger
    }

    /// The engine being driven.
    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Ends the run, returning the ledger.
    #[must_use]
    pub fn into_ledger(self) -> TenancyLedger {
        self.ledger
    }
}
