use std::collections::BTreeMap;
use std::fmt::{self, Display};

use cpuset::CpuSet;
use itertools::Itertools;

use crate::{CoreId, CpuTopology, TopologyLookupError};

/// The physical cores touched by a CPU set, each with the full set of its hardware threads.
pub type CorePartition = BTreeMap<CoreId, CpuSet>;

/// Expands `allocated` into the physical cores it touches.
///
/// CPUs are resolved in ascending order. Once a CPU is resolved, all of its siblings are removed
/// from further consideration, so every core appears once and maps to its *full* sibling set, even
/// if `allocated` contains only some of the siblings.
///
/// # Errors
///
/// Returns [`TopologyLookupError`] for the first CPU of `allocated` that is not in `topology`.
pub fn partition_by_core(
    allocated: &CpuSet,
    topology: &CpuTopology,
) -> Result<CorePartition, TopologyLookupError> {
    let mut partition = CorePartition::new();
    let mut remaining = allocated.clone();

    while let Some(cpu) = remaining.first() {
        let (core, siblings) = topology.core_of(cpu)?;

        remaining = remaining.difference(siblings);
        partition.insert(core, siblings.clone());
    }

    Ok(partition)
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct CoreEntry {
    tenants: Vec<String>,
    snapshot: CpuSet,
}

/// Records, per physical core, every tenant whose allocation touched that core.
///
/// Tenants are appended and never removed, so the same tenant may appear several times on a core.
/// A core with more than one tenant entry is *contended*. Next to the tenants, the ledger keeps the
/// CPU set most recently recorded for the core; each recording overwrites the previous snapshot.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TenancyLedger {
    cores: BTreeMap<CoreId, CoreEntry>,
}

impl TenancyLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `tenant` to the tenants of `core` and replaces the snapshot of the core.
    pub fn record_tenant(&mut self, core: CoreId, tenant: &str, snapshot: CpuSet) {
        let entry = self.cores.entry(core).or_default();

        entry.tenants.push(tenant.to_string());
        entry.snapshot = snapshot;
    }

    /// Records `tenant` on every core of `partition`.
    pub fn record_allocation(&mut self, tenant: &str, partition: &CorePartition) {
        for (core, siblings) in partition {
            self.record_tenant(*core, tenant, siblings.clone());
        }
    }

    /// Records a synthetic tenant (such as CPUs reserved for the system) on every core that `cpus`
    /// touch, before any real allocation takes place.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyLookupError`] if `cpus` contains a CPU that is not in `topology`. Nothing
    /// is recorded in that case.
    pub fn seed(
        &mut self,
        tenant: &str,
        cpus: &CpuSet,
        topology: &CpuTopology,
    ) -> Result<CorePartition, TopologyLookupError> {
        let partition = partition_by_core(cpus, topology)?;
        self.record_allocation(tenant, &partition);

        Ok(partition)
    }

    /// The tenants recorded on `core`, in recording order.
    #[must_use]
    pub fn tenants(&self, core: CoreId) -> Option<&[String]> {
        self.cores.get(&core).map(|entry| entry.tenants.as_slice())
    }

    /// The CPU set most recently recorded for `core`.
    #[must_use]
    pub fn snapshot(&self, core: CoreId) -> Option<&CpuSet> {
        self.cores.get(&core).map(|entry| &entry.snapshot)
    }

    /// Whether more than one tenant entry is recorded on `core`.
    #[must_use]
    pub fn is_contended(&self, core: CoreId) -> bool {
        self.cores
            .get(&core)
            .is_some_and(|entry| entry.tenants.len() > 1)
    }

    /// The number of cores with at least one tenant.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cores.len()
    }

    /// Whether no core has been touched yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }

    /// Summarizes every touched core in ascending core order.
    #[must_use]
    pub fn report(&self) -> TenancyReport {
        TenancyReport {
            rows: self
                .cores
                .iter()
                .map(|(core, entry)| CoreTenancy {
                    core: *core,
                    tenants: entry.tenants.clone(),
                    snapshot: entry.snapshot.clone(),
                })
                .collect(),
        }
    }
}

/// One row of a [`TenancyReport`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct CoreTenancy {
    /// The physical core.
    pub core: CoreId,

    /// Tenants recorded on the core, in recording order.
    pub tenants: Vec<String>,

    /// The CPU set most recently recorded for the core.
    pub snapshot: CpuSet,
}

impl CoreTenancy {
    /// Whether more than one tenant entry is recorded on the core.
    #[must_use]
    pub fn is_contended(&self) -> bool {
        self.tenants.len() > 1
    }
}

/// Renders as `NN -> [tenant tenant]`, followed by ` <---` if the core is contended.
impl Display for CoreTenancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02} -> [{}]", self.core, self.tenants.iter().join(" "))?;

        if self.is_contended() {
            write!(f, " <---")?;
        }

        Ok(())
    }
}

/// The tenancy of every touched core at the end of a run, in ascending core order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TenancyReport {
    rows: Vec<CoreTenancy>,
}

impl TenancyReport {
    /// All rows in ascending core order.
    #[must_use]
    pub fn rows(&self) -> &[CoreTenancy] {
        &self.rows
    }

    /// Only the rows of contended cores.
    pub fn contended(&self) -> impl Iterator<Item = &CoreTenancy> {
        self.rows.iter().filter(|row| row.is_contended())
    }
}

/// Renders one line per row.
impl Display for TenancyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            writeln!(f, "{row}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::TopologyBuilder;

    fn two_cores() -> CpuTopology {
        TopologyBuilder::new()
            .core([0, 4])
            .core([1, 5])
            .build()
            .unwrap()
    }

    #[test]
    fn partition_expands_to_full_siblings() {
        let partition = partition_by_core(&CpuSet::from([0, 1]), &two_cores()).unwrap();

        let expected: CorePartition = [(0, CpuSet::from([0, 4])), (1, CpuSet::from([1, 5]))]
            .into_iter()
            .collect();
        assert_eq!(partition, expected);
    }

    #[test]
    fn partition_collapses_siblings_into_one_core() {
        let partition = partition_by_core(&CpuSet::from([0, 4]), &two_cores()).unwrap();

        assert_eq!(partition.len(), 1);
        assert_eq!(partition.get(&0), Some(&CpuSet::from([0, 4])));
    }

    #[test]
    fn partition_of_empty_set_is_empty() {
        assert!(
            partition_by_core(&CpuSet::new(), &two_cores())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn partition_reports_unknown_cpu() {
        let error = partition_by_core(&CpuSet::from([1, 9]), &two_cores()).unwrap_err();

        assert_eq!(error.cpu, 9);
    }

    #[test]
    fn seeded_core_becomes_contended() {
        let topology = two_cores();
        let mut ledger = TenancyLedger::new();

        ledger
            .seed("reserved", &CpuSet::from([0]), &topology)
            .unwrap();
        assert!(!ledger.is_contended(0));

        let partition = partition_by_core(&CpuSet::from([4]), &topology).unwrap();
        ledger.record_allocation("podA", &partition);

        assert!(ledger.is_contended(0));
        assert!(!ledger.is_contended(1));
        assert_eq!(
            ledger.tenants(0).unwrap(),
            &["reserved".to_string(), "podA".to_string()]
        );
    }

    #[test]
    fn seeding_several_cpus_of_one_core_records_once() {
        let mut ledger = TenancyLedger::new();

        ledger
            .seed("reserved", &CpuSet::from([0, 4]), &two_cores())
            .unwrap();

        assert_eq!(ledger.tenants(0).unwrap().len(), 1);
    }

    #[test]
    fn seed_with_unknown_cpu_records_nothing() {
        let mut ledger = TenancyLedger::new();

        ledger
            .seed("reserved", &CpuSet::from([0, 7]), &two_cores())
            .unwrap_err();

        assert!(ledger.is_empty());
    }

    #[test]
    fn tenant_appends_while_snapshot_overwrites() {
        let mut ledger = TenancyLedger::new();

        ledger.record_tenant(3, "a", CpuSet::from([3, 7]));
        ledger.record_tenant(3, "a", CpuSet::from([3]));

        assert_eq!(ledger.tenants(3).unwrap(), &["a".to_string(), "a".to_string()]);
        assert_eq!(ledger.snapshot(3), Some(&CpuSet::from([3])));
        assert!(ledger.is_contended(3));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn unknown_core_has_no_tenancy() {
        let ledger = TenancyLedger::new();

        assert!(ledger.tenants(0).is_none());
        assert!(ledger.snapshot(0).is_none());
        assert!(!ledger.is_contended(0));
    }

    #[test]
    fn report_lists_cores_in_order_with_marker() {
        let mut ledger = TenancyLedger::new();
        ledger.record_tenant(12, "web", CpuSet::from([12]));
        ledger.record_tenant(1, "reserved", CpuSet::from([1]));
        ledger.record_tenant(1, "db", CpuSet::from([1]));

        let report = ledger.report();

        assert_eq!(report.to_string(), "01 -> [reserved db] <---\n12 -> [web]\n");
        assert_eq!(
            report.contended().map(|row| row.core).collect::<Vec<_>>(),
            vec![1]
        );
        assert_eq!(report.rows().len(), 2);
    }

    #[test]
    fn empty_report_renders_nothing() {
        assert_eq!(TenancyLedger::new().report().to_string(), "");
    }
}
