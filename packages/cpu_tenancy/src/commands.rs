use std::io::Write;
use std::path::{Path, PathBuf};

use cpuset::CpuSet;
use topology_hints::{TopologyHint, parse_any};
use tracing::{info, warn};

use crate::inputs::{expand_templates, load_machine_info, load_recording, load_workload};
use crate::pal::{Filesystem, FilesystemFacade};
use crate::{
    AllocationDriver, AllocationEngine, CpuTopology, EngineParams, Policy,
    Recording, ReplayEngine, RunSummary, SetupError, SingleShotMode, TopologyDiscovery,
    WorkloadRequest,
};

/// The topology manager policy used when none is given.
pub const DEFAULT_TOPOLOGY_POLICY: &str = "single-numa-node";

/// The tenant recorded on the cores of the reserved CPUs before any allocation.
pub const RESERVED_TENANT: &str = "reserved";

/// Parses the CPU list given for the reserved CPUs.
///
/// # Errors
///
/// Returns [`SetupError::CpuList`] if the list is invalid.
pub fn parse_reserved_cpus(text: &str) -> Result<CpuSet, SetupError> {
    text.parse().map_err(|source| SetupError::CpuList {
        value: text.to_string(),
        source,
    })
}

/// Parses a topology hint given in either hint encoding, returning the first hint of the single
/// resource it describes.
///
/// # Errors
///
/// Returns [`SetupError::Hint`] if the record is malformed and [`SetupError::AmbiguousHint`] if it
/// does not describe exactly one resource with at least one hint.
pub fn parse_hint(text: &str) -> Result<TopologyHint, SetupError> {
    let hints = parse_any(&[text]).map_err(|source| SetupError::Hint {
        value: text.to_string(),
        source,
    })?;

    let mut resources = hints.iter();

    match (resources.next(), resources.next()) {
        (Some((_, [first, ..])), None) => Ok(*first),
        _ => Err(SetupError::AmbiguousHint {
            value: text.to_string(),
        }),
    }
}

/// Parses an allocation policy name.
///
/// # Errors
///
/// Returns [`SetupError::Engine`] if the name is not a known policy.
pub fn parse_policy(text: &str) -> Result<Policy, SetupError> {
    text.parse::<Policy>().map_err(SetupError::from)
}

/// How to set up the allocation engine.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct EngineOptions {
    /// Path of the machine description (cAdvisor machine info JSON).
    pub machine_info: PathBuf,

    /// CPUs held back for the system.
    pub reserved_cpus: CpuSet,

    /// Path of a recording with the decisions to replay.
    pub recording: Option<PathBuf>,

    /// The allocation policy. Taken from the recording, or `static`, if not set.
    pub policy: Option<Policy>,

    /// The name of the topology manager policy. Defaults to [`DEFAULT_TOPOLOGY_POLICY`].
    pub topology_policy: String,

    /// The affinity the topology manager hands to the engine.
    pub hint: Option<TopologyHint>,
}

impl EngineOptions {
    /// Creates options for the machine described at `machine_info`, reserving `reserved_cpus`.
    #[must_use]
    pub fn new(machine_info: impl Into<PathBuf>, reserved_cpus: CpuSet) -> Self {
        Self {
            machine_info: machine_info.into(),
            reserved_cpus,
            recording: None,
            policy: None,
            topology_policy: DEFAULT_TOPOLOGY_POLICY.to_string(),
            hint: None,
        }
    }

    /// Replays the recording at `path`.
    #[must_use]
    pub fn with_recording(mut self, path: impl Into<PathBuf>) -> Self {
        self.recording = Some(path.into());
        self
    }

    /// Uses `policy` regardless of what the recording says.
    #[must_use]
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Sets the topology manager policy and the affinity it hands out.
    #[must_use]
    pub fn with_topology_policy(
        mut self,
        name: impl Into<String>,
        hint: Option<TopologyHint>,
    ) -> Self {
        self.topology_policy = name.into();
        self.hint = hint;
        self
    }
}

/// Where the workloads of a run come from.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum WorkloadSource {
    /// `name=request/limit` templates.
    Templates(Vec<String>),

    /// Paths of workload files.
    Files(Vec<PathBuf>),
}

/// Settings of the `run` command.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct RunConfig {
    /// How to set up the engine.
    pub engine: EngineOptions,

    /// The workloads to allocate, in order.
    pub workloads: WorkloadSource,
}

impl RunConfig {
    /// Creates the settings of a run.
    #[must_use]
    pub fn new(engine: EngineOptions, workloads: WorkloadSource) -> Self {
        Self { engine, workloads }
    }
}

/// Settings of the `hints` command.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct HintsConfig {
    /// How to set up the engine.
    pub engine: EngineOptions,

    /// The `name=request/limit` template of the workload to ask hints for.
    pub template: String,
}

impl HintsConfig {
    /// Creates the settings of a hints query.
    #[must_use]
    pub fn new(engine: EngineOptions, template: impl Into<String>) -> Self {
        Self {
            engine,
            template: template.into(),
        }
    }
}

/// Settings of the `topology` command.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct TopologyConfig {
    /// Path of the machine description.
    pub machine_info: PathBuf,
}

impl TopologyConfig {
    /// Creates the settings of a topology dump.
    #[must_use]
    pub fn new(machine_info: impl Into<PathBuf>) -> Self {
        Self {
            machine_info: machine_info.into(),
        }
    }
}

/// Allocates every workload of `config` and writes one line per allocation, followed by the
/// tenancy of every touched core, to `out`.
///
/// # Errors
///
/// Returns [`SetupError`] if the inputs are unusable or `out` cannot be written. Requests the
/// engine refuses are logged and skipped without failing the run.
pub fn run(config: &RunConfig, out: &mut impl Write) -> Result<RunSummary, SetupError> {
    run_with_filesystem(config, &FilesystemFacade::target(), out)
}

/// Writes the `cpu` topology hints the engine offers for the workload of `config` to `out`.
///
/// # Errors
///
/// Returns [`SetupError`] if the inputs are unusable or `out` cannot be written.
pub fn hints(config: &HintsConfig, out: &mut impl Write) -> Result<(), SetupError> {
    hints_with_filesystem(config, &FilesystemFacade::target(), out)
}

/// Writes the discovered CPU topology, one line per physical core, to `out`.
///
/// # Errors
///
/// Returns [`SetupError`] if the machine description is unusable or `out` cannot be written.
pub fn dump_topology(config: &TopologyConfig, out: &mut impl Write) -> Result<(), SetupError> {
    dump_topology_with_filesystem(config, &FilesystemFacade::target(), out)
}

fn discover(fs: &impl Filesystem, machine_info: &Path) -> Result<CpuTopology, SetupError> {
    Ok(load_machine_info(fs, machine_info)?.discover()?)
}

/// The hint of `options`, if the topology manager policy leaves no room to apply it.
fn ignored_hint(options: &EngineOptions) -> Option<TopologyHint> {
    options.hint.filter(|_| options.topology_policy == "none")
}

fn create_engine(
    fs: &impl Filesystem,
    options: &EngineOptions,
    topology: &CpuTopology,
) -> Result<ReplayEngine, SetupError> {
    let recording = match &options.recording {
        Some(path) => load_recording(fs, path)?,
        None => Recording::new(),
    };

    let policy = options
        .policy
        .or_else(|| recording.policy())
        .unwrap_or_default();

    if let Some(hint) = ignored_hint(options) {
        warn!(%hint, "topology hint is ignored under the 'none' topology manager policy");
    }

    let mode = SingleShotMode::new(
        options.topology_policy.clone(),
        options.hint.unwrap_or_default(),
    );

    let params = EngineParams::new(policy, options.reserved_cpus.clone())
        .with_topology_policy(options.topology_policy.clone(), options.hint);

    let engine = ReplayEngine::new(
        &params,
        topology,
        recording,
        Box::new(mode.affinity.clone()),
    )?;
    engine.start(&mode.pod_status, &mode.runtime, &mode.sources_ready);

    Ok(engine)
}

fn load_requests(
    fs: &impl Filesystem,
    workloads: &WorkloadSource,
) -> Result<Vec<WorkloadRequest>, SetupError> {
    match workloads {
        WorkloadSource::Templates(templates) => expand_templates(templates),
        WorkloadSource::Files(paths) => paths
            .iter()
            .map(|path| load_workload(fs, path))
            .collect(),
    }
}

fn run_with_filesystem(
    config: &RunConfig,
    fs: &impl Filesystem,
    out: &mut impl Write,
) -> Result<RunSummary, SetupError> {
    let requests = load_requests(fs, &config.workloads)?;
    if requests.is_empty() {
        return Err(SetupError::NoWorkloads);
    }

    let topology = discover(fs, &config.engine.machine_info)?;
    let engine = create_engine(fs, &config.engine, &topology)?;

    let mut driver = AllocationDriver::new(engine, &topology);
    driver.seed(RESERVED_TENANT, &config.engine.reserved_cpus)?;

    let summary = driver.run(&requests, out).map_err(SetupError::Output)?;

    let report = driver.ledger().report();
    write!(out, "{report}").map_err(SetupError::Output)?;

    info!(
        allocated = summary.allocated,
        failed = summary.failed,
        contended_cores = report.contended().count(),
        "run complete"
    );

    Ok(summary)
}

fn hints_with_filesystem(
    config: &HintsConfig,
    fs: &impl Filesystem,
    out: &mut impl Write,
) -> Result<(), SetupError> {
    let requests = expand_templates(std::slice::from_ref(&config.template))?;
    let Some(request) = requests.first() else {
        return Err(SetupError::NoWorkloads);
    };

    let topology = discover(fs, &config.engine.machine_info)?;
    let engine = create_engine(fs, &config.engine, &topology)?;

    let hints = engine.topology_hints(request);

    for hint in hints.get("cpu").unwrap_or_default() {
        writeln!(
            out,
            "\tmask=[{:>6}] preferred={}",
            hint.affinity.to_string(),
            hint.preferred
        )
        .map_err(SetupError::Output)?;
    }

    Ok(())
}

fn dump_topology_with_filesystem(
    config: &TopologyConfig,
    fs: &impl Filesystem,
    out: &mut impl Write,
) -> Result<(), SetupError> {
    let topology = discover(fs, &config.machine_info)?;

    writeln!(
        out,
        "cpus={} cores={} sockets={} numa_nodes={}",
        topology.cpu_count(),
        topology.core_count(),
        topology.sockets().len(),
        topology.numa_nodes().len()
    )
    .map_err(SetupError::Output)?;

    for (core, siblings) in topology.cores() {
        let socket = topology.socket_of(core).unwrap_or_default();
        let numa_node = topology.numa_node_of(core).unwrap_or_default();

        writeln!(
            out,
            "core {core:02}: socket={socket} numa_node={numa_node} cpus=[{siblings}]"
        )
        .map_err(SetupError::Output)?;
    }

    Ok(())
}
