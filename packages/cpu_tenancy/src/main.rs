#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))]

//! Binary entry point for the `cpu-tenancy` harness.
//!
//! This module is excluded from mutation testing because testing process entry/exit behavior
//! is impractical - it requires spawning subprocesses and checking exit codes.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use argh::FromArgs;
use cpu_tenancy::{
    DEFAULT_TOPOLOGY_POLICY, EngineOptions, HintsConfig, RunConfig, SetupError, TopologyConfig,
    WorkloadSource, dump_topology, error_chain, hints, parse_hint, parse_policy,
    parse_reserved_cpus, run,
};
use tracing::level_filters::LevelFilter;

/// Drives a CPU-pinning allocation engine with workloads and reports which physical cores each
/// workload ends up sharing.
#[derive(FromArgs)]
struct Args {
    /// log verbosity on stderr: 0 = warnings, 1 = info, 2 = debug, 3 or more = trace
    #[argh(option, short = 'v', default = "0")]
    verbosity: u8,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunArgs),
    Hints(HintsArgs),
    Topology(TopologyArgs),
}

/// Allocate CPUs for each workload, then report the tenants of every touched core.
#[derive(FromArgs)]
#[argh(subcommand, name = "run")]
struct RunArgs {
    /// path of the machine info JSON document
    #[argh(option, short = 'M')]
    machine_info: PathBuf,

    /// CPUs reserved for the system, as a CPU list
    #[argh(option, short = 'R', default = "String::from(\"0\")")]
    reserved_cpus: String,

    /// recording of allocation decisions to replay (TOML)
    #[argh(option, short = 'r')]
    recording: Option<PathBuf>,

    /// CPU manager policy (static, none); defaults to the policy of the recording, then static
    #[argh(option, short = 'P')]
    policy: Option<String>,

    /// topology manager policy (single-numa-node by default; a hint has no effect under none)
    #[argh(option, short = 'T', default = "String::from(DEFAULT_TOPOLOGY_POLICY)")]
    tm_policy: String,

    /// topology hint handed to the engine, in structured text or JSON form
    #[argh(option, short = 'H')]
    hint: Option<String>,

    /// treat arguments as name=request/limit templates instead of workload file paths
    #[argh(switch, short = 't')]
    template: bool,

    /// workload files, or name=request/limit templates with --template
    #[argh(positional, greedy)]
    workloads: Vec<String>,
}

/// Print the CPU topology hints the engine offers for one workload.
#[derive(FromArgs)]
#[argh(subcommand, name = "hints")]
struct HintsArgs {
    /// path of the machine info JSON document
    #[argh(option, short = 'M')]
    machine_info: PathBuf,

    /// CPUs reserved for the system, as a CPU list
    #[argh(option, short = 'R', default = "String::from(\"0\")")]
    reserved_cpus: String,

    /// recording of allocation decisions to replay (TOML)
    #[argh(option, short = 'r')]
    recording: Option<PathBuf>,

    /// CPU manager policy (static, none); defaults to the policy of the recording, then static
    #[argh(option, short = 'P')]
    policy: Option<String>,

    /// the workload, as a name=request/limit template
    #[argh(positional)]
    template: String,
}

/// Print the CPU topology discovered from a machine description.
#[derive(FromArgs)]
#[argh(subcommand, name = "topology")]
struct TopologyArgs {
    /// path of the machine info JSON document
    #[argh(option, short = 'M')]
    machine_info: PathBuf,
}

fn level_filter(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn engine_options(
    machine_info: PathBuf,
    reserved_cpus: &str,
    recording: Option<PathBuf>,
    policy: Option<&str>,
) -> Result<EngineOptions, SetupError> {
    let mut options = EngineOptions::new(machine_info, parse_reserved_cpus(reserved_cpus)?);

    if let Some(path) = recording {
        options = options.with_recording(path);
    }

    if let Some(name) = policy {
        options = options.with_policy(parse_policy(name)?);
    }

    Ok(options)
}

fn execute(command: Command, out: &mut impl Write) -> Result<(), SetupError> {
    match command {
        Command::Run(args) => {
            let hint = args.hint.as_deref().map(parse_hint).transpose()?;

            let engine = engine_options(
                args.machine_info,
                &args.reserved_cpus,
                args.recording,
                args.policy.as_deref(),
            )?
            .with_topology_policy(args.tm_policy, hint);

            let workloads = if args.template {
                WorkloadSource::Templates(args.workloads)
            } else {
                WorkloadSource::Files(args.workloads.into_iter().map(PathBuf::from).collect())
            };

            run(&RunConfig::new(engine, workloads), out)?;
        }
        Command::Hints(args) => {
            let engine = engine_options(
                args.machine_info,
                &args.reserved_cpus,
                args.recording,
                args.policy.as_deref(),
            )?;

            hints(&HintsConfig::new(engine, args.template), out)?;
        }
        Command::Topology(args) => {
            dump_topology(&TopologyConfig::new(args.machine_info), out)?;
        }
    }

    out.flush().map_err(SetupError::Output)
}

// Binary entry point - mutations would require subprocess testing which is impractical.
#[cfg_attr(test, mutants::skip)]
fn main() -> ExitCode {
    let args: Args = argh::from_env();

    // Logs go to stderr so that stdout carries only the report.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level_filter(args.verbosity))
        .init();

    let mut out = io::stdout().lock();

    match execute(args.command, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", error_chain(&e));
            ExitCode::FAILURE
        }
    }
}
