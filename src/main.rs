//! TapFlow CLI Entry Point
//!
//! Provides command-line interface for running a workflow on one device.
//!
//! # Usage
//!
//! ```bash
//! # Run a workflow on the device adb picks
//! tapflow login.yaml
//!
//! # Choose the device and override variables
//! tapflow login.yaml --device emulator-5554 --var user=alice
//!
//! # Dry run mode (log actions, touch nothing)
//! tapflow login.yaml --dry-run --timeline
//!
//! # Sub-workflows from another directory, branches against a saved UI tree
//! tapflow checkout.yaml --workflows flows/ --snapshot screen.json
//! ```

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use log::{error, info, warn};

use tapflow::config::EngineConfig;
use tapflow::device::{AdbDevice, DryRunDevice, StaticSnapshotProvider, UiTree};
use tapflow::execution::{Engine, ExecutionResult, RunManager, RunStatus};
use tapflow::monitoring::{EventSink, ExecutionTimeline, FanOutSink, LogEventSink};
use tapflow::workflow::parser::load_workflow;
use tapflow::workflow::FileWorkflowStore;
use tapflow::{APP_NAME, VERSION};

/// Default workflow file used when none is specified.
const DEFAULT_WORKFLOW: &str = "workflow.yaml";

/// Device serial used when neither `--device` nor `ANDROID_SERIAL` is set.
const DEFAULT_DEVICE: &str = "emulator-5554";

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    workflow_path: String,
    device: Option<String>,
    dry_run: bool,
    config_path: Option<PathBuf>,
    workflows_dir: Option<PathBuf>,
    snapshot_path: Option<PathBuf>,
    adb_path: Option<PathBuf>,
    variables: HashMap<String, String>,
    timeline: bool,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workflow_path: DEFAULT_WORKFLOW.to_string(),
            device: None,
            dry_run: false,
            config_path: None,
            workflows_dir: None,
            snapshot_path: None,
            adb_path: None,
            variables: HashMap::new(),
            timeline: false,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Device Workflow Automation Engine");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: tapflow [OPTIONS] <WORKFLOW_FILE>");
    println!();
    println!("Arguments:");
    println!("  <WORKFLOW_FILE>     Path to workflow YAML or JSON file");
    println!();
    println!("Options:");
    println!(
        "  --device SERIAL     Target device (default: $ANDROID_SERIAL or {})",
        DEFAULT_DEVICE
    );
    println!("  --dry-run           Log device actions without performing them");
    println!("  --config PATH       Engine configuration YAML");
    println!("  --workflows DIR     Directory of sub-workflows (default: workflow's directory)");
    println!("  --snapshot PATH     UI tree (YAML/JSON) used for branch and read steps");
    println!("  --var NAME=VALUE    Set a variable (repeatable)");
    println!("  --adb PATH          Path to the adb binary");
    println!("  --timeline          Print a step timeline after the run");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  tapflow login.yaml");
    println!("  tapflow login.yaml --device emulator-5554 --var user=alice");
    println!("  tapflow checkout.yaml --dry-run --timeline");
}

/// Returns the value following an option, advancing the cursor.
fn option_value<'a>(args: &'a [String], i: &mut usize, option: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires an argument", option))
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut positional_index = 0;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--dry-run" => {
                config.dry_run = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--timeline" => {
                config.timeline = true;
            }
            "--device" | "-s" => {
                config.device = Some(option_value(args, &mut i, "--device")?.to_string());
            }
            "--config" => {
                config.config_path = Some(PathBuf::from(option_value(args, &mut i, "--config")?));
            }
            "--workflows" => {
                let dir = option_value(args, &mut i, "--workflows")?;
                config.workflows_dir = Some(PathBuf::from(dir));
            }
            "--snapshot" => {
                let path = option_value(args, &mut i, "--snapshot")?;
                config.snapshot_path = Some(PathBuf::from(path));
            }
            "--adb" => {
                config.adb_path = Some(PathBuf::from(option_value(args, &mut i, "--adb")?));
            }
            "--var" => {
                let pair = option_value(args, &mut i, "--var")?;
                let (name, value) = pair
                    .split_once('=')
                    .ok_or_else(|| format!("Invalid variable '{}', expected NAME=VALUE", pair))?;
                if name.trim().is_empty() {
                    return Err(format!("Invalid variable '{}': empty name", pair));
                }
                config.variables.insert(name.trim().to_string(), value.to_string());
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                // Positional argument
                match positional_index {
                    0 => config.workflow_path = arg.clone(),
                    _ => return Err(format!("Unexpected argument: {}", arg)),
                }
                positional_index += 1;
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Builds the engine from the parsed options.
fn build_engine(
    config: &Config,
    events: Arc<dyn EventSink>,
) -> Result<Engine, Box<dyn std::error::Error>> {
    let engine_config = match &config.config_path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let mut engine = if config.dry_run {
        let device = Arc::new(DryRunDevice::new());
        Engine::new(device.clone()).with_scripts(device)
    } else {
        let device = match &config.adb_path {
            Some(path) => AdbDevice::with_path(path),
            None => AdbDevice::new(),
        };
        info!("Using adb at {}", device.adb_path().display());
        Engine::new(Arc::new(device))
    };

    let workflows_dir = config.workflows_dir.clone().unwrap_or_else(|| {
        Path::new(&config.workflow_path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    });
    info!("Sub-workflows: {}", workflows_dir.display());
    engine = engine.with_store(Arc::new(FileWorkflowStore::new(workflows_dir)));

    if let Some(path) = &config.snapshot_path {
        let tree = UiTree::load(path)
            .map_err(|e| format!("Could not load UI snapshot '{}': {}", path.display(), e))?;
        engine = engine.with_snapshots(Arc::new(StaticSnapshotProvider::new(tree)));
    }

    Ok(engine.with_config(engine_config).with_events(events))
}

/// Step events always go to the log; `--timeline` also records them.
fn event_sink(config: &Config, timeline: &Arc<ExecutionTimeline>) -> Arc<dyn EventSink> {
    let sink = FanOutSink::new().with(Arc::new(LogEventSink));
    if config.timeline {
        Arc::new(sink.with(timeline.clone()))
    } else {
        Arc::new(sink)
    }
}

/// Prints the final run summary.
fn print_summary(result: &ExecutionResult) {
    let status = match result.status {
        RunStatus::Completed => result.status.to_string().green().bold(),
        RunStatus::Cancelled => result.status.to_string().yellow().bold(),
        RunStatus::Error => result.status.to_string().red().bold(),
    };

    println!();
    println!("Workflow '{}': {}", result.workflow_name, status);
    println!("Steps executed: {}", result.steps_executed);
    println!("Total execution time: {} ms", result.duration_ms);
    if let Some(message) = &result.error {
        println!("Error: {}", message.red());
    }
    println!();
}

/// Main application entry point.
async fn run() -> Result<RunStatus, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    // Setup logging
    setup_logging(config.verbose);

    // Print banner
    print_banner();

    if config.dry_run {
        info!("Mode: DRY RUN (device actions will not execute)");
        println!();
    }

    // Load workflow
    let workflow = load_workflow(&config.workflow_path).map_err(|e| {
        error!("Failed to load workflow: {}", e);
        format!(
            "Could not load workflow from '{}': {}",
            config.workflow_path, e
        )
    })?;

    info!(
        "Workflow loaded: '{}' with {} steps, {} sub-workflows",
        workflow.name,
        workflow.steps.len(),
        workflow.sub_workflow_ids().len()
    );

    let timeline = Arc::new(ExecutionTimeline::new());
    let engine = build_engine(&config, event_sink(&config, &timeline))?;
    let manager = RunManager::new(engine);

    let device = config
        .device
        .clone()
        .or_else(|| env::var("ANDROID_SERIAL").ok())
        .unwrap_or_else(|| DEFAULT_DEVICE.to_string());
    info!("Device: {}", device);

    let handle = manager.start_with_variables(&device, workflow, config.variables.clone())?;

    // Ctrl-C cancels the run; the engine stops at the next step boundary
    let interrupt = {
        let manager = manager.clone();
        let device = device.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted - stopping workflow");
                manager.stop(&device);
            }
        })
    };

    let result = handle.await?;
    interrupt.abort();

    print_summary(&result);
    if config.timeline {
        println!("{}", timeline.gantt_chart());
    }

    Ok(result.status)
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(RunStatus::Completed) => ExitCode::SUCCESS,
        Ok(RunStatus::Cancelled) => ExitCode::from(130),
        Ok(RunStatus::Error) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("tapflow")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_defaults() {
        let config = parse_arguments(&args(&[])).unwrap();
        assert_eq!(config.workflow_path, DEFAULT_WORKFLOW);
        assert!(!config.dry_run);
        assert!(config.device.is_none());
    }

    #[test]
    fn test_parse_options() {
        let config = parse_arguments(&args(&[
            "flow.yaml",
            "--device",
            "R58M",
            "--dry-run",
            "--var",
            "user=alice",
            "--var",
            "query=a=b",
            "--timeline",
        ]))
        .unwrap();
        assert_eq!(config.workflow_path, "flow.yaml");
        assert_eq!(config.device.as_deref(), Some("R58M"));
        assert!(config.dry_run);
        assert!(config.timeline);
        assert_eq!(config.variables["user"], "alice");
        assert_eq!(config.variables["query"], "a=b");
    }

    #[test]
    fn test_timeline_receives_events_only_when_requested() {
        let event = tapflow::monitoring::ExecutionEvent::StepStarted {
            device_id: "dev".into(),
            workflow_id: "wf".into(),
            step_id: "a".into(),
            step_type: "tap".into(),
            iteration: 1,
        };

        let timeline = Arc::new(ExecutionTimeline::new());
        event_sink(&Config::default(), &timeline).emit(event.clone());
        assert!(timeline.events().is_empty());

        let config = parse_arguments(&args(&["--timeline"])).unwrap();
        event_sink(&config, &timeline).emit(event);
        assert_eq!(timeline.events().len(), 1);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_arguments(&args(&["--device"])).is_err());
        assert!(parse_arguments(&args(&["--var", "novalue"])).is_err());
        assert!(parse_arguments(&args(&["--bogus"])).is_err());
        assert!(parse_arguments(&args(&["a.yaml", "b.yaml"])).is_err());
    }
}
