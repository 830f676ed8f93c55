//! Command-line runner for the ripple diffusion simulator.
//!
//! Loads `ripple-config.yaml`, generates a synthetic network, runs the
//! configured protocol to termination and prints a JSON report.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `ripple-config.yaml` (or `RIPPLE_CONFIG`)
//! 3. Size the rayon worker pool
//! 4. Generate the synthetic network
//! 5. Assemble the protocol
//! 6. Create operator state and wire Ctrl-C to a clean stop
//! 7. Run the simulation off the async runtime
//! 8. Log the result and print the report

mod error;
mod network;
mod progress;
mod report;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ripple_core::config::{ProtocolConfig, RunConfig, SimulationConfig};
use ripple_core::runner::{self, run_simulation};
use ripple_core::{CatalogParams, DiffusionSimulator, OperatorState, ProtocolName};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::network::NetworkConfig;
use crate::progress::ProgressLogger;
use crate::report::RunReport;

/// Config file used when `RIPPLE_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "ripple-config.yaml";

/// Iterations between progress lines.
const PROGRESS_EVERY: u64 = 10;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if any initialization step or the run itself fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("ripple-engine starting");

    // 2. Load configuration.
    let config_path = config_path();
    let config = load_config(&config_path)?;
    let network_config = load_network_config(&config_path)?;
    let label = config.protocol.label();
    info!(
        path = %config_path.display(),
        protocol = %label,
        seed = config.run.seed,
        max_iterations = config.run.max_iterations,
        max_real_time_seconds = config.run.max_real_time_seconds,
        stop_conditions = config.stop.len(),
        "Configuration loaded"
    );

    // 3. Size the worker pool.
    configure_threads(config.run.threads)?;

    // 4. Generate the network.
    let data = Arc::new(network::generate(&network_config, config.run.seed)?);

    // 5. Assemble the protocol.
    let protocol = config.protocol.build().map_err(EngineError::from)?;
    info!(protocol = %label, "Protocol assembled");

    // 6. Operator state and Ctrl-C.
    let operator = Arc::new(OperatorState::new(&config.run));
    {
        let operator = Arc::clone(&operator);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C, stopping after the current iteration");
                    operator.request_stop();
                }
                Err(e) => warn!(error = %e, "failed to install Ctrl+C handler"),
            }
        });
    }

    // 7. Run.
    let seed = config.run.seed;
    let stop = config.stop;
    let run_data = Arc::clone(&data);
    let run_operator = Arc::clone(&operator);
    let (result, sim) = tokio::task::spawn_blocking(move || {
        let mut sim = DiffusionSimulator::new(protocol, run_data, seed);
        let mut callback = ProgressLogger::new(PROGRESS_EVERY);
        run_simulation(&mut sim, &stop, &run_operator, &mut callback).map(|result| (result, sim))
    })
    .await
    .map_err(|e| EngineError::Task {
        message: format!("{e}"),
    })?
    .map_err(EngineError::from)?;

    // 8. Report.
    runner::log_simulation_end(&result);
    let report = RunReport::new(label, operator.started_at(), &result, sim.state(), &data);
    let json = serde_json::to_string_pretty(&report).map_err(EngineError::from)?;
    println!("{json}");

    info!(
        end_reason = ?result.end_reason,
        users_reached = report.users_reached,
        "ripple-engine shutdown complete"
    );

    Ok(())
}

/// Config path from `RIPPLE_CONFIG`, else [`DEFAULT_CONFIG_PATH`].
fn config_path() -> PathBuf {
    std::env::var_os("RIPPLE_CONFIG").map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load the run configuration.
///
/// A missing file runs the push model with default bounds.
fn load_config(path: &Path) -> Result<SimulationConfig, EngineError> {
    if path.exists() {
        Ok(SimulationConfig::from_file(path)?)
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        Ok(SimulationConfig {
            run: RunConfig::default(),
            protocol: ProtocolConfig::Preconfigured {
                name: ProtocolName::PushModel,
                params: CatalogParams::default(),
            },
            stop: Vec::new(),
        })
    }
}

/// Load the `network` section of the config file.
///
/// Falls back to defaults when the file or the section is missing.
fn load_network_config(path: &Path) -> Result<NetworkConfig, EngineError> {
    if !path.exists() {
        return Ok(NetworkConfig::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| EngineError::Network {
        message: format!("failed to read config file: {e}"),
    })?;

    // Parse the full YAML and extract just the "network" section.
    let raw: serde_yml::Value = serde_yml::from_str(&contents).map_err(|e| EngineError::Network {
        message: format!("failed to parse config YAML: {e}"),
    })?;

    raw.get("network").map_or_else(
        || Ok(NetworkConfig::default()),
        |section| {
            serde_yml::from_value(section.clone()).map_err(|e| EngineError::Network {
                message: format!("failed to parse network config: {e}"),
            })
        },
    )
}

/// Size the global rayon pool; 0 keeps rayon's one-per-core default.
fn configure_threads(threads: usize) -> Result<(), EngineError> {
    if threads == 0 {
        return Ok(());
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("ripple-worker-{i}"))
        .build_global()
        .map_err(|e| EngineError::ThreadPool {
            message: e.to_string(),
        })?;
    info!(threads, "Worker pool configured");
    Ok(())
}
