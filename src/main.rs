//! Demo runner: drives the cycle rig against simulated hardware.
//!
//! Real deployments embed the library and wire their own drivers behind the
//! traits in `cycle_rig::core`; this binary exists to exercise a full
//! trial end to end with the mock actuator and force curve.

use anyhow::Result;
use clap::Parser;
use cycle_rig::config::{ControllerConfig, SamplerConfig, Settings};
use cycle_rig::controller::CycleController;
use cycle_rig::core::{Actuator, CaptureSampler, ForceReader, PoseTrigger, ShutdownToken};
use cycle_rig::hardware::{MockActuator, MockForceReader, MockPoseTrigger};
use cycle_rig::sampler::ForceSampler;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cycle-rig", about = "Endurance cycle-test rig (simulated hardware)")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop the trial after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    run_secs: Option<u64>,
}

/// Settings used when no configuration file is given: mock everything,
/// shortened waits so the demo cycles visibly fast.
fn demo_settings() -> Settings {
    Settings {
        controller: ControllerConfig {
            arm: "mock-arm".to_string(),
            pour_prep_position: "mock-pour-prep".to_string(),
            resting_position: "mock-resting".to_string(),
            force_sensor: Some("mock-force".to_string()),
            settle_ms: 250,
            move_poll_ms: 50,
            move_timeout_ms: 10_000,
        },
        sampler: SamplerConfig {
            use_mock_curve: true,
            ..SamplerConfig::default()
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings = match &args.config {
        Some(path) => Settings::load_from(path)?,
        None => demo_settings(),
    };

    if !settings.sampler.use_mock_curve {
        warn!("this binary has no hardware drivers; using the mock force curve regardless");
    }

    let shutdown = ShutdownToken::new();

    let reader: Arc<dyn ForceReader> = Arc::new(MockForceReader::new());
    let sampler = ForceSampler::spawn(reader, &settings.sampler, shutdown.clone());

    let controller = CycleController::new(
        &settings.controller,
        Arc::new(MockActuator::new(3)) as Arc<dyn Actuator>,
        Arc::new(MockPoseTrigger::new()) as Arc<dyn PoseTrigger>,
        Arc::new(MockPoseTrigger::new()) as Arc<dyn PoseTrigger>,
        Some(Arc::clone(&sampler) as Arc<dyn CaptureSampler>),
        shutdown.clone(),
    );

    let started = controller.start()?;
    info!("running trial {} (Ctrl-C to stop)", started.trial_id);

    match args.run_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
        }
    }

    let stopped = controller.stop()?;
    info!(
        "trial {} finished with {} cycles",
        stopped.trial_id, stopped.cycle_count
    );

    // Let the in-flight cycle drain, then stop the background loops.
    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.trigger();

    println!(
        "{}",
        serde_json::to_string_pretty(&controller.snapshot())?
    );
    println!("{}", serde_json::to_string_pretty(&sampler.snapshot())?);

    Ok(())
}
