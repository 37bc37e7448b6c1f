//! CLI Entry Point for the event builder
//!
//! Provides command-line access to:
//! - Running events against simulated nodes (no hardware needed)
//! - Writing the per-node configuration files
//! - Checking the effective configuration
//!
//! # Usage
//!
//! ```bash
//! event-builder simulate --events 2 --max-duration 1.0 --trigger-enable-delay 0.1
//! event-builder write-node-configs --out /mnt/event-builder
//! event-builder --config bench.toml check-config
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use event_builder::config::{EventBuilderConfig, DEFAULT_CONFIG_PATH};
use event_builder::event::EventController;
use event_builder::hardware::{LineDriver, LineMap, MockLines, SimSettings, SimulatedNodes};
use event_builder::node_config::write_node_configs;
use event_builder::record::RecordWriter;
use event_builder::service::{ControllerHandle, ControllerService, DEFAULT_MAILBOX};
use event_builder::status::render;
use event_builder::tracing_setup::{self, OutputFormat, TracingConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "event-builder")]
#[command(about = "Arms, times and drains line-synchronised camera nodes", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Pretty)]
    log_format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run events against simulated nodes
    Simulate {
        /// Number of events to run back to back
        #[arg(long, default_value_t = 1)]
        events: usize,

        /// Seconds from run start to trigger enable (default from config)
        #[arg(long)]
        trigger_enable_delay: Option<String>,

        /// Maximum event length in seconds (default from config)
        #[arg(long)]
        max_duration: Option<String>,

        /// Node that never reports active (repeatable)
        #[arg(long)]
        dead_node: Vec<usize>,

        /// Seconds after trigger enable at which the latch fires
        #[arg(long)]
        trigger_after: Option<f64>,

        /// Seconds after run start at which to press "Stop Event"
        #[arg(long)]
        stop_after: Option<f64>,
    },

    /// Write cam<N>-config.json for every configured node
    WriteNodeConfigs {
        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Load, validate and print the effective configuration
    CheckConfig,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = EventBuilderConfig::load_from(&path)
        .with_context(|| format!("loading {}", path.display()))?;

    let level = TracingConfig::from_app_config(&config)?.level;
    tracing_setup::init(TracingConfig::new(level).with_format(cli.log_format))?;
    config.validate()?;

    match cli.command {
        Commands::Simulate {
            events,
            trigger_enable_delay,
            max_duration,
            dead_node,
            trigger_after,
            stop_after,
        } => {
            let delay = trigger_enable_delay
                .unwrap_or_else(|| config.event.trigger_enable_delay.to_string());
            let max = max_duration.unwrap_or_else(|| config.event.max_duration.to_string());
            let settings = SimSettings {
                dead_nodes: dead_node.into_iter().collect(),
                trigger_after: seconds(trigger_after)?,
                ..SimSettings::default()
            };
            simulate(&config, events, &delay, &max, settings, seconds(stop_after)?).await
        }
        Commands::WriteNodeConfigs { out } => {
            let written =
                write_node_configs(&out, &config.camera, config.lines.node_active.len())?;
            for file in written {
                println!("{}", file.display());
            }
            Ok(())
        }
        Commands::CheckConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn seconds(value: Option<f64>) -> Result<Option<Duration>> {
    value
        .map(|s| Duration::try_from_secs_f64(s).context("expected a non-negative number of seconds"))
        .transpose()
}

async fn simulate(
    config: &EventBuilderConfig,
    events: usize,
    delay: &str,
    max: &str,
    settings: SimSettings,
    stop_after: Option<Duration>,
) -> Result<()> {
    let node_count = config.lines.node_active.len();
    let lines = MockLines::new();
    let sim = SimulatedNodes::new(lines.clone(), node_count, settings).spawn();

    let driver = LineDriver::new(Arc::new(lines), LineMap::from_config(&config.lines));
    let controller =
        EventController::new(driver, config.timing.clone(), config.storage.clone());
    let (service, handle, completed) = ControllerService::new(controller, DEFAULT_MAILBOX);
    let service = tokio::spawn(service.run());
    let writer = tokio::spawn(RecordWriter::new(completed).run());

    tokio::select! {
        result = run_events(&handle, events, delay, max, stop_after) => result?,
        _ = tokio::signal::ctrl_c() => warn!("interrupted"),
    }

    handle.shutdown().await?;
    service.await??;
    let written = writer.await?;
    sim.abort();
    info!(written, "simulation finished");
    Ok(())
}

async fn run_events(
    handle: &ControllerHandle,
    events: usize,
    delay: &str,
    max: &str,
    stop_after: Option<Duration>,
) -> Result<()> {
    let mut status = handle.status();
    for n in 0..events {
        wait_for_idle(&mut status).await?;
        info!(event = n, "arming");
        match handle.arm_from_input(delay, max).await {
            Ok(session) => println!("Event {} -> {}", n, session.directory.display()),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                println!("{}", render(&status.borrow()));
                warn!(error = %e, "event not started");
                continue;
            }
        }
        if let Some(after) = stop_after {
            tokio::time::sleep(after).await;
            handle.manual_trigger().await?;
        }
        wait_for_idle(&mut status).await?;
        println!("{}", render(&status.borrow()));
    }
    Ok(())
}

async fn wait_for_idle(
    status: &mut tokio::sync::watch::Receiver<event_builder::status::StatusSnapshot>,
) -> Result<()> {
    status
        .wait_for(|snapshot| snapshot.arm_enabled)
        .await
        .context("controller stopped")?;
    Ok(())
}
