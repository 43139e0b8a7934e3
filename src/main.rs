// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/mediaguard

//! MediaGuard - Real-Time Content Warning Engine
//!
//! Headless runner: wires simulated or embedder-supplied detector adapters
//! into the orchestrator and prints emitted warnings until shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use mediaguard::{Config, Modality, Orchestrator, SimulatedAdapter, VERSION};

/// MediaGuard - real-time content warning detection and fusion
#[derive(Parser, Debug)]
#[command(name = "mediaguard")]
#[command(author = "MediaGuard Project")]
#[command(version = VERSION)]
#[command(about = "Real-time content warning orchestration and confidence fusion")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Demo mode with simulated detector adapters
    #[arg(long)]
    demo: bool,

    /// Stop automatically after this many seconds (0 = run until Ctrl+C)
    #[arg(long, default_value = "0")]
    run_secs: u64,

    /// Print session statistics as JSON on shutdown
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("MediaGuard v{} - Real-Time Content Warning Engine", VERSION);

    let config_path = args.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;
    if args.demo {
        config.demo_mode = true;
    }
    info!("Configuration loaded from {:?}", config_path);
    info!("Demo mode: {}", config.demo_mode);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, args.run_secs, args.json))
}

async fn run(config: Config, run_secs: u64, json: bool) -> Result<()> {
    let demo_mode = config.demo_mode;
    let orchestrator = Arc::new(Orchestrator::new(config));

    if demo_mode {
        info!("Adding simulated detector adapters...");
        for (id, modality) in [
            ("sim-subtitle", Modality::SubtitleCue),
            ("sim-audio", Modality::AudioEnvelope),
            ("sim-frame", Modality::FrameColor),
            ("sim-flash", Modality::FlashPattern),
        ] {
            orchestrator.register_adapter(Arc::new(SimulatedAdapter::new(id, modality)));
        }
    }

    orchestrator.on_warning(Box::new(|warning| {
        info!(
            "⚠ {:?} [{:.1}s - {:.1}s] confidence {} via {:?}",
            warning.category,
            warning.start_time,
            warning.end_time,
            warning.confidence,
            warning.sources
        );
    }));

    orchestrator.initialize().await?;
    info!("MediaGuard running, press Ctrl+C to shutdown");

    if run_secs > 0 {
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(run_secs)) => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    } else {
        tokio::signal::ctrl_c().await?;
    }

    info!("Shutdown signal received, cleaning up...");
    let stats = orchestrator.get_stats();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        info!(
            "Session: {} detections, {} fused, {} warnings emitted, {} rate-limited",
            stats.per_stage.received,
            stats.per_stage.fused,
            stats.per_stage.emitted,
            stats.per_stage.rate_limited
        );
    }

    orchestrator.dispose().await;
    info!("MediaGuard shutdown complete");
    Ok(())
}
