//! render-worker: runs a render session on a local worker pool.
//!
//! Loads `lumen.toml` (or defaults plus `LUMEN_*` env overrides), starts
//! one worker per configured thread, and stops after `--duration`
//! seconds. The final scheduler snapshot and throughput summary are
//! printed as JSON.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use lumen_compute::{RenderSession, SimulatedStages};
use lumen_core::config::{load_dotenv, Config};

// ── CLI ─────────────────────────────────────────────────────────────

/// Render worker that schedules trace, plot, gather and tonemap passes.
#[derive(Parser, Debug)]
#[command(name = "render-worker", version, about)]
struct Cli {
    /// Path to lumen.toml config file.
    #[arg(long, env = "LUMEN_CONFIG", default_value = "config/lumen.toml")]
    config: String,

    /// Worker threads (overrides config; 0 = available parallelism).
    #[arg(long, env = "LUMEN_WORKERS")]
    workers: Option<usize>,

    /// Image width in pixels (overrides config).
    #[arg(long)]
    width: Option<u32>,

    /// Image height in pixels (overrides config).
    #[arg(long)]
    height: Option<u32>,

    /// How long to render, in seconds.
    #[arg(long, env = "LUMEN_DURATION", default_value_t = 60)]
    duration: u64,
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = if Path::new(&cli.config).exists() {
        let cfg = Config::from_file(&cli.config)
            .with_context(|| format!("failed to load {}", cli.config))?;
        info!(path = %cli.config, "loaded config");
        cfg
    } else {
        warn!(path = %cli.config, "config file not found, using defaults");
        Config::from_env()?
    };

    if let Some(workers) = cli.workers {
        config.workers.threads = workers;
    }
    if let Some(width) = cli.width {
        config.image.width = width;
    }
    if let Some(height) = cli.height {
        config.image.height = height;
    }
    config.validate()?;
    Ok(config)
}

// ── main ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    config.log_summary();

    let stages = SimulatedStages::new(&config.image);
    let session = RenderSession::new(&config, stages).context("failed to start render session")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let timer = {
        let shutdown = Arc::clone(&shutdown);
        let duration = Duration::from_secs(cli.duration);
        std::thread::spawn(move || {
            std::thread::sleep(duration);
            info!("render duration elapsed, stopping workers");
            shutdown.store(true, Ordering::Relaxed);
        })
    };

    session.run(&shutdown)?;
    if timer.join().is_err() {
        warn!("shutdown timer panicked");
    }

    let report = serde_json::json!({
        "config": config.summary(),
        "scheduler": session.scheduler().snapshot(),
        "performance": session.scheduler().performance(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    info!("render-worker exited cleanly");
    Ok(())
}
