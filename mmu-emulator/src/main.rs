//! Matrix switcher emulator - main entry point
//!
//! Serves the emulated device on the control port until interrupted, then
//! disables the listener so open connections are closed cleanly.

mod banner;
mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mmu_sim::Emulator;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "mmu_emulator=info,mmu_sim=info,mmu_matrix=info,mmu_protocol=info";

#[derive(Parser, Debug)]
#[command(name = "mmu-emulator")]
#[command(about = "AV-over-IP matrix switcher emulator")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mmu-emulator.toml")]
    config: PathBuf,

    /// Bind address for the control port, overrides the config file
    #[arg(short, long)]
    bind: Option<String>,

    /// Start with the listener disabled
    #[arg(long)]
    disabled: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long)]
    log_level: Option<String>,
}

fn init_logging(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match level {
        Some(level) => format!(
            "mmu_emulator={0},mmu_sim={0},mmu_matrix={0},mmu_protocol={0}",
            level
        )
        .into(),
        None => DEFAULT_FILTER.into(),
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    let mut config = config::load_config(&args.config)?;
    if let Some(bind) = args.bind {
        config.listener.bind = bind;
    }
    if args.disabled {
        config.listener.start_enabled = false;
    }

    let start_enabled = config.listener.start_enabled;
    let emulator = Emulator::new(config.matrix, config.device, config.listener)
        .context("building device model")?;

    if start_enabled {
        emulator
            .enable_listener()
            .await
            .context("starting listener")?;
        if let Some(addr) = emulator.local_addr().await {
            let product = emulator.device().identity().product_name.clone();
            for line in banner::lines(&product, env!("CARGO_PKG_VERSION"), addr) {
                info!("{}", line);
            }
        }
    } else {
        info!("Listener disabled at startup");
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    info!("Shutting down");

    if let Err(e) = emulator.disable_listener().await {
        warn!("Listener did not shut down cleanly: {}", e);
    }
    Ok(())
}
