//! bsb-daemon
//!
//! Starts the bus controller from a JSON configuration, polls the configured
//! parameters and logs every telegram except queries until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bsb_core::config::BusConfig;
use bsb_core::controller::Controller;
use bsb_core::fields::Value;
use bsb_core::messages::MessageRegistry;
use bsb_core::protocol::Command;
use chrono::Local;
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "BSB heating bus controller", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Serial device, overrides the configuration (`TEST` for the simulated bus)
    #[arg(short, long, value_name = "PORT")]
    port: Option<String>,

    /// Write the local time to the controller after start
    #[arg(long)]
    sync_time: bool,
}

/// `<config dir>/bsbcontrol/config.json`
fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bsbcontrol")
        .join("config.json")
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    let path = args.config.unwrap_or_else(default_config_path);
    let mut config = BusConfig::load(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    if let Some(port) = args.port {
        config.port = port;
    }

    let registry = Arc::new(MessageRegistry::builtin());
    let monitored = config.monitored(&registry)?;
    let driver = config
        .open_driver(Arc::clone(&registry))
        .with_context(|| format!("Failed to open {}", config.port))?;

    let controller = Controller::new(driver, config.src_address, config.controller_timing());
    controller.add_logger(|telegram| {
        if telegram.command() != Command::QUR {
            info!("{}", telegram);
        }
    });
    controller.add_callback(|name, value| match value {
        Some(value) => debug!("{} = {}", name, value),
        None => debug!("{} = null", name),
    });
    controller.set_monitored(monitored)?;

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .context("Failed to install Ctrl-C handler")?;

    controller.start()?;
    info!("bsb-daemon {} running on {}", bsb_core::VERSION, config.port);

    if args.sync_time {
        let now = Local::now().naive_local();
        match controller.set_value("datetime", Some(Value::DateTime(now))) {
            Ok(()) => info!("Controller time set to {}", now.format("%d.%m.%Y %H:%M:%S")),
            Err(e) => warn!("Failed to set controller time: {}", e),
        }
    }

    let _ = shutdown_rx.recv();
    info!("Shutting down");
    controller.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let args = Args::try_parse_from(["bsb-daemon", "-c", "bsb.json", "--port", "TEST", "--sync-time"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("bsb.json")));
        assert_eq!(args.port.as_deref(), Some("TEST"));
        assert!(args.sync_time);
    }

    #[test]
    fn test_default_config_path() {
        assert!(default_config_path().ends_with("bsbcontrol/config.json"));
    }
}
