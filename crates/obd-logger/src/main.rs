//! OBD Logger - Main Entry Point

use anyhow::Context;
use clap::Parser;
use obd_logger::config::{Cli, LoggerConfig};
use obd_logger::signals::ControlFlags;
use obd_logger::{init_logging, launch, list_capabilities};
use obd_protocol::lookup;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("obd-logger: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = LoggerConfig::load(&cli)?;
    init_logging(&config.log_level)
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to set up logging")?;

    info!("=== OBD Logger v{} ===", env!("CARGO_PKG_VERSION"));

    if cli.capabilities {
        let capabilities = list_capabilities(&config)
            .await
            .with_context(|| format!("Couldn't query OBD adapter on {}", config.serial_port))?;
        for capability in capabilities.iter() {
            let description = lookup(capability.pid).map_or("", |spec| spec.description);
            println!("{:02X} {:<24} {}", capability.pid, capability.column, description);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let summary = match launch(&config, ControlFlags::new()).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    info!(
        "Drive session {} done: {} samples, {} messages sent, {} failed",
        summary.session, summary.ticks, summary.messages_sent, summary.messages_failed
    );
    Ok(if summary.stop.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
