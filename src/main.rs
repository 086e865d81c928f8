//! rover-bridge - command/telemetry bridge daemon
//!
//! ```text
//! rover-bridge <PORT> <TOKEN> [--config PATH] [--dry-run]
//! ```
//!
//! PORT and TOKEN form the local service URI handed to the device drivers.
//! The process only exits nonzero on unrecoverable startup failures
//! (configuration, connection exhaustion).

use clap::Parser;
use rover_bridge::app::{build_control_loop, create_channel};
use rover_bridge::config::{Config, ServiceUri};
use rover_bridge::link::{Channel, LoopbackBroker, loopback};
use rover_bridge::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Local service port
    port: u16,

    /// Local service access token
    token: String,

    /// Configuration file
    #[arg(short, long, default_value = "/etc/rover-bridge.toml")]
    config: PathBuf,

    /// Run against an in-process broker instead of the configured transport
    #[arg(long)]
    dry_run: bool,
}

/// Log everything the loopback broker receives
fn spawn_telemetry_echo(broker: LoopbackBroker) -> Result<()> {
    thread::Builder::new()
        .name("telemetry-echo".to_string())
        .spawn(move || {
            for msg in broker.published().iter() {
                log::info!(
                    "[dry-run] {} <- {}",
                    msg.topic,
                    String::from_utf8_lossy(&msg.payload)
                );
            }
        })
        .map_err(|e| Error::Other(format!("Failed to spawn telemetry echo: {}", e)))?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::info!("rover-bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let service = ServiceUri::new(args.port, args.token);
    log::info!("Using config: {}", args.config.display());
    let config = Config::load(&args.config, &service)?;

    let (channel, broker) = if args.dry_run {
        log::info!("Dry run: using in-process broker");
        let (channel, broker) = loopback();
        (Box::new(channel) as Box<dyn Channel>, Some(broker))
    } else {
        create_channel(&config.link)
    };
    if let Some(broker) = broker {
        spawn_telemetry_echo(broker)?;
    }

    let mut control = build_control_loop(&config, &service, channel)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    control.run(&running)?;

    log::info!("rover-bridge stopped");
    Ok(())
}
