//! btnet daemon entry point.

use std::error::Error;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use btnet_bridge::carbon::{CarbonFactory, SinkFactory};
use btnet_bridge::config::Config;
use btnet_bridge::control::ControlServer;
use btnet_bridge::registry::DeviceRegistry;
use btnet_bridge::transport::{LinkFactory, TcpLinkFactory};
use btnet_bridge::worker::{self, DeviceWorker};

#[derive(Parser, Debug)]
#[command(name = "btnet", about = "Bridge wireless sensor devices to Carbon")]
struct Args {
    /// Path to the JSON config file.
    #[arg(short, long, default_value = "btnet.json")]
    config: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run() {
        error!("fatal: {}", err);
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;
    info!(
        "loaded {} device(s) from {}",
        config.devices.len(),
        args.config
    );

    let registry = DeviceRegistry::new();
    let control = ControlServer::bind(&format!("0.0.0.0:{}", config.control_port), registry.clone())?;
    info!("control channel on port {}", config.control_port);
    control.spawn()?;

    let links: Arc<dyn LinkFactory> = Arc::new(TcpLinkFactory);
    let sinks: Arc<dyn SinkFactory> = Arc::new(CarbonFactory);

    for device in config.devices {
        info!("[{}] starting worker for {}", device.name, device.address);
        let worker = DeviceWorker::new(device, registry.clone(), links.clone(), sinks.clone());
        worker::spawn(worker)?;
        // Stagger connection attempts so devices do not all dial the
        // backend at once.
        thread::sleep(Duration::from_secs(1));
    }

    ctrlc::set_handler(|| {
        info!("interrupted");
        process::exit(0);
    })?;

    loop {
        thread::park();
    }
}
