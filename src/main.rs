use anyhow::Result;
use hdmi_hotplug::{
    DisplayInfo,
    config::Config,
    observer::{ChangeReason, DisplayObserver},
    snapshot::Snapshot,
};
use log::{info, warn};
use std::{env, path::PathBuf, sync::Arc};
use tokio::signal;

/// Logs the new snapshot whenever the display changes.
struct LogObserver {
    snapshot: Arc<Snapshot>,
}

impl DisplayObserver for LogObserver {
    fn updated(&self, reason: ChangeReason) {
        let props = self.snapshot.get();
        if props.connected {
            info!(
                "{:?}: {}x{}@{}Hz ({}x{} cm), hdr={:?}, hdcp={:?}, gpu ram {}/{} bytes free",
                reason,
                props.width,
                props.height,
                props.vertical_freq,
                props.physical_width_cm,
                props.physical_height_cm,
                props.hdr_mode,
                props.hdcp_mode,
                props.free_gpu_ram,
                props.total_gpu_ram
            );
        } else {
            info!("{:?}: display disconnected", reason);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let config = match env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => {
            info!("Loading config from {}", path.display());
            Config::load(&path)?
        }
        None => Config::default(),
    };

    info!("Starting HDMI hotplug monitor...");
    let display = DisplayInfo::start(config).await?;

    let props = display.properties();
    info!(
        "Initial state: connected={} {}x{}@{}Hz",
        props.connected, props.width, props.height, props.vertical_freq
    );

    let observer: Arc<dyn DisplayObserver> = Arc::new(LogObserver {
        snapshot: display.snapshot().clone(),
    });
    display.register(observer.clone());

    info!("Listening for HDMI hotplug events... (Press Ctrl+C to stop)");
    wait_for_shutdown().await?;

    display.unregister(&observer);
    if !display.stop().await {
        warn!("Shutdown timed out");
    }

    info!("HDMI hotplug monitor stopped");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
    Ok(())
}
