//! HDMI hotplug detection and display property refresh.
//!
//! A netlink listener watches udev's multicast group for DRM hotplug
//! uevents and signals a single-flight refresh worker, which re-queries the
//! platform, swaps in a new [`snapshot::DisplayProperties`] and tells the
//! registered [`observer::DisplayObserver`]s what changed.

pub mod capabilities;
pub mod config;
pub mod coordinator;
pub mod netlink;
pub mod observer;
pub mod refresh;
pub mod snapshot;
pub mod uevent;

#[cfg(test)]
mod test_utils;

use anyhow::{Context, Result};
use log::info;
use std::sync::Arc;

use capabilities::{DisplayCapabilities, MemoryAccounting, MeminfoAccounting, SysfsConnector};
use config::Config;
use coordinator::{CoordinatorState, RefreshCoordinator, RefreshJob, RefreshSignal};
use netlink::{ListenerHandle, NetlinkEventSource, NetlinkSocket, UeventSocket};
use observer::{DisplayObserver, ObserverRegistry};
use refresh::DisplayRefresher;
use snapshot::{DisplayProperties, HdcpMode, HdrMode, Snapshot};

/// The running subsystem: listener, refresh worker, snapshot and observers.
pub struct DisplayInfo {
    config: Config,
    snapshot: Arc<Snapshot>,
    observers: Arc<ObserverRegistry>,
    coordinator: RefreshCoordinator,
    listener: ListenerHandle,
}

impl DisplayInfo {
    /// Start on the real uevent socket with the sysfs and meminfo providers.
    pub async fn start(config: Config) -> Result<Self> {
        let display: Arc<dyn DisplayCapabilities> = Arc::new(SysfsConnector::new(&config.display));
        let memory: Arc<dyn MemoryAccounting> = Arc::new(MeminfoAccounting::new(&config.memory));
        let source = NetlinkEventSource::<NetlinkSocket>::bind(&config.netlink)?;
        Self::start_with(config, source, display, memory).await
    }

    /// Start with an explicit event source and providers.
    ///
    /// The snapshot is populated once before this returns, so observers
    /// registered afterwards never see the zeroed default.
    pub async fn start_with<S: UeventSocket + 'static>(
        config: Config,
        source: NetlinkEventSource<S>,
        display: Arc<dyn DisplayCapabilities>,
        memory: Arc<dyn MemoryAccounting>,
    ) -> Result<Self> {
        display.probe().context("Display capability provider unavailable")?;

        let refresher = DisplayRefresher {
            display,
            memory,
            snapshot: Arc::new(Snapshot::new()),
            observers: Arc::new(ObserverRegistry::new()),
        };

        let initial = refresher.clone();
        tokio::task::spawn_blocking(move || initial.refresh())
            .await
            .context("Initial display refresh failed")?;

        let snapshot = refresher.snapshot.clone();
        let observers = refresher.observers.clone();
        let job: RefreshJob = Arc::new(move || {
            refresher.refresh();
        });

        let signal = RefreshSignal::new();
        let coordinator = RefreshCoordinator::spawn(signal.clone(), job);
        let listener = source.spawn(signal);

        info!("Display info subsystem started");
        Ok(Self {
            config,
            snapshot,
            observers,
            coordinator,
            listener,
        })
    }

    /// Close the socket and drain the refresh worker, each bounded by the shutdown timeout.
    pub async fn stop(self) -> bool {
        let limit = self.config.shutdown_timeout();
        let listener_done = self.listener.stop(limit).await;
        let coordinator_done = self.coordinator.stop(limit).await;
        info!("Display info subsystem stopped");
        listener_done && coordinator_done
    }

    /// Ask for a refresh as if a hotplug had been received.
    pub fn request_refresh(&self) {
        self.coordinator.signal().raise();
    }

    pub fn coordinator_state(&self) -> CoordinatorState {
        self.coordinator.state()
    }

    pub fn register(&self, observer: Arc<dyn DisplayObserver>) {
        self.observers.register(observer);
    }

    pub fn unregister(&self, observer: &Arc<dyn DisplayObserver>) {
        self.observers.unregister(observer);
    }

    pub fn properties(&self) -> DisplayProperties {
        self.snapshot.get()
    }

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    pub fn connected(&self) -> bool {
        self.snapshot.connected()
    }

    pub fn width(&self) -> u32 {
        self.snapshot.width()
    }

    pub fn height(&self) -> u32 {
        self.snapshot.height()
    }

    pub fn vertical_freq(&self) -> u32 {
        self.snapshot.vertical_freq()
    }

    pub fn physical_size_cm(&self) -> (u32, u32) {
        let props = self.snapshot.get();
        (props.physical_width_cm, props.physical_height_cm)
    }

    pub fn hdr_setting(&self) -> HdrMode {
        self.snapshot.hdr_mode()
    }

    pub fn hdcp_protection(&self) -> HdcpMode {
        self.snapshot.hdcp_mode()
    }

    pub fn audio_passthrough(&self) -> bool {
        self.snapshot.audio_passthrough()
    }

    pub fn total_gpu_ram(&self) -> u64 {
        self.snapshot.total_gpu_ram()
    }

    pub fn free_gpu_ram(&self) -> u64 {
        self.snapshot.free_gpu_ram()
    }

    // EDID, port naming and HDR capability lists are not tracked here.

    pub fn edid(&self) -> Option<Vec<u8>> {
        None
    }

    pub fn port_name(&self) -> Option<String> {
        None
    }

    pub fn tv_hdr_capabilities(&self) -> Option<Vec<HdrMode>> {
        None
    }

    pub fn stb_hdr_capabilities(&self) -> Option<Vec<HdrMode>> {
        None
    }
}
