/// Re-query the platform and publish the result to the snapshot and observers.
use log::info;
use std::sync::Arc;

use crate::capabilities::{DisplayCapabilities, MemoryAccounting};
use crate::observer::{ChangeReason, ObserverRegistry};
use crate::snapshot::{DisplayProperties, Snapshot};

/// Everything one refresh pass needs, owned by the subsystem instance.
#[derive(Clone)]
pub struct DisplayRefresher {
    pub display: Arc<dyn DisplayCapabilities>,
    pub memory: Arc<dyn MemoryAccounting>,
    pub snapshot: Arc<Snapshot>,
    pub observers: Arc<ObserverRegistry>,
}

/// Apply fresh platform answers on top of `previous`.
pub fn query_properties(
    display: &dyn DisplayCapabilities,
    memory: &dyn MemoryAccounting,
    previous: DisplayProperties,
) -> DisplayProperties {
    let mut next = previous;

    if let Some(connected) = display.connected() {
        next.connected = connected;
    }

    if next.connected {
        if let Some(mode) = display.active_mode() {
            next.width = mode.width;
            next.height = mode.height;
            next.vertical_freq = mode.vertical_freq;
            next.physical_width_cm = mode.physical_width_cm;
            next.physical_height_cm = mode.physical_height_cm;
        }
        if let Some(hdr) = display.hdr_mode() {
            next.hdr_mode = hdr;
        }
        if let Some(hdcp) = display.hdcp_mode() {
            next.hdcp_mode = hdcp;
        }
        if let Some(gpu) = memory.gpu_memory() {
            next.total_gpu_ram = gpu.total;
            next.free_gpu_ram = gpu.free;
        }
    } else {
        next.clear_geometry();
    }

    next
}

/// What observers should hear about going from `before` to `after`.
pub fn change_reason(before: &DisplayProperties, after: &DisplayProperties) -> Option<ChangeReason> {
    if before.connected != after.connected {
        Some(ChangeReason::HdmiChange)
    } else if !before.same_geometry(after) {
        Some(ChangeReason::ResolutionChange)
    } else if before.hdcp_mode != after.hdcp_mode {
        Some(ChangeReason::HdcpChange)
    } else if before.hdr_mode != after.hdr_mode
        || before.audio_passthrough != after.audio_passthrough
    {
        Some(ChangeReason::FormatChange)
    } else {
        None
    }
}

impl DisplayRefresher {
    /// Query, store and notify. Blocks on platform I/O; never holds a lock across it.
    pub fn refresh(&self) -> DisplayProperties {
        let next = query_properties(&*self.display, &*self.memory, self.snapshot.get());
        let previous = self.snapshot.store(next);

        info!(
            "Display refreshed: connected={} {}x{}@{}Hz hdr={:?}",
            next.connected, next.width, next.height, next.vertical_freq, next.hdr_mode
        );

        if let Some(reason) = change_reason(&previous, &next) {
            self.observers.notify(reason);
        }
        next
    }
}
