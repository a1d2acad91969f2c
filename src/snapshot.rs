/// Cached display properties shared between the refresh path and readers.
use serde::Deserialize;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HdrMode {
    #[default]
    Off,
    Hdr10,
    Hdr10Plus,
    Hlg,
    DolbyVision,
    TechnicolorPrime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HdcpMode {
    #[default]
    Unencrypted,
    Hdcp1x,
    Hdcp2x,
    HdcpAuto,
}

/// One consistent view of the display.
///
/// Geometry and refresh fields are zero whenever `connected` is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayProperties {
    pub connected: bool,
    pub width: u32,
    pub height: u32,
    pub physical_width_cm: u32,
    pub physical_height_cm: u32,
    pub vertical_freq: u32,
    pub hdr_mode: HdrMode,
    pub hdcp_mode: HdcpMode,
    pub audio_passthrough: bool,
    pub total_gpu_ram: u64,
    pub free_gpu_ram: u64,
}

impl DisplayProperties {
    pub fn clear_geometry(&mut self) {
        self.width = 0;
        self.height = 0;
        self.physical_width_cm = 0;
        self.physical_height_cm = 0;
        self.vertical_freq = 0;
    }

    pub fn same_geometry(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.physical_width_cm == other.physical_width_cm
            && self.physical_height_cm == other.physical_height_cm
            && self.vertical_freq == other.vertical_freq
    }
}

/// Starts out disconnected and zeroed. Only the refresh chain writes it.
#[derive(Debug, Default)]
pub struct Snapshot {
    inner: Mutex<DisplayProperties>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DisplayProperties> {
        // Every critical section is a plain copy, so a poisoned value is still whole.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of every field taken under a single lock.
    pub fn get(&self) -> DisplayProperties {
        *self.lock()
    }

    /// Replace the whole snapshot, returning the previous value.
    pub(crate) fn store(&self, next: DisplayProperties) -> DisplayProperties {
        std::mem::replace(&mut *self.lock(), next)
    }

    pub fn connected(&self) -> bool {
        self.lock().connected
    }

    pub fn width(&self) -> u32 {
        self.lock().width
    }

    pub fn height(&self) -> u32 {
        self.lock().height
    }

    pub fn physical_width_cm(&self) -> u32 {
        self.lock().physical_width_cm
    }

    pub fn physical_height_cm(&self) -> u32 {
        self.lock().physical_height_cm
    }

    pub fn vertical_freq(&self) -> u32 {
        self.lock().vertical_freq
    }

    pub fn hdr_mode(&self) -> HdrMode {
        self.lock().hdr_mode
    }

    pub fn hdcp_mode(&self) -> HdcpMode {
        self.lock().hdcp_mode
    }

    pub fn audio_passthrough(&self) -> bool {
        self.lock().audio_passthrough
    }

    pub fn total_gpu_ram(&self) -> u64 {
        self.lock().total_gpu_ram
    }

    pub fn free_gpu_ram(&self) -> u64 {
        self.lock().free_gpu_ram
    }
}
