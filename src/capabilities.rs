/// Platform queries the refresh chain asks for fresh display data.
///
/// Every query answers `None` when the platform cannot tell; the refresh
/// chain then keeps the cached value.
use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use std::{fs, path::PathBuf};

use crate::config::{DisplayConfig, MemoryConfig};
use crate::snapshot::{HdcpMode, HdrMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    pub vertical_freq: u32,
    pub physical_width_cm: u32,
    pub physical_height_cm: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpuMemory {
    pub total: u64,
    pub free: u64,
}

pub trait DisplayCapabilities: Send + Sync {
    /// Checked once at start-up; an error aborts construction.
    fn probe(&self) -> Result<()> {
        Ok(())
    }

    fn connected(&self) -> Option<bool>;

    fn active_mode(&self) -> Option<DisplayMode>;

    fn hdr_mode(&self) -> Option<HdrMode> {
        None
    }

    fn hdcp_mode(&self) -> Option<HdcpMode> {
        None
    }
}

pub trait MemoryAccounting: Send + Sync {
    fn gpu_memory(&self) -> Option<GpuMemory>;
}

/// Reads connector state from `/sys/class/drm/<connector>/`.
pub struct SysfsConnector {
    dir: PathBuf,
    hdr_mode: HdrMode,
    default_refresh_hz: Option<u32>,
}

impl SysfsConnector {
    pub fn new(config: &DisplayConfig) -> Self {
        Self {
            dir: config.drm_root.join(&config.connector),
            hdr_mode: config.hdr_mode,
            default_refresh_hz: config.default_refresh_hz,
        }
    }

    fn read(&self, name: &str) -> Option<String> {
        let path = self.dir.join(name);
        match fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Unable to read {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Parse a sysfs mode name such as `1920x1080` or `1920x1080i`.
pub fn parse_mode_name(name: &str) -> Option<(u32, u32)> {
    let (width, height) = name.trim().split_once('x')?;
    let height = height.trim_end_matches(|c: char| !c.is_ascii_digit());
    Some((width.parse().ok()?, height.parse().ok()?))
}

impl DisplayCapabilities for SysfsConnector {
    fn probe(&self) -> Result<()> {
        if !self.dir.is_dir() {
            return Err(anyhow!("Connector {} not found", self.dir.display()));
        }
        fs::metadata(self.dir.join("status"))
            .with_context(|| format!("Connector {} has no status", self.dir.display()))?;
        Ok(())
    }

    fn connected(&self) -> Option<bool> {
        let status = self.read("status")?;
        // "disconnected" and "unknown" both mean no sink.
        Some(status.trim_start().starts_with("connected"))
    }

    fn active_mode(&self) -> Option<DisplayMode> {
        let modes = self.read("modes")?;
        let first = modes.lines().find(|line| !line.trim().is_empty())?;
        let Some((width, height)) = parse_mode_name(first) else {
            debug!("Unrecognised mode name {:?}", first);
            return None;
        };
        Some(DisplayMode {
            width,
            height,
            vertical_freq: self.default_refresh_hz.unwrap_or(0),
            ..Default::default()
        })
    }

    fn hdr_mode(&self) -> Option<HdrMode> {
        Some(self.hdr_mode)
    }
}

/// Reads CMA counters from `/proc/meminfo`.
pub struct MeminfoAccounting {
    path: PathBuf,
    total_key: String,
    free_key: String,
}

impl MeminfoAccounting {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            path: config.meminfo_path.clone(),
            total_key: config.total_key.clone(),
            free_key: config.free_key.clone(),
        }
    }
}

/// Value in bytes of the `key:` line of a meminfo listing (reported in kB).
pub fn meminfo_value(text: &str, key: &str) -> Option<u64> {
    let line = text.lines().find(|line| {
        line.strip_prefix(key)
            .is_some_and(|rest| rest.starts_with(':'))
    })?;
    let digits: String = line[key.len() + 1..]
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let kb: u64 = digits.parse().ok()?;
    kb.checked_mul(1024)
}

impl MemoryAccounting for MeminfoAccounting {
    fn gpu_memory(&self) -> Option<GpuMemory> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) => {
                warn!("Unable to read {}: {}", self.path.display(), e);
                return None;
            }
        };
        Some(GpuMemory {
            total: meminfo_value(&text, &self.total_key)?,
            free: meminfo_value(&text, &self.free_key)?,
        })
    }
}
