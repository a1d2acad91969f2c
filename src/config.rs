/// Runtime settings, optionally loaded from a TOML file.
///
/// ```toml
/// shutdown_timeout_ms = 2000
///
/// [netlink]
/// multicast_group = 2
/// receive_buffer_size = 8192
///
/// [display]
/// connector = "card0-HDMI-A-1"
/// hdr_mode = "dolby_vision"
/// default_refresh_hz = 60
///
/// [memory]
/// meminfo_path = "/proc/meminfo"
/// ```
///
/// Every key is optional.
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf, time::Duration};

use crate::snapshot::HdrMode;

/// udevd re-broadcasts on group 2 once devices are initialised; group 1 is the raw kernel feed.
pub const UDEV_MULTICAST_GROUP: u32 = 2;
const EVENT_BUFFER_SIZE: usize = 8192;
const SOCKET_BUFFER_SIZE: i32 = 1024 * 1024;
const POLL_TIMEOUT_MS: u64 = 100;
const SHUTDOWN_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub shutdown_timeout_ms: u64,
    pub netlink: NetlinkConfig,
    pub display: DisplayConfig,
    pub memory: MemoryConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NetlinkConfig {
    pub multicast_group: u32,
    pub receive_buffer_size: usize,
    pub socket_buffer_size: i32,
    /// Upper bound on how long the listener takes to notice shutdown.
    pub poll_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub drm_root: PathBuf,
    pub connector: String,
    pub hdr_mode: HdrMode,
    pub default_refresh_hz: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub meminfo_path: PathBuf,
    pub total_key: String,
    pub free_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: SHUTDOWN_TIMEOUT_MS,
            netlink: NetlinkConfig::default(),
            display: DisplayConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

impl Default for NetlinkConfig {
    fn default() -> Self {
        Self {
            multicast_group: UDEV_MULTICAST_GROUP,
            receive_buffer_size: EVENT_BUFFER_SIZE,
            socket_buffer_size: SOCKET_BUFFER_SIZE,
            poll_timeout_ms: POLL_TIMEOUT_MS,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            drm_root: PathBuf::from("/sys/class/drm"),
            connector: "card0-HDMI-A-1".to_string(),
            hdr_mode: HdrMode::Off,
            default_refresh_hz: None,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            meminfo_path: PathBuf::from("/proc/meminfo"),
            total_key: "CmaTotal".to_string(),
            free_key: "CmaFree".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&text)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl NetlinkConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}
