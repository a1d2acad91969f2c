#![allow(dead_code)]

use hdmi_hotplug::capabilities::{DisplayCapabilities, DisplayMode, GpuMemory, MemoryAccounting};
use hdmi_hotplug::netlink::UeventSocket;
use hdmi_hotplug::uevent::{UDEV_MONITOR_MAGIC, UDEV_PREFIX, UEVENT_HEADER_LEN};
use std::{
    collections::VecDeque,
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

pub const HOTPLUG: &[u8] = b"ACTION=change\0DEVPATH=/devices/platform/drm/drm/card0\0\
    SUBSYSTEM=drm\0HOTPLUG=1\0DEVNAME=/dev/dri/card0\0DEVTYPE=drm_minor\0SEQNUM=2817\0";

pub const NOT_HOTPLUG: &[u8] = b"ACTION=change\0SUBSYSTEM=drm\0HOTPLUG=0\0DEVTYPE=drm_minor\0";

pub fn datagram(properties: &[u8], bloom_hi: u32, bloom_lo: u32) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(UDEV_PREFIX);
    data.extend_from_slice(&UDEV_MONITOR_MAGIC.to_be_bytes());
    for field in [
        UEVENT_HEADER_LEN as u32,
        UEVENT_HEADER_LEN as u32,
        properties.len() as u32,
        0xaaaa,
        0xbbbb,
        bloom_hi,
        bloom_lo,
    ] {
        data.extend_from_slice(&field.to_ne_bytes());
    }
    data.extend_from_slice(properties);
    data
}

/// In-memory datagram queue standing in for the netlink socket.
#[derive(Clone, Default)]
pub struct FakeSocket {
    pending: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl FakeSocket {
    pub fn push(&self, datagram: Vec<u8>) {
        self.pending.lock().unwrap().push_back(datagram);
    }
}

impl UeventSocket for FakeSocket {
    fn wait_readable(&mut self, limit: Duration) -> io::Result<bool> {
        if self.pending.lock().unwrap().is_empty() {
            std::thread::sleep(limit);
            return Ok(false);
        }
        Ok(true)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let Some(datagram) = self.pending.lock().unwrap().pop_front() else {
            return Ok(None);
        };
        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        Ok(Some(datagram.len()))
    }
}

pub const MODE_4K: DisplayMode = DisplayMode {
    width: 3840,
    height: 2160,
    vertical_freq: 60,
    physical_width_cm: 121,
    physical_height_cm: 68,
};

/// Display whose connector state tests flip at will.
pub struct ToggleDisplay {
    pub connected: AtomicBool,
    pub queries: AtomicUsize,
    pub reachable: bool,
}

impl ToggleDisplay {
    pub fn new(connected: bool) -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(connected),
            queries: AtomicUsize::new(0),
            reachable: true,
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(false),
            queries: AtomicUsize::new(0),
            reachable: false,
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl DisplayCapabilities for ToggleDisplay {
    fn probe(&self) -> anyhow::Result<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(anyhow::anyhow!("connector missing"))
        }
    }

    fn connected(&self) -> Option<bool> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Some(self.connected.load(Ordering::SeqCst))
    }

    fn active_mode(&self) -> Option<DisplayMode> {
        Some(MODE_4K)
    }
}

pub struct FixedMemory;

impl MemoryAccounting for FixedMemory {
    fn gpu_memory(&self) -> Option<GpuMemory> {
        Some(GpuMemory {
            total: 512 * 1024 * 1024,
            free: 128 * 1024 * 1024,
        })
    }
}
