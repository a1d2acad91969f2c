/// Test utilities and sample uevent datagrams

use crate::uevent::{UDEV_MONITOR_MAGIC, UDEV_PREFIX, UEVENT_HEADER_LEN};

/// Sample properties blobs as udevd forwards them
pub mod sample_properties {
    /// HDMI connector change on card0
    pub const DRM_HOTPLUG: &[u8] = b"ACTION=change\0\
        DEVPATH=/devices/platform/drm/drm/card0\0\
        SUBSYSTEM=drm\0\
        HOTPLUG=1\0\
        DEVNAME=/dev/dri/card0\0\
        DEVTYPE=drm_minor\0\
        SEQNUM=2817\0\
        MAJOR=226\0\
        MINOR=0\0";

    /// Same device without the hotplug flag
    pub const DRM_CHANGE: &[u8] = b"ACTION=change\0\
        SUBSYSTEM=drm\0\
        DEVNAME=/dev/dri/card0\0\
        DEVTYPE=drm_minor\0";

    /// Unrelated block device event on the same group
    pub const BLOCK_CHANGE: &[u8] = b"ACTION=change\0\
        SUBSYSTEM=block\0\
        DEVNAME=/dev/loop0\0\
        DEVTYPE=disk\0\
        HOTPLUG=1\0";
}

/// Build a udev monitor datagram around `properties`.
pub fn make_datagram(properties: &[u8], bloom_hi: u32, bloom_lo: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(UEVENT_HEADER_LEN + properties.len());
    data.extend_from_slice(UDEV_PREFIX);
    data.extend_from_slice(&UDEV_MONITOR_MAGIC.to_be_bytes());
    data.extend_from_slice(&(UEVENT_HEADER_LEN as u32).to_ne_bytes());
    data.extend_from_slice(&(UEVENT_HEADER_LEN as u32).to_ne_bytes());
    data.extend_from_slice(&(properties.len() as u32).to_ne_bytes());
    data.extend_from_slice(&0x1234_5678u32.to_ne_bytes());
    data.extend_from_slice(&0x9abc_def0u32.to_ne_bytes());
    data.extend_from_slice(&bloom_hi.to_ne_bytes());
    data.extend_from_slice(&bloom_lo.to_ne_bytes());
    data.extend_from_slice(properties);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_datagram_layout() {
        let data = make_datagram(b"A=1\0", 1, 2);
        assert_eq!(data.len(), UEVENT_HEADER_LEN + 4);
        assert_eq!(&data[..8], UDEV_PREFIX);
        assert_eq!(&data[UEVENT_HEADER_LEN..], b"A=1\0");
    }

    #[test]
    fn test_sample_properties_terminated() {
        for blob in [
            sample_properties::DRM_HOTPLUG,
            sample_properties::DRM_CHANGE,
            sample_properties::BLOCK_CHANGE,
        ] {
            assert_eq!(blob.last(), Some(&0));
        }
    }
}
