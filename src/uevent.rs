/// Parsing of udev monitor datagrams received on the uevent netlink socket.
///
/// Layout (native endian unless noted):
/// [8: "libudev\0"] [4: magic, network order] [4: header size]
/// [4: properties offset] [4: properties length] [4: subsystem hash]
/// [4: devtype hash] [4: tag bloom hi] [4: tag bloom lo]
/// followed by `KEY=VALUE\0KEY=VALUE\0...` at the declared offset.
use std::fmt;

pub const UDEV_PREFIX: &[u8; 8] = b"libudev\0";
pub const UDEV_MONITOR_MAGIC: u32 = 0xfeed_cafe;
pub const UEVENT_HEADER_LEN: usize = 40;

pub const DRM_MINOR_TOKEN: &str = "DEVTYPE=drm_minor";
pub const HOTPLUG_TOKEN: &str = "HOTPLUG=1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UeventHeader {
    pub prefix: [u8; 8],
    pub magic: u32,
    pub header_size: u32,
    pub properties_off: u32,
    pub properties_len: u32,
    pub filter_subsystem_hash: u32,
    pub filter_devtype_hash: u32,
    pub filter_tag_bloom_hi: u32,
    pub filter_tag_bloom_lo: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    TooShort { len: usize },
    BadMagic,
    PropertiesOutOfBounds { start: usize, end: usize, len: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::TooShort { len } => write!(
                f,
                "datagram of {} bytes is shorter than the {}-byte header",
                len, UEVENT_HEADER_LEN
            ),
            DecodeError::BadMagic => write!(f, "missing libudev prefix or monitor magic"),
            DecodeError::PropertiesOutOfBounds { start, end, len } => write!(
                f,
                "properties span bytes {}..{} but must lie within {}..{}",
                start, end, UEVENT_HEADER_LEN, len
            ),
        }
    }
}

impl std::error::Error for DecodeError {}

fn read_u32(data: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[at..at + 4]);
    u32::from_ne_bytes(bytes)
}

impl UeventHeader {
    /// Decode the fixed header from the front of a datagram.
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < UEVENT_HEADER_LEN {
            return Err(DecodeError::TooShort { len: data.len() });
        }

        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&data[0..8]);

        Ok(UeventHeader {
            prefix,
            magic: u32::from_be(read_u32(data, 8)),
            header_size: read_u32(data, 12),
            properties_off: read_u32(data, 16),
            properties_len: read_u32(data, 20),
            filter_subsystem_hash: read_u32(data, 24),
            filter_devtype_hash: read_u32(data, 28),
            filter_tag_bloom_hi: read_u32(data, 32),
            filter_tag_bloom_lo: read_u32(data, 36),
        })
    }

    pub fn is_udev_message(&self) -> bool {
        &self.prefix == UDEV_PREFIX && self.magic == UDEV_MONITOR_MAGIC
    }

    /// Messages without both bloom tags carry no parseable properties blob.
    pub fn has_filter_tags(&self) -> bool {
        self.filter_tag_bloom_hi != 0 && self.filter_tag_bloom_lo != 0
    }

    /// The properties region of `data`. It must start after the header and
    /// end within the received length.
    pub fn properties<'a>(&self, data: &'a [u8]) -> Result<&'a [u8], DecodeError> {
        let start = self.properties_off as usize;
        let end = start.saturating_add(self.properties_len as usize);
        if start < UEVENT_HEADER_LEN || end > data.len() {
            return Err(DecodeError::PropertiesOutOfBounds {
                start,
                end,
                len: data.len(),
            });
        }
        Ok(&data[start..end])
    }
}

/// Split a properties blob into its `KEY=VALUE` tokens, in order.
///
/// Scanning never leaves `blob`; a trailing run with no NUL terminator is
/// treated as the end of the message and dropped.
pub fn decode_properties(blob: &[u8]) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < blob.len() {
        let Some(nul) = blob[pos..].iter().position(|&b| b == 0) else {
            break;
        };
        let run = &blob[pos..pos + nul];
        if !run.is_empty() {
            tokens.push(String::from_utf8_lossy(run).into_owned());
        }
        pos += nul + 1;
    }

    tokens
}

/// True iff the tokens describe a DRM minor device with the hotplug flag set.
pub fn is_drm_hotplug(tokens: &[String]) -> bool {
    let drm = tokens.iter().any(|t| t == DRM_MINOR_TOKEN);
    let hotplug = tokens.iter().any(|t| t == HOTPLUG_TOKEN);
    drm && hotplug
}

/// Run a whole datagram through header checks, decoding and `classify`.
///
/// `classify` is only called for udev messages that carry both bloom tags.
pub fn classify_datagram<F>(data: &[u8], classify: F) -> Result<bool, DecodeError>
where
    F: FnOnce(&[String]) -> bool,
{
    let header = UeventHeader::parse(data)?;
    if !header.is_udev_message() {
        return Err(DecodeError::BadMagic);
    }
    if !header.has_filter_tags() {
        return Ok(false);
    }
    let tokens = decode_properties(header.properties(data)?);
    Ok(classify(&tokens))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{make_datagram, sample_properties};

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_header_fields() {
        let data = make_datagram(sample_properties::DRM_HOTPLUG, 1, 2);
        let header = UeventHeader::parse(&data).unwrap();

        assert!(header.is_udev_message());
        assert_eq!(header.header_size as usize, UEVENT_HEADER_LEN);
        assert_eq!(header.properties_off as usize, UEVENT_HEADER_LEN);
        assert_eq!(
            header.properties_len as usize,
            sample_properties::DRM_HOTPLUG.len()
        );
        assert!(header.has_filter_tags());
    }

    #[test]
    fn test_parse_header_too_short() {
        assert_eq!(
            UeventHeader::parse(&[0u8; 12]),
            Err(DecodeError::TooShort { len: 12 })
        );
        assert_eq!(
            UeventHeader::parse(&[]),
            Err(DecodeError::TooShort { len: 0 })
        );
    }

    #[test]
    fn test_properties_past_end_rejected() {
        let mut data = make_datagram(b"DEVTYPE=drm_minor\0", 1, 1);
        let len = data.len();
        data.truncate(len - 4);

        let header = UeventHeader::parse(&data).unwrap();
        assert!(matches!(
            header.properties(&data),
            Err(DecodeError::PropertiesOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_properties_inside_header_rejected() {
        let mut data = make_datagram(sample_properties::DRM_HOTPLUG, 1, 1);
        data[16..20].copy_from_slice(&0u32.to_ne_bytes());
        data[20..24].copy_from_slice(&8u32.to_ne_bytes());

        let header = UeventHeader::parse(&data).unwrap();
        assert_eq!(
            header.properties(&data),
            Err(DecodeError::PropertiesOutOfBounds {
                start: 0,
                end: 8,
                len: data.len()
            })
        );
        assert!(classify_datagram(&data, is_drm_hotplug).is_err());
    }

    #[test]
    fn test_decode_simple_blob() {
        let decoded = decode_properties(b"ACTION=change\0DEVTYPE=drm_minor\0HOTPLUG=1\0");
        assert_eq!(
            decoded,
            tokens(&["ACTION=change", "DEVTYPE=drm_minor", "HOTPLUG=1"])
        );
    }

    #[test]
    fn test_decode_empty_blob() {
        assert!(decode_properties(b"").is_empty());
    }

    #[test]
    fn test_decode_unterminated_tail_is_end_of_message() {
        let decoded = decode_properties(b"SUBSYSTEM=drm\0HOTPLUG=1");
        assert_eq!(decoded, tokens(&["SUBSYSTEM=drm"]));
    }

    #[test]
    fn test_decode_stops_at_declared_length() {
        let blob = b"A=1\0B=2\0C=3\0";
        for limit in 0..=blob.len() {
            let decoded = decode_properties(&blob[..limit]);
            let consumed: usize = decoded.iter().map(|t| t.len() + 1).sum();
            assert!(consumed <= limit, "consumed {} of {}", consumed, limit);
        }
    }

    #[test]
    fn test_classify_drm_hotplug() {
        assert!(is_drm_hotplug(&tokens(&["DEVTYPE=drm_minor", "HOTPLUG=1"])));
        assert!(!is_drm_hotplug(&tokens(&["DEVTYPE=drm_minor", "HOTPLUG=0"])));
        assert!(!is_drm_hotplug(&tokens(&["HOTPLUG=1"])));
        assert!(!is_drm_hotplug(&tokens(&["devtype=drm_minor", "HOTPLUG=1"])));
        assert!(!is_drm_hotplug(&tokens(&["DEVTYPE=drm_minor_x", "HOTPLUG=1"])));
    }

    #[test]
    fn test_classify_datagram_hotplug() {
        let data = make_datagram(b"DEVTYPE=drm_minor\0HOTPLUG=1\0", 3, 4);
        assert_eq!(classify_datagram(&data, is_drm_hotplug), Ok(true));

        let data = make_datagram(b"DEVTYPE=drm_minor\0HOTPLUG=0\0", 3, 4);
        assert_eq!(classify_datagram(&data, is_drm_hotplug), Ok(false));
    }

    #[test]
    fn test_zero_bloom_skips_classifier() {
        for (hi, lo) in [(0, 0), (0, 7), (7, 0)] {
            let data = make_datagram(sample_properties::DRM_HOTPLUG, hi, lo);
            let result = classify_datagram(&data, |_| panic!("classifier must not run"));
            assert_eq!(result, Ok(false));
        }
    }

    #[test]
    fn test_kernel_message_rejected() {
        let data = b"change@/devices/platform/drm/card0\0ACTION=change\0HOTPLUG=1\0xxxxxxxx";
        assert_eq!(
            classify_datagram(data, is_drm_hotplug),
            Err(DecodeError::BadMagic)
        );
    }

    #[test]
    fn test_decode_error_display() {
        assert_eq!(
            DecodeError::TooShort { len: 3 }.to_string(),
            "datagram of 3 bytes is shorter than the 40-byte header"
        );
    }
}
