//! Device-id list parsing, used by the host interface to name network adapters. A device id list
//! is `;`-separated; each segment is either empty or a single-letter type tag followed by a
//! type-specific body. Only the MAC-typed form (`M` + six colon-separated hex octets) is defined
//! so far.

pub const MAX_DEVICE_ID_ENTRIES: usize = 32;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DeviceIdError {
    #[error("unknown device id type tag '{0}'")]
    UnknownTag(char),
    #[error("invalid MAC address")]
    InvalidMac,
    #[error("too many device id entries (max {MAX_DEVICE_ID_ENTRIES})")]
    TooManyEntries,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceIdEntry {
    /// An empty segment between two `;` separators (or the list's ends).
    Empty,
    Mac([u8; 6]),
}

pub fn parse_list(
    s: &str,
) -> Result<heapless::Vec<DeviceIdEntry, MAX_DEVICE_ID_ENTRIES>, DeviceIdError> {
    let mut entries = heapless::Vec::new();
    for segment in s.split(';') {
        entries
            .push(parse_entry(segment)?)
            .map_err(|_| DeviceIdError::TooManyEntries)?;
    }
    Ok(entries)
}

fn parse_entry(segment: &str) -> Result<DeviceIdEntry, DeviceIdError> {
    let mut chars = segment.chars();
    match chars.next() {
        None => Ok(DeviceIdEntry::Empty),
        Some('M') => parse_mac(chars.as_str()).map(DeviceIdEntry::Mac),
        Some(other) => Err(DeviceIdError::UnknownTag(other)),
    }
}

fn parse_mac(body: &str) -> Result<[u8; 6], DeviceIdError> {
    let mut bytes = [0u8; 6];
    let mut parts = body.split(':');

    for byte in bytes.iter_mut() {
        let part = parts.next().ok_or(DeviceIdError::InvalidMac)?;
        *byte = u8::from_str_radix(part, 16).map_err(|_| DeviceIdError::InvalidMac)?;
    }

    if parts.next().is_some() {
        return Err(DeviceIdError::InvalidMac);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_mac() {
        let entries = parse_list("M01:23:45:67:89:AB").unwrap();
        assert_eq!(
            entries.as_slice(),
            &[DeviceIdEntry::Mac([0x01, 0x23, 0x45, 0x67, 0x89, 0xab])]
        );
    }

    #[test]
    fn short_mac_is_invalid() {
        assert_eq!(parse_list("M00:11"), Err(DeviceIdError::InvalidMac));
    }

    #[test]
    fn empty_segments_yield_empty_entries() {
        let entries = parse_list(";;M01:23:45:67:89:AB").unwrap();
        assert_eq!(
            entries.as_slice(),
            &[
                DeviceIdEntry::Empty,
                DeviceIdEntry::Empty,
                DeviceIdEntry::Mac([0x01, 0x23, 0x45, 0x67, 0x89, 0xab]),
            ]
        );
    }
}
