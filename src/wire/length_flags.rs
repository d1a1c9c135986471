//! The 2-byte "length + flags" field carried by every sub-command.

/// Data length of a sub-command's payload, packed into the low 11 bits of a 16-bit word; the
/// remaining 5 bits are reserved and always zero on encode, ignored on decode.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
pub struct LengthFlags {
    length: u16,
}

const LENGTH_MASK: u16 = 0x07ff;

impl LengthFlags {
    pub const fn new(length: u16) -> Self {
        debug_assert!(length <= LENGTH_MASK, "sub-command payload too long");

        Self {
            length: length & LENGTH_MASK,
        }
    }

    pub const fn len(self) -> u16 {
        self.length
    }
}

impl fieldring_wire::WireWrite for LengthFlags {
    fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8] {
        let buf = &mut buf[0..2];
        buf.copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    fn packed_len(&self) -> usize {
        2
    }
}

impl fieldring_wire::WireRead for LengthFlags {
    fn unpack_from_slice(buf: &[u8]) -> Result<Self, fieldring_wire::WireError> {
        let buf = buf
            .get(0..2)
            .ok_or(fieldring_wire::WireError::ReadBufferTooShort {
                expected: 2,
                got: buf.len(),
            })?;

        let raw = u16::from_le_bytes([buf[0], buf[1]]);

        Ok(Self::new(raw & LENGTH_MASK))
    }
}

impl fieldring_wire::WireSized for LengthFlags {
    const PACKED_LEN: usize = 2;

    type Buffer = [u8; 2];

    fn buffer() -> Self::Buffer {
        [0u8; 2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldring_wire::{WireRead, WireWrite};

    #[test]
    fn packs_little_endian() {
        let flags = LengthFlags::new(2);
        assert_eq!(flags.pack_to_slice_unchecked(&mut [0u8; 2]), &[0x02, 0x00]);
    }

    #[test]
    fn round_trip() {
        let flags = LengthFlags::new(1036);
        let mut buf = [0u8; 2];
        flags.pack_to_slice_unchecked(&mut buf);
        assert_eq!(LengthFlags::unpack_from_slice(&buf).unwrap(), flags);
    }
}
