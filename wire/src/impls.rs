//! Builtin implementations for various primitive types.

use crate::{WireError, WireRead, WireSized, WireWrite};

macro_rules! impl_primitive_wire_field {
    ($ty:ty, $size:expr) => {
        impl WireWrite for $ty {
            fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8] {
                let chunk = &mut buf[0..$size];

                chunk.copy_from_slice(&self.to_le_bytes());

                chunk
            }

            fn packed_len(&self) -> usize {
                $size
            }
        }

        impl WireRead for $ty {
            fn unpack_from_slice(buf: &[u8]) -> Result<Self, WireError> {
                let raw = buf.get(0..$size).ok_or(WireError::ReadBufferTooShort {
                    expected: $size,
                    got: buf.len(),
                })?;

                // Infallible: the slice above is exactly `$size` bytes long.
                Ok(Self::from_le_bytes(raw.try_into().unwrap()))
            }
        }

        impl WireSized for $ty {
            const PACKED_LEN: usize = $size;

            type Buffer = [u8; $size];

            fn buffer() -> Self::Buffer {
                [0u8; $size]
            }
        }
    };
}

impl_primitive_wire_field!(u8, 1);
impl_primitive_wire_field!(u16, 2);
impl_primitive_wire_field!(u32, 4);
impl_primitive_wire_field!(u64, 8);
impl_primitive_wire_field!(i8, 1);
impl_primitive_wire_field!(i16, 2);
impl_primitive_wire_field!(i32, 4);
impl_primitive_wire_field!(i64, 8);

impl WireWrite for bool {
    fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8] {
        buf[0] = *self as u8;

        &buf[0..1]
    }

    fn packed_len(&self) -> usize {
        1
    }
}

impl WireRead for bool {
    fn unpack_from_slice(buf: &[u8]) -> Result<Self, WireError> {
        let byte = *buf.first().ok_or(WireError::ReadBufferTooShort {
            expected: 1,
            got: buf.len(),
        })?;

        Ok(byte != 0)
    }
}

impl WireSized for bool {
    const PACKED_LEN: usize = 1;

    type Buffer = [u8; 1];

    fn buffer() -> Self::Buffer {
        [0u8; 1]
    }
}

impl WireWrite for () {
    fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8] {
        &buf[0..0]
    }

    fn packed_len(&self) -> usize {
        0
    }
}

impl WireRead for () {
    fn unpack_from_slice(_buf: &[u8]) -> Result<Self, WireError> {
        Ok(())
    }
}

impl WireSized for () {
    const PACKED_LEN: usize = 0;

    type Buffer = [u8; 0];

    fn buffer() -> Self::Buffer {
        []
    }
}

impl<const N: usize> WireWrite for [u8; N] {
    fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8] {
        let buf = &mut buf[0..N];

        buf.copy_from_slice(self);

        buf
    }

    fn packed_len(&self) -> usize {
        N
    }
}

impl<const N: usize> WireRead for [u8; N] {
    fn unpack_from_slice(buf: &[u8]) -> Result<Self, WireError> {
        let chunk = buf.get(0..N).ok_or(WireError::ReadBufferTooShort {
            expected: N,
            got: buf.len(),
        })?;

        // Infallible: the slice above is exactly `N` bytes long.
        Ok(chunk.try_into().unwrap())
    }
}

impl<const N: usize> WireSized for [u8; N] {
    const PACKED_LEN: usize = N;

    type Buffer = [u8; N];

    fn buffer() -> Self::Buffer {
        [0u8; N]
    }
}

impl WireWrite for &[u8] {
    fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8] {
        let buf = &mut buf[0..self.len()];

        buf.copy_from_slice(self);

        buf
    }

    fn packed_len(&self) -> usize {
        self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_u16() {
        let value: u16 = 0xbeef;
        let packed = value.pack_to_slice_unchecked(&mut [0u8; 2]);

        assert_eq!(packed, &[0xef, 0xbe]);
        assert_eq!(u16::unpack_from_slice(packed).unwrap(), value);
    }

    #[test]
    fn short_read_buffer_is_an_error() {
        assert_eq!(
            u32::unpack_from_slice(&[1, 2]),
            Err(WireError::ReadBufferTooShort {
                expected: 4,
                got: 2
            })
        );
    }

    #[test]
    fn bool_packs_to_one_byte() {
        assert_eq!(true.pack_to_slice_unchecked(&mut [0u8; 1]), &[1]);
        assert_eq!(false.pack_to_slice_unchecked(&mut [0u8; 1]), &[0]);
        assert!(bool::unpack_from_slice(&[1]).unwrap());
        assert!(!bool::unpack_from_slice(&[0]).unwrap());
    }
}
