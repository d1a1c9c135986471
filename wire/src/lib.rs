//! Traits used to pack/unpack structs and enums to/from the bit-packed little-endian wire
//! format used by the fieldring master.
//!
//! This crate is intentionally minimal: it is used internally by
//! [`fieldring`](https://crates.io/crates/fieldring) and is not recommended for public use on
//! its own.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
#![deny(unused_import_braces)]
#![deny(unused_qualifications)]

mod error;
mod impls;

pub use error::WireError;
pub use fieldring_wire_derive::Wire;

/// A type that can be packed into the wire buffer.
pub trait WireWrite {
    /// Pack the type and write it into the beginning of `buf`.
    ///
    /// Returns an error if `buf` is shorter than [`packed_len`](WireWrite::packed_len).
    fn pack_to_slice<'buf>(&self, buf: &'buf mut [u8]) -> Result<&'buf [u8], WireError> {
        let len = self.packed_len();

        if buf.len() < len {
            return Err(WireError::WriteBufferTooShort {
                expected: len,
                got: buf.len(),
            });
        }

        Ok(self.pack_to_slice_unchecked(buf))
    }

    /// Pack the type and write it into the beginning of `buf`.
    ///
    /// # Panics
    ///
    /// Implementations may panic if `buf` is shorter than the packed representation. Prefer
    /// [`pack_to_slice`](WireWrite::pack_to_slice) at any boundary that accepts caller-controlled
    /// buffer sizes.
    fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8];

    /// The length in bytes of this item when packed.
    fn packed_len(&self) -> usize;
}

/// A type that can be unpacked from the front of a wire buffer.
pub trait WireRead: Sized {
    /// Unpack this type from the beginning of the given buffer.
    fn unpack_from_slice(buf: &[u8]) -> Result<Self, WireError>;
}

/// Implemented for types with a packed size known at compile time.
pub trait WireSized: WireRead {
    /// Packed size in bytes.
    const PACKED_LEN: usize;

    /// A fixed-size buffer, always of the form `[u8; N]` with `N = PACKED_LEN`.
    type Buffer: AsRef<[u8]> + AsMut<[u8]>;

    /// Create a zeroed buffer sized to hold the packed representation of this item.
    fn buffer() -> Self::Buffer;
}

/// A [`WireWrite`] type whose packed size is known at compile time, so it can be packed into a
/// stack-allocated buffer without a caller-supplied slice.
pub trait WireWriteSized: WireWrite + WireSized {
    /// Pack this item into a fixed-size buffer sized exactly to
    /// [`PACKED_LEN`](WireSized::PACKED_LEN).
    fn pack(&self) -> Self::Buffer {
        let mut buf = Self::buffer();

        self.pack_to_slice_unchecked(buf.as_mut());

        buf
    }
}

impl<T> WireWriteSized for T where T: WireWrite + WireSized {}
