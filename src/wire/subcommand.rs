//! A single addressed sub-command within a frame.

use super::address::Address;
use super::length_flags::LengthFlags;
use super::opcode::Opcode;
use crate::error::Error;
use fieldring_wire::{WireRead, WireSized, WireWrite};

/// Bytes of fixed sub-command framing before the payload: opcode(1) + index(1) + address(4) +
/// length+flags(2) + reserved(2).
pub const HEADER_LEN: usize = 10;

/// Bytes of trailing working-counter framing after the payload.
pub const TRAILER_LEN: usize = 2;

/// A request to encode one outbound sub-command.
#[derive(Debug, Clone, Copy)]
pub struct SubcommandRequest<'a> {
    pub opcode: Opcode,
    pub index: u8,
    pub address: Address,
    /// Declared payload length. For reads this reserves space for the response; for writes it
    /// must equal `outbound_payload`'s length.
    pub payload_len: u16,
    /// Data to write outbound. `None` zero-fills the payload (a pure read).
    pub outbound_payload: Option<&'a [u8]>,
}

impl<'a> SubcommandRequest<'a> {
    /// Total encoded size of this sub-command, working counter included.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + usize::from(self.payload_len) + TRAILER_LEN
    }
}

/// A sub-command decoded from a received frame. Borrows its payload directly from the receive
/// buffer; the caller copies it out (into a domain image or a request's own buffer) before the
/// buffer is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedSubcommand<'a> {
    pub opcode: Opcode,
    pub index: u8,
    pub address: Address,
    pub payload: &'a [u8],
    pub working_counter: u16,
}

/// Encode one sub-command into the front of `buf`, returning the number of bytes written.
pub fn pack_subcommand(buf: &mut [u8], request: SubcommandRequest<'_>) -> Result<usize, Error> {
    let total = request.encoded_len();

    let buf = buf
        .get_mut(0..total)
        .ok_or(Error::ResourceExhausted("frame buffer too small for sub-command"))?;

    buf[0] = request.opcode.pack();
    buf[1] = request.index;

    let mut addr_buf = [0u8; 4];
    request.address.pack_into(&mut addr_buf);
    buf[2..6].copy_from_slice(&addr_buf);

    let length_flags = LengthFlags::new(request.payload_len);
    buf[6..8].copy_from_slice(&length_flags.pack());

    buf[8..10].fill(0);

    let payload_start = HEADER_LEN;
    let payload_end = payload_start + usize::from(request.payload_len);

    match request.outbound_payload {
        Some(data) => {
            if data.len() != usize::from(request.payload_len) {
                return Err(Error::InvalidArgument(
                    "outbound payload length does not match declared payload_len",
                ));
            }

            buf[payload_start..payload_end].copy_from_slice(data);
        }
        None => buf[payload_start..payload_end].fill(0),
    }

    // Working counter is produced by the slaves on the wire; zero it on encode.
    buf[payload_end..payload_end + TRAILER_LEN].fill(0);

    Ok(total)
}

/// Decode one sub-command from the front of `buf`, returning it plus the remaining bytes.
pub fn unpack_subcommand(buf: &[u8]) -> Result<(DecodedSubcommand<'_>, &[u8]), Error> {
    let head = buf
        .get(0..HEADER_LEN)
        .ok_or(Error::ProtocolViolation("sub-command shorter than its header"))?;

    let opcode = Opcode::unpack_from_slice(&head[0..1])
        .map_err(|_| Error::ProtocolViolation("unrecognized sub-command opcode"))?;
    let index = head[1];

    let mut addr_buf = [0u8; 4];
    addr_buf.copy_from_slice(&head[2..6]);
    let address = Address::unpack_for(opcode, addr_buf);

    let length_flags = LengthFlags::unpack_from_slice(&head[6..8])?;
    let length = usize::from(length_flags.len());

    let payload_start = HEADER_LEN;
    let payload_end = payload_start + length;
    let wkc_end = payload_end + TRAILER_LEN;

    let tail = buf
        .get(payload_start..wkc_end)
        .ok_or(Error::ProtocolViolation(
            "sub-command declares more payload than was received",
        ))?;

    let payload = &tail[..length];
    let working_counter = u16::from_le_bytes([tail[length], tail[length + 1]]);

    Ok((
        DecodedSubcommand {
            opcode,
            index,
            address,
            payload,
            working_counter,
        },
        &buf[wkc_end..],
    ))
}

trait PackOpcodeByte {
    fn pack(self) -> u8;
}

impl PackOpcodeByte for Opcode {
    fn pack(self) -> u8 {
        let mut buf = [0u8; 1];
        fieldring_wire::WireWrite::pack_to_slice_unchecked(&self, &mut buf);
        buf[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autoincrement_read_packs_expected_bytes() {
        let request = SubcommandRequest {
            opcode: Opcode::AutoIncrementRead,
            index: 0x00,
            address: Address::Autoincrement {
                ring_position: 3,
                offset: 0x0130,
            },
            payload_len: 2,
            outbound_payload: None,
        };

        let mut buf = [0xaau8; 14];
        let written = pack_subcommand(&mut buf, request).unwrap();

        assert_eq!(written, 14);
        assert_eq!(
            buf,
            [
                0x01, // opcode
                0x00, // index
                0xfd, 0xff, 0x30, 0x01, // address
                0x02, 0x00, // length+flags
                0x00, 0x00, // reserved
                0x00, 0x00, // payload (zeroed read)
                0x00, 0x00, // working counter
            ]
        );

        let (decoded, rest) = unpack_subcommand(&buf).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded.opcode, Opcode::AutoIncrementRead);
        assert_eq!(
            decoded.address,
            Address::Autoincrement {
                ring_position: 3,
                offset: 0x0130
            }
        );
        assert_eq!(decoded.payload, &[0x00, 0x00]);
    }

    #[test]
    fn rejects_mismatched_outbound_len() {
        let request = SubcommandRequest {
            opcode: Opcode::NodeWrite,
            index: 1,
            address: Address::Physical { node: 1, offset: 0 },
            payload_len: 2,
            outbound_payload: Some(&[1, 2, 3]),
        };

        assert!(pack_subcommand(&mut [0u8; 16], request).is_err());
    }

    #[test]
    fn rejects_truncated_payload() {
        let buf = [0x01, 0x00, 0xfd, 0xff, 0x30, 0x01, 0x02, 0x00, 0x00, 0x00];
        assert!(unpack_subcommand(&buf).is_err());
    }
}
