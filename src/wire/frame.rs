//! Whole-frame encode/decode: header + a run of sub-commands, zero-padded to the wire minimum.

use super::header::FrameHeader;
use super::subcommand::{self, DecodedSubcommand, SubcommandRequest, HEADER_LEN, TRAILER_LEN};
use crate::error::Error;

/// Minimum wire frame size; shorter frames are zero-padded up to this.
pub const MIN_FRAME_LEN: usize = 46;

/// Maximum wire frame size.
pub const MAX_FRAME_LEN: usize = 1500;

/// Maximum number of sub-commands this codec will decode out of one frame. A generous bound
/// used only to size a stack buffer; real frames built by this master carry far fewer.
pub const MAX_SUBCOMMANDS: usize = 64;

/// Encode `requests` into `buf`, which must be at least [`MIN_FRAME_LEN`] bytes long. Returns
/// the total encoded length, which is always within `46..=1500`.
pub fn encode_frame(buf: &mut [u8], requests: &[SubcommandRequest<'_>]) -> Result<usize, Error> {
    let sub_commands_len: usize = requests
        .iter()
        .map(|r| HEADER_LEN + usize::from(r.payload_len))
        .sum();

    if sub_commands_len > 0x07ff {
        return Err(Error::ResourceExhausted("frame exceeds 11-bit length field"));
    }

    let header = FrameHeader::new(sub_commands_len as u16);
    let packed_header = header.pack();

    if buf.len() < MIN_FRAME_LEN {
        return Err(Error::ResourceExhausted("frame buffer below 46-byte minimum"));
    }

    buf[0..2].copy_from_slice(&packed_header);

    let mut cursor = 2;

    for request in requests {
        let written = subcommand::pack_subcommand(&mut buf[cursor..], *request)?;
        cursor += written;
    }

    if cursor > MAX_FRAME_LEN {
        return Err(Error::ResourceExhausted("frame exceeds 1500-byte maximum"));
    }

    if cursor < MIN_FRAME_LEN {
        buf[cursor..MIN_FRAME_LEN].fill(0);
        cursor = MIN_FRAME_LEN;
    }

    Ok(cursor)
}

/// Decode a received frame's header and every sub-command it carries.
///
/// Validates that the header's declared length does not exceed what's actually in `buf`, and
/// that no individual sub-command claims more than the header's remaining budget.
pub fn decode_frame(
    buf: &[u8],
) -> Result<(FrameHeader, heapless::Vec<DecodedSubcommand<'_>, MAX_SUBCOMMANDS>), Error> {
    let (header, mut rest) = FrameHeader::parse(buf)?;

    if header.sub_commands_len() > buf.len().saturating_sub(2) {
        return Err(Error::ProtocolViolation(
            "frame header declares more sub-command bytes than were received",
        ));
    }

    let mut budget = header.sub_commands_len();
    let mut subs = heapless::Vec::new();

    while budget > 0 {
        let (decoded, tail) = subcommand::unpack_subcommand(rest)?;

        let consumed = HEADER_LEN + decoded.payload.len();

        if consumed > budget {
            return Err(Error::ProtocolViolation(
                "sub-command length exceeds remaining frame length",
            ));
        }

        budget -= consumed;
        rest = tail;

        subs.push(decoded)
            .map_err(|_| Error::ResourceExhausted("more sub-commands than this codec allows"))?;
    }

    let _ = TRAILER_LEN;

    Ok((header, subs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::address::Address;
    use crate::wire::opcode::Opcode;

    #[test]
    fn full_frame_encodes_and_decodes_round_trip() {
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

        let mut buf = [0u8; MIN_FRAME_LEN];
        let len = encode_frame(&mut buf, &[request]).unwrap();

        assert_eq!(len, MIN_FRAME_LEN);
        assert_eq!(&buf[0..2], &[0x0c, 0x10]);
        assert_eq!(
            &buf[2..16],
            &[
                0x01, 0x00, 0xfd, 0xff, 0x30, 0x01, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            ]
        );
        assert!(buf[16..].iter().all(|&b| b == 0));
    }

    #[test]
    fn round_trip_multiple_sub_commands() {
        let a = SubcommandRequest {
            opcode: Opcode::NodeWrite,
            index: 1,
            address: Address::Physical { node: 0x1001, offset: 0x0800 },
            payload_len: 4,
            outbound_payload: Some(&[1, 2, 3, 4]),
        };
        let b = SubcommandRequest {
            opcode: Opcode::LogicalReadWrite,
            index: 2,
            address: Address::Logical(0x1000),
            payload_len: 3,
            outbound_payload: Some(&[9, 9, 9]),
        };

        let mut buf = [0u8; MIN_FRAME_LEN];
        let len = encode_frame(&mut buf, &[a, b]).unwrap();

        let (header, decoded) = decode_frame(&buf[..len]).unwrap();
        assert_eq!(header.sub_commands_len(), (HEADER_LEN + 4) + (HEADER_LEN + 3));
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].payload, &[1, 2, 3, 4]);
        assert_eq!(decoded[1].payload, &[9, 9, 9]);
    }

    #[test]
    fn rejects_declared_length_over_received() {
        let mut buf = [0u8; MIN_FRAME_LEN];
        buf[0..2].copy_from_slice(&[0xff, 0x17]); // length = 0x7ff, far more than available
        assert!(decode_frame(&buf).is_err());
    }
}
