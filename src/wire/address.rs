//! The sub-command address tagged union.
//!
//! The four raw address bytes mean different things depending on the sub-command's opcode, so
//! encoding/decoding an [`Address`] always happens in the context of an [`Opcode`].

use super::opcode::Opcode;

/// A sub-command's target, decoded according to the opcode it's attached to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Address {
    /// A slave's configured station address plus a byte offset into its register space.
    Physical {
        /// Configured station address.
        node: u16,
        /// Register/memory offset on that slave.
        offset: u16,
    },
    /// A slave identified by hop count from the frame's entry point, plus a byte offset.
    ///
    /// `ring_position` is the slave's position in discovery order; on the wire it is carried as
    /// the two's-complement negative of that position, since each slave that forwards the frame
    /// decrements the field and processes it on underflow to zero.
    Autoincrement {
        /// Ring position of the target slave, counting from 0 at the master.
        ring_position: u16,
        /// Register/memory offset on that slave.
        offset: u16,
    },
    /// Processed by every slave on the ring.
    Broadcast {
        /// Register/memory offset on every slave.
        offset: u16,
    },
    /// A process-image byte address, shared master-wide.
    Logical(u32),
}

impl Address {
    pub(crate) fn pack_into(self, buf: &mut [u8; 4]) {
        match self {
            Address::Physical { node, offset } => {
                buf[0..2].copy_from_slice(&node.to_le_bytes());
                buf[2..4].copy_from_slice(&offset.to_le_bytes());
            }
            Address::Autoincrement {
                ring_position,
                offset,
            } => {
                let encoded = (-(ring_position as i16)) as u16;
                buf[0..2].copy_from_slice(&encoded.to_le_bytes());
                buf[2..4].copy_from_slice(&offset.to_le_bytes());
            }
            Address::Broadcast { offset } => {
                buf[0..2].copy_from_slice(&0u16.to_le_bytes());
                buf[2..4].copy_from_slice(&offset.to_le_bytes());
            }
            Address::Logical(logical) => {
                buf.copy_from_slice(&logical.to_le_bytes());
            }
        }
    }

    pub(crate) fn unpack_for(opcode: Opcode, buf: [u8; 4]) -> Self {
        let lo = u16::from_le_bytes([buf[0], buf[1]]);
        let offset = u16::from_le_bytes([buf[2], buf[3]]);

        match opcode {
            Opcode::AutoIncrementRead | Opcode::AutoIncrementWrite => Address::Autoincrement {
                ring_position: (-(lo as i16)) as u16,
                offset,
            },
            Opcode::BroadcastRead | Opcode::BroadcastWrite => Address::Broadcast { offset },
            Opcode::LogicalReadWrite => Address::Logical(u32::from_le_bytes(buf)),
            Opcode::NodeRead | Opcode::NodeWrite | Opcode::Nop => {
                Address::Physical { node: lo, offset }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autoincrement_ring_position_three() {
        let addr = Address::Autoincrement {
            ring_position: 3,
            offset: 0x0130,
        };

        let mut buf = [0u8; 4];
        addr.pack_into(&mut buf);

        assert_eq!(buf, [0xfd, 0xff, 0x30, 0x01]);

        let decoded = Address::unpack_for(Opcode::AutoIncrementRead, buf);
        assert_eq!(decoded, addr);
    }

    #[test]
    fn logical_round_trip() {
        let addr = Address::Logical(0x0001_0203);
        let mut buf = [0u8; 4];
        addr.pack_into(&mut buf);

        assert_eq!(buf, [0x03, 0x02, 0x01, 0x00]);
        assert_eq!(
            Address::unpack_for(Opcode::LogicalReadWrite, buf),
            addr
        );
    }

    #[test]
    fn broadcast_zeroes_node() {
        let addr = Address::Broadcast { offset: 0x0502 };
        let mut buf = [0u8; 4];
        addr.pack_into(&mut buf);

        assert_eq!(buf, [0x00, 0x00, 0x02, 0x05]);
    }
}
