//! The on-wire frame codec.

mod address;
mod frame;
mod header;
mod length_flags;
mod opcode;
mod subcommand;

pub use address::Address;
pub use frame::{decode_frame, encode_frame, MAX_FRAME_LEN, MAX_SUBCOMMANDS, MIN_FRAME_LEN};
pub use header::FrameHeader;
pub use opcode::Opcode;
pub use subcommand::{DecodedSubcommand, SubcommandRequest};
