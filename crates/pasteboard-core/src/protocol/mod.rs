//! Protocol module containing message types, the frame codec and the shared
//! big-endian field helpers.

pub mod codec;
pub mod messages;
pub mod sequence;
pub mod wire;

pub use codec::{
    current_timestamp_us, decode_header, decode_message, encode_message, encode_message_now,
    ProtocolError,
};
pub use messages::*;
pub use sequence::SequenceCounter;
