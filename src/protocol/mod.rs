//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the binary protocol:
//! - 5-byte header encoding/decoding (type byte + big-endian length)
//! - Frame buffer for accumulating partial reads
//! - Frame struct with a typed payload union

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{decode_frame, encode_frame, Frame, Payload, HEARTBEAT_MESSAGE_ID};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{Header, MessageType, HEADER_SIZE, MAX_PAYLOAD_SIZE};
