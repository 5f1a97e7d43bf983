//! Wire format encoding and decoding.
//!
//! Implements the 5-byte header format:
//! ```text
//! ┌──────────┬──────────┬─────────────────┐
//! │ Type     │ Length   │ Payload         │
//! │ 1 byte   │ 4 bytes  │ Length bytes    │
//! │ ordinal  │ int32 BE │ UTF-8 JSON      │
//! └──────────┴──────────┴─────────────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use crate::error::{RelayError, Result};

/// Header size in bytes (fixed, exactly 5).
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size accepted on decode (10 MB).
pub const MAX_PAYLOAD_SIZE: i32 = 10_000_000;

/// Frame type. The ordinal is the wire byte and must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Caller → broker: please route this call.
    Invoke = 0,
    /// Broker → target: execute this call.
    Forward = 1,
    /// Either direction: here is the outcome.
    Result = 2,
    /// Client → broker (and echo): I am client X.
    Register = 3,
    /// Either direction: keepalive, echoed by the receiver.
    Heartbeat = 4,
}

impl MessageType {
    /// All variants in ordinal order.
    pub const ALL: [MessageType; 5] = [
        MessageType::Invoke,
        MessageType::Forward,
        MessageType::Result,
        MessageType::Register,
        MessageType::Heartbeat,
    ];

    /// Decode the wire byte.
    pub fn from_byte(b: u8) -> Result<Self> {
        Self::ALL
            .get(b as usize)
            .copied()
            .ok_or_else(|| RelayError::Protocol(format!("Invalid message type: {}", b)))
    }

    /// Encode to the wire byte.
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Whether frames of this type must carry a payload.
    #[inline]
    pub fn requires_payload(self) -> bool {
        !matches!(self, MessageType::Heartbeat)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MessageType::Invoke => "INVOKE",
            MessageType::Forward => "FORWARD",
            MessageType::Result => "RESULT",
            MessageType::Register => "REGISTER",
            MessageType::Heartbeat => "HEARTBEAT",
        };
        f.write_str(name)
    }
}

/// Decoded header from wire format.
///
/// The type byte is kept raw so that an unknown type can still be reported
/// after the header has been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Raw message type byte.
    pub type_byte: u8,
    /// Payload length in bytes (signed on the wire).
    pub payload_length: i32,
}

impl Header {
    /// Create a new header.
    pub fn new(message_type: MessageType, payload_length: i32) -> Self {
        Self {
            type_byte: message_type.to_byte(),
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use switchboard::protocol::{Header, MessageType};
    ///
    /// let bytes = Header::new(MessageType::Result, 100).encode();
    /// assert_eq!(bytes, [2, 0, 0, 0, 100]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (5 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0] = self.type_byte;
        buf[1..5].copy_from_slice(&self.payload_length.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            type_byte: buf[0],
            payload_length: i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]),
        })
    }

    /// Validate the payload length.
    ///
    /// A negative length or one above `max_payload_size` means the stream
    /// is corrupt.
    pub fn validate(&self, max_payload_size: i32) -> Result<()> {
        if self.payload_length < 0 {
            return Err(RelayError::Protocol(format!(
                "Negative payload length {}",
                self.payload_length
            )));
        }

        if self.payload_length > max_payload_size {
            return Err(RelayError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }

        Ok(())
    }

    /// Resolve the type byte.
    #[inline]
    pub fn message_type(&self) -> Result<MessageType> {
        MessageType::from_byte(self.type_byte)
    }

    /// Payload length as a buffer offset. Only meaningful after `validate`.
    #[inline]
    pub fn body_len(&self) -> usize {
        self.payload_length.max(0) as usize
    }
}
