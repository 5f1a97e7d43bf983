//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management. Incoming socket data is
//! appended; complete frames are peeled off the front. A frame whose header
//! or body is still incomplete stays in the buffer, byte for byte, until
//! the rest arrives.
//!
//! # Example
//!
//! ```
//! use switchboard::protocol::{encode_frame, Frame, FrameBuffer};
//!
//! let bytes = encode_frame(&Frame::heartbeat()).unwrap();
//! let mut buffer = FrameBuffer::new();
//!
//! assert!(buffer.push(&bytes[..2]).unwrap().is_empty());
//! let frames = buffer.push(&bytes[2..]).unwrap();
//! assert_eq!(frames, vec![Frame::heartbeat()]);
//! ```

use bytes::BytesMut;

use super::frame::decode_frame;
use super::wire_format::MAX_PAYLOAD_SIZE;
use super::Frame;
use crate::error::Result;

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Maximum allowed payload size.
    max_payload_size: i32,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 64KB, max payload: 10MB.
    pub fn new() -> Self {
        Self::with_capacity_and_max_payload(64 * 1024, MAX_PAYLOAD_SIZE)
    }

    /// Create a new frame buffer with custom max payload size.
    pub fn with_max_payload(max_payload_size: i32) -> Self {
        Self::with_capacity_and_max_payload(64 * 1024, max_payload_size)
    }

    /// Create a new frame buffer with custom capacity and max payload.
    pub fn with_capacity_and_max_payload(capacity: usize, max_payload_size: i32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            max_payload_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Returns a vector of complete frames (may be empty if still waiting
    /// for data). Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns error on a corrupt stream (bad length, unknown type,
    /// malformed payload). The buffer is unusable afterwards and the
    /// connection should be closed.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();

        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    /// Extract a single frame from the buffer, if one is complete.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        decode_frame(&mut self.buffer, self.max_payload_size)
    }

    /// Append data to the buffer without extracting frames.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
