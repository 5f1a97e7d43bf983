//! Frame struct, payload union, and whole-frame encode/decode.
//!
//! A frame is immutable once built. Payload presence and variant are
//! checked against the message type at construction, so a `Frame` value is
//! always well-formed.
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use switchboard::protocol::{decode_frame, encode_frame, Frame, MAX_PAYLOAD_SIZE};
//!
//! let frame = Frame::heartbeat();
//! let bytes = encode_frame(&frame).unwrap();
//! assert_eq!(bytes, [4, 0, 0, 0, 0]);
//!
//! let mut buf = BytesMut::from(&bytes[..]);
//! let decoded = decode_frame(&mut buf, MAX_PAYLOAD_SIZE).unwrap();
//! assert_eq!(decoded, Some(frame));
//! ```

use bytes::BytesMut;

use super::wire_format::{Header, MessageType, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::codec::JsonCodec;
use crate::error::{RelayError, Result};
use crate::invocation::{InvocationRequest, InvocationResult, Registration};

/// Message id carried by every heartbeat frame.
pub const HEARTBEAT_MESSAGE_ID: &str = "heartbeat";

/// Typed frame payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// INVOKE / FORWARD
    Request(InvocationRequest),
    /// RESULT
    Result(InvocationResult),
    /// REGISTER
    Registration(Registration),
}

impl Payload {
    fn kind(&self) -> &'static str {
        match self {
            Payload::Request(_) => "request",
            Payload::Result(_) => "result",
            Payload::Registration(_) => "registration",
        }
    }

    /// Natural correlation key of the payload.
    fn key(&self) -> &str {
        match self {
            Payload::Request(request) => request.request_id(),
            Payload::Result(result) => result.request_id(),
            Payload::Registration(registration) => registration.client_id(),
        }
    }

    fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Payload::Request(request) => JsonCodec::encode(request),
            Payload::Result(result) => JsonCodec::encode(result),
            Payload::Registration(registration) => JsonCodec::encode(registration),
        }
    }
}

/// A complete protocol frame.
///
/// `message_id` is not transmitted; it is derived from the payload (request
/// id, or client id for REGISTER) so that a decoded frame equals the frame
/// that was encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    message_id: String,
    message_type: MessageType,
    payload: Option<Payload>,
}

impl Frame {
    /// Build a frame, checking the payload against the message type.
    pub fn new(message_type: MessageType, payload: Option<Payload>) -> Result<Self> {
        match (message_type, &payload) {
            (MessageType::Invoke | MessageType::Forward, Some(Payload::Request(_)))
            | (MessageType::Result, Some(Payload::Result(_)))
            | (MessageType::Register, Some(Payload::Registration(_)))
            | (MessageType::Heartbeat, None) => {}
            (MessageType::Heartbeat, Some(_)) => {
                return Err(RelayError::InvalidFrame(
                    "HEARTBEAT must not carry a payload".to_string(),
                ));
            }
            (t, None) => {
                return Err(RelayError::InvalidFrame(format!(
                    "Message type {} requires a payload",
                    t
                )));
            }
            (t, Some(p)) => {
                return Err(RelayError::InvalidFrame(format!(
                    "Message type {} cannot carry a {} payload",
                    t,
                    p.kind()
                )));
            }
        }

        let message_id = payload
            .as_ref()
            .map(|p| p.key().to_string())
            .unwrap_or_else(|| HEARTBEAT_MESSAGE_ID.to_string());

        Ok(Self {
            message_id,
            message_type,
            payload,
        })
    }

    /// Caller → broker.
    pub fn invoke(request: InvocationRequest) -> Self {
        Self::from_valid(MessageType::Invoke, Payload::Request(request))
    }

    /// Broker → target.
    pub fn forward(request: InvocationRequest) -> Self {
        Self::from_valid(MessageType::Forward, Payload::Request(request))
    }

    pub fn result(result: InvocationResult) -> Self {
        Self::from_valid(MessageType::Result, Payload::Result(result))
    }

    pub fn register(registration: Registration) -> Self {
        Self::from_valid(MessageType::Register, Payload::Registration(registration))
    }

    pub fn heartbeat() -> Self {
        Self {
            message_id: HEARTBEAT_MESSAGE_ID.to_string(),
            message_type: MessageType::Heartbeat,
            payload: None,
        }
    }

    fn from_valid(message_type: MessageType, payload: Payload) -> Self {
        Self {
            message_id: payload.key().to_string(),
            message_type,
            payload: Some(payload),
        }
    }

    #[inline]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    #[inline]
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    #[inline]
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    #[inline]
    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// INVOKE or FORWARD.
    #[inline]
    pub fn is_request(&self) -> bool {
        matches!(
            self.message_type,
            MessageType::Invoke | MessageType::Forward
        )
    }

    #[inline]
    pub fn is_result(&self) -> bool {
        self.message_type == MessageType::Result
    }

    #[inline]
    pub fn is_heartbeat(&self) -> bool {
        self.message_type == MessageType::Heartbeat
    }

    pub fn as_request(&self) -> Option<&InvocationRequest> {
        match &self.payload {
            Some(Payload::Request(request)) => Some(request),
            _ => None,
        }
    }

    pub fn as_result(&self) -> Option<&InvocationResult> {
        match &self.payload {
            Some(Payload::Result(result)) => Some(result),
            _ => None,
        }
    }

    pub fn as_registration(&self) -> Option<&Registration> {
        match &self.payload {
            Some(Payload::Registration(registration)) => Some(registration),
            _ => None,
        }
    }

    /// Consume the frame, returning its payload.
    pub fn into_payload(self) -> Option<Payload> {
        self.payload
    }

    /// Encode header and payload body.
    ///
    /// Fails if the serialized payload exceeds [`MAX_PAYLOAD_SIZE`], since
    /// no peer would accept it.
    pub fn encode_parts(&self) -> Result<(Header, Vec<u8>)> {
        let body = match &self.payload {
            Some(payload) => payload.encode()?,
            None => Vec::new(),
        };

        if body.len() > MAX_PAYLOAD_SIZE as usize {
            return Err(RelayError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                body.len(),
                MAX_PAYLOAD_SIZE
            )));
        }

        Ok((Header::new(self.message_type, body.len() as i32), body))
    }
}

/// Encode a frame as a single contiguous byte vector.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>> {
    let (header, body) = frame.encode_parts()?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Try to decode one frame from the front of `buf`.
///
/// Returns:
/// - `Ok(Some(frame))` and consumes exactly that frame's bytes
/// - `Ok(None)` if more data is needed; `buf` is left untouched
/// - `Err(...)` on a corrupt stream; the connection must be closed
pub fn decode_frame(buf: &mut BytesMut, max_payload_size: i32) -> Result<Option<Frame>> {
    let Some(header) = Header::decode(&buf[..]) else {
        return Ok(None);
    };

    header.validate(max_payload_size)?;
    let message_type = header.message_type()?;

    let total = HEADER_SIZE + header.body_len();
    if buf.len() < total {
        return Ok(None);
    }

    let mut frame_bytes = buf.split_to(total);
    let body = frame_bytes.split_off(HEADER_SIZE);

    decode_body(message_type, &body).map(Some)
}

fn decode_body(message_type: MessageType, body: &[u8]) -> Result<Frame> {
    if body.is_empty() {
        return match message_type {
            MessageType::Heartbeat => Ok(Frame::heartbeat()),
            t => Err(RelayError::Protocol(format!(
                "Empty payload not allowed for {}",
                t
            ))),
        };
    }

    match message_type {
        MessageType::Invoke => Ok(Frame::invoke(JsonCodec::decode(body)?)),
        MessageType::Forward => Ok(Frame::forward(JsonCodec::decode(body)?)),
        MessageType::Result => Ok(Frame::result(JsonCodec::decode(body)?)),
        MessageType::Register => Ok(Frame::register(JsonCodec::decode(body)?)),
        MessageType::Heartbeat => Err(RelayError::Protocol(
            "HEARTBEAT must not carry a payload".to_string(),
        )),
    }
}
