//! Codec module - serialization of frame payloads.
//!
//! Payloads travel as UTF-8 JSON text. [`JsonCodec`] is the single
//! serialization point so that every frame type uses the same encoding.
//!
//! # Example
//!
//! ```
//! use switchboard::codec::JsonCodec;
//!
//! let encoded = JsonCodec::encode(&"hello").unwrap();
//! assert_eq!(encoded, b"\"hello\"");
//! let decoded: String = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

mod json;

pub use json::JsonCodec;
