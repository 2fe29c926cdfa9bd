//! OpenClaw Gateway wire protocol.
//!
//! JSON frames for both gateway dialects: the enveloped `type`/`method`
//! frames and the older bare `kind`/`data` frames.

pub mod codec;
pub mod frames;

pub use codec::{
    decode, encode_chat_send, encode_connect, encode_legacy_send, parse_frame, CodecError,
    Inbound, UNKNOWN_ERROR,
};
pub use frames::*;
