//! Tether - Message Model and Frame Codec
//!
//! The unit of exchange between peers. [`Message`] is an ordered set of
//! typed key-value fields; [`encode`] and [`decode`] map it to and from
//! self-delimited frames; [`FrameDecoder`] reassembles frames from an
//! arbitrarily split byte stream while enforcing the frame cap.

mod codec;
mod message;

pub use codec::*;
pub use message::*;
