//! Length-prefixed framing of messages
//!
//! Each frame is a little-endian u64 body length followed by the bincode
//! encoded [`Message`], so frames can be parsed out of a byte stream without
//! any delimiter scanning.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::NetworkError;
use crate::protocol::Message;

const LENGTH_PREFIX_SIZE: usize = 8;

/// Encode a message as one wire frame
pub fn to_wire(message: &Message) -> Result<Bytes, NetworkError> {
    let body =
        bincode::serialize(message).map_err(|e| NetworkError::InvalidMessage(e.to_string()))?;
    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    frame.put_u64_le(body.len() as u64);
    frame.put_slice(&body);
    Ok(frame.freeze())
}

/// Try to parse one frame from the front of `buf`. Returns the message and
/// the number of consumed bytes, or `None` if the buffer does not yet hold a
/// complete frame.
pub fn from_wire(buf: &[u8]) -> Result<Option<(Message, usize)>, NetworkError> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }
    let mut prefix = &buf[..LENGTH_PREFIX_SIZE];
    let body_len = prefix.get_u64_le() as usize;
    let frame_len = LENGTH_PREFIX_SIZE + body_len;
    if buf.len() < frame_len {
        return Ok(None);
    }
    let message = bincode::deserialize(&buf[LENGTH_PREFIX_SIZE..frame_len])
        .map_err(|e| NetworkError::InvalidMessage(e.to_string()))?;
    Ok(Some((message, frame_len)))
}
