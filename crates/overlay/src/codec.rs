//! Wire framing for peer protocol messages.
//!
//! Every message is prefixed with a fixed 6-byte header:
//!
//! ```text
//! +-------------------+------------------+--------------+
//! | length (4, BE)    | type code (2, BE)| bincode body |
//! +-------------------+------------------+--------------+
//! ```
//!
//! The length counts only the body. The type code selects which message
//! struct the body decodes as, so bodies carry no enum tag of their own.

use crate::messages::{Message, MessageType};
use crate::{OverlayError, Result};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Size of the fixed message header.
pub const HEADER_BYTES: usize = 6;

/// Maximum body size (64 MiB). Anything larger is a protocol violation.
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Parse a frame header into (body length, message type).
pub fn parse_header(header: &[u8; HEADER_BYTES]) -> Result<(usize, MessageType)> {
    let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    if len > MAX_BODY_BYTES {
        return Err(OverlayError::Codec(format!("body too large: {} bytes", len)));
    }
    let code = u16::from_be_bytes([header[4], header[5]]);
    let message_type = MessageType::from_u16(code)
        .ok_or_else(|| OverlayError::Codec(format!("unknown message type {}", code)))?;
    Ok((len, message_type))
}

/// Decode a body of the given type.
pub fn decode_body(message_type: MessageType, body: &[u8]) -> Result<Message> {
    let codec_err = |e: bincode::Error| OverlayError::Codec(e.to_string());
    Ok(match message_type {
        MessageType::Hello => Message::Hello(bincode::deserialize(body).map_err(codec_err)?),
        MessageType::Ping => Message::Ping(bincode::deserialize(body).map_err(codec_err)?),
        MessageType::GetLedger => {
            Message::GetLedger(bincode::deserialize(body).map_err(codec_err)?)
        }
        MessageType::LedgerData => {
            Message::LedgerData(bincode::deserialize(body).map_err(codec_err)?)
        }
        MessageType::GetTxSet => Message::GetTxSet(bincode::deserialize(body).map_err(codec_err)?),
        MessageType::TxSetData => {
            Message::TxSetData(bincode::deserialize(body).map_err(codec_err)?)
        }
    })
}

fn encode_body(message: &Message) -> Result<Vec<u8>> {
    let codec_err = |e: bincode::Error| OverlayError::Codec(e.to_string());
    match message {
        Message::Hello(m) => bincode::serialize(m).map_err(codec_err),
        Message::Ping(m) => bincode::serialize(m).map_err(codec_err),
        Message::GetLedger(m) => bincode::serialize(m).map_err(codec_err),
        Message::LedgerData(m) => bincode::serialize(m).map_err(codec_err),
        Message::GetTxSet(m) => bincode::serialize(m).map_err(codec_err),
        Message::TxSetData(m) => bincode::serialize(m).map_err(codec_err),
    }
}

/// Encode a message to a complete frame.
pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    let body = encode_body(message)?;
    if body.len() > MAX_BODY_BYTES {
        return Err(OverlayError::Codec(format!(
            "body too large: {} bytes",
            body.len()
        )));
    }

    let mut frame = Vec::with_capacity(HEADER_BYTES + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&(message.message_type() as u16).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// A decoded frame.
#[derive(Debug)]
pub struct MessageFrame {
    /// The decoded message.
    pub message: Message,
    /// Body length on the wire.
    pub raw_len: usize,
}

/// Streaming codec for framed peer messages.
#[derive(Debug, Default)]
pub struct MessageCodec {
    decode_state: DecodeState,
}

#[derive(Debug, Default)]
enum DecodeState {
    /// Waiting for the fixed header.
    #[default]
    ReadingHeader,
    /// Reading a body of known length and type.
    ReadingBody {
        len: usize,
        message_type: MessageType,
    },
}

impl MessageCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for MessageCodec {
    type Item = MessageFrame;
    type Error = OverlayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.decode_state {
                DecodeState::ReadingHeader => {
                    if src.len() < HEADER_BYTES {
                        return Ok(None);
                    }

                    let mut header = [0u8; HEADER_BYTES];
                    header.copy_from_slice(&src[..HEADER_BYTES]);
                    let (len, message_type) = parse_header(&header)?;

                    src.advance(HEADER_BYTES);
                    src.reserve(len);
                    self.decode_state = DecodeState::ReadingBody { len, message_type };
                }
                DecodeState::ReadingBody { len, message_type } => {
                    if src.len() < len {
                        return Ok(None);
                    }

                    let body = src.split_to(len);
                    let message = decode_body(message_type, &body)?;
                    self.decode_state = DecodeState::ReadingHeader;
                    return Ok(Some(MessageFrame { message, raw_len: len }));
                }
            }
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = OverlayError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<()> {
        let body = encode_body(&message)?;
        if body.len() > MAX_BODY_BYTES {
            return Err(OverlayError::Codec(format!(
                "body too large: {} bytes",
                body.len()
            )));
        }

        dst.reserve(HEADER_BYTES + body.len());
        dst.put_u32(body.len() as u32);
        dst.put_u16(message.message_type() as u16);
        dst.extend_from_slice(&body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{GetLedger, Ping};
    use rtx_common::Hash256;

    fn make_test_message() -> Message {
        Message::GetLedger(GetLedger::base(Hash256::hash(b"wanted")))
    }

    #[test]
    fn test_encode_decode() {
        let msg = make_test_message();
        let frame = encode_message(&msg).unwrap();

        assert!(frame.len() > HEADER_BYTES);
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - HEADER_BYTES);

        let mut header = [0u8; HEADER_BYTES];
        header.copy_from_slice(&frame[..HEADER_BYTES]);
        let (body_len, message_type) = parse_header(&header).unwrap();
        assert_eq!(body_len, len);
        assert_eq!(message_type, MessageType::GetLedger);

        let decoded = decode_body(message_type, &frame[HEADER_BYTES..]).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_codec_streaming() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();

        codec.encode(make_test_message(), &mut buf).unwrap();
        codec.encode(Message::Ping(Ping { seq: 9 }), &mut buf).unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(first.message, Message::GetLedger(_)));
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(second.message, Message::Ping(Ping { seq: 9 })));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_codec_partial_read() {
        let frame = encode_message(&make_test_message()).unwrap();
        let mut codec = MessageCodec::new();

        let mut buf = BytesMut::from(&frame[..3]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&frame[3..frame.len() - 1]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&frame[frame.len() - 1..]);
        assert!(codec.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut header = [0u8; HEADER_BYTES];
        header[3] = 4; // length 4
        header[5] = 250; // no such type
        assert!(matches!(
            parse_header(&header),
            Err(OverlayError::Codec(_))
        ));
    }

    #[test]
    fn test_oversize_rejected() {
        let mut header = [0u8; HEADER_BYTES];
        header[..4].copy_from_slice(&(MAX_BODY_BYTES as u32 + 1).to_be_bytes());
        header[5] = 1;
        assert!(parse_header(&header).is_err());
    }
}
