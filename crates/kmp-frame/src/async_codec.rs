use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_message, Header, Message, HEADER_SIZE, MAX_BODY};
use crate::error::{FrameError, Result};

/// `tokio_util` codec for the kmp wire format.
///
/// Uses the same header layout and validation as the non-blocking engine, so
/// tokio-based peers interoperate with mio-driven ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct KmpCodec;

impl KmpCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for KmpCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = Header::decode(&src[..HEADER_SIZE])?;
        let body_len = header.body_len();
        if body_len > MAX_BODY {
            return Err(FrameError::OversizedBody {
                declared: body_len,
                max: MAX_BODY,
            });
        }

        let total = header.length as usize;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let body = src.split_to(body_len).freeze();
        Ok(Some(Message::from_parts(header, body)))
    }
}

impl Encoder<Message> for KmpCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        encode_message(&item, dst);
        Ok(())
    }
}
