use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Fixed header size: two packed 32-bit words plus three 32-bit ids.
pub const HEADER_SIZE: usize = 20;

/// Maximum body size in bytes.
pub const MAX_BODY: usize = 1024;

/// Largest value a 24-bit field can carry.
pub const MAX_U24: u32 = 0x00FF_FFFF;

/// Protocol version written by this implementation. Receivers do not check it.
pub const PROTOCOL_VERSION: u8 = 1;

/// Decoded message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub version: u8,
    /// Total length of header + body (24 bits on the wire).
    pub length: u32,
    /// Reserved.
    pub flag: u8,
    /// Application command code (24 bits on the wire).
    pub code: u32,
    pub app_id: u32,
    pub hop_id: u32,
    pub end_id: u32,
}

impl Header {
    /// Body length implied by `length`, or 0 if `length` is too small.
    pub fn body_len(&self) -> usize {
        (self.length as usize).saturating_sub(HEADER_SIZE)
    }

    /// Write the 20 header bytes.
    ///
    /// Wire format (all words big-endian):
    /// ```text
    /// ┌─────────┬──────────────┬────────┬──────────────┐
    /// │ version │ length (24b) │ flag   │ code (24b)   │
    /// │ (1B)    │ (3B)         │ (1B)   │ (3B)         │
    /// ├─────────┴──────────────┼────────┴──────────────┤
    /// │ app_id (4B)            │ hop_id (4B)           │
    /// ├────────────────────────┼───────────────────────┘
    /// │ end_id (4B)            │
    /// └────────────────────────┘
    /// ```
    ///
    /// `length` and `code` must fit 24 bits; see [`validate`](Self::validate).
    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        debug_assert!(
            self.length <= MAX_U24 && self.code <= MAX_U24,
            "header field exceeds 24 bits: length={:#x} code={:#x}",
            self.length,
            self.code
        );
        dst.put_u32(u32::from(self.version) << 24 | (self.length & MAX_U24));
        dst.put_u32(u32::from(self.flag) << 24 | (self.code & MAX_U24));
        dst.put_u32(self.app_id);
        dst.put_u32(self.hop_id);
        dst.put_u32(self.end_id);
    }

    /// Check that `length` and `code` fit their 24-bit wire fields.
    pub fn validate(&self) -> Result<()> {
        if self.length > MAX_U24 {
            return Err(FrameError::MalformedLength {
                length: self.length,
            });
        }
        if self.code > MAX_U24 {
            return Err(FrameError::CodeOutOfRange(self.code));
        }
        Ok(())
    }

    /// The 20 header bytes as an array.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        self.encode(&mut &mut out[..]);
        out
    }

    /// Decode a header from the first 20 bytes of `src`.
    ///
    /// Fails with `ShortHeader` when fewer than 20 bytes are supplied and
    /// `MalformedLength` when the declared length leaves no body.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_SIZE {
            return Err(FrameError::ShortHeader { len: src.len() });
        }

        let mut src = &src[..HEADER_SIZE];
        let word0 = src.get_u32();
        let word1 = src.get_u32();
        let header = Header {
            version: (word0 >> 24) as u8,
            length: word0 & MAX_U24,
            flag: (word1 >> 24) as u8,
            code: word1 & MAX_U24,
            app_id: src.get_u32(),
            hop_id: src.get_u32(),
            end_id: src.get_u32(),
        };

        if header.length as usize <= HEADER_SIZE {
            return Err(FrameError::MalformedLength {
                length: header.length,
            });
        }

        Ok(header)
    }
}

/// One protocol message: header plus body.
///
/// Constructed through [`Message::new`] so that `length` always equals
/// `20 + body.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    header: Header,
    body: Bytes,
}

impl Message {
    /// Build a message, computing `length` from the body.
    pub fn new(version: u8, code: u32, body: impl Into<Bytes>) -> Result<Self> {
        let body = body.into();
        if body.len() > MAX_BODY {
            return Err(FrameError::BodyTooLarge {
                size: body.len(),
                max: MAX_BODY,
            });
        }
        if code > MAX_U24 {
            return Err(FrameError::CodeOutOfRange(code));
        }

        Ok(Self {
            header: Header {
                version,
                length: (HEADER_SIZE + body.len()) as u32,
                code,
                ..Header::default()
            },
            body,
        })
    }

    pub(crate) fn from_parts(header: Header, body: Bytes) -> Self {
        Self { header, body }
    }

    /// Set the application, hop-by-hop and end-to-end identifiers.
    pub fn with_ids(mut self, app_id: u32, hop_id: u32, end_id: u32) -> Self {
        self.header.app_id = app_id;
        self.header.hop_id = hop_id;
        self.header.end_id = end_id;
        self
    }

    /// Set the reserved flag byte.
    pub fn with_flag(mut self, flag: u8) -> Self {
        self.header.flag = flag;
        self
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as shared bytes.
    pub fn body_bytes(&self) -> Bytes {
        self.body.clone()
    }

    /// Body as UTF-8 text, for display only.
    pub fn body_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// The total wire size of this message (header + body).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }
}

/// Encode `version`, `code` and `body` into `dst`.
pub fn encode(version: u8, code: u32, body: &[u8], dst: &mut BytesMut) -> Result<()> {
    let message = Message::new(version, code, Bytes::copy_from_slice(body))?;
    encode_message(&message, dst);
    Ok(())
}

/// Append the wire form of `message` to `dst`.
pub fn encode_message(message: &Message, dst: &mut BytesMut) {
    dst.reserve(message.wire_size());
    message.header.encode(dst);
    dst.put_slice(&message.body);
}

/// Decode a header from `src`. See [`Header::decode`].
pub fn decode_header(src: &[u8]) -> Result<Header> {
    Header::decode(src)
}

/// Decode one complete message from `src`.
///
/// Exactly `length` bytes are consumed from the front of `src`; anything after
/// belongs to the next message and is ignored.
pub fn decode_message(src: &[u8]) -> Result<Message> {
    let header = Header::decode(src)?;
    let body_len = header.body_len();
    if body_len > MAX_BODY {
        return Err(FrameError::OversizedBody {
            declared: body_len,
            max: MAX_BODY,
        });
    }

    let available = src.len() - HEADER_SIZE;
    if available < body_len {
        return Err(FrameError::ShortBody {
            expected: body_len,
            actual: available,
        });
    }

    let body = Bytes::copy_from_slice(&src[HEADER_SIZE..HEADER_SIZE + body_len]);
    Ok(Message::from_parts(header, body))
}
