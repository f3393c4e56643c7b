use bytes::Bytes;

use crate::codec::{Header, Message, HEADER_SIZE, MAX_BODY};
use crate::error::{FrameError, Result};

/// Per-connection bookkeeping for one in-flight message in each direction.
///
/// The receive side fills `recv_header` then `recv_body`; the send side drains
/// `send_header` then `send_body`. Counters are cumulative across calls so a
/// transfer can resume after any partial read or write.
#[derive(Clone, PartialEq, Eq)]
pub struct TransferState {
    pub(crate) recv_header_done: bool,
    pub(crate) recv_body_done: bool,
    pub(crate) send_header_done: bool,
    pub(crate) send_body_done: bool,
    /// Total length (header + body) of the inbound message, once known.
    pub(crate) declared_length: usize,
    pub(crate) bytes_received: usize,
    pub(crate) bytes_sent: usize,
    /// Total length of the prepared outbound message; 0 when none is prepared.
    pub(crate) send_length: usize,
    pub(crate) recv_header: [u8; HEADER_SIZE],
    pub(crate) recv_body: [u8; MAX_BODY],
    pub(crate) send_header: [u8; HEADER_SIZE],
    pub(crate) send_body: [u8; MAX_BODY],
}

impl TransferState {
    pub fn new() -> Self {
        Self {
            recv_header_done: false,
            recv_body_done: false,
            send_header_done: false,
            send_body_done: false,
            declared_length: 0,
            bytes_received: 0,
            bytes_sent: 0,
            send_length: 0,
            recv_header: [0; HEADER_SIZE],
            recv_body: [0; MAX_BODY],
            send_header: [0; HEADER_SIZE],
            send_body: [0; MAX_BODY],
        }
    }

    /// Clear everything for the next message on the same connection.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn recv_header_done(&self) -> bool {
        self.recv_header_done
    }

    pub fn recv_body_done(&self) -> bool {
        self.recv_body_done
    }

    pub fn send_header_done(&self) -> bool {
        self.send_header_done
    }

    pub fn send_body_done(&self) -> bool {
        self.send_body_done
    }

    pub fn declared_length(&self) -> usize {
        self.declared_length
    }

    pub fn bytes_received(&self) -> usize {
        self.bytes_received
    }

    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    pub fn send_length(&self) -> usize {
        self.send_length
    }

    /// True while an outbound message is prepared but not fully written.
    pub fn is_sending(&self) -> bool {
        self.send_length > 0 && !self.send_body_done
    }

    /// Decoded inbound header, once all 20 bytes have arrived.
    pub fn header(&self) -> Option<Header> {
        if !self.recv_header_done {
            return None;
        }
        Header::decode(&self.recv_header).ok()
    }

    /// Inbound body, only once the whole message has arrived.
    pub fn received_body(&self) -> Option<&[u8]> {
        if !self.recv_body_done {
            return None;
        }
        Some(&self.recv_body[..self.declared_length - HEADER_SIZE])
    }

    /// The completely received inbound message.
    ///
    /// Fails with `InvalidState` while the message is still partial, so a
    /// truncated message can never reach the application.
    pub fn received_message(&self) -> Result<Message> {
        if !self.recv_header_done || !self.recv_body_done {
            return Err(FrameError::InvalidState("inbound message is incomplete"));
        }
        let header = Header::decode(&self.recv_header)?;
        let body = Bytes::copy_from_slice(&self.recv_body[..header.body_len()]);
        Ok(Message::from_parts(header, body))
    }

    /// Load `message` into the outbound buffers.
    pub fn prepare_send(&mut self, message: &Message) -> Result<()> {
        if self.is_sending() {
            return Err(FrameError::InvalidState(
                "outbound message replaced mid-transfer",
            ));
        }
        let body = message.body();
        if body.len() > MAX_BODY {
            return Err(FrameError::BodyTooLarge {
                size: body.len(),
                max: MAX_BODY,
            });
        }

        self.send_header = message.header().to_bytes();
        self.send_body[..body.len()].copy_from_slice(body);
        self.begin_send(message.wire_size());
        Ok(())
    }

    /// Load the received header and body bytes, unchanged, as the reply.
    pub fn prepare_echo(&mut self) -> Result<()> {
        if !self.recv_body_done {
            return Err(FrameError::InvalidState(
                "echo requested before the message was received",
            ));
        }
        if self.is_sending() {
            return Err(FrameError::InvalidState(
                "outbound message replaced mid-transfer",
            ));
        }

        let body_len = self.declared_length - HEADER_SIZE;
        self.send_header = self.recv_header;
        self.send_body[..body_len].copy_from_slice(&self.recv_body[..body_len]);
        self.begin_send(self.declared_length);
        Ok(())
    }

    fn begin_send(&mut self, length: usize) {
        self.send_length = length;
        self.bytes_sent = 0;
        self.send_header_done = false;
        self.send_body_done = false;
    }
}

impl Default for TransferState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferState")
            .field("recv_header_done", &self.recv_header_done)
            .field("recv_body_done", &self.recv_body_done)
            .field("send_header_done", &self.send_header_done)
            .field("send_body_done", &self.send_body_done)
            .field("declared_length", &self.declared_length)
            .field("bytes_received", &self.bytes_received)
            .field("bytes_sent", &self.bytes_sent)
            .field("send_length", &self.send_length)
            .finish_non_exhaustive()
    }
}
