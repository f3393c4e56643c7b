use std::io::{Read, Write};

use kmp_frame::{advance_receive, advance_send, RecvStatus, SendStatus, TransferState};
use kmp_transport::Interest;
use tracing::{debug, trace};

use crate::error::{PeerError, Result};
use crate::responder::{Reply, Responder};

/// Where a connection is in its receive-then-reply cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingHeader,
    AwaitingBody,
    ReadyToReply,
    SendingHeader,
    SendingBody,
    Complete,
    Closed,
}

/// Result of handling one readiness notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The socket would block; wait for the next notification.
    Pending,
    /// The peer closed the connection. Release it.
    PeerClosed,
}

/// Server-side connection loop: one socket plus its transfer state.
///
/// Each call to [`on_ready`](Self::on_ready) drives the framing engine until
/// the socket reports would-block, so it works with edge-triggered readiness.
pub struct Connection<S> {
    id: u64,
    stream: S,
    state: TransferState,
    phase: Phase,
    served: u64,
}

impl<S: Read + Write> Connection<S> {
    pub fn new(id: u64, stream: S) -> Self {
        Self {
            id,
            stream,
            state: TransferState::new(),
            phase: Phase::AwaitingHeader,
            served: 0,
        }
    }

    /// Handle a readiness notification.
    ///
    /// Any error closes the connection; the caller must drop it.
    pub fn on_ready<R>(&mut self, responder: &mut R) -> Result<Disposition>
    where
        R: Responder + ?Sized,
    {
        if self.phase == Phase::Closed {
            return Err(PeerError::Closed(self.id));
        }

        match self.drive(responder) {
            Ok(Disposition::PeerClosed) => {
                self.phase = Phase::Closed;
                Ok(Disposition::PeerClosed)
            }
            Ok(disposition) => Ok(disposition),
            Err(err) => {
                self.phase = Phase::Closed;
                Err(err)
            }
        }
    }

    fn drive<R>(&mut self, responder: &mut R) -> Result<Disposition>
    where
        R: Responder + ?Sized,
    {
        loop {
            match self.phase {
                Phase::AwaitingHeader | Phase::AwaitingBody => {
                    match advance_receive(&mut self.state, &mut self.stream)? {
                        RecvStatus::Progressed => {
                            if self.state.recv_header_done() {
                                self.phase = Phase::AwaitingBody;
                            }
                        }
                        RecvStatus::NeedHeaderRetry | RecvStatus::NeedBodyRetry => {}
                        RecvStatus::Complete => self.phase = Phase::ReadyToReply,
                        RecvStatus::WouldBlock => return Ok(Disposition::Pending),
                        RecvStatus::PeerClosed => return Ok(Disposition::PeerClosed),
                    }
                }
                Phase::ReadyToReply => {
                    let request = self.state.received_message()?;
                    debug!(
                        conn = self.id,
                        code = request.header().code,
                        bytes = request.wire_size(),
                        "message received"
                    );
                    match responder.respond(self.id, &request) {
                        Reply::Echo => self.state.prepare_echo()?,
                        Reply::Message(reply) => self.state.prepare_send(&reply)?,
                    }
                    self.phase = Phase::SendingHeader;
                }
                Phase::SendingHeader | Phase::SendingBody => {
                    match advance_send(&mut self.state, &mut self.stream)? {
                        SendStatus::Progressed => {
                            if self.state.send_header_done() {
                                self.phase = Phase::SendingBody;
                            }
                        }
                        SendStatus::NeedRetry => {}
                        SendStatus::Done => self.phase = Phase::Complete,
                        SendStatus::WouldBlock => return Ok(Disposition::Pending),
                    }
                }
                Phase::Complete => {
                    self.served += 1;
                    trace!(conn = self.id, served = self.served, "reply sent");
                    self.state.reset();
                    self.phase = Phase::AwaitingHeader;
                }
                Phase::Closed => return Err(PeerError::Closed(self.id)),
            }
        }
    }

    /// Readiness this connection needs next: readable while receiving,
    /// writable while a reply is pending.
    pub fn interest(&self) -> Interest {
        match self.phase {
            Phase::ReadyToReply | Phase::SendingHeader | Phase::SendingBody => Interest::WRITABLE,
            _ => Interest::READABLE,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of request/reply cycles completed.
    pub fn served(&self) -> u64 {
        self.served
    }

    pub fn state(&self) -> &TransferState {
        &self.state
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> std::fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("served", &self.served)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::ErrorKind;

    use bytes::BytesMut;
    use kmp_frame::{encode, encode_message, ErrorKind as FrameErrorKind, Header, Message};

    use super::*;
    use crate::responder::Echo;

    enum In {
        Data(Vec<u8>),
        WouldBlock,
        Eof,
    }

    /// In-memory socket: scripted reads, writes limited by a byte budget
    /// (`None` = unlimited). An exhausted read script reports `WouldBlock`.
    struct MockStream {
        input: VecDeque<In>,
        output: Vec<u8>,
        write_budget: Option<usize>,
    }

    impl MockStream {
        fn new(input: Vec<In>) -> Self {
            Self {
                input: input.into(),
                output: Vec::new(),
                write_budget: None,
            }
        }

        fn push(&mut self, step: In) {
            self.input.push_back(step);
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.input.pop_front() {
                None | Some(In::WouldBlock) => Err(std::io::Error::from(ErrorKind::WouldBlock)),
                Some(In::Eof) => Ok(0),
                Some(In::Data(mut data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    if n < data.len() {
                        self.input.push_front(In::Data(data.split_off(n)));
                    }
                    Ok(n)
                }
            }
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let n = match self.write_budget {
                None => buf.len(),
                Some(0) => return Err(std::io::Error::from(ErrorKind::WouldBlock)),
                Some(budget) => {
                    let n = budget.min(buf.len());
                    self.write_budget = Some(budget - n);
                    n
                }
            };
            self.output.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn ping() -> Vec<u8> {
        let mut wire = BytesMut::new();
        encode(1, 1, b"ping", &mut wire).unwrap();
        wire.to_vec()
    }

    #[test]
    fn echoes_one_message_and_returns_to_awaiting_header() {
        let mut conn = Connection::new(1, MockStream::new(vec![In::Data(ping())]));

        let disposition = conn.on_ready(&mut Echo).expect("cycle should succeed");
        assert_eq!(disposition, Disposition::Pending);
        assert_eq!(conn.phase(), Phase::AwaitingHeader);
        assert_eq!(conn.served(), 1);
        assert_eq!(conn.stream().output, ping());
        assert_eq!(conn.state(), &TransferState::new());
        assert_eq!(conn.interest(), Interest::READABLE);
    }

    #[test]
    fn fragmented_message_completes_across_notifications() {
        let bytes = ping();
        let mut conn = Connection::new(2, MockStream::new(vec![In::Data(bytes[..8].to_vec())]));

        assert_eq!(conn.on_ready(&mut Echo).unwrap(), Disposition::Pending);
        assert_eq!(conn.phase(), Phase::AwaitingHeader);
        assert_eq!(conn.state().bytes_received(), 8);

        conn.stream_mut().push(In::Data(bytes[8..16].to_vec()));
        assert_eq!(conn.on_ready(&mut Echo).unwrap(), Disposition::Pending);
        assert_eq!(conn.state().bytes_received(), 16);

        conn.stream_mut().push(In::Data(bytes[16..].to_vec()));
        assert_eq!(conn.on_ready(&mut Echo).unwrap(), Disposition::Pending);
        assert_eq!(conn.served(), 1);
        assert_eq!(conn.stream().output, bytes);
    }

    #[test]
    fn blocked_reply_waits_for_writable() {
        let bytes = ping();
        let mut stream = MockStream::new(vec![In::Data(bytes.clone())]);
        stream.write_budget = Some(10);
        let mut conn = Connection::new(3, stream);

        assert_eq!(conn.on_ready(&mut Echo).unwrap(), Disposition::Pending);
        assert_eq!(conn.phase(), Phase::SendingHeader);
        assert_eq!(conn.interest(), Interest::WRITABLE);
        assert_eq!(conn.state().bytes_sent(), 10);

        conn.stream_mut().write_budget = Some(12);
        assert_eq!(conn.on_ready(&mut Echo).unwrap(), Disposition::Pending);
        assert_eq!(conn.phase(), Phase::SendingBody);
        assert_eq!(conn.state().bytes_sent(), 22);

        conn.stream_mut().write_budget = None;
        assert_eq!(conn.on_ready(&mut Echo).unwrap(), Disposition::Pending);
        assert_eq!(conn.phase(), Phase::AwaitingHeader);
        assert_eq!(conn.stream().output, bytes);
    }

    #[test]
    fn pipelined_messages_are_all_served() {
        let mut input = ping();
        input.extend(ping());
        input.extend(ping());
        let mut conn = Connection::new(4, MockStream::new(vec![In::Data(input.clone())]));

        assert_eq!(conn.on_ready(&mut Echo).unwrap(), Disposition::Pending);
        assert_eq!(conn.served(), 3);
        assert_eq!(conn.stream().output, input);
    }

    #[test]
    fn peer_close_transitions_to_closed() {
        let bytes = ping();
        let mut conn = Connection::new(
            5,
            MockStream::new(vec![In::Data(bytes[..12].to_vec()), In::Eof]),
        );

        assert_eq!(conn.on_ready(&mut Echo).unwrap(), Disposition::PeerClosed);
        assert_eq!(conn.phase(), Phase::Closed);
        assert!(conn.stream().output.is_empty());

        let err = conn.on_ready(&mut Echo).unwrap_err();
        assert!(matches!(err, PeerError::Closed(5)));
    }

    #[test]
    fn protocol_violation_closes_without_reply() {
        let header = Header {
            version: 1,
            length: 20,
            code: 1,
            ..Header::default()
        };
        let mut conn = Connection::new(
            6,
            MockStream::new(vec![In::Data(header.to_bytes().to_vec())]),
        );

        let err = conn.on_ready(&mut Echo).unwrap_err();
        assert!(
            matches!(&err, PeerError::Frame(e) if e.kind() == FrameErrorKind::ProtocolViolation)
        );
        assert_eq!(conn.phase(), Phase::Closed);
        assert!(conn.stream().output.is_empty());
    }

    #[test]
    fn responder_sees_request_and_substitutes_reply() {
        let mut seen = Vec::new();
        let mut responder = |conn: u64, request: &Message| {
            seen.push((conn, request.body().to_vec()));
            Reply::Message(Message::new(1, 2, "pong").unwrap())
        };
        let mut conn = Connection::new(7, MockStream::new(vec![In::Data(ping())]));

        assert_eq!(conn.on_ready(&mut responder).unwrap(), Disposition::Pending);
        drop(responder);

        let mut expected = BytesMut::new();
        encode_message(&Message::new(1, 2, "pong").unwrap(), &mut expected);
        assert_eq!(conn.stream().output, expected.to_vec());
        assert_eq!(seen, vec![(7, b"ping".to_vec())]);
    }

    #[test]
    fn would_block_between_messages_keeps_partial_progress() {
        let bytes = ping();
        let mut conn = Connection::new(
            8,
            MockStream::new(vec![
                In::Data(bytes.clone()),
                In::Data(bytes[..5].to_vec()),
                In::WouldBlock,
                In::Data(bytes[5..].to_vec()),
            ]),
        );

        assert_eq!(conn.on_ready(&mut Echo).unwrap(), Disposition::Pending);
        assert_eq!(conn.served(), 1);
        assert_eq!(conn.state().bytes_received(), 5);

        assert_eq!(conn.on_ready(&mut Echo).unwrap(), Disposition::Pending);
        assert_eq!(conn.served(), 2);
    }
}
