use std::io::{ErrorKind, Read};

use tracing::trace;

use crate::codec::{Header, HEADER_SIZE, MAX_BODY};
use crate::error::{FrameError, Result};
use crate::state::TransferState;

/// Outcome of one [`advance_receive`] attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvStatus {
    /// Bytes were read; the message is not complete yet. Call again.
    Progressed,
    /// The body's last byte arrived. The message can be taken from the state.
    Complete,
    /// A header read was interrupted by a signal. Retry immediately.
    NeedHeaderRetry,
    /// A body read was interrupted by a signal. Retry immediately.
    NeedBodyRetry,
    /// No data available. Wait for the next readiness notification.
    WouldBlock,
    /// The peer closed the connection.
    PeerClosed,
}

/// Perform at most one `read` to advance the inbound message.
///
/// While the header is pending, reads go into the header buffer; once all 20
/// bytes are in, the header is decoded and validated, and the body is read on
/// the following calls. The engine never asks for more than the bytes still
/// missing from the current message, so a pipelined next message stays in the
/// socket.
///
/// `WouldBlock`, `NeedHeaderRetry`, `NeedBodyRetry` and `PeerClosed` leave the
/// counters untouched.
pub fn advance_receive<R>(state: &mut TransferState, src: &mut R) -> Result<RecvStatus>
where
    R: Read + ?Sized,
{
    if state.recv_body_done {
        if !state.recv_header_done {
            return Err(FrameError::InvalidState("body received before header"));
        }
        return Err(FrameError::InvalidState(
            "message already received; reset before reading the next",
        ));
    }

    if state.recv_header_done {
        receive_body(state, src)
    } else {
        receive_header(state, src)
    }
}

fn receive_header<R>(state: &mut TransferState, src: &mut R) -> Result<RecvStatus>
where
    R: Read + ?Sized,
{
    let offset = state.bytes_received;
    if offset >= HEADER_SIZE {
        return Err(FrameError::InvalidState("header counter past header size"));
    }

    let wanted = HEADER_SIZE - offset;
    let read = match src.read(&mut state.recv_header[offset..]) {
        Ok(0) => return Ok(RecvStatus::PeerClosed),
        Ok(n) => n,
        Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(RecvStatus::WouldBlock),
        Err(err) if err.kind() == ErrorKind::Interrupted => {
            return Ok(RecvStatus::NeedHeaderRetry)
        }
        Err(err) => return Err(FrameError::Io(err)),
    };
    if read > wanted {
        return Err(FrameError::InvalidState("read reported more bytes than requested"));
    }

    state.bytes_received += read;
    trace!(read, received = state.bytes_received, "header bytes received");

    if state.bytes_received < HEADER_SIZE {
        return Ok(RecvStatus::Progressed);
    }

    let header = Header::decode(&state.recv_header)?;
    let body_len = header.body_len();
    if body_len > MAX_BODY {
        return Err(FrameError::OversizedBody {
            declared: body_len,
            max: MAX_BODY,
        });
    }

    state.declared_length = header.length as usize;
    state.recv_header_done = true;
    trace!(
        length = state.declared_length,
        code = header.code,
        "header decoded"
    );
    Ok(RecvStatus::Progressed)
}

fn receive_body<R>(state: &mut TransferState, src: &mut R) -> Result<RecvStatus>
where
    R: Read + ?Sized,
{
    let body_len = state.declared_length.saturating_sub(HEADER_SIZE);
    let offset = state
        .bytes_received
        .checked_sub(HEADER_SIZE)
        .ok_or(FrameError::InvalidState("header marked done before 20 bytes"))?;
    if body_len == 0 || body_len > MAX_BODY || offset >= body_len {
        return Err(FrameError::InvalidState("body counter outside declared length"));
    }

    let wanted = body_len - offset;
    let read = match src.read(&mut state.recv_body[offset..body_len]) {
        Ok(0) => return Ok(RecvStatus::PeerClosed),
        Ok(n) => n,
        Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(RecvStatus::WouldBlock),
        Err(err) if err.kind() == ErrorKind::Interrupted => return Ok(RecvStatus::NeedBodyRetry),
        Err(err) => return Err(FrameError::Io(err)),
    };
    if read > wanted {
        return Err(FrameError::InvalidState("read reported more bytes than requested"));
    }

    state.bytes_received += read;
    trace!(read, received = state.bytes_received, "body bytes received");

    if state.bytes_received == state.declared_length {
        state.recv_body_done = true;
        return Ok(RecvStatus::Complete);
    }
    Ok(RecvStatus::Progressed)
}
