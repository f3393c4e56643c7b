use std::io::{ErrorKind, Write};

use tracing::trace;

use crate::codec::{HEADER_SIZE, MAX_BODY};
use crate::error::{FrameError, Result};
use crate::state::TransferState;

/// Outcome of one [`advance_send`] attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Bytes were written; more remain. Call again.
    Progressed,
    /// The write was interrupted by a signal. Retry immediately.
    NeedRetry,
    /// No buffer space. Wait for the next writable notification.
    WouldBlock,
    /// The whole outbound message has been written.
    Done,
}

/// Perform at most one `write` to advance the prepared outbound message.
///
/// The outbound buffers must have been loaded with
/// [`TransferState::prepare_send`] or [`TransferState::prepare_echo`].
/// `bytes_sent` only grows and never passes the prepared length; a writer
/// claiming more bytes than it was offered fails closed with `InvalidState`.
pub fn advance_send<W>(state: &mut TransferState, dst: &mut W) -> Result<SendStatus>
where
    W: Write + ?Sized,
{
    if state.send_length < HEADER_SIZE || state.send_length > HEADER_SIZE + MAX_BODY {
        return Err(FrameError::InvalidState("no outbound message prepared"));
    }
    if state.send_body_done {
        if !state.send_header_done {
            return Err(FrameError::InvalidState("body sent before header"));
        }
        return Err(FrameError::InvalidState(
            "outbound message already sent; prepare the next one first",
        ));
    }

    if state.send_header_done {
        send_body(state, dst)
    } else {
        send_header(state, dst)
    }
}

fn send_header<W>(state: &mut TransferState, dst: &mut W) -> Result<SendStatus>
where
    W: Write + ?Sized,
{
    let offset = state.bytes_sent;
    if offset >= HEADER_SIZE {
        return Err(FrameError::InvalidState("header counter past header size"));
    }

    let written = match write_once(dst, &state.send_header[offset..])? {
        Attempt::Wrote(n) => n,
        Attempt::WouldBlock => return Ok(SendStatus::WouldBlock),
        Attempt::Interrupted => return Ok(SendStatus::NeedRetry),
    };

    state.bytes_sent += written;
    trace!(written, sent = state.bytes_sent, "header bytes sent");

    if state.bytes_sent < HEADER_SIZE {
        return Ok(SendStatus::Progressed);
    }

    state.send_header_done = true;
    if state.send_length == HEADER_SIZE {
        state.send_body_done = true;
        return Ok(SendStatus::Done);
    }
    Ok(SendStatus::Progressed)
}

fn send_body<W>(state: &mut TransferState, dst: &mut W) -> Result<SendStatus>
where
    W: Write + ?Sized,
{
    let body_len = state.send_length - HEADER_SIZE;
    let offset = state
        .bytes_sent
        .checked_sub(HEADER_SIZE)
        .ok_or(FrameError::InvalidState("header marked sent before 20 bytes"))?;
    if offset >= body_len {
        return Err(FrameError::InvalidState("body counter outside outbound length"));
    }

    let written = match write_once(dst, &state.send_body[offset..body_len])? {
        Attempt::Wrote(n) => n,
        Attempt::WouldBlock => return Ok(SendStatus::WouldBlock),
        Attempt::Interrupted => return Ok(SendStatus::NeedRetry),
    };

    state.bytes_sent += written;
    trace!(written, sent = state.bytes_sent, "body bytes sent");

    if state.bytes_sent == state.send_length {
        state.send_body_done = true;
        return Ok(SendStatus::Done);
    }
    Ok(SendStatus::Progressed)
}

enum Attempt {
    /// `0 < n <= pending.len()` bytes accepted.
    Wrote(usize),
    WouldBlock,
    Interrupted,
}

fn write_once<W>(dst: &mut W, pending: &[u8]) -> Result<Attempt>
where
    W: Write + ?Sized,
{
    match dst.write(pending) {
        Ok(0) => Err(FrameError::Io(std::io::Error::from(ErrorKind::WriteZero))),
        Ok(n) if n > pending.len() => Err(FrameError::InvalidState(
            "write reported more bytes than offered",
        )),
        Ok(n) => Ok(Attempt::Wrote(n)),
        Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(Attempt::WouldBlock),
        Err(err) if err.kind() == ErrorKind::Interrupted => Ok(Attempt::Interrupted),
        Err(err) => Err(FrameError::Io(err)),
    }
}
