use kmp_frame::Message;

/// What the connection loop should send back for a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Send the received header and body bytes back unchanged.
    Echo,
    /// Send this message instead.
    Message(Message),
}

/// Application layer on the server side.
///
/// Called once per completely received message; a partial or malformed
/// message never reaches it.
pub trait Responder {
    fn respond(&mut self, conn: u64, request: &Message) -> Reply;
}

/// Echoes every request verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct Echo;

impl Responder for Echo {
    fn respond(&mut self, _conn: u64, _request: &Message) -> Reply {
        Reply::Echo
    }
}

impl<F> Responder for F
where
    F: FnMut(u64, &Message) -> Reply,
{
    fn respond(&mut self, conn: u64, request: &Message) -> Reply {
        self(conn, request)
    }
}
