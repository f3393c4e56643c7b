use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use kmp_frame::{
    advance_receive, advance_send, Message, RecvStatus, SendStatus, TransferState,
    PROTOCOL_VERSION,
};
use kmp_transport::{Dispatcher, Interest, KmpStream, TcpTransport, Token};
use tracing::{debug, info};

use crate::error::{PeerError, Result};

const STREAM: Token = Token(0);

/// Client connection tuning.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bound on the blocking connect. `None` uses the OS default.
    pub connect_timeout: Option<Duration>,
    /// Bound on one full request/reply exchange.
    pub request_timeout: Duration,
    /// Readiness events collected per wait.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(5)),
            request_timeout: Duration::from_secs(10),
            event_capacity: 16,
        }
    }
}

/// Request/reply client over one non-blocking connection.
///
/// The client drives the same framing engine as the server and parks on its
/// own dispatcher whenever the socket would block.
pub struct Client {
    stream: KmpStream,
    dispatcher: Dispatcher,
    state: TransferState,
    config: ClientConfig,
    interest: Interest,
    broken: bool,
}

impl Client {
    /// Resolve `host` and connect with default configuration.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_with_config(host, port, ClientConfig::default())
    }

    /// Resolve `host` and connect.
    ///
    /// The connect is blocking; the socket switches to non-blocking mode
    /// before it is registered with the dispatcher.
    pub fn connect_with_config(host: &str, port: u16, config: ClientConfig) -> Result<Self> {
        let stream = TcpTransport::connect_host(host, port, config.connect_timeout)?;
        Self::from_stream(stream, config)
    }

    /// Connect to an already resolved address.
    pub fn connect_addr(addr: SocketAddr, config: ClientConfig) -> Result<Self> {
        let stream = TcpTransport::connect(addr, config.connect_timeout)?;
        Self::from_stream(stream, config)
    }

    /// Wrap a connected non-blocking stream.
    pub fn from_stream(mut stream: KmpStream, config: ClientConfig) -> Result<Self> {
        stream.check_health()?;
        stream.set_nodelay(true)?;
        let dispatcher = Dispatcher::new(config.event_capacity)?;
        dispatcher.register(&mut stream, STREAM, Interest::READABLE)?;
        info!(peer = %stream.peer_addr(), "client connected");

        Ok(Self {
            stream,
            dispatcher,
            state: TransferState::new(),
            config,
            interest: Interest::READABLE,
            broken: false,
        })
    }

    /// Send `message` and wait for the complete reply.
    ///
    /// A failed or timed-out exchange leaves the stream mid-message, so every
    /// later request on this client fails with [`PeerError::Disconnected`].
    pub fn request(&mut self, message: &Message) -> Result<Message> {
        if self.broken {
            return Err(PeerError::Disconnected(format!(
                "{} (connection unusable after an earlier failure)",
                self.stream.peer_addr()
            )));
        }

        let result = self.exchange(message);
        if result.is_err() {
            self.broken = true;
        }
        result
    }

    /// Send `text` as a version-1 message with `code` and wait for the reply.
    pub fn send_text(&mut self, code: u32, text: &str) -> Result<Message> {
        let body = Bytes::copy_from_slice(text.as_bytes());
        let message = Message::new(PROTOCOL_VERSION, code, body)?;
        self.request(&message)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.stream.peer_addr()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn exchange(&mut self, message: &Message) -> Result<Message> {
        let deadline = Instant::now() + self.config.request_timeout;
        self.state.reset();
        self.state.prepare_send(message)?;

        loop {
            match advance_send(&mut self.state, &mut self.stream)? {
                SendStatus::Done => break,
                SendStatus::WouldBlock => {
                    self.set_interest(Interest::WRITABLE)?;
                    self.wait_until(deadline)?;
                }
                SendStatus::Progressed | SendStatus::NeedRetry => {}
            }
        }
        self.set_interest(Interest::READABLE)?;
        debug!(bytes = self.state.send_length(), "request sent");

        loop {
            match advance_receive(&mut self.state, &mut self.stream)? {
                RecvStatus::Complete => break,
                RecvStatus::WouldBlock => self.wait_until(deadline)?,
                RecvStatus::PeerClosed => {
                    return Err(PeerError::Disconnected(format!(
                        "{} closed the connection",
                        self.stream.peer_addr()
                    )));
                }
                RecvStatus::Progressed
                | RecvStatus::NeedHeaderRetry
                | RecvStatus::NeedBodyRetry => {}
            }
        }

        let reply = self.state.received_message()?;
        debug!(
            bytes = reply.wire_size(),
            code = reply.header().code,
            "reply received"
        );
        Ok(reply)
    }

    /// Readable while waiting for a reply, writable only while a send is
    /// blocked.
    fn set_interest(&mut self, interest: Interest) -> Result<()> {
        if self.interest != interest {
            self.dispatcher
                .reregister(&mut self.stream, STREAM, interest)?;
            self.interest = interest;
        }
        Ok(())
    }

    fn wait_until(&mut self, deadline: Instant) -> Result<()> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(PeerError::Timeout(self.config.request_timeout));
        }
        for readiness in self.dispatcher.wait(Some(remaining))? {
            if readiness.error {
                self.stream.check_health()?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("peer", &self.stream.peer_addr())
            .field("broken", &self.broken)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use bytes::BytesMut;
    use kmp_frame::{encode_message, HEADER_SIZE, MAX_BODY};

    use super::*;

    fn quick() -> ClientConfig {
        ClientConfig {
            request_timeout: Duration::from_millis(300),
            ..ClientConfig::default()
        }
    }

    #[test]
    fn reply_from_trickling_server_is_reassembled() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let reply = Message::new(1, 5, vec![b'x'; MAX_BODY])
            .expect("reply fits")
            .with_ids(1, 2, 3);
        let expected = reply.clone();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            stream.set_nodelay(true).expect("nodelay");
            let mut request = [0u8; HEADER_SIZE + 4];
            stream.read_exact(&mut request).expect("read request");

            let mut wire = BytesMut::new();
            encode_message(&reply, &mut wire);
            for chunk in wire.chunks(100) {
                stream.write_all(chunk).expect("write chunk");
                thread::sleep(Duration::from_millis(2));
            }
            request
        });

        let mut client = Client::connect_addr(addr, ClientConfig::default()).expect("connect");
        let received = client.send_text(1, "ping").expect("request");
        assert_eq!(received, expected);

        let request = server.join().expect("server thread");
        assert_eq!(&request[HEADER_SIZE..], b"ping");
        assert_eq!(u32::from_be_bytes([0, request[1], request[2], request[3]]), 24);
    }

    #[test]
    fn silent_server_times_out_and_poisons_client() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            thread::sleep(Duration::from_millis(600));
            drop(stream);
        });

        let mut client = Client::connect_addr(addr, quick()).expect("connect");
        let err = client.send_text(1, "ping").unwrap_err();
        assert!(matches!(err, PeerError::Timeout(_)), "got {err:?}");

        let err = client.send_text(1, "again").unwrap_err();
        assert!(matches!(err, PeerError::Disconnected(_)), "got {err:?}");
        server.join().expect("server thread");
    }

    #[test]
    fn server_close_mid_reply_is_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut request = [0u8; HEADER_SIZE + 4];
            stream.read_exact(&mut request).expect("read request");
            stream.write_all(&request[..10]).expect("partial reply");
        });

        let mut client = Client::connect_addr(addr, quick()).expect("connect");
        let err = client.send_text(1, "ping").unwrap_err();
        assert!(matches!(err, PeerError::Disconnected(_)), "got {err:?}");
        server.join().expect("server thread");
    }

    #[test]
    fn oversized_text_is_rejected_before_sending() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let mut client = Client::connect_addr(addr, quick()).expect("connect");

        let err = client.send_text(1, &"x".repeat(MAX_BODY + 1)).unwrap_err();
        assert!(matches!(err, PeerError::Frame(_)), "got {err:?}");
    }

    #[test]
    fn connect_to_closed_port_fails() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("local addr")
        };
        let err = Client::connect_addr(addr, quick()).unwrap_err();
        assert!(matches!(err, PeerError::Transport(_)), "got {err:?}");
    }

    #[test]
    fn interest_returns_to_readable_after_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut request = [0u8; HEADER_SIZE + 4];
            stream.read_exact(&mut request).expect("read request");
            stream.write_all(&request).expect("echo");
        });

        let mut client = Client::connect_addr(addr, ClientConfig::default()).expect("connect");
        assert_eq!(client.interest, Interest::READABLE);
        client.send_text(1, "ping").expect("request");
        assert_eq!(client.interest, Interest::READABLE);
        server.join().expect("server thread");
    }

    #[test]
    fn send_blocked_by_full_buffer_resumes_on_writable() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (filled_tx, filled_rx) = std::sync::mpsc::channel::<usize>();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let filler = filled_rx.recv().expect("filler size");
            thread::sleep(Duration::from_millis(100));

            let mut junk = vec![0u8; filler];
            stream.read_exact(&mut junk).expect("drain filler");
            let mut request = [0u8; HEADER_SIZE + 4];
            stream.read_exact(&mut request).expect("read request");
            stream.write_all(&request).expect("echo");
        });

        let mut client = Client::connect_addr(addr, ClientConfig::default()).expect("connect");
        let chunk = [0u8; 64 * 1024];
        let mut filler = 0;
        loop {
            match client.stream.write(&chunk) {
                Ok(n) => filler += n,
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => panic!("filler write failed: {err}"),
            }
        }
        filled_tx.send(filler).expect("report filler size");

        let reply = client.send_text(1, "ping").expect("request");
        assert_eq!(reply.body_text(), Some("ping"));
        assert_eq!(client.interest, Interest::READABLE);
        server.join().expect("server thread");
    }
}
