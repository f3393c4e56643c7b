//! Echo server that logs every request it answers.
//!
//! Run with:
//!   cargo run --example echo-server -- 127.0.0.1 8000
//!
//! In another terminal:
//!   cargo run --features cli -- send 127.0.0.1 8000 --data ping

use kmp::frame::Message;
use kmp::peer::{Reply, Server};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port = match args.next() {
        Some(port) => port.parse()?,
        None => kmp::transport::TcpTransport::DEFAULT_PORT,
    };

    let mut server = Server::bind(&host, port)?.with_responder(|conn: u64, request: &Message| {
        eprintln!(
            "conn {conn}: code={} {} bytes: {}",
            request.header().code,
            request.wire_size(),
            request.body_text().unwrap_or("<binary>")
        );
        Reply::Echo
    });
    eprintln!("Listening on {}", server.local_addr());

    let signal = server.shutdown_signal();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        let _ = signal.trigger();
    });
    eprintln!("Press Enter to stop");

    let stats = server.run()?;
    eprintln!("served {} messages on {} connections", stats.served, stats.accepted);
    Ok(())
}
