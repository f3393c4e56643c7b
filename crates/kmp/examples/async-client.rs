//! Talk to a kmp server from tokio using `KmpCodec`.
//!
//! Run with:
//!   cargo run --example async-client --features async -- 127.0.0.1:8000 hello

use futures_util::{SinkExt, StreamExt};
use kmp::frame::{KmpCodec, Message, PROTOCOL_VERSION};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:8000".to_string());
    let text = args.next().unwrap_or_else(|| "ping".to_string());

    let stream = TcpStream::connect(&addr).await?;
    let mut framed = Framed::new(stream, KmpCodec::new());

    framed
        .send(Message::new(PROTOCOL_VERSION, 1, text.into_bytes())?)
        .await?;
    match framed.next().await {
        Some(reply) => {
            let reply = reply?;
            println!(
                "reply: code={} length={} body={}",
                reply.header().code,
                reply.header().length,
                reply.body_text().unwrap_or("<binary>")
            );
        }
        None => eprintln!("server closed the connection"),
    }
    Ok(())
}
