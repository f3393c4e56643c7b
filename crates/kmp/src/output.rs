use std::io::{IsTerminal, Write};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use kmp_frame::Message;
use kmp_peer::ServerStats;
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput {
    peer: String,
    version: u8,
    length: u32,
    flag: u8,
    code: u32,
    app_id: u32,
    hop_id: u32,
    end_id: u32,
    body_size: usize,
    body: String,
    timestamp: String,
}

impl MessageOutput {
    fn new(message: &Message, peer: SocketAddr) -> Self {
        let header = message.header();
        Self {
            peer: peer.to_string(),
            version: header.version,
            length: header.length,
            flag: header.flag,
            code: header.code,
            app_id: header.app_id,
            hop_id: header.hop_id,
            end_id: header.end_id,
            body_size: message.body().len(),
            body: body_preview(message.body()),
            timestamp: now_unix_seconds(),
        }
    }
}

pub fn print_message(message: &Message, peer: SocketAddr, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&MessageOutput::new(message, peer)),
        OutputFormat::Table => {
            let header = message.header();
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "VERSION", "LENGTH", "FLAG", "CODE", "APP", "HOP", "END", "BODY",
                ])
                .add_row(vec![
                    header.version.to_string(),
                    header.length.to_string(),
                    header.flag.to_string(),
                    header.code.to_string(),
                    header.app_id.to_string(),
                    header.hop_id.to_string(),
                    header.end_id.to_string(),
                    body_preview(message.body()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => print!("{}", render_pretty(message)),
        OutputFormat::Raw => print_raw(message.body()),
    }
}

fn render_pretty(message: &Message) -> String {
    let header = message.header();
    format!(
        "---- msg header ----\n\
         | version : {}\n\
         | length  : {}\n\
         | flag    : {}\n\
         | code    : {}\n\
         | app_id  : {}\n\
         | hop_id  : {}\n\
         | end_id  : {}\n\
         ---- msg body ----\n\
         | {}\n",
        header.version,
        header.length,
        header.flag,
        header.code,
        header.app_id,
        header.hop_id,
        header.end_id,
        body_preview(message.body()),
    )
}

#[derive(Serialize)]
struct StatsOutput {
    addr: String,
    accepted: u64,
    rejected: u64,
    closed: u64,
    served: u64,
}

pub fn print_listening(addr: SocketAddr, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "event": "listening",
            "addr": addr.to_string(),
        })),
        _ => println!("listening on {addr}"),
    }
    let _ = std::io::stdout().flush();
}

pub fn print_stats(addr: SocketAddr, stats: &ServerStats, format: OutputFormat) {
    let out = StatsOutput {
        addr: addr.to_string(),
        accepted: stats.accepted,
        rejected: stats.rejected,
        closed: stats.closed,
        served: stats.served,
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["ADDR", "ACCEPTED", "REJECTED", "CLOSED", "SERVED"])
                .add_row(vec![
                    out.addr,
                    out.accepted.to_string(),
                    out.rejected.to_string(),
                    out.closed.to_string(),
                    out.served.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!(
            "addr={} accepted={} rejected={} closed={} served={}",
            out.addr, out.accepted, out.rejected, out.closed, out.served
        ),
        OutputFormat::Raw => {}
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn body_preview(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", body.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_lists_every_header_field() {
        let message = Message::new(1, 7, "ping")
            .expect("message")
            .with_ids(10, 20, 30);
        let text = render_pretty(&message);
        assert!(text.contains("| length  : 24\n"));
        assert!(text.contains("| code    : 7\n"));
        assert!(text.contains("| end_id  : 30\n"));
        assert!(text.ends_with("| ping\n"));
    }

    #[test]
    fn json_output_carries_header_and_body() {
        let message = Message::new(1, 1, "hello").expect("message");
        let peer: SocketAddr = "127.0.0.1:8000".parse().expect("addr");
        let value = serde_json::to_value(MessageOutput::new(&message, peer)).expect("json");
        assert_eq!(value["length"], 25);
        assert_eq!(value["body"], "hello");
        assert_eq!(value["peer"], "127.0.0.1:8000");
    }

    #[test]
    fn binary_body_is_summarized() {
        assert_eq!(body_preview(&[0xff, 0xfe]), "<binary 2 bytes>");
    }
}
