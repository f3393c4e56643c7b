use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod client;
pub mod send;
pub mod server;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the multiplexing echo server.
    Server(ServerArgs),
    /// Interactive client: send each stdin line and print the reply.
    Client(ClientArgs),
    /// Send a single message and print the reply.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Server(args) => server::run(args, format),
        Command::Client(args) => client::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Address to bind.
    #[arg(env = "KMP_HOST", default_value = "0.0.0.0")]
    pub host: String,
    /// Port to bind (0 picks a free port).
    #[arg(env = "KMP_PORT", default_value_t = kmp_transport::TcpTransport::DEFAULT_PORT)]
    pub port: u16,
    /// Upper bound on one event wait (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub wait_timeout: Duration,
    /// Maximum number of simultaneous connections.
    #[arg(long, default_value_t = 1024)]
    pub max_connections: usize,
}

/// Connection options shared by `client` and `send`.
#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Server host name or address.
    #[arg(env = "KMP_HOST", default_value = "127.0.0.1")]
    pub host: String,
    /// Server port.
    #[arg(env = "KMP_PORT", default_value_t = kmp_transport::TcpTransport::DEFAULT_PORT)]
    pub port: u16,
    /// Connect timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub connect_timeout: Duration,
    /// Time allowed for one request/reply exchange.
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub timeout: Duration,
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Command code sent with every line.
    #[arg(long, short = 'c', default_value_t = 1)]
    pub code: u32,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Command code (24-bit).
    #[arg(long, short = 'c', default_value_t = 1)]
    pub code: u32,
    /// Header flag byte.
    #[arg(long, default_value_t = 0)]
    pub flag: u8,
    /// Application, hop-by-hop and end-to-end ids (comma-separated).
    #[arg(long, value_delimiter = ',', value_name = "APP,HOP,END")]
    pub ids: Option<Vec<u32>>,
    /// JSON body.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string body.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read body from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `5s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration must not be empty".to_string());
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration value: {input}"))?;
    if value == 0 {
        return Err("duration must be greater than zero".to_string());
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
