use std::io::{BufRead, IsTerminal, Write};

use kmp_frame::MAX_BODY;
use kmp_peer::{Client, ClientConfig};
use tracing::{info, warn};

use crate::cmd::{ClientArgs, ConnectArgs};
use crate::exit::{io_error, peer_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: ClientArgs, format: OutputFormat) -> CliResult<i32> {
    let mut client = connect(&args.connect)?;
    let peer = client.peer_addr();

    let stdin = std::io::stdin();
    let interactive = stdin.is_terminal();
    if interactive {
        eprintln!("connected to {peer}; type a message, Ctrl-D or Ctrl-C to exit");
    }

    let mut sent = 0u64;
    let mut lines = stdin.lock().lines();
    loop {
        if interactive {
            eprint!("> ");
            let _ = std::io::stderr().flush();
        }
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.map_err(|err| io_error("stdin read failed", err))?;
        let text = match classify_line(&line) {
            Line::Blank => continue,
            Line::TooLong(len) => {
                warn!(len, max = MAX_BODY, "line too long, skipped");
                eprintln!("line of {len} bytes exceeds the {MAX_BODY}-byte body limit; skipped");
                continue;
            }
            Line::Send(text) => text,
        };

        let reply = client
            .send_text(args.code, text)
            .map_err(|err| peer_error("request failed", err))?;
        print_message(&reply, peer, format);
        sent += 1;
    }

    info!(%peer, sent, "client finished, bye");
    Ok(SUCCESS)
}

#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Blank,
    TooLong(usize),
    Send(&'a str),
}

fn classify_line(line: &str) -> Line<'_> {
    let text = line.trim_end_matches('\r');
    if text.is_empty() {
        Line::Blank
    } else if text.len() > MAX_BODY {
        Line::TooLong(text.len())
    } else {
        Line::Send(text)
    }
}

pub fn connect(args: &ConnectArgs) -> CliResult<Client> {
    let config = ClientConfig {
        connect_timeout: Some(args.connect_timeout),
        request_timeout: args.timeout,
        ..ClientConfig::default()
    };
    Client::connect_with_config(&args.host, args.port, config)
        .map_err(|err| peer_error("connect failed", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_console_lines() {
        assert_eq!(classify_line(""), Line::Blank);
        assert_eq!(classify_line("\r"), Line::Blank);
        assert_eq!(classify_line("ping\r"), Line::Send("ping"));

        let max = "x".repeat(MAX_BODY);
        assert_eq!(classify_line(&max), Line::Send(max.as_str()));
        assert_eq!(
            classify_line(&"x".repeat(MAX_BODY + 1)),
            Line::TooLong(MAX_BODY + 1)
        );
    }
}
