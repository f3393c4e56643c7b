#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener};
use std::process::{Child, Command, Stdio};

use kmp_peer::{Client, ClientConfig};

struct ServerProcess {
    child: Child,
    addr: SocketAddr,
}

impl ServerProcess {
    fn start() -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_kmp"))
            .args(["--log-level", "error", "--format", "json", "server", "127.0.0.1", "0"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("server command should start");

        let stdout = child.stdout.take().expect("server stdout should be piped");
        let mut line = String::new();
        BufReader::new(stdout)
            .read_line(&mut line)
            .expect("server should announce its address");
        let event: serde_json::Value =
            serde_json::from_str(&line).expect("listening line should be JSON");
        assert_eq!(event["event"], "listening");
        let addr = event["addr"]
            .as_str()
            .expect("addr should be a string")
            .parse()
            .expect("addr should parse");

        Self { child, addr }
    }

    fn port(&self) -> String {
        self.addr.port().to_string()
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn kmp() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_kmp"));
    cmd.args(["--log-level", "error"]);
    cmd
}

#[test]
fn server_echoes_library_client() {
    let server = ServerProcess::start();

    let mut client = Client::connect_addr(server.addr, ClientConfig::default())
        .expect("client should connect");
    let reply = client.send_text(1, "ping").expect("request should succeed");

    assert_eq!(reply.header().length, 24);
    assert_eq!(reply.header().code, 1);
    assert_eq!(reply.body_text(), Some("ping"));
}

#[test]
fn send_prints_reply_as_json() {
    let server = ServerProcess::start();

    let output = kmp()
        .args(["--format", "json", "send", "127.0.0.1", &server.port()])
        .args(["--data", "hello", "--code", "42", "--ids", "7,8,9"])
        .output()
        .expect("send should run");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let reply: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("send output should be JSON");
    assert_eq!(reply["body"], "hello");
    assert_eq!(reply["length"], 25);
    assert_eq!(reply["code"], 42);
    assert_eq!(reply["app_id"], 7);
    assert_eq!(reply["end_id"], 9);
}

#[test]
fn client_sends_each_stdin_line() {
    let server = ServerProcess::start();

    let mut child = kmp()
        .args(["--format", "raw", "client", "127.0.0.1", &server.port()])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("client should start");

    child
        .stdin
        .take()
        .expect("client stdin should be piped")
        .write_all(b"one\n\ntwo\n")
        .expect("write to client stdin");

    let output = child.wait_with_output().expect("client should finish");
    assert!(output.status.success());
    assert_eq!(output.stdout, b"onetwo");
}

#[test]
fn client_skips_overlong_line_and_continues() {
    let server = ServerProcess::start();

    let mut child = kmp()
        .args(["--format", "raw", "client", "127.0.0.1", &server.port()])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("client should start");

    let mut input = b"before\n".to_vec();
    input.extend(std::iter::repeat(b'x').take(2000));
    input.extend_from_slice(b"\nafter\n");
    child
        .stdin
        .take()
        .expect("client stdin should be piped")
        .write_all(&input)
        .expect("write to client stdin");

    let output = child.wait_with_output().expect("client should finish");
    assert!(output.status.success());
    assert_eq!(output.stdout, b"beforeafter");
    assert!(String::from_utf8_lossy(&output.stderr).contains("2000 bytes exceeds"));
}

#[test]
fn send_to_closed_port_fails() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind scratch listener");
        listener.local_addr().expect("scratch addr").port()
    };

    let output = kmp()
        .args(["send", "127.0.0.1", &port.to_string(), "--data", "x"])
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connect failed"));
}

#[test]
fn send_without_body_is_usage_error() {
    let output = kmp()
        .args(["send", "127.0.0.1", "1"])
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(64));
}
