use std::fs;

use kmp_frame::{Message, PROTOCOL_VERSION};

use crate::cmd::client::connect;
use crate::cmd::SendArgs;
use crate::exit::{frame_error, io_error, peer_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_message, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let message = build_message(&args)?;
    let mut client = connect(&args.connect)?;

    let reply = client
        .request(&message)
        .map_err(|err| peer_error("request failed", err))?;
    print_message(&reply, client.peer_addr(), format);

    Ok(SUCCESS)
}

fn build_message(args: &SendArgs) -> CliResult<Message> {
    let body = resolve_body(args)?;
    if body.is_empty() {
        return Err(CliError::new(
            USAGE,
            "message body must not be empty (use --data, --json or --file)",
        ));
    }

    let mut message = Message::new(PROTOCOL_VERSION, args.code, body)
        .map_err(|err| frame_error("invalid message", err))?
        .with_flag(args.flag);
    if let Some(ids) = &args.ids {
        let [app_id, hop_id, end_id] = ids.as_slice() else {
            return Err(CliError::new(USAGE, "--ids takes exactly three values"));
        };
        message = message.with_ids(*app_id, *hop_id, *end_id);
    }
    Ok(message)
}

fn resolve_body(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cmd::ConnectArgs;
    use crate::exit::DATA_INVALID;

    fn args() -> SendArgs {
        SendArgs {
            connect: ConnectArgs {
                host: "127.0.0.1".into(),
                port: 8000,
                connect_timeout: Duration::from_secs(1),
                timeout: Duration::from_secs(1),
            },
            code: 1,
            flag: 0,
            ids: None,
            json: None,
            data: None,
            file: None,
        }
    }

    #[test]
    fn builds_message_with_ids_and_flag() {
        let mut args = args();
        args.data = Some("ping".into());
        args.flag = 0x80;
        args.ids = Some(vec![1, 2, 3]);

        let message = build_message(&args).expect("message should build");
        let header = message.header();
        assert_eq!(header.length, 24);
        assert_eq!(header.flag, 0x80);
        assert_eq!((header.app_id, header.hop_id, header.end_id), (1, 2, 3));
    }

    #[test]
    fn empty_body_is_a_usage_error() {
        let err = build_message(&args()).unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn wrong_id_count_is_a_usage_error() {
        let mut args = args();
        args.data = Some("x".into());
        args.ids = Some(vec![1, 2]);
        assert_eq!(build_message(&args).unwrap_err().code, USAGE);
    }

    #[test]
    fn oversized_body_is_invalid_data() {
        let mut args = args();
        args.data = Some("x".repeat(2000));
        assert_eq!(build_message(&args).unwrap_err().code, DATA_INVALID);
    }

    #[test]
    fn invalid_json_is_rejected() {
        let mut args = args();
        args.json = Some("{not json".into());
        assert_eq!(build_message(&args).unwrap_err().code, USAGE);
    }
}
