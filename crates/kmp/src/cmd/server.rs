use kmp_peer::{Server, ServerConfig};
use kmp_transport::ShutdownSignal;
use tracing::warn;

use crate::cmd::ServerArgs;
use crate::exit::{peer_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_listening, print_stats, OutputFormat};

pub fn run(args: ServerArgs, format: OutputFormat) -> CliResult<i32> {
    let config = server_config(&args);
    let mut server = Server::bind_with_config(&args.host, args.port, config)
        .map_err(|err| peer_error("bind failed", err))?;
    install_ctrlc_handler(server.shutdown_signal())?;

    let addr = server.local_addr();
    print_listening(addr, format);

    let stats = server
        .run()
        .map_err(|err| peer_error("server failed", err))?;
    print_stats(addr, &stats, format);

    Ok(SUCCESS)
}

fn server_config(args: &ServerArgs) -> ServerConfig {
    ServerConfig {
        wait_timeout: args.wait_timeout,
        max_connections: args.max_connections,
        ..ServerConfig::default()
    }
}

fn install_ctrlc_handler(signal: ShutdownSignal) -> CliResult<()> {
    ctrlc::set_handler(move || {
        if let Err(err) = signal.trigger() {
            warn!(error = %err, "failed to wake server for shutdown");
        }
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
