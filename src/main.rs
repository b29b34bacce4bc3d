//! queqiao-gateway server entry point.
//!
//! Runs the bridging server standalone: the process stands in for the
//! synchronous host, reading admin commands from stdin until EOF.

use std::io::BufRead;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use queqiao_gateway::admin::{self, AdminCommand};
use queqiao_gateway::api::HostDispatcher;
use queqiao_gateway::config::BridgeConfig;
use queqiao_gateway::host::LoggingHost;
use queqiao_gateway::server::BridgeServer;

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = BridgeConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, path = %config.ws_path, "starting queqiao-gateway");

    // Build the server over the logging host backend
    let host = Arc::new(LoggingHost);
    let dispatcher = Arc::new(HostDispatcher::new(host));
    let auto_start = config.auto_start;
    let server = Arc::new(BridgeServer::new(config, dispatcher));

    if auto_start {
        server.start()?;
    }

    // Admin loop: one command per line until EOF or quit
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
            break;
        }
        match AdminCommand::parse(input) {
            Some(command) => println!("{}", admin::execute(&server, command)),
            None => println!("unknown command; try \"help\""),
        }
    }

    if server.is_running() {
        let timeout = server.config().stop_timeout;
        server.stop(timeout);
    }

    Ok(())
}
