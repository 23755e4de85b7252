//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p arena_server -- [--config arena.json] [--addr 127.0.0.1:3000] [--queue 256]
//!
//! The `PORT` environment variable overrides the listen port from the config
//! file; command-line flags override both.
//!
//! Console commands:
//!   status      - Show sessions and their positions
//!   kick <id>   - Disconnect a session
//!   help        - List commands
//!   quit        - Shutdown server

use std::env;
use std::io::{BufRead, Write};

use anyhow::Context;
use arena_server::console::ConsoleCommand;
use arena_server::RelayServer;
use arena_shared::config::ArenaConfig;
use tokio::sync::mpsc;
use tracing::{info, warn};

fn parse_args() -> anyhow::Result<ArenaConfig> {
    let args: Vec<String> = env::args().collect();
    config_from(&args, env::var("PORT").ok().as_deref())
}

/// Builds the config: `--config` file (or defaults), then `PORT`, then the
/// `--addr` and `--queue` flags.
fn config_from(args: &[String], port: Option<&str>) -> anyhow::Result<ArenaConfig> {
    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => ArenaConfig::from_file(&args[i + 1])?,
        _ => ArenaConfig::default(),
    };

    if let Some(port) = port {
        let port: u16 = port.parse().context("parse PORT")?;
        cfg = cfg.with_port(port);
    }

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--queue" if i + 1 < args.len() => {
                cfg.outbound_queue_capacity = args[i + 1].parse().context("parse --queue")?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(
        addr = %cfg.server_addr,
        outbound_queue = cfg.outbound_queue_capacity,
        "Starting relay"
    );

    let server = RelayServer::bind(cfg).await.context("bind relay")?;
    let relay = server.spawn()?;

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Relay ready on {}. Type 'status' for info, 'quit' to exit.", relay.local_addr());
    println!();

    loop {
        tokio::select! {
            line = console_rx.recv() => {
                let Some(line) = line else {
                    // stdin closed; keep serving until interrupted.
                    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
                    break;
                };
                if ConsoleCommand::parse(&line) == ConsoleCommand::Quit {
                    break;
                }
                match relay.console(&line).await {
                    Ok(out) => {
                        for line in out {
                            println!("{line}");
                        }
                    }
                    Err(e) => warn!(error = %e, "Console command failed"),
                }
            }
            res = tokio::signal::ctrl_c() => {
                res.context("wait for ctrl-c")?;
                break;
            }
        }
    }

    info!("Server shutting down");
    relay.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("server")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults_without_overrides() {
        let cfg = config_from(&args(&[]), None).unwrap();
        assert_eq!(cfg, ArenaConfig::default());
    }

    #[test]
    fn port_overrides_file_and_flags_override_port() {
        let path = env::temp_dir().join(format!("arena-server-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"server_addr": "0.0.0.0:4000", "outbound_queue_capacity": 8}"#,
        )
        .unwrap();
        let file = path.to_string_lossy().into_owned();

        let cfg = config_from(&args(&["--config", file.as_str()]), None).unwrap();
        assert_eq!(cfg.server_addr, "0.0.0.0:4000");
        assert_eq!(cfg.outbound_queue_capacity, 8);

        let cfg = config_from(&args(&["--config", file.as_str()]), Some("5000")).unwrap();
        assert_eq!(cfg.server_addr, "0.0.0.0:5000");
        assert_eq!(cfg.outbound_queue_capacity, 8);

        let cfg = config_from(
            &args(&["--config", file.as_str(), "--addr", "127.0.0.1:6000", "--queue", "32"]),
            Some("5000"),
        )
        .unwrap();
        assert_eq!(cfg.server_addr, "127.0.0.1:6000");
        assert_eq!(cfg.outbound_queue_capacity, 32);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(config_from(&args(&[]), Some("http")).is_err());
        assert!(config_from(&args(&["--queue", "many"]), None).is_err());
        assert!(config_from(&args(&["--config", "/nonexistent/arena.json"]), None).is_err());
    }
}
