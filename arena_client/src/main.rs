//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p arena_client -- [--config arena.json] [--addr 127.0.0.1:3000]
//!
//! The client connects to the relay, prints what other players do, and
//! drives the local avatar from console commands.
//!
//! Console commands:
//!   w|a|s|d [n]            - Step forward/left/back/right n times
//!   turn <radians>         - Rotate the avatar
//!   attack <id> [ability]  - Use basicAttack or specialAbility on a player
//!   status                 - Show client status
//!   quit                   - Exit client

use std::env;
use std::io::{BufRead, Write};

use anyhow::Context;
use arena_client::client::{ArenaClient, ClientState};
use arena_shared::{config::ArenaConfig, net::ServerEvent};
use tokio::sync::mpsc;
use tracing::info;

fn parse_args() -> anyhow::Result<ArenaConfig> {
    let args: Vec<String> = env::args().collect();
    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => ArenaConfig::from_file(&args[i + 1])?,
        _ => ArenaConfig::default(),
    };
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
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
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(server = %cfg.server_addr, "Starting client");

    let mut client = ArenaClient::connect(&cfg).await.context("connect")?;

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

    println!(
        "Connected as player {}. Type 'status' for info, 'quit' to exit.",
        client.player_id
    );
    println!();

    loop {
        tokio::select! {
            line = console_rx.recv() => {
                let Some(line) = line else { break };
                if line == "quit" || line == "exit" {
                    break;
                }
                match client.exec_console(&line).await {
                    Ok(output) => {
                        for line in output {
                            println!("{line}");
                        }
                    }
                    Err(e) => println!("Error: {e}"),
                }
            }
            event = client.next_event() => match event {
                Some(ServerEvent::Combat(c)) => {
                    println!(
                        "{} used {} on {}",
                        c.attacker_id, c.ability_name, c.target_id
                    );
                }
                Some(_) => {}
                None => {
                    println!("Disconnected from relay.");
                    break;
                }
            },
        }
    }

    if client.state == ClientState::Disconnected {
        return Ok(());
    }
    client.disconnect().await
}
