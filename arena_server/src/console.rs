//! Operator console.
//!
//! Commands:
//!   status      - Show sessions and their positions
//!   kick <id>   - Disconnect a session
//!   help        - List commands
//!   quit        - Shutdown server (stdin console only)

use arena_shared::net::PlayerId;

use crate::relay::Relay;

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Empty,
    Status,
    Kick(PlayerId),
    Help,
    Quit,
    Usage(&'static str),
    Unknown(String),
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = tokens.first() else {
            return ConsoleCommand::Empty;
        };

        match *first {
            "status" => ConsoleCommand::Status,
            "kick" => match tokens.get(1).and_then(|t| t.parse::<u64>().ok()) {
                Some(id) => ConsoleCommand::Kick(PlayerId(id)),
                None => ConsoleCommand::Usage("Usage: kick <id>"),
            },
            "help" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => ConsoleCommand::Unknown(other.to_string()),
        }
    }

    /// Runs the command against the relay and returns the lines to print.
    pub fn execute(&self, relay: &mut Relay) -> Vec<String> {
        match self {
            ConsoleCommand::Empty => Vec::new(),
            ConsoleCommand::Status => {
                let mut out = vec![
                    format!("Sessions: {}", relay.len()),
                    format!("Next id: {}", relay.next_id()),
                ];
                for p in relay.players() {
                    out.push(format!("  {}: position={}", p.player_id, p.position));
                }
                out
            }
            ConsoleCommand::Kick(id) => {
                if relay.kick(*id) {
                    vec![format!("Kicked {id}")]
                } else {
                    vec![format!("No session with id {id}")]
                }
            }
            ConsoleCommand::Help => vec![
                "status      - Show sessions and their positions".to_string(),
                "kick <id>   - Disconnect a session".to_string(),
                "help        - List commands".to_string(),
                "quit        - Shutdown server".to_string(),
            ],
            ConsoleCommand::Quit => vec!["quit is only available on the server console".to_string()],
            ConsoleCommand::Usage(usage) => vec![usage.to_string()],
            ConsoleCommand::Unknown(name) => vec![format!("Unknown command: {name}")],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::math::Vec3;
    use tokio::sync::mpsc;

    #[test]
    fn parses_commands() {
        assert_eq!(ConsoleCommand::parse("  "), ConsoleCommand::Empty);
        assert_eq!(ConsoleCommand::parse("status"), ConsoleCommand::Status);
        assert_eq!(
            ConsoleCommand::parse("kick 3"),
            ConsoleCommand::Kick(PlayerId(3))
        );
        assert_eq!(
            ConsoleCommand::parse("kick three"),
            ConsoleCommand::Usage("Usage: kick <id>")
        );
        assert_eq!(ConsoleCommand::parse("exit"), ConsoleCommand::Quit);
        assert_eq!(
            ConsoleCommand::parse("dance now"),
            ConsoleCommand::Unknown("dance".into())
        );
    }

    #[test]
    fn status_lists_sessions() {
        let mut relay = Relay::new();
        let (tx, _rx) = mpsc::channel(8);
        let id = relay.connect(tx);
        relay.move_player(id, Vec3::new(1.0, 2.0, 3.0));

        let out = ConsoleCommand::Status.execute(&mut relay);
        assert_eq!(out[0], "Sessions: 1");
        assert_eq!(out[1], "Next id: 1");
        assert_eq!(out[2], "  0: position=(1.00, 2.00, 3.00)");
    }

    #[test]
    fn help_lists_every_command() {
        let mut relay = Relay::new();
        let out = ConsoleCommand::parse("help").execute(&mut relay);
        let names: Vec<&str> = out
            .iter()
            .filter_map(|line| line.split_whitespace().next())
            .collect();
        assert_eq!(names, ["status", "kick", "help", "quit"]);
    }

    #[test]
    fn kick_reports_unknown_ids() {
        let mut relay = Relay::new();
        let (tx, _rx) = mpsc::channel(8);
        let id = relay.connect(tx);

        assert_eq!(
            ConsoleCommand::Kick(PlayerId(5)).execute(&mut relay),
            vec!["No session with id 5".to_string()]
        );
        assert_eq!(
            ConsoleCommand::Kick(id).execute(&mut relay),
            vec!["Kicked 0".to_string()]
        );
        assert!(relay.is_empty());
    }
}
