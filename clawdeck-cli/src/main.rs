//! clawdeck-cli - Command-line interface for the agent Gateway
//!
//! Provides both a REPL and one-shot command execution.

mod commands;
mod repl;

use clap::{Parser, Subcommand};
use clawdeck_client::{Client, ClientConfig, ReconnectPolicy};
use clawdeck_protocol::WILDCARD_EVENT;
use colored::Colorize;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

const DEFAULT_URL: &str = "ws://127.0.0.1:18789";

#[derive(Parser)]
#[command(name = "clawdeck-cli")]
#[command(about = "Command-line interface for the agent Gateway")]
#[command(version)]
struct Cli {
    /// Gateway WebSocket URL
    #[arg(short, long, env = "CLAWDECK_GATEWAY_URL", default_value = DEFAULT_URL)]
    url: String,

    /// Authentication token
    #[arg(short = 't', long, env = "CLAWDECK_GATEWAY_TOKEN")]
    token: Option<String>,

    /// Authentication password
    #[arg(long, env = "CLAWDECK_GATEWAY_PASSWORD")]
    password: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Start interactive REPL
    Repl,

    /// Connect and show handshake details
    Status,

    /// Probe the gateway's HTTP health endpoint
    Health,

    /// List agents
    Agents,

    /// Read or write an agent workspace file
    AgentFile {
        #[command(subcommand)]
        action: AgentFileAction,
    },

    /// Wake an agent with a chat message
    Trigger {
        /// Agent ID
        agent: String,

        /// Message (defaults to a wake-up message)
        #[arg(trailing_var_arg = true)]
        message: Vec<String>,
    },

    /// Disable an agent
    Pause {
        /// Agent ID
        agent: String,
    },

    /// Re-enable an agent
    Resume {
        /// Agent ID
        agent: String,
    },

    /// List sessions
    Sessions,

    /// Show a session's message history
    History {
        /// Session ID
        session: String,

        /// Maximum messages to return
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Manage cron jobs
    Cron {
        #[command(subcommand)]
        action: CronAction,
    },

    /// Chat with an agent
    Chat {
        #[command(subcommand)]
        action: ChatAction,
    },

    /// Show recent gateway logs
    Logs {
        /// Maximum entries to return
        #[arg(short, long, default_value = "100")]
        limit: u32,

        /// Only entries from this agent
        #[arg(short, long)]
        agent: Option<String>,

        /// Only entries at this level
        #[arg(long)]
        level: Option<String>,
    },

    /// List installed skills
    Skills,

    /// Manage exec approvals
    Approvals {
        #[command(subcommand)]
        action: ApprovalAction,
    },

    /// Search an agent's memory
    Memory {
        /// Agent ID
        agent: String,

        /// Search query
        query: String,

        /// Maximum results to return
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Read or change the gateway configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Stream events as JSON lines until Ctrl+C
    Watch {
        /// Only this event (default: all)
        #[arg(short, long)]
        event: Option<String>,
    },
}

#[derive(Subcommand)]
pub(crate) enum AgentFileAction {
    /// Print a workspace file
    Get {
        /// Agent ID
        agent: String,

        /// File name (AGENTS.md, SOUL.md, IDENTITY.md, USER.md, TOOLS.md, HEARTBEAT.md, MEMORY.md)
        file: String,
    },

    /// Replace a workspace file
    Set {
        /// Agent ID
        agent: String,

        /// File name
        file: String,

        /// New content (or @path to read from file)
        content: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum CronAction {
    /// List cron jobs
    List,
    /// Run a job now
    Run { id: String },
    /// Enable a job
    Enable { id: String },
    /// Disable a job
    Disable { id: String },
    /// Remove a job
    Remove { id: String },
}

#[derive(Subcommand)]
pub(crate) enum ChatAction {
    /// Send a message to an agent
    Send {
        /// Agent ID
        agent: String,

        /// Message text
        #[arg(required = true, trailing_var_arg = true)]
        message: Vec<String>,
    },

    /// Show an agent's chat history
    History {
        /// Agent ID
        agent: String,

        /// Maximum messages to return
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Abort an agent's running reply
    Abort {
        /// Agent ID
        agent: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum ApprovalAction {
    /// List exec approvals
    List,

    /// Approve or deny a request
    Resolve {
        /// Approval ID
        id: String,

        /// approve or deny
        decision: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Print the configuration
    Get,

    /// Merge a JSON patch into the configuration
    Patch {
        /// Patch JSON (or @file.json to read from file)
        patch: String,

        /// Hash of the configuration the patch was made against
        #[arg(long)]
        base_hash: Option<String>,
    },

    /// Replace the configuration
    Apply {
        /// Raw configuration (or @path to read from file)
        raw: String,

        /// Hash of the configuration being replaced
        #[arg(long)]
        base_hash: String,

        /// Change note
        #[arg(long)]
        note: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config =
        ClientConfig::new(&cli.url).with_request_timeout(Duration::from_secs(cli.timeout));
    if let Some(ref token) = cli.token {
        config = config.with_token(token);
    }
    if let Some(ref password) = cli.password {
        config = config.with_password(password);
    }

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(Client::new(config)).await?;
        }
        Some(Commands::Watch { event }) => {
            watch(Client::new(config), event).await?;
        }
        Some(cmd) => {
            // One-shot commands fail fast instead of retrying.
            let client = Client::new(config.with_reconnect(ReconnectPolicy::disabled()));

            if !matches!(cmd, Commands::Health) {
                client.connect().await.map_err(|e| {
                    eprintln!("{}: {}", "Connection failed".red(), e);
                    e
                })?;
            }

            tracing::debug!("Running one-shot command against {}", cli.url);
            let result = commands::execute(&client, cmd).await;
            client.disconnect();

            match result {
                Ok(output) => {
                    println!("{}", output);
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// Streams events until Ctrl+C. Reconnects with backoff if the socket drops.
async fn watch(client: Client, event: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = event.filter(|e| e != WILDCARD_EVENT);

    // Subscribe before connecting so nothing is missed.
    let mut events = client.subscribe_events();
    let _status = client.on_status(|update| match &update.error {
        Some(e) => eprintln!("{} {} ({})", "Status:".dimmed(), update.status, e),
        None => eprintln!("{} {}", "Status:".dimmed(), update.status),
    });

    client.connect().await.map_err(|e| {
        eprintln!("{}: {}", "Connection failed".red(), e);
        e
    })?;

    eprintln!(
        "{} {} on {}",
        "Watching".green(),
        filter.as_deref().unwrap_or("all events").cyan(),
        client.gateway_url()
    );
    eprintln!("{}", "Press Ctrl+C to stop...".dimmed());

    loop {
        tokio::select! {
            received = events.recv() => {
                match received {
                    Ok(frame) => {
                        if filter.as_deref().is_some_and(|name| name != frame.event) {
                            continue;
                        }
                        println!("{}", serde_json::to_string(&frame)?);
                    }
                    Err(RecvError::Lagged(n)) => {
                        eprintln!("{}: lagged {} events", "Warning".yellow(), n);
                    }
                    Err(RecvError::Closed) => {
                        eprintln!("{}", "Connection closed".red());
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\n{}", "Stopping watch...".dimmed());
                break;
            }
        }
    }

    client.disconnect();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_trailing_message() {
        let cli = Cli::try_parse_from([
            "clawdeck-cli",
            "chat",
            "send",
            "main",
            "hello",
            "there",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Chat {
                action: ChatAction::Send { agent, message },
            }) => {
                assert_eq!(agent, "main");
                assert_eq!(message.join(" "), "hello there");
            }
            _ => panic!("expected chat send"),
        }
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["clawdeck-cli", "logs"]).unwrap();
        assert_eq!(cli.timeout, 30);
        assert!(matches!(cli.command, Some(Commands::Logs { limit: 100, .. })));
    }
}
