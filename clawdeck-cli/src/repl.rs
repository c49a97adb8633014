//! Interactive REPL.

use crate::commands;
use crate::Commands;
use clap::Parser;
use clawdeck_client::Client;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

const HELP_TEXT: &str = r#"
Available commands:
  help                                Show this help
  status                              Show handshake details
  health                              Probe the HTTP health endpoint

  agents                              List agents
  agent-file get <agent> <file>       Print a workspace file
  agent-file set <agent> <file> <text|@path>
  trigger <agent> [message]           Wake an agent
  pause <agent> / resume <agent>      Disable or re-enable an agent

  sessions                            List sessions
  history <session> [--limit N]       Session message history

  cron list|run|enable|disable|remove [id]
  chat send <agent> <message>
  chat history <agent> [--limit N]
  chat abort <agent>

  logs [--limit N] [--agent ID] [--level L]
  skills                              List skills
  approvals list
  approvals resolve <id> approve|deny
  memory <agent> <query> [--limit N]

  config get
  config patch <json|@file> [--base-hash H]
  config apply <raw|@file> --base-hash H [--note N]

  quit, exit                          Exit the REPL

Quote arguments containing spaces: chat send main "hello there"
"#;

/// A single REPL line, parsed with the same grammar as the command line.
#[derive(Parser)]
#[command(name = "clawdeck", no_binary_name = true, disable_help_flag = true)]
struct Line {
    #[command(subcommand)]
    command: Commands,
}

pub async fn run(client: Client) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "clawdeck CLI".bold().cyan());
    println!("Connecting to {}...", client.gateway_url());

    let hello = client.connect().await?;
    println!("{} (protocol {})", "Connected!".green(), hello.protocol);

    let _status = client.on_status(|update| {
        if let Some(ref e) = update.error {
            println!("\n{} {} ({})", "Status:".dimmed(), update.status, e);
        } else {
            println!("\n{} {}", "Status:".dimmed(), update.status);
        }
    });

    // Create readline editor
    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    // Load history
    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".clawdeck_history"))
        .unwrap_or_else(|_| ".clawdeck_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", "clawdeck>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_repl_command(&client, line).await {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break, // Exit command
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    // Save history
    let _ = rl.save_history(&history_path);

    client.disconnect();
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

async fn execute_repl_command(
    client: &Client,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let words = split_words(line)?;
    let Some(first) = words.first() else {
        return Ok(Some(String::new()));
    };

    match first.to_lowercase().as_str() {
        "help" | "?" => return Ok(Some(HELP_TEXT.to_string())),
        "quit" | "exit" | "q" => return Ok(None),
        _ => {}
    }

    let command = match Line::try_parse_from(&words) {
        Ok(parsed) => parsed.command,
        Err(e) => return Ok(Some(e.render().to_string())),
    };
    if matches!(command, Commands::Repl | Commands::Watch { .. }) {
        return Ok(Some(format!(
            "'{}' is not available inside the REPL",
            first
        )));
    }

    Ok(Some(commands::execute(client, command).await?))
}

/// Splits a line on whitespace, keeping double- or single-quoted runs
/// together.
fn split_words(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_word = false;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return Err("unterminated quote".to_string());
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}
