//! Command execution.

use crate::{AgentFileAction, ApprovalAction, ChatAction, Commands, ConfigAction, CronAction};
use clawdeck_client::Client;
use clawdeck_protocol::method::LogsTailParams;
use clawdeck_protocol::types::{
    Agent, AgentFileName, ApprovalDecision, ChatMessage, CronJob, ExecApproval, LogEntry,
    MemoryEntry, Session, Skill,
};
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;

/// Executes a command and returns the formatted output.
pub async fn execute(client: &Client, cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Repl | Commands::Watch { .. } => {
            Err("command is only available from the shell".into())
        }

        Commands::Status => {
            let conn = client.connection();
            let mut output = format!(
                "{} {}\n  Status: {}",
                "Gateway".bold(),
                client.gateway_url().cyan(),
                client.status().to_string().green()
            );
            if let Some(hello) = conn.hello() {
                output.push_str(&format!("\n  Protocol: {}", hello.protocol));
                if let Some(tick) = hello.tick_interval_ms {
                    output.push_str(&format!("\n  Tick interval: {}ms", tick));
                }
            }
            let token = if conn.device_token().is_some() {
                "issued".green()
            } else {
                "none".dimmed()
            };
            output.push_str(&format!("\n  Device token: {}", token));
            Ok(output)
        }

        Commands::Health => {
            let health = client.health().await;
            Ok(format_json(&serde_json::to_value(health)?))
        }

        Commands::Agents => Ok(format_agents(&client.list_agents().await?)),

        Commands::AgentFile { action } => match action {
            AgentFileAction::Get { agent, file } => {
                let name: AgentFileName = file.parse()?;
                let file = client.get_agent_file(&agent, name).await?;
                Ok(format!(
                    "{}\n{}",
                    format!("{} / {}", agent.cyan(), file.name).bold(),
                    file.content
                ))
            }
            AgentFileAction::Set {
                agent,
                file,
                content,
            } => {
                let name: AgentFileName = file.parse()?;
                let content = read_text_arg(&content)?;
                client.set_agent_file(&agent, name, &content).await?;
                Ok(format!(
                    "{} {} for {} ({} bytes)",
                    "Saved".green(),
                    name,
                    agent.cyan(),
                    content.len()
                ))
            }
        },

        Commands::Trigger { agent, message } => {
            let message = message.join(" ");
            let message = Some(message.as_str()).filter(|m| !m.is_empty());
            client.trigger_agent(&agent, message).await?;
            Ok(format!("{} {}", "Triggered".green(), agent.cyan()))
        }

        Commands::Pause { agent } => {
            client.pause_agent(&agent).await?;
            Ok(format!("{} {}", "Paused".yellow(), agent.cyan()))
        }

        Commands::Resume { agent } => {
            client.resume_agent(&agent).await?;
            Ok(format!("{} {}", "Resumed".green(), agent.cyan()))
        }

        Commands::Sessions => Ok(format_sessions(&client.list_sessions().await?)),

        Commands::History { session, limit } => {
            Ok(format_messages(&client.session_history(&session, limit).await?))
        }

        Commands::Cron { action } => match action {
            CronAction::List => Ok(format_cron_jobs(&client.list_cron_jobs().await?)),
            CronAction::Run { id } => {
                client.run_cron_job(&id).await?;
                Ok(format!("{} {}", "Started".green(), id.cyan()))
            }
            CronAction::Enable { id } => {
                client.enable_cron_job(&id).await?;
                Ok(format!("{} {}", "Enabled".green(), id.cyan()))
            }
            CronAction::Disable { id } => {
                client.disable_cron_job(&id).await?;
                Ok(format!("{} {}", "Disabled".yellow(), id.cyan()))
            }
            CronAction::Remove { id } => {
                client.remove_cron_job(&id).await?;
                Ok(format!("{} {}", "Removed".green(), id.cyan()))
            }
        },

        Commands::Chat { action } => match action {
            ChatAction::Send { agent, message } => {
                let reply = client.send_chat(&agent, &message.join(" ")).await?;
                Ok(format_json(&reply))
            }
            ChatAction::History { agent, limit } => {
                Ok(format_messages(&client.chat_history(&agent, limit).await?))
            }
            ChatAction::Abort { agent } => {
                client.abort_chat(&agent).await?;
                Ok(format!("{} chat for {}", "Aborted".yellow(), agent.cyan()))
            }
        },

        Commands::Logs {
            limit,
            agent,
            level,
        } => {
            let level = level
                .map(|l| serde_json::from_value(Value::String(l.to_lowercase())))
                .transpose()?;
            let filter = LogsTailParams {
                limit: Some(limit),
                agent_id: agent,
                level,
            };
            Ok(format_logs(&client.tail_logs(&filter).await?))
        }

        Commands::Skills => Ok(format_skills(&client.list_skills().await?)),

        Commands::Approvals { action } => match action {
            ApprovalAction::List => Ok(format_approvals(&client.list_approvals().await?)),
            ApprovalAction::Resolve { id, decision } => {
                let decision: ApprovalDecision = decision.parse()?;
                client.resolve_approval(&id, decision).await?;
                Ok(format!(
                    "{} {}",
                    label(&decision.resulting_status()).green(),
                    id.cyan()
                ))
            }
        },

        Commands::Memory {
            agent,
            query,
            limit,
        } => Ok(format_memory(
            &client.search_memory(&agent, &query, limit).await?,
        )),

        Commands::Config { action } => match action {
            ConfigAction::Get => {
                let config = client.get_config().await?;
                Ok(format_json(&serde_json::to_value(config)?))
            }
            ConfigAction::Patch { patch, base_hash } => {
                let patch = parse_json_arg(&patch)?;
                client.patch_config(patch, base_hash.as_deref()).await?;
                Ok("Config updated".green().to_string())
            }
            ConfigAction::Apply {
                raw,
                base_hash,
                note,
            } => {
                let raw = read_text_arg(&raw)?;
                client
                    .apply_config(&raw, &base_hash, note.as_deref())
                    .await?;
                Ok("Config applied".green().to_string())
            }
        },
    }
}

// =============================================================================
// Formatting
// =============================================================================

/// Renders a serde enum as its wire name.
pub(crate) fn label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(Value::String(s)) => s,
        _ => "?".to_string(),
    }
}

pub(crate) fn format_agents(agents: &[Agent]) -> String {
    if agents.is_empty() {
        return "No agents".yellow().to_string();
    }
    let mut output = String::new();
    for agent in agents {
        let status = label(&agent.status);
        let status = if agent.status.is_available() {
            status.green()
        } else {
            status.dimmed()
        };
        output.push_str(&format!(
            "  {} {} ({}) [{}]",
            agent.emoji.as_deref().unwrap_or("-"),
            agent.name.cyan(),
            agent.id,
            status
        ));
        if let Some(ref model) = agent.model {
            output.push_str(&format!(" {}", model.dimmed()));
        }
        if !agent.enabled {
            output.push_str(&format!(" {}", "paused".yellow()));
        }
        output.push('\n');
    }
    output
}

pub(crate) fn format_sessions(sessions: &[Session]) -> String {
    if sessions.is_empty() {
        return "No sessions".yellow().to_string();
    }
    let mut output = String::new();
    for session in sessions {
        output.push_str(&format!(
            "  {} agent={} [{}] messages={}\n",
            session.id.cyan(),
            session.agent_id,
            label(&session.status),
            session.message_count
        ));
    }
    output
}

pub(crate) fn format_messages(messages: &[ChatMessage]) -> String {
    if messages.is_empty() {
        return "No messages".yellow().to_string();
    }
    let mut output = String::new();
    for message in messages {
        output.push_str(&format!(
            "{} {}\n{}\n\n",
            label(&message.role).bold(),
            message.timestamp.dimmed(),
            message.content.to_text()
        ));
    }
    output
}

pub(crate) fn format_cron_jobs(jobs: &[CronJob]) -> String {
    if jobs.is_empty() {
        return "No cron jobs".yellow().to_string();
    }
    let mut output = String::new();
    for job in jobs {
        let state = if job.enabled {
            "enabled".green()
        } else {
            "disabled".dimmed()
        };
        output.push_str(&format!(
            "  {} {} [{}]",
            job.id.cyan(),
            job.expression,
            state
        ));
        if let Some(ref next) = job.next_run {
            output.push_str(&format!(" next={}", next));
        }
        output.push('\n');
    }
    output
}

pub(crate) fn format_logs(logs: &[LogEntry]) -> String {
    if logs.is_empty() {
        return "No log entries".yellow().to_string();
    }
    let mut output = String::new();
    for entry in logs {
        let level = label(&entry.level);
        let level = match level.as_str() {
            "error" => level.red(),
            "warn" => level.yellow(),
            "debug" => level.dimmed(),
            _ => level.normal(),
        };
        output.push_str(&format!(
            "{} {:>5} {}\n",
            entry.timestamp.dimmed(),
            level,
            entry.message
        ));
    }
    output
}

pub(crate) fn format_skills(skills: &[Skill]) -> String {
    if skills.is_empty() {
        return "No skills".yellow().to_string();
    }
    let mut output = String::new();
    for skill in skills {
        output.push_str(&format!(
            "  {} [{}] {}\n",
            skill.name.cyan(),
            label(&skill.source),
            skill.description.as_deref().unwrap_or("")
        ));
    }
    output
}

pub(crate) fn format_approvals(approvals: &[ExecApproval]) -> String {
    if approvals.is_empty() {
        return "No approvals".yellow().to_string();
    }
    let mut output = String::new();
    for approval in approvals {
        let command = match approval.args {
            Some(ref args) if !args.is_empty() => {
                format!("{} {}", approval.command, args.join(" "))
            }
            _ => approval.command.clone(),
        };
        output.push_str(&format!(
            "  {} {} [{}] {}\n",
            approval.id.cyan(),
            approval.agent_id,
            label(&approval.status),
            command
        ));
    }
    output
}

pub(crate) fn format_memory(entries: &[MemoryEntry]) -> String {
    if entries.is_empty() {
        return "No matches".yellow().to_string();
    }
    let mut output = String::new();
    for entry in entries {
        output.push_str(&format!(
            "  {} [{}]\n    {}\n",
            entry.id.cyan(),
            label(&entry.kind),
            entry.content
        ));
    }
    output
}

/// Reads `@path` as a file, otherwise returns the argument itself.
pub(crate) fn read_text_arg(arg: &str) -> Result<String, Box<dyn std::error::Error>> {
    match arg.strip_prefix('@') {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => Ok(arg.to_string()),
    }
}

/// Parses a JSON argument (either inline JSON or @file.json).
pub(crate) fn parse_json_arg(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    Ok(serde_json::from_str(&read_text_arg(arg)?)?)
}

/// Formats JSON for display.
pub(crate) fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawdeck_protocol::types::{AgentStatus, ApprovalStatus};
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_label() {
        assert_eq!(label(&AgentStatus::Busy), "busy");
        assert_eq!(label(&ApprovalStatus::Denied), "denied");
        assert_eq!(label(&json!(3)), "?");
    }

    #[test]
    fn test_parse_json_arg() {
        assert_eq!(parse_json_arg(r#"{"a":1}"#).unwrap(), json!({"a": 1}));
        assert!(parse_json_arg("{nope").is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"agents": {{}}}}"#).unwrap();
        let arg = format!("@{}", file.path().display());
        assert_eq!(parse_json_arg(&arg).unwrap(), json!({"agents": {}}));
    }

    #[test]
    fn test_format_agents() {
        colored::control::set_override(false);
        let agents: Vec<Agent> = serde_json::from_value(json!([
            {"id": "main", "name": "Main", "emoji": "*", "status": "online", "model": "m1"},
            {"id": "side", "name": "Side", "status": "offline", "enabled": false}
        ]))
        .unwrap();
        let output = format_agents(&agents);
        assert!(output.contains("* Main (main) [online] m1"));
        assert!(output.contains("- Side (side) [offline] paused"));
        assert_eq!(format_agents(&[]), "No agents");
    }

    #[test]
    fn test_format_approvals_joins_args() {
        colored::control::set_override(false);
        let approvals: Vec<ExecApproval> = serde_json::from_value(json!([
            {"id": "ap1", "agentId": "main", "command": "git", "args": ["status", "-s"]}
        ]))
        .unwrap();
        assert!(format_approvals(&approvals).contains("ap1 main [pending] git status -s"));
    }
}
