//! Cached view of the gateway fleet.
//!
//! `FleetState` holds the latest result of every list call plus two bounded
//! buffers: a log tail (oldest first) and an activity feed (newest first).
//! Pushed events update it in place through [`FleetState::apply_event`].

use crate::config::FeedConfig;
use chrono::{DateTime, SecondsFormat, Utc};
use clawdeck_client::{ConnectionStatus, StatusUpdate};
use clawdeck_protocol::types::{
    Agent, ApprovalDecision, ApprovalStatus, CronJob, ExecApproval, GatewayConfig, GatewayHealth,
    LogEntry, Session, SessionStatus, Skill,
};
use clawdeck_protocol::EventFrame;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use uuid::Uuid;

/// Category of an activity feed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Agent,
    Cron,
    Approval,
    Chat,
    System,
    Tool,
    Error,
}

/// One entry in the activity feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl ActivityEntry {
    pub fn new(kind: ActivityKind, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            description: None,
            agent_id: None,
            timestamp: Utc::now(),
            meta: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Something an operator should see right away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// What the monitor should do after an event was applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventEffect {
    /// A full refresh is due.
    pub refresh: bool,
    pub notice: Option<Notice>,
}

/// Aggregate counts for a status line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_agents: usize,
    pub online_agents: usize,
    pub active_sessions: usize,
    pub total_cron_jobs: usize,
    pub active_cron_jobs: usize,
    pub pending_approvals: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApprovalResolved {
    approval_id: String,
    decision: String,
}

/// Cached fleet state.
#[derive(Debug, Clone)]
pub struct FleetState {
    status: ConnectionStatus,
    last_error: Option<String>,
    agents: Vec<Agent>,
    sessions: Vec<Session>,
    cron_jobs: Vec<CronJob>,
    config: Option<GatewayConfig>,
    logs: VecDeque<LogEntry>,
    skills: Vec<Skill>,
    approvals: Vec<ExecApproval>,
    activity: VecDeque<ActivityEntry>,
    health: Option<GatewayHealth>,
    log_capacity: usize,
    activity_capacity: usize,
}

impl Default for FleetState {
    fn default() -> Self {
        Self::new(&FeedConfig::default())
    }
}

impl FleetState {
    pub fn new(feed: &FeedConfig) -> Self {
        let log_capacity = feed.log_capacity.max(1);
        let activity_capacity = feed.activity_capacity.max(1);
        Self {
            status: ConnectionStatus::Disconnected,
            last_error: None,
            agents: Vec::new(),
            sessions: Vec::new(),
            cron_jobs: Vec::new(),
            config: None,
            logs: VecDeque::with_capacity(log_capacity),
            skills: Vec::new(),
            approvals: Vec::new(),
            activity: VecDeque::with_capacity(activity_capacity),
            health: None,
            log_capacity,
            activity_capacity,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agent(&self, agent_id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == agent_id)
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn cron_jobs(&self) -> &[CronJob] {
        &self.cron_jobs
    }

    pub fn config(&self) -> Option<&GatewayConfig> {
        self.config.as_ref()
    }

    /// Log tail, oldest first.
    pub fn logs(&self) -> impl Iterator<Item = &LogEntry> {
        self.logs.iter()
    }

    pub fn log_count(&self) -> usize {
        self.logs.len()
    }

    pub fn skills(&self) -> &[Skill] {
        &self.skills
    }

    pub fn approvals(&self) -> &[ExecApproval] {
        &self.approvals
    }

    /// Activity feed, newest first.
    pub fn activity(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.activity.iter()
    }

    pub fn activity_count(&self) -> usize {
        self.activity.len()
    }

    pub fn health(&self) -> Option<&GatewayHealth> {
        self.health.as_ref()
    }

    // =========================================================================
    // Updates
    // =========================================================================

    pub fn set_status(&mut self, update: &StatusUpdate) {
        self.status = update.status;
        self.last_error = update.error.clone();
    }

    pub fn set_agents(&mut self, agents: Vec<Agent>) {
        self.agents = agents;
    }

    pub fn set_sessions(&mut self, sessions: Vec<Session>) {
        self.sessions = sessions;
    }

    pub fn set_cron_jobs(&mut self, cron_jobs: Vec<CronJob>) {
        self.cron_jobs = cron_jobs;
    }

    pub fn set_config(&mut self, config: GatewayConfig) {
        self.config = Some(config);
    }

    /// Replaces the log tail, keeping only the newest `log_capacity` entries.
    pub fn set_logs(&mut self, logs: Vec<LogEntry>) {
        let skip = logs.len().saturating_sub(self.log_capacity);
        self.logs = logs.into_iter().skip(skip).collect();
    }

    pub fn push_log(&mut self, entry: LogEntry) {
        if self.logs.len() == self.log_capacity {
            self.logs.pop_front();
        }
        self.logs.push_back(entry);
    }

    pub fn set_skills(&mut self, skills: Vec<Skill>) {
        self.skills = skills;
    }

    pub fn set_approvals(&mut self, approvals: Vec<ExecApproval>) {
        self.approvals = approvals;
    }

    pub fn set_health(&mut self, health: GatewayHealth) {
        self.health = Some(health);
    }

    pub fn push_activity(&mut self, entry: ActivityEntry) {
        self.activity.push_front(entry);
        self.activity.truncate(self.activity_capacity);
    }

    /// Marks an approval resolved. Returns false if it is not cached.
    pub fn resolve_approval(&mut self, approval_id: &str, decision: ApprovalDecision) -> bool {
        self.set_approval_status(approval_id, decision.resulting_status())
    }

    fn set_approval_status(&mut self, approval_id: &str, status: ApprovalStatus) -> bool {
        match self.approvals.iter_mut().find(|a| a.id == approval_id) {
            Some(approval) => {
                approval.status = status;
                approval.resolved_at = Some(now_rfc3339());
                true
            }
            None => false,
        }
    }

    /// Drops every cached collection. The activity feed is kept.
    pub fn clear(&mut self) {
        self.status = ConnectionStatus::Disconnected;
        self.last_error = None;
        self.agents.clear();
        self.sessions.clear();
        self.cron_jobs.clear();
        self.config = None;
        self.logs.clear();
        self.skills.clear();
        self.approvals.clear();
        self.health = None;
    }

    pub fn stats(&self) -> DashboardStats {
        DashboardStats {
            total_agents: self.agents.len(),
            online_agents: self
                .agents
                .iter()
                .filter(|a| a.status.is_available())
                .count(),
            active_sessions: self
                .sessions
                .iter()
                .filter(|s| s.status == SessionStatus::Active)
                .count(),
            total_cron_jobs: self.cron_jobs.len(),
            active_cron_jobs: self.cron_jobs.iter().filter(|j| j.enabled).count(),
            pending_approvals: self
                .approvals
                .iter()
                .filter(|a| a.status == ApprovalStatus::Pending)
                .count(),
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Folds a pushed event into the cache.
    pub fn apply_event(&mut self, event: &EventFrame) -> EventEffect {
        let name = event.event.as_str();
        let mut effect = EventEffect {
            refresh: name.starts_with("agent.")
                || name.starts_with("session.")
                || name == "heartbeat",
            notice: None,
        };

        match name {
            "log" => match serde_json::from_value::<LogEntry>(event.payload.clone()) {
                Ok(entry) => self.push_log(entry),
                Err(e) => tracing::debug!("Ignoring malformed log event: {}", e),
            },
            "exec.approval.requested" => {
                match serde_json::from_value::<ExecApproval>(event.payload.clone()) {
                    Ok(approval) => {
                        let summary = format!("{}: {}", approval.agent_id, approval.command);
                        tracing::warn!("Exec approval requested by {}", summary);
                        self.push_activity(
                            ActivityEntry::new(ActivityKind::Approval, "Exec approval requested")
                                .with_description(format!(
                                    "{} wants to run: {}",
                                    approval.agent_id, approval.command
                                ))
                                .with_agent(approval.agent_id.clone()),
                        );
                        effect.notice = Some(Notice {
                            level: NoticeLevel::Warning,
                            title: "Exec Approval Requested".to_string(),
                            description: Some(summary),
                        });
                        self.approvals.push(approval);
                    }
                    Err(e) => tracing::debug!("Ignoring malformed approval request: {}", e),
                }
            }
            "exec.approval.resolved" => {
                match serde_json::from_value::<ApprovalResolved>(event.payload.clone()) {
                    Ok(resolved) => {
                        let status = ApprovalStatus::from_decision(&resolved.decision);
                        if !self.set_approval_status(&resolved.approval_id, status) {
                            tracing::debug!("Resolved unknown approval {}", resolved.approval_id);
                        }
                    }
                    Err(e) => tracing::debug!("Ignoring malformed approval resolution: {}", e),
                }
            }
            "heartbeat" => {
                self.push_activity(
                    ActivityEntry::new(ActivityKind::System, "Heartbeat")
                        .with_description("Agent heartbeat received")
                        .with_meta(event.payload.clone()),
                );
            }
            _ => {}
        }

        if let Some(rest) = name.strip_prefix("agent.") {
            let mut entry = ActivityEntry::new(ActivityKind::Agent, format!("Agent {}", rest))
                .with_description(event.payload.to_string())
                .with_meta(event.payload.clone());
            if let Some(agent_id) = event.payload.get("agentId").and_then(Value::as_str) {
                entry = entry.with_agent(agent_id);
            }
            self.push_activity(entry);
        } else if let Some(rest) = name.strip_prefix("cron.") {
            self.push_activity(
                ActivityEntry::new(ActivityKind::Cron, format!("Cron {}", rest))
                    .with_description(event.payload.to_string()),
            );
        }

        effect
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
