//! # clawdeck-monitor
//!
//! Fleet monitor for the agent Gateway.
//!
//! This crate provides:
//! - YAML + environment configuration
//! - A cached view of agents, sessions, cron jobs, approvals, logs and activity
//! - Scheduled and event-driven refresh over one gateway connection
//! - Prometheus metrics with an HTTP endpoint

pub mod config;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod state;

pub use config::{
    Config, ConfigError, FeedConfig, GatewayConfig, MetricsConfig, PollingConfig, ReconnectConfig,
    SessionConfig,
};
pub use error::MonitorError;
pub use metrics::{run_metrics_server, Metrics};
pub use monitor::Monitor;
pub use state::{
    ActivityEntry, ActivityKind, DashboardStats, EventEffect, FleetState, Notice, NoticeLevel,
};
