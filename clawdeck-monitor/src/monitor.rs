//! Fleet monitor.
//!
//! A [`Monitor`] owns a gateway [`Client`] and keeps a [`FleetState`] cache
//! current: a full refresh on start, every `refresh_interval`, and whenever a
//! pushed event asks for one. Pushed events are folded into the cache as they
//! arrive.

use crate::config::Config;
use crate::error::MonitorError;
use crate::metrics::Metrics;
use crate::state::{DashboardStats, FleetState, Notice, NoticeLevel};
use clawdeck_client::transport::Connector;
use clawdeck_client::{Client, ClientError, Subscription};
use clawdeck_protocol::method::LogsTailParams;
use clawdeck_protocol::types::ApprovalDecision;
use clawdeck_protocol::{EventFrame, HelloOk, WILDCARD_EVENT};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};

const NOTICE_CAPACITY: usize = 64;

/// Handlers and tasks owned by a started monitor.
struct Running {
    subscriptions: Vec<Subscription>,
    tasks: Vec<JoinHandle<()>>,
}

struct Inner {
    client: Client,
    config: Config,
    state: RwLock<FleetState>,
    refresh_signal: Arc<Notify>,
    notices: broadcast::Sender<Notice>,
    metrics: Mutex<Option<Arc<Metrics>>>,
    running: Mutex<Option<Running>>,
}

/// Keeps a live cache of the gateway's fleet.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<Inner>,
}

impl Monitor {
    /// Creates a monitor over a WebSocket client.
    pub fn new(config: Config) -> Result<Self, MonitorError> {
        config.validate()?;
        let client = Client::new(config.client_config());
        Ok(Self::with_client(config, client))
    }

    /// Creates a monitor over a custom transport.
    pub fn with_connector(
        config: Config,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, MonitorError> {
        config.validate()?;
        let client = Client::with_connector(config.client_config(), connector);
        Ok(Self::with_client(config, client))
    }

    fn with_client(config: Config, client: Client) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                client,
                state: RwLock::new(FleetState::new(&config.feed)),
                config,
                refresh_signal: Arc::new(Notify::new()),
                notices,
                metrics: Mutex::new(None),
                running: Mutex::new(None),
            }),
        }
    }

    /// Mirrors client counters and fleet counts into `metrics` after every
    /// refresh.
    pub fn set_metrics(&self, metrics: Arc<Metrics>) {
        *self.inner.metrics.lock() = Some(metrics);
    }

    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.lock().is_some()
    }

    /// Runs `f` against the cached state.
    pub fn with_state<R>(&self, f: impl FnOnce(&FleetState) -> R) -> R {
        f(&self.inner.state.read())
    }

    /// Returns a copy of the cached state.
    pub fn snapshot(&self) -> FleetState {
        self.inner.state.read().clone()
    }

    pub fn stats(&self) -> DashboardStats {
        self.inner.state.read().stats()
    }

    /// Receives operator notices raised by events and actions.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    /// Connects, loads the initial state and starts polling.
    ///
    /// If the connect fails nothing keeps running and the error is returned.
    pub async fn start(&self) -> Result<HelloOk, MonitorError> {
        {
            let mut running = self.inner.running.lock();
            if running.is_some() {
                return Err(MonitorError::AlreadyRunning);
            }
            *running = Some(Running {
                subscriptions: self.register_handlers(),
                tasks: Vec::new(),
            });
        }

        let hello = match self.inner.client.connect().await {
            Ok(hello) => hello,
            Err(e) => {
                tracing::warn!("Gateway connect failed: {}", e);
                if let Some(running) = self.inner.running.lock().take() {
                    running.shutdown();
                }
                return Err(e.into());
            }
        };
        tracing::info!(
            "Connected to {} (protocol {})",
            self.inner.client.gateway_url(),
            hello.protocol
        );

        self.inner.refresh().await;
        self.inner.refresh_health().await;

        let weak = Arc::downgrade(&self.inner);
        let polling = &self.inner.config.polling;
        let tasks = vec![
            tokio::spawn(poll_loop(
                weak.clone(),
                polling.refresh_interval(),
                polling.health_interval(),
            )),
            tokio::spawn(refresh_worker(weak, self.inner.refresh_signal.clone())),
        ];

        match self.inner.running.lock().as_mut() {
            Some(running) => running.tasks.extend(tasks),
            // Stopped while the initial refresh was in flight.
            None => tasks.iter().for_each(JoinHandle::abort),
        }

        Ok(hello)
    }

    fn register_handlers(&self) -> Vec<Subscription> {
        let weak = Arc::downgrade(&self.inner);
        let events = self.inner.client.on(WILDCARD_EVENT, move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_event(event);
            }
        });

        let weak = Arc::downgrade(&self.inner);
        let status = self.inner.client.on_status(move |update| {
            if let Some(inner) = weak.upgrade() {
                inner.state.write().set_status(update);
            }
        });

        vec![events, status]
    }

    /// Reloads every cached collection. Does nothing unless connected.
    pub async fn refresh(&self) {
        self.inner.refresh().await;
    }

    /// Probes gateway health and caches the result.
    pub async fn refresh_health(&self) {
        self.inner.refresh_health().await;
    }

    /// Resolves an approval and marks it resolved in the cache without
    /// waiting for the next refresh.
    pub async fn resolve_approval(
        &self,
        approval_id: &str,
        decision: ApprovalDecision,
    ) -> Result<(), MonitorError> {
        self.inner
            .client
            .resolve_approval(approval_id, decision)
            .await?;

        self.inner
            .state
            .write()
            .resolve_approval(approval_id, decision);

        let (level, outcome) = match decision {
            ApprovalDecision::Approve => (NoticeLevel::Success, "approved"),
            ApprovalDecision::Deny => (NoticeLevel::Warning, "denied"),
        };
        let _ = self.inner.notices.send(Notice {
            level,
            title: format!("Approval {}", outcome),
            description: Some(approval_id.to_string()),
        });
        Ok(())
    }

    /// Stops polling, disconnects and clears the cache.
    pub fn stop(&self) {
        if let Some(running) = self.inner.running.lock().take() {
            running.shutdown();
        }
        self.inner.client.disconnect();
        self.inner.state.write().clear();
        tracing::info!("Monitor stopped");
    }
}

impl Running {
    fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        for subscription in self.subscriptions {
            subscription.unsubscribe();
        }
    }
}

impl Inner {
    fn handle_event(&self, event: &EventFrame) {
        let effect = self.state.write().apply_event(event);

        if let Some(metrics) = self.metrics.lock().as_ref() {
            metrics.events_total.with_label_values(&[&event.event]).inc();
        }
        if effect.refresh {
            self.refresh_signal.notify_one();
        }
        if let Some(notice) = effect.notice {
            let _ = self.notices.send(notice);
        }
    }

    async fn refresh(&self) {
        if !self.client.is_connected() {
            return;
        }
        let started = Instant::now();
        let client = &self.client;

        let (agents, sessions, cron_jobs, config) = tokio::join!(
            client.list_agents(),
            client.list_sessions(),
            client.list_cron_jobs(),
            client.get_config(),
        );
        {
            let mut state = self.state.write();
            apply(agents, "agents.list", |v| state.set_agents(v));
            apply(sessions, "sessions.list", |v| state.set_sessions(v));
            apply(cron_jobs, "cron.list", |v| state.set_cron_jobs(v));
            apply(config, "config.get", |v| state.set_config(v));
        }

        let skills = client.list_skills().await;
        apply(skills, "skills.list", |v| self.state.write().set_skills(v));

        let filter = LogsTailParams::limit(self.config.polling.log_tail_limit);
        let logs = client.tail_logs(&filter).await;
        apply(logs, "logs.tail", |v| self.state.write().set_logs(v));

        let approvals = client.list_approvals().await;
        apply(approvals, "exec.approvals.list", |v| {
            self.state.write().set_approvals(v)
        });

        if let Some(metrics) = self.metrics.lock().as_ref() {
            metrics
                .refresh_duration
                .observe(started.elapsed().as_secs_f64());
        }
        self.record_metrics();
    }

    async fn refresh_health(&self) {
        let health = self.client.health().await;
        if let Some(metrics) = self.metrics.lock().as_ref() {
            metrics.gateway_up.set(i64::from(health.ok));
        }
        self.state.write().set_health(health);
    }

    fn record_metrics(&self) {
        let Some(metrics) = self.metrics.lock().clone() else {
            return;
        };
        let connection = self.client.connection();
        metrics.record_client(
            &connection.stats(),
            connection.pending_count(),
            connection.status(),
        );
        metrics.record_fleet(&self.state.read().stats());
    }
}

fn apply<T>(result: Result<T, ClientError>, method: &str, store: impl FnOnce(T)) {
    match result {
        Ok(value) => store(value),
        Err(e) => tracing::debug!("Refresh: {} failed: {}", method, e),
    }
}

async fn poll_loop(weak: Weak<Inner>, refresh_every: Duration, health_every: Duration) {
    let now = tokio::time::Instant::now();
    let mut refresh = interval_at(now + refresh_every, refresh_every);
    let mut health = interval_at(now + health_every, health_every);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
    health.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = refresh.tick() => {
                let Some(inner) = weak.upgrade() else { break };
                inner.refresh().await;
            }
            _ = health.tick() => {
                let Some(inner) = weak.upgrade() else { break };
                inner.refresh_health().await;
                inner.record_metrics();
            }
        }
    }
}

/// Runs one refresh per wakeup. Wakeups raised while a refresh is running
/// collapse into one.
async fn refresh_worker(weak: Weak<Inner>, signal: Arc<Notify>) {
    loop {
        signal.notified().await;
        let Some(inner) = weak.upgrade() else { break };
        inner.refresh().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ActivityEntry, ActivityKind};
    use clawdeck_client::transport::memory::{MemoryConnector, MemoryServer};
    use clawdeck_client::ConnectionStatus;
    use clawdeck_protocol::types::ApprovalStatus;
    use clawdeck_protocol::{ErrorShape, RequestFrame, ResponseFrame};
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    struct FakeGateway {
        calls: Arc<Mutex<Vec<RequestFrame>>>,
        events: mpsc::UnboundedSender<EventFrame>,
    }

    impl FakeGateway {
        fn count(&self, method: &str) -> usize {
            self.calls.lock().iter().filter(|r| r.method == method).count()
        }

        fn params(&self, method: &str) -> Option<Value> {
            self.calls
                .lock()
                .iter()
                .rev()
                .find(|r| r.method == method)
                .and_then(|r| r.params.clone())
        }

        fn push(&self, event: &str, payload: Value) {
            self.events.send(EventFrame::new(event, payload)).unwrap();
        }
    }

    fn pending_approval() -> Value {
        json!({
            "id": "ap1",
            "agentId": "main",
            "command": "ls",
            "host": "gateway",
            "status": "pending",
            "requestedAt": "2026-01-01T00:00:00Z"
        })
    }

    fn reply_for(req: &RequestFrame) -> ResponseFrame {
        let payload = match req.method.as_str() {
            "connect" => json!({"protocol": 3}),
            "agents.list" => json!([{"id": "main", "name": "Main", "status": "online"}]),
            "sessions.list" => json!([{"id": "s1", "agentId": "main", "status": "active"}]),
            "cron.list" => json!([{"id": "c1", "expression": "* * * * *", "enabled": true}]),
            "config.get" => json!({"agents": {"main": {"enabled": true}}}),
            "logs.tail" => json!([{"level": "info", "message": "hello"}]),
            "exec.approvals.list" => json!([pending_approval()]),
            "exec.approval.resolve" => json!({}),
            other => {
                return ResponseFrame::error(
                    req.id.clone(),
                    ErrorShape::new("UNKNOWN_METHOD", format!("unknown method {}", other)),
                )
            }
        };
        ResponseFrame::ok(req.id.clone(), payload)
    }

    fn spawn_gateway(mut server: MemoryServer) -> FakeGateway {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (events, mut events_rx) = mpsc::unbounded_channel::<EventFrame>();
        let recorded = calls.clone();

        tokio::spawn(async move {
            while let Some(mut peer) = server.accept().await {
                loop {
                    tokio::select! {
                        req = peer.recv_request() => {
                            let Some(req) = req else { break };
                            let reply = reply_for(&req);
                            recorded.lock().push(req);
                            peer.send_frame(reply);
                        }
                        Some(event) = events_rx.recv() => {
                            peer.send_frame(event);
                        }
                    }
                }
            }
        });

        FakeGateway { calls, events }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.gateway.url = "ws://127.0.0.1:9".to_string();
        config.gateway.token = Some("tok".to_string());
        config.polling.health_timeout_secs = 1;
        config
    }

    fn monitor_with(config: Config) -> (Monitor, FakeGateway) {
        let (connector, server) = MemoryConnector::new();
        let monitor = Monitor::with_connector(config, Arc::new(connector)).unwrap();
        (monitor, spawn_gateway(server))
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_start_loads_state() {
        let (monitor, gateway) = monitor_with(test_config());
        let hello = monitor.start().await.unwrap();
        assert_eq!(hello.protocol, 3);
        assert!(monitor.is_running());

        let state = monitor.snapshot();
        assert_eq!(state.status(), ConnectionStatus::Connected);
        assert_eq!(state.agents().len(), 1);
        assert_eq!(state.sessions().len(), 1);
        assert_eq!(state.cron_jobs().len(), 1);
        assert!(state.config().and_then(|c| c.agent("main")).is_some());
        // skills.list fails on this gateway and is skipped.
        assert!(state.skills().is_empty());
        assert_eq!(state.log_count(), 1);
        assert_eq!(state.approvals().len(), 1);
        // No HTTP endpoint behind the fake gateway: health falls back to the
        // socket status.
        assert_eq!(state.health().map(|h| h.ok), Some(true));

        assert_eq!(gateway.params("logs.tail"), Some(json!({"limit": 200})));
        assert_eq!(
            monitor.stats(),
            DashboardStats {
                total_agents: 1,
                online_agents: 1,
                active_sessions: 1,
                total_cron_jobs: 1,
                active_cron_jobs: 1,
                pending_approvals: 1,
            }
        );

        monitor.stop();
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let (monitor, _gateway) = monitor_with(test_config());
        monitor.start().await.unwrap();
        assert!(matches!(
            monitor.start().await,
            Err(MonitorError::AlreadyRunning)
        ));
        monitor.stop();
    }

    #[tokio::test]
    async fn test_start_failure_leaves_nothing_running() {
        let (connector, server) = MemoryConnector::new();
        server.refuse_next(1);
        let monitor = Monitor::with_connector(test_config(), Arc::new(connector)).unwrap();
        let _gateway = spawn_gateway(server);

        let err = monitor.start().await.unwrap_err();
        assert!(matches!(err, MonitorError::Client(_)));
        assert!(!monitor.is_running());
        assert_eq!(monitor.snapshot().status(), ConnectionStatus::Error);
    }

    #[tokio::test]
    async fn test_refresh_is_noop_when_disconnected() {
        let (connector, server) = MemoryConnector::new();
        let monitor = Monitor::with_connector(test_config(), Arc::new(connector)).unwrap();
        monitor.refresh().await;
        assert_eq!(server.open_attempts(), 0);
        assert!(monitor.snapshot().agents().is_empty());
    }

    #[tokio::test]
    async fn test_event_triggers_refresh() {
        let (monitor, gateway) = monitor_with(test_config());
        monitor.start().await.unwrap();
        assert_eq!(gateway.count("agents.list"), 1);

        gateway.push("agent.status", json!({"agentId": "main", "status": "busy"}));
        // exec.approvals.list is the last call of a refresh.
        eventually(|| gateway.count("exec.approvals.list") == 2).await;
        assert_eq!(gateway.count("agents.list"), 2);

        let state = monitor.snapshot();
        let entry = state.activity().next().unwrap();
        assert_eq!(entry.kind, ActivityKind::Agent);
        assert_eq!(entry.title, "Agent status");

        // Events that do not ask for a refresh only touch the cache.
        gateway.push("log", json!({"level": "warn", "message": "disk"}));
        eventually(|| monitor.with_state(|s| s.log_count()) == 2).await;
        assert_eq!(gateway.count("agents.list"), 2);

        monitor.stop();
    }

    #[tokio::test]
    async fn test_approval_event_raises_notice() {
        let (monitor, gateway) = monitor_with(test_config());
        let mut notices = monitor.notices();
        monitor.start().await.unwrap();

        let mut approval = pending_approval();
        approval["id"] = json!("ap2");
        gateway.push("exec.approval.requested", approval);

        let notice = tokio::time::timeout(Duration::from_secs(5), notices.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert_eq!(notice.description.as_deref(), Some("main: ls"));
        assert_eq!(monitor.stats().pending_approvals, 2);

        gateway.push(
            "exec.approval.resolved",
            json!({"approvalId": "ap2", "decision": "denied"}),
        );
        eventually(|| monitor.stats().pending_approvals == 1).await;

        monitor.stop();
    }

    #[tokio::test]
    async fn test_resolve_approval_updates_cache() {
        let (monitor, gateway) = monitor_with(test_config());
        monitor.start().await.unwrap();
        let mut notices = monitor.notices();

        monitor
            .resolve_approval("ap1", ApprovalDecision::Approve)
            .await
            .unwrap();

        assert_eq!(
            gateway.params("exec.approval.resolve"),
            Some(json!({"approvalId": "ap1", "decision": "approve"}))
        );
        monitor.with_state(|state| {
            let approval = &state.approvals()[0];
            assert_eq!(approval.status, ApprovalStatus::Approved);
            assert!(approval.resolved_at.is_some());
        });
        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.level, NoticeLevel::Success);
        assert_eq!(notice.title, "Approval approved");

        monitor.stop();
    }

    #[tokio::test]
    async fn test_stop_clears_state() {
        let (monitor, _gateway) = monitor_with(test_config());
        monitor.start().await.unwrap();
        monitor.with_state(|s| assert!(!s.agents().is_empty()));

        monitor.stop();
        assert!(!monitor.is_running());
        assert!(!monitor.client().is_connected());
        let state = monitor.snapshot();
        assert!(state.agents().is_empty());
        assert!(state.health().is_none());
        assert_eq!(state.status(), ConnectionStatus::Disconnected);

        // Restartable after stop.
        monitor.start().await.unwrap();
        assert!(monitor.is_running());
        monitor.stop();
    }

    #[tokio::test]
    async fn test_poll_loop_refreshes() {
        let mut config = test_config();
        config.polling.refresh_interval_secs = 1;
        let (monitor, gateway) = monitor_with(config);
        monitor.start().await.unwrap();

        eventually(|| gateway.count("cron.list") >= 2).await;
        monitor.stop();
    }

    #[tokio::test]
    async fn test_metrics_are_recorded() {
        let (monitor, gateway) = monitor_with(test_config());
        let metrics = Arc::new(Metrics::new().unwrap());
        monitor.set_metrics(metrics.clone());
        monitor.start().await.unwrap();

        assert_eq!(metrics.agents_total.get(), 1);
        assert_eq!(metrics.gateway_up.get(), 1);
        assert!(metrics.requests_sent_total.get() >= 8);
        assert_eq!(metrics.refresh_duration.get_sample_count(), 1);

        gateway.push("cron.fired", json!({"jobId": "c1"}));
        eventually(|| metrics.events_total.with_label_values(&["cron.fired"]).get() == 1).await;
        monitor.with_state(|s| {
            assert_eq!(s.activity().next().map(|a| a.kind), Some(ActivityKind::Cron));
        });

        monitor.stop();
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = Config::default();
        config.gateway.url = "http://127.0.0.1:18789".to_string();
        assert!(matches!(Monitor::new(config), Err(MonitorError::Config(_))));
    }

    #[test]
    fn test_activity_entry_builder() {
        let entry = ActivityEntry::new(ActivityKind::Tool, "Tool run").with_agent("main");
        assert_eq!(entry.agent_id.as_deref(), Some("main"));
    }
}
