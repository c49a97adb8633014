//! High-level client API.

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::dispatcher::Subscription;
use crate::error::ClientError;
use crate::health::HealthProbe;
use crate::session::{ConnectionStatus, StatusUpdate};
use crate::transport::Connector;
use clawdeck_protocol::method::*;
use clawdeck_protocol::types::*;
use clawdeck_protocol::{EventFrame, HelloOk};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Message sent by [`Client::trigger_agent`] when none is given.
pub const DEFAULT_TRIGGER_MESSAGE: &str = "Wake up — triggered from dashboard";

/// High-level client for the gateway.
#[derive(Clone)]
pub struct Client {
    conn: Connection,
    health: HealthProbe,
}

impl Client {
    /// Creates a new client with the given configuration.
    pub fn new(config: ClientConfig) -> Self {
        let health = HealthProbe::new(config.health_timeout);
        Self {
            conn: Connection::new(config),
            health,
        }
    }

    /// Creates a new client over a custom transport.
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let health = HealthProbe::new(config.health_timeout);
        Self {
            conn: Connection::with_connector(config, connector),
            health,
        }
    }

    /// Connects and performs the handshake.
    pub async fn connect(&self) -> Result<HelloOk, ClientError> {
        self.conn.connect().await
    }

    /// Disconnects and stops reconnecting.
    pub fn disconnect(&self) {
        self.conn.disconnect()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.conn.status()
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    pub fn gateway_url(&self) -> &str {
        &self.conn.config().url
    }

    /// Registers an event handler. Use `*` for every event.
    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&EventFrame) + Send + Sync + 'static,
    {
        self.conn.on(event, handler)
    }

    pub fn on_status<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&StatusUpdate) + Send + Sync + 'static,
    {
        self.conn.on_status(handler)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EventFrame> {
        self.conn.subscribe_events()
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // =========================================================================
    // Helper methods
    // =========================================================================

    /// Calls a catalogue method and decodes its result.
    pub async fn call<M: Method>(&self, params: &M::Params) -> Result<M::Output, ClientError> {
        let params = params_value(params)?;
        let payload = self.conn.request(M::NAME, params).await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Sends a raw request.
    pub async fn send(&self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        self.conn.request(method, params).await
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    pub async fn get_config(&self) -> Result<GatewayConfig, ClientError> {
        self.call::<ConfigGet>(&()).await
    }

    /// Applies a merge patch to the gateway configuration.
    pub async fn patch_config(&self, patch: Value, base_hash: Option<&str>) -> Result<(), ClientError> {
        let params = ConfigPatchParams {
            patch,
            base_hash: base_hash.map(str::to_string),
        };
        self.call::<ConfigPatch>(&params).await?;
        Ok(())
    }

    /// Replaces the gateway configuration with `raw`.
    pub async fn apply_config(
        &self,
        raw: &str,
        base_hash: &str,
        note: Option<&str>,
    ) -> Result<(), ClientError> {
        let params = ConfigApplyParams {
            raw: raw.to_string(),
            base_hash: base_hash.to_string(),
            note: note.map(str::to_string),
        };
        self.call::<ConfigApply>(&params).await?;
        Ok(())
    }

    // =========================================================================
    // Agents
    // =========================================================================

    pub async fn list_agents(&self) -> Result<Vec<Agent>, ClientError> {
        self.call::<AgentsList>(&()).await
    }

    pub async fn get_agent_file(
        &self,
        agent_id: &str,
        file_name: AgentFileName,
    ) -> Result<AgentFile, ClientError> {
        let params = AgentFileParams {
            agent_id: agent_id.to_string(),
            file_name,
        };
        self.call::<AgentFilesGet>(&params).await
    }

    pub async fn set_agent_file(
        &self,
        agent_id: &str,
        file_name: AgentFileName,
        content: &str,
    ) -> Result<(), ClientError> {
        let params = AgentFileSetParams {
            agent_id: agent_id.to_string(),
            file_name,
            content: content.to_string(),
        };
        self.call::<AgentFilesSet>(&params).await?;
        Ok(())
    }

    /// Wakes an agent by sending it a chat message.
    pub async fn trigger_agent(&self, agent_id: &str, message: Option<&str>) -> Result<(), ClientError> {
        self.send_chat(agent_id, message.unwrap_or(DEFAULT_TRIGGER_MESSAGE))
            .await?;
        Ok(())
    }

    /// Disables an agent through a config patch.
    pub async fn pause_agent(&self, agent_id: &str) -> Result<(), ClientError> {
        self.set_agent_enabled(agent_id, false).await
    }

    /// Re-enables an agent through a config patch.
    pub async fn resume_agent(&self, agent_id: &str) -> Result<(), ClientError> {
        self.set_agent_enabled(agent_id, true).await
    }

    async fn set_agent_enabled(&self, agent_id: &str, enabled: bool) -> Result<(), ClientError> {
        let mut agents = Map::new();
        agents.insert(agent_id.to_string(), json!({ "enabled": enabled }));
        self.patch_config(json!({ "agents": agents }), None).await
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    pub async fn list_sessions(&self) -> Result<Vec<Session>, ClientError> {
        self.call::<SessionsList>(&()).await
    }

    /// Patches session settings; the patch fields are sent inline.
    pub async fn patch_session(
        &self,
        session_id: &str,
        patch: Map<String, Value>,
    ) -> Result<(), ClientError> {
        let params = SessionPatchParams {
            session_id: session_id.to_string(),
            patch,
        };
        self.call::<SessionsPatch>(&params).await?;
        Ok(())
    }

    pub async fn session_history(
        &self,
        session_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<ChatMessage>, ClientError> {
        let params = SessionHistoryParams {
            session_id: session_id.to_string(),
            limit,
        };
        self.call::<SessionsHistory>(&params).await
    }

    // =========================================================================
    // Cron
    // =========================================================================

    pub async fn list_cron_jobs(&self) -> Result<Vec<CronJob>, ClientError> {
        self.call::<CronList>(&()).await
    }

    pub async fn run_cron_job(&self, job_id: &str) -> Result<(), ClientError> {
        self.call::<CronRun>(&cron_params(job_id)).await?;
        Ok(())
    }

    pub async fn enable_cron_job(&self, job_id: &str) -> Result<(), ClientError> {
        self.call::<CronEnable>(&cron_params(job_id)).await?;
        Ok(())
    }

    pub async fn disable_cron_job(&self, job_id: &str) -> Result<(), ClientError> {
        self.call::<CronDisable>(&cron_params(job_id)).await?;
        Ok(())
    }

    pub async fn remove_cron_job(&self, job_id: &str) -> Result<(), ClientError> {
        self.call::<CronRemove>(&cron_params(job_id)).await?;
        Ok(())
    }

    // =========================================================================
    // Chat
    // =========================================================================

    pub async fn send_chat(&self, agent_id: &str, message: &str) -> Result<Value, ClientError> {
        let params = ChatSendParams {
            agent_id: agent_id.to_string(),
            message: message.to_string(),
        };
        self.call::<ChatSend>(&params).await
    }

    pub async fn chat_history(
        &self,
        agent_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<ChatMessage>, ClientError> {
        let params = ChatHistoryParams {
            agent_id: agent_id.to_string(),
            limit,
        };
        self.call::<ChatHistory>(&params).await
    }

    pub async fn abort_chat(&self, agent_id: &str) -> Result<(), ClientError> {
        let params = AgentIdParams {
            agent_id: agent_id.to_string(),
        };
        self.call::<ChatAbort>(&params).await?;
        Ok(())
    }

    // =========================================================================
    // Logs, skills, approvals, memory
    // =========================================================================

    pub async fn tail_logs(&self, filter: &LogsTailParams) -> Result<Vec<LogEntry>, ClientError> {
        self.call::<LogsTail>(filter).await
    }

    pub async fn list_skills(&self) -> Result<Vec<Skill>, ClientError> {
        self.call::<SkillsList>(&()).await
    }

    pub async fn list_approvals(&self) -> Result<Vec<ExecApproval>, ClientError> {
        self.call::<ApprovalsList>(&()).await
    }

    pub async fn resolve_approval(
        &self,
        approval_id: &str,
        decision: ApprovalDecision,
    ) -> Result<(), ClientError> {
        let params = ApprovalResolveParams {
            approval_id: approval_id.to_string(),
            decision,
        };
        self.call::<ApprovalResolve>(&params).await?;
        Ok(())
    }

    pub async fn search_memory(
        &self,
        agent_id: &str,
        query: &str,
        limit: Option<u32>,
    ) -> Result<Vec<MemoryEntry>, ClientError> {
        let params = MemorySearchParams {
            agent_id: agent_id.to_string(),
            query: query.to_string(),
            limit,
        };
        self.call::<MemorySearch>(&params).await
    }

    // =========================================================================
    // Health
    // =========================================================================

    /// Probes `/health` over HTTP. Never fails: if the probe does, the
    /// result only says whether the socket is currently connected.
    pub async fn health(&self) -> GatewayHealth {
        let config = self.conn.config();
        match self.health.check(&config.url, config.token()).await {
            Ok(health) => health,
            Err(e) => {
                tracing::debug!("Health probe failed: {}", e);
                GatewayHealth::assumed(self.is_connected())
            }
        }
    }
}

fn cron_params(job_id: &str) -> CronJobParams {
    CronJobParams {
        job_id: job_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::{MemoryConnector, MemoryPeer, MemoryServer};
    use clawdeck_protocol::{ErrorShape, RequestFrame, ResponseFrame};
    use std::time::Duration;

    async fn connected_client() -> (Client, MemoryServer, MemoryPeer) {
        let (connector, mut server) = MemoryConnector::new();
        let config = ClientConfig::new("ws://127.0.0.1:9")
            .with_token("tok")
            .with_health_timeout(Duration::from_millis(200));
        let client = Client::with_connector(config, Arc::new(connector));

        let serve = async {
            let mut peer = server.accept().await.unwrap();
            let req = peer.recv_request().await.unwrap();
            peer.send_frame(ResponseFrame::ok(req.id, json!({"protocol": 3})));
            peer
        };
        let (hello, peer) = tokio::join!(client.connect(), serve);
        hello.unwrap();
        (client, server, peer)
    }

    /// Answers one request with `payload` and returns it for inspection.
    async fn answer(peer: &mut MemoryPeer, payload: Value) -> RequestFrame {
        let req = peer.recv_request().await.unwrap();
        peer.send_frame(ResponseFrame::ok(req.id.clone(), payload));
        req
    }

    #[test]
    fn test_client_creation() {
        let client = Client::new(ClientConfig::new("ws://127.0.0.1:18789"));
        assert!(!client.is_connected());
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
        assert_eq!(client.gateway_url(), "ws://127.0.0.1:18789");
    }

    #[tokio::test]
    async fn test_list_agents() {
        let (client, _server, mut peer) = connected_client().await;
        let (agents, req) = tokio::join!(
            client.list_agents(),
            answer(&mut peer, json!([{"id": "main", "name": "Main", "status": "online"}]))
        );
        assert_eq!(req.method, "agents.list");
        assert_eq!(req.params, None);
        let agents = agents.unwrap();
        assert_eq!(agents[0].id, "main");
    }

    #[tokio::test]
    async fn test_trigger_agent_default_message() {
        let (client, _server, mut peer) = connected_client().await;
        let (result, req) = tokio::join!(client.trigger_agent("main", None), answer(&mut peer, json!({})));
        result.unwrap();
        assert_eq!(req.method, "chat.send");
        assert_eq!(
            req.params,
            Some(json!({"agentId": "main", "message": DEFAULT_TRIGGER_MESSAGE}))
        );
    }

    #[tokio::test]
    async fn test_pause_and_resume_patch_config() {
        let (client, _server, mut peer) = connected_client().await;

        let (result, req) = tokio::join!(client.pause_agent("scout"), answer(&mut peer, Value::Null));
        result.unwrap();
        assert_eq!(req.method, "config.patch");
        assert_eq!(
            req.params,
            Some(json!({"patch": {"agents": {"scout": {"enabled": false}}}}))
        );

        let (result, req) = tokio::join!(client.resume_agent("scout"), answer(&mut peer, Value::Null));
        result.unwrap();
        assert_eq!(
            req.params,
            Some(json!({"patch": {"agents": {"scout": {"enabled": true}}}}))
        );
    }

    #[tokio::test]
    async fn test_cron_and_approval_params() {
        let (client, _server, mut peer) = connected_client().await;

        let (result, req) = tokio::join!(client.run_cron_job("job-1"), answer(&mut peer, Value::Null));
        result.unwrap();
        assert_eq!(req.method, "cron.run");
        assert_eq!(req.params, Some(json!({"jobId": "job-1"})));

        let (result, req) = tokio::join!(
            client.resolve_approval("ap-9", ApprovalDecision::Approve),
            answer(&mut peer, Value::Null)
        );
        result.unwrap();
        assert_eq!(req.method, "exec.approval.resolve");
        assert_eq!(req.params, Some(json!({"approvalId": "ap-9", "decision": "approve"})));
    }

    #[tokio::test]
    async fn test_gateway_error_is_local() {
        let (client, _server, mut peer) = connected_client().await;
        let serve = async {
            let req = peer.recv_request().await.unwrap();
            peer.send_frame(ResponseFrame::error(req.id, ErrorShape::new("NOT_FOUND", "no such file")));
        };

        let (result, ()) = tokio::join!(client.get_agent_file("main", AgentFileName::Soul), serve);
        match result {
            Err(e) => assert_eq!(e.to_string(), "no such file"),
            Ok(file) => panic!("unexpected file {:?}", file),
        }
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_unexpected_payload_shape_is_json_error() {
        let (client, _server, mut peer) = connected_client().await;
        let (result, _) = tokio::join!(client.list_sessions(), answer(&mut peer, json!("oops")));
        assert!(matches!(result, Err(ClientError::Json(_))));
    }

    #[tokio::test]
    async fn test_health_falls_back_to_status() {
        let (client, _server, _peer) = connected_client().await;
        let health = client.health().await;
        assert!(health.ok);
        assert!(health.version.is_none());

        client.disconnect();
        assert!(!client.health().await.ok);
    }
}
