//! RPC method catalogue.
//!
//! Every gateway method is a marker type implementing [`Method`], which ties
//! the method name to its parameter and result types. Payloads are validated
//! against `Output` when a response arrives, not trusted structurally.

use crate::message::{ConnectParams, HelloOk};
use crate::types::{
    Agent, AgentFile, AgentFileName, ApprovalDecision, ChatMessage, CronJob, ExecApproval,
    GatewayConfig, LogEntry, LogLevel, MemoryEntry, Session, Skill,
};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A gateway RPC method.
pub trait Method {
    /// Dotted wire name, e.g. `agents.list`.
    const NAME: &'static str;
    /// Request parameters. `()` serializes to null and sends no params.
    type Params: Serialize;
    /// Response payload.
    type Output: DeserializeOwned;
}

macro_rules! method {
    ($(#[$meta:meta])* $ty:ident, $name:literal, $params:ty => $output:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        pub struct $ty;

        impl Method for $ty {
            const NAME: &'static str = $name;
            type Params = $params;
            type Output = $output;
        }
    };
}

// ============================================================================
// Parameter shapes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatchParams {
    pub patch: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigApplyParams {
    pub raw: String,
    pub base_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentFileParams {
    pub agent_id: String,
    pub file_name: AgentFileName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentFileSetParams {
    pub agent_id: String,
    pub file_name: AgentFileName,
    pub content: String,
}

/// `sessions.patch` sends the patch fields inline next to the session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatchParams {
    pub session_id: String,
    #[serde(flatten)]
    pub patch: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHistoryParams {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJobParams {
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendParams {
    pub agent_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryParams {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentIdParams {
    pub agent_id: String,
}

/// Filter for `logs.tail`. An empty filter sends no params.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsTailParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
}

impl LogsTailParams {
    pub fn limit(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResolveParams {
    pub approval_id: String,
    pub decision: ApprovalDecision,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySearchParams {
    pub agent_id: String,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

// ============================================================================
// Catalogue
// ============================================================================

method!(
    /// Handshake. Always the first request on a connection.
    Connect, "connect", ConnectParams => HelloOk
);

method!(ConfigGet, "config.get", () => GatewayConfig);
method!(ConfigPatch, "config.patch", ConfigPatchParams => IgnoredAny);
method!(ConfigApply, "config.apply", ConfigApplyParams => IgnoredAny);

method!(AgentsList, "agents.list", () => Vec<Agent>);
method!(AgentFilesGet, "agents.files.get", AgentFileParams => AgentFile);
method!(AgentFilesSet, "agents.files.set", AgentFileSetParams => IgnoredAny);

method!(SessionsList, "sessions.list", () => Vec<Session>);
method!(SessionsPatch, "sessions.patch", SessionPatchParams => IgnoredAny);
method!(SessionsHistory, "sessions.history", SessionHistoryParams => Vec<ChatMessage>);

method!(CronList, "cron.list", () => Vec<CronJob>);
method!(CronRun, "cron.run", CronJobParams => IgnoredAny);
method!(CronEnable, "cron.enable", CronJobParams => IgnoredAny);
method!(CronDisable, "cron.disable", CronJobParams => IgnoredAny);
method!(CronRemove, "cron.remove", CronJobParams => IgnoredAny);

method!(
    /// The result shape is gateway-defined, so it stays raw JSON.
    ChatSend, "chat.send", ChatSendParams => Value
);
method!(ChatHistory, "chat.history", ChatHistoryParams => Vec<ChatMessage>);
method!(ChatAbort, "chat.abort", AgentIdParams => IgnoredAny);

method!(LogsTail, "logs.tail", LogsTailParams => Vec<LogEntry>);
method!(SkillsList, "skills.list", () => Vec<Skill>);

method!(ApprovalsList, "exec.approvals.list", () => Vec<ExecApproval>);
method!(ApprovalResolve, "exec.approval.resolve", ApprovalResolveParams => IgnoredAny);

method!(MemorySearch, "memory.search", MemorySearchParams => Vec<MemoryEntry>);

/// Converts method params into the optional `params` field of a request.
/// Null and empty objects are omitted.
pub fn params_value<P: Serialize>(params: &P) -> Result<Option<Value>, serde_json::Error> {
    Ok(match serde_json::to_value(params)? {
        Value::Null => None,
        Value::Object(map) if map.is_empty() => None,
        other => Some(other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn output<M: Method>(payload: Value) -> M::Output {
        serde_json::from_value(payload).unwrap()
    }

    #[test]
    fn test_method_names() {
        assert_eq!(Connect::NAME, crate::CONNECT_METHOD);
        assert_eq!(AgentsList::NAME, "agents.list");
        assert_eq!(AgentFilesGet::NAME, "agents.files.get");
        assert_eq!(ApprovalsList::NAME, "exec.approvals.list");
        assert_eq!(ApprovalResolve::NAME, "exec.approval.resolve");
        assert_eq!(MemorySearch::NAME, "memory.search");
    }

    #[test]
    fn test_unit_params_are_omitted() {
        assert_eq!(params_value(&()).unwrap(), None);
        assert_eq!(params_value(&LogsTailParams::default()).unwrap(), None);
        assert_eq!(
            params_value(&LogsTailParams::limit(200)).unwrap(),
            Some(json!({"limit": 200}))
        );
    }

    #[test]
    fn test_param_shapes() {
        let p = params_value(&AgentFileSetParams {
            agent_id: "main".into(),
            file_name: AgentFileName::Soul,
            content: "be kind".into(),
        })
        .unwrap();
        assert_eq!(
            p,
            Some(json!({"agentId": "main", "fileName": "SOUL.md", "content": "be kind"}))
        );

        let p = params_value(&ConfigPatchParams {
            patch: json!({"agents": {"a": {"enabled": false}}}),
            base_hash: None,
        })
        .unwrap();
        assert_eq!(p, Some(json!({"patch": {"agents": {"a": {"enabled": false}}}})));

        let p = params_value(&ApprovalResolveParams {
            approval_id: "ap1".into(),
            decision: ApprovalDecision::Deny,
        })
        .unwrap();
        assert_eq!(p, Some(json!({"approvalId": "ap1", "decision": "deny"})));
    }

    #[test]
    fn test_session_patch_is_flattened() {
        let mut patch = Map::new();
        patch.insert("model".into(), json!("opus"));
        patch.insert("thinkingLevel".into(), json!("high"));
        let p = params_value(&SessionPatchParams {
            session_id: "s1".into(),
            patch,
        })
        .unwrap();
        assert_eq!(
            p,
            Some(json!({"sessionId": "s1", "model": "opus", "thinkingLevel": "high"}))
        );
    }

    #[test]
    fn test_void_outputs_accept_any_payload() {
        output::<CronRun>(Value::Null);
        output::<CronRun>(json!({"queued": true}));
        output::<ConfigPatch>(json!([1, 2, 3]));
    }

    #[test]
    fn test_list_outputs_decode() {
        let agents = output::<AgentsList>(json!([{"id": "a", "status": "busy"}]));
        assert_eq!(agents.len(), 1);
        assert!(agents[0].status.is_available());

        let hello = output::<Connect>(json!({"protocol": 3}));
        assert_eq!(hello.protocol, 3);
    }
}
