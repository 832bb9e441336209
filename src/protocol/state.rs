//! Session and command payloads returned in response `data`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::usage::Cost;
use crate::{Error, Result};

/// Model descriptor reported by `get_state`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api: String,
    pub provider: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub base_url: String,
    pub reasoning: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub input: Vec<String>,
    pub context_window: u64,
    pub max_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<Cost>,
}

/// Snapshot of the agent session (`get_state`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelInfo>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub thinking_level: String,
    pub is_streaming: bool,
    pub is_compacting: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub steering_mode: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub follow_up_mode: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub session_file: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub session_name: String,
    pub auto_compaction_enabled: bool,
    pub message_count: u64,
    pub pending_message_count: u64,
    /// Filled from the model descriptor by [`SessionState::from_data`].
    #[serde(skip)]
    pub context_window: u64,
}

impl SessionState {
    /// Decode `get_state` response data.
    ///
    /// Requires a session id and a positive context window.
    pub fn from_data(data: &Value) -> Result<Self> {
        let mut state = SessionState::deserialize(data)?;
        if state.session_id.is_empty() {
            return Err(Error::protocol("get_state missing sessionId"));
        }
        if state.context_window == 0 {
            if let Some(model) = &state.model {
                state.context_window = model.context_window;
            }
        }
        if state.context_window == 0 {
            return Err(Error::protocol("get_state missing context window"));
        }
        Ok(state)
    }
}

/// Result of a compaction, manual (`compact`) or automatic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompactResult {
    pub summary: String,
    pub first_kept_entry_id: String,
    pub tokens_before: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// One slash command advertised by `get_commands`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlashCommand {
    pub name: String,
    pub description: String,
    pub source: String,
    pub location: String,
    pub path: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn session_state_takes_context_window_from_model() {
        let data = json!({
            "sessionId": "session-123",
            "sessionFile": "/tmp/session-123.jsonl",
            "autoCompactionEnabled": true,
            "model": {
                "id": "claude-opus-4-5",
                "provider": "anthropic",
                "contextWindow": 200000,
                "maxTokens": 8192
            }
        });
        let state = SessionState::from_data(&data).unwrap();
        assert_eq!(state.session_id, "session-123");
        assert_eq!(state.context_window, 200_000);
        assert!(state.auto_compaction_enabled);
        assert_eq!(state.model.unwrap().provider, "anthropic");
    }

    #[test]
    fn session_state_requires_session_id() {
        let err = SessionState::from_data(&json!({"model": {"contextWindow": 1}})).unwrap_err();
        assert_eq!(err.to_string(), "protocol violation: get_state missing sessionId");
    }

    #[test]
    fn session_state_requires_context_window() {
        let err = SessionState::from_data(&json!({"sessionId": "s"})).unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn compact_result_keeps_details() {
        let result: CompactResult = serde_json::from_value(json!({
            "summary": "compacted",
            "firstKeptEntryId": "entry-1",
            "tokensBefore": 12345,
            "details": {"mode": "manual"}
        }))
        .unwrap();
        assert_eq!(result.first_kept_entry_id, "entry-1");
        assert_eq!(result.tokens_before, 12345);
        assert_eq!(result.details.unwrap()["mode"], "manual");
    }
}
