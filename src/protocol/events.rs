//! Events emitted by the agent, plus the client's own synthetic events.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::state::CompactResult;
use super::usage::Usage;
use super::wire::{require_type, Envelope};
use crate::Result;

/// Event kinds.
///
/// The first group is emitted by the agent; the second is synthesized by the
/// client and never appears on the wire.
pub mod event_kind {
    pub const AGENT_END: &str = "agent_end";
    pub const MESSAGE_UPDATE: &str = "message_update";
    pub const AUTO_COMPACTION_START: &str = "auto_compaction_start";
    pub const AUTO_COMPACTION_END: &str = "auto_compaction_end";
    pub const AUTO_RETRY_START: &str = "auto_retry_start";
    pub const AUTO_RETRY_END: &str = "auto_retry_end";
    /// A response nobody was waiting for anymore.
    pub const RESPONSE: &str = "response";

    // -------------------------------------------------------------------------
    // Client-internal
    // -------------------------------------------------------------------------
    pub const PROCESS_DIED: &str = "process_died";
    pub const SUBSCRIPTION_DROP: &str = "subscription_drop";
    pub const PARSE_ERROR: &str = "parse_error";
    pub const RESPONSE_PARSE_ERROR: &str = "response_parse_error";
}

/// One inbound notification.
///
/// The payload is the raw JSON line (or a small synthesized JSON object) and is
/// cheap to clone, so every subscriber gets its own copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    kind: String,
    payload: Bytes,
}

impl Event {
    /// Create an event.
    pub fn new(kind: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
        }
    }

    /// The event kind (`type` field of the line).
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Check the event kind.
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// The raw payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Decode the payload into a typed event, checking its `type`.
    pub fn decode<T: EventPayload>(&self) -> Result<T> {
        let envelope: Envelope = serde_json::from_slice(&self.payload)?;
        require_type("event", &envelope.kind, T::KIND)?;
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Decode the payload without checking its kind.
    pub fn decode_raw<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    pub(crate) fn parse_error(line: Bytes) -> Self {
        Self::new(event_kind::PARSE_ERROR, line)
    }

    pub(crate) fn response_parse_error(line: Bytes) -> Self {
        Self::new(event_kind::RESPONSE_PARSE_ERROR, line)
    }

    pub(crate) fn process_died(cause: Option<&str>) -> Self {
        let payload = match cause {
            Some(cause) => json!({"type": event_kind::PROCESS_DIED, "error": cause}),
            None => json!({"type": event_kind::PROCESS_DIED}),
        };
        Self::synthetic(event_kind::PROCESS_DIED, &payload)
    }

    pub(crate) fn subscription_drop(mode: &str, dropped_type: &str) -> Self {
        let payload = json!({
            "type": event_kind::SUBSCRIPTION_DROP,
            "mode": mode,
            "droppedType": dropped_type,
        });
        Self::synthetic(event_kind::SUBSCRIPTION_DROP, &payload)
    }

    fn synthetic(kind: &str, payload: &Value) -> Self {
        Self::new(kind, serde_json::to_vec(payload).unwrap_or_default())
    }
}

/// A typed event payload with a fixed kind.
pub trait EventPayload: DeserializeOwned {
    /// Value of the `type` field.
    const KIND: &'static str;
}

macro_rules! event_payload {
    ($($ty:ty => $kind:expr),* $(,)?) => {
        $(impl EventPayload for $ty {
            const KIND: &'static str = $kind;
        })*
    };
}

event_payload! {
    AgentEndEvent => event_kind::AGENT_END,
    MessageUpdateEvent => event_kind::MESSAGE_UPDATE,
    AutoCompactionStartEvent => event_kind::AUTO_COMPACTION_START,
    AutoCompactionEndEvent => event_kind::AUTO_COMPACTION_END,
    AutoRetryStartEvent => event_kind::AUTO_RETRY_START,
    AutoRetryEndEvent => event_kind::AUTO_RETRY_END,
    ProcessDiedEvent => event_kind::PROCESS_DIED,
    SubscriptionDropEvent => event_kind::SUBSCRIPTION_DROP,
}

/// One message in the agent transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentMessage {
    pub role: String,
    /// Either a string or an array of content blocks.
    pub content: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stop_reason: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub terminal_reason: String,
    #[serde(rename = "terminal_reason", skip_serializing_if = "String::is_empty")]
    pub terminal_reason_legacy: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error_message: String,
}

impl AgentMessage {
    /// Whether this message came from the assistant.
    pub fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }

    /// Terminal reason under either spelling, trimmed.
    pub fn terminal_reason(&self) -> &str {
        [&self.terminal_reason, &self.terminal_reason_legacy]
            .into_iter()
            .map(|reason| reason.trim())
            .find(|reason| !reason.is_empty())
            .unwrap_or_default()
    }
}

/// `agent_end`: the run finished and the transcript is final.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentEndEvent {
    pub messages: Vec<AgentMessage>,
}

/// Incremental update to an assistant message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssistantMessageDelta {
    #[serde(rename = "type")]
    pub kind: String,
    pub content_index: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub delta: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<Value>,
}

/// `message_update`: streaming progress of the current message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MessageUpdateEvent {
    pub message: AgentMessage,
    pub assistant_message_event: AssistantMessageDelta,
}

/// `auto_compaction_start`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoCompactionStartEvent {
    pub reason: String,
}

/// `auto_compaction_end`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AutoCompactionEndEvent {
    pub result: Option<CompactResult>,
    pub aborted: bool,
    pub will_retry: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error_message: String,
}

/// `auto_retry_start`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AutoRetryStartEvent {
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay_ms: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error_message: String,
}

/// `auto_retry_end`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AutoRetryEndEvent {
    pub success: bool,
    pub attempt: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub final_error: String,
}

/// `process_died` (synthetic).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessDiedEvent {
    pub error: Option<String>,
}

/// `subscription_drop` (synthetic).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubscriptionDropEvent {
    pub mode: String,
    pub dropped_type: String,
}
