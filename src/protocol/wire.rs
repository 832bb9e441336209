//! Command and response frames.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Command kinds understood by the agent.
pub mod command_kind {
    pub const PROMPT: &str = "prompt";
    pub const STEER: &str = "steer";
    pub const FOLLOW_UP: &str = "follow_up";
    pub const ABORT: &str = "abort";
    pub const GET_STATE: &str = "get_state";
    pub const NEW_SESSION: &str = "new_session";
    pub const COMPACT: &str = "compact";
    pub const GET_COMMANDS: &str = "get_commands";
}

/// Frame type of a correlated response line.
pub const RESPONSE_TYPE: &str = "response";

/// One outbound command: a JSON object with a string `type` field.
///
/// The client stamps a unique `id` on a copy of the command right before it
/// is written, so the same `Command` can be sent more than once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Command(Map<String, Value>);

impl Command {
    /// Create a command of the given kind.
    pub fn new(kind: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::String(kind.into()));
        Self(fields)
    }

    /// Add a field, consuming and returning the command.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Get a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The command kind.
    ///
    /// Fails unless `type` is a non-empty string.
    pub fn kind(&self) -> Result<&str> {
        match self.0.get("type") {
            Some(Value::String(kind)) if !kind.trim().is_empty() => Ok(kind),
            _ => Err(Error::InvalidRequest("command type is required".into())),
        }
    }

    /// The underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Copy this command with `id` set, serialized as one line without the newline.
    pub(crate) fn frame(&self, id: &str) -> Result<Vec<u8>> {
        let mut stamped = self.0.clone();
        stamped.insert("id".to_string(), Value::String(id.to_string()));
        Ok(serde_json::to_vec(&stamped)?)
    }
}

impl From<Map<String, Value>> for Command {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// A correlated reply to one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the command this answers.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Always `"response"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Kind of the command this answers.
    #[serde(default)]
    pub command: String,
    /// A missing flag reads as a failure.
    #[serde(default)]
    pub success: bool,
    /// Failure message when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Command-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    /// Decode a response line.
    ///
    /// Requires `type == "response"` and a non-empty `command`.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let response: Response = serde_json::from_slice(raw)?;
        require_type("response", &response.kind, RESPONSE_TYPE)?;
        if response.command.trim().is_empty() {
            return Err(Error::protocol("response missing command"));
        }
        Ok(response)
    }

    /// The failure message, trimmed; empty when the agent gave none.
    pub fn error_message(&self) -> &str {
        self.error.as_deref().map(str::trim).unwrap_or_default()
    }

    /// Decode `data` into a typed payload.
    ///
    /// A missing or `null` payload is a protocol violation.
    pub fn decode_data<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.data {
            Some(value) if !value.is_null() => Ok(T::deserialize(value)?),
            _ => Err(Error::protocol(format!(
                "{} missing response data",
                self.command
            ))),
        }
    }
}

/// Minimal view of an inbound line, used to classify it.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Check the `type` of a decoded frame.
pub(crate) fn require_type(frame: &str, actual: &str, expected: &str) -> Result<()> {
    if actual.trim().is_empty() {
        return Err(Error::protocol(format!("{frame} missing type")));
    }
    if actual != expected {
        return Err(Error::protocol(format!(
            "unexpected {frame} type {actual:?}, expected {expected:?}"
        )));
    }
    Ok(())
}
