use std::time::Duration;

/// Canonical text of the process-died error.
///
/// A failed response whose message matches this text exactly is reported as
/// [`Error::ProcessDied`] rather than a generic RPC error.
pub const PROCESS_DIED_MESSAGE: &str = "process died";

/// Errors that can occur when using libpi.
///
/// Errors are organized by category:
/// - Configuration errors: detected at `build()` time or before a command is written
/// - Spawn errors: failed to start the agent process
/// - IO errors: communication failures with the subprocess
/// - Protocol errors: malformed or contractually impossible agent output
/// - Terminal states: the process is gone or the client was closed
/// - Runtime errors: failures of a single operation
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    // -------------------------------------------------------------------------
    // Configuration errors
    // -------------------------------------------------------------------------
    /// Invalid configuration provided to builder.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A typed request failed validation before anything was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Subscription buffer size or overflow mode is invalid.
    #[error("invalid subscription policy: {0}")]
    InvalidSubscriptionPolicy(String),

    // -------------------------------------------------------------------------
    // Spawn errors
    // -------------------------------------------------------------------------
    /// pi binary not found.
    #[error("pi CLI not found (searched: {searched})")]
    CliNotFound { searched: String },

    /// Failed to spawn the pi subprocess.
    #[error("failed to spawn pi process: {0}")]
    ProcessSpawn(#[source] std::io::Error),

    // -------------------------------------------------------------------------
    // IO errors
    // -------------------------------------------------------------------------
    /// IO error communicating with the pi subprocess.
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),

    /// Writing a framed command to the process failed.
    #[error("write {command} command: {source}")]
    Write {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Protocol errors
    // -------------------------------------------------------------------------
    /// Failed to parse JSON.
    #[error("failed to parse JSON: {message}")]
    JsonParse {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// The agent did something the protocol does not allow.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    // -------------------------------------------------------------------------
    // Terminal states
    // -------------------------------------------------------------------------
    /// The agent process exited or its output stream failed.
    ///
    /// Once set, every outstanding and future operation fails with this error.
    #[error("process died{}", .cause.as_deref().map(|c| format!(": {c}")).unwrap_or_default())]
    ProcessDied { cause: Option<String> },

    /// The client was closed by the caller.
    #[error("client closed")]
    ClientClosed,

    // -------------------------------------------------------------------------
    // Runtime errors
    // -------------------------------------------------------------------------
    /// Another run is already active on this client.
    #[error("run already in progress")]
    RunInProgress,

    /// The agent reported a command-specific failure.
    #[error("{command} request {request_id} failed: {message}")]
    Rpc {
        request_id: String,
        command: String,
        message: String,
    },

    /// The context deadline passed before the operation finished.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The context was cancelled.
    #[error("request cancelled")]
    Cancelled,
}

/// A specialized Result type for libpi operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a JSON parse error with context.
    pub fn json_parse(source: serde_json::Error, raw: &str) -> Self {
        Self::JsonParse {
            message: format!(
                "at position {}: {}",
                source.column(),
                raw.chars().take(100).collect::<String>()
            ),
            source,
        }
    }

    /// Create an IO error.
    pub fn io(source: std::io::Error) -> Self {
        Self::Io(source)
    }

    /// Create a protocol violation error.
    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::ProtocolViolation(detail.into())
    }

    /// Check if the agent process is gone.
    pub fn is_process_died(&self) -> bool {
        matches!(self, Error::ProcessDied { .. })
    }

    /// Check if this error reflects a permanent client state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::ProcessDied { .. } | Error::ClientClosed)
    }

    /// Check if this error came from the caller's context.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled | Error::Timeout(_))
    }

    /// Check if this error is a protocol violation.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Error::ProtocolViolation(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonParse {
            message: err.to_string(),
            source: err,
        }
    }
}

/// The permanent state a client ends in.
///
/// Stored once (first writer wins) and handed out as an [`Error`] to every
/// caller that runs into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TerminalError {
    ProcessDied { cause: Option<String> },
    Closed,
}

impl From<TerminalError> for Error {
    fn from(err: TerminalError) -> Self {
        match err {
            TerminalError::ProcessDied { cause } => Error::ProcessDied { cause },
            TerminalError::Closed => Error::ClientClosed,
        }
    }
}
