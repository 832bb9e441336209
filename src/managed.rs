//! Classification of finished runs for callers that supervise many of them.
//!
//! [`classify_managed`] turns a [`RunDetailedResult`] into a coarse
//! [`CompletionClass`] plus the recovery facts behind it.
//! [`classify_run_error`] picks out the errors that mean the client itself
//! is broken and should be replaced.

use crate::protocol::{RunDetailedResult, TerminalStatus};
use crate::Error;

/// Coarse outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionClass {
    Ok,
    /// Completed after compacting away a context overflow.
    OkAfterRecovery,
    Aborted,
    Failed,
}

impl CompletionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionClass::Ok => "ok",
            CompletionClass::OkAfterRecovery => "ok_after_recovery",
            CompletionClass::Aborted => "aborted",
            CompletionClass::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CompletionClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the run's compaction events showed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryFacts {
    /// An `auto_compaction_start` or `auto_compaction_end` was seen.
    pub compaction_observed: bool,
    /// Compaction started because the context overflowed.
    pub overflow_detected: bool,
    /// The overflow was compacted successfully and the run still completed.
    pub recovered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagedSummary {
    pub class: CompletionClass,
    pub facts: RecoveryFacts,
}

/// Why a client should be discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokenCause {
    ProcessDied,
    Protocol,
    ClientRuntime,
}

impl BrokenCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrokenCause::ProcessDied => "process_died",
            BrokenCause::Protocol => "protocol_violation",
            BrokenCause::ClientRuntime => "client_runtime",
        }
    }
}

impl std::fmt::Display for BrokenCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a finished run.
pub fn classify_managed(result: &RunDetailedResult) -> ManagedSummary {
    let compaction_observed =
        result.auto_compaction_start.is_some() || result.auto_compaction_end.is_some();
    let overflow_detected = result
        .auto_compaction_start
        .as_ref()
        .is_some_and(|start| start.reason.trim().eq_ignore_ascii_case("overflow"));
    let compaction_succeeded = result.auto_compaction_end.as_ref().is_some_and(|end| {
        end.result.is_some() && !end.aborted && end.error_message.trim().is_empty()
    });

    let status = result.outcome.status;
    let recovered =
        overflow_detected && compaction_succeeded && status == TerminalStatus::Completed;

    let class = match status {
        TerminalStatus::Aborted => CompletionClass::Aborted,
        TerminalStatus::Failed => CompletionClass::Failed,
        TerminalStatus::Completed if recovered => CompletionClass::OkAfterRecovery,
        TerminalStatus::Completed => CompletionClass::Ok,
    };

    ManagedSummary {
        class,
        facts: RecoveryFacts {
            compaction_observed,
            overflow_detected,
            recovered,
        },
    }
}

/// The broken-client cause behind `err`, if any.
///
/// Cancellations, RPC failures and validation errors leave the client usable
/// and return `None`.
pub fn classify_run_error(err: &Error) -> Option<BrokenCause> {
    if err.is_cancellation() {
        return None;
    }
    match err {
        Error::ProcessDied { .. } => Some(BrokenCause::ProcessDied),
        Error::ProtocolViolation(_) => Some(BrokenCause::Protocol),
        Error::ClientClosed => Some(BrokenCause::ClientRuntime),
        _ => None,
    }
}
