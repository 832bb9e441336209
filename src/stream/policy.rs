//! Per-subscriber backpressure policy.

use std::str::FromStr;

use crate::{Error, Result};

/// Inbox size of [`SubscriptionPolicy::default`].
pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 128;

/// What a subscriber's inbox does when it is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SubscriptionMode {
    /// Discard the new event.
    #[default]
    Drop,
    /// Suspend the publisher until there is room. Nothing is lost.
    Block,
    /// Evict the oldest buffered event. Keeps the most recent N.
    Ring,
}

impl SubscriptionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionMode::Drop => "drop",
            SubscriptionMode::Block => "block",
            SubscriptionMode::Ring => "ring",
        }
    }
}

impl std::fmt::Display for SubscriptionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "drop" => Ok(SubscriptionMode::Drop),
            "block" => Ok(SubscriptionMode::Block),
            "ring" => Ok(SubscriptionMode::Ring),
            other => Err(Error::InvalidSubscriptionPolicy(format!(
                "unknown mode {other:?}"
            ))),
        }
    }
}

/// Buffer size and overflow behavior chosen at subscribe time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionPolicy {
    /// Inbox capacity. Must be greater than zero.
    pub buffer: usize,
    pub mode: SubscriptionMode,
    /// Queue a `subscription_drop` event when an event is lost.
    pub emit_drop_event: bool,
}

impl Default for SubscriptionPolicy {
    fn default() -> Self {
        Self {
            buffer: DEFAULT_SUBSCRIPTION_BUFFER,
            mode: SubscriptionMode::Drop,
            emit_drop_event: false,
        }
    }
}

impl SubscriptionPolicy {
    pub fn drop(buffer: usize) -> Self {
        Self::new(buffer, SubscriptionMode::Drop)
    }

    pub fn block(buffer: usize) -> Self {
        Self::new(buffer, SubscriptionMode::Block)
    }

    pub fn ring(buffer: usize) -> Self {
        Self::new(buffer, SubscriptionMode::Ring)
    }

    pub fn new(buffer: usize, mode: SubscriptionMode) -> Self {
        Self {
            buffer,
            mode,
            emit_drop_event: false,
        }
    }

    /// Enable or disable `subscription_drop` diagnostics.
    pub fn with_drop_event(mut self, emit: bool) -> Self {
        self.emit_drop_event = emit;
        self
    }

    /// Check the policy before subscribing.
    pub fn validate(&self) -> Result<()> {
        if self.buffer == 0 {
            return Err(Error::InvalidSubscriptionPolicy(
                "buffer must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
