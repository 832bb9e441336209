//! Type-safe launch options for the pi CLI.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Provider used by every preset except [`Mode::Coding`].
pub const DEFAULT_PROVIDER: &str = "anthropic";
/// Model used by [`Mode::Smart`] and [`Mode::Dumb`].
pub const DEFAULT_MODEL: &str = "claude-opus-4-6";
/// Thinking level of [`Mode::Smart`].
pub const DEFAULT_THINKING: &str = "high";
/// Thinking level of [`Mode::Dumb`] and [`Mode::Fast`].
pub const DEFAULT_DUMB_THINKING: &str = "low";
/// Model used by [`Mode::Fast`].
pub const DEFAULT_FAST_MODEL: &str = "claude-haiku-4-5";
pub const DEFAULT_CODING_PROVIDER: &str = "openai-codex";
pub const DEFAULT_CODING_MODEL: &str = "gpt-5.3-codex";
pub const DEFAULT_CODING_THINKING: &str = "high";

/// Model preset, resolved to `--provider`, `--model` and `--thinking`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Default model with high thinking.
    #[default]
    Smart,
    /// Default model with low thinking.
    Dumb,
    /// Small fast model with low thinking.
    Fast,
    /// Coding-tuned provider and model.
    Coding,
    /// Explicit provider, model and thinking level. All three are required.
    Custom {
        provider: String,
        model: String,
        thinking: String,
    },
}

/// The three values a [`Mode`] resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub provider: String,
    pub model: String,
    pub thinking: String,
}

impl Mode {
    /// Build a [`Mode::Custom`].
    pub fn custom(
        provider: impl Into<String>,
        model: impl Into<String>,
        thinking: impl Into<String>,
    ) -> Self {
        Mode::Custom {
            provider: provider.into(),
            model: model.into(),
            thinking: thinking.into(),
        }
    }

    /// Resolve the preset. Fails for a custom mode with a blank field.
    pub fn resolve(&self) -> Result<ModelSelection> {
        let (provider, model, thinking) = match self {
            Mode::Smart => (DEFAULT_PROVIDER, DEFAULT_MODEL, DEFAULT_THINKING),
            Mode::Dumb => (DEFAULT_PROVIDER, DEFAULT_MODEL, DEFAULT_DUMB_THINKING),
            Mode::Fast => (DEFAULT_PROVIDER, DEFAULT_FAST_MODEL, DEFAULT_DUMB_THINKING),
            Mode::Coding => (
                DEFAULT_CODING_PROVIDER,
                DEFAULT_CODING_MODEL,
                DEFAULT_CODING_THINKING,
            ),
            Mode::Custom {
                provider,
                model,
                thinking,
            } => {
                for (name, value) in [
                    ("provider", provider),
                    ("model", model),
                    ("thinking", thinking),
                ] {
                    if value.trim().is_empty() {
                        return Err(Error::InvalidConfig(format!(
                            "custom mode requires {name}"
                        )));
                    }
                }
                (provider.trim(), model.trim(), thinking.trim())
            }
        };
        Ok(ModelSelection {
            provider: provider.to_string(),
            model: model.to_string(),
            thinking: thinking.to_string(),
        })
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Smart => write!(f, "smart"),
            Mode::Dumb => write!(f, "dumb"),
            Mode::Fast => write!(f, "fast"),
            Mode::Coding => write!(f, "coding"),
            Mode::Custom { provider, model, .. } => write!(f, "{provider}/{model}"),
        }
    }
}

/// Whether pi persists the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum SessionMode {
    /// No session file (`--no-session`).
    #[default]
    Ephemeral,
    /// Let pi pick its default session.
    Default,
    /// Persist under the given name (`--session <name>`).
    Named(String),
}

impl SessionMode {
    /// Persist under `name`. A blank name falls back to pi's default session.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            SessionMode::Default
        } else {
            SessionMode::Named(trimmed.to_string())
        }
    }

    pub(crate) fn args(&self) -> Vec<String> {
        match self {
            SessionMode::Ephemeral => vec!["--no-session".into()],
            SessionMode::Default => Vec::new(),
            SessionMode::Named(name) => vec!["--session".into(), name.clone()],
        }
    }
}
