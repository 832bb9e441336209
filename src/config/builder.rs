//! Client configuration and builder.
//!
//! This module provides the builder pattern for configuring the pi client.
//!
//! # Example
//!
//! ```ignore
//! use libpi::config::{ClientConfig, Mode, SessionMode};
//!
//! let config = ClientConfig::builder()
//!     .mode(Mode::Fast)
//!     .session(SessionMode::named("review"))
//!     .system_prompt("You are a careful reviewer.")
//!     .build()?;
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::options::{Mode, SessionMode};
use crate::{Error, Result};

/// Application name used for the agent directory when none is set.
pub const DEFAULT_APP_NAME: &str = "libpi";

/// Variable that points pi at its state directory.
pub const ENV_AGENT_DIR: &str = "PI_CODING_AGENT_DIR";

/// Parent variables passed through when `inherit_env` is on.
pub const DEFAULT_ENV_ALLOWLIST: &[&str] = &[
    "HOME",
    "PATH",
    "USER",
    "LOGNAME",
    "LANG",
    "LC_ALL",
    "LC_CTYPE",
    "TERM",
    "SHELL",
    "TMPDIR",
    "TZ",
    "ANTHROPIC_API_KEY",
    "ANTHROPIC_OAUTH_TOKEN",
    "ANTHROPIC_TOKEN_FILE",
    "OPENAI_API_KEY",
    ENV_AGENT_DIR,
    "GEMINI_API_KEY",
    "MISTRAL_API_KEY",
    "GROQ_API_KEY",
    "CEREBRAS_API_KEY",
    "XAI_API_KEY",
    "OPENROUTER_API_KEY",
    "ZAI_API_KEY",
    "MINIMAX_API_KEY",
    "GOOGLE_CLOUD_PROJECT",
    "GOOGLE_CLOUD_PROJECT_ID",
    "AWS_PROFILE",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_BEARER_TOKEN_BEDROCK",
    "AWS_REGION",
];

/// Parent variable prefixes passed through when `inherit_env` is on.
pub const DEFAULT_ENV_ALLOW_PREFIXES: &[&str] = &["XDG_", "LC_"];

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const DEFAULT_ABORT_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_DISPATCH_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Configuration for the pi client.
///
/// Use [`ClientConfig::builder()`] to create a new configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // Launch
    pub(crate) cli_path: Option<PathBuf>,
    pub(crate) app_name: String,
    pub(crate) mode: Mode,
    pub(crate) session: SessionMode,
    pub(crate) system_prompt: Option<String>,
    pub(crate) extra_args: Vec<String>,

    // Process environment
    pub(crate) working_directory: Option<PathBuf>,
    pub(crate) agent_dir: Option<PathBuf>,
    pub(crate) env_vars: HashMap<String, String>,
    pub(crate) inherit_env: bool,

    // Timing
    pub(crate) request_timeout: Duration,
    pub(crate) shutdown_grace: Duration,
    pub(crate) abort_timeout: Duration,
    pub(crate) dispatch_drain_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cli_path: None,
            app_name: DEFAULT_APP_NAME.to_string(),
            mode: Mode::default(),
            session: SessionMode::default(),
            system_prompt: None,
            extra_args: Vec::new(),
            working_directory: None,
            agent_dir: None,
            env_vars: HashMap::new(),
            inherit_env: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            abort_timeout: DEFAULT_ABORT_TIMEOUT,
            dispatch_drain_timeout: DEFAULT_DISPATCH_DRAIN_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Create a new builder for ClientConfig.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn session(&self) -> &SessionMode {
        &self.session
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    /// Timeout applied to a request whose context has no deadline.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// How long `close` waits for the process to exit before killing it.
    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    /// How long a cancelled run waits for its best-effort `abort`.
    pub fn abort_timeout(&self) -> Duration {
        self.abort_timeout
    }

    /// How long `close` waits for buffered events to be published.
    pub fn dispatch_drain_timeout(&self) -> Duration {
        self.dispatch_drain_timeout
    }
}

/// Builder for [`ClientConfig`].
///
/// This builder validates the configuration when [`build()`](ClientConfigBuilder::build) is called.
/// The CLI itself is located lazily, when the client starts.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    // -------------------------------------------------------------------------
    // Launch options
    // -------------------------------------------------------------------------

    /// Path to the pi binary (default: search PATH for "pi").
    pub fn cli_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cli_path = Some(path.into());
        self
    }

    /// Name of the directory under `$HOME` that holds pi's state.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.config.app_name = name.into();
        self
    }

    /// Model preset.
    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Session persistence (default: ephemeral).
    pub fn session(mut self, session: SessionMode) -> Self {
        self.config.session = session;
        self
    }

    /// Replace pi's system prompt.
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Append raw CLI arguments after the generated ones.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.config.extra_args.push(arg.into());
        self
    }

    // -------------------------------------------------------------------------
    // Process environment
    // -------------------------------------------------------------------------

    /// Working directory for the pi process.
    pub fn working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.working_directory = Some(path.into());
        self
    }

    /// Explicit agent state directory, exported as `PI_CODING_AGENT_DIR`.
    pub fn agent_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.agent_dir = Some(path.into());
        self
    }

    /// Add/override environment variable for subprocess.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.env_vars.insert(key.into(), value.into());
        self
    }

    /// Pass allowlisted parent variables through (default: true).
    pub fn inherit_env(mut self, inherit: bool) -> Self {
        self.config.inherit_env = inherit;
        self
    }

    // -------------------------------------------------------------------------
    // Timing
    // -------------------------------------------------------------------------

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace = grace;
        self
    }

    pub fn abort_timeout(mut self, timeout: Duration) -> Self {
        self.config.abort_timeout = timeout;
        self
    }

    pub fn dispatch_drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.dispatch_drain_timeout = timeout;
        self
    }

    // -------------------------------------------------------------------------
    // Build
    // -------------------------------------------------------------------------

    /// Build the configuration.
    ///
    /// This validates:
    /// - The mode resolves (custom modes need provider, model and thinking)
    /// - The working directory exists if set
    /// - Every timeout is non-zero
    ///
    /// Note: CLI existence is checked lazily at spawn time.
    pub fn build(self) -> Result<ClientConfig> {
        let mut config = self.config;

        config.mode.resolve()?;

        if let Some(ref dir) = config.working_directory {
            if !dir.is_dir() {
                return Err(Error::InvalidConfig(format!(
                    "working directory does not exist: {}",
                    dir.display()
                )));
            }
        }

        for (name, value) in [
            ("request_timeout", config.request_timeout),
            ("shutdown_grace", config.shutdown_grace),
            ("abort_timeout", config.abort_timeout),
            ("dispatch_drain_timeout", config.dispatch_drain_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::InvalidConfig(format!("{name} must be positive")));
            }
        }

        if config.app_name.trim().is_empty() {
            config.app_name = DEFAULT_APP_NAME.to_string();
        }
        config.system_prompt = config
            .system_prompt
            .map(|prompt| prompt.trim().to_string())
            .filter(|prompt| !prompt.is_empty());

        Ok(config)
    }
}

impl ClientConfig {
    /// Get the environment variables to set for the subprocess.
    ///
    /// Allowlisted parent variables come first (when inheriting), then the
    /// agent directory if nothing provides one, then explicit values.
    pub(crate) fn build_env(&self) -> Result<HashMap<String, String>> {
        let mut env = if self.inherit_env {
            filter_inherited(std::env::vars())
        } else {
            HashMap::new()
        };

        if let Some(ref dir) = self.agent_dir {
            env.insert(ENV_AGENT_DIR.to_string(), dir.display().to_string());
        }

        for (key, value) in &self.env_vars {
            let key = key.trim();
            if !key.is_empty() {
                env.insert(key.to_string(), value.clone());
            }
        }

        let has_agent_dir = env
            .get(ENV_AGENT_DIR)
            .is_some_and(|dir| !dir.trim().is_empty());
        if !has_agent_dir {
            let dir = resolve_agent_dir(&self.app_name)?;
            env.insert(ENV_AGENT_DIR.to_string(), dir.display().to_string());
        }

        Ok(env)
    }

    /// Get the CLI path, or default to "pi".
    pub(crate) fn cli_command(&self) -> &str {
        self.cli_path
            .as_ref()
            .and_then(|p| p.to_str())
            .unwrap_or("pi")
    }

    /// Arguments after the executable: RPC mode, model selection, session,
    /// system prompt, then any extra arguments.
    pub(crate) fn cli_args(&self) -> Result<Vec<String>> {
        let selection = self.mode.resolve()?;
        let mut args = vec![
            "--mode".to_string(),
            "rpc".to_string(),
            "--provider".to_string(),
            selection.provider,
            "--model".to_string(),
            selection.model,
            "--thinking".to_string(),
            selection.thinking,
        ];
        args.extend(self.session.args());
        if let Some(ref prompt) = self.system_prompt {
            args.push("--system-prompt".to_string());
            args.push(prompt.clone());
        }
        args.extend(self.extra_args.iter().cloned());
        Ok(args)
    }
}

fn filter_inherited(vars: impl IntoIterator<Item = (String, String)>) -> HashMap<String, String> {
    vars.into_iter()
        .filter(|(key, _)| {
            DEFAULT_ENV_ALLOWLIST.contains(&key.as_str())
                || DEFAULT_ENV_ALLOW_PREFIXES
                    .iter()
                    .any(|prefix| key.starts_with(prefix))
        })
        .collect()
}

/// `~/.<app_name>/pi-agent`, created with owner-only permissions.
fn resolve_agent_dir(app_name: &str) -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::InvalidConfig("cannot resolve home directory".into()))?;
    let name = app_name.trim().trim_start_matches('.');
    let dir = home.join(format!(".{name}")).join("pi-agent");
    std::fs::create_dir_all(&dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
    }

    Ok(dir)
}
