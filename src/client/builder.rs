use std::path::PathBuf;
use std::time::Duration;

use super::Client;
use crate::config::{ClientConfig, ClientConfigBuilder, Mode, SessionMode};
use crate::Result;

/// Builder for creating a [`Client`].
///
/// Use [`Client::builder()`] to create a new builder.
///
/// # Example
///
/// ```ignore
/// use libpi::{Client, Mode, SessionMode};
///
/// let client = Client::builder()
///     .mode(Mode::Fast)
///     .session(SessionMode::named("review"))
///     .working_directory("/path/to/project")
///     .start()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    inner: ClientConfigBuilder,
}

impl ClientBuilder {
    /// Create a new client builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration without starting anything.
    pub fn build_config(self) -> Result<ClientConfig> {
        self.inner.build()
    }

    /// Validate the configuration and start pi.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid (blank custom mode field, zero timeout,
    ///   missing working directory)
    /// - The pi CLI cannot be found or started
    pub fn start(self) -> Result<Client> {
        let config = self.build_config()?;
        Client::start(config)
    }

    // -------------------------------------------------------------------------
    // Launch options (delegated to ClientConfigBuilder)
    // -------------------------------------------------------------------------

    /// Path or name of the pi executable.
    pub fn cli_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.inner = self.inner.cli_path(path);
        self
    }

    /// Name used for the default agent directory, `~/.<app_name>/pi-agent`.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.inner = self.inner.app_name(name);
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.inner = self.inner.mode(mode);
        self
    }

    pub fn session(mut self, session: SessionMode) -> Self {
        self.inner = self.inner.session(session);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.inner = self.inner.system_prompt(prompt);
        self
    }

    /// Append an extra CLI argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.inner = self.inner.arg(arg);
        self
    }

    pub fn working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.inner = self.inner.working_directory(path);
        self
    }

    pub fn agent_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.inner = self.inner.agent_dir(path);
        self
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner = self.inner.env(key, value);
        self
    }

    /// Pass the allowlisted parent environment through to the child.
    pub fn inherit_env(mut self, inherit: bool) -> Self {
        self.inner = self.inner.inherit_env(inherit);
        self
    }

    // -------------------------------------------------------------------------
    // Timeouts
    // -------------------------------------------------------------------------

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.inner = self.inner.request_timeout(timeout);
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.inner = self.inner.shutdown_grace(grace);
        self
    }

    pub fn abort_timeout(mut self, timeout: Duration) -> Self {
        self.inner = self.inner.abort_timeout(timeout);
        self
    }

    pub fn dispatch_drain_timeout(mut self, timeout: Duration) -> Self {
        self.inner = self.inner.dispatch_drain_timeout(timeout);
        self
    }
}
