//! One method per RPC command.
//!
//! Each method encodes its request, sends it and decodes the response data.
//! None of them wait for the agent to finish a turn; see
//! [`Client::run`](super::Client::run) for that.

use super::Client;
use crate::protocol::commands::{self, CommandsData, NewSessionData};
use crate::protocol::{CompactResult, PromptRequest, SessionState, SlashCommand};
use crate::{Context, Error, Result};

impl Client {
    /// Start a turn. Returns once the agent accepted the prompt.
    pub async fn prompt(&self, ctx: &Context, request: impl Into<PromptRequest>) -> Result<()> {
        let command = commands::prompt(&request.into())?;
        self.send(ctx, command).await.map(drop)
    }

    /// Interrupt the running turn with a new message.
    pub async fn steer(&self, ctx: &Context, request: impl Into<PromptRequest>) -> Result<()> {
        let command = commands::steer(&request.into())?;
        self.send(ctx, command).await.map(drop)
    }

    /// Queue a message to run after the current turn.
    pub async fn follow_up(&self, ctx: &Context, request: impl Into<PromptRequest>) -> Result<()> {
        let command = commands::follow_up(&request.into())?;
        self.send(ctx, command).await.map(drop)
    }

    /// Abort the running turn.
    pub async fn abort(&self, ctx: &Context) -> Result<()> {
        self.send(ctx, commands::abort()).await.map(drop)
    }

    pub async fn get_state(&self, ctx: &Context) -> Result<SessionState> {
        let response = self.send(ctx, commands::get_state()).await?;
        let data = response
            .data
            .as_ref()
            .filter(|data| !data.is_null())
            .ok_or_else(|| Error::protocol("get_state missing response data"))?;
        SessionState::from_data(data)
    }

    /// Start a new session, optionally forked from `parent_session`.
    ///
    /// Returns true if an extension cancelled the switch.
    pub async fn new_session(&self, ctx: &Context, parent_session: Option<&str>) -> Result<bool> {
        let response = self.send(ctx, commands::new_session(parent_session)).await?;
        let data: NewSessionData = response.decode_data()?;
        Ok(data.cancelled)
    }

    /// Summarize the conversation to free context.
    pub async fn compact(
        &self,
        ctx: &Context,
        custom_instructions: Option<&str>,
    ) -> Result<CompactResult> {
        let response = self
            .send(ctx, commands::compact(custom_instructions))
            .await?;
        response.decode_data()
    }

    /// List the slash commands the agent knows.
    pub async fn get_commands(&self, ctx: &Context) -> Result<Vec<SlashCommand>> {
        let response = self.send(ctx, commands::get_commands()).await?;
        let data: CommandsData = response.decode_data()?;
        Ok(data.commands)
    }
}
