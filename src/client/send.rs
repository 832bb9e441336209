use tokio::sync::oneshot;

use super::Client;
use crate::error::PROCESS_DIED_MESSAGE;
use crate::protocol::{Command, Response};
use crate::{Context, Error, Result};

impl Client {
    /// Send one command and wait for its correlated response.
    ///
    /// The client assigns the request id. If `ctx` has no deadline, the
    /// configured request timeout applies.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] if the command has no `type`
    /// - the terminal error once the process died or the client closed
    /// - [`Error::Cancelled`] / [`Error::Timeout`] from `ctx`
    /// - [`Error::Rpc`] when the agent answers with `success: false`
    /// - [`Error::ProtocolViolation`] if the response slot vanished
    pub async fn send(&self, ctx: &Context, command: Command) -> Result<Response> {
        let kind = command.kind()?.trim().to_string();
        let ctx = ctx.or_timeout(self.shared.config.request_timeout);

        if let Some(err) = self.shared.registry.current_error() {
            return Err(err);
        }

        let id = self.shared.next_request_id();
        let frame = command.frame(&id)?;

        let (tx, rx) = oneshot::channel();
        self.shared.registry.register(id.clone(), tx)?;

        let written = {
            let mut writer = tokio::select! {
                writer = self.shared.writer.lock() => writer,
                err = ctx.done() => {
                    self.shared.registry.abandon(&id);
                    return Err(err);
                }
            };
            writer.write_frame(&frame).await
        };
        if let Err(source) = written {
            self.shared.registry.abandon(&id);
            if let Some(err) = self.shared.terminal_error() {
                return Err(err);
            }
            return Err(Error::Write {
                command: kind,
                source,
            });
        }
        tracing::debug!("sent {} request {}", kind, id);

        tokio::select! {
            biased;
            response = rx => match response {
                Ok(response) => check_response(response),
                Err(_) => Err(self.shared.terminal_error().unwrap_or_else(|| {
                    Error::protocol(format!("closed response channel for request {id}"))
                })),
            },
            err = ctx.done() => {
                self.shared.registry.abandon(&id);
                Err(err)
            }
            _ = self.shared.closed.cancelled() => {
                self.shared.registry.abandon(&id);
                Err(self.shared.terminal_error().unwrap_or(Error::ClientClosed))
            }
        }
    }
}

/// Turn an unsuccessful response into its error.
pub(crate) fn check_response(response: Response) -> Result<Response> {
    if response.success {
        return Ok(response);
    }
    Err(response_error(&response))
}

pub(crate) fn response_error(response: &Response) -> Error {
    let message = response.error_message();
    if message == PROCESS_DIED_MESSAGE {
        return Error::ProcessDied { cause: None };
    }
    Error::Rpc {
        request_id: response.id.clone(),
        command: response.command.clone(),
        message: message.to_string(),
    }
}
