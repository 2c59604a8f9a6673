use async_trait::async_trait;
use twilight_model::id::{
    Id,
    marker::{GuildMarker, InteractionMarker, UserMarker},
};

use crate::error::Error;

/// Where an error happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Full path of the command, including sub-commands.
    pub command: String,
    pub interaction_id: Id<InteractionMarker>,
    pub guild_id: Option<Id<GuildMarker>>,
    pub user_id: Option<Id<UserMarker>>,
}

/// Receives every error the executor catches while handling an
/// interaction, exactly once, before the error response is built.
#[async_trait]
pub trait ErrorReporter: Send + Sync {
    async fn report(&self, context: &ErrorContext, error: &Error);
}

/// Logs binding errors at `info` and everything else at `error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

#[async_trait]
impl ErrorReporter for TracingReporter {
    async fn report(&self, context: &ErrorContext, error: &Error) {
        if error.is_binding() {
            tracing::info!(
                command = %context.command,
                interaction = %context.interaction_id,
                error = %error,
                "rejected interaction"
            );
        } else {
            tracing::error!(
                command = %context.command,
                interaction = %context.interaction_id,
                guild = ?context.guild_id,
                user = ?context.user_id,
                error = ?error,
                "command failed"
            );
        }
    }
}
