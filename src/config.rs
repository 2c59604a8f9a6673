use serde::Deserialize;
use twilight_model::id::{Id, marker::GuildMarker};

/// What to do with commands Discord still has registered in a scope but
/// which are no longer declared there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleCommandPolicy {
    /// Leave them registered and log a warning.
    #[default]
    Keep,
    /// Unregister them.
    Delete,
}

/// Executor settings, deserializable from the host application's config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub stale_commands: StaleCommandPolicy,
    /// Guilds to visit during sync even if no declared command targets
    /// them anymore, so their stale registrations can be cleaned up.
    pub prune_guilds: Vec<Id<GuildMarker>>,
    pub ephemeral_errors: bool,
    pub error_accent_color: u32,
    /// Include the error message in responses to failed interactions.
    pub expose_error_details: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            stale_commands: StaleCommandPolicy::Keep,
            prune_guilds: Vec::new(),
            ephemeral_errors: true,
            error_accent_color: 0xAA0000,
            expose_error_details: true,
        }
    }
}
