use twilight_model::application::command::CommandOptionType;

use crate::binder::Reference;

/// Errors raised while declaring, registering or binding commands.
///
/// `Descriptor` and `UnsupportedType` surface synchronously to whoever
/// registers a command. The binding variants are caught by the executor,
/// reported and turned into a rejected interaction.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid declaration for command `{command}`: {reason}")]
    Descriptor { command: String, reason: String },
    #[error("option type {0:?} is not supported")]
    UnsupportedType(CommandOptionType),
    #[error("option `{option}` received an invalid value: {reason}")]
    TypeMismatch { option: String, reason: String },
    #[error("malformed interaction: {0}")]
    MalformedInteraction(String),
    #[error("interaction carried unknown option `{0}`")]
    UnknownOption(String),
    #[error("option `{option}` references {reference} which could not be resolved")]
    Resolution { option: String, reference: Reference },
    #[error("failed to register command `{command}`")]
    Registration {
        command: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("option `{option}` of command `{command}` does not support autocomplete")]
    AutocompleteNotSupported { command: String, option: String },
    #[error("command `{command}` failed")]
    Callback {
        command: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("the check for `{0}` failed")]
    CheckFailed(String),
    #[error("no command registered as `{0}`")]
    UnknownCommand(String),
}

impl Error {
    pub(crate) fn descriptor(command: &str, reason: impl Into<String>) -> Self {
        Error::Descriptor {
            command: command.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn mismatch(option: &str, reason: impl Into<String>) -> Self {
        Error::TypeMismatch {
            option: option.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error was produced while binding an interaction, as
    /// opposed to while declaring or registering a command.
    pub fn is_binding(&self) -> bool {
        matches!(
            self,
            Error::TypeMismatch { .. }
                | Error::MalformedInteraction(_)
                | Error::UnknownOption(_)
                | Error::Resolution { .. }
                | Error::CheckFailed(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
