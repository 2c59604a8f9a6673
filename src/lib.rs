//! Declarative Discord application commands on top of twilight.
//!
//! Commands are declared with [`commands::CommandBuilder`] or
//! `#[derive(Command)]`, validated into a [`commands::CommandDescriptor`],
//! compiled into registration payloads by [`payload`], and bound out of
//! incoming interactions by [`binder`].

pub mod arguments;
pub mod autocomplete;
pub mod binder;
pub mod commands;
pub mod config;
pub mod error;
pub mod payload;

#[cfg(feature = "executor")]
pub mod executor;

#[cfg(feature = "argument_converters")]
pub mod argument_converters;

pub use error::{Error, Result};

// Re-export macros
pub use twilight_app_commands_derive::{Choices, Command};

// Generated code refers to these.
#[doc(hidden)]
pub use twilight_model;
