//! Compiles descriptors into registration payloads and compares them with
//! what Discord already has registered.

use twilight_model::{
    application::{
        command::{
            Command, CommandOption as RegisteredOption, CommandOptionChoiceValue,
            CommandOptionType, CommandOptionValue as BoundValue, CommandType,
        },
        interaction::InteractionContextType,
    },
    channel::ChannelType,
    guild::Permissions,
    oauth::ApplicationIntegrationType,
};
use twilight_util::builder::command::{CommandBuilder, SubCommandBuilder, SubCommandGroupBuilder};

use crate::{arguments::OptionDescriptor, commands::CommandDescriptor};

impl From<&OptionDescriptor> for RegisteredOption {
    fn from(option: &OptionDescriptor) -> Self {
        RegisteredOption {
            autocomplete: option.autocomplete().then_some(true),
            channel_types: option.channel_types(),
            choices: (!option.choices().is_empty()).then(|| option.choices().to_vec()),
            name: option.name().to_string(),
            description: option.description().to_string(),
            kind: option.kind().code(),
            max_length: option.max_length(),
            max_value: option.max_value(),
            min_length: option.min_length(),
            min_value: option.min_value(),
            required: Some(option.required()),
            description_localizations: None,
            name_localizations: None,
            options: None,
        }
    }
}

/// Starts a top-level payload, carrying the fields only root commands have.
fn root(descriptor: &CommandDescriptor, kind: CommandType) -> CommandBuilder {
    let mut command = CommandBuilder::new(descriptor.name(), descriptor.description(), kind);
    if let Some(permissions) = descriptor.default_member_permissions() {
        command = command.default_member_permissions(permissions);
    }
    if let Some(contexts) = descriptor.contexts() {
        command = command.contexts(contexts.to_vec());
    }
    if let Some(integration_types) = descriptor.integration_types() {
        command = command.integration_types(integration_types.to_vec());
    }
    command
}

/// The registration payload of a standalone command.
pub fn to_payload(descriptor: &CommandDescriptor) -> Command {
    let mut command = root(descriptor, descriptor.kind().command_type());
    for option in descriptor.options() {
        command = command.option(RegisteredOption::from(option));
    }
    command.build()
}

/// The payload as JSON, as it would be sent to Discord.
pub fn to_json(descriptor: &CommandDescriptor) -> serde_json::Result<serde_json::Value> {
    serde_json::to_value(to_payload(descriptor))
}

pub(crate) fn subcommand(descriptor: &CommandDescriptor) -> SubCommandBuilder {
    let mut subcommand = SubCommandBuilder::new(descriptor.name(), descriptor.description());
    for option in descriptor.options() {
        subcommand = subcommand.option(RegisteredOption::from(option));
    }
    subcommand
}

pub(crate) fn subcommand_group(
    name: &str,
    description: &str,
    members: Vec<SubCommandBuilder>,
) -> RegisteredOption {
    SubCommandGroupBuilder::new(name, description)
        .subcommands(members)
        .build()
}

/// The payload of a parent command whose options are its sub-commands and
/// sub-command groups, in registration order.
pub fn group_payload(
    group: &CommandDescriptor,
    members: impl IntoIterator<Item = RegisteredOption>,
) -> Command {
    let mut command = root(group, CommandType::ChatInput);
    for member in members {
        command = command.option(member);
    }
    command.build()
}

/// Whether `existing` differs from the payload `descriptor` compiles to.
pub fn diff(existing: &Command, descriptor: &CommandDescriptor) -> bool {
    needs_update(existing, &to_payload(descriptor))
}

/// Compares two payloads by the fields we declare, ignoring ids and other
/// values Discord assigns. Option order is significant.
pub fn needs_update(existing: &Command, desired: &Command) -> bool {
    CommandShape::of(existing) != CommandShape::of(desired)
}

/// Discord fills in guild installs when a command declares no integration
/// types.
const DEFAULT_INTEGRATION_TYPES: &[ApplicationIntegrationType] =
    &[ApplicationIntegrationType::GuildInstall];

#[derive(Debug, PartialEq)]
struct CommandShape<'a> {
    name: &'a str,
    kind: CommandType,
    description: &'a str,
    default_member_permissions: Option<Permissions>,
    contexts: Option<&'a [InteractionContextType]>,
    integration_types: &'a [ApplicationIntegrationType],
    options: Vec<OptionShape<'a>>,
}

impl<'a> CommandShape<'a> {
    fn of(command: &'a Command) -> Self {
        Self {
            name: &command.name,
            kind: command.kind,
            description: &command.description,
            default_member_permissions: command.default_member_permissions,
            contexts: command.contexts.as_deref(),
            integration_types: command
                .integration_types
                .as_deref()
                .unwrap_or(DEFAULT_INTEGRATION_TYPES),
            options: command.options.iter().map(OptionShape::of).collect(),
        }
    }
}

#[derive(Debug, PartialEq)]
struct OptionShape<'a> {
    name: &'a str,
    description: &'a str,
    kind: CommandOptionType,
    required: bool,
    autocomplete: bool,
    choices: Vec<(&'a str, &'a CommandOptionChoiceValue)>,
    min_value: Option<&'a BoundValue>,
    max_value: Option<&'a BoundValue>,
    min_length: Option<u16>,
    max_length: Option<u16>,
    channel_types: &'a [ChannelType],
    options: Vec<OptionShape<'a>>,
}

impl<'a> OptionShape<'a> {
    fn of(option: &'a RegisteredOption) -> Self {
        Self {
            name: &option.name,
            description: &option.description,
            kind: option.kind,
            required: option.required.unwrap_or(false),
            autocomplete: option.autocomplete.unwrap_or(false),
            choices: option
                .choices
                .iter()
                .flatten()
                .map(|choice| (choice.name.as_str(), &choice.value))
                .collect(),
            min_value: option.min_value.as_ref(),
            max_value: option.max_value.as_ref(),
            min_length: option.min_length,
            max_length: option.max_length,
            channel_types: option.channel_types.as_deref().unwrap_or_default(),
            options: option.options.iter().flatten().map(OptionShape::of).collect(),
        }
    }
}
