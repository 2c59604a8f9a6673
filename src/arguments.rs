use std::collections::HashSet;

use twilight_model::{
    application::{
        command::{
            CommandOptionChoice, CommandOptionChoiceValue, CommandOptionType,
            CommandOptionValue as BoundValue,
        },
        interaction::{InteractionChannel, application_command::CommandOptionValue},
    },
    channel::ChannelType,
    guild::Role,
};

use crate::{
    binder::{Reference, ResolvedUser},
    error::{Error, Result},
};

/// Largest magnitude an integer or number option may carry. Discord clients
/// parse option values as doubles, so anything beyond 2^53 loses precision.
pub const NUMERIC_LIMIT: i64 = 1 << 53;

/// Maximum number of options, choices or autocomplete suggestions Discord
/// accepts for a single command or option.
pub const MAX_CHOICES: usize = 25;

pub(crate) const DEFAULT_DESCRIPTION: &str = "No description";

const MAX_STRING_LENGTH: u16 = 6000;

/// The closed set of argument types a command option can be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKind {
    String,
    Integer,
    Boolean,
    User,
    Channel,
    Role,
    Number,
}

/// Maps a declared platform option type onto a supported [`OptionKind`].
///
/// Mentionable and attachment options, as well as sub-command markers, are
/// rejected rather than coerced.
pub fn map_type(declared: CommandOptionType) -> Result<OptionKind> {
    match declared {
        CommandOptionType::String => Ok(OptionKind::String),
        CommandOptionType::Integer => Ok(OptionKind::Integer),
        CommandOptionType::Boolean => Ok(OptionKind::Boolean),
        CommandOptionType::User => Ok(OptionKind::User),
        CommandOptionType::Channel => Ok(OptionKind::Channel),
        CommandOptionType::Role => Ok(OptionKind::Role),
        CommandOptionType::Number => Ok(OptionKind::Number),
        other => Err(Error::UnsupportedType(other)),
    }
}

impl OptionKind {
    /// The numeric option type sent to Discord.
    pub fn code(self) -> CommandOptionType {
        match self {
            OptionKind::String => CommandOptionType::String,
            OptionKind::Integer => CommandOptionType::Integer,
            OptionKind::Boolean => CommandOptionType::Boolean,
            OptionKind::User => CommandOptionType::User,
            OptionKind::Channel => CommandOptionType::Channel,
            OptionKind::Role => CommandOptionType::Role,
            OptionKind::Number => CommandOptionType::Number,
        }
    }

    /// An unconstrained validator for this kind.
    pub fn validator(self) -> Validator {
        Validator {
            kind: self,
            choices: Vec::new(),
            min_value: None,
            max_value: None,
            min_length: None,
            max_length: None,
        }
    }

    pub fn is_reference(self) -> bool {
        matches!(self, OptionKind::User | OptionKind::Channel | OptionKind::Role)
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, OptionKind::Integer | OptionKind::Number)
    }

    pub(crate) fn supports_choices(self) -> bool {
        matches!(
            self,
            OptionKind::String | OptionKind::Integer | OptionKind::Number
        )
    }
}

/// A value that passed type validation but may still need resolving.
#[derive(Debug, Clone, PartialEq)]
pub enum RawArgument {
    Value(ArgumentValue),
    Reference(Reference),
}

/// Checks a raw interaction value against an option's declared constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct Validator {
    kind: OptionKind,
    choices: Vec<CommandOptionChoiceValue>,
    min_value: Option<f64>,
    max_value: Option<f64>,
    min_length: Option<u16>,
    max_length: Option<u16>,
}

impl Validator {
    pub fn validate(&self, option: &str, value: &CommandOptionValue) -> Result<RawArgument> {
        let raw = match (self.kind, value) {
            (OptionKind::String, CommandOptionValue::String(value)) => {
                let length = value.chars().count();
                if let Some(min) = self.min_length
                    && length < usize::from(min)
                {
                    return Err(Error::mismatch(
                        option,
                        format!("must be at least {min} characters"),
                    ));
                }
                if let Some(max) = self.max_length
                    && length > usize::from(max)
                {
                    return Err(Error::mismatch(
                        option,
                        format!("must be at most {max} characters"),
                    ));
                }
                RawArgument::Value(ArgumentValue::String(value.clone()))
            }
            (OptionKind::Integer, CommandOptionValue::Integer(value)) => {
                self.check_integer(option, *value)?;
                RawArgument::Value(ArgumentValue::Integer(*value))
            }
            (OptionKind::Number, CommandOptionValue::Number(value)) => {
                self.check_numeric(option, *value)?;
                RawArgument::Value(ArgumentValue::Number(*value))
            }
            (OptionKind::Number, CommandOptionValue::Integer(value)) => {
                self.check_integer(option, *value)?;
                RawArgument::Value(ArgumentValue::Number(*value as f64))
            }
            (OptionKind::Boolean, CommandOptionValue::Boolean(value)) => {
                RawArgument::Value(ArgumentValue::Boolean(*value))
            }
            (OptionKind::User, CommandOptionValue::User(id)) => {
                RawArgument::Reference(Reference::User(*id))
            }
            (OptionKind::Channel, CommandOptionValue::Channel(id)) => {
                RawArgument::Reference(Reference::Channel(*id))
            }
            (OptionKind::Role, CommandOptionValue::Role(id)) => {
                RawArgument::Reference(Reference::Role(*id))
            }
            (kind, other) => {
                return Err(Error::mismatch(
                    option,
                    format!("expected {kind:?}, received {:?}", other.kind()),
                ));
            }
        };

        if !self.choices.is_empty()
            && let RawArgument::Value(value) = &raw
            && !self.choices.iter().any(|choice| value.matches_choice(choice))
        {
            return Err(Error::mismatch(option, "value is not one of the declared choices"));
        }

        Ok(raw)
    }

    fn check_integer(&self, option: &str, value: i64) -> Result<()> {
        if !integer_within_limit(value) {
            return Err(Error::mismatch(option, "value is outside the representable range"));
        }
        // Integers within ±2^53 convert to f64 exactly.
        self.check_bounds(option, value as f64)
    }

    fn check_numeric(&self, option: &str, value: f64) -> Result<()> {
        if !within_limit(value) {
            return Err(Error::mismatch(option, "value is outside the representable range"));
        }
        self.check_bounds(option, value)
    }

    fn check_bounds(&self, option: &str, value: f64) -> Result<()> {
        if let Some(min) = self.min_value
            && value < min
        {
            return Err(Error::mismatch(option, format!("must be at least {min}")));
        }
        if let Some(max) = self.max_value
            && value > max
        {
            return Err(Error::mismatch(option, format!("must be at most {max}")));
        }
        Ok(())
    }
}

/// A scalar default applied when an optional argument is omitted.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Number(f64),
}

impl DefaultValue {
    fn fits(&self, kind: OptionKind) -> bool {
        matches!(
            (self, kind),
            (DefaultValue::String(_), OptionKind::String)
                | (DefaultValue::Integer(_), OptionKind::Integer)
                | (DefaultValue::Integer(_), OptionKind::Number)
                | (DefaultValue::Number(_), OptionKind::Number)
                | (DefaultValue::Boolean(_), OptionKind::Boolean)
        )
    }

    pub(crate) fn to_argument(&self, kind: OptionKind) -> ArgumentValue {
        match self {
            DefaultValue::String(value) => ArgumentValue::String(value.clone()),
            DefaultValue::Integer(value) if kind == OptionKind::Number => {
                ArgumentValue::Number(*value as f64)
            }
            DefaultValue::Integer(value) => ArgumentValue::Integer(*value),
            DefaultValue::Boolean(value) => ArgumentValue::Boolean(*value),
            DefaultValue::Number(value) => ArgumentValue::Number(*value),
        }
    }
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        DefaultValue::String(value.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(value: String) -> Self {
        DefaultValue::String(value)
    }
}

impl From<i32> for DefaultValue {
    fn from(value: i32) -> Self {
        DefaultValue::Integer(value.into())
    }
}

impl From<i64> for DefaultValue {
    fn from(value: i64) -> Self {
        DefaultValue::Integer(value)
    }
}

impl From<bool> for DefaultValue {
    fn from(value: bool) -> Self {
        DefaultValue::Boolean(value)
    }
}

impl From<f64> for DefaultValue {
    fn from(value: f64) -> Self {
        DefaultValue::Number(value)
    }
}

/// A validated and resolved argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Number(f64),
    User(Box<ResolvedUser>),
    Channel(Box<InteractionChannel>),
    Role(Box<Role>),
}

impl ArgumentValue {
    fn matches_choice(&self, choice: &CommandOptionChoiceValue) -> bool {
        match (self, choice) {
            (ArgumentValue::String(value), CommandOptionChoiceValue::String(choice)) => {
                value == choice
            }
            (ArgumentValue::Integer(value), CommandOptionChoiceValue::Integer(choice)) => {
                value == choice
            }
            (ArgumentValue::Number(value), CommandOptionChoiceValue::Number(choice)) => {
                value == choice
            }
            (ArgumentValue::Number(value), CommandOptionChoiceValue::Integer(choice)) => {
                *value == *choice as f64
            }
            _ => false,
        }
    }

    pub fn kind(&self) -> OptionKind {
        match self {
            ArgumentValue::String(_) => OptionKind::String,
            ArgumentValue::Integer(_) => OptionKind::Integer,
            ArgumentValue::Boolean(_) => OptionKind::Boolean,
            ArgumentValue::Number(_) => OptionKind::Number,
            ArgumentValue::User(_) => OptionKind::User,
            ArgumentValue::Channel(_) => OptionKind::Channel,
            ArgumentValue::Role(_) => OptionKind::Role,
        }
    }
}

/// A command option as declared, before validation.
#[derive(Debug, Clone)]
pub struct CommandOption {
    pub autocomplete: Option<bool>,
    pub channel_types: Option<Vec<ChannelType>>,
    pub choices: Option<Vec<CommandOptionChoice>>,
    pub default: Option<DefaultValue>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub kind: CommandOptionType,
    pub max_length: Option<u16>,
    pub max_value: Option<BoundValue>,
    pub min_length: Option<u16>,
    pub min_value: Option<BoundValue>,
    pub required: bool,
}

pub trait ToOption {
    fn to_option() -> CommandOption;
}

/// Converts a possibly-absent bound argument into a field value.
pub trait OptionalArgumentConverter: Sized {
    fn convert(option: &str, value: Option<ArgumentValue>) -> Result<Self>;
}

/// Converts a bound argument into a field value.
pub trait ArgumentConverter: Sized {
    fn convert(option: &str, value: ArgumentValue) -> Result<Self>;
}

impl<T: OptionalArgumentConverter> OptionalArgumentConverter for Option<T> {
    fn convert(option: &str, value: Option<ArgumentValue>) -> Result<Self> {
        match value {
            Some(_) => Ok(Some(<T as OptionalArgumentConverter>::convert(option, value)?)),
            None => Ok(None),
        }
    }
}

impl<T: ArgumentConverter> OptionalArgumentConverter for T {
    fn convert(option: &str, value: Option<ArgumentValue>) -> Result<Self> {
        if let Some(value) = value {
            <T as ArgumentConverter>::convert(option, value)
        } else {
            Err(Error::mismatch(option, "no value was supplied"))
        }
    }
}

impl CommandOption {
    pub fn new(kind: CommandOptionType) -> Self {
        CommandOption {
            autocomplete: None,
            channel_types: None,
            choices: None,
            default: None,
            name: None,
            description: None,
            kind,
            max_length: None,
            max_value: None,
            min_length: None,
            min_value: None,
            required: true,
        }
    }

    pub fn autocomplete(mut self, autocomplete: bool) -> Self {
        self.autocomplete = Some(autocomplete);
        self
    }

    pub fn channel_types(mut self, channel_types: Vec<ChannelType>) -> Self {
        self.channel_types = Some(channel_types);
        self
    }

    pub fn channel_type(mut self, channel_type: ChannelType) -> Self {
        match &mut self.channel_types {
            Some(types) => types.push(channel_type),
            None => self.channel_types = Some(vec![channel_type]),
        }
        self
    }

    pub fn choices(mut self, choices: Vec<CommandOptionChoice>) -> Self {
        self.choices = Some(choices);
        self
    }

    /// Adds a single choice whose display name and value are the same.
    pub fn choice(mut self, name: &str, value: CommandOptionChoiceValue) -> Self {
        let choice = CommandOptionChoice {
            name: name.to_string(),
            name_localizations: None,
            value,
        };
        match &mut self.choices {
            Some(choices) => choices.push(choice),
            None => self.choices = Some(vec![choice]),
        }
        self
    }

    /// Makes the option optional, falling back to `default` when omitted.
    pub fn default(mut self, default: impl Into<DefaultValue>) -> Self {
        self.default = Some(default.into());
        self.required = false;
        self
    }

    pub fn max_length(mut self, max_length: u16) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn max_value(mut self, max_value: BoundValue) -> Self {
        self.max_value = Some(max_value);
        self
    }

    pub fn min_length(mut self, min_length: u16) -> Self {
        self.min_length = Some(min_length);
        self
    }

    pub fn min_value(mut self, min_value: BoundValue) -> Self {
        self.min_value = Some(min_value);
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Validates the declaration into an immutable [`OptionDescriptor`].
    pub fn build(self, command: &str) -> Result<OptionDescriptor> {
        let kind = map_type(self.kind)?;
        let name = self
            .name
            .ok_or_else(|| Error::descriptor(command, "an option is missing its name"))?;
        let fail = |reason: String| Error::descriptor(command, format!("option `{name}` {reason}"));

        if !is_valid_slash_name(&name) {
            return Err(fail(
                "must be 1-32 lowercase letters, digits, `-` or `_`".to_string(),
            ));
        }

        let description = match self.description {
            Some(description) if description.trim().is_empty() => DEFAULT_DESCRIPTION.to_string(),
            Some(description) => description,
            None => DEFAULT_DESCRIPTION.to_string(),
        };
        if description.chars().count() > 100 {
            return Err(fail("has a description longer than 100 characters".to_string()));
        }

        let autocomplete = self.autocomplete.unwrap_or(false);
        let choices = self.choices.unwrap_or_default();

        if autocomplete && !choices.is_empty() {
            return Err(fail("cannot declare both choices and autocomplete".to_string()));
        }
        if autocomplete && !kind.supports_choices() {
            return Err(fail(format!("of type {kind:?} cannot be autocompleted")));
        }
        if !choices.is_empty() && !kind.supports_choices() {
            return Err(fail(format!("of type {kind:?} cannot declare choices")));
        }
        if choices.len() > MAX_CHOICES {
            return Err(fail(format!("declares more than {MAX_CHOICES} choices")));
        }

        let mut seen = HashSet::new();
        for choice in &choices {
            if choice.name.is_empty() || choice.name.chars().count() > 100 {
                return Err(fail(format!(
                    "has a choice named `{}` which is not 1-100 characters",
                    choice.name
                )));
            }
            if !seen.insert(choice.name.as_str()) {
                return Err(fail(format!("declares the choice `{}` twice", choice.name)));
            }
            check_choice(kind, &choice.value).map_err(fail)?;
        }

        if (self.min_value.is_some() || self.max_value.is_some()) && !kind.is_numeric() {
            return Err(fail("declares value bounds but is not numeric".to_string()));
        }
        for bound in [&self.min_value, &self.max_value].into_iter().flatten() {
            if !bound_within_limit(bound) {
                return Err(fail("declares a bound outside ±2^53".to_string()));
            }
        }
        let min_value = self.min_value.as_ref().map(bound_to_f64);
        let max_value = self.max_value.as_ref().map(bound_to_f64);
        if let (Some(min), Some(max)) = (min_value, max_value)
            && min > max
        {
            return Err(fail("has a minimum value greater than its maximum".to_string()));
        }
        if kind == OptionKind::Integer
            && matches!(
                (&self.min_value, &self.max_value),
                (Some(BoundValue::Number(_)), _) | (_, Some(BoundValue::Number(_)))
            )
        {
            return Err(fail("declares fractional bounds on an integer".to_string()));
        }

        if (self.min_length.is_some() || self.max_length.is_some()) && kind != OptionKind::String {
            return Err(fail("declares length bounds but is not a string".to_string()));
        }
        if let Some(max) = self.max_length
            && (max == 0 || max > MAX_STRING_LENGTH)
        {
            return Err(fail(format!("max_length must be 1-{MAX_STRING_LENGTH}")));
        }
        if let Some(min) = self.min_length
            && min > MAX_STRING_LENGTH
        {
            return Err(fail(format!("min_length must be at most {MAX_STRING_LENGTH}")));
        }
        if let (Some(min), Some(max)) = (self.min_length, self.max_length)
            && min > max
        {
            return Err(fail("has a min_length greater than its max_length".to_string()));
        }

        if self.channel_types.is_some() && kind != OptionKind::Channel {
            return Err(fail("declares channel types but is not a channel".to_string()));
        }

        if let Some(default) = &self.default {
            if self.required {
                return Err(fail("is required but declares a default".to_string()));
            }
            if kind.is_reference() {
                return Err(fail("is a reference and cannot declare a default".to_string()));
            }
            if !default.fits(kind) {
                return Err(fail(format!("declares a default that is not a {kind:?}")));
            }
            match default {
                DefaultValue::Integer(value) if !integer_within_limit(*value) => {
                    return Err(fail("declares a default outside ±2^53".to_string()));
                }
                DefaultValue::Number(value) if !within_limit(*value) => {
                    return Err(fail("declares a default outside ±2^53".to_string()));
                }
                _ => {}
            }
        }

        let validator = Validator {
            kind,
            choices: choices.iter().map(|choice| choice.value.clone()).collect(),
            min_value,
            max_value,
            min_length: self.min_length,
            max_length: self.max_length,
        };

        Ok(OptionDescriptor {
            name,
            description,
            kind,
            required: self.required,
            default: self.default,
            choices,
            autocomplete,
            min_value: self.min_value,
            max_value: self.max_value,
            min_length: self.min_length,
            max_length: self.max_length,
            channel_types: self.channel_types,
            validator,
        })
    }
}

fn check_choice(kind: OptionKind, value: &CommandOptionChoiceValue) -> Result<(), String> {
    match (kind, value) {
        (OptionKind::String, CommandOptionChoiceValue::String(value)) => {
            if value.is_empty() || value.chars().count() > 100 {
                Err(format!("has a choice value `{value}` which is not 1-100 characters"))
            } else {
                Ok(())
            }
        }
        (OptionKind::Integer | OptionKind::Number, CommandOptionChoiceValue::Integer(value)) => {
            if integer_within_limit(*value) {
                Ok(())
            } else {
                Err(format!("has a choice value {value} outside ±2^53"))
            }
        }
        (OptionKind::Number, CommandOptionChoiceValue::Number(value)) => {
            if within_limit(*value) {
                Ok(())
            } else {
                Err(format!("has a choice value {value} outside ±2^53"))
            }
        }
        (kind, value) => Err(format!("has a choice {value:?} that is not a {kind:?}")),
    }
}

fn bound_to_f64(bound: &BoundValue) -> f64 {
    match bound {
        BoundValue::Integer(value) => *value as f64,
        BoundValue::Number(value) => *value,
    }
}

fn bound_within_limit(bound: &BoundValue) -> bool {
    match bound {
        BoundValue::Integer(value) => integer_within_limit(*value),
        BoundValue::Number(value) => within_limit(*value),
    }
}

/// Compared as integers: 2^53 + 1 rounds to 2^53 as a double.
fn integer_within_limit(value: i64) -> bool {
    value.unsigned_abs() <= NUMERIC_LIMIT.unsigned_abs()
}

fn within_limit(value: f64) -> bool {
    value.is_finite() && value.abs() <= NUMERIC_LIMIT as f64
}

pub(crate) fn is_valid_slash_name(name: &str) -> bool {
    let length = name.chars().count();
    (1..=32).contains(&length)
        && name
            .chars()
            .all(|c| c == '-' || c == '_' || (c.is_alphanumeric() && !c.is_uppercase()))
}

/// A validated, immutable option of a slash command.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionDescriptor {
    name: String,
    description: String,
    kind: OptionKind,
    required: bool,
    default: Option<DefaultValue>,
    choices: Vec<CommandOptionChoice>,
    autocomplete: bool,
    min_value: Option<BoundValue>,
    max_value: Option<BoundValue>,
    min_length: Option<u16>,
    max_length: Option<u16>,
    channel_types: Option<Vec<ChannelType>>,
    validator: Validator,
}

impl OptionDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> OptionKind {
        self.kind
    }

    pub fn required(&self) -> bool {
        self.required
    }

    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    pub fn choices(&self) -> &[CommandOptionChoice] {
        &self.choices
    }

    pub fn autocomplete(&self) -> bool {
        self.autocomplete
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub(crate) fn min_value(&self) -> Option<BoundValue> {
        self.min_value.clone()
    }

    pub(crate) fn max_value(&self) -> Option<BoundValue> {
        self.max_value.clone()
    }

    pub(crate) fn min_length(&self) -> Option<u16> {
        self.min_length
    }

    pub(crate) fn max_length(&self) -> Option<u16> {
        self.max_length
    }

    pub(crate) fn channel_types(&self) -> Option<Vec<ChannelType>> {
        self.channel_types.clone()
    }
}

impl<T: ToOption> ToOption for Option<T> {
    fn to_option() -> CommandOption {
        T::to_option().required(false)
    }
}
