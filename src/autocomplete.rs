use serde::Serialize;
use twilight_model::{
    application::{
        command::{CommandOptionChoice, CommandOptionChoiceValue},
        interaction::application_command::{CommandDataOption, CommandOptionValue},
    },
    http::interaction::{InteractionResponse, InteractionResponseData, InteractionResponseType},
};

use crate::{
    arguments::MAX_CHOICES,
    commands::CommandDescriptor,
    error::{Error, Result},
};

/// A value the user has typed so far. Nothing is validated yet.
#[derive(Debug, Clone, PartialEq)]
pub enum PartialValue {
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    /// A user, channel or role snowflake.
    Id(u64),
}

/// An autocomplete interaction, reduced to what a handler needs.
#[derive(Debug, Clone, PartialEq)]
pub struct AutocompleteRequest {
    /// Name of the option being typed into.
    pub focused: String,
    /// The partial input of the focused option.
    pub input: String,
    /// Every other option filled in so far.
    pub values: Vec<(String, PartialValue)>,
}

impl AutocompleteRequest {
    /// Extracts the focused option and partial values from an
    /// autocomplete interaction's leaf options.
    pub fn from_options(options: &[CommandDataOption]) -> Result<Self> {
        let mut focused = None;
        let mut values = Vec::with_capacity(options.len());

        for option in options {
            let value = match &option.value {
                CommandOptionValue::Focused(input, _) => {
                    if focused.is_some() {
                        return Err(Error::MalformedInteraction(
                            "more than one option is focused".to_string(),
                        ));
                    }
                    focused = Some((option.name.clone(), input.clone()));
                    continue;
                }
                CommandOptionValue::String(value) => PartialValue::String(value.clone()),
                CommandOptionValue::Integer(value) => PartialValue::Integer(*value),
                CommandOptionValue::Number(value) => PartialValue::Number(*value),
                CommandOptionValue::Boolean(value) => PartialValue::Boolean(*value),
                CommandOptionValue::User(id) => PartialValue::Id(id.get()),
                CommandOptionValue::Channel(id) => PartialValue::Id(id.get()),
                CommandOptionValue::Role(id) => PartialValue::Id(id.get()),
                CommandOptionValue::Mentionable(id) => PartialValue::Id(id.get()),
                other => {
                    return Err(Error::MalformedInteraction(format!(
                        "option `{}` has unexpected type {:?}",
                        option.name,
                        other.kind()
                    )));
                }
            };
            values.push((option.name.clone(), value));
        }

        let (focused, input) = focused.ok_or_else(|| {
            Error::MalformedInteraction("autocomplete interaction has no focused option".to_string())
        })?;

        Ok(Self {
            focused,
            input,
            values,
        })
    }

    pub fn value(&self, name: &str) -> Option<&PartialValue> {
        self.values
            .iter()
            .find(|(option, _)| option == name)
            .map(|(_, value)| value)
    }
}

/// Suggestions shown to the user while they type an option.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AutoCompleteResponse {
    choices: Vec<CommandOptionChoice>,
}

impl AutoCompleteResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a suggestion, replacing the value of an existing one with the
    /// same name.
    pub fn add_option(mut self, name: &str, value: CommandOptionChoiceValue) -> Self {
        match self.choices.iter_mut().find(|choice| choice.name == name) {
            Some(choice) => choice.value = value,
            None => self.choices.push(CommandOptionChoice {
                name: name.to_string(),
                name_localizations: None,
                value,
            }),
        }
        self
    }

    pub fn add_string(self, name: &str, value: &str) -> Self {
        self.add_option(name, CommandOptionChoiceValue::String(value.to_string()))
    }

    pub fn add_integer(self, name: &str, value: i64) -> Self {
        self.add_option(name, CommandOptionChoiceValue::Integer(value))
    }

    pub fn add_number(self, name: &str, value: f64) -> Self {
        self.add_option(name, CommandOptionChoiceValue::Number(value))
    }

    pub fn remove_option(mut self, name: &str) -> Self {
        self.choices.retain(|choice| choice.name != name);
        self
    }

    pub fn choices(&self) -> &[CommandOptionChoice] {
        &self.choices
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    pub fn into_response(self) -> InteractionResponse {
        InteractionResponse {
            kind: InteractionResponseType::ApplicationCommandAutocompleteResult,
            data: Some(InteractionResponseData {
                choices: Some(self.choices),
                ..Default::default()
            }),
        }
    }
}

impl<S: Into<String>> FromIterator<(S, CommandOptionChoiceValue)> for AutoCompleteResponse {
    fn from_iter<I: IntoIterator<Item = (S, CommandOptionChoiceValue)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |response, (name, value)| {
                let name: String = name.into();
                response.add_option(&name, value)
            })
    }
}

/// Checks that the focused option of `request` is declared with
/// autocomplete on `descriptor`.
pub fn ensure_supported(request: &AutocompleteRequest, descriptor: &CommandDescriptor) -> Result<()> {
    match descriptor.option(&request.focused) {
        Some(option) if option.autocomplete() => Ok(()),
        _ => Err(Error::AutocompleteNotSupported {
            command: descriptor.path(),
            option: request.focused.clone(),
        }),
    }
}

/// Runs `handler` for `request` and keeps at most 25 of its suggestions.
pub async fn dispatch<F, Fut>(
    request: AutocompleteRequest,
    descriptor: &CommandDescriptor,
    handler: F,
) -> Result<AutoCompleteResponse>
where
    F: FnOnce(AutocompleteRequest) -> Fut,
    Fut: Future<Output = anyhow::Result<AutoCompleteResponse>>,
{
    ensure_supported(&request, descriptor)?;

    let mut response = handler(request).await.map_err(|source| Error::Callback {
        command: descriptor.path(),
        source,
    })?;

    if response.choices.len() > MAX_CHOICES {
        tracing::debug!(
            command = descriptor.name(),
            returned = response.choices.len(),
            "dropping autocomplete suggestions past the limit"
        );
        response.choices.truncate(MAX_CHOICES);
    }

    Ok(response)
}
