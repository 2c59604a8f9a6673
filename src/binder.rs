use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use async_trait::async_trait;
use twilight_model::{
    application::interaction::{
        InteractionChannel, InteractionDataResolved, InteractionMember,
        application_command::{CommandData, CommandDataOption, CommandOptionValue},
    },
    channel::Message,
    guild::Role,
    id::{
        Id,
        marker::{ChannelMarker, MessageMarker, RoleMarker, UserMarker},
    },
    user::User,
};

use crate::{
    arguments::{ArgumentValue, OptionalArgumentConverter, RawArgument},
    commands::{CommandDescriptor, CommandKind},
    error::{Error, Result},
};

/// A platform identifier that must be resolved into a concrete entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reference {
    User(Id<UserMarker>),
    Channel(Id<ChannelMarker>),
    Role(Id<RoleMarker>),
    Message(Id<MessageMarker>),
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::User(id) => write!(f, "user {id}"),
            Reference::Channel(id) => write!(f, "channel {id}"),
            Reference::Role(id) => write!(f, "role {id}"),
            Reference::Message(id) => write!(f, "message {id}"),
        }
    }
}

/// A user argument, with guild member data when invoked inside a guild.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUser {
    pub user: User,
    pub member: Option<InteractionMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    User(ResolvedUser),
    Channel(InteractionChannel),
    Role(Role),
    Message(Box<Message>),
}

/// Resolves platform identifiers into entities, typically from a cache.
#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    async fn resolve(&self, reference: Reference) -> Option<Resolved>;
}

/// Resolves references from the `resolved` data Discord ships with every
/// command interaction, deferring to `fallback` for anything missing.
pub struct PayloadResolver<'a> {
    resolved: Option<&'a InteractionDataResolved>,
    fallback: Option<&'a dyn ReferenceResolver>,
}

impl<'a> PayloadResolver<'a> {
    pub fn new(resolved: Option<&'a InteractionDataResolved>) -> Self {
        Self {
            resolved,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: &'a dyn ReferenceResolver) -> Self {
        self.fallback = Some(fallback);
        self
    }

    fn lookup(&self, reference: Reference) -> Option<Resolved> {
        let resolved = self.resolved?;
        match reference {
            Reference::User(id) => resolved.users.get(&id).map(|user| {
                Resolved::User(ResolvedUser {
                    user: user.clone(),
                    member: resolved.members.get(&id).cloned(),
                })
            }),
            Reference::Channel(id) => resolved.channels.get(&id).cloned().map(Resolved::Channel),
            Reference::Role(id) => resolved.roles.get(&id).cloned().map(Resolved::Role),
            Reference::Message(id) => resolved
                .messages
                .get(&id)
                .cloned()
                .map(|message| Resolved::Message(Box::new(message))),
        }
    }
}

#[async_trait]
impl<'a> ReferenceResolver for PayloadResolver<'a> {
    async fn resolve(&self, reference: Reference) -> Option<Resolved> {
        if let Some(found) = self.lookup(reference) {
            return Some(found);
        }
        match self.fallback {
            Some(fallback) => fallback.resolve(reference).await,
            None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinderState {
    Received,
    TypeValidating,
    ReferenceResolving,
    DefaultApplying,
    Bound,
    Rejected,
}

/// Arguments of one interaction, validated, resolved and in declaration
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArguments {
    values: Vec<(String, ArgumentValue)>,
}

impl BoundArguments {
    pub fn get(&self, name: &str) -> Option<&ArgumentValue> {
        self.values
            .iter()
            .find(|(option, _)| option == name)
            .map(|(_, value)| value)
    }

    /// Removes the named argument and converts it into `T`.
    pub fn take<T: OptionalArgumentConverter>(&mut self, name: &str) -> Result<T> {
        let value = self
            .values
            .iter()
            .position(|(option, _)| option == name)
            .map(|index| self.values.remove(index).1);
        T::convert(name, value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgumentValue)> {
        self.values
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, ArgumentValue)> for BoundArguments {
    fn from_iter<I: IntoIterator<Item = (String, ArgumentValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Turns the raw options of one interaction into [`BoundArguments`].
///
/// A binder is single-use. Nothing observable happens until [`bind`]
/// returns, so dropping the future midway leaves no partial state behind.
///
/// [`bind`]: Binder::bind
#[derive(Debug)]
pub struct Binder<'a> {
    descriptor: &'a CommandDescriptor,
    state: BinderState,
}

impl<'a> Binder<'a> {
    pub fn new(descriptor: &'a CommandDescriptor) -> Self {
        Self {
            descriptor,
            state: BinderState::Received,
        }
    }

    pub fn state(&self) -> BinderState {
        self.state
    }

    pub async fn bind(
        &mut self,
        options: &[CommandDataOption],
        resolver: &dyn ReferenceResolver,
    ) -> Result<BoundArguments> {
        match self.run(options, resolver).await {
            Ok(arguments) => {
                self.transition(BinderState::Bound);
                Ok(arguments)
            }
            Err(err) => {
                self.transition(BinderState::Rejected);
                Err(err)
            }
        }
    }

    fn transition(&mut self, next: BinderState) {
        tracing::trace!(
            command = self.descriptor.name(),
            from = ?self.state,
            to = ?next,
            "binder transition"
        );
        self.state = next;
    }

    async fn run(
        &mut self,
        options: &[CommandDataOption],
        resolver: &dyn ReferenceResolver,
    ) -> Result<BoundArguments> {
        let descriptor = self.descriptor;

        let mut received = Vec::with_capacity(options.len());
        let mut seen = HashSet::with_capacity(options.len());
        for option in options {
            let declared = descriptor
                .option(&option.name)
                .ok_or_else(|| Error::UnknownOption(option.name.clone()))?;
            if !seen.insert(declared.name()) {
                return Err(Error::MalformedInteraction(format!(
                    "option `{}` was supplied twice",
                    option.name
                )));
            }
            received.push((declared, &option.value));
        }

        self.transition(BinderState::TypeValidating);
        let mut validated = Vec::with_capacity(received.len());
        for (declared, value) in received {
            let name = declared.name();
            validated.push((name, declared.validator().validate(name, value)?));
        }

        self.transition(BinderState::ReferenceResolving);
        let mut values = HashMap::with_capacity(validated.len());
        for (name, raw) in validated {
            let value = match raw {
                RawArgument::Value(value) => value,
                RawArgument::Reference(reference) => {
                    let resolved = resolver.resolve(reference).await;
                    into_argument(name, reference, resolved)?
                }
            };
            values.insert(name, value);
        }

        self.transition(BinderState::DefaultApplying);
        let mut bound = Vec::with_capacity(descriptor.options().len());
        for declared in descriptor.options() {
            match values.remove(declared.name()) {
                Some(value) => bound.push((declared.name().to_string(), value)),
                None if declared.required() => {
                    return Err(Error::MalformedInteraction(format!(
                        "required option `{}` was not supplied",
                        declared.name()
                    )));
                }
                None => {
                    if let Some(default) = declared.default_value() {
                        bound.push((
                            declared.name().to_string(),
                            default.to_argument(declared.kind()),
                        ));
                    }
                }
            }
        }

        Ok(BoundArguments { values: bound })
    }
}

fn into_argument(
    option: &str,
    reference: Reference,
    resolved: Option<Resolved>,
) -> Result<ArgumentValue> {
    match (reference, resolved) {
        (Reference::User(_), Some(Resolved::User(user))) => Ok(ArgumentValue::User(Box::new(user))),
        (Reference::Channel(_), Some(Resolved::Channel(channel))) => {
            Ok(ArgumentValue::Channel(Box::new(channel)))
        }
        (Reference::Role(_), Some(Resolved::Role(role))) => Ok(ArgumentValue::Role(Box::new(role))),
        _ => Err(Error::Resolution {
            option: option.to_string(),
            reference,
        }),
    }
}

/// Binds `options` against `descriptor` in one call.
pub async fn bind(
    descriptor: &CommandDescriptor,
    options: &[CommandDataOption],
    resolver: &dyn ReferenceResolver,
) -> Result<BoundArguments> {
    Binder::new(descriptor).bind(options, resolver).await
}

/// Follows nested sub-command options down to the invoked leaf, returning
/// the sub-command path and the leaf's own options.
pub fn leaf_options(options: &[CommandDataOption]) -> (Vec<&str>, &[CommandDataOption]) {
    let mut path = Vec::new();
    let mut current = options;
    while let [option] = current {
        match &option.value {
            CommandOptionValue::SubCommand(inner) | CommandOptionValue::SubCommandGroup(inner) => {
                path.push(option.name.as_str());
                current = inner;
            }
            _ => break,
        }
    }
    (path, current)
}

/// The entity a context-menu command was invoked on.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextTarget {
    User(Box<ResolvedUser>),
    Message(Box<Message>),
}

/// Converts a context-menu target into the field of a
/// [`ContextCommand`](crate::commands::ContextCommand).
pub trait FromTarget: Sized {
    fn from_target(target: ContextTarget) -> Result<Self>;
}

impl FromTarget for ContextTarget {
    fn from_target(target: ContextTarget) -> Result<Self> {
        Ok(target)
    }
}

impl FromTarget for ResolvedUser {
    fn from_target(target: ContextTarget) -> Result<Self> {
        match target {
            ContextTarget::User(user) => Ok(*user),
            ContextTarget::Message(_) => Err(Error::mismatch(
                "target",
                "expected a user, received a message",
            )),
        }
    }
}

impl FromTarget for User {
    fn from_target(target: ContextTarget) -> Result<Self> {
        ResolvedUser::from_target(target).map(|resolved| resolved.user)
    }
}

impl FromTarget for Message {
    fn from_target(target: ContextTarget) -> Result<Self> {
        match target {
            ContextTarget::Message(message) => Ok(*message),
            ContextTarget::User(_) => Err(Error::mismatch(
                "target",
                "expected a message, received a user",
            )),
        }
    }
}

/// Resolves the target of a context-menu invocation.
pub async fn bind_target(
    descriptor: &CommandDescriptor,
    data: &CommandData,
    resolver: &dyn ReferenceResolver,
) -> Result<ContextTarget> {
    let target = data.target_id.ok_or_else(|| {
        Error::MalformedInteraction("context menu interaction carries no target".to_string())
    })?;
    let reference = match descriptor.kind() {
        CommandKind::User => Reference::User(target.cast()),
        CommandKind::Message => Reference::Message(target.cast()),
        CommandKind::Slash => {
            return Err(Error::MalformedInteraction(format!(
                "`{}` is not a context menu command",
                descriptor.name()
            )));
        }
    };

    match (reference, resolver.resolve(reference).await) {
        (Reference::User(_), Some(Resolved::User(user))) => Ok(ContextTarget::User(Box::new(user))),
        (Reference::Message(_), Some(Resolved::Message(message))) => {
            Ok(ContextTarget::Message(message))
        }
        _ => Err(Error::Resolution {
            option: "target".to_string(),
            reference,
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use twilight_model::application::command::{CommandOptionChoiceValue, CommandOptionType};

    use super::*;
    use crate::{arguments::CommandOption, commands::CommandBuilder};

    fn options(value: serde_json::Value) -> Vec<CommandDataOption> {
        serde_json::from_value(value).unwrap()
    }

    fn resolved(value: serde_json::Value) -> InteractionDataResolved {
        serde_json::from_value(value).unwrap()
    }

    fn foo() -> CommandDescriptor {
        CommandBuilder::slash("foo")
            .description("Says something")
            .option(CommandOption::new(CommandOptionType::String).name("arg"))
            .option(
                CommandOption::new(CommandOptionType::String)
                    .name("arg2")
                    .default("fallback"),
            )
            .option(
                CommandOption::new(CommandOptionType::String)
                    .name("letter")
                    .required(false)
                    .choice("A", CommandOptionChoiceValue::String("A".to_string()))
                    .choice("B", CommandOptionChoiceValue::String("B".to_string())),
            )
            .option(
                CommandOption::new(CommandOptionType::User)
                    .name("who")
                    .required(false),
            )
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn binds_required_string() {
        let descriptor = foo();
        let options = options(json!([{ "name": "arg", "type": 3, "value": "hello" }]));

        let mut arguments = bind(&descriptor, &options, &PayloadResolver::new(None))
            .await
            .unwrap();

        let arg: String = arguments.take("arg").unwrap();
        assert_eq!(arg, "hello");
    }

    #[tokio::test]
    async fn omitted_optional_receives_default() {
        let descriptor = foo();
        let options = options(json!([{ "name": "arg", "type": 3, "value": "hello" }]));

        let mut arguments = bind(&descriptor, &options, &PayloadResolver::new(None))
            .await
            .unwrap();

        let arg2: String = arguments.take("arg2").unwrap();
        assert_eq!(arg2, "fallback");
        let letter: Option<String> = arguments.take("letter").unwrap();
        assert_eq!(letter, None);
    }

    #[tokio::test]
    async fn arguments_follow_declaration_order() {
        let descriptor = foo();
        let options = options(json!([
            { "name": "letter", "type": 3, "value": "A" },
            { "name": "arg", "type": 3, "value": "hello" }
        ]));

        let arguments = bind(&descriptor, &options, &PayloadResolver::new(None))
            .await
            .unwrap();

        let names = arguments.iter().map(|(name, _)| name).collect::<Vec<_>>();
        assert_eq!(names, ["arg", "arg2", "letter"]);
    }

    #[tokio::test]
    async fn undeclared_choice_is_a_type_mismatch() {
        let descriptor = foo();
        let options = options(json!([
            { "name": "arg", "type": 3, "value": "hello" },
            { "name": "letter", "type": 3, "value": "C" }
        ]));

        let mut binder = Binder::new(&descriptor);
        let err = binder
            .bind(&options, &PayloadResolver::new(None))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::TypeMismatch { ref option, .. } if option == "letter"));
        assert_eq!(binder.state(), BinderState::Rejected);
    }

    #[tokio::test]
    async fn unknown_option_is_rejected() {
        let descriptor = foo();
        let options = options(json!([
            { "name": "arg", "type": 3, "value": "hello" },
            { "name": "mystery", "type": 3, "value": "?" }
        ]));

        let err = bind(&descriptor, &options, &PayloadResolver::new(None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownOption(ref name) if name == "mystery"));
    }

    #[tokio::test]
    async fn missing_required_option_is_malformed() {
        let descriptor = foo();
        let err = bind(&descriptor, &[], &PayloadResolver::new(None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedInteraction(_)));
    }

    #[tokio::test]
    async fn resolves_users_from_payload() {
        let descriptor = foo();
        let options = options(json!([
            { "name": "arg", "type": 3, "value": "hello" },
            { "name": "who", "type": 6, "value": "100" }
        ]));
        let resolved = resolved(json!({
            "users": {
                "100": { "id": "100", "username": "ferris", "discriminator": "0", "avatar": null }
            }
        }));

        let mut binder = Binder::new(&descriptor);
        let mut arguments = binder
            .bind(&options, &PayloadResolver::new(Some(&resolved)))
            .await
            .unwrap();

        assert_eq!(binder.state(), BinderState::Bound);
        let who: ResolvedUser = arguments.take("who").unwrap();
        assert_eq!(who.user.name, "ferris");
        assert!(who.member.is_none());
    }

    #[tokio::test]
    async fn unresolvable_reference_is_reported() {
        let descriptor = foo();
        let options = options(json!([
            { "name": "arg", "type": 3, "value": "hello" },
            { "name": "who", "type": 6, "value": "100" }
        ]));

        let err = bind(&descriptor, &options, &PayloadResolver::new(None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Resolution { reference: Reference::User(id), .. } if id.get() == 100
        ));
    }

    struct StaticResolver(ResolvedUser);

    #[async_trait]
    impl ReferenceResolver for StaticResolver {
        async fn resolve(&self, reference: Reference) -> Option<Resolved> {
            match reference {
                Reference::User(id) if id == self.0.user.id => Some(Resolved::User(self.0.clone())),
                _ => None,
            }
        }
    }

    #[tokio::test]
    async fn falls_back_to_secondary_resolver() {
        let descriptor = foo();
        let options = options(json!([
            { "name": "arg", "type": 3, "value": "hello" },
            { "name": "who", "type": 6, "value": "7" }
        ]));
        let user: User = serde_json::from_value(json!({
            "id": "7", "username": "cached", "discriminator": "0", "avatar": null
        }))
        .unwrap();
        let fallback = StaticResolver(ResolvedUser { user, member: None });
        let empty = resolved(json!({}));

        let arguments = bind(
            &descriptor,
            &options,
            &PayloadResolver::new(Some(&empty)).with_fallback(&fallback),
        )
        .await
        .unwrap();

        assert!(matches!(
            arguments.get("who"),
            Some(ArgumentValue::User(user)) if user.user.name == "cached"
        ));
    }

    #[test]
    fn unwraps_sub_command_paths() {
        let options = options(json!([{
            "name": "roles",
            "type": 2,
            "options": [{
                "name": "add",
                "type": 1,
                "options": [{ "name": "arg", "type": 3, "value": "x" }]
            }]
        }]));

        let (path, leaf) = leaf_options(&options);
        assert_eq!(path, ["roles", "add"]);
        assert_eq!(leaf.len(), 1);
        assert_eq!(leaf[0].name, "arg");
    }

    #[test]
    fn targets_convert_by_kind() {
        let user: User = serde_json::from_value(json!({
            "id": "7", "username": "ferris", "discriminator": "0", "avatar": null
        }))
        .unwrap();
        let target = ContextTarget::User(Box::new(ResolvedUser { user, member: None }));

        assert_eq!(User::from_target(target.clone()).unwrap().name, "ferris");
        let err = Message::from_target(target).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { ref option, .. } if option == "target"));
    }
}
