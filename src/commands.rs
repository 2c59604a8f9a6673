use std::{
    any::TypeId,
    collections::{BTreeSet, HashMap, HashSet},
    fmt,
    sync::{Arc, LazyLock},
};

use async_trait::async_trait;
use parking_lot::RwLock;
use twilight_model::{
    application::{
        command::CommandType,
        interaction::{Interaction, InteractionContextType},
    },
    guild::Permissions,
    http::interaction::InteractionResponse,
    id::{Id, marker::GuildMarker},
    oauth::ApplicationIntegrationType,
};

use crate::{
    arguments::{
        CommandOption, DEFAULT_DESCRIPTION, MAX_CHOICES, OptionDescriptor, is_valid_slash_name,
    },
    binder::{BoundArguments, ContextTarget},
    error::{Error, Result},
};

/// Per-command hooks around an invocation. Every hook has a no-op default,
/// so `impl CommandHooks for Foo {}` is enough.
///
/// `#[derive(Command)]` writes that empty impl unless the command is marked
/// `#[command(manual_hooks)]`.
#[async_trait]
pub trait CommandHooks: Send + Sync + 'static + Sized {
    /// Runs before any argument is bound. Returning `false` rejects the
    /// interaction.
    async fn pre_check(_interaction: &Interaction) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Runs after binding and before the callback. Returning `false`
    /// rejects the interaction.
    async fn check(&self, _interaction: &Interaction) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Sees every error raised while handling this command, before the
    /// executor's reporter does. A returned response replaces the default
    /// error response.
    async fn on_error(_interaction: &Interaction, _error: &Error) -> Option<InteractionResponse> {
        None
    }
}

/// A slash command whose arguments are bound into `Self`.
///
/// Usually implemented through `#[derive(Command)]`.
pub trait Command: CommandHooks {
    /// Declares the command's name, scope and options.
    fn declare() -> CommandBuilder;

    /// Builds the command from arguments bound out of an interaction.
    fn from_arguments(arguments: BoundArguments) -> Result<Self>;

    /// The validated descriptor for this command, built once per type.
    fn descriptor() -> Result<Arc<CommandDescriptor>> {
        cached_descriptor::<Self>(Self::declare)
    }
}

/// A user or message context-menu command built from its target.
///
/// Implemented by `#[derive(Command)]` on structs marked
/// `#[command(user)]` or `#[command(message)]`.
pub trait ContextCommand: CommandHooks {
    fn declare() -> CommandBuilder;

    fn from_target(target: ContextTarget) -> Result<Self>;

    fn descriptor() -> Result<Arc<CommandDescriptor>> {
        cached_descriptor::<Self>(Self::declare)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Slash,
    User,
    Message,
}

impl CommandKind {
    pub fn command_type(self) -> CommandType {
        match self {
            CommandKind::Slash => CommandType::ChatInput,
            CommandKind::User => CommandType::User,
            CommandKind::Message => CommandType::Message,
        }
    }

    pub fn from_command_type(kind: CommandType) -> Option<Self> {
        match kind {
            CommandType::ChatInput => Some(CommandKind::Slash),
            CommandType::User => Some(CommandKind::User),
            CommandType::Message => Some(CommandKind::Message),
            _ => None,
        }
    }

    pub fn is_context_menu(self) -> bool {
        !matches!(self, CommandKind::Slash)
    }
}

/// Where a command is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Global,
    Guild(Id<GuildMarker>),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Guild(id) => write!(f, "guild {id}"),
        }
    }
}

/// Fluent declaration of an application command.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    name: String,
    kind: CommandKind,
    description: Option<String>,
    guilds: Option<BTreeSet<Id<GuildMarker>>>,
    parent: Option<String>,
    options: Vec<CommandOption>,
    default_member_permissions: Option<Permissions>,
    contexts: Option<Vec<InteractionContextType>>,
    integration_types: Option<Vec<ApplicationIntegrationType>>,
}

impl CommandBuilder {
    pub fn new(name: &str, kind: CommandKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: None,
            guilds: None,
            parent: None,
            options: Vec::new(),
            default_member_permissions: None,
            contexts: None,
            integration_types: None,
        }
    }

    pub fn slash(name: &str) -> Self {
        Self::new(name, CommandKind::Slash)
    }

    pub fn user(name: &str) -> Self {
        Self::new(name, CommandKind::User)
    }

    pub fn message(name: &str) -> Self {
        Self::new(name, CommandKind::Message)
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Restricts the command to `guild`. May be called repeatedly.
    pub fn guild(mut self, guild: Id<GuildMarker>) -> Self {
        self.guilds.get_or_insert_with(BTreeSet::new).insert(guild);
        self
    }

    pub fn guilds(mut self, guilds: impl IntoIterator<Item = Id<GuildMarker>>) -> Self {
        self.guilds.get_or_insert_with(BTreeSet::new).extend(guilds);
        self
    }

    /// Nests the command under a parent, e.g. `"config"` or
    /// `"config roles"`.
    pub fn parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn option(mut self, option: CommandOption) -> Self {
        self.options.push(option);
        self
    }

    /// Permissions a member needs to see the command unless a guild
    /// overrides it. `Permissions::empty()` limits it to administrators.
    pub fn default_member_permissions(mut self, permissions: Permissions) -> Self {
        self.default_member_permissions = Some(permissions);
        self
    }

    /// Where the command can be invoked: guilds, the bot's DMs or other
    /// private channels.
    pub fn contexts(mut self, contexts: impl IntoIterator<Item = InteractionContextType>) -> Self {
        self.contexts = Some(contexts.into_iter().collect());
        self
    }

    pub fn integration_types(
        mut self,
        integration_types: impl IntoIterator<Item = ApplicationIntegrationType>,
    ) -> Self {
        self.integration_types = Some(integration_types.into_iter().collect());
        self
    }

    pub fn build(self) -> Result<CommandDescriptor> {
        let name = self.name;
        let fail = |reason: &str| Error::descriptor(&name, reason);

        match self.kind {
            CommandKind::Slash => {
                if !is_valid_slash_name(&name) {
                    return Err(fail("name must be 1-32 lowercase letters, digits, `-` or `_`"));
                }
            }
            _ => {
                let length = name.chars().count();
                if !(1..=32).contains(&length) || name.trim() != name {
                    return Err(fail("name must be 1-32 characters"));
                }
            }
        }

        let description = match (self.kind, self.description) {
            (CommandKind::Slash, Some(description)) if !description.trim().is_empty() => {
                if description.chars().count() > 100 {
                    return Err(fail("description must be at most 100 characters"));
                }
                description
            }
            (CommandKind::Slash, _) => DEFAULT_DESCRIPTION.to_string(),
            (_, Some(description)) if !description.is_empty() => {
                return Err(fail("context menu commands cannot have a description"));
            }
            (_, _) => String::new(),
        };

        if self.kind.is_context_menu() {
            if !self.options.is_empty() {
                return Err(fail("context menu commands cannot have options"));
            }
            if self.parent.is_some() {
                return Err(fail("context menu commands cannot have a parent"));
            }
        }

        let parent = match self.parent {
            Some(parent) => {
                let segments = parent.split(' ').collect::<Vec<_>>();
                if segments.len() > 2 || !segments.iter().all(|s| is_valid_slash_name(s)) {
                    return Err(fail(
                        "parent must be one or two space separated command names",
                    ));
                }
                if self.guilds.is_some() {
                    return Err(fail("sub-commands inherit their parent's guilds"));
                }
                if self.default_member_permissions.is_some()
                    || self.contexts.is_some()
                    || self.integration_types.is_some()
                {
                    return Err(fail(
                        "sub-commands inherit their parent's permissions and contexts",
                    ));
                }
                Some(parent)
            }
            None => None,
        };

        if self.options.len() > MAX_CHOICES {
            return Err(fail("commands accept at most 25 options"));
        }

        let mut options: Vec<OptionDescriptor> = Vec::with_capacity(self.options.len());
        let mut seen = HashSet::new();
        for option in self.options {
            let option = option.build(&name)?;
            if !seen.insert(option.name().to_string()) {
                return Err(fail(&format!("option `{}` is declared twice", option.name())));
            }
            if option.required()
                && options.last().is_some_and(|previous| !previous.required())
            {
                return Err(fail(&format!(
                    "required option `{}` follows an optional one",
                    option.name()
                )));
            }
            options.push(option);
        }

        if let Some(guilds) = &self.guilds
            && guilds.is_empty()
        {
            return Err(fail("guild restriction must name at least one guild"));
        }
        if self.contexts.as_ref().is_some_and(Vec::is_empty) {
            return Err(fail("contexts must name at least one context"));
        }
        if self.integration_types.as_ref().is_some_and(Vec::is_empty) {
            return Err(fail("integration types must name at least one type"));
        }

        Ok(CommandDescriptor {
            name,
            kind: self.kind,
            description,
            guilds: self.guilds,
            parent,
            options,
            default_member_permissions: self.default_member_permissions,
            contexts: self.contexts,
            integration_types: self.integration_types,
        })
    }
}

/// The validated, immutable schema of one application command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDescriptor {
    name: String,
    kind: CommandKind,
    description: String,
    guilds: Option<BTreeSet<Id<GuildMarker>>>,
    parent: Option<String>,
    options: Vec<OptionDescriptor>,
    default_member_permissions: Option<Permissions>,
    contexts: Option<Vec<InteractionContextType>>,
    integration_types: Option<Vec<ApplicationIntegrationType>>,
}

impl CommandDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn guilds(&self) -> Option<&BTreeSet<Id<GuildMarker>>> {
        self.guilds.as_ref()
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn options(&self) -> &[OptionDescriptor] {
        &self.options
    }

    pub fn option(&self, name: &str) -> Option<&OptionDescriptor> {
        self.options.iter().find(|option| option.name() == name)
    }

    pub fn default_member_permissions(&self) -> Option<Permissions> {
        self.default_member_permissions
    }

    pub fn contexts(&self) -> Option<&[InteractionContextType]> {
        self.contexts.as_deref()
    }

    pub fn integration_types(&self) -> Option<&[ApplicationIntegrationType]> {
        self.integration_types.as_deref()
    }

    /// Full invocation path, e.g. `config roles add`.
    pub fn path(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{parent} {}", self.name),
            None => self.name.clone(),
        }
    }

    /// The scopes this command is registered in.
    pub fn scopes(&self) -> Vec<Scope> {
        match &self.guilds {
            Some(guilds) => guilds.iter().copied().map(Scope::Guild).collect(),
            None => vec![Scope::Global],
        }
    }
}

static DESCRIPTORS: LazyLock<RwLock<HashMap<TypeId, Arc<CommandDescriptor>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Builds the descriptor for `C` once and reuses it afterwards. Failed
/// builds are not cached.
pub fn cached_descriptor<C: 'static>(
    declare: fn() -> CommandBuilder,
) -> Result<Arc<CommandDescriptor>> {
    let key = TypeId::of::<C>();
    if let Some(descriptor) = DESCRIPTORS.read().get(&key) {
        return Ok(Arc::clone(descriptor));
    }

    let descriptor = Arc::new(declare().build()?);
    Ok(Arc::clone(
        DESCRIPTORS.write().entry(key).or_insert(descriptor),
    ))
}
