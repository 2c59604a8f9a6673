//! Runs registered commands against incoming interactions.

mod context;
mod report;
mod slash;
mod sync;

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use parking_lot::RwLock;
use twilight_model::{
    application::{
        command::Command,
        interaction::{
            Interaction, InteractionData, InteractionType, application_command::CommandData,
        },
    },
    channel::message::MessageFlags,
    http::interaction::{InteractionResponse, InteractionResponseData, InteractionResponseType},
    id::{Id, marker::CommandMarker},
};
use twilight_util::builder::message::{ContainerBuilder, TextDisplayBuilder};

pub use context::ContextResponse;
pub use report::{ErrorContext, ErrorReporter, TracingReporter};
pub use slash::CommandResponse;
pub use sync::{Registrar, SyncReport};

use crate::{
    autocomplete::{self, AutoCompleteResponse, AutocompleteRequest},
    binder::{self, Binder, PayloadResolver, ReferenceResolver},
    commands::{CommandBuilder, CommandDescriptor, CommandKind, Scope},
    config::ExecutorConfig,
    error::{Error, Result},
    payload,
};

use self::{
    context::ContextHandler,
    slash::{AsyncHandler, AutocompleteHandler},
};

enum Handler<S> {
    Slash {
        callback: Box<dyn AsyncHandler<S>>,
        autocomplete: Option<Box<dyn AutocompleteHandler<S>>>,
    },
    Context(Box<dyn ContextHandler<S>>),
    /// A parent of sub-commands. Implicit groups were never declared and
    /// carry the default description.
    Group { implicit: bool },
}

struct Entry<S> {
    descriptor: Arc<CommandDescriptor>,
    handler: Handler<S>,
}

type Key = (String, CommandKind);

struct Table<S> {
    entries: HashMap<Key, Arc<Entry<S>>>,
    order: Vec<Key>,
    ids: HashMap<Id<CommandMarker>, Key>,
}

impl<S> Table<S> {
    fn get(&self, path: &str, kind: CommandKind) -> Option<&Arc<Entry<S>>> {
        self.entries.get(&(path.to_string(), kind))
    }

    fn insert(&mut self, entry: Entry<S>) -> Result<()> {
        let descriptor = Arc::clone(&entry.descriptor);
        let key = (descriptor.path(), descriptor.kind());
        let is_group = matches!(entry.handler, Handler::Group { .. });

        if let Some(existing) = self.entries.get(&key) {
            match (&existing.handler, is_group) {
                (Handler::Group { implicit: true }, true) => {}
                (Handler::Group { .. }, false) => {
                    return Err(Error::descriptor(
                        descriptor.name(),
                        "a command with sub-commands cannot be invoked itself",
                    ));
                }
                _ => {
                    return Err(Error::descriptor(
                        descriptor.name(),
                        "a command with this name is already registered",
                    ));
                }
            }
        }

        if let Some(parent) = descriptor.parent() {
            let mut path = String::new();
            for segment in parent.split(' ') {
                let parent_of = (!path.is_empty()).then(|| path.clone());
                if !path.is_empty() {
                    path.push(' ');
                }
                path.push_str(segment);
                self.ensure_group(&path, segment, parent_of.as_deref(), descriptor.name())?;
            }
        }

        tracing::debug!(command = %key.0, kind = ?key.1, "registered command");
        if self
            .entries
            .insert(key.clone(), Arc::new(entry))
            .is_none()
        {
            self.order.push(key);
        }
        Ok(())
    }

    fn ensure_group(
        &mut self,
        path: &str,
        name: &str,
        parent: Option<&str>,
        child: &str,
    ) -> Result<()> {
        if let Some(existing) = self.get(path, CommandKind::Slash) {
            return match existing.handler {
                Handler::Group { .. } => Ok(()),
                _ => Err(Error::descriptor(
                    child,
                    format!("parent `{path}` is a command and cannot have sub-commands"),
                )),
            };
        }

        let mut builder = CommandBuilder::slash(name);
        if let Some(parent) = parent {
            builder = builder.parent(parent);
        }
        let key = (path.to_string(), CommandKind::Slash);
        self.entries.insert(
            key.clone(),
            Arc::new(Entry {
                descriptor: Arc::new(builder.build()?),
                handler: Handler::Group { implicit: true },
            }),
        );
        self.order.push(key);
        Ok(())
    }

    fn children(&self, parent: &str) -> impl Iterator<Item = &Arc<Entry<S>>> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key))
            .filter(move |entry| entry.descriptor.parent() == Some(parent))
    }

    fn compile(&self, entry: &Entry<S>) -> Option<Command> {
        let descriptor = &entry.descriptor;
        if !matches!(entry.handler, Handler::Group { .. }) {
            return Some(payload::to_payload(descriptor));
        }

        let root = descriptor.name();
        let mut members = Vec::new();
        for child in self.children(root) {
            match child.handler {
                Handler::Group { .. } => {
                    let path = child.descriptor.path();
                    let leaves = self
                        .children(&path)
                        .map(|leaf| payload::subcommand(&leaf.descriptor))
                        .collect::<Vec<_>>();
                    if leaves.is_empty() {
                        continue;
                    }
                    members.push(payload::subcommand_group(
                        child.descriptor.name(),
                        child.descriptor.description(),
                        leaves,
                    ));
                }
                _ => members.push(payload::subcommand(&child.descriptor).build()),
            }
        }

        if members.is_empty() {
            tracing::debug!(command = root, "skipping group without sub-commands");
            return None;
        }
        Some(payload::group_payload(descriptor, members))
    }

    /// Removes `path` along with its sub-commands when it is a group, then
    /// drops implicit parents left without children.
    fn remove(&mut self, path: &str, kind: CommandKind) -> Option<Arc<Entry<S>>> {
        let removed = self.entries.remove(&(path.to_string(), kind))?;
        if matches!(removed.handler, Handler::Group { .. }) {
            let prefix = format!("{path} ");
            self.entries.retain(|(other, other_kind), _| {
                *other_kind != CommandKind::Slash || !other.starts_with(&prefix)
            });
        }

        let mut parent = removed.descriptor.parent().map(str::to_string);
        while let Some(path) = parent {
            let Some(group) = self.get(&path, CommandKind::Slash) else {
                break;
            };
            if !matches!(group.handler, Handler::Group { implicit: true })
                || self.children(&path).next().is_some()
            {
                break;
            }
            parent = group.descriptor.parent().map(str::to_string);
            self.entries.remove(&(path, CommandKind::Slash));
        }

        self.order.retain(|key| self.entries.contains_key(key));
        self.ids.retain(|_, key| self.entries.contains_key(key));
        Some(removed)
    }
}

/// How an interaction was handled. Every variant but `Unhandled` carries
/// the response to send back.
#[derive(Debug)]
pub enum Outcome {
    Completed(InteractionResponse),
    /// Binding failed or a check rejected the invocation.
    Rejected(InteractionResponse),
    /// The callback returned an error.
    Failed(InteractionResponse),
    /// Not an application command, or not one registered here.
    Unhandled,
}

impl Outcome {
    pub fn response(self) -> Option<InteractionResponse> {
        match self {
            Outcome::Completed(response) | Outcome::Rejected(response) | Outcome::Failed(response) => {
                Some(response)
            }
            Outcome::Unhandled => None,
        }
    }
}

pub struct CommandExecutor<S>
where
    S: Send + Sync + 'static,
{
    table: RwLock<Table<S>>,
    config: ExecutorConfig,
    resolver: Option<Arc<dyn ReferenceResolver>>,
    reporter: Arc<dyn ErrorReporter>,
}

impl<S> CommandExecutor<S>
where
    S: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_config(ExecutorConfig::default())
    }

    pub fn with_config(config: ExecutorConfig) -> Self {
        CommandExecutor {
            table: RwLock::new(Table {
                entries: HashMap::new(),
                order: Vec::new(),
                ids: HashMap::new(),
            }),
            config,
            resolver: None,
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Resolver consulted for references missing from an interaction's
    /// own resolved data.
    pub fn with_resolver(mut self, resolver: Arc<dyn ReferenceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Declares a parent for sub-commands, giving it a description and a
    /// guild restriction.
    pub fn register_group(&self, group: CommandBuilder) -> Result<()> {
        let descriptor = group.build()?;
        if descriptor.kind() != CommandKind::Slash || !descriptor.options().is_empty() {
            return Err(Error::descriptor(
                descriptor.name(),
                "groups must be slash commands without options",
            ));
        }
        self.table.write().insert(Entry {
            descriptor: Arc::new(descriptor),
            handler: Handler::Group { implicit: false },
        })
    }

    fn insert(&self, descriptor: Arc<CommandDescriptor>, handler: Handler<S>) -> Result<()> {
        self.table.write().insert(Entry {
            descriptor,
            handler,
        })
    }

    /// Unregisters the command at `path` and returns its descriptor.
    /// Removing a group removes its sub-commands too.
    ///
    /// Only the local table changes. The next [`sync`](Self::sync) treats
    /// the command as stale on Discord's side.
    pub fn remove(&self, path: &str, kind: CommandKind) -> Result<Arc<CommandDescriptor>> {
        let removed = self
            .table
            .write()
            .remove(path, kind)
            .ok_or_else(|| Error::UnknownCommand(path.to_string()))?;
        tracing::debug!(command = %path, kind = ?kind, "removed command");
        Ok(Arc::clone(&removed.descriptor))
    }

    /// The descriptor registered under `path`, e.g. `config roles add`.
    pub fn descriptor(&self, path: &str, kind: CommandKind) -> Result<Arc<CommandDescriptor>> {
        self.table
            .read()
            .get(path, kind)
            .map(|entry| Arc::clone(&entry.descriptor))
            .ok_or_else(|| Error::UnknownCommand(path.to_string()))
    }

    /// Realizes the table into registration payloads, grouped by scope.
    pub fn build_commands(&self) -> BTreeMap<Scope, Vec<Command>> {
        let table = self.table.read();
        let mut commands: BTreeMap<Scope, Vec<Command>> = BTreeMap::new();

        for key in &table.order {
            let Some(entry) = table.entries.get(key) else {
                continue;
            };
            if entry.descriptor.parent().is_some() {
                continue;
            }
            let Some(command) = table.compile(entry) else {
                continue;
            };
            for scope in entry.descriptor.scopes() {
                commands.entry(scope).or_default().push(command.clone());
            }
        }

        commands
    }

    fn attach(&self, id: Id<CommandMarker>, command: &Command) {
        let Some(kind) = CommandKind::from_command_type(command.kind) else {
            return;
        };
        self.table
            .write()
            .ids
            .insert(id, (command.name.clone(), kind));
    }

    fn detach(&self, id: Id<CommandMarker>) {
        self.table.write().ids.remove(&id);
    }

    fn lookup(&self, data: &CommandData, kind: CommandKind, path: &[&str]) -> Option<Arc<Entry<S>>> {
        let table = self.table.read();
        let root = match table.ids.get(&data.id) {
            Some((name, _)) => name.as_str(),
            None => data.name.as_str(),
        };
        let mut full = root.to_string();
        for segment in path {
            full.push(' ');
            full.push_str(segment);
        }
        table.get(&full, kind).cloned()
    }

    /// Binds an interaction to its command and runs the callback or the
    /// autocomplete handler.
    ///
    /// Errors never escape: they are reported once and turned into an
    /// error response.
    pub async fn bind_and_dispatch(&self, interaction: Arc<Interaction>, state: Arc<S>) -> Outcome {
        let Some(InteractionData::ApplicationCommand(data)) = &interaction.data else {
            return Outcome::Unhandled;
        };
        let Some(kind) = CommandKind::from_command_type(data.kind) else {
            return Outcome::Unhandled;
        };

        let (path, options) = match kind {
            CommandKind::Slash => binder::leaf_options(&data.options),
            _ => (Vec::new(), data.options.as_slice()),
        };

        let Some(entry) = self.lookup(data, kind, &path) else {
            tracing::debug!(command = %data.name, id = %data.id, "no command registered for interaction");
            return Outcome::Unhandled;
        };

        let resolver = match &self.resolver {
            Some(fallback) => {
                PayloadResolver::new(data.resolved.as_ref()).with_fallback(fallback.as_ref())
            }
            None => PayloadResolver::new(data.resolved.as_ref()),
        };

        let is_autocomplete = interaction.kind == InteractionType::ApplicationCommandAutocomplete;
        tracing::debug!(
            command = %entry.descriptor.path(),
            interaction = %interaction.id,
            autocomplete = is_autocomplete,
            "dispatching interaction"
        );

        match &entry.handler {
            Handler::Slash {
                callback,
                autocomplete: handler,
            } if is_autocomplete => {
                let outcome = async {
                    let request = AutocompleteRequest::from_options(options)?;
                    let Some(handler) = handler else {
                        autocomplete::ensure_supported(&request, &entry.descriptor)?;
                        return Err(Error::AutocompleteNotSupported {
                            command: entry.descriptor.path(),
                            option: request.focused,
                        });
                    };
                    autocomplete::dispatch(request, &entry.descriptor, |request| {
                        handler.complete(request, Arc::clone(&interaction), Arc::clone(&state))
                    })
                    .await
                }
                .await;

                match outcome {
                    Ok(response) => Outcome::Completed(response.into_response()),
                    Err(err) => {
                        // Autocomplete always answers with suggestions.
                        callback.on_error(&interaction, &err).await;
                        self.report(&entry.descriptor, &interaction, &err).await;
                        Outcome::Rejected(AutoCompleteResponse::new().into_response())
                    }
                }
            }
            Handler::Slash { callback, .. } => {
                let result = async {
                    callback.pre_check(&interaction).await?;
                    let arguments = Binder::new(&entry.descriptor)
                        .bind(options, &resolver)
                        .await?;
                    callback
                        .handle(arguments, Arc::clone(&interaction), Arc::clone(&state))
                        .await
                }
                .await;

                match result {
                    Ok(response) => Outcome::Completed(response),
                    Err(err) => {
                        let response = callback.on_error(&interaction, &err).await;
                        self.fail(&entry.descriptor, &interaction, err, response).await
                    }
                }
            }
            Handler::Context(handler) if !is_autocomplete => {
                let result = async {
                    handler.pre_check(&interaction).await?;
                    let target = binder::bind_target(&entry.descriptor, data, &resolver).await?;
                    handler
                        .handle(target, Arc::clone(&interaction), Arc::clone(&state))
                        .await
                }
                .await;

                match result {
                    Ok(response) => Outcome::Completed(response),
                    Err(err) => {
                        let response = handler.on_error(&interaction, &err).await;
                        self.fail(&entry.descriptor, &interaction, err, response).await
                    }
                }
            }
            _ => Outcome::Unhandled,
        }
    }

    /// Reports `err` and picks the outcome. Binding and check failures are
    /// rejections; everything else is a failure. `response` comes from the
    /// command's own error hook and replaces the default error response.
    async fn fail(
        &self,
        descriptor: &CommandDescriptor,
        interaction: &Interaction,
        err: Error,
        response: Option<InteractionResponse>,
    ) -> Outcome {
        self.report(descriptor, interaction, &err).await;
        let response = response.unwrap_or_else(|| self.error_response(&err));
        if err.is_binding() {
            Outcome::Rejected(response)
        } else {
            Outcome::Failed(response)
        }
    }

    async fn report(&self, descriptor: &CommandDescriptor, interaction: &Interaction, err: &Error) {
        let context = ErrorContext {
            command: descriptor.path(),
            interaction_id: interaction.id,
            guild_id: interaction.guild_id,
            user_id: interaction.author_id(),
        };
        self.reporter.report(&context, err).await;
    }

    fn error_response(&self, err: &Error) -> InteractionResponse {
        let text = if self.config.expose_error_details {
            format!("An error occurred: {}", err)
        } else {
            "An error occurred.".to_string()
        };
        let container = ContainerBuilder::new()
            .accent_color(Some(self.config.error_accent_color))
            .component(TextDisplayBuilder::new(text).build())
            .build();

        let mut flags = MessageFlags::IS_COMPONENTS_V2;
        if self.config.ephemeral_errors {
            flags |= MessageFlags::EPHEMERAL;
        }

        InteractionResponse {
            kind: InteractionResponseType::ChannelMessageWithSource,
            data: Some(InteractionResponseData {
                components: Some(vec![container.into()]),
                flags: Some(flags),
                ..Default::default()
            }),
        }
    }
}

impl<S> Default for CommandExecutor<S>
where
    S: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
