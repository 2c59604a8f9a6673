use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use twilight_app_commands::{
    Choices, Command, Error,
    autocomplete::AutoCompleteResponse,
    binder::{ContextTarget, Reference, ReferenceResolver, Resolved, ResolvedUser},
    commands::{CommandBuilder, CommandHooks, CommandKind, ContextCommand, Scope},
    config::{ExecutorConfig, StaleCommandPolicy},
    executor::{CommandExecutor, ErrorContext, ErrorReporter, Outcome, Registrar},
};
use twilight_model::{
    application::{
        command::{Command as RegisteredCommand, CommandOptionChoiceValue},
        interaction::Interaction,
    },
    channel::message::MessageFlags,
    http::interaction::{InteractionResponse, InteractionResponseData, InteractionResponseType},
    id::{
        Id,
        marker::{CommandMarker, UserMarker},
    },
};

#[derive(Debug, Choices)]
enum Tone {
    Loud,
    Quiet,
}

#[derive(Debug, Command)]
#[command(name = "echo", description = "Repeats a message")]
struct Echo {
    text: String,
    #[option(default = "Quiet")]
    tone: Tone,
}

#[derive(Debug, Command)]
#[command(name = "add", description = "Adds a role", parent = "config roles")]
struct AddRole {
    #[option(autocomplete)]
    role: String,
}

#[derive(Debug, Command)]
#[command(name = "greet")]
struct Greet {
    user: Id<UserMarker>,
}

#[derive(Default)]
struct State {
    calls: AtomicUsize,
}

#[derive(Default)]
struct Recorder {
    errors: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ErrorReporter for Recorder {
    async fn report(&self, context: &ErrorContext, error: &Error) {
        self.errors
            .lock()
            .push((context.command.clone(), error.to_string()));
    }
}

fn reply(content: impl Into<String>) -> InteractionResponse {
    InteractionResponse {
        kind: InteractionResponseType::ChannelMessageWithSource,
        data: Some(InteractionResponseData {
            content: Some(content.into()),
            ..Default::default()
        }),
    }
}

fn content(outcome: Outcome) -> Option<String> {
    outcome.response()?.data?.content
}

fn interaction(kind: u8, data: Value) -> Arc<Interaction> {
    let interaction = serde_json::from_value(json!({
        "id": "1000",
        "application_id": "2000",
        "type": kind,
        "token": "token",
        "guild_id": "3000",
        "channel_id": "4000",
        "locale": "en-US",
        "entitlements": [],
        "authorizing_integration_owners": {},
        "user": { "id": "42", "username": "tester", "discriminator": "0", "avatar": null },
        "data": data,
        "version": 1
    }))
    .unwrap();
    Arc::new(interaction)
}

fn command(data: Value) -> Arc<Interaction> {
    interaction(2, data)
}

fn executor() -> (CommandExecutor<State>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let executor = CommandExecutor::new().with_reporter(recorder.clone());

    executor
        .register::<Echo, _, _>(|echo, _, state: Arc<State>| async move {
            state.calls.fetch_add(1, Ordering::SeqCst);
            let text = match echo.tone {
                Tone::Loud => echo.text.to_uppercase(),
                Tone::Quiet => echo.text,
            };
            Ok(reply(text))
        })
        .unwrap();

    executor
        .register_with_autocomplete::<AddRole, _, _, _, _>(
            |add, _, _| async move { Ok(reply(format!("added {}", add.role))) },
            |request, _, _| async move {
                Ok((0..30)
                    .map(|index| format!("{}{index}", request.input))
                    .map(|name| (name.clone(), CommandOptionChoiceValue::String(name)))
                    .collect::<AutoCompleteResponse>())
            },
        )
        .unwrap();

    executor
        .register_context(CommandBuilder::user("Inspect"), |target, _, _| async move {
            match target {
                ContextTarget::User(user) => Ok(reply(format!("inspecting {}", user.user.name))),
                ContextTarget::Message(_) => anyhow::bail!("expected a user"),
            }
        })
        .unwrap();

    (executor, recorder)
}

#[tokio::test]
async fn dispatches_bound_arguments() {
    let (executor, recorder) = executor();
    let state = Arc::new(State::default());

    let outcome = executor
        .bind_and_dispatch(
            command(json!({
                "id": "1", "name": "echo", "type": 1,
                "options": [{ "name": "text", "type": 3, "value": "hello" }]
            })),
            Arc::clone(&state),
        )
        .await;

    assert!(matches!(outcome, Outcome::Completed(_)));
    assert_eq!(content(outcome).as_deref(), Some("hello"));
    assert_eq!(state.calls.load(Ordering::SeqCst), 1);
    assert!(recorder.errors.lock().is_empty());
}

#[tokio::test]
async fn choices_are_converted() {
    let (executor, _) = executor();

    let outcome = executor
        .bind_and_dispatch(
            command(json!({
                "id": "1", "name": "echo", "type": 1,
                "options": [
                    { "name": "text", "type": 3, "value": "hello" },
                    { "name": "tone", "type": 3, "value": "Loud" }
                ]
            })),
            Arc::new(State::default()),
        )
        .await;

    assert_eq!(content(outcome).as_deref(), Some("HELLO"));
}

#[tokio::test]
async fn invalid_choice_is_rejected_before_the_callback() {
    let (executor, recorder) = executor();
    let state = Arc::new(State::default());

    let outcome = executor
        .bind_and_dispatch(
            command(json!({
                "id": "1", "name": "echo", "type": 1,
                "options": [
                    { "name": "text", "type": 3, "value": "hello" },
                    { "name": "tone", "type": 3, "value": "Whisper" }
                ]
            })),
            Arc::clone(&state),
        )
        .await;

    let Outcome::Rejected(response) = outcome else {
        panic!("expected a rejection, got {outcome:?}");
    };
    let flags = response.data.unwrap().flags.unwrap();
    assert!(flags.contains(MessageFlags::EPHEMERAL | MessageFlags::IS_COMPONENTS_V2));
    assert_eq!(state.calls.load(Ordering::SeqCst), 0);

    let errors = recorder.errors.lock();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "echo");
}

#[tokio::test]
async fn callback_errors_are_reported_once() {
    let recorder = Arc::new(Recorder::default());
    let executor = CommandExecutor::<State>::with_config(ExecutorConfig {
        ephemeral_errors: false,
        ..Default::default()
    })
    .with_reporter(recorder.clone());
    executor
        .register::<Echo, _, _>(|_, _, _| async { anyhow::bail!("database is down") })
        .unwrap();

    let outcome = executor
        .bind_and_dispatch(
            command(json!({
                "id": "1", "name": "echo", "type": 1,
                "options": [{ "name": "text", "type": 3, "value": "hello" }]
            })),
            Arc::new(State::default()),
        )
        .await;

    let Outcome::Failed(response) = outcome else {
        panic!("expected a failure, got {outcome:?}");
    };
    let flags = response.data.unwrap().flags.unwrap();
    assert!(!flags.contains(MessageFlags::EPHEMERAL));
    assert_eq!(recorder.errors.lock().len(), 1);
}

#[tokio::test]
async fn failing_check_rejects() {
    #[derive(Debug, Command)]
    #[command(name = "admin")]
    struct Admin;

    let executor = CommandExecutor::<State>::new();
    executor
        .register::<Admin, _, _>(|_, _, _| async { Ok(reply("welcome")) })
        .unwrap();

    // Implemented by hand to override `check`.
    struct Locked;
    impl twilight_app_commands::commands::Command for Locked {
        fn declare() -> CommandBuilder {
            CommandBuilder::slash("locked")
        }

        fn from_arguments(
            _: twilight_app_commands::binder::BoundArguments,
        ) -> twilight_app_commands::Result<Self> {
            Ok(Locked)
        }
    }

    #[async_trait]
    impl CommandHooks for Locked {
        async fn check(&self, interaction: &Interaction) -> anyhow::Result<bool> {
            tokio::task::yield_now().await;
            Ok(interaction.author_id() == Some(Id::new(1)))
        }
    }
    executor
        .register::<Locked, _, _>(|_, _, _| async { Ok(reply("unlocked")) })
        .unwrap();

    let state = Arc::new(State::default());
    let admin = executor
        .bind_and_dispatch(
            command(json!({ "id": "1", "name": "admin", "type": 1 })),
            Arc::clone(&state),
        )
        .await;
    assert_eq!(content(admin).as_deref(), Some("welcome"));

    let locked = executor
        .bind_and_dispatch(
            command(json!({ "id": "2", "name": "locked", "type": 1 })),
            state,
        )
        .await;
    assert!(matches!(locked, Outcome::Rejected(_)));
}

#[derive(Debug, Command)]
#[command(name = "gate", manual_hooks)]
struct Gate {
    count: i64,
}

#[async_trait]
impl CommandHooks for Gate {
    async fn pre_check(interaction: &Interaction) -> anyhow::Result<bool> {
        Ok(interaction.guild_id.is_none())
    }
}

#[tokio::test]
async fn pre_check_runs_before_binding() {
    let recorder = Arc::new(Recorder::default());
    let executor = CommandExecutor::<State>::new().with_reporter(recorder.clone());
    let state = Arc::new(State::default());
    executor
        .register::<Gate, _, _>(|_, _, state: Arc<State>| async move {
            state.calls.fetch_add(1, Ordering::SeqCst);
            Ok(reply("opened"))
        })
        .unwrap();

    // The value is the wrong type, but the pre-check rejects first.
    let outcome = executor
        .bind_and_dispatch(
            command(json!({
                "id": "1", "name": "gate", "type": 1,
                "options": [{ "name": "count", "type": 3, "value": "many" }]
            })),
            Arc::clone(&state),
        )
        .await;

    assert!(matches!(outcome, Outcome::Rejected(_)));
    assert_eq!(state.calls.load(Ordering::SeqCst), 0);
    let errors = recorder.errors.lock();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].1, "the check for `gate` failed");
}

static EVENTS: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

struct OrderedReporter;

#[async_trait]
impl ErrorReporter for OrderedReporter {
    async fn report(&self, _context: &ErrorContext, _error: &Error) {
        EVENTS.lock().push("reporter");
    }
}

#[derive(Debug, Command)]
#[command(name = "flaky", manual_hooks)]
struct Flaky;

#[async_trait]
impl CommandHooks for Flaky {
    async fn on_error(_interaction: &Interaction, error: &Error) -> Option<InteractionResponse> {
        EVENTS.lock().push("hook");
        Some(reply(format!("sorry, {error}")))
    }
}

#[tokio::test]
async fn command_error_hook_replaces_the_response() {
    let executor = CommandExecutor::<State>::new().with_reporter(Arc::new(OrderedReporter));
    executor
        .register::<Flaky, _, _>(|_, _, _| async { anyhow::bail!("timed out") })
        .unwrap();

    let outcome = executor
        .bind_and_dispatch(
            command(json!({ "id": "1", "name": "flaky", "type": 1 })),
            Arc::new(State::default()),
        )
        .await;

    let Outcome::Failed(response) = outcome else {
        panic!("expected a failure, got {outcome:?}");
    };
    assert_eq!(
        response.data.unwrap().content.as_deref(),
        Some("sorry, command `flaky` failed")
    );
    assert_eq!(*EVENTS.lock(), ["hook", "reporter"]);
}

#[tokio::test]
async fn removed_commands_stop_dispatching() {
    let (executor, _) = executor();

    let removed = executor
        .remove("config roles add", CommandKind::Slash)
        .unwrap();
    assert_eq!(removed.name(), "add");

    let outcome = executor
        .bind_and_dispatch(
            command(json!({
                "id": "1", "name": "config", "type": 1,
                "options": [{
                    "name": "roles", "type": 2,
                    "options": [{
                        "name": "add", "type": 1,
                        "options": [{ "name": "role", "type": 3, "value": "mod" }]
                    }]
                }]
            })),
            Arc::new(State::default()),
        )
        .await;
    assert!(matches!(outcome, Outcome::Unhandled));

    // The implicit parents went with their only sub-command.
    let names = executor.build_commands()[&Scope::Global]
        .iter()
        .map(|command| command.name.clone())
        .collect::<Vec<_>>();
    assert_eq!(names, ["echo", "Inspect"]);
    assert!(matches!(
        executor.remove("config", CommandKind::Slash),
        Err(Error::UnknownCommand(_))
    ));

    // The path is free again.
    executor.remove("echo", CommandKind::Slash).unwrap();
    executor
        .register::<Echo, _, _>(|_, _, _| async { Ok(reply("new echo")) })
        .unwrap();
}

#[test]
fn removing_a_group_removes_its_sub_commands() {
    let (executor, _) = executor();
    executor
        .register_group(CommandBuilder::slash("config").description("Server settings"))
        .unwrap();

    executor.remove("config", CommandKind::Slash).unwrap();

    assert!(executor.descriptor("config roles", CommandKind::Slash).is_err());
    assert!(
        executor
            .descriptor("config roles add", CommandKind::Slash)
            .is_err()
    );
}

#[derive(Debug, Command)]
#[command(name = "Avatar", user, contexts(Guild, BotDm))]
struct Avatar {
    target: ResolvedUser,
}

#[tokio::test]
async fn derived_context_menus_receive_their_target() {
    let executor = CommandExecutor::<State>::new();
    executor
        .register_context_command::<Avatar, _, _>(|avatar, _, _| async move {
            Ok(reply(format!("avatar of {}", avatar.target.user.name)))
        })
        .unwrap();

    let descriptor = <Avatar as ContextCommand>::descriptor().unwrap();
    assert_eq!(descriptor.kind(), CommandKind::User);

    let outcome = executor
        .bind_and_dispatch(
            command(json!({
                "id": "1", "name": "Avatar", "type": 2, "target_id": "100",
                "resolved": {
                    "users": {
                        "100": { "id": "100", "username": "ferris", "discriminator": "0", "avatar": null }
                    }
                }
            })),
            Arc::new(State::default()),
        )
        .await;

    assert_eq!(content(outcome).as_deref(), Some("avatar of ferris"));
}

#[tokio::test]
async fn unknown_commands_are_unhandled() {
    let (executor, recorder) = executor();

    let outcome = executor
        .bind_and_dispatch(
            command(json!({ "id": "1", "name": "missing", "type": 1 })),
            Arc::new(State::default()),
        )
        .await;

    assert!(matches!(outcome, Outcome::Unhandled));
    assert!(recorder.errors.lock().is_empty());
}

#[tokio::test]
async fn sub_commands_dispatch_by_path() {
    let (executor, _) = executor();

    let outcome = executor
        .bind_and_dispatch(
            command(json!({
                "id": "1", "name": "config", "type": 1,
                "options": [{
                    "name": "roles", "type": 2,
                    "options": [{
                        "name": "add", "type": 1,
                        "options": [{ "name": "role", "type": 3, "value": "mod" }]
                    }]
                }]
            })),
            Arc::new(State::default()),
        )
        .await;

    assert_eq!(content(outcome).as_deref(), Some("added mod"));
}

#[tokio::test]
async fn autocomplete_returns_at_most_25_suggestions() {
    let (executor, _) = executor();

    let outcome = executor
        .bind_and_dispatch(
            interaction(
                4,
                json!({
                    "id": "1", "name": "config", "type": 1,
                    "options": [{
                        "name": "roles", "type": 2,
                        "options": [{
                            "name": "add", "type": 1,
                            "options": [{ "name": "role", "type": 3, "value": "mo", "focused": true }]
                        }]
                    }]
                }),
            ),
            Arc::new(State::default()),
        )
        .await;

    let Outcome::Completed(response) = outcome else {
        panic!("expected suggestions, got {outcome:?}");
    };
    assert_eq!(
        response.kind,
        InteractionResponseType::ApplicationCommandAutocompleteResult
    );
    let choices = response.data.unwrap().choices.unwrap();
    assert_eq!(choices.len(), 25);
    assert_eq!(choices[0].name, "mo0");
}

#[tokio::test]
async fn context_menus_receive_their_target() {
    let (executor, _) = executor();

    let outcome = executor
        .bind_and_dispatch(
            command(json!({
                "id": "1", "name": "Inspect", "type": 2, "target_id": "100",
                "resolved": {
                    "users": {
                        "100": { "id": "100", "username": "ferris", "discriminator": "0", "avatar": null }
                    }
                }
            })),
            Arc::new(State::default()),
        )
        .await;

    assert_eq!(content(outcome).as_deref(), Some("inspecting ferris"));
}

#[test]
fn duplicate_registrations_fail() {
    let (executor, _) = executor();

    let err = executor
        .register::<Echo, _, _>(|_, _, _| async { Ok(reply("again")) })
        .unwrap_err();
    assert!(matches!(err, Error::Descriptor { .. }));

    // A user and a slash command may share a name.
    executor
        .register_context(CommandBuilder::user("echo"), |_, _, _| async {
            Ok(reply("user echo"))
        })
        .unwrap();
}

#[test]
fn autocomplete_options_need_a_handler() {
    let executor = CommandExecutor::<State>::new();
    let err = executor
        .register::<AddRole, _, _>(|_, _, _| async { Ok(reply("added")) })
        .unwrap_err();
    assert!(matches!(err, Error::Descriptor { .. }));
}

#[test]
fn commands_cannot_become_groups() {
    let (executor, _) = executor();

    let err = executor
        .register_group(CommandBuilder::slash("echo"))
        .unwrap_err();
    assert!(matches!(err, Error::Descriptor { .. }));

    let err = executor
        .register_group(CommandBuilder::user("Inspect"))
        .unwrap_err();
    assert!(matches!(err, Error::Descriptor { .. }));
}

#[test]
fn build_commands_nests_sub_commands() {
    let (executor, _) = executor();
    executor
        .register_group(CommandBuilder::slash("config").description("Server settings"))
        .unwrap();

    let commands = executor.build_commands();
    let global = &commands[&Scope::Global];
    let names = global
        .iter()
        .map(|command| command.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, ["echo", "config", "Inspect"]);

    let config = &global[1];
    assert_eq!(config.description, "Server settings");
    assert_eq!(config.options[0].name, "roles");
    let roles = config.options[0].options.as_ref().unwrap();
    assert_eq!(roles[0].name, "add");
}

#[derive(Default)]
struct MockRegistrar {
    commands: Mutex<HashMap<Scope, Vec<RegisteredCommand>>>,
    next_id: AtomicU64,
    writes: AtomicUsize,
}

#[async_trait]
impl Registrar for MockRegistrar {
    async fn registered(&self, scope: Scope) -> anyhow::Result<Vec<RegisteredCommand>> {
        Ok(self.commands.lock().get(&scope).cloned().unwrap_or_default())
    }

    async fn register(
        &self,
        scope: Scope,
        command: &RegisteredCommand,
    ) -> anyhow::Result<Id<CommandMarker>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut commands = self.commands.lock();
        let registered = commands.entry(scope).or_default();
        let id = match registered.iter().position(|other| other.name == command.name) {
            Some(index) => {
                let id = registered[index].id.unwrap();
                registered[index] = RegisteredCommand {
                    id: Some(id),
                    ..command.clone()
                };
                id
            }
            None => {
                let id = Id::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 500);
                registered.push(RegisteredCommand {
                    id: Some(id),
                    ..command.clone()
                });
                id
            }
        };
        Ok(id)
    }

    async fn unregister(&self, scope: Scope, id: Id<CommandMarker>) -> anyhow::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(commands) = self.commands.lock().get_mut(&scope) {
            commands.retain(|command| command.id != Some(id));
        }
        Ok(())
    }
}

#[tokio::test]
async fn sync_only_writes_changes() {
    let (executor, _) = executor();
    let registrar = MockRegistrar::default();

    let first = executor.sync(&registrar).await;
    assert!(first.is_success());
    assert_eq!(first.registered.len(), 3);
    let writes = registrar.writes.load(Ordering::SeqCst);

    let second = executor.sync(&registrar).await;
    assert!(second.registered.is_empty());
    assert_eq!(second.unchanged.len(), 3);
    assert_eq!(registrar.writes.load(Ordering::SeqCst), writes);
}

#[tokio::test]
async fn sync_reregisters_reordered_options() {
    let (executor, _) = executor();
    let registrar = MockRegistrar::default();
    executor.sync(&registrar).await;

    {
        let mut commands = registrar.commands.lock();
        let echo = commands
            .get_mut(&Scope::Global)
            .and_then(|commands| commands.iter_mut().find(|command| command.name == "echo"))
            .unwrap();
        echo.options.reverse();
    }

    let report = executor.sync(&registrar).await;
    assert_eq!(report.registered, [(Scope::Global, "echo".to_string())]);
    assert_eq!(report.unchanged.len(), 2);
}

#[tokio::test]
async fn sync_handles_stale_commands_per_policy() {
    let registrar = MockRegistrar::default();
    registrar.commands.lock().insert(
        Scope::Global,
        vec![RegisteredCommand {
            id: Some(Id::new(9)),
            ..twilight_app_commands::payload::to_payload(
                &CommandBuilder::slash("old").build().unwrap(),
            )
        }],
    );

    let keep = CommandExecutor::<State>::new();
    let report = keep.sync(&registrar).await;
    assert_eq!(report.orphaned, [(Scope::Global, "old".to_string())]);

    let delete = CommandExecutor::<State>::with_config(ExecutorConfig {
        stale_commands: StaleCommandPolicy::Delete,
        ..Default::default()
    });
    let report = delete.sync(&registrar).await;
    assert_eq!(report.removed, [(Scope::Global, "old".to_string())]);
    assert!(registrar.commands.lock()[&Scope::Global].is_empty());
}

#[tokio::test]
async fn synced_ids_route_renamed_payloads() {
    let (executor, _) = executor();
    let registrar = MockRegistrar::default();
    executor.sync(&registrar).await;

    let id = registrar.commands.lock()[&Scope::Global]
        .iter()
        .find(|command| command.name == "echo")
        .and_then(|command| command.id)
        .unwrap();

    // Dispatch goes by id once one is known, whatever the payload's name.
    let outcome = executor
        .bind_and_dispatch(
            command(json!({
                "id": id.to_string(), "name": "echo-localized", "type": 1,
                "options": [{ "name": "text", "type": 3, "value": "hi" }]
            })),
            Arc::new(State::default()),
        )
        .await;
    assert_eq!(content(outcome).as_deref(), Some("hi"));
    assert!(executor.descriptor("echo", CommandKind::Slash).is_ok());
    assert!(matches!(
        executor.descriptor("echo-localized", CommandKind::Slash),
        Err(Error::UnknownCommand(_))
    ));
}

struct Pending;

#[async_trait]
impl ReferenceResolver for Pending {
    async fn resolve(&self, _: Reference) -> Option<Resolved> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn cancelled_dispatch_never_runs_the_callback() {
    let recorder = Arc::new(Recorder::default());
    let executor = CommandExecutor::<State>::new()
        .with_resolver(Arc::new(Pending))
        .with_reporter(recorder.clone());
    executor
        .register::<Greet, _, _>(|_, _, state: Arc<State>| async move {
            state.calls.fetch_add(1, Ordering::SeqCst);
            Ok(reply("hello"))
        })
        .unwrap();

    let state = Arc::new(State::default());
    let dispatch = executor.bind_and_dispatch(
        command(json!({
            "id": "1", "name": "greet", "type": 1,
            "options": [{ "name": "user", "type": 6, "value": "77" }]
        })),
        Arc::clone(&state),
    );
    let result = tokio::time::timeout(Duration::from_millis(50), dispatch).await;

    assert!(result.is_err());
    assert_eq!(state.calls.load(Ordering::SeqCst), 0);
    assert!(recorder.errors.lock().is_empty());
}
