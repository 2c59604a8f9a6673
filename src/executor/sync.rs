use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use twilight_model::{
    application::command::Command,
    id::{Id, marker::CommandMarker},
};

use super::CommandExecutor;
use crate::{
    commands::Scope,
    config::StaleCommandPolicy,
    error::Error,
    payload,
};

/// The platform side of command registration, usually a thin wrapper
/// around `twilight_http`'s interaction client.
#[async_trait]
pub trait Registrar: Send + Sync {
    /// Commands currently registered in `scope`.
    async fn registered(&self, scope: Scope) -> anyhow::Result<Vec<Command>>;

    /// Creates or overwrites `command` in `scope`, returning its id.
    async fn register(&self, scope: Scope, command: &Command) -> anyhow::Result<Id<CommandMarker>>;

    async fn unregister(&self, scope: Scope, id: Id<CommandMarker>) -> anyhow::Result<()>;
}

/// What a sync did, per scope and command name.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Created or updated.
    pub registered: Vec<(Scope, String)>,
    /// Already registered with an identical payload.
    pub unchanged: Vec<(Scope, String)>,
    /// Stale commands that were unregistered.
    pub removed: Vec<(Scope, String)>,
    /// Stale commands left in place.
    pub orphaned: Vec<(Scope, String)>,
    pub failures: Vec<Error>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl<S> CommandExecutor<S>
where
    S: Send + Sync + 'static,
{
    /// Brings the commands registered with the platform in line with this
    /// executor, scope by scope.
    ///
    /// Unchanged commands are left alone. A failure in one command or scope
    /// is recorded in the report and does not stop the others. Every
    /// command that ends up registered has its id attached for dispatch.
    pub async fn sync(&self, registrar: &dyn Registrar) -> SyncReport {
        let desired = self.build_commands();
        let mut report = SyncReport::default();

        let mut scopes: BTreeSet<Scope> = desired.keys().copied().collect();
        scopes.insert(Scope::Global);
        scopes.extend(self.config.prune_guilds.iter().copied().map(Scope::Guild));

        for scope in scopes {
            let existing = match registrar.registered(scope).await {
                Ok(existing) => existing,
                Err(source) => {
                    tracing::error!(%scope, error = ?source, "failed to list registered commands");
                    report.failures.push(Error::Registration {
                        command: format!("<{scope}>"),
                        source,
                    });
                    continue;
                }
            };

            let mut matched = HashSet::new();
            for command in desired.get(&scope).into_iter().flatten() {
                let current = existing
                    .iter()
                    .position(|other| other.name == command.name && other.kind == command.kind);
                if let Some(index) = current {
                    matched.insert(index);
                    if let Some(id) = existing[index].id
                        && !payload::needs_update(&existing[index], command)
                    {
                        self.attach(id, command);
                        report.unchanged.push((scope, command.name.clone()));
                        continue;
                    }
                }

                match registrar.register(scope, command).await {
                    Ok(id) => {
                        tracing::debug!(%scope, command = %command.name, %id, "registered command");
                        self.attach(id, command);
                        report.registered.push((scope, command.name.clone()));
                    }
                    Err(source) => {
                        tracing::error!(%scope, command = %command.name, error = ?source, "failed to register command");
                        report.failures.push(Error::Registration {
                            command: command.name.clone(),
                            source,
                        });
                    }
                }
            }

            let stale = existing
                .iter()
                .enumerate()
                .filter(|(index, _)| !matched.contains(index))
                .map(|(_, command)| command);
            for command in stale {
                let (StaleCommandPolicy::Delete, Some(id)) = (self.config.stale_commands, command.id)
                else {
                    tracing::warn!(%scope, command = %command.name, "command is registered but no longer declared");
                    report.orphaned.push((scope, command.name.clone()));
                    continue;
                };

                match registrar.unregister(scope, id).await {
                    Ok(()) => {
                        tracing::debug!(%scope, command = %command.name, "unregistered stale command");
                        self.detach(id);
                        report.removed.push((scope, command.name.clone()));
                    }
                    Err(source) => {
                        tracing::error!(%scope, command = %command.name, error = ?source, "failed to unregister command");
                        report.failures.push(Error::Registration {
                            command: command.name.clone(),
                            source,
                        });
                    }
                }
            }
        }

        tracing::info!(
            registered = report.registered.len(),
            unchanged = report.unchanged.len(),
            removed = report.removed.len(),
            orphaned = report.orphaned.len(),
            failures = report.failures.len(),
            "synced commands"
        );
        report
    }
}
