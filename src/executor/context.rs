use std::{marker::PhantomData, sync::Arc};

use async_trait::async_trait;
use twilight_model::{application::interaction::Interaction, http::interaction::InteractionResponse};

use super::{CommandExecutor, Handler, slash::checked};
use crate::{
    binder::ContextTarget,
    commands::{CommandBuilder, CommandDescriptor, CommandHooks, ContextCommand},
    error::{Error, Result},
};

pub type ContextResponse = anyhow::Result<InteractionResponse>;

#[async_trait]
pub(crate) trait ContextHandler<S>: Send + Sync {
    async fn pre_check(&self, interaction: &Interaction) -> Result<()>;

    async fn handle(
        &self,
        target: ContextTarget,
        interaction: Arc<Interaction>,
        state: Arc<S>,
    ) -> Result<InteractionResponse>;

    async fn on_error(
        &self,
        interaction: &Interaction,
        error: &Error,
    ) -> Option<InteractionResponse>;
}

/// A bare callback registered with a builder. It has no hooks.
struct CallbackHandler<F> {
    path: String,
    handler: F,
}

#[async_trait]
impl<S, F, Fut> ContextHandler<S> for CallbackHandler<F>
where
    F: Fn(ContextTarget, Arc<Interaction>, Arc<S>) -> Fut + Send + Sync,
    Fut: Future<Output = ContextResponse> + Send + 'static,
    S: Send + Sync + 'static,
{
    async fn pre_check(&self, _interaction: &Interaction) -> Result<()> {
        Ok(())
    }

    async fn handle(
        &self,
        target: ContextTarget,
        interaction: Arc<Interaction>,
        state: Arc<S>,
    ) -> Result<InteractionResponse> {
        (self.handler)(target, interaction, state)
            .await
            .map_err(|source| Error::Callback {
                command: self.path.clone(),
                source,
            })
    }

    async fn on_error(
        &self,
        _interaction: &Interaction,
        _error: &Error,
    ) -> Option<InteractionResponse> {
        None
    }
}

struct TypedContextHandler<C, S, F> {
    path: String,
    handler: F,
    _phantom: PhantomData<fn() -> (C, S)>,
}

#[async_trait]
impl<C, S, F, Fut> ContextHandler<S> for TypedContextHandler<C, S, F>
where
    C: ContextCommand,
    F: Fn(C, Arc<Interaction>, Arc<S>) -> Fut + Send + Sync,
    Fut: Future<Output = ContextResponse> + Send + 'static,
    S: Send + Sync + 'static,
{
    async fn pre_check(&self, interaction: &Interaction) -> Result<()> {
        checked(&self.path, C::pre_check(interaction).await)
    }

    async fn handle(
        &self,
        target: ContextTarget,
        interaction: Arc<Interaction>,
        state: Arc<S>,
    ) -> Result<InteractionResponse> {
        let command = C::from_target(target)?;
        checked(&self.path, command.check(&interaction).await)?;

        (self.handler)(command, interaction, state)
            .await
            .map_err(|source| Error::Callback {
                command: self.path.clone(),
                source,
            })
    }

    async fn on_error(
        &self,
        interaction: &Interaction,
        error: &Error,
    ) -> Option<InteractionResponse> {
        <C as CommandHooks>::on_error(interaction, error).await
    }
}

fn context_menu(descriptor: Arc<CommandDescriptor>) -> Result<Arc<CommandDescriptor>> {
    if !descriptor.kind().is_context_menu() {
        return Err(Error::descriptor(
            descriptor.name(),
            "slash commands are registered with `register`",
        ));
    }
    Ok(descriptor)
}

impl<S> CommandExecutor<S>
where
    S: Send + Sync + 'static,
{
    /// Registers a context menu command. The handler receives the user or
    /// message it was invoked on.
    pub fn register_context<F, Fut>(&self, command: CommandBuilder, handler: F) -> Result<()>
    where
        F: Fn(ContextTarget, Arc<Interaction>, Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ContextResponse> + Send + 'static,
    {
        let descriptor = context_menu(Arc::new(command.build()?))?;
        let handler = CallbackHandler {
            path: descriptor.path(),
            handler,
        };
        self.insert(descriptor, Handler::Context(Box::new(handler)))
    }

    /// Registers a context menu command declared with
    /// `#[derive(Command)]`, running its hooks around `handler`.
    pub fn register_context_command<C, F, Fut>(&self, handler: F) -> Result<()>
    where
        C: ContextCommand,
        F: Fn(C, Arc<Interaction>, Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ContextResponse> + Send + 'static,
    {
        let descriptor = context_menu(<C as ContextCommand>::descriptor()?)?;
        let handler = TypedContextHandler::<C, S, F> {
            path: descriptor.path(),
            handler,
            _phantom: PhantomData,
        };
        self.insert(descriptor, Handler::Context(Box::new(handler)))
    }
}
