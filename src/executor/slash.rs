use std::{marker::PhantomData, pin::Pin, sync::Arc};

use async_trait::async_trait;
use twilight_model::{application::interaction::Interaction, http::interaction::InteractionResponse};

use super::{CommandExecutor, Handler};
use crate::{
    autocomplete::{AutoCompleteResponse, AutocompleteRequest},
    binder::BoundArguments,
    commands::{Command, CommandHooks, CommandKind},
    error::{Error, Result},
};

pub type CommandResponse = anyhow::Result<InteractionResponse>;

pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

#[async_trait]
pub(crate) trait AsyncHandler<S>: Send + Sync {
    async fn pre_check(&self, interaction: &Interaction) -> Result<()>;

    /// Converts bound arguments into the command, runs its check and then
    /// its callback. Callback errors come back as [`Error::Callback`].
    async fn handle(
        &self,
        arguments: BoundArguments,
        interaction: Arc<Interaction>,
        state: Arc<S>,
    ) -> Result<InteractionResponse>;

    async fn on_error(
        &self,
        interaction: &Interaction,
        error: &Error,
    ) -> Option<InteractionResponse>;
}

/// Turns the result of a check hook into a rejection or a failure.
pub(crate) fn checked(path: &str, passed: anyhow::Result<bool>) -> Result<()> {
    match passed {
        Ok(true) => Ok(()),
        Ok(false) => Err(Error::CheckFailed(path.to_string())),
        Err(source) => Err(Error::Callback {
            command: path.to_string(),
            source,
        }),
    }
}

struct TypedAsyncHandler<C, S, F, Fut>
where
    C: Command,
    F: Fn(C, Arc<Interaction>, Arc<S>) -> Fut + Send + Sync,
    Fut: Future<Output = CommandResponse> + Send + 'static,
    S: Send + Sync + 'static,
{
    path: String,
    handler: F,
    _phantom: PhantomData<fn() -> (C, S)>,
}

#[async_trait]
impl<C, S, F, Fut> AsyncHandler<S> for TypedAsyncHandler<C, S, F, Fut>
where
    C: Command,
    F: Fn(C, Arc<Interaction>, Arc<S>) -> Fut + Send + Sync,
    Fut: Future<Output = CommandResponse> + Send + 'static,
    S: Send + Sync + 'static,
{
    async fn pre_check(&self, interaction: &Interaction) -> Result<()> {
        checked(&self.path, C::pre_check(interaction).await)
    }

    async fn handle(
        &self,
        arguments: BoundArguments,
        interaction: Arc<Interaction>,
        state: Arc<S>,
    ) -> Result<InteractionResponse> {
        let command = C::from_arguments(arguments)?;
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

pub(crate) trait AutocompleteHandler<S>: Send + Sync {
    fn complete(
        &self,
        request: AutocompleteRequest,
        interaction: Arc<Interaction>,
        state: Arc<S>,
    ) -> BoxFuture<anyhow::Result<AutoCompleteResponse>>;
}

impl<S, F, Fut> AutocompleteHandler<S> for F
where
    F: Fn(AutocompleteRequest, Arc<Interaction>, Arc<S>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<AutoCompleteResponse>> + Send + 'static,
{
    fn complete(
        &self,
        request: AutocompleteRequest,
        interaction: Arc<Interaction>,
        state: Arc<S>,
    ) -> BoxFuture<anyhow::Result<AutoCompleteResponse>> {
        Box::pin(self(request, interaction, state))
    }
}

impl<S> CommandExecutor<S>
where
    S: Send + Sync + 'static,
{
    /// Register an async command handler.
    ///
    /// Fails if the command's declaration is invalid, if another command is
    /// registered under the same path, or if it declares autocomplete
    /// options (use [`register_with_autocomplete`](Self::register_with_autocomplete)).
    pub fn register<C, F, Fut>(&self, handler: F) -> Result<()>
    where
        C: Command,
        F: Fn(C, Arc<Interaction>, Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResponse> + Send + 'static,
    {
        let descriptor = C::descriptor()?;
        if descriptor
            .options()
            .iter()
            .any(|option| option.autocomplete())
        {
            return Err(Error::descriptor(
                descriptor.name(),
                "declares autocomplete options but no autocomplete handler was given",
            ));
        }
        self.register_slash::<C, F, Fut>(handler, None)
    }

    /// Register an async command handler along with the handler that
    /// suggests values for its autocomplete options.
    pub fn register_with_autocomplete<C, F, Fut, A, AFut>(
        &self,
        handler: F,
        autocomplete: A,
    ) -> Result<()>
    where
        C: Command,
        F: Fn(C, Arc<Interaction>, Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResponse> + Send + 'static,
        A: Fn(AutocompleteRequest, Arc<Interaction>, Arc<S>) -> AFut + Send + Sync + 'static,
        AFut: Future<Output = anyhow::Result<AutoCompleteResponse>> + Send + 'static,
    {
        let descriptor = C::descriptor()?;
        if !descriptor
            .options()
            .iter()
            .any(|option| option.autocomplete())
        {
            tracing::warn!(
                command = %descriptor.path(),
                "autocomplete handler registered for a command without autocomplete options"
            );
        }
        self.register_slash::<C, F, Fut>(handler, Some(Box::new(autocomplete)))
    }

    fn register_slash<C, F, Fut>(
        &self,
        handler: F,
        autocomplete: Option<Box<dyn AutocompleteHandler<S>>>,
    ) -> Result<()>
    where
        C: Command,
        F: Fn(C, Arc<Interaction>, Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResponse> + Send + 'static,
    {
        let descriptor = C::descriptor()?;
        if descriptor.kind() != CommandKind::Slash {
            return Err(Error::descriptor(
                descriptor.name(),
                "context menu commands are registered with `register_context`",
            ));
        }

        let callback = TypedAsyncHandler {
            path: descriptor.path(),
            handler,
            _phantom: PhantomData,
        };

        self.insert(
            descriptor,
            Handler::Slash {
                callback: Box::new(callback),
                autocomplete,
            },
        )
    }
}
