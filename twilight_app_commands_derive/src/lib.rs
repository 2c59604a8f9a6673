use proc_macro::TokenStream;

mod choices;
mod command;

/// Implements `Command` for a struct whose fields are its options.
///
/// ```ignore
/// #[derive(Command)]
/// #[command(name = "ban", guild = 1234)]
/// /// Bans a member
/// struct Ban {
///     #[option(description = "Who to ban")]
///     user: Id<UserMarker>,
///     #[option(default = 0, min = 0, max = 7)]
///     days: i64,
/// }
/// ```
///
/// Marking the struct `user` or `message` declares a context menu command
/// instead. Its one field is built from the invocation's target.
///
/// ```ignore
/// #[derive(Command)]
/// #[command(name = "Report", message, permissions(MANAGE_MESSAGES), contexts(Guild))]
/// struct Report {
///     message: Message,
/// }
/// ```
#[proc_macro_derive(Command, attributes(option, command))]
pub fn command_derive(input: TokenStream) -> TokenStream {
    command::derive(input)
}

#[proc_macro_derive(Choices, attributes(choice))]
pub fn enum_choices_derive(input: TokenStream) -> TokenStream {
    choices::derive(input)
}
