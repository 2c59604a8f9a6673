use darling::util::{Flag, PathList};
use darling::{FromDeriveInput, FromField, FromMeta, ast::Data};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Expr, ExprLit, ExprUnary, GenericArgument, Lit, PathArguments, Type, UnOp};
use syn::parse_macro_input;
use thiserror::Error;

#[derive(Debug, FromDeriveInput)]
#[darling(
    attributes(command),
    forward_attrs(doc),
    supports(struct_named, struct_unit)
)]
struct CommandReceiver {
    ident: syn::Ident,
    attrs: Vec<syn::Attribute>,
    data: Data<(), OptionReceiver>,
    name: String,
    #[darling(default)]
    description: Option<String>,
    /// Restrict the command to these guilds
    #[darling(multiple)]
    guild: Vec<u64>,
    /// Space separated path of the parent command
    #[darling(default)]
    parent: Option<String>,
    /// Declare a user context-menu command instead of a slash command
    user: Flag,
    /// Declare a message context-menu command instead of a slash command
    message: Flag,
    /// Leave `CommandHooks` to a hand-written impl
    manual_hooks: Flag,
    /// `Permissions` constants a member needs by default, e.g.
    /// `permissions(MANAGE_GUILD)`. An empty list limits the command to
    /// administrators.
    #[darling(default)]
    permissions: Option<PathList>,
    /// `InteractionContextType` variants the command is available in
    #[darling(default)]
    contexts: Option<PathList>,
    /// `ApplicationIntegrationType` variants the command is installable with
    #[darling(default)]
    integration_types: Option<PathList>,
}

#[derive(Debug, FromField)]
#[darling(attributes(option), forward_attrs(doc))]
struct OptionReceiver {
    ident: Option<syn::Ident>,
    ty: syn::Type,
    attrs: Vec<syn::Attribute>,
    /// Override the name of the command option
    #[darling(default)]
    name: Option<String>,
    /// Set the description of the command option
    #[darling(default)]
    description: Option<String>,
    /// For channel options, restrict to specific channel types
    #[darling(default)]
    channel_types: Option<PathList>,
    autocomplete: Flag,
    /// Value used when the option is omitted
    #[darling(default)]
    default: Option<Literal>,
    #[darling(default)]
    min: Option<Literal>,
    #[darling(default)]
    max: Option<Literal>,
    #[darling(default)]
    min_length: Option<u16>,
    #[darling(default)]
    max_length: Option<u16>,
}

/// An attribute value kept as written. String literals stay strings
/// instead of being parsed as paths.
#[derive(Debug)]
struct Literal(Expr);

impl FromMeta for Literal {
    fn from_expr(expr: &Expr) -> darling::Result<Self> {
        Ok(Literal(expr.clone()))
    }
}

#[derive(Error, Debug)]
enum FieldError {
    #[error("Unable to determine field name for option")]
    MissingFieldName,
    #[error("channel_types can only be specified for channel fields")]
    ChannelTypesOnNonChannel,
    #[error("bounds must be integer or float literals")]
    InvalidBound,
    #[error("a command is either `user` or `message`, not both")]
    ConflictingKinds,
    #[error("context menu commands take a single field holding their target")]
    ContextFields,
    #[error("context menu commands cannot declare a description or parent")]
    ContextAttributes,
}

impl FieldError {
    fn to_compile_error(&self) -> TokenStream2 {
        darling::Error::custom(self.to_string()).write_errors()
    }
}

pub fn derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as syn::DeriveInput);
    let receiver = match CommandReceiver::from_derive_input(&input) {
        Ok(r) => r,
        Err(e) => return e.write_errors().into(),
    };

    let Some(fields) = receiver.data.as_ref().take_struct() else {
        return darling::Error::unsupported_shape("enum")
            .write_errors()
            .into();
    };

    let kind = match (receiver.user.is_present(), receiver.message.is_present()) {
        (true, true) => return FieldError::ConflictingKinds.to_compile_error().into(),
        (true, false) => Some(quote! { user }),
        (false, true) => Some(quote! { message }),
        (false, false) => None,
    };

    let ident = &receiver.ident;
    let hooks = (!receiver.manual_hooks.is_present()).then(|| {
        quote! {
            #[automatically_derived]
            impl ::twilight_app_commands::commands::CommandHooks for #ident {}
        }
    });

    let body = match kind {
        Some(kind) => context_command(&receiver, &fields.fields, kind),
        None => slash_command(&receiver, &fields.fields),
    };
    let body = match body {
        Ok(body) => body,
        Err(e) => return e.to_compile_error().into(),
    };

    quote! {
        #body
        #hooks
    }
    .into()
}

fn slash_command(
    receiver: &CommandReceiver,
    fields: &[&OptionReceiver],
) -> Result<TokenStream2, FieldError> {
    let mut options = Vec::new();
    let mut struct_fields = Vec::new();
    for field in fields {
        let name = get_name(field)?;
        options.push(field_option(field, &name)?);

        let Some(ident) = &field.ident else {
            return Err(FieldError::MissingFieldName);
        };
        let ty = &field.ty;
        struct_fields.push(quote! {
            #ident: arguments.take::<#ty>(#name)?
        });
    }

    let ident = &receiver.ident;
    let command_name = &receiver.name;

    let description = receiver
        .description
        .clone()
        .or_else(|| doc_comment(&receiver.attrs))
        .map(|description| quote! { .description(#description) });
    let parent = receiver
        .parent
        .as_ref()
        .map(|parent| quote! { .parent(#parent) });
    let shared = shared_attributes(receiver);

    let arguments = if struct_fields.is_empty() {
        quote! { let _ = arguments; }
    } else {
        quote! { let mut arguments = arguments; }
    };

    Ok(quote! {
        #[automatically_derived]
        impl ::twilight_app_commands::commands::Command for #ident {
            fn declare() -> ::twilight_app_commands::commands::CommandBuilder {
                ::twilight_app_commands::commands::CommandBuilder::slash(#command_name)
                    #description
                    #parent
                    #shared
                    #(.option(#options))*
            }

            fn from_arguments(
                arguments: ::twilight_app_commands::binder::BoundArguments,
            ) -> ::twilight_app_commands::error::Result<Self> {
                #arguments
                Ok(Self {
                    #(#struct_fields,)*
                })
            }
        }
    })
}

fn context_command(
    receiver: &CommandReceiver,
    fields: &[&OptionReceiver],
    kind: TokenStream2,
) -> Result<TokenStream2, FieldError> {
    if receiver.description.is_some() || receiver.parent.is_some() {
        return Err(FieldError::ContextAttributes);
    }

    let construct = match fields {
        [] => quote! {
            let _ = target;
            Ok(Self {})
        },
        [field] => {
            let Some(ident) = &field.ident else {
                return Err(FieldError::MissingFieldName);
            };
            let ty = &field.ty;
            quote! {
                Ok(Self {
                    #ident: <#ty as ::twilight_app_commands::binder::FromTarget>::from_target(target)?,
                })
            }
        }
        _ => return Err(FieldError::ContextFields),
    };

    let ident = &receiver.ident;
    let command_name = &receiver.name;
    let shared = shared_attributes(receiver);

    Ok(quote! {
        #[automatically_derived]
        impl ::twilight_app_commands::commands::ContextCommand for #ident {
            fn declare() -> ::twilight_app_commands::commands::CommandBuilder {
                ::twilight_app_commands::commands::CommandBuilder::#kind(#command_name)
                    #shared
            }

            fn from_target(
                target: ::twilight_app_commands::binder::ContextTarget,
            ) -> ::twilight_app_commands::error::Result<Self> {
                #construct
            }
        }
    })
}

/// Builder calls for the attributes slash and context menu commands share.
fn shared_attributes(receiver: &CommandReceiver) -> TokenStream2 {
    let mut calls = TokenStream2::new();
    if !receiver.guild.is_empty() {
        let guilds = &receiver.guild;
        calls.extend(quote! {
            .guilds([#(::twilight_app_commands::twilight_model::id::Id::new(#guilds)),*])
        });
    }
    if let Some(permissions) = &receiver.permissions {
        let permissions = permissions.iter().map(|path| {
            quote! { ::twilight_app_commands::twilight_model::guild::Permissions::#path }
        });
        calls.extend(quote! {
            .default_member_permissions(
                ::twilight_app_commands::twilight_model::guild::Permissions::empty()
                    #(| #permissions)*
            )
        });
    }
    if let Some(contexts) = &receiver.contexts {
        let contexts = contexts.iter().map(|path| {
            quote! {
                ::twilight_app_commands::twilight_model::application::interaction::InteractionContextType::#path
            }
        });
        calls.extend(quote! { .contexts([#(#contexts),*]) });
    }
    if let Some(types) = &receiver.integration_types {
        let types = types.iter().map(|path| {
            quote! { ::twilight_app_commands::twilight_model::oauth::ApplicationIntegrationType::#path }
        });
        calls.extend(quote! { .integration_types([#(#types),*]) });
    }
    calls
}

fn field_option(field: &OptionReceiver, name: &str) -> Result<TokenStream2, FieldError> {
    let ty = &field.ty;
    let mut option = quote! {
        <#ty as ::twilight_app_commands::arguments::ToOption>::to_option().name(#name)
    };

    if let Some(description) = field
        .description
        .clone()
        .or_else(|| doc_comment(&field.attrs))
    {
        option.extend(quote! { .description(#description) });
    }

    if let Some(types) = &field.channel_types {
        if !validate_channel_type(ty) {
            return Err(FieldError::ChannelTypesOnNonChannel);
        }
        let types = types
            .iter()
            .map(|path| quote! { ::twilight_app_commands::twilight_model::channel::ChannelType::#path });
        option.extend(quote! { .channel_types(vec![#(#types),*]) });
    }

    if field.autocomplete.is_present() {
        option.extend(quote! { .autocomplete(true) });
    }
    if let Some(Literal(default)) = &field.default {
        option.extend(quote! { .default(#default) });
    }
    if let Some(Literal(min)) = &field.min {
        let min = bound(min)?;
        option.extend(quote! { .min_value(#min) });
    }
    if let Some(Literal(max)) = &field.max {
        let max = bound(max)?;
        option.extend(quote! { .max_value(#max) });
    }
    if let Some(min_length) = field.min_length {
        option.extend(quote! { .min_length(#min_length) });
    }
    if let Some(max_length) = field.max_length {
        option.extend(quote! { .max_length(#max_length) });
    }

    Ok(option)
}

/// Maps a possibly negated literal onto the matching bound variant.
fn bound(expr: &Expr) -> Result<TokenStream2, FieldError> {
    let literal = match expr {
        Expr::Unary(ExprUnary {
            op: UnOp::Neg(_),
            expr,
            ..
        }) => expr.as_ref(),
        expr => expr,
    };
    let variant = match literal {
        Expr::Lit(ExprLit {
            lit: Lit::Int(_), ..
        }) => quote! { Integer },
        Expr::Lit(ExprLit {
            lit: Lit::Float(_), ..
        }) => quote! { Number },
        _ => return Err(FieldError::InvalidBound),
    };
    Ok(quote! {
        ::twilight_app_commands::twilight_model::application::command::CommandOptionValue::#variant(#expr)
    })
}

/// Joins `///` lines into a single description.
fn doc_comment(attrs: &[syn::Attribute]) -> Option<String> {
    let lines = attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| match &attr.meta {
            syn::Meta::NameValue(syn::MetaNameValue {
                value:
                    Expr::Lit(ExprLit {
                        lit: Lit::Str(text),
                        ..
                    }),
                ..
            }) => Some(text.value().trim().to_string()),
            _ => None,
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>();

    (!lines.is_empty()).then(|| lines.join(" "))
}

/// Gets the name of an `OptionReceiver`
fn get_name(field: &OptionReceiver) -> Result<String, FieldError> {
    if let Some(name) = &field.name {
        Ok(name.clone())
    } else if let Some(ident) = &field.ident {
        Ok(ident.to_string().trim_start_matches("r#").to_string())
    } else {
        Err(FieldError::MissingFieldName)
    }
}

/// Accepts `Id<ChannelMarker>` and `InteractionChannel`, optionally wrapped
/// in `Option`.
fn validate_channel_type(type_: &Type) -> bool {
    let Type::Path(type_path) = type_ else {
        return false;
    };
    let Some(segment) = type_path.path.segments.last() else {
        return false;
    };

    if segment.ident == "InteractionChannel" {
        return true;
    }
    if (segment.ident == "Id" || segment.ident == "Option")
        && let PathArguments::AngleBracketed(args) = &segment.arguments
        && let Some(GenericArgument::Type(inner)) = args.args.first()
    {
        if segment.ident == "Option" {
            return validate_channel_type(inner);
        }
        if let Type::Path(inner_type_path) = inner
            && let Some(inner_segment) = inner_type_path.path.segments.last()
        {
            return inner_segment.ident == "ChannelMarker";
        }
    }
    false
}
