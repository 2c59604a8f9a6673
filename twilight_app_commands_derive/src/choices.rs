use std::collections::HashSet;

use darling::ast::Data;
use darling::{FromDeriveInput, FromVariant};
use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, Ident, parse_macro_input};

/// Discord's limit on choices per option.
const MAX_CHOICES: usize = 25;

#[derive(FromDeriveInput)]
#[darling(attributes(choice), supports(enum_unit))]
struct ChoicesEnumReceiver {
    ident: Ident,
    data: Data<ChoiceVariant, ()>,
}

#[derive(FromVariant)]
#[darling(attributes(choice))]
struct ChoiceVariant {
    ident: Ident,
    /// Shown to the user. Defaults to the variant name.
    #[darling(default)]
    name: Option<String>,
    /// Sent back in the interaction. Defaults to the variant name.
    #[darling(default)]
    value: Option<String>,
}

pub fn derive(tokens: TokenStream) -> TokenStream {
    let input = parse_macro_input!(tokens as DeriveInput);

    let receiver = match ChoicesEnumReceiver::from_derive_input(&input) {
        Ok(val) => val,
        Err(err) => return TokenStream::from(err.write_errors()),
    };

    let Some(variants) = receiver.data.as_ref().take_enum() else {
        return darling::Error::unsupported_shape("struct")
            .write_errors()
            .into();
    };
    let enum_name = &receiver.ident;
    let variants = variants
        .iter()
        .map(|variant| {
            let fallback = variant.ident.to_string();
            (
                &variant.ident,
                variant.name.clone().unwrap_or_else(|| fallback.clone()),
                variant.value.clone().unwrap_or(fallback),
            )
        })
        .collect::<Vec<_>>();

    if variants.is_empty() {
        return darling::Error::custom("Choices enums need at least one variant")
            .write_errors()
            .into();
    }
    if variants.len() > MAX_CHOICES {
        return darling::Error::custom(format!(
            "Enums with more than {MAX_CHOICES} variants are not supported"
        ))
        .write_errors()
        .into();
    }

    let mut seen_values = HashSet::new();
    for (_, _, value) in &variants {
        if !seen_values.insert(value) {
            return darling::Error::custom(format!("Duplicate choice value found: {}", value))
                .write_errors()
                .into();
        }
    }

    let choices = variants.iter().map(|(_, name, value)| {
        quote! {
            .choice(
                #name,
                ::twilight_app_commands::twilight_model::application::command::CommandOptionChoiceValue::String(
                    #value.to_string()
                ),
            )
        }
    });

    let matches = variants.iter().map(|(ident, _, value)| {
        quote! {
            #value => return Ok(#enum_name::#ident)
        }
    });

    quote! {
        #[automatically_derived]
        impl ::twilight_app_commands::arguments::ToOption for #enum_name {
            fn to_option() -> ::twilight_app_commands::arguments::CommandOption {
                ::twilight_app_commands::arguments::CommandOption::new(
                    ::twilight_app_commands::twilight_model::application::command::CommandOptionType::String
                )
                #(#choices)*
            }
        }

        #[automatically_derived]
        impl ::twilight_app_commands::arguments::ArgumentConverter for #enum_name {
            fn convert(
                option: &str,
                value: ::twilight_app_commands::arguments::ArgumentValue,
            ) -> ::twilight_app_commands::error::Result<Self> {
                let reason = match value {
                    ::twilight_app_commands::arguments::ArgumentValue::String(value) => {
                        match value.as_str() {
                            #(#matches,)*
                            other => format!("`{other}` is not one of the choices"),
                        }
                    }
                    other => format!("expected a choice, received {:?}", other.kind()),
                };
                Err(::twilight_app_commands::error::Error::TypeMismatch {
                    option: option.to_string(),
                    reason,
                })
            }
        }
    }
    .into()
}
