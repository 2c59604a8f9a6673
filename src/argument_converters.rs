use twilight_model::{
    application::{command::CommandOptionType, interaction::InteractionChannel},
    guild::Role,
    id::{
        Id,
        marker::{ChannelMarker, RoleMarker, UserMarker},
    },
    user::User,
};

use crate::{
    arguments::{ArgumentConverter, ArgumentValue, CommandOption, ToOption},
    binder::ResolvedUser,
    error::{Error, Result},
};

fn mismatch(option: &str, expected: &str, value: &ArgumentValue) -> Error {
    Error::mismatch(
        option,
        format!("expected {expected}, received {:?}", value.kind()),
    )
}

impl ArgumentConverter for String {
    fn convert(option: &str, value: ArgumentValue) -> Result<Self> {
        if let ArgumentValue::String(value) = value {
            Ok(value)
        } else {
            Err(mismatch(option, "a string", &value))
        }
    }
}

impl ToOption for String {
    fn to_option() -> CommandOption {
        CommandOption::new(CommandOptionType::String)
    }
}

// --- Integer Types ---
macro_rules! integer_converter {
    ($($ty:ty),*) => {
        $(
            impl ArgumentConverter for $ty {
                fn convert(option: &str, value: ArgumentValue) -> Result<Self> {
                    if let ArgumentValue::Integer(value) = value {
                        <$ty>::try_from(value).map_err(|_| {
                            Error::mismatch(
                                option,
                                format!("{value} does not fit in {}", stringify!($ty)),
                            )
                        })
                    } else {
                        Err(mismatch(option, "an integer", &value))
                    }
                }
            }

            impl ToOption for $ty {
                fn to_option() -> CommandOption {
                    CommandOption::new(CommandOptionType::Integer)
                }
            }
        )*
    };
}

integer_converter!(i8, i16, i32, i64, i128, isize);
integer_converter!(u8, u16, u32, u64, u128, usize);

// --- Floating point types ---
impl ArgumentConverter for f64 {
    fn convert(option: &str, value: ArgumentValue) -> Result<Self> {
        match value {
            ArgumentValue::Number(value) => Ok(value),
            ArgumentValue::Integer(value) => Ok(value as f64),
            value => Err(mismatch(option, "a number", &value)),
        }
    }
}

impl ToOption for f64 {
    fn to_option() -> CommandOption {
        CommandOption::new(CommandOptionType::Number)
    }
}

impl ArgumentConverter for f32 {
    fn convert(option: &str, value: ArgumentValue) -> Result<Self> {
        f64::convert(option, value).map(|value| value as f32)
    }
}

impl ToOption for f32 {
    fn to_option() -> CommandOption {
        CommandOption::new(CommandOptionType::Number)
    }
}

// --- Boolean Type ---
impl ArgumentConverter for bool {
    fn convert(option: &str, value: ArgumentValue) -> Result<Self> {
        if let ArgumentValue::Boolean(value) = value {
            Ok(value)
        } else {
            Err(mismatch(option, "a boolean", &value))
        }
    }
}

impl ToOption for bool {
    fn to_option() -> CommandOption {
        CommandOption::new(CommandOptionType::Boolean)
    }
}

// --- Char Type ---
impl ArgumentConverter for char {
    fn convert(option: &str, value: ArgumentValue) -> Result<Self> {
        if let ArgumentValue::String(text) = &value {
            let mut chars = text.chars();
            chars
                .next()
                .ok_or_else(|| Error::mismatch(option, "expected a single character"))
        } else {
            Err(mismatch(option, "a character", &value))
        }
    }
}

impl ToOption for char {
    fn to_option() -> CommandOption {
        CommandOption::new(CommandOptionType::String)
            .min_length(1)
            .max_length(1)
    }
}

// --- User Types ---
impl ArgumentConverter for ResolvedUser {
    fn convert(option: &str, value: ArgumentValue) -> Result<Self> {
        if let ArgumentValue::User(user) = value {
            Ok(*user)
        } else {
            Err(mismatch(option, "a user", &value))
        }
    }
}

impl ToOption for ResolvedUser {
    fn to_option() -> CommandOption {
        CommandOption::new(CommandOptionType::User)
    }
}

impl ArgumentConverter for User {
    fn convert(option: &str, value: ArgumentValue) -> Result<Self> {
        ResolvedUser::convert(option, value).map(|resolved| resolved.user)
    }
}

impl ToOption for User {
    fn to_option() -> CommandOption {
        CommandOption::new(CommandOptionType::User)
    }
}

impl ArgumentConverter for Id<UserMarker> {
    fn convert(option: &str, value: ArgumentValue) -> Result<Self> {
        ResolvedUser::convert(option, value).map(|resolved| resolved.user.id)
    }
}

impl ToOption for Id<UserMarker> {
    fn to_option() -> CommandOption {
        CommandOption::new(CommandOptionType::User)
    }
}

// --- Role Types ---
impl ArgumentConverter for Role {
    fn convert(option: &str, value: ArgumentValue) -> Result<Self> {
        if let ArgumentValue::Role(role) = value {
            Ok(*role)
        } else {
            Err(mismatch(option, "a role", &value))
        }
    }
}

impl ToOption for Role {
    fn to_option() -> CommandOption {
        CommandOption::new(CommandOptionType::Role)
    }
}

impl ArgumentConverter for Id<RoleMarker> {
    fn convert(option: &str, value: ArgumentValue) -> Result<Self> {
        Role::convert(option, value).map(|role| role.id)
    }
}

impl ToOption for Id<RoleMarker> {
    fn to_option() -> CommandOption {
        CommandOption::new(CommandOptionType::Role)
    }
}

// --- Channel Types ---
impl ArgumentConverter for InteractionChannel {
    fn convert(option: &str, value: ArgumentValue) -> Result<Self> {
        if let ArgumentValue::Channel(channel) = value {
            Ok(*channel)
        } else {
            Err(mismatch(option, "a channel", &value))
        }
    }
}

impl ToOption for InteractionChannel {
    fn to_option() -> CommandOption {
        // NOTE: Channel types are filtered as a part of the `command` derive macro
        CommandOption::new(CommandOptionType::Channel)
    }
}

impl ArgumentConverter for Id<ChannelMarker> {
    fn convert(option: &str, value: ArgumentValue) -> Result<Self> {
        InteractionChannel::convert(option, value).map(|channel| channel.id)
    }
}

impl ToOption for Id<ChannelMarker> {
    fn to_option() -> CommandOption {
        CommandOption::new(CommandOptionType::Channel)
    }
}
