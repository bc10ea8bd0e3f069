//! Routing data model: functions, subscriptions and the events routed to them.
mod event;
mod function;
mod response;
mod subscription;
pub use event::*;
pub use function::*;
pub use response::*;
pub use subscription::*;


use crate::constants::DEFAULT_SPACE;
use crate::RegistryError;

pub(crate) fn default_space() -> String {
    DEFAULT_SPACE.to_string()
}

/// Ids end up inside store keys: alphanumeric start, then `[A-Za-z0-9._-]`.
pub(crate) fn validate_id(
    field: &str,
    id: &str,
) -> std::result::Result<(), RegistryError> {
    let mut chars = id.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(RegistryError::Validation(format!("{} {:?} is invalid", field, id)))
    }
}
