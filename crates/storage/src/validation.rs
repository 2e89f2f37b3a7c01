//! Field validation shared by every [`StatStore`](crate::StatStore)
//! implementation.
//!
//! Implementations call [`validate_fields`] at the top of each mutating
//! operation, before touching any state, so a rejected call never leaves a
//! partial write behind.

use crate::error::{StorageError, StorageResult};

/// Field name used for service provider values.
pub const FIELD_SP: &str = "sp";
/// Field name used for identity provider values.
pub const FIELD_IDP: &str = "idp";
/// Field name used for ticket tokens.
pub const FIELD_TICKET: &str = "ticket";

/// Validates a single named field.
///
/// # Errors
///
/// Returns [`StorageError::Validation`] if `value` is empty.
pub fn validate_field(field: &str, value: &str) -> StorageResult<()> {
    if value.is_empty() {
        return Err(StorageError::validation(field, "value must be a non-empty string"));
    }
    Ok(())
}

/// Validates a set of `(field, value)` pairs in order.
///
/// The first offending field is reported.
///
/// # Errors
///
/// Returns [`StorageError::Validation`] naming the first empty field.
///
/// # Examples
///
/// ```
/// use idpstat_storage::validation::{FIELD_IDP, FIELD_SP, validate_fields};
///
/// assert!(validate_fields(&[(FIELD_SP, "https://sp.example.org"), (FIELD_IDP, "idp")]).is_ok());
/// assert!(validate_fields(&[(FIELD_SP, ""), (FIELD_IDP, "idp")]).is_err());
/// ```
pub fn validate_fields(fields: &[(&str, &str)]) -> StorageResult<()> {
    fields.iter().try_for_each(|(field, value)| validate_field(field, value))
}
