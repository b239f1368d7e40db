//! Record identifiers: fresh ids and lookup references.

use std::fmt::Display;

/// Generate a fresh record id (random UUID v4, hyphenated).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Address a record by a unique attribute instead of its id.
///
/// The result can be used anywhere a step or link expects an id.
///
/// ```
/// assert_eq!(instant_core::lookup("title", "todo 1"), r#"lookup__title__"todo 1""#);
/// ```
pub fn lookup(attribute: &str, value: impl Display) -> String {
    format!("lookup__{attribute}__\"{value}\"")
}
