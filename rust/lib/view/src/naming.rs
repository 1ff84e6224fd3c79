//! Accessor naming convention: `getName` / `isActive` / `setName` → field name.
//!
//! Both camelCase (`getName`) and snake_case (`get_name`) accessors are accepted.

use crate::error::ViewError;

const PREFIXES: [&str; 3] = ["get", "set", "is"];

/// Derive the field name an accessor reads or writes.
///
/// Strips the `get`/`is`/`set` prefix and lower-cases the first letter of
/// the remainder. Fails with `NamingConvention` when no prefix applies.
pub fn field_name(accessor: &str) -> Result<String, ViewError> {
    for prefix in PREFIXES {
        let Some(rest) = accessor.strip_prefix(prefix) else {
            continue;
        };
        if let Some(snake) = rest.strip_prefix('_') {
            if !snake.is_empty() && !snake.starts_with('_') {
                return Ok(snake.to_string());
            }
            continue;
        }
        let mut chars = rest.chars();
        if let Some(first) = chars.next() {
            if first.is_uppercase() {
                let mut name: String = first.to_lowercase().collect();
                name.push_str(chars.as_str());
                return Ok(name);
            }
        }
    }
    Err(ViewError::NamingConvention(accessor.to_string()))
}

/// True if the accessor is a mutator (`set*`).
pub fn is_setter(accessor: &str) -> bool {
    accessor.starts_with("set") && field_name(accessor).is_ok()
}
