//! Trellis Name Validation
//!
//! Validity rules for class names and field names.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use trellis_common::is_system_class;

/// Prefix of join collections backing relation fields.
pub const JOIN_PREFIX: &str = "_Join:";

/// Name of the join collection for a relation field.
pub fn join_collection_name(field_name: &str, class_name: &str) -> String {
    format!("{}{}:{}", JOIN_PREFIX, field_name, class_name)
}

/// `^[A-Za-z][A-Za-z0-9_]*$`, shared by field names and user class names.
pub fn field_name_is_valid(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// A system class, a join collection or an identifier-shaped name.
pub fn class_name_is_valid(class_name: &str) -> bool {
    is_system_class(class_name) || join_class_is_valid(class_name) || field_name_is_valid(class_name)
}

/// `^_Join:[A-Za-z0-9_]+:[A-Za-z0-9_]+`. The pattern is unanchored at the
/// end, so anything may follow the second segment.
pub fn join_class_is_valid(class_name: &str) -> bool {
    let Some(rest) = class_name.strip_prefix(JOIN_PREFIX) else {
        return false;
    };
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';

    let field_len = rest.chars().take_while(|&c| is_word(c)).count();
    if field_len == 0 {
        return false;
    }
    let Some(rest) = rest[field_len..].strip_prefix(':') else {
        return false;
    };
    rest.chars().next().map(is_word).unwrap_or(false)
}

/// Message for an invalid class name.
pub fn invalid_class_name_message(class_name: &str) -> String {
    format!(
        "Invalid classname: {}, classnames can only have alphanumeric characters and _, and must start with an alpha character",
        class_name
    )
}
