//! §6.1 naming rules, enforced on every user-supplied environment name.
//! Generated petname IDs are constructed to always satisfy these rules, so
//! `open_or_create` never needs a second validation pass for generated
//! names — only user-supplied ones.

use crate::error::EngineError;

const FORBIDDEN_CHARS: &[char] = &[
    '~', '^', ':', '?', '*', '[', '\\', '/', '"', '<', '>', '|', '@', '{', '}',
];

/// Validate a user-supplied environment name against §6.1.
pub fn validate_name(name: &str) -> Result<(), EngineError> {
    let invalid = || EngineError::InvalidName(name.to_string());

    if name.is_empty() {
        return Err(invalid());
    }
    if name.len() > 100 {
        return Err(invalid());
    }
    if name.contains(' ') || name.contains('_') {
        return Err(invalid());
    }
    if name.contains("..") {
        return Err(invalid());
    }
    if name.chars().any(|c| FORBIDDEN_CHARS.contains(&c)) {
        return Err(invalid());
    }
    if name.chars().any(|c| c == '\t' || c == '\n' || c == '\r' || c.is_control()) {
        return Err(invalid());
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid());
    }
    if name.starts_with('.') || name.ends_with('.') {
        return Err(invalid());
    }
    if name.ends_with(".lock") {
        return Err(invalid());
    }

    Ok(())
}
