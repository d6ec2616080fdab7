//! # Feature: Error Taxonomy
//!
//! Typed failures shared by the persistence gateway, the habit service, the
//! dialogue engine, the scheduler and the REST layer.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

use thiserror::Error;

/// SQLite primary result code for constraint violations (UNIQUE, FOREIGN KEY, ...)
const SQLITE_CONSTRAINT: isize = 19;

#[derive(Debug, Error)]
pub enum HabitError {
    /// Entity absent from the store
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    /// Ownership mismatch between the acting user and the habit
    #[error("Not enough permissions")]
    PermissionDenied,

    /// Malformed input, e.g. a title that is too short
    #[error("{0}")]
    Validation(String),

    /// Outbound message could not be delivered
    #[error("failed to deliver message to chat {chat_id}: {reason}")]
    TransientDelivery { chat_id: String, reason: String },

    /// Uniqueness constraint rejected a write
    #[error("{0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlite::Error),

    /// Stored value could not be decoded
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

pub type HabitResult<T> = Result<T, HabitError>;

impl HabitError {
    pub fn user_not_found() -> Self {
        HabitError::NotFound { entity: "User" }
    }

    pub fn habit_not_found() -> Self {
        HabitError::NotFound { entity: "Habit" }
    }

    pub fn delivery(chat_id: impl Into<String>, reason: impl ToString) -> Self {
        HabitError::TransientDelivery {
            chat_id: chat_id.into(),
            reason: reason.to_string(),
        }
    }
}

/// Check whether a raw sqlite error is a constraint violation
pub fn is_constraint_violation(error: &sqlite::Error) -> bool {
    if error.code == Some(SQLITE_CONSTRAINT) {
        return true;
    }
    // Extended codes (e.g. 2067 for UNIQUE) keep the primary code in the low byte
    if let Some(code) = error.code {
        if code & 0xff == SQLITE_CONSTRAINT {
            return true;
        }
    }
    error
        .message
        .as_deref()
        .map(|m| m.contains("constraint failed"))
        .unwrap_or(false)
}
