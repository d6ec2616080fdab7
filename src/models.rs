//! Durable entities owned by the persistence gateway

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of completions that forms a habit
pub const DEFAULT_COMPLETION_THRESHOLD: u32 = 21;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    /// Chat identifier assigned by the messaging transport; immutable
    #[serde(rename = "telegram_id")]
    pub external_id: String,
    #[serde(rename = "username")]
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub is_active: bool,
    #[serde(skip_serializing)]
    pub hashed_password: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Habit {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub completion_count: u32,
    pub last_completed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub owner_id: i64,
}

impl Habit {
    /// A habit is formed once its counter reaches the threshold
    pub fn is_cycle_complete(&self, threshold: u32) -> bool {
        self.completion_count >= threshold
    }

    /// "count/threshold" progress label
    pub fn progress(&self, threshold: u32) -> String {
        format!("{}/{}", self.completion_count, threshold)
    }

    pub fn description_text(&self) -> Option<&str> {
        self.description.as_deref().filter(|d| !d.is_empty())
    }
}

/// Fields for inserting a user row
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub external_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub hashed_password: Option<String>,
}

/// Partial user update; `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub hashed_password: Option<String>,
    pub is_active: Option<bool>,
}

/// Fields for inserting a habit row
#[derive(Debug, Clone)]
pub struct NewHabit {
    pub owner_id: i64,
    pub title: String,
    pub description: Option<String>,
}

/// Partial habit update; `None` leaves the column untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HabitUpdate {
    pub title: Option<String>,
    /// `Some("")` clears the description
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub completion_count: Option<u32>,
}

impl HabitUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.is_active.is_none()
            && self.completion_count.is_none()
    }
}

/// Outcome of the daily rollover batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolloverReport {
    pub users_processed: usize,
    pub carried_over: usize,
    pub closed_out: usize,
}
