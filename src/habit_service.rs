//! # Feature: Habit Domain Service
//!
//! Orchestrates persistence gateway calls into user-facing habit operations:
//! get-or-create user, create/complete/edit/delete habit, progress counts and
//! the daily rollover. Ownership is checked on every habit-targeted call.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Rollover closes out habits at the completion threshold
//! - 1.0.0: Initial release

use crate::database::Database;
use crate::error::{HabitError, HabitResult};
use crate::models::{
    Habit, HabitUpdate, NewHabit, NewUser, RolloverReport, User, UserUpdate, DEFAULT_COMPLETION_THRESHOLD,
};
use chrono::Utc;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the daily rollover does with habits that reached the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloverPolicy {
    /// Mark formed habits inactive; the rest carry over unchanged
    #[default]
    DeactivateCompleted,
    /// Leave every habit untouched
    CarryOverAll,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid rollover policy '{0}', use: deactivate_completed, carry_over_all")]
pub struct InvalidRolloverPolicy(pub String);

impl FromStr for RolloverPolicy {
    type Err = InvalidRolloverPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deactivate_completed" => Ok(RolloverPolicy::DeactivateCompleted),
            "carry_over_all" => Ok(RolloverPolicy::CarryOverAll),
            _ => Err(InvalidRolloverPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for RolloverPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RolloverPolicy::DeactivateCompleted => write!(f, "deactivate_completed"),
            RolloverPolicy::CarryOverAll => write!(f, "carry_over_all"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HabitRules {
    pub completion_threshold: u32,
    pub rollover_policy: RolloverPolicy,
}

impl Default for HabitRules {
    fn default() -> Self {
        HabitRules {
            completion_threshold: DEFAULT_COMPLETION_THRESHOLD,
            rollover_policy: RolloverPolicy::default(),
        }
    }
}

#[derive(Clone)]
pub struct HabitService {
    database: Database,
    rules: HabitRules,
}

impl HabitService {
    pub fn new(database: Database, rules: HabitRules) -> Self {
        HabitService { database, rules }
    }

    pub fn completion_threshold(&self) -> u32 {
        self.rules.completion_threshold
    }

    /// Look up a user by external id, creating it on a miss
    pub async fn get_or_create_user(
        &self,
        external_id: &str,
        display_name: Option<&str>,
        email: Option<&str>,
    ) -> HabitResult<User> {
        if let Some(user) = self.database.find_user_by_external_id(external_id).await? {
            return Ok(user);
        }

        let new_user = NewUser {
            external_id: external_id.to_string(),
            display_name: display_name.map(str::to_string).filter(|n| !n.is_empty()),
            email: email.map(str::to_string),
            hashed_password: None,
        };

        self.insert_or_reread_user(&new_user).await
    }

    /// Insert a user row, falling back to the existing row when a concurrent
    /// first contact already created it.
    pub async fn insert_or_reread_user(&self, new_user: &NewUser) -> HabitResult<User> {
        let external_id = new_user.external_id.as_str();
        match self.database.create_user(new_user).await {
            Ok(user) => {
                info!("Created new user with external id: {external_id}");
                Ok(user)
            }
            Err(HabitError::Conflict(reason)) => {
                warn!("User creation for {external_id} lost a race, re-reading: {reason}");
                self.database
                    .find_user_by_external_id(external_id)
                    .await?
                    .ok_or(HabitError::Conflict(reason))
            }
            Err(e) => {
                error!("Error getting or creating user: {e}");
                Err(e)
            }
        }
    }

    /// Register a user explicitly; duplicates are rejected, not merged
    pub async fn create_user(&self, new_user: NewUser) -> HabitResult<User> {
        if new_user.external_id.trim().is_empty() {
            return Err(HabitError::Validation("telegram_id must not be empty".to_string()));
        }
        if self.database.find_user_by_external_id(&new_user.external_id).await?.is_some() {
            return Err(HabitError::Conflict(
                "The user with this telegram ID already exists in the system.".to_string(),
            ));
        }
        if let Some(ref email) = new_user.email {
            if self.database.find_user_by_email(email).await?.is_some() {
                return Err(HabitError::Conflict(
                    "The user with this email already exists in the system.".to_string(),
                ));
            }
        }
        self.database.create_user(&new_user).await
    }

    pub async fn get_user_by_external_id(&self, external_id: &str) -> HabitResult<User> {
        self.database
            .find_user_by_external_id(external_id)
            .await?
            .ok_or_else(HabitError::user_not_found)
    }

    pub async fn update_user(&self, user_id: i64, update: UserUpdate) -> HabitResult<User> {
        if let Some(ref email) = update.email {
            if let Some(existing) = self.database.find_user_by_email(email).await? {
                if existing.id != user_id {
                    return Err(HabitError::Conflict("User with this email already exists".to_string()));
                }
            }
        }
        self.database.update_user(user_id, &update).await
    }

    pub async fn delete_user(&self, user_id: i64) -> HabitResult<()> {
        self.database.delete_user(user_id).await
    }

    pub async fn list_users(&self) -> HabitResult<Vec<User>> {
        self.database.list_users().await
    }

    /// Active habits of a user, id ascending
    pub async fn list_active_habits(&self, user_id: i64) -> HabitResult<Vec<Habit>> {
        self.database.list_habits_by_owner(user_id, true).await
    }

    pub async fn list_all_habits(&self, user_id: i64) -> HabitResult<Vec<Habit>> {
        self.database.list_habits_by_owner(user_id, false).await
    }

    pub async fn create_habit(&self, user_id: i64, title: &str, description: &str) -> HabitResult<Habit> {
        let title = title.trim();
        if title.is_empty() {
            return Err(HabitError::Validation("Habit title must not be empty".to_string()));
        }

        let description = description.trim();
        let new_habit = NewHabit {
            owner_id: user_id,
            title: title.to_string(),
            description: (!description.is_empty()).then(|| description.to_string()),
        };

        let habit = self.database.create_habit(&new_habit).await?;
        info!("User {user_id} created habit {} '{}'", habit.id, habit.title);
        Ok(habit)
    }

    /// Fetch a habit on behalf of its owner
    pub async fn get_habit(&self, habit_id: i64, user_id: i64) -> HabitResult<Habit> {
        let habit = self.database.get_habit(habit_id).await?;
        if habit.owner_id != user_id {
            warn!("User {user_id} tried to access habit {habit_id} owned by {}", habit.owner_id);
            return Err(HabitError::PermissionDenied);
        }
        Ok(habit)
    }

    /// Record the day's outcome. `completed = false` is a no-op, not a decrement.
    pub async fn mark_completed(&self, habit_id: i64, user_id: i64, completed: bool) -> HabitResult<Habit> {
        let habit = self.get_habit(habit_id, user_id).await?;
        if !completed {
            return Ok(habit);
        }
        self.database.increment_completion(habit_id, Utc::now()).await
    }

    pub async fn update_habit(&self, habit_id: i64, user_id: i64, update: HabitUpdate) -> HabitResult<Habit> {
        let habit = self.get_habit(habit_id, user_id).await?;

        let mut update = update;
        if let Some(ref title) = update.title {
            let trimmed = title.trim();
            if trimmed.is_empty() {
                return Err(HabitError::Validation("Habit title must not be empty".to_string()));
            }
            update.title = Some(trimmed.to_string());
        }
        if let Some(ref description) = update.description {
            update.description = Some(description.trim().to_string());
        }
        if update.is_empty() {
            return Ok(habit);
        }

        self.database.update_habit(habit_id, &update).await
    }

    pub async fn delete_habit(&self, habit_id: i64, user_id: i64) -> HabitResult<Habit> {
        self.get_habit(habit_id, user_id).await?;
        self.database.delete_habit(habit_id).await
    }

    /// Active habit count for an external id; unknown users and storage
    /// failures both yield 0
    pub async fn count_active_habits(&self, external_id: &str) -> usize {
        let user = match self.database.find_user_by_external_id(external_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return 0,
            Err(e) => {
                error!("Error getting active habits count: {e}");
                return 0;
            }
        };

        match self.database.list_habits_by_owner(user.id, true).await {
            Ok(habits) => habits.len(),
            Err(e) => {
                error!("Error getting active habits count: {e}");
                0
            }
        }
    }

    /// Advance every user's habit cycle.
    ///
    /// Active habits below the threshold carry over unchanged. Those at or above
    /// it are closed out (marked inactive) under `DeactivateCompleted`. A failure
    /// on one user is logged and the batch moves on.
    pub async fn rollover_daily(&self) -> HabitResult<RolloverReport> {
        let threshold = self.rules.completion_threshold;
        let users = self.database.list_users().await?;
        let mut report = RolloverReport::default();

        for user in &users {
            let habits = match self.database.list_habits_by_owner(user.id, true).await {
                Ok(habits) => habits,
                Err(e) => {
                    error!("Rollover: failed to load habits for user {}: {e}", user.id);
                    continue;
                }
            };

            for habit in habits {
                if !habit.is_cycle_complete(threshold) {
                    report.carried_over += 1;
                    continue;
                }

                match self.rules.rollover_policy {
                    RolloverPolicy::CarryOverAll => report.carried_over += 1,
                    RolloverPolicy::DeactivateCompleted => {
                        let close_out = HabitUpdate {
                            is_active: Some(false),
                            ..HabitUpdate::default()
                        };
                        match self.database.update_habit(habit.id, &close_out).await {
                            Ok(_) => {
                                info!("Habit {} '{}' formed after {} completions", habit.id, habit.title, habit.completion_count);
                                report.closed_out += 1;
                            }
                            Err(e) => error!("Rollover: failed to close out habit {}: {e}", habit.id),
                        }
                    }
                }
            }
            report.users_processed += 1;
        }

        info!(
            "Daily habits processing completed: {} users, {} carried over, {} closed out",
            report.users_processed, report.carried_over, report.closed_out
        );
        Ok(report)
    }
}
