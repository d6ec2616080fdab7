use crate::error::{is_constraint_violation, HabitError, HabitResult};
use crate::models::{Habit, HabitUpdate, NewHabit, NewUser, User, UserUpdate};
use chrono::{DateTime, Utc};
use log::{debug, info};
use sqlite::{Connection, State, Statement, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

const USER_COLUMNS: &str =
    "id, external_id, display_name, email, is_active, hashed_password, created_at, updated_at";

const HABIT_COLUMNS: &str = "id, title, description, is_active, completion_count, last_completed, \
     created_at, updated_at, owner_id";

/// Persistence gateway over the `users` and `habits` tables.
///
/// Every call commits on its own; there is no multi-statement transaction.
#[derive(Clone)]
pub struct Database {
    connection: Arc<Mutex<Connection>>,
}

impl Database {
    pub async fn new(database_path: &str) -> HabitResult<Self> {
        let connection = sqlite::open(database_path)?;
        let db = Database {
            connection: Arc::new(Mutex::new(connection)),
        };

        db.init_tables().await?;
        info!("Database initialized at: {database_path}");
        Ok(db)
    }

    async fn init_tables(&self) -> HabitResult<()> {
        let conn = self.connection.lock().await;

        conn.execute("PRAGMA foreign_keys = ON")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id TEXT NOT NULL UNIQUE,
                display_name TEXT,
                email TEXT UNIQUE,
                is_active INTEGER NOT NULL DEFAULT 1,
                hashed_password TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT
            )",
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS habits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                completion_count INTEGER NOT NULL DEFAULT 0 CHECK (completion_count >= 0),
                last_completed TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT,
                owner_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE
            )",
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_habits_owner
             ON habits(owner_id, is_active)",
        )?;

        Ok(())
    }

    // User Methods
    pub async fn create_user(&self, new_user: &NewUser) -> HabitResult<User> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "INSERT INTO users (external_id, display_name, email, is_active, hashed_password, created_at)
             VALUES (?, ?, ?, 1, ?, ?)",
        )?;
        statement.bind((1, new_user.external_id.as_str()))?;
        statement.bind((2, optional_text(new_user.display_name.as_deref())))?;
        statement.bind((3, optional_text(new_user.email.as_deref())))?;
        statement.bind((4, optional_text(new_user.hashed_password.as_deref())))?;
        statement.bind((5, timestamp(Utc::now()).as_str()))?;

        if let Err(e) = statement.next() {
            if is_constraint_violation(&e) {
                return Err(HabitError::Conflict(format!(
                    "The user with external id {} or this email already exists",
                    new_user.external_id
                )));
            }
            return Err(e.into());
        }
        drop(statement);

        let id = last_insert_id(&conn)?;
        let user = select_user(&conn, "id = ?", Value::Integer(id))?.ok_or_else(HabitError::user_not_found)?;
        info!("Created user {} for external id {}", user.id, user.external_id);
        Ok(user)
    }

    pub async fn find_user_by_external_id(&self, external_id: &str) -> HabitResult<Option<User>> {
        let conn = self.connection.lock().await;
        select_user(&conn, "external_id = ?", Value::String(external_id.to_string()))
    }

    pub async fn find_user_by_email(&self, email: &str) -> HabitResult<Option<User>> {
        let conn = self.connection.lock().await;
        select_user(&conn, "email = ?", Value::String(email.to_string()))
    }

    pub async fn list_users(&self) -> HabitResult<Vec<User>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(format!("SELECT {USER_COLUMNS} FROM users ORDER BY id ASC"))?;

        let mut users = Vec::new();
        while let State::Row = statement.next()? {
            users.push(read_user(&statement)?);
        }
        Ok(users)
    }

    pub async fn update_user(&self, user_id: i64, update: &UserUpdate) -> HabitResult<User> {
        let conn = self.connection.lock().await;

        let mut assignments = Vec::new();
        let mut values = Vec::new();
        if let Some(ref name) = update.display_name {
            assignments.push("display_name = ?");
            values.push(Value::String(name.clone()));
        }
        if let Some(ref email) = update.email {
            assignments.push("email = ?");
            values.push(Value::String(email.clone()));
        }
        if let Some(ref hash) = update.hashed_password {
            assignments.push("hashed_password = ?");
            values.push(Value::String(hash.clone()));
        }
        if let Some(active) = update.is_active {
            assignments.push("is_active = ?");
            values.push(Value::Integer(active as i64));
        }

        if !assignments.is_empty() {
            assignments.push("updated_at = ?");
            values.push(Value::String(timestamp(Utc::now())));
            values.push(Value::Integer(user_id));

            let sql = format!("UPDATE users SET {} WHERE id = ?", assignments.join(", "));
            let mut statement = conn.prepare(sql)?;
            bind_all(&mut statement, values)?;
            if let Err(e) = statement.next() {
                if is_constraint_violation(&e) {
                    return Err(HabitError::Conflict(
                        "User with this email already exists".to_string(),
                    ));
                }
                return Err(e.into());
            }
        }

        select_user(&conn, "id = ?", Value::Integer(user_id))?.ok_or_else(HabitError::user_not_found)
    }

    /// Delete a user; owned habits go with it through the foreign key cascade
    pub async fn delete_user(&self, user_id: i64) -> HabitResult<()> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare("DELETE FROM users WHERE id = ?")?;
        statement.bind((1, user_id))?;
        statement.next()?;
        drop(statement);

        if changes(&conn)? == 0 {
            return Err(HabitError::user_not_found());
        }
        info!("Deleted user {user_id}");
        Ok(())
    }

    // Habit Methods
    pub async fn create_habit(&self, new_habit: &NewHabit) -> HabitResult<Habit> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "INSERT INTO habits (title, description, is_active, completion_count, created_at, owner_id)
             VALUES (?, ?, 1, 0, ?, ?)",
        )?;
        statement.bind((1, new_habit.title.as_str()))?;
        statement.bind((2, optional_text(new_habit.description.as_deref())))?;
        statement.bind((3, timestamp(Utc::now()).as_str()))?;
        statement.bind((4, new_habit.owner_id))?;

        if let Err(e) = statement.next() {
            // Only the owner foreign key can reject this insert
            if is_constraint_violation(&e) {
                return Err(HabitError::user_not_found());
            }
            return Err(e.into());
        }
        drop(statement);

        let id = last_insert_id(&conn)?;
        let habit = select_habit(&conn, id)?.ok_or_else(HabitError::habit_not_found)?;
        debug!("Created habit {} for user {}", habit.id, habit.owner_id);
        Ok(habit)
    }

    pub async fn get_habit(&self, habit_id: i64) -> HabitResult<Habit> {
        let conn = self.connection.lock().await;
        select_habit(&conn, habit_id)?.ok_or_else(HabitError::habit_not_found)
    }

    /// Habits owned by a user, ordered by id ascending
    pub async fn list_habits_by_owner(&self, owner_id: i64, active_only: bool) -> HabitResult<Vec<Habit>> {
        let conn = self.connection.lock().await;
        let filter = if active_only { " AND is_active = 1" } else { "" };
        let mut statement = conn.prepare(format!(
            "SELECT {HABIT_COLUMNS} FROM habits WHERE owner_id = ?{filter} ORDER BY id ASC"
        ))?;
        statement.bind((1, owner_id))?;

        let mut habits = Vec::new();
        while let State::Row = statement.next()? {
            habits.push(read_habit(&statement)?);
        }
        Ok(habits)
    }

    pub async fn update_habit(&self, habit_id: i64, update: &HabitUpdate) -> HabitResult<Habit> {
        let conn = self.connection.lock().await;

        let mut assignments = Vec::new();
        let mut values = Vec::new();
        if let Some(ref title) = update.title {
            assignments.push("title = ?");
            values.push(Value::String(title.clone()));
        }
        if let Some(ref description) = update.description {
            assignments.push("description = ?");
            values.push(if description.is_empty() {
                Value::Null
            } else {
                Value::String(description.clone())
            });
        }
        if let Some(active) = update.is_active {
            assignments.push("is_active = ?");
            values.push(Value::Integer(active as i64));
        }
        if let Some(count) = update.completion_count {
            assignments.push("completion_count = ?");
            values.push(Value::Integer(count as i64));
        }

        if !assignments.is_empty() {
            assignments.push("updated_at = ?");
            values.push(Value::String(timestamp(Utc::now())));
            values.push(Value::Integer(habit_id));

            let sql = format!("UPDATE habits SET {} WHERE id = ?", assignments.join(", "));
            let mut statement = conn.prepare(sql)?;
            bind_all(&mut statement, values)?;
            statement.next()?;
        }

        select_habit(&conn, habit_id)?.ok_or_else(HabitError::habit_not_found)
    }

    /// Add one completion and stamp `last_completed`
    pub async fn increment_completion(&self, habit_id: i64, completed_at: DateTime<Utc>) -> HabitResult<Habit> {
        let conn = self.connection.lock().await;
        let stamp = timestamp(completed_at);
        let mut statement = conn.prepare(
            "UPDATE habits
             SET completion_count = completion_count + 1, last_completed = ?, updated_at = ?
             WHERE id = ?",
        )?;
        statement.bind((1, stamp.as_str()))?;
        statement.bind((2, stamp.as_str()))?;
        statement.bind((3, habit_id))?;
        statement.next()?;
        drop(statement);

        if changes(&conn)? == 0 {
            return Err(HabitError::habit_not_found());
        }
        select_habit(&conn, habit_id)?.ok_or_else(HabitError::habit_not_found)
    }

    /// Hard-delete a habit, returning the removed row
    pub async fn delete_habit(&self, habit_id: i64) -> HabitResult<Habit> {
        let conn = self.connection.lock().await;
        let habit = select_habit(&conn, habit_id)?.ok_or_else(HabitError::habit_not_found)?;

        let mut statement = conn.prepare("DELETE FROM habits WHERE id = ?")?;
        statement.bind((1, habit_id))?;
        statement.next()?;

        info!("Deleted habit {habit_id} of user {}", habit.owner_id);
        Ok(habit)
    }
}

fn select_user(conn: &Connection, condition: &str, key: Value) -> HabitResult<Option<User>> {
    let mut statement = conn.prepare(format!("SELECT {USER_COLUMNS} FROM users WHERE {condition}"))?;
    statement.bind((1, key))?;

    if let State::Row = statement.next()? {
        Ok(Some(read_user(&statement)?))
    } else {
        Ok(None)
    }
}

fn select_habit(conn: &Connection, habit_id: i64) -> HabitResult<Option<Habit>> {
    let mut statement = conn.prepare(format!("SELECT {HABIT_COLUMNS} FROM habits WHERE id = ?"))?;
    statement.bind((1, habit_id))?;

    if let State::Row = statement.next()? {
        Ok(Some(read_habit(&statement)?))
    } else {
        Ok(None)
    }
}

fn read_user(statement: &Statement) -> HabitResult<User> {
    Ok(User {
        id: statement.read::<i64, _>("id")?,
        external_id: statement.read::<String, _>("external_id")?,
        display_name: statement.read::<Option<String>, _>("display_name")?,
        email: statement.read::<Option<String>, _>("email")?,
        is_active: statement.read::<i64, _>("is_active")? != 0,
        hashed_password: statement.read::<Option<String>, _>("hashed_password")?,
        created_at: parse_timestamp(&statement.read::<String, _>("created_at")?)?,
        updated_at: parse_optional_timestamp(statement.read::<Option<String>, _>("updated_at")?)?,
    })
}

fn read_habit(statement: &Statement) -> HabitResult<Habit> {
    let count = statement.read::<i64, _>("completion_count")?;
    Ok(Habit {
        id: statement.read::<i64, _>("id")?,
        title: statement.read::<String, _>("title")?,
        description: statement.read::<Option<String>, _>("description")?,
        is_active: statement.read::<i64, _>("is_active")? != 0,
        completion_count: u32::try_from(count)
            .map_err(|_| HabitError::CorruptRow(format!("completion_count {count}")))?,
        last_completed: parse_optional_timestamp(statement.read::<Option<String>, _>("last_completed")?)?,
        created_at: parse_timestamp(&statement.read::<String, _>("created_at")?)?,
        updated_at: parse_optional_timestamp(statement.read::<Option<String>, _>("updated_at")?)?,
        owner_id: statement.read::<i64, _>("owner_id")?,
    })
}

fn bind_all(statement: &mut Statement, values: Vec<Value>) -> HabitResult<()> {
    for (index, value) in values.into_iter().enumerate() {
        statement.bind((index + 1, value))?;
    }
    Ok(())
}

fn last_insert_id(conn: &Connection) -> HabitResult<i64> {
    let mut stmt = conn.prepare("SELECT last_insert_rowid()")?;
    stmt.next()?;
    Ok(stmt.read::<i64, _>(0)?)
}

fn changes(conn: &Connection) -> HabitResult<i64> {
    let mut check = conn.prepare("SELECT changes()")?;
    check.next()?;
    Ok(check.read::<i64, _>(0)?)
}

fn optional_text(value: Option<&str>) -> Value {
    match value {
        Some(text) => Value::String(text.to_string()),
        None => Value::Null,
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

fn parse_timestamp(raw: &str) -> HabitResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| HabitError::CorruptRow(format!("timestamp '{raw}': {e}")))
}

fn parse_optional_timestamp(raw: Option<String>) -> HabitResult<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_timestamp).transpose()
}
