use crate::api::auth::CurrentUser;
use crate::api::error::ApiError;
use crate::api::AppState;
use crate::models::{Habit, HabitUpdate};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CreateHabitRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CompletionRequest {
    pub completed: bool,
}

pub async fn create_habit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<CreateHabitRequest>,
) -> Result<(StatusCode, Json<Habit>), ApiError> {
    let mut habit = state
        .service
        .create_habit(user.id, &request.title, request.description.as_deref().unwrap_or(""))
        .await?;

    if !request.is_active {
        let deactivate = HabitUpdate {
            is_active: Some(false),
            ..HabitUpdate::default()
        };
        habit = state.service.update_habit(habit.id, user.id, deactivate).await?;
    }
    Ok((StatusCode::CREATED, Json(habit)))
}

/// Active habits of the caller, id ascending
pub async fn list_habits(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Habit>>, ApiError> {
    Ok(Json(state.service.list_active_habits(user.id).await?))
}

pub async fn read_habit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(habit_id): Path<i64>,
) -> Result<Json<Habit>, ApiError> {
    Ok(Json(state.service.get_habit(habit_id, user.id).await?))
}

pub async fn update_habit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(habit_id): Path<i64>,
    Json(update): Json<HabitUpdate>,
) -> Result<Json<Habit>, ApiError> {
    Ok(Json(state.service.update_habit(habit_id, user.id, update).await?))
}

pub async fn delete_habit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(habit_id): Path<i64>,
) -> Result<Json<Habit>, ApiError> {
    Ok(Json(state.service.delete_habit(habit_id, user.id).await?))
}

pub async fn complete_habit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(habit_id): Path<i64>,
    Json(completion): Json<CompletionRequest>,
) -> Result<Json<Habit>, ApiError> {
    Ok(Json(
        state
            .service
            .mark_completed(habit_id, user.id, completion.completed)
            .await?,
    ))
}
