use crate::api::auth::{hash_password, verify_password, CurrentUser};
use crate::api::error::ApiError;
use crate::api::AppState;
use crate::error::HabitError;
use crate::models::{Habit, NewUser, User, UserUpdate};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub telegram_id: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub telegram_id: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

#[derive(Debug, Serialize)]
pub struct UserWithHabits {
    #[serde(flatten)]
    pub user: User,
    pub habits: Vec<Habit>,
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let hashed_password = request.password.as_deref().map(hash_password).transpose()?;
    let user = state
        .service
        .create_user(NewUser {
            external_id: request.telegram_id,
            display_name: request.username,
            email: request.email,
            hashed_password,
        })
        .await?;
    info!("Registered user {} via API", user.external_id);
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let rejected = || ApiError::BadRequest("Incorrect telegram ID or password".to_string());

    let user = match state.service.get_user_by_external_id(&request.telegram_id).await {
        Ok(user) => user,
        Err(HabitError::NotFound { .. }) => return Err(rejected()),
        Err(e) => return Err(e.into()),
    };
    let hashed = user.hashed_password.as_deref().ok_or_else(rejected)?;
    if !verify_password(&request.password, hashed) {
        return Err(rejected());
    }
    if !user.is_active {
        return Err(ApiError::BadRequest("Inactive user".to_string()));
    }

    Ok(Json(TokenResponse {
        access_token: state.tokens.issue(&user.external_id)?,
        token_type: "bearer",
    }))
}

pub async fn read_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<UserWithHabits>, ApiError> {
    let habits = state.service.list_all_habits(user.id).await?;
    Ok(Json(UserWithHabits { user, habits }))
}

pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    let update = UserUpdate {
        display_name: request.username,
        email: request.email,
        hashed_password: request.password.as_deref().map(hash_password).transpose()?,
        is_active: None,
    };
    let user = state.service.update_user(user.id, update).await?;
    Ok(Json(user))
}

pub async fn delete_me(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> Result<StatusCode, ApiError> {
    state.service.delete_user(user.id).await?;
    info!("User {} deleted their account", user.external_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn read_by_telegram_id(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    Path(telegram_id): Path<String>,
) -> Result<Json<UserWithHabits>, ApiError> {
    let user = match state.service.get_user_by_external_id(&telegram_id).await {
        Ok(user) => user,
        Err(HabitError::NotFound { .. }) => {
            return Err(ApiError::NotFound(
                "The user with this telegram ID does not exist in the system".to_string(),
            ))
        }
        Err(e) => return Err(e.into()),
    };
    let habits = state.service.list_all_habits(user.id).await?;
    Ok(Json(UserWithHabits { user, habits }))
}
