//! # Feature: REST API
//!
//! JSON surface over the habit service for non-chat clients. All routes
//! except the welcome and health documents, registration and login require a
//! bearer token.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.2.0
//! - **Toggleable**: false

pub mod auth;
pub mod error;
pub mod habits;
pub mod users;

use crate::habit_service::HabitService;
use auth::TokenAuthority;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::info;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<HabitService>,
    pub tokens: Arc<TokenAuthority>,
}

impl AppState {
    pub fn new(service: Arc<HabitService>, tokens: TokenAuthority) -> Self {
        AppState {
            service,
            tokens: Arc::new(tokens),
        }
    }
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Welcome to Habit Tracker API",
        "version": "1.0.0",
        "documentation": "/docs",
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/login/access-token", post(users::login))
        .route("/users", post(users::create_user))
        .route(
            "/users/me",
            get(users::read_me).put(users::update_me).delete(users::delete_me),
        )
        .route("/users/:telegram_id", get(users::read_by_telegram_id))
        .route("/habits", post(habits::create_habit).get(habits::list_habits))
        .route(
            "/habits/:id",
            get(habits::read_habit)
                .put(habits::update_habit)
                .delete(habits::delete_habit),
        )
        .route("/habits/:id/complete", post(habits::complete_habit));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
pub async fn serve(bind_addr: &str, state: AppState, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("REST API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
