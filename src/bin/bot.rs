//! Habit tracker entry point
//!
//! Runs the Telegram dialogue dispatcher, the daily reminder/rollover
//! scheduler and the REST API in one process over a shared SQLite database.
//! Configuration comes from config.yaml (or CONFIG_FILE) or environment
//! variables.

use anyhow::Result;
use dotenvy::dotenv;
use log::{error, info};
use std::sync::Arc;
use tokio::sync::oneshot;

use habitbot::api::{self, auth::TokenAuthority, AppState};
use habitbot::config::Config;
use habitbot::database::Database;
use habitbot::dialogue::DialogueEngine;
use habitbot::dialogue_state::InMemoryDialogueStore;
use habitbot::habit_service::HabitService;
use habitbot::notifications::NotificationScheduler;
use habitbot::telegram::{run_dispatcher, TelegramTransport};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::auto_load()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level)).init();

    info!("Starting habit tracker bot...");
    let reminder_time = config.reminder_time()?;
    info!(
        "Reminders at {reminder_time}, {} completions form a habit, rollover policy {}",
        config.habit_completion_days, config.rollover_policy
    );

    let database = Database::new(&config.database_path).await?;
    let service = Arc::new(HabitService::new(database, config.habit_rules()));
    let transport = Arc::new(TelegramTransport::new(&config.telegram_bot_token));

    let engine = Arc::new(DialogueEngine::new(
        service.clone(),
        Arc::new(InMemoryDialogueStore::new()),
        transport.clone(),
        reminder_time,
    ));

    let scheduler = Arc::new(NotificationScheduler::new(
        service.clone(),
        transport.clone(),
        reminder_time,
    ))
    .start();

    let (api_stop_tx, api_stop_rx) = oneshot::channel::<()>();
    let api_state = AppState::new(
        service.clone(),
        TokenAuthority::new(&config.secret_key, config.access_token_expire_minutes),
    );
    let bind_addr = config.api_bind_addr.clone();
    let api_task = tokio::spawn(async move {
        let shutdown = async {
            let _ = api_stop_rx.await;
        };
        if let Err(e) = api::serve(&bind_addr, api_state, shutdown).await {
            error!("REST API failed: {e}");
        }
    });

    // Blocks until Ctrl+C
    run_dispatcher(transport.bot(), engine).await;

    info!("Received shutdown signal, stopping background jobs...");
    let _ = api_stop_tx.send(());
    if let Err(e) = api_task.await {
        error!("REST API task panicked: {e}");
    }
    scheduler.shutdown().await;

    info!("Habit tracker bot shut down successfully");
    Ok(())
}
