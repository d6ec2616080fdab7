//! # Feature: Conversational Front-End
//!
//! Interprets inbound chat messages and button callbacks against the chat's
//! dialogue mode and dispatches to the habit service. Errors never escape a
//! handler: they are logged and reported to the user as a failure message,
//! leaving the dialogue state consistent.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.2.0: Ownership re-checked when applying title/description edits
//! - 1.1.0: Habit list carries edit/delete buttons
//! - 1.0.0: Initial release with add/list/complete/delete flows

use crate::dialogue_state::{DialogueMode, DialogueStateStore};
use crate::error::{HabitError, HabitResult};
use crate::habit_service::HabitService;
use crate::keyboards::{
    completion_chooser_keyboard, completion_keyboard, delete_confirmation_keyboard, edit_menu_keyboard,
    habit_actions_keyboard, habit_list_keyboard, main_menu_keyboard, CallbackAction, Keyboard, MenuItem,
};
use crate::models::{Habit, HabitUpdate};
use crate::notifications::DailyTime;
use crate::transport::BotTransport;
use log::{debug, error, info, warn};
use std::sync::Arc;

/// Minimum trimmed length of a habit title, in characters
pub const MIN_TITLE_CHARS: usize = 3;

pub const GENERIC_FAILURE_TEXT: &str = "❌ Произошла ошибка при обработке запроса.";
pub const PERMISSION_DENIED_TEXT: &str = "⛔ Эта привычка вам не принадлежит.";
pub const UNKNOWN_COMMAND_TEXT: &str = "❓ Неизвестная команда. Пожалуйста, используйте кнопки меню.";
pub const NEW_HABIT_PROMPT: &str = "📝 Введите название новой привычки:";
pub const TITLE_TOO_SHORT_TEXT: &str =
    "❌ Название привычки должно содержать минимум 3 символа. Попробуйте еще раз:";
pub const CANCELLED_TEXT: &str = "⚠️ Действие отменено. Выберите команду из меню.";

/// Identity of whoever sent an update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sender {
    pub external_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Sender {
    pub fn full_name(&self) -> Option<String> {
        let full = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let full = full.trim();
        (!full.is_empty()).then(|| full.to_string())
    }

    /// Username when set, otherwise the full name
    pub fn display_name(&self) -> Option<String> {
        self.username.clone().or_else(|| self.full_name())
    }
}

#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat_id: String,
    pub sender: Sender,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct IncomingCallback {
    pub callback_id: String,
    pub chat_id: String,
    pub message_id: i32,
    pub sender: Sender,
    pub data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Cancel,
}

impl Command {
    /// Parse `/start`, `/help` or `/cancel`, tolerating a `@botname` suffix
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.trim().split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        match name.to_lowercase().as_str() {
            "start" => Some(Command::Start),
            "help" => Some(Command::Help),
            "cancel" => Some(Command::Cancel),
            _ => None,
        }
    }
}

pub struct DialogueEngine {
    service: Arc<HabitService>,
    states: Arc<dyn DialogueStateStore>,
    transport: Arc<dyn BotTransport>,
    reminder_time: DailyTime,
}

impl DialogueEngine {
    pub fn new(
        service: Arc<HabitService>,
        states: Arc<dyn DialogueStateStore>,
        transport: Arc<dyn BotTransport>,
        reminder_time: DailyTime,
    ) -> Self {
        DialogueEngine {
            service,
            states,
            transport,
            reminder_time,
        }
    }

    pub fn mode(&self, chat_id: &str) -> DialogueMode {
        self.states.mode(chat_id)
    }

    /// Entry point for text messages and commands
    pub async fn handle_message(&self, message: &IncomingMessage) {
        if let Some(command) = Command::parse(&message.text) {
            self.handle_command(message, command).await;
            return;
        }

        let mode = self.states.mode(&message.chat_id);
        debug!("Chat {} in mode {mode} sent text", message.chat_id);

        let result = match mode {
            DialogueMode::Idle => self.route_menu(message).await,
            DialogueMode::AwaitingNewHabitTitle => self.add_habit(message).await,
            DialogueMode::AwaitingEditingModeSelection { .. } => self.await_edit_choice(message).await,
            DialogueMode::AwaitingEditedTitle { habit_id } => self.apply_title_edit(message, habit_id).await,
            DialogueMode::AwaitingEditedDescription { habit_id } => {
                self.apply_description_edit(message, habit_id).await
            }
        };

        if let Err(e) = result {
            error!("Error handling message from chat {}: {e}", message.chat_id);
            self.send(&message.chat_id, GENERIC_FAILURE_TEXT, Some(main_menu_keyboard()))
                .await;
        }
    }

    /// Entry point for inline button presses. The callback is answered exactly
    /// once, whatever the outcome.
    pub async fn handle_callback(&self, callback: &IncomingCallback) {
        let action = match callback.data.parse::<CallbackAction>() {
            Ok(action) => action,
            Err(e) => {
                warn!("Ignoring callback from chat {}: {e}", callback.chat_id);
                self.answer(&callback.callback_id, None, false).await;
                return;
            }
        };

        match self.dispatch_callback(callback, action).await {
            Ok(()) => self.answer(&callback.callback_id, None, false).await,
            Err(HabitError::PermissionDenied) => {
                warn!(
                    "Rejected {} from {}: not the habit owner",
                    action, callback.sender.external_id
                );
                self.answer(&callback.callback_id, Some(PERMISSION_DENIED_TEXT), true)
                    .await;
            }
            Err(e) => {
                error!("Error in callback handler for {action}: {e}");
                self.answer(&callback.callback_id, Some(GENERIC_FAILURE_TEXT), true)
                    .await;
            }
        }
    }

    async fn handle_command(&self, message: &IncomingMessage, command: Command) {
        match command {
            Command::Start => {
                let sender = &message.sender;
                if let Err(e) = self
                    .service
                    .get_or_create_user(&sender.external_id, sender.display_name().as_deref(), None)
                    .await
                {
                    error!("Failed to register user {}: {e}", sender.external_id);
                    self.send(&message.chat_id, GENERIC_FAILURE_TEXT, None).await;
                    return;
                }
                let text = welcome_text(sender.first_name.as_deref());
                self.send(&message.chat_id, &text, Some(main_menu_keyboard())).await;
            }
            Command::Help => {
                let text = help_text(self.reminder_time, self.service.completion_threshold());
                self.send(&message.chat_id, &text, Some(main_menu_keyboard())).await;
            }
            Command::Cancel => {
                self.states.clear(&message.chat_id);
                self.send(&message.chat_id, CANCELLED_TEXT, Some(main_menu_keyboard()))
                    .await;
            }
        }
    }

    async fn route_menu(&self, message: &IncomingMessage) -> HabitResult<()> {
        match MenuItem::from_label(message.text.trim()) {
            Some(item) => self.run_menu_item(message, item).await,
            None => {
                self.send(&message.chat_id, UNKNOWN_COMMAND_TEXT, Some(main_menu_keyboard()))
                    .await;
                Ok(())
            }
        }
    }

    async fn run_menu_item(&self, message: &IncomingMessage, item: MenuItem) -> HabitResult<()> {
        match item {
            MenuItem::AddHabit => {
                self.states
                    .set(&message.chat_id, Some(DialogueMode::AwaitingNewHabitTitle));
                self.send(&message.chat_id, NEW_HABIT_PROMPT, None).await;
            }
            MenuItem::ListHabits => self.show_habits(message).await?,
            MenuItem::MarkCompletion => self.show_completion_chooser(message).await?,
            MenuItem::Settings => {
                let count = self.service.count_active_habits(&message.sender.external_id).await;
                let text = settings_text(
                    self.reminder_time,
                    self.service.completion_threshold(),
                    &message.sender.external_id,
                    count,
                );
                self.send(&message.chat_id, &text, Some(main_menu_keyboard())).await;
            }
        }
        Ok(())
    }

    async fn show_habits(&self, message: &IncomingMessage) -> HabitResult<()> {
        let user = self.resolve_user(&message.sender).await?;
        let habits = self.service.list_active_habits(user.id).await?;

        if habits.is_empty() {
            self.send(
                &message.chat_id,
                "📭 У вас пока нет привычек. Нажмите '➕ Добавить привычку', чтобы создать первую!",
                Some(main_menu_keyboard()),
            )
            .await;
            return Ok(());
        }

        let text = render_habit_list(&habits, self.service.completion_threshold());
        self.send(&message.chat_id, &text, Some(habit_list_keyboard(&habits))).await;
        Ok(())
    }

    async fn show_completion_chooser(&self, message: &IncomingMessage) -> HabitResult<()> {
        let user = self.resolve_user(&message.sender).await?;
        let habits = self.service.list_active_habits(user.id).await?;

        if habits.is_empty() {
            self.send(
                &message.chat_id,
                "📭 У вас нет привычек для отметки. Сначала добавьте привычку!",
                Some(main_menu_keyboard()),
            )
            .await;
            return Ok(());
        }

        self.send(
            &message.chat_id,
            "✅ Выберите привычку для отметки выполнения:",
            Some(completion_chooser_keyboard(&habits)),
        )
        .await;
        Ok(())
    }

    async fn add_habit(&self, message: &IncomingMessage) -> HabitResult<()> {
        let title = message.text.trim();
        if !is_valid_title(title) {
            self.send(&message.chat_id, TITLE_TOO_SHORT_TEXT, None).await;
            return Ok(());
        }

        let user = self.resolve_user(&message.sender).await?;
        let habit = self.service.create_habit(user.id, title, "").await?;
        self.states.clear(&message.chat_id);

        let text = format!(
            "✅ Отлично! Привычка '{}' добавлена.\n\n\
             Теперь вы будете получать ежедневные напоминания о выполнении этой привычки.",
            habit.title
        );
        self.send(&message.chat_id, &text, Some(main_menu_keyboard())).await;
        Ok(())
    }

    async fn await_edit_choice(&self, message: &IncomingMessage) -> HabitResult<()> {
        if let Some(item) = MenuItem::from_label(message.text.trim()) {
            self.states.clear(&message.chat_id);
            return self.run_menu_item(message, item).await;
        }
        self.send(
            &message.chat_id,
            "✏️ Выберите, что изменить, с помощью кнопок или отправьте /cancel.",
            None,
        )
        .await;
        Ok(())
    }

    async fn apply_title_edit(&self, message: &IncomingMessage, habit_id: i64) -> HabitResult<()> {
        let title = message.text.trim();
        if !is_valid_title(title) {
            self.send(&message.chat_id, TITLE_TOO_SHORT_TEXT, None).await;
            return Ok(());
        }

        let update = HabitUpdate {
            title: Some(title.to_string()),
            ..HabitUpdate::default()
        };
        self.apply_edit(message, habit_id, update, "✅ Название привычки обновлено").await
    }

    async fn apply_description_edit(&self, message: &IncomingMessage, habit_id: i64) -> HabitResult<()> {
        let text = message.text.trim();
        let description = if text == "-" { String::new() } else { text.to_string() };

        let update = HabitUpdate {
            description: Some(description),
            ..HabitUpdate::default()
        };
        self.apply_edit(message, habit_id, update, "✅ Описание привычки обновлено").await
    }

    /// Apply an edit through the service; the mode is cleared whatever the outcome
    async fn apply_edit(
        &self,
        message: &IncomingMessage,
        habit_id: i64,
        update: HabitUpdate,
        confirmation: &str,
    ) -> HabitResult<()> {
        let user = self.resolve_user(&message.sender).await?;
        let result = self.service.update_habit(habit_id, user.id, update).await;
        self.states.clear(&message.chat_id);

        match result {
            Ok(habit) => {
                info!("User {} edited habit {}", user.id, habit.id);
                let text = format!("{confirmation}: '{}'", habit.title);
                self.send(&message.chat_id, &text, Some(main_menu_keyboard())).await;
                Ok(())
            }
            Err(HabitError::PermissionDenied) => {
                warn!("User {} tried to edit habit {habit_id} they do not own", user.id);
                self.send(&message.chat_id, PERMISSION_DENIED_TEXT, Some(main_menu_keyboard()))
                    .await;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn dispatch_callback(&self, callback: &IncomingCallback, action: CallbackAction) -> HabitResult<()> {
        let user = self.resolve_user(&callback.sender).await?;

        match action {
            CallbackAction::ShowCompletion(habit_id) => {
                self.service.get_habit(habit_id, user.id).await?;
                self.edit(
                    callback,
                    "✅ Как вы выполнили привычку сегодня?",
                    Some(completion_keyboard(habit_id)),
                )
                .await;
            }
            CallbackAction::CompleteYes(habit_id) => self.apply_completion(callback, user.id, habit_id, true).await?,
            CallbackAction::CompleteNo(habit_id) => self.apply_completion(callback, user.id, habit_id, false).await?,
            CallbackAction::EditHabit(habit_id) => {
                self.service.get_habit(habit_id, user.id).await?;
                self.states.set(
                    &callback.chat_id,
                    Some(DialogueMode::AwaitingEditingModeSelection { habit_id }),
                );
                self.edit(callback, "✏️ Что вы хотите изменить?", Some(edit_menu_keyboard(habit_id)))
                    .await;
            }
            CallbackAction::EditTitle(habit_id) => {
                let habit = self.service.get_habit(habit_id, user.id).await?;
                self.states
                    .set(&callback.chat_id, Some(DialogueMode::AwaitingEditedTitle { habit_id }));
                let text = format!("✏️ Введите новое название для привычки '{}':", habit.title);
                self.edit(callback, &text, None).await;
            }
            CallbackAction::EditDescription(habit_id) => {
                let habit = self.service.get_habit(habit_id, user.id).await?;
                self.states.set(
                    &callback.chat_id,
                    Some(DialogueMode::AwaitingEditedDescription { habit_id }),
                );
                let text = format!(
                    "📝 Введите новое описание для привычки '{}' (отправьте «-», чтобы очистить):",
                    habit.title
                );
                self.edit(callback, &text, None).await;
            }
            CallbackAction::BackToHabit(habit_id) => {
                let habit = self.service.get_habit(habit_id, user.id).await?;
                self.states.clear(&callback.chat_id);
                let text = render_habit_card(&habit, self.service.completion_threshold());
                self.edit(callback, &text, Some(habit_actions_keyboard(habit_id))).await;
            }
            CallbackAction::DeleteHabit(habit_id) => {
                self.service.get_habit(habit_id, user.id).await?;
                self.edit(
                    callback,
                    "❓ Вы уверены, что хотите удалить эту привычку? Это действие нельзя отменить.",
                    Some(delete_confirmation_keyboard(habit_id)),
                )
                .await;
            }
            CallbackAction::ConfirmDelete(habit_id) => self.apply_deletion(callback, user.id, habit_id).await?,
            CallbackAction::CancelDelete(_) => {
                self.edit(callback, "❌ Удаление отменено.", None).await;
            }
        }
        Ok(())
    }

    async fn apply_completion(
        &self,
        callback: &IncomingCallback,
        user_id: i64,
        habit_id: i64,
        completed: bool,
    ) -> HabitResult<()> {
        match self.service.mark_completed(habit_id, user_id, completed).await {
            Ok(habit) => {
                let (icon, status) = if completed {
                    ("✅", "выполнена")
                } else {
                    ("❌", "не выполнена")
                };
                let text = format!("{icon} Привычка '{}' успешно {status}!", habit.title);
                self.edit(callback, &text, None).await;
                Ok(())
            }
            Err(HabitError::PermissionDenied) => Err(HabitError::PermissionDenied),
            Err(e) => {
                error!("Error marking habit {habit_id} completed: {e}");
                self.edit(
                    callback,
                    "❌ Ошибка при отметке выполнения привычки. Попробуйте позже.",
                    None,
                )
                .await;
                Ok(())
            }
        }
    }

    async fn apply_deletion(&self, callback: &IncomingCallback, user_id: i64, habit_id: i64) -> HabitResult<()> {
        match self.service.delete_habit(habit_id, user_id).await {
            Ok(_) => {
                if self.editing_target(&callback.chat_id) == Some(habit_id) {
                    self.states.clear(&callback.chat_id);
                }
                self.edit(callback, "✅ Привычка успешно удалена!", None).await;
                Ok(())
            }
            Err(HabitError::PermissionDenied) => Err(HabitError::PermissionDenied),
            Err(e) => {
                error!("Error deleting habit {habit_id}: {e}");
                self.edit(callback, "❌ Ошибка при удалении привычки. Попробуйте позже.", None)
                    .await;
                Ok(())
            }
        }
    }

    fn editing_target(&self, chat_id: &str) -> Option<i64> {
        match self.states.mode(chat_id) {
            DialogueMode::AwaitingEditingModeSelection { habit_id }
            | DialogueMode::AwaitingEditedTitle { habit_id }
            | DialogueMode::AwaitingEditedDescription { habit_id } => Some(habit_id),
            DialogueMode::Idle | DialogueMode::AwaitingNewHabitTitle => None,
        }
    }

    async fn resolve_user(&self, sender: &Sender) -> HabitResult<crate::models::User> {
        self.service
            .get_or_create_user(&sender.external_id, sender.display_name().as_deref(), None)
            .await
    }

    async fn send(&self, chat_id: &str, text: &str, keyboard: Option<Keyboard>) {
        if let Err(e) = self.transport.send_message(chat_id, text, keyboard).await {
            warn!("Failed to send message to chat {chat_id}: {e}");
        }
    }

    async fn edit(&self, callback: &IncomingCallback, text: &str, keyboard: Option<Keyboard>) {
        if let Err(e) = self
            .transport
            .edit_message(&callback.chat_id, callback.message_id, text, keyboard)
            .await
        {
            warn!(
                "Failed to edit message {} in chat {}: {e}",
                callback.message_id, callback.chat_id
            );
        }
    }

    async fn answer(&self, callback_id: &str, text: Option<&str>, alert: bool) {
        if let Err(e) = self.transport.answer_callback(callback_id, text, alert).await {
            warn!("Failed to answer callback {callback_id}: {e}");
        }
    }
}

pub fn is_valid_title(title: &str) -> bool {
    title.trim().chars().count() >= MIN_TITLE_CHARS
}

pub fn welcome_text(first_name: Option<&str>) -> String {
    format!(
        "👋 Привет, {}!\n\n\
         Я - ваш личный помощник по формированию полезных привычек.\n\n\
         🎯 Со мной вы сможете:\n\
         • Добавлять и отслеживать привычки\n\
         • Получать напоминания о выполнении\n\
         • Отмечать прогресс и видеть результаты\n\n\
         Начните с добавления первой привычки!",
        first_name.unwrap_or("друг")
    )
}

pub fn help_text(reminder_time: DailyTime, threshold: u32) -> String {
    format!(
        "ℹ️ Помощь по использованию бота\n\n\
         Основные команды:\n\
         /start - Начать работу с ботом\n\
         /help - Показать это меню помощи\n\
         /cancel - Отменить текущее действие\n\n\
         Как работать с привычками:\n\
         1. Нажмите '➕ Добавить привычку' для создания новой\n\
         2. Используйте '📋 Мои привычки' для просмотра списка\n\
         3. '✅ Отметить выполнение' для фиксации прогресса\n\
         4. Нажмите на привычку для редактирования или удаления\n\n\
         Время напоминаний: {reminder_time}\n\
         Дней для формирования привычки: {threshold}"
    )
}

pub fn settings_text(reminder_time: DailyTime, threshold: u32, external_id: &str, active_habits: usize) -> String {
    format!(
        "⚙️ Настройки\n\n\
         ⏰ Время напоминаний: {reminder_time}\n\
         🏆 Дней для формирования привычки: {threshold}\n\
         👤 Ваш Telegram ID: {external_id}\n\
         📝 Активных привычек: {active_habits}\n\n\
         Для изменения настроек обратитесь к администратору."
    )
}

pub fn render_habit_list(habits: &[Habit], threshold: u32) -> String {
    let mut response = String::from("📋 Ваши активные привычки:\n\n");

    for (i, habit) in habits.iter().enumerate() {
        let status = if habit.completion_count > 0 { "✅" } else { "🔄" };
        response.push_str(&format!(
            "{}. {} {}\n   Прогресс: {} дней\n",
            i + 1,
            status,
            habit.title,
            habit.progress(threshold)
        ));
        if let Some(description) = habit.description_text() {
            response.push_str(&format!("   Описание: {description}\n"));
        }
        response.push('\n');
    }

    response
}

fn render_habit_card(habit: &Habit, threshold: u32) -> String {
    let mut card = format!("📌 {}\nПрогресс: {} дней", habit.title, habit.progress(threshold));
    if let Some(description) = habit.description_text() {
        card.push_str(&format!("\nОписание: {description}"));
    }
    card
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/help@HabitBot"), Some(Command::Help));
        assert_eq!(Command::parse("  /CANCEL now"), Some(Command::Cancel));
        assert_eq!(Command::parse("/unknown"), None);
        assert_eq!(Command::parse("start"), None);
    }

    #[test]
    fn test_title_validation_counts_characters() {
        assert!(!is_valid_title("ab"));
        assert!(!is_valid_title("  ab  "));
        assert!(is_valid_title("Бег"));
        assert!(is_valid_title("Пить воду"));
    }

    #[test]
    fn test_sender_display_name() {
        let sender = Sender {
            external_id: "1".to_string(),
            username: None,
            first_name: Some("Анна".to_string()),
            last_name: None,
        };
        assert_eq!(sender.display_name().as_deref(), Some("Анна"));

        let anonymous = Sender {
            external_id: "2".to_string(),
            ..Sender::default()
        };
        assert_eq!(anonymous.display_name(), None);
    }

    #[test]
    fn test_render_habit_list() {
        let habit = Habit {
            id: 1,
            title: "Пить воду".to_string(),
            description: Some("2 литра".to_string()),
            is_active: true,
            completion_count: 3,
            last_completed: None,
            created_at: Utc::now(),
            updated_at: None,
            owner_id: 1,
        };
        let text = render_habit_list(&[habit], 21);
        assert!(text.contains("1. ✅ Пить воду"));
        assert!(text.contains("Прогресс: 3/21 дней"));
        assert!(text.contains("Описание: 2 литра"));
    }

    #[test]
    fn test_help_mentions_schedule() {
        let text = help_text(DailyTime::new(9, 0).unwrap(), 21);
        assert!(text.contains("Время напоминаний: 09:00"));
        assert!(text.contains("Дней для формирования привычки: 21"));
    }
}
