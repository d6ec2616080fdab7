//! Dialogue engine integration tests
//!
//! Drive the engine with synthetic messages and callbacks against an
//! in-memory database and a recording transport.
//!
//! Run with: `cargo test --test dialogue_tests`

mod common;

use common::{callback, harness, message, Harness, Outbound};
use habitbot::dialogue::{
    CANCELLED_TEXT, GENERIC_FAILURE_TEXT, NEW_HABIT_PROMPT, PERMISSION_DENIED_TEXT, TITLE_TOO_SHORT_TEXT,
    UNKNOWN_COMMAND_TEXT,
};
use habitbot::dialogue_state::{DialogueMode, DialogueStateStore};
use habitbot::keyboards::{CallbackAction, Keyboard, MENU_ADD_HABIT, MENU_LIST_HABITS, MENU_MARK_COMPLETION, MENU_SETTINGS};
use habitbot::models::Habit;

async fn add_habit(h: &Harness, chat: &str, title: &str) -> Habit {
    h.engine.handle_message(&message(chat, MENU_ADD_HABIT)).await;
    h.engine.handle_message(&message(chat, title)).await;
    let user = h.service.get_user_by_external_id(chat).await.unwrap();
    h.service
        .list_active_habits(user.id)
        .await
        .unwrap()
        .into_iter()
        .find(|habit| habit.title == title)
        .unwrap()
}

async fn reload(h: &Harness, chat: &str, habit_id: i64) -> Habit {
    let user = h.service.get_user_by_external_id(chat).await.unwrap();
    h.service.get_habit(habit_id, user.id).await.unwrap()
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test]
async fn test_start_registers_user_once_and_shows_menu() {
    let h = harness().await;

    h.engine.handle_message(&message("1", "/start")).await;
    h.engine.handle_message(&message("1", "/start")).await;

    let users = h.service.list_users().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].external_id, "1");
    assert_eq!(users[0].display_name.as_deref(), Some("user1"));

    let outbound = h.transport.outbound();
    assert_eq!(outbound.len(), 2);
    match &outbound[0] {
        Outbound::Sent { text, keyboard, .. } => {
            assert!(text.starts_with("👋 Привет, Ann!"));
            assert!(matches!(keyboard, Some(Keyboard::Reply { .. })));
        }
        other => panic!("expected a sent message, got {other:?}"),
    }
}

#[tokio::test]
async fn test_help_shows_schedule_settings() {
    let h = harness().await;
    h.engine.handle_message(&message("1", "/help")).await;

    let text = h.transport.last_text().unwrap();
    assert!(text.contains("Время напоминаний: 09:00"));
    assert!(text.contains("Дней для формирования привычки: 21"));
}

#[tokio::test]
async fn test_cancel_resets_any_mode() {
    let h = harness().await;

    for mode in [
        DialogueMode::AwaitingNewHabitTitle,
        DialogueMode::AwaitingEditingModeSelection { habit_id: 1 },
        DialogueMode::AwaitingEditedTitle { habit_id: 1 },
        DialogueMode::AwaitingEditedDescription { habit_id: 1 },
    ] {
        h.states.set("1", Some(mode));
        h.engine.handle_message(&message("1", "/cancel")).await;
        assert_eq!(h.engine.mode("1"), DialogueMode::Idle);
        assert_eq!(h.transport.last_text().as_deref(), Some(CANCELLED_TEXT));
    }
    assert!(h.states.is_empty());
}

#[tokio::test]
async fn test_unknown_text_in_idle() {
    let h = harness().await;
    h.engine.handle_message(&message("1", "hello there")).await;
    assert_eq!(h.transport.last_text().as_deref(), Some(UNKNOWN_COMMAND_TEXT));
    assert_eq!(h.engine.mode("1"), DialogueMode::Idle);
}

// ============================================================================
// Add / list / settings
// ============================================================================

#[tokio::test]
async fn test_short_title_is_rejected_then_accepted() {
    let h = harness().await;

    h.engine.handle_message(&message("1", MENU_ADD_HABIT)).await;
    assert_eq!(h.engine.mode("1"), DialogueMode::AwaitingNewHabitTitle);
    assert_eq!(h.transport.last_text().as_deref(), Some(NEW_HABIT_PROMPT));

    h.engine.handle_message(&message("1", "ab")).await;
    assert_eq!(h.transport.last_text().as_deref(), Some(TITLE_TOO_SHORT_TEXT));
    assert_eq!(h.engine.mode("1"), DialogueMode::AwaitingNewHabitTitle);
    let user = h.service.get_user_by_external_id("1").await.unwrap();
    assert!(h.service.list_active_habits(user.id).await.unwrap().is_empty());

    h.engine.handle_message(&message("1", "  Бег  ")).await;
    assert_eq!(h.engine.mode("1"), DialogueMode::Idle);

    let habits = h.service.list_active_habits(user.id).await.unwrap();
    assert_eq!(habits.len(), 1);
    assert_eq!(habits[0].title, "Бег");
    assert_eq!(habits[0].completion_count, 0);
    assert!(h.transport.last_text().unwrap().contains("Привычка 'Бег' добавлена"));
}

#[tokio::test]
async fn test_list_habits_empty_and_populated() {
    let h = harness().await;

    h.engine.handle_message(&message("1", MENU_LIST_HABITS)).await;
    assert!(h.transport.last_text().unwrap().starts_with("📭 У вас пока нет привычек"));

    let habit = add_habit(&h, "1", "Пить воду").await;
    h.engine.handle_message(&message("1", MENU_LIST_HABITS)).await;

    let Some(Outbound::Sent { text, keyboard, .. }) = h.transport.outbound().pop() else {
        panic!("expected list message");
    };
    assert!(text.contains("1. 🔄 Пить воду"));
    assert!(text.contains("Прогресс: 0/21 дней"));
    let Some(Keyboard::Inline { rows }) = keyboard else {
        panic!("list must carry inline buttons");
    };
    assert_eq!(rows[0][0].action, CallbackAction::EditHabit(habit.id));
    assert_eq!(rows[0][1].action, CallbackAction::DeleteHabit(habit.id));
}

#[tokio::test]
async fn test_settings_reports_active_count() {
    let h = harness().await;
    add_habit(&h, "1", "Читать").await;

    h.engine.handle_message(&message("1", MENU_SETTINGS)).await;
    let text = h.transport.last_text().unwrap();
    assert!(text.contains("👤 Ваш Telegram ID: 1"));
    assert!(text.contains("📝 Активных привычек: 1"));
    assert!(text.contains("⏰ Время напоминаний: 09:00"));
}

// ============================================================================
// Completion
// ============================================================================

#[tokio::test]
async fn test_completion_flow() {
    let h = harness().await;
    let habit = add_habit(&h, "1", "Бег").await;

    h.engine.handle_message(&message("1", MENU_MARK_COMPLETION)).await;
    assert_eq!(
        h.transport.last_text().as_deref(),
        Some("✅ Выберите привычку для отметки выполнения:")
    );

    h.transport.clear();
    h.engine
        .handle_callback(&callback("1", &format!("complete_habit:{}", habit.id)))
        .await;
    let Outbound::Edited { keyboard, .. } = &h.transport.edits()[0] else {
        panic!("expected edit");
    };
    let Some(Keyboard::Inline { rows }) = keyboard else {
        panic!("expected completion buttons");
    };
    assert_eq!(rows[0][0].action, CallbackAction::CompleteYes(habit.id));

    h.engine
        .handle_callback(&callback("1", &format!("complete_yes:{}", habit.id)))
        .await;
    assert_eq!(reload(&h, "1", habit.id).await.completion_count, 1);
    assert!(reload(&h, "1", habit.id).await.last_completed.is_some());
    assert_eq!(
        h.transport.last_text().as_deref(),
        Some("✅ Привычка 'Бег' успешно выполнена!")
    );

    h.engine
        .handle_callback(&callback("1", &format!("complete_no:{}", habit.id)))
        .await;
    assert_eq!(reload(&h, "1", habit.id).await.completion_count, 1);
    assert_eq!(
        h.transport.last_text().as_deref(),
        Some("❌ Привычка 'Бег' успешно не выполнена!")
    );

    // Every callback answered exactly once, without an alert
    assert_eq!(h.transport.answers(), vec![(None, false); 3]);
}

#[tokio::test]
async fn test_empty_completion_chooser() {
    let h = harness().await;
    h.engine.handle_message(&message("1", MENU_MARK_COMPLETION)).await;
    assert!(h
        .transport
        .last_text()
        .unwrap()
        .starts_with("📭 У вас нет привычек для отметки"));
}

#[tokio::test]
async fn test_foreign_habit_is_rejected_without_mutation() {
    let h = harness().await;
    let habit = add_habit(&h, "1", "Бег").await;
    h.transport.clear();

    for data in [
        format!("complete_yes:{}", habit.id),
        format!("edit_habit:{}", habit.id),
        format!("edit_title:{}", habit.id),
        format!("confirm_delete:{}", habit.id),
    ] {
        h.engine.handle_callback(&callback("2", &data)).await;
    }

    let stored = reload(&h, "1", habit.id).await;
    assert_eq!(stored.completion_count, 0);
    assert_eq!(stored.title, "Бег");
    assert_eq!(h.engine.mode("2"), DialogueMode::Idle);
    assert!(h.transport.edits().is_empty());
    assert_eq!(
        h.transport.answers(),
        vec![(Some(PERMISSION_DENIED_TEXT.to_string()), true); 4]
    );
}

#[tokio::test]
async fn test_malformed_callback_is_answered_and_ignored() {
    let h = harness().await;
    h.engine.handle_callback(&callback("1", "complete_yes:abc")).await;
    h.engine.handle_callback(&callback("1", "self_destruct:1")).await;

    assert_eq!(h.transport.answers(), vec![(None, false); 2]);
    assert!(h.transport.edits().is_empty());
    assert!(h.service.list_users().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_habit_answers_with_alert() {
    let h = harness().await;
    h.engine.handle_callback(&callback("1", "complete_habit:999")).await;
    assert_eq!(
        h.transport.answers(),
        vec![(Some(GENERIC_FAILURE_TEXT.to_string()), true)]
    );
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_confirm_and_cancel() {
    let h = harness().await;
    let habit = add_habit(&h, "1", "Бег").await;
    let user = h.service.get_user_by_external_id("1").await.unwrap();

    h.engine
        .handle_callback(&callback("1", &format!("delete_habit:{}", habit.id)))
        .await;
    assert!(h.transport.last_text().unwrap().starts_with("❓ Вы уверены"));

    h.engine
        .handle_callback(&callback("1", &format!("cancel_delete:{}", habit.id)))
        .await;
    assert_eq!(h.transport.last_text().as_deref(), Some("❌ Удаление отменено."));
    assert_eq!(h.service.list_active_habits(user.id).await.unwrap().len(), 1);

    h.engine
        .handle_callback(&callback("1", &format!("confirm_delete:{}", habit.id)))
        .await;
    assert_eq!(h.transport.last_text().as_deref(), Some("✅ Привычка успешно удалена!"));
    assert!(h.service.list_all_habits(user.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_confirm_delete_of_missing_habit_reports_failure() {
    let h = harness().await;
    h.engine.handle_callback(&callback("1", "confirm_delete:42")).await;
    assert_eq!(
        h.transport.last_text().as_deref(),
        Some("❌ Ошибка при удалении привычки. Попробуйте позже.")
    );
    assert_eq!(h.transport.answers(), vec![(None, false)]);
}

// ============================================================================
// Edit
// ============================================================================

#[tokio::test]
async fn test_edit_title_flow() {
    let h = harness().await;
    let habit = add_habit(&h, "1", "Бег").await;

    h.engine
        .handle_callback(&callback("1", &format!("edit_habit:{}", habit.id)))
        .await;
    assert_eq!(
        h.engine.mode("1"),
        DialogueMode::AwaitingEditingModeSelection { habit_id: habit.id }
    );
    assert_eq!(h.transport.last_text().as_deref(), Some("✏️ Что вы хотите изменить?"));

    h.engine
        .handle_callback(&callback("1", &format!("edit_title:{}", habit.id)))
        .await;
    assert_eq!(h.engine.mode("1"), DialogueMode::AwaitingEditedTitle { habit_id: habit.id });

    h.engine.handle_message(&message("1", "xy")).await;
    assert_eq!(h.transport.last_text().as_deref(), Some(TITLE_TOO_SHORT_TEXT));
    assert_eq!(h.engine.mode("1"), DialogueMode::AwaitingEditedTitle { habit_id: habit.id });

    h.engine.handle_message(&message("1", "Утренний бег")).await;
    assert_eq!(h.engine.mode("1"), DialogueMode::Idle);
    assert_eq!(reload(&h, "1", habit.id).await.title, "Утренний бег");
    assert!(h.transport.last_text().unwrap().contains("'Утренний бег'"));
}

#[tokio::test]
async fn test_edit_description_and_clear() {
    let h = harness().await;
    let habit = add_habit(&h, "1", "Бег").await;

    h.engine
        .handle_callback(&callback("1", &format!("edit_description:{}", habit.id)))
        .await;
    assert_eq!(
        h.engine.mode("1"),
        DialogueMode::AwaitingEditedDescription { habit_id: habit.id }
    );
    h.engine.handle_message(&message("1", " 5 км у реки ")).await;
    assert_eq!(reload(&h, "1", habit.id).await.description.as_deref(), Some("5 км у реки"));
    assert_eq!(h.engine.mode("1"), DialogueMode::Idle);

    h.engine
        .handle_callback(&callback("1", &format!("edit_description:{}", habit.id)))
        .await;
    h.engine.handle_message(&message("1", "-")).await;
    assert_eq!(reload(&h, "1", habit.id).await.description, None);
}

#[tokio::test]
async fn test_back_to_habit_clears_mode() {
    let h = harness().await;
    let habit = add_habit(&h, "1", "Бег").await;

    h.engine
        .handle_callback(&callback("1", &format!("edit_habit:{}", habit.id)))
        .await;
    h.engine
        .handle_callback(&callback("1", &format!("back_to_habit:{}", habit.id)))
        .await;

    assert_eq!(h.engine.mode("1"), DialogueMode::Idle);
    let Some(Outbound::Edited { text, keyboard, .. }) = h.transport.edits().pop() else {
        panic!("expected edit");
    };
    assert!(text.contains("Бег"));
    assert!(text.contains("0/21"));
    let Some(Keyboard::Inline { rows }) = keyboard else {
        panic!("expected actions keyboard");
    };
    assert_eq!(rows[0][0].action, CallbackAction::EditHabit(habit.id));
}

#[tokio::test]
async fn test_menu_label_escapes_edit_selection() {
    let h = harness().await;
    let habit = add_habit(&h, "1", "Бег").await;

    h.engine
        .handle_callback(&callback("1", &format!("edit_habit:{}", habit.id)))
        .await;
    h.engine.handle_message(&message("1", "что-то")).await;
    assert_eq!(
        h.engine.mode("1"),
        DialogueMode::AwaitingEditingModeSelection { habit_id: habit.id }
    );

    h.engine.handle_message(&message("1", MENU_LIST_HABITS)).await;
    assert_eq!(h.engine.mode("1"), DialogueMode::Idle);
    assert!(h.transport.last_text().unwrap().contains("📋 Ваши активные привычки"));
}

#[tokio::test]
async fn test_edit_of_vanished_habit_resets_mode() {
    let h = harness().await;
    let habit = add_habit(&h, "1", "Бег").await;

    h.engine
        .handle_callback(&callback("1", &format!("edit_title:{}", habit.id)))
        .await;
    let user = h.service.get_user_by_external_id("1").await.unwrap();
    h.service.delete_habit(habit.id, user.id).await.unwrap();

    h.engine.handle_message(&message("1", "Новое название")).await;
    assert_eq!(h.engine.mode("1"), DialogueMode::Idle);
    assert_eq!(h.transport.last_text().as_deref(), Some(GENERIC_FAILURE_TEXT));
}

#[tokio::test]
async fn test_deleting_edit_target_clears_mode() {
    let h = harness().await;
    let habit = add_habit(&h, "1", "Бег").await;

    h.engine
        .handle_callback(&callback("1", &format!("edit_habit:{}", habit.id)))
        .await;
    h.engine
        .handle_callback(&callback("1", &format!("confirm_delete:{}", habit.id)))
        .await;
    assert_eq!(h.engine.mode("1"), DialogueMode::Idle);
}
