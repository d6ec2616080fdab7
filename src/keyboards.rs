//! # Feature: Keyboards and Callback Actions
//!
//! Transport-neutral reply and inline keyboards plus the `<tag>:<habit_id>`
//! callback payloads carried by inline buttons.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

use crate::models::Habit;
use std::fmt;
use std::str::FromStr;

pub const MENU_ADD_HABIT: &str = "➕ Добавить привычку";
pub const MENU_LIST_HABITS: &str = "📋 Мои привычки";
pub const MENU_MARK_COMPLETION: &str = "✅ Отметить выполнение";
pub const MENU_SETTINGS: &str = "⚙️ Настройки";

/// Main menu entries, matched exactly against idle free text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    AddHabit,
    ListHabits,
    MarkCompletion,
    Settings,
}

impl MenuItem {
    pub fn from_label(text: &str) -> Option<Self> {
        match text {
            MENU_ADD_HABIT => Some(MenuItem::AddHabit),
            MENU_LIST_HABITS => Some(MenuItem::ListHabits),
            MENU_MARK_COMPLETION => Some(MenuItem::MarkCompletion),
            MENU_SETTINGS => Some(MenuItem::Settings),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MenuItem::AddHabit => MENU_ADD_HABIT,
            MenuItem::ListHabits => MENU_LIST_HABITS,
            MenuItem::MarkCompletion => MENU_MARK_COMPLETION,
            MenuItem::Settings => MENU_SETTINGS,
        }
    }
}

/// Action carried by an inline button, always bound to one habit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    ShowCompletion(i64),
    CompleteYes(i64),
    CompleteNo(i64),
    EditHabit(i64),
    EditTitle(i64),
    EditDescription(i64),
    BackToHabit(i64),
    DeleteHabit(i64),
    ConfirmDelete(i64),
    CancelDelete(i64),
}

impl CallbackAction {
    pub fn tag(&self) -> &'static str {
        match self {
            CallbackAction::ShowCompletion(_) => "complete_habit",
            CallbackAction::CompleteYes(_) => "complete_yes",
            CallbackAction::CompleteNo(_) => "complete_no",
            CallbackAction::EditHabit(_) => "edit_habit",
            CallbackAction::EditTitle(_) => "edit_title",
            CallbackAction::EditDescription(_) => "edit_description",
            CallbackAction::BackToHabit(_) => "back_to_habit",
            CallbackAction::DeleteHabit(_) => "delete_habit",
            CallbackAction::ConfirmDelete(_) => "confirm_delete",
            CallbackAction::CancelDelete(_) => "cancel_delete",
        }
    }

    pub fn habit_id(&self) -> i64 {
        match *self {
            CallbackAction::ShowCompletion(id)
            | CallbackAction::CompleteYes(id)
            | CallbackAction::CompleteNo(id)
            | CallbackAction::EditHabit(id)
            | CallbackAction::EditTitle(id)
            | CallbackAction::EditDescription(id)
            | CallbackAction::BackToHabit(id)
            | CallbackAction::DeleteHabit(id)
            | CallbackAction::ConfirmDelete(id)
            | CallbackAction::CancelDelete(id) => id,
        }
    }
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tag(), self.habit_id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid callback data '{0}'")]
pub struct InvalidCallback(pub String);

impl FromStr for CallbackAction {
    type Err = InvalidCallback;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidCallback(data.to_string());
        let (tag, id) = data.split_once(':').ok_or_else(invalid)?;
        let id: i64 = id.parse().map_err(|_| invalid())?;

        let action = match tag {
            "complete_habit" => CallbackAction::ShowCompletion(id),
            "complete_yes" => CallbackAction::CompleteYes(id),
            "complete_no" => CallbackAction::CompleteNo(id),
            "edit_habit" => CallbackAction::EditHabit(id),
            "edit_title" => CallbackAction::EditTitle(id),
            "edit_description" => CallbackAction::EditDescription(id),
            "back_to_habit" => CallbackAction::BackToHabit(id),
            "delete_habit" => CallbackAction::DeleteHabit(id),
            "confirm_delete" => CallbackAction::ConfirmDelete(id),
            "cancel_delete" => CallbackAction::CancelDelete(id),
            _ => return Err(invalid()),
        };
        Ok(action)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub action: CallbackAction,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, action: CallbackAction) -> Self {
        InlineButton {
            label: label.into(),
            action,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    /// Persistent reply keyboard under the input field
    Reply { rows: Vec<Vec<String>>, resize: bool },
    /// Buttons attached to a single message
    Inline { rows: Vec<Vec<InlineButton>> },
}

pub fn main_menu_keyboard() -> Keyboard {
    Keyboard::Reply {
        rows: vec![
            vec![MENU_ADD_HABIT.to_string(), MENU_LIST_HABITS.to_string()],
            vec![MENU_MARK_COMPLETION.to_string(), MENU_SETTINGS.to_string()],
        ],
        resize: true,
    }
}

fn status_icon(habit: &Habit) -> &'static str {
    if habit.completion_count > 0 {
        "✅"
    } else {
        "🔄"
    }
}

/// One button per habit opening the completion chooser
pub fn completion_chooser_keyboard(habits: &[Habit]) -> Keyboard {
    Keyboard::Inline {
        rows: habits
            .iter()
            .map(|habit| {
                vec![InlineButton::new(
                    format!("{} {}", status_icon(habit), habit.title),
                    CallbackAction::ShowCompletion(habit.id),
                )]
            })
            .collect(),
    }
}

/// Edit and delete buttons for each listed habit
pub fn habit_list_keyboard(habits: &[Habit]) -> Keyboard {
    Keyboard::Inline {
        rows: habits
            .iter()
            .map(|habit| {
                vec![
                    InlineButton::new(format!("✏️ {}", habit.title), CallbackAction::EditHabit(habit.id)),
                    InlineButton::new("🗑️", CallbackAction::DeleteHabit(habit.id)),
                ]
            })
            .collect(),
    }
}

pub fn habit_actions_keyboard(habit_id: i64) -> Keyboard {
    Keyboard::Inline {
        rows: vec![vec![
            InlineButton::new("✏️ Редактировать", CallbackAction::EditHabit(habit_id)),
            InlineButton::new("🗑️ Удалить", CallbackAction::DeleteHabit(habit_id)),
        ]],
    }
}

pub fn completion_keyboard(habit_id: i64) -> Keyboard {
    Keyboard::Inline {
        rows: vec![vec![
            InlineButton::new("✅ Выполнено", CallbackAction::CompleteYes(habit_id)),
            InlineButton::new("❌ Не выполнено", CallbackAction::CompleteNo(habit_id)),
        ]],
    }
}

pub fn delete_confirmation_keyboard(habit_id: i64) -> Keyboard {
    Keyboard::Inline {
        rows: vec![vec![
            InlineButton::new("✅ Да", CallbackAction::ConfirmDelete(habit_id)),
            InlineButton::new("❌ Нет", CallbackAction::CancelDelete(habit_id)),
        ]],
    }
}

pub fn edit_menu_keyboard(habit_id: i64) -> Keyboard {
    Keyboard::Inline {
        rows: vec![
            vec![
                InlineButton::new("✏️ Изменить название", CallbackAction::EditTitle(habit_id)),
                InlineButton::new("📝 Изменить описание", CallbackAction::EditDescription(habit_id)),
            ],
            vec![InlineButton::new("⬅️ Назад", CallbackAction::BackToHabit(habit_id))],
        ],
    }
}
