//! # Feature: Dialogue State Store
//!
//! Per-chat conversational mode, held in process memory only. Lost on restart.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

use dashmap::DashMap;
use std::fmt;

/// What the engine expects as the next inbound message from a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialogueMode {
    #[default]
    Idle,
    AwaitingNewHabitTitle,
    AwaitingEditingModeSelection { habit_id: i64 },
    AwaitingEditedTitle { habit_id: i64 },
    AwaitingEditedDescription { habit_id: i64 },
}

impl fmt::Display for DialogueMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialogueMode::Idle => write!(f, "idle"),
            DialogueMode::AwaitingNewHabitTitle => write!(f, "awaiting-new-habit-title"),
            DialogueMode::AwaitingEditingModeSelection { habit_id } => {
                write!(f, "awaiting-editing-mode-selection({habit_id})")
            }
            DialogueMode::AwaitingEditedTitle { habit_id } => write!(f, "awaiting-edited-title({habit_id})"),
            DialogueMode::AwaitingEditedDescription { habit_id } => {
                write!(f, "awaiting-edited-description({habit_id})")
            }
        }
    }
}

/// Keyed mode storage injected into the dialogue engine.
///
/// Setting `None` (or `Idle`) removes the entry; the store never holds more
/// than one mode per chat.
pub trait DialogueStateStore: Send + Sync {
    fn get(&self, chat_id: &str) -> Option<DialogueMode>;

    fn set(&self, chat_id: &str, mode: Option<DialogueMode>);

    fn clear(&self, chat_id: &str) {
        self.set(chat_id, None);
    }

    /// Current mode, `Idle` when no entry exists
    fn mode(&self, chat_id: &str) -> DialogueMode {
        self.get(chat_id).unwrap_or_default()
    }
}

/// Concurrent in-memory store; each chat only touches its own key
#[derive(Debug, Default)]
pub struct InMemoryDialogueStore {
    modes: DashMap<String, DialogueMode>,
}

impl InMemoryDialogueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }
}

impl DialogueStateStore for InMemoryDialogueStore {
    fn get(&self, chat_id: &str) -> Option<DialogueMode> {
        self.modes.get(chat_id).map(|entry| *entry.value())
    }

    fn set(&self, chat_id: &str, mode: Option<DialogueMode>) {
        match mode {
            None | Some(DialogueMode::Idle) => {
                self.modes.remove(chat_id);
            }
            Some(mode) => {
                self.modes.insert(chat_id.to_string(), mode);
            }
        }
    }
}
