//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use habitbot::database::Database;
use habitbot::dialogue::{DialogueEngine, IncomingCallback, IncomingMessage, Sender};
use habitbot::dialogue_state::InMemoryDialogueStore;
use habitbot::error::{HabitError, HabitResult};
use habitbot::habit_service::{HabitRules, HabitService};
use habitbot::keyboards::Keyboard;
use habitbot::notifications::DailyTime;
use habitbot::transport::BotTransport;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Sent {
        chat_id: String,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Edited {
        chat_id: String,
        message_id: i32,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Answered {
        callback_id: String,
        text: Option<String>,
        alert: bool,
    },
}

impl Outbound {
    pub fn text(&self) -> Option<&str> {
        match self {
            Outbound::Sent { text, .. } | Outbound::Edited { text, .. } => Some(text),
            Outbound::Answered { text, .. } => text.as_deref(),
        }
    }
}

/// Transport double that records every call. Sends to chats listed in
/// `failing_chats` return a delivery error.
#[derive(Default)]
pub struct RecordingTransport {
    log: Mutex<Vec<Outbound>>,
    failing_chats: Mutex<HashSet<String>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_chat(&self, chat_id: &str) {
        self.failing_chats.lock().unwrap().insert(chat_id.to_string());
    }

    pub fn outbound(&self) -> Vec<Outbound> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }

    pub fn sent_to(&self, chat_id: &str) -> Vec<String> {
        self.outbound()
            .into_iter()
            .filter_map(|o| match o {
                Outbound::Sent { chat_id: c, text, .. } if c == chat_id => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_text(&self) -> Option<String> {
        self.outbound()
            .iter()
            .rev()
            .find(|o| !matches!(o, Outbound::Answered { .. }))
            .and_then(|o| o.text().map(str::to_string))
    }

    pub fn answers(&self) -> Vec<(Option<String>, bool)> {
        self.outbound()
            .into_iter()
            .filter_map(|o| match o {
                Outbound::Answered { text, alert, .. } => Some((text, alert)),
                _ => None,
            })
            .collect()
    }

    pub fn edits(&self) -> Vec<Outbound> {
        self.outbound()
            .into_iter()
            .filter(|o| matches!(o, Outbound::Edited { .. }))
            .collect()
    }
}

#[async_trait]
impl BotTransport for RecordingTransport {
    async fn send_message(&self, chat_id: &str, text: &str, keyboard: Option<Keyboard>) -> HabitResult<()> {
        if self.failing_chats.lock().unwrap().contains(chat_id) {
            return Err(HabitError::delivery(chat_id, "bot was blocked by the user"));
        }
        self.log.lock().unwrap().push(Outbound::Sent {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
            keyboard,
        });
        Ok(())
    }

    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: i32,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> HabitResult<()> {
        self.log.lock().unwrap().push(Outbound::Edited {
            chat_id: chat_id.to_string(),
            message_id,
            text: text.to_string(),
            keyboard,
        });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>, alert: bool) -> HabitResult<()> {
        self.log.lock().unwrap().push(Outbound::Answered {
            callback_id: callback_id.to_string(),
            text: text.map(str::to_string),
            alert,
        });
        Ok(())
    }
}

pub async fn service() -> Arc<HabitService> {
    let db = Database::new(":memory:").await.unwrap();
    Arc::new(HabitService::new(db, HabitRules::default()))
}

pub struct Harness {
    pub service: Arc<HabitService>,
    pub states: Arc<InMemoryDialogueStore>,
    pub transport: Arc<RecordingTransport>,
    pub engine: DialogueEngine,
}

pub async fn harness() -> Harness {
    let service = service().await;
    let states = Arc::new(InMemoryDialogueStore::new());
    let transport = RecordingTransport::new();
    let engine = DialogueEngine::new(
        service.clone(),
        states.clone(),
        transport.clone(),
        DailyTime::new(9, 0).unwrap(),
    );
    Harness {
        service,
        states,
        transport,
        engine,
    }
}

/// Private chat: chat id equals the sender's id
pub fn sender(id: &str) -> Sender {
    Sender {
        external_id: id.to_string(),
        username: Some(format!("user{id}")),
        first_name: Some("Ann".to_string()),
        last_name: None,
    }
}

pub fn message(id: &str, text: &str) -> IncomingMessage {
    IncomingMessage {
        chat_id: id.to_string(),
        sender: sender(id),
        text: text.to_string(),
    }
}

pub fn callback(id: &str, data: &str) -> IncomingCallback {
    IncomingCallback {
        callback_id: format!("cb-{id}-{data}"),
        chat_id: id.to_string(),
        message_id: 100,
        sender: sender(id),
        data: data.to_string(),
    }
}
