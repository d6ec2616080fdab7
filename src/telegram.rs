//! # Feature: Telegram Transport
//!
//! teloxide-backed implementation of [`BotTransport`] and the update
//! dispatcher that feeds messages and callback queries to the dialogue engine.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

use crate::dialogue::{DialogueEngine, IncomingCallback, IncomingMessage, Sender};
use crate::error::{HabitError, HabitResult};
use crate::keyboards::{InlineButton, Keyboard};
use crate::transport::BotTransport;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQueryId, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup, MessageId,
    ReplyMarkup, User as TelegramUser,
};

#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(token: &str) -> Self {
        TelegramTransport { bot: Bot::new(token) }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }
}

fn parse_chat_id(chat_id: &str) -> HabitResult<ChatId> {
    chat_id
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| HabitError::delivery(chat_id, "chat id is not numeric"))
}

fn inline_markup(rows: &[Vec<InlineButton>]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(rows.iter().map(|row| {
        row.iter()
            .map(|button| InlineKeyboardButton::callback(button.label.clone(), button.action.to_string()))
            .collect::<Vec<_>>()
    }))
}

fn reply_markup(keyboard: &Keyboard) -> ReplyMarkup {
    match keyboard {
        Keyboard::Reply { rows, resize } => {
            let markup = KeyboardMarkup::new(
                rows.iter()
                    .map(|row| row.iter().map(KeyboardButton::new).collect::<Vec<_>>()),
            );
            let markup = if *resize { markup.resize_keyboard() } else { markup };
            ReplyMarkup::Keyboard(markup)
        }
        Keyboard::Inline { rows } => ReplyMarkup::InlineKeyboard(inline_markup(rows)),
    }
}

#[async_trait]
impl BotTransport for TelegramTransport {
    async fn send_message(&self, chat_id: &str, text: &str, keyboard: Option<Keyboard>) -> HabitResult<()> {
        let chat = parse_chat_id(chat_id)?;
        let mut request = self.bot.send_message(chat, text);
        if let Some(ref keyboard) = keyboard {
            request = request.reply_markup(reply_markup(keyboard));
        }
        request
            .await
            .map(|_| ())
            .map_err(|e| HabitError::delivery(chat_id, e))
    }

    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: i32,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> HabitResult<()> {
        let chat = parse_chat_id(chat_id)?;
        let mut request = self.bot.edit_message_text(chat, MessageId(message_id), text);
        match keyboard {
            Some(Keyboard::Inline { ref rows }) => request = request.reply_markup(inline_markup(rows)),
            Some(Keyboard::Reply { .. }) => {
                debug!("Dropping reply keyboard on edit of message {message_id} in chat {chat_id}");
            }
            None => {}
        }
        request
            .await
            .map(|_| ())
            .map_err(|e| HabitError::delivery(chat_id, e))
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>, alert: bool) -> HabitResult<()> {
        let mut request = self.bot.answer_callback_query(CallbackQueryId(callback_id.to_string()));
        if let Some(text) = text {
            request = request.text(text).show_alert(alert);
        }
        request
            .await
            .map(|_| ())
            .map_err(|e| HabitError::delivery(callback_id, e))
    }
}

fn sender_from(user: &TelegramUser) -> Sender {
    Sender {
        external_id: user.id.0.to_string(),
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()).filter(|n| !n.is_empty()),
        last_name: user.last_name.clone(),
    }
}

async fn on_message(msg: Message, engine: Arc<DialogueEngine>) -> ResponseResult<()> {
    let (Some(text), Some(user)) = (msg.text(), msg.from.as_ref()) else {
        return Ok(());
    };
    if user.is_bot {
        return Ok(());
    }

    let incoming = IncomingMessage {
        chat_id: msg.chat.id.0.to_string(),
        sender: sender_from(user),
        text: text.to_string(),
    };
    engine.handle_message(&incoming).await;
    Ok(())
}

async fn on_callback(query: CallbackQuery, engine: Arc<DialogueEngine>) -> ResponseResult<()> {
    let Some(message) = query.message.as_ref() else {
        warn!("Callback {} arrived without a message, ignoring", query.id.0);
        return Ok(());
    };

    let incoming = IncomingCallback {
        callback_id: query.id.0.clone(),
        chat_id: message.chat().id.0.to_string(),
        message_id: message.id().0,
        sender: sender_from(&query.from),
        data: query.data.clone().unwrap_or_default(),
    };
    engine.handle_callback(&incoming).await;
    Ok(())
}

/// Long-poll Telegram until Ctrl+C
pub async fn run_dispatcher(bot: Bot, engine: Arc<DialogueEngine>) {
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_callback_query().endpoint(on_callback));

    info!("Starting Telegram update dispatcher...");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![engine])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    info!("Telegram dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboards::{completion_keyboard, main_menu_keyboard};

    #[test]
    fn test_parse_chat_id() {
        assert_eq!(parse_chat_id("-1001").unwrap(), ChatId(-1001));
        assert!(matches!(
            parse_chat_id("abc"),
            Err(HabitError::TransientDelivery { .. })
        ));
    }

    #[test]
    fn test_inline_markup_carries_callback_data() {
        let Keyboard::Inline { rows } = completion_keyboard(4) else {
            panic!("expected inline keyboard");
        };
        let markup = inline_markup(&rows);
        assert_eq!(markup.inline_keyboard.len(), 1);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
    }

    #[test]
    fn test_reply_markup_kind() {
        assert!(matches!(reply_markup(&main_menu_keyboard()), ReplyMarkup::Keyboard(_)));
        assert!(matches!(
            reply_markup(&completion_keyboard(1)),
            ReplyMarkup::InlineKeyboard(_)
        ));
    }
}
