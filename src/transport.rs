//! Outbound bot transport seam shared by the dialogue engine and the scheduler

use crate::error::HabitResult;
use crate::keyboards::Keyboard;
use async_trait::async_trait;

/// Messaging backend. Failures surface as `HabitError::TransientDelivery`;
/// callers log them and move on, nothing is retried.
#[async_trait]
pub trait BotTransport: Send + Sync {
    async fn send_message(&self, chat_id: &str, text: &str, keyboard: Option<Keyboard>) -> HabitResult<()>;

    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: i32,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> HabitResult<()>;

    /// Clear the client's loading indicator for a button press
    async fn answer_callback(&self, callback_id: &str, text: Option<&str>, alert: bool) -> HabitResult<()>;
}
