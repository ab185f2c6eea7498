use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::InputFile;

use crate::platform::{IncomingMessage, Messenger};

/// Extract the handled part of a Telegram message: text, or caption for media.
pub fn incoming_message(msg: Message) -> Option<IncomingMessage> {
    let text = msg.text().or_else(|| msg.caption())?;
    Some(IncomingMessage {
        chat_id: msg.chat.id.0,
        text: text.to_string(),
    })
}

pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .with_context(|| format!("Failed to send message to chat {}", chat_id))?;
        Ok(())
    }

    async fn send_video(&self, chat_id: i64, path: &Path) -> Result<()> {
        self.bot
            .send_video(ChatId(chat_id), InputFile::file(path.to_path_buf()))
            .supports_streaming(true)
            .await
            .with_context(|| format!("Failed to send video to chat {}", chat_id))?;
        Ok(())
    }
}
