pub mod telegram;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

/// A text-bearing message received from the chat platform
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Platform chat identifier replies are addressed to
    pub chat_id: i64,
    /// Message text, or the media caption when there is no text
    pub text: String,
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Upload a local file as a native (streamable) video.
    async fn send_video(&self, chat_id: i64, path: &Path) -> Result<()>;
}
