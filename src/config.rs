use anyhow::{Context, Result};
use std::path::PathBuf;

#[derive(Clone)]
pub struct Config {
    pub bot_token: String,
    /// yt-dlp executable, resolved through PATH unless absolute.
    pub ytdlp_path: PathBuf,
}

fn default_ytdlp_path() -> PathBuf {
    PathBuf::from("yt-dlp")
}

impl Config {
    /// Read configuration from the process environment.
    /// A `.env` file, if any, must already have been loaded by the caller.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bot_token = lookup("BOT_TOKEN")
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .context("BOT_TOKEN is required")?;

        let ytdlp_path = lookup("YTDLP_PATH")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_ytdlp_path);

        Ok(Self {
            bot_token,
            ytdlp_path,
        })
    }
}
