use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::{error, info, warn};

use crate::downloader::VideoFetcher;
use crate::platform::{IncomingMessage, Messenger};
use crate::tiktok;

/// Telegram's upload ceiling for bots.
pub const MAX_VIDEO_BYTES: u64 = 50 * 1024 * 1024;

pub const DOWNLOADING_TEXT: &str = "Downloading...";
pub const TOO_LARGE_TEXT: &str = "File too large (max 50MB)";
pub const FAILED_TEXT: &str = "Failed to download video";

/// How handling a single message ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No TikTok link in the text; nothing was sent
    Ignored,
    Delivered,
    TooLarge { size: u64 },
    /// Download failed, or the upload itself was rejected by the platform
    Failed,
}

struct VideoFile {
    path: PathBuf,
    size: u64,
}

pub fn exceeds_limit(size: u64) -> bool {
    size > MAX_VIDEO_BYTES
}

fn scratch_dir() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix("tiktok-")
        .tempdir()
        .context("Failed to create download directory")
}

/// Run the blocking fetch on the blocking pool and stat the result.
async fn fetch_video(
    fetcher: Arc<dyn VideoFetcher>,
    url: &str,
    dest: &Path,
) -> Result<VideoFile> {
    let url = url.to_string();
    let dest = dest.to_path_buf();
    let path = tokio::task::spawn_blocking(move || fetcher.fetch(&url, &dest))
        .await
        .context("Download task panicked")??;

    let size = tokio::fs::metadata(&path)
        .await
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();

    Ok(VideoFile { path, size })
}

async fn notify(messenger: &dyn Messenger, chat_id: i64, text: &str) {
    if let Err(e) = messenger.send_text(chat_id, text).await {
        error!("{:#}", e);
    }
}

/// Handle one inbound message: find a TikTok link, download it and send
/// the video back, or tell the user why not.
pub async fn handle_message(
    messenger: &dyn Messenger,
    fetcher: Arc<dyn VideoFetcher>,
    msg: &IncomingMessage,
) -> Outcome {
    let Some(url) = tiktok::find_url(&msg.text) else {
        return Outcome::Ignored;
    };

    info!("TikTok URL from chat {}: {}", msg.chat_id, url);
    notify(messenger, msg.chat_id, DOWNLOADING_TEXT).await;

    let workdir = match scratch_dir() {
        Ok(dir) => dir,
        Err(e) => {
            error!("Failed to download {}: {:#}", url, e);
            notify(messenger, msg.chat_id, FAILED_TEXT).await;
            return Outcome::Failed;
        }
    };

    let outcome = match fetch_video(fetcher, url, workdir.path()).await {
        Ok(video) if exceeds_limit(video.size) => {
            warn!(
                "Video from {} is {} bytes, over the {} byte limit",
                url, video.size, MAX_VIDEO_BYTES
            );
            notify(messenger, msg.chat_id, TOO_LARGE_TEXT).await;
            Outcome::TooLarge { size: video.size }
        }
        Ok(video) => match messenger.send_video(msg.chat_id, &video.path).await {
            Ok(()) => {
                info!("Video sent successfully ({} bytes)", video.size);
                Outcome::Delivered
            }
            Err(e) => {
                error!("{:#}", e);
                Outcome::Failed
            }
        },
        Err(e) => {
            error!("Failed to download {}: {:#}", url, e);
            notify(messenger, msg.chat_id, FAILED_TEXT).await;
            Outcome::Failed
        }
    };

    let workdir_path = workdir.path().to_path_buf();
    if let Err(e) = workdir.close() {
        warn!(
            "Failed to remove download directory {}: {}",
            workdir_path.display(),
            e
        );
    }

    outcome
}
