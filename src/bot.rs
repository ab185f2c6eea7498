use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Result;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::RequestError;
use tracing::{debug, info};

use crate::config::Config;
use crate::downloader::VideoFetcher;
use crate::platform::telegram::{incoming_message, TelegramMessenger};
use crate::platform::IncomingMessage;
use crate::relay;

/// Shared application state
pub struct AppState {
    config: Config,
    fetcher: Arc<dyn VideoFetcher>,
}

impl AppState {
    pub fn new(config: Config, fetcher: Arc<dyn VideoFetcher>) -> Self {
        Self { config, fetcher }
    }
}

/// Route every update that carries a message, new or edited, in chats and
/// channels alike, to `endpoint` once it has text or a caption.
fn text_updates(endpoint: UpdateHandler<RequestError>) -> UpdateHandler<RequestError> {
    dptree::entry()
        .branch(
            Update::filter_message()
                .filter_map(incoming_message)
                .chain(endpoint.clone()),
        )
        .branch(
            Update::filter_edited_message()
                .filter_map(incoming_message)
                .chain(endpoint.clone()),
        )
        .branch(
            Update::filter_channel_post()
                .filter_map(incoming_message)
                .chain(endpoint.clone()),
        )
        .branch(
            Update::filter_edited_channel_post()
                .filter_map(incoming_message)
                .chain(endpoint),
        )
}

/// Every update is handled as soon as it arrives, even within one chat.
fn no_chat_ordering(_: &Update) -> Option<Infallible> {
    None
}

/// Start the Telegram bot and poll until interrupted
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let bot = Bot::new(&state.config.bot_token);

    info!("Starting Telegram bot...");

    let handler = text_updates(dptree::endpoint(handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .distribution_function(no_chat_ordering)
        .default_handler(|upd| async move {
            debug!("Ignoring update without text: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error has occurred in the dispatcher",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Bot stopped");
    Ok(())
}

async fn handle_message(
    bot: Bot,
    incoming: IncomingMessage,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let messenger = TelegramMessenger::new(bot);
    let outcome = relay::handle_message(&messenger, state.fetcher.clone(), &incoming).await;
    debug!("Chat {}: {:?}", incoming.chat_id, outcome);
    Ok(())
}
