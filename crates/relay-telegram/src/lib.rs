//! Telegram adapter (teloxide).
//!
//! This crate implements the `relay-core` RelayPort over the Telegram Bot API
//! and wires the dispatcher to the relay pipeline.

use std::path::Path;

use async_trait::async_trait;

use teloxide::{
    net::Download,
    prelude::*,
    types::{InputFile, Recipient},
};

use tokio::{io::AsyncWriteExt, time::sleep};
use tracing::warn;

pub mod diagnostics;
pub mod handlers;
pub mod router;
pub mod updates;

use relay_core::{
    domain::{ChannelRef, ChatId, MediaDescriptor, MessageId, MessageRef},
    errors::Error,
    ports::RelayPort,
    Result,
};

#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn recipient(dest: &ChannelRef) -> Recipient {
        match dest {
            ChannelRef::Id(id) => Recipient::Id(teloxide::types::ChatId(id.0)),
            ChannelRef::Username(name) => Recipient::ChannelUsername(format!("@{name}")),
        }
    }

    fn message_ref(msg: &Message) -> MessageRef {
        MessageRef {
            chat_id: ChatId(msg.chat.id.0),
            message_id: MessageId(msg.id.0),
        }
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    /// Run a request, honoring one flood-wait (`RetryAfter`) before giving up.
    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        warn!(retry_after_secs = d.as_secs(), "telegram flood wait");
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl RelayPort for TelegramGateway {
    async fn send_text(&self, dest: &ChannelRef, text: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::recipient(dest), text.to_string())
            })
            .await?;
        Ok(Self::message_ref(&msg))
    }

    async fn send_photo(
        &self,
        dest: &ChannelRef,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                let mut req = self
                    .bot
                    .send_photo(Self::recipient(dest), InputFile::file(path.to_path_buf()));
                if let Some(c) = caption {
                    req = req.caption(c.to_string());
                }
                req
            })
            .await?;
        Ok(Self::message_ref(&msg))
    }

    async fn download_media(&self, media: &MediaDescriptor, dest: &Path) -> Result<()> {
        let file = self
            .with_retry(|| self.bot.get_file(media.file_id.clone()))
            .await?;

        let mut dst = tokio::fs::File::create(dest).await?;
        self.bot
            .download_file(&file.path, &mut dst)
            .await
            .map_err(|e| Error::External(format!("telegram download error: {e}")))?;
        dst.flush().await?;
        Ok(())
    }
}
