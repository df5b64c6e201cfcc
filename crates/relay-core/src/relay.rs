//! The relay pipeline: filter, deduplicate and forward one post at a time.

use std::{
    collections::HashSet,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    content::{create_caption, extract_content, should_process, Content},
    dedup::{fingerprint, DedupSet},
    domain::{ChannelRef, MediaDescriptor, MessageRef, RelayMessage},
    errors::Error,
    media::{cleanup_temp_files, download_with_retry, media_info, RetryPolicy},
    ports::{PortMedia, RelayPort},
    window::MonitoringWindow,
    Result,
};

#[derive(Clone, Debug)]
pub struct RelaySettings {
    pub destination: ChannelRef,
    pub window: MonitoringWindow,
    pub dedup_capacity: usize,
    pub retry: RetryPolicy,
    pub max_file_size: u64,
    pub caption_limit: usize,
    pub temp_dir: PathBuf,
}

impl RelaySettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            destination: cfg.destination_channel.clone(),
            window: cfg.window,
            dedup_capacity: cfg.dedup_capacity,
            retry: cfg.download_retry,
            max_file_size: cfg.max_file_size,
            caption_limit: cfg.caption_limit,
            temp_dir: cfg.temp_dir.clone(),
        }
    }
}

/// Why a post was not forwarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Skip {
    Service,
    Empty,
    OutsideWindow,
    Duplicate,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Forwarded(MessageRef),
    Skipped(Skip),
    Failed(String),
}

#[derive(Debug)]
struct DedupState {
    seen: DedupSet,
    /// Fingerprints currently being forwarded.
    in_flight: HashSet<String>,
}

/// Holds a fingerprint in the in-flight set until dropped, including when the
/// `handle` future is cancelled mid-send.
struct InFlight<'a> {
    relay: &'a Relay,
    fp: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.relay.dedup_state().in_flight.remove(&self.fp);
    }
}

pub struct Relay {
    settings: RelaySettings,
    port: Arc<dyn RelayPort>,
    dedup: Mutex<DedupState>,
}

impl Relay {
    pub fn new(settings: RelaySettings, port: Arc<dyn RelayPort>) -> Self {
        let dedup = Mutex::new(DedupState {
            seen: DedupSet::new(settings.dedup_capacity),
            in_flight: HashSet::new(),
        });
        Self {
            settings,
            port,
            dedup,
        }
    }

    // Never held across an await.
    fn dedup_state(&self) -> MutexGuard<'_, DedupState> {
        self.dedup.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of fingerprints currently remembered.
    pub fn remembered(&self) -> usize {
        self.dedup_state().seen.len()
    }

    /// Handle one incoming post. Never fails: errors are logged and reported as `Outcome::Failed`.
    pub async fn handle(&self, msg: &RelayMessage) -> Outcome {
        if !should_process(msg) {
            let skip = if msg.service { Skip::Service } else { Skip::Empty };
            info!(
                chat_id = msg.chat_id.0,
                message_id = msg.message_id.0,
                ?skip,
                "message skipped (service or empty)"
            );
            return Outcome::Skipped(skip);
        }

        if !self.settings.window.contains(msg.date) {
            info!(
                chat_id = msg.chat_id.0,
                message_id = msg.message_id.0,
                date = %msg.date,
                "message outside monitoring window"
            );
            return Outcome::Skipped(Skip::OutsideWindow);
        }

        let fp = fingerprint(msg);
        let guard = {
            let mut state = self.dedup_state();
            if state.seen.contains(&fp) || !state.in_flight.insert(fp.clone()) {
                info!(
                    chat_id = msg.chat_id.0,
                    message_id = msg.message_id.0,
                    "message already processed (duplicate)"
                );
                return Outcome::Skipped(Skip::Duplicate);
            }
            InFlight { relay: self, fp }
        };

        let content = extract_content(msg);
        info!(
            source = %msg.source_label(),
            message_id = msg.message_id.0,
            media_type = %content
                .media_type
                .map(|m| m.to_string())
                .unwrap_or_else(|| "none".to_string()),
            "relaying new message"
        );

        let result = self.forward(msg, &content).await;

        match result {
            Ok(sent) => {
                // Record before the guard releases the in-flight entry.
                let cleared = self.dedup_state().seen.insert(guard.fp.clone());
                drop(guard);
                if cleared {
                    info!("cleared processed message set");
                }
                Outcome::Forwarded(sent)
            }
            Err(e) => {
                error!(
                    chat_id = msg.chat_id.0,
                    message_id = msg.message_id.0,
                    error = %e,
                    "failed to relay message"
                );
                Outcome::Failed(e.to_string())
            }
        }
    }

    async fn forward(&self, msg: &RelayMessage, content: &Content) -> Result<MessageRef> {
        if content.has_photo {
            let media = msg
                .media
                .as_ref()
                .ok_or_else(|| Error::External("photo post without media".to_string()))?;
            return self.forward_photo(media, content.text.as_deref()).await;
        }

        let text = content.text.as_deref().unwrap_or_default();
        let sent = self.port.send_text(&self.settings.destination, text).await?;
        info!(destination = %self.settings.destination, "sent text");
        Ok(sent)
    }

    async fn forward_photo(
        &self,
        media: &MediaDescriptor,
        text: Option<&str>,
    ) -> Result<MessageRef> {
        // Skip the download when the platform already tells us the file is too big.
        if media.size > self.settings.max_file_size {
            warn!(size = media.size, "photo exceeds size limit");
            return Err(Error::MediaRejected(format!(
                "file too large: {} bytes (limit {})",
                media.size, self.settings.max_file_size
            )));
        }

        let source = PortMedia {
            port: self.port.as_ref(),
            media,
        };
        let path = download_with_retry(
            &source,
            &self.settings.temp_dir,
            self.settings.retry,
            self.settings.max_file_size,
        )
        .await?;

        if let Some(info) = media_info(&path) {
            debug!(
                size = %info.size_formatted,
                extension = %info.extension,
                "downloaded file"
            );
        }

        let caption = text
            .map(|t| create_caption(t, self.settings.caption_limit))
            .filter(|c| !c.is_empty());

        let result = self
            .port
            .send_photo(&self.settings.destination, &path, caption.as_deref())
            .await;
        cleanup_temp_files(&[&path]);

        let sent = result?;
        if caption.is_some() {
            info!(destination = %self.settings.destination, "sent photo with text");
        } else {
            info!(destination = %self.settings.destination, "sent photo");
        }
        Ok(sent)
    }
}
