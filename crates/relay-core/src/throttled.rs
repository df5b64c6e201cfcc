use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChannelRef, MediaDescriptor, MessageRef},
    ports::RelayPort,
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* outbound calls (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between posts to the same destination.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_chat_min_interval: Duration::from_millis(1050), // ~0.95/sec
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// RelayPort decorator that rate-limits outbound calls.
///
/// Channels accept roughly one post per second; bursts from many sources would
/// otherwise end in 429s and flood waits.
pub struct ThrottledPort {
    inner: Arc<dyn RelayPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<ChannelRef, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledPort {
    pub fn new(inner: Arc<dyn RelayPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_chat(&self, dest: &ChannelRef) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_chat.lock().await;
        map.entry(dest.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_chat_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle_chat(&self, dest: &ChannelRef) {
        let global_wait = { self.global.lock().await.reserve() };
        let chat_wait = {
            let lim = self.limiter_for_chat(dest).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(chat_wait);
        if wait > Duration::ZERO {
            sleep(wait).await;
        }
    }

    async fn throttle_global(&self) {
        let wait = { self.global.lock().await.reserve() };
        if wait > Duration::ZERO {
            sleep(wait).await;
        }
    }
}

#[async_trait]
impl RelayPort for ThrottledPort {
    async fn send_text(&self, dest: &ChannelRef, text: &str) -> Result<MessageRef> {
        self.throttle_chat(dest).await;
        self.inner.send_text(dest, text).await
    }

    async fn send_photo(
        &self,
        dest: &ChannelRef,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<MessageRef> {
        self.throttle_chat(dest).await;
        self.inner.send_photo(dest, path, caption).await
    }

    async fn download_media(&self, media: &MediaDescriptor, dest: &Path) -> Result<()> {
        // Downloads come from many source chats; only the global limiter applies.
        self.throttle_global().await;
        self.inner.download_media(media, dest).await
    }
}
