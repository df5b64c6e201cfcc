use std::path::Path;

use async_trait::async_trait;

use crate::{
    domain::{ChannelRef, MediaDescriptor, MessageRef},
    Result,
};

/// Outbound side of the relay: everything it needs from the messenger.
///
/// Telegram is the only implementation today; tests use in-memory fakes.
#[async_trait]
pub trait RelayPort: Send + Sync {
    async fn send_text(&self, dest: &ChannelRef, text: &str) -> Result<MessageRef>;

    async fn send_photo(
        &self,
        dest: &ChannelRef,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<MessageRef>;

    /// Download the attachment into `dest`, creating or truncating the file.
    async fn download_media(&self, media: &MediaDescriptor, dest: &Path) -> Result<()>;
}

/// A single downloadable file, as seen by the retry loop.
#[async_trait]
pub trait MediaSource: Send + Sync {
    fn file_name_hint(&self) -> String;

    async fn download_to(&self, dest: &Path) -> Result<()>;
}

/// Binds a descriptor to the port that can fetch it.
pub struct PortMedia<'a> {
    pub port: &'a dyn RelayPort,
    pub media: &'a MediaDescriptor,
}

#[async_trait]
impl<'a> MediaSource for PortMedia<'a> {
    fn file_name_hint(&self) -> String {
        self.media.file_name_hint()
    }

    async fn download_to(&self, dest: &Path) -> Result<()> {
        self.port.download_media(self.media, dest).await
    }
}
