//! Telegram update handlers.
//!
//! Channel posts and group messages share one path: drop anything not from a
//! configured source (or from the destination itself), map it onto the core
//! model and hand it to the relay.

use std::sync::Arc;

use teloxide::prelude::*;
use tracing::debug;

use relay_core::{
    domain::{ChannelRef, ChatId, SourceFilter},
    relay::Outcome,
};

use crate::{router::AppState, updates::to_relay_message};

/// Whether a chat's posts should be relayed.
///
/// Config only rejects a destination spelled the same way as a source; the
/// same channel named by id in one place and by username in the other is
/// caught here.
fn is_relayed_chat(
    sources: &SourceFilter,
    destination: &ChannelRef,
    chat_id: ChatId,
    username: Option<&str>,
) -> bool {
    sources.matches(chat_id, username) && !destination.matches(chat_id, username)
}

pub async fn handle_post(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);
    if !is_relayed_chat(
        &state.sources,
        &state.cfg.destination_channel,
        chat_id,
        msg.chat.username(),
    ) {
        debug!(chat_id = chat_id.0, "ignoring update from non-source chat");
        return Ok(());
    }

    let post = to_relay_message(&msg);
    match state.relay.handle(&post).await {
        Outcome::Forwarded(sent) => debug!(
            chat_id = post.chat_id.0,
            message_id = post.message_id.0,
            forwarded_as = sent.message_id.0,
            "post relayed"
        ),
        other => debug!(
            chat_id = post.chat_id.0,
            message_id = post.message_id.0,
            outcome = ?other,
            "post not relayed"
        ),
    }

    // Relay failures are logged by the pipeline; never stop the dispatcher over one post.
    Ok(())
}
