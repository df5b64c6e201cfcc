//! Startup and operator checks against the live Bot API.
//!
//! Used by the relay at startup (destination permissions) and by `relay-check`
//! for a full report.

use chrono::Utc;
use serde::Serialize;
use teloxide::{
    prelude::*,
    types::{ChatMemberKind, UserId},
};
use tracing::{error, info, warn};

use relay_core::{
    config::Config,
    domain::ChannelRef,
    window::{WindowPhase, WindowStatus},
};

use crate::TelegramGateway;

/// What the bot may do in the destination channel.
#[derive(Clone, Debug, Serialize)]
pub struct DestinationAccess {
    pub channel: String,
    pub is_admin: bool,
    pub can_post: bool,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ChannelAccess {
    pub accessible: Vec<String>,
    /// Channel and the error returned for it.
    pub inaccessible: Vec<(String, String)>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChannelInfo {
    pub id: i64,
    pub title: Option<String>,
    pub username: Option<String>,
    pub members: Option<u32>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Report {
    pub bot_username: String,
    pub window: WindowStatus,
    pub sources: ChannelAccess,
    pub destination: Option<DestinationAccess>,
    pub destination_error: Option<String>,
    pub test_message_sent: Option<bool>,
    pub channel_info: Vec<ChannelInfo>,
}

pub struct ReportOptions {
    pub send_test_message: bool,
    /// How many accessible sources to describe in detail.
    pub info_limit: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            send_test_message: true,
            info_limit: 3,
        }
    }
}

pub async fn check_destination(
    bot: &Bot,
    me: UserId,
    dest: &ChannelRef,
) -> anyhow::Result<DestinationAccess> {
    let member = bot
        .get_chat_member(TelegramGateway::recipient(dest), me)
        .await?;

    let (is_admin, can_post) = match &member.kind {
        ChatMemberKind::Owner(_) => (true, true),
        ChatMemberKind::Administrator(admin) => (true, admin.can_post_messages),
        _ => (false, false),
    };

    Ok(DestinationAccess {
        channel: dest.to_string(),
        is_admin,
        can_post,
    })
}

/// Verify the bot can publish to the destination. Logs the outcome.
pub async fn check_bot_permissions(bot: &Bot, me: UserId, dest: &ChannelRef) -> bool {
    match check_destination(bot, me, dest).await {
        Ok(access) if !access.is_admin => {
            warn!(destination = %dest, "bot is not an administrator of the destination channel");
            false
        }
        Ok(access) if !access.can_post => {
            warn!(destination = %dest, "bot may not post in the destination channel");
            false
        }
        Ok(_) => {
            info!(destination = %dest, "destination permissions verified");
            true
        }
        Err(e) => {
            error!(destination = %dest, error = %e, "failed to check bot permissions");
            false
        }
    }
}

pub async fn check_channel_access(bot: &Bot, sources: &[ChannelRef]) -> ChannelAccess {
    let mut out = ChannelAccess::default();

    for chan in sources {
        match bot.get_chat(TelegramGateway::recipient(chan)).await {
            Ok(_) => {
                info!(channel = %chan, "source accessible");
                out.accessible.push(chan.to_string());
            }
            Err(e) => {
                warn!(channel = %chan, error = %e, "source not accessible");
                out.inaccessible.push((chan.to_string(), e.to_string()));
            }
        }
    }

    info!(
        accessible = out.accessible.len(),
        total = sources.len(),
        "source access checked"
    );
    out
}

pub async fn channel_info(bot: &Bot, chan: &ChannelRef) -> anyhow::Result<ChannelInfo> {
    let recipient = TelegramGateway::recipient(chan);
    let chat = bot.get_chat(recipient.clone()).await?;
    let members = match bot.get_chat_member_count(recipient).await {
        Ok(n) => Some(n),
        Err(e) => {
            warn!(channel = %chan, error = %e, "failed to fetch member count");
            None
        }
    };

    Ok(ChannelInfo {
        id: chat.id.0,
        title: chat.title().map(|s| s.to_string()),
        username: chat.username().map(|s| s.to_string()),
        members,
        description: chat.description().map(|s| s.to_string()),
    })
}

pub async fn send_test_message(bot: &Bot, dest: &ChannelRef) -> anyhow::Result<()> {
    let text = format!(
        "🧪 Test message from channel relay\nTime: {}",
        Utc::now().to_rfc3339()
    );
    bot.send_message(TelegramGateway::recipient(dest), text)
        .await?;
    info!(destination = %dest, "test message sent");
    Ok(())
}

pub fn log_window_status(status: &WindowStatus) {
    info!(
        now = %status.now,
        start = %status.start,
        end = %status.end,
        active = status.active,
        "monitoring window"
    );
    match status.phase {
        WindowPhase::NotStarted => {
            info!(days = status.days_until_start, "days until monitoring starts")
        }
        WindowPhase::Active => info!(days = status.days_until_end, "days until monitoring ends"),
        WindowPhase::Ended => info!(days = status.days_since_end, "days since monitoring ended"),
    }
}

/// Run every check and collect the results.
pub async fn run(cfg: &Config, opts: &ReportOptions) -> anyhow::Result<Report> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());
    let me = bot.get_me().await?;

    let window = cfg.window.status(Utc::now());
    log_window_status(&window);

    let sources = check_channel_access(&bot, &cfg.source_channels).await;

    let (destination, destination_error) =
        match check_destination(&bot, me.id, &cfg.destination_channel).await {
            Ok(access) => (Some(access), None),
            Err(e) => {
                error!(destination = %cfg.destination_channel, error = %e, "destination check failed");
                (None, Some(e.to_string()))
            }
        };

    let test_message_sent = if opts.send_test_message {
        match send_test_message(&bot, &cfg.destination_channel).await {
            Ok(()) => Some(true),
            Err(e) => {
                error!(error = %e, "failed to send test message");
                Some(false)
            }
        }
    } else {
        None
    };

    let mut infos = Vec::new();
    for raw in sources.accessible.iter().take(opts.info_limit) {
        let Ok(chan) = ChannelRef::parse(raw) else {
            continue;
        };
        match channel_info(&bot, &chan).await {
            Ok(info) => infos.push(info),
            Err(e) => error!(channel = %chan, error = %e, "failed to fetch channel info"),
        }
    }

    Ok(Report {
        bot_username: me.username().to_string(),
        window,
        sources,
        destination,
        destination_error,
        test_message_sent,
        channel_info: infos,
    })
}
