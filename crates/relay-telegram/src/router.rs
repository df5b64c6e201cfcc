use std::sync::Arc;

use chrono::Utc;
use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::{debug, error, info, warn};

use relay_core::{
    config::Config,
    domain::SourceFilter,
    ports::RelayPort,
    relay::{Relay, RelaySettings},
    throttled::{ThrottleConfig, ThrottledPort},
};

use crate::{
    diagnostics::{check_bot_permissions, log_window_status},
    handlers, TelegramGateway,
};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub relay: Arc<Relay>,
    pub sources: SourceFilter,
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let me = bot.get_me().await?;
    info!(username = %me.username(), "telegram client started");

    if !check_bot_permissions(&bot, me.id, &cfg.destination_channel).await {
        if cfg.require_admin {
            error!(
                destination = %cfg.destination_channel,
                "bot lacks the required permissions in the destination channel"
            );
            return Err(anyhow::anyhow!(
                "bot lacks the required permissions in {}",
                cfg.destination_channel
            ));
        }
        warn!("REQUIRE_ADMIN is off; continuing without verified permissions");
    }

    info!(sources = cfg.source_channels.len(), "monitoring started");
    for source in &cfg.source_channels {
        debug!(source = %source, "monitoring source");
    }
    log_window_status(&cfg.window.status(Utc::now()));
    info!(destination = %cfg.destination_channel, "destination channel");

    // Keep the 429 RetryAfter retry at the gateway; the throttle keeps us from hitting it often.
    let gateway: Arc<dyn RelayPort> = Arc::new(TelegramGateway::new(bot.clone()));
    let port: Arc<dyn RelayPort> =
        Arc::new(ThrottledPort::new(gateway, ThrottleConfig::default()));
    let relay = Arc::new(Relay::new(RelaySettings::from_config(&cfg), port));

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        relay,
        sources: SourceFilter::new(cfg.source_channels.clone()),
    });

    let handler = dptree::entry()
        .branch(Update::filter_channel_post().endpoint(handlers::handle_post))
        .branch(Update::filter_message().endpoint(handlers::handle_post));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            debug!(update_id = upd.id, "ignoring unhandled update");
        })
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("relay stopped");
    Ok(())
}
