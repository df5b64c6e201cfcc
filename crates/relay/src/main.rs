use std::sync::Arc;

use relay_core::config::Config;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), relay_core::Error> {
    let cfg = Arc::new(Config::load()?);
    relay_core::logging::init("relay", cfg.log_file.as_deref())?;

    info!(
        sources = cfg.source_channels.len(),
        destination = %cfg.destination_channel,
        "starting channel relay"
    );

    relay_telegram::router::run_polling(cfg)
        .await
        .map_err(|e| relay_core::Error::External(format!("telegram relay failed: {e}")))?;

    info!("relay shut down");
    Ok(())
}
