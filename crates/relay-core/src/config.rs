use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, Utc};

use crate::{
    dedup::DEFAULT_CAPACITY,
    domain::ChannelRef,
    errors::Error,
    media::{RetryPolicy, MAX_FILE_SIZE},
    window::MonitoringWindow,
    Result,
};

/// Typed configuration for the relay.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub source_channels: Vec<ChannelRef>,
    pub destination_channel: ChannelRef,
    pub window: MonitoringWindow,

    // Deduplication
    pub dedup_capacity: usize,

    // Media
    pub download_retry: RetryPolicy,
    pub max_file_size: u64,
    pub caption_limit: usize,
    pub temp_dir: PathBuf,

    // Startup
    pub require_admin: bool,

    // Logging
    pub log_file: Option<PathBuf>,
}

type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

impl Config {
    /// Load from the process environment, after applying `.env` if present.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        let cfg = Self::from_lookup(&|key: &str| env::var(key).ok())?;

        fs::create_dir_all(&cfg.temp_dir)?;
        Ok(cfg)
    }

    /// Build from an arbitrary variable source. Does not touch the filesystem.
    pub fn from_lookup(get: Lookup<'_>) -> Result<Self> {
        // Required env vars
        let telegram_bot_token = var_str(get, "TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;

        let source_channels = parse_channels(var_str(get, "SOURCE_CHANNELS"))?;
        if source_channels.is_empty() {
            return Err(Error::Config(
                "SOURCE_CHANNELS environment variable is required".to_string(),
            ));
        }

        let destination_channel = var_str(get, "DESTINATION_CHANNEL")
            .ok_or_else(|| {
                Error::Config("DESTINATION_CHANNEL environment variable is required".to_string())
            })
            .and_then(|raw| {
                ChannelRef::parse(&raw)
                    .map_err(|e| Error::Config(format!("DESTINATION_CHANNEL: {e}")))
            })?;

        if source_channels.contains(&destination_channel) {
            return Err(Error::Config(format!(
                "destination {destination_channel} is also listed as a source"
            )));
        }

        // Monitoring window
        let start = var_datetime(get, "MONITOR_START")?;
        let end = var_datetime(get, "MONITOR_END")?;
        let window = MonitoringWindow::new(start, end)?;

        // Deduplication
        let dedup_capacity = var_usize(get, "DEDUP_CAPACITY")?.unwrap_or(DEFAULT_CAPACITY);
        if dedup_capacity == 0 {
            return Err(Error::Config("DEDUP_CAPACITY must be positive".to_string()));
        }

        // Media
        let max_attempts = var_u32(get, "DOWNLOAD_MAX_RETRIES")?.unwrap_or(3).max(1);
        let base_delay =
            Duration::from_millis(var_u64(get, "DOWNLOAD_RETRY_BASE_MS")?.unwrap_or(1000));
        let max_file_size = var_u64(get, "MAX_FILE_SIZE")?.unwrap_or(MAX_FILE_SIZE);
        let caption_limit = var_usize(get, "CAPTION_LIMIT")?.unwrap_or(1024).max(4);
        let temp_dir = PathBuf::from(
            var_str(get, "TEMP_DIR").unwrap_or_else(|| "/tmp/channel-relay".to_string()),
        );

        let require_admin = var_bool(get, "REQUIRE_ADMIN")?.unwrap_or(true);
        let log_file = var_str(get, "LOG_FILE").map(PathBuf::from);

        Ok(Self {
            telegram_bot_token,
            source_channels,
            destination_channel,
            window,
            dedup_capacity,
            download_retry: RetryPolicy {
                max_attempts,
                base_delay,
            },
            max_file_size,
            caption_limit,
            temp_dir,
            require_admin,
            log_file,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim().trim_start_matches("export ").trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn var_str(get: Lookup<'_>, key: &str) -> Option<String> {
    get(key).and_then(non_empty)
}

fn var_bool(get: Lookup<'_>, key: &str) -> Result<Option<bool>> {
    var_parse_with(get, key, |s| match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    })
}

fn var_parse<T: std::str::FromStr>(get: Lookup<'_>, key: &str) -> Result<Option<T>> {
    var_parse_with(get, key, |s| s.parse::<T>().ok())
}

fn var_parse_with<T>(
    get: Lookup<'_>,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>> {
    let Some(raw) = var_str(get, key) else {
        return Ok(None);
    };
    parse(raw.trim())
        .map(Some)
        .ok_or_else(|| Error::Config(format!("{key} has an invalid value: {raw}")))
}

fn var_u64(get: Lookup<'_>, key: &str) -> Result<Option<u64>> {
    var_parse(get, key)
}

fn var_u32(get: Lookup<'_>, key: &str) -> Result<Option<u32>> {
    var_parse(get, key)
}

fn var_usize(get: Lookup<'_>, key: &str) -> Result<Option<usize>> {
    var_parse(get, key)
}

fn var_datetime(get: Lookup<'_>, key: &str) -> Result<DateTime<Utc>> {
    let raw = var_str(get, key)
        .ok_or_else(|| Error::Config(format!("{key} environment variable is required")))?;
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Config(format!("{key} is not an RFC 3339 timestamp ({raw}): {e}")))
}

fn parse_channels(v: Option<String>) -> Result<Vec<ChannelRef>> {
    let mut out: Vec<ChannelRef> = Vec::new();
    for raw in v.unwrap_or_default().split(',') {
        if raw.trim().is_empty() {
            continue;
        }
        let chan = ChannelRef::parse(raw)
            .map_err(|e| Error::Config(format!("SOURCE_CHANNELS: {e}")))?;
        if !out.contains(&chan) {
            out.push(chan);
        }
    }
    Ok(out)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
