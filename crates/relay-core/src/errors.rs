/// Core error type for the relay.
///
/// Adapter crates map their specific errors into this type so the relay
/// pipeline can log failures consistently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid channel reference: {0}")]
    InvalidChannel(String),

    #[error("media rejected: {0}")]
    MediaRejected(String),

    #[error("download failed after {attempts} attempts: {last_error}")]
    DownloadFailed { attempts: u32, last_error: String },

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
