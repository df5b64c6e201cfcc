//! Media classification, validation and download retry.

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{errors::Error, ports::MediaSource, Result};

pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024; // 50 MiB

const PHOTO_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp"];
const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".avi", ".mov", ".mkv"];

static DOWNLOAD_COUNTER: AtomicUsize = AtomicUsize::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    Unknown,
}

/// Lowercased extension including the dot, or an empty string.
pub fn file_extension(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.rfind('.') {
        Some(idx) if idx > 0 => base[idx..].to_lowercase(),
        _ => String::new(),
    }
}

pub fn media_kind(name: &str) -> MediaKind {
    let ext = file_extension(name);
    if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Photo
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Video
    } else {
        MediaKind::Unknown
    }
}

pub fn is_supported_format(name: &str) -> bool {
    media_kind(name) != MediaKind::Unknown
}

/// Reject (and delete) a downloaded file that is too large or of an unsupported format.
pub fn validate_file(path: &Path, size: u64, max_size: u64) -> Result<()> {
    let reason = if size > max_size {
        Some(format!("file too large: {size} bytes (limit {max_size})"))
    } else if !is_supported_format(&path.to_string_lossy()) {
        Some(format!("unsupported file format: {}", path.display()))
    } else {
        None
    };

    let Some(reason) = reason else {
        return Ok(());
    };

    warn!(path = %path.display(), %reason, "rejecting downloaded media");
    cleanup_temp_files(&[path]);
    Err(Error::MediaRejected(reason))
}

pub fn format_file_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "0B".to_string();
    }

    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size_bytes as f64;
    let mut i = 0;
    while size >= 1024.0 && i < UNITS.len() - 1 {
        size /= 1024.0;
        i += 1;
    }
    format!("{:.1}{}", size, UNITS[i])
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub size: u64,
    pub size_formatted: String,
    pub extension: String,
    pub kind: MediaKind,
    pub supported: bool,
}

pub fn media_info(path: &Path) -> Option<MediaInfo> {
    let md = match std::fs::metadata(path) {
        Ok(md) => md,
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to read media info");
            return None;
        }
    };

    let name = path.to_string_lossy();
    Some(MediaInfo {
        path: path.to_path_buf(),
        size: md.len(),
        size_formatted: format_file_size(md.len()),
        extension: file_extension(&name),
        kind: media_kind(&name),
        supported: is_supported_format(&name),
    })
}

/// Best-effort removal; missing files are ignored.
pub fn cleanup_temp_files(paths: &[&Path]) {
    for path in paths {
        if !path.exists() {
            continue;
        }
        match std::fs::remove_file(path) {
            Ok(()) => info!(path = %path.display(), "removed temp file"),
            Err(e) => error!(path = %path.display(), error = %e, "failed to remove temp file"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt `attempt` (zero-based): `base * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}

fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        "media".to_string()
    } else {
        out
    }
}

fn uniquify_filename(name: &str, ts: u128, n: usize) -> String {
    let base = sanitize_filename(name);
    if let Some((stem, ext)) = base.rsplit_once('.') {
        if !stem.is_empty() && !ext.is_empty() {
            return format!("{stem}_{ts}_{n}.{ext}");
        }
    }
    format!("{base}_{ts}_{n}")
}

fn temp_path(temp_dir: &Path, hint: &str) -> PathBuf {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let n = DOWNLOAD_COUNTER.fetch_add(1, Ordering::SeqCst);
    temp_dir.join(uniquify_filename(hint, ts, n))
}

/// Download `source` into `temp_dir`, retrying transient failures with exponential backoff.
///
/// Oversized or unsupported files are rejected at once; retrying would not change them.
pub async fn download_with_retry(
    source: &dyn MediaSource,
    temp_dir: &Path,
    policy: RetryPolicy,
    max_size: u64,
) -> Result<PathBuf> {
    let hint = source.file_name_hint();
    let mut last_error = "no download attempts were made".to_string();

    for attempt in 0..policy.max_attempts {
        let path = temp_path(temp_dir, &hint);

        match source.download_to(&path).await {
            Ok(()) => match tokio::fs::metadata(&path).await {
                Ok(md) => {
                    validate_file(&path, md.len(), max_size)?;
                    info!(
                        path = %path.display(),
                        size = md.len(),
                        "media downloaded"
                    );
                    return Ok(path);
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "download produced no file");
                    last_error = format!("no file after download: {e}");
                }
            },
            Err(e) => {
                warn!(attempt = attempt + 1, error = %e, "download attempt failed");
                last_error = e.to_string();
                cleanup_temp_files(&[&path]);
            }
        }

        if attempt + 1 < policy.max_attempts {
            let delay = policy.delay_for(attempt);
            info!(delay_ms = delay.as_millis() as u64, "waiting before next download attempt");
            sleep(delay).await;
        }
    }

    error!(attempts = policy.max_attempts, "failed to download media after all attempts");
    Err(Error::DownloadFailed {
        attempts: policy.max_attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn tmp_dir(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_nanos();
        let pid = std::process::id();
        let dir = PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Fails the first `failures` downloads, then writes `bytes`.
    struct FlakySource {
        hint: &'static str,
        failures: Mutex<u32>,
        bytes: Vec<u8>,
        calls: Mutex<Vec<Instant>>,
    }

    impl FlakySource {
        fn new(hint: &'static str, failures: u32, bytes: Vec<u8>) -> Self {
            Self {
                hint,
                failures: Mutex::new(failures),
                bytes,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MediaSource for FlakySource {
        fn file_name_hint(&self) -> String {
            self.hint.to_string()
        }

        async fn download_to(&self, dest: &Path) -> Result<()> {
            self.calls.lock().unwrap().push(Instant::now());
            {
                let mut left = self.failures.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    // Leave a partial file behind, like an interrupted transfer.
                    std::fs::write(dest, b"partial")?;
                    return Err(Error::External("connection reset".to_string()));
                }
            }
            std::fs::write(dest, &self.bytes)?;
            Ok(())
        }
    }

    fn dir_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn classifies_by_extension() {
        assert_eq!(file_extension("/tmp/a/Photo.JPG"), ".jpg");
        assert_eq!(file_extension("archive.tar.gz"), ".gz");
        assert_eq!(file_extension(".hidden"), "");
        assert_eq!(file_extension("noext"), "");

        assert_eq!(media_kind("x.webp"), MediaKind::Photo);
        assert_eq!(media_kind("clip.MKV"), MediaKind::Video);
        assert_eq!(media_kind("doc.pdf"), MediaKind::Unknown);
        assert!(is_supported_format("a.png"));
        assert!(!is_supported_format("a.exe"));
    }

    #[test]
    fn formats_sizes() {
        assert_eq!(format_file_size(0), "0B");
        assert_eq!(format_file_size(512), "512.0B");
        assert_eq!(format_file_size(1536), "1.5KB");
        assert_eq!(format_file_size(50 * 1024 * 1024), "50.0MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024 * 1024), "3072.0GB");
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
        };
        assert_eq!(p.delay_for(0), Duration::from_millis(250));
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(2), Duration::from_secs(1));
    }

    #[test]
    fn validate_rejects_and_deletes() {
        let dir = tmp_dir("relay-validate");

        let big = dir.join("big.jpg");
        std::fs::write(&big, b"0123456789").unwrap();
        let err = validate_file(&big, 10, 9).unwrap_err();
        assert!(matches!(err, Error::MediaRejected(_)));
        assert!(!big.exists());

        let exe = dir.join("tool.exe");
        std::fs::write(&exe, b"x").unwrap();
        assert!(validate_file(&exe, 1, MAX_FILE_SIZE).is_err());
        assert!(!exe.exists());

        let ok = dir.join("fine.png");
        std::fs::write(&ok, b"x").unwrap();
        assert!(validate_file(&ok, 1, MAX_FILE_SIZE).is_ok());
        assert!(ok.exists());

        let info = media_info(&ok).unwrap();
        assert_eq!(info.size, 1);
        assert_eq!(info.extension, ".png");
        assert_eq!(info.kind, MediaKind::Photo);
        assert!(info.supported);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_exponential_backoff() {
        let dir = tmp_dir("relay-retry");
        let source = FlakySource::new("photo.jpg", 2, b"jpeg".to_vec());
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        };

        let path = download_with_retry(&source, &dir, policy, MAX_FILE_SIZE)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"jpeg");
        assert!(path.to_string_lossy().ends_with(".jpg"));

        let calls = source.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[1] - calls[0] >= Duration::from_secs(1));
        assert!(calls[2] - calls[1] >= Duration::from_secs(2));

        // Partial files from failed attempts are gone.
        assert_eq!(dir_entries(&dir), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let dir = tmp_dir("relay-giveup");
        let source = FlakySource::new("photo.jpg", 10, b"jpeg".to_vec());
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        };

        let err = download_with_retry(&source, &dir, policy, MAX_FILE_SIZE)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DownloadFailed { attempts: 3, .. }));
        assert_eq!(source.calls().len(), 3);
        assert_eq!(dir_entries(&dir), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_download_is_not_retried() {
        let dir = tmp_dir("relay-oversize");
        let source = FlakySource::new("photo.jpg", 0, vec![0u8; 64]);
        let policy = RetryPolicy::default();

        let err = download_with_retry(&source, &dir, policy, 32)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MediaRejected(_)));
        assert_eq!(source.calls().len(), 1);
        assert_eq!(dir_entries(&dir), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_format_is_rejected() {
        let dir = tmp_dir("relay-format");
        let source = FlakySource::new("notes.txt", 0, b"hello".to_vec());

        let err = download_with_retry(&source, &dir, RetryPolicy::default(), MAX_FILE_SIZE)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MediaRejected(_)));
        assert_eq!(dir_entries(&dir), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
