/// Convenience alias for internal plumbing that crosses crate boundaries
/// (reqwest, symphonia, rquickjs) before being mapped to [`crate::Error`].
pub type AnyError = Box<dyn std::error::Error + Send + Sync>;
pub type AnyResult<T> = std::result::Result<T, AnyError>;

/// Aggregate transfer state handed to progress callbacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadProgress {
    pub total_downloaded_bytes: u64,
    /// Zero when the total size is unknown.
    pub total_size_bytes: u64,
    pub percentage: f64,
    pub speed_bytes_per_sec: f64,
    pub eta_seconds: f64,
}

/// Called with a status label ("downloading video", "downloading audio")
/// and the aggregate progress across both streams.
pub type ProgressCallback = std::sync::Arc<dyn Fn(&str, &DownloadProgress) + Send + Sync>;
