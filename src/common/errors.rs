use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Library error taxonomy. Variant names follow the stable error kinds the
/// CLI reports; transport details are preserved as sources where available.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("unexpected HTTP status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("failed to parse JSON response: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("video not found or unplayable: {0}")]
    VideoNotFound(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("signature decipher failed: {0}")]
    DecipherFailed(String),

    #[error("n-parameter transform failed: {0}")]
    NParamFailed(String),

    #[error("could not open {path}: {source}")]
    FileOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not write {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid number format: {0}")]
    InvalidNumberFormat(String),

    #[error("muxer failed: {0}")]
    MuxerError(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Unknown(String),
}

impl Error {
    /// Stable identifier used in diagnostics and by the CLI exit path.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::RequestFailed(_) => "request_failed",
            Error::HttpStatus { .. } => "http_error",
            Error::JsonParse(_) => "json_parse_error",
            Error::InvalidUrl(_) => "invalid_url",
            Error::VideoNotFound(_) => "video_not_found",
            Error::ExtractionFailed(_) => "extraction_failed",
            Error::DecipherFailed(_) => "decipher_failed",
            Error::NParamFailed(_) => "n_param_failed",
            Error::FileOpen { .. } => "file_open_failed",
            Error::FileWrite { .. } => "file_write_failed",
            Error::InvalidNumberFormat(_) => "invalid_number_format",
            Error::MuxerError(_) => "muxer_error",
            Error::Cancelled => "operation_canceled",
            Error::Unknown(_) => "unknown",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_status() {
            Error::HttpStatus {
                status: err.status().map(|s| s.as_u16()).unwrap_or(0),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            Error::RequestFailed(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(Error::RequestFailed("x".into()).kind(), "request_failed");
        assert_eq!(
            Error::HttpStatus {
                status: 403,
                url: "https://example.com".into()
            }
            .kind(),
            "http_error"
        );
        assert_eq!(Error::Cancelled.kind(), "operation_canceled");
    }
}
