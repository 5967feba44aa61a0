//! YouTube metadata extraction and media download.
//!
//! The pipeline fans `/youtubei/v1/player` requests out across several
//! masquerading client identities, solves the player script's signature and
//! throttling challenges in an embedded JS sandbox, and reassembles the
//! results into a single [`VideoInfo`] with working format URLs. On top of
//! that sit a format selector, a two-stream download coordinator with an
//! external muxer, and a PCM audio streamer.
//!
//! ```no_run
//! # async fn demo() -> ytdlpp::Result<()> {
//! let extractor = ytdlpp::Extractor::new()?;
//! let info = extractor
//!     .extract("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
//!     .await?;
//!
//! let downloader = ytdlpp::Downloader::new(extractor.http().clone());
//! let options = ytdlpp::DownloadOptions {
//!     selector: "best".into(),
//!     ..Default::default()
//! };
//! let path = downloader.download(&info, &options, None).await?;
//! println!("saved to {}", path.display());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod common;
pub mod download;
pub mod http;
pub mod js;
pub mod media;
pub mod select;
pub mod solver;
pub mod util;
pub mod youtube;

pub use common::types::{DownloadProgress, ProgressCallback};
pub use common::{Error, Result};
pub use download::{DownloadOptions, Downloader};
pub use http::HttpClient;
pub use media::{AudioStream, AudioStreamOptions, AudioStreamer, SampleFormat};
pub use select::{select_streams, SelectedStreams};
pub use youtube::{Extractor, SearchQuery, SearchResult, VideoFormat, VideoInfo};
