//! Two-stream download coordination: parallel ranged downloads, aggregate
//! progress, and the merge step.

use std::path::{Path, PathBuf};
use std::time::Instant;

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

use crate::common::types::{DownloadProgress, ProgressCallback};
use crate::common::{Error, Result};
use crate::http::HttpClient;
use crate::media::muxer;
use crate::select::{select_streams, SelectedStreams};
use crate::util::template;
use crate::util::text::sanitize_filename;
use crate::youtube::model::{VideoFormat, VideoInfo};

#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    pub selector: String,
    pub merge_format: Option<String>,
    pub output_template: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub preferred_language: Option<String>,
}

pub struct Downloader {
    http: HttpClient,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Track {
    Video,
    Audio,
}

impl Track {
    fn status(self) -> &'static str {
        match self {
            Track::Video => "downloading video",
            Track::Audio => "downloading audio",
        }
    }
}

#[derive(Default)]
struct AggregateState {
    video_now: u64,
    video_total: u64,
    audio_now: u64,
    audio_total: u64,
    started: Option<Instant>,
}

/// Sums per-stream byte counts into one percentage/throughput/ETA view.
struct Aggregate {
    state: Mutex<AggregateState>,
    callback: Option<ProgressCallback>,
}

impl Aggregate {
    fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            state: Mutex::new(AggregateState::default()),
            callback,
        }
    }

    fn update(&self, track: Track, now: u64, total: u64) {
        let progress = {
            let mut state = self.state.lock();
            let started = *state.started.get_or_insert_with(Instant::now);
            match track {
                Track::Video => {
                    state.video_now = now;
                    state.video_total = total;
                }
                Track::Audio => {
                    state.audio_now = now;
                    state.audio_total = total;
                }
            }

            let downloaded = state.video_now + state.audio_now;
            let total = state.video_total + state.audio_total;
            let elapsed = started.elapsed().as_secs_f64();
            let speed = if elapsed > 0.0 {
                downloaded as f64 / elapsed
            } else {
                0.0
            };
            let remaining = total.saturating_sub(downloaded);
            DownloadProgress {
                total_downloaded_bytes: downloaded,
                total_size_bytes: total,
                percentage: if total > 0 {
                    downloaded as f64 * 100.0 / total as f64
                } else {
                    0.0
                },
                speed_bytes_per_sec: speed,
                eta_seconds: if speed > 0.0 {
                    remaining as f64 / speed
                } else {
                    0.0
                },
            }
        };

        if let Some(callback) = &self.callback {
            callback(track.status(), &progress);
        }
    }
}

impl Downloader {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Select streams per `options.selector`, download them in parallel and
    /// merge when both are present. Returns the final artifact path.
    pub async fn download(
        &self,
        info: &VideoInfo,
        options: &DownloadOptions,
        progress: Option<ProgressCallback>,
    ) -> Result<PathBuf> {
        let streams = select_streams(
            info,
            &options.selector,
            options.preferred_language.as_deref(),
        );
        if streams.is_empty() {
            return Err(Error::ExtractionFailed(format!(
                "no suitable streams for selector: {}",
                options.selector
            )));
        }

        let base = self.base_path(info, options, &streams);
        let final_ext = final_extension(&streams, options.merge_format.as_deref());
        let final_path = base.with_extension(&final_ext);

        let aggregate = Arc::new(Aggregate::new(progress));

        let video_path = streams.video.map(|f| part_path(&base, f));
        let audio_path = streams.audio.map(|f| part_path(&base, f));

        let video_task = self.maybe_download(streams.video, video_path.clone(), Track::Video, &aggregate);
        let audio_task = self.maybe_download(streams.audio, audio_path.clone(), Track::Audio, &aggregate);

        // Both completions are always collected; a failed track never
        // leaves the other mid-flight with a dangling handle.
        let (video_result, audio_result) = tokio::join!(video_task, audio_task);
        video_result?;
        audio_result?;

        match (video_path, audio_path) {
            (Some(video), Some(audio)) => {
                muxer::merge(&video, &audio, &final_path).await?;
                let _ = tokio::fs::remove_file(&video).await;
                let _ = tokio::fs::remove_file(&audio).await;
                info!("[download] Merged into {}", final_path.display());
                Ok(final_path)
            }
            (Some(single), None) | (None, Some(single)) => {
                if single != final_path {
                    tokio::fs::rename(&single, &final_path)
                        .await
                        .map_err(|e| Error::FileWrite {
                            path: final_path.clone(),
                            source: e,
                        })?;
                }
                info!("[download] Downloaded {}", final_path.display());
                Ok(final_path)
            }
            (None, None) => unreachable!("selection verified non-empty above"),
        }
    }

    async fn maybe_download(
        &self,
        format: Option<&VideoFormat>,
        path: Option<PathBuf>,
        track: Track,
        aggregate: &Arc<Aggregate>,
    ) -> Result<()> {
        let (Some(format), Some(path)) = (format, path) else {
            return Ok(());
        };

        info!(
            "[download] Destination: {} (itag {})",
            path.display(),
            format.itag
        );
        let aggregate = aggregate.clone();
        self.http
            .download_file(&format.url, &path, move |now, total| {
                aggregate.update(track, now, total);
            })
            .await
            .map_err(|e| {
                warn!("[download] {} failed: {e}", track.status());
                e
            })
    }

    /// `<dir>/<expanded template or "title [id]">`, extensionless.
    fn base_path(
        &self,
        info: &VideoInfo,
        options: &DownloadOptions,
        streams: &SelectedStreams<'_>,
    ) -> PathBuf {
        let dir = options.output_dir.clone().unwrap_or_default();

        if let Some(tpl) = &options.output_template {
            let ext = streams
                .video
                .or(streams.audio)
                .map(|f| f.ext.as_str())
                .unwrap_or("");
            let expanded = template::expand(tpl, info, ext);
            // The template names the full file; strip a trailing extension
            // so the part/merge naming stays uniform.
            let expanded = expanded
                .strip_suffix(&format!(".{ext}"))
                .unwrap_or(&expanded)
                .to_string();
            return dir.join(sanitize_filename(&expanded));
        }

        let title = sanitize_filename(&info.title);
        dir.join(format!("{title} [{}]", info.id))
    }
}

/// Intermediate stream files: `<base>.f<itag>.<ext>`.
fn part_path(base: &Path, format: &VideoFormat) -> PathBuf {
    let name = format!(
        "{}.f{}.{}",
        base.file_name().and_then(|n| n.to_str()).unwrap_or("video"),
        format.itag,
        format.ext
    );
    base.with_file_name(name)
}

/// Target container: explicit merge format wins; otherwise mp4 when the
/// pair is mp4/m4a, webm when both sides are webm, else mkv. Single
/// streams keep their own extension.
fn final_extension(streams: &SelectedStreams<'_>, merge_format: Option<&str>) -> String {
    if let Some(ext) = merge_format {
        if !ext.is_empty() {
            return ext.to_string();
        }
    }

    match (streams.video, streams.audio) {
        (Some(video), Some(audio)) => {
            if video.ext == "mp4" && (audio.ext == "m4a" || audio.ext == "mp4") {
                "mp4".to_string()
            } else if video.ext == "webm" && audio.ext == "webm" {
                "webm".to_string()
            } else {
                "mkv".to_string()
            }
        }
        (Some(video), None) => video.ext.clone(),
        (None, Some(audio)) => audio.ext.clone(),
        (None, None) => "mkv".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::youtube::model::VideoFormat;

    fn fmt(itag: i64, ext: &str, vcodec: &str, acodec: &str) -> VideoFormat {
        VideoFormat {
            itag,
            ext: ext.into(),
            vcodec: vcodec.into(),
            acodec: acodec.into(),
            url: "https://example".into(),
            ..Default::default()
        }
    }

    #[test]
    fn merge_extension_defaulting() {
        let v_mp4 = fmt(137, "mp4", "avc1", "none");
        let a_m4a = fmt(140, "m4a", "none", "mp4a");
        let v_webm = fmt(248, "webm", "vp9", "none");
        let a_webm = fmt(251, "webm", "none", "opus");

        let mp4_pair = SelectedStreams {
            video: Some(&v_mp4),
            audio: Some(&a_m4a),
        };
        assert_eq!(final_extension(&mp4_pair, None), "mp4");

        let webm_pair = SelectedStreams {
            video: Some(&v_webm),
            audio: Some(&a_webm),
        };
        assert_eq!(final_extension(&webm_pair, None), "webm");

        let mixed = SelectedStreams {
            video: Some(&v_webm),
            audio: Some(&a_m4a),
        };
        assert_eq!(final_extension(&mixed, None), "mkv");
        assert_eq!(final_extension(&mixed, Some("mp4")), "mp4");

        let solo = SelectedStreams {
            video: None,
            audio: Some(&a_webm),
        };
        assert_eq!(final_extension(&solo, None), "webm");
    }

    #[test]
    fn part_paths_carry_itag_and_ext() {
        let format = fmt(251, "webm", "none", "opus");
        let path = part_path(Path::new("dir/My Title [abc]"), &format);
        assert_eq!(path, Path::new("dir/My Title [abc].f251.webm"));
    }

    #[test]
    fn aggregate_progress_math() {
        let seen: Arc<Mutex<Vec<(String, u64, u64, f64)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(move |status, p: &DownloadProgress| {
            sink.lock().push((
                status.to_string(),
                p.total_downloaded_bytes,
                p.total_size_bytes,
                p.percentage,
            ));
        });

        let aggregate = Aggregate::new(Some(callback));
        aggregate.update(Track::Video, 50, 100);
        aggregate.update(Track::Audio, 25, 100);

        let seen = seen.lock();
        assert_eq!(seen[0], ("downloading video".into(), 50, 100, 50.0));
        assert_eq!(seen[1].0, "downloading audio");
        assert_eq!(seen[1].1, 75);
        assert_eq!(seen[1].2, 200);
        assert_eq!(seen[1].3, 37.5);
    }
}
