//! Thin wrapper over the external muxer.
//!
//! Merges one video-only and one audio-only file into a single container,
//! copying codec parameters; the container library rebases timestamps. The
//! MP4 family additionally gets the faststart flag so the moov atom lands
//! up front.

use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use crate::common::{Error, Result};

fn is_mp4_family(ext: &str) -> bool {
    matches!(ext, "mp4" | "m4a" | "m4v" | "mov")
}

/// Mux `video_path` + `audio_path` into `output_path` with stream copy.
pub async fn merge(video_path: &Path, audio_path: &Path, output_path: &Path) -> Result<()> {
    info!("[Merger] Merging formats into \"{}\"", output_path.display());

    let ext = output_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let mut command = Command::new("ffmpeg");
    command
        .arg("-y")
        .arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-i")
        .arg(video_path)
        .arg("-i")
        .arg(audio_path)
        .arg("-c")
        .arg("copy")
        .arg("-map")
        .arg("0:v:0")
        .arg("-map")
        .arg("1:a:0");
    if is_mp4_family(&ext) {
        command.arg("-movflags").arg("+faststart");
    }
    command.arg(output_path);

    debug!("running muxer: {command:?}");
    let output = command
        .output()
        .await
        .map_err(|e| Error::MuxerError(format!("could not run ffmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr
            .lines()
            .rev()
            .take(5)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("\n");
        return Err(Error::MuxerError(format!(
            "ffmpeg exited with {}: {tail}",
            output.status
        )));
    }
    Ok(())
}
