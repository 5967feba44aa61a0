//! Terminal progress line for downloads.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::common::types::{DownloadProgress, ProgressCallback};
use crate::util::text::format_size;

const REDRAW_INTERVAL: Duration = Duration::from_millis(200);

fn eta_string(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "--:--".to_string();
    }
    let total = seconds as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Build the progress callback that repaints a single `[download]` line,
/// throttled to keep terminal writes cheap.
pub fn progress_renderer(quiet: bool) -> Option<ProgressCallback> {
    if quiet {
        return None;
    }

    let last_draw = Mutex::new(Instant::now() - REDRAW_INTERVAL);
    Some(Arc::new(move |status: &str, p: &DownloadProgress| {
        let now = Instant::now();
        {
            let mut last = last_draw.lock();
            let done = p.total_size_bytes > 0
                && p.total_downloaded_bytes >= p.total_size_bytes;
            if now.duration_since(*last) < REDRAW_INTERVAL && !done {
                return;
            }
            *last = now;
        }

        let mut stderr = std::io::stderr().lock();
        if p.total_size_bytes > 0 {
            let _ = write!(
                stderr,
                "\r[download] {:>5.1}% of {} at {}/s ETA {}  ({status})   ",
                p.percentage,
                format_size(p.total_size_bytes),
                format_size(p.speed_bytes_per_sec as u64),
                eta_string(p.eta_seconds),
            );
        } else {
            let _ = write!(
                stderr,
                "\r[download] {} at {}/s  ({status})   ",
                format_size(p.total_downloaded_bytes),
                format_size(p.speed_bytes_per_sec as u64),
            );
        }
        let _ = stderr.flush();
    }))
}

/// Finish the progress line so following output starts on a fresh row.
pub fn finish_progress_line(quiet: bool) {
    if !quiet {
        eprintln!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eta_formatting() {
        assert_eq!(eta_string(0.0), "--:--");
        assert_eq!(eta_string(65.0), "01:05");
        assert_eq!(eta_string(f64::INFINITY), "--:--");
    }

    #[test]
    fn quiet_mode_has_no_renderer() {
        assert!(progress_renderer(true).is_none());
        assert!(progress_renderer(false).is_some());
    }
}
