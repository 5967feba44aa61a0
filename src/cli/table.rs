//! yt-dlp style format table for `-F`.

use crate::util::text::format_size;
use crate::youtube::model::{VideoFormat, CODEC_NONE};

/// Render the format table: itag-deduplicated, sorted by resolution then
/// total bitrate, ascending.
pub fn render_format_table(formats: &[VideoFormat]) -> String {
    let mut formats: Vec<&VideoFormat> = formats.iter().collect();
    formats.sort_by_key(|f| f.itag);
    formats.dedup_by_key(|f| f.itag);
    formats.sort_by(|a, b| {
        (a.width * a.height, a.tbr as i64).cmp(&(b.width * b.height, b.tbr as i64))
    });

    let mut out = String::new();
    out.push_str(&format!(
        "{:<4} {:<5} {:<11} {:>3} {:>2} | {:<9} {:>6} {:<5} | {:<16} {:<12} {:>4} {:>4} {}\n",
        "ID", "EXT", "RESOLUTION", "FPS", "CH", "FILESIZE", "TBR", "PROTO", "VCODEC", "ACODEC",
        "ABR", "ASR", "MORE INFO"
    ));
    out.push_str(&"-".repeat(110));
    out.push('\n');

    for f in formats {
        let ext = if f.ext.is_empty() { "unk" } else { &f.ext };
        let resolution = if f.has_video() && f.width > 0 {
            format!("{}x{}", f.width, f.height)
        } else {
            "audio only".to_string()
        };
        let fps = if f.fps > 0 { f.fps.to_string() } else { String::new() };
        let channels = if f.audio_channels > 0 {
            f.audio_channels.to_string()
        } else {
            String::new()
        };
        let size = if f.content_length > 0 {
            format_size(f.content_length as u64)
        } else {
            "~".to_string()
        };
        let tbr = if f.tbr > 0.0 {
            format!("{}k", f.tbr as i64)
        } else {
            "N/A".to_string()
        };

        let mut vcodec = f.vcodec.clone();
        if vcodec == CODEC_NONE {
            vcodec = "images".into();
        } else if vcodec.len() > 16 {
            vcodec = format!("{}...", &vcodec[..13]);
        }
        let mut acodec = f.acodec.clone();
        if acodec.len() > 12 {
            acodec = format!("{}...", &acodec[..9]);
        }

        let abr = if f.is_audio_only() && f.tbr > 0.0 {
            format!("{}k", f.tbr as i64)
        } else {
            String::new()
        };
        let asr = if f.audio_sample_rate > 0 {
            format!("{}k", f.audio_sample_rate / 1000)
        } else {
            String::new()
        };

        let mut info = String::new();
        if f.is_video_only() {
            info.push_str("video only");
        } else if f.is_audio_only() {
            info.push_str("audio only");
        }
        if f.height > 0 {
            if !info.is_empty() {
                info.push_str(", ");
            }
            info.push_str(&format!("{}p", f.height));
        }

        out.push_str(&format!(
            "{:<4} {:<5} {:<11} {:>3} {:>2} | {:<9} {:>6} {:<5} | {:<16} {:<12} {:>4} {:>4} {}\n",
            f.itag, ext, resolution, fps, channels, size, tbr, f.protocol, vcodec, acodec, abr,
            asr, info
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_dedups_and_sorts_ascending() {
        let formats = vec![
            VideoFormat {
                itag: 137,
                ext: "mp4".into(),
                vcodec: "avc1.64001F".into(),
                width: 1920,
                height: 1080,
                fps: 30,
                tbr: 4000.0,
                content_length: 50_000_000,
                url: "https://v".into(),
                ..Default::default()
            },
            VideoFormat {
                itag: 137,
                ext: "mp4".into(),
                vcodec: "avc1.64001F".into(),
                width: 1920,
                height: 1080,
                url: "https://v".into(),
                ..Default::default()
            },
            VideoFormat {
                itag: 251,
                ext: "webm".into(),
                acodec: "opus".into(),
                audio_channels: 2,
                audio_sample_rate: 48000,
                tbr: 160.0,
                url: "https://a".into(),
                ..Default::default()
            },
        ];

        let table = render_format_table(&formats);
        let lines: Vec<&str> = table.lines().collect();
        // header + rule + 2 unique formats
        assert_eq!(lines.len(), 4);
        // Audio-only (0 pixels) sorts before the 1080p row.
        assert!(lines[2].starts_with("251"));
        assert!(lines[3].starts_with("137"));
        assert!(lines[2].contains("audio only"));
        assert!(lines[3].contains("1920x1080"));
    }
}
