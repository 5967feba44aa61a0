//! Format selection: a pure function from an extracted format list and a
//! selector string to a `(video, audio)` pair.
//!
//! Selector grammar (yt-dlp subset): `best`, `bestaudio`, `bestvideo`,
//! `<itag>`, `<itag>+<itag>`.

use crate::youtube::model::{VideoFormat, VideoInfo};

#[derive(Debug, Default, Clone, Copy)]
pub struct SelectedStreams<'a> {
    pub video: Option<&'a VideoFormat>,
    pub audio: Option<&'a VideoFormat>,
}

impl<'a> SelectedStreams<'a> {
    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.audio.is_none()
    }
}

/// Audio codec tiers: opus > vorbis > aac family > the rest.
fn audio_codec_tier(acodec: &str) -> u8 {
    if acodec.starts_with("opus") {
        4
    } else if acodec.starts_with("vorbis") {
        3
    } else if acodec.starts_with("mp4a") || acodec.starts_with("aac") {
        2
    } else {
        0
    }
}

/// Video codec tiers: av01 > vp9 > avc1/h264 > vp8 > the rest.
fn video_codec_tier(vcodec: &str) -> u8 {
    if vcodec.starts_with("av01") {
        4
    } else if vcodec.starts_with("vp9") || vcodec.starts_with("vp09") {
        3
    } else if vcodec.starts_with("avc1") || vcodec.starts_with("h264") {
        2
    } else if vcodec.starts_with("vp8") {
        1
    } else {
        0
    }
}

/// Ranking tuple for audio candidates; lexicographic, higher wins.
fn audio_rank(format: &VideoFormat) -> (i32, i64, u8, i64) {
    (
        format.language_preference,
        format.audio_channels,
        audio_codec_tier(&format.acodec),
        (format.tbr * 1000.0) as i64,
    )
}

/// Ranking tuple for video candidates; lexicographic, higher wins.
fn video_rank(format: &VideoFormat) -> (i64, i64, u8, i64) {
    (
        format.width * format.height,
        format.fps,
        video_codec_tier(&format.vcodec),
        (format.tbr * 1000.0) as i64,
    )
}

fn best_audio<'a>(
    formats: &'a [VideoFormat],
    preferred_language: Option<&str>,
) -> Option<&'a VideoFormat> {
    let candidates = formats.iter().filter(|f| f.is_audio_only());

    let global = candidates.clone().max_by_key(|f| audio_rank(f));

    // An exact language match overrides the global ranking when asked for.
    if let Some(language) = preferred_language {
        let matching = candidates
            .filter(|f| f.language == language)
            .max_by_key(|f| audio_rank(f));
        if matching.is_some() {
            return matching;
        }
    }
    global
}

fn best_video(formats: &[VideoFormat]) -> Option<&VideoFormat> {
    formats
        .iter()
        .filter(|f| f.has_video())
        .max_by_key(|f| video_rank(f))
}

fn by_itag(formats: &[VideoFormat], itag: i64) -> Option<&VideoFormat> {
    formats.iter().find(|f| f.itag == itag)
}

/// Resolve `selector` against the format list. Total for any non-empty
/// list with `best`: at least one slot is filled.
pub fn select_streams<'a>(
    info: &'a VideoInfo,
    selector: &str,
    preferred_language: Option<&str>,
) -> SelectedStreams<'a> {
    let formats = &info.formats;
    let selector = selector.trim();

    match selector {
        "best" | "" => SelectedStreams {
            video: best_video(formats),
            audio: best_audio(formats, preferred_language),
        },
        "bestaudio" => SelectedStreams {
            video: None,
            audio: best_audio(formats, preferred_language),
        },
        "bestvideo" => SelectedStreams {
            video: formats
                .iter()
                .filter(|f| f.is_video_only())
                .max_by_key(|f| video_rank(f))
                .or_else(|| best_video(formats)),
            audio: None,
        },
        _ => select_by_itag(formats, selector),
    }
}

/// `<itag>` or `<itag>+<itag>`; a format that carries video lands in the
/// video slot, audio-only in the audio slot.
fn select_by_itag<'a>(formats: &'a [VideoFormat], selector: &str) -> SelectedStreams<'a> {
    let mut selected = SelectedStreams::default();

    let mut place = |format: Option<&'a VideoFormat>| {
        let Some(format) = format else { return };
        if format.has_video() && selected.video.is_none() {
            selected.video = Some(format);
        } else if selected.audio.is_none() {
            selected.audio = Some(format);
        }
    };

    match selector.split_once('+') {
        Some((first, second)) => {
            place(first.trim().parse().ok().and_then(|i| by_itag(formats, i)));
            place(second.trim().parse().ok().and_then(|i| by_itag(formats, i)));
        }
        None => place(selector.parse().ok().and_then(|i| by_itag(formats, i))),
    }
    selected
}
