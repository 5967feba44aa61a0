//! Extraction result types and their JSON projections.

use serde_json::{json, Value};

use crate::util::text::duration_string;

/// Sentinel for "this track carries no such codec".
pub const CODEC_NONE: &str = "none";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LiveStatus {
    #[default]
    NotLive,
    IsLive,
    WasLive,
    PostLive,
}

impl LiveStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LiveStatus::NotLive => "not_live",
            LiveStatus::IsLive => "is_live",
            LiveStatus::WasLive => "was_live",
            LiveStatus::PostLive => "post_live",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Availability {
    #[default]
    Public,
    Unlisted,
    Private,
    NeedsAuth,
}

impl Availability {
    pub fn as_str(self) -> &'static str {
        match self {
            Availability::Public => "public",
            Availability::Unlisted => "unlisted",
            Availability::Private => "private",
            Availability::NeedsAuth => "needs_auth",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Thumbnail {
    pub url: String,
    pub width: i64,
    pub height: i64,
}

/// One playable variant of a video.
#[derive(Debug, Clone)]
pub struct VideoFormat {
    pub itag: i64,
    pub url: String,
    pub mime_type: String,
    pub ext: String,
    pub container: String,
    pub protocol: String,
    pub vcodec: String,
    pub acodec: String,
    pub width: i64,
    pub height: i64,
    pub fps: i64,
    pub audio_sample_rate: i64,
    pub audio_channels: i64,
    /// Bitrates in kbps.
    pub tbr: f64,
    pub abr: f64,
    pub vbr: f64,
    pub content_length: i64,
    pub language: String,
    /// Higher is preferred; -10 descriptive, +10 original, +5 default, -1 none.
    pub language_preference: i32,
    pub format_note: String,
    pub quality_label: String,
}

impl Default for VideoFormat {
    fn default() -> Self {
        Self {
            itag: 0,
            url: String::new(),
            mime_type: String::new(),
            ext: String::new(),
            container: String::new(),
            protocol: "https".into(),
            vcodec: CODEC_NONE.into(),
            acodec: CODEC_NONE.into(),
            width: 0,
            height: 0,
            fps: 0,
            audio_sample_rate: 0,
            audio_channels: 0,
            tbr: 0.0,
            abr: 0.0,
            vbr: 0.0,
            content_length: 0,
            language: String::new(),
            language_preference: -1,
            format_note: String::new(),
            quality_label: String::new(),
        }
    }
}

impl VideoFormat {
    pub fn has_video(&self) -> bool {
        self.vcodec != CODEC_NONE
    }

    pub fn has_audio(&self) -> bool {
        self.acodec != CODEC_NONE
    }

    pub fn is_audio_only(&self) -> bool {
        self.has_audio() && !self.has_video()
    }

    pub fn is_video_only(&self) -> bool {
        self.has_video() && !self.has_audio()
    }

    pub fn to_json(&self) -> Value {
        let mut j = json!({
            "format_id": self.itag.to_string(),
            "url": self.url,
            "ext": self.ext,
            "vcodec": self.vcodec,
            "acodec": self.acodec,
            "fps": self.fps,
            "asr": self.audio_sample_rate,
            "audio_channels": self.audio_channels,
            "tbr": self.tbr,
            "filesize": self.content_length,
            "width": if self.width > 0 { json!(self.width) } else { Value::Null },
            "height": if self.height > 0 { json!(self.height) } else { Value::Null },
        });

        if self.tbr > 0.0 {
            if self.is_audio_only() {
                j["abr"] = json!(self.tbr);
                j["vbr"] = json!(0);
            } else if self.is_video_only() {
                j["vbr"] = json!(self.tbr);
                j["abr"] = json!(0);
            }
        }
        if !self.language.is_empty() {
            j["language"] = json!(self.language);
        }
        j
    }
}

/// One extracted video: human metadata plus the ordered format list.
/// Built by the extraction session and immutable afterwards.
#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub fulltitle: String,
    pub description: String,
    pub uploader: String,
    pub uploader_id: String,
    pub channel: String,
    pub channel_id: String,
    pub channel_url: String,
    pub upload_date: String,
    pub duration: u64,
    pub view_count: i64,
    pub like_count: i64,
    pub webpage_url: String,
    pub thumbnail: String,
    pub thumbnails: Vec<Thumbnail>,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub age_limit: i64,
    pub availability: Availability,
    pub live_status: LiveStatus,
    pub is_live: bool,
    pub was_live: bool,
    pub playable_in_embed: bool,
    pub formats: Vec<VideoFormat>,
    /// Filled in after format selection, for display and templates.
    pub resolution: String,
    pub format_id: String,
    pub extractor: &'static str,
    pub extractor_key: &'static str,
}

impl Default for VideoInfo {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            fulltitle: String::new(),
            description: String::new(),
            uploader: String::new(),
            uploader_id: String::new(),
            channel: String::new(),
            channel_id: String::new(),
            channel_url: String::new(),
            upload_date: String::new(),
            duration: 0,
            view_count: 0,
            like_count: 0,
            webpage_url: String::new(),
            thumbnail: String::new(),
            thumbnails: Vec::new(),
            tags: Vec::new(),
            categories: Vec::new(),
            age_limit: 0,
            availability: Availability::Public,
            live_status: LiveStatus::NotLive,
            is_live: false,
            was_live: false,
            playable_in_embed: true,
            formats: Vec::new(),
            resolution: String::new(),
            format_id: String::new(),
            extractor: "youtube",
            extractor_key: "Youtube",
        }
    }
}

impl VideoInfo {
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "title": self.title,
            "fulltitle": self.fulltitle,
            "description": self.description,
            "uploader": self.uploader,
            "uploader_id": self.uploader_id,
            "channel": self.channel,
            "channel_id": self.channel_id,
            "channel_url": self.channel_url,
            "upload_date": self.upload_date,
            "duration": self.duration,
            "duration_string": duration_string(self.duration),
            "view_count": self.view_count,
            "like_count": self.like_count,
            "webpage_url": self.webpage_url,
            "thumbnail": self.thumbnail,
            "thumbnails": self.thumbnails.iter().map(|t| json!({
                "url": t.url, "width": t.width, "height": t.height,
            })).collect::<Vec<_>>(),
            "tags": self.tags,
            "categories": self.categories,
            "age_limit": self.age_limit,
            "availability": self.availability.as_str(),
            "live_status": self.live_status.as_str(),
            "is_live": self.is_live,
            "was_live": self.was_live,
            "playable_in_embed": self.playable_in_embed,
            "extractor": self.extractor,
            "extractor_key": self.extractor_key,
            "formats": self.formats.iter().map(VideoFormat::to_json).collect::<Vec<_>>(),
        })
    }
}

/// Lightweight search listing entry; no format list.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub video_id: String,
    pub title: String,
    pub channel: String,
    pub duration: u64,
    pub view_count: i64,
    pub thumbnail: String,
    pub live: bool,
}

impl SearchResult {
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.video_id)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.video_id,
            "title": self.title,
            "channel": self.channel,
            "duration": self.duration,
            "view_count": self.view_count,
            "thumbnail": self.thumbnail,
            "url": self.watch_url(),
            "live": self.live,
            "_type": "url",
        })
    }
}

/// Derive `(ext, container)` from a mime type: `audio/mp4` is m4a,
/// `audio/webm` stays webm, anything else uses the subtype.
pub fn ext_from_mime(mime: &str) -> (String, String) {
    let type_part = mime.split(';').next().unwrap_or("").trim();
    let mut parts = type_part.splitn(2, '/');
    let main = parts.next().unwrap_or("");
    let sub = parts.next().unwrap_or("");

    let ext = match (main, sub) {
        ("audio", "mp4") => "m4a".to_string(),
        ("audio", "webm") => "webm".to_string(),
        (_, sub) => sub.to_string(),
    };
    (ext, sub.to_string())
}

/// Split the `codecs="…"` attribute into `(vcodec, acodec)`. Two codecs:
/// video first. One codec: placed by the mime main type, the other slot is
/// the `"none"` sentinel. No attribute: the slot implied by the main type
/// is marked unknown rather than leaving both slots `"none"`.
pub fn codecs_from_mime(mime: &str) -> (String, String) {
    let main_is_audio = mime.trim_start().starts_with("audio");

    let codecs = mime
        .find("codecs=\"")
        .map(|start| {
            let rest = &mime[start + 8..];
            rest.split('"').next().unwrap_or("")
        })
        .unwrap_or("");

    if codecs.is_empty() {
        return if main_is_audio {
            (CODEC_NONE.into(), "unknown".into())
        } else {
            ("unknown".into(), CODEC_NONE.into())
        };
    }

    match codecs.split_once(',') {
        Some((v, a)) => (v.trim().to_string(), a.trim().to_string()),
        None => {
            if main_is_audio {
                (CODEC_NONE.into(), codecs.trim().to_string())
            } else {
                (codecs.trim().to_string(), CODEC_NONE.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_mp4_maps_to_m4a() {
        let (ext, container) = ext_from_mime("audio/mp4; codecs=\"mp4a.40.2\"");
        assert_eq!(ext, "m4a");
        assert_eq!(container, "mp4");
        let (ext, _) = ext_from_mime("audio/webm; codecs=\"opus\"");
        assert_eq!(ext, "webm");
        let (ext, _) = ext_from_mime("video/mp4; codecs=\"avc1.64001F\"");
        assert_eq!(ext, "mp4");
    }

    #[test]
    fn codec_pairs_split_video_first() {
        let (v, a) = codecs_from_mime("video/mp4; codecs=\"avc1.64001F, mp4a.40.2\"");
        assert_eq!(v, "avc1.64001F");
        assert_eq!(a, "mp4a.40.2");
    }

    #[test]
    fn single_audio_codec_sets_vcodec_none() {
        let (v, a) = codecs_from_mime("audio/webm; codecs=\"opus\"");
        assert_eq!(v, CODEC_NONE);
        assert_eq!(a, "opus");
    }

    #[test]
    fn single_video_codec_sets_acodec_none() {
        let (v, a) = codecs_from_mime("video/webm; codecs=\"vp9\"");
        assert_eq!(v, "vp9");
        assert_eq!(a, CODEC_NONE);
    }

    #[test]
    fn never_both_none() {
        let (v, a) = codecs_from_mime("video/mp4");
        assert!(v != CODEC_NONE || a != CODEC_NONE);
        let (v, a) = codecs_from_mime("audio/mp4");
        assert!(v != CODEC_NONE || a != CODEC_NONE);
    }

    #[test]
    fn json_nulls_absent_dimensions() {
        let fmt = VideoFormat {
            itag: 140,
            url: "https://example".into(),
            acodec: "mp4a.40.2".into(),
            tbr: 129.5,
            ..Default::default()
        };
        let j = fmt.to_json();
        assert_eq!(j["format_id"], "140");
        assert!(j["width"].is_null());
        assert!(j["height"].is_null());
        assert_eq!(j["abr"], json!(129.5));
        assert_eq!(j["vbr"], json!(0));
    }

    #[test]
    fn language_preference_defaults_negative() {
        assert_eq!(VideoFormat::default().language_preference, -1);
    }
}
