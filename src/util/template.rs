//! yt-dlp style `%(field)s` output template expansion.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::util::text::duration_string;
use crate::youtube::model::VideoInfo;

fn field_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"%\((\w+)\)(?:\.(\d+))?s").unwrap())
}

/// Expand the supported `%(field)s` fields of `template` from `info`.
/// An optional precision (`%(title).20s`) truncates the substituted value.
/// Unknown fields expand to `NA`, matching yt-dlp's placeholder behavior.
pub fn expand(template: &str, info: &VideoInfo, ext: &str) -> String {
    field_pattern()
        .replace_all(template, |caps: &Captures<'_>| {
            let value = field_value(&caps[1], info, ext);
            match caps.get(2).and_then(|m| m.as_str().parse::<usize>().ok()) {
                Some(limit) => value.chars().take(limit).collect(),
                None => value,
            }
        })
        .into_owned()
}

fn field_value(field: &str, info: &VideoInfo, ext: &str) -> String {
    match field {
        "id" => info.id.clone(),
        "title" => info.title.clone(),
        "fulltitle" => info.fulltitle.clone(),
        "ext" => ext.to_string(),
        "uploader" => info.uploader.clone(),
        "channel" => info.channel.clone(),
        "channel_id" => info.channel_id.clone(),
        "upload_date" => info.upload_date.clone(),
        "description" => info.description.clone(),
        "duration" => info.duration.to_string(),
        "duration_string" => duration_string(info.duration),
        "view_count" => info.view_count.to_string(),
        "resolution" => info.resolution.clone(),
        "format_id" => info.format_id.clone(),
        "extractor" => info.extractor.to_string(),
        "extractor_key" => info.extractor_key.to_string(),
        _ => "NA".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::youtube::model::VideoInfo;

    fn info() -> VideoInfo {
        VideoInfo {
            id: "dQw4w9WgXcQ".into(),
            title: "Never Gonna Give You Up".into(),
            uploader: "Rick Astley".into(),
            duration: 213,
            view_count: 1_000_000,
            ..Default::default()
        }
    }

    #[test]
    fn expands_basic_fields() {
        let out = expand("%(title)s [%(id)s].%(ext)s", &info(), "mp4");
        assert_eq!(out, "Never Gonna Give You Up [dQw4w9WgXcQ].mp4");
    }

    #[test]
    fn precision_truncates() {
        let out = expand("%(title).5s", &info(), "mp4");
        assert_eq!(out, "Never");
    }

    #[test]
    fn duration_and_counts() {
        let out = expand("%(duration_string)s %(view_count)s", &info(), "");
        assert_eq!(out, "3:33 1000000");
    }

    #[test]
    fn unknown_field_is_na() {
        assert_eq!(expand("%(bogus)s", &info(), ""), "NA");
    }
}
