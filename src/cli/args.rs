use std::path::PathBuf;

use clap::Parser;

/// yt-dlp style YouTube extractor and downloader.
#[derive(Debug, Parser)]
#[command(name = "ytdlpp", version, about)]
pub struct Args {
    /// Video URL, bare video id, or a ytsearch[N|all|date|Ndate]:QUERY
    /// pseudo-URL.
    pub url: Option<String>,

    /// Format selector: best, bestaudio, bestvideo, ITAG or ITAG+ITAG.
    #[arg(short = 'f', long = "format", default_value = "best")]
    pub format: String,

    /// List available formats and exit.
    #[arg(short = 'F', long = "list-formats")]
    pub list_formats: bool,

    /// Print a JSON description of the video (array for searches) and exit.
    #[arg(short = 'j', long = "dump-json")]
    pub dump_json: bool,

    /// Print the selected media URL(s) only.
    #[arg(short = 'g', long = "get-url")]
    pub get_url: bool,

    /// Output filename template (%(title)s, %(id)s, %(ext)s, ...).
    #[arg(short = 'o', long = "output")]
    pub output: Option<String>,

    /// Directory to save files into.
    #[arg(short = 'P', long = "paths")]
    pub paths: Option<PathBuf>,

    /// Container for merged output (mp4, mkv, webm).
    #[arg(long = "merge-output-format")]
    pub merge_output_format: Option<String>,

    /// Decode the best audio track to raw PCM on stdout
    /// (s16le, 48 kHz, 2 channels).
    #[arg(long = "stream-audio")]
    pub stream_audio: bool,

    /// Extract but do not download.
    #[arg(short = 's', long = "simulate")]
    pub simulate: bool,

    /// Prefer audio tracks in this language (two-letter code).
    #[arg(long = "audio-language")]
    pub audio_language: Option<String>,

    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// For search URLs, list entries without resolving each video.
    #[arg(long = "flat-playlist")]
    pub flat_playlist: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_core_flags() {
        let args = Args::parse_from([
            "ytdlpp",
            "-f",
            "137+251",
            "--merge-output-format",
            "mkv",
            "-P",
            "/tmp/out",
            "https://www.youtube.com/watch?v=abc",
        ]);
        assert_eq!(args.format, "137+251");
        assert_eq!(args.merge_output_format.as_deref(), Some("mkv"));
        assert_eq!(args.paths.as_deref(), Some(std::path::Path::new("/tmp/out")));
        assert_eq!(
            args.url.as_deref(),
            Some("https://www.youtube.com/watch?v=abc")
        );
    }

    #[test]
    fn default_selector_is_best() {
        let args = Args::parse_from(["ytdlpp", "x"]);
        assert_eq!(args.format, "best");
        assert!(!args.simulate);
    }
}
