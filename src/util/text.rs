//! Filename sanitizing and small formatting helpers.

/// Strip characters that are illegal in filenames on common filesystems and
/// trim trailing dots/spaces (problematic on Windows). Control bytes are
/// dropped, separators become spaces. Falls back to `"video"` when nothing
/// survives.
pub fn sanitize_filename(name: &str) -> String {
    let mut result = String::with_capacity(name.len());

    for c in name.chars() {
        match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => result.push('_'),
            '\n' | '\r' | '\t' => result.push(' '),
            c if (c as u32) < 32 => {}
            c => result.push(c),
        }
    }

    while result.ends_with(' ') || result.ends_with('.') {
        result.pop();
    }

    if result.is_empty() {
        result.push_str("video");
    }
    result
}

/// Render seconds as `M:SS` or `H:MM:SS`, yt-dlp style.
pub fn duration_string(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// Parse a `M:SS` / `H:MM:SS` clock string into seconds.
pub fn parse_clock(text: &str) -> u64 {
    let mut seconds = 0u64;
    for part in text.split(':') {
        seconds = seconds * 60 + part.trim().parse::<u64>().unwrap_or(0);
    }
    seconds
}

/// Lenient numeric parse for fields YouTube serves as strings
/// ("contentLength": "12345"). Returns the default on anything unparsable.
pub fn to_number_default<T: std::str::FromStr + Default>(value: &str) -> T {
    value.trim().parse().unwrap_or_default()
}

/// Human-readable byte size (MiB based, matching the format table).
pub fn format_size(bytes: u64) -> String {
    let mib = bytes as f64 / 1024.0 / 1024.0;
    if mib >= 1024.0 {
        format!("{:.2}GiB", mib / 1024.0)
    } else {
        format!("{mib:.2}MiB")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_reserved_characters() {
        assert_eq!(sanitize_filename("a/b\\c:d*e?f\"g<h>i|j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_filename("tab\there"), "tab here");
    }

    #[test]
    fn trims_trailing_dots_and_spaces() {
        assert_eq!(sanitize_filename("video... "), "video");
        assert_eq!(sanitize_filename("...   "), "video");
    }

    #[test]
    fn empty_title_falls_back() {
        assert_eq!(sanitize_filename(""), "video");
        assert_eq!(sanitize_filename("\u{1}\u{2}"), "video");
    }

    #[test]
    fn duration_roundtrip() {
        assert_eq!(duration_string(213), "3:33");
        assert_eq!(duration_string(3600 + 62), "1:01:02");
        assert_eq!(parse_clock("3:33"), 213);
        assert_eq!(parse_clock("1:01:02"), 3662);
    }

    #[test]
    fn lenient_numbers() {
        assert_eq!(to_number_default::<u64>("12345"), 12345);
        assert_eq!(to_number_default::<u64>("nope"), 0);
        assert_eq!(to_number_default::<i32>(" 42 "), 42);
    }
}
