//! Player-script acquisition and caching.
//!
//! The watch page names a versioned `base.js`; its `player_id` (the slug
//! between `/player/` and the next `/`) keys an in-memory map mirrored to
//! disk, so a player is fetched once per revision across processes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::common::Result;
use crate::http::HttpClient;

/// Cache directory: `YTDLPP_CACHE_DIR` override, else `<tmp>/ytdlpp_cache`.
pub fn cache_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("YTDLPP_CACHE_DIR") {
        return PathBuf::from(dir);
    }
    std::env::temp_dir().join("ytdlpp_cache")
}

/// Fast path: `"assets":{"js":"..."}` somewhere in the page.
fn extract_assets_js(webpage: &str) -> Option<String> {
    let assets = webpage.find("\"assets\"")?;
    let js = webpage[assets..].find("\"js\":\"")?;
    if js > 100 {
        return None;
    }
    let start = assets + js + 6;
    let end = webpage[start..].find('"')?;
    Some(webpage[start..start + end].to_string())
}

/// Fast path: a bare `/s/player/…/base.js` reference.
fn extract_base_js(webpage: &str) -> Option<String> {
    let player = webpage.find("/s/player/")?;
    let base = webpage[player..].find("base.js")?;
    if base > 200 {
        return None;
    }
    let end = player + base + "base.js".len();

    let bytes = webpage.as_bytes();
    let mut start = player;
    while start > 0 {
        match bytes[start - 1] {
            b'"' | b'\'' | b' ' | b'=' => break,
            _ => start -= 1,
        }
    }
    Some(webpage[start..end].to_string())
}

fn url_regexes() -> &'static [Regex; 3] {
    static REGEXES: OnceLock<[Regex; 3]> = OnceLock::new();
    REGEXES.get_or_init(|| {
        [
            Regex::new(r#"<script\s+[^>]*src="([^"]+player_ias[^"]+base\.js)"[^>]*>"#).unwrap(),
            Regex::new(r#""assets"\s*:\s*\{\s*"js"\s*:\s*"([^"]+)""#).unwrap(),
            Regex::new(r"(/s/player/[a-zA-Z0-9._/-]+/base\.js)").unwrap(),
        ]
    })
}

/// Ordered strategies, first match wins: two string searches, then the
/// regex fallbacks.
pub fn extract_player_url(webpage: &str) -> Option<String> {
    if let Some(url) = extract_assets_js(webpage) {
        debug!("player URL via assets search");
        return Some(url);
    }
    if let Some(url) = extract_base_js(webpage) {
        debug!("player URL via base.js search");
        return Some(url);
    }
    for (i, regex) in url_regexes().iter().enumerate() {
        if let Some(caps) = regex.captures(webpage) {
            debug!("player URL via regex fallback {i}");
            return Some(caps.get(1).unwrap().as_str().to_string());
        }
    }
    None
}

/// The slug between `/player/` and the following `/` (or the end of the
/// path/query when no slash follows).
pub fn extract_player_id(player_url: &str) -> Option<String> {
    let start = player_url.find("/player/")? + "/player/".len();
    let rest = &player_url[start..];
    let end = rest
        .find('/')
        .or_else(|| rest.find('?'))
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    Some(rest[..end].to_string())
}

fn absolute_player_url(player_url: &str) -> String {
    if player_url.starts_with("http") {
        player_url.to_string()
    } else if player_url.starts_with('/') {
        format!("https://www.youtube.com{player_url}")
    } else {
        format!("https://www.youtube.com/{player_url}")
    }
}

#[derive(Default)]
struct CachedPlayerData {
    script: String,
}

/// Process-global player cache, mirrored to `<cache_dir>/<player_id>.js`.
/// Never evicted automatically. Concurrent first-time extractions may race
/// to populate the same entry; later writers atomically replace, which is
/// wasted work but harmless.
pub struct PlayerCache {
    memory: Mutex<HashMap<String, CachedPlayerData>>,
}

impl PlayerCache {
    pub fn new() -> Self {
        Self {
            memory: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, player_id: &str) -> Option<String> {
        {
            let memory = self.memory.lock();
            if let Some(entry) = memory.get(player_id) {
                if !entry.script.is_empty() {
                    debug!("player {player_id} found in memory cache");
                    return Some(entry.script.clone());
                }
            }
        }

        let path = cache_dir().join(format!("{player_id}.js"));
        match std::fs::read_to_string(&path) {
            Ok(script) if !script.is_empty() => {
                debug!("player {player_id} loaded from disk cache");
                self.memory
                    .lock()
                    .insert(player_id.to_string(), CachedPlayerData { script: script.clone() });
                Some(script)
            }
            _ => None,
        }
    }

    pub fn store(&self, player_id: &str, script: &str) {
        self.memory.lock().insert(
            player_id.to_string(),
            CachedPlayerData {
                script: script.to_string(),
            },
        );

        let dir = cache_dir();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!("could not create cache dir {}: {e}", dir.display());
            return;
        }
        let path = dir.join(format!("{player_id}.js"));
        if let Err(e) = std::fs::write(&path, script) {
            warn!("could not persist player {player_id}: {e}");
        } else {
            debug!("player {player_id} saved to disk cache");
        }
    }

    pub fn clear(&self) {
        self.memory.lock().clear();
        let dir = cache_dir();
        if dir.exists() {
            let _ = std::fs::remove_dir_all(&dir);
        }
    }
}

impl Default for PlayerCache {
    fn default() -> Self {
        Self::new()
    }
}

/// A located-and-loaded player script.
pub struct FetchedPlayer {
    pub player_id: String,
    pub script: String,
}

/// Resolve the player referenced by a watch page: cache first, network
/// second. Returns `None` when the page names no player at all.
pub async fn fetch_player(
    http: &HttpClient,
    cache: &PlayerCache,
    video_id: &str,
    webpage: &str,
) -> Result<Option<FetchedPlayer>> {
    let Some(player_url) = extract_player_url(webpage) else {
        return Ok(None);
    };
    let player_id = extract_player_id(&player_url).unwrap_or_else(|| "unknown".to_string());

    if let Some(script) = cache.get(&player_id) {
        info!("[youtube] {video_id}: Using cached player {player_id}");
        return Ok(Some(FetchedPlayer { player_id, script }));
    }

    info!("[youtube] {video_id}: Downloading player {player_id}");
    let url = absolute_player_url(&player_url);
    let response = http.get(&url, &[]).await?;
    if !response.is_success() {
        warn!("player script fetch returned {}", response.status);
        return Ok(None);
    }

    cache.store(&player_id, &response.body);
    Ok(Some(FetchedPlayer {
        player_id,
        script: response.body,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assets_js_strategy() {
        let html = r#"...,"assets":{"js":"/s/player/abc123/base.js"},..."#;
        assert_eq!(
            extract_player_url(html).as_deref(),
            Some("/s/player/abc123/base.js")
        );
        assert_eq!(
            extract_player_id("/s/player/abc123/base.js").as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn bare_base_js_strategy() {
        let html = r#"<script src="/s/player/deadbeef/player_ias.vflset/en_US/base.js"></script>"#;
        let url = extract_player_url(html).unwrap();
        assert_eq!(url, "/s/player/deadbeef/player_ias.vflset/en_US/base.js");
        assert_eq!(extract_player_id(&url).as_deref(), Some("deadbeef"));
    }

    #[test]
    fn player_id_without_trailing_slash() {
        assert_eq!(
            extract_player_id("/s/player/xyz?x=1").as_deref(),
            Some("xyz")
        );
        assert_eq!(extract_player_id("/nothing/here"), None);
    }

    #[test]
    fn relative_urls_are_absolutized() {
        assert_eq!(
            absolute_player_url("/s/player/a/base.js"),
            "https://www.youtube.com/s/player/a/base.js"
        );
        assert_eq!(
            absolute_player_url("https://www.youtube.com/s/player/a/base.js"),
            "https://www.youtube.com/s/player/a/base.js"
        );
    }

    #[test]
    fn no_player_in_page() {
        assert_eq!(extract_player_url("<html>nothing here</html>"), None);
    }

    #[test]
    fn cache_roundtrip_via_disk() {
        let dir = std::env::temp_dir().join(format!("ytdlpp_test_{}", std::process::id()));
        std::env::set_var("YTDLPP_CACHE_DIR", &dir);

        let cache = PlayerCache::new();
        cache.store("testplayer", "var x = 1;");

        // A fresh cache instance must find it on disk.
        let fresh = PlayerCache::new();
        assert_eq!(fresh.get("testplayer").as_deref(), Some("var x = 1;"));
        assert_eq!(fresh.get("absent"), None);

        fresh.clear();
        std::env::remove_var("YTDLPP_CACHE_DIR");
    }
}
