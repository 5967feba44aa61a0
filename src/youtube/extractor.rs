//! The per-URL extraction session and its owning facade.
//!
//! Session flow: parse URL → fetch watch page → locate and load the player
//! script → bring up a solver → fetch the TV config → fan out `/player`
//! POSTs across the client set → join → rebuild format URLs → dedup.
//! Per-client losses are warnings; the session fails only when every client
//! fails. A missing solver degrades to identity transforms, which is enough
//! for the clients that return pre-signed URLs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::common::{Error, Result};
use crate::http::HttpClient;
use crate::js::JsSandbox;
use crate::solver::SigDecipherer;
use crate::util::json::json_object;
use crate::util::text::to_number_default;
use crate::youtube::innertube::{
    player_request_versioned, InnertubeClient, SessionTokens, CLIENT_TV, FAN_OUT_CLIENTS,
};
use crate::youtube::model::{
    codecs_from_mime, ext_from_mime, Availability, LiveStatus, Thumbnail, VideoFormat, VideoInfo,
};
use crate::youtube::player_script::{fetch_player, PlayerCache};
use crate::youtube::search::{run_search, SearchQuery};

const TV_CONFIG_URL: &str = "https://www.youtube.com/tv";

/// Extraction facade: owns the HTTP engine, the JS sandbox and the player
/// cache, and tracks live sessions so they can be cancelled collectively.
pub struct Extractor {
    http: HttpClient,
    sandbox: Arc<JsSandbox>,
    player_cache: PlayerCache,
    sessions: Mutex<Vec<Weak<AtomicBool>>>,
}

impl Extractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: HttpClient::new()?,
            sandbox: Arc::new(JsSandbox::new()),
            player_cache: PlayerCache::new(),
            sessions: Mutex::new(Vec::new()),
        })
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn clear_player_cache(&self) {
        self.player_cache.clear();
    }

    /// Cancel all outstanding sessions and stop the sandbox. Sessions
    /// observe the flag at their next state transition.
    pub fn shutdown(&self) {
        for session in self.sessions.lock().drain(..) {
            if let Some(flag) = session.upgrade() {
                flag.store(true, Ordering::SeqCst);
            }
        }
        self.sandbox.shutdown();
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<crate::youtube::model::SearchResult>> {
        run_search(&self.http, query).await
    }

    /// Run one extraction session to completion.
    pub async fn extract(&self, url: &str) -> Result<VideoInfo> {
        let cancel = Arc::new(AtomicBool::new(false));
        self.sessions.lock().push(Arc::downgrade(&cancel));

        let result = self.run_session(url, &cancel).await;
        self.sessions
            .lock()
            .retain(|w| w.upgrade().map_or(false, |f| !Arc::ptr_eq(&f, &cancel)));
        result
    }

    async fn run_session(&self, url: &str, cancel: &AtomicBool) -> Result<VideoInfo> {
        // ParseUrl
        let video_id =
            extract_video_id(url).ok_or_else(|| Error::InvalidUrl(url.to_string()))?;
        info!("[youtube] Extracting URL: {url}");
        checkpoint(cancel)?;

        // FetchWatchPage
        info!("[youtube] {video_id}: Downloading webpage");
        let watch_url = format!("https://www.youtube.com/watch?v={video_id}");
        let page = self.http.get(&watch_url, &[]).await?;
        if !page.is_success() {
            return Err(Error::HttpStatus {
                status: page.status,
                url: watch_url,
            });
        }
        checkpoint(cancel)?;

        // ExtractPlayerUrl / ExtractTokens
        let mut tokens = extract_tokens(&page.body);
        let player = fetch_player(&self.http, &self.player_cache, &video_id, &page.body).await?;
        checkpoint(cancel)?;

        // LoadSolver
        let mut decipherer = SigDecipherer::new(self.sandbox.clone());
        match &player {
            Some(player) => {
                tokens.signature_timestamp = extract_signature_timestamp(&player.script);
                decipherer.load_player(&player.script, &player.player_id).await;
            }
            None => {
                warn!(
                    "[youtube] {video_id}: No player script found; \
                     signature deciphering unavailable"
                );
            }
        }
        checkpoint(cancel)?;

        // FetchTvConfig
        let tv_version = self.fetch_tv_config().await;
        checkpoint(cancel)?;

        // FanOutClients
        let fan_out = FAN_OUT_CLIENTS.iter().map(|client| {
            let tokens = &tokens;
            let tv_version = tv_version.as_deref();
            let video_id = video_id.as_str();
            async move {
                info!(
                    "[youtube] {video_id}: Downloading {} player API JSON",
                    client.name
                );
                let result = player_request_with_version(
                    &self.http,
                    client,
                    video_id,
                    tokens,
                    tv_version,
                )
                .await;
                (*client, result)
            }
        });
        let responses = futures::future::join_all(fan_out).await;
        checkpoint(cancel)?;

        // JoinResponses: priority order, not arrival order.
        let accepted: Vec<(&InnertubeClient, Value)> = responses
            .into_iter()
            .filter_map(|(client, result)| match result {
                Ok(json) => Some((client, json)),
                Err(e) => {
                    warn!("[youtube] {video_id}: client {} failed: {e}", client.name);
                    None
                }
            })
            .collect();

        if accepted.is_empty() {
            return Err(Error::VideoNotFound(format!(
                "all clients failed for {video_id}"
            )));
        }

        build_video_info(&video_id, &accepted, &decipherer, cancel).await
    }

    /// The /tv page sometimes carries a newer TVHTML5 client version; any
    /// outcome here is acceptable.
    async fn fetch_tv_config(&self) -> Option<String> {
        static TV_VERSION: OnceLock<Regex> = OnceLock::new();
        let regex = TV_VERSION
            .get_or_init(|| Regex::new(r#""clientVersion"\s*:\s*"(7\.[0-9.]+)""#).unwrap());

        let page = self
            .http
            .get(TV_CONFIG_URL, &[("User-Agent", CLIENT_TV.user_agent)])
            .await
            .ok()?;
        if !page.is_success() {
            return None;
        }
        let version = regex
            .captures(&page.body)
            .map(|caps| caps[1].to_string());
        if let Some(version) = &version {
            debug!("tv client version from /tv config: {version}");
        }
        version
    }
}

/// BuildFormats + Finalize: the first accepted response in priority order
/// is the primary metadata source; every accepted response contributes
/// formats, deduplicated first-wins by itag (so client priority, not
/// arrival order, decides which variant survives).
async fn build_video_info(
    video_id: &str,
    accepted: &[(&InnertubeClient, Value)],
    decipherer: &SigDecipherer,
    cancel: &AtomicBool,
) -> Result<VideoInfo> {
    let primary = &accepted
        .first()
        .ok_or_else(|| Error::VideoNotFound(format!("no accepted responses for {video_id}")))?
        .1;
    let mut info = parse_metadata(video_id, primary);

    let mut seen_itags = std::collections::HashSet::new();
    for (client, response) in accepted {
        checkpoint(cancel)?;
        let mut skipped_missing_url = 0usize;

        let streaming = response.get("streamingData");
        let entries = ["formats", "adaptiveFormats"]
            .iter()
            .filter_map(|key| streaming.and_then(|s| s.get(*key)).and_then(|f| f.as_array()))
            .flatten();

        for entry in entries {
            match process_format(entry, decipherer).await {
                Some(format) => {
                    if seen_itags.insert(format.itag) {
                        info.formats.push(format);
                    }
                }
                None => skipped_missing_url += 1,
            }
        }

        if skipped_missing_url > 0 {
            warn_skipped_formats(video_id, client, skipped_missing_url);
        }
    }

    Ok(info)
}

fn checkpoint(cancel: &AtomicBool) -> Result<()> {
    if cancel.load(Ordering::SeqCst) {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// `/player` with the version refreshed for the tv client when the /tv
/// config advertised a newer one.
async fn player_request_with_version(
    http: &HttpClient,
    client: &InnertubeClient,
    video_id: &str,
    tokens: &SessionTokens,
    tv_version: Option<&str>,
) -> Result<Value> {
    let version_override = if client.client_id == CLIENT_TV.client_id {
        tv_version
    } else {
        None
    };
    player_request_versioned(http, client, video_id, tokens, version_override).await
}

/// Accept plain ids, watch URLs, short links, shorts and live paths.
pub fn extract_video_id(url: &str) -> Option<String> {
    let is_id = |s: &str| s.len() == 11 && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if is_id(url) {
        return Some(url.to_string());
    }

    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    if !host.contains("youtube.com") && !host.contains("youtu.be") {
        return None;
    }

    if host.contains("youtu.be") {
        let id = parsed.path().trim_start_matches('/');
        return is_id(id).then(|| id.to_string());
    }

    if let Some((_, v)) = parsed.query_pairs().find(|(k, _)| k == "v") {
        let v = v.to_string();
        return is_id(&v).then_some(v);
    }

    for prefix in ["/shorts/", "/live/", "/embed/"] {
        if let Some(rest) = parsed.path().strip_prefix(prefix) {
            let id = rest.split('/').next().unwrap_or("");
            if is_id(id) {
                return Some(id.to_string());
            }
        }
    }
    None
}

/// Harvest visitor data and a possible PO token from the watch page.
pub fn extract_tokens(webpage: &str) -> SessionTokens {
    let mut tokens = SessionTokens::default();

    if let Some(start) = webpage.find("ytcfg.set({") {
        if let Some(config) = json_object(&webpage[start..]) {
            if let Ok(config) = serde_json::from_str::<Value>(config) {
                tokens.visitor_data = config
                    .get("VISITOR_DATA")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .or_else(|| {
                        config
                            .pointer("/INNERTUBE_CONTEXT/client/visitorData")
                            .and_then(|v| v.as_str())
                            .map(str::to_string)
                    });
            }
        }
    }

    static PO_TOKEN: OnceLock<Regex> = OnceLock::new();
    let po_token = PO_TOKEN.get_or_init(|| Regex::new(r#""poToken"\s*:\s*"([^"]+)""#).unwrap());
    tokens.po_token = po_token
        .captures(webpage)
        .map(|caps| caps[1].to_string());

    tokens
}

/// `signatureTimestamp` (a.k.a. `sts`) from the player script.
pub fn extract_signature_timestamp(player_code: &str) -> Option<u32> {
    static STS: OnceLock<Regex> = OnceLock::new();
    let sts = STS.get_or_init(|| Regex::new(r"(?:signatureTimestamp|sts):(\d+)").unwrap());
    sts.captures(player_code)
        .and_then(|caps| caps[1].parse().ok())
}

/// Parse the primary response into the human-metadata half of `VideoInfo`.
fn parse_metadata(video_id: &str, response: &Value) -> VideoInfo {
    let mut info = VideoInfo {
        id: video_id.to_string(),
        webpage_url: format!("https://www.youtube.com/watch?v={video_id}"),
        ..Default::default()
    };

    if let Some(details) = response.get("videoDetails") {
        let text = |key: &str| {
            details
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        info.title = text("title");
        info.fulltitle = info.title.clone();
        info.description = text("shortDescription");
        info.uploader = text("author");
        info.channel = info.uploader.clone();
        info.channel_id = text("channelId");
        if !info.channel_id.is_empty() {
            info.channel_url = format!("https://www.youtube.com/channel/{}", info.channel_id);
            info.uploader_id = info.channel_id.clone();
        }
        info.duration = details
            .get("lengthSeconds")
            .and_then(|v| v.as_str())
            .map(to_number_default::<u64>)
            .unwrap_or(0);
        info.view_count = details
            .get("viewCount")
            .and_then(|v| v.as_str())
            .map(to_number_default::<i64>)
            .unwrap_or(0);
        if let Some(keywords) = details.get("keywords").and_then(|v| v.as_array()) {
            info.tags = keywords
                .iter()
                .filter_map(|k| k.as_str().map(str::to_string))
                .collect();
        }
        if let Some(thumbnails) = details.pointer("/thumbnail/thumbnails").and_then(|t| t.as_array())
        {
            info.thumbnails = thumbnails
                .iter()
                .map(|t| Thumbnail {
                    url: t.get("url").and_then(|u| u.as_str()).unwrap_or_default().into(),
                    width: t.get("width").and_then(|w| w.as_i64()).unwrap_or(0),
                    height: t.get("height").and_then(|h| h.as_i64()).unwrap_or(0),
                })
                .collect();
            if let Some(last) = info.thumbnails.last() {
                info.thumbnail = last.url.clone();
            }
        }

        let is_live = details.get("isLive").and_then(|v| v.as_bool()).unwrap_or(false);
        let is_live_content = details
            .get("isLiveContent")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        info.is_live = is_live;
        info.was_live = !is_live && is_live_content;
        info.live_status = if is_live {
            LiveStatus::IsLive
        } else if is_live_content {
            LiveStatus::WasLive
        } else {
            LiveStatus::NotLive
        };
    }

    if let Some(micro) = response.pointer("/microformat/playerMicroformatRenderer") {
        if let Some(upload_date) = micro.get("uploadDate").and_then(|v| v.as_str()) {
            // YYYY-MM-DD (possibly with a time suffix) -> YYYYMMDD
            info.upload_date = upload_date
                .chars()
                .take(10)
                .filter(|c| c.is_ascii_digit())
                .collect();
        }
        if let Some(category) = micro.get("category").and_then(|v| v.as_str()) {
            info.categories = vec![category.to_string()];
        }
        if micro.get("isUnlisted").and_then(|v| v.as_bool()) == Some(true) {
            info.availability = Availability::Unlisted;
        }
        if micro.get("isFamilySafe").and_then(|v| v.as_bool()) == Some(false) {
            info.age_limit = 18;
        }
    }

    info.playable_in_embed = response
        .pointer("/playabilityStatus/playableInEmbed")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    info
}

/// Rebuild one format entry. `None` means the format had no usable URL
/// after deciphering and was dropped.
async fn process_format(entry: &Value, decipherer: &SigDecipherer) -> Option<VideoFormat> {
    let mut format = VideoFormat {
        itag: entry.get("itag").and_then(|v| v.as_i64()).unwrap_or(0),
        url: entry
            .get("url")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        mime_type: entry
            .get("mimeType")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        width: entry.get("width").and_then(|v| v.as_i64()).unwrap_or(0),
        height: entry.get("height").and_then(|v| v.as_i64()).unwrap_or(0),
        fps: entry.get("fps").and_then(|v| v.as_i64()).unwrap_or(0),
        audio_channels: entry
            .get("audioChannels")
            .and_then(|v| v.as_i64())
            .unwrap_or(0),
        quality_label: entry
            .get("qualityLabel")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        ..Default::default()
    };

    format.audio_sample_rate = entry
        .get("audioSampleRate")
        .and_then(|v| v.as_str())
        .map(to_number_default::<i64>)
        .unwrap_or(0);
    format.content_length = entry
        .get("contentLength")
        .and_then(|v| v.as_str())
        .map(to_number_default::<i64>)
        .unwrap_or(0);

    let bitrate = entry
        .get("averageBitrate")
        .or_else(|| entry.get("bitrate"))
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    format.tbr = bitrate / 1000.0;

    if !format.mime_type.is_empty() {
        let (ext, container) = ext_from_mime(&format.mime_type);
        let (vcodec, acodec) = codecs_from_mime(&format.mime_type);
        format.ext = ext;
        format.container = container;
        format.vcodec = vcodec;
        format.acodec = acodec;
    }
    if !format.quality_label.is_empty() {
        format.format_note = format.quality_label.clone();
    }

    if let Some(track) = entry.get("audioTrack") {
        if let Some(id) = track.get("id").and_then(|v| v.as_str()) {
            format.language = id.split('.').next().unwrap_or(id).to_string();
        }
        let display = track
            .get("displayName")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_lowercase();
        format.language_preference = if display.contains("descriptive") {
            -10
        } else if display.contains("original") {
            10
        } else if track.get("audioIsDefault").and_then(|v| v.as_bool()) == Some(true) {
            5
        } else {
            -1
        };
    }

    // Locked URL: decode the signatureCipher bundle and solve `s`.
    if format.url.is_empty() {
        if let Some(cipher) = entry
            .get("signatureCipher")
            .or_else(|| entry.get("cipher"))
            .and_then(|v| v.as_str())
        {
            if let Some((url, s, sp)) = decode_signature_cipher(cipher) {
                let deciphered = decipherer.decipher_signature(&s).await;
                let separator = if url.contains('?') { '&' } else { '?' };
                let param = if sp.is_empty() { "sig".to_string() } else { sp };
                format.url = format!(
                    "{url}{separator}{param}={}",
                    urlencoding::encode(&deciphered)
                );
            }
        }
    }

    // Throttle parameter: always rewritten when present.
    if !format.url.is_empty() {
        if let Some(n) = query_param(&format.url, "n") {
            let transformed = decipherer.transform_n(&n).await;
            if transformed != n {
                debug!("n transform: {n} -> {transformed}");
            }
            format.url = replace_query_param(&format.url, "n", &transformed);
        }
    }

    if format.url.is_empty() {
        debug!("dropping format {}: empty URL", format.itag);
        return None;
    }

    if format.url.contains("m3u8") || format.url.contains("/api/manifest/hls") {
        format.protocol = "m3u8".into();
    }

    Some(format)
}

/// Split a `signatureCipher` bundle into `(url, s, sp)`.
fn decode_signature_cipher(cipher: &str) -> Option<(String, String, String)> {
    let mut url = None;
    let mut s = None;
    let mut sp = String::new();

    for pair in cipher.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let decoded = urlencoding::decode(value).ok()?.into_owned();
        match key {
            "url" => url = Some(decoded),
            "s" => s = Some(decoded),
            "sp" => sp = decoded,
            _ => {}
        }
    }

    match (url, s) {
        (Some(url), Some(s)) => Some((url, s, sp)),
        _ => None,
    }
}

fn query_param(url: &str, name: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

fn replace_query_param(url: &str, name: &str, value: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(url) else {
        return url.to_string();
    };
    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| {
            if k == name {
                (k.into_owned(), value.to_string())
            } else {
                (k.into_owned(), v.into_owned())
            }
        })
        .collect();
    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    parsed.to_string()
}

/// Grouped per-client diagnostics for formats dropped with no URL; the
/// web and tv cases are the known SABR-streaming signatures.
fn warn_skipped_formats(video_id: &str, client: &InnertubeClient, count: usize) {
    match client.name {
        "web" | "web_safari" | "mweb" => warn!(
            "[youtube] {video_id}: {count} web client https formats have been skipped \
             as they are missing a url. YouTube is forcing SABR streaming for this client"
        ),
        "tv" => warn!(
            "[youtube] {video_id}: {count} tv client https formats have been skipped \
             as they are missing a url. YouTube may have enabled the SABR-only or \
             Server-Side Ad Placement experiment for the current session"
        ),
        name => warn!(
            "[youtube] {video_id}: {count} {name} client https formats have been \
             skipped as they are missing a url"
        ),
    }
}
