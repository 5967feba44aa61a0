//! Innertube client identities and request builders.
//!
//! The closed client set mirrors the masquerades YouTube treats
//! differently. Fan-out priority deliberately leads with the variants that
//! tend not to require a proof-of-origin token.

use serde_json::{json, Value};
use tracing::warn;

use crate::common::{Error, Result};
use crate::http::HttpClient;

pub const INNERTUBE_PLAYER_URL: &str =
    "https://www.youtube.com/youtubei/v1/player?prettyPrint=false";
pub const INNERTUBE_SEARCH_URL: &str =
    "https://www.youtube.com/youtubei/v1/search?prettyPrint=false";

/// A constant client-identity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InnertubeClient {
    /// Lowercase diagnostic name used in logs and warnings.
    pub name: &'static str,
    pub client_name: &'static str,
    pub client_version: &'static str,
    pub user_agent: &'static str,
    pub platform: &'static str,
    pub os_name: &'static str,
    pub os_version: &'static str,
    pub device_make: &'static str,
    pub device_model: &'static str,
    /// INNERTUBE_CONTEXT_CLIENT_NAME.
    pub client_id: u8,
    /// Whether URLs from this client need the JS player for deciphering.
    pub requires_js_player: bool,
    /// Whether a PO token, when available, should be attached.
    pub accepts_po_token: bool,
}

pub const CLIENT_WEB: InnertubeClient = InnertubeClient {
    name: "web",
    client_name: "WEB",
    client_version: "2.20250925.01.00",
    user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    platform: "DESKTOP",
    os_name: "Windows",
    os_version: "10.0",
    device_make: "",
    device_model: "",
    client_id: 1,
    requires_js_player: true,
    accepts_po_token: true,
};

pub const CLIENT_WEB_SAFARI: InnertubeClient = InnertubeClient {
    name: "web_safari",
    client_name: "WEB",
    client_version: "2.20250925.01.00",
    user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 \
         (KHTML, like Gecko) Version/15.5 Safari/605.1.15,gzip(gfe)",
    platform: "DESKTOP",
    os_name: "Macintosh",
    os_version: "10.15.7",
    device_make: "Apple",
    device_model: "Macintosh",
    client_id: 1,
    requires_js_player: true,
    accepts_po_token: false,
};

pub const CLIENT_MWEB: InnertubeClient = InnertubeClient {
    name: "mweb",
    client_name: "MWEB",
    client_version: "2.20250925.01.00",
    user_agent: "Mozilla/5.0 (iPad; CPU OS 16_7_10 like Mac OS X) AppleWebKit/605.1.15 \
         (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1,gzip(gfe)",
    platform: "MOBILE",
    os_name: "iPad",
    os_version: "16.7.10",
    device_make: "Apple",
    device_model: "iPad",
    client_id: 2,
    requires_js_player: true,
    accepts_po_token: true,
};

pub const CLIENT_ANDROID: InnertubeClient = InnertubeClient {
    name: "android",
    client_name: "ANDROID",
    client_version: "20.10.38",
    user_agent: "com.google.android.youtube/20.10.38 (Linux; U; Android 11) gzip",
    platform: "MOBILE",
    os_name: "Android",
    os_version: "11",
    device_make: "Google",
    device_model: "Pixel 5",
    client_id: 3,
    requires_js_player: false,
    accepts_po_token: false,
};

/// Same identity as [`CLIENT_ANDROID`] with the device fields cleared;
/// skips the SDK attestation path and rarely needs a PO token.
pub const CLIENT_ANDROID_SDKLESS: InnertubeClient = InnertubeClient {
    name: "android_sdkless",
    device_make: "",
    device_model: "",
    ..CLIENT_ANDROID
};

pub const CLIENT_IOS: InnertubeClient = InnertubeClient {
    name: "ios",
    client_name: "IOS",
    client_version: "20.10.4",
    user_agent: "com.google.ios.youtube/20.10.4 (iPhone16,2; U; CPU iOS 18_3_2 like Mac OS X;)",
    platform: "MOBILE",
    os_name: "iPhone",
    os_version: "18.3.2.22D82",
    device_make: "Apple",
    device_model: "iPhone16,2",
    client_id: 5,
    requires_js_player: false,
    accepts_po_token: false,
};

pub const CLIENT_TV: InnertubeClient = InnertubeClient {
    name: "tv",
    client_name: "TVHTML5",
    client_version: "7.20250923.13.00",
    user_agent: "Mozilla/5.0 (ChromiumStylePlatform) Cobalt/Version",
    platform: "TV",
    os_name: "",
    os_version: "",
    device_make: "",
    device_model: "",
    client_id: 7,
    requires_js_player: true,
    accepts_po_token: false,
};

/// Every identity the library knows.
pub const ALL_CLIENTS: [&InnertubeClient; 7] = [
    &CLIENT_WEB,
    &CLIENT_WEB_SAFARI,
    &CLIENT_MWEB,
    &CLIENT_ANDROID,
    &CLIENT_ANDROID_SDKLESS,
    &CLIENT_IOS,
    &CLIENT_TV,
];

/// Player fan-out, in priority order.
pub const FAN_OUT_CLIENTS: [&InnertubeClient; 4] = [
    &CLIENT_ANDROID_SDKLESS,
    &CLIENT_TV,
    &CLIENT_WEB_SAFARI,
    &CLIENT_WEB,
];

pub fn client_by_name(name: &str) -> Option<&'static InnertubeClient> {
    ALL_CLIENTS
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(name))
        .copied()
}

/// Tokens harvested from the watch page and carried into requests.
#[derive(Debug, Clone, Default)]
pub struct SessionTokens {
    pub visitor_data: Option<String>,
    pub po_token: Option<String>,
    /// Signature timestamp from the player script, when known.
    pub signature_timestamp: Option<u32>,
}

impl InnertubeClient {
    /// Innertube `context` object; only non-empty identity fields appear.
    pub fn build_context(&self, visitor_data: Option<&str>) -> Value {
        let mut client = json!({
            "clientName": self.client_name,
            "clientVersion": self.client_version,
            "userAgent": self.user_agent,
            "hl": "en",
            "gl": "US",
            "timeZone": "UTC",
        });

        let obj = client.as_object_mut().expect("client is an object");
        if !self.os_name.is_empty() {
            obj.insert("osName".into(), self.os_name.into());
        }
        if !self.os_version.is_empty() {
            obj.insert("osVersion".into(), self.os_version.into());
        }
        if !self.platform.is_empty() {
            obj.insert("platform".into(), self.platform.into());
        }
        if !self.device_make.is_empty() {
            obj.insert("deviceMake".into(), self.device_make.into());
        }
        if !self.device_model.is_empty() {
            obj.insert("deviceModel".into(), self.device_model.into());
        }
        if let Some(vd) = visitor_data {
            obj.insert("visitorData".into(), vd.into());
        }

        json!({
            "client": client,
            "user": { "lockedSafetyMode": false },
            "request": { "useSsl": true },
        })
    }

    /// `/player` request body for one video.
    pub fn player_body(&self, video_id: &str, tokens: &SessionTokens) -> Value {
        let mut body = json!({
            "context": self.build_context(tokens.visitor_data.as_deref()),
            "videoId": video_id,
            "contentCheckOk": true,
            "racyCheckOk": true,
        });

        let obj = body.as_object_mut().expect("body is an object");
        if self.accepts_po_token {
            if let Some(po_token) = &tokens.po_token {
                obj.insert(
                    "serviceIntegrityDimensions".into(),
                    json!({ "poToken": po_token }),
                );
            }
        }
        if let Some(sts) = tokens.signature_timestamp {
            obj.insert(
                "playbackContext".into(),
                json!({ "contentPlaybackContext": { "signatureTimestamp": sts } }),
            );
        }
        body
    }

    pub fn headers<'a>(&'a self, client_id: &'a str, tokens: &'a SessionTokens) -> Vec<(&'a str, &'a str)> {
        let mut headers = vec![
            ("User-Agent", self.user_agent),
            ("Content-Type", "application/json"),
            ("X-YouTube-Client-Name", client_id),
            ("X-YouTube-Client-Version", self.client_version),
            ("X-Goog-Api-Format-Version", "1"),
            ("Origin", "https://www.youtube.com"),
        ];
        if let Some(vd) = tokens.visitor_data.as_deref() {
            headers.push(("X-Goog-Visitor-Id", vd));
        }
        headers
    }
}

/// One `/player` POST. A non-200 status or an unplayable `playabilityStatus`
/// is an error; the caller decides whether that client's loss is fatal.
pub async fn player_request(
    http: &HttpClient,
    client: &InnertubeClient,
    video_id: &str,
    tokens: &SessionTokens,
) -> Result<Value> {
    player_request_versioned(http, client, video_id, tokens, None).await
}

/// Same as [`player_request`] with the client version replaced (the tv
/// client picks up a fresher version from the /tv config when available).
pub async fn player_request_versioned(
    http: &HttpClient,
    client: &InnertubeClient,
    video_id: &str,
    tokens: &SessionTokens,
    version_override: Option<&str>,
) -> Result<Value> {
    let mut body = client.player_body(video_id, tokens);
    let version = version_override.unwrap_or(client.client_version);
    if version_override.is_some() {
        body["context"]["client"]["clientVersion"] = json!(version);
    }
    let client_id = client.client_id.to_string();
    let mut headers = client.headers(&client_id, tokens);
    for header in headers.iter_mut() {
        if header.0 == "X-YouTube-Client-Version" {
            header.1 = version;
        }
    }

    let response = http
        .post_json(INNERTUBE_PLAYER_URL, &body, &headers)
        .await?;
    if response.status != 200 {
        warn!("client {} failed with status {}", client.name, response.status);
        return Err(Error::HttpStatus {
            status: response.status,
            url: INNERTUBE_PLAYER_URL.to_string(),
        });
    }

    let json: Value = serde_json::from_str(&response.body)?;

    let playability = json
        .pointer("/playabilityStatus/status")
        .and_then(|s| s.as_str())
        .unwrap_or("UNKNOWN");
    if playability != "OK" {
        warn!("video unplayable with client {}: {playability}", client.name);
        return Err(Error::VideoNotFound(format!(
            "client {} reported {playability}",
            client.name
        )));
    }

    Ok(json)
}
