//! `ytsearch` pseudo-URL grammar and Innertube search execution.

use serde_json::{json, Value};
use tracing::debug;

use crate::common::{Error, Result};
use crate::http::HttpClient;
use crate::util::json::text_node;
use crate::util::text::parse_clock;
use crate::youtube::innertube::{CLIENT_WEB, INNERTUBE_SEARCH_URL};
use crate::youtube::model::SearchResult;

/// Sort-by-upload-date `params` token.
const SORT_BY_DATE_PARAMS: &str = "CAI%3D";

const SEARCH_ALL_CAP: usize = 100;
const SEARCH_DATE_DEFAULT: usize = 10;

/// A parsed `ytsearch<MOD>:<query>` pseudo-URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    pub max_results: usize,
    pub sort_by_date: bool,
}

impl SearchQuery {
    /// Parse the grammar: empty modifier = 1 result, `N` = that many,
    /// `all` = 100, `date` = 10 date-sorted, `Ndate` = N date-sorted.
    /// Returns `None` for non-search URLs; an empty query is an error.
    pub fn parse(url: &str) -> Option<Result<Self>> {
        let rest = url.strip_prefix("ytsearch")?;
        let (modifier, query) = rest.split_once(':')?;

        let query = query.trim();
        if query.is_empty() {
            return Some(Err(Error::InvalidUrl(
                "empty search query".to_string(),
            )));
        }

        let (max_results, sort_by_date) = if modifier.is_empty() {
            (1, false)
        } else if modifier == "all" {
            (SEARCH_ALL_CAP, false)
        } else if modifier == "date" {
            (SEARCH_DATE_DEFAULT, true)
        } else if let Some(count) = modifier.strip_suffix("date") {
            match count.parse::<usize>() {
                Ok(n) if n > 0 => (n.min(SEARCH_ALL_CAP), true),
                _ => {
                    return Some(Err(Error::InvalidUrl(format!(
                        "bad search modifier: {modifier}"
                    ))))
                }
            }
        } else {
            match modifier.parse::<usize>() {
                Ok(n) if n > 0 => (n.min(SEARCH_ALL_CAP), false),
                _ => {
                    return Some(Err(Error::InvalidUrl(format!(
                        "bad search modifier: {modifier}"
                    ))))
                }
            }
        };

        Some(Ok(Self {
            query: query.to_string(),
            max_results,
            sort_by_date,
        }))
    }
}

/// First-page Innertube search with the web client.
pub async fn run_search(http: &HttpClient, query: &SearchQuery) -> Result<Vec<SearchResult>> {
    let mut body = json!({
        "context": CLIENT_WEB.build_context(None),
        "query": query.query,
    });
    if query.sort_by_date {
        body["params"] = json!(SORT_BY_DATE_PARAMS);
    }

    let client_id = CLIENT_WEB.client_id.to_string();
    let headers = [
        ("User-Agent", CLIENT_WEB.user_agent),
        ("Content-Type", "application/json"),
        ("X-YouTube-Client-Name", client_id.as_str()),
        ("X-YouTube-Client-Version", CLIENT_WEB.client_version),
        ("Origin", "https://www.youtube.com"),
    ];

    let response = http
        .post_json(INNERTUBE_SEARCH_URL, &body, &headers)
        .await?;
    if response.status != 200 {
        return Err(Error::HttpStatus {
            status: response.status,
            url: INNERTUBE_SEARCH_URL.to_string(),
        });
    }

    let tree: Value = serde_json::from_str(&response.body)?;
    let results = parse_search_tree(&tree, query.max_results);
    debug!(
        "search '{}' produced {} results",
        query.query,
        results.len()
    );
    Ok(results)
}

/// Walk the renderer tree down to `videoRenderer` items.
pub fn parse_search_tree(tree: &Value, limit: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();
    let Some(sections) = find_section_list(tree) else {
        return results;
    };
    let Some(contents) = sections.get("contents").and_then(|c| c.as_array()) else {
        return results;
    };

    for section in contents {
        let Some(items) = section
            .pointer("/itemSectionRenderer/contents")
            .and_then(|c| c.as_array())
        else {
            continue;
        };
        for item in items {
            if results.len() >= limit {
                return results;
            }
            if let Some(result) = parse_video_renderer(item) {
                results.push(result);
            }
        }
    }
    results
}

fn find_section_list(value: &Value) -> Option<&Value> {
    if let Some(list) = value.get("sectionListRenderer") {
        return Some(list);
    }
    if let Some(contents) = value.get("contents") {
        if let Some(list) = find_section_list(contents) {
            return Some(list);
        }
    }
    if let Some(array) = value.as_array() {
        for item in array {
            if let Some(list) = find_section_list(item) {
                return Some(list);
            }
        }
    }
    if let Some(tabs) = value.get("tabs").and_then(|t| t.as_array()) {
        for tab in tabs {
            if let Some(content) = tab.pointer("/tabRenderer/content") {
                if let Some(list) = find_section_list(content) {
                    return Some(list);
                }
            }
        }
    }
    if let Some(primary) = value.pointer("/twoColumnSearchResultsRenderer/primaryContents") {
        return find_section_list(primary);
    }
    None
}

fn parse_video_renderer(item: &Value) -> Option<SearchResult> {
    let renderer = item.get("videoRenderer")?;
    let video_id = renderer.get("videoId")?.as_str()?.to_string();
    let title = renderer.get("title").and_then(text_node)?;

    let channel = renderer
        .get("ownerText")
        .or_else(|| renderer.get("longBylineText"))
        .or_else(|| renderer.get("shortBylineText"))
        .and_then(text_node)
        .unwrap_or_default();

    let live = renderer
        .get("badges")
        .and_then(|b| b.as_array())
        .map(|badges| {
            badges.iter().any(|badge| {
                badge
                    .pointer("/metadataBadgeRenderer/style")
                    .and_then(|s| s.as_str())
                    .map(|s| s.contains("LIVE"))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false);

    let duration = renderer
        .get("lengthText")
        .and_then(text_node)
        .map(|t| parse_clock(&t))
        .unwrap_or(0);

    let view_count = renderer
        .pointer("/viewCountText/simpleText")
        .and_then(|v| v.as_str())
        .map(|v| {
            v.chars()
                .filter(|c| c.is_ascii_digit())
                .collect::<String>()
                .parse::<i64>()
                .unwrap_or(0)
        })
        .unwrap_or(0);

    let thumbnail = renderer
        .pointer("/thumbnail/thumbnails")
        .and_then(|t| t.as_array())
        .and_then(|t| t.last())
        .and_then(|t| t.get("url"))
        .and_then(|u| u.as_str())
        .map(|u| u.split('?').next().unwrap_or(u).to_string())
        .unwrap_or_default();

    Some(SearchResult {
        video_id,
        title,
        channel,
        duration,
        view_count,
        thumbnail,
        live,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grammar_modifiers() {
        let q = SearchQuery::parse("ytsearch5date:lo-fi beats").unwrap().unwrap();
        assert_eq!(
            q,
            SearchQuery {
                query: "lo-fi beats".into(),
                max_results: 5,
                sort_by_date: true,
            }
        );

        let q = SearchQuery::parse("ytsearchall:x").unwrap().unwrap();
        assert_eq!(q.max_results, 100);
        assert!(!q.sort_by_date);

        let q = SearchQuery::parse("ytsearch:x").unwrap().unwrap();
        assert_eq!(q.max_results, 1);

        let q = SearchQuery::parse("ytsearchdate:x").unwrap().unwrap();
        assert_eq!(q.max_results, 10);
        assert!(q.sort_by_date);
    }

    #[test]
    fn empty_query_is_rejected() {
        assert!(SearchQuery::parse("ytsearch:").unwrap().is_err());
        assert!(SearchQuery::parse("ytsearch:   ").unwrap().is_err());
    }

    #[test]
    fn non_search_urls_pass_through() {
        assert!(SearchQuery::parse("https://www.youtube.com/watch?v=x").is_none());
    }

    #[test]
    fn bad_modifiers_are_rejected() {
        assert!(SearchQuery::parse("ytsearch0:x").unwrap().is_err());
        assert!(SearchQuery::parse("ytsearch-3:x").unwrap().is_err());
        assert!(SearchQuery::parse("ytsearchxyz:x").unwrap().is_err());
    }

    #[test]
    fn parses_video_renderers_from_tree() {
        let tree = serde_json::json!({
            "contents": {
                "twoColumnSearchResultsRenderer": {
                    "primaryContents": {
                        "sectionListRenderer": {
                            "contents": [{
                                "itemSectionRenderer": {
                                    "contents": [
                                        {
                                            "videoRenderer": {
                                                "videoId": "abc123def45",
                                                "title": { "runs": [{ "text": "First" }] },
                                                "ownerText": { "runs": [{ "text": "Chan" }] },
                                                "lengthText": { "simpleText": "3:33" },
                                                "viewCountText": { "simpleText": "1,234 views" },
                                            }
                                        },
                                        { "adSlotRenderer": {} },
                                        {
                                            "videoRenderer": {
                                                "videoId": "zzz999yyy88",
                                                "title": { "simpleText": "Second" },
                                            }
                                        }
                                    ]
                                }
                            }]
                        }
                    }
                }
            }
        });

        let results = parse_search_tree(&tree, 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].video_id, "abc123def45");
        assert_eq!(results[0].title, "First");
        assert_eq!(results[0].channel, "Chan");
        assert_eq!(results[0].duration, 213);
        assert_eq!(results[0].view_count, 1234);
        assert_eq!(results[1].title, "Second");

        let capped = parse_search_tree(&tree, 1);
        assert_eq!(capped.len(), 1);
    }
}
