//! End-to-end tests for the chunked downloader and transparent decoding,
//! against a minimal local HTTP/1.1 fixture server.

use std::io::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use ytdlpp::HttpClient;

#[derive(Debug, Clone)]
struct FixtureRequest {
    method: String,
    #[allow(dead_code)]
    path: String,
    range: Option<(u64, u64)>,
}

struct FixtureResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

type Handler = Arc<dyn Fn(&FixtureRequest) -> FixtureResponse + Send + Sync>;

/// Spawn a one-shot HTTP server; handles any number of keep-alive
/// connections and requests until the test ends.
async fn spawn_server(handler: Handler) -> (String, Arc<Mutex<Vec<FixtureRequest>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log: Arc<Mutex<Vec<FixtureRequest>>> = Arc::new(Mutex::new(Vec::new()));

    let request_log = log.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let handler = handler.clone();
            let request_log = request_log.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                loop {
                    // Read one request head.
                    let head_end = loop {
                        if let Some(pos) = find_head_end(&buf) {
                            break pos;
                        }
                        let mut chunk = [0u8; 4096];
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    };

                    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
                    buf.drain(..head_end + 4);

                    let request = parse_request(&head);
                    request_log.lock().push(request.clone());
                    let response = handler(&request);

                    let mut out = format!(
                        "HTTP/1.1 {} X\r\nConnection: keep-alive\r\nContent-Length: {}\r\n",
                        response.status,
                        response.body.len()
                    );
                    for (name, value) in &response.headers {
                        out.push_str(&format!("{name}: {value}\r\n"));
                    }
                    out.push_str("\r\n");

                    if socket.write_all(out.as_bytes()).await.is_err() {
                        return;
                    }
                    if request.method != "HEAD"
                        && socket.write_all(&response.body).await.is_err()
                    {
                        return;
                    }
                }
            });
        }
    });

    (format!("http://{addr}"), log)
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_request(head: &str) -> FixtureRequest {
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("").to_string();

    let mut range = None;
    for line in lines {
        if let Some(value) = line.strip_prefix("range: ").or_else(|| line.strip_prefix("Range: ")) {
            if let Some(spec) = value.trim().strip_prefix("bytes=") {
                if let Some((start, end)) = spec.split_once('-') {
                    if let (Ok(start), Ok(end)) = (start.parse(), end.parse()) {
                        range = Some((start, end));
                    }
                }
            }
        }
    }

    FixtureRequest { method, path, range }
}

fn test_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn ranged_handler(payload: Vec<u8>) -> Handler {
    Arc::new(move |request: &FixtureRequest| {
        let total = payload.len() as u64;
        if request.method == "HEAD" {
            return FixtureResponse {
                status: 200,
                headers: vec![("Accept-Ranges".into(), "bytes".into())],
                body: payload.clone(),
            };
        }
        match request.range {
            Some((start, end)) => {
                let end = end.min(total - 1);
                let body = payload[start as usize..=end as usize].to_vec();
                FixtureResponse {
                    status: 206,
                    headers: vec![(
                        "Content-Range".into(),
                        format!("bytes {start}-{end}/{total}"),
                    )],
                    body,
                }
            }
            None => FixtureResponse {
                status: 200,
                headers: vec![],
                body: payload.clone(),
            },
        }
    })
}

#[tokio::test]
async fn chunked_download_covers_every_byte() {
    // Larger than two chunks so several ranged requests are needed.
    let payload = test_payload(5 * 1024 * 1024);
    let (base, log) = spawn_server(ranged_handler(payload.clone())).await;

    let client = HttpClient::new().unwrap();
    let dir = std::env::temp_dir().join(format!("ytdlpp_dl_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("covered.bin");

    let progress: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = progress.clone();
    client
        .download_file(&format!("{base}/file.bin"), &path, move |now, total| {
            sink.lock().push((now, total));
        })
        .await
        .unwrap();

    let written = std::fs::read(&path).unwrap();
    assert_eq!(written, payload);

    // Range offsets are strictly increasing and gap-free.
    let requests = log.lock();
    let ranges: Vec<(u64, u64)> = requests
        .iter()
        .filter(|r| r.method == "GET")
        .filter_map(|r| r.range)
        .collect();
    assert!(ranges.len() >= 3);
    assert_eq!(ranges[0].0, 0);
    for pair in ranges.windows(2) {
        assert_eq!(pair[1].0, pair[0].1 + 1);
    }
    assert_eq!(ranges.last().unwrap().1, payload.len() as u64 - 1);

    // Progress is monotonically nondecreasing up to the full size.
    let progress = progress.lock();
    assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(progress.last().unwrap().0, payload.len() as u64);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn range_ignored_server_falls_back_to_full_body() {
    let payload = test_payload(3 * 1024 * 1024);
    let served = payload.clone();
    // Replies 200 with the whole body no matter what was asked.
    let handler: Handler = Arc::new(move |_request: &FixtureRequest| FixtureResponse {
        status: 200,
        headers: vec![],
        body: served.clone(),
    });
    let (base, _log) = spawn_server(handler).await;

    let client = HttpClient::new().unwrap();
    let dir = std::env::temp_dir().join(format!("ytdlpp_fb_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("fallback.bin");

    let progress: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = progress.clone();
    client
        .download_file(&format!("{base}/file.bin"), &path, move |now, _| {
            sink.lock().push(now);
        })
        .await
        .unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), payload);

    // One top-level run: offsets restart at most once (the rewind) and
    // then climb to the end.
    let progress = progress.lock();
    assert_eq!(*progress.last().unwrap(), payload.len() as u64);
    let restarts = progress.windows(2).filter(|w| w[1] < w[0]).count();
    assert_eq!(restarts, 0);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn head_failure_degrades_to_unranged_download() {
    let payload = test_payload(64 * 1024);
    let served = payload.clone();
    let handler: Handler = Arc::new(move |request: &FixtureRequest| {
        if request.method == "HEAD" {
            return FixtureResponse {
                status: 405,
                headers: vec![],
                body: Vec::new(),
            };
        }
        FixtureResponse {
            status: 200,
            headers: vec![],
            body: served.clone(),
        }
    });
    let (base, log) = spawn_server(handler).await;

    let client = HttpClient::new().unwrap();
    let dir = std::env::temp_dir().join(format!("ytdlpp_nh_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("nohead.bin");

    client
        .download_file(&format!("{base}/file.bin"), &path, |_, _| {})
        .await
        .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), payload);

    // The GET carried no Range header at all.
    let requests = log.lock();
    let gets: Vec<_> = requests.iter().filter(|r| r.method == "GET").collect();
    assert_eq!(gets.len(), 1);
    assert!(gets[0].range.is_none());

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn gzip_bodies_are_transparently_decoded() {
    let plain = "the quick brown fox jumps over the lazy dog".repeat(100);
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(plain.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    let handler: Handler = Arc::new(move |_request: &FixtureRequest| FixtureResponse {
        status: 200,
        headers: vec![("Content-Encoding".into(), "gzip".into())],
        body: compressed.clone(),
    });
    let (base, _log) = spawn_server(handler).await;

    let client = HttpClient::new().unwrap();
    let response = client.get(&format!("{base}/page.html"), &[]).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, plain);
}

#[tokio::test]
async fn non_success_status_is_reported() {
    let handler: Handler = Arc::new(|_request: &FixtureRequest| FixtureResponse {
        status: 403,
        headers: vec![],
        body: b"denied".to_vec(),
    });
    let (base, _log) = spawn_server(handler).await;

    let client = HttpClient::new().unwrap();
    let dir = std::env::temp_dir().join(format!("ytdlpp_403_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("denied.bin");

    let err = client
        .download_file(&format!("{base}/file.bin"), &path, |_, _| {})
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "http_error");

    std::fs::remove_dir_all(&dir).unwrap();
}
