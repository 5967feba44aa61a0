//! Chunked, resumable file download over ranged GETs.
//!
//! Protocol: HEAD probe for the total size, then 2 MiB `Range` requests
//! appended sequentially to the output file. Servers that ignore `Range`
//! (200 on the first chunk) degrade to a single full-body transfer. A chunk
//! that fails on transport or a 5xx is retried once from the current offset
//! before the error surfaces.

use std::io::SeekFrom;
use std::path::Path;

use reqwest::header::{HeaderMap, CONTENT_LENGTH, RANGE};
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use super::HttpClient;
use crate::common::{Error, Result};

pub const CHUNK_SIZE: u64 = 2 * 1024 * 1024;
const CHUNK_RETRIES: u32 = 1;

impl HttpClient {
    /// Download `url` into `path`, reporting `(bytes_now, bytes_total)` at
    /// producer pace. `bytes_total` is 0 while the size is unknown.
    pub async fn download_file<F>(&self, url: &str, path: &Path, mut progress: F) -> Result<()>
    where
        F: FnMut(u64, u64) + Send,
    {
        let target = super::parse_url(url)?;

        let total = self.probe_content_length(target.clone()).await;
        debug!("downloading {url} -> {} (total={total:?})", path.display());

        let mut file = File::create(path).await.map_err(|e| Error::FileOpen {
            path: path.to_path_buf(),
            source: e,
        })?;

        let Some(total) = total else {
            // Size unknown: stream one unranged GET to completion.
            let response = self.send_ranged(target, None).await?;
            if !response.status().is_success() {
                return Err(Error::HttpStatus {
                    status: response.status().as_u16(),
                    url: url.to_string(),
                });
            }
            let reported = content_length_of(response.headers()).unwrap_or(0);
            let mut offset = 0u64;
            write_body(response, &mut file, path, &mut offset, reported, &mut progress).await?;
            file.flush().await.map_err(|e| write_err(path, e))?;
            return Ok(());
        };

        let mut offset = 0u64;
        let mut first_range = true;
        let mut attempts = 0u32;

        while offset < total {
            let end = (offset + CHUNK_SIZE - 1).min(total - 1);
            let range = format!("bytes={offset}-{end}");
            let written_before = offset;

            let outcome = self.send_ranged(target.clone(), Some(&range)).await;
            let response = match outcome {
                Ok(r) => r,
                Err(e) => {
                    if attempts < CHUNK_RETRIES {
                        attempts += 1;
                        warn!("chunk at offset {offset} failed ({e}), retrying");
                        continue;
                    }
                    return Err(e);
                }
            };

            match response.status().as_u16() {
                206 => {
                    let wrote =
                        write_body(response, &mut file, path, &mut offset, total, &mut progress)
                            .await;
                    match wrote {
                        Ok(()) if offset == written_before => {
                            // A 206 with an empty body makes no forward
                            // progress; treat it like a transport fault.
                            if attempts < CHUNK_RETRIES {
                                attempts += 1;
                                warn!("empty 206 body at offset {offset}, retrying");
                                continue;
                            }
                            return Err(Error::RequestFailed(format!(
                                "server returned an empty 206 body at offset {offset}"
                            )));
                        }
                        Ok(()) => {}
                        Err(e) => {
                            // Partial chunks resume from the bytes already
                            // written; a stalled offset burns the retry.
                            if attempts < CHUNK_RETRIES {
                                attempts += 1;
                                warn!("chunk read at offset {offset} failed ({e}), retrying");
                                continue;
                            }
                            return Err(e);
                        }
                    }
                }
                200 if first_range => {
                    debug!("server ignored Range, restarting as full-body download");
                    file.set_len(0).await.map_err(|e| write_err(path, e))?;
                    file.seek(SeekFrom::Start(0))
                        .await
                        .map_err(|e| write_err(path, e))?;
                    offset = 0;
                    write_body(response, &mut file, path, &mut offset, total, &mut progress)
                        .await?;
                    break;
                }
                status @ (200 | 416) => {
                    if offset == total {
                        break;
                    }
                    return Err(Error::HttpStatus {
                        status,
                        url: url.to_string(),
                    });
                }
                status if (500..600).contains(&status) && attempts < CHUNK_RETRIES => {
                    attempts += 1;
                    warn!("chunk at offset {offset} got {status}, retrying");
                    continue;
                }
                status => {
                    return Err(Error::HttpStatus {
                        status,
                        url: url.to_string(),
                    });
                }
            }

            if offset > written_before {
                attempts = 0;
            }
            first_range = false;
        }

        file.flush().await.map_err(|e| write_err(path, e))?;
        Ok(())
    }

    /// HEAD probe. Servers that reject HEAD (or omit the length) leave the
    /// total unknown; the download proceeds unranged.
    async fn probe_content_length(&self, url: url::Url) -> Option<u64> {
        let response = self.inner().head(url).send().await.ok()?;
        if response.status().as_u16() != 200 {
            return None;
        }
        content_length_of(response.headers())
    }

    async fn send_ranged(&self, url: url::Url, range: Option<&str>) -> Result<reqwest::Response> {
        let host = url.host_str().map(str::to_string);
        let mut request = self.inner().get(url).header("Accept", "*/*");
        if let Some(range) = range {
            request = request.header(RANGE, range);
        }
        request.send().await.map_err(|e| {
            if let Some(host) = host {
                self.dns().invalidate(&host);
            }
            Error::RequestFailed(e.to_string())
        })
    }
}

async fn write_body<F>(
    mut response: reqwest::Response,
    file: &mut File,
    path: &Path,
    offset: &mut u64,
    total: u64,
    progress: &mut F,
) -> Result<()>
where
    F: FnMut(u64, u64) + Send,
{
    loop {
        let chunk = response
            .chunk()
            .await
            .map_err(|e| Error::RequestFailed(e.to_string()))?;
        let Some(chunk) = chunk else { break };
        file.write_all(&chunk)
            .await
            .map_err(|e| write_err(path, e))?;
        *offset += chunk.len() as u64;
        progress(*offset, total);
    }
    Ok(())
}

fn write_err(path: &Path, source: std::io::Error) -> Error {
    Error::FileWrite {
        path: path.to_path_buf(),
        source,
    }
}

fn content_length_of(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
}
