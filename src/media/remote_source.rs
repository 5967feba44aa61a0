//! Blocking ranged HTTP reader used as the decoder's media source.
//!
//! Runs on the dedicated decoder thread and bridges into the async engine
//! with `Handle::block_on`. A shared cancel flag is checked before every
//! network operation so cancellation interrupts blocking reads promptly.

use std::io::{Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use symphonia::core::io::MediaSource;
use tracing::{debug, trace};

use crate::common::types::AnyResult;

const FETCH_CHUNK: u64 = 1024 * 1024;
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

pub struct RemoteSource {
    client: reqwest::Client,
    handle: tokio::runtime::Handle,
    url: String,
    cancel: Arc<AtomicBool>,
    len: u64,
    pos: u64,
    /// Last fetched window: absolute start offset + bytes.
    window_start: u64,
    window: Vec<u8>,
}

impl RemoteSource {
    /// Probe the resource length with a one-byte range request and set up
    /// the read cursor at zero.
    pub fn open(
        client: reqwest::Client,
        handle: tokio::runtime::Handle,
        url: &str,
        cancel: Arc<AtomicBool>,
    ) -> AnyResult<Self> {
        let probe = handle.block_on(async {
            client
                .get(url)
                .header("Range", "bytes=0-0")
                .timeout(FETCH_TIMEOUT)
                .send()
                .await
        })?;

        let len = probe
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit('/').next())
            .and_then(|v| v.parse::<u64>().ok())
            .or(probe.content_length())
            .ok_or("could not determine remote content length")?;

        debug!("opened remote source ({len} bytes)");

        Ok(Self {
            client,
            handle,
            url: url.to_string(),
            cancel,
            len,
            pos: 0,
            window_start: 0,
            window: Vec::new(),
        })
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn fetch_window(&mut self, offset: u64) -> std::io::Result<()> {
        if self.cancelled() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                "stream cancelled",
            ));
        }

        let end = (offset + FETCH_CHUNK - 1).min(self.len.saturating_sub(1));
        trace!("fetching remote window {offset}-{end}");

        let client = self.client.clone();
        let url = self.url.clone();
        let bytes = self.handle.block_on(async move {
            let response = client
                .get(&url)
                .header("Range", format!("bytes={offset}-{end}"))
                .header("Accept", "*/*")
                .timeout(FETCH_TIMEOUT)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(format!("range fetch failed: {}", response.status()).into());
            }
            let bytes = response.bytes().await?;
            Ok::<_, crate::common::types::AnyError>(bytes)
        });

        match bytes {
            Ok(bytes) => {
                self.window_start = offset;
                self.window = bytes.to_vec();
                Ok(())
            }
            Err(e) => Err(std::io::Error::other(e.to_string())),
        }
    }
}

impl Read for RemoteSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pos >= self.len {
            return Ok(0);
        }
        if self.cancelled() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                "stream cancelled",
            ));
        }

        let in_window = self.pos >= self.window_start
            && self.pos < self.window_start + self.window.len() as u64;
        if !in_window {
            self.fetch_window(self.pos)?;
        }

        let offset = (self.pos - self.window_start) as usize;
        let available = self.window.len().saturating_sub(offset);
        if available == 0 {
            return Ok(0);
        }
        let n = buf.len().min(available);
        buf[..n].copy_from_slice(&self.window[offset..offset + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for RemoteSource {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => p,
            SeekFrom::Current(delta) => self.pos.saturating_add_signed(delta),
            SeekFrom::End(delta) => self.len.saturating_add_signed(delta),
        };
        self.pos = target.min(self.len);
        Ok(self.pos)
    }
}

impl MediaSource for RemoteSource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.len)
    }
}
