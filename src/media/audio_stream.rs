//! PCM audio streaming: a background decoder feeding a bounded chunk queue
//! consumed by async reads.
//!
//! One dedicated decoder thread per stream opens the source URL, decodes
//! the best audio track, resamples and re-lays channels to the requested
//! layout, and packs fixed-size byte chunks into the queue. The queue is
//! the backpressure boundary: a fast producer blocks until the consumer
//! frees space, so memory stays bounded by the queue depth.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::sync::Notify;
use tracing::{debug, error};

use super::remote_source::RemoteSource;
use super::resampler::{remap_channels, Resampler};
use crate::common::{Error, Result};
use crate::http::HttpClient;

const QUEUE_DEPTH: usize = 32;
const CHUNK_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    #[default]
    S16Le,
    F32Le,
}

#[derive(Debug, Clone, Copy)]
pub struct AudioStreamOptions {
    pub sample_rate: u32,
    pub channels: usize,
    pub sample_format: SampleFormat,
}

impl Default for AudioStreamOptions {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            sample_format: SampleFormat::S16Le,
        }
    }
}

struct QueueState {
    chunks: VecDeque<Vec<u8>>,
    eof: bool,
    cancelled: bool,
}

/// Bounded FIFO bridging the blocking producer and the async consumer.
/// `eof` transitions false→true exactly once; after `cancel` all pushes
/// are dropped and any pending read completes with a cancellation error.
/// At most one read may be pending at a time.
pub(crate) struct ChunkQueue {
    state: Mutex<QueueState>,
    space: Condvar,
    data: Notify,
    capacity: usize,
}

impl ChunkQueue {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                chunks: VecDeque::new(),
                eof: false,
                cancelled: false,
            }),
            space: Condvar::new(),
            data: Notify::new(),
            capacity,
        }
    }

    /// Producer side; blocks while the queue is full. Returns `false` once
    /// the stream is cancelled.
    fn push(&self, chunk: Vec<u8>) -> bool {
        let mut state = self.state.lock();
        while state.chunks.len() >= self.capacity && !state.cancelled {
            self.space.wait(&mut state);
        }
        if state.cancelled {
            return false;
        }
        state.chunks.push_back(chunk);
        drop(state);
        self.data.notify_one();
        true
    }

    fn set_eof(&self) {
        let mut state = self.state.lock();
        state.eof = true;
        drop(state);
        self.data.notify_one();
    }

    fn cancel(&self) {
        let mut state = self.state.lock();
        if state.cancelled {
            return;
        }
        state.cancelled = true;
        drop(state);
        self.space.notify_all();
        self.data.notify_one();
    }

    fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let notified = self.data.notified();
            {
                let mut state = self.state.lock();
                if state.cancelled {
                    return Err(Error::Cancelled);
                }
                if let Some(front) = state.chunks.front_mut() {
                    let n = buf.len().min(front.len());
                    buf[..n].copy_from_slice(&front[..n]);
                    if n == front.len() {
                        state.chunks.pop_front();
                    } else {
                        front.drain(..n);
                    }
                    drop(state);
                    self.space.notify_one();
                    return Ok(n);
                }
                if state.eof {
                    return Ok(0);
                }
            }
            notified.await;
        }
    }

    async fn read_alloc(&self) -> Result<Vec<u8>> {
        loop {
            let notified = self.data.notified();
            {
                let mut state = self.state.lock();
                if state.cancelled {
                    return Err(Error::Cancelled);
                }
                if let Some(chunk) = state.chunks.pop_front() {
                    drop(state);
                    self.space.notify_one();
                    return Ok(chunk);
                }
                if state.eof {
                    return Ok(Vec::new());
                }
            }
            notified.await;
        }
    }
}

/// A live PCM stream. Dropping it cancels the decoder.
pub struct AudioStream {
    queue: Arc<ChunkQueue>,
    cancel: Arc<AtomicBool>,
}

impl AudioStream {
    /// Copy up to `buf.len()` decoded bytes. Returns 0 at end of stream.
    /// A read while another read is pending is unsupported.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.queue.read(buf).await
    }

    /// Take the next whole chunk; empty at end of stream.
    pub async fn read_alloc(&self) -> Result<Vec<u8>> {
        self.queue.read_alloc().await
    }

    /// Thread-safe. The decoder observes the flag through its interrupt
    /// hook, so blocking I/O inside the media layer returns promptly; a
    /// pending read completes with a cancellation error.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.queue.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.queue.is_cancelled()
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Stream factory; owns nothing but the HTTP engine handle.
pub struct AudioStreamer {
    http: HttpClient,
}

impl AudioStreamer {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Start decoding `url` into PCM with the requested layout. The decoder
    /// runs on its own thread; failures surface as an early end of stream.
    pub fn open(&self, url: &str, options: AudioStreamOptions) -> Result<AudioStream> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::Unknown("audio streams need a live async runtime".into()))?;

        let queue = Arc::new(ChunkQueue::new(QUEUE_DEPTH));
        let cancel = Arc::new(AtomicBool::new(false));

        let client = self.http.inner().clone();
        let url = url.to_string();
        let thread_queue = queue.clone();
        let thread_cancel = cancel.clone();

        std::thread::Builder::new()
            .name("pcm-decoder".into())
            .spawn(move || {
                if let Err(e) =
                    decode_loop(client, handle, &url, options, &thread_queue, &thread_cancel)
                {
                    error!("audio decode failed: {e}");
                }
                thread_queue.set_eof();
            })
            .map_err(|e| Error::Unknown(format!("could not spawn decoder thread: {e}")))?;

        Ok(AudioStream { queue, cancel })
    }
}

fn hint_for(url: &str) -> Hint {
    let mut hint = Hint::new();
    let path = url.split('?').next().unwrap_or(url);
    if let Some(ext) = std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
    {
        match ext.to_ascii_lowercase().as_str() {
            "mp3" => {
                hint.with_extension("mp3");
            }
            "m4a" | "mp4" | "3gp" | "mov" => {
                hint.with_extension("m4a");
            }
            "ogg" | "opus" => {
                hint.with_extension("ogg");
            }
            "flac" => {
                hint.with_extension("flac");
            }
            "wav" => {
                hint.with_extension("wav");
            }
            "mkv" | "webm" => {
                hint.with_extension("mkv");
            }
            _ => {}
        }
    }
    hint
}

fn pack_samples(samples: &[f32], format: SampleFormat, out: &mut Vec<u8>) {
    match format {
        SampleFormat::S16Le => {
            for &sample in samples {
                let clamped = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
                out.extend_from_slice(&clamped.to_le_bytes());
            }
        }
        SampleFormat::F32Le => {
            for &sample in samples {
                out.extend_from_slice(&sample.to_le_bytes());
            }
        }
    }
}

fn decode_loop(
    client: reqwest::Client,
    handle: tokio::runtime::Handle,
    url: &str,
    options: AudioStreamOptions,
    queue: &Arc<ChunkQueue>,
    cancel: &Arc<AtomicBool>,
) -> crate::common::types::AnyResult<()> {
    let source = RemoteSource::open(client, handle, url, cancel.clone())?;
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let probed = symphonia::default::get_probe().format(
        &hint_for(url),
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or("no audio track found")?;
    let track_id = track.id;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let source_rate = track.codec_params.sample_rate.unwrap_or(48_000);
    let source_channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);
    debug!(
        "decoding {source_rate}Hz/{source_channels}ch -> {}Hz/{}ch",
        options.sample_rate, options.channels
    );

    let mut resampler = (source_rate != options.sample_rate)
        .then(|| Resampler::new(source_rate, options.sample_rate, options.channels));

    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut pending = Vec::with_capacity(CHUNK_BYTES * 2);
    let mut resampled = Vec::new();

    loop {
        if cancel.load(Ordering::SeqCst) {
            return Ok(());
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::Interrupted =>
            {
                return Ok(());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("packet error: {e}");
                continue;
            }
            Err(_) => break,
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("decode error: {e}");
                continue;
            }
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::Interrupted =>
            {
                return Ok(());
            }
            Err(_) => break,
        };

        let spec = *decoded.spec();
        if sample_buf.is_none() {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        let buf = sample_buf.as_mut().expect("buffer was just created");
        buf.copy_interleaved_ref(decoded);

        let laid_out = remap_channels(buf.samples(), spec.channels.count(), options.channels);
        let samples: &[f32] = match &mut resampler {
            Some(resampler) => {
                resampled.clear();
                resampler.process(&laid_out, &mut resampled);
                &resampled
            }
            None => &laid_out,
        };

        pack_samples(samples, options.sample_format, &mut pending);
        while pending.len() >= CHUNK_BYTES {
            let chunk: Vec<u8> = pending.drain(..CHUNK_BYTES).collect();
            if !queue.push(chunk) {
                return Ok(());
            }
        }
    }

    if !pending.is_empty() {
        queue.push(std::mem::take(&mut pending));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn read_returns_pushed_bytes_then_eof() {
        let queue = Arc::new(ChunkQueue::new(4));
        queue.push(vec![1, 2, 3, 4]);
        queue.set_eof();

        let mut buf = [0u8; 2];
        assert_eq!(queue.read(&mut buf).await.unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(queue.read(&mut buf).await.unwrap(), 2);
        assert_eq!(buf, [3, 4]);
        assert_eq!(queue.read(&mut buf).await.unwrap(), 0);
        // EOF is sticky.
        assert_eq!(queue.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn read_alloc_returns_whole_chunks() {
        let queue = Arc::new(ChunkQueue::new(4));
        queue.push(vec![9; 8]);
        queue.set_eof();
        assert_eq!(queue.read_alloc().await.unwrap(), vec![9; 8]);
        assert!(queue.read_alloc().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn producer_blocks_until_consumer_frees_space() {
        let queue = Arc::new(ChunkQueue::new(2));
        queue.push(vec![0]);
        queue.push(vec![1]);

        let producer = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.push(vec![2]))
        };
        // The producer must be parked on the full queue.
        std::thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished());

        let mut buf = [0u8; 1];
        queue.read(&mut buf).await.unwrap();
        assert!(producer.join().unwrap());
    }

    #[tokio::test]
    async fn cancel_completes_pending_read_promptly() {
        let queue = Arc::new(ChunkQueue::new(2));

        let reader = {
            let queue = queue.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4];
                queue.read(&mut buf).await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("pending read did not complete after cancel")
            .unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn pushes_after_cancel_are_dropped() {
        let queue = Arc::new(ChunkQueue::new(2));
        queue.cancel();
        assert!(!queue.push(vec![1]));
        let mut buf = [0u8; 1];
        assert!(matches!(queue.read(&mut buf).await, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn cancel_unblocks_a_full_producer() {
        let queue = Arc::new(ChunkQueue::new(1));
        queue.push(vec![0]);

        let producer = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.push(vec![1]))
        };
        std::thread::sleep(Duration::from_millis(50));
        queue.cancel();
        assert!(!producer.join().unwrap());
    }

    #[test]
    fn sample_packing() {
        let mut out = Vec::new();
        pack_samples(&[0.0, 1.0, -1.0], SampleFormat::S16Le, &mut out);
        assert_eq!(out.len(), 6);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), 32767);
        assert_eq!(i16::from_le_bytes([out[4], out[5]]), -32767);

        let mut out = Vec::new();
        pack_samples(&[0.5], SampleFormat::F32Le, &mut out);
        assert_eq!(f32::from_le_bytes([out[0], out[1], out[2], out[3]]), 0.5);
    }
}
