pub mod audio_stream;
pub mod muxer;
mod remote_source;
mod resampler;

pub use audio_stream::{AudioStream, AudioStreamOptions, AudioStreamer, SampleFormat};
