//! bb-render: offline rendering and WAV encoding
//!
//! The offline renderer drives the same engine graph as real-time playback
//! with a synthetic clock, producing a deterministic interleaved buffer.
//! The WAV writer emits canonical RIFF/WAVE with integer PCM (16/24/32)
//! or 32-bit float payloads.

mod renderer;
mod wav;

pub use renderer::{RenderOptions, RenderOutput, render};
pub use wav::{WavFormat, encode_wav, wav_file_size, write_wav, write_wav_file};
