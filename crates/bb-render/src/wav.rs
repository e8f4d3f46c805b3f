//! Canonical RIFF/WAVE writer
//!
//! Little-endian throughout. Integer PCM uses format code 1, 32-bit float
//! uses code 3. 24-bit packs three bytes per sample, least significant
//! first. Output size is always `44 + frames * channels * bytes_per_sample`.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use bb_core::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavFormat {
    Pcm16,
    Pcm24,
    Pcm32,
    Float32,
}

impl WavFormat {
    pub fn bits_per_sample(self) -> u16 {
        match self {
            WavFormat::Pcm16 => 16,
            WavFormat::Pcm24 => 24,
            WavFormat::Pcm32 | WavFormat::Float32 => 32,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        self.bits_per_sample() as usize / 8
    }

    /// fmt-chunk format code: 1 = integer PCM, 3 = IEEE float
    pub fn format_code(self) -> u16 {
        match self {
            WavFormat::Float32 => 3,
            _ => 1,
        }
    }
}

/// Total file size in bytes for a sample count
pub fn wav_file_size(frames: usize, channels: u16, format: WavFormat) -> usize {
    44 + frames * channels as usize * format.bytes_per_sample()
}

/// Write interleaved samples as a RIFF/WAVE stream. `samples.len()` must be
/// a multiple of `channels`.
pub fn write_wav<W: Write>(
    mut writer: W,
    samples: &[f32],
    channels: u16,
    sample_rate: u32,
    format: WavFormat,
) -> io::Result<()> {
    let bytes_per_sample = format.bytes_per_sample();
    let data_size = (samples.len() * bytes_per_sample) as u32;
    let byte_rate = sample_rate * channels as u32 * bytes_per_sample as u32;
    let block_align = channels * bytes_per_sample as u16;

    writer.write_all(b"RIFF")?;
    writer.write_all(&(36 + data_size).to_le_bytes())?;
    writer.write_all(b"WAVE")?;

    writer.write_all(b"fmt ")?;
    writer.write_all(&16u32.to_le_bytes())?;
    writer.write_all(&format.format_code().to_le_bytes())?;
    writer.write_all(&channels.to_le_bytes())?;
    writer.write_all(&sample_rate.to_le_bytes())?;
    writer.write_all(&byte_rate.to_le_bytes())?;
    writer.write_all(&block_align.to_le_bytes())?;
    writer.write_all(&format.bits_per_sample().to_le_bytes())?;

    writer.write_all(b"data")?;
    writer.write_all(&data_size.to_le_bytes())?;

    match format {
        WavFormat::Pcm16 => {
            for &sample in samples {
                let value = (f64::from(sample).clamp(-1.0, 1.0) * 32767.0).round() as i16;
                writer.write_all(&value.to_le_bytes())?;
            }
        }
        WavFormat::Pcm24 => {
            for &sample in samples {
                let value = (f64::from(sample).clamp(-1.0, 1.0) * 8_388_607.0).round() as i32;
                let bytes = value.to_le_bytes();
                writer.write_all(&bytes[..3])?;
            }
        }
        WavFormat::Pcm32 => {
            for &sample in samples {
                let value =
                    (f64::from(sample).clamp(-1.0, 1.0) * 2_147_483_647.0).round() as i32;
                writer.write_all(&value.to_le_bytes())?;
            }
        }
        WavFormat::Float32 => {
            for &sample in samples {
                writer.write_all(&sample.to_le_bytes())?;
            }
        }
    }

    writer.flush()
}

/// Encode to an in-memory byte buffer
pub fn encode_wav(
    samples: &[f32],
    channels: u16,
    sample_rate: u32,
    format: WavFormat,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(wav_file_size(
        samples.len() / channels.max(1) as usize,
        channels,
        format,
    ));
    // Writing into a Vec cannot fail
    write_wav(&mut out, samples, channels, sample_rate, format)
        .expect("in-memory wav write cannot fail");
    out
}

/// Write a WAV file; IO failures surface with the offending path.
pub fn write_wav_file(
    path: &Path,
    samples: &[f32],
    channels: u16,
    sample_rate: u32,
    format: WavFormat,
) -> EngineResult<()> {
    let file = File::create(path).map_err(|e| EngineError::io(path.display().to_string(), e))?;
    let writer = BufWriter::new(file);
    write_wav(writer, samples, channels, sample_rate, format)
        .map_err(|e| EngineError::io(path.display().to_string(), e))
}
