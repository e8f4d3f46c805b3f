//! Offline renderer
//!
//! Drives a freshly spawned engine with a synthetic clock: the same graph
//! and scheduler as real-time playback, pulled block by block into a
//! growing buffer. Output is deterministic given identical session
//! contents, tempo, and seed. A cancellation flag is checked between
//! blocks; on cancel the result carries what was rendered so far with the
//! partial indicator set.

use std::sync::atomic::{AtomicBool, Ordering};

use bb_core::{EngineResult, SampleRate};
use bb_engine::Session;

/// Render request. The sample rate defaults to the session's.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub duration_seconds: f64,
    pub sample_rate: Option<SampleRate>,
    pub start_beats: f64,
    /// Stop the transport once this beat is reached; tails keep ringing
    /// until the duration runs out.
    pub end_beats: Option<f64>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            duration_seconds: 10.0,
            sample_rate: None,
            start_beats: 0.0,
            end_beats: None,
        }
    }
}

/// Interleaved stereo render result
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    /// False when the render was cancelled before the full duration
    pub completed: bool,
}

impl RenderOutput {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }
}

/// Render a session offline. The session is cloned into an isolated engine
/// instance, so a live session can keep streaming while this runs on its
/// own thread.
pub fn render(
    session: &Session,
    options: &RenderOptions,
    cancel: Option<&AtomicBool>,
) -> EngineResult<RenderOutput> {
    let mut session = session.clone();
    if let Some(rate) = options.sample_rate {
        session.config.sample_rate = rate;
    }
    let sample_rate = session.config.sample_rate.as_u32();
    let block_len = session.config.block_len;

    let (mut engine, _handle) = session.spawn()?;
    engine.seek(options.start_beats.max(0.0));
    engine.play();

    let total_frames = (options.duration_seconds.max(0.0) * sample_rate as f64).ceil() as usize;
    let blocks = total_frames.div_ceil(block_len);
    let mut samples = Vec::with_capacity(blocks * block_len * 2);
    let mut block = vec![0.0f32; block_len * 2];
    let mut completed = true;

    log::debug!(
        "offline render: {total_frames} frames in {blocks} blocks at {sample_rate} Hz"
    );

    for i in 0..blocks {
        if let Some(flag) = cancel {
            if flag.load(Ordering::Relaxed) {
                completed = false;
                break;
            }
        }
        if let Some(end) = options.end_beats {
            if engine.position_beats() >= end {
                engine.stop();
            }
        }
        engine.process(&mut block);
        samples.extend_from_slice(&block);
        if i % 256 == 0 {
            log::trace!("rendered block {i}/{blocks}");
        }
    }

    if completed {
        samples.truncate(total_frames * 2);
    }
    Ok(RenderOutput {
        samples,
        sample_rate,
        channels: 2,
        completed,
    })
}
