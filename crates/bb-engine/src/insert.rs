//! Insert effect chain
//!
//! Up to 10 ordered slots per strip; slots form a dense sequence. Effects
//! are a tagged kind plus a boxed render capability: no inheritance
//! hierarchy, dispatch goes through one trait object per slot. Mutations
//! arrive through the control ring and are applied between blocks; the
//! displaced slot is handed back as garbage.

use bb_core::{EffectKind, EngineError, EngineResult, InsertConfig, MAX_INSERT_SLOTS, Sample};
use bb_dsp::effects::{FeedbackDelay, Reverb};
use bb_dsp::saturation::OversampledShaper;
use bb_dsp::{Processor, ProcessorConfig};

/// Render capability every insert effect exposes
pub trait EffectProcessor: Send {
    fn kind(&self) -> EffectKind;
    fn name(&self) -> &'static str;
    fn process(&mut self, left: &mut [Sample], right: &mut [Sample]);
    fn reset(&mut self);
    fn set_sample_rate(&mut self, sample_rate: f64);
    fn latency(&self) -> usize {
        0
    }
    fn num_params(&self) -> usize;
    fn set_param(&mut self, index: usize, value: f64);
    fn get_param(&self, index: usize) -> f64;
    fn param_name(&self, index: usize) -> &'static str;
}

// ============ Built-in effects ============

struct DelayEffect {
    inner: FeedbackDelay,
}

impl EffectProcessor for DelayEffect {
    fn kind(&self) -> EffectKind {
        EffectKind::Delay
    }

    fn name(&self) -> &'static str {
        "Delay"
    }

    fn process(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        self.inner.process_block(left, right);
    }

    fn reset(&mut self) {
        Processor::reset(&mut self.inner);
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        ProcessorConfig::set_sample_rate(&mut self.inner, sample_rate);
    }

    fn num_params(&self) -> usize {
        3
    }

    fn set_param(&mut self, index: usize, value: f64) {
        match index {
            0 => self.inner.set_time_ms(value),
            1 => self.inner.set_feedback(value),
            2 => self.inner.set_mix(value),
            _ => {}
        }
    }

    fn get_param(&self, index: usize) -> f64 {
        match index {
            0 => self.inner.time_ms(),
            1 => self.inner.feedback(),
            2 => self.inner.mix(),
            _ => 0.0,
        }
    }

    fn param_name(&self, index: usize) -> &'static str {
        ["time_ms", "feedback", "mix"].get(index).copied().unwrap_or("")
    }
}

struct ReverbEffect {
    inner: Reverb,
}

impl EffectProcessor for ReverbEffect {
    fn kind(&self) -> EffectKind {
        EffectKind::Reverb
    }

    fn name(&self) -> &'static str {
        "Reverb"
    }

    fn process(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        self.inner.process_block(left, right);
    }

    fn reset(&mut self) {
        Processor::reset(&mut self.inner);
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        ProcessorConfig::set_sample_rate(&mut self.inner, sample_rate);
    }

    fn num_params(&self) -> usize {
        3
    }

    fn set_param(&mut self, index: usize, value: f64) {
        match index {
            0 => self.inner.set_room_size(value),
            1 => self.inner.set_damp(value),
            2 => self.inner.set_mix(value),
            _ => {}
        }
    }

    fn get_param(&self, index: usize) -> f64 {
        match index {
            0 => self.inner.room_size(),
            1 => self.inner.damp(),
            2 => self.inner.mix(),
            _ => 0.0,
        }
    }

    fn param_name(&self, index: usize) -> &'static str {
        ["room_size", "damp", "mix"].get(index).copied().unwrap_or("")
    }
}

struct DistortionEffect {
    inner: OversampledShaper,
    drive_db: f64,
}

impl EffectProcessor for DistortionEffect {
    fn kind(&self) -> EffectKind {
        EffectKind::Distortion
    }

    fn name(&self) -> &'static str {
        "Distortion"
    }

    fn process(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        self.inner.process_block(left, right);
    }

    fn reset(&mut self) {
        Processor::reset(&mut self.inner);
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        ProcessorConfig::set_sample_rate(&mut self.inner, sample_rate);
    }

    fn latency(&self) -> usize {
        Processor::latency(&self.inner)
    }

    fn num_params(&self) -> usize {
        2
    }

    fn set_param(&mut self, index: usize, value: f64) {
        match index {
            0 => {
                self.drive_db = value;
                self.inner.set_drive_db(value);
            }
            1 => self.inner.set_mix(value),
            _ => {}
        }
    }

    fn get_param(&self, index: usize) -> f64 {
        match index {
            0 => self.drive_db,
            1 => self.inner.mix(),
            _ => 0.0,
        }
    }

    fn param_name(&self, index: usize) -> &'static str {
        ["drive_db", "mix"].get(index).copied().unwrap_or("")
    }
}

/// Construct a built-in effect. `seed` only matters for the reverb, whose
/// early-reflection taps must be reproducible for deterministic renders.
pub fn build_effect(kind: EffectKind, sample_rate: f64, seed: u64) -> Box<dyn EffectProcessor> {
    match kind {
        EffectKind::Delay => Box::new(DelayEffect {
            inner: FeedbackDelay::new(sample_rate),
        }),
        EffectKind::Reverb => Box::new(ReverbEffect {
            inner: Reverb::new(sample_rate, seed),
        }),
        EffectKind::Distortion => {
            let mut inner = OversampledShaper::new();
            inner.set_drive_db(6.0);
            Box::new(DistortionEffect {
                inner,
                drive_db: 6.0,
            })
        }
    }
}

/// One occupied insert slot
pub struct EffectSlot {
    pub processor: Box<dyn EffectProcessor>,
    pub enabled: bool,
    pub bypass: bool,
}

impl EffectSlot {
    pub fn new(processor: Box<dyn EffectProcessor>) -> Self {
        Self {
            processor,
            enabled: true,
            bypass: false,
        }
    }

    #[inline]
    fn active(&self) -> bool {
        self.enabled && !self.bypass
    }
}

/// Dense, ordered chain of up to 10 slots
pub struct InsertChain {
    slots: Vec<EffectSlot>,
    chain_bypass: bool,
}

impl Default for InsertChain {
    fn default() -> Self {
        Self::new()
    }
}

impl InsertChain {
    pub fn new() -> Self {
        Self {
            slots: Vec::with_capacity(MAX_INSERT_SLOTS),
            chain_bypass: false,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, position: usize) -> Option<&EffectSlot> {
        self.slots.get(position)
    }

    pub fn slot_mut(&mut self, position: usize) -> Option<&mut EffectSlot> {
        self.slots.get_mut(position)
    }

    /// Insert at `position` (or append). Slots stay dense.
    pub fn add(&mut self, slot: EffectSlot, position: Option<usize>) -> EngineResult<usize> {
        if self.slots.len() >= MAX_INSERT_SLOTS {
            return Err(EngineError::CapacityExceeded("insert slots"));
        }
        let position = position.unwrap_or(self.slots.len()).min(self.slots.len());
        self.slots.insert(position, slot);
        Ok(position)
    }

    pub fn remove(&mut self, position: usize) -> Option<EffectSlot> {
        if position < self.slots.len() {
            Some(self.slots.remove(position))
        } else {
            None
        }
    }

    pub fn reorder(&mut self, from: usize, to: usize) -> EngineResult<()> {
        if from >= self.slots.len() || to >= self.slots.len() {
            return Err(EngineError::InvalidParameter {
                name: "insert.reorder",
                value: from as f64,
            });
        }
        let slot = self.slots.remove(from);
        self.slots.insert(to, slot);
        Ok(())
    }

    pub fn set_bypass(&mut self, position: usize, bypass: bool) {
        if let Some(slot) = self.slots.get_mut(position) {
            slot.bypass = bypass;
        }
    }

    pub fn set_chain_bypass(&mut self, bypass: bool) {
        self.chain_bypass = bypass;
    }

    pub fn chain_bypassed(&self) -> bool {
        self.chain_bypass
    }

    pub fn set_param(&mut self, position: usize, param: usize, value: f64) {
        if let Some(slot) = self.slots.get_mut(position) {
            slot.processor.set_param(param, value);
        }
    }

    /// Total latency of active slots
    pub fn latency(&self) -> usize {
        if self.chain_bypass {
            return 0;
        }
        self.slots
            .iter()
            .filter(|s| s.active())
            .map(|s| s.processor.latency())
            .sum()
    }

    #[inline]
    pub fn process(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        if self.chain_bypass {
            return;
        }
        for slot in &mut self.slots {
            if slot.active() {
                slot.processor.process(left, right);
            }
        }
    }

    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.processor.reset();
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        for slot in &mut self.slots {
            slot.processor.set_sample_rate(sample_rate);
        }
    }

    /// Persisted shape: position, kind, flags, parameter values
    pub fn snapshot(&self) -> Vec<InsertConfig> {
        self.slots
            .iter()
            .enumerate()
            .map(|(position, slot)| InsertConfig {
                position,
                kind: slot.processor.kind(),
                enabled: slot.enabled,
                bypass: slot.bypass,
                params: (0..slot.processor.num_params())
                    .map(|i| slot.processor.get_param(i))
                    .collect(),
            })
            .collect()
    }

    pub fn from_snapshot(configs: &[InsertConfig], sample_rate: f64, seed: u64) -> Self {
        let mut chain = Self::new();
        let mut sorted: Vec<&InsertConfig> = configs.iter().collect();
        sorted.sort_by_key(|c| c.position);
        for config in sorted {
            let mut slot = EffectSlot::new(build_effect(config.kind, sample_rate, seed));
            slot.enabled = config.enabled;
            slot.bypass = config.bypass;
            for (i, &value) in config.params.iter().enumerate() {
                slot.processor.set_param(i, value);
            }
            let _ = chain.add(slot, None);
        }
        chain
    }
}
