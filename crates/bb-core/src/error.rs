//! Error types for the Backbeat engine
//!
//! Control-plane APIs return [`EngineResult`]; the audio thread never raises.
//! DSP edge cases are clamped on the audio thread and reported as counters
//! over the reverse ring instead of unwinding.

use thiserror::Error;

/// Engine error taxonomy
#[derive(Error, Debug)]
pub enum EngineError {
    /// Value outside its documented range. The call fails, state is unchanged.
    #[error("invalid parameter `{name}`: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    /// Operation not valid in the current state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// A bounded resource (EQ bands, insert slots, control ring) is full.
    /// The caller may retry later.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(&'static str),

    /// Proposed bus routing would introduce a cycle. Mutation not applied.
    #[error("bus routing would create a cycle")]
    GraphCycle,

    /// WAV writer or sample supplier failure.
    #[error("io failure at `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Control ring was full after a bounded spin; the message was not sent.
    #[error("control ring full, message not delivered")]
    Backpressure,
}

impl EngineError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = EngineError::InvalidParameter {
            name: "bpm",
            value: 999.0,
        };
        assert!(e.to_string().contains("bpm"));
        assert!(EngineError::GraphCycle.to_string().contains("cycle"));
    }
}
