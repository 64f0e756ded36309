// Typed failure conditions that callers distinguish by downcasting an `anyhow::Error`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("a tick is already in flight")]
    TickInFlight,

    #[error("runner halted after a failed tick; reset to resume")]
    Halted,

    #[error("frame length {actual} does not match C*H*W = {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("tensor shape {shape:?} holds {expected} elements but data has {actual}")]
    TensorShape {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("inference output `{0}` missing")]
    MissingOutput(String),

    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),

    #[error("session already released")]
    SessionReleased,
}
