// Engine orchestration: the context window, sampling, decoding and the runner that ties them together.

pub mod backend;
pub mod context;
pub mod decoder;
pub mod lifecycle;
pub mod runner;
pub mod sampler;
pub mod stats;
