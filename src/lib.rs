//! Autoregressive diffusion rollout engine for interactive world models.
//!
//! Each tick renders the newest observation (decoding it first for latent models),
//! samples the next one with a fixed-schedule Euler solver over the rollout network,
//! and slides it into a fixed-size context window. Networks run behind the
//! [`inference::InferenceBackend`] boundary, with an accelerated backend preferred and a
//! portable one as fallback.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod frontend;
pub mod inference;
pub mod model;
pub mod source;

pub use config::{BackendMode, SessionConfig};
pub use engine::backend::Backends;
pub use engine::runner::WorldRunner;
pub use error::EngineError;
pub use model::{FrameDims, ModelCatalog, ModelConfig, ModelKind};
