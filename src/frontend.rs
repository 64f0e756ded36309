// Presentation and input boundaries the runner talks to.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use anyhow::Result;

use crate::model::FrameDims;

/// Receives each frame for display.
///
/// `frame` is planar channel-major (`C` planes of `H*W`) and is only valid for the
/// duration of the call; implementations copy what they need to keep.
pub trait FrameSink: Send {
    fn present(&mut self, frame: &[f32], dims: FrameDims) -> Result<()>;
}

/// Sink that drops every frame, for headless rollouts.
pub struct NullSink;

impl FrameSink for NullSink {
    fn present(&mut self, _frame: &[f32], _dims: FrameDims) -> Result<()> {
        Ok(())
    }
}

/// Supplies the action index to apply on each tick.
pub trait ActionSource: Send + Sync {
    fn current_action(&self) -> i64;
}

/// Action source backed by a shared atomic, set from any thread.
#[derive(Clone, Default)]
pub struct SharedAction(Arc<AtomicI64>);

impl SharedAction {
    pub fn new(initial: i64) -> Self {
        Self(Arc::new(AtomicI64::new(initial)))
    }

    pub fn set(&self, action: i64) {
        self.0.store(action, Ordering::Relaxed);
    }
}

impl ActionSource for SharedAction {
    fn current_action(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}
