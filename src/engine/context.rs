// Rolling window of past observations and actions consumed by the rollout network.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::model::FrameDims;
use crate::source::snapshot::InitialState;

/// Read-only view of the full temporal window, valid until the next `advance`.
#[derive(Debug, Clone, Copy)]
pub struct WindowView<'a> {
    /// `T` frames of `C*H*W`, oldest first.
    pub observations: &'a [f32],
    /// `T` committed actions, oldest first. Slot `i` is the action applied from
    /// observation `i`.
    pub actions: &'a [u32],
    /// Action for the step being sampled; stands in for slot `T-1` of `actions`.
    pub pending_action: u32,
    pub t: usize,
    pub dims: FrameDims,
}

impl<'a> WindowView<'a> {
    /// The most recent frame (slot `T-1`).
    pub fn current(&self) -> &'a [f32] {
        let frame = self.dims.len();
        &self.observations[(self.t - 1) * frame..self.t * frame]
    }
}

pub struct ContextStore {
    dims: FrameDims,
    t: usize,
    num_actions: usize,
    observations: Vec<f32>,
    // Back buffer for the shift; swapped in as a whole so no reader sees a half-shifted window.
    spare: Vec<f32>,
    actions: Vec<u32>,
    pending_action: u32,
}

impl ContextStore {
    /// Zero-filled store for `t` frames of `dims`.
    pub fn new(t: usize, dims: FrameDims, num_actions: usize) -> Self {
        assert!(t > 0 && !dims.is_empty(), "context window must be non-empty");
        assert!(num_actions > 0, "num_actions must be > 0");
        let len = t * dims.len();
        Self {
            dims,
            t,
            num_actions,
            observations: vec![0.0; len],
            spare: vec![0.0; len],
            actions: vec![0; t],
            pending_action: 0,
        }
    }

    pub fn dims(&self) -> FrameDims {
        self.dims
    }

    pub fn window_len(&self) -> usize {
        self.t
    }

    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    /// The frame at slot `T-1`.
    pub fn current_observation(&self) -> (&[f32], FrameDims) {
        let frame = self.dims.len();
        let start = (self.t - 1) * frame;
        (&self.observations[start..start + frame], self.dims)
    }

    pub fn window(&self) -> WindowView<'_> {
        WindowView {
            observations: &self.observations,
            actions: &self.actions,
            pending_action: self.pending_action,
            t: self.t,
            dims: self.dims,
        }
    }

    pub fn observations(&self) -> &[f32] {
        &self.observations
    }

    pub fn actions(&self) -> &[u32] {
        &self.actions
    }

    pub fn clamp_action(&self, action: i64) -> u32 {
        action.clamp(0, self.num_actions as i64 - 1) as u32
    }

    /// Set the action for the next step. It conditions sampling as slot `T-1` and is
    /// committed to the window by the `advance` that follows.
    pub fn set_pending_action(&mut self, action: i64) -> u32 {
        self.pending_action = self.clamp_action(action);
        self.pending_action
    }

    pub fn pending_action(&self) -> u32 {
        self.pending_action
    }

    /// Commit one step: `action` was applied from the current frame and produced `next`.
    ///
    /// `action` lands in slot `T-2` next to the frame it was applied from. Slot `T-1`
    /// repeats it until the following step's pending action stands in for it.
    pub fn advance(&mut self, next: &[f32], action: i64) -> Result<()> {
        let frame = self.dims.len();
        if next.len() != frame {
            return Err(EngineError::ShapeMismatch {
                expected: frame,
                actual: next.len(),
            }
            .into());
        }
        let action = self.clamp_action(action);

        let keep = (self.t - 1) * frame;
        self.spare[..keep].copy_from_slice(&self.observations[frame..]);
        self.spare[keep..].copy_from_slice(next);
        std::mem::swap(&mut self.observations, &mut self.spare);

        self.actions[self.t - 1] = action;
        self.actions.rotate_left(1);
        self.actions[self.t - 1] = action;
        Ok(())
    }

    /// Copy in `snapshot` if it matches this store exactly, otherwise zero-fill.
    pub fn reset(&mut self, snapshot: Option<&InitialState>) {
        if let Some(state) = snapshot {
            match self.check_snapshot(state) {
                Ok(()) => {
                    self.observations.copy_from_slice(&state.obs_buffer);
                    for (slot, a) in self.actions.iter_mut().zip(&state.act_buffer) {
                        *slot = *a as u32;
                    }
                    info!("initial state loaded");
                    return;
                }
                Err(reason) => warn!("initial state rejected: {}", reason),
            }
        }
        debug!("context zero-filled");
        self.observations.fill(0.0);
        self.actions.fill(0);
    }

    fn check_snapshot(&self, state: &InitialState) -> std::result::Result<(), String> {
        let (t, c, h, w) = state.shape_or(self.t, self.dims);
        if (t, c, h, w) != (self.t, self.dims.c, self.dims.h, self.dims.w) {
            return Err(format!(
                "shape T={} C={} H={} W={} does not match T={} C={} H={} W={}",
                t, c, h, w, self.t, self.dims.c, self.dims.h, self.dims.w
            ));
        }
        if state.obs_buffer.len() != self.observations.len() {
            return Err(format!(
                "obs_buffer has {} values, expected {}",
                state.obs_buffer.len(),
                self.observations.len()
            ));
        }
        if state.act_buffer.len() != self.t {
            return Err(format!(
                "act_buffer has {} values, expected {}",
                state.act_buffer.len(),
                self.t
            ));
        }
        if state.obs_buffer.iter().any(|v| !v.is_finite()) {
            return Err("obs_buffer contains non-finite values".to_string());
        }
        if let Some(a) = state
            .act_buffer
            .iter()
            .find(|a| **a < 0 || **a >= self.num_actions as i64)
        {
            return Err(format!("action {} outside [0, {})", a, self.num_actions));
        }
        Ok(())
    }
}
