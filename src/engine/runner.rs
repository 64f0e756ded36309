// World-model runner: owns the network sessions and drives the per-frame tick.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::backend::{BackendSelector, Backends};
use super::context::ContextStore;
use super::decoder::LatentDecoder;
use super::lifecycle::ModelSession;
use super::sampler::DiffusionSampler;
use super::stats::{FrameStats, StatsSnapshot};
use crate::config::SessionConfig;
use crate::error::EngineError;
use crate::frontend::{ActionSource, FrameSink};
use crate::inference::BackendKind;
use crate::model::{FrameDims, ModelConfig};
use crate::source::snapshot::{load_initial_state, snapshot_source_for, InitialState};

struct RolloutState {
    context: ContextStore,
    sampler: DiffusionSampler,
    decoder: Option<LatentDecoder>,
    renderer: Box<dyn FrameSink>,
}

pub struct WorldRunner {
    config: ModelConfig,
    denoiser: ModelSession,
    decoder: Option<ModelSession>,
    pending_action: AtomicI64,
    halted: AtomicBool,
    state: Mutex<RolloutState>,
    stats: FrameStats,
}

impl WorldRunner {
    /// Open the rollout (and, for latent models, decoder) sessions and load the initial state.
    pub async fn start(
        config: ModelConfig,
        session_config: SessionConfig,
        backends: Backends,
        renderer: Box<dyn FrameSink>,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            "loading {} (T={} C={} H={} W={})",
            config.name, config.t, config.c, config.h, config.w
        );

        let sampler = DiffusionSampler::new(&config.denoiser, session_config.seed)?;
        let mut selector = BackendSelector::new(backends, &session_config);

        let (session, kind) = selector
            .open("denoiser", &config.denoiser_path, config.reduced_precision)
            .await?;
        let denoiser = ModelSession::new("denoiser", session, kind);

        let (decoder_session, decoder) = match config.decoder() {
            Some(dec) => match selector
                .open("decoder", &dec.path, config.reduced_precision)
                .await
            {
                Ok((session, kind)) => (
                    Some(ModelSession::new("decoder", session, kind)),
                    Some(LatentDecoder::new(dec, config.frame_dims())),
                ),
                Err(e) => {
                    denoiser.release().await;
                    return Err(e);
                }
            },
            None => (None, None),
        };

        let mut context = ContextStore::new(config.t, config.frame_dims(), config.num_actions);
        let snapshot = load_snapshot(&config).await;
        context.reset(snapshot.as_ref());
        context.set_pending_action(config.default_action as i64);

        info!("{} ready ({})", config.name, denoiser.backend());

        Ok(Self {
            pending_action: AtomicI64::new(config.default_action as i64),
            halted: AtomicBool::new(false),
            stats: FrameStats::new(session_config.frame_budget()),
            denoiser,
            decoder: decoder_session,
            state: Mutex::new(RolloutState {
                context,
                sampler,
                decoder,
                renderer,
            }),
            config,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Backend the rollout session runs on.
    pub fn backend(&self) -> BackendKind {
        self.denoiser.backend()
    }

    pub fn decoder_backend(&self) -> Option<BackendKind> {
        self.decoder.as_ref().map(ModelSession::backend)
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Latch the action for the next tick, clamped to `[0, num_actions - 1]`.
    pub fn input_action(&self, action: i64) {
        let action = action.clamp(0, self.config.num_actions as i64 - 1);
        self.pending_action.store(action, Ordering::Relaxed);
    }

    pub fn pending_action(&self) -> i64 {
        self.pending_action.load(Ordering::Relaxed)
    }

    /// Render the current observation, then sample and commit the next one.
    ///
    /// Rejects with `EngineError::TickInFlight` if another tick is running. A failed tick
    /// leaves the context untouched and halts the runner until `reset`.
    pub async fn tick(&self) -> Result<()> {
        let mut state = self
            .state
            .try_lock()
            .map_err(|_| EngineError::TickInFlight)?;
        if self.is_halted() {
            return Err(EngineError::Halted.into());
        }

        let t0 = Instant::now();
        match self.step(&mut state).await {
            Ok(sample_time) => {
                let total = t0.elapsed();
                if self.stats.record_tick(total, sample_time) {
                    debug!(
                        "tick {} over budget: {:.1}ms",
                        self.stats.ticks(),
                        total.as_secs_f64() * 1000.0
                    );
                }
                Ok(())
            }
            Err(e) => {
                self.halted.store(true, Ordering::Release);
                self.stats.record_failure();
                error!("tick failed: {:#}", e);
                Err(e)
            }
        }
    }

    async fn step(&self, state: &mut RolloutState) -> Result<Duration> {
        let RolloutState {
            context,
            sampler,
            decoder,
            renderer,
        } = state;

        let (obs, dims) = context.current_observation();
        match decoder {
            Some(decoder) => {
                let session = self
                    .decoder
                    .as_ref()
                    .and_then(ModelSession::get)
                    .ok_or(EngineError::SessionReleased)?;
                let out_dims = decoder.output_dims();
                let t = Instant::now();
                let image = decoder.decode(session.as_ref(), obs).await?;
                self.stats.record_decode(t.elapsed());
                renderer
                    .present(image, out_dims)
                    .context("present decoded frame")?;
            }
            None => renderer.present(obs, dims).context("present frame")?,
        }

        let action = context.set_pending_action(self.pending_action.load(Ordering::Relaxed));
        let session = self.denoiser.get().ok_or(EngineError::SessionReleased)?;

        let t = Instant::now();
        let next = sampler.sample(session.as_ref(), context.window()).await?;
        let sample_time = t.elapsed();

        context.advance(next, action as i64)?;
        Ok(sample_time)
    }

    /// Run `f` on the current observation.
    ///
    /// The window is owned by the tick, so this waits out any tick in flight, including
    /// its network calls. Use [`WorldRunner::try_with_current_observation`] from callers
    /// that must not wait.
    pub async fn with_current_observation<R>(&self, f: impl FnOnce(&[f32], FrameDims) -> R) -> R {
        let state = self.state.lock().await;
        let (obs, dims) = state.context.current_observation();
        f(obs, dims)
    }

    /// Like [`WorldRunner::with_current_observation`], but returns `None` instead of
    /// waiting when a tick is in flight.
    pub fn try_with_current_observation<R>(
        &self,
        f: impl FnOnce(&[f32], FrameDims) -> R,
    ) -> Option<R> {
        let state = self.state.try_lock().ok()?;
        let (obs, dims) = state.context.current_observation();
        Some(f(obs, dims))
    }

    /// Reload the initial state and clear a halt.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        let snapshot = load_snapshot(&self.config).await;
        state.context.reset(snapshot.as_ref());
        self.halted.store(false, Ordering::Release);
        info!("{} reset", self.config.name);
    }

    /// Tick until `cancel` fires or a tick fails, pacing to `frame_interval` if given.
    ///
    /// Returns the number of completed ticks.
    pub async fn run(
        &self,
        actions: &dyn ActionSource,
        frame_interval: Option<Duration>,
        cancel: CancellationToken,
    ) -> Result<u64> {
        let mut frames = 0u64;
        let mut fps_frames = 0u64;
        let mut fps_at = Instant::now();

        while !cancel.is_cancelled() {
            let started = Instant::now();
            self.input_action(actions.current_action());
            self.tick().await?;
            frames += 1;
            fps_frames += 1;

            let elapsed = fps_at.elapsed();
            if elapsed >= Duration::from_secs(1) {
                info!("{:.1} fps", fps_frames as f64 / elapsed.as_secs_f64());
                fps_frames = 0;
                fps_at = Instant::now();
            }

            match frame_interval {
                Some(interval) => {
                    let spent = started.elapsed();
                    if spent < interval {
                        tokio::select! {
                            _ = tokio::time::sleep(interval - spent) => {}
                            _ = cancel.cancelled() => break,
                        }
                    }
                }
                None => tokio::task::yield_now().await,
            }
        }

        info!("run loop stopped after {} frames", frames);
        Ok(frames)
    }

    /// Release the decoder and rollout sessions. Safe to call more than once.
    pub async fn shutdown(&self) {
        let _state = self.state.lock().await;
        if let Some(decoder) = &self.decoder {
            decoder.release().await;
        }
        self.denoiser.release().await;
        self.halted.store(true, Ordering::Release);
    }
}

async fn load_snapshot(config: &ModelConfig) -> Option<InitialState> {
    let location = config.init_state.as_deref()?;
    load_initial_state(snapshot_source_for(location).as_ref()).await
}
