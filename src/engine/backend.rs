// Backend selection. Prefers the accelerated path and falls back to the portable one.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::{BackendMode, SessionConfig};
use crate::inference::{
    BackendCapabilities, BackendKind, InferenceBackend, InferenceSession, SessionOptions,
};

/// The execution backends available to a runner.
#[derive(Clone)]
pub struct Backends {
    pub accelerated: Option<Arc<dyn InferenceBackend>>,
    pub portable: Arc<dyn InferenceBackend>,
}

impl Backends {
    pub fn new(
        accelerated: Option<Arc<dyn InferenceBackend>>,
        portable: Arc<dyn InferenceBackend>,
    ) -> Self {
        Self {
            accelerated,
            portable,
        }
    }

    pub fn portable_only(portable: Arc<dyn InferenceBackend>) -> Self {
        Self::new(None, portable)
    }
}

/// Chooses a backend per session. The accelerated probe runs at most once per selector.
pub struct BackendSelector {
    backends: Backends,
    mode: BackendMode,
    threads: usize,
    probed: Option<BackendCapabilities>,
}

impl BackendSelector {
    pub fn new(backends: Backends, config: &SessionConfig) -> Self {
        Self {
            backends,
            mode: config.backend_mode,
            threads: config.threads(),
            probed: None,
        }
    }

    /// Capabilities of the accelerated backend. A probe error counts as "unavailable".
    pub async fn accelerated_capabilities(&mut self) -> BackendCapabilities {
        if let Some(caps) = self.probed {
            return caps;
        }
        let caps = match &self.backends.accelerated {
            Some(backend) => match backend.probe().await {
                Ok(caps) => caps,
                Err(e) => {
                    warn!("accelerated backend probe failed: {:#}", e);
                    BackendCapabilities::default()
                }
            },
            None => BackendCapabilities::default(),
        };
        info!(
            "accelerated backend available={} reduced_precision={}",
            caps.available, caps.reduced_precision
        );
        self.probed = Some(caps);
        caps
    }

    /// Create a session for `model_path`, returning it with the backend that actually ran.
    ///
    /// Only a failure of the portable backend surfaces as an error.
    pub async fn open(
        &mut self,
        label: &str,
        model_path: &Path,
        reduced_precision: bool,
    ) -> Result<(Arc<dyn InferenceSession>, BackendKind)> {
        if self.mode == BackendMode::Safe {
            info!("{}: using portable backend (safe mode)", label);
            return self.open_portable(label, model_path).await;
        }

        let caps = self.accelerated_capabilities().await;
        if reduced_precision && !caps.reduced_precision {
            info!(
                "{}: using portable backend (reduced-precision model without capability)",
                label
            );
            return self.open_portable(label, model_path).await;
        }

        match (&self.backends.accelerated, caps.available) {
            (Some(backend), true) => {
                match backend
                    .create_session(model_path, &SessionOptions::accelerated())
                    .await
                {
                    Ok(session) => {
                        info!("{}: accelerated session created", label);
                        return Ok((session, BackendKind::Accelerated));
                    }
                    Err(e) => {
                        warn!(
                            "{}: accelerated session failed, falling back to portable: {:#}",
                            label, e
                        );
                    }
                }
            }
            _ => info!("{}: no accelerated backend, using portable", label),
        }
        self.open_portable(label, model_path).await
    }

    async fn open_portable(
        &self,
        label: &str,
        model_path: &Path,
    ) -> Result<(Arc<dyn InferenceSession>, BackendKind)> {
        let session = self
            .backends
            .portable
            .create_session(model_path, &SessionOptions::portable(self.threads))
            .await
            .with_context(|| format!("{}: load {}", label, model_path.display()))?;
        Ok((session, BackendKind::Portable))
    }
}
