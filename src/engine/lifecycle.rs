// Long-lived network sessions with exactly-once release.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::inference::{BackendKind, InferenceSession};

pub struct ModelSession {
    label: &'static str,
    backend: BackendKind,
    session: Mutex<Option<Arc<dyn InferenceSession>>>,
}

impl ModelSession {
    pub fn new(label: &'static str, session: Arc<dyn InferenceSession>, backend: BackendKind) -> Self {
        info!(
            "{} session on {} backend inputs=[{}] outputs=[{}]",
            label,
            backend,
            session.input_names().join(", "),
            session.output_names().join(", ")
        );
        Self {
            label,
            backend,
            session: Mutex::new(Some(session)),
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// The live session, or `None` once released.
    pub fn get(&self) -> Option<Arc<dyn InferenceSession>> {
        self.session.lock().clone()
    }

    pub fn is_released(&self) -> bool {
        self.session.lock().is_none()
    }

    /// Release the backend session. Later calls do nothing; failures are logged only.
    pub async fn release(&self) {
        let session = self.session.lock().take();
        let Some(session) = session else {
            debug!("{} session already released", self.label);
            return;
        };
        match session.release().await {
            Ok(()) => info!("{} session released", self.label),
            Err(e) => warn!("{} session release failed: {:#}", self.label, e),
        }
    }
}

impl Drop for ModelSession {
    fn drop(&mut self) {
        if self.session.get_mut().is_some() {
            warn!("{} session dropped without release", self.label);
        }
    }
}
