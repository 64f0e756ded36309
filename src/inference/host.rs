// Portable reference engine: networks are Rust closures, device memory is a host-side table.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::tensor::{DeviceTensor, Tensor, TensorRef};
use super::traits::{
    BackendCapabilities, BackendKind, InferenceBackend, InferenceSession, SessionOptions,
};
use crate::error::EngineError;

pub type HostOutputs = Vec<(String, Tensor)>;

/// A network executed on the host. Inputs are keyed by feed name.
pub trait HostModel: Send + Sync {
    fn forward(&self, inputs: &HashMap<String, Tensor>) -> Result<HostOutputs>;
}

impl<F> HostModel for F
where
    F: Fn(&HashMap<String, Tensor>) -> Result<HostOutputs> + Send + Sync,
{
    fn forward(&self, inputs: &HashMap<String, Tensor>) -> Result<HostOutputs> {
        self(inputs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub created: u64,
    pub released: u64,
    pub live: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub created: u64,
    pub released: u64,
    pub runs: u64,
    pub in_flight: u32,
    pub peak_in_flight: u32,
}

/// A registered network and the graph names it declares.
#[derive(Clone)]
struct HostNetwork {
    model: Arc<dyn HostModel>,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

// Counts one `run` as in flight for as long as it lives, including when the run
// future is dropped mid-await.
struct InFlight<'a>(&'a Counters);

impl<'a> InFlight<'a> {
    fn enter(counters: &'a Counters) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        counters.peak_in_flight.fetch_max(now, Ordering::AcqRel);
        Self(counters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Default)]
struct DeviceMemory {
    next_id: AtomicU64,
    created: AtomicU64,
    released: AtomicU64,
    tensors: Mutex<HashMap<u64, Tensor>>,
}

impl DeviceMemory {
    fn alloc(&self, name: &str, tensor: Tensor) -> DeviceTensor {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = DeviceTensor::new(id, name, tensor.dtype(), tensor.shape.clone());
        self.tensors.lock().insert(id, tensor);
        self.created.fetch_add(1, Ordering::Relaxed);
        handle
    }

    fn free(&self, handle: DeviceTensor) {
        if self.tensors.lock().remove(&handle.id()).is_some() {
            self.released.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn stats(&self) -> MemoryStats {
        MemoryStats {
            created: self.created.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            live: self.tensors.lock().len(),
        }
    }
}

#[derive(Default)]
struct Counters {
    sessions_created: AtomicU64,
    sessions_released: AtomicU64,
    runs: AtomicU64,
    in_flight: AtomicU32,
    peak_in_flight: AtomicU32,
}

pub struct HostBackend {
    kind: BackendKind,
    capabilities: BackendCapabilities,
    probe_error: Option<String>,
    create_error: Option<String>,
    latency: Option<Duration>,
    models: RwLock<HashMap<PathBuf, HostNetwork>>,
    memory: Arc<DeviceMemory>,
    counters: Arc<Counters>,
}

impl HostBackend {
    pub fn new(kind: BackendKind, capabilities: BackendCapabilities) -> Self {
        Self {
            kind,
            capabilities,
            probe_error: None,
            create_error: None,
            latency: None,
            models: RwLock::new(HashMap::new()),
            memory: Arc::new(DeviceMemory::default()),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Always-available portable backend.
    pub fn portable() -> Self {
        Self::new(
            BackendKind::Portable,
            BackendCapabilities {
                available: true,
                reduced_precision: true,
            },
        )
    }

    pub fn accelerated(capabilities: BackendCapabilities) -> Self {
        Self::new(BackendKind::Accelerated, capabilities)
    }

    /// Simulated device time added to every `run`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_probe_error(mut self, msg: impl Into<String>) -> Self {
        self.probe_error = Some(msg.into());
        self
    }

    pub fn with_create_error(mut self, msg: impl Into<String>) -> Self {
        self.create_error = Some(msg.into());
        self
    }

    /// Register `model` at `path` with the input and output names its graph declares.
    pub fn register(
        &self,
        path: impl Into<PathBuf>,
        inputs: &[&str],
        outputs: &[&str],
        model: impl HostModel + 'static,
    ) {
        let network = HostNetwork {
            model: Arc::new(model),
            inputs: inputs.iter().map(|n| n.to_string()).collect(),
            outputs: outputs.iter().map(|n| n.to_string()).collect(),
        };
        self.models.write().insert(path.into(), network);
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.memory.stats()
    }

    pub fn session_stats(&self) -> SessionStats {
        SessionStats {
            created: self.counters.sessions_created.load(Ordering::Relaxed),
            released: self.counters.sessions_released.load(Ordering::Relaxed),
            runs: self.counters.runs.load(Ordering::Relaxed),
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
            peak_in_flight: self.counters.peak_in_flight.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl InferenceBackend for HostBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn probe(&self) -> Result<BackendCapabilities> {
        if let Some(msg) = &self.probe_error {
            return Err(anyhow!("{} probe failed: {}", self.kind, msg));
        }
        Ok(self.capabilities)
    }

    async fn create_session(
        &self,
        model_path: &Path,
        options: &SessionOptions,
    ) -> Result<Arc<dyn InferenceSession>> {
        if let Some(msg) = &self.create_error {
            return Err(anyhow!(
                "{} session for {} failed: {}",
                self.kind,
                model_path.display(),
                msg
            ));
        }
        let network = self
            .models
            .read()
            .get(model_path)
            .cloned()
            .ok_or_else(|| anyhow!("no model registered at {}", model_path.display()))?;

        self.counters.sessions_created.fetch_add(1, Ordering::Relaxed);
        debug!(
            "host session created path={} backend={} threads={}",
            model_path.display(),
            self.kind,
            options.intra_op_threads
        );

        Ok(Arc::new(HostSession {
            network,
            memory: self.memory.clone(),
            counters: self.counters.clone(),
            latency: self.latency,
            released: AtomicBool::new(false),
        }))
    }
}

struct HostSession {
    network: HostNetwork,
    memory: Arc<DeviceMemory>,
    counters: Arc<Counters>,
    latency: Option<Duration>,
    released: AtomicBool,
}

impl HostSession {
    fn ensure_live(&self) -> Result<()> {
        if self.released.load(Ordering::Acquire) {
            return Err(EngineError::SessionReleased.into());
        }
        Ok(())
    }

    fn forward(&self, inputs: &[DeviceTensor]) -> Result<Vec<DeviceTensor>> {
        let feeds = {
            let tensors = self.memory.tensors.lock();
            let mut feeds = HashMap::with_capacity(inputs.len());
            for handle in inputs {
                let tensor = tensors
                    .get(&handle.id())
                    .ok_or_else(|| anyhow!("input `{}` is not resident", handle.name()))?;
                feeds.insert(handle.name().to_string(), tensor.clone());
            }
            feeds
        };

        let outputs = self.network.model.forward(&feeds)?;
        Ok(outputs
            .into_iter()
            .map(|(name, tensor)| self.memory.alloc(&name, tensor))
            .collect())
    }
}

#[async_trait]
impl InferenceSession for HostSession {
    fn input_names(&self) -> Vec<String> {
        self.network.inputs.clone()
    }

    fn output_names(&self) -> Vec<String> {
        self.network.outputs.clone()
    }

    fn create_tensor(&self, name: &str, value: TensorRef<'_>) -> Result<DeviceTensor> {
        self.ensure_live()?;
        value.validate()?;
        Ok(self.memory.alloc(name, value.to_tensor()))
    }

    async fn run(&self, inputs: &[DeviceTensor]) -> Result<Vec<DeviceTensor>> {
        self.ensure_live()?;

        let _in_flight = InFlight::enter(&self.counters);
        self.counters.runs.fetch_add(1, Ordering::Relaxed);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.forward(inputs)
    }

    fn read_f32(&self, tensor: &DeviceTensor, dst: &mut [f32]) -> Result<()> {
        let tensors = self.memory.tensors.lock();
        let stored = tensors
            .get(&tensor.id())
            .ok_or_else(|| anyhow!("tensor `{}` already released", tensor.name()))?;
        let data = stored
            .as_f32()
            .ok_or_else(|| anyhow!("tensor `{}` is not f32", tensor.name()))?;
        if data.len() != dst.len() {
            return Err(EngineError::ShapeMismatch {
                expected: dst.len(),
                actual: data.len(),
            }
            .into());
        }
        dst.copy_from_slice(data);
        Ok(())
    }

    fn dispose(&self, tensor: DeviceTensor) {
        self.memory.free(tensor);
    }

    async fn release(&self) -> Result<()> {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.counters.sessions_released.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}
