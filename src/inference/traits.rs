use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::tensor::{DeviceTensor, TensorRef};

/// Execution path used to run inference calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Accelerated,
    Portable,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Accelerated => f.write_str("accelerated"),
            BackendKind::Portable => f.write_str("portable"),
        }
    }
}

/// Result of probing a backend before any session is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackendCapabilities {
    pub available: bool,
    /// Reduced-precision arithmetic support, needed only by reduced-precision models.
    pub reduced_precision: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphOptimization {
    Disabled,
    Basic,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub backend: BackendKind,
    pub optimization: GraphOptimization,
    pub sequential: bool,
    pub cpu_mem_arena: bool,
    pub mem_pattern: bool,
    pub intra_op_threads: usize,
}

impl SessionOptions {
    pub fn accelerated() -> Self {
        Self {
            backend: BackendKind::Accelerated,
            optimization: GraphOptimization::All,
            sequential: true,
            cpu_mem_arena: false,
            mem_pattern: false,
            intra_op_threads: 1,
        }
    }

    pub fn portable(threads: usize) -> Self {
        Self {
            backend: BackendKind::Portable,
            optimization: GraphOptimization::All,
            sequential: true,
            cpu_mem_arena: true,
            mem_pattern: true,
            intra_op_threads: threads.max(1),
        }
    }
}

/// One loaded network. Every `DeviceTensor` it hands out must come back through `dispose`.
#[async_trait]
pub trait InferenceSession: Send + Sync {
    fn input_names(&self) -> Vec<String>;
    fn output_names(&self) -> Vec<String>;

    /// Copy a host buffer into a new device-side input.
    fn create_tensor(&self, name: &str, value: TensorRef<'_>) -> Result<DeviceTensor>;

    /// Run the network. Outputs are new device tensors, named after the graph outputs.
    async fn run(&self, inputs: &[DeviceTensor]) -> Result<Vec<DeviceTensor>>;

    /// Copy a float tensor's contents into `dst`. Lengths must match.
    fn read_f32(&self, tensor: &DeviceTensor, dst: &mut [f32]) -> Result<()>;

    fn dispose(&self, tensor: DeviceTensor);

    /// Free every backend resource held by the session.
    async fn release(&self) -> Result<()>;
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn probe(&self) -> Result<BackendCapabilities>;

    async fn create_session(
        &self,
        model_path: &Path,
        options: &SessionOptions,
    ) -> Result<Arc<dyn InferenceSession>>;
}
