// Inference boundary: backend and session traits, tensor handles, and a host reference engine.

pub mod host;
pub mod scope;
pub mod tensor;
pub mod traits;

pub use scope::TensorScope;
pub use tensor::{DeviceTensor, ElementType, Tensor, TensorBuf, TensorData, TensorRef};
pub use traits::{
    BackendCapabilities, BackendKind, GraphOptimization, InferenceBackend, InferenceSession,
    SessionOptions,
};
