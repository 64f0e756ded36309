// Scoped ownership of the transient device tensors behind one inference call.

use anyhow::Result;

use super::tensor::{DeviceTensor, TensorRef};
use super::traits::InferenceSession;
use crate::error::EngineError;

/// Holds every tensor created for a single `run` and disposes all of them on drop.
///
/// Reads copy into caller-owned buffers while the scope is alive, so data is always
/// consumed before the backing resource goes away.
pub struct TensorScope<'s> {
    session: &'s dyn InferenceSession,
    inputs: Vec<DeviceTensor>,
    outputs: Vec<DeviceTensor>,
}

impl<'s> TensorScope<'s> {
    pub fn new(session: &'s dyn InferenceSession) -> Self {
        Self {
            session,
            inputs: Vec::with_capacity(5),
            outputs: Vec::new(),
        }
    }

    pub fn input(&mut self, name: &str, value: TensorRef<'_>) -> Result<()> {
        value.validate()?;
        let tensor = self.session.create_tensor(name, value)?;
        self.inputs.push(tensor);
        Ok(())
    }

    pub async fn run(&mut self) -> Result<()> {
        let outputs = self.session.run(&self.inputs).await?;
        self.outputs.extend(outputs);
        Ok(())
    }

    pub fn output(&self, name: &str) -> Result<&DeviceTensor> {
        self.outputs
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| EngineError::MissingOutput(name.to_string()).into())
    }

    /// Copy the named float output into `dst`, which must have the output's length.
    pub fn read_f32(&self, name: &str, dst: &mut [f32]) -> Result<()> {
        let tensor = self.output(name)?;
        if tensor.len() != dst.len() {
            return Err(EngineError::ShapeMismatch {
                expected: dst.len(),
                actual: tensor.len(),
            }
            .into());
        }
        self.session.read_f32(tensor, dst)
    }

    pub fn held(&self) -> usize {
        self.inputs.len() + self.outputs.len()
    }
}

impl Drop for TensorScope<'_> {
    fn drop(&mut self) {
        for tensor in self.inputs.drain(..) {
            self.session.dispose(tensor);
        }
        for tensor in self.outputs.drain(..) {
            self.session.dispose(tensor);
        }
    }
}
