// Host-side tensor views and the opaque handles that stand for device-resident buffers.

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    F32,
    I64,
}

#[derive(Debug, Clone, Copy)]
pub enum TensorData<'a> {
    F32(&'a [f32]),
    I64(&'a [i64]),
}

/// Borrowed input for `InferenceSession::create_tensor`. The session copies the data.
#[derive(Debug, Clone, Copy)]
pub struct TensorRef<'a> {
    pub shape: &'a [usize],
    pub data: TensorData<'a>,
}

impl<'a> TensorRef<'a> {
    pub fn f32(data: &'a [f32], shape: &'a [usize]) -> Self {
        Self {
            shape,
            data: TensorData::F32(data),
        }
    }

    pub fn i64(data: &'a [i64], shape: &'a [usize]) -> Self {
        Self {
            shape,
            data: TensorData::I64(data),
        }
    }

    pub fn dtype(&self) -> ElementType {
        match self.data {
            TensorData::F32(_) => ElementType::F32,
            TensorData::I64(_) => ElementType::I64,
        }
    }

    pub fn len(&self) -> usize {
        match self.data {
            TensorData::F32(d) => d.len(),
            TensorData::I64(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that the shape's element count matches the data length.
    pub fn validate(&self) -> Result<(), EngineError> {
        let expected: usize = self.shape.iter().product();
        if expected != self.len() {
            return Err(EngineError::TensorShape {
                shape: self.shape.to_vec(),
                expected,
                actual: self.len(),
            });
        }
        Ok(())
    }

    pub fn to_tensor(&self) -> Tensor {
        let data = match self.data {
            TensorData::F32(d) => TensorBuf::F32(d.to_vec()),
            TensorData::I64(d) => TensorBuf::I64(d.to_vec()),
        };
        Tensor {
            shape: self.shape.to_vec(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TensorBuf {
    F32(Vec<f32>),
    I64(Vec<i64>),
}

/// Owned tensor, as held by a backend on its side of the boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: TensorBuf,
}

impl Tensor {
    pub fn from_f32(data: Vec<f32>, shape: Vec<usize>) -> Self {
        Self {
            shape,
            data: TensorBuf::F32(data),
        }
    }

    pub fn dtype(&self) -> ElementType {
        match self.data {
            TensorBuf::F32(_) => ElementType::F32,
            TensorBuf::I64(_) => ElementType::I64,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorBuf::F32(d) => Some(d),
            TensorBuf::I64(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.data {
            TensorBuf::I64(d) => Some(d),
            TensorBuf::F32(_) => None,
        }
    }

    /// Scalar value of a single-element f32 tensor.
    pub fn scalar_f32(&self) -> Option<f32> {
        self.as_f32().filter(|d| d.len() == 1).map(|d| d[0])
    }
}

/// Handle to a transient device-resident buffer owned by an inference session.
///
/// Not `Clone`: disposing consumes the handle, so a buffer cannot be released twice.
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceTensor {
    id: u64,
    name: String,
    dtype: ElementType,
    shape: Vec<usize>,
}

impl DeviceTensor {
    pub fn new(id: u64, name: impl Into<String>, dtype: ElementType, shape: Vec<usize>) -> Self {
        Self {
            id,
            name: name.into(),
            dtype,
            shape,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> ElementType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
