use std::{fmt::Debug, sync::Arc};

use crate::{shape::contiguous_strides, DType, Device, Element, Error, Result, Scalar};

/// Shared handle to realized tensor data.
pub type BufferRef = Arc<dyn Buffer>;

/// Realized tensor data owned outside the graph.
///
/// The graph only reads metadata and exported views; it never allocates device
/// memory itself.
pub trait Buffer: Debug + Send + Sync {
    fn dtype(&self) -> DType;
    fn shape(&self) -> &[usize];
    fn device(&self) -> Device;

    /// Borrow the data as a dense row-major view of little-endian elements.
    fn export_view(&self) -> Result<BufferView<'_>>;

    fn element_count(&self) -> usize {
        self.shape().iter().product()
    }
}

/// Zero-copy exchange view of a buffer.
#[derive(Debug, Clone, Copy)]
pub struct BufferView<'a> {
    pub data: &'a [u8],
    pub dtype: DType,
    pub shape: &'a [usize],
    pub device: Device,
}

impl BufferView<'_> {
    pub fn strides(&self) -> Vec<usize> {
        contiguous_strides(self.shape)
    }

    /// Decode element `i` (row-major).
    pub(crate) fn read(&self, i: usize) -> Scalar {
        let width = self.dtype.size_in_bytes();
        self.dtype.read_le(&self.data[i * width..(i + 1) * width])
    }
}

/// A dense buffer in host memory.
#[derive(Clone, PartialEq)]
pub struct HostBuffer {
    bytes: Vec<u8>,
    dtype: DType,
    shape: Vec<usize>,
}

impl HostBuffer {
    pub fn from_slice<T: Element>(data: &[T], shape: &[usize]) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(Error::invalid_argument(format!(
                "{} elements do not fill shape {shape:?}",
                data.len()
            )));
        }
        let mut bytes = Vec::with_capacity(data.len() * T::DTYPE.size_in_bytes());
        for v in data {
            v.write_le(&mut bytes);
        }
        Ok(Self {
            bytes,
            dtype: T::DTYPE,
            shape: shape.to_vec(),
        })
    }

    pub fn scalar<T: Element>(v: T) -> Self {
        let mut bytes = Vec::new();
        v.write_le(&mut bytes);
        Self {
            bytes,
            dtype: T::DTYPE,
            shape: vec![],
        }
    }

    /// Copy the contents of another framework's buffer view.
    pub fn import_view(view: &BufferView<'_>) -> Result<Self> {
        let count: usize = view.shape.iter().product();
        if view.data.len() != count * view.dtype.size_in_bytes() {
            return Err(Error::invalid_argument(format!(
                "view of {} bytes does not match {}{:?}",
                view.data.len(),
                view.dtype,
                view.shape
            )));
        }
        Ok(Self {
            bytes: view.data.to_vec(),
            dtype: view.dtype,
            shape: view.shape.to_vec(),
        })
    }

    pub(crate) fn from_values(
        values: impl ExactSizeIterator<Item = Scalar>,
        dtype: DType,
        shape: Vec<usize>,
    ) -> Self {
        let mut bytes = Vec::with_capacity(values.len() * dtype.size_in_bytes());
        for v in values {
            dtype.write_le(v, &mut bytes);
        }
        Self {
            bytes,
            dtype,
            shape,
        }
    }

    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.dtype {
            return Err(Error::invalid_argument(format!(
                "cannot read a {} buffer as {}",
                self.dtype,
                T::DTYPE
            )));
        }
        Ok(self
            .bytes
            .chunks_exact(self.dtype.size_in_bytes())
            .map(T::read_le)
            .collect())
    }
}

impl Debug for HostBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBuffer")
            .field("dtype", &self.dtype)
            .field("shape", &self.shape)
            .finish()
    }
}

impl Buffer for HostBuffer {
    fn dtype(&self) -> DType {
        self.dtype
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn device(&self) -> Device {
        Device::Host
    }

    fn export_view(&self) -> Result<BufferView<'_>> {
        Ok(BufferView {
            data: &self.bytes,
            dtype: self.dtype,
            shape: &self.shape,
            device: Device::Host,
        })
    }
}

/// Read any buffer back as a host vector of `T`.
pub fn to_vec<T: Element>(buffer: &dyn Buffer) -> Result<Vec<T>> {
    HostBuffer::import_view(&buffer.export_view()?)?.to_vec()
}
