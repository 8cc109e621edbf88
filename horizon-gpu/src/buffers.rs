//! Device-side arrays for Horizon
//!
//! `GpuBuffer` is a CudaSlice with its element count; `GpuLattice` adds the
//! lattice shape so a device array comes back to the host as a
//! [`Lattice3`]. Buffers live for one backend call and are dropped with it.

use anyhow::{bail, Context, Result};
use cudarc::driver::{CudaSlice, CudaStream, DeviceRepr, ValidAsZeroBits};
use horizon_math::{Lattice3, Shape3};
use std::sync::Arc;

/// A typed device buffer with known length.
pub struct GpuBuffer<T: DeviceRepr> {
    pub slice: CudaSlice<T>,
    pub len: usize,
}

impl<T: DeviceRepr + ValidAsZeroBits> GpuBuffer<T> {
    pub fn zeros(stream: &Arc<CudaStream>, len: usize) -> Result<Self> {
        let slice = stream
            .alloc_zeros(len)
            .with_context(|| format!("Failed to allocate {len} zeroed device elements"))?;
        Ok(Self { slice, len })
    }
}

impl<T: DeviceRepr> GpuBuffer<T> {
    pub fn from_host(stream: &Arc<CudaStream>, data: &[T]) -> Result<Self> {
        let slice = stream
            .clone_htod(data)
            .with_context(|| format!("Failed to upload {} elements", data.len()))?;
        Ok(Self {
            len: data.len(),
            slice,
        })
    }

    pub fn to_host(&self, stream: &Arc<CudaStream>) -> Result<Vec<T>> {
        stream
            .clone_dtoh(&self.slice)
            .with_context(|| format!("Failed to download {} elements", self.len))
    }
}

/// A dense f32 lattice resident on the device.
pub struct GpuLattice {
    pub buf: GpuBuffer<f32>,
    pub shape: Shape3,
}

impl GpuLattice {
    pub fn from_host(stream: &Arc<CudaStream>, lattice: &Lattice3) -> Result<Self> {
        let buf = GpuBuffer::from_host(stream, lattice.data())
            .with_context(|| format!("uploading {} lattice", lattice.shape()))?;
        Ok(Self {
            buf,
            shape: lattice.shape(),
        })
    }

    pub fn zeros(stream: &Arc<CudaStream>, shape: Shape3) -> Result<Self> {
        Ok(Self {
            buf: GpuBuffer::zeros(stream, shape.len())?,
            shape,
        })
    }

    /// Number of cells.
    pub fn cells(&self) -> usize {
        self.buf.len
    }

    /// Side length as the `int` the kernels take.
    pub fn side(&self) -> Result<i32> {
        if !self.shape.is_cubic() {
            bail!("device lattice {} is not cubic", self.shape);
        }
        Ok(i32::try_from(self.shape.nx)?)
    }

    /// Copy back to a host lattice of the same shape.
    pub fn to_host(&self, stream: &Arc<CudaStream>) -> Result<Lattice3> {
        let data = self
            .buf
            .to_host(stream)
            .with_context(|| format!("downloading {} lattice", self.shape))?;
        Ok(Lattice3::from_vec(self.shape, data)?)
    }
}
