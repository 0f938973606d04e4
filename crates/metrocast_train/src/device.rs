//! Execution device selection.
//!
//! The device is detected once and passed down explicitly; nothing below the
//! binary looks up a global device.

use std::fmt;

use burn::prelude::*;
use burn_autodiff::Autodiff;

/// Backend used for inference and evaluation.
#[cfg(not(feature = "backend-wgpu"))]
pub type DefaultBackend = burn_ndarray::NdArray;

/// Backend used for inference and evaluation.
#[cfg(feature = "backend-wgpu")]
pub type DefaultBackend = burn_wgpu::Wgpu;

/// Backend used for training.
pub type DefaultAutodiffBackend = Autodiff<DefaultBackend>;

/// Kind of compute device a context runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Host CPU through ndarray.
    Cpu,
    /// GPU through wgpu.
    Gpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Gpu => f.write_str("gpu"),
        }
    }
}

/// A device together with what kind of hardware backs it.
#[derive(Debug, Clone)]
pub struct ExecutionContext<B: Backend> {
    device: B::Device,
    kind: DeviceKind,
}

impl<B: Backend> ExecutionContext<B> {
    /// Wrap an explicit device.
    pub fn new(device: B::Device, kind: DeviceKind) -> Self {
        Self { device, kind }
    }

    /// Default device of the compiled-in backend.
    pub fn detect() -> Self {
        let kind = if cfg!(feature = "backend-wgpu") {
            DeviceKind::Gpu
        } else {
            DeviceKind::Cpu
        };
        let context = Self::new(B::Device::default(), kind);
        tracing::info!(kind = %context.kind, device = ?context.device, "Selected execution device");
        context
    }

    /// The device.
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// The device kind.
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Release per-epoch scratch memory.
    ///
    /// Tensors of the finished epoch are dropped by the caller before this
    /// runs. Blocks until all work queued on the device has completed, after
    /// which the buffers those tensors held are free for reuse by the
    /// backend's memory pool. On the CPU backend buffers are freed on drop
    /// and the sync returns immediately.
    pub fn release_scratch(&self, epoch: usize) {
        B::sync(&self.device);
        tracing::debug!(epoch, kind = %self.kind, "Synchronized device after epoch");
    }

    /// Same device viewed from another backend sharing its device type.
    pub fn with_backend<B2>(&self) -> ExecutionContext<B2>
    where
        B2: Backend<Device = B::Device>,
    {
        ExecutionContext::new(self.device.clone(), self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    #[test]
    fn test_detect_defaults_to_cpu() {
        let ctx = ExecutionContext::<NdArray>::detect();
        if cfg!(feature = "backend-wgpu") {
            assert_eq!(ctx.kind(), DeviceKind::Gpu);
        } else {
            assert_eq!(ctx.kind(), DeviceKind::Cpu);
        }
        ctx.release_scratch(1);
    }

    #[test]
    fn test_with_backend_keeps_device() {
        let ctx = ExecutionContext::<Autodiff<NdArray>>::new(Default::default(), DeviceKind::Cpu);
        let inner = ctx.with_backend::<NdArray>();
        assert_eq!(inner.device(), ctx.device());
        assert_eq!(inner.kind().to_string(), "cpu");
        ctx.release_scratch(2);
        inner.release_scratch(2);
    }
}
