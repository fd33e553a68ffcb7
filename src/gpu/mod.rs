//! Host/GPU seam.
//!
//! Everything above this module talks to the GPU through [`ComputeBackend`]:
//! buffers are opaque [`BufferId`]s, kernels are opaque [`KernelHandle`]s and a
//! dispatch is a parameter block plus an ordered list of storage buffers.
//!
//! ## Binding convention
//! | Binding | Type | Contents |
//! |---------|------|----------|
//! | 0 | Uniform | per-dispatch parameter block |
//! | 1..=n | Storage (read_write) | `Dispatch::buffers` in order |

mod reflect;
mod wgpu_backend;
#[cfg(test)]
pub(crate) mod recording;

pub use self::wgpu_backend::WgpuBackend;

use crate::error::CoreError;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub(crate) u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProgramId(pub(crate) u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct KernelHandle {
    pub(crate) program: ProgramId,
    pub(crate) index: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Read/written by compute kernels and read by the renderer.
    Storage,
    /// Storage plus indirect draw arguments.
    Indirect,
}

/// A compute program as shipped with the crate.
#[derive(Copy, Clone, Debug)]
pub struct ProgramSource {
    pub label: &'static str,
    pub wgsl: &'static str,
    /// Number of storage buffers bound after the parameter block.
    pub storage_buffers: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KernelInfo {
    pub handle: KernelHandle,
    pub group_size: [u32; 3],
}

pub struct Dispatch<'a> {
    pub kernel: KernelHandle,
    pub label: &'static str,
    pub params: &'a [u8],
    pub buffers: &'a [BufferId],
    pub groups: [u32; 3],
}

pub trait ComputeBackend {
    fn create_buffer(&mut self, label: &'static str, size: u64, usage: BufferUsage) -> BufferId;

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]);

    fn destroy_buffer(&mut self, buffer: BufferId);

    fn load_program(&mut self, source: &ProgramSource) -> Result<ProgramId, CoreError>;

    /// Resolves a compute entry point. `None` when the program declares no such
    /// compute entry point.
    fn resolve_kernel(&mut self, program: ProgramId, entry_point: &str) -> Option<KernelInfo>;

    fn dispatch(&mut self, dispatch: &Dispatch<'_>);
}
