//! Fixed-size instanced grids driven by per-variant compute kernels.
//!
//! Each grid owns an instance buffer filled once from a lattice and an indirect
//! draw-argument buffer written once at setup. After that only the variant's
//! kernels touch the instances.

pub mod floor;
pub mod midair;

use bytemuck::{Pod, Zeroable};
use cgmath::Matrix4;
use rand::Rng;

use crate::buffer_arena::StructuredBuffer;
use crate::draw::{DrawCall, Material, RecordLayout, RenderSink, BILLBOARD_INDEX_COUNT};
use crate::error::CoreError;
use crate::frame::FrameTime;
use crate::gpu::{BufferId, BufferUsage, ComputeBackend};
use crate::kernel_table::Kernel;
use crate::settings::GridSettings;

const TIME_DIVISOR: f32 = 20.0;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct InstanceRecord {
    pub position: [f32; 3],
    pub mass: f32,
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
    pub duration: f32,
    pub color: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SupportRecord {
    pub from_position: [f32; 3],
    pub flag: u32,
    pub from_rotation: [f32; 4],
    pub axis: [f32; 3],
    pub _pad0: f32,
    pub from_scale: [f32; 3],
    pub _pad1: f32,
}

/// `draw_indexed_indirect` argument layout.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectDrawArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

/// Parameter block shared by every grid kernel; the variant block follows it.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GridCommonParams {
    pub instance_count: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub time: [f32; 4],
    pub dt: f32,
    pub t: f32,
    pub seed: u32,
    pub _pad: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GridDimensions {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl GridDimensions {
    pub fn count(&self) -> u32 {
        self.width * self.height * self.depth
    }

    fn largest(&self) -> u32 {
        self.width.max(self.height).max(self.depth).max(1)
    }
}

impl From<&GridSettings> for GridDimensions {
    fn from(settings: &GridSettings) -> Self {
        Self {
            width: settings.width.max(1),
            height: settings.height.max(1),
            depth: settings.depth.max(1),
        }
    }
}

/// Lattice spanning `[-0.5, 0.5]` along the largest axis, x-major.
pub fn lattice(dims: GridDimensions, mass_min: f32, mass_max: f32, rng: &mut impl Rng) -> Vec<InstanceRecord> {
    let spacing = 1.0 / dims.largest() as f32;
    let offset = |n: u32, i: u32| (i as f32 - (n as f32 - 1.0) * 0.5) * spacing;
    let (mass_min, mass_max) = (mass_min.min(mass_max), mass_min.max(mass_max));
    let mut records = Vec::with_capacity(dims.count() as usize);
    for z in 0..dims.depth {
        for y in 0..dims.height {
            for x in 0..dims.width {
                let mass = if mass_max > mass_min {
                    rng.gen_range(mass_min..=mass_max)
                } else {
                    mass_min
                };
                records.push(InstanceRecord {
                    position: [offset(dims.width, x), offset(dims.height, y), offset(dims.depth, z)],
                    mass,
                    rotation: [0.0, 0.0, 0.0, 1.0],
                    scale: [spacing; 3],
                    duration: 0.0,
                    color: [1.0; 4],
                });
            }
        }
    }
    records
}

pub struct ProceduralGrid {
    label: &'static str,
    dims: GridDimensions,
    instances: StructuredBuffer<InstanceRecord>,
    args: StructuredBuffer<IndirectDrawArgs>,
    local_to_world: Matrix4<f32>,
}

impl ProceduralGrid {
    pub fn new(label: &'static str, dims: GridDimensions, local_to_world: Matrix4<f32>) -> Self {
        Self {
            label,
            dims,
            instances: StructuredBuffer::new(label, BufferUsage::Storage),
            args: StructuredBuffer::new("grid draw args", BufferUsage::Indirect),
            local_to_world,
        }
    }

    pub fn dims(&self) -> GridDimensions {
        self.dims
    }

    pub fn instances(&self) -> Option<BufferId> {
        self.instances.id()
    }

    pub fn args(&self) -> Option<BufferId> {
        self.args.id()
    }

    pub fn setup(
        &mut self,
        backend: &mut dyn ComputeBackend,
        settings: &GridSettings,
        rng: &mut impl Rng,
    ) -> Result<(), CoreError> {
        let records = lattice(self.dims, settings.mass_min, settings.mass_max, rng);
        self.instances.acquire_with(backend, &records)?;
        self.args.acquire_with(
            backend,
            &[IndirectDrawArgs {
                index_count: BILLBOARD_INDEX_COUNT,
                instance_count: self.dims.count(),
                first_index: 0,
                base_vertex: 0,
                first_instance: 0,
            }],
        )?;
        log::info!("{}: {} instances", self.label, self.dims.count());
        Ok(())
    }

    /// Dispatches `kernel` over every instance with the common block followed by
    /// `variant`. Binds the instance buffer first, then `extra`.
    #[allow(clippy::too_many_arguments)]
    pub fn compute(
        &self,
        backend: &mut dyn ComputeBackend,
        kernel: &Kernel,
        extra: &[BufferId],
        variant: &[u8],
        frame: &FrameTime,
        t: f32,
        seed: u32,
    ) {
        let Some(instances) = self.instances.id() else {
            return;
        };
        let common = GridCommonParams {
            instance_count: self.dims.count(),
            width: self.dims.width,
            height: self.dims.height,
            depth: self.dims.depth,
            time: frame.time_vector(TIME_DIVISOR),
            dt: frame.dt(),
            t,
            seed,
            _pad: 0,
        };
        let mut params = Vec::with_capacity(std::mem::size_of::<GridCommonParams>() + variant.len());
        params.extend_from_slice(bytemuck::bytes_of(&common));
        params.extend_from_slice(variant);

        let mut buffers = Vec::with_capacity(1 + extra.len());
        buffers.push(instances);
        buffers.extend_from_slice(extra);
        kernel.dispatch(backend, &params, &buffers, self.dims.count());
    }

    pub fn render(&self, sink: &mut dyn RenderSink, material: Material) {
        let (Some(instances), Some(args)) = (self.instances.id(), self.args.id()) else {
            return;
        };
        sink.draw(
            DrawCall::new(
                self.label,
                instances,
                RecordLayout::Instance,
                self.dims.count(),
                self.local_to_world,
                material,
            )
            .with_indirect_args(args),
        );
    }

    pub fn release(&mut self, backend: &mut dyn ComputeBackend) {
        self.instances.release(backend);
        self.args.release(backend);
    }
}
