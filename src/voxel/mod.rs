//! Surface-to-grid voxelization.
//!
//! The grid is cubic: every axis gets `max(10, base_resolution) >> level` cells,
//! the cell edge is the largest extent of the tracked bounds divided by that
//! count, and the grid is centred on the bounds.

pub mod control;

use bytemuck::{Pod, Zeroable};
use cgmath::Vector3;

use crate::bounds::Bounds;
use crate::buffer_arena::StructuredBuffer;
use crate::error::CoreError;
use crate::gpu::{BufferId, BufferUsage, ComputeBackend, ProgramSource};
use crate::kernel_table::{KernelSet, KernelTable};
use crate::settings::{VoxelSettings, MAX_LOD_LEVEL, MIN_BASE_RESOLUTION};
use crate::source::SampledMesh;

pub const MIN_LEVEL: u32 = 0;
pub const MAX_LEVEL: u32 = MAX_LOD_LEVEL;
const MIN_UNIT_LENGTH: f32 = 1e-6;

pub const VOXELIZER_PROGRAM: ProgramSource = ProgramSource {
    label: "voxelizer",
    wgsl: include_str!("../shaders/voxelizer.wgsl"),
    storage_buffers: 3,
};

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct VoxelRecord {
    pub density: f32,
    pub fill: u32,
    pub _pad: [u32; 2],
    pub color: [f32; 4],
}

/// Cells per axis for `base_resolution` at LOD `level`.
pub fn resolution(base_resolution: u32, level: u32) -> u32 {
    let level = level.clamp(MIN_LEVEL, MAX_LEVEL);
    (base_resolution.max(MIN_BASE_RESOLUTION) >> level).max(1)
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VoxelGrid {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub unit_length: f32,
    pub start: Vector3<f32>,
    pub level: u32,
}

impl VoxelGrid {
    pub fn fit(bounds: &Bounds, base_resolution: u32, level: u32) -> Self {
        let level = level.clamp(MIN_LEVEL, MAX_LEVEL);
        let cells = resolution(base_resolution, level);
        let unit_length = (bounds.max_extent() / cells as f32).max(MIN_UNIT_LENGTH);
        let half = unit_length * cells as f32 * 0.5;
        Self {
            width: cells,
            height: cells,
            depth: cells,
            unit_length,
            start: bounds.center() - Vector3::new(half, half, half),
            level,
        }
    }

    pub fn dims(&self) -> [u32; 3] {
        [self.width, self.height, self.depth]
    }

    pub fn cell_count(&self) -> u32 {
        self.width * self.height * self.depth
    }

    pub fn end(&self) -> Vector3<f32> {
        self.start
            + Vector3::new(
                self.width as f32 * self.unit_length,
                self.height as f32 * self.unit_length,
                self.depth as f32 * self.unit_length,
            )
    }

    /// World position in (fractional) cell units.
    pub fn world_to_grid(&self, world: Vector3<f32>) -> [f32; 3] {
        let local = (world - self.start) / self.unit_length;
        local.into()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VoxelizerKernel {
    Surface,
    Volume,
}

impl KernelSet for VoxelizerKernel {
    const ALL: &'static [Self] = &[VoxelizerKernel::Surface, VoxelizerKernel::Volume];

    fn entry_point(self) -> &'static str {
        match self {
            VoxelizerKernel::Surface => "Surface",
            VoxelizerKernel::Volume => "Volume",
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct VoxelizeParams {
    pub start: [f32; 3],
    pub unit_length: f32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub triangle_count: u32,
    pub inv_unit_length: f32,
    pub half_unit_length: f32,
    pub _pad: [f32; 2],
}

/// Read-only view of the latest occupancy buffer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Occupancy {
    pub buffer: BufferId,
    pub grid: VoxelGrid,
}

pub struct Voxelizer {
    kernels: KernelTable<VoxelizerKernel>,
    voxels: StructuredBuffer<VoxelRecord>,
    vertices: StructuredBuffer<[f32; 4]>,
    indices: StructuredBuffer<u32>,
    grid: Option<VoxelGrid>,
}

impl Voxelizer {
    pub fn new(backend: &mut dyn ComputeBackend) -> Result<Self, CoreError> {
        Ok(Self {
            kernels: KernelTable::load(backend, &VOXELIZER_PROGRAM)?,
            voxels: StructuredBuffer::new("voxels", BufferUsage::Storage),
            vertices: StructuredBuffer::new("voxelizer vertices", BufferUsage::Storage),
            indices: StructuredBuffer::new("voxelizer indices", BufferUsage::Storage),
            grid: None,
        })
    }

    /// Rebuilds the occupancy buffer for `mesh` inside `bounds`.
    pub fn voxelize(
        &mut self,
        backend: &mut dyn ComputeBackend,
        mesh: &SampledMesh,
        bounds: &Bounds,
        settings: &VoxelSettings,
    ) -> Result<VoxelGrid, CoreError> {
        self.release(backend);

        let grid = VoxelGrid::fit(bounds, settings.base_resolution, settings.level);
        let voxels = self.voxels.acquire(backend, grid.cell_count())?;

        let vertices: Vec<[f32; 4]> = mesh.positions.iter().map(|p| [p[0], p[1], p[2], 1.0]).collect();
        let vertices = self.vertices.acquire_with(backend, &vertices)?;
        let indices = self.indices.acquire_with(backend, &mesh.indices)?;
        let triangle_count = mesh.triangle_count();

        let params = VoxelizeParams {
            start: grid.start.into(),
            unit_length: grid.unit_length,
            width: grid.width,
            height: grid.height,
            depth: grid.depth,
            triangle_count,
            inv_unit_length: 1.0 / grid.unit_length,
            half_unit_length: grid.unit_length * 0.5,
            _pad: [0.0; 2],
        };
        let buffers = [voxels, vertices, indices];
        self.kernels
            .get(VoxelizerKernel::Surface)
            .dispatch(backend, bytemuck::bytes_of(&params), &buffers, triangle_count);
        self.kernels
            .get(VoxelizerKernel::Volume)
            .dispatch(backend, bytemuck::bytes_of(&params), &buffers, grid.width * grid.depth);

        self.grid = Some(grid);
        Ok(grid)
    }

    pub fn occupancy(&self) -> Option<Occupancy> {
        Some(Occupancy {
            buffer: self.voxels.id()?,
            grid: self.grid?,
        })
    }

    pub fn release(&mut self, backend: &mut dyn ComputeBackend) {
        self.voxels.release(backend);
        self.vertices.release(backend);
        self.indices.release(backend);
        self.grid = None;
    }
}
