use bytemuck::{Pod, Zeroable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Occupancy;
use crate::error::CoreError;
use crate::frame::FrameTime;
use crate::gpu::{ComputeBackend, ProgramSource};
use crate::kernel_table::{KernelSet, KernelTable};

pub const VOXEL_CONTROL_PROGRAM: ProgramSource = ProgramSource {
    label: "voxel control",
    wgsl: include_str!("../shaders/voxel_control.wgsl"),
    storage_buffers: 1,
};

const TIME_DIVISOR: f32 = 4.0;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum VoxelMode {
    #[default]
    Default,
    Randomize,
    Glitch,
    Clip,
}

impl VoxelMode {
    pub const ALL: [VoxelMode; 4] = [VoxelMode::Default, VoxelMode::Randomize, VoxelMode::Glitch, VoxelMode::Clip];

    pub fn from_index(index: i64) -> Self {
        Self::ALL[index.rem_euclid(Self::ALL.len() as i64) as usize]
    }

    fn kernel(self) -> Option<VoxelControlKernel> {
        match self {
            VoxelMode::Default => None,
            VoxelMode::Randomize => Some(VoxelControlKernel::Randomize),
            VoxelMode::Glitch => Some(VoxelControlKernel::Glitch),
            VoxelMode::Clip => Some(VoxelControlKernel::Clip),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VoxelControlKernel {
    Randomize,
    Glitch,
    Clip,
}

impl KernelSet for VoxelControlKernel {
    const ALL: &'static [Self] = &[
        VoxelControlKernel::Randomize,
        VoxelControlKernel::Glitch,
        VoxelControlKernel::Clip,
    ];

    fn entry_point(self) -> &'static str {
        match self {
            VoxelControlKernel::Randomize => "Randomize",
            VoxelControlKernel::Glitch => "Glitch",
            VoxelControlKernel::Clip => "Clip",
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct VoxelControlParams {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub seed: u32,
    pub start: [f32; 3],
    pub unit_length: f32,
    pub end: [f32; 3],
    pub inv_unit_length: f32,
    pub time: [f32; 4],
    pub clip_min: [f32; 3],
    pub dt: f32,
    pub clip_max: [f32; 3],
    pub throttle: f32,
}

/// Applies the persistent mode's per-voxel pass every frame, plus at most one
/// latched one-shot pass.
pub struct VoxelControl {
    kernels: KernelTable<VoxelControlKernel>,
    mode: VoxelMode,
    once: Option<VoxelMode>,
    seed: u32,
    rng: StdRng,
}

impl VoxelControl {
    pub fn new(backend: &mut dyn ComputeBackend) -> Result<Self, CoreError> {
        Self::with_rng(backend, StdRng::from_entropy())
    }

    pub fn with_rng(backend: &mut dyn ComputeBackend, mut rng: StdRng) -> Result<Self, CoreError> {
        Ok(Self {
            kernels: KernelTable::load(backend, &VOXEL_CONTROL_PROGRAM)?,
            mode: VoxelMode::Default,
            once: None,
            seed: rng.gen(),
            rng,
        })
    }

    pub fn mode(&self) -> VoxelMode {
        self.mode
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Switching to (or re-selecting) Randomize or Glitch draws a fresh seed.
    pub fn set_mode(&mut self, mode: VoxelMode) {
        if matches!(mode, VoxelMode::Randomize | VoxelMode::Glitch) {
            self.seed = self.rng.gen();
        }
        if mode != self.mode {
            log::info!("voxel mode {:?} -> {:?}", self.mode, mode);
        }
        self.mode = mode;
    }

    /// Latches a single pass of `mode` for the next `dispatch`, leaving the
    /// persistent mode alone. A later call before that replaces the latch.
    pub fn fire_once(&mut self, mode: VoxelMode) {
        if mode.kernel().is_none() {
            return;
        }
        self.seed = self.rng.gen();
        log::debug!("voxel {:?} once", mode);
        self.once = Some(mode);
    }

    pub fn pending(&self) -> Option<VoxelMode> {
        self.once
    }

    /// Runs the persistent mode's pass, then any latched one-shot pass.
    /// Returns whether anything was dispatched.
    pub fn dispatch(
        &mut self,
        backend: &mut dyn ComputeBackend,
        occupancy: &Occupancy,
        clip_grid: ([f32; 3], [f32; 3]),
        frame: &FrameTime,
        throttle: f32,
    ) -> bool {
        let passes = [self.mode.kernel(), self.once.take().and_then(VoxelMode::kernel)];
        if passes.iter().all(Option::is_none) {
            return false;
        }
        let grid = &occupancy.grid;
        let params = VoxelControlParams {
            width: grid.width,
            height: grid.height,
            depth: grid.depth,
            seed: self.seed,
            start: grid.start.into(),
            unit_length: grid.unit_length,
            end: grid.end().into(),
            inv_unit_length: 1.0 / grid.unit_length,
            time: frame.time_vector(TIME_DIVISOR),
            clip_min: clip_grid.0,
            dt: frame.dt(),
            clip_max: clip_grid.1,
            throttle: if throttle.is_nan() { 0.0 } else { throttle.clamp(0.0, 1.0) },
        };
        for kernel in passes.into_iter().flatten() {
            self.kernels.get(kernel).dispatch(
                backend,
                bytemuck::bytes_of(&params),
                &[occupancy.buffer],
                grid.cell_count(),
            );
        }
        true
    }
}
