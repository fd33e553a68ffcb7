use bytemuck::{Pod, Zeroable};
use cgmath::Matrix4;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{GridDimensions, ProceduralGrid};
use crate::draw::{Material, RenderSink};
use crate::error::CoreError;
use crate::frame::FrameTime;
use crate::gpu::{ComputeBackend, ProgramSource};
use crate::kernel_table::{KernelSet, KernelTable};
use crate::settings::FloorSettings;

pub const FLOOR_PROGRAM: ProgramSource = ProgramSource {
    label: "floor grid",
    wgsl: include_str!("../shaders/floor_grid.wgsl"),
    storage_buffers: 1,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FloorKernel {
    Update,
    Noise,
    Circle,
    Line,
}

impl KernelSet for FloorKernel {
    const ALL: &'static [Self] = &[FloorKernel::Update, FloorKernel::Noise, FloorKernel::Circle, FloorKernel::Line];

    fn entry_point(self) -> &'static str {
        match self {
            FloorKernel::Update => "Update",
            FloorKernel::Noise => "Noise",
            FloorKernel::Circle => "Circle",
            FloorKernel::Line => "Line",
        }
    }
}

/// One-shot displacement patterns.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FloorMode {
    #[default]
    Noise,
    Circle,
    Line,
}

impl FloorMode {
    pub const ALL: [FloorMode; 3] = [FloorMode::Noise, FloorMode::Circle, FloorMode::Line];

    pub fn from_index(index: i64) -> Self {
        Self::ALL[index.rem_euclid(Self::ALL.len() as i64) as usize]
    }

    fn kernel(self) -> FloorKernel {
        match self {
            FloorMode::Noise => FloorKernel::Noise,
            FloorMode::Circle => FloorKernel::Circle,
            FloorMode::Line => FloorKernel::Line,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FloorParams {
    pub plasticity: f32,
    pub _pad: [f32; 3],
    /// `(intensity, speed, scale, 1)`
    pub noise_params: [f32; 4],
    /// `(radius, radius + thickness, 0, 0)`
    pub radius: [f32; 4],
}

impl FloorParams {
    fn new(settings: &FloorSettings) -> Self {
        Self {
            plasticity: settings.plasticity,
            _pad: [0.0; 3],
            noise_params: [settings.noise_intensity, settings.noise_speed, settings.noise_scale, 1.0],
            radius: [settings.radius, settings.radius + settings.thickness, 0.0, 0.0],
        }
    }
}

pub struct FloorGrid {
    grid: ProceduralGrid,
    kernels: KernelTable<FloorKernel>,
    pending: Option<FloorMode>,
    rng: StdRng,
}

impl FloorGrid {
    pub fn new(
        backend: &mut dyn ComputeBackend,
        settings: &FloorSettings,
        local_to_world: Matrix4<f32>,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            grid: ProceduralGrid::new("floor grid", GridDimensions::from(&settings.grid), local_to_world),
            kernels: KernelTable::load(backend, &FLOOR_PROGRAM)?,
            pending: None,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn setup(&mut self, backend: &mut dyn ComputeBackend, settings: &FloorSettings) -> Result<(), CoreError> {
        self.grid.setup(backend, &settings.grid, &mut self.rng)
    }

    pub fn grid(&self) -> &ProceduralGrid {
        &self.grid
    }

    /// Queues one `mode` pass for the next update.
    pub fn trigger(&mut self, mode: FloorMode) {
        self.pending = Some(mode);
    }

    /// `Update` every frame, then any queued trigger.
    pub fn update(&mut self, backend: &mut dyn ComputeBackend, frame: &FrameTime, settings: &FloorSettings) {
        let params = FloorParams::new(settings);
        let seed = self.rng.gen();
        self.grid.compute(
            backend,
            self.kernels.get(FloorKernel::Update),
            &[],
            bytemuck::bytes_of(&params),
            frame,
            0.0,
            seed,
        );
        if let Some(mode) = self.pending.take() {
            log::debug!("floor {:?}", mode);
            self.grid.compute(
                backend,
                self.kernels.get(mode.kernel()),
                &[],
                bytemuck::bytes_of(&params),
                frame,
                0.0,
                seed,
            );
        }
    }

    pub fn render(&self, sink: &mut dyn RenderSink, settings: &FloorSettings) {
        self.grid.render(
            sink,
            Material::Floor {
                elevation: settings.elevation,
                gradient: settings.gradient.clone(),
            },
        );
    }

    pub fn release(&mut self, backend: &mut dyn ComputeBackend) {
        self.pending = None;
        self.grid.release(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::DrawCall;
    use crate::gpu::recording::RecordingBackend;
    use crate::grid::GridCommonParams;
    use cgmath::SquareMatrix;

    fn floor(backend: &mut RecordingBackend, settings: &FloorSettings) -> FloorGrid {
        let mut floor = FloorGrid::new(backend, settings, Matrix4::identity()).unwrap();
        floor.setup(backend, settings).unwrap();
        backend.clear_events();
        floor
    }

    #[test]
    fn update_runs_every_frame_and_trigger_once() {
        let mut backend = RecordingBackend::new();
        let settings = FloorSettings::default();
        let mut floor = floor(&mut backend, &settings);
        floor.update(&mut backend, &FrameTime::new(0, 0.0, 0.016), &settings);
        floor.trigger(FloorMode::Circle);
        floor.update(&mut backend, &FrameTime::new(1, 0.016, 0.016), &settings);
        floor.update(&mut backend, &FrameTime::new(2, 0.032, 0.016), &settings);
        assert_eq!(backend.dispatch_names(), ["Update", "Update", "Circle", "Update"]);
    }

    #[test]
    fn noise_and_radius_vectors() {
        let mut backend = RecordingBackend::new();
        let settings = FloorSettings::default();
        let mut floor = floor(&mut backend, &settings);
        floor.trigger(FloorMode::Noise);
        floor.update(&mut backend, &FrameTime::new(0, 20.0, 0.016), &settings);
        let dispatch = backend.dispatches()[1];
        let common = std::mem::size_of::<GridCommonParams>();
        let params: FloorParams = bytemuck::pod_read_unaligned(&dispatch.params[common..]);
        assert_eq!(params.noise_params, [3.0, 1.0, 0.5, 1.0]);
        assert_eq!(params.radius, [7.5, 12.5, 0.0, 0.0]);
        assert_eq!(params.plasticity, 10.0);
        assert_eq!(dispatch.params::<GridCommonParams>().time, [1.0, 20.0, 40.0, 60.0]);
    }

    #[test]
    fn render_carries_floor_material() {
        let mut backend = RecordingBackend::new();
        let settings = FloorSettings {
            elevation: 2.0,
            gradient: Some("ember".into()),
            ..FloorSettings::default()
        };
        let floor = floor(&mut backend, &settings);
        let mut calls: Vec<DrawCall> = Vec::new();
        floor.render(&mut calls, &settings);
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].material,
            Material::Floor {
                elevation: 2.0,
                gradient: Some("ember".into())
            }
        );
        assert_eq!(calls[0].instance_count, 128 * 128);
    }

    #[test]
    fn floor_mode_index_wraps() {
        assert_eq!(FloorMode::from_index(3), FloorMode::Noise);
        assert_eq!(FloorMode::from_index(-2), FloorMode::Circle);
    }
}
