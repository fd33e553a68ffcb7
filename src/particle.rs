//! GPU particle population and its update-mode state machine.
//!
//! The buffer is filled once by `Setup`; afterwards every frame runs exactly one
//! pass for the active [`ParticleMode`]. A latched flow trigger adds one extra
//! `Flow` pass with `dt = 0` after the continuous pass of that frame. Flow is
//! never a continuous mode: the burst it starts is carried by whichever mode
//! runs next.

use std::f32::consts::PI;

use bytemuck::{Pod, Zeroable};
use cgmath::{InnerSpace, Vector3, Zero};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::bounds::Bounds;
use crate::buffer_arena::StructuredBuffer;
use crate::error::CoreError;
use crate::frame::{self, FrameTime};
use crate::gpu::{BufferId, BufferUsage, ComputeBackend, ProgramSource};
use crate::kernel_table::{KernelSet, KernelTable};
use crate::settings::ParticleSettings;
use crate::voxel::Occupancy;

pub const PARTICLE_PROGRAM: ProgramSource = ProgramSource {
    label: "particle update",
    wgsl: include_str!("shaders/particle_update.wgsl"),
    storage_buffers: 2,
};

const TIME_DIVISOR: f32 = 4.0;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleRecord {
    pub position: [f32; 3],
    pub speed: f32,
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
    pub lifetime: f32,
    pub velocity: [f32; 3],
    /// Burst weight. A burst sets it to 1 and it decays while the particle
    /// drifts freely; at 0 the particle is steered by the active mode again.
    /// Kept as a float so the decay needs no second field.
    pub flow: f32,
    pub color: [f32; 4],
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ParticleMode {
    #[default]
    Immediate,
    Delay,
    Transform,
    Clip,
}

impl ParticleMode {
    pub const ALL: [ParticleMode; 4] = [
        ParticleMode::Immediate,
        ParticleMode::Delay,
        ParticleMode::Transform,
        ParticleMode::Clip,
    ];

    pub fn from_index(index: i64) -> Self {
        Self::ALL[index.rem_euclid(Self::ALL.len() as i64) as usize]
    }

    fn kernel(self) -> ParticleKernel {
        match self {
            ParticleMode::Immediate => ParticleKernel::Immediate,
            ParticleMode::Delay => ParticleKernel::Delay,
            ParticleMode::Transform => ParticleKernel::Transform,
            ParticleMode::Clip => ParticleKernel::Clip,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParticleKernel {
    Setup,
    Immediate,
    Delay,
    Transform,
    Clip,
    Flow,
}

impl KernelSet for ParticleKernel {
    const ALL: &'static [Self] = &[
        ParticleKernel::Setup,
        ParticleKernel::Immediate,
        ParticleKernel::Delay,
        ParticleKernel::Transform,
        ParticleKernel::Clip,
        ParticleKernel::Flow,
    ];

    fn entry_point(self) -> &'static str {
        match self {
            ParticleKernel::Setup => "Setup",
            ParticleKernel::Immediate => "Immediate",
            ParticleKernel::Delay => "Delay",
            ParticleKernel::Transform => "Transform",
            ParticleKernel::Clip => "Clip",
            ParticleKernel::Flow => "Flow",
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleParams {
    pub particle_count: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub start: [f32; 3],
    pub unit_length: f32,
    pub level: u32,
    pub seed: u32,
    pub flow_throttle: f32,
    pub dt: f32,
    pub inv_dt: f32,
    pub damper: f32,
    pub speed_limit: f32,
    pub delay_speed: f32,
    pub gravity: [f32; 3],
    pub transform_speed: f32,
    pub noise_offset: [f32; 3],
    pub clip_speed: f32,
    pub clip_min: [f32; 3],
    pub max_spin: f32,
    pub clip_max: [f32; 3],
    pub speed_to_spin: f32,
    pub noise_frequency: f32,
    pub noise_amplitude: f32,
    pub speed_min: f32,
    pub speed_max: f32,
    pub time: [f32; 4],
}

pub struct ParticleStateMachine {
    kernels: KernelTable<ParticleKernel>,
    particles: StructuredBuffer<ParticleRecord>,
    count: u32,
    mode: ParticleMode,
    flow_pending: bool,
    noise_offset: Vector3<f32>,
    seed: u32,
    rng: StdRng,
}

impl ParticleStateMachine {
    pub fn new(backend: &mut dyn ComputeBackend, count: u32) -> Result<Self, CoreError> {
        Self::with_rng(backend, count, StdRng::from_entropy())
    }

    pub fn with_rng(backend: &mut dyn ComputeBackend, count: u32, mut rng: StdRng) -> Result<Self, CoreError> {
        Ok(Self {
            kernels: KernelTable::load(backend, &PARTICLE_PROGRAM)?,
            particles: StructuredBuffer::new("particles", BufferUsage::Storage),
            count: count.max(1),
            mode: ParticleMode::Immediate,
            flow_pending: false,
            noise_offset: Vector3::zero(),
            seed: rng.gen(),
            rng,
        })
    }

    /// Allocates the particle buffer and runs the one-time `Setup` pass.
    pub fn setup(
        &mut self,
        backend: &mut dyn ComputeBackend,
        occupancy: &Occupancy,
        clip: &Bounds,
        frame: &FrameTime,
        settings: &ParticleSettings,
    ) -> Result<(), CoreError> {
        let particles = self.particles.acquire(backend, self.count)?;
        log::info!("allocated {} particles", self.count);
        let params = self.params(occupancy, clip, frame.dt(), frame, settings);
        self.kernels.get(ParticleKernel::Setup).dispatch(
            backend,
            bytemuck::bytes_of(&params),
            &[particles, occupancy.buffer],
            self.count,
        );
        Ok(())
    }

    pub fn mode(&self) -> ParticleMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ParticleMode) {
        if mode != self.mode {
            log::info!("particle mode {:?} -> {:?}", self.mode, mode);
        }
        self.mode = mode;
    }

    /// Latches one `Flow` pass for the next `step`.
    pub fn trigger_flow(&mut self) {
        self.flow_pending = true;
        self.seed = self.rng.gen();
    }

    pub fn particles(&self) -> Option<BufferId> {
        self.particles.id()
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Runs the active mode's pass, then any latched flow pass. Does nothing
    /// before `setup`.
    pub fn step(
        &mut self,
        backend: &mut dyn ComputeBackend,
        occupancy: &Occupancy,
        clip: &Bounds,
        frame: &FrameTime,
        settings: &ParticleSettings,
    ) {
        let Some(particles) = self.particles.id() else {
            return;
        };
        let buffers = [particles, occupancy.buffer];

        self.advance_noise(frame.dt(), settings);
        let params = self.params(occupancy, clip, frame.dt(), frame, settings);
        self.kernels
            .get(self.mode.kernel())
            .dispatch(backend, bytemuck::bytes_of(&params), &buffers, self.count);

        if std::mem::take(&mut self.flow_pending) {
            log::debug!("flow fired, throttle {}", settings.flow_throttle);
            let params = self.params(occupancy, clip, 0.0, frame, settings);
            self.kernels
                .get(ParticleKernel::Flow)
                .dispatch(backend, bytemuck::bytes_of(&params), &buffers, self.count);
        }
    }

    pub fn release(&mut self, backend: &mut dyn ComputeBackend) {
        self.particles.release(backend);
        self.flow_pending = false;
    }

    fn advance_noise(&mut self, dt: f32, settings: &ParticleSettings) {
        let gravity = Vector3::from(settings.gravity);
        let direction = if gravity.magnitude2() > 0.0 {
            gravity.normalize()
        } else {
            Vector3::unit_y()
        };
        self.noise_offset += direction * settings.noise_motion * frame::sanitize_dt(dt);
    }

    fn params(
        &self,
        occupancy: &Occupancy,
        clip: &Bounds,
        dt: f32,
        frame: &FrameTime,
        settings: &ParticleSettings,
    ) -> ParticleParams {
        let dt = frame::sanitize_dt(dt);
        let grid = &occupancy.grid;
        let spin_scale = PI * dt / 360.0;
        ParticleParams {
            particle_count: self.count,
            width: grid.width,
            height: grid.height,
            depth: grid.depth,
            start: grid.start.into(),
            unit_length: grid.unit_length,
            level: grid.level,
            seed: self.seed,
            flow_throttle: settings.flow_throttle,
            dt,
            inv_dt: frame::inv_dt(dt),
            damper: (-settings.drag * dt).exp(),
            speed_limit: settings.speed_limit,
            delay_speed: settings.delay_speed,
            gravity: (Vector3::from(settings.gravity) * dt).into(),
            transform_speed: settings.transform_speed,
            noise_offset: self.noise_offset.into(),
            clip_speed: settings.clip_speed,
            clip_min: clip.min.into(),
            max_spin: settings.max_spin * spin_scale,
            clip_max: clip.max.into(),
            speed_to_spin: settings.speed_to_spin * spin_scale,
            noise_frequency: settings.noise_frequency,
            noise_amplitude: settings.noise_amplitude * dt,
            speed_min: settings.speed_scale_min,
            speed_max: settings.speed_scale_max,
            time: frame.time_vector(TIME_DIVISOR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recording::RecordingBackend;
    use crate::voxel::VoxelGrid;

    struct Fixture {
        backend: RecordingBackend,
        occupancy: Occupancy,
        clip: Bounds,
        particles: ParticleStateMachine,
        settings: ParticleSettings,
    }

    fn fixture() -> Fixture {
        let mut backend = RecordingBackend::new();
        let clip = Bounds::new(Vector3::new(-1.0, -1.0, -1.0), Vector3::new(1.0, 1.0, 1.0));
        let grid = VoxelGrid::fit(&clip, 32, 0);
        let occupancy = Occupancy {
            buffer: backend.create_buffer("voxels", grid.cell_count() as u64 * 32, BufferUsage::Storage),
            grid,
        };
        let mut particles = ParticleStateMachine::with_rng(&mut backend, 1000, StdRng::seed_from_u64(3)).unwrap();
        let settings = ParticleSettings::default();
        particles
            .setup(&mut backend, &occupancy, &clip, &FrameTime::new(0, 0.0, 0.0), &settings)
            .unwrap();
        backend.clear_events();
        Fixture {
            backend,
            occupancy,
            clip,
            particles,
            settings,
        }
    }

    impl Fixture {
        fn step(&mut self, frame: FrameTime) {
            self.particles
                .step(&mut self.backend, &self.occupancy, &self.clip, &frame, &self.settings);
        }
    }

    #[test]
    fn setup_allocates_and_dispatches_once() {
        let mut backend = RecordingBackend::new();
        let clip = Bounds::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let grid = VoxelGrid::fit(&clip, 10, 0);
        let occupancy = Occupancy {
            buffer: backend.create_buffer("voxels", grid.cell_count() as u64 * 32, BufferUsage::Storage),
            grid,
        };
        let mut particles = ParticleStateMachine::with_rng(&mut backend, 130, StdRng::seed_from_u64(1)).unwrap();
        let settings = ParticleSettings::default();
        particles
            .setup(&mut backend, &occupancy, &clip, &FrameTime::new(0, 0.0, 0.0), &settings)
            .unwrap();
        assert_eq!(backend.dispatch_names(), ["Setup"]);
        let setup = backend.dispatches()[0];
        assert_eq!(setup.groups, [3, 1, 1]);
        let params = setup.params::<ParticleParams>();
        assert_eq!((params.speed_min, params.speed_max), (2.0, 5.0));
        let id = particles.particles().unwrap();
        assert_eq!(backend.buffer_size(id), Some(130 * 80));
    }

    #[test]
    fn exactly_one_pass_per_frame_for_every_mode() {
        let mut f = fixture();
        for (i, mode) in ParticleMode::ALL.iter().enumerate() {
            f.particles.set_mode(*mode);
            f.backend.clear_events();
            f.step(FrameTime::new(i as u64, i as f32 * 0.016, 0.016));
            assert_eq!(f.backend.dispatches().len(), 1, "{:?}", mode);
            assert_eq!(f.backend.dispatch_names()[0], mode.kernel().entry_point());
        }
    }

    #[test]
    fn flow_trigger_fires_once_with_zero_dt() {
        let mut f = fixture();
        f.settings.flow_throttle = 0.1;
        f.particles.set_mode(ParticleMode::Delay);
        f.particles.trigger_flow();
        f.step(FrameTime::new(1, 1.0, 0.016));
        assert_eq!(f.backend.dispatch_names(), ["Delay", "Flow"]);
        let continuous = f.backend.dispatches()[0].params::<ParticleParams>();
        let flow = f.backend.dispatches()[1].params::<ParticleParams>();
        assert_eq!(continuous.dt, 0.016);
        assert_eq!(flow.dt, 0.0);
        assert_eq!(flow.inv_dt, 0.0);
        assert_eq!(flow.flow_throttle, 0.1);

        f.backend.clear_events();
        f.step(FrameTime::new(2, 1.016, 0.016));
        assert_eq!(f.backend.dispatch_names(), ["Delay"]);
    }

    #[test]
    fn flow_is_never_a_continuous_pass() {
        let mut f = fixture();
        for index in -8..8 {
            f.particles.set_mode(ParticleMode::from_index(index));
            f.backend.clear_events();
            f.step(FrameTime::new(1, 1.0, 0.016));
            let names = f.backend.dispatch_names();
            assert_eq!(names.len(), 1);
            assert!(names.iter().all(|n| n != "Flow"), "mode index {index}");
        }
    }

    #[test]
    fn largest_population_fits_one_dispatch_dimension() {
        let mut backend = RecordingBackend::new();
        let clip = Bounds::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let grid = VoxelGrid::fit(&clip, 10, 0);
        let occupancy = Occupancy {
            buffer: backend.create_buffer("voxels", grid.cell_count() as u64 * 32, BufferUsage::Storage),
            grid,
        };
        let mut settings = crate::settings::SimulationSettings::default();
        settings.particle.count = u32::MAX;
        let settings = settings.sanitized().particle;
        let mut particles =
            ParticleStateMachine::with_rng(&mut backend, settings.count, StdRng::seed_from_u64(5)).unwrap();
        particles
            .setup(&mut backend, &occupancy, &clip, &FrameTime::new(0, 0.0, 0.0), &settings)
            .unwrap();
        particles.trigger_flow();
        particles.step(&mut backend, &occupancy, &clip, &FrameTime::new(1, 0.016, 0.016), &settings);
        let groups: Vec<_> = backend.dispatches().iter().map(|d| d.groups[0]).collect();
        assert_eq!(groups.len(), 3);
        assert!(groups.iter().all(|g| *g == crate::settings::MAX_WORKGROUPS_PER_DIMENSION), "{groups:?}");
    }

    #[test]
    fn non_positive_dt_never_divides() {
        let mut f = fixture();
        f.step(FrameTime::new(1, 1.0, -0.2));
        let params = f.backend.dispatches()[0].params::<ParticleParams>();
        assert_eq!(params.dt, 0.0);
        assert_eq!(params.inv_dt, 0.0);
        assert_eq!(params.damper, 1.0);
        assert!(params.inv_dt.is_finite());
    }

    #[test]
    fn noise_offset_drifts_along_gravity_or_up() {
        let mut f = fixture();
        f.settings.noise_motion = 2.0;
        f.step(FrameTime::new(1, 0.5, 0.5));
        let params = f.backend.dispatches()[0].params::<ParticleParams>();
        assert_eq!(params.noise_offset, [0.0, 1.0, 0.0]);

        f.settings.gravity = [0.0, 0.0, -2.0];
        f.backend.clear_events();
        f.step(FrameTime::new(2, 1.0, 0.5));
        let params = f.backend.dispatches()[0].params::<ParticleParams>();
        assert_eq!(params.noise_offset, [0.0, 1.0, -1.0]);
        assert_eq!(params.gravity, [0.0, 0.0, -1.0]);
    }

    #[test]
    fn clip_bounds_pass_through_in_world_units() {
        let mut f = fixture();
        f.clip = Bounds::new(Vector3::new(-0.5, 0.0, -0.25), Vector3::new(0.5, 1.0, 0.25));
        f.particles.set_mode(ParticleMode::Clip);
        f.step(FrameTime::new(1, 1.0, 0.016));
        let params = f.backend.dispatches()[0].params::<ParticleParams>();
        assert_eq!(params.clip_min, [-0.5, 0.0, -0.25]);
        assert_eq!(params.clip_max, [0.5, 1.0, 0.25]);
    }

    #[test]
    fn step_before_setup_is_a_no_op() {
        let mut backend = RecordingBackend::new();
        let clip = Bounds::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let grid = VoxelGrid::fit(&clip, 10, 0);
        let occupancy = Occupancy {
            buffer: backend.create_buffer("voxels", 32, BufferUsage::Storage),
            grid,
        };
        let mut particles = ParticleStateMachine::with_rng(&mut backend, 10, StdRng::seed_from_u64(1)).unwrap();
        particles.step(
            &mut backend,
            &occupancy,
            &clip,
            &FrameTime::new(0, 0.0, 0.016),
            &ParticleSettings::default(),
        );
        assert!(backend.dispatches().is_empty());
    }

    #[test]
    fn mode_index_wraps() {
        assert_eq!(ParticleMode::from_index(4), ParticleMode::Immediate);
        assert_eq!(ParticleMode::from_index(-1), ParticleMode::Clip);
    }
}
