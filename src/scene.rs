//! Composition root for one frame loop.
//!
//! Frame order: sample and voxelize, voxel control, particles, grids. Draw
//! calls are handed out afterwards by [`Scene::render`].

use cgmath::{Deg, Matrix4, Vector3};

use crate::draw::RenderSink;
use crate::error::CoreError;
use crate::frame::FrameTime;
use crate::gpu::ComputeBackend;
use crate::grid::floor::{FloorGrid, FloorMode};
use crate::grid::midair::{MidairGrid, MidairMotion};
use crate::params::ParameterEvent;
use crate::particle::ParticleMode;
use crate::settings::SimulationSettings;
use crate::source::MeshSource;
use crate::system::VoxelParticleSystem;
use crate::voxel::control::VoxelMode;


const MIDAIR_SCALE: f32 = 4.0;
const FLOOR_SCALE: f32 = 24.0;
const FLOOR_HEIGHT: f32 = -2.5;

pub struct Scene {
    settings: SimulationSettings,
    system: VoxelParticleSystem,
    midair: MidairGrid,
    floor: FloorGrid,
}

impl Scene {
    pub fn new(backend: &mut dyn ComputeBackend, settings: SimulationSettings) -> Result<Self, CoreError> {
        let settings = settings.sanitized();
        let system = VoxelParticleSystem::new(backend, &settings)?;

        let mut midair = MidairGrid::new(backend, &settings.midair, Matrix4::from_scale(MIDAIR_SCALE))?;
        midair.setup(backend, &settings.midair)?;

        let floor_transform = Matrix4::from_translation(Vector3::new(0.0, FLOOR_HEIGHT, 0.0))
            * Matrix4::from_angle_x(Deg(-90.0))
            * Matrix4::from_scale(FLOOR_SCALE);
        let mut floor = FloorGrid::new(backend, &settings.floor, floor_transform)?;
        floor.setup(backend, &settings.floor)?;

        Ok(Self {
            settings,
            system,
            midair,
            floor,
        })
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    pub fn system(&self) -> &VoxelParticleSystem {
        &self.system
    }

    pub fn midair(&self) -> &MidairGrid {
        &self.midair
    }

    pub fn floor(&self) -> &FloorGrid {
        &self.floor
    }

    pub fn apply(&mut self, event: ParameterEvent) {
        let settings = &mut self.settings;
        match event {
            ParameterEvent::ParticleMode(index) => self.system.set_particle_mode(ParticleMode::from_index(index)),
            ParameterEvent::VoxelMode(index) => self.system.set_voxel_mode(VoxelMode::from_index(index)),
            ParameterEvent::Level(level) => settings.voxel.level = level.clamp(0, u32::MAX as i64) as u32,
            ParameterEvent::BaseResolution(resolution) => settings.voxel.base_resolution = resolution,
            ParameterEvent::VoxelThrottle(v) => settings.voxel.throttle = v,
            ParameterEvent::FlowThrottle(v) => settings.particle.flow_throttle = v,
            ParameterEvent::Drag(v) => settings.particle.drag = v,
            ParameterEvent::SpeedLimit(v) => settings.particle.speed_limit = v,
            ParameterEvent::Gravity(g) => settings.particle.gravity = g,
            ParameterEvent::NoiseAmplitude(v) => settings.particle.noise_amplitude = v,
            ParameterEvent::NoiseFrequency(v) => settings.particle.noise_frequency = v,
            ParameterEvent::DelaySpeed(v) => settings.particle.delay_speed = v,
            ParameterEvent::TransformSpeed(v) => settings.particle.transform_speed = v,
            ParameterEvent::ClipSpeed(v) => settings.particle.clip_speed = v,

            ParameterEvent::ClipMin(min) => self.system.clip_mut().set_min(min),
            ParameterEvent::ClipMax(max) => self.system.clip_mut().set_max(max),
            ParameterEvent::ClipAxis { axis, min, max } => self.system.clip_mut().set_axis(axis, min, max),
            ParameterEvent::ClipBigOne => self.system.clip_mut().big_one(),
            ParameterEvent::ClipGridCell {
                index,
                width,
                height,
                depth,
            } => self.system.clip_mut().grid_cell(index, width, height, depth),
            ParameterEvent::ClipRandomize => self.system.randomize_clip(settings.voxel.clip_limit),

            ParameterEvent::TriggerFlow => self.system.trigger_flow(),
            ParameterEvent::Randomize => self.system.fire_voxel_once(VoxelMode::Randomize),
            ParameterEvent::Glitch => self.system.fire_voxel_once(VoxelMode::Glitch),

            ParameterEvent::MidairInit => self.midair.init(&settings.midair),
            ParameterEvent::MidairRotate => self.midair.rotate(&settings.midair),
            ParameterEvent::MidairScale => self.midair.scale(&settings.midair),
            ParameterEvent::MidairMotion(index) => self.midair.set_motion(MidairMotion::from_index(index)),
            ParameterEvent::MidairExtrusion(v) => settings.midair.extrusion = v,
            ParameterEvent::MidairThickness(v) => settings.midair.thickness = v,
            ParameterEvent::MidairThrottle(v) => settings.midair.throttle = v,
            ParameterEvent::MidairDuration(v) => settings.midair.duration = v,

            ParameterEvent::FloorTrigger(index) => self.floor.trigger(FloorMode::from_index(index)),
            ParameterEvent::FloorPlasticity(v) => settings.floor.plasticity = v,
            ParameterEvent::FloorElevation(v) => settings.floor.elevation = v,
        }
        self.settings = std::mem::take(&mut self.settings).sanitized();
    }

    pub fn update(
        &mut self,
        backend: &mut dyn ComputeBackend,
        source: &mut dyn MeshSource,
        frame: &FrameTime,
    ) -> Result<(), CoreError> {
        self.system.update(backend, source, frame, &self.settings)?;
        self.floor.update(backend, frame, &self.settings.floor);
        self.midair.update(backend, frame, &self.settings.midair);
        Ok(())
    }

    pub fn render(&self, sink: &mut dyn RenderSink) {
        self.floor.render(sink, &self.settings.floor);
        self.system.render(sink);
        self.midair.render(sink);
    }

    /// Releases every GPU buffer the scene owns.
    pub fn teardown(&mut self, backend: &mut dyn ComputeBackend) {
        self.system.release(backend);
        self.midair.release(backend);
        self.floor.release(backend);
        log::info!("scene torn down");
    }
}
