//! Voxelizer, voxel control and particles wired to one tracked source.

use cgmath::{Matrix4, SquareMatrix};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::bounds::{Bounds, TrackingBounds};
use crate::clip::ClipRegion;
use crate::draw::{DrawCall, Material, RecordLayout, RenderSink};
use crate::error::CoreError;
use crate::frame::FrameTime;
use crate::gpu::ComputeBackend;
use crate::particle::{ParticleMode, ParticleStateMachine};
use crate::settings::SimulationSettings;
use crate::source::{MeshSource, SampledMesh};
use crate::voxel::control::{VoxelControl, VoxelMode};
use crate::voxel::{Occupancy, Voxelizer};

pub struct VoxelParticleSystem {
    voxelizer: Voxelizer,
    control: VoxelControl,
    particles: ParticleStateMachine,
    tracking: TrackingBounds,
    clip: ClipRegion,
    mesh: Option<SampledMesh>,
    rng: StdRng,
}

impl VoxelParticleSystem {
    pub fn new(backend: &mut dyn ComputeBackend, settings: &SimulationSettings) -> Result<Self, CoreError> {
        Ok(Self {
            voxelizer: Voxelizer::new(backend)?,
            control: VoxelControl::new(backend)?,
            particles: ParticleStateMachine::new(backend, settings.particle.count)?,
            tracking: TrackingBounds::new(),
            clip: ClipRegion::default(),
            mesh: None,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn particle_mode(&self) -> ParticleMode {
        self.particles.mode()
    }

    pub fn set_particle_mode(&mut self, mode: ParticleMode) {
        self.particles.set_mode(mode);
    }

    pub fn trigger_flow(&mut self) {
        self.particles.trigger_flow();
    }

    pub fn voxel_mode(&self) -> VoxelMode {
        self.control.mode()
    }

    pub fn set_voxel_mode(&mut self, mode: VoxelMode) {
        self.control.set_mode(mode);
    }

    /// One Randomize or Glitch pass on the next frame's fresh occupancy.
    pub fn fire_voxel_once(&mut self, mode: VoxelMode) {
        self.control.fire_once(mode);
    }

    pub fn clip(&self) -> &ClipRegion {
        &self.clip
    }

    pub fn clip_mut(&mut self) -> &mut ClipRegion {
        &mut self.clip
    }

    pub fn randomize_clip(&mut self, limit: f32) {
        self.clip.randomize(&mut self.rng, limit);
    }

    pub fn tracking_bounds(&self) -> Option<Bounds> {
        self.tracking.get()
    }

    pub fn occupancy(&self) -> Option<Occupancy> {
        self.voxelizer.occupancy()
    }

    /// Sample, voxelize, voxel-control pass, particle pass.
    pub fn update(
        &mut self,
        backend: &mut dyn ComputeBackend,
        source: &mut dyn MeshSource,
        frame: &FrameTime,
        settings: &SimulationSettings,
    ) -> Result<(), CoreError> {
        if self.mesh.is_none() || frame.index % settings.voxel.sample_interval.max(1) as u64 == 0 {
            let mesh = source.sample(frame.elapsed);
            self.tracking.track(&mesh.bounds);
            self.mesh = Some(mesh);
        }
        let (Some(mesh), Some(bounds)) = (self.mesh.as_ref(), self.tracking.get()) else {
            return Ok(());
        };

        let grid = self.voxelizer.voxelize(backend, mesh, &bounds, &settings.voxel)?;
        let Some(occupancy) = self.voxelizer.occupancy() else {
            return Ok(());
        };

        self.control.dispatch(
            backend,
            &occupancy,
            self.clip.grid_bounds(&bounds, &grid),
            frame,
            settings.voxel.throttle,
        );

        let clip = self.clip.world_bounds(&bounds);
        if self.particles.particles().is_none() {
            self.particles.setup(backend, &occupancy, &clip, frame, &settings.particle)?;
        } else {
            self.particles.step(backend, &occupancy, &clip, frame, &settings.particle);
        }
        Ok(())
    }

    pub fn render(&self, sink: &mut dyn RenderSink) {
        let Some(particles) = self.particles.particles() else {
            return;
        };
        sink.draw(DrawCall::new(
            "particles",
            particles,
            RecordLayout::Particle,
            self.particles.count(),
            Matrix4::identity(),
            Material::Particles,
        ));
    }

    pub fn release(&mut self, backend: &mut dyn ComputeBackend) {
        self.particles.release(backend);
        self.voxelizer.release(backend);
        self.mesh = None;
    }
}
