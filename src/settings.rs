//! Parameter snapshot for the simulation, persisted as JSON.
//!
//! Every field has a default so partial files load, and `sanitized` clamps the
//! snapshot into the ranges the GPU passes accept. The frame loop hands the
//! current snapshot to each pass explicitly.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const SETTINGS_SCHEMA_VERSION: u32 = 1;

pub const MIN_BASE_RESOLUTION: u32 = 10;
/// Keeps `resolution^3 / 64` within the per-dimension dispatch limit.
pub const MAX_BASE_RESOLUTION: u32 = 128;
pub const MAX_LOD_LEVEL: u32 = 3;
/// wgpu's default `max_compute_workgroups_per_dimension`.
pub const MAX_WORKGROUPS_PER_DIMENSION: u32 = 65_535;
/// Width of every compute kernel's workgroup along X.
pub const WORKGROUP_WIDTH: u32 = 64;
/// Largest element count a single 1D dispatch can cover.
pub const MAX_DISPATCH_ELEMENTS: u32 = MAX_WORKGROUPS_PER_DIMENSION * WORKGROUP_WIDTH;
pub const MAX_PARTICLE_COUNT: u32 = MAX_DISPATCH_ELEMENTS;
pub const MAX_GRID_AXIS: u32 = 512;
pub const MAX_GRID_INSTANCES: u32 = MAX_DISPATCH_ELEMENTS;
const MAX_DRAG: f32 = 15.0;
const MAX_DELAY_SPEED: f32 = 5.0;
const MAX_PLASTICITY: f32 = 100.0;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoxelSettings {
    pub base_resolution: u32,
    pub level: u32,
    pub throttle: f32,
    /// Resample the source mesh every n-th frame.
    pub sample_interval: u32,
    /// Smallest extent a randomized clip region keeps per axis.
    pub clip_limit: f32,
}

impl Default for VoxelSettings {
    fn default() -> Self {
        Self {
            base_resolution: 64,
            level: 0,
            throttle: 0.1,
            sample_interval: 1,
            clip_limit: 0.15,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParticleSettings {
    pub count: u32,
    pub speed_scale_min: f32,
    pub speed_scale_max: f32,
    pub speed_limit: f32,
    pub drag: f32,
    pub gravity: [f32; 3],
    pub speed_to_spin: f32,
    pub max_spin: f32,
    pub noise_amplitude: f32,
    pub noise_frequency: f32,
    pub noise_motion: f32,
    pub delay_speed: f32,
    pub transform_speed: f32,
    pub clip_speed: f32,
    pub flow_throttle: f32,
}

impl Default for ParticleSettings {
    fn default() -> Self {
        Self {
            count: 64 * 64 * 64,
            speed_scale_min: 2.0,
            speed_scale_max: 5.0,
            speed_limit: 1.0,
            drag: 0.1,
            gravity: [0.0; 3],
            speed_to_spin: 60.0,
            max_spin: 20.0,
            noise_amplitude: 1.0,
            noise_frequency: 0.01,
            noise_motion: 1.0,
            delay_speed: 1.5,
            transform_speed: 1.0,
            clip_speed: 1.0,
            flow_throttle: 0.1,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GridSettings {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mass_min: f32,
    pub mass_max: f32,
}

impl GridSettings {
    fn with_dims(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
            mass_min: 0.25,
            mass_max: 1.0,
        }
    }

    pub fn instance_count(&self) -> u32 {
        self.width * self.height * self.depth
    }

    fn sanitize(&mut self) {
        self.width = self.width.clamp(1, MAX_GRID_AXIS);
        self.height = self.height.clamp(1, MAX_GRID_AXIS);
        self.depth = self.depth.clamp(1, MAX_GRID_AXIS);
        let plane = self.width * self.height;
        if plane * self.depth > MAX_GRID_INSTANCES {
            self.depth = (MAX_GRID_INSTANCES / plane).max(1);
        }
        self.mass_min = self.mass_min.clamp(0.0, 1.0);
        self.mass_max = self.mass_max.clamp(self.mass_min, 1.0);
    }
}

impl Default for GridSettings {
    fn default() -> Self {
        Self::with_dims(128, 128, 1)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MidairSettings {
    pub grid: GridSettings,
    pub duration: f32,
    pub extrusion: f32,
    pub thickness: f32,
    pub throttle: f32,
    pub wave: [f32; 4],
    pub force: [f32; 3],
    pub force_distance: f32,
}

impl Default for MidairSettings {
    fn default() -> Self {
        Self {
            grid: GridSettings::with_dims(16, 16, 16),
            duration: 0.5,
            extrusion: 0.05,
            thickness: 0.001,
            throttle: 0.5,
            wave: [0.0; 4],
            force: [0.0; 3],
            force_distance: 3.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FloorSettings {
    pub grid: GridSettings,
    pub plasticity: f32,
    pub noise_speed: f32,
    pub noise_scale: f32,
    pub noise_intensity: f32,
    pub radius: f32,
    pub thickness: f32,
    pub elevation: f32,
    pub gradient: Option<String>,
}

impl Default for FloorSettings {
    fn default() -> Self {
        Self {
            grid: GridSettings::default(),
            plasticity: 10.0,
            noise_speed: 1.0,
            noise_scale: 0.5,
            noise_intensity: 3.0,
            radius: 7.5,
            thickness: 5.0,
            elevation: 0.0,
            gradient: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationSettings {
    pub schema_version: u32,
    pub voxel: VoxelSettings,
    pub particle: ParticleSettings,
    pub midair: MidairSettings,
    pub floor: FloorSettings,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            schema_version: SETTINGS_SCHEMA_VERSION,
            voxel: VoxelSettings::default(),
            particle: ParticleSettings::default(),
            midair: MidairSettings::default(),
            floor: FloorSettings::default(),
        }
    }
}

impl SimulationSettings {
    pub fn sanitized(mut self) -> Self {
        self.schema_version = SETTINGS_SCHEMA_VERSION;

        let voxel = &mut self.voxel;
        voxel.base_resolution = voxel.base_resolution.clamp(MIN_BASE_RESOLUTION, MAX_BASE_RESOLUTION);
        voxel.level = voxel.level.min(MAX_LOD_LEVEL);
        voxel.throttle = clamp_unit(voxel.throttle);
        voxel.sample_interval = voxel.sample_interval.max(1);
        voxel.clip_limit = clamp_unit(voxel.clip_limit);

        let particle = &mut self.particle;
        particle.count = particle.count.clamp(1, MAX_PARTICLE_COUNT);
        particle.speed_scale_min = non_negative(particle.speed_scale_min);
        particle.speed_scale_max = non_negative(particle.speed_scale_max).max(particle.speed_scale_min);
        particle.speed_limit = non_negative(particle.speed_limit);
        particle.drag = non_negative(particle.drag).min(MAX_DRAG);
        particle.gravity = particle.gravity.map(finite_or_zero);
        particle.speed_to_spin = finite_or_zero(particle.speed_to_spin);
        particle.max_spin = finite_or_zero(particle.max_spin);
        particle.noise_amplitude = finite_or_zero(particle.noise_amplitude);
        particle.noise_frequency = finite_or_zero(particle.noise_frequency);
        particle.noise_motion = finite_or_zero(particle.noise_motion);
        particle.delay_speed = non_negative(particle.delay_speed).min(MAX_DELAY_SPEED);
        particle.transform_speed = non_negative(particle.transform_speed);
        particle.clip_speed = non_negative(particle.clip_speed);
        particle.flow_throttle = clamp_unit(particle.flow_throttle);

        let midair = &mut self.midair;
        midair.grid.sanitize();
        midair.duration = if midair.duration.is_nan() { 0.5 } else { midair.duration.clamp(0.1, 1.0) };
        midair.extrusion = clamp_unit(midair.extrusion);
        midair.thickness = clamp_unit(midair.thickness);
        midair.throttle = clamp_unit(midair.throttle);
        midair.wave = midair.wave.map(finite_or_zero);
        midair.force = midair.force.map(finite_or_zero);
        midair.force_distance = if midair.force_distance.is_finite() {
            midair.force_distance.max(1e-3)
        } else {
            3.0
        };

        let floor = &mut self.floor;
        floor.grid.sanitize();
        floor.plasticity = non_negative(floor.plasticity).min(MAX_PLASTICITY);
        floor.noise_speed = finite_or_zero(floor.noise_speed);
        floor.noise_scale = finite_or_zero(floor.noise_scale);
        floor.noise_intensity = finite_or_zero(floor.noise_intensity);
        floor.radius = non_negative(floor.radius);
        floor.thickness = non_negative(floor.thickness);
        floor.elevation = finite_or_zero(floor.elevation);
        floor.gradient = floor
            .gradient
            .take()
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty());

        self
    }

    /// Loads and sanitizes a settings file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let settings: SimulationSettings = serde_json::from_str(&text)?;
                log::info!("loaded settings from {}", path.display());
                Ok(settings.sanitized())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("no settings at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

fn non_negative(v: f32) -> f32 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        0.0
    }
}

fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}
