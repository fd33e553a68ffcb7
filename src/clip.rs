use cgmath::Vector3;
use rand::Rng;

use crate::bounds::Bounds;
use crate::voxel::VoxelGrid;

/// Finest subdivision `grid_cell` honours along any axis.
pub const MAX_CLIP_CELLS: u32 = 1024;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Normalized sub-region of the base clip bounds used by the Clip passes.
///
/// After every setter each component lies in `[0,1]` and `min <= max`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ClipRegion {
    min: [f32; 3],
    max: [f32; 3],
}

impl Default for ClipRegion {
    fn default() -> Self {
        Self {
            min: [0.0; 3],
            max: [1.0; 3],
        }
    }
}

impl ClipRegion {
    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        let mut region = Self { min, max };
        region.constrain();
        region
    }

    pub fn min(&self) -> [f32; 3] {
        self.min
    }

    pub fn max(&self) -> [f32; 3] {
        self.max
    }

    pub fn set(&mut self, min: [f32; 3], max: [f32; 3]) {
        self.min = min;
        self.max = max;
        self.constrain();
    }

    pub fn set_min(&mut self, min: [f32; 3]) {
        self.min = min;
        self.constrain();
    }

    pub fn set_max(&mut self, max: [f32; 3]) {
        self.max = max;
        self.constrain();
    }

    /// Moves one axis' pair of clip planes, as a min/max clipper pair does.
    pub fn set_axis(&mut self, axis: Axis, tmin: f32, tmax: f32) {
        let i = axis.index();
        self.min[i] = tmin.min(tmax);
        self.max[i] = tmin.max(tmax);
        self.constrain();
    }

    /// Tall centred column.
    pub fn big_one(&mut self) {
        self.set([0.25, 0.0, 0.25], [0.75, 1.0, 0.75]);
    }

    /// Selects cell `index` of a `width x height x depth` subdivision, x-major.
    /// Each dimension is clamped to `1..=MAX_CLIP_CELLS`.
    pub fn grid_cell(&mut self, index: i64, width: u32, height: u32, depth: u32) {
        let [width, height, depth] = [width, height, depth].map(|n| n.clamp(1, MAX_CLIP_CELLS));
        let count = width as i64 * height as i64 * depth as i64;
        let index = index.rem_euclid(count);
        let plane = width as i64 * height as i64;
        let z = index / plane;
        let rem = index % plane;
        let y = rem / width as i64;
        let x = rem % width as i64;
        let inv = [1.0 / width as f32, 1.0 / height as f32, 1.0 / depth as f32];
        let min = [x as f32 * inv[0], y as f32 * inv[1], z as f32 * inv[2]];
        self.set(min, [min[0] + inv[0], min[1] + inv[1], min[2] + inv[2]]);
    }

    /// Random box whose extent along each axis is at least `limit` where room
    /// allows.
    pub fn randomize(&mut self, rng: &mut impl Rng, limit: f32) {
        let limit = limit.clamp(0.0, 1.0);
        let mut min = [0.0; 3];
        let mut max = [0.0; 3];
        for i in 0..3 {
            min[i] = rng.gen::<f32>();
            max[i] = min[i] + limit + rng.gen::<f32>() * (1.0 - min[i] - limit);
        }
        self.set(min, max);
    }

    fn constrain(&mut self) {
        for i in 0..3 {
            let min = sanitize_unit(self.min[i], 0.0);
            let max = sanitize_unit(self.max[i], 1.0);
            self.min[i] = min.min(max);
            self.max[i] = max;
        }
    }

    /// The region in world units, relative to `base`.
    pub fn world_bounds(&self, base: &Bounds) -> Bounds {
        Bounds {
            min: base.lerp(Vector3::from(self.min)),
            max: base.lerp(Vector3::from(self.max)),
        }
    }

    /// The region in voxel-cell units of `grid`.
    pub fn grid_bounds(&self, base: &Bounds, grid: &VoxelGrid) -> ([f32; 3], [f32; 3]) {
        let world = self.world_bounds(base);
        (grid.world_to_grid(world.min), grid.world_to_grid(world.max))
    }
}

fn sanitize_unit(v: f32, fallback: f32) -> f32 {
    if v.is_nan() {
        fallback
    } else {
        v.clamp(0.0, 1.0)
    }
}
