use std::f32::consts::PI;

use crate::bounds::Bounds;

/// A triangle soup sampled from a deforming surface at one instant.
#[derive(Clone, Debug, PartialEq)]
pub struct SampledMesh {
    pub positions: Vec<[f32; 3]>,
    /// Three indices per triangle.
    pub indices: Vec<u32>,
    pub bounds: Bounds,
}

impl SampledMesh {
    /// Bounds collapse to the origin when there are no positions.
    pub fn new(positions: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        let bounds = Bounds::from_points(positions.iter()).unwrap_or(Bounds::new(
            cgmath::Vector3::new(0.0, 0.0, 0.0),
            cgmath::Vector3::new(0.0, 0.0, 0.0),
        ));
        Self {
            positions,
            indices,
            bounds,
        }
    }

    pub fn triangle_count(&self) -> u32 {
        (self.indices.len() / 3) as u32
    }
}

pub trait MeshSource {
    /// Samples the surface at `elapsed` seconds.
    fn sample(&mut self, elapsed: f32) -> SampledMesh;
}

/// UV sphere whose radius breathes and whose centre drifts on a slow orbit.
pub struct PulsingSphere {
    rings: u32,
    segments: u32,
    radius: f32,
    indices: Vec<u32>,
}

impl PulsingSphere {
    pub fn new(rings: u32, segments: u32, radius: f32) -> Self {
        let rings = rings.max(2);
        let segments = segments.max(3);
        let mut indices = Vec::with_capacity((rings * segments * 6) as usize);
        let stride = segments + 1;
        for r in 0..rings {
            for s in 0..segments {
                let a = r * stride + s;
                let b = a + stride;
                indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }
        Self {
            rings,
            segments,
            radius,
            indices,
        }
    }
}

impl Default for PulsingSphere {
    fn default() -> Self {
        Self::new(24, 32, 1.0)
    }
}

impl MeshSource for PulsingSphere {
    fn sample(&mut self, elapsed: f32) -> SampledMesh {
        let center = [0.5 * (elapsed * 0.3).cos(), 0.25 * (elapsed * 0.7).sin(), 0.5 * (elapsed * 0.3).sin()];
        let mut positions = Vec::with_capacity(((self.rings + 1) * (self.segments + 1)) as usize);
        for r in 0..=self.rings {
            let phi = PI * r as f32 / self.rings as f32;
            for s in 0..=self.segments {
                let theta = 2.0 * PI * s as f32 / self.segments as f32;
                let wobble = 1.0 + 0.15 * (3.0 * theta + 2.0 * elapsed).sin() * phi.sin();
                let radius = self.radius * wobble;
                positions.push([
                    center[0] + radius * phi.sin() * theta.cos(),
                    center[1] + radius * phi.cos(),
                    center[2] + radius * phi.sin() * theta.sin(),
                ]);
            }
        }
        SampledMesh::new(positions, self.indices.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_indices_stay_in_range() {
        let mut sphere = PulsingSphere::new(4, 6, 1.0);
        let mesh = sphere.sample(0.0);
        assert_eq!(mesh.triangle_count(), 4 * 6 * 2);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.positions.len()));
    }

    #[test]
    fn sampled_bounds_cover_positions() {
        let mut sphere = PulsingSphere::default();
        let mesh = sphere.sample(1.7);
        let tight = Bounds::from_points(mesh.positions.iter()).unwrap();
        assert_eq!(mesh.bounds, tight);
        assert!(mesh.bounds.max_extent() > 1.5);
    }

    #[test]
    fn empty_mesh_has_point_bounds() {
        let mesh = SampledMesh::new(Vec::new(), Vec::new());
        assert_eq!(mesh.triangle_count(), 0);
        assert_eq!(mesh.bounds.max_extent(), 0.0);
    }
}
