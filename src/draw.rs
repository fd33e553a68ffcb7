use cgmath::{Matrix4, SquareMatrix};

use crate::gpu::BufferId;

/// Two triangles per billboard.
pub const BILLBOARD_INDEX_COUNT: u32 = 6;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RecordLayout {
    Particle,
    Instance,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Material {
    Particles,
    Midair { extrusion: f32, thickness: f32 },
    Floor { elevation: f32, gradient: Option<String> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawCall {
    pub label: &'static str,
    pub records: BufferId,
    pub layout: RecordLayout,
    /// When set, the instance count comes from this buffer.
    pub indirect_args: Option<BufferId>,
    pub instance_count: u32,
    pub local_to_world: Matrix4<f32>,
    pub world_to_local: Matrix4<f32>,
    pub material: Material,
}

impl DrawCall {
    pub fn new(
        label: &'static str,
        records: BufferId,
        layout: RecordLayout,
        instance_count: u32,
        local_to_world: Matrix4<f32>,
        material: Material,
    ) -> Self {
        Self {
            label,
            records,
            layout,
            indirect_args: None,
            instance_count,
            local_to_world,
            world_to_local: local_to_world.invert().unwrap_or(Matrix4::identity()),
            material,
        }
    }

    pub fn with_indirect_args(mut self, args: BufferId) -> Self {
        self.indirect_args = Some(args);
        self
    }
}

pub trait RenderSink {
    fn draw(&mut self, call: DrawCall);
}

impl RenderSink for Vec<DrawCall> {
    fn draw(&mut self, call: DrawCall) {
        self.push(call);
    }
}
