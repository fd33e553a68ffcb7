//! Draws the [`DrawCall`]s a [`Scene`](crate::scene::Scene) hands out as
//! instanced billboards straight from the compute storage buffers.

use bytemuck::{Pod, Zeroable};
use cgmath::{Deg, InnerSpace, Matrix4, Point3, Vector3};
use wgpu::util::DeviceExt;

use crate::draw::{DrawCall, Material, RecordLayout, RenderSink, BILLBOARD_INDEX_COUNT};
use crate::gpu::WgpuBackend;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const BILLBOARD_INDICES: [u16; BILLBOARD_INDEX_COUNT as usize] = [0, 1, 2, 2, 1, 3];

#[repr(C)]
#[derive(Default, Copy, Clone, Debug, Pod, Zeroable)]
pub struct DrawUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub local_to_world: [[f32; 4]; 4],
    pub camera_right: [f32; 4],
    pub camera_up: [f32; 4],
    pub material: [f32; 4],
    pub tint: [f32; 4],
}

/// Camera circling the origin.
#[derive(Copy, Clone, Debug)]
pub struct OrbitCamera {
    pub distance: f32,
    pub height: f32,
    pub yaw: Deg<f32>,
    pub fov: Deg<f32>,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            distance: 8.0,
            height: 2.0,
            yaw: Deg(0.0),
            fov: Deg(60.0),
        }
    }
}

pub struct CameraFrame {
    pub view_proj: Matrix4<f32>,
    pub right: Vector3<f32>,
    pub up: Vector3<f32>,
}

impl OrbitCamera {
    pub fn eye(&self) -> Point3<f32> {
        let yaw = cgmath::Rad::from(self.yaw).0;
        Point3::new(yaw.sin() * self.distance, self.height, yaw.cos() * self.distance)
    }

    pub fn frame(&self, aspect: f32) -> CameraFrame {
        let eye = self.eye();
        let view = Matrix4::look_at_rh(eye, Point3::new(0.0, 0.0, 0.0), Vector3::unit_y());
        let proj = cgmath::perspective(self.fov, aspect.max(1e-3), 0.1, 200.0);
        let forward = (Point3::new(0.0, 0.0, 0.0) - eye).normalize();
        let right = forward.cross(Vector3::unit_y()).normalize();
        let up = right.cross(forward);
        CameraFrame {
            view_proj: OPENGL_TO_WGPU_MATRIX * proj * view,
            right,
            up,
        }
    }
}

#[rustfmt::skip]
const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Tint for a floor gradient name; unknown names fall back to white.
pub fn gradient_tint(name: Option<&str>) -> [f32; 4] {
    match name {
        Some("ember") => [1.0, 0.55, 0.25, 1.0],
        Some("ice") => [0.6, 0.85, 1.0, 1.0],
        Some("moss") => [0.55, 0.9, 0.5, 1.0],
        _ => [1.0, 1.0, 1.0, 1.0],
    }
}

impl DrawUniforms {
    pub fn new(call: &DrawCall, camera: &CameraFrame) -> Self {
        let (material, tint) = match &call.material {
            Material::Particles => ([0.0, 0.0, 0.0, 0.0], [1.0; 4]),
            Material::Midair { extrusion, thickness } => ([1.0, *extrusion, *thickness, 0.0], [1.0; 4]),
            Material::Floor { elevation, gradient } => ([2.0, *elevation, 0.0, 0.0], gradient_tint(gradient.as_deref())),
        };
        Self {
            view_proj: camera.view_proj.into(),
            local_to_world: call.local_to_world.into(),
            camera_right: camera.right.extend(0.0).into(),
            camera_up: camera.up.extend(0.0).into(),
            material,
            tint,
        }
    }
}

pub struct InstancedPass {
    particle_pipeline: wgpu::RenderPipeline,
    instance_pipeline: wgpu::RenderPipeline,
    index_buffer: wgpu::Buffer,
}

impl InstancedPass {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let records_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Instanced: Records Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let uniform_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Instanced: Uniform Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Instanced Pipeline Layout"),
            bind_group_layouts: &[&records_bind_group_layout, &uniform_bind_group_layout],
            push_constant_ranges: &[],
        });
        let shader = device.create_shader_module(wgpu::include_wgsl!("shaders/instanced.wgsl"));
        let pipeline = |label: &str, vertex_entry: &str| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some(vertex_entry),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(format.into())],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: Default::default(),
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: Default::default(),
                    conservative: false,
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };
        let particle_pipeline = pipeline("Instanced: Particle Pipeline", "vs_particle");
        let instance_pipeline = pipeline("Instanced: Grid Pipeline", "vs_instance");

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Billboard Index Buffer"),
            contents: bytemuck::cast_slice(&BILLBOARD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            particle_pipeline,
            instance_pipeline,
            index_buffer,
        }
    }

    fn pipeline(&self, layout: RecordLayout) -> &wgpu::RenderPipeline {
        match layout {
            RecordLayout::Particle => &self.particle_pipeline,
            RecordLayout::Instance => &self.instance_pipeline,
        }
    }

    /// Builds bind groups for this frame's calls. Calls whose buffers were
    /// released in the meantime are skipped.
    pub fn prepare(
        &self,
        backend: &WgpuBackend,
        calls: &[DrawCall],
        camera: &CameraFrame,
    ) -> Vec<PreparedDraw> {
        let device = backend.device();
        let mut prepared = Vec::with_capacity(calls.len());
        for call in calls {
            let Some(records) = backend.buffer(call.records) else {
                log::warn!("draw `{}` skipped: records buffer released", call.label);
                continue;
            };
            let pipeline = self.pipeline(call.layout);
            let records = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Instanced: Records Bind Group"),
                layout: &pipeline.get_bind_group_layout(0),
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: records.as_entire_binding(),
                }],
            });
            let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Instanced: Draw Uniform Buffer"),
                contents: bytemuck::bytes_of(&DrawUniforms::new(call, camera)),
                usage: wgpu::BufferUsages::UNIFORM,
            });
            let uniforms = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Instanced: Draw Uniform Bind Group"),
                layout: &pipeline.get_bind_group_layout(1),
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                }],
            });
            prepared.push(PreparedDraw {
                layout: call.layout,
                records,
                uniforms,
                indirect_args: call.indirect_args,
                instance_count: call.instance_count,
            });
        }
        prepared
    }
}

pub struct PreparedDraw {
    layout: RecordLayout,
    records: wgpu::BindGroup,
    uniforms: wgpu::BindGroup,
    indirect_args: Option<crate::gpu::BufferId>,
    instance_count: u32,
}

impl<'a> InstancedPass {
    pub fn record<'pass>(
        &'a self,
        rpass: &mut wgpu::RenderPass<'pass>,
        backend: &'a WgpuBackend,
        prepared: &'a [PreparedDraw],
    ) where
        'a: 'pass,
    {
        rpass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        for draw in prepared {
            rpass.set_pipeline(self.pipeline(draw.layout));
            rpass.set_bind_group(0, &draw.records, &[]);
            rpass.set_bind_group(1, &draw.uniforms, &[]);
            match draw.indirect_args.and_then(|id| backend.buffer(id)) {
                Some(args) => rpass.draw_indexed_indirect(args, 0),
                None => rpass.draw_indexed(0..BILLBOARD_INDEX_COUNT, 0, 0..draw.instance_count),
            }
        }
    }
}

/// Collects a frame's draw calls and owns the depth target.
pub struct Renderer {
    pass: InstancedPass,
    depth_view: wgpu::TextureView,
    calls: Vec<DrawCall>,
    pub camera: OrbitCamera,
}

impl RenderSink for Renderer {
    fn draw(&mut self, call: DrawCall) {
        self.calls.push(call);
    }
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

impl Renderer {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat, width: u32, height: u32) -> Self {
        Self {
            pass: InstancedPass::new(device, format),
            depth_view: create_depth_view(device, width, height),
            calls: Vec::new(),
            camera: OrbitCamera::default(),
        }
    }

    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        self.depth_view = create_depth_view(device, width, height);
    }

    /// Draws and clears the collected calls into `target`.
    pub fn render(&mut self, backend: &WgpuBackend, target: &wgpu::TextureView, aspect: f32) {
        let camera = self.camera.frame(aspect);
        let prepared = self.pass.prepare(backend, &self.calls, &camera);
        self.calls.clear();

        let mut encoder = backend.device().create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Instanced Encoder"),
        });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Instanced Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.pass.record(&mut rpass, backend, &prepared);
        }
        backend.queue().submit(Some(encoder.finish()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::BufferId;
    use cgmath::SquareMatrix;

    #[test]
    fn draw_uniforms_layout() {
        assert_eq!(std::mem::size_of::<DrawUniforms>(), 192);
    }

    #[test]
    fn material_maps_to_uniform_row() {
        let camera = OrbitCamera::default().frame(1.0);
        let call = DrawCall::new(
            "floor",
            BufferId(0),
            RecordLayout::Instance,
            4,
            Matrix4::identity(),
            Material::Floor {
                elevation: 1.5,
                gradient: Some("ice".into()),
            },
        );
        let uniforms = DrawUniforms::new(&call, &camera);
        assert_eq!(uniforms.material, [2.0, 1.5, 0.0, 0.0]);
        assert_eq!(uniforms.tint, gradient_tint(Some("ice")));
        assert_eq!(gradient_tint(Some("unknown")), [1.0; 4]);
    }

    #[test]
    fn camera_basis_is_orthonormal() {
        let camera = OrbitCamera {
            yaw: Deg(37.0),
            ..OrbitCamera::default()
        };
        let frame = camera.frame(16.0 / 9.0);
        assert!((frame.right.magnitude() - 1.0).abs() < 1e-5);
        assert!((frame.up.magnitude() - 1.0).abs() < 1e-5);
        assert!(frame.right.dot(frame.up).abs() < 1e-5);
    }
}
