use std::collections::HashMap;

use wgpu::util::DeviceExt;

use super::reflect::{compute_entry_points, EntryPoint};
use super::{
    BufferId, BufferUsage, ComputeBackend, Dispatch, KernelHandle, KernelInfo, ProgramId,
    ProgramSource,
};
use crate::error::CoreError;

const PARAMS_BINDING_IDX: u32 = 0;
const FIRST_STORAGE_BINDING_IDX: u32 = 1;

struct LoadedProgram {
    label: &'static str,
    module: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    layout: wgpu::PipelineLayout,
    entry_points: Vec<EntryPoint>,
    storage_buffers: u32,
    pipelines: Vec<wgpu::ComputePipeline>,
}

/// [`ComputeBackend`] on a `wgpu` device. Every dispatch gets its own uniform
/// parameter buffer and command buffer, so parameter blocks of consecutive
/// dispatches never alias.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    buffers: HashMap<BufferId, wgpu::Buffer>,
    next_buffer_id: u32,
    programs: Vec<LoadedProgram>,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            buffers: HashMap::new(),
            next_buffer_id: 0,
            programs: Vec::new(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn buffer(&self, id: BufferId) -> Option<&wgpu::Buffer> {
        self.buffers.get(&id)
    }

    fn create_bind_group_layout(&self, label: &'static str, storage_buffers: u32) -> wgpu::BindGroupLayout {
        let mut entries = vec![wgpu::BindGroupLayoutEntry { // Params
            binding: PARAMS_BINDING_IDX,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        for i in 0..storage_buffers {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: FIRST_STORAGE_BINDING_IDX + i,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }
        self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &entries,
        })
    }
}

impl ComputeBackend for WgpuBackend {
    fn create_buffer(&mut self, label: &'static str, size: u64, usage: BufferUsage) -> BufferId {
        let usage = match usage {
            BufferUsage::Storage => wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            BufferUsage::Indirect => {
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_DST
            }
        };
        // Storage bindings must be 4-byte sized, copies 4-byte aligned.
        let size = size.max(4).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        });
        let id = BufferId(self.next_buffer_id);
        self.next_buffer_id += 1;
        self.buffers.insert(id, buffer);
        id
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        match self.buffers.get(&buffer) {
            Some(target) => self.queue.write_buffer(target, offset, data),
            None => log::warn!("write to released buffer {:?} dropped", buffer),
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some(buffer) = self.buffers.remove(&buffer) {
            buffer.destroy();
        }
    }

    fn load_program(&mut self, source: &ProgramSource) -> Result<ProgramId, CoreError> {
        let entry_points = compute_entry_points(source)?;
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(source.label),
            source: wgpu::ShaderSource::Wgsl(source.wgsl.into()),
        });
        let bind_group_layout = self.create_bind_group_layout(source.label, source.storage_buffers);
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(source.label),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        log::info!(
            "loaded compute program `{}` ({} entry points)",
            source.label,
            entry_points.len()
        );
        self.programs.push(LoadedProgram {
            label: source.label,
            module,
            bind_group_layout,
            layout,
            entry_points,
            storage_buffers: source.storage_buffers,
            pipelines: Vec::new(),
        });
        Ok(ProgramId(self.programs.len() as u32 - 1))
    }

    fn resolve_kernel(&mut self, program: ProgramId, entry_point: &str) -> Option<KernelInfo> {
        let loaded = self.programs.get_mut(program.0 as usize)?;
        let group_size = loaded
            .entry_points
            .iter()
            .find(|ep| ep.name == entry_point)?
            .workgroup_size;
        let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(entry_point),
            layout: Some(&loaded.layout),
            module: &loaded.module,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            cache: None,
        });
        loaded.pipelines.push(pipeline);
        Some(KernelInfo {
            handle: KernelHandle {
                program,
                index: loaded.pipelines.len() as u32 - 1,
            },
            group_size,
        })
    }

    fn dispatch(&mut self, dispatch: &Dispatch<'_>) {
        let Some(program) = self.programs.get(dispatch.kernel.program.0 as usize) else {
            log::warn!("dispatch of `{}` against unknown program dropped", dispatch.label);
            return;
        };
        debug_assert_eq!(program.storage_buffers as usize, dispatch.buffers.len());

        let params = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Kernel Params"),
            contents: dispatch.params,
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: PARAMS_BINDING_IDX,
            resource: params.as_entire_binding(),
        }];
        for (i, id) in dispatch.buffers.iter().enumerate() {
            let Some(buffer) = self.buffers.get(id) else {
                log::warn!(
                    "dispatch of `{}` in `{}` references released buffer {:?}; dropped",
                    dispatch.label,
                    program.label,
                    id
                );
                return;
            };
            entries.push(wgpu::BindGroupEntry {
                binding: FIRST_STORAGE_BINDING_IDX + i as u32,
                resource: buffer.as_entire_binding(),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(dispatch.label),
            layout: &program.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(dispatch.label),
        });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(dispatch.label),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&program.pipelines[dispatch.kernel.index as usize]);
            cpass.set_bind_group(0, &bind_group, &[]);
            let [x, y, z] = dispatch.groups;
            cpass.dispatch_workgroups(x, y, z);
        }
        self.queue.submit(Some(encoder.finish()));
    }
}
