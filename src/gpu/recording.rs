//! In-memory [`ComputeBackend`] that records every call, for host-side tests.

use std::collections::BTreeMap;

use bytemuck::Pod;

use super::reflect::{compute_entry_points, EntryPoint};
use super::{
    BufferId, BufferUsage, ComputeBackend, Dispatch, KernelHandle, KernelInfo, ProgramId,
    ProgramSource,
};
use crate::error::CoreError;

#[derive(Clone, Debug)]
pub(crate) struct RecordedDispatch {
    pub program: &'static str,
    pub kernel: String,
    pub params: Vec<u8>,
    pub buffers: Vec<BufferId>,
    pub groups: [u32; 3],
}

impl RecordedDispatch {
    pub fn params<T: Pod>(&self) -> T {
        bytemuck::pod_read_unaligned(&self.params[..std::mem::size_of::<T>()])
    }
}

#[derive(Clone, Debug)]
pub(crate) enum Event {
    Create {
        id: BufferId,
        label: &'static str,
        size: u64,
        usage: BufferUsage,
    },
    Write {
        id: BufferId,
        offset: u64,
        data: Vec<u8>,
    },
    Destroy {
        id: BufferId,
    },
    Dispatch(RecordedDispatch),
}

struct RecordedProgram {
    label: &'static str,
    entry_points: Vec<EntryPoint>,
    resolved: Vec<String>,
}

#[derive(Default)]
pub(crate) struct RecordingBackend {
    events: Vec<Event>,
    live: BTreeMap<BufferId, (&'static str, u64)>,
    next_buffer_id: u32,
    programs: Vec<RecordedProgram>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn dispatches(&self) -> Vec<&RecordedDispatch> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Dispatch(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    pub fn dispatch_names(&self) -> Vec<String> {
        self.dispatches().iter().map(|d| d.kernel.clone()).collect()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, id: BufferId) -> bool {
        self.live.contains_key(&id)
    }

    pub fn buffer_size(&self, id: BufferId) -> Option<u64> {
        self.live.get(&id).map(|(_, size)| *size)
    }

    pub fn last_write(&self, id: BufferId) -> Option<&[u8]> {
        self.events.iter().rev().find_map(|e| match e {
            Event::Write { id: target, data, .. } if *target == id => Some(data.as_slice()),
            _ => None,
        })
    }
}

impl ComputeBackend for RecordingBackend {
    fn create_buffer(&mut self, label: &'static str, size: u64, usage: BufferUsage) -> BufferId {
        let id = BufferId(self.next_buffer_id);
        self.next_buffer_id += 1;
        self.live.insert(id, (label, size));
        self.events.push(Event::Create { id, label, size, usage });
        id
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        assert!(self.live.contains_key(&buffer), "write to released buffer {:?}", buffer);
        self.events.push(Event::Write {
            id: buffer,
            offset,
            data: data.to_vec(),
        });
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        assert!(self.live.remove(&buffer).is_some(), "double destroy of {:?}", buffer);
        self.events.push(Event::Destroy { id: buffer });
    }

    fn load_program(&mut self, source: &ProgramSource) -> Result<ProgramId, CoreError> {
        let entry_points = compute_entry_points(source)?;
        self.programs.push(RecordedProgram {
            label: source.label,
            entry_points,
            resolved: Vec::new(),
        });
        Ok(ProgramId(self.programs.len() as u32 - 1))
    }

    fn resolve_kernel(&mut self, program: ProgramId, entry_point: &str) -> Option<KernelInfo> {
        let recorded = self.programs.get_mut(program.0 as usize)?;
        let group_size = recorded
            .entry_points
            .iter()
            .find(|ep| ep.name == entry_point)?
            .workgroup_size;
        recorded.resolved.push(entry_point.to_string());
        Some(KernelInfo {
            handle: KernelHandle {
                program,
                index: recorded.resolved.len() as u32 - 1,
            },
            group_size,
        })
    }

    fn dispatch(&mut self, dispatch: &Dispatch<'_>) {
        let program = &self.programs[dispatch.kernel.program.0 as usize];
        for id in dispatch.buffers {
            assert!(
                self.live.contains_key(id),
                "`{}` dispatched against released buffer {:?}",
                dispatch.label,
                id
            );
        }
        self.events.push(Event::Dispatch(RecordedDispatch {
            program: program.label,
            kernel: program.resolved[dispatch.kernel.index as usize].clone(),
            params: dispatch.params.to_vec(),
            buffers: dispatch.buffers.to_vec(),
            groups: dispatch.groups,
        }));
    }
}
