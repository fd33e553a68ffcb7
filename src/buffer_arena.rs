use std::marker::PhantomData;

use bytemuck::Pod;

use crate::error::CoreError;
use crate::gpu::{BufferId, BufferUsage, ComputeBackend};

/// One logical GPU buffer of `T` records.
///
/// At most one allocation is live at a time: `acquire` while holding a buffer is
/// an error, `release` is idempotent and must run before re-acquiring and on
/// teardown.
pub struct StructuredBuffer<T: Pod> {
    label: &'static str,
    usage: BufferUsage,
    allocation: Option<Allocation>,
    _record: PhantomData<T>,
}

#[derive(Copy, Clone, Debug)]
struct Allocation {
    id: BufferId,
    capacity: u32,
}

impl<T: Pod> StructuredBuffer<T> {
    pub fn new(label: &'static str, usage: BufferUsage) -> Self {
        Self {
            label,
            usage,
            allocation: None,
            _record: PhantomData,
        }
    }

    pub const fn record_size() -> u64 {
        std::mem::size_of::<T>() as u64
    }

    /// Allocates room for `capacity` zeroed records (at least one).
    pub fn acquire(&mut self, backend: &mut dyn ComputeBackend, capacity: u32) -> Result<BufferId, CoreError> {
        if self.allocation.is_some() {
            return Err(CoreError::BufferAlreadyAcquired { label: self.label });
        }
        let capacity = capacity.max(1);
        let id = backend.create_buffer(self.label, capacity as u64 * Self::record_size(), self.usage);
        self.allocation = Some(Allocation { id, capacity });
        Ok(id)
    }

    /// Allocates exactly `records.len()` records and uploads them.
    pub fn acquire_with(&mut self, backend: &mut dyn ComputeBackend, records: &[T]) -> Result<BufferId, CoreError> {
        let id = self.acquire(backend, records.len() as u32)?;
        if !records.is_empty() {
            backend.write_buffer(id, 0, bytemuck::cast_slice(records));
        }
        Ok(id)
    }

    pub fn release(&mut self, backend: &mut dyn ComputeBackend) {
        if let Some(allocation) = self.allocation.take() {
            backend.destroy_buffer(allocation.id);
        }
    }

    pub fn id(&self) -> Option<BufferId> {
        self.allocation.map(|a| a.id)
    }

    pub fn capacity(&self) -> u32 {
        self.allocation.map_or(0, |a| a.capacity)
    }

    pub fn is_acquired(&self) -> bool {
        self.allocation.is_some()
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}
