use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::error::CoreError;
use crate::gpu::{ComputeBackend, Dispatch, KernelHandle, ProgramId, ProgramSource};

/// A closed set of kernels living in one compute program.
///
/// `ALL` must list every variant; `entry_point` names the WGSL function.
pub trait KernelSet: Copy + Eq + Hash + Debug + 'static {
    const ALL: &'static [Self];

    fn entry_point(self) -> &'static str;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Kernel {
    pub handle: KernelHandle,
    pub name: &'static str,
    pub group_size: [u32; 3],
}

impl Kernel {
    /// Workgroup counts covering `count` elements along X. Rounds up and never
    /// returns an empty grid.
    pub fn dispatch_size(&self, count: u32) -> [u32; 3] {
        let [gx, gy, gz] = self.group_size;
        [count.div_ceil(gx.max(1)).max(1), gy, gz]
    }

    pub fn dispatch(
        &self,
        backend: &mut dyn ComputeBackend,
        params: &[u8],
        buffers: &[crate::gpu::BufferId],
        count: u32,
    ) {
        backend.dispatch(&Dispatch {
            kernel: self.handle,
            label: self.name,
            params,
            buffers,
            groups: self.dispatch_size(count),
        });
    }
}

pub struct KernelTable<K: KernelSet> {
    program: ProgramId,
    kernels: HashMap<K, Kernel>,
}

impl<K: KernelSet> KernelTable<K> {
    /// Loads `source` and resolves every entry point in `K::ALL`.
    pub fn load(backend: &mut dyn ComputeBackend, source: &ProgramSource) -> Result<Self, CoreError> {
        let program = backend.load_program(source)?;
        Self::resolve(backend, source.label, program)
    }

    pub fn resolve(
        backend: &mut dyn ComputeBackend,
        label: &'static str,
        program: ProgramId,
    ) -> Result<Self, CoreError> {
        let mut kernels = HashMap::with_capacity(K::ALL.len());
        for &key in K::ALL {
            let entry_point = key.entry_point();
            let info = backend
                .resolve_kernel(program, entry_point)
                .ok_or(CoreError::MissingKernel {
                    program: label,
                    entry_point,
                })?;
            kernels.insert(
                key,
                Kernel {
                    handle: info.handle,
                    name: entry_point,
                    group_size: info.group_size,
                },
            );
        }
        Ok(Self { program, kernels })
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn get(&self, key: K) -> &Kernel {
        // Exhaustive by construction in `resolve`.
        &self.kernels[&key]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recording::RecordingBackend;

    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    enum Tank {
        Fill,
        Drain,
    }

    impl KernelSet for Tank {
        const ALL: &'static [Self] = &[Tank::Fill, Tank::Drain];

        fn entry_point(self) -> &'static str {
            match self {
                Tank::Fill => "Fill",
                Tank::Drain => "Drain",
            }
        }
    }

    const TANK_SOURCE: ProgramSource = ProgramSource {
        label: "tank",
        wgsl: "
            struct Params { count: u32, _p0: u32, _p1: u32, _p2: u32 }
            @group(0) @binding(0) var<uniform> params: Params;
            @group(0) @binding(1) var<storage, read_write> data: array<u32>;
            @compute @workgroup_size(64)
            fn Fill(@builtin(global_invocation_id) id: vec3<u32>) {
                if (id.x < params.count) { data[id.x] = 1u; }
            }
            @compute @workgroup_size(32, 2, 1)
            fn Drain(@builtin(global_invocation_id) id: vec3<u32>) {
                if (id.x < params.count) { data[id.x] = 0u; }
            }
        ",
        storage_buffers: 1,
    };

    const TANK_MISSING: ProgramSource = ProgramSource {
        label: "tank-missing",
        wgsl: "
            @group(0) @binding(1) var<storage, read_write> data: array<u32>;
            @compute @workgroup_size(64)
            fn Fill(@builtin(global_invocation_id) id: vec3<u32>) {
                data[id.x] = 1u;
            }
        ",
        storage_buffers: 1,
    };

    #[test]
    fn resolves_every_entry_point_with_group_size() {
        let mut backend = RecordingBackend::new();
        let table = KernelTable::<Tank>::load(&mut backend, &TANK_SOURCE).unwrap();
        assert_eq!(table.get(Tank::Fill).group_size, [64, 1, 1]);
        assert_eq!(table.get(Tank::Drain).group_size, [32, 2, 1]);
        assert_eq!(table.get(Tank::Drain).name, "Drain");
    }

    #[test]
    fn missing_entry_point_fails_at_load() {
        let mut backend = RecordingBackend::new();
        match KernelTable::<Tank>::load(&mut backend, &TANK_MISSING) {
            Err(CoreError::MissingKernel { program, entry_point }) => {
                assert_eq!(program, "tank-missing");
                assert_eq!(entry_point, "Drain");
            }
            other => panic!("expected MissingKernel, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn dispatch_size_rounds_up() {
        let mut backend = RecordingBackend::new();
        let table = KernelTable::<Tank>::load(&mut backend, &TANK_SOURCE).unwrap();
        let fill = table.get(Tank::Fill);
        assert_eq!(fill.dispatch_size(64), [1, 1, 1]);
        assert_eq!(fill.dispatch_size(65), [2, 1, 1]);
        assert_eq!(fill.dispatch_size(1), [1, 1, 1]);
        assert_eq!(fill.dispatch_size(0), [1, 1, 1]);
        assert_eq!(table.get(Tank::Drain).dispatch_size(100), [4, 2, 1]);
        for count in 1..1000u32 {
            let [x, _, _] = fill.dispatch_size(count);
            assert!(x * 64 >= count);
            assert!((x - 1) * 64 < count);
        }
    }
}
