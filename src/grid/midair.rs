use bytemuck::{Pod, Zeroable};
use cgmath::Matrix4;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{GridDimensions, ProceduralGrid, SupportRecord};
use crate::animator::{AnimationStep, TransitionAnimator};
use crate::buffer_arena::StructuredBuffer;
use crate::draw::{Material, RenderSink};
use crate::error::CoreError;
use crate::frame::FrameTime;
use crate::gpu::{BufferId, BufferUsage, ComputeBackend, ProgramSource};
use crate::kernel_table::{KernelSet, KernelTable};
use crate::settings::MidairSettings;

pub const MIDAIR_PROGRAM: ProgramSource = ProgramSource {
    label: "midair grid",
    wgsl: include_str!("../shaders/midair_grid.wgsl"),
    storage_buffers: 2,
};

const AUTO_ROTATE_RATE: f32 = 5.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MidairKernel {
    SetupInit,
    Init,
    SetupRotate,
    Rotate,
    RotateAuto,
    SetupScale,
    Scale,
    WaveX,
    WaveY,
    Force,
    Wobble,
}

impl KernelSet for MidairKernel {
    const ALL: &'static [Self] = &[
        MidairKernel::SetupInit,
        MidairKernel::Init,
        MidairKernel::SetupRotate,
        MidairKernel::Rotate,
        MidairKernel::RotateAuto,
        MidairKernel::SetupScale,
        MidairKernel::Scale,
        MidairKernel::WaveX,
        MidairKernel::WaveY,
        MidairKernel::Force,
        MidairKernel::Wobble,
    ];

    fn entry_point(self) -> &'static str {
        match self {
            MidairKernel::SetupInit => "SetupInit",
            MidairKernel::Init => "Init",
            MidairKernel::SetupRotate => "SetupRotate",
            MidairKernel::Rotate => "Rotate",
            MidairKernel::RotateAuto => "RotateAuto",
            MidairKernel::SetupScale => "SetupScale",
            MidairKernel::Scale => "Scale",
            MidairKernel::WaveX => "WaveX",
            MidairKernel::WaveY => "WaveY",
            MidairKernel::Force => "Force",
            MidairKernel::Wobble => "Wobble",
        }
    }
}

/// Timed structural transitions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Init,
    Rotate,
    Scale,
}

impl Transition {
    fn setup_kernel(self) -> MidairKernel {
        match self {
            Transition::Init => MidairKernel::SetupInit,
            Transition::Rotate => MidairKernel::SetupRotate,
            Transition::Scale => MidairKernel::SetupScale,
        }
    }

    fn animate_kernel(self) -> MidairKernel {
        match self {
            Transition::Init => MidairKernel::Init,
            Transition::Rotate => MidairKernel::Rotate,
            Transition::Scale => MidairKernel::Scale,
        }
    }
}

/// Continuous per-frame motion, suspended while a transition runs.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum MidairMotion {
    #[default]
    None,
    WaveX,
    WaveY,
    Force,
    RotateAuto,
    Wobble,
}

impl MidairMotion {
    pub const ALL: [MidairMotion; 6] = [
        MidairMotion::None,
        MidairMotion::WaveX,
        MidairMotion::WaveY,
        MidairMotion::Force,
        MidairMotion::RotateAuto,
        MidairMotion::Wobble,
    ];

    pub fn from_index(index: i64) -> Self {
        Self::ALL[index.rem_euclid(Self::ALL.len() as i64) as usize]
    }

    fn kernel(self) -> Option<MidairKernel> {
        match self {
            MidairMotion::None => None,
            MidairMotion::WaveX => Some(MidairKernel::WaveX),
            MidairMotion::WaveY => Some(MidairKernel::WaveY),
            MidairMotion::Force => Some(MidairKernel::Force),
            MidairMotion::RotateAuto => Some(MidairKernel::RotateAuto),
            MidairMotion::Wobble => Some(MidairKernel::Wobble),
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MidairParams {
    pub inv_width: f32,
    pub inv_height: f32,
    pub inv_depth: f32,
    pub throttle: f32,
    pub wave: [f32; 4],
    pub force: [f32; 3],
    pub inv_force_distance: f32,
}

pub struct MidairGrid {
    grid: ProceduralGrid,
    kernels: KernelTable<MidairKernel>,
    support: StructuredBuffer<SupportRecord>,
    animator: TransitionAnimator<Transition>,
    motion: MidairMotion,
    extrusion: f32,
    thickness: f32,
    rng: StdRng,
    seed: u32,
}

impl MidairGrid {
    pub fn new(
        backend: &mut dyn ComputeBackend,
        settings: &MidairSettings,
        local_to_world: Matrix4<f32>,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            grid: ProceduralGrid::new("midair grid", GridDimensions::from(&settings.grid), local_to_world),
            kernels: KernelTable::load(backend, &MIDAIR_PROGRAM)?,
            support: StructuredBuffer::new("midair support", BufferUsage::Storage),
            animator: TransitionAnimator::new(),
            motion: MidairMotion::None,
            extrusion: 0.0,
            thickness: 0.0,
            rng: StdRng::from_entropy(),
            seed: 0,
        })
    }

    pub fn setup(&mut self, backend: &mut dyn ComputeBackend, settings: &MidairSettings) -> Result<(), CoreError> {
        self.grid.setup(backend, &settings.grid, &mut self.rng)?;
        self.support.acquire(backend, self.grid.dims().count())?;
        Ok(())
    }

    pub fn grid(&self) -> &ProceduralGrid {
        &self.grid
    }

    pub fn is_animating(&self) -> bool {
        self.animator.is_running()
    }

    pub fn motion(&self) -> MidairMotion {
        self.motion
    }

    pub fn set_motion(&mut self, motion: MidairMotion) {
        self.motion = motion;
    }

    pub fn init(&mut self, settings: &MidairSettings) {
        self.start(Transition::Init, settings.duration);
    }

    pub fn rotate(&mut self, settings: &MidairSettings) {
        self.start(Transition::Rotate, settings.duration);
    }

    pub fn scale(&mut self, settings: &MidairSettings) {
        self.start(Transition::Scale, settings.duration);
    }

    fn start(&mut self, transition: Transition, duration: f32) {
        if let Some(cancelled) = self.animator.start(transition, duration) {
            log::debug!("midair {:?} replaced {:?}", transition, cancelled);
        }
        self.seed = self.rng.gen();
    }

    /// Eases the rendered shape and runs this frame's single writer: the
    /// transition when one is active, otherwise the continuous motion.
    pub fn update(&mut self, backend: &mut dyn ComputeBackend, frame: &FrameTime, settings: &MidairSettings) {
        let ease = frame.dt().min(1.0);
        self.extrusion += (settings.extrusion - self.extrusion) * ease;
        self.thickness += (settings.thickness - self.thickness) * ease;

        let dims = self.grid.dims();
        let params = MidairParams {
            inv_width: 1.0 / dims.width as f32,
            inv_height: 1.0 / dims.height as f32,
            inv_depth: 1.0 / dims.depth as f32,
            throttle: settings.throttle,
            wave: settings.wave,
            force: settings.force,
            inv_force_distance: 1.0 / settings.force_distance,
        };
        let Some(support) = self.support.id() else {
            return;
        };

        match self.animator.tick(frame.dt()) {
            Some(AnimationStep::Setup(transition)) => {
                self.dispatch(backend, transition.setup_kernel(), &params, frame, 0.0, support);
            }
            Some(AnimationStep::Animate { transition, t }) => {
                self.dispatch(backend, transition.animate_kernel(), &params, frame, t, support);
            }
            None => {
                if let Some(kernel) = self.motion.kernel() {
                    let scaled;
                    let frame = if kernel == MidairKernel::RotateAuto {
                        scaled = FrameTime::new(frame.index, frame.elapsed, frame.dt() * AUTO_ROTATE_RATE);
                        &scaled
                    } else {
                        frame
                    };
                    self.dispatch(backend, kernel, &params, frame, 0.0, support);
                }
            }
        }
    }

    fn dispatch(
        &self,
        backend: &mut dyn ComputeBackend,
        kernel: MidairKernel,
        params: &MidairParams,
        frame: &FrameTime,
        t: f32,
        support: BufferId,
    ) {
        self.grid.compute(
            backend,
            self.kernels.get(kernel),
            &[support],
            bytemuck::bytes_of(params),
            frame,
            t,
            self.seed,
        );
    }

    pub fn render(&self, sink: &mut dyn RenderSink) {
        self.grid.render(
            sink,
            Material::Midair {
                extrusion: self.extrusion,
                thickness: self.thickness,
            },
        );
    }

    pub fn release(&mut self, backend: &mut dyn ComputeBackend) {
        self.animator.cancel();
        self.grid.release(backend);
        self.support.release(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::DrawCall;
    use crate::grid::GridCommonParams;
    use crate::gpu::recording::RecordingBackend;
    use cgmath::SquareMatrix;

    fn midair(backend: &mut RecordingBackend, settings: &MidairSettings) -> MidairGrid {
        let mut grid = MidairGrid::new(backend, settings, Matrix4::identity()).unwrap();
        grid.setup(backend, settings).unwrap();
        backend.clear_events();
        grid
    }

    fn frame(index: u64) -> FrameTime {
        FrameTime::new(index, index as f32 * 0.25, 0.25)
    }

    #[test]
    fn transition_runs_setup_then_animate_frames() {
        let mut backend = RecordingBackend::new();
        let settings = MidairSettings {
            duration: 1.0,
            ..MidairSettings::default()
        };
        let mut grid = midair(&mut backend, &settings);
        grid.rotate(&settings);
        for i in 0..6 {
            grid.update(&mut backend, &frame(i), &settings);
        }
        assert_eq!(
            backend.dispatch_names(),
            ["SetupRotate", "Rotate", "Rotate", "Rotate", "Rotate"]
        );
        let ts: Vec<f32> = backend.dispatches()[1..]
            .iter()
            .map(|d| d.params::<GridCommonParams>().t)
            .collect();
        assert_eq!(ts, [0.25, 0.5, 0.75, 1.0]);
        assert!(!grid.is_animating());
    }

    #[test]
    fn second_transition_cancels_first_before_its_setup() {
        let mut backend = RecordingBackend::new();
        let settings = MidairSettings {
            duration: 1.0,
            ..MidairSettings::default()
        };
        let mut grid = midair(&mut backend, &settings);
        grid.init(&settings);
        grid.update(&mut backend, &frame(0), &settings);
        grid.update(&mut backend, &frame(1), &settings);
        grid.scale(&settings);
        for i in 2..8 {
            grid.update(&mut backend, &frame(i), &settings);
        }
        let names = backend.dispatch_names();
        assert_eq!(names[..3], ["SetupInit", "Init", "SetupScale"]);
        assert!(names[3..].iter().all(|n| n == "Scale"));
        let finals = backend
            .dispatches()
            .iter()
            .filter(|d| d.params::<GridCommonParams>().t == 1.0)
            .count();
        assert_eq!(finals, 1);
    }

    #[test]
    fn continuous_motion_is_suppressed_while_animating() {
        let mut backend = RecordingBackend::new();
        let settings = MidairSettings::default();
        let mut grid = midair(&mut backend, &settings);
        grid.set_motion(MidairMotion::WaveX);
        grid.update(&mut backend, &frame(0), &settings);
        assert_eq!(backend.dispatch_names(), ["WaveX"]);

        backend.clear_events();
        grid.init(&settings);
        while grid.is_animating() {
            grid.update(&mut backend, &frame(1), &settings);
            assert_eq!(backend.dispatches().len(), 1);
            backend.clear_events();
        }
        grid.update(&mut backend, &frame(9), &settings);
        assert_eq!(backend.dispatch_names(), ["WaveX"]);
    }

    #[test]
    fn rotate_auto_runs_at_five_times_dt() {
        let mut backend = RecordingBackend::new();
        let settings = MidairSettings::default();
        let mut grid = midair(&mut backend, &settings);
        grid.set_motion(MidairMotion::RotateAuto);
        grid.update(&mut backend, &FrameTime::new(0, 0.0, 0.125), &settings);
        assert_eq!(backend.dispatches()[0].params::<GridCommonParams>().dt, 0.625);
    }

    #[test]
    fn extrusion_eases_towards_target() {
        let mut backend = RecordingBackend::new();
        let settings = MidairSettings {
            extrusion: 0.5,
            ..MidairSettings::default()
        };
        let mut grid = midair(&mut backend, &settings);
        grid.update(&mut backend, &frame(0), &settings);
        let mut calls: Vec<DrawCall> = Vec::new();
        grid.render(&mut calls);
        match &calls[0].material {
            Material::Midair { extrusion, .. } => assert_eq!(*extrusion, 0.125),
            other => panic!("unexpected material {:?}", other),
        }
        assert_eq!(calls[0].indirect_args, grid.grid().args());
    }

    #[test]
    fn params_follow_common_block() {
        let mut backend = RecordingBackend::new();
        let settings = MidairSettings {
            force_distance: 4.0,
            ..MidairSettings::default()
        };
        let mut grid = midair(&mut backend, &settings);
        grid.set_motion(MidairMotion::Force);
        grid.update(&mut backend, &frame(0), &settings);
        let dispatch = backend.dispatches()[0];
        let common = std::mem::size_of::<GridCommonParams>();
        let params: MidairParams = bytemuck::pod_read_unaligned(&dispatch.params[common..]);
        assert_eq!(params.inv_force_distance, 0.25);
        assert_eq!(params.inv_width, 1.0 / 16.0);
        assert_eq!(dispatch.buffers.len(), 2);
    }

    #[test]
    fn release_frees_every_buffer() {
        let mut backend = RecordingBackend::new();
        let settings = MidairSettings::default();
        let mut grid = midair(&mut backend, &settings);
        assert_eq!(backend.live_buffer_count(), 3);
        grid.release(&mut backend);
        assert_eq!(backend.live_buffer_count(), 0);
    }
}
