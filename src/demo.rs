//! Unattended driver that keeps the scene moving without a controller.
//!
//! Three repeating timers: the camera swings every 5 s, the grids get a
//! transition every 0.75 s, and a flow burst with a random throttle fires
//! every 2 s.

use cgmath::Deg;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::frame;
use crate::grid::floor::FloorMode;
use crate::params::ParameterEvent;

pub const CAMERA_INTERVAL: f32 = 5.0;
pub const GRID_INTERVAL: f32 = 0.75;
pub const FLOW_INTERVAL: f32 = 2.0;

/// Fires at most once per `advance`, however long the frame was.
#[derive(Copy, Clone, Debug)]
struct Repeater {
    interval: f32,
    elapsed: f32,
}

impl Repeater {
    fn new(interval: f32) -> Self {
        Self { interval, elapsed: 0.0 }
    }

    fn advance(&mut self, dt: f32) -> bool {
        self.elapsed += dt;
        if self.elapsed < self.interval {
            return false;
        }
        self.elapsed = (self.elapsed - self.interval) % self.interval;
        true
    }
}

/// What the driver wants done this frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DemoStep {
    pub events: Vec<ParameterEvent>,
    pub camera_yaw: Option<Deg<f32>>,
}

pub struct DemoDriver {
    camera: Repeater,
    grid: Repeater,
    flow: Repeater,
    rng: StdRng,
}

impl Default for DemoDriver {
    fn default() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl DemoDriver {
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            camera: Repeater::new(CAMERA_INTERVAL),
            grid: Repeater::new(GRID_INTERVAL),
            flow: Repeater::new(FLOW_INTERVAL),
            rng,
        }
    }

    pub fn tick(&mut self, dt: f32) -> DemoStep {
        let dt = frame::sanitize_dt(dt);
        let mut step = DemoStep::default();

        if self.camera.advance(dt) {
            step.camera_yaw = Some(Deg(self.rng.gen_range(0.0..360.0)));
        }
        if self.grid.advance(dt) {
            step.events.push(if self.rng.gen_bool(0.5) {
                ParameterEvent::MidairRotate
            } else {
                ParameterEvent::MidairScale
            });
            let floor = if self.rng.gen_bool(0.5) {
                FloorMode::Noise
            } else {
                FloorMode::Circle
            };
            step.events.push(ParameterEvent::FloorTrigger(floor_index(floor)));
        }
        if self.flow.advance(dt) {
            step.events.push(ParameterEvent::FlowThrottle(self.rng.gen()));
            step.events.push(ParameterEvent::TriggerFlow);
        }
        step
    }
}

fn floor_index(mode: FloorMode) -> i64 {
    FloorMode::ALL.iter().position(|m| *m == mode).unwrap_or(0) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameTime;
    use crate::gpu::recording::RecordingBackend;
    use crate::scene::Scene;
    use crate::settings::{GridSettings, SimulationSettings};
    use crate::source::PulsingSphere;

    fn driver() -> DemoDriver {
        DemoDriver::with_rng(StdRng::seed_from_u64(21))
    }

    fn small_scene(backend: &mut RecordingBackend) -> Scene {
        let mut settings = SimulationSettings::default();
        settings.particle.count = 128;
        settings.voxel.base_resolution = 16;
        settings.midair.grid = GridSettings {
            width: 2,
            height: 2,
            depth: 2,
            ..GridSettings::default()
        };
        settings.floor.grid = GridSettings {
            width: 4,
            height: 4,
            depth: 1,
            ..GridSettings::default()
        };
        Scene::new(backend, settings).unwrap()
    }

    #[test]
    fn timers_fire_on_their_intervals() {
        let mut demo = driver();
        let mut grid_ticks = Vec::new();
        let mut flow_ticks = Vec::new();
        let mut camera_ticks = Vec::new();
        for i in 1..=24 {
            let step = demo.tick(0.25);
            if step.events.iter().any(|e| matches!(e, ParameterEvent::FloorTrigger(_))) {
                grid_ticks.push(i);
            }
            if step.events.contains(&ParameterEvent::TriggerFlow) {
                flow_ticks.push(i);
            }
            if step.camera_yaw.is_some() {
                camera_ticks.push(i);
            }
        }
        assert_eq!(grid_ticks, [3, 6, 9, 12, 15, 18, 21, 24]);
        assert_eq!(flow_ticks, [8, 16, 24]);
        assert_eq!(camera_ticks, [20]);
    }

    #[test]
    fn grid_tick_picks_one_midair_and_one_floor_transition() {
        let mut demo = driver();
        let mut seen_floor = Vec::new();
        for _ in 0..40 {
            let step = demo.tick(GRID_INTERVAL);
            let midair: Vec<_> = step
                .events
                .iter()
                .filter(|e| matches!(e, ParameterEvent::MidairRotate | ParameterEvent::MidairScale))
                .collect();
            assert_eq!(midair.len(), 1, "{:?}", step.events);
            for event in &step.events {
                if let ParameterEvent::FloorTrigger(index) = event {
                    seen_floor.push(FloorMode::from_index(*index));
                }
            }
        }
        assert_eq!(seen_floor.len(), 40);
        assert!(seen_floor.contains(&FloorMode::Noise));
        assert!(seen_floor.contains(&FloorMode::Circle));
        assert!(!seen_floor.contains(&FloorMode::Line));
    }

    #[test]
    fn flow_tick_sets_throttle_before_triggering() {
        let mut demo = driver();
        let step = demo.tick(FLOW_INTERVAL);
        let flow: Vec<_> = step
            .events
            .iter()
            .skip_while(|e| !matches!(e, ParameterEvent::FlowThrottle(_)))
            .collect();
        match flow.as_slice() {
            [ParameterEvent::FlowThrottle(v), ParameterEvent::TriggerFlow] => assert!((0.0..1.0).contains(v)),
            other => panic!("unexpected flow events {other:?}"),
        }
    }

    #[test]
    fn long_or_bad_frames_fire_each_timer_once() {
        let mut demo = driver();
        let step = demo.tick(60.0);
        assert_eq!(step.events.iter().filter(|e| **e == ParameterEvent::TriggerFlow).count(), 1);
        assert!(step.camera_yaw.is_some());
        for dt in [f32::NAN, -1.0, f32::INFINITY] {
            assert_eq!(demo.tick(dt), DemoStep::default());
        }
    }

    #[test]
    fn driven_scene_runs_grid_and_flow_passes() {
        let mut backend = RecordingBackend::new();
        let mut scene = small_scene(&mut backend);
        let mut source = PulsingSphere::default();
        let mut demo = driver();
        let mut kernels = Vec::new();
        let mut throttles = Vec::new();
        for i in 0..9u64 {
            let frame = FrameTime::new(i, i as f32 * 0.25, 0.25);
            for event in demo.tick(frame.dt()).events {
                if let ParameterEvent::FlowThrottle(v) = event {
                    throttles.push(v);
                }
                scene.apply(event);
            }
            backend.clear_events();
            scene.update(&mut backend, &mut source, &frame).unwrap();
            kernels.extend(backend.dispatch_names());
        }
        let count = |name: &str| kernels.iter().filter(|k| *k == name).count();
        assert_eq!(count("Flow"), 1);
        assert_eq!(count("SetupRotate") + count("SetupScale"), 3);
        assert_eq!(count("Noise") + count("Circle"), 3);
        assert_eq!(throttles.len(), 1);
        assert_eq!(scene.settings().particle.flow_throttle, throttles[0]);
    }
}
