use web_time::Instant;

/// Timing snapshot handed to every per-frame pass.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrameTime {
    pub index: u64,
    /// Seconds since the simulation started.
    pub elapsed: f32,
    dt: f32,
}

impl FrameTime {
    pub fn new(index: u64, elapsed: f32, dt: f32) -> Self {
        Self {
            index,
            elapsed,
            dt: sanitize_dt(dt),
        }
    }

    /// Seconds since the previous frame, never negative.
    pub fn dt(&self) -> f32 {
        self.dt
    }

    /// `1/dt`, or zero when no time has passed.
    pub fn inv_dt(&self) -> f32 {
        inv_dt(self.dt)
    }

    /// Four phase-shifted clocks `(t/slow_divisor, t, 2t, 3t)`.
    pub fn time_vector(&self, slow_divisor: f32) -> [f32; 4] {
        let t = self.elapsed;
        [t / slow_divisor, t, t * 2.0, t * 3.0]
    }
}

pub fn sanitize_dt(dt: f32) -> f32 {
    if dt.is_finite() && dt > 0.0 {
        dt
    } else {
        0.0
    }
}

pub fn inv_dt(dt: f32) -> f32 {
    let dt = sanitize_dt(dt);
    if dt > 0.0 {
        1.0 / dt
    } else {
        0.0
    }
}

pub struct FrameClock {
    start: Instant,
    last: Instant,
    index: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            index: 0,
        }
    }

    pub fn tick(&mut self) -> FrameTime {
        let now = Instant::now();
        let dt = now.duration_since(self.last).as_secs_f32();
        self.last = now;
        let frame = FrameTime::new(self.index, now.duration_since(self.start).as_secs_f32(), dt);
        self.index += 1;
        frame
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
