use std::fmt::Debug;

const MIN_DURATION: f32 = 0.1;
const MAX_DURATION: f32 = 1.0;

#[derive(Copy, Clone, Debug, PartialEq)]
enum State<K> {
    Idle,
    /// Started; the next tick is the setup frame.
    Pending { transition: K, duration: f32 },
    Running { transition: K, elapsed: f32, duration: f32 },
}

/// What the owner dispatches this frame.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum AnimationStep<K> {
    Setup(K),
    Animate { transition: K, t: f32 },
}

/// Polled timed transition: one setup frame, then animate frames with
/// `t = elapsed / duration` until a single final `t = 1`.
#[derive(Clone, Debug)]
pub struct TransitionAnimator<K> {
    state: State<K>,
}

impl<K: Copy + Debug> Default for TransitionAnimator<K> {
    fn default() -> Self {
        Self { state: State::Idle }
    }
}

impl<K: Copy + Debug> TransitionAnimator<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `transition`, cancelling and returning whatever was running.
    pub fn start(&mut self, transition: K, duration: f32) -> Option<K> {
        let cancelled = self.cancel();
        let duration = if duration.is_nan() {
            MAX_DURATION
        } else {
            duration.clamp(MIN_DURATION, MAX_DURATION)
        };
        self.state = State::Pending { transition, duration };
        cancelled
    }

    pub fn cancel(&mut self) -> Option<K> {
        let cancelled = match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => None,
            State::Pending { transition, .. } | State::Running { transition, .. } => Some(transition),
        };
        if let Some(transition) = cancelled {
            log::debug!("cancelled {:?} animation", transition);
        }
        cancelled
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.state, State::Idle)
    }

    pub fn tick(&mut self, dt: f32) -> Option<AnimationStep<K>> {
        match self.state {
            State::Idle => None,
            State::Pending { transition, duration } => {
                self.state = State::Running {
                    transition,
                    elapsed: 0.0,
                    duration,
                };
                Some(AnimationStep::Setup(transition))
            }
            State::Running {
                transition,
                elapsed,
                duration,
            } => {
                let elapsed = elapsed + crate::frame::sanitize_dt(dt);
                if elapsed >= duration {
                    self.state = State::Idle;
                    Some(AnimationStep::Animate { transition, t: 1.0 })
                } else {
                    self.state = State::Running {
                        transition,
                        elapsed,
                        duration,
                    };
                    Some(AnimationStep::Animate {
                        transition,
                        t: elapsed / duration,
                    })
                }
            }
        }
    }
}
