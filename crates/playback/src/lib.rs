//! Checkpoint gate that pauses intercepted threads at a chosen call site.
//!
//! The controller is either running, in which case every gate passes, or
//! paused, in which case a thread arriving at the configured checkpoint
//! blocks until an operator resumes execution or grants step units. Blocked
//! threads are woken on every [`Command`] and otherwise re-poll at a bounded
//! interval.
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use gutsconfig::{CheckpointFunction, CheckpointKind, PlaybackConfig};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

/// Operator command applied with [`PlaybackController::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetRunning(bool),
    AddSteps(u32),
    SetCheckpointKind(CheckpointKind),
    SetCheckpointTarget(CheckpointFunction),
}

/// How a call got through [`PlaybackController::gate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Passage {
    /// The call site is not the active checkpoint.
    Ignored,
    Running,
    /// Consumed one step unit while paused.
    Stepped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackStatus {
    pub kind: CheckpointKind,
    pub target: CheckpointFunction,
    pub running: bool,
    pub steps: u64,
    pub waiting: usize,
    pub frame_count: u64,
}

#[derive(Debug)]
struct GateState {
    kind: CheckpointKind,
    target: CheckpointFunction,
    running: bool,
    steps: u64,
    waiting: usize,
}

impl GateState {
    fn gates(&self, site: CheckpointFunction) -> bool {
        self.kind == CheckpointKind::Function && self.target == site
    }
}

#[derive(Debug)]
pub struct PlaybackController {
    state: Mutex<GateState>,
    wake: Condvar,
    frame_count: AtomicU64,
    poll_interval: Duration,
}

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl Default for PlaybackController {
    fn default() -> Self {
        Self::new(CheckpointFunction::AcquireNextImage, true, DEFAULT_POLL_INTERVAL)
    }
}

impl PlaybackController {
    pub fn new(target: CheckpointFunction, running: bool, poll_interval: Duration) -> Self {
        let poll_interval = if poll_interval.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            poll_interval
        };
        Self {
            state: Mutex::new(GateState {
                kind: CheckpointKind::Function,
                target,
                running,
                steps: 0,
                waiting: 0,
            }),
            wake: Condvar::new(),
            frame_count: AtomicU64::new(0),
            poll_interval,
        }
    }

    pub fn from_config(config: &PlaybackConfig) -> Self {
        let controller = Self::new(
            config.checkpoint,
            !config.pause_on_start,
            config.poll_interval,
        );
        controller.state.lock().kind = config.checkpoint_kind;
        if config.pause_on_start {
            info!(checkpoint = %config.checkpoint, "paused on start; waiting for operator");
        }
        controller
    }

    /// Blocks the caller while `site` is the active checkpoint and execution
    /// is paused with no step units left.
    pub fn gate(&self, site: CheckpointFunction) -> Passage {
        let mut state = self.state.lock();
        let mut announced = false;
        loop {
            if !state.gates(site) {
                if announced {
                    state.waiting -= 1;
                }
                return Passage::Ignored;
            }
            if state.running {
                if announced {
                    state.waiting -= 1;
                }
                return Passage::Running;
            }
            if state.steps > 0 {
                state.steps -= 1;
                if announced {
                    state.waiting -= 1;
                }
                debug!(%site, remaining = state.steps, "stepped past checkpoint");
                return Passage::Stepped;
            }
            if !announced {
                announced = true;
                state.waiting += 1;
                debug!(%site, "paused at checkpoint");
            }
            self.wake.wait_for(&mut state, self.poll_interval);
        }
    }

    pub fn execute(&self, command: Command) {
        let mut state = self.state.lock();
        match command {
            Command::SetRunning(running) => state.running = running,
            Command::AddSteps(count) => state.steps = state.steps.saturating_add(u64::from(count)),
            Command::SetCheckpointKind(kind) => state.kind = kind,
            Command::SetCheckpointTarget(target) => state.target = target,
        }
        drop(state);
        debug!(?command, "applied playback command");
        self.wake.notify_all();
    }

    /// Called once per completed present.
    pub fn frame_presented(&self) -> u64 {
        self.frame_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Acquire)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn status(&self) -> PlaybackStatus {
        let state = self.state.lock();
        PlaybackStatus {
            kind: state.kind,
            target: state.target,
            running: state.running,
            steps: state.steps,
            waiting: state.waiting,
            frame_count: self.frame_count(),
        }
    }
}
