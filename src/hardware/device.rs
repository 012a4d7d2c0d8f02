//! Device capability trait and lifecycle state machine shared by the HMD and
//! controller/tracker device kinds (C8, spec §4.8).

use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::{ViveError, ViveResult};
use crate::hardware::history::SpaceRelation;
use crate::math::Pose;

/// `Created → Running → Stopping → Destroyed` (spec §4.8). Transitions are
/// one-way; `destroy()` is the only thing that advances past `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceLifecycle {
    Created,
    Running,
    Stopping,
    Destroyed,
}

impl DeviceLifecycle {
    fn from_code(code: u8) -> Self {
        match code {
            0 => DeviceLifecycle::Created,
            1 => DeviceLifecycle::Running,
            2 => DeviceLifecycle::Stopping,
            _ => DeviceLifecycle::Destroyed,
        }
    }
}

/// Atomic backing store for `DeviceLifecycle`, shared between a device's
/// public handle and its reader thread's exit check.
#[derive(Debug, Default)]
pub struct LifecycleState(AtomicU8);

impl LifecycleState {
    pub fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    pub fn get(&self) -> DeviceLifecycle {
        DeviceLifecycle::from_code(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: DeviceLifecycle) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// The flag a reader thread polls after each `read` timeout to decide
    /// whether to exit its loop (spec §4.8).
    pub fn should_exit(&self) -> bool {
        !matches!(self.get(), DeviceLifecycle::Running)
    }
}

/// A haptic pulse request (spec §4.7's `set_output`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HapticCommand {
    pub amplitude: f64,
    pub frequency_hz: f64,
    pub duration_s: f64,
}

/// Per-eye distorted lookup coordinates returned by `compute_distortion`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistortedUv {
    pub r: (f64, f64),
    pub g: (f64, f64),
    pub b: (f64, f64),
}

/// Hand joint poses derived from a controller's curl/trackpad state. The
/// spec names the type without pinning down a joint hierarchy; modeled as a
/// flat list of per-joint poses in tracking space, the shape every other
/// pose-bearing type in this crate already uses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandJointSet {
    pub joints: Vec<Pose>,
}

/// The common capability set every lighthouse-family device implements
/// (spec §4.8). Capabilities that only make sense for one device kind carry
/// a default `Unsupported` implementation.
pub trait Device: Send + Sync {
    fn lifecycle(&self) -> DeviceLifecycle;

    /// Rejects unknown input names with `InvalidInputName`.
    fn get_tracked_pose(&self, input_name: &str, target_time_ns: u64) -> ViveResult<SpaceRelation>;

    /// Publish the latest per-input struct snapshot under lock.
    fn update_inputs(&self) -> ViveResult<()>;

    /// Idempotent; joins reader threads, powers off the mainboard (HMD) or
    /// closes the dongle channel (controller), frees everything.
    fn destroy(&self) -> ViveResult<()>;

    fn set_output(&self, _output_name: &str, _vibration: HapticCommand) -> ViveResult<()> {
        Err(ViveError::Unsupported("set_output"))
    }

    fn get_hand_tracking(&self, _input_name: &str, _target_time_ns: u64) -> ViveResult<HandJointSet> {
        Err(ViveError::Unsupported("get_hand_tracking"))
    }

    fn get_view_pose(&self, _eye_relation: SpaceRelation, _view_index: u32) -> ViveResult<Pose> {
        Err(ViveError::Unsupported("get_view_pose"))
    }

    fn compute_distortion(&self, _view_index: u32, _u: f64, _v: f64) -> ViveResult<DistortedUv> {
        Err(ViveError::Unsupported("compute_distortion"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_starts_created_and_tracks_transitions() {
        let state = LifecycleState::new();
        assert_eq!(state.get(), DeviceLifecycle::Created);
        state.set(DeviceLifecycle::Running);
        assert!(!state.should_exit());
        state.set(DeviceLifecycle::Stopping);
        assert!(state.should_exit());
        state.set(DeviceLifecycle::Destroyed);
        assert!(state.should_exit());
    }
}
