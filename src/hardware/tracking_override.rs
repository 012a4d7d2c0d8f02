//! Tracking-override composer (C10, spec §4.10).
//!
//! Wraps a *target* device so its reported pose is driven by a *tracker*
//! device at a fixed offset, while every other capability — inputs, haptics,
//! hand tracking, distortion, view poses — still forwards straight through
//! to the target, the same "decorator over `Device`" shape the lighthouse
//! override uses elsewhere in this family of runtimes.

use std::sync::Arc;

use crate::error::ViveResult;
use crate::hardware::device::{Device, DeviceLifecycle, DistortedUv, HandJointSet, HapticCommand};
use crate::hardware::history::SpaceRelation;
use crate::math::Pose;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideMode {
    /// `inverse(offset) ∘ tracker_relation`.
    Direct,
    /// `target_relation ∘ inverse(offset) ∘ tracker_relation`: the tracker
    /// is rigidly attached at `offset` to something whose identity, inputs,
    /// and hand tracking still come from `target`.
    Attached,
}

pub struct TrackingOverride {
    target: Arc<dyn Device>,
    tracker: Arc<dyn Device>,
    tracker_input_name: String,
    mode: OverrideMode,
    offset: Pose,
}

impl TrackingOverride {
    pub fn new(
        target: Arc<dyn Device>,
        tracker: Arc<dyn Device>,
        tracker_input_name: impl Into<String>,
        mode: OverrideMode,
        offset: Pose,
    ) -> Self {
        Self {
            target,
            tracker,
            tracker_input_name: tracker_input_name.into(),
            mode,
            offset,
        }
    }
}

impl Device for TrackingOverride {
    fn lifecycle(&self) -> DeviceLifecycle {
        self.target.lifecycle()
    }

    fn get_tracked_pose(&self, input_name: &str, target_time_ns: u64) -> ViveResult<SpaceRelation> {
        let tracker_relation = self
            .tracker
            .get_tracked_pose(&self.tracker_input_name, target_time_ns)?;
        let tracker_pose = Pose::new(tracker_relation.position, tracker_relation.orientation);
        let offset_inverse = self.offset.inverse();

        let output_pose = match self.mode {
            OverrideMode::Direct => offset_inverse.compose(&tracker_pose),
            OverrideMode::Attached => {
                let target_relation = self.target.get_tracked_pose(input_name, target_time_ns)?;
                let target_pose = Pose::new(target_relation.position, target_relation.orientation);
                target_pose.compose(&offset_inverse).compose(&tracker_pose)
            }
        };

        Ok(SpaceRelation {
            position: output_pose.position,
            orientation: output_pose.orientation,
            linear_velocity: tracker_relation.linear_velocity,
            angular_velocity: tracker_relation.angular_velocity,
            position_valid: tracker_relation.position_valid,
            orientation_valid: tracker_relation.orientation_valid,
        })
    }

    fn update_inputs(&self) -> ViveResult<()> {
        self.target.update_inputs()
    }

    fn set_output(&self, output_name: &str, vibration: HapticCommand) -> ViveResult<()> {
        self.target.set_output(output_name, vibration)
    }

    fn get_hand_tracking(&self, input_name: &str, target_time_ns: u64) -> ViveResult<HandJointSet> {
        self.target.get_hand_tracking(input_name, target_time_ns)
    }

    fn get_view_pose(&self, eye_relation: SpaceRelation, view_index: u32) -> ViveResult<Pose> {
        self.target.get_view_pose(eye_relation, view_index)
    }

    fn compute_distortion(&self, view_index: u32, u: f64, v: f64) -> ViveResult<DistortedUv> {
        self.target.compute_distortion(view_index, u, v)
    }

    fn destroy(&self) -> ViveResult<()> {
        self.target.destroy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::calibration::HmdCalibration;
    use crate::hardware::hmd::HmdDevice;
    use crate::hardware::variant::HmdVariant;
    use crate::math::{Quaternion, Vector3};

    fn open_headless_hmd() -> Arc<HmdDevice> {
        HmdDevice::open(HmdCalibration::defaults(HmdVariant::Vive), None, None, None).unwrap()
    }

    fn relation_at(position: Vector3) -> SpaceRelation {
        SpaceRelation {
            position,
            orientation: Quaternion::identity(),
            linear_velocity: Vector3::zero(),
            angular_velocity: Vector3::zero(),
            position_valid: true,
            orientation_valid: true,
        }
    }

    #[test]
    fn direct_mode_with_identity_offset_passes_tracker_relation_through() {
        let tracker = open_headless_hmd();
        tracker
            .history_for_test()
            .push(0, relation_at(Vector3::new(1.0, 2.0, 3.0)));
        let target = open_headless_hmd();

        let composer = TrackingOverride::new(
            target,
            tracker,
            "head",
            OverrideMode::Direct,
            Pose::identity(),
        );
        let result = composer.get_tracked_pose("head", 0).unwrap();
        assert_eq!(result.position, Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn attached_mode_with_translation_offset_matches_worked_example() {
        let tracker = open_headless_hmd();
        tracker
            .history_for_test()
            .push(0, relation_at(Vector3::new(1.0, 2.0, 3.0)));
        let target = open_headless_hmd();
        target.history_for_test().push(0, relation_at(Vector3::zero()));

        let offset = Pose::new(Vector3::new(0.0, 0.1, 0.0), Quaternion::identity());
        let composer = TrackingOverride::new(target, tracker, "head", OverrideMode::Attached, offset);
        let result = composer.get_tracked_pose("head", 0).unwrap();
        assert!((result.position.x - 1.0).abs() < 1e-9);
        assert!((result.position.y - 1.9).abs() < 1e-9);
        assert!((result.position.z - 3.0).abs() < 1e-9);
    }
}
