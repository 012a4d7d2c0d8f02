//! Controller/tracker device state machine (C8, spec §4.8).
//!
//! One dongle reader thread demultiplexes `watchman_message` frames (C7),
//! updates the input snapshot and pushes fused IMU orientations into the
//! relation history (C9), the same shape `hmd.rs` uses for its own reader
//! threads.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::error::{ViveError, ViveResult};
use crate::hardware::calibration::ControllerCalibration;
use crate::hardware::device::{Device, DeviceLifecycle, HandJointSet, HapticCommand, LifecycleState};
use crate::hardware::hid::HidTransport;
use crate::hardware::history::{RelationHistory, SpaceRelation, DEFAULT_CAPACITY};
use crate::hardware::imu::{FusedSample, ImuIntegrator};
use crate::hardware::lighthouse;
use crate::hardware::variant::ControllerVariant;
use crate::hardware::watchman::{self, ParsedPayload, WatchmanEvent};
use crate::math::{Pose, Quaternion, Vector3};

const READ_TIMEOUT_MS: i32 = 1000;

const TRACKED_INPUT_NAME: &str = "controller";
const HAND_INPUT_NAME: &str = "hand";
const HAPTIC_OUTPUT_NAME: &str = "haptic";

/// Report id of a controller's own haptic feature report. The spec (§4.7)
/// names its byte layout but not its numeric report id.
const REPORT_HAPTIC: u8 = 0x0A;

/// Gen 1 devices (the original Vive wand and tracker) use the Gen 1
/// watchman grammar; Index Knuckles and the Gen 2 tracker use Gen 2. The
/// spec names the two grammars but does not explicitly bind them back to
/// `ControllerVariant`; this mapping is the natural reading of the
/// per-variant button/axis tables in §4.7, which split along exactly this
/// line.
fn uses_gen2_grammar(variant: ControllerVariant) -> bool {
    matches!(
        variant,
        ControllerVariant::IndexLeft | ControllerVariant::IndexRight | ControllerVariant::TrackerGen2
    )
}

/// Latest published per-input state for a controller/tracker (spec §3's
/// "per-device input state"), the same role `MainboardStatus` plays for the
/// HMD: the dongle reader thread owns the write side, `inputs()` the read.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputSnapshot {
    pub battery_percent: u8,
    pub charging: bool,
    pub button_previous: u8,
    pub button_current: u8,
    pub touch_previous: u8,
    pub touch_current: u8,
    pub trigger: f64,
    pub trackpad: (f64, f64),
    pub finger_proximity: [u8; 4],
    pub trackpad_force: u8,
    pub squeeze_force: u8,
    pub last_update_ns: u64,
}

fn angular_velocity_between(prev: &FusedSample, cur: &FusedSample) -> Vector3 {
    let dt_ns = cur.time_ns.saturating_sub(prev.time_ns);
    if dt_ns == 0 {
        return Vector3::zero();
    }
    let dt = dt_ns as f64 * 1e-9;
    let relative = prev.orientation.inverse().mul(&cur.orientation);
    let angle = 2.0 * relative.w.clamp(-1.0, 1.0).acos();
    let axis = Vector3::new(relative.x, relative.y, relative.z);
    if axis.magnitude() < 1e-9 || angle < 1e-9 {
        return Vector3::zero();
    }
    axis.normalize().scale(angle / dt)
}

pub struct ControllerDevice {
    calibration: ControllerCalibration,
    lifecycle: Arc<LifecycleState>,
    history: Arc<RelationHistory>,
    inputs: Mutex<InputSnapshot>,
    dongle: Option<Arc<dyn HidTransport>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl ControllerDevice {
    pub fn open(
        calibration: ControllerCalibration,
        dongle: Option<Arc<dyn HidTransport>>,
    ) -> ViveResult<Arc<Self>> {
        let device = Arc::new(Self {
            calibration,
            lifecycle: Arc::new(LifecycleState::new()),
            history: Arc::new(RelationHistory::new(DEFAULT_CAPACITY)),
            inputs: Mutex::new(InputSnapshot::default()),
            dongle: dongle.clone(),
            threads: Mutex::new(Vec::new()),
        });

        let mut threads = Vec::new();
        if let Some(transport) = dongle {
            threads.push(device.clone().spawn_dongle_thread(transport));
        }
        *device.threads.lock().unwrap() = threads;

        device.lifecycle.set(DeviceLifecycle::Running);
        Ok(device)
    }

    pub fn inputs(&self) -> InputSnapshot {
        *self.inputs.lock().unwrap()
    }

    fn apply_event(
        &self,
        event: WatchmanEvent,
        integrator: &mut ImuIntegrator,
        previous_fused: &mut Option<FusedSample>,
    ) {
        let mut inputs = self.inputs.lock().unwrap();
        match event {
            WatchmanEvent::Battery {
                charge_percent,
                charging,
            } => {
                inputs.battery_percent = charge_percent;
                inputs.charging = charging;
            }
            WatchmanEvent::Button { bitmask } => {
                let changed = watchman::edge_detect(inputs.button_current, bitmask);
                if changed != 0 {
                    debug!("controller button edge: changed=0b{changed:08b} new=0b{bitmask:08b}");
                }
                inputs.button_previous = inputs.button_current;
                inputs.button_current = bitmask;
            }
            WatchmanEvent::Trigger { raw } => {
                inputs.trigger = raw as f64 / 255.0;
            }
            WatchmanEvent::Trackpad { x, y } => {
                inputs.trackpad = (x, y);
            }
            WatchmanEvent::TouchForce(touch) => {
                inputs.finger_proximity = [
                    touch.curl_index,
                    touch.curl_middle,
                    touch.curl_ring,
                    touch.curl_pinky,
                ];
                inputs.trackpad_force = touch.force;
                inputs.squeeze_force = (touch.squeeze_value() * 255.0).round() as u8;

                let changed = watchman::edge_detect(inputs.touch_current, touch.touch_bitmask);
                if changed != 0 {
                    debug!("controller touch edge: changed=0b{changed:08b} new=0b{:08b}", touch.touch_bitmask);
                }
                inputs.touch_previous = inputs.touch_current;
                inputs.touch_current = touch.touch_bitmask;
            }
            WatchmanEvent::Imu(raw) => {
                drop(inputs);
                if let Some(fused) = integrator.ingest_single(raw) {
                    let angular_velocity = previous_fused
                        .as_ref()
                        .map(|p| angular_velocity_between(p, &fused))
                        .unwrap_or_else(Vector3::zero);
                    self.history.push(
                        fused.time_ns,
                        SpaceRelation {
                            position: Vector3::zero(),
                            orientation: fused.orientation,
                            linear_velocity: Vector3::zero(),
                            angular_velocity,
                            position_valid: false,
                            orientation_valid: true,
                        },
                    );
                    *previous_fused = Some(fused);
                    self.inputs.lock().unwrap().last_update_ns = fused.time_ns;
                }
                return;
            }
        }
        inputs.last_update_ns = integrator.time_ns();
    }

    fn apply_payload(
        &self,
        payload: ParsedPayload,
        gen2: bool,
        integrator: &mut ImuIntegrator,
        previous_fused: &mut Option<FusedSample>,
    ) {
        for event in payload.events {
            self.apply_event(event, integrator, previous_fused);
        }
        if payload.trailing.is_empty() {
            return;
        }
        let pulses = if gen2 {
            lighthouse::decode_v2_records(&payload.trailing).map(|_| ())
        } else {
            lighthouse::decode_v1_records(&payload.trailing).map(|_| ())
        };
        if let Err(e) = pulses {
            warn!("controller lighthouse trailing decode failed: {e}");
        }
    }

    fn spawn_dongle_thread(self: Arc<Self>, transport: Arc<dyn HidTransport>) -> JoinHandle<()> {
        let gen2 = uses_gen2_grammar(self.calibration.variant);
        thread::spawn(move || {
            let mut integrator =
                ImuIntegrator::new(self.calibration.imu, self.calibration.variant.axis_remap());
            let mut previous_fused: Option<FusedSample> = None;
            let mut buf = [0u8; 64];
            loop {
                if self.lifecycle.should_exit() {
                    break;
                }
                let n = match transport.read(&mut buf, READ_TIMEOUT_MS) {
                    Ok(0) => continue,
                    Ok(n) => n,
                    Err(e) => {
                        warn!("dongle read error: {e}");
                        continue;
                    }
                };
                if n < 1 {
                    continue;
                }
                let body = &buf[1..n];
                for message in watchman::split_watchman_messages(body) {
                    let payload = if gen2 {
                        watchman::parse_gen2_payload(message.payload, message.timestamp_hi)
                    } else {
                        watchman::parse_gen1_payload(message.payload, message.timestamp_hi)
                    };
                    self.apply_payload(payload, gen2, &mut integrator, &mut previous_fused);
                }
            }
        })
    }
}

impl Device for ControllerDevice {
    fn lifecycle(&self) -> DeviceLifecycle {
        self.lifecycle.get()
    }

    fn get_tracked_pose(&self, input_name: &str, target_time_ns: u64) -> ViveResult<SpaceRelation> {
        if input_name != TRACKED_INPUT_NAME {
            return Err(ViveError::InvalidInputName(input_name.to_string()));
        }
        Ok(self.history.get(target_time_ns))
    }

    fn update_inputs(&self) -> ViveResult<()> {
        Ok(())
    }

    fn set_output(&self, output_name: &str, vibration: HapticCommand) -> ViveResult<()> {
        if output_name != HAPTIC_OUTPUT_NAME {
            return Err(ViveError::InvalidInputName(output_name.to_string()));
        }
        let report = watchman::build_haptic_report(
            REPORT_HAPTIC,
            vibration.amplitude,
            vibration.frequency_hz,
            vibration.duration_s,
        );
        match &self.dongle {
            Some(transport) => transport.set_feature_report(&report),
            None => Err(ViveError::HidIo("no dongle transport open".into())),
        }
    }

    fn get_hand_tracking(&self, input_name: &str, target_time_ns: u64) -> ViveResult<HandJointSet> {
        if input_name != HAND_INPUT_NAME {
            return Err(ViveError::InvalidInputName(input_name.to_string()));
        }
        let snapshot = self.inputs();
        let base = self.history.get(target_time_ns);
        let joints = snapshot
            .finger_proximity
            .iter()
            .map(|&curl| {
                let curl_angle = (curl as f64 / 255.0) * std::f64::consts::FRAC_PI_2;
                let bend = Quaternion::from_axis_angle(Vector3::new(1.0, 0.0, 0.0), curl_angle);
                Pose::new(base.position, bend.mul(&base.orientation))
            })
            .collect();
        Ok(HandJointSet { joints })
    }

    fn destroy(&self) -> ViveResult<()> {
        if self.lifecycle.get() == DeviceLifecycle::Destroyed {
            return Ok(());
        }
        self.lifecycle.set(DeviceLifecycle::Stopping);

        if let Some(t) = &self.dongle {
            t.close();
        }
        for handle in self.threads.lock().unwrap().drain(..) {
            let _ = handle.join();
        }

        self.lifecycle.set(DeviceLifecycle::Destroyed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_headless(variant: ControllerVariant) -> Arc<ControllerDevice> {
        ControllerDevice::open(ControllerCalibration::defaults(variant), None).unwrap()
    }

    #[test]
    fn opens_directly_into_running_with_no_dongle() {
        let device = open_headless(ControllerVariant::ViveWand);
        assert_eq!(device.lifecycle(), DeviceLifecycle::Running);
    }

    #[test]
    fn unknown_input_name_is_rejected() {
        let device = open_headless(ControllerVariant::IndexRight);
        let err = device.get_tracked_pose("head", 0).unwrap_err();
        assert!(matches!(err, ViveError::InvalidInputName(_)));
    }

    #[test]
    fn set_output_with_no_dongle_is_a_hid_error() {
        let device = open_headless(ControllerVariant::ViveWand);
        let err = device
            .set_output(
                HAPTIC_OUTPUT_NAME,
                HapticCommand {
                    amplitude: 1.0,
                    frequency_hz: 150.0,
                    duration_s: 0.05,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ViveError::HidIo(_)));
    }

    #[test]
    fn set_output_rejects_unknown_output_name() {
        let device = open_headless(ControllerVariant::ViveWand);
        let err = device
            .set_output(
                "rumble",
                HapticCommand {
                    amplitude: 1.0,
                    frequency_hz: 150.0,
                    duration_s: 0.05,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ViveError::InvalidInputName(_)));
    }

    #[test]
    fn gen2_grammar_selected_for_index_and_tracker_gen2() {
        assert!(uses_gen2_grammar(ControllerVariant::IndexLeft));
        assert!(uses_gen2_grammar(ControllerVariant::TrackerGen2));
        assert!(!uses_gen2_grammar(ControllerVariant::ViveWand));
        assert!(!uses_gen2_grammar(ControllerVariant::TrackerGen1));
    }

    #[test]
    fn hand_tracking_returns_four_joints_from_finger_proximity() {
        let device = open_headless(ControllerVariant::IndexRight);
        let joints = device.get_hand_tracking(HAND_INPUT_NAME, 0).unwrap();
        assert_eq!(joints.joints.len(), 4);
    }
}
