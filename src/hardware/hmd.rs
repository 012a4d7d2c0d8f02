//! HMD device state machine (C8, spec §4.8).
//!
//! Wires together up to three reader threads — mainboard status, sensors
//! (IMU + lighthouse-V2), and photodiode pulses (lighthouse-V1) — around one
//! relation history and one immutable calibration, per the thread-per-
//! endpoint model in spec §5.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::error::{ViveError, ViveResult};
use crate::hardware::calibration::HmdCalibration;
use crate::hardware::device::{Device, DeviceLifecycle, DistortedUv, LifecycleState};
use crate::hardware::hid::HidTransport;
use crate::hardware::history::{RelationHistory, SpaceRelation, DEFAULT_CAPACITY};
use crate::hardware::imu::{self, FusedSample, ImuIntegrator};
use crate::hardware::lighthouse;
use crate::hardware::mainboard::{self, MainboardStatus};
use crate::math::{Pose, Quaternion, Vector3};

const READ_TIMEOUT_MS: i32 = 1000;

/// Report id of the 52-byte IMU report on the sensors interface.
const REPORT_IMU: u8 = 0x02;
/// Report id of the HMD lighthouse-V2 pulse report on the sensors interface.
const REPORT_LIGHTHOUSE_V2: u8 = 0x03;

const HEAD_INPUT_NAME: &str = "head";

/// Estimate angular velocity between two consecutive fused orientation
/// samples from the relative rotation and the elapsed device time.
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

pub struct HmdDevice {
    calibration: HmdCalibration,
    lifecycle: Arc<LifecycleState>,
    history: Arc<RelationHistory>,
    mainboard_status: Mutex<MainboardStatus>,
    mainboard: Option<Arc<dyn HidTransport>>,
    sensors: Option<Arc<dyn HidTransport>>,
    photodiodes: Option<Arc<dyn HidTransport>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl HmdDevice {
    /// Open an HMD: power the mainboard on, then start one reader thread per
    /// interface that was actually opened by the caller (missing interfaces
    /// are tolerated — a bench setup may only wire up `sensors`, say).
    pub fn open(
        calibration: HmdCalibration,
        mainboard: Option<Arc<dyn HidTransport>>,
        sensors: Option<Arc<dyn HidTransport>>,
        photodiodes: Option<Arc<dyn HidTransport>>,
    ) -> ViveResult<Arc<Self>> {
        if let Some(mb) = &mainboard {
            mainboard::power_on(mb.as_ref())?;
        }

        let device = Arc::new(Self {
            calibration,
            lifecycle: Arc::new(LifecycleState::new()),
            history: Arc::new(RelationHistory::new(DEFAULT_CAPACITY)),
            mainboard_status: Mutex::new(MainboardStatus::default()),
            mainboard: mainboard.clone(),
            sensors: sensors.clone(),
            photodiodes: photodiodes.clone(),
            threads: Mutex::new(Vec::new()),
        });

        let mut threads = Vec::new();
        if let Some(transport) = mainboard {
            threads.push(device.clone().spawn_mainboard_thread(transport));
        }
        if let Some(transport) = sensors {
            threads.push(device.clone().spawn_sensors_thread(transport));
        }
        if let Some(transport) = photodiodes {
            threads.push(device.clone().spawn_photodiode_thread(transport));
        }
        *device.threads.lock().unwrap() = threads;

        device.lifecycle.set(DeviceLifecycle::Running);
        Ok(device)
    }

    pub fn mainboard_status(&self) -> MainboardStatus {
        *self.mainboard_status.lock().unwrap()
    }

    /// Direct access to the relation history for tests that need to seed a
    /// pose without a live sensor thread (e.g. tracking-override composition).
    #[cfg(test)]
    pub fn history_for_test(&self) -> Arc<RelationHistory> {
        self.history.clone()
    }

    fn spawn_mainboard_thread(self: Arc<Self>, transport: Arc<dyn HidTransport>) -> JoinHandle<()> {
        thread::spawn(move || {
            let mut buf = [0u8; mainboard::STATUS_REPORT_LEN];
            loop {
                if self.lifecycle.should_exit() {
                    break;
                }
                match transport.read(&mut buf, READ_TIMEOUT_MS) {
                    Ok(0) => continue,
                    Ok(_) => match mainboard::decode_status_report(&buf) {
                        Ok(status) => *self.mainboard_status.lock().unwrap() = status,
                        Err(e) => warn!("mainboard status decode failed: {e}"),
                    },
                    Err(e) => warn!("mainboard read error: {e}"),
                }
            }
        })
    }

    fn spawn_sensors_thread(self: Arc<Self>, transport: Arc<dyn HidTransport>) -> JoinHandle<()> {
        thread::spawn(move || {
            let mut integrator =
                ImuIntegrator::new(self.calibration.imu, self.calibration.variant.axis_remap());
            let mut previous: Option<FusedSample> = None;
            let mut buf = [0u8; 64];
            loop {
                if self.lifecycle.should_exit() {
                    break;
                }
                let n = match transport.read(&mut buf, READ_TIMEOUT_MS) {
                    Ok(0) => continue,
                    Ok(n) => n,
                    Err(e) => {
                        warn!("sensors read error: {e}");
                        continue;
                    }
                };
                if n == 0 {
                    continue;
                }
                match buf[0] {
                    REPORT_IMU if n >= imu::HMD_IMU_REPORT_LEN => {
                        match integrator.ingest_hmd_report(&buf[..imu::HMD_IMU_REPORT_LEN]) {
                            Ok(samples) => {
                                for sample in samples {
                                    let angular_velocity = previous
                                        .as_ref()
                                        .map(|p| angular_velocity_between(p, &sample))
                                        .unwrap_or_else(Vector3::zero);
                                    self.history.push(
                                        sample.time_ns,
                                        SpaceRelation {
                                            position: Vector3::zero(),
                                            orientation: sample.orientation,
                                            linear_velocity: Vector3::zero(),
                                            angular_velocity,
                                            position_valid: false,
                                            orientation_valid: true,
                                        },
                                    );
                                    previous = Some(sample);
                                }
                            }
                            Err(e) => warn!("IMU report decode failed: {e}"),
                        }
                    }
                    REPORT_LIGHTHOUSE_V2 => {
                        if let Err(e) = lighthouse::decode_v2_report(&buf[..n]) {
                            warn!("lighthouse V2 decode failed: {e}");
                        }
                    }
                    other => warn!("unexpected report id 0x{other:02X} on sensors interface"),
                }
            }
        })
    }

    fn spawn_photodiode_thread(self: Arc<Self>, transport: Arc<dyn HidTransport>) -> JoinHandle<()> {
        thread::spawn(move || {
            let mut buf = [0u8; 64];
            loop {
                if self.lifecycle.should_exit() {
                    break;
                }
                match transport.read(&mut buf, READ_TIMEOUT_MS) {
                    Ok(0) => continue,
                    Ok(n) => match lighthouse::decode_v1_report(&buf[..n]) {
                        Ok(pulses) => {
                            for pulse in pulses {
                                if let lighthouse::V1Pulse::Sweep {
                                    sensor_id,
                                    timestamp_ticks,
                                    ..
                                } = pulse
                                {
                                    debug!("hmd sweep pulse: sensor {sensor_id} at tick {timestamp_ticks}");
                                }
                            }
                        }
                        Err(e) => warn!("lighthouse V1 decode failed: {e}"),
                    },
                    Err(e) => warn!("photodiode read error: {e}"),
                }
            }
        })
    }
}

impl Device for HmdDevice {
    fn lifecycle(&self) -> DeviceLifecycle {
        self.lifecycle.get()
    }

    fn get_tracked_pose(&self, input_name: &str, target_time_ns: u64) -> ViveResult<SpaceRelation> {
        if input_name != HEAD_INPUT_NAME {
            return Err(ViveError::InvalidInputName(input_name.to_string()));
        }
        Ok(self.history.get(target_time_ns))
    }

    fn update_inputs(&self) -> ViveResult<()> {
        // The HMD's only externally visible input is the mainboard status,
        // which the mainboard reader thread already publishes under lock.
        Ok(())
    }

    fn destroy(&self) -> ViveResult<()> {
        if self.lifecycle.get() == DeviceLifecycle::Destroyed {
            return Ok(());
        }
        self.lifecycle.set(DeviceLifecycle::Stopping);

        if let Some(t) = &self.mainboard {
            t.close();
        }
        if let Some(t) = &self.sensors {
            t.close();
        }
        if let Some(t) = &self.photodiodes {
            t.close();
        }

        for handle in self.threads.lock().unwrap().drain(..) {
            let _ = handle.join();
        }

        if let Some(t) = &self.mainboard {
            if let Err(e) = mainboard::power_off(t.as_ref()) {
                warn!("mainboard power off failed: {e}");
            }
        }

        self.lifecycle.set(DeviceLifecycle::Destroyed);
        Ok(())
    }

    fn get_view_pose(&self, eye_relation: SpaceRelation, view_index: u32) -> ViveResult<Pose> {
        let eye = self
            .calibration
            .display
            .eyes
            .get(view_index as usize)
            .ok_or(ViveError::Unsupported("view_index out of range"))?;
        let half_ipd = self.calibration.display.lens_separation_m / 2.0;
        let sign = if view_index == 0 { -1.0 } else { 1.0 };
        let eye_offset = Pose::new(Vector3::new(sign * half_ipd, 0.0, 0.0), eye.rotation);
        let head_pose = Pose::new(eye_relation.position, eye_relation.orientation);
        Ok(head_pose.compose(&eye_offset))
    }

    fn compute_distortion(&self, view_index: u32, u: f64, v: f64) -> ViveResult<DistortedUv> {
        let eye = self
            .calibration
            .display
            .eyes
            .get(view_index as usize)
            .ok_or(ViveError::Unsupported("view_index out of range"))?;
        Ok(DistortedUv {
            r: eye.distortion.red.distort(&eye.distortion, u, v),
            g: eye.distortion.green.distort(&eye.distortion, u, v),
            b: eye.distortion.blue.distort(&eye.distortion, u, v),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::variant::HmdVariant;

    fn open_headless() -> Arc<HmdDevice> {
        HmdDevice::open(HmdCalibration::defaults(HmdVariant::Vive), None, None, None).unwrap()
    }

    #[test]
    fn opens_directly_into_running_with_no_transports() {
        let device = open_headless();
        assert_eq!(device.lifecycle(), DeviceLifecycle::Running);
    }

    #[test]
    fn destroy_is_idempotent_and_reaches_destroyed() {
        let device = open_headless();
        device.destroy().unwrap();
        device.destroy().unwrap();
        assert_eq!(device.lifecycle(), DeviceLifecycle::Destroyed);
    }

    #[test]
    fn unknown_input_name_is_rejected() {
        let device = open_headless();
        let err = device.get_tracked_pose("left_hand", 0).unwrap_err();
        assert!(matches!(err, ViveError::InvalidInputName(_)));
    }

    #[test]
    fn head_pose_on_empty_history_is_zero_flagged() {
        let device = open_headless();
        let relation = device.get_tracked_pose(HEAD_INPUT_NAME, 0).unwrap();
        assert!(!relation.position_valid);
    }

    #[test]
    fn compute_distortion_identity_calibration_is_passthrough_at_center() {
        let device = open_headless();
        let uv = device.compute_distortion(0, 0.5, 0.5).unwrap();
        assert_eq!(uv.r, (0.5, 0.5));
        assert_eq!(uv.g, (0.5, 0.5));
        assert_eq!(uv.b, (0.5, 0.5));
    }

    #[test]
    fn compute_distortion_rejects_out_of_range_view_index() {
        let device = open_headless();
        let err = device.compute_distortion(2, 0.5, 0.5).unwrap_err();
        assert!(matches!(err, ViveError::Unsupported(_)));
    }

    #[test]
    fn view_pose_offsets_by_half_the_lens_separation() {
        let mut calibration = HmdCalibration::defaults(HmdVariant::Vive);
        calibration.display.lens_separation_m = 0.06;
        let device = HmdDevice::open(calibration, None, None, None).unwrap();
        let head = SpaceRelation {
            position: Vector3::zero(),
            orientation: Quaternion::identity(),
            linear_velocity: Vector3::zero(),
            angular_velocity: Vector3::zero(),
            position_valid: true,
            orientation_valid: true,
        };
        let left = device.get_view_pose(head, 0).unwrap();
        let right = device.get_view_pose(head, 1).unwrap();
        assert!((left.position.x - (-0.03)).abs() < 1e-9);
        assert!((right.position.x - 0.03).abs() < 1e-9);
    }
}
