//! Calibration data model (spec §3) produced once per device at open time
//! by the config parser (C3) and held immutable for the device's lifetime.

use serde::{Deserialize, Serialize};

use crate::hardware::variant::HmdVariant;
use crate::math::{Pose, Quaternion, Vector3};

/// Fixed-size firmware/identity strings, all ≤32 bytes in the source wire
/// format; kept here as owned `String`s since nothing downstream needs the
/// fixed-capacity buffer once parsed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FirmwareInfo {
    pub firmware_version: String,
    pub hardware_revision: String,
    pub hardware_version_major: u32,
    pub hardware_version_minor: u32,
    pub hardware_version_micro: u32,
    pub mainboard_serial: String,
    pub model_number: String,
    pub device_serial: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImuCalibration {
    /// Accelerometer full-scale range, m/s^2.
    pub acc_range: f64,
    /// Gyroscope full-scale range, rad/s.
    pub gyro_range: f64,
    pub acc_bias: Vector3,
    pub acc_scale: Vector3,
    pub gyro_bias: Vector3,
    pub gyro_scale: Vector3,
    /// IMU-in-tracking pose.
    pub imu_in_tracking: Pose,
}

impl Default for ImuCalibration {
    fn default() -> Self {
        // Spec §4.4 "Default calibration".
        Self {
            acc_range: 39.2266,
            gyro_range: 8.726646,
            acc_bias: Vector3::zero(),
            acc_scale: Vector3::new(1.0, 1.0, 1.0),
            gyro_bias: Vector3::zero(),
            gyro_scale: Vector3::new(1.0, 1.0, 1.0),
            imu_in_tracking: Pose::identity(),
        }
    }
}

/// Per-color-channel distortion polynomial (spec §3 Distortion block).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChannelDistortion {
    pub center_x: f64,
    pub center_y: f64,
    pub coeffs: [f64; 4],
}

impl Default for ChannelDistortion {
    fn default() -> Self {
        Self {
            center_x: 0.5,
            center_y: 0.5,
            coeffs: [0.0; 4],
        }
    }
}

impl ChannelDistortion {
    /// The closed-form "Vive distortion" used by `compute_distortion`
    /// (spec §4.8): a radial polynomial centered on this channel's own
    /// lens center, scaled by the eye's aspect ratio and undistort growth
    /// factor, with `r2` clamped at `undistort_r2_cutoff`.
    pub fn distort(&self, eye: &EyeDistortion, u: f64, v: f64) -> (f64, f64) {
        let dx = u - self.center_x;
        let dy = (v - self.center_y) / eye.aspect_x_over_y;
        let r2 = (dx * dx + dy * dy).min(eye.undistort_r2_cutoff);
        let [k1, k2, k3, k4] = self.coeffs;
        let poly = 1.0 + r2 * (k1 + r2 * (k2 + r2 * (k3 + r2 * k4)));
        let scale = poly * (1.0 + eye.grow_for_undistort);
        (
            self.center_x + dx * scale,
            self.center_y + dy * scale * eye.aspect_x_over_y,
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EyeDistortion {
    pub aspect_x_over_y: f64,
    pub grow_for_undistort: f64,
    pub undistort_r2_cutoff: f64,
    pub red: ChannelDistortion,
    pub green: ChannelDistortion,
    pub blue: ChannelDistortion,
}

impl Default for EyeDistortion {
    fn default() -> Self {
        Self {
            // Spec §4.4 default calibration.
            aspect_x_over_y: 0.9,
            grow_for_undistort: 0.5,
            undistort_r2_cutoff: 1.0,
            red: ChannelDistortion::default(),
            green: ChannelDistortion::default(),
            blue: ChannelDistortion::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EyeDisplay {
    pub rotation: Quaternion,
    pub target_width_px: u32,
    pub target_height_px: u32,
    pub distortion: EyeDistortion,
}

impl Default for EyeDisplay {
    fn default() -> Self {
        Self {
            rotation: Quaternion::identity(),
            target_width_px: 1080,
            target_height_px: 1200,
            distortion: EyeDistortion::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayCalibration {
    pub lens_separation_m: f64,
    pub persistence: f64,
    pub eyes: [EyeDisplay; 2],
    /// Head-in-tracking pose; identity for non-Index variants.
    pub head_in_tracking: Pose,
    /// IMU-in-head pose, `inverse(head) ∘ imu` for Index.
    pub imu_in_head: Pose,
}

impl Default for DisplayCalibration {
    fn default() -> Self {
        Self {
            lens_separation_m: 0.0,
            persistence: 0.0,
            eyes: [EyeDisplay::default(), EyeDisplay::default()],
            head_in_tracking: Pose::identity(),
            imu_in_head: Pose::identity(),
        }
    }
}

/// Lighthouse photodiode sensor model, transformed to IMU-reference frame
/// at parse time (spec §4.3, Index `lighthouse_config`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LighthouseSensorModel {
    pub points: Vec<Vector3>,
    pub normals: Vec<Vector3>,
}

/// Full HMD calibration, immutable for the device's lifetime.
#[derive(Debug, Clone)]
pub struct HmdCalibration {
    pub variant: HmdVariant,
    pub imu: ImuCalibration,
    pub display: DisplayCalibration,
    pub firmware: FirmwareInfo,
    pub lighthouse_sensors: LighthouseSensorModel,
}

impl HmdCalibration {
    pub fn defaults(variant: HmdVariant) -> Self {
        Self {
            variant,
            imu: ImuCalibration::default(),
            display: DisplayCalibration::default(),
            firmware: FirmwareInfo::default(),
            lighthouse_sensors: LighthouseSensorModel::default(),
        }
    }
}

/// Controller/tracker calibration: same firmware/IMU shape as the HMD, with
/// no display or distortion block (spec §3).
#[derive(Debug, Clone)]
pub struct ControllerCalibration {
    pub variant: crate::hardware::variant::ControllerVariant,
    pub imu: ImuCalibration,
    pub firmware: FirmwareInfo,
}

impl ControllerCalibration {
    pub fn defaults(variant: crate::hardware::variant::ControllerVariant) -> Self {
        Self {
            variant,
            imu: ImuCalibration::default(),
            firmware: FirmwareInfo::default(),
        }
    }
}
