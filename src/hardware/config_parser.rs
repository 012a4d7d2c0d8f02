//! Factory config JSON parser (C3, spec §4.3).
//!
//! Parses the inflated calibration JSON (see `config_blob`) into the typed
//! structures from `calibration`. Per-variant schema differences (Vive vs
//! Vive Pro vs Index) are handled by dedicated functions rather than one
//! branchy parser, in the spirit of the variant-dispatch design note.

use serde_json::Value;

use crate::error::{ViveError, ViveResult};
use crate::hardware::calibration::{
    ChannelDistortion, DisplayCalibration, EyeDisplay, EyeDistortion, FirmwareInfo,
    HmdCalibration, ImuCalibration, LighthouseSensorModel,
};
use crate::hardware::variant::{ControllerVariant, HmdVariant};
use crate::math::{Pose, Quaternion, Vector3};

fn parse_json(json: &str) -> ViveResult<Value> {
    serde_json::from_str(json).map_err(|e| ViveError::ConfigJsonSyntax(e.to_string()))
}

fn required_field<'a>(value: &'a Value, key: &str) -> ViveResult<&'a Value> {
    value
        .get(key)
        .ok_or_else(|| ViveError::ConfigMissingField(key.to_string()))
}

fn vec3_from_array(value: &Value, key: &str) -> ViveResult<Vector3> {
    let arr = required_field(value, key)?
        .as_array()
        .ok_or_else(|| ViveError::ConfigMissingField(key.to_string()))?;
    if arr.len() != 3 {
        return Err(ViveError::ConfigMissingField(format!(
            "{key} did not have exactly 3 elements"
        )));
    }
    let component = |i: usize| -> ViveResult<f64> {
        arr[i]
            .as_f64()
            .ok_or_else(|| ViveError::ConfigMissingField(key.to_string()))
    };
    Ok(Vector3::new(component(0)?, component(1)?, component(2)?))
}

fn opt_string(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(str::to_owned)
}

fn opt_u32(value: &Value, key: &str) -> Option<u32> {
    value.get(key).and_then(|v| v.as_u64()).map(|n| n as u32)
}

fn opt_f64(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(|v| v.as_f64())
}

fn parse_firmware_info(root: &Value) -> FirmwareInfo {
    FirmwareInfo {
        firmware_version: opt_string(root, "firmware_version").unwrap_or_default(),
        hardware_revision: opt_string(root, "hardware_revision").unwrap_or_default(),
        hardware_version_major: opt_u32(root, "hardware_version_major").unwrap_or(0),
        hardware_version_minor: opt_u32(root, "hardware_version_minor").unwrap_or(0),
        hardware_version_micro: opt_u32(root, "hardware_version_micro").unwrap_or(0),
        mainboard_serial: opt_string(root, "mb_serial_number").unwrap_or_default(),
        model_number: opt_string(root, "model_number")
            .or_else(|| opt_string(root, "model_name"))
            .unwrap_or_default(),
        device_serial: opt_string(root, "device_serial_number").unwrap_or_default(),
    }
}

fn parse_channel_distortion(value: &Value, key: &str) -> ChannelDistortion {
    let mut out = ChannelDistortion::default();
    let Some(channel) = value.get(key) else {
        return out;
    };
    if let Some(x) = opt_f64(channel, "center_x") {
        out.center_x = x;
    }
    if let Some(y) = opt_f64(channel, "center_y") {
        out.center_y = y;
    }
    if let Some(coeffs) = channel.get("coeffs").and_then(|v| v.as_array()) {
        for (i, slot) in out.coeffs.iter_mut().enumerate() {
            *slot = coeffs.get(i).and_then(|v| v.as_f64()).unwrap_or(0.0);
        }
    }
    out
}

fn parse_eye_to_head_quaternion(value: &Value) -> Option<Quaternion> {
    let rows = value.get("eye_to_head")?.as_array()?;
    if rows.len() != 3 {
        return None;
    }
    let mut m = [[0.0f64; 3]; 3];
    for (r, row) in rows.iter().enumerate() {
        let row = row.as_array()?;
        if row.len() != 3 {
            return None;
        }
        for (c, cell) in row.iter().enumerate() {
            m[r][c] = cell.as_f64()?;
        }
    }
    Some(Quaternion::from_matrix(m))
}

fn parse_eye_entry(value: &Value, template: EyeDisplay) -> EyeDisplay {
    let mut eye = template;
    if let Some(q) = parse_eye_to_head_quaternion(value) {
        eye.rotation = q;
    }
    if let Some(grow) = opt_f64(value, "grow_for_undistort") {
        eye.distortion.grow_for_undistort = grow;
    }
    if let Some(cutoff) = opt_f64(value, "undistort_r2_cutoff") {
        eye.distortion.undistort_r2_cutoff = cutoff;
    }
    eye.distortion.red = parse_channel_distortion(value, "distortion_red");
    eye.distortion.green = parse_channel_distortion(value, "distortion");
    eye.distortion.blue = parse_channel_distortion(value, "distortion_blue");
    eye
}

fn parse_device_and_distortion_blocks(root: &Value, is_index: bool) -> DisplayCalibration {
    let mut display = DisplayCalibration::default();

    if let Some(device) = root.get("device") {
        if let Some(h) = opt_u32(device, "eye_target_height_in_pixels") {
            for eye in &mut display.eyes {
                eye.target_height_px = h;
            }
        }
        if let Some(w) = opt_u32(device, "eye_target_width_in_pixels") {
            for eye in &mut display.eyes {
                eye.target_width_px = w;
            }
        }
        if !is_index {
            if let Some(persistence) = opt_f64(device, "persistence") {
                display.persistence = persistence;
            }
            if let Some(aspect) = opt_f64(device, "physical_aspect_x_over_y") {
                for eye in &mut display.eyes {
                    eye.distortion.aspect_x_over_y = aspect;
                }
            }
        }
    }

    if let Some(array) = root
        .get("tracking_to_eye_transform")
        .and_then(|v| v.as_array())
    {
        for (i, eye_slot) in display.eyes.iter_mut().enumerate() {
            if let Some(entry) = array.get(i) {
                *eye_slot = parse_eye_entry(entry, *eye_slot);
            }
        }
    }

    if !is_index {
        if let Some(lens_separation) = opt_f64(root, "lens_separation") {
            display.lens_separation_m = lens_separation;
        }
    }

    display
}

/// Parse the Vive (original) HMD schema: top-level `acc_bias`, `acc_scale`,
/// `gyro_bias`, `gyro_scale`, top-level `lens_separation`.
fn parse_vive_imu(root: &Value) -> ViveResult<ImuCalibration> {
    let mut imu = ImuCalibration::default();
    imu.acc_bias = vec3_from_array(root, "acc_bias")?;
    imu.acc_scale = vec3_from_array(root, "acc_scale")?;
    imu.gyro_bias = vec3_from_array(root, "gyro_bias")?;
    imu.gyro_scale = vec3_from_array(root, "gyro_scale")?;
    Ok(imu)
}

/// Parse the Vive Pro schema: the same four IMU fields, nested under `imu`.
fn parse_vive_pro_imu(root: &Value) -> ViveResult<ImuCalibration> {
    let imu_block = required_field(root, "imu")?;
    let mut imu = ImuCalibration::default();
    imu.acc_bias = vec3_from_array(imu_block, "acc_bias")?;
    imu.acc_scale = vec3_from_array(imu_block, "acc_scale")?;
    imu.gyro_bias = vec3_from_array(imu_block, "gyro_bias")?;
    imu.gyro_scale = vec3_from_array(imu_block, "gyro_scale")?;
    Ok(imu)
}

fn parse_pose_block(value: &Value) -> ViveResult<Pose> {
    let plus_x = vec3_from_array(value, "plus_x")?;
    let plus_z = vec3_from_array(value, "plus_z")?;
    let position = vec3_from_array(value, "position")?;
    Ok(Pose::new(position, Quaternion::from_plus_x_plus_z(plus_x, plus_z)))
}

/// Parse the lighthouse sensor model (Index only): `channelMap`,
/// `modelNormals`, `modelPoints`, placed by channel and transformed into
/// IMU-reference space via `inverse(imu_in_tracking)`.
fn parse_lighthouse_config(root: &Value, imu_in_tracking: &Pose) -> LighthouseSensorModel {
    let Some(lh) = root.get("lighthouse_config") else {
        return LighthouseSensorModel::default();
    };
    let channel_map = lh.get("channelMap").and_then(|v| v.as_array());
    let model_points = lh.get("modelPoints").and_then(|v| v.as_array());
    let model_normals = lh.get("modelNormals").and_then(|v| v.as_array());

    let (Some(channel_map), Some(model_points), Some(model_normals)) =
        (channel_map, model_points, model_normals)
    else {
        return LighthouseSensorModel::default();
    };

    let n = channel_map.len();
    if model_points.len() != n || model_normals.len() != n {
        return LighthouseSensorModel::default();
    }

    let to_imu = imu_in_tracking.inverse();
    let mut points = vec![Vector3::zero(); n];
    let mut normals = vec![Vector3::zero(); n];

    for i in 0..n {
        let Some(channel) = channel_map[i].as_u64().map(|v| v as usize) else {
            continue;
        };
        if channel >= n {
            continue;
        }
        if let Some(p) = array3_to_vec3(&model_points[i]) {
            points[channel] = to_imu.orientation.rotate_vector(p) + to_imu.position;
        }
        if let Some(normal) = array3_to_vec3(&model_normals[i]) {
            normals[channel] = to_imu.orientation.rotate_vector(normal);
        }
    }

    LighthouseSensorModel { points, normals }
}

fn array3_to_vec3(value: &Value) -> Option<Vector3> {
    let arr = value.as_array()?;
    if arr.len() != 3 {
        return None;
    }
    Some(Vector3::new(
        arr[0].as_f64()?,
        arr[1].as_f64()?,
        arr[2].as_f64()?,
    ))
}

/// Parse a full HMD calibration for the given variant.
pub fn parse_hmd_calibration(json: &str, variant: HmdVariant) -> ViveResult<HmdCalibration> {
    let root = parse_json(json)?;
    let mut calibration = HmdCalibration::defaults(variant);
    calibration.firmware = parse_firmware_info(&root);

    match variant {
        HmdVariant::Vive => {
            calibration.imu = parse_vive_imu(&root)?;
            calibration.display = parse_device_and_distortion_blocks(&root, false);
        }
        HmdVariant::VivePro | HmdVariant::VivePro2 => {
            calibration.imu = parse_vive_pro_imu(&root)?;
            calibration.display = parse_device_and_distortion_blocks(&root, false);
        }
        HmdVariant::Index => {
            let head = required_field(&root, "head")?;
            let imu_block = required_field(&root, "imu")?;

            let head_pose = parse_pose_block(head)?;
            let imu_pose = parse_pose_block(imu_block)?;

            let mut imu = ImuCalibration::default();
            imu.acc_bias = vec3_from_array(imu_block, "acc_bias")?;
            imu.acc_scale = vec3_from_array(imu_block, "acc_scale")?;
            imu.gyro_bias = vec3_from_array(imu_block, "gyro_bias")?;
            imu.imu_in_tracking = imu_pose;
            calibration.imu = imu;

            calibration.display = parse_device_and_distortion_blocks(&root, true);
            calibration.display.head_in_tracking = head_pose;
            calibration.display.imu_in_head = head_pose.inverse().compose(&imu_pose);

            calibration.lighthouse_sensors = parse_lighthouse_config(&root, &imu_pose);
        }
    }

    Ok(calibration)
}

/// Determine the controller variant from the config JSON's `model_number`
/// (falling back to `model_name`) and parse the remaining IMU/firmware
/// fields. The spec does not name a distinct controller JSON schema beyond
/// "same firmware/IMU shape [as the HMD]"; both the top-level and
/// `imu`-nested layouts are accepted, matching how the HMD schema splits
/// across Vive vs Vive Pro.
pub fn parse_controller_calibration(
    json: &str,
) -> ViveResult<(ControllerVariant, crate::hardware::calibration::ControllerCalibration)> {
    let root = parse_json(json)?;
    let model = opt_string(&root, "model_number")
        .or_else(|| opt_string(&root, "model_name"))
        .ok_or_else(|| ViveError::ConfigMissingField("model_number".to_string()))?;
    let variant = ControllerVariant::from_model_string(&model);
    if variant == ControllerVariant::Unknown {
        return Err(ViveError::ConfigBadVariant(model));
    }

    let mut calibration = crate::hardware::calibration::ControllerCalibration::defaults(variant);
    calibration.firmware = parse_firmware_info(&root);

    let imu_source = if root.get("acc_bias").is_some() {
        &root
    } else {
        root.get("imu").unwrap_or(&root)
    };

    if let Ok(bias) = vec3_from_array(imu_source, "acc_bias") {
        calibration.imu.acc_bias = bias;
    }
    if let Ok(scale) = vec3_from_array(imu_source, "acc_scale") {
        calibration.imu.acc_scale = scale;
    }
    if let Ok(bias) = vec3_from_array(imu_source, "gyro_bias") {
        calibration.imu.gyro_bias = bias;
    }
    if let Ok(scale) = vec3_from_array(imu_source, "gyro_scale") {
        calibration.imu.gyro_scale = scale;
    }

    Ok((variant, calibration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vive_top_level_imu_fields() {
        let json = r#"{
            "acc_bias": [0.1, 0.2, 0.3],
            "acc_scale": [1.0, 1.0, 1.0],
            "gyro_bias": [0.0, 0.0, 0.0],
            "gyro_scale": [1.0, 1.0, 1.0],
            "lens_separation": 0.063
        }"#;
        let cal = parse_hmd_calibration(json, HmdVariant::Vive).unwrap();
        assert_eq!(cal.imu.acc_bias, Vector3::new(0.1, 0.2, 0.3));
        assert_eq!(cal.display.lens_separation_m, 0.063);
    }

    #[test]
    fn vive_missing_required_field_is_an_error() {
        let json = r#"{"acc_bias": [0.0, 0.0, 0.0]}"#;
        let err = parse_hmd_calibration(json, HmdVariant::Vive).unwrap_err();
        assert!(matches!(err, ViveError::ConfigMissingField(_)));
    }

    #[test]
    fn parses_vive_pro_nested_imu_fields() {
        let json = r#"{
            "imu": {
                "acc_bias": [0.0, 0.0, 0.0],
                "acc_scale": [1.0, 1.0, 1.0],
                "gyro_bias": [0.0, 0.0, 0.0],
                "gyro_scale": [1.0, 1.0, 1.0]
            }
        }"#;
        let cal = parse_hmd_calibration(json, HmdVariant::VivePro).unwrap();
        assert_eq!(cal.imu.acc_scale, Vector3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn parses_index_head_and_imu_blocks() {
        let json = r#"{
            "head": {
                "plus_x": [1.0, 0.0, 0.0],
                "plus_z": [0.0, 0.0, 1.0],
                "position": [0.0, 0.0, 0.0]
            },
            "imu": {
                "plus_x": [1.0, 0.0, 0.0],
                "plus_z": [0.0, 0.0, 1.0],
                "position": [0.0, 0.01, 0.02],
                "acc_bias": [0.0, 0.0, 0.0],
                "acc_scale": [1.0, 1.0, 1.0],
                "gyro_bias": [0.0, 0.0, 0.0]
            }
        }"#;
        let cal = parse_hmd_calibration(json, HmdVariant::Index).unwrap();
        assert_eq!(cal.display.imu_in_head.position, Vector3::new(0.0, 0.01, 0.02));
    }

    #[test]
    fn controller_variant_is_read_from_model_number() {
        let json = r#"{"model_number": "Knuckles Left"}"#;
        let (variant, _cal) = parse_controller_calibration(json).unwrap();
        assert_eq!(variant, ControllerVariant::IndexLeft);
    }

    #[test]
    fn controller_bad_variant_string_is_an_error() {
        let json = r#"{"model_number": "???"}"#;
        let err = parse_controller_calibration(json).unwrap_err();
        assert!(matches!(err, ViveError::ConfigBadVariant(_)));
    }

    #[test]
    fn compute_distortion_with_zero_coeffs_returns_input_at_center() {
        let eye = EyeDisplay::default();
        assert_eq!(eye.distortion.red.center_x, 0.5);
        assert_eq!(eye.distortion.red.center_y, 0.5);
        assert_eq!(eye.distortion.red.coeffs, [0.0; 4]);
    }
}
