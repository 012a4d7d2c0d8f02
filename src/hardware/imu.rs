//! IMU sample decode, slot reassembly, and 3-DoF orientation fusion (C4,
//! spec §4.4).

use log::warn;

use crate::error::{ViveError, ViveResult};
use crate::hardware::calibration::ImuCalibration;
use crate::hardware::variant::AxisRemap;
use crate::math::{Quaternion, Vector3};

/// HMD IMU report: report id + 3 round-robin samples, 52 bytes total.
pub const HMD_IMU_REPORT_LEN: usize = 52;
const SAMPLE_LEN: usize = 17;

/// Accumulator tick rate (spec §4.4).
const TICK_HZ: f64 = 48_000_000.0;

/// Gravity-assisted correction window (spec §4.4).
const FUSION_WINDOW_NS: u64 = 20_000_000;

#[derive(Debug, Clone, Copy)]
pub struct RawImuSample {
    pub acc: [i16; 3],
    pub gyro: [i16; 3],
    pub ticks: u32,
    pub seq: u8,
}

fn read_i16_le(buf: &[u8]) -> i16 {
    i16::from_le_bytes([buf[0], buf[1]])
}

fn read_u32_le(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}

fn decode_sample(buf: &[u8]) -> RawImuSample {
    RawImuSample {
        acc: [
            read_i16_le(&buf[0..2]),
            read_i16_le(&buf[2..4]),
            read_i16_le(&buf[4..6]),
        ],
        gyro: [
            read_i16_le(&buf[6..8]),
            read_i16_le(&buf[8..10]),
            read_i16_le(&buf[10..12]),
        ],
        ticks: read_u32_le(&buf[12..16]),
        seq: buf[16],
    }
}

/// Decode the three round-robin samples out of an HMD IMU report, skipping
/// the leading report-id byte.
pub fn decode_hmd_imu_report(buf: &[u8]) -> ViveResult<[RawImuSample; 3]> {
    if buf.len() != HMD_IMU_REPORT_LEN {
        return Err(ViveError::BadReportSize {
            expected: HMD_IMU_REPORT_LEN,
            actual: buf.len(),
        });
    }
    let body = &buf[1..];
    Ok([
        decode_sample(&body[0..SAMPLE_LEN]),
        decode_sample(&body[SAMPLE_LEN..2 * SAMPLE_LEN]),
        decode_sample(&body[2 * SAMPLE_LEN..3 * SAMPLE_LEN]),
    ])
}

/// Recover a positive tick delta across a 32-bit wraparound (spec §4.4).
fn dt_ticks(sample_ticks: u32, last_ticks: u32) -> u64 {
    let raw = sample_ticks as i64 - last_ticks as i64;
    let dt = if raw < 0 { raw + (1i64 << 32) } else { raw };
    dt as u64
}

fn ticks_to_ns(ticks: u64) -> u64 {
    ((ticks as f64 / TICK_HZ) * 1_000_000_000.0).round() as u64
}

fn convert_sample(raw: [i16; 3], range: f64, scale: Vector3, bias: Vector3) -> Vector3 {
    let s = range / 32768.0;
    Vector3::new(
        s * scale.x * raw[0] as f64 - bias.x,
        s * scale.y * raw[1] as f64 - bias.y,
        s * scale.z * raw[2] as f64 - bias.z,
    )
}

/// Decide oldest-to-newest processing order for the 3 samples in a report.
///
/// The oldest unprocessed sample is the one whose sequence number is
/// closest (by forward circular distance) to the sequence we expect next
/// (`last_processed + 1`, or the first sample's own sequence on the very
/// first report). This is the same selection the spec's "oldest slot"
/// rule names, expressed without needing a separately tracked
/// next-slot-sequence counter.
fn oldest_first_order(samples: &[RawImuSample; 3], last_processed: Option<u8>) -> [usize; 3] {
    let anchor = last_processed
        .map(|s| s.wrapping_add(1))
        .unwrap_or_else(|| samples.iter().map(|s| s.seq).min().unwrap());
    let mut order = [0usize, 1, 2];
    order.sort_by_key(|&i| samples[i].seq.wrapping_sub(anchor));
    order
}

/// A simple complementary filter: integrates gyro for orientation, with a
/// gravity-assisted correction blended in over `FUSION_WINDOW_NS`.
#[derive(Debug, Clone)]
pub struct Fusion {
    orientation: Quaternion,
}

impl Default for Fusion {
    fn default() -> Self {
        Self {
            orientation: Quaternion::identity(),
        }
    }
}

impl Fusion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orientation(&self) -> Quaternion {
        self.orientation
    }

    /// Standard gravity magnitude, used to gate the correction to
    /// near-static periods.
    const GRAVITY_MPS2: f64 = 9.80665;
    const GRAVITY_TOLERANCE: f64 = 1.0;

    pub fn update(&mut self, dt_ns: u64, acc: Vector3, gyro: Vector3) -> Quaternion {
        let dt = dt_ns as f64 * 1e-9;

        let angle = gyro.magnitude() * dt;
        if angle > 1e-12 {
            let delta = Quaternion::from_axis_angle(gyro, angle);
            self.orientation = self.orientation.mul(&delta).normalize();
        }

        let acc_mag = acc.magnitude();
        if (acc_mag - Self::GRAVITY_MPS2).abs() < Self::GRAVITY_TOLERANCE && acc_mag > 0.0 {
            let world_up = Vector3::new(0.0, 1.0, 0.0);
            let predicted_up = self.orientation.rotate_vector(acc.normalize());
            let axis = predicted_up.cross(&world_up);
            if axis.magnitude() > 1e-9 {
                let gain = (dt_ns as f64 / FUSION_WINDOW_NS as f64).min(1.0);
                let correction = Quaternion::from_axis_angle(axis, axis.magnitude().asin() * gain);
                self.orientation = correction.mul(&self.orientation).normalize();
            }
        }

        self.orientation
    }
}

/// Accumulates HMD IMU reports into a running world-from-device orientation
/// and monotonic device-clock time.
pub struct ImuIntegrator {
    calibration: ImuCalibration,
    remap: AxisRemap,
    fusion: Fusion,
    time_ns: u64,
    last_ticks: Option<u32>,
    last_processed_seq: Option<u8>,
}

/// One decoded, calibrated, remapped IMU sample ready for a pose consumer.
#[derive(Debug, Clone, Copy)]
pub struct FusedSample {
    pub time_ns: u64,
    pub orientation: Quaternion,
}

impl ImuIntegrator {
    pub fn new(calibration: ImuCalibration, remap: AxisRemap) -> Self {
        Self {
            calibration,
            remap,
            fusion: Fusion::new(),
            time_ns: 0,
            last_ticks: None,
            last_processed_seq: None,
        }
    }

    fn already_seen(&self, seq: u8) -> bool {
        match self.last_processed_seq {
            None => false,
            Some(last) => {
                seq == last || seq == last.wrapping_sub(1) || seq == last.wrapping_sub(2)
            }
        }
    }

    /// Ingest a single raw sample (shared by the HMD round-robin reader and
    /// the watchman decoder's one-sample-per-event stream). Returns `None`
    /// if the sample was already processed.
    pub fn ingest_single(&mut self, sample: RawImuSample) -> Option<FusedSample> {
        if self.already_seen(sample.seq) {
            return None;
        }

        let dt = match self.last_ticks {
            Some(last) => dt_ticks(sample.ticks, last),
            None => 0,
        };
        self.last_ticks = Some(sample.ticks);
        let dt_ns = ticks_to_ns(dt);
        self.time_ns += dt_ns;

        let acc = self.remap.apply(convert_sample(
            sample.acc,
            self.calibration.acc_range,
            self.calibration.acc_scale,
            self.calibration.acc_bias,
        ));
        let gyro = self.remap.apply(convert_sample(
            sample.gyro,
            self.calibration.gyro_range,
            self.calibration.gyro_scale,
            self.calibration.gyro_bias,
        ));

        let orientation = self.fusion.update(dt_ns, acc, gyro);
        self.last_processed_seq = Some(sample.seq);
        Some(FusedSample {
            time_ns: self.time_ns,
            orientation,
        })
    }

    /// Ingest one 52-byte HMD IMU report, returning the newly fused samples
    /// in chronological order.
    pub fn ingest_hmd_report(&mut self, buf: &[u8]) -> ViveResult<Vec<FusedSample>> {
        let raw_samples = decode_hmd_imu_report(buf)?;
        let order = oldest_first_order(&raw_samples, self.last_processed_seq);

        let mut out = Vec::with_capacity(3);
        for idx in order {
            if let Some(fused) = self.ingest_single(raw_samples[idx]) {
                out.push(fused);
            }
        }
        Ok(out)
    }

    pub fn time_ns(&self) -> u64 {
        self.time_ns
    }
}

/// Vive-family IMU range auto-detection (spec §4.4). Indices above 4 are
/// invalid; callers should keep the default calibration range in that case.
pub fn gyro_range_from_index(idx: u8) -> Option<f64> {
    if idx > 4 {
        warn!("IMU gyro range index {idx} out of range, keeping default");
        return None;
    }
    Some(std::f64::consts::PI / 180.0 * ((250u32) << idx) as f64)
}

pub fn acc_range_from_index(idx: u8) -> Option<f64> {
    if idx > 4 {
        warn!("IMU acc range index {idx} out of range, keeping default");
        return None;
    }
    Some(Fusion::GRAVITY_MPS2 * ((2u32) << idx) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::variant::HmdVariant;

    fn encode_sample(acc: [i16; 3], gyro: [i16; 3], ticks: u32, seq: u8) -> Vec<u8> {
        let mut out = Vec::with_capacity(SAMPLE_LEN);
        for v in acc {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in gyro {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&ticks.to_le_bytes());
        out.push(seq);
        out
    }

    fn encode_report(samples: [([i16; 3], [i16; 3], u32, u8); 3]) -> Vec<u8> {
        let mut out = vec![0u8]; // report id
        for (acc, gyro, ticks, seq) in samples {
            out.extend(encode_sample(acc, gyro, ticks, seq));
        }
        out
    }

    #[test]
    fn decodes_three_samples_from_a_52_byte_report() {
        let report = encode_report([
            ([1, 2, 3], [4, 5, 6], 1000, 10),
            ([7, 8, 9], [10, 11, 12], 2000, 11),
            ([13, 14, 15], [16, 17, 18], 3000, 12),
        ]);
        assert_eq!(report.len(), HMD_IMU_REPORT_LEN);
        let samples = decode_hmd_imu_report(&report).unwrap();
        assert_eq!(samples[0].seq, 10);
        assert_eq!(samples[1].ticks, 2000);
        assert_eq!(samples[2].acc, [13, 14, 15]);
    }

    #[test]
    fn wrong_size_report_is_rejected() {
        let err = decode_hmd_imu_report(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, ViveError::BadReportSize { .. }));
    }

    #[test]
    fn tick_wraparound_recovers_a_positive_delta() {
        let dt = dt_ticks(100, u32::MAX - 10);
        assert_eq!(dt, 111);
    }

    #[test]
    fn oldest_first_order_skips_already_seen_samples() {
        let mut integrator =
            ImuIntegrator::new(ImuCalibration::default(), HmdVariant::Vive.axis_remap());

        let report1 = encode_report([
            ([0, 0, 0], [0, 0, 0], 48_000, 0),
            ([0, 0, 0], [0, 0, 0], 96_000, 1),
            ([0, 0, 0], [0, 0, 0], 144_000, 2),
        ]);
        let fused1 = integrator.ingest_hmd_report(&report1).unwrap();
        assert_eq!(fused1.len(), 3);

        // Re-deliver the same report (as hardware might if polled twice);
        // all three samples must be skipped as already seen.
        let fused2 = integrator.ingest_hmd_report(&report1).unwrap();
        assert!(fused2.is_empty());
    }

    #[test]
    fn invalid_range_index_falls_back_to_default() {
        assert_eq!(gyro_range_from_index(5), None);
        assert_eq!(acc_range_from_index(10), None);
        assert!(gyro_range_from_index(0).is_some());
    }

    #[test]
    fn fusion_integrates_pure_gyro_rotation() {
        let mut fusion = Fusion::new();
        // No gravity-like acceleration, pure angular rate about z for 1s.
        let orientation = fusion.update(
            1_000_000_000,
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2),
        );
        assert!((orientation.magnitude() - 1.0).abs() < 1e-9);
    }
}
