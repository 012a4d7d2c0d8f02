//! HMD mainboard status report decoder and power control (C5, spec §4.5).

use log::warn;

use crate::error::{ViveError, ViveResult};
use crate::hardware::hid::HidTransport;

pub const STATUS_REPORT_LEN: usize = 64;
const STATUS_MAGIC: u16 = 0x2CD0;
const STATUS_LEN_FIELD: u8 = 60;

/// Fixed feature report sent once at device open.
const POWER_ON_REPORT: [u8; 2] = [0x04, 0x01];
/// Fixed feature report sent once at device close.
const POWER_OFF_REPORT: [u8; 2] = [0x04, 0x00];

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MainboardStatus {
    /// Interpupillary distance, in millimeters (wire unit is centi-mm).
    pub ipd_mm: f64,
    /// Lens separation, in millimeters.
    pub lens_separation_mm: f64,
    pub face_proximity: u16,
    pub button: u8,
}

fn read_u16_le(buf: &[u8]) -> u16 {
    u16::from_le_bytes([buf[0], buf[1]])
}

/// Decode a 64-byte mainboard status report. Integrity check failures are
/// logged, not fatal (spec §4.5).
pub fn decode_status_report(buf: &[u8]) -> ViveResult<MainboardStatus> {
    if buf.len() != STATUS_REPORT_LEN {
        return Err(ViveError::BadReportSize {
            expected: STATUS_REPORT_LEN,
            actual: buf.len(),
        });
    }

    let magic = read_u16_le(&buf[0..2]);
    if magic != STATUS_MAGIC {
        warn!("mainboard status magic mismatch: expected 0x{STATUS_MAGIC:04X}, got 0x{magic:04X}");
    }

    let len_field = buf[2];
    if len_field != STATUS_LEN_FIELD {
        warn!("mainboard status len field was {len_field}, expected {STATUS_LEN_FIELD}");
    }

    let ipd_centimm = read_u16_le(&buf[3..5]);
    let lens_separation_centimm = read_u16_le(&buf[5..7]);
    let face_proximity = read_u16_le(&buf[7..9]);
    let button = buf[9];

    if buf[10..STATUS_REPORT_LEN].iter().any(|&b| b != 0) {
        warn!("mainboard status reserved bytes were not all zero");
    }

    Ok(MainboardStatus {
        ipd_mm: ipd_centimm as f64 / 10.0,
        lens_separation_mm: lens_separation_centimm as f64 / 10.0,
        face_proximity,
        button,
    })
}

pub fn power_on(transport: &dyn HidTransport) -> ViveResult<()> {
    transport.set_feature_report(&POWER_ON_REPORT)
}

pub fn power_off(transport: &dyn HidTransport) -> ViveResult<()> {
    transport.set_feature_report(&POWER_OFF_REPORT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> [u8; STATUS_REPORT_LEN] {
        let mut buf = [0u8; STATUS_REPORT_LEN];
        buf[0..2].copy_from_slice(&STATUS_MAGIC.to_le_bytes());
        buf[2] = STATUS_LEN_FIELD;
        buf[3..5].copy_from_slice(&620u16.to_le_bytes()); // 62.0mm IPD
        buf[5..7].copy_from_slice(&630u16.to_le_bytes());
        buf[7..9].copy_from_slice(&1500u16.to_le_bytes());
        buf[9] = 0x01;
        buf
    }

    #[test]
    fn decodes_ipd_and_lens_separation_as_millimeters() {
        let status = decode_status_report(&sample_report()).unwrap();
        assert_eq!(status.ipd_mm, 62.0);
        assert_eq!(status.lens_separation_mm, 63.0);
        assert_eq!(status.face_proximity, 1500);
        assert_eq!(status.button, 0x01);
    }

    #[test]
    fn bad_magic_warns_but_still_decodes() {
        let mut buf = sample_report();
        buf[0] = 0xFF;
        let status = decode_status_report(&buf).unwrap();
        assert_eq!(status.button, 0x01);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let err = decode_status_report(&[0u8; 32]).unwrap_err();
        assert!(matches!(err, ViveError::BadReportSize { .. }));
    }

    #[test]
    fn power_on_and_off_send_distinct_feature_reports() {
        use crate::hardware::hid::MockHidTransport;
        let transport = MockHidTransport::new();
        power_on(&transport).unwrap();
        power_off(&transport).unwrap();
        let sent = transport.sent_feature_reports();
        assert_eq!(sent[0], POWER_ON_REPORT);
        assert_eq!(sent[1], POWER_OFF_REPORT);
    }
}
