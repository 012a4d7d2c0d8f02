//! Device variant dispatch (spec §3, design note "Variant dispatch").
//!
//! Models each device variant as a tagged sum with per-arm constants (axis
//! remap permutation + sign vector) instead of the source's `switch`
//! cascades, per the spec's redesign note.

use crate::math::Vector3;

/// HMD device variant. Decided from USB product id, disambiguated by
/// manufacturer/product string where the product id is shared between
/// Vive Pro / Vive Pro 2 / Index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HmdVariant {
    Vive,
    VivePro,
    /// Treated identically to `VivePro` per spec §9 open question — the
    /// source only distinguishes them by string match.
    VivePro2,
    Index,
}

impl HmdVariant {
    /// Decide the HMD variant from (vendor_id, product_id) plus the
    /// manufacturer/product strings read from the USB descriptor, which are
    /// needed to disambiguate Pro vs Pro 2 vs Index sharing product id
    /// 0x2300 (spec §6.1).
    pub fn from_usb(product_id: u16, product_string: &str) -> Option<Self> {
        match product_id {
            0x2C87 => Some(HmdVariant::Vive),
            0x0309 => Some(HmdVariant::VivePro),
            0x2300 => {
                let lower = product_string.to_ascii_lowercase();
                if lower.contains("index") {
                    Some(HmdVariant::Index)
                } else if lower.contains("pro 2") || lower.contains("pro2") {
                    Some(HmdVariant::VivePro2)
                } else {
                    Some(HmdVariant::VivePro)
                }
            }
            _ => None,
        }
    }

    pub fn axis_remap(&self) -> AxisRemap {
        match self {
            HmdVariant::Vive => AxisRemap::new([0, 1, 2], [1.0, -1.0, -1.0]),
            HmdVariant::VivePro | HmdVariant::VivePro2 => {
                AxisRemap::new([0, 1, 2], [-1.0, 1.0, -1.0])
            }
            HmdVariant::Index => AxisRemap::new([1, 0, 2], [-1.0, -1.0, -1.0]),
        }
    }

    /// Index has a real display-transform/imu-reference frame derived from
    /// JSON; all other variants use the identity (spec §3 invariant).
    pub fn has_derived_reference_frames(&self) -> bool {
        matches!(self, HmdVariant::Index)
    }
}

/// Hand-held unit variant, decided from the factory JSON's `model_number`
/// (or `model_name` fallback) string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerVariant {
    ViveWand,
    IndexLeft,
    IndexRight,
    TrackerGen1,
    TrackerGen2,
    Unknown,
}

impl ControllerVariant {
    pub fn from_model_string(model: &str) -> Self {
        match model {
            "Vive. Controller MV" => ControllerVariant::ViveWand,
            "Knuckles Right" => ControllerVariant::IndexRight,
            "Knuckles Left" => ControllerVariant::IndexLeft,
            "Vive Tracker PVT" => ControllerVariant::TrackerGen1,
            "VIVE Tracker Pro MV" => ControllerVariant::TrackerGen2,
            _ => ControllerVariant::Unknown,
        }
    }

    pub fn is_index_knuckles(&self) -> bool {
        matches!(self, ControllerVariant::IndexLeft | ControllerVariant::IndexRight)
    }

    pub fn is_tracker(&self) -> bool {
        matches!(
            self,
            ControllerVariant::TrackerGen1 | ControllerVariant::TrackerGen2
        )
    }

    /// Axis remap for controllers that have a watchman IMU sample (spec
    /// §4.7); trackers reuse the Vive Wand remap as the closest physical
    /// mounting, since the spec does not name a distinct tracker remap.
    pub fn axis_remap(&self) -> AxisRemap {
        match self {
            ControllerVariant::ViveWand
            | ControllerVariant::TrackerGen1
            | ControllerVariant::TrackerGen2
            | ControllerVariant::Unknown => AxisRemap::new([0, 2, 1], [-1.0, -1.0, -1.0]),
            ControllerVariant::IndexRight => AxisRemap::new([2, 1, 0], [1.0, -1.0, 1.0]),
            ControllerVariant::IndexLeft => AxisRemap::new([2, 0, 1], [-1.0, 1.0, -1.0]),
        }
    }
}

/// A per-variant axis permutation + sign vector applied component-wise to a
/// raw (acc, gyro) sample: `output[i] = raw[indices[i]] * signs[i]`.
#[derive(Debug, Clone, Copy)]
pub struct AxisRemap {
    indices: [usize; 3],
    signs: [f64; 3],
}

impl AxisRemap {
    pub const fn new(indices: [usize; 3], signs: [f64; 3]) -> Self {
        Self { indices, signs }
    }

    pub fn apply(&self, raw: Vector3) -> Vector3 {
        let components = [raw.x, raw.y, raw.z];
        Vector3::new(
            components[self.indices[0]] * self.signs[0],
            components[self.indices[1]] * self.signs[1],
            components[self.indices[2]] * self.signs[2],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vive_remap_negates_y_and_z() {
        let remap = HmdVariant::Vive.axis_remap();
        let out = remap.apply(Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(out, Vector3::new(1.0, -2.0, -3.0));
    }

    #[test]
    fn index_remap_swaps_then_negates() {
        let remap = HmdVariant::Index.axis_remap();
        let out = remap.apply(Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(out, Vector3::new(-2.0, -1.0, -3.0));
    }

    #[test]
    fn identical_raw_bytes_differ_only_by_remap() {
        let raw = Vector3::new(10.0, -5.0, 2.0);
        let vive = HmdVariant::Vive.axis_remap().apply(raw);
        let pro = HmdVariant::VivePro.axis_remap().apply(raw);
        assert_ne!(vive, pro);
        assert_eq!(vive.x.abs(), pro.x.abs());
    }

    #[test]
    fn controller_model_string_table_is_exact_match() {
        assert_eq!(
            ControllerVariant::from_model_string("Vive. Controller MV"),
            ControllerVariant::ViveWand
        );
        assert_eq!(
            ControllerVariant::from_model_string("Knuckles Right"),
            ControllerVariant::IndexRight
        );
        assert_eq!(
            ControllerVariant::from_model_string("nonsense"),
            ControllerVariant::Unknown
        );
    }
}
