//! USB vendor/product identifiers used to probe for lighthouse-family
//! devices (spec §6.1).

/// (vendor_id, product_id) pair plus a human label, for device probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbId {
    pub vendor_id: u16,
    pub product_id: u16,
    pub label: &'static str,
}

pub const VIVE_MAINBOARD: UsbId = UsbId {
    vendor_id: 0x0BB4,
    product_id: 0x2C87,
    label: "Vive HMD mainboard",
};

pub const VIVE_LIGHTHOUSE_SENSORS: UsbId = UsbId {
    vendor_id: 0x28DE,
    product_id: 0x2000,
    label: "Vive lighthouse FPGA sensors endpoint",
};

pub const VIVE_PRO_MAINBOARD: UsbId = UsbId {
    vendor_id: 0x0BB4,
    product_id: 0x0309,
    label: "Vive Pro mainboard",
};

pub const VIVE_PRO_OR_INDEX_LHR: UsbId = UsbId {
    vendor_id: 0x28DE,
    product_id: 0x2300,
    label: "Vive Pro / Index LHR endpoint",
};

pub const WATCHMAN_DONGLE_GEN1: UsbId = UsbId {
    vendor_id: 0x28DE,
    product_id: 0x2101,
    label: "Watchman dongle (gen 1)",
};

pub const WATCHMAN_DONGLE_GEN2: UsbId = UsbId {
    vendor_id: 0x28DE,
    product_id: 0x2102,
    label: "Watchman dongle (gen 2)",
};

/// All known HMD-family identifiers, for an initial USB scan pass.
pub const HMD_CANDIDATES: &[UsbId] = &[
    VIVE_MAINBOARD,
    VIVE_LIGHTHOUSE_SENSORS,
    VIVE_PRO_MAINBOARD,
    VIVE_PRO_OR_INDEX_LHR,
];

/// All known watchman dongle identifiers.
pub const WATCHMAN_CANDIDATES: &[UsbId] = &[WATCHMAN_DONGLE_GEN1, WATCHMAN_DONGLE_GEN2];
