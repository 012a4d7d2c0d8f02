//! Device-driver and tracking subsystem for lighthouse-family HMDs and
//! controllers/trackers: HID transport, factory calibration, IMU fusion,
//! mainboard/lighthouse/watchman wire decoders, device state machines,
//! relation history, and the tracking-override composer (C1-C10).

pub mod calibration;
pub mod config_blob;
pub mod config_parser;
pub mod controller;
pub mod device;
pub mod hid;
pub mod history;
pub mod hmd;
pub mod imu;
pub mod lighthouse;
pub mod mainboard;
pub mod manager;
pub mod tracking_override;
pub mod usb_ids;
pub mod variant;
pub mod watchman;

pub use controller::ControllerDevice;
pub use device::{Device, DeviceLifecycle, DistortedUv, HandJointSet, HapticCommand};
pub use hmd::HmdDevice;
pub use manager::HardwareManager;
pub use tracking_override::{OverrideMode, TrackingOverride};
