//! Lighthouse-family HMD/controller device-driver and tracking runtime.
//!
//! Owns the HID reader threads, IMU fusion, and relation history for one HMD
//! plus any number of controllers/trackers, and exposes pose queries through
//! an optional tracking-override layer. `VIVE_LOG` controls log verbosity
//! (read by `env_logger`, not the default `RUST_LOG`).

pub mod error;
pub mod hardware;
pub mod math;

pub use error::{ViveError, ViveResult};
pub use hardware::{Device, HardwareManager};

use std::sync::Arc;

use anyhow::{Context, Result};

use hardware::calibration::HmdCalibration;
use hardware::hid::HidTransport;
use hardware::variant::HmdVariant;

/// Top-level runtime: the hardware manager plus whatever process-wide setup
/// (logging) a standalone binary needs before touching it.
pub struct LighthouseRuntime {
    hardware: HardwareManager,
}

impl LighthouseRuntime {
    /// Install the `env_logger` logger reading the `VIVE_LOG` filter
    /// variable (spec §6.4), then open the HMD from an already-parsed
    /// calibration plus whichever reader-thread transports are available.
    pub fn start(
        calibration: HmdCalibration,
        mainboard: Option<Arc<dyn HidTransport>>,
        sensors: Option<Arc<dyn HidTransport>>,
        photodiodes: Option<Arc<dyn HidTransport>>,
    ) -> Result<Self> {
        init_logging();
        let hmd = HardwareManager::open_hmd_with_calibration(calibration, mainboard, sensors, photodiodes)
            .context("starting lighthouse runtime")?;
        Ok(Self {
            hardware: HardwareManager::from_hmd(hmd),
        })
    }

    pub fn hardware(&self) -> &HardwareManager {
        &self.hardware
    }

    pub fn shutdown(&self) -> Result<()> {
        self.hardware.shutdown()
    }
}

fn init_logging() {
    use std::sync::Once;

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().filter_or("VIVE_LOG", "info"))
            .try_init()
            .ok();
    });
}

/// Default HMD variant assumed when nothing else narrows it down; matches
/// the original Vive's USB ids being first in `usb_ids::HMD_CANDIDATES`.
pub const DEFAULT_HMD_VARIANT: HmdVariant = HmdVariant::Vive;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_starts_with_no_transports_and_shuts_down() {
        let runtime =
            LighthouseRuntime::start(HmdCalibration::defaults(DEFAULT_HMD_VARIANT), None, None, None)
                .unwrap();
        assert!(runtime.hardware().get("hmd").is_some());
        runtime.shutdown().unwrap();
    }
}
