//! Hardware manager: wires C1-C10 together into a runtime registry of open
//! devices (spec §2's data-flow, C1 feeding C2/C3 at open time, C8 feeding
//! C9, pose queries flowing C8 -> C9 -> optionally C10 -> caller).
//!
//! Mirrors the shape of the teacher's `HardwareManager`: a registry behind a
//! lock, `anyhow::Result` at this outer wiring seam, `Result<_, ViveError>`
//! inside the devices it holds.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use log::info;

use crate::hardware::calibration::{ControllerCalibration, HmdCalibration};
use crate::hardware::config_blob::read_config_blob;
use crate::hardware::config_parser::{parse_controller_calibration, parse_hmd_calibration};
use crate::hardware::controller::ControllerDevice;
use crate::hardware::device::Device;
use crate::hardware::hid::HidTransport;
use crate::hardware::hmd::HmdDevice;
use crate::hardware::tracking_override::TrackingOverride;
use crate::hardware::variant::HmdVariant;

/// Registry of every device currently open, keyed by the id callers use to
/// address it. The HMD is tracked separately since its presence is
/// mandatory (spec §7's `NoHmd`) while controllers come and go.
pub struct HardwareManager {
    hmd: Arc<HmdDevice>,
    others: Mutex<HashMap<String, Arc<dyn Device>>>,
}

impl HardwareManager {
    /// Read the HMD's factory config blob over `config_transport`, parse it
    /// for `variant`, and open the HMD with whichever reader-thread
    /// transports the caller has available. Fails with `NoHmd` only via the
    /// caller failing to supply a config transport at all is not
    /// representable here; blob/parse failures surface as their own
    /// `ViveError` variants instead.
    pub fn open(
        variant: HmdVariant,
        config_transport: &dyn HidTransport,
        mainboard: Option<Arc<dyn HidTransport>>,
        sensors: Option<Arc<dyn HidTransport>>,
        photodiodes: Option<Arc<dyn HidTransport>>,
    ) -> Result<Self> {
        let json = read_config_blob(config_transport).context("reading HMD config blob")?;
        let calibration = parse_hmd_calibration(&json, variant).context("parsing HMD calibration")?;
        let hmd = Self::open_hmd_with_calibration(calibration, mainboard, sensors, photodiodes)?;
        Ok(Self {
            hmd,
            others: Mutex::new(HashMap::new()),
        })
    }

    /// Open the HMD directly from an already-parsed calibration, skipping
    /// the config-blob round trip. Used by callers (and tests) that already
    /// have a calibration in hand.
    pub fn open_hmd_with_calibration(
        calibration: HmdCalibration,
        mainboard: Option<Arc<dyn HidTransport>>,
        sensors: Option<Arc<dyn HidTransport>>,
        photodiodes: Option<Arc<dyn HidTransport>>,
    ) -> Result<Arc<HmdDevice>> {
        let hmd = HmdDevice::open(calibration, mainboard, sensors, photodiodes)
            .context("opening HMD device")?;
        info!("HMD device opened");
        Ok(hmd)
    }

    /// Wrap an already-open HMD handle in a fresh, empty registry.
    pub fn from_hmd(hmd: Arc<HmdDevice>) -> Self {
        Self {
            hmd,
            others: Mutex::new(HashMap::new()),
        }
    }

    pub fn hmd(&self) -> Arc<HmdDevice> {
        self.hmd.clone()
    }

    /// Read a controller/tracker's config blob over its dongle, determine
    /// its variant from the JSON, open it, and register it under `id`.
    pub fn add_controller(
        &self,
        id: impl Into<String>,
        config_transport: &dyn HidTransport,
        dongle: Option<Arc<dyn HidTransport>>,
    ) -> Result<Arc<ControllerDevice>> {
        let json = read_config_blob(config_transport).context("reading controller config blob")?;
        let (_variant, calibration) =
            parse_controller_calibration(&json).context("parsing controller calibration")?;
        self.add_controller_with_calibration(id, calibration, dongle)
    }

    pub fn add_controller_with_calibration(
        &self,
        id: impl Into<String>,
        calibration: ControllerCalibration,
        dongle: Option<Arc<dyn HidTransport>>,
    ) -> Result<Arc<ControllerDevice>> {
        let id = id.into();
        let controller = ControllerDevice::open(calibration, dongle).context("opening controller device")?;
        info!("controller device '{id}' opened");
        self.others
            .lock()
            .unwrap()
            .insert(id, controller.clone() as Arc<dyn Device>);
        Ok(controller)
    }

    /// Wrap an already-registered device behind a tracking override and
    /// register the override under a new id, so pose queries for that id
    /// flow through C10 instead of straight to the underlying device.
    pub fn add_tracking_override(
        &self,
        id: impl Into<String>,
        override_device: TrackingOverride,
    ) -> Arc<TrackingOverride> {
        let id = id.into();
        let device = Arc::new(override_device);
        self.others
            .lock()
            .unwrap()
            .insert(id, device.clone() as Arc<dyn Device>);
        device
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Device>> {
        if id == "hmd" {
            return Some(self.hmd.clone() as Arc<dyn Device>);
        }
        self.others.lock().unwrap().get(id).cloned()
    }

    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.others.lock().unwrap().keys().cloned().collect();
        ids.push("hmd".to_string());
        ids
    }

    /// Destroy every registered device, HMD last so controllers release
    /// their dongle threads before the shared lighthouse/mainboard context
    /// tears down.
    pub fn shutdown(&self) -> Result<()> {
        for (id, device) in self.others.lock().unwrap().drain() {
            device.destroy().with_context(|| format!("destroying device '{id}'"))?;
        }
        self.hmd.destroy().context("destroying HMD device")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::variant::ControllerVariant;

    fn open_headless_manager() -> HardwareManager {
        let hmd = HardwareManager::open_hmd_with_calibration(
            HmdCalibration::defaults(HmdVariant::Vive),
            None,
            None,
            None,
        )
        .unwrap();
        HardwareManager::from_hmd(hmd)
    }

    #[test]
    fn open_hmd_with_calibration_registers_under_hmd_id() {
        let manager = open_headless_manager();
        assert!(manager.get("hmd").is_some());
        assert_eq!(manager.device_ids(), vec!["hmd".to_string()]);
    }

    #[test]
    fn add_controller_registers_and_shuts_down_cleanly() {
        let manager = open_headless_manager();
        manager
            .add_controller_with_calibration(
                "right",
                ControllerCalibration::defaults(ControllerVariant::IndexRight),
                None,
            )
            .unwrap();
        assert!(manager.get("right").is_some());
        manager.shutdown().unwrap();
        assert!(manager.get("right").is_none());
    }
}
