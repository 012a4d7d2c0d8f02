//! HID transport shim (C1).
//!
//! A thin blocking interface over the OS HID stack, narrow enough that every
//! device decoder (mainboard, IMU, lighthouse, watchman) can share it and a
//! `MockHidTransport` can stand in for it in tests. Reader threads call
//! `read` in a loop with a timeout; `close` is the only way to unblock a
//! thread stuck inside it, which is what lets `destroy()` interrupt a
//! blocked reader (spec §4.1, §5).

use std::sync::Mutex;

use log::{debug, warn};

use crate::error::{ViveError, ViveResult};

/// A single HID interface endpoint, already opened.
pub trait HidTransport: Send + Sync {
    /// Write a feature report and read back the device's response into
    /// `buf`, returning the number of bytes read.
    fn get_feature_report(&self, report_id: u8, buf: &mut [u8]) -> ViveResult<usize>;

    /// Send a feature report to the device.
    fn set_feature_report(&self, buf: &[u8]) -> ViveResult<()>;

    /// Blocking read with a timeout. Returns `Ok(0)` on timeout (not an
    /// error), `Ok(n)` with `n > 0` on data, and `Err` on a transport error.
    /// MUST return promptly once `close` has been called from another
    /// thread.
    fn read(&self, buf: &mut [u8], timeout_ms: i32) -> ViveResult<usize>;

    /// Interrupt any in-flight or future `read` call. Idempotent.
    fn close(&self);
}

/// hidapi-backed implementation, one per opened interface.
pub struct HidApiTransport {
    device: Mutex<Option<hidapi::HidDevice>>,
}

impl HidApiTransport {
    /// Open `interface_index` of `path` for blocking reads.
    pub fn open_interface(
        api: &hidapi::HidApi,
        vendor_id: u16,
        product_id: u16,
        interface_index: i32,
    ) -> ViveResult<Self> {
        let device_info = api
            .device_list()
            .find(|d| {
                d.vendor_id() == vendor_id
                    && d.product_id() == product_id
                    && d.interface_number() == interface_index
            })
            .ok_or_else(|| {
                ViveError::HidIo(format!(
                    "no interface {interface_index} on {vendor_id:04X}:{product_id:04X}"
                ))
            })?;

        let device = api
            .open_path(device_info.path())
            .map_err(|e| ViveError::HidIo(e.to_string()))?;

        Ok(Self {
            device: Mutex::new(Some(device)),
        })
    }
}

impl HidTransport for HidApiTransport {
    fn get_feature_report(&self, report_id: u8, buf: &mut [u8]) -> ViveResult<usize> {
        let guard = self.device.lock().unwrap();
        let device = guard
            .as_ref()
            .ok_or_else(|| ViveError::HidIo("device closed".into()))?;
        buf[0] = report_id;
        device
            .get_feature_report(buf)
            .map_err(|e| ViveError::HidIo(e.to_string()))
    }

    fn set_feature_report(&self, buf: &[u8]) -> ViveResult<()> {
        let guard = self.device.lock().unwrap();
        let device = guard
            .as_ref()
            .ok_or_else(|| ViveError::HidIo("device closed".into()))?;
        device
            .send_feature_report(buf)
            .map_err(|e| ViveError::HidIo(e.to_string()))?;
        Ok(())
    }

    fn read(&self, buf: &mut [u8], timeout_ms: i32) -> ViveResult<usize> {
        let guard = self.device.lock().unwrap();
        let device = match guard.as_ref() {
            Some(device) => device,
            None => return Ok(0),
        };
        match device.read_timeout(buf, timeout_ms) {
            Ok(n) => Ok(n),
            Err(e) => Err(ViveError::HidIo(e.to_string())),
        }
    }

    fn close(&self) {
        debug!("closing HID interface");
        let mut guard = self.device.lock().unwrap();
        *guard = None;
    }
}

/// In-memory double used by unit tests: a queue of canned reports to return
/// from `read`, and a recorder of feature reports sent/requested. Plays the
/// role `MockTrackingDevice`/`MockDevice` play in the teacher's hardware
/// module, but at the transport layer rather than the device layer.
#[derive(Default)]
pub struct MockHidTransport {
    inner: Mutex<MockHidState>,
}

#[derive(Default)]
struct MockHidState {
    read_queue: std::collections::VecDeque<Vec<u8>>,
    feature_reports: std::collections::HashMap<u8, Vec<u8>>,
    sent_feature_reports: Vec<Vec<u8>>,
    closed: bool,
}

impl MockHidTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a report that the next `read` calls will return, in order.
    pub fn push_read(&self, report: Vec<u8>) {
        self.inner.lock().unwrap().read_queue.push_back(report);
    }

    /// Install the canned response for a `get_feature_report(report_id, ..)`.
    pub fn set_feature_response(&self, report_id: u8, response: Vec<u8>) {
        self.inner
            .lock()
            .unwrap()
            .feature_reports
            .insert(report_id, response);
    }

    pub fn sent_feature_reports(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().sent_feature_reports.clone()
    }
}

impl HidTransport for MockHidTransport {
    fn get_feature_report(&self, report_id: u8, buf: &mut [u8]) -> ViveResult<usize> {
        let state = self.inner.lock().unwrap();
        if state.closed {
            return Err(ViveError::HidIo("device closed".into()));
        }
        match state.feature_reports.get(&report_id) {
            Some(response) => {
                let n = response.len().min(buf.len());
                buf[..n].copy_from_slice(&response[..n]);
                Ok(n)
            }
            None => {
                warn!("mock HID has no feature response for report 0x{report_id:02X}");
                Ok(0)
            }
        }
    }

    fn set_feature_report(&self, buf: &[u8]) -> ViveResult<()> {
        let mut state = self.inner.lock().unwrap();
        if state.closed {
            return Err(ViveError::HidIo("device closed".into()));
        }
        state.sent_feature_reports.push(buf.to_vec());
        Ok(())
    }

    fn read(&self, buf: &mut [u8], _timeout_ms: i32) -> ViveResult<usize> {
        let mut state = self.inner.lock().unwrap();
        if state.closed {
            return Ok(0);
        }
        match state.read_queue.pop_front() {
            Some(report) => {
                let n = report.len().min(buf.len());
                buf[..n].copy_from_slice(&report[..n]);
                Ok(n)
            }
            None => Ok(0),
        }
    }

    fn close(&self) {
        self.inner.lock().unwrap().closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_read_returns_zero_when_queue_empty() {
        let transport = MockHidTransport::new();
        let mut buf = [0u8; 64];
        assert_eq!(transport.read(&mut buf, 100).unwrap(), 0);
    }

    #[test]
    fn mock_read_returns_queued_report() {
        let transport = MockHidTransport::new();
        transport.push_read(vec![1, 2, 3]);
        let mut buf = [0u8; 64];
        let n = transport.read(&mut buf, 100).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }

    #[test]
    fn close_makes_read_return_zero_instead_of_blocking() {
        let transport = MockHidTransport::new();
        transport.push_read(vec![9, 9, 9]);
        transport.close();
        let mut buf = [0u8; 64];
        assert_eq!(transport.read(&mut buf, 100).unwrap(), 0);
    }
}
