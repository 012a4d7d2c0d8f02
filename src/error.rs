//! Crate-wide error taxonomy for the device-driver/tracking subsystem.
//!
//! Mirrors the way `hardware::device::DeviceError` is built in the teacher:
//! one `thiserror` enum, one variant per named failure kind, `anyhow` used
//! only at the outer wiring seam (`HardwareManager`/`LighthouseRuntime`).

use thiserror::Error;

/// Result type used throughout the hardware subsystem.
pub type ViveResult<T> = Result<T, ViveError>;

#[derive(Debug, Error)]
pub enum ViveError {
    /// Transport error from the OS HID stack.
    #[error("HID I/O error: {0}")]
    HidIo(String),

    /// A zero-byte read; callers should treat this as "no data yet", not an
    /// error. Reader loops absorb this themselves, but it is named here so
    /// the taxonomy is complete per the component spec.
    #[error("HID read timed out")]
    HidTimeout,

    /// Feature-report exchange failed while assembling the config blob.
    #[error("config blob transport error: {0}")]
    ConfigTransport(String),

    /// zlib stream was corrupt.
    #[error("config blob failed to inflate: {0}")]
    ConfigInflate(String),

    /// Inflated config exceeded the size cap.
    #[error("config blob exceeded the {0} byte cap")]
    ConfigTooLarge(usize),

    /// Config JSON failed to parse as JSON at all.
    #[error("config JSON syntax error: {0}")]
    ConfigJsonSyntax(String),

    /// A required field was absent for the device's variant schema.
    #[error("config JSON missing required field: {0}")]
    ConfigMissingField(String),

    /// `model_number`/`model_name` did not match a known controller variant.
    #[error("config JSON named an unrecognized controller variant: {0}")]
    ConfigBadVariant(String),

    /// Unknown HID report id for the interface it arrived on.
    #[error("unexpected report id 0x{0:02X}")]
    BadReportId(u8),

    /// A fixed-size report arrived with the wrong length.
    #[error("expected report of {expected} bytes, got {actual}")]
    BadReportSize { expected: usize, actual: usize },

    /// A magic/sentinel field failed its integrity check.
    #[error("bad magic value: expected 0x{expected:04X}, got 0x{actual:04X}")]
    BadMagic { expected: u16, actual: u16 },

    /// A lighthouse pulse record named a sensor id outside 0..=31.
    #[error("bad sensor id: {0}")]
    BadSensorId(u8),

    /// A watchman payload advanced its cursor past the end of the buffer.
    #[error("watchman payload overshoot: needed {needed} bytes, had {available}")]
    WatchmanOvershoot { needed: usize, available: usize },

    /// A pose consumer asked for an input name the device does not have.
    #[error("invalid input name: {0}")]
    InvalidInputName(String),

    /// No HMD was created; fatal to the runtime builder.
    #[error("no HMD device was created")]
    NoHmd,

    /// Called a capability a device kind does not implement (e.g. hand
    /// tracking on an HMD).
    #[error("unsupported operation for this device: {0}")]
    Unsupported(&'static str),
}
