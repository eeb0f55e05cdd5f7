pub mod libsensel;
pub mod simulated;

use crate::frame::Frame;
use std::fmt;
use std::ops::BitOr;
use thiserror::Error;

/// One entry from the driver's device enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId {
    pub idx: u8,
    pub serial: String,
    pub com_port: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FirmwareInfo {
    pub protocol_version: u8,
    pub major: u8,
    pub minor: u8,
    pub build: u16,
    pub release: u8,
    pub device_id: u16,
    pub device_revision: u8,
}

impl fmt::Display for FirmwareInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

/// Physical and grid geometry of an open sensor. Fixed for the life of the
/// device handle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorInfo {
    pub max_contacts: u8,
    pub num_rows: u16,
    pub num_cols: u16,
    /// Active area width in millimetres.
    pub width: f32,
    /// Active area height in millimetres.
    pub height: f32,
}

impl SensorInfo {
    /// Number of force cells in one frame (`num_rows * num_cols`).
    pub fn grid_size(&self) -> usize {
        self.num_rows as usize * self.num_cols as usize
    }
}

/// Bit mask selecting which sections the device fills in each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameContent(u8);

impl FrameContent {
    pub const PRESSURE: FrameContent = FrameContent(0x01);
    pub const LABELS: FrameContent = FrameContent(0x02);
    pub const CONTACTS: FrameContent = FrameContent(0x04);
    pub const ACCEL: FrameContent = FrameContent(0x08);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: FrameContent) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for FrameContent {
    fn default() -> Self {
        FrameContent::PRESSURE | FrameContent::CONTACTS
    }
}

impl BitOr for FrameContent {
    type Output = FrameContent;

    fn bitor(self, rhs: FrameContent) -> FrameContent {
        FrameContent(self.0 | rhs.0)
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to load sensor library {path}: {message}")]
    LibraryLoad { path: String, message: String },

    #[error("sensor library is missing symbol {symbol}")]
    MissingSymbol { symbol: &'static str },

    #[error("{call} returned status {status}")]
    Call { call: &'static str, status: i32 },

    #[error("frame data has not been allocated")]
    NoFrameData,

    #[error("no device at index {0}")]
    NoSuchDevice(u8),
}

/// Enumerates and opens sensor devices.
pub trait SensorDriver {
    type Device: SensorDevice;

    fn device_list(&mut self) -> Result<Vec<DeviceId>, DriverError>;
    fn open(&mut self, id: &DeviceId) -> Result<Self::Device, DriverError>;
}

/// An open device handle. Calls are synchronous and may block for as long
/// as the underlying SDK does.
///
/// The release calls (`free_frame_data`, `stop_scanning`, `close`) are only
/// ever issued by [`crate::lease::DeviceLease`], in that order.
pub trait SensorDevice {
    fn firmware_info(&mut self) -> Result<FirmwareInfo, DriverError>;
    fn sensor_info(&mut self) -> Result<SensorInfo, DriverError>;
    fn set_frame_content(&mut self, content: FrameContent) -> Result<(), DriverError>;
    fn allocate_frame_data(&mut self) -> Result<(), DriverError>;
    fn free_frame_data(&mut self) -> Result<(), DriverError>;
    fn start_scanning(&mut self) -> Result<(), DriverError>;
    fn stop_scanning(&mut self) -> Result<(), DriverError>;
    fn close(&mut self) -> Result<(), DriverError>;

    /// Pull everything the device has buffered into the driver.
    fn read_sensor(&mut self) -> Result<(), DriverError>;
    /// Frames made available by the last `read_sensor`.
    fn num_available_frames(&mut self) -> Result<usize, DriverError>;
    /// Consume one available frame, overwriting `frame`.
    fn next_frame(&mut self, frame: &mut Frame) -> Result<(), DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_content_is_pressure_and_contacts() {
        let content = FrameContent::default();
        assert_eq!(content.bits(), 0x05);
        assert!(content.contains(FrameContent::PRESSURE));
        assert!(content.contains(FrameContent::CONTACTS));
        assert!(!content.contains(FrameContent::LABELS));
    }

    #[test]
    fn grid_size_multiplies_rows_and_cols() {
        let info = SensorInfo {
            max_contacts: 16,
            num_rows: 105,
            num_cols: 185,
            width: 240.0,
            height: 138.0,
        };
        assert_eq!(info.grid_size(), 19425);
    }

    #[test]
    fn firmware_displays_dotted_version() {
        let fw = FirmwareInfo {
            major: 0,
            minor: 19,
            build: 133,
            ..Default::default()
        };
        assert_eq!(fw.to_string(), "0.19.133");
    }
}
