use crate::device::{DriverError, SensorDevice};
use tracing::warn;

/// Owns an open device and remembers which setup steps have succeeded, so
/// that dropping it undoes exactly those steps: frame data is freed first,
/// then scanning is stopped, then the handle is closed.
pub struct DeviceLease<D: SensorDevice> {
    device: D,
    frame_allocated: bool,
    scanning: bool,
    open: bool,
}

impl<D: SensorDevice> DeviceLease<D> {
    /// Take ownership of a freshly opened device.
    pub fn new(device: D) -> Self {
        Self {
            device,
            frame_allocated: false,
            scanning: false,
            open: true,
        }
    }

    pub fn device(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn allocate_frame_data(&mut self) -> Result<(), DriverError> {
        self.device.allocate_frame_data()?;
        self.frame_allocated = true;
        Ok(())
    }

    pub fn start_scanning(&mut self) -> Result<(), DriverError> {
        self.device.start_scanning()?;
        self.scanning = true;
        Ok(())
    }

    pub fn is_released(&self) -> bool {
        !self.open
    }

    /// Undo every setup step that succeeded. Safe to call repeatedly; a
    /// failing step is logged and the remaining steps still run.
    pub fn release(&mut self) {
        if self.frame_allocated {
            self.frame_allocated = false;
            if let Err(e) = self.device.free_frame_data() {
                warn!(error = %e, "failed to free frame data");
            }
        }
        if self.scanning {
            self.scanning = false;
            if let Err(e) = self.device.stop_scanning() {
                warn!(error = %e, "failed to stop scanning");
            }
        }
        if self.open {
            self.open = false;
            if let Err(e) = self.device.close() {
                warn!(error = %e, "failed to close device");
            }
        }
    }
}

impl<D: SensorDevice> Drop for DeviceLease<D> {
    fn drop(&mut self) {
        self.release();
    }
}
