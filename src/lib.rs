//! Bridges a Sensel force-sensing pad into a host's per-tick, two-channel
//! numeric output.
//!
//! [`SensorSession`] owns the device: it acquires the first pad the driver
//! lists, reads frames when polled, and reacquires the pad when polls stop
//! succeeding for longer than the configured stale timeout.

pub mod device;
pub mod frame;
pub mod info;
pub mod lease;
pub mod output;
pub mod session;

#[cfg(test)]
mod testing;

pub use device::libsensel::LibSensel;
pub use device::simulated::{SimulatedConfig, SimulatedDriver};
pub use device::{DriverError, SensorDevice, SensorDriver, SensorInfo};
pub use frame::{Contact, Frame};
pub use output::{ChannelBuffers, OutputDescriptor, OutputSink, Projection, SENTINEL};
pub use session::{PollOutcome, SensorSession, SessionConfig, SessionState};
