//! Scripted in-memory driver that records every call it receives.

use crate::device::{
    DeviceId, DriverError, FirmwareInfo, FrameContent, SensorDevice, SensorDriver, SensorInfo,
};
use crate::frame::{Contact, Frame};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    DeviceList,
    Open(u8),
    FirmwareInfo,
    SensorInfo,
    SetFrameContent(u8),
    AllocateFrameData,
    FreeFrameData,
    StartScanning,
    StopScanning,
    Close,
    ReadSensor,
    NumAvailableFrames,
    NextFrame,
}

#[derive(Debug, Default)]
pub struct Script {
    pub devices: Vec<DeviceId>,
    pub sensor: SensorInfo,
    pub pending: VecDeque<Frame>,
    pub fail_start_scanning: bool,
    pub fail_read: bool,
    pub calls: Vec<Call>,
}

pub type Shared = Rc<RefCell<Script>>;

impl Script {
    pub fn record(&mut self, call: Call) {
        self.calls.push(call);
    }
}

pub fn sensor(rows: u16, cols: u16) -> SensorInfo {
    SensorInfo {
        max_contacts: 16,
        num_rows: rows,
        num_cols: cols,
        width: 240.0,
        height: 138.0,
    }
}

pub fn device(idx: u8, serial: &str) -> DeviceId {
    DeviceId {
        idx,
        serial: serial.to_string(),
        com_port: format!("/dev/ttyACM{}", idx),
    }
}

/// Script with one 2x4 device attached.
pub fn with_device() -> Shared {
    Rc::new(RefCell::new(Script {
        devices: vec![device(0, "SM0TEST01")],
        sensor: sensor(2, 4),
        ..Default::default()
    }))
}

pub fn without_device() -> Shared {
    Rc::new(RefCell::new(Script {
        sensor: sensor(2, 4),
        ..Default::default()
    }))
}

pub fn grid_frame(value: f32, cells: usize, contacts: &[(f32, f32, f32)]) -> Frame {
    Frame {
        force: vec![value; cells],
        contacts: contacts
            .iter()
            .map(|&(x, y, total_force)| Contact {
                x,
                y,
                total_force,
                ..Default::default()
            })
            .collect(),
        lost_frames: 0,
    }
}

pub fn queue_frames(script: &Shared, frames: impl IntoIterator<Item = Frame>) {
    script.borrow_mut().pending.extend(frames);
}

pub fn take_calls(script: &Shared) -> Vec<Call> {
    std::mem::take(&mut script.borrow_mut().calls)
}

pub struct ScriptedDriver {
    script: Shared,
}

impl ScriptedDriver {
    pub fn new(script: &Shared) -> Self {
        Self {
            script: Rc::clone(script),
        }
    }
}

impl SensorDriver for ScriptedDriver {
    type Device = ScriptedDevice;

    fn device_list(&mut self) -> Result<Vec<DeviceId>, DriverError> {
        let mut script = self.script.borrow_mut();
        script.record(Call::DeviceList);
        Ok(script.devices.clone())
    }

    fn open(&mut self, id: &DeviceId) -> Result<ScriptedDevice, DriverError> {
        self.script.borrow_mut().record(Call::Open(id.idx));
        Ok(ScriptedDevice {
            script: Rc::clone(&self.script),
        })
    }
}

pub struct ScriptedDevice {
    script: Shared,
}

impl ScriptedDevice {
    fn record(&self, call: Call) {
        self.script.borrow_mut().record(call);
    }
}

impl SensorDevice for ScriptedDevice {
    fn firmware_info(&mut self) -> Result<FirmwareInfo, DriverError> {
        self.record(Call::FirmwareInfo);
        Ok(FirmwareInfo {
            major: 1,
            minor: 2,
            build: 3,
            ..Default::default()
        })
    }

    fn sensor_info(&mut self) -> Result<SensorInfo, DriverError> {
        self.record(Call::SensorInfo);
        Ok(self.script.borrow().sensor)
    }

    fn set_frame_content(&mut self, content: FrameContent) -> Result<(), DriverError> {
        self.record(Call::SetFrameContent(content.bits()));
        Ok(())
    }

    fn allocate_frame_data(&mut self) -> Result<(), DriverError> {
        self.record(Call::AllocateFrameData);
        Ok(())
    }

    fn free_frame_data(&mut self) -> Result<(), DriverError> {
        self.record(Call::FreeFrameData);
        Ok(())
    }

    fn start_scanning(&mut self) -> Result<(), DriverError> {
        self.record(Call::StartScanning);
        if self.script.borrow().fail_start_scanning {
            return Err(DriverError::Call {
                call: "startScanning",
                status: -1,
            });
        }
        Ok(())
    }

    fn stop_scanning(&mut self) -> Result<(), DriverError> {
        self.record(Call::StopScanning);
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.record(Call::Close);
        Ok(())
    }

    fn read_sensor(&mut self) -> Result<(), DriverError> {
        self.record(Call::ReadSensor);
        if self.script.borrow().fail_read {
            return Err(DriverError::Call {
                call: "readSensor",
                status: -1,
            });
        }
        Ok(())
    }

    fn num_available_frames(&mut self) -> Result<usize, DriverError> {
        self.record(Call::NumAvailableFrames);
        Ok(self.script.borrow().pending.len())
    }

    fn next_frame(&mut self, frame: &mut Frame) -> Result<(), DriverError> {
        let mut script = self.script.borrow_mut();
        script.record(Call::NextFrame);
        let next = script.pending.pop_front().ok_or(DriverError::NoFrameData)?;
        frame.clear();
        frame.force.extend_from_slice(&next.force);
        frame.contacts.extend_from_slice(&next.contacts);
        frame.lost_frames = next.lost_frames;
        Ok(())
    }
}
