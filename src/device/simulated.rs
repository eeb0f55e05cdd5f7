use super::{DeviceId, DriverError, FirmwareInfo, FrameContent, SensorDevice, SensorDriver, SensorInfo};
use crate::frame::{Contact, ContactState, Frame};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Settings for the synthetic sensor.
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    pub num_rows: u16,
    pub num_cols: u16,
    pub width_mm: f32,
    pub height_mm: f32,
    /// Frames made available by each `read_sensor` call.
    pub frames_per_read: usize,
    /// Number of contacts orbiting the pad.
    pub contacts: usize,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        // Sensel Morph geometry.
        Self {
            num_rows: 105,
            num_cols: 185,
            width_mm: 240.0,
            height_mm: 138.0,
            frames_per_read: 2,
            contacts: 2,
        }
    }
}

/// A driver exposing one synthetic device whose contacts move in circles
/// and press with a slowly varying force.
pub struct SimulatedDriver {
    config: SimulatedConfig,
    present: Rc<Cell<bool>>,
    epoch: Instant,
}

impl SimulatedDriver {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            config,
            present: Rc::new(Cell::new(true)),
            epoch: Instant::now(),
        }
    }

    /// Shared switch for plugging the device in or out. Unplugging makes
    /// reads on an open device fail until it is reopened.
    pub fn presence(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.present)
    }
}

impl SensorDriver for SimulatedDriver {
    type Device = SimulatedDevice;

    fn device_list(&mut self) -> Result<Vec<DeviceId>, DriverError> {
        if !self.present.get() {
            return Ok(Vec::new());
        }
        Ok(vec![DeviceId {
            idx: 0,
            serial: "SIM00000001".to_string(),
            com_port: "sim".to_string(),
        }])
    }

    fn open(&mut self, id: &DeviceId) -> Result<SimulatedDevice, DriverError> {
        if !self.present.get() || id.idx != 0 {
            return Err(DriverError::NoSuchDevice(id.idx));
        }
        Ok(SimulatedDevice {
            config: self.config.clone(),
            present: Rc::clone(&self.present),
            epoch: self.epoch,
            content: FrameContent::default(),
            allocated: false,
            scanning: false,
            available: 0,
            sequence: 0,
        })
    }
}

pub struct SimulatedDevice {
    config: SimulatedConfig,
    present: Rc<Cell<bool>>,
    epoch: Instant,
    content: FrameContent,
    allocated: bool,
    scanning: bool,
    available: usize,
    sequence: u64,
}

impl SimulatedDevice {
    fn ensure_present(&self, call: &'static str) -> Result<(), DriverError> {
        if self.present.get() {
            Ok(())
        } else {
            Err(DriverError::Call { call, status: -1 })
        }
    }

    fn contacts_at(&self, t: f32) -> Vec<Contact> {
        let cx = self.config.width_mm / 2.0;
        let cy = self.config.height_mm / 2.0;
        let radius = self.config.height_mm.min(self.config.width_mm) / 3.0;
        (0..self.config.contacts)
            .map(|i| {
                let phase = t + i as f32 * std::f32::consts::TAU / self.config.contacts as f32;
                Contact {
                    id: i as u8,
                    state: if self.sequence == 1 {
                        ContactState::Start
                    } else {
                        ContactState::Move
                    },
                    x: cx + radius * phase.cos(),
                    y: cy + radius * phase.sin(),
                    total_force: 200.0 + 150.0 * (t * 0.7 + i as f32).sin(),
                    area: 80.0,
                }
            })
            .collect()
    }

    fn render(&self, frame: &mut Frame, contacts: &[Contact]) {
        let rows = self.config.num_rows as usize;
        let cols = self.config.num_cols as usize;
        let pitch_x = self.config.width_mm / cols as f32;
        let pitch_y = self.config.height_mm / rows as f32;
        let sigma2 = 2.0 * 6.0f32.powi(2);

        frame.force.resize(rows * cols, 0.0);
        for r in 0..rows {
            let y = (r as f32 + 0.5) * pitch_y;
            for c in 0..cols {
                let x = (c as f32 + 0.5) * pitch_x;
                frame.force[r * cols + c] = contacts
                    .iter()
                    .map(|k| {
                        let d2 = (x - k.x).powi(2) + (y - k.y).powi(2);
                        k.total_force / 100.0 * (-d2 / sigma2).exp()
                    })
                    .sum();
            }
        }
    }
}

impl SensorDevice for SimulatedDevice {
    fn firmware_info(&mut self) -> Result<FirmwareInfo, DriverError> {
        self.ensure_present("firmware_info")?;
        Ok(FirmwareInfo {
            protocol_version: 1,
            major: 0,
            minor: 19,
            build: 0,
            release: 0,
            device_id: 0,
            device_revision: 0,
        })
    }

    fn sensor_info(&mut self) -> Result<SensorInfo, DriverError> {
        self.ensure_present("sensor_info")?;
        Ok(SensorInfo {
            max_contacts: 16,
            num_rows: self.config.num_rows,
            num_cols: self.config.num_cols,
            width: self.config.width_mm,
            height: self.config.height_mm,
        })
    }

    fn set_frame_content(&mut self, content: FrameContent) -> Result<(), DriverError> {
        self.ensure_present("set_frame_content")?;
        self.content = content;
        Ok(())
    }

    fn allocate_frame_data(&mut self) -> Result<(), DriverError> {
        self.allocated = true;
        Ok(())
    }

    fn free_frame_data(&mut self) -> Result<(), DriverError> {
        self.allocated = false;
        Ok(())
    }

    fn start_scanning(&mut self) -> Result<(), DriverError> {
        self.ensure_present("start_scanning")?;
        self.scanning = true;
        Ok(())
    }

    fn stop_scanning(&mut self) -> Result<(), DriverError> {
        self.scanning = false;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.available = 0;
        Ok(())
    }

    fn read_sensor(&mut self) -> Result<(), DriverError> {
        self.ensure_present("read_sensor")?;
        if self.scanning {
            self.available = self.config.frames_per_read;
        }
        Ok(())
    }

    fn num_available_frames(&mut self) -> Result<usize, DriverError> {
        Ok(self.available)
    }

    fn next_frame(&mut self, frame: &mut Frame) -> Result<(), DriverError> {
        if !self.allocated || self.available == 0 {
            return Err(DriverError::NoFrameData);
        }
        self.available -= 1;
        self.sequence += 1;

        let t = self.epoch.elapsed().as_secs_f32();
        let contacts = self.contacts_at(t);
        frame.clear();
        if self.content.contains(FrameContent::PRESSURE) {
            self.render(frame, &contacts);
        }
        if self.content.contains(FrameContent::CONTACTS) {
            frame.contacts.extend(contacts);
        }
        Ok(())
    }
}
