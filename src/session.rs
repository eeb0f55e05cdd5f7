use crate::device::{
    DeviceId, DriverError, FirmwareInfo, FrameContent, SensorDevice, SensorDriver, SensorInfo,
};
use crate::frame::Frame;
use crate::info::{self, InfoChannel, InfoTable};
use crate::lease::DeviceLease;
use crate::output::{self, OutputDescriptor, OutputSink, Projection};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_millis(2500);
pub const DEFAULT_MAX_FRAMES_PER_TICK: usize = 5;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Longest gap between successful polls before the device is torn down
    /// and reacquired.
    pub stale_timeout: Duration,
    /// Frames fetched per poll; any surplus is left unread.
    pub max_frames_per_tick: usize,
    pub frame_content: FrameContent,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stale_timeout: DEFAULT_STALE_TIMEOUT,
            max_frames_per_tick: DEFAULT_MAX_FRAMES_PER_TICK,
            frame_content: FrameContent::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unacquired,
    Active,
}

/// Metadata captured when a device is acquired.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedDevice {
    pub id: DeviceId,
    pub firmware: FirmwareInfo,
    pub sensor: SensorInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The session was stale; it was torn down and acquisition retried.
    Reacquired { acquired: bool },
    /// Frames were read from an active device. `projection` is `None` when
    /// no frame was available and the output was left untouched.
    Read {
        available: usize,
        consumed: usize,
        projection: Option<Projection>,
    },
    /// No device and not yet stale.
    Idle,
}

/// An acquired device together with the frame it reads into. Both live and
/// die together.
struct ActiveDevice<D: SensorDevice> {
    lease: DeviceLease<D>,
    frame: Frame,
    connected: ConnectedDevice,
}

impl<D: SensorDevice> ActiveDevice<D> {
    /// Read the device and fetch up to `max_frames` of what it has buffered.
    /// Returns `(available, consumed)`.
    fn read_frames(&mut self, max_frames: usize) -> Result<(usize, usize), DriverError> {
        let device = self.lease.device();
        device.read_sensor()?;
        let available = device.num_available_frames()?;
        let consumed = available.min(max_frames);
        for _ in 0..consumed {
            device.next_frame(&mut self.frame)?;
        }
        Ok((available, consumed))
    }
}

/// Owns one sensor device across host ticks: acquires it, reads frames on
/// demand, and reacquires it when polls stop succeeding for longer than the
/// stale timeout.
pub struct SensorSession<D: SensorDriver> {
    driver: D,
    config: SessionConfig,
    active: Option<ActiveDevice<D::Device>>,
    last_poll: Instant,
    reacquisitions: u64,
}

impl<D: SensorDriver> SensorSession<D> {
    pub fn new(driver: D, config: SessionConfig) -> Self {
        Self::starting_at(driver, config, Instant::now())
    }

    /// Construct and acquire immediately, treating `now` as the last
    /// successful poll.
    pub fn starting_at(driver: D, config: SessionConfig, now: Instant) -> Self {
        let mut session = Self {
            driver,
            config,
            active: None,
            last_poll: now,
            reacquisitions: 0,
        };
        session.initialize_at(now);
        session
    }

    /// Release any current device and try to acquire the first one the
    /// driver lists. Returns whether the session is now active.
    ///
    /// The stale timer restarts once acquisition has finished, whether or
    /// not a device was found.
    pub fn initialize(&mut self) -> bool {
        self.initialize_at(Instant::now())
    }

    /// Like [`initialize`](Self::initialize), for callers that supply the
    /// tick time. The timer is stamped with `now` or the moment acquisition
    /// finished, whichever is later.
    pub fn initialize_at(&mut self, now: Instant) -> bool {
        let acquired = self.reacquire_device();
        self.last_poll = now.max(Instant::now());
        acquired
    }

    fn reacquire_device(&mut self) -> bool {
        self.teardown();
        match self.acquire() {
            Ok(Some(active)) => {
                self.active = Some(active);
                true
            }
            Ok(None) => {
                info!("no sensel device found");
                false
            }
            Err(e) => {
                warn!(error = %e, "failed to acquire sensel device");
                false
            }
        }
    }

    fn acquire(&mut self) -> Result<Option<ActiveDevice<D::Device>>, DriverError> {
        let Some(id) = self.driver.device_list()?.into_iter().next() else {
            return Ok(None);
        };

        // Any early return below drops the lease, which undoes the steps
        // already taken.
        let mut lease = DeviceLease::new(self.driver.open(&id)?);
        let firmware = lease.device().firmware_info()?;
        let sensor = lease.device().sensor_info()?;
        lease.device().set_frame_content(self.config.frame_content)?;
        lease.allocate_frame_data()?;
        let frame = Frame::with_capacity(sensor.grid_size(), sensor.max_contacts as usize);
        lease.start_scanning()?;

        info!(
            serial = %id.serial,
            com_port = %id.com_port,
            firmware = %firmware,
            width_mm = sensor.width,
            height_mm = sensor.height,
            rows = sensor.num_rows,
            cols = sensor.num_cols,
            "sensel device acquired"
        );

        Ok(Some(ActiveDevice {
            lease,
            frame,
            connected: ConnectedDevice {
                id,
                firmware,
                sensor,
            },
        }))
    }

    /// Release the device if one is held. Frame data is freed before the
    /// handle is closed. Does nothing when already unacquired.
    pub fn teardown(&mut self) {
        if let Some(mut active) = self.active.take() {
            debug!(serial = %active.connected.id.serial, "releasing sensel device");
            active.lease.release();
        }
    }

    /// Per-tick entry point.
    ///
    /// If the last successful poll is older than the stale timeout, the
    /// device is torn down and reacquired and nothing is read this tick.
    /// Otherwise an active session reads up to `max_frames_per_tick` frames
    /// and projects the last one into `sink`.
    pub fn poll(&mut self, now: Instant, sink: &mut OutputSink<'_>) -> PollOutcome {
        let elapsed = now.saturating_duration_since(self.last_poll);
        if elapsed > self.config.stale_timeout {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                active = self.active.is_some(),
                "sensel session stale, reacquiring"
            );
            let acquired = self.initialize_at(now);
            self.reacquisitions += 1;
            return PollOutcome::Reacquired { acquired };
        }

        let Some(active) = self.active.as_mut() else {
            return PollOutcome::Idle;
        };

        let (available, consumed) = match active.read_frames(self.config.max_frames_per_tick) {
            Ok(counts) => counts,
            Err(e) => {
                // Leave last_poll alone so the stale timeout can recover the
                // device.
                warn!(error = %e, "sensel read failed");
                return PollOutcome::Read {
                    available: 0,
                    consumed: 0,
                    projection: None,
                };
            }
        };
        self.last_poll = now;

        if available > consumed {
            debug!(available, consumed, "frames left unread this tick");
        }

        let projection = (consumed > 0).then(|| output::project(&active.frame, sink));
        PollOutcome::Read {
            available,
            consumed,
            projection,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.active.is_some() {
            SessionState::Active
        } else {
            SessionState::Unacquired
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn device(&self) -> Option<&ConnectedDevice> {
        self.active.as_ref().map(|a| &a.connected)
    }

    /// The frame most recently read, if a device is held.
    pub fn frame(&self) -> Option<&Frame> {
        self.active.as_ref().map(|a| &a.frame)
    }

    pub fn output_descriptor(&self) -> OutputDescriptor {
        OutputDescriptor::new(self.device().map(|d| d.sensor.grid_size()))
    }

    pub fn info_table(&self) -> InfoTable {
        InfoTable::for_device(self.device().map(|d| d.id.serial.as_str()))
    }

    pub fn info_channels(&self) -> Vec<InfoChannel> {
        info::info_channels()
    }

    /// Stale-triggered reacquisitions so far.
    pub fn reacquisitions(&self) -> u64 {
        self.reacquisitions
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl<D: SensorDriver> Drop for SensorSession<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ChannelBuffers;
    use crate::testing::{
        device, grid_frame, queue_frames, take_calls, with_device, without_device, Call,
        ScriptedDriver, Shared,
    };

    const CELLS: usize = 8;

    fn session(script: &Shared, start: Instant) -> SensorSession<ScriptedDriver> {
        SensorSession::starting_at(ScriptedDriver::new(script), SessionConfig::default(), start)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn acquires_first_device() {
        let script = with_device();
        script.borrow_mut().devices.push(device(1, "SM0TEST02"));
        let s = session(&script, Instant::now());

        assert_eq!(s.state(), SessionState::Active);
        let dev = s.device().unwrap();
        assert_eq!(dev.id.serial, "SM0TEST01");
        assert_eq!(dev.sensor.grid_size(), CELLS);
        assert_eq!(
            take_calls(&script),
            vec![
                Call::DeviceList,
                Call::Open(0),
                Call::FirmwareInfo,
                Call::SensorInfo,
                Call::SetFrameContent(0x05),
                Call::AllocateFrameData,
                Call::StartScanning,
            ]
        );
    }

    #[test]
    fn stays_unacquired_without_device() {
        let script = without_device();
        let s = session(&script, Instant::now());
        assert_eq!(s.state(), SessionState::Unacquired);
        assert!(s.device().is_none());
        assert_eq!(s.output_descriptor().num_samples, None);
        assert_eq!(take_calls(&script), vec![Call::DeviceList]);
    }

    #[test]
    fn failed_setup_leaves_unacquired_and_releases() {
        let script = with_device();
        script.borrow_mut().fail_start_scanning = true;
        let s = session(&script, Instant::now());
        assert!(!s.is_active());
        let calls = take_calls(&script);
        assert_eq!(
            &calls[calls.len() - 3..],
            &[Call::StartScanning, Call::FreeFrameData, Call::Close]
        );
    }

    #[test]
    fn unacquired_poll_is_noop_until_stale() {
        let script = without_device();
        let t0 = Instant::now();
        let mut s = session(&script, t0);
        take_calls(&script);
        let mut out = ChannelBuffers::new(CELLS);

        assert_eq!(s.poll(t0 + ms(1000), &mut out.sink()), PollOutcome::Idle);
        assert_eq!(s.poll(t0 + ms(2500), &mut out.sink()), PollOutcome::Idle);
        assert!(take_calls(&script).is_empty());

        assert_eq!(
            s.poll(t0 + ms(2600), &mut out.sink()),
            PollOutcome::Reacquired { acquired: false }
        );
        assert_eq!(take_calls(&script), vec![Call::DeviceList]);

        // The retry window restarts from the reacquisition.
        assert_eq!(s.poll(t0 + ms(4000), &mut out.sink()), PollOutcome::Idle);
        assert_eq!(
            s.poll(t0 + ms(5200), &mut out.sink()),
            PollOutcome::Reacquired { acquired: false }
        );
        assert_eq!(s.reacquisitions(), 2);
    }

    #[test]
    fn device_appearing_later_is_picked_up_on_retry() {
        let script = without_device();
        let t0 = Instant::now();
        let mut s = session(&script, t0);
        let mut out = ChannelBuffers::new(CELLS);

        script.borrow_mut().devices.push(device(0, "SM0LATE"));
        assert_eq!(s.poll(t0 + ms(100), &mut out.sink()), PollOutcome::Idle);
        assert_eq!(
            s.poll(t0 + ms(3000), &mut out.sink()),
            PollOutcome::Reacquired { acquired: true }
        );
        assert_eq!(s.device().unwrap().id.serial, "SM0LATE");
    }

    #[test]
    fn stale_active_session_reacquires_exactly_once() {
        let script = with_device();
        let t0 = Instant::now();
        let mut s = session(&script, t0);
        take_calls(&script);
        let mut out = ChannelBuffers::new(CELLS);

        let outcome = s.poll(t0 + ms(2600), &mut out.sink());
        assert_eq!(outcome, PollOutcome::Reacquired { acquired: true });
        assert_eq!(
            take_calls(&script),
            vec![
                Call::FreeFrameData,
                Call::StopScanning,
                Call::Close,
                Call::DeviceList,
                Call::Open(0),
                Call::FirmwareInfo,
                Call::SensorInfo,
                Call::SetFrameContent(0x05),
                Call::AllocateFrameData,
                Call::StartScanning,
            ]
        );

        let outcome = s.poll(t0 + ms(2700), &mut out.sink());
        assert!(matches!(outcome, PollOutcome::Read { .. }));
        assert_eq!(s.reacquisitions(), 1);
    }

    #[test]
    fn regular_polls_keep_session_alive() {
        let script = with_device();
        let t0 = Instant::now();
        let mut s = session(&script, t0);
        let mut out = ChannelBuffers::new(CELLS);

        for tick in 1..=10 {
            let outcome = s.poll(t0 + ms(tick * 2000), &mut out.sink());
            assert!(matches!(outcome, PollOutcome::Read { .. }), "tick {}", tick);
        }
        assert_eq!(s.reacquisitions(), 0);
    }

    #[test]
    fn reads_all_frames_up_to_cap() {
        let script = with_device();
        let t0 = Instant::now();
        let mut s = session(&script, t0);
        let mut out = ChannelBuffers::new(CELLS);

        queue_frames(&script, (1..=5).map(|i| grid_frame(i as f32, CELLS, &[])));
        let outcome = s.poll(t0 + ms(16), &mut out.sink());
        assert!(matches!(
            outcome,
            PollOutcome::Read {
                available: 5,
                consumed: 5,
                projection: Some(_)
            }
        ));
        assert!(script.borrow().pending.is_empty());
        assert_eq!(out.force, vec![5.0; CELLS]);
    }

    #[test]
    fn surplus_frames_are_left_for_next_tick() {
        let script = with_device();
        let t0 = Instant::now();
        let mut s = session(&script, t0);
        let mut out = ChannelBuffers::new(CELLS);

        queue_frames(&script, (1..=6).map(|i| grid_frame(i as f32, CELLS, &[])));
        let outcome = s.poll(t0 + ms(16), &mut out.sink());
        assert!(matches!(
            outcome,
            PollOutcome::Read {
                available: 6,
                consumed: 5,
                ..
            }
        ));
        assert_eq!(script.borrow().pending.len(), 1);
        assert_eq!(out.force, vec![5.0; CELLS]);

        let outcome = s.poll(t0 + ms(32), &mut out.sink());
        assert!(matches!(
            outcome,
            PollOutcome::Read {
                available: 1,
                consumed: 1,
                ..
            }
        ));
        assert_eq!(out.force, vec![6.0; CELLS]);
    }

    #[test]
    fn frame_cap_is_configurable() {
        let script = with_device();
        let t0 = Instant::now();
        let config = SessionConfig {
            max_frames_per_tick: 2,
            ..Default::default()
        };
        let mut s = SensorSession::starting_at(ScriptedDriver::new(&script), config, t0);
        let mut out = ChannelBuffers::new(CELLS);

        queue_frames(&script, (1..=3).map(|i| grid_frame(i as f32, CELLS, &[])));
        s.poll(t0 + ms(16), &mut out.sink());
        assert_eq!(script.borrow().pending.len(), 1);
        assert_eq!(out.force, vec![2.0; CELLS]);
    }

    #[test]
    fn projects_last_frame_contacts() {
        let script = with_device();
        let t0 = Instant::now();
        let mut s = session(&script, t0);
        let mut out = ChannelBuffers::new(CELLS);

        queue_frames(
            &script,
            [
                grid_frame(0.0, CELLS, &[(9.0, 9.0, 9.0)]),
                grid_frame(1.0, CELLS, &[(1.0, 2.0, 10.0), (3.0, 4.0, 20.0)]),
            ],
        );
        s.poll(t0 + ms(16), &mut out.sink());
        assert_eq!(
            out.contacts,
            vec![1.0, 2.0, 10.0, 3.0, 4.0, 20.0, -1.0, -1.0]
        );
    }

    #[test]
    fn no_frames_leaves_output_untouched() {
        let script = with_device();
        let t0 = Instant::now();
        let mut s = session(&script, t0);
        let mut out = ChannelBuffers::new(CELLS);

        queue_frames(&script, [grid_frame(3.0, CELLS, &[(1.0, 1.0, 1.0)])]);
        s.poll(t0 + ms(16), &mut out.sink());
        let before = (out.force.clone(), out.contacts.clone());

        let outcome = s.poll(t0 + ms(32), &mut out.sink());
        assert_eq!(
            outcome,
            PollOutcome::Read {
                available: 0,
                consumed: 0,
                projection: None
            }
        );
        assert_eq!((out.force, out.contacts), before);
    }

    #[test]
    fn read_failure_lets_stale_timeout_recover() {
        let script = with_device();
        let t0 = Instant::now();
        let mut s = session(&script, t0);
        let mut out = ChannelBuffers::new(CELLS);

        script.borrow_mut().fail_read = true;
        for tick in 1..=4 {
            s.poll(t0 + ms(tick * 600), &mut out.sink());
        }
        assert_eq!(s.reacquisitions(), 0);

        script.borrow_mut().fail_read = false;
        let outcome = s.poll(t0 + ms(2600), &mut out.sink());
        assert_eq!(outcome, PollOutcome::Reacquired { acquired: true });
    }

    #[test]
    fn teardown_frees_frame_before_closing_and_is_idempotent() {
        let script = with_device();
        let mut s = session(&script, Instant::now());
        take_calls(&script);

        s.teardown();
        assert_eq!(
            take_calls(&script),
            vec![Call::FreeFrameData, Call::StopScanning, Call::Close]
        );
        assert_eq!(s.state(), SessionState::Unacquired);

        s.teardown();
        drop(s);
        assert!(take_calls(&script).is_empty());
    }

    #[test]
    fn drop_releases_active_device() {
        let script = with_device();
        let s = session(&script, Instant::now());
        take_calls(&script);

        drop(s);
        assert_eq!(
            take_calls(&script),
            vec![Call::FreeFrameData, Call::StopScanning, Call::Close]
        );
    }

    #[test]
    fn initialize_restarts_stale_timer() {
        let script = with_device();
        let config = SessionConfig {
            stale_timeout: ms(50),
            ..Default::default()
        };
        let mut s = SensorSession::new(ScriptedDriver::new(&script), config);
        let mut out = ChannelBuffers::new(CELLS);

        std::thread::sleep(ms(60));
        assert!(s.initialize());
        take_calls(&script);

        let outcome = s.poll(Instant::now(), &mut out.sink());
        assert!(matches!(outcome, PollOutcome::Read { .. }));
        assert_eq!(s.reacquisitions(), 0);
        assert!(!take_calls(&script).contains(&Call::Close));
    }

    #[test]
    fn initialize_at_stamps_supplied_time() {
        let script = with_device();
        let t0 = Instant::now();
        let mut s = session(&script, t0);
        let mut out = ChannelBuffers::new(CELLS);

        assert!(s.initialize_at(t0 + ms(3000)));
        let outcome = s.poll(t0 + ms(3100), &mut out.sink());
        assert!(matches!(outcome, PollOutcome::Read { .. }));
        assert_eq!(
            s.poll(t0 + ms(5600), &mut out.sink()),
            PollOutcome::Read {
                available: 0,
                consumed: 0,
                projection: None
            }
        );
    }

    #[test]
    fn failed_stale_reacquire_unwinds_and_goes_idle() {
        let script = with_device();
        let t0 = Instant::now();
        let mut s = session(&script, t0);
        let mut out = ChannelBuffers::new(CELLS);
        take_calls(&script);

        script.borrow_mut().fail_start_scanning = true;
        assert_eq!(
            s.poll(t0 + ms(2600), &mut out.sink()),
            PollOutcome::Reacquired { acquired: false }
        );
        assert_eq!(s.state(), SessionState::Unacquired);
        assert_eq!(s.reacquisitions(), 1);
        assert_eq!(
            take_calls(&script),
            vec![
                Call::FreeFrameData,
                Call::StopScanning,
                Call::Close,
                Call::DeviceList,
                Call::Open(0),
                Call::FirmwareInfo,
                Call::SensorInfo,
                Call::SetFrameContent(0x05),
                Call::AllocateFrameData,
                Call::StartScanning,
                Call::FreeFrameData,
                Call::Close,
            ]
        );

        assert_eq!(s.poll(t0 + ms(3000), &mut out.sink()), PollOutcome::Idle);
        assert!(take_calls(&script).is_empty());
        assert_eq!(s.reacquisitions(), 1);
    }

    #[test]
    fn short_contact_channel_does_not_panic() {
        let script = with_device();
        let t0 = Instant::now();
        let mut s = session(&script, t0);
        let mut out = ChannelBuffers {
            force: vec![0.0; CELLS],
            contacts: vec![],
        };

        queue_frames(&script, [grid_frame(2.0, CELLS, &[(1.0, 2.0, 3.0)])]);
        let outcome = s.poll(t0 + ms(16), &mut out.sink());
        match outcome {
            PollOutcome::Read {
                projection: Some(p),
                ..
            } => {
                assert_eq!(p.contacts_written, 0);
                assert_eq!(p.contacts_dropped, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(out.force, vec![2.0; CELLS]);
    }

    #[test]
    fn descriptor_and_info_follow_device() {
        let script = with_device();
        let s = session(&script, Instant::now());

        let descriptor = s.output_descriptor();
        assert_eq!(descriptor.num_channels, 2);
        assert_eq!(descriptor.num_samples, Some(CELLS));
        assert_eq!(descriptor.start_index, 0);

        let table = s.info_table();
        assert_eq!(table.entry(0, 0), Some("Sensel device"));
        assert_eq!(table.entry(0, 1), Some("SM0TEST01"));
        assert_eq!(s.info_channels()[0].name, "sensel connected");
    }
}
