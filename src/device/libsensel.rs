use super::{DeviceId, DriverError, FirmwareInfo, FrameContent, SensorDevice, SensorDriver, SensorInfo};
use crate::frame::{Contact, ContactState, Frame};
use libc::{c_float, c_int, c_uchar, c_uint, c_ushort, c_void};
use libloading::Library;
use std::ffi::OsStr;
use std::ptr;
use std::rc::Rc;
use std::slice;
use tracing::trace;

// Layouts below mirror sensel.h from the vendor SDK.

const SENSEL_MAX_DEVICES: usize = 16;
const SENSEL_SERIAL_LEN: usize = 64;
const SENSEL_COM_PORT_LEN: usize = 64;
const SENSEL_OK: c_int = 0;

#[cfg(target_os = "windows")]
pub const DEFAULT_LIBRARY: &str = "LibSensel.dll";
#[cfg(target_os = "macos")]
pub const DEFAULT_LIBRARY: &str = "libsensel.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub const DEFAULT_LIBRARY: &str = "libsensel.so";

type SenselHandle = *mut c_void;

#[repr(C)]
#[derive(Clone, Copy)]
struct RawDeviceId {
    idx: c_uchar,
    serial_num: [c_uchar; SENSEL_SERIAL_LEN],
    com_port: [c_uchar; SENSEL_COM_PORT_LEN],
}

#[repr(C)]
struct RawDeviceList {
    num_devices: c_uchar,
    devices: [RawDeviceId; SENSEL_MAX_DEVICES],
}

#[repr(C)]
#[derive(Default)]
struct RawSensorInfo {
    max_contacts: c_uchar,
    num_rows: c_ushort,
    num_cols: c_ushort,
    width: c_float,
    height: c_float,
}

#[repr(C)]
#[derive(Default)]
struct RawFirmwareInfo {
    fw_protocol_version: c_uchar,
    fw_version_major: c_uchar,
    fw_version_minor: c_uchar,
    fw_version_build: c_ushort,
    fw_version_release: c_uchar,
    device_id: c_ushort,
    device_revision: c_uchar,
}

#[repr(C)]
#[allow(dead_code)]
struct RawContact {
    content_bit_mask: c_uchar,
    id: c_uchar,
    state: c_uint,
    x_pos: c_float,
    y_pos: c_float,
    total_force: c_float,
    area: c_float,
    orientation: c_float,
    major_axis: c_float,
    minor_axis: c_float,
    delta_x: c_float,
    delta_y: c_float,
    delta_force: c_float,
    delta_area: c_float,
    min_x: c_float,
    min_y: c_float,
    max_x: c_float,
    max_y: c_float,
    peak_x: c_float,
    peak_y: c_float,
    peak_force: c_float,
}

#[repr(C)]
#[allow(dead_code)]
struct RawFrameData {
    content_bit_mask: c_uchar,
    lost_frame_count: c_int,
    n_contacts: c_uchar,
    contacts: *mut RawContact,
    force_array: *mut c_float,
    labels_array: *mut c_uchar,
    accel_data: *mut c_void,
}

type GetDeviceListFn = unsafe extern "C" fn(*mut RawDeviceList) -> c_int;
type OpenDeviceByIdFn = unsafe extern "C" fn(*mut SenselHandle, c_uchar) -> c_int;
type HandleFn = unsafe extern "C" fn(SenselHandle) -> c_int;
type GetSensorInfoFn = unsafe extern "C" fn(SenselHandle, *mut RawSensorInfo) -> c_int;
type GetFirmwareInfoFn = unsafe extern "C" fn(SenselHandle, *mut RawFirmwareInfo) -> c_int;
type SetFrameContentFn = unsafe extern "C" fn(SenselHandle, c_uchar) -> c_int;
type AllocateFrameDataFn = unsafe extern "C" fn(SenselHandle, *mut *mut RawFrameData) -> c_int;
type FrameDataFn = unsafe extern "C" fn(SenselHandle, *mut RawFrameData) -> c_int;
type GetNumAvailableFramesFn = unsafe extern "C" fn(SenselHandle, *mut c_uint) -> c_int;

/// Entry points resolved from the vendor library. The function pointers are
/// only valid while `_lib` is loaded, so they never leave this struct.
struct SenselApi {
    get_device_list: GetDeviceListFn,
    open_device_by_id: OpenDeviceByIdFn,
    close: HandleFn,
    get_sensor_info: GetSensorInfoFn,
    get_firmware_info: GetFirmwareInfoFn,
    set_frame_content: SetFrameContentFn,
    allocate_frame_data: AllocateFrameDataFn,
    free_frame_data: FrameDataFn,
    start_scanning: HandleFn,
    stop_scanning: HandleFn,
    read_sensor: HandleFn,
    get_num_available_frames: GetNumAvailableFramesFn,
    get_frame: FrameDataFn,
    _lib: Library,
}

fn symbol<T: Copy>(lib: &Library, name: &'static str) -> Result<T, DriverError> {
    let mut cname = Vec::with_capacity(name.len() + 1);
    cname.extend_from_slice(name.as_bytes());
    cname.push(0);
    unsafe {
        lib.get::<T>(&cname)
            .map(|s| *s)
            .map_err(|_| DriverError::MissingSymbol { symbol: name })
    }
}

fn check(call: &'static str, status: c_int) -> Result<(), DriverError> {
    if status == SENSEL_OK {
        Ok(())
    } else {
        Err(DriverError::Call { call, status })
    }
}

fn c_string(bytes: &[c_uchar]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

impl SenselApi {
    fn load(path: &OsStr) -> Result<Self, DriverError> {
        let lib = unsafe { Library::new(path) }.map_err(|e| DriverError::LibraryLoad {
            path: path.to_string_lossy().into_owned(),
            message: e.to_string(),
        })?;

        Ok(Self {
            get_device_list: symbol(&lib, "senselGetDeviceList")?,
            open_device_by_id: symbol(&lib, "senselOpenDeviceByID")?,
            close: symbol(&lib, "senselClose")?,
            get_sensor_info: symbol(&lib, "senselGetSensorInfo")?,
            get_firmware_info: symbol(&lib, "senselGetFirmwareInfo")?,
            set_frame_content: symbol(&lib, "senselSetFrameContent")?,
            allocate_frame_data: symbol(&lib, "senselAllocateFrameData")?,
            free_frame_data: symbol(&lib, "senselFreeFrameData")?,
            start_scanning: symbol(&lib, "senselStartScanning")?,
            stop_scanning: symbol(&lib, "senselStopScanning")?,
            read_sensor: symbol(&lib, "senselReadSensor")?,
            get_num_available_frames: symbol(&lib, "senselGetNumAvailableFrames")?,
            get_frame: symbol(&lib, "senselGetFrame")?,
            _lib: lib,
        })
    }
}

/// Driver backed by the vendor's LibSensel shared library, loaded at runtime.
pub struct LibSensel {
    api: Rc<SenselApi>,
}

impl LibSensel {
    pub fn load(path: impl AsRef<OsStr>) -> Result<Self, DriverError> {
        Ok(Self {
            api: Rc::new(SenselApi::load(path.as_ref())?),
        })
    }

    pub fn load_default() -> Result<Self, DriverError> {
        Self::load(DEFAULT_LIBRARY)
    }
}

impl SensorDriver for LibSensel {
    type Device = SenselDevice;

    fn device_list(&mut self) -> Result<Vec<DeviceId>, DriverError> {
        let mut list = RawDeviceList {
            num_devices: 0,
            devices: [RawDeviceId {
                idx: 0,
                serial_num: [0; SENSEL_SERIAL_LEN],
                com_port: [0; SENSEL_COM_PORT_LEN],
            }; SENSEL_MAX_DEVICES],
        };
        check("senselGetDeviceList", unsafe {
            (self.api.get_device_list)(&mut list)
        })?;

        let count = (list.num_devices as usize).min(SENSEL_MAX_DEVICES);
        Ok(list.devices[..count]
            .iter()
            .map(|d| DeviceId {
                idx: d.idx,
                serial: c_string(&d.serial_num),
                com_port: c_string(&d.com_port),
            })
            .collect())
    }

    fn open(&mut self, id: &DeviceId) -> Result<SenselDevice, DriverError> {
        let mut handle: SenselHandle = ptr::null_mut();
        check("senselOpenDeviceByID", unsafe {
            (self.api.open_device_by_id)(&mut handle, id.idx)
        })?;
        if handle.is_null() {
            return Err(DriverError::NoSuchDevice(id.idx));
        }
        Ok(SenselDevice {
            api: Rc::clone(&self.api),
            handle,
            frame: ptr::null_mut(),
            cells: 0,
        })
    }
}

pub struct SenselDevice {
    api: Rc<SenselApi>,
    handle: SenselHandle,
    frame: *mut RawFrameData,
    /// Force array length, known once `sensor_info` has been queried.
    cells: usize,
}

impl SensorDevice for SenselDevice {
    fn firmware_info(&mut self) -> Result<FirmwareInfo, DriverError> {
        let mut raw = RawFirmwareInfo::default();
        check("senselGetFirmwareInfo", unsafe {
            (self.api.get_firmware_info)(self.handle, &mut raw)
        })?;
        Ok(FirmwareInfo {
            protocol_version: raw.fw_protocol_version,
            major: raw.fw_version_major,
            minor: raw.fw_version_minor,
            build: raw.fw_version_build,
            release: raw.fw_version_release,
            device_id: raw.device_id,
            device_revision: raw.device_revision,
        })
    }

    fn sensor_info(&mut self) -> Result<SensorInfo, DriverError> {
        let mut raw = RawSensorInfo::default();
        check("senselGetSensorInfo", unsafe {
            (self.api.get_sensor_info)(self.handle, &mut raw)
        })?;
        let info = SensorInfo {
            max_contacts: raw.max_contacts,
            num_rows: raw.num_rows,
            num_cols: raw.num_cols,
            width: raw.width,
            height: raw.height,
        };
        self.cells = info.grid_size();
        Ok(info)
    }

    fn set_frame_content(&mut self, content: FrameContent) -> Result<(), DriverError> {
        check("senselSetFrameContent", unsafe {
            (self.api.set_frame_content)(self.handle, content.bits())
        })
    }

    fn allocate_frame_data(&mut self) -> Result<(), DriverError> {
        let mut frame: *mut RawFrameData = ptr::null_mut();
        check("senselAllocateFrameData", unsafe {
            (self.api.allocate_frame_data)(self.handle, &mut frame)
        })?;
        if frame.is_null() {
            return Err(DriverError::NoFrameData);
        }
        self.frame = frame;
        Ok(())
    }

    fn free_frame_data(&mut self) -> Result<(), DriverError> {
        if self.frame.is_null() {
            return Ok(());
        }
        let frame = std::mem::replace(&mut self.frame, ptr::null_mut());
        check("senselFreeFrameData", unsafe {
            (self.api.free_frame_data)(self.handle, frame)
        })
    }

    fn start_scanning(&mut self) -> Result<(), DriverError> {
        check("senselStartScanning", unsafe {
            (self.api.start_scanning)(self.handle)
        })
    }

    fn stop_scanning(&mut self) -> Result<(), DriverError> {
        check("senselStopScanning", unsafe {
            (self.api.stop_scanning)(self.handle)
        })
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if self.handle.is_null() {
            return Ok(());
        }
        let handle = std::mem::replace(&mut self.handle, ptr::null_mut());
        check("senselClose", unsafe { (self.api.close)(handle) })
    }

    fn read_sensor(&mut self) -> Result<(), DriverError> {
        check("senselReadSensor", unsafe {
            (self.api.read_sensor)(self.handle)
        })
    }

    fn num_available_frames(&mut self) -> Result<usize, DriverError> {
        let mut count: c_uint = 0;
        check("senselGetNumAvailableFrames", unsafe {
            (self.api.get_num_available_frames)(self.handle, &mut count)
        })?;
        Ok(count as usize)
    }

    fn next_frame(&mut self, frame: &mut Frame) -> Result<(), DriverError> {
        if self.frame.is_null() {
            return Err(DriverError::NoFrameData);
        }
        check("senselGetFrame", unsafe {
            (self.api.get_frame)(self.handle, self.frame)
        })?;

        frame.clear();
        // SAFETY: `self.frame` was allocated by the SDK for this handle and
        // the SDK sizes `force_array` to the sensor grid and `contacts` to at
        // least `n_contacts` entries.
        unsafe {
            let raw = &*self.frame;
            frame.lost_frames = raw.lost_frame_count.max(0) as u32;
            if !raw.force_array.is_null() {
                frame
                    .force
                    .extend_from_slice(slice::from_raw_parts(raw.force_array, self.cells));
            }
            if !raw.contacts.is_null() {
                let contacts = slice::from_raw_parts(raw.contacts, raw.n_contacts as usize);
                frame.contacts.extend(contacts.iter().map(|c| Contact {
                    id: c.id,
                    state: ContactState::from(c.state),
                    x: c.x_pos,
                    y: c.y_pos,
                    total_force: c.total_force,
                    area: c.area,
                }));
            }
        }
        trace!(
            contacts = frame.contacts.len(),
            lost = frame.lost_frames,
            "sensel frame fetched"
        );
        Ok(())
    }
}
