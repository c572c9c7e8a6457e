//! HID transport: backend traits, the `hidapi` implementation and a mock board.
//!
//! The relay logic only needs five blocking primitives: enumerate by VID/PID,
//! open by path, get/set feature report, close. [`HidBackend`] and
//! [`HidConnection`] are that seam; [`HidApiBackend`] is the real one.

use std::ffi::{CStr, CString};
use std::fmt;

use hidapi::{DeviceInfo, HidApi, HidDevice};
use parking_lot::Mutex;

use crate::protocol::ReportLayout;

// ── Error type ──

/// HID transport errors.
///
/// String payloads follow the convention **"context: details"** where *context*
/// identifies the step (e.g. the device path) and *details* is the error
/// reported by the HID layer.
#[derive(Debug)]
pub enum HidError {
    Init(String),
    Enumerate(String),
    Open(String),
    Read(String),
    Write(String),
    ShortRead { expected: usize, got: usize },
}

impl fmt::Display for HidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HidError::Init(e) => write!(f, "Failed to initialize HID API: {e}"),
            HidError::Enumerate(e) => write!(f, "HID enumeration failed: {e}"),
            HidError::Open(e) => write!(f, "Failed to open HID device: {e}"),
            HidError::Read(e) => write!(f, "Feature report read failed: {e}"),
            HidError::Write(e) => write!(f, "Feature report write failed: {e}"),
            HidError::ShortRead { expected, got } => {
                write!(f, "Feature report too short: got {got} bytes, need {expected}")
            }
        }
    }
}

impl std::error::Error for HidError {}

pub type Result<T> = std::result::Result<T, HidError>;

// ── Descriptor ──

/// One HID device as reported by enumeration. Consumed by discovery only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub product_name: Option<String>,
    /// Opaque OS path, passed back to [`HidBackend::open`].
    pub path: CString,
}

impl DeviceDescriptor {
    fn from_info(info: &DeviceInfo) -> Self {
        DeviceDescriptor {
            vendor_id: info.vendor_id(),
            product_id: info.product_id(),
            product_name: info.product_string().map(|s| s.to_string()),
            path: info.path().to_owned(),
        }
    }

    /// Lossy UTF-8 rendering of the path, for logs and listings.
    pub fn path_display(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

// ── Traits ──

/// Source of HID devices.
pub trait HidBackend: Send + Sync {
    fn enumerate(&self, vendor_id: u16, product_id: u16) -> Result<Vec<DeviceDescriptor>>;
    fn open(&self, path: &CStr) -> Result<Box<dyn HidConnection>>;
    /// How this transport lays out feature-report reads.
    fn report_layout(&self) -> ReportLayout;
}

/// An open HID device. All calls block until the transfer completes.
pub trait HidConnection: Send {
    /// Fill `buf` with a feature report; `buf[0]` selects the report ID.
    /// Returns the number of bytes written into `buf`.
    fn get_feature_report(&mut self, buf: &mut [u8]) -> Result<usize>;
    /// Send a feature report; `buf[0]` is the report ID. Returns bytes sent.
    fn send_feature_report(&mut self, buf: &[u8]) -> Result<usize>;
    fn close(self: Box<Self>) -> Result<()>;
}

// ── hidapi backend ──

/// [`HidBackend`] over the `hidapi` crate.
///
/// One `HidApi` context per backend; its device list is refreshed on every
/// enumeration so boards plugged in after startup are found.
pub struct HidApiBackend {
    api: Mutex<HidApi>,
}

impl HidApiBackend {
    /// hidapi keeps the report ID in byte 0 of `get_feature_report` on all
    /// platforms. Its macOS backend reads into `buf[1..]` and puts the ID back
    /// into `buf[0]`, so the frame is never shifted.
    pub const REPORT_LAYOUT: ReportLayout = ReportLayout::Prefixed;

    pub fn new() -> Result<Self> {
        let api = HidApi::new().map_err(|e| HidError::Init(e.to_string()))?;
        Ok(HidApiBackend {
            api: Mutex::new(api),
        })
    }
}

impl HidBackend for HidApiBackend {
    fn enumerate(&self, vendor_id: u16, product_id: u16) -> Result<Vec<DeviceDescriptor>> {
        let mut api = self.api.lock();
        api.refresh_devices()
            .map_err(|e| HidError::Enumerate(format!("refresh: {e}")))?;
        let found: Vec<DeviceDescriptor> = api
            .device_list()
            .filter(|d| d.vendor_id() == vendor_id && d.product_id() == product_id)
            .map(DeviceDescriptor::from_info)
            .collect();
        log::debug!(
            "hidapi: {} device(s) with VID 0x{vendor_id:04X} PID 0x{product_id:04X}",
            found.len()
        );
        Ok(found)
    }

    fn open(&self, path: &CStr) -> Result<Box<dyn HidConnection>> {
        let api = self.api.lock();
        let device = api
            .open_path(path)
            .map_err(|e| HidError::Open(format!("{}: {e}", path.to_string_lossy())))?;
        Ok(Box::new(HidApiConnection { device }))
    }

    fn report_layout(&self) -> ReportLayout {
        Self::REPORT_LAYOUT
    }
}

struct HidApiConnection {
    device: HidDevice,
}

impl HidConnection for HidApiConnection {
    fn get_feature_report(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.device
            .get_feature_report(buf)
            .map_err(|e| HidError::Read(format!("get_feature_report: {e}")))
    }

    fn send_feature_report(&mut self, buf: &[u8]) -> Result<usize> {
        self.device
            .send_feature_report(buf)
            .map_err(|e| HidError::Write(format!("send_feature_report: {e}")))?;
        Ok(buf.len())
    }

    fn close(self: Box<Self>) -> Result<()> {
        // hid_close runs on drop and cannot fail.
        drop(self.device);
        Ok(())
    }
}

// ── Mock board for testing ──

/// In-memory relay boards for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::sync::Arc;

    use crate::codec::Report;
    use crate::protocol::{
        OFF_SERIAL, OFF_STATUS, ProtocolConfig, REPORT_SIZE, RELAY_PID, RELAY_VID, SERIAL_LEN,
    };

    #[derive(Debug)]
    struct BoardState {
        relay_count: u8,
        serial: [u8; SERIAL_LEN],
        status: u8,
        /// Channels (bitmask) whose relay never moves.
        stuck: u8,
        layout: ReportLayout,
        open: bool,
        fail_open: bool,
        fail_read: bool,
        fail_write: bool,
        /// Cap on the bytes returned by a read.
        read_limit: Option<usize>,
        opens: usize,
        closes: usize,
        reads: usize,
        sent: Vec<Vec<u8>>,
    }

    /// A simulated relay board. Cloning yields another handle to the same board.
    ///
    /// Applies the default dcttech opcodes, answers reads in its configured
    /// [`ReportLayout`], and records every transport call.
    #[derive(Debug, Clone)]
    pub struct MockBoard {
        state: Arc<Mutex<BoardState>>,
    }

    impl MockBoard {
        pub fn new(relay_count: u8, serial: &str) -> Self {
            let mut raw = [0u8; SERIAL_LEN];
            for (dst, b) in raw.iter_mut().zip(serial.bytes()) {
                *dst = b;
            }
            MockBoard {
                state: Arc::new(Mutex::new(BoardState {
                    relay_count,
                    serial: raw,
                    status: 0,
                    stuck: 0,
                    layout: ReportLayout::Prefixed,
                    open: false,
                    fail_open: false,
                    fail_read: false,
                    fail_write: false,
                    read_limit: None,
                    opens: 0,
                    closes: 0,
                    reads: 0,
                    sent: Vec::new(),
                })),
            }
        }

        /// Layout the board answers reads in.
        pub fn with_layout(self, layout: ReportLayout) -> Self {
            self.state.lock().layout = layout;
            self
        }

        pub fn with_status(self, bits: u8) -> Self {
            self.state.lock().status = bits;
            self
        }

        /// Physical status bitmask (bit 0 = channel 1).
        pub fn status_bits(&self) -> u8 {
            self.state.lock().status
        }

        /// Flip relays behind the driver's back (e.g. the board was power-cycled).
        pub fn set_status_bits(&self, bits: u8) {
            self.state.lock().status = bits;
        }

        /// Serial as stored on the board, padding stripped.
        pub fn serial(&self) -> String {
            let st = self.state.lock();
            String::from_utf8_lossy(&st.serial)
                .trim_end_matches('\0')
                .to_string()
        }

        /// Make a channel ignore every command from now on.
        pub fn stick_channel(&self, channel: u8) {
            if (1..=8).contains(&channel) {
                self.state.lock().stuck |= 1 << (channel - 1);
            }
        }

        pub fn fail_open(&self, fail: bool) {
            self.state.lock().fail_open = fail;
        }

        pub fn fail_read(&self, fail: bool) {
            self.state.lock().fail_read = fail;
        }

        pub fn fail_write(&self, fail: bool) {
            self.state.lock().fail_write = fail;
        }

        /// Return at most `limit` bytes from every read (`None` for full frames).
        pub fn truncate_reads(&self, limit: Option<usize>) {
            self.state.lock().read_limit = limit;
        }

        pub fn is_open(&self) -> bool {
            self.state.lock().open
        }

        pub fn opens(&self) -> usize {
            self.state.lock().opens
        }

        pub fn closes(&self) -> usize {
            self.state.lock().closes
        }

        pub fn reads(&self) -> usize {
            self.state.lock().reads
        }

        pub fn writes(&self) -> usize {
            self.state.lock().sent.len()
        }

        /// Every report written so far, in order.
        pub fn sent_reports(&self) -> Vec<Vec<u8>> {
            self.state.lock().sent.clone()
        }

        /// Total open/read/write/close calls that reached the board.
        pub fn transport_calls(&self) -> usize {
            let st = self.state.lock();
            st.opens + st.closes + st.reads + st.sent.len()
        }

        fn all_mask(relay_count: u8) -> u8 {
            if relay_count >= 8 {
                0xFF
            } else {
                (1u8 << relay_count) - 1
            }
        }

        fn apply(st: &mut BoardState, buf: &[u8]) {
            let proto = ProtocolConfig::default();
            let Some(&opcode) = buf.get(1) else {
                return;
            };
            let arg = buf.get(2).copied().unwrap_or(0);
            let all = Self::all_mask(st.relay_count);
            let desired = if opcode == proto.all_on {
                st.status | all
            } else if opcode == proto.all_off {
                st.status & !all
            } else if opcode == proto.single_on || opcode == proto.single_off {
                if arg == 0 || arg > st.relay_count {
                    return;
                }
                let bit = 1u8 << (arg - 1);
                if opcode == proto.single_on {
                    st.status | bit
                } else {
                    st.status & !bit
                }
            } else if opcode == proto.set_serial {
                for (i, dst) in st.serial.iter_mut().enumerate() {
                    *dst = buf.get(2 + i).copied().unwrap_or(0);
                }
                return;
            } else {
                return;
            };
            st.status = (st.status & st.stuck) | (desired & !st.stuck);
        }

        fn frame(st: &BoardState) -> Report {
            let mut canonical = [0u8; REPORT_SIZE];
            canonical[OFF_SERIAL..OFF_SERIAL + SERIAL_LEN].copy_from_slice(&st.serial);
            canonical[OFF_STATUS] = st.status;
            match st.layout {
                ReportLayout::Prefixed => canonical,
                ReportLayout::Unprefixed => {
                    let mut raw = [0u8; REPORT_SIZE];
                    raw[..REPORT_SIZE - 1].copy_from_slice(&canonical[1..]);
                    raw
                }
            }
        }
    }

    struct MockConnection {
        board: MockBoard,
    }

    impl HidConnection for MockConnection {
        fn get_feature_report(&mut self, buf: &mut [u8]) -> Result<usize> {
            let mut st = self.board.state.lock();
            st.reads += 1;
            if st.fail_read {
                return Err(HidError::Read("mock: read failure injected".into()));
            }
            let frame = MockBoard::frame(&st);
            let n = buf
                .len()
                .min(frame.len())
                .min(st.read_limit.unwrap_or(usize::MAX));
            buf[..n].copy_from_slice(&frame[..n]);
            Ok(n)
        }

        fn send_feature_report(&mut self, buf: &[u8]) -> Result<usize> {
            let mut st = self.board.state.lock();
            st.sent.push(buf.to_vec());
            if st.fail_write {
                return Err(HidError::Write("mock: write failure injected".into()));
            }
            MockBoard::apply(&mut st, buf);
            Ok(buf.len())
        }

        fn close(self: Box<Self>) -> Result<()> {
            let mut st = self.board.state.lock();
            st.closes += 1;
            st.open = false;
            Ok(())
        }
    }

    /// A set of mock boards behind one [`HidBackend`].
    ///
    /// Reports [`ReportLayout::Prefixed`] like hidapi unless told otherwise.
    #[derive(Default)]
    pub struct MockBackend {
        devices: Vec<(DeviceDescriptor, MockBoard)>,
        enumerations: Mutex<usize>,
        fail_enumerate: bool,
        layout: ReportLayout,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Attach a board with the relay VID/PID and the given product string.
        pub fn with_board(self, product_name: &str, board: MockBoard) -> Self {
            self.with_device(RELAY_VID, RELAY_PID, Some(product_name), board)
        }

        /// Attach a board with arbitrary identity.
        pub fn with_device(
            mut self,
            vendor_id: u16,
            product_id: u16,
            product_name: Option<&str>,
            board: MockBoard,
        ) -> Self {
            let path = format!("mock://hid/{}", self.devices.len());
            let descriptor = DeviceDescriptor {
                vendor_id,
                product_id,
                product_name: product_name.map(str::to_string),
                path: CString::new(path).unwrap_or_default(),
            };
            self.devices.push((descriptor, board));
            self
        }

        /// Layout this backend advertises. Boards answer in their own layout.
        pub fn with_report_layout(mut self, layout: ReportLayout) -> Self {
            self.layout = layout;
            self
        }

        pub fn failing_enumerate(mut self) -> Self {
            self.fail_enumerate = true;
            self
        }

        pub fn enumerations(&self) -> usize {
            *self.enumerations.lock()
        }
    }

    impl HidBackend for MockBackend {
        fn enumerate(&self, vendor_id: u16, product_id: u16) -> Result<Vec<DeviceDescriptor>> {
            *self.enumerations.lock() += 1;
            if self.fail_enumerate {
                return Err(HidError::Enumerate("mock: enumeration failure injected".into()));
            }
            Ok(self
                .devices
                .iter()
                .filter(|(d, _)| d.vendor_id == vendor_id && d.product_id == product_id)
                .map(|(d, _)| d.clone())
                .collect())
        }

        fn open(&self, path: &CStr) -> Result<Box<dyn HidConnection>> {
            let board = self
                .devices
                .iter()
                .find(|(d, _)| d.path.as_c_str() == path)
                .map(|(_, b)| b.clone())
                .ok_or_else(|| HidError::Open(format!("{}: no such device", path.to_string_lossy())))?;
            {
                let mut st = board.state.lock();
                st.opens += 1;
                if st.fail_open {
                    return Err(HidError::Open(format!(
                        "{}: mock: open failure injected",
                        path.to_string_lossy()
                    )));
                }
                st.open = true;
            }
            Ok(Box::new(MockConnection { board }))
        }

        fn report_layout(&self) -> ReportLayout {
            self.layout
        }
    }
}
