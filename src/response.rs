use crate::error::RESULT_FAILED;
use crate::memory::NvmStatus;

/// Report id of the status record, also used by the bulk status reply.
pub const STATUS_REPORT_ID: u8 = 1;

/// Report id of the command response and page data reports.
pub const RESPONSE_REPORT_ID: u8 = 2;

/// Size of the response report, not including the report id.
pub const RESPONSE_REPORT_SIZE: usize = 130;

/// Payload bytes in one response report.
pub const RESPONSE_PAYLOAD_SIZE: usize = RESPONSE_REPORT_SIZE - 2;

/// Device status, rebuilt every time a host asks for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    /// Report id, kept for compatibility with the HID variant.
    pub report_id: u8,
    /// Loader version.
    pub version: u8,
    /// NVM controller status, without the internal flash-load bit.
    pub busy_flags: NvmStatus,
    /// Page buffer fill cursor.
    pub cursor: u16,
}

impl DeviceStatus {
    /// Bulk status reply: `[report id, version, busy flags, cursor (LE), result]`.
    pub fn to_bulk(&self, result: u8) -> [u8; 6] {
        let c = self.cursor.to_le_bytes();
        [
            self.report_id,
            self.version,
            self.busy_flags.bits(),
            c[0],
            c[1],
            result,
        ]
    }

    /// HID status report: `[report id, busy flags, version, page size (LE)]`.
    pub fn to_hid(&self, page_size: u16) -> [u8; 5] {
        let p = page_size.to_le_bytes();
        [
            self.report_id,
            self.busy_flags.bits(),
            self.version,
            p[0],
            p[1],
        ]
    }
}

/// Fixed-size HID response report:
/// `[report id, echoed opcode or 0xFF, payload...]`.
pub struct ResponseReport {
    data: [u8; RESPONSE_REPORT_SIZE + 1],
}

impl ResponseReport {
    /// Empty report, marked as failed until a command succeeds.
    pub const fn new() -> Self {
        let mut data = [0; RESPONSE_REPORT_SIZE + 1];
        data[0] = RESPONSE_REPORT_ID;
        data[1] = RESULT_FAILED;
        Self { data }
    }

    /// Zero the payload before a new command writes to it.
    pub fn begin(&mut self) -> &mut [u8] {
        self.data[2..].fill(0);
        &mut self.data[2..2 + RESPONSE_PAYLOAD_SIZE]
    }

    /// Command succeeded, echo its opcode.
    pub fn succeed(&mut self, opcode: u8) {
        self.data[1] = opcode;
    }

    /// Command failed.
    pub fn fail(&mut self) {
        self.data[1] = RESULT_FAILED;
    }

    /// Echoed opcode, or [`RESULT_FAILED`].
    pub fn result(&self) -> u8 {
        self.data[1]
    }

    /// Whole report including the id byte.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Default for ResponseReport {
    fn default() -> Self {
        Self::new()
    }
}
