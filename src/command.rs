use usb_device::control::Request;

use crate::error::Error;

/// Length of a command record: opcode followed by 4 parameter bytes.
pub const RECORD_LEN: usize = 5;

/// Loader command set.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Opcode {
    /// No-op, report device status.
    Nop = 0x00,
    /// Move the page buffer cursor.
    SetPointer = 0x01,
    /// Read a window of the application section.
    ReadFlash = 0x02,
    /// Erase the whole application section.
    EraseAppSection = 0x03,
    /// Application and boot section CRCs.
    ReadFlashCrcs = 0x04,
    /// Device and revision IDs.
    ReadMcuIds = 0x05,
    /// Fuse bytes.
    ReadFuses = 0x06,
    /// Program the page buffer to an application section page.
    WritePage = 0x07,
    /// Erase the user signature row.
    EraseUserSigRow = 0x08,
    /// Program the page buffer to the user signature row.
    WriteUserSigRow = 0x09,
    /// Read a window of the user signature row.
    ReadUserSigRow = 0x0A,
    /// Device serial number as an ASCII string.
    ReadSerial = 0x0B,
    /// Reset the MCU.
    ResetMcu = 0x0C,
    /// Read a window of EEPROM.
    ReadEeprom = 0x0D,
    /// Program the page buffer to an EEPROM page.
    WriteEepromPage = 0x0E,
    /// CRC of the whole EEPROM.
    ReadEepromCrc = 0x0F,
}

impl TryFrom<u8> for Opcode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        Ok(match value {
            0x00 => Opcode::Nop,
            0x01 => Opcode::SetPointer,
            0x02 => Opcode::ReadFlash,
            0x03 => Opcode::EraseAppSection,
            0x04 => Opcode::ReadFlashCrcs,
            0x05 => Opcode::ReadMcuIds,
            0x06 => Opcode::ReadFuses,
            0x07 => Opcode::WritePage,
            0x08 => Opcode::EraseUserSigRow,
            0x09 => Opcode::WriteUserSigRow,
            0x0A => Opcode::ReadUserSigRow,
            0x0B => Opcode::ReadSerial,
            0x0C => Opcode::ResetMcu,
            0x0D => Opcode::ReadEeprom,
            0x0E => Opcode::WriteEepromPage,
            0x0F => Opcode::ReadEepromCrc,
            _ => return Err(Error::UnsupportedCommand),
        })
    }
}

/// A parsed command: opcode and 4 parameter bytes.
///
/// Parameters are read as one `u32`, two `u16` or four `u8` values,
/// all little-endian, depending on the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Command {
    opcode: Opcode,
    params: [u8; 4],
}

impl Command {
    /// Creates a command from its parts.
    pub const fn new(opcode: Opcode, params: [u8; 4]) -> Self {
        Self { opcode, params }
    }

    /// Command with a `u32` parameter.
    pub const fn with_u32(opcode: Opcode, param: u32) -> Self {
        Self::new(opcode, param.to_le_bytes())
    }

    /// Parse a 5-byte record: opcode followed by parameters.
    pub fn from_record(record: &[u8]) -> Result<Self, Error> {
        if record.len() != RECORD_LEN {
            return Err(Error::MalformedRecord);
        }
        let opcode = Opcode::try_from(record[0])?;
        Ok(Self {
            opcode,
            params: [record[1], record[2], record[3], record[4]],
        })
    }

    /// Parse a SETUP packet: `bRequest` is the opcode, `wValue` and
    /// `wIndex` hold the parameters.
    pub fn from_request(req: &Request) -> Result<Self, Error> {
        let opcode = Opcode::try_from(req.request)?;
        let v = req.value.to_le_bytes();
        let i = req.index.to_le_bytes();
        Ok(Self {
            opcode,
            params: [v[0], v[1], i[0], i[1]],
        })
    }

    /// Command opcode.
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// All parameter bytes as one value.
    pub fn param_u32(&self) -> u32 {
        u32::from_le_bytes(self.params)
    }

    /// First (`0`) or second (`1`) parameter half.
    pub fn param_u16(&self, n: usize) -> u16 {
        u16::from_le_bytes([self.params[n * 2], self.params[n * 2 + 1]])
    }

    /// Single parameter byte.
    pub fn param_u8(&self, n: usize) -> u8 {
        self.params[n]
    }
}
