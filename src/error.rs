use core::fmt;

/// Result byte reported for a successful command.
pub const RESULT_OK: u8 = 0x00;

/// Result byte reported for any rejected or failed command.
pub const RESULT_FAILED: u8 = 0xFF;

/// Errors reported by the memory controller driver.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MemError {
    /// Page or section erase failed.
    Erase = 0x01,
    /// Page program failed.
    Program = 0x02,
    /// Memory could not be read.
    Read = 0x03,
    /// Something went wrong, but the driver does not know what it was.
    Unknown = 0x0E,
}

/// Errors that reject a command.
///
/// None of them are retried. Transports translate every error into
/// [`RESULT_FAILED`] and a protocol stall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Address, page index or offset is past the end of the addressed region.
    OutOfRange,
    /// Opcode is not part of the command set.
    UnsupportedCommand,
    /// Command record has the wrong length.
    MalformedRecord,
    /// Parameter is malformed for the command, e.g. a cursor past the page end.
    InvalidParameter,
    /// Memory controller did not become ready within the poll limit.
    Busy,
    /// Memory controller driver failed.
    Memory(MemError),
}

impl From<MemError> for Error {
    fn from(e: MemError) -> Self {
        Error::Memory(e)
    }
}

impl fmt::Display for MemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Erase => write!(f, "erase failed"),
            Self::Program => write!(f, "program failed"),
            Self::Read => write!(f, "read failed"),
            Self::Unknown => write!(f, "unknown memory error"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange => write!(f, "address out of range"),
            Self::UnsupportedCommand => write!(f, "unsupported command"),
            Self::MalformedRecord => write!(f, "malformed command record"),
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::Busy => write!(f, "memory controller busy"),
            Self::Memory(e) => write!(f, "memory error: {}", e),
        }
    }
}
