use bitflags::bitflags;

use crate::error::{Error, MemError};

bitflags! {
    /// NVM controller status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NvmStatus: u8 {
        /// A program, erase or CRC operation is in progress.
        const NVM_BUSY = 0x80;
        /// Flash section is busy.
        const FLASH_BUSY = 0x40;
        /// EEPROM page buffer holds loaded data.
        const EEPROM_LOAD = 0x02;
        /// Flash page buffer holds loaded data. Internal, never reported to the host.
        const FLASH_LOAD = 0x01;
    }
}

/// Trait that describes the NVM controller of the device.
///
/// Command router calls these functions to read, erase or program
/// memory, and uses provided constants to validate addresses before
/// anything is passed to the driver. Implementation may talk to real
/// hardware or simulate it.
///
/// Functions are thin wrappers over driver primitives: they do not wait
/// for the controller to become ready, the router does that with
/// [`status()`](MemoryController::status) before every operation that
/// needs it.
pub trait MemoryController {
    /// Absolute address of the first byte of the application section.
    const APP_SECTION_START: u32 = 0;

    /// Size of the application section in bytes.
    ///
    /// Must be a multiple of the page size used by the transport class.
    const APP_SECTION_SIZE: u32;

    /// EEPROM size in bytes.
    const EEPROM_SIZE: u16;

    /// EEPROM page size in bytes. Must not exceed the flash page size.
    ///
    /// Parts without EEPROM set both this and [`EEPROM_SIZE`](MemoryController::EEPROM_SIZE) to 0.
    const EEPROM_PAGE_SIZE: u16;

    /// User signature row size in bytes.
    const USER_SIGNATURE_SIZE: u16;

    /// Offset of the first lot number byte in the production signature row.
    const LOT_NUMBER_OFFSET: u8 = 0x08;

    /// How many times [`status()`](MemoryController::status) is polled while
    /// waiting for the controller before the command fails with [`Error::Busy`].
    const BUSY_POLL_LIMIT: u32 = 1_000_000;

    /// Read NVM controller status register.
    fn status(&mut self) -> NvmStatus;

    /// Erase the whole application section.
    fn erase_application_section(&mut self) -> Result<(), MemError>;

    /// Load `page` to the flash page buffer and program it at `address`.
    ///
    /// `address` is absolute and page aligned, `page` is exactly one page.
    fn write_application_page(&mut self, address: u32, page: &[u8]) -> Result<(), MemError>;

    /// Read program memory starting at absolute `address` to `dst`.
    fn read_flash(&mut self, address: u32, dst: &mut [u8]) -> Result<(), MemError>;

    /// CRC of the application section, computed by the controller.
    fn application_crc(&mut self) -> Result<u32, MemError>;

    /// CRC of the boot section, computed by the controller.
    fn boot_crc(&mut self) -> Result<u32, MemError>;

    /// Device ID bytes 0 to 2 followed by the revision ID.
    fn device_id(&mut self) -> [u8; 4];

    /// Read a fuse byte. `None` if the part does not have this fuse.
    fn read_fuse_byte(&mut self, index: u8) -> Option<u8>;

    /// Read a byte of the production signature (calibration) row.
    fn read_production_signature(&mut self, offset: u8) -> u8;

    /// Erase the user signature row.
    fn erase_user_signature_row(&mut self) -> Result<(), MemError>;

    /// Load `page` to the flash page buffer and program the user signature row.
    fn write_user_signature_row(&mut self, page: &[u8]) -> Result<(), MemError>;

    /// Read a byte of the user signature row.
    fn read_user_signature_byte(&mut self, offset: u16) -> u8;

    /// Map EEPROM into data memory space.
    fn enable_eeprom_mapping(&mut self);

    /// Remove EEPROM from data memory space.
    fn disable_eeprom_mapping(&mut self);

    /// Copy mapped EEPROM starting at `offset` to `dst`.
    ///
    /// Only called between [`enable_eeprom_mapping()`](MemoryController::enable_eeprom_mapping)
    /// and [`disable_eeprom_mapping()`](MemoryController::disable_eeprom_mapping).
    fn read_mapped_eeprom(&mut self, offset: u16, dst: &mut [u8]) -> Result<(), MemError>;

    /// Load `page` to the EEPROM page buffer and atomically erase and write EEPROM page `index`.
    fn write_eeprom_page(&mut self, index: u16, page: &[u8]) -> Result<(), MemError>;

    /// Arm a watchdog or software reset.
    ///
    /// This function may not return.
    fn reset(&mut self);
}

/// Spin until the controller clears [`NvmStatus::NVM_BUSY`].
pub(crate) fn wait_ready<M: MemoryController>(mem: &mut M) -> Result<(), Error> {
    for _ in 0..M::BUSY_POLL_LIMIT {
        if !mem.status().contains(NvmStatus::NVM_BUSY) {
            return Ok(());
        }
    }
    log::warn!("NVM controller still busy after {} polls", M::BUSY_POLL_LIMIT);
    Err(Error::Busy)
}

/// Memory-mapped EEPROM view. Mapping is disabled when the guard is dropped.
pub struct EepromMapping<'m, M: MemoryController> {
    mem: &'m mut M,
}

impl<'m, M: MemoryController> EepromMapping<'m, M> {
    /// Enable mapping for the lifetime of the guard.
    pub fn new(mem: &'m mut M) -> Self {
        mem.enable_eeprom_mapping();
        Self { mem }
    }

    /// Copy EEPROM starting at `offset` to `dst`.
    pub fn read(&mut self, offset: u16, dst: &mut [u8]) -> Result<(), MemError> {
        self.mem.read_mapped_eeprom(offset, dst)
    }
}

impl<M: MemoryController> Drop for EepromMapping<'_, M> {
    fn drop(&mut self) {
        self.mem.disable_eeprom_mapping();
    }
}
