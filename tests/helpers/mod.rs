#![allow(dead_code)]
use crc::{Crc, CRC_32_ISO_HDLC};
use usb_device::class::UsbClass;
use usbd_class_tester::prelude::*;

use usbd_xloader::*;

pub const PAGE: usize = 128;
pub const APP_SIZE: u32 = 16 * 1024;
pub const BOOT_SIZE: u32 = 4 * 1024;
pub const EEPROM_SIZE: u16 = 512;
pub const EEPROM_PAGE: u16 = 32;
pub const USER_SIG_SIZE: u16 = 256;
pub const POLL_LIMIT: u32 = 100;

pub const DEVICE_ID: [u8; 4] = [0x1e, 0x95, 0x4a, 0x41];

pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

// Opcodes
pub const NOP: u8 = 0x00;
pub const SET_POINTER: u8 = 0x01;
pub const READ_FLASH: u8 = 0x02;
pub const ERASE_APP: u8 = 0x03;
pub const READ_CRCS: u8 = 0x04;
pub const READ_IDS: u8 = 0x05;
pub const READ_FUSES: u8 = 0x06;
pub const WRITE_PAGE: u8 = 0x07;
pub const ERASE_USER_SIG: u8 = 0x08;
pub const WRITE_USER_SIG: u8 = 0x09;
pub const READ_USER_SIG: u8 = 0x0a;
pub const READ_SERIAL: u8 = 0x0b;
pub const RESET_MCU: u8 = 0x0c;
pub const READ_EEPROM: u8 = 0x0d;
pub const WRITE_EEPROM_PAGE: u8 = 0x0e;
pub const READ_EEPROM_CRC: u8 = 0x0f;

/// Simulated NVM controller.
pub struct SimMem {
    pub flash: Vec<u8>,
    pub boot: Vec<u8>,
    pub eeprom: Vec<u8>,
    pub user_sig: Vec<u8>,
    pub prodsig: [u8; 64],
    pub fuses: [Option<u8>; 6],
    pub mapped: bool,
    pub mapping_enabled_count: usize,
    /// status() reports busy this many more times
    pub busy_polls: u32,
    /// status() always reports busy
    pub stuck: bool,
    pub status_reads: u32,
    pub hw_writes: usize,
    pub reset_requested: bool,
    pub fail_program: bool,
    pub fail_eeprom_read: bool,
}

impl SimMem {
    pub fn new() -> Self {
        let mut prodsig = [0u8; 64];
        // lot number
        prodsig[0x08..0x0e].copy_from_slice(&[0x31, 0x32, 0x33, 0x34, 0x35, 0x36]);
        // wafer number
        prodsig[0x0e] = 0x07;
        // wafer coordinates
        prodsig[0x0f..0x13].copy_from_slice(&[0x00, 0x1a, 0x00, 0x2b]);

        let mut boot = vec![0u8; BOOT_SIZE as usize];
        for (i, b) in boot.iter_mut().enumerate() {
            *b = i as u8;
        }

        let mut eeprom = vec![0xffu8; EEPROM_SIZE as usize];
        for (i, b) in eeprom.iter_mut().enumerate().take(16) {
            *b = i as u8;
        }

        Self {
            flash: vec![0xff; APP_SIZE as usize],
            boot,
            eeprom,
            user_sig: vec![0xff; USER_SIG_SIZE as usize],
            prodsig,
            fuses: [Some(0xff), Some(0x00), Some(0xfe), None, Some(0xf1), Some(0xe9)],
            mapped: false,
            mapping_enabled_count: 0,
            busy_polls: 0,
            stuck: false,
            status_reads: 0,
            hw_writes: 0,
            reset_requested: false,
            fail_program: false,
            fail_eeprom_read: false,
        }
    }

    pub fn app_crc(&self) -> u32 {
        CRC32.checksum(&self.flash)
    }
}

impl Default for SimMem {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryController for SimMem {
    const APP_SECTION_SIZE: u32 = APP_SIZE;
    const EEPROM_SIZE: u16 = EEPROM_SIZE;
    const EEPROM_PAGE_SIZE: u16 = EEPROM_PAGE;
    const USER_SIGNATURE_SIZE: u16 = USER_SIG_SIZE;
    const BUSY_POLL_LIMIT: u32 = POLL_LIMIT;

    fn status(&mut self) -> NvmStatus {
        self.status_reads += 1;
        // internal bit, must never be visible to the host
        let mut s = NvmStatus::FLASH_LOAD;
        if self.stuck || self.busy_polls > 0 {
            self.busy_polls = self.busy_polls.saturating_sub(1);
            s |= NvmStatus::NVM_BUSY;
        }
        s
    }

    fn erase_application_section(&mut self) -> Result<(), MemError> {
        self.hw_writes += 1;
        self.flash.fill(0xff);
        Ok(())
    }

    fn write_application_page(&mut self, address: u32, page: &[u8]) -> Result<(), MemError> {
        assert_eq!(page.len(), PAGE, "whole page is committed");
        assert_eq!(address as usize % PAGE, 0, "page aligned");
        if self.fail_program {
            return Err(MemError::Program);
        }
        self.hw_writes += 1;
        let start = address as usize;
        for (m, b) in self.flash[start..start + PAGE].iter_mut().zip(page) {
            // flash programming clears bits only
            *m &= *b;
        }
        Ok(())
    }

    fn read_flash(&mut self, address: u32, dst: &mut [u8]) -> Result<(), MemError> {
        let start = address as usize;
        dst.copy_from_slice(&self.flash[start..start + dst.len()]);
        Ok(())
    }

    fn application_crc(&mut self) -> Result<u32, MemError> {
        Ok(self.app_crc())
    }

    fn boot_crc(&mut self) -> Result<u32, MemError> {
        Ok(CRC32.checksum(&self.boot))
    }

    fn device_id(&mut self) -> [u8; 4] {
        DEVICE_ID
    }

    fn read_fuse_byte(&mut self, index: u8) -> Option<u8> {
        self.fuses.get(index as usize).copied().flatten()
    }

    fn read_production_signature(&mut self, offset: u8) -> u8 {
        self.prodsig[offset as usize]
    }

    fn erase_user_signature_row(&mut self) -> Result<(), MemError> {
        self.hw_writes += 1;
        self.user_sig.fill(0xff);
        Ok(())
    }

    fn write_user_signature_row(&mut self, page: &[u8]) -> Result<(), MemError> {
        self.hw_writes += 1;
        for (m, b) in self.user_sig.iter_mut().zip(page) {
            *m &= *b;
        }
        Ok(())
    }

    fn read_user_signature_byte(&mut self, offset: u16) -> u8 {
        self.user_sig[offset as usize]
    }

    fn enable_eeprom_mapping(&mut self) {
        assert!(!self.mapped, "mapping enabled twice");
        self.mapped = true;
        self.mapping_enabled_count += 1;
    }

    fn disable_eeprom_mapping(&mut self) {
        self.mapped = false;
    }

    fn read_mapped_eeprom(&mut self, offset: u16, dst: &mut [u8]) -> Result<(), MemError> {
        if !self.mapped || self.fail_eeprom_read {
            return Err(MemError::Read);
        }
        let start = offset as usize;
        dst.copy_from_slice(&self.eeprom[start..start + dst.len()]);
        Ok(())
    }

    fn write_eeprom_page(&mut self, index: u16, page: &[u8]) -> Result<(), MemError> {
        assert_eq!(page.len(), EEPROM_PAGE as usize);
        self.hw_writes += 1;
        let start = index as usize * EEPROM_PAGE as usize;
        // erase and write
        self.eeprom[start..start + page.len()].copy_from_slice(page);
        Ok(())
    }

    fn reset(&mut self) {
        self.reset_requested = true;
    }
}

/// Simulated boot environment.
pub struct SimBoot {
    pub magic: u32,
    pub reset_vector: [u8; 4],
    pub buttons: bool,
    pub buttons_configured: bool,
    pub buttons_restored: usize,
}

impl SimBoot {
    pub fn new() -> Self {
        Self {
            magic: 0,
            reset_vector: [0x0c, 0x94, 0x00, 0x01],
            buttons: false,
            buttons_configured: false,
            buttons_restored: 0,
        }
    }
}

impl BootEnvironment for SimBoot {
    fn read_magic(&mut self) -> u32 {
        self.magic
    }

    fn clear_magic(&mut self) {
        self.magic = 0;
    }

    fn read_reset_vector(&mut self) -> [u8; 4] {
        self.reset_vector
    }

    fn configure_buttons(&mut self) {
        self.buttons_configured = true;
    }

    fn buttons_held(&mut self) -> bool {
        assert!(self.buttons_configured, "buttons sampled before configuration");
        self.buttons
    }

    fn restore_buttons(&mut self) {
        self.buttons_configured = false;
        self.buttons_restored += 1;
    }

    unsafe fn jump_to_application(&mut self) -> ! {
        panic!("emulate jump to application");
    }
}

pub const HID_GET_REPORT: u8 = 0x01;
pub const HID_SET_REPORT: u8 = 0x09;
// feature report type in wValue high byte
pub const FEATURE: u16 = 0x0300;

pub const RESPONSE_LEN: u16 = 131;

// bulk OUT and bulk IN both get endpoint number 1
pub const EP_BULK: usize = 1;

pub trait DeviceExt<C> {
    fn set_report(&mut self, cls: &mut C, data: &[u8]) -> AnyResult<Vec<u8>>;
    fn get_report(&mut self, cls: &mut C, id: u8, length: u16) -> AnyResult<Vec<u8>>;

    fn loader_command(&mut self, cls: &mut C, opcode: u8, param: u32) -> AnyResult<Vec<u8>>;
    fn page_data(&mut self, cls: &mut C, ptr: u16, data: &[u8]) -> AnyResult<Vec<u8>>;
    fn status_report(&mut self, cls: &mut C) -> AnyResult<Vec<u8>>;
    fn response_report(&mut self, cls: &mut C) -> AnyResult<Vec<u8>>;

    fn vendor_command(&mut self, cls: &mut C, opcode: u8, param: u32) -> AnyResult<Vec<u8>>;
    fn bulk_write(&mut self, cls: &mut C, data: &[u8]) -> AnyResult<()>;
    fn bulk_read(&mut self, cls: &mut C) -> AnyResult<Vec<u8>>;
}

impl<'a, C, M> DeviceExt<C> for Device<'a, C, M>
where
    C: UsbClass<EmulatedUsbBus>,
    M: UsbDeviceCtx<C<'a> = C>,
{
    fn set_report(&mut self, cls: &mut C, data: &[u8]) -> AnyResult<Vec<u8>> {
        if data.len() > u16::MAX as usize || data.is_empty() {
            return Err(AnyUsbError::DataConversion);
        }
        self.control_write(
            cls,
            CtrRequestType::to_device().class().interface(),
            HID_SET_REPORT,
            FEATURE | data[0] as u16,
            0,
            data.len() as u16,
            data,
        )
    }

    fn get_report(&mut self, cls: &mut C, id: u8, length: u16) -> AnyResult<Vec<u8>> {
        self.control_read(
            cls,
            CtrRequestType::to_host().class().interface(),
            HID_GET_REPORT,
            FEATURE | id as u16,
            0,
            length,
        )
    }

    fn loader_command(&mut self, cls: &mut C, opcode: u8, param: u32) -> AnyResult<Vec<u8>> {
        let p = param.to_le_bytes();
        self.set_report(cls, &[1, opcode, p[0], p[1], p[2], p[3]])
    }

    fn page_data(&mut self, cls: &mut C, ptr: u16, data: &[u8]) -> AnyResult<Vec<u8>> {
        let mut report = vec![2];
        report.extend_from_slice(&ptr.to_le_bytes());
        report.extend_from_slice(data);
        self.set_report(cls, &report)
    }

    fn status_report(&mut self, cls: &mut C) -> AnyResult<Vec<u8>> {
        self.get_report(cls, 1, 5)
    }

    fn response_report(&mut self, cls: &mut C) -> AnyResult<Vec<u8>> {
        self.get_report(cls, 2, RESPONSE_LEN)
    }

    fn vendor_command(&mut self, cls: &mut C, opcode: u8, param: u32) -> AnyResult<Vec<u8>> {
        self.control_write(
            cls,
            CtrRequestType::to_device().vendor().device(),
            opcode,
            (param & 0xffff) as u16,
            (param >> 16) as u16,
            0,
            &[],
        )
    }

    fn bulk_write(&mut self, cls: &mut C, data: &[u8]) -> AnyResult<()> {
        self.ep_write(cls, EP_BULK, data)?;
        Ok(())
    }

    fn bulk_read(&mut self, cls: &mut C) -> AnyResult<Vec<u8>> {
        self.ep_read(cls, EP_BULK, 64)
    }
}
