use core::cmp::min;

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::buffer::{PageBuffer, CHUNK_SIZE};
use crate::command::{Command, Opcode};
use crate::error::Error;
use crate::memory::{wait_ready, EepromMapping, MemoryController, NvmStatus};
use crate::response::{DeviceStatus, STATUS_REPORT_ID};
use crate::LOADER_VERSION;

const EEPROM_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

const FUSE_COUNT: usize = 6;

// 6 lot bytes, '-', wafer byte, '-', 4 coordinate bytes, NUL
const SERIAL_LEN: usize = 25;
const SERIAL_SOURCE_BYTES: u8 = 11;

/// What a successfully dispatched command hands back to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Device status, for a no-op command.
    Status(DeviceStatus),
    /// This many bytes at the start of the payload window are the reply.
    Payload(usize),
    /// Command has no reply data.
    Ack,
}

/// Decodes commands and runs them against the memory controller.
///
/// Router does not own the page buffer, it is passed to
/// [`dispatch()`](CommandRouter::dispatch) by the transport which owns
/// both, so all buffer and controller access happens from one place.
pub struct CommandRouter<M: MemoryController> {
    mem: M,
}

impl<M: MemoryController> CommandRouter<M> {
    /// Creates a router for the given memory controller.
    pub fn new(mem: M) -> Self {
        Self { mem }
    }

    /// Memory controller.
    pub fn memory(&self) -> &M {
        &self.mem
    }

    /// Memory controller, mutable.
    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.mem
    }

    /// Current device status.
    pub fn status<const P: usize>(&mut self, buffer: &PageBuffer<P>) -> DeviceStatus {
        DeviceStatus {
            report_id: STATUS_REPORT_ID,
            version: LOADER_VERSION,
            busy_flags: self.mem.status().difference(NvmStatus::FLASH_LOAD),
            cursor: buffer.cursor(),
        }
    }

    /// Run one command to completion.
    ///
    /// `payload` is the transport's reply window, read-style commands
    /// return at most `payload.len()` bytes. Parameters are validated
    /// before anything is passed to the memory controller, a rejected
    /// command leaves memory, buffer and cursor untouched.
    pub fn dispatch<const P: usize>(
        &mut self,
        cmd: Command,
        buffer: &mut PageBuffer<P>,
        payload: &mut [u8],
    ) -> Result<Reply, Error> {
        const {
            assert!(
                M::APP_SECTION_SIZE % P as u32 == 0,
                "application section must be a whole number of pages"
            );
            assert!(
                M::EEPROM_PAGE_SIZE as usize <= P,
                "EEPROM page must fit in the page buffer"
            );
        }

        log::debug!("command {:?} param {:#010x}", cmd.opcode(), cmd.param_u32());

        let r = self.execute(cmd, buffer, payload);
        if let Err(e) = &r {
            log::warn!("command {:?} rejected: {}", cmd.opcode(), e);
        }
        r
    }

    fn execute<const P: usize>(
        &mut self,
        cmd: Command,
        buffer: &mut PageBuffer<P>,
        payload: &mut [u8],
    ) -> Result<Reply, Error> {
        match cmd.opcode() {
            Opcode::Nop => Ok(Reply::Status(self.status(buffer))),
            Opcode::SetPointer => buffer.set_cursor(cmd.param_u16(0)).map(|_| Reply::Ack),
            Opcode::ReadFlash => self.read_flash(cmd.param_u32(), payload),
            Opcode::EraseAppSection => {
                wait_ready(&mut self.mem)?;
                self.mem.erase_application_section()?;
                Ok(Reply::Ack)
            }
            Opcode::ReadFlashCrcs => self.read_crcs(payload),
            Opcode::ReadMcuIds => {
                let id = self.mem.device_id();
                put(payload, &id)
            }
            Opcode::ReadFuses => {
                let mut fuses = [0xff; FUSE_COUNT];
                for (i, f) in fuses.iter_mut().enumerate() {
                    *f = self.mem.read_fuse_byte(i as u8).unwrap_or(0xff);
                }
                put(payload, &fuses)
            }
            Opcode::WritePage => self.write_page(cmd.param_u16(0), buffer),
            Opcode::EraseUserSigRow => {
                wait_ready(&mut self.mem)?;
                self.mem.erase_user_signature_row()?;
                Ok(Reply::Ack)
            }
            Opcode::WriteUserSigRow => {
                wait_ready(&mut self.mem)?;
                self.mem.write_user_signature_row(buffer.page())?;
                Ok(Reply::Ack)
            }
            Opcode::ReadUserSigRow => self.read_user_signature(cmd.param_u16(0), payload),
            Opcode::ReadSerial => self.read_serial(payload),
            Opcode::ResetMcu => {
                log::info!("reset requested");
                // may not return
                self.mem.reset();
                Ok(Reply::Ack)
            }
            Opcode::ReadEeprom => self.read_eeprom(cmd.param_u16(0), payload),
            Opcode::WriteEepromPage => self.write_eeprom_page(cmd.param_u16(0), buffer),
            Opcode::ReadEepromCrc => self.eeprom_crc(payload),
        }
    }

    fn read_flash(&mut self, offset: u32, payload: &mut [u8]) -> Result<Reply, Error> {
        if offset >= M::APP_SECTION_SIZE {
            return Err(Error::OutOfRange);
        }
        let len = min(payload.len() as u32, M::APP_SECTION_SIZE - offset) as usize;

        wait_ready(&mut self.mem)?;
        self.mem
            .read_flash(M::APP_SECTION_START + offset, &mut payload[..len])?;
        Ok(Reply::Payload(len))
    }

    fn read_crcs(&mut self, payload: &mut [u8]) -> Result<Reply, Error> {
        wait_ready(&mut self.mem)?;
        let app = self.mem.application_crc()?.to_le_bytes();
        let boot = self.mem.boot_crc()?.to_le_bytes();

        let mut crcs = [0; 8];
        crcs[..4].copy_from_slice(&app);
        crcs[4..].copy_from_slice(&boot);
        put(payload, &crcs)
    }

    fn write_page<const P: usize>(
        &mut self,
        index: u16,
        buffer: &mut PageBuffer<P>,
    ) -> Result<Reply, Error> {
        let pages = M::APP_SECTION_SIZE / P as u32;
        if index as u32 >= pages {
            return Err(Error::OutOfRange);
        }

        wait_ready(&mut self.mem)?;
        let address = M::APP_SECTION_START + index as u32 * P as u32;
        self.mem.write_application_page(address, buffer.page())?;
        buffer.rewind();
        Ok(Reply::Ack)
    }

    fn read_user_signature(&mut self, offset: u16, payload: &mut [u8]) -> Result<Reply, Error> {
        if offset >= M::USER_SIGNATURE_SIZE {
            return Err(Error::OutOfRange);
        }
        let len = min(payload.len(), (M::USER_SIGNATURE_SIZE - offset) as usize);

        wait_ready(&mut self.mem)?;
        for (i, b) in payload[..len].iter_mut().enumerate() {
            *b = self.mem.read_user_signature_byte(offset + i as u16);
        }
        Ok(Reply::Payload(len))
    }

    fn read_serial(&mut self, payload: &mut [u8]) -> Result<Reply, Error> {
        let out = payload
            .get_mut(..SERIAL_LEN)
            .ok_or(Error::InvalidParameter)?;

        let mut j = 0;
        for i in 0..SERIAL_SOURCE_BYTES {
            if i == 6 || i == 7 {
                out[j] = b'-';
                j += 1;
            }
            let b = self
                .mem
                .read_production_signature(M::LOT_NUMBER_OFFSET + i);
            out[j] = hex_digit(b >> 4);
            out[j + 1] = hex_digit(b & 0x0f);
            j += 2;
        }
        out[j] = 0;

        Ok(Reply::Payload(SERIAL_LEN))
    }

    fn read_eeprom(&mut self, offset: u16, payload: &mut [u8]) -> Result<Reply, Error> {
        if offset >= M::EEPROM_SIZE {
            return Err(Error::OutOfRange);
        }
        let len = min(payload.len(), (M::EEPROM_SIZE - offset) as usize);

        wait_ready(&mut self.mem)?;
        let mut eeprom = EepromMapping::new(&mut self.mem);
        eeprom.read(offset, &mut payload[..len])?;
        Ok(Reply::Payload(len))
    }

    fn write_eeprom_page<const P: usize>(
        &mut self,
        index: u16,
        buffer: &PageBuffer<P>,
    ) -> Result<Reply, Error> {
        // parts without EEPROM have a zero page size
        let pages = M::EEPROM_SIZE
            .checked_div(M::EEPROM_PAGE_SIZE)
            .ok_or(Error::OutOfRange)?;
        if index >= pages {
            return Err(Error::OutOfRange);
        }

        wait_ready(&mut self.mem)?;
        let page = &buffer.page()[..M::EEPROM_PAGE_SIZE as usize];
        self.mem.write_eeprom_page(index, page)?;
        Ok(Reply::Ack)
    }

    fn eeprom_crc(&mut self, payload: &mut [u8]) -> Result<Reply, Error> {
        wait_ready(&mut self.mem)?;

        let mut digest = EEPROM_CRC.digest();
        let mut chunk = [0u8; CHUNK_SIZE];
        let mut eeprom = EepromMapping::new(&mut self.mem);
        let mut offset = 0;
        while offset < M::EEPROM_SIZE {
            let len = min(CHUNK_SIZE, (M::EEPROM_SIZE - offset) as usize);
            eeprom.read(offset, &mut chunk[..len])?;
            digest.update(&chunk[..len]);
            offset += len as u16;
        }
        drop(eeprom);

        put(payload, &digest.finalize().to_le_bytes())
    }
}

fn put(payload: &mut [u8], data: &[u8]) -> Result<Reply, Error> {
    payload
        .get_mut(..data.len())
        .ok_or(Error::InvalidParameter)?
        .copy_from_slice(data);
    Ok(Reply::Payload(data.len()))
}

fn hex_digit(nibble: u8) -> u8 {
    if nibble < 10 {
        b'0' + nibble
    } else {
        b'A' + nibble - 10
    }
}
