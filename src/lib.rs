#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
//!
//! Field firmware loader for a `usb-device` device.
//!
//! ## About
//!
//! The loader receives an application image from a host, stages it in RAM
//! one flash page at a time and commits it to the application section of
//! program memory. It also exposes read, erase and checksum commands for
//! flash, EEPROM and the signature rows, and decides at power-on whether
//! the device should run the installed application or stay in the loader.
//!
//! This library is a protocol implementation only. Code that actually
//! programs, erases or reads memory is provided by the library user
//! through the [`MemoryController`] trait, and boot-time hardware access
//! (magic word, reset vector, buttons, the jump itself) through
//! [`BootEnvironment`].
//!
//! ### Transports
//!
//! Two USB classes share the same command set:
//!
//! * [`HidLoaderClass`] - commands, page data and replies are HID feature
//!   reports exchanged over the control pipe.
//! * [`BulkLoaderClass`] - commands are vendor control requests, page data
//!   is streamed over a bulk OUT endpoint and replies are sent on a bulk IN
//!   endpoint.
//!
//! ### Commands
//!
//! See [`Opcode`] for the full list. Every command runs to completion
//! before the next one is accepted. Addresses and indexes are validated
//! before anything is passed to the memory controller, a rejected command
//! stalls the transfer and leaves memory and the page buffer untouched.
//!
//! ### Limitations
//!
//! * HID response report is 131 bytes long, so `usb-device` must be built
//! with the `control-buffer-256` feature. This crate enables it.
//!
//! * There is no recovery from a power loss in the middle of a page write.
//! The device has to be brought back to the loader with one of the boot
//! triggers.
//!
//! ## Example
//!
//! The example below tries to focus on [`HidLoaderClass`], parts related to
//! a target controller initialization (USB, clocks, NVM driver) are not in
//! the scope of the example.
//!
//! ```no_run
//! use usb_device::bus::{UsbBus, UsbBusAllocator};
//! use usb_device::prelude::*;
//! use usbd_xloader::*;
//!
//! // Loader uses Nvm to actually read, erase or program the memory.
//! // Constants describe the memory layout of the target.
//! struct Nvm;
//!
//! impl MemoryController for Nvm {
//!     const APP_SECTION_SIZE: u32 = 0x8000;
//!     const EEPROM_SIZE: u16 = 1024;
//!     const EEPROM_PAGE_SIZE: u16 = 32;
//!     const USER_SIGNATURE_SIZE: u16 = 256;
//!
//!     fn status(&mut self) -> NvmStatus { NvmStatus::empty() }
//! #   fn erase_application_section(&mut self) -> Result<(), MemError> { Ok(()) }
//! #   fn write_application_page(&mut self, _: u32, _: &[u8]) -> Result<(), MemError> { Ok(()) }
//! #   fn read_flash(&mut self, _: u32, _: &mut [u8]) -> Result<(), MemError> { Ok(()) }
//! #   fn application_crc(&mut self) -> Result<u32, MemError> { Ok(0) }
//! #   fn boot_crc(&mut self) -> Result<u32, MemError> { Ok(0) }
//! #   fn device_id(&mut self) -> [u8; 4] { [0x1e, 0x95, 0x4a, 0x41] }
//! #   fn read_fuse_byte(&mut self, _: u8) -> Option<u8> { None }
//! #   fn read_production_signature(&mut self, _: u8) -> u8 { 0 }
//! #   fn erase_user_signature_row(&mut self) -> Result<(), MemError> { Ok(()) }
//! #   fn write_user_signature_row(&mut self, _: &[u8]) -> Result<(), MemError> { Ok(()) }
//! #   fn read_user_signature_byte(&mut self, _: u16) -> u8 { 0xff }
//! #   fn enable_eeprom_mapping(&mut self) {}
//! #   fn disable_eeprom_mapping(&mut self) {}
//! #   fn read_mapped_eeprom(&mut self, _: u16, _: &mut [u8]) -> Result<(), MemError> { Ok(()) }
//! #   fn write_eeprom_page(&mut self, _: u16, _: &[u8]) -> Result<(), MemError> { Ok(()) }
//! #   fn reset(&mut self) {}
//!     // ...
//! }
//!
//! fn run_loader<B: UsbBus>(usb_bus_alloc: &UsbBusAllocator<B>) -> ! {
//!     // 256 byte flash pages.
//!     let mut loader = HidLoaderClass::<_, _, 256>::new(usb_bus_alloc, Nvm);
//!
//!     let mut usb_dev = UsbDeviceBuilder::new(usb_bus_alloc, UsbVidPid(0x1209, 0x0001))
//!         .build();
//!
//!     loop {
//!         // usb_dev.poll() must be called periodically, usually from USB
//!         // interrupt handlers. Commands are executed from here.
//!         usb_dev.poll(&mut [&mut loader]);
//!     }
//! }
//! ```
//!
//! Before the USB stack is brought up, [`trigger::boot()`] decides whether
//! the application is started instead.
//!

/// Loader version reported in the device status.
pub const LOADER_VERSION: u8 = 1;

/// Page buffer that collects host chunks
pub mod buffer;
/// Bulk endpoint transport
pub mod bulk;
/// Command records and opcodes
pub mod command;
/// Error types
pub mod error;
/// HID feature report transport
pub mod hid;
/// Memory controller interface
pub mod memory;
/// Reply layouts
pub mod response;
/// Command dispatch
pub mod router;
/// Boot-time loader entry decision
pub mod trigger;

#[doc(inline)]
pub use crate::buffer::{PageBuffer, CHUNK_SIZE};
#[doc(inline)]
pub use crate::bulk::{BulkLoaderClass, BulkSession};
#[doc(inline)]
pub use crate::command::{Command, Opcode};
#[doc(inline)]
pub use crate::error::{Error, MemError};
#[doc(inline)]
pub use crate::hid::HidLoaderClass;
#[doc(inline)]
pub use crate::memory::{EepromMapping, MemoryController, NvmStatus};
#[doc(inline)]
pub use crate::response::{DeviceStatus, ResponseReport};
#[doc(inline)]
pub use crate::router::{CommandRouter, Reply};
#[doc(inline)]
pub use crate::trigger::{BootEnvironment, Decision, EntryReason};
