use usb_device::class_prelude::*;
use usb_device::control::{Recipient, Request, RequestType};

use crate::buffer::PageBuffer;
use crate::command::{Command, RECORD_LEN};
use crate::error::Error;
use crate::memory::MemoryController;
use crate::response::{ResponseReport, RESPONSE_REPORT_ID, STATUS_REPORT_ID};
use crate::router::{CommandRouter, Reply};

const USB_CLASS_HID: u8 = 0x03;

const HID_GET_REPORT: u8 = 0x01;
const HID_SET_REPORT: u8 = 0x09;

const DESC_TYPE_HID: u8 = 0x21;
const DESC_TYPE_REPORT: u8 = 0x22;

/// Vendor-defined report descriptor: feature report 1 (command record and
/// status, 5 bytes) and feature report 2 (page data and response, 130 bytes).
pub const REPORT_DESCRIPTOR: &[u8] = &[
    0x06, 0x00, 0xff, // Usage Page (Vendor Defined 0xFF00)
    0x09, 0x01, // Usage (0x01)
    0xa1, 0x01, // Collection (Application)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xff, 0x00, //   Logical Maximum (255)
    0x75, 0x08, //   Report Size (8)
    0x85, STATUS_REPORT_ID, //   Report ID
    0x95, RECORD_LEN as u8, //   Report Count
    0x09, 0x01, //   Usage (0x01)
    0xb1, 0x02, //   Feature (Data,Var,Abs)
    0x85, RESPONSE_REPORT_ID, //   Report ID
    0x95, 0x82, //   Report Count (130)
    0x09, 0x02, //   Usage (0x02)
    0xb1, 0x02, //   Feature (Data,Var,Abs)
    0xc0, // End Collection
];

// report id, pointer (LE)
const DATA_HEADER_LEN: usize = 3;

/// Loader class that talks over HID feature reports.
///
/// Host sends `SET_REPORT` with report 1 `[1, opcode, p0, p1, p2, p3]` to
/// run a command and reads the outcome with `GET_REPORT` for report 2.
/// Page data is sent as report 2 `[2, ptr_lo, ptr_hi, data...]` and lands
/// in the page buffer at `ptr`. `GET_REPORT` for report 1 returns
/// `[1, busy flags, version, page size (LE)]`.
///
/// `PAGE_SIZE` is the flash page size of the target.
pub struct HidLoaderClass<'a, B: UsbBus, M: MemoryController, const PAGE_SIZE: usize> {
    if_num: InterfaceNumber,
    // required by HID, never written
    ep_in: EndpointIn<'a, B>,
    router: CommandRouter<M>,
    buffer: PageBuffer<PAGE_SIZE>,
    response: ResponseReport,
}

impl<B: UsbBus, M: MemoryController, const PAGE_SIZE: usize> UsbClass<B>
    for HidLoaderClass<'_, B, M, PAGE_SIZE>
{
    fn get_configuration_descriptors(
        &self,
        writer: &mut DescriptorWriter,
    ) -> usb_device::Result<()> {
        writer.interface(self.if_num, USB_CLASS_HID, 0, 0)?;

        let len = (REPORT_DESCRIPTOR.len() as u16).to_le_bytes();
        writer.write(
            DESC_TYPE_HID,
            &[
                // bcdHID 1.11
                0x11,
                0x01,
                // bCountryCode
                0,
                // bNumDescriptors
                1,
                DESC_TYPE_REPORT,
                len[0],
                len[1],
            ],
        )?;

        writer.endpoint(&self.ep_in)?;

        Ok(())
    }

    fn control_in(&mut self, xfer: ControlIn<B>) {
        let req = *xfer.request();

        if req.recipient != Recipient::Interface {
            return;
        }

        if req.index != u8::from(self.if_num) as u16 {
            return;
        }

        match req.request_type {
            RequestType::Standard => {
                if req.request == Request::GET_DESCRIPTOR
                    && (req.value >> 8) as u8 == DESC_TYPE_REPORT
                {
                    xfer.accept_with_static(REPORT_DESCRIPTOR).ok();
                }
            }
            RequestType::Class => match req.request {
                HID_GET_REPORT => self.get_report(xfer, req),
                _ => {
                    xfer.reject().ok();
                }
            },
            _ => {}
        }
    }

    fn control_out(&mut self, xfer: ControlOut<B>) {
        let req = *xfer.request();

        if req.request_type != RequestType::Class {
            return;
        }

        if req.recipient != Recipient::Interface {
            return;
        }

        if req.index != u8::from(self.if_num) as u16 {
            return;
        }

        if req.request != HID_SET_REPORT {
            xfer.reject().ok();
            return;
        }

        let data = xfer.data();
        let r = match data.first() {
            Some(&STATUS_REPORT_ID) => self.run_command(&data[1..]),
            Some(&RESPONSE_REPORT_ID) => self.store_data(data),
            _ => Err(Error::MalformedRecord),
        };

        match r {
            Ok(()) => {
                xfer.accept().ok();
            }
            Err(_) => {
                xfer.reject().ok();
            }
        }
    }
}

impl<'a, B: UsbBus, M: MemoryController, const PAGE_SIZE: usize>
    HidLoaderClass<'a, B, M, PAGE_SIZE>
{
    /// Creates a new HidLoaderClass with the provided UsbBus and
    /// MemoryController
    pub fn new(alloc: &'a UsbBusAllocator<B>, mem: M) -> Self {
        Self {
            if_num: alloc.interface(),
            ep_in: alloc.interrupt(8, 10),
            router: CommandRouter::new(mem),
            buffer: PageBuffer::new(),
            response: ResponseReport::new(),
        }
    }

    /// Memory controller.
    pub fn memory(&self) -> &M {
        self.router.memory()
    }

    /// Page buffer fill cursor.
    pub fn cursor(&self) -> u16 {
        self.buffer.cursor()
    }

    /// Last response report.
    pub fn response(&self) -> &ResponseReport {
        &self.response
    }

    fn run_command(&mut self, record: &[u8]) -> Result<(), Error> {
        let payload = self.response.begin();

        let r = Command::from_record(record).and_then(|cmd| {
            match self.router.dispatch(cmd, &mut self.buffer, payload)? {
                Reply::Status(status) => {
                    let s = status.to_hid(PAGE_SIZE as u16);
                    payload[..s.len()].copy_from_slice(&s);
                }
                Reply::Payload(_) | Reply::Ack => {}
            }
            Ok(cmd)
        });

        match r {
            Ok(cmd) => {
                self.response.succeed(cmd.opcode() as u8);
                Ok(())
            }
            Err(e) => {
                self.response.fail();
                Err(e)
            }
        }
    }

    fn store_data(&mut self, report: &[u8]) -> Result<(), Error> {
        if report.len() < DATA_HEADER_LEN {
            return Err(Error::MalformedRecord);
        }
        let ptr = u16::from_le_bytes([report[1], report[2]]);
        self.buffer.write_at(ptr, &report[DATA_HEADER_LEN..])
    }

    fn get_report(&mut self, xfer: ControlIn<B>, req: Request) {
        match (req.value & 0xff) as u8 {
            STATUS_REPORT_ID => {
                let status = self.router.status(&self.buffer);
                xfer.accept_with(&status.to_hid(PAGE_SIZE as u16)).ok();
            }
            RESPONSE_REPORT_ID => {
                xfer.accept_with(self.response.as_bytes()).ok();
            }
            _ => {
                xfer.reject().ok();
            }
        }
    }
}
