use usb_device::class_prelude::*;
use usb_device::control::{Recipient, RequestType};

use crate::buffer::{PageBuffer, CHUNK_SIZE};
use crate::command::Command;
use crate::error::{Error, RESULT_OK};
use crate::memory::MemoryController;
use crate::router::{CommandRouter, Reply};

const USB_CLASS_VENDOR: u8 = 0xff;

/// Transport-independent half of [`BulkLoaderClass`]: runs commands,
/// collects streamed page data and stages the reply for the IN endpoint.
pub struct BulkSession<M: MemoryController, const PAGE_SIZE: usize> {
    router: CommandRouter<M>,
    buffer: PageBuffer<PAGE_SIZE>,
    reply: [u8; CHUNK_SIZE],
    reply_len: usize,
}

impl<M: MemoryController, const PAGE_SIZE: usize> BulkSession<M, PAGE_SIZE> {
    /// Creates a session with an empty page buffer.
    pub fn new(mem: M) -> Self {
        Self {
            router: CommandRouter::new(mem),
            buffer: PageBuffer::new(),
            reply: [0; CHUNK_SIZE],
            reply_len: 0,
        }
    }

    /// Run a command and stage its reply.
    ///
    /// No-op stages the 6-byte status record, read-style commands stage
    /// their payload, everything else stages nothing. A failed command
    /// stages nothing and the caller is expected to stall.
    pub fn command(&mut self, cmd: Command) -> Result<(), Error> {
        self.reply_len = 0;

        match self.router.dispatch(cmd, &mut self.buffer, &mut self.reply)? {
            Reply::Status(status) => {
                let s = status.to_bulk(RESULT_OK);
                self.reply[..s.len()].copy_from_slice(&s);
                self.reply_len = s.len();
            }
            Reply::Payload(len) => self.reply_len = len,
            Reply::Ack => {}
        }
        Ok(())
    }

    /// Append a bulk OUT packet to the page buffer.
    pub fn data(&mut self, chunk: &[u8]) {
        self.buffer.append(chunk);
    }

    /// Reply staged by the last command, empty if there is none.
    pub fn reply(&self) -> &[u8] {
        &self.reply[..self.reply_len]
    }

    /// Drop the staged reply.
    pub fn clear_reply(&mut self) {
        self.reply_len = 0;
    }

    /// Page buffer fill cursor.
    pub fn cursor(&self) -> u16 {
        self.buffer.cursor()
    }

    /// Memory controller.
    pub fn memory(&self) -> &M {
        self.router.memory()
    }

    /// Memory controller, mutable.
    pub fn memory_mut(&mut self) -> &mut M {
        self.router.memory_mut()
    }
}

/// Loader class with a vendor interface and a pair of bulk endpoints.
///
/// Commands are vendor control requests to the device: `bRequest` is the
/// opcode, `wValue` and `wIndex` carry the parameters. Page data is
/// written to the bulk OUT endpoint in 64-byte packets. Replies are sent
/// on the bulk IN endpoint.
pub struct BulkLoaderClass<'a, B: UsbBus, M: MemoryController, const PAGE_SIZE: usize> {
    if_num: InterfaceNumber,
    ep_out: EndpointOut<'a, B>,
    ep_in: EndpointIn<'a, B>,
    session: BulkSession<M, PAGE_SIZE>,
    pending: bool,
}

impl<B: UsbBus, M: MemoryController, const PAGE_SIZE: usize> UsbClass<B>
    for BulkLoaderClass<'_, B, M, PAGE_SIZE>
{
    fn get_configuration_descriptors(
        &self,
        writer: &mut DescriptorWriter,
    ) -> usb_device::Result<()> {
        writer.interface(self.if_num, USB_CLASS_VENDOR, 0, 0)?;
        writer.endpoint(&self.ep_out)?;
        writer.endpoint(&self.ep_in)?;
        Ok(())
    }

    fn control_out(&mut self, xfer: ControlOut<B>) {
        let req = *xfer.request();

        if req.request_type != RequestType::Vendor {
            return;
        }

        if req.recipient != Recipient::Device {
            return;
        }

        let r = Command::from_request(&req).and_then(|cmd| self.session.command(cmd));
        match r {
            Ok(()) => {
                xfer.accept().ok();
                self.pending = !self.session.reply().is_empty();
                self.flush();
            }
            Err(e) => {
                log::warn!("request {:#04x} stalled: {}", req.request, e);
                self.pending = false;
                xfer.reject().ok();
            }
        }
    }

    fn endpoint_out(&mut self, addr: EndpointAddress) {
        if addr != self.ep_out.address() {
            return;
        }

        let mut chunk = [0u8; CHUNK_SIZE];
        match self.ep_out.read(&mut chunk) {
            Ok(len) => self.session.data(&chunk[..len]),
            Err(UsbError::WouldBlock) => {}
            Err(e) => log::warn!("bulk OUT read failed: {:?}", e),
        }
    }

    fn endpoint_in_complete(&mut self, addr: EndpointAddress) {
        if addr == self.ep_in.address() {
            self.flush();
        }
    }

    fn reset(&mut self) {
        self.pending = false;
        self.session.clear_reply();
    }

    fn poll(&mut self) {
        self.flush();
    }
}

impl<'a, B: UsbBus, M: MemoryController, const PAGE_SIZE: usize>
    BulkLoaderClass<'a, B, M, PAGE_SIZE>
{
    /// Creates a new BulkLoaderClass with the provided UsbBus and
    /// MemoryController
    pub fn new(alloc: &'a UsbBusAllocator<B>, mem: M) -> Self {
        Self {
            if_num: alloc.interface(),
            ep_out: alloc.bulk(CHUNK_SIZE as u16),
            ep_in: alloc.bulk(CHUNK_SIZE as u16),
            session: BulkSession::new(mem),
            pending: false,
        }
    }

    /// Command session.
    pub fn session(&self) -> &BulkSession<M, PAGE_SIZE> {
        &self.session
    }

    /// `true` while a reply is waiting for the IN endpoint.
    pub fn reply_pending(&self) -> bool {
        self.pending
    }

    fn flush(&mut self) {
        if !self.pending {
            return;
        }

        match self.ep_in.write(self.session.reply()) {
            Ok(_) => {
                self.pending = false;
            }
            Err(UsbError::WouldBlock) => {}
            Err(e) => {
                log::warn!("bulk IN write failed: {:?}", e);
                self.pending = false;
            }
        }
    }
}
