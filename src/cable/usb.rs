//! Raw USB access to FTDI chips through libusb, with no vendor driver involved.  `FtdiUsb`
//! claims one channel of the chip, switches it into MPSSE mode and moves bytes over the bulk
//! endpoints.
use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use std::time::Duration;

use log::{debug, info, warn};
use rusb::{DeviceDescriptor, DeviceHandle, GlobalContext, Recipient, RequestType};

use crate::cable::config::{CableConfig, DeviceSelector, Interface};
use crate::cable::mpsse::{ChipType, FtdiPort, Mpsse};
use crate::error::{Error, Result};

const SIO_RESET_REQUEST: u8 = 0x00;
const SIO_SET_LATENCY_TIMER_REQUEST: u8 = 0x09;
const SIO_SET_BITMODE_REQUEST: u8 = 0x0b;

const SIO_RESET_SIO: u16 = 0;
const SIO_RESET_PURGE_RX: u16 = 1;
const SIO_RESET_PURGE_TX: u16 = 2;

const BITMODE_RESET: u8 = 0x00;
const BITMODE_MPSSE: u8 = 0x02;

/// Latency timer in ms; the chip sends a partial packet after this long
const LATENCY_MS: u16 = 1;

const WRITE_TIMEOUT: Duration = Duration::from_secs(1);
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// An attached adapter, as reported by `list`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub bus: u8,
    pub addr: u8,
    pub vid: u16,
    pub pid: u16,
    /// `None` when the device could not be opened to read it
    pub serial: Option<String>,
    pub chip: Option<ChipType>,
}

fn bcd_device(desc: &DeviceDescriptor) -> u16 {
    let v = desc.device_version();
    (u16::from(v.major()) << 8) | (u16::from(v.minor()) << 4) | u16::from(v.sub_minor())
}

/// Enumerate the adapters with the given USB identifiers
pub fn list(vid: u16, pid: u16) -> Result<Vec<DeviceInfo>> {
    let mut found = Vec::new();
    for device in rusb::devices()?.iter() {
        let desc = device.device_descriptor()?;
        if desc.vendor_id() != vid || desc.product_id() != pid {
            continue;
        }
        let serial = device
            .open()
            .and_then(|handle| handle.read_serial_number_string_ascii(&desc))
            .ok();
        found.push(DeviceInfo {
            bus: device.bus_number(),
            addr: device.address(),
            vid,
            pid,
            serial,
            chip: ChipType::from_bcd_device(bcd_device(&desc)),
        });
    }
    Ok(found)
}

/// Move the payload of a bulk IN transfer to `out`, dropping the two modem status bytes that
/// start every packet
fn strip_modem_status(raw: &[u8], packet_size: usize, out: &mut VecDeque<u8>) {
    for packet in raw.chunks(packet_size.max(3)) {
        if packet.len() > 2 {
            out.extend(&packet[2..]);
        }
    }
}

pub struct FtdiUsb {
    handle: DeviceHandle<GlobalContext>,
    chip: ChipType,
    interface: Interface,
    max_packet_size: usize,
    read_buffer: Vec<u8>,
    // Payload received but not yet returned
    pending: VecDeque<u8>,
}

impl FtdiUsb {
    /// Open the first adapter matching `vid`, `pid` and `selector`, claim `interface` and put it
    /// into MPSSE mode
    pub fn open(vid: u16, pid: u16, interface: Interface, selector: &DeviceSelector) -> Result<Self> {
        let mut last_error = None;
        for device in rusb::devices()?.iter() {
            let desc = device.device_descriptor()?;
            if desc.vendor_id() != vid || desc.product_id() != pid {
                continue;
            }
            let (bus, addr) = (device.bus_number(), device.address());
            if matches!(selector, DeviceSelector::BusAddr { .. })
                && !selector.matches(bus, addr, None)
            {
                continue;
            }

            let handle = match device.open() {
                Ok(handle) => handle,
                Err(e) => {
                    debug!("cannot open {:04x}:{:04x} at {}:{}: {}", vid, pid, bus, addr, e);
                    last_error = Some(Error::from(e));
                    continue;
                }
            };
            if let DeviceSelector::Serial(_) = selector {
                let serial = handle.read_serial_number_string_ascii(&desc).ok();
                if !selector.matches(bus, addr, serial.as_deref()) {
                    continue;
                }
            }

            let Some(chip) = ChipType::from_bcd_device(bcd_device(&desc)) else {
                debug!("skipping {:04x}:{:04x} at {}:{}: unsupported bcdDevice 0x{:04x}",
                       vid, pid, bus, addr, bcd_device(&desc));
                continue;
            };
            let max_packet_size = max_packet_size(&device, interface)
                .unwrap_or(if chip.has_divide_by_5() { 512 } else { 64 });
            info!("using {:?} at {}:{}, interface {}", chip, bus, addr, interface.letter());
            return Self::claim(handle, chip, interface, max_packet_size);
        }
        Err(last_error.unwrap_or(Error::DeviceNotFound))
    }

    fn claim(handle: DeviceHandle<GlobalContext>, chip: ChipType, interface: Interface,
             max_packet_size: usize) -> Result<Self> {
        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            debug!("kernel driver auto-detach unavailable: {}", e);
        }
        handle.claim_interface(interface.number())?;

        let mut usb = Self {
            handle,
            chip,
            interface,
            max_packet_size,
            read_buffer: vec![0; max_packet_size * 8],
            pending: VecDeque::new(),
        };
        usb.control(SIO_RESET_REQUEST, SIO_RESET_SIO)?;
        usb.control(SIO_SET_LATENCY_TIMER_REQUEST, LATENCY_MS)?;
        usb.set_bitmode(0, BITMODE_RESET)?;
        usb.set_bitmode(0, BITMODE_MPSSE)?;
        usb.purge()?;
        Ok(usb)
    }

    fn control(&self, request: u8, value: u16) -> Result<()> {
        let request_type = rusb::request_type(rusb::Direction::Out, RequestType::Vendor,
                                              Recipient::Device);
        self.handle.write_control(request_type, request, value, self.interface.index(), &[],
                                  WRITE_TIMEOUT)?;
        Ok(())
    }

    fn set_bitmode(&self, mask: u8, mode: u8) -> Result<()> {
        self.control(SIO_SET_BITMODE_REQUEST, u16::from(mask) | (u16::from(mode) << 8))
    }

    /// Drop anything sitting in the chip's FIFOs
    pub fn purge(&mut self) -> Result<()> {
        self.control(SIO_RESET_REQUEST, SIO_RESET_PURGE_RX)?;
        self.control(SIO_RESET_REQUEST, SIO_RESET_PURGE_TX)?;
        self.pending.clear();
        Ok(())
    }

    pub fn interface(&self) -> Interface {
        self.interface
    }
}

fn max_packet_size(device: &rusb::Device<GlobalContext>, interface: Interface) -> Option<usize> {
    let config = device.active_config_descriptor().ok()?;
    config
        .interfaces()
        .flat_map(|i| i.descriptors())
        .filter(|d| d.interface_number() == interface.number())
        .flat_map(|d| d.endpoint_descriptors().collect::<Vec<_>>())
        .find(|ep| ep.address() == interface.read_ep())
        .map(|ep| usize::from(ep.max_packet_size()))
}

impl FtdiPort for FtdiUsb {
    fn chip_type(&self) -> ChipType {
        self.chip
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(self.handle.write_bulk(self.interface.write_ep(), data, WRITE_TIMEOUT)?)
    }

    fn read(&mut self, data: &mut [u8]) -> Result<usize> {
        if self.pending.is_empty() {
            let n = match self.handle.read_bulk(self.interface.read_ep(), &mut self.read_buffer,
                                                READ_TIMEOUT) {
                Ok(n) => n,
                Err(rusb::Error::Timeout) => 0,
                Err(e) => return Err(e.into()),
            };
            strip_modem_status(&self.read_buffer[..n], self.max_packet_size, &mut self.pending);
        }

        let n = data.len().min(self.pending.len());
        for (dst, src) in data.iter_mut().zip(self.pending.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl Drop for FtdiUsb {
    fn drop(&mut self) {
        if let Err(e) = self.set_bitmode(0, BITMODE_RESET) {
            warn!("could not take the adapter out of MPSSE mode: {}", e);
        }
        if let Err(e) = self.handle.release_interface(self.interface.number()) {
            warn!("could not release interface {}: {}", self.interface.letter(), e);
        }
    }
}

impl Mpsse<FtdiUsb> {
    /// Open the adapter described by `config` over libusb and bring up its MPSSE engine with
    /// TCK at (at most) `clock_hz`
    pub fn open(config: &CableConfig, selector: &DeviceSelector, clock_hz: u32) -> Result<Self> {
        let port = FtdiUsb::open(config.vid, config.pid, config.interface, selector)?;
        Mpsse::new(port, config, clock_hz)
    }
}
