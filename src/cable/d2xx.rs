//! FTDI access through the vendor's D2XX driver, for hosts where libusb cannot claim the chip.
use alloc::string::ToString;
use std::time::Duration;

use libftd2xx::{BitMode, DeviceType, FtStatus, Ftdi, FtdiCommon};
use log::{info, warn};

use crate::cable::config::{CableConfig, DeviceSelector, Interface};
use crate::cable::mpsse::{ChipType, FtdiPort, Mpsse};
use crate::error::{Error, Result};

impl From<FtStatus> for Error {
    fn from(e: FtStatus) -> Self {
        match e {
            FtStatus::DEVICE_NOT_FOUND => Error::DeviceNotFound,
            e => Error::Io(e.to_string()),
        }
    }
}

fn chip_type(device_type: DeviceType) -> Option<ChipType> {
    match device_type {
        DeviceType::FT2232C => Some(ChipType::Ft2232C),
        DeviceType::FT232R => Some(ChipType::Ft232R),
        DeviceType::FT2232H => Some(ChipType::Ft2232H),
        DeviceType::FT4232H => Some(ChipType::Ft4232H),
        DeviceType::FT232H => Some(ChipType::Ft232H),
        _ => None,
    }
}

/// How long a blocking read waits on the driver before reporting nothing
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Bytes to ask the driver for.  With nothing queued, a single byte is requested so the read
/// blocks in the driver for up to `READ_TIMEOUT` instead of returning at once.
fn read_len(queued: usize, wanted: usize) -> usize {
    if queued == 0 {
        wanted.min(1)
    } else {
        queued.min(wanted)
    }
}

fn multi_channel(chip: ChipType) -> bool {
    matches!(chip, ChipType::Ft2232C | ChipType::Ft2232H | ChipType::Ft4232H)
}

pub struct D2xx {
    ft: Ftdi,
    chip: ChipType,
}

impl D2xx {
    /// Open channel `interface` of the first adapter matching `vid`, `pid` and `selector`.
    /// D2XX does not expose bus numbers, so a bus/address selector is refused.
    pub fn open(vid: u16, pid: u16, interface: Interface, selector: &DeviceSelector) -> Result<Self> {
        if let DeviceSelector::BusAddr { .. } = selector {
            return Err(Error::InvalidArgument("D2XX cannot select adapters by bus address"));
        }

        #[cfg(not(windows))]
        libftd2xx::set_vid_pid(vid, pid)?;

        let letter = interface.letter();
        for device in libftd2xx::list_devices()? {
            if device.vendor_id != vid || device.product_id != pid {
                continue;
            }
            let Some(chip) = chip_type(device.device_type) else {
                continue;
            };
            // Each channel of a multi-channel chip shows up with a suffixed serial number
            let serial = device.serial_number.as_str();
            let base = if multi_channel(chip) {
                match serial.strip_suffix(letter) {
                    Some(base) => base,
                    None => continue,
                }
            } else if interface == Interface::A {
                serial
            } else {
                continue;
            };
            if !selector.matches(0, 0, Some(base)) {
                continue;
            }
            if device.port_open {
                return Err(Error::DeviceBusy);
            }

            let mut ft = Ftdi::with_serial_number(serial)?;
            ft.reset()?;
            ft.set_latency_timer(Duration::from_millis(1))?;
            ft.set_bit_mode(0, BitMode::Reset)?;
            ft.set_bit_mode(0, BitMode::Mpsse)?;
            ft.purge_all()?;
            ft.set_timeouts(READ_TIMEOUT, Duration::from_secs(1))?;
            info!("using {:?} {} through D2XX", chip, serial);
            return Ok(Self { ft, chip });
        }
        Err(Error::DeviceNotFound)
    }
}

impl FtdiPort for D2xx {
    fn chip_type(&self) -> ChipType {
        self.chip
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(self.ft.write(data)?)
    }

    fn read(&mut self, data: &mut [u8]) -> Result<usize> {
        let n = read_len(self.ft.queue_status()?, data.len());
        if n == 0 {
            return Ok(0);
        }
        Ok(self.ft.read(&mut data[..n])?)
    }
}

impl Drop for D2xx {
    fn drop(&mut self) {
        if let Err(e) = self.ft.set_bit_mode(0, BitMode::Reset) {
            warn!("could not take the adapter out of MPSSE mode: {}", e);
        }
    }
}

impl Mpsse<D2xx> {
    /// Like `Mpsse::open`, going through the vendor driver
    pub fn open_d2xx(config: &CableConfig, selector: &DeviceSelector, clock_hz: u32) -> Result<Self> {
        let port = D2xx::open(config.vid, config.pid, config.interface, selector)?;
        Mpsse::new(port, config, clock_hz)
    }
}
