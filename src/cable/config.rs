//! Static descriptions of FTDI based cables: USB identifiers, the initial level and direction of
//! both GPIO banks, and which line carries which function.
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::str::FromStr;

use crate::cable::GpioBank;
use crate::error::{Error, Result};

/// FTDI's USB vendor ID
pub const FTDI_VID: u16 = 0x0403;

/// Channel of a multi-channel FTDI chip
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Interface {
    #[default]
    A,
    B,
    C,
    D,
}

impl Interface {
    /// `wIndex` of vendor control requests
    pub fn index(self) -> u16 {
        self.number() as u16 + 1
    }

    /// USB interface number
    pub fn number(self) -> u8 {
        match self {
            Interface::A => 0,
            Interface::B => 1,
            Interface::C => 2,
            Interface::D => 3,
        }
    }

    pub fn read_ep(self) -> u8 {
        0x81 + 2 * self.number()
    }

    pub fn write_ep(self) -> u8 {
        0x02 + 2 * self.number()
    }

    /// Suffix FTDI appends to the serial number of each channel
    pub fn letter(self) -> char {
        (b'A' + self.number()) as char
    }
}

/// Logical function of an adapter line
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PinFunction {
    Tck,
    Tdi,
    Tdo,
    Tms,
    Trst,
    Srst,
    Led,
    OutputEnable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// A single adapter line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pin {
    pub bank: GpioBank,
    pub bit: u8,
    pub direction: Direction,
    pub active_low: bool,
}

impl Pin {
    /// # Panics
    ///
    /// Panics if `bit > 7`.
    pub fn new(bank: GpioBank, bit: u8, direction: Direction) -> Self {
        assert!(bit <= 7, "GPIO bit must be 0-7, got {}", bit);
        Self {
            bank,
            bit,
            direction,
            active_low: false,
        }
    }

    pub fn active_low(mut self) -> Self {
        self.active_low = true;
        self
    }

    pub fn mask(&self) -> u8 {
        1 << self.bit
    }

    /// Electrical level that corresponds to `asserted`
    pub fn level(&self, asserted: bool) -> bool {
        asserted != self.active_low
    }
}

/// Mapping from logical functions to adapter lines
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PinConfig {
    pins: Vec<(PinFunction, Pin)>,
}

impl PinConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed JTAG lines of the MPSSE engine: TCK, TDI, TDO, TMS on ADBUS0-3
    pub fn mpsse_jtag() -> Self {
        Self::new()
            .with(PinFunction::Tck, Pin::new(GpioBank::Low, 0, Direction::Output))
            .with(PinFunction::Tdi, Pin::new(GpioBank::Low, 1, Direction::Output))
            .with(PinFunction::Tdo, Pin::new(GpioBank::Low, 2, Direction::Input))
            .with(PinFunction::Tms, Pin::new(GpioBank::Low, 3, Direction::Output))
    }

    /// Assign `function` to `pin`, replacing any earlier assignment
    pub fn with(mut self, function: PinFunction, pin: Pin) -> Self {
        self.pins.retain(|(f, _)| *f != function);
        self.pins.push((function, pin));
        self
    }

    pub fn get(&self, function: PinFunction) -> Option<Pin> {
        self.pins.iter().find(|(f, _)| *f == function).map(|(_, p)| *p)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(PinFunction, Pin)> {
        self.pins.iter()
    }
}

/// USB identity and power-up GPIO state of an MPSSE cable
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CableConfig {
    pub vid: u16,
    pub pid: u16,
    pub interface: Interface,
    pub bit_low_val: u8,
    pub bit_low_dir: u8,
    pub bit_high_val: u8,
    pub bit_high_dir: u8,
    pub pins: PinConfig,
}

struct KnownCable {
    name: &'static str,
    pid: u16,
    interface: Interface,
    low: (u8, u8),
    high: (u8, u8),
}

const fn known(name: &'static str, pid: u16, interface: Interface, low: (u8, u8),
               high: (u8, u8)) -> KnownCable {
    KnownCable { name, pid, interface, low, high }
}

// (value, direction) of the low and high banks
const KNOWN_CABLES: &[KnownCable] = &[
    known("ft2232", 0x6010, Interface::A, (0x08, 0x0b), (0x08, 0x0b)),
    known("ft2232b", 0x6010, Interface::B, (0x08, 0x0b), (0x08, 0x0b)),
    known("ft232", 0x6014, Interface::A, (0x08, 0x0b), (0x08, 0x0b)),
    known("ft4232", 0x6011, Interface::A, (0x08, 0x0b), (0x08, 0x0b)),
    known("digilent", 0x6010, Interface::A, (0xe8, 0xeb), (0x00, 0x60)),
    known("digilent_b", 0x6010, Interface::B, (0xe8, 0xeb), (0x00, 0x60)),
    known("digilent_hs2", 0x6014, Interface::A, (0xe8, 0xeb), (0x00, 0x60)),
    known("jtagkey", 0xcff8, Interface::A, (0x08, 0x1b), (0x03, 0x0f)),
    known("bus_blaster", 0x6010, Interface::A, (0x08, 0x1b), (0x03, 0x0f)),
    known("tigard", 0x6010, Interface::B, (0x08, 0x3b), (0x00, 0x00)),
];

impl CableConfig {
    /// A plain FT2232 style cable on `interface`
    pub fn new(vid: u16, pid: u16, interface: Interface) -> Self {
        Self {
            vid,
            pid,
            interface,
            bit_low_val: 0x08,
            bit_low_dir: 0x0b,
            bit_high_val: 0x00,
            bit_high_dir: 0x00,
            pins: PinConfig::mpsse_jtag(),
        }
    }

    /// Look up one of the built-in cable descriptions
    pub fn by_name(name: &str) -> Result<Self> {
        let cable = KNOWN_CABLES
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::UnknownCable(name.to_string()))?;
        Ok(Self {
            vid: FTDI_VID,
            pid: cable.pid,
            interface: cable.interface,
            bit_low_val: cable.low.0,
            bit_low_dir: cable.low.1,
            bit_high_val: cable.high.0,
            bit_high_dir: cable.high.1,
            pins: PinConfig::mpsse_jtag(),
        })
    }

    /// Names accepted by `by_name`
    pub fn known_names() -> impl Iterator<Item = &'static str> {
        KNOWN_CABLES.iter().map(|c| c.name)
    }

    /// Merge `pins` into this description.  Output lines become outputs at power-up, driven to
    /// their deasserted level; input lines become inputs.
    pub fn with_pins(mut self, pins: &PinConfig) -> Self {
        for (function, pin) in pins.iter() {
            let (val, dir) = match pin.bank {
                GpioBank::Low => (&mut self.bit_low_val, &mut self.bit_low_dir),
                GpioBank::High => (&mut self.bit_high_val, &mut self.bit_high_dir),
            };
            match pin.direction {
                Direction::Output => *dir |= pin.mask(),
                Direction::Input => *dir &= !pin.mask(),
            }
            if pin.level(false) {
                *val |= pin.mask();
            } else {
                *val &= !pin.mask();
            }
            self.pins = core::mem::take(&mut self.pins).with(*function, *pin);
        }
        self
    }
}

/// Which of several identical adapters to open
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DeviceSelector {
    #[default]
    Any,
    Serial(String),
    BusAddr { bus: u8, addr: u8 },
}

impl FromStr for DeviceSelector {
    type Err = Error;

    /// Accepts `bus:addr`, a udev path like `/dev/bus/usb/001/004`, or a serial number
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(DeviceSelector::Any);
        }

        if let Some(rest) = s.strip_prefix("/dev/bus/usb/") {
            let parts: Vec<&str> = rest.split('/').collect();
            return match parts[..] {
                [bus, addr] => match (bus.parse(), addr.parse()) {
                    (Ok(bus), Ok(addr)) => Ok(DeviceSelector::BusAddr { bus, addr }),
                    _ => Err(Error::InvalidArgument("malformed USB device path")),
                },
                _ => Err(Error::InvalidArgument("malformed USB device path")),
            };
        }

        if let Some((bus, addr)) = s.split_once(':') {
            if let (Ok(bus), Ok(addr)) = (bus.parse(), addr.parse()) {
                return Ok(DeviceSelector::BusAddr { bus, addr });
            }
        }

        Ok(DeviceSelector::Serial(s.to_string()))
    }
}

impl DeviceSelector {
    /// Whether a device with the given location and serial number is selected
    pub fn matches(&self, bus: u8, addr: u8, serial: Option<&str>) -> bool {
        match self {
            DeviceSelector::Any => true,
            DeviceSelector::Serial(s) => serial == Some(s.as_str()),
            DeviceSelector::BusAddr { bus: b, addr: a } => *b == bus && *a == addr,
        }
    }
}
