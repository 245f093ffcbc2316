//! Implement the `Cable` trait for FTDI chips with an MPSSE engine (FT2232C/D, FT2232H, FT4232H,
//! FT232H).  Commands accumulate in a buffer the size of the chip's FIFO and only go out when the
//! buffer is full, when data has to be read back, or on `flush`.
//!
//! The USB side is abstracted by `FtdiPort`, which moves raw bytes to and from the MPSSE engine.
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;
use std::time::{Duration, Instant};

use ftdi_mpsse::{ClockBits, ClockBitsOut, ClockData, ClockDataOut, ClockTMS, ClockTMSOut};
use ftdi_mpsse::MpsseCmdBuilder;
use log::{debug, trace, warn};

use crate::cable::config::{CableConfig, Direction, PinConfig, PinFunction};
use crate::cable::{self, Cable, GpioBank, GpioLines};
use crate::error::{Error, Result};

/// How long `read` keeps polling for a response
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// FTDI chip generations, as told apart by `bcdDevice`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChipType {
    Ft2232C,
    Ft232R,
    Ft2232H,
    Ft4232H,
    Ft232H,
}

impl ChipType {
    pub fn from_bcd_device(bcd: u16) -> Option<Self> {
        match bcd >> 8 {
            0x05 => Some(ChipType::Ft2232C),
            0x06 => Some(ChipType::Ft232R),
            0x07 => Some(ChipType::Ft2232H),
            0x08 => Some(ChipType::Ft4232H),
            0x09 => Some(ChipType::Ft232H),
            _ => None,
        }
    }

    /// Size of the chip's transmit FIFO in bytes
    pub fn buffer_size(self) -> usize {
        match self {
            ChipType::Ft2232C | ChipType::Ft232R => 128,
            ChipType::Ft2232H | ChipType::Ft4232H | ChipType::Ft232H => 2048,
        }
    }

    /// High-speed chips run the MPSSE from a 60 MHz clock that can be divided by 5
    pub fn has_divide_by_5(self) -> bool {
        matches!(self, ChipType::Ft2232H | ChipType::Ft4232H | ChipType::Ft232H)
    }

    pub fn has_mpsse(self) -> bool {
        self != ChipType::Ft232R
    }
}

/// Byte pipe to an FTDI interface that is already in MPSSE mode
pub trait FtdiPort {
    fn chip_type(&self) -> ChipType;

    /// Send bytes to the MPSSE engine.  Returns how many were accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Fetch whatever response bytes are available, up to `data.len()`.  With nothing available
    /// this should wait briefly on the driver before returning 0, which is not an error; the
    /// caller polls until its deadline.
    fn read(&mut self, data: &mut [u8]) -> Result<usize>;
}

/// A divisor choice for the TCK generator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockSetting {
    pub divisor: u16,
    /// `Some(true)` selects the 12 MHz master clock of a high-speed chip, `Some(false)` the
    /// 60 MHz one.  Chips without the divider take `None`.
    pub divide_by_5: Option<bool>,
    /// Resulting TCK rate in Hz
    pub actual: u32,
}

/// Divisor for a `base` Hz master clock giving the fastest TCK not above `hz`, together with
/// that rate.  TCK = base / ((1 + divisor) * 2).  Requests below the slowest rate get the
/// slowest rate.
pub fn clock_divisor(base: u32, hz: u32) -> (u16, u32) {
    let half = base / 2;
    let div = half.div_ceil(hz.max(1)).clamp(1, 0x1_0000);
    ((div - 1) as u16, half / div)
}

/// Pick the master clock and divisor for `hz` on `chip`
pub fn select_clock(chip: ChipType, hz: u32) -> Result<ClockSetting> {
    if hz == 0 {
        return Err(Error::InvalidArgument("TCK frequency must be non-zero"));
    }
    let candidates: &[(u32, Option<bool>)] = if chip.has_divide_by_5() {
        &[(60_000_000, Some(false)), (12_000_000, Some(true))]
    } else {
        &[(12_000_000, None)]
    };

    let mut best: Option<ClockSetting> = None;
    for &(base, divide_by_5) in candidates {
        let (divisor, actual) = clock_divisor(base, hz);
        let setting = ClockSetting { divisor, divide_by_5, actual };
        let better = match best {
            None => true,
            Some(b) => match (actual <= hz, b.actual <= hz) {
                (true, false) => true,
                (false, true) => false,
                (true, true) => actual > b.actual,
                (false, false) => actual < b.actual,
            },
        };
        if better {
            best = Some(setting);
        }
    }
    best.ok_or(Error::InvalidArgument("no clock source"))
}

pub struct Mpsse<P> {
    port: P,
    chip: ChipType,
    // Commands not yet sent to the adapter
    buffer: Vec<u8>,
    buffer_size: usize,
    clock: u32,
    // (value, direction) of the low and high GPIO banks
    low: (u8, u8),
    high: (u8, u8),
    pins: PinConfig,
    read_timeout: Duration,
}

impl<P: FtdiPort> Mpsse<P> {
    /// Bring up the MPSSE engine behind `port`: disable loopback and the high-speed only clocking
    /// modes, drive both GPIO banks to their power-up state and program TCK.
    pub fn new(port: P, config: &CableConfig, clock_hz: u32) -> Result<Self> {
        let chip = port.chip_type();
        if !chip.has_mpsse() {
            return Err(Error::InvalidArgument("chip has no MPSSE engine"));
        }

        let mut mpsse = Self {
            port,
            chip,
            buffer: Vec::with_capacity(chip.buffer_size()),
            buffer_size: chip.buffer_size(),
            clock: 0,
            low: (config.bit_low_val, config.bit_low_dir),
            high: (config.bit_high_val, config.bit_high_dir),
            pins: config.pins.clone(),
            read_timeout: DEFAULT_READ_TIMEOUT,
        };

        let mut builder = MpsseCmdBuilder::new().disable_loopback();
        if chip.has_divide_by_5() {
            builder = builder
                .disable_3phase_data_clocking()
                .disable_adaptive_data_clocking();
        }
        builder = builder
            .set_gpio_lower(mpsse.low.0, mpsse.low.1)
            .set_gpio_upper(mpsse.high.0, mpsse.high.1);
        mpsse.store(builder.as_slice())?;
        mpsse.set_clock(clock_hz)?;
        mpsse.write()?;

        debug!("{:?} ready, TCK {} Hz", chip, mpsse.clock);
        Ok(mpsse)
    }

    pub fn chip(&self) -> ChipType {
        self.chip
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    /// Queue a command, sending what is buffered first if it would not fit
    fn store(&mut self, cmd: &[u8]) -> Result<()> {
        if !self.buffer.is_empty() && self.buffer.len() + cmd.len() > self.buffer_size {
            self.write()?;
        }
        self.buffer.extend_from_slice(cmd);
        Ok(())
    }

    /// Send the whole buffer, at most one FIFO's worth per USB write
    fn write(&mut self) -> Result<()> {
        let mut buffer = core::mem::take(&mut self.buffer);
        let mut sent = 0;
        let result = loop {
            if sent == buffer.len() {
                break Ok(());
            }
            let end = buffer.len().min(sent + self.buffer_size);
            match self.port.write(&buffer[sent..end]) {
                Ok(0) => break Err(Error::Io(format!("adapter accepted none of {} bytes",
                                                      end - sent))),
                Ok(n) => sent += n,
                Err(e) => break Err(e),
            }
        };
        trace!("sent {} bytes", sent);
        buffer.clear();
        self.buffer = buffer;
        result
    }

    /// Send everything queued, then collect exactly `data.len()` response bytes
    fn read(&mut self, data: &mut [u8]) -> Result<()> {
        self.store(MpsseCmdBuilder::new().send_immediate().as_slice())?;
        self.write()?;

        let deadline = Instant::now() + self.read_timeout;
        let mut got = 0;
        while got < data.len() {
            let n = self.port.read(&mut data[got..])?;
            got += n;
            if n == 0 && Instant::now() >= deadline {
                break;
            }
        }

        if got == data.len() {
            Ok(())
        } else if got == 0 {
            Err(Error::Timeout)
        } else {
            Err(Error::Io(format!("short read: {} of {} bytes", got, data.len())))
        }
    }

    fn bank(&mut self, bank: GpioBank) -> &mut (u8, u8) {
        match bank {
            GpioBank::Low => &mut self.low,
            GpioBank::High => &mut self.high,
        }
    }

    fn gpio_update(&mut self, bank: GpioBank) -> Result<()> {
        let (value, dir) = *self.bank(bank);
        let builder = match bank {
            GpioBank::Low => MpsseCmdBuilder::new().set_gpio_lower(value, dir),
            GpioBank::High => MpsseCmdBuilder::new().set_gpio_upper(value, dir),
        };
        self.store(builder.as_slice())?;
        self.write()
    }

    /// Drive the line carrying `function` to its asserted or deasserted level
    pub fn set_function(&mut self, function: PinFunction, asserted: bool) -> Result<()> {
        let pin = self
            .pins
            .get(function)
            .ok_or(Error::InvalidArgument("function not wired on this cable"))?;
        if pin.direction == Direction::Input {
            return Err(Error::InvalidArgument("cannot drive an input line"));
        }
        if pin.level(asserted) {
            self.gpio_set_bank(pin.bank, pin.mask())
        } else {
            self.gpio_clear_bank(pin.bank, pin.mask())
        }
    }
}

impl<P: FtdiPort> Cable for Mpsse<P> {
    fn change_mode(&mut self, tms: &[u8], bits: usize, tdi: bool) -> Result<()> {
        let mut builder = MpsseCmdBuilder::new();
        let mut start = 0;
        while start < bits {
            let len = (bits - start).min(7);
            let mut chunk = 0;
            for i in 0..len {
                if cable::bit(tms, start + i) {
                    chunk |= 1 << i;
                }
            }
            builder = builder.clock_tms_out(ClockTMSOut::NegEdge, chunk, tdi, len as u8);
            start += len;
        }
        self.store(builder.as_slice())
    }

    fn shift_bits(&mut self, tdi: Option<&[u8]>, mut tdo: Option<&mut [u8]>, bits: usize,
                  exit: bool) -> Result<()> {
        if bits == 0 {
            return Ok(());
        }
        let len = bits.div_ceil(8);
        if tdi.is_some_and(|tdi| tdi.len() < len) {
            return Err(Error::InvalidArgument("TDI buffer shorter than the shift length"));
        }
        if tdo.as_ref().is_some_and(|tdo| tdo.len() < len) {
            return Err(Error::InvalidArgument("TDO buffer shorter than the shift length"));
        }
        let zeros;
        let tdi = match tdi {
            Some(tdi) => tdi,
            None => {
                zeros = vec![0; len];
                &zeros
            }
        };

        // With `exit` the last bit goes out through a TMS command
        let body = if exit { bits - 1 } else { bits };
        let bytes = body / 8;
        let rem = body % 8;

        // Leave room for the command header and a send-immediate.  Responses are collected
        // until the chip's FIFO would overflow, then read back in one go.
        let chunk = self.buffer_size.saturating_sub(4).max(1);
        let mut unread = 0..0;
        let mut offset = 0;
        while offset < bytes {
            let n = (bytes - offset).min(chunk);
            let data = &tdi[offset..offset + n];
            match tdo.as_deref_mut() {
                Some(out) => {
                    if !unread.is_empty() && unread.len() + n > chunk {
                        self.read(&mut out[unread.clone()])?;
                        unread = offset..offset;
                    }
                    self.store(MpsseCmdBuilder::new()
                        .clock_data(ClockData::LsbPosIn, data)
                        .as_slice())?;
                    if unread.is_empty() {
                        unread = offset..offset;
                    }
                    unread.end = offset + n;
                }
                None => {
                    self.store(MpsseCmdBuilder::new()
                        .clock_data_out(ClockDataOut::LsbNeg, data)
                        .as_slice())?;
                }
            }
            offset += n;
        }

        let reading = tdo.is_some();
        let mut builder = MpsseCmdBuilder::new();
        let mut tail = 0;
        if rem > 0 {
            let byte = tdi[bytes];
            builder = if reading {
                builder.clock_bits(ClockBits::LsbPosIn, byte, rem as u8)
            } else {
                builder.clock_bits_out(ClockBitsOut::LsbNeg, byte, rem as u8)
            };
            tail += 1;
        }
        if exit {
            let last = cable::bit(tdi, bits - 1);
            builder = if reading {
                builder.clock_tms(ClockTMS::NegTMSPosTDO, 0x01, last, 1)
            } else {
                builder.clock_tms_out(ClockTMSOut::NegEdge, 0x01, last, 1)
            };
            tail += 1;
        }
        if tail > 0 {
            self.store(builder.as_slice())?;
        }

        let Some(out) = tdo else {
            return Ok(());
        };
        if unread.len() + tail > chunk {
            self.read(&mut out[unread.clone()])?;
            unread = bytes..bytes;
        }
        if unread.is_empty() && tail == 0 {
            return Ok(());
        }

        let mut response = vec![0; unread.len() + tail];
        self.read(&mut response)?;
        let (whole, bits_in) = response.split_at(unread.len());
        out[unread].copy_from_slice(whole);
        // Bits come in at the top of each response byte
        if rem > 0 {
            let value = bits_in[0] >> (8 - rem);
            for i in 0..rem {
                cable::set_bit(out, bytes * 8 + i, value & (1 << i) != 0);
            }
        }
        if exit {
            cable::set_bit(out, bits - 1, bits_in[tail - 1] & 0x80 != 0);
        }
        Ok(())
    }

    fn toggle_clk(&mut self, tms: bool, tdi: bool, cycles: usize) -> Result<()> {
        let pattern = if tms { 0x7f } else { 0x00 };
        let mut builder = MpsseCmdBuilder::new();
        let mut left = cycles;
        while left > 0 {
            let len = left.min(7);
            builder = builder.clock_tms_out(ClockTMSOut::NegEdge, pattern, tdi, len as u8);
            left -= len;
        }
        self.store(builder.as_slice())
    }

    fn set_clock(&mut self, hz: u32) -> Result<u32> {
        let setting = select_clock(self.chip, hz)?;
        if setting.actual > hz {
            warn!("{} Hz is below the slowest TCK, using {} Hz", hz, setting.actual);
        } else if setting.actual != hz {
            debug!("TCK {} Hz requested, using {} Hz", hz, setting.actual);
        }

        let builder = MpsseCmdBuilder::new()
            .set_clock(u32::from(setting.divisor), setting.divide_by_5);
        self.store(builder.as_slice())?;
        self.clock = setting.actual;
        Ok(setting.actual)
    }

    fn clock(&self) -> u32 {
        self.clock
    }

    fn flush(&mut self) -> Result<()> {
        self.write()
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

impl<P: FtdiPort> GpioLines for Mpsse<P> {
    fn gpio_get_bank(&mut self, bank: GpioBank) -> Result<u8> {
        let builder = match bank {
            GpioBank::Low => MpsseCmdBuilder::new().gpio_lower(),
            GpioBank::High => MpsseCmdBuilder::new().gpio_upper(),
        };
        self.store(builder.as_slice())?;
        let mut value = [0];
        self.read(&mut value)?;
        Ok(value[0])
    }

    fn gpio_set_bank(&mut self, bank: GpioBank, mask: u8) -> Result<()> {
        self.bank(bank).0 |= mask;
        self.gpio_update(bank)
    }

    fn gpio_clear_bank(&mut self, bank: GpioBank, mask: u8) -> Result<()> {
        self.bank(bank).0 &= !mask;
        self.gpio_update(bank)
    }

    fn gpio_write_bank(&mut self, bank: GpioBank, value: u8) -> Result<()> {
        self.bank(bank).0 = value;
        self.gpio_update(bank)
    }

    fn gpio_set_dir_bank(&mut self, bank: GpioBank, dir: u8) -> Result<()> {
        self.bank(bank).1 = dir;
        self.gpio_update(bank)
    }
}
