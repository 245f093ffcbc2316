//! Implementations for different JTAG hardware adapters live here.  Hardware adapters should
//! implement the `Cable` trait; adapters with spare I/O lines also implement `GpioLines`.
//!
//! Bit streams are packed LSB first: bit `n` of a stream is bit `n % 8` of byte `n / 8`.
use crate::error::Result;

pub mod config;
pub mod gpio;
#[cfg(feature = "std")]
pub mod mpsse;
#[cfg(feature = "std")]
pub mod usb;
#[cfg(feature = "d2xx")]
pub mod d2xx;

/// Buffer size assumed for cables that do not batch
pub const DEFAULT_BUFFER_SIZE: usize = 64;

pub trait Cable {
    /// Clock out `bits` TMS values packed in `tms` to change the state of the JTAG chain, holding
    /// TDI at `tdi` meanwhile.  The cable may queue them until the next `flush` or read.
    fn change_mode(&mut self, tms: &[u8], bits: usize, tdi: bool) -> Result<()>;

    /// Shift `bits` bits through TDI/TDO with TMS low.  Should be called with the chain in
    /// ShiftIR or ShiftDR.  With `tdi` of `None` zeros are shifted.  When `tdo` is given the
    /// captured bits are stored there, which forces the transfer to complete before returning.
    /// With `exit`, TMS goes high together with the last bit, moving the chain to Exit1.
    fn shift_bits(&mut self, tdi: Option<&[u8]>, tdo: Option<&mut [u8]>, bits: usize,
                  exit: bool) -> Result<()>;

    /// Pulse TCK `cycles` times with fixed TMS and TDI levels
    fn toggle_clk(&mut self, tms: bool, tdi: bool, cycles: usize) -> Result<()>;

    /// Program TCK to the fastest rate not above `hz`.  Returns the rate actually in use.
    fn set_clock(&mut self, hz: u32) -> Result<u32>;

    /// The TCK rate currently in use, in Hz
    fn clock(&self) -> u32;

    /// Push anything queued out to the hardware
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Size of the cable's batch buffer in bytes
    fn buffer_size(&self) -> usize {
        DEFAULT_BUFFER_SIZE
    }
}

/// One of the two 8-bit GPIO groups of an MPSSE adapter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GpioBank {
    /// ADBUS0-7; bits 0-3 carry TCK, TDI, TDO and TMS
    Low,
    /// ACBUS0-7
    High,
}

/// General-purpose lines of an adapter.  The 16-bit forms use the low bank for bits 0-7 and the
/// high bank for bits 8-15.  A direction bit of 1 makes the line an output.
pub trait GpioLines {
    /// Sample the levels of a bank
    fn gpio_get_bank(&mut self, bank: GpioBank) -> Result<u8>;
    /// Drive the lines in `mask` high, leaving the others alone
    fn gpio_set_bank(&mut self, bank: GpioBank, mask: u8) -> Result<()>;
    /// Drive the lines in `mask` low, leaving the others alone
    fn gpio_clear_bank(&mut self, bank: GpioBank, mask: u8) -> Result<()>;
    /// Overwrite the value register of a bank
    fn gpio_write_bank(&mut self, bank: GpioBank, value: u8) -> Result<()>;
    /// Overwrite the direction register of a bank
    fn gpio_set_dir_bank(&mut self, bank: GpioBank, dir: u8) -> Result<()>;

    fn gpio_get(&mut self) -> Result<u16> {
        let low = self.gpio_get_bank(GpioBank::Low)?;
        let high = self.gpio_get_bank(GpioBank::High)?;
        Ok(u16::from_le_bytes([low, high]))
    }

    fn gpio_set(&mut self, mask: u16) -> Result<()> {
        let [low, high] = mask.to_le_bytes();
        self.gpio_set_bank(GpioBank::Low, low)?;
        self.gpio_set_bank(GpioBank::High, high)
    }

    fn gpio_clear(&mut self, mask: u16) -> Result<()> {
        let [low, high] = mask.to_le_bytes();
        self.gpio_clear_bank(GpioBank::Low, low)?;
        self.gpio_clear_bank(GpioBank::High, high)
    }

    fn gpio_write(&mut self, value: u16) -> Result<()> {
        let [low, high] = value.to_le_bytes();
        self.gpio_write_bank(GpioBank::Low, low)?;
        self.gpio_write_bank(GpioBank::High, high)
    }

    fn gpio_set_dir(&mut self, dir: u16) -> Result<()> {
        let [low, high] = dir.to_le_bytes();
        self.gpio_set_dir_bank(GpioBank::Low, low)?;
        self.gpio_set_dir_bank(GpioBank::High, high)
    }
}

pub(crate) fn bit(data: &[u8], index: usize) -> bool {
    data[index / 8] & (1 << (index % 8)) != 0
}

pub(crate) fn set_bit(data: &mut [u8], index: usize, value: bool) {
    let mask = 1 << (index % 8);
    if value {
        data[index / 8] |= mask;
    } else {
        data[index / 8] &= !mask;
    }
}
