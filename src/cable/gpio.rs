//! Implement the `Cable` trait by toggling four `embedded-hal` pins.  Nothing is buffered: every
//! call clocks its bits out before returning.
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin, PinState};

use crate::cable::{self, Cable};
use crate::error::{Error, Result};

fn pin_error<E: embedded_hal::digital::Error>(e: E) -> Error {
    Error::Pin(e.kind())
}

/// Half of the TCK period in ns, rounded up so the rate never exceeds `hz`
fn half_period_ns(hz: u32) -> u32 {
    500_000_000u32.div_ceil(hz)
}

pub struct Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    half_period: u32,
    delay: Delay,
    clock: Clk,
    tdi: Tdi,
    tdo: Tdo,
    tms: Tms
}

impl<Clk, Tdi, Tdo, Tms, Delay> Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    /// TCK runs at no more than `freq_hz`.  The clock pin should start out low.
    pub fn new(freq_hz: u32, clock: Clk, tdi: Tdi, tdo: Tdo, tms: Tms, delay: Delay) -> Result<Self> {
        if freq_hz == 0 {
            return Err(Error::InvalidArgument("TCK frequency must be non-zero"));
        }
        Ok(Gpio { half_period: half_period_ns(freq_hz), clock, tdi, tdo, tms, delay })
    }

    /// Give the pins back
    pub fn release(self) -> (Clk, Tdi, Tdo, Tms, Delay) {
        (self.clock, self.tdi, self.tdo, self.tms, self.delay)
    }

    /// One TCK period.  TMS and TDI are set up while the clock is low, TDO is sampled on the
    /// rising edge.
    fn cycle(&mut self, tms: bool, tdi: bool) -> Result<bool> {
        self.tms.set_state(PinState::from(tms)).map_err(pin_error)?;
        self.tdi.set_state(PinState::from(tdi)).map_err(pin_error)?;
        self.delay.delay_ns(self.half_period);

        self.clock.set_high().map_err(pin_error)?;
        let tdo = self.tdo.is_high().map_err(pin_error)?;
        self.delay.delay_ns(self.half_period);
        self.clock.set_low().map_err(pin_error)?;
        Ok(tdo)
    }
}

impl<Clk, Tdi, Tdo, Tms, Delay> Cable for Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    fn change_mode(&mut self, tms: &[u8], bits: usize, tdi: bool) -> Result<()> {
        for i in 0..bits {
            self.cycle(cable::bit(tms, i), tdi)?;
        }
        Ok(())
    }

    fn shift_bits(&mut self, tdi: Option<&[u8]>, mut tdo: Option<&mut [u8]>, bits: usize,
                  exit: bool) -> Result<()> {
        for i in 0..bits {
            let out = tdi.is_some_and(|tdi| cable::bit(tdi, i));
            let tms = exit && i == bits - 1;
            let sampled = self.cycle(tms, out)?;
            if let Some(tdo) = tdo.as_deref_mut() {
                cable::set_bit(tdo, i, sampled);
            }
        }
        Ok(())
    }

    fn toggle_clk(&mut self, tms: bool, tdi: bool, cycles: usize) -> Result<()> {
        for _ in 0..cycles {
            self.cycle(tms, tdi)?;
        }
        Ok(())
    }

    fn set_clock(&mut self, hz: u32) -> Result<u32> {
        if hz == 0 {
            return Err(Error::InvalidArgument("TCK frequency must be non-zero"));
        }
        self.half_period = half_period_ns(hz);
        Ok(self.clock())
    }

    fn clock(&self) -> u32 {
        500_000_000 / self.half_period
    }
}
