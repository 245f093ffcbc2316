#![allow(dead_code)]

use jtag_mpsse::cable::{self, Cable};
use jtag_mpsse::statemachine::JtagState;
use jtag_mpsse::Result;

/// One TAP.  Registers are kept LSB (TDO side) first.
pub struct SimTap {
    pub idcode: Option<u32>,
    pub irlen: usize,
    /// Instruction latched by the last Update-IR
    pub instruction: Vec<bool>,
    pub bypass: bool,
    /// 32-bit data register selected by any instruction but BYPASS.  Holds the IDCODE after
    /// reset and whatever Update-DR latched afterwards.
    pub user: Vec<bool>,
    ir_shift: Vec<bool>,
    dr_shift: Vec<bool>,
}

pub fn bits_of(value: u32, len: usize) -> Vec<bool> {
    (0..len).map(|i| value >> i & 1 != 0).collect()
}

pub fn value_of(bits: &[bool]) -> u32 {
    bits.iter().rev().fold(0, |acc, &b| (acc << 1) | b as u32)
}

impl SimTap {
    pub fn new(idcode: Option<u32>, irlen: usize) -> Self {
        let mut tap = Self {
            idcode,
            irlen,
            instruction: Vec::new(),
            bypass: true,
            user: Vec::new(),
            ir_shift: Vec::new(),
            dr_shift: Vec::new(),
        };
        tap.reset();
        tap
    }

    fn reset(&mut self) {
        self.bypass = self.idcode.is_none();
        self.instruction = vec![true; self.irlen];
        self.user = bits_of(self.idcode.unwrap_or(0), 32);
    }

    fn capture_dr(&mut self) {
        self.dr_shift = if self.bypass { vec![false] } else { self.user.clone() };
    }

    fn update_dr(&mut self) {
        if !self.bypass {
            self.user = self.dr_shift.clone();
        }
    }

    fn capture_ir(&mut self) {
        self.ir_shift = vec![false; self.irlen];
        self.ir_shift[0] = true;
    }

    fn update_ir(&mut self) {
        self.instruction = self.ir_shift.clone();
        self.bypass = self.instruction.iter().all(|&b| b);
    }
}

fn shift(reg: &mut Vec<bool>, tdi: bool) -> bool {
    let out = reg.remove(0);
    reg.push(tdi);
    out
}

/// A scan chain behind a cable.  Taps are listed TDI side first.
pub struct SimChain {
    pub taps: Vec<SimTap>,
    pub state: JtagState,
    /// (state before the clock, tms, tdi) for every TCK
    pub trace: Vec<(JtagState, bool, bool)>,
    pub flushes: usize,
    pub buffer_size: usize,
    pub clock_hz: u32,
}

impl SimChain {
    pub fn new(taps: Vec<SimTap>) -> Self {
        Self {
            taps,
            // Wherever the hardware happens to be
            state: JtagState::Idle,
            trace: Vec::new(),
            flushes: 0,
            buffer_size: cable::DEFAULT_BUFFER_SIZE,
            clock_hz: 1_000_000,
        }
    }

    /// States visited by the recorded clocks
    pub fn states(&self) -> Vec<JtagState> {
        self.trace.iter().map(|&(s, _, _)| s).collect()
    }

    fn tck(&mut self, tms: bool, tdi: bool) -> bool {
        use JtagState::*;

        self.trace.push((self.state, tms, tdi));
        let mut tdo = false;
        match self.state {
            CaptureDR => self.taps.iter_mut().for_each(SimTap::capture_dr),
            CaptureIR => self.taps.iter_mut().for_each(SimTap::capture_ir),
            UpdateDR => self.taps.iter_mut().for_each(SimTap::update_dr),
            UpdateIR => self.taps.iter_mut().for_each(SimTap::update_ir),
            ShiftDR | ShiftIR => {
                let mut carry = tdi;
                for tap in &mut self.taps {
                    let reg = if self.state == ShiftDR { &mut tap.dr_shift } else { &mut tap.ir_shift };
                    carry = shift(reg, carry);
                }
                tdo = carry;
            }
            _ => {}
        }

        self.state = self.state.next(tms);
        if self.state == Reset {
            self.taps.iter_mut().for_each(SimTap::reset);
        }
        tdo
    }
}

impl Cable for SimChain {
    fn change_mode(&mut self, tms: &[u8], bits: usize, tdi: bool) -> Result<()> {
        for i in 0..bits {
            self.tck(cable_bit(tms, i), tdi);
        }
        Ok(())
    }

    fn shift_bits(&mut self, tdi: Option<&[u8]>, mut tdo: Option<&mut [u8]>, bits: usize,
                  exit: bool) -> Result<()> {
        for i in 0..bits {
            assert!(matches!(self.state, JtagState::ShiftDR | JtagState::ShiftIR),
                    "data shifted in {}", self.state);
            let out = self.tck(exit && i == bits - 1, tdi.is_some_and(|d| cable_bit(d, i)));
            if let Some(tdo) = tdo.as_deref_mut() {
                if out {
                    tdo[i / 8] |= 1 << (i % 8);
                } else {
                    tdo[i / 8] &= !(1 << (i % 8));
                }
            }
        }
        Ok(())
    }

    fn toggle_clk(&mut self, tms: bool, tdi: bool, cycles: usize) -> Result<()> {
        for _ in 0..cycles {
            self.tck(tms, tdi);
        }
        Ok(())
    }

    fn set_clock(&mut self, hz: u32) -> Result<u32> {
        self.clock_hz = hz;
        Ok(hz)
    }

    fn clock(&self) -> u32 {
        self.clock_hz
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

fn cable_bit(data: &[u8], index: usize) -> bool {
    data[index / 8] & (1 << (index % 8)) != 0
}
