//! This provides a higher-level interface than the `Cable` trait.  Specifically, it keeps track of
//! the state of the JTAG state machine, and allows setting the state to any desired state.
//! `JtagSM` will get to that state by the most efficient path, based on the current state.
//!
//! TMS transitions are not sent right away: they accumulate in a fixed-size buffer and go out
//! together with the next data shift, or when the buffer fills up, or on `flush`.
use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;

use log::trace;

use crate::cable::{self, Cable};
use crate::error::{Error, Result};

/// Number of TMS-high clocks that bring any TAP into Test-Logic-Reset.
pub const RESET_CYCLES: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Register {
    Data,
    Instruction,
}

impl Register {
    /// The state in which this register is shifted
    pub fn shift_state(self) -> JtagState {
        match self {
            Register::Data => JtagState::ShiftDR,
            Register::Instruction => JtagState::ShiftIR,
        }
    }

    /// The state reached when TMS rises with the last shifted bit
    pub fn exit_state(self) -> JtagState {
        match self {
            Register::Data => JtagState::Exit1DR,
            Register::Instruction => JtagState::Exit1IR,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JtagState {
    Reset = 0,
    Idle = 1,
    SelectDR = 2,
    CaptureDR = 3,
    ShiftDR = 4,
    Exit1DR = 5,
    PauseDR = 6,
    Exit2DR = 7,
    UpdateDR = 8,
    SelectIR = 9,
    CaptureIR = 10,
    ShiftIR = 11,
    Exit1IR = 12,
    PauseIR = 13,
    Exit2IR = 14,
    UpdateIR = 15,
    /// Not yet synchronised with the hardware
    Unknown = 16,
}

use JtagState::*;

/// Next state for TMS low (index 0) and TMS high (index 1), indexed by the current state.
const TRANSITIONS: [[JtagState; 2]; 16] = [
    [Idle, Reset],         // Reset
    [Idle, SelectDR],      // Idle
    [CaptureDR, SelectIR], // SelectDR
    [ShiftDR, Exit1DR],    // CaptureDR
    [ShiftDR, Exit1DR],    // ShiftDR
    [PauseDR, UpdateDR],   // Exit1DR
    [PauseDR, Exit2DR],    // PauseDR
    [ShiftDR, UpdateDR],   // Exit2DR
    [Idle, SelectDR],      // UpdateDR
    [CaptureIR, Reset],    // SelectIR
    [ShiftIR, Exit1IR],    // CaptureIR
    [ShiftIR, Exit1IR],    // ShiftIR
    [PauseIR, UpdateIR],   // Exit1IR
    [PauseIR, Exit2IR],    // PauseIR
    [ShiftIR, UpdateIR],   // Exit2IR
    [Idle, SelectDR],      // UpdateIR
];

impl JtagState {
    /// The 16 states of the TAP controller, in encoding order
    pub const ALL: [JtagState; 16] = [
        Reset, Idle, SelectDR, CaptureDR, ShiftDR, Exit1DR, PauseDR, Exit2DR, UpdateDR,
        SelectIR, CaptureIR, ShiftIR, Exit1IR, PauseIR, Exit2IR, UpdateIR,
    ];

    /// State reached after one TCK with TMS at `tms`.  `Unknown` stays unknown.
    pub fn next(self, tms: bool) -> JtagState {
        match self {
            Unknown => Unknown,
            s => TRANSITIONS[s as usize][tms as usize],
        }
    }

    /// Human-readable state name, as used in the IEEE 1149.1 diagrams
    pub fn name(self) -> &'static str {
        match self {
            Reset => "Test-Logic-Reset",
            Idle => "Run-Test/Idle",
            SelectDR => "Select-DR-Scan",
            CaptureDR => "Capture-DR",
            ShiftDR => "Shift-DR",
            Exit1DR => "Exit1-DR",
            PauseDR => "Pause-DR",
            Exit2DR => "Exit2-DR",
            UpdateDR => "Update-DR",
            SelectIR => "Select-IR-Scan",
            CaptureIR => "Capture-IR",
            ShiftIR => "Shift-IR",
            Exit1IR => "Exit1-IR",
            PauseIR => "Pause-IR",
            Exit2IR => "Exit2-IR",
            UpdateIR => "Update-IR",
            Unknown => "Unknown",
        }
    }
}

impl core::fmt::Display for JtagState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Shortest TMS sequence leading from `from` to `to`.
///
/// Staying put is the empty sequence.  From `Unknown` the sequence starts with a TMS-high reset.
/// Asking for `Unknown` as a target yields the empty sequence.
pub fn path_to(from: JtagState, to: JtagState) -> Vec<bool> {
    let mut path = Vec::new();
    let from = if from == Unknown {
        path.resize(RESET_CYCLES, true);
        Reset
    } else {
        from
    };
    if from == to || to == Unknown {
        return path;
    }

    // Breadth-first search, TMS low explored before TMS high
    let mut prev: [Option<(JtagState, bool)>; 16] = [None; 16];
    let mut seen = [false; 16];
    seen[from as usize] = true;

    let mut queue = VecDeque::new();
    queue.push_back(from);
    'search: while let Some(state) = queue.pop_front() {
        for tms in [false, true] {
            let next = state.next(tms);
            if seen[next as usize] {
                continue;
            }
            seen[next as usize] = true;
            prev[next as usize] = Some((state, tms));
            if next == to {
                break 'search;
            }
            queue.push_back(next);
        }
    }

    let start = path.len();
    let mut state = to;
    while let Some((p, tms)) = prev[state as usize] {
        path.push(tms);
        state = p;
    }
    path[start..].reverse();
    path
}

/// TMS bits waiting to be clocked out, packed LSB first
struct TmsBuffer {
    bits: Vec<u8>,
    count: usize,
}

impl TmsBuffer {
    fn new(bytes: usize) -> Self {
        Self {
            bits: vec![0; bytes.max(1)],
            count: 0,
        }
    }

    fn is_full(&self) -> bool {
        self.count == self.bits.len() * 8
    }

    fn push(&mut self, tms: bool) {
        cable::set_bit(&mut self.bits, self.count, tms);
        self.count += 1;
    }

    fn clear(&mut self) {
        self.bits.fill(0);
        self.count = 0;
    }
}

pub struct JtagSM<T> {
    pub cable: T,
    state: JtagState,
    tms: TmsBuffer,
}

impl<T, U> JtagSM<T>
    where T: core::ops::DerefMut<Target=U>,
          U: Cable + ?Sized
{
    /// Create a JTAG state machine using an existing `Cable`.  Nothing is sent to the cable
    /// until the first state change; the state starts out `Unknown`.
    pub fn new(cable: T) -> Self {
        let tms = TmsBuffer::new(cable.buffer_size());
        Self {
            cable,
            state: Unknown,
            tms,
        }
    }

    /// The state the TAPs are in once all buffered transitions have been clocked
    pub fn state(&self) -> JtagState {
        self.state
    }

    /// Number of TMS transitions buffered but not yet handed to the cable
    pub fn pending_tms(&self) -> usize {
        self.tms.count
    }

    fn push_tms(&mut self, tms: bool) -> Result<()> {
        if self.tms.is_full() {
            self.flush_tms(false)?;
        }
        self.tms.push(tms);
        Ok(())
    }

    /// Reset the scan chain by driving TMS high for 5 clocks
    pub fn mode_reset(&mut self) -> Result<()> {
        for _ in 0..RESET_CYCLES {
            self.push_tms(true)?;
        }
        self.flush_tms(false)?;
        self.state = Reset;
        Ok(())
    }

    /// Use TMS to get into `state` by the most efficient path.  The transitions are buffered.
    pub fn change_mode(&mut self, state: JtagState) -> Result<()> {
        if state == Unknown {
            return Err(Error::InvalidArgument("cannot move into the Unknown state"));
        }
        if self.state == state {
            return Ok(());
        }

        let path = path_to(self.state, state);
        trace!("{} -> {}: {:?}", self.state, state, path);
        for tms in path {
            self.push_tms(tms)?;
        }
        self.state = state;
        Ok(())
    }

    /// Hand buffered TMS transitions to the cable.  With `flush_cable`, also push everything
    /// the cable has queued out to the hardware.
    pub fn flush_tms(&mut self, flush_cable: bool) -> Result<()> {
        if self.tms.count != 0 {
            self.cable.change_mode(&self.tms.bits, self.tms.count, true)?;
            self.tms.clear();
        }
        if flush_cable {
            self.cable.flush()?;
        }
        Ok(())
    }

    /// Send everything buffered so far to the hardware
    pub fn flush(&mut self) -> Result<()> {
        self.flush_tms(true)
    }

    /// Clock TCK `cycles` times without leaving the current state.  TMS stays high in
    /// Test-Logic-Reset and low everywhere else.
    pub fn toggle_clk(&mut self, cycles: usize) -> Result<()> {
        self.flush_tms(false)?;
        self.cable.toggle_clk(self.state == Reset, false, cycles)
    }

    /// Shift `bits` through the register the TAPs are currently shifting.  With `last`, TMS rises
    /// on the final bit and the state moves on to Exit1-DR or Exit1-IR.
    pub fn read_write(&mut self, tdi: Option<&[u8]>, tdo: Option<&mut [u8]>, bits: usize,
                      last: bool) -> Result<()> {
        let reg = match self.state {
            ShiftDR => Register::Data,
            ShiftIR => Register::Instruction,
            _ => return Err(Error::InvalidArgument("not in Shift-DR or Shift-IR")),
        };
        if bits == 0 {
            return Err(Error::InvalidArgument("shift length must be non-zero"));
        }
        let bytes = bits.div_ceil(8);
        if tdi.is_some_and(|tdi| tdi.len() < bytes) {
            return Err(Error::InvalidArgument("TDI buffer shorter than the shift length"));
        }
        if tdo.as_ref().is_some_and(|tdo| tdo.len() < bytes) {
            return Err(Error::InvalidArgument("TDO buffer shorter than the shift length"));
        }

        self.flush_tms(false)?;
        self.cable.shift_bits(tdi, tdo, bits, last)?;
        if last {
            self.state = reg.exit_state();
        }
        Ok(())
    }

    fn shift_into(&mut self, reg: Register, tdi: Option<&[u8]>, tdo: Option<&mut [u8]>,
                  bits: usize, end_state: JtagState) -> Result<()> {
        let shift = reg.shift_state();
        if end_state == Unknown {
            return Err(Error::InvalidArgument("cannot move into the Unknown state"));
        }
        self.change_mode(shift)?;
        let leave = end_state != shift;
        self.read_write(tdi, tdo, bits, leave)?;
        if leave {
            self.change_mode(end_state)?;
        }
        Ok(())
    }

    /// Shift `bits` bits of `tdi` (LSB first, zeros if `None`) into `reg` and return what came
    /// out of TDO.  The state ends up in `end_state`, usually `JtagState::Idle`.
    pub fn shift(&mut self, reg: Register, tdi: Option<&[u8]>, bits: usize,
                 end_state: JtagState) -> Result<Vec<u8>> {
        let mut tdo = vec![0; bits.div_ceil(8)];
        self.shift_into(reg, tdi, Some(&mut tdo), bits, end_state)?;
        Ok(tdo)
    }

    /// Like `shift` without reading TDO back, so nothing forces a USB round trip
    pub fn write_reg(&mut self, reg: Register, tdi: &[u8], bits: usize,
                     end_state: JtagState) -> Result<()> {
        self.shift_into(reg, Some(tdi), None, bits, end_state)
    }

    /// Read `bits` from either the instruction or data register, shifting in zeros
    pub fn read_reg(&mut self, reg: Register, bits: usize, end_state: JtagState) -> Result<Vec<u8>> {
        self.shift(reg, None, bits, end_state)
    }

    /// Write an instruction of up to 8 bits
    pub fn shift_ir_byte(&mut self, ir: u8, bits: usize, end_state: JtagState) -> Result<()> {
        if bits > 8 {
            return Err(Error::InvalidArgument("instruction does not fit in one byte"));
        }
        self.write_reg(Register::Instruction, &[ir], bits, end_state)
    }
}
