//! This crate drives a JTAG scan chain through FTDI MPSSE adapters.  At the lowest level a
//! `Cable` shifts raw TMS and TDI/TDO bits; `cable::mpsse::Mpsse` implements it on top of a
//! USB connection to an FT2232/FT232H/FT4232 style adapter, batching commands so that a whole
//! scan needs as few USB round trips as possible.  `cable::gpio::Gpio` implements the same trait
//! with plain `embedded-hal` pins.
//!
//! The next higher level of abstraction is the `JtagSM`, which keeps track of the state of the
//! TAPs.  You tell it which state you want (e.g., Reset or Idle) and it gets there with the
//! fewest number of TMS transitions, buffering them until data actually has to move.  `shift`
//! takes care of getting to ShiftDR or ShiftIR, raising TMS with the final bit and moving on to
//! the requested end state.
//!
//! If there are multiple TAPs in the JTAG chain, you probably want `Taps`.  It scans the chain
//! for IDCODEs, resolves them through a `ModelRegistry`, and lets you shift the instruction and
//! data registers of one selected device while the others sit in BYPASS.
//!
//! # Example
//! ```no_run
//! use jtag_mpsse::cable::config::{CableConfig, DeviceSelector};
//! use jtag_mpsse::cable::mpsse::Mpsse;
//! use jtag_mpsse::registry::ModelTable;
//! use jtag_mpsse::statemachine::{JtagSM, JtagState};
//! use jtag_mpsse::taps::Taps;
//!
//! let config = CableConfig::by_name("ft2232")?;
//! let cable = Mpsse::open(&config, &DeviceSelector::Any, 6_000_000)?;
//! let jtag = JtagSM::new(Box::new(cable));
//! let mut taps = Taps::new(jtag, ModelTable::default());
//! taps.detect_chain(8)?;
//!
//! taps.device_select(0)?;
//! taps.write_ir(&[0x09], 6, JtagState::Idle)?;
//! let idcode = taps.shift_dr(None, 32, JtagState::Idle)?;
//! # Ok::<(), jtag_mpsse::Error>(())
//! ```

#![cfg_attr(not(test), no_std)]

#[cfg(all(feature = "std", not(test)))]
extern crate std;

extern crate alloc;

pub mod cable;
pub mod error;
pub mod registry;
pub mod statemachine;
pub mod taps;

pub use error::{Error, Result};
