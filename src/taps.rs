//! A convenience wrapper for JTAG scan chains with multiple TAPs present.  `Taps` scans the chain
//! for IDCODEs and then allows the client to interact with one selected TAP as if it were the
//! only TAP in the chain, so that the client doesn't have to deal with putting the other TAPs
//! into bypass and shifting data through the bypass registers.
//!
//! Devices are numbered in scan order: index 0 is the device closest to TDI.
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use log::{debug, warn};

use crate::cable::Cable;
use crate::error::{Error, Result};
use crate::registry::{DeviceModel, ModelId, ModelRegistry};
use crate::statemachine::{JtagSM, JtagState, Register};

/// Width of an IDCODE register
pub const IDCODE_BITS: usize = 32;

/// Instruction register width assumed for devices the registry does not know.  This is a guess:
/// a run of several unknown devices will make the instruction padding wrong.
pub const FALLBACK_IRLENGTH: u16 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DetectedDevice {
    pub idcode: u32,
    pub irlength: u16,
    /// Not a programming target, or not known to the registry
    pub is_misc: bool,
    pub model: Option<ModelId>,
}

impl DetectedDevice {
    /// JEDEC manufacturer code (bank and id)
    pub fn manufacturer(&self) -> u16 {
        ((self.idcode >> 1) & 0x7ff) as u16
    }

    pub fn part(&self) -> u16 {
        ((self.idcode >> 12) & 0xffff) as u16
    }

    pub fn version(&self) -> u8 {
        (self.idcode >> 28) as u8
    }
}

pub struct Taps<T> {
    pub sm: JtagSM<T>,
    registry: Box<dyn ModelRegistry>,
    devices: Vec<DetectedDevice>,
    selected: Option<usize>,
}

impl<T, U> Taps<T>
    where T: core::ops::DerefMut<Target=U>,
          U: Cable + ?Sized
{
    /// Create an object using an existing `JtagSM` object and a registry of known parts
    pub fn new<R: ModelRegistry + 'static>(sm: JtagSM<T>, registry: R) -> Self {
        Self {
            sm,
            registry: Box::new(registry),
            devices: Vec::new(),
            selected: None,
        }
    }

    /// Devices on the chain, closest to TDI first
    pub fn devices(&self) -> &[DetectedDevice] {
        &self.devices
    }

    /// Index of the device `shift_ir`/`shift_dr` talk to
    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn target_idcode(&self) -> Option<u32> {
        self.selected.map(|i| self.devices[i].idcode)
    }

    /// Number of devices that are programming targets
    pub fn target_count(&self) -> usize {
        self.devices.iter().filter(|d| !d.is_misc).count()
    }

    /// The registry entry behind a detected device
    pub fn model_of(&self, index: usize) -> Option<&DeviceModel> {
        let id = self.devices.get(index)?.model?;
        self.registry.resolve(id.0)
    }

    fn identify(&self, idcode: u32) -> DetectedDevice {
        match self.registry.resolve(idcode) {
            Some(model) => {
                debug!("IDCODE 0x{:08x}: {} (IR {} bits)", idcode, model.name, model.irlength);
                DetectedDevice {
                    idcode,
                    irlength: model.irlength,
                    is_misc: model.misc,
                    model: Some(model.id()),
                }
            }
            None => {
                warn!("unknown IDCODE 0x{:08x}, assuming a {} bit instruction register",
                      idcode, FALLBACK_IRLENGTH);
                DetectedDevice {
                    idcode,
                    irlength: FALLBACK_IRLENGTH,
                    is_misc: true,
                    model: None,
                }
            }
        }
    }

    /// Reset the chain and read up to `max_devices` IDCODEs out of the data registers.  Scanning
    /// stops early once TDO reads back as all ones or all zeros.  The first target device is
    /// selected; an empty result is not an error.
    pub fn detect_chain(&mut self, max_devices: usize) -> Result<&[DetectedDevice]> {
        self.devices.clear();
        self.selected = None;
        if max_devices == 0 {
            return Ok(&self.devices);
        }

        self.sm.mode_reset()?;
        self.sm.change_mode(JtagState::ShiftDR)?;

        let probe = [0xff; IDCODE_BITS / 8];
        let mut found = Vec::new();
        for i in 0..max_devices {
            let mut word = [0; IDCODE_BITS / 8];
            let last = i == max_devices - 1;
            self.sm.read_write(Some(&probe), Some(&mut word), IDCODE_BITS, last)?;

            let idcode = u32::from_le_bytes(word);
            if idcode == 0 || idcode == u32::MAX {
                break;
            }
            if idcode & 1 == 0 {
                debug!("IDCODE 0x{:08x} lacks the mandatory LSB marker", idcode);
            }
            found.push(self.identify(idcode));
        }

        self.sm.change_mode(JtagState::Reset)?;
        self.sm.flush()?;

        // The device nearest to TDO answers first
        found.reverse();
        self.devices = found;
        self.selected = self.devices.iter().position(|d| !d.is_misc);
        debug!("found {} devices, selected {:?}", self.devices.len(), self.selected);
        Ok(&self.devices)
    }

    /// Put a device in front of the chain without probing the hardware, for chains whose
    /// topology is known in advance.  The currently selected device stays selected.
    pub fn insert_first(&mut self, idcode: u32, is_misc: bool, irlength: u16,
                        model: Option<ModelId>) -> Result<()> {
        if self.devices.first().is_some_and(|d| d.idcode == idcode) {
            return Err(Error::DuplicateDevice(idcode));
        }
        if irlength == 0 {
            return Err(Error::InvalidArgument("instruction register length must be non-zero"));
        }

        self.devices.insert(0, DetectedDevice {
            idcode,
            irlength,
            is_misc,
            model,
        });
        self.selected = match self.selected {
            Some(i) => Some(i + 1),
            None if !is_misc => Some(0),
            None => None,
        };
        Ok(())
    }

    /// Select which TAP in the scan chain to operate upon
    pub fn device_select(&mut self, index: usize) -> Result<usize> {
        if index >= self.devices.len() {
            return Err(Error::InvalidIndex {
                index,
                len: self.devices.len(),
            });
        }
        self.selected = Some(index);
        Ok(index)
    }

    /// Bits to shift before and after the selected device's own bits
    fn padding(&self, reg: Register) -> Result<(usize, usize)> {
        let index = self
            .selected
            .ok_or(Error::InvalidArgument("no device selected"))?;
        Ok(match reg {
            Register::Instruction => (
                self.devices[index + 1..].iter().map(|d| d.irlength as usize).sum(),
                self.devices[..index].iter().map(|d| d.irlength as usize).sum(),
            ),
            Register::Data => (self.devices.len() - index - 1, index),
        })
    }

    fn shift_selected(&mut self, reg: Register, tdi: Option<&[u8]>, tdo: Option<&mut [u8]>,
                      bits: usize, end_state: JtagState) -> Result<()> {
        if end_state == JtagState::Unknown {
            return Err(Error::InvalidArgument("cannot move into the Unknown state"));
        }
        let (before, after) = self.padding(reg)?;
        // BYPASS is the all-ones instruction; bypass data registers take anything
        let fill = |bits: usize| match reg {
            Register::Instruction => vec![0xff; bits.div_ceil(8)],
            Register::Data => vec![0; bits.div_ceil(8)],
        };

        let shift = reg.shift_state();
        if self.sm.state() != shift {
            self.sm.change_mode(shift)?;
            if before > 0 {
                self.sm.read_write(Some(&fill(before)), None, before, false)?;
            }
        }

        let leave = end_state != shift;
        self.sm.read_write(tdi, tdo, bits, leave && after == 0)?;
        if leave {
            if after > 0 {
                self.sm.read_write(Some(&fill(after)), None, after, true)?;
            }
            self.sm.change_mode(end_state)?;
        }
        Ok(())
    }

    /// Shift `ir` into the instruction register of the selected TAP, the others get BYPASS.
    /// Returns the bits captured from the selected TAP.
    pub fn shift_ir(&mut self, ir: &[u8], bits: usize, end_state: JtagState) -> Result<Vec<u8>> {
        let mut tdo = vec![0; bits.div_ceil(8)];
        self.shift_selected(Register::Instruction, Some(ir), Some(&mut tdo), bits, end_state)?;
        Ok(tdo)
    }

    /// Like `shift_ir` without reading anything back
    pub fn write_ir(&mut self, ir: &[u8], bits: usize, end_state: JtagState) -> Result<()> {
        self.shift_selected(Register::Instruction, Some(ir), None, bits, end_state)
    }

    /// Shift `dr` (zeros if `None`) through the data register of the selected TAP and return
    /// what it held
    pub fn shift_dr(&mut self, dr: Option<&[u8]>, bits: usize,
                    end_state: JtagState) -> Result<Vec<u8>> {
        let mut tdo = vec![0; bits.div_ceil(8)];
        self.shift_selected(Register::Data, dr, Some(&mut tdo), bits, end_state)?;
        Ok(tdo)
    }

    /// Like `shift_dr` without reading anything back
    pub fn write_dr(&mut self, dr: &[u8], bits: usize, end_state: JtagState) -> Result<()> {
        self.shift_selected(Register::Data, Some(dr), None, bits, end_state)
    }
}
