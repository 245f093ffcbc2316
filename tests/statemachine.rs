mod common;

use common::{SimChain, SimTap};
use jtag_mpsse::statemachine::{path_to, JtagSM, JtagState, Register, RESET_CYCLES};
use jtag_mpsse::Error;
use proptest::prelude::*;

fn state() -> impl Strategy<Value = JtagState> {
    prop::sample::select(JtagState::ALL.to_vec())
}

fn replay(from: JtagState, path: &[bool]) -> JtagState {
    path.iter().fold(from, |s, &tms| s.next(tms))
}

proptest! {
    #[test]
    fn paths_reach_their_target(from in state(), to in state()) {
        let path = path_to(from, to);
        prop_assert_eq!(replay(from, &path), to);
        if from == to {
            prop_assert!(path.is_empty());
        }
    }

    #[test]
    fn reset_is_never_far(from in state()) {
        prop_assert!(path_to(from, JtagState::Reset).len() <= RESET_CYCLES);
    }

    #[test]
    fn hardware_follows_the_tracked_state(targets in prop::collection::vec(state(), 1..20)) {
        let mut sim = SimChain::new(vec![SimTap::new(Some(0x0362_d093), 6)]);
        let mut sm = JtagSM::new(&mut sim);
        for target in targets {
            sm.change_mode(target).unwrap();
            sm.flush().unwrap();
            prop_assert_eq!(sm.cable.state, target);
            prop_assert_eq!(sm.state(), target);
        }
    }
}

#[test]
fn starts_unknown_and_resets() {
    let mut sim = SimChain::new(vec![]);
    sim.state = JtagState::PauseIR;
    let mut sm = JtagSM::new(&mut sim);
    assert_eq!(sm.state(), JtagState::Unknown);
    assert!(matches!(sm.change_mode(JtagState::Unknown), Err(Error::InvalidArgument(_))));

    sm.mode_reset().unwrap();
    assert_eq!(sm.state(), JtagState::Reset);
    sm.flush().unwrap();
    assert_eq!(sm.cable.state, JtagState::Reset);
    assert_eq!(sm.cable.trace.len(), RESET_CYCLES);
    assert!(sm.cable.trace.iter().all(|&(_, tms, _)| tms));
}

#[test]
fn tms_buffer_flushes_itself_when_full() {
    let mut sim = SimChain::new(vec![]);
    // 8 buffered transitions at most
    sim.buffer_size = 1;
    let mut sm = JtagSM::new(&mut sim);

    // 5 reset clocks, then Idle, SelectDR, SelectIR, CaptureIR, ShiftIR
    sm.change_mode(JtagState::ShiftIR).unwrap();
    assert_eq!(sm.cable.trace.len(), 8);
    assert_eq!(sm.pending_tms(), 2);
    assert_eq!(sm.cable.flushes, 0);

    sm.flush().unwrap();
    assert_eq!(sm.pending_tms(), 0);
    assert_eq!(sm.cable.trace.len(), 10);
    assert_eq!(sm.cable.flushes, 1);
    assert_eq!(sm.cable.state, JtagState::ShiftIR);
}

#[test]
fn instruction_shift_raises_tms_with_the_last_bit() {
    let mut sim = SimChain::new(vec![SimTap::new(None, 3)]);
    let mut sm = JtagSM::new(&mut sim);
    sm.mode_reset().unwrap();
    sm.change_mode(JtagState::Idle).unwrap();
    sm.flush().unwrap();
    sm.cable.trace.clear();

    sm.write_reg(Register::Instruction, &[0b101], 3, JtagState::Idle).unwrap();
    sm.flush().unwrap();

    use JtagState::*;
    assert_eq!(sm.cable.states(), [Idle, SelectDR, SelectIR, CaptureIR, ShiftIR, ShiftIR,
                                   ShiftIR, Exit1IR, UpdateIR]);
    let shifted: Vec<(bool, bool)> = sm.cable.trace.iter()
        .filter(|&&(s, _, _)| s == ShiftIR)
        .map(|&(_, tms, tdi)| (tms, tdi))
        .collect();
    assert_eq!(shifted, [(false, true), (false, false), (true, true)]);
    assert_eq!(sm.cable.state, Idle);
    assert_eq!(sm.cable.taps[0].instruction, [true, false, true]);
}

#[test]
fn bypass_delays_by_one_bit() {
    for bits in 1..=256usize {
        let mut sim = SimChain::new(vec![SimTap::new(None, 4)]);
        let mut sm = JtagSM::new(&mut sim);
        sm.mode_reset().unwrap();

        let tdi: Vec<u8> = (0..bits.div_ceil(8)).map(|i| (i as u8).wrapping_mul(0x5b) ^ 0xa7).collect();
        let tdo = sm.shift(Register::Data, Some(&tdi), bits, JtagState::Idle).unwrap();
        assert_eq!(tdo.len(), bits.div_ceil(8));

        let bit = |data: &[u8], i: usize| data[i / 8] & (1 << (i % 8)) != 0;
        assert!(!bit(&tdo, 0), "{} bits", bits);
        for i in 1..bits {
            assert_eq!(bit(&tdo, i), bit(&tdi, i - 1), "bit {} of {}", i, bits);
        }
        assert_eq!(sm.state(), JtagState::Idle);
    }
}

#[test]
fn reads_idcode_after_reset() {
    let mut sim = SimChain::new(vec![SimTap::new(Some(0x0362_d093), 6)]);
    let mut sm = JtagSM::new(&mut sim);
    sm.mode_reset().unwrap();
    let tdo = sm.read_reg(Register::Data, 32, JtagState::Idle).unwrap();
    assert_eq!(tdo, 0x0362_d093u32.to_le_bytes());
}

#[test]
fn stays_in_shift_when_asked() {
    let mut sim = SimChain::new(vec![SimTap::new(Some(0x0362_d093), 6)]);
    let mut sm = JtagSM::new(&mut sim);
    sm.mode_reset().unwrap();

    // Two halves of the same register
    let low = sm.shift(Register::Data, None, 16, JtagState::ShiftDR).unwrap();
    assert_eq!(sm.state(), JtagState::ShiftDR);
    let high = sm.shift(Register::Data, None, 16, JtagState::Idle).unwrap();
    assert_eq!([low, high].concat(), 0x0362_d093u32.to_le_bytes());
}

#[test]
fn invalid_shifts_are_refused() {
    let mut sim = SimChain::new(vec![]);
    let mut sm = JtagSM::new(&mut sim);
    sm.mode_reset().unwrap();
    assert!(matches!(sm.read_write(None, None, 8, false), Err(Error::InvalidArgument(_))));

    sm.change_mode(JtagState::ShiftDR).unwrap();
    assert!(matches!(sm.read_write(None, None, 0, false), Err(Error::InvalidArgument(_))));
    assert!(matches!(sm.read_write(Some(&[0]), None, 9, false), Err(Error::InvalidArgument(_))));
    assert!(matches!(sm.shift_ir_byte(0, 9, JtagState::Idle), Err(Error::InvalidArgument(_))));
}

#[test]
fn toggle_clk_keeps_the_state() {
    let mut sim = SimChain::new(vec![]);
    let mut sm = JtagSM::new(&mut sim);
    sm.mode_reset().unwrap();
    sm.change_mode(JtagState::Idle).unwrap();
    sm.toggle_clk(10).unwrap();
    sm.flush().unwrap();

    assert_eq!(sm.cable.state, JtagState::Idle);
    let idle: Vec<_> = sm.cable.trace.iter().skip(RESET_CYCLES + 1).collect();
    assert_eq!(idle.len(), 10);
    assert!(idle.iter().all(|&&(s, tms, _)| s == JtagState::Idle && !tms));
}
