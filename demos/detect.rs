//! Scan the JTAG chain behind an FTDI cable and list what answers.
//!
//! ```sh
//! RUST_LOG=debug cargo run --example detect -- digilent_hs2 [serial | bus:addr]
//! ```
use jtag_mpsse::cable::config::{CableConfig, DeviceSelector};
use jtag_mpsse::cable::mpsse::Mpsse;
use jtag_mpsse::cable::Cable;
use jtag_mpsse::registry::{DeviceModel, ModelTable};
use jtag_mpsse::statemachine::{JtagSM, JtagState};
use jtag_mpsse::taps::Taps;

fn main() -> Result<(), jtag_mpsse::Error> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(name) = args.next() else {
        eprintln!("usage: detect <cable> [serial | bus:addr]");
        eprintln!("cables: {}", CableConfig::known_names().collect::<Vec<_>>().join(", "));
        std::process::exit(2);
    };
    let selector: DeviceSelector = args.next().unwrap_or_default().parse()?;

    let config = CableConfig::by_name(&name)?;
    let cable = Mpsse::open(&config, &selector, 6_000_000)?;
    println!("{:?}, TCK {} Hz", cable.chip(), cable.clock());

    let registry: ModelTable = [
        DeviceModel::new(0x0362_d093, "xc7a35t", 6),
        DeviceModel::new(0x0362_c093, "xc7a50t", 6),
        DeviceModel::new(0x0372_7093, "xc7z020", 6),
        DeviceModel::new(0x4ba0_0477, "ARM CoreSight DAP", 4).misc(),
        DeviceModel::new(0x0100_81b3, "ECP5 LFE5U-25", 8),
    ]
    .into_iter()
    .collect();

    let jtag = JtagSM::new(Box::new(cable));
    let mut taps = Taps::new(jtag, registry);
    let count = taps.detect_chain(16)?.len();
    if count == 0 {
        println!("no devices found; check wiring and target power");
        return Ok(());
    }

    for (i, device) in taps.devices().iter().enumerate() {
        let name = taps.model_of(i).map_or("unknown", |m| m.name.as_str());
        println!("{}: 0x{:08x} {} (manufacturer 0x{:03x}, part 0x{:04x}, version {}, IR {} bits{})",
                 i, device.idcode, name, device.manufacturer(), device.part(), device.version(),
                 device.irlength, if device.is_misc { ", misc" } else { "" });
    }

    if let Some(selected) = taps.selected() {
        // Read back the selected device's IDCODE through the bypassed chain
        taps.sm.mode_reset()?;
        let idcode = taps.shift_dr(None, 32, JtagState::Idle)?;
        println!("selected {}: 0x{:08x}", selected,
                 u32::from_le_bytes([idcode[0], idcode[1], idcode[2], idcode[3]]));
    }
    Ok(())
}
