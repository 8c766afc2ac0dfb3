//! Loads a kernel image the way a board would and prints where it went.
//!
//! ```text
//! cargo run --example load-kernel -- <image> [fallback address] [elf machine]
//! ```

use vmloader::{Hex, PagedMemory, ProbeOptions, ResetMode, RomRegistry, load_kernel};

fn parse_u64(value: &str) -> Result<u64, std::num::ParseIntError> {
    match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next()
    else {
        eprintln!("usage: load-kernel <image> [fallback address] [elf machine]");
        std::process::exit(1);
    };

    let address = args.next().as_deref().map(parse_u64).transpose()?.unwrap_or(0x4008_0000);
    let machine = args.next().as_deref().map(str::parse::<u16>).transpose()?.unwrap_or(0);

    let mut registry = RomRegistry::new();
    let kernel = load_kernel(&mut registry, &path, &ProbeOptions::new(machine, address))?;

    println!("format: {:?}", kernel.format);
    println!("entry:  {:?}", kernel.info.entry);
    println!("extent: {} - {}", kernel.info.low, kernel.info.high);

    // Materialize the image the way a machine reset would.
    let mut memory = PagedMemory::new();
    registry.check_and_register_reset(&memory)?;
    registry.reset(&mut memory, ResetMode::Normal)?;

    for rom in registry.info() {
        println!(
            "{:<40} {:?} {:?}",
            rom.name,
            rom.address,
            Hex(rom.data_size)
        );
    }

    Ok(())
}
