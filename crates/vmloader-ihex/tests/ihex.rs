use std::path::PathBuf;

use vmloader_core::{AddressSpace, LoaderError, Pa, PagedMemory, ResetMode, RomRegistry};
use vmloader_ihex::{HexError, load_targphys_hex, parse_hex_blob};

///////////////////////////////////////////////////////////////////////////////
// Test Helpers
///////////////////////////////////////////////////////////////////////////////

/// A file under the temporary directory, removed on drop.
struct TempFile(PathBuf);

impl TempFile {
    fn new(name: &str, content: &[u8]) -> Result<Self, HexError> {
        let path = std::env::temp_dir().join(format!(
            "vmloader-ihex-{}-{}",
            std::process::id(),
            name
        ));

        std::fs::write(&path, content)?;
        Ok(Self(path))
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// Formats a record, computing its checksum.
fn record(kind: u8, address: u16, data: &[u8]) -> String {
    let mut bytes = vec![data.len() as u8];
    bytes.extend_from_slice(&address.to_be_bytes());
    bytes.push(kind);
    bytes.extend_from_slice(data);

    let sum = bytes.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte));
    bytes.push(sum.wrapping_neg());

    let digits: String = bytes.iter().map(|byte| format!("{byte:02X}")).collect();
    format!(":{digits}\n")
}

fn eof() -> String {
    record(1, 0, &[])
}

fn materialize(registry: &mut RomRegistry) -> Result<PagedMemory, LoaderError> {
    let mut memory = PagedMemory::new();
    registry.check_and_register_reset(&memory)?;
    registry.reset(&mut memory, ResetMode::Normal)?;
    Ok(memory)
}

fn parse(registry: &mut RomRegistry, text: &str) -> Result<vmloader_core::ImageInfo, HexError> {
    parse_hex_blob(registry, "test.hex", text.as_bytes(), AddressSpace::SYSTEM)
}

///////////////////////////////////////////////////////////////////////////////
// Loading
///////////////////////////////////////////////////////////////////////////////

#[test]
fn non_contiguous_records_form_separate_regions() -> Result<(), HexError> {
    let text = [
        record(0, 0x0000, &[1, 2, 3, 4]),
        record(0, 0x0004, &[5, 6]),
        record(0, 0x0100, &[7, 8, 9]),
        eof(),
    ]
    .concat();

    let mut registry = RomRegistry::new();
    let info = parse(&mut registry, &text)?;

    assert_eq!(info.size, 9);
    assert_eq!(info.low, Pa(0));
    assert_eq!(info.high, Pa(0x103));

    let regions: Vec<_> = registry
        .info()
        .into_iter()
        .map(|rom| (rom.address, rom.data_size))
        .collect();
    assert_eq!(regions, [(Some(Pa(0)), 6u64), (Some(Pa(0x100)), 3u64)]);

    let memory = materialize(&mut registry)?;
    assert_eq!(memory.read_vec(AddressSpace::SYSTEM, Pa(0), 6), [1u8, 2, 3, 4, 5, 6]);
    assert_eq!(memory.read_vec(AddressSpace::SYSTEM, Pa(0x100), 3), [7u8, 8, 9]);
    Ok(())
}

#[test]
fn extended_linear_address_relocates_data() -> Result<(), HexError> {
    let text = [
        record(4, 0, &[0x08, 0x00]),
        record(0, 0x0010, &[0xde, 0xad, 0xbe, 0xef]),
        record(5, 0, &[0x08, 0x00, 0x00, 0x11]),
        eof(),
    ]
    .concat();

    let mut registry = RomRegistry::new();
    let info = parse(&mut registry, &text)?;

    assert_eq!(info.entry, Some(Pa(0x0800_0011)));
    assert_eq!(info.low, Pa(0x0800_0010));

    let memory = materialize(&mut registry)?;
    assert_eq!(
        memory.read_vec(AddressSpace::SYSTEM, Pa(0x0800_0010), 4),
        [0xdeu8, 0xad, 0xbe, 0xef]
    );
    Ok(())
}

#[test]
fn data_crossing_a_64k_boundary_stays_contiguous() -> Result<(), HexError> {
    let text = [
        record(4, 0, &[0x00, 0x01]),
        record(0, 0xfffe, &[1, 2]),
        record(0, 0x0000, &[3, 4]),
        eof(),
    ]
    .concat();

    let mut registry = RomRegistry::new();
    parse(&mut registry, &text)?;

    let regions: Vec<_> = registry
        .info()
        .into_iter()
        .map(|rom| (rom.address, rom.data_size))
        .collect();
    assert_eq!(regions, [(Some(Pa(0x1_fffe)), 4u64)]);
    Ok(())
}

#[test]
fn load_from_path() -> Result<(), HexError> {
    let text = [record(0, 0x2000, b"hello"), record(3, 0, &[0xf0, 0x00, 0x00, 0x10]), eof()].concat();
    let file = TempFile::new("hello.hex", text.as_bytes())?;

    let mut registry = RomRegistry::new();
    let info = load_targphys_hex(&mut registry, &file.0)?;

    assert_eq!(info.size, 5);
    assert_eq!(info.entry, Some(Pa(0xf_0010)));
    assert_eq!(registry.len(), 1);
    Ok(())
}

#[test]
fn missing_file() {
    let mut registry = RomRegistry::new();
    let result = load_targphys_hex(&mut registry, "/nonexistent/firmware.hex");

    assert!(matches!(result, Err(HexError::Io(_))));
}

///////////////////////////////////////////////////////////////////////////////
// Rollback
///////////////////////////////////////////////////////////////////////////////

#[test]
fn checksum_error_rolls_back() -> Result<(), HexError> {
    let mut registry = RomRegistry::new();
    registry.add_blob_fixed("bios", vec![0xffu8; 0x100], 0xf_0000u64)?;
    let snapshot = registry.info();

    // Correct checksum is E4.
    let bad = ":03010000070809E5\n".to_string();

    let text = [
        record(0, 0x0000, &[1, 2, 3, 4]),
        record(0, 0x0080, &[5, 6]),
        bad,
        eof(),
    ]
    .concat();

    let result = parse(&mut registry, &text);

    assert!(matches!(result, Err(HexError::Checksum { line: 3 })));
    assert_eq!(registry.info(), snapshot);
    assert!(!registry.in_transaction());
    Ok(())
}

#[test]
fn registry_errors_roll_back() -> Result<(), HexError> {
    let mut registry = RomRegistry::new();

    let text = [record(0, 0x0000, &[1, 2]), record(0, 0x0100, &[3, 4]), eof()].concat();
    parse(&mut registry, &text)?;

    registry.check_and_register_reset(&PagedMemory::new())?;
    let snapshot = registry.info();

    let result = parse(&mut registry, &text);
    assert!(matches!(result, Err(HexError::Loader(LoaderError::Finalized))));
    assert_eq!(registry.info(), snapshot);
    Ok(())
}

#[test]
fn caller_transaction_owns_the_rollback() -> Result<(), HexError> {
    let mut registry = RomRegistry::new();
    let text = [record(0, 0x0000, &[1, 2]), eof()].concat();

    registry.begin_transaction()?;
    parse(&mut registry, &text)?;
    assert!(registry.in_transaction());

    registry.end_transaction(false)?;
    assert!(registry.is_empty());
    Ok(())
}
