use std::path::Path;

use vmloader_core::{AddressSpace, ImageInfo, MappedFile, RomRegistry};

use crate::{HexBlob, HexError, HexParser};

/// Loads the Intel HEX file at `path` into the system address space.
///
/// Returns the total number of data bytes and the start address, if the
/// file declares one.
pub fn load_targphys_hex(
    registry: &mut RomRegistry,
    path: impl AsRef<Path>,
) -> Result<ImageInfo, HexError> {
    load_targphys_hex_as(registry, path, AddressSpace::SYSTEM)
}

/// Loads the Intel HEX file at `path` into `space`.
pub fn load_targphys_hex_as(
    registry: &mut RomRegistry,
    path: impl AsRef<Path>,
    space: AddressSpace,
) -> Result<ImageInfo, HexError> {
    let path = path.as_ref();
    let file = MappedFile::open(path).inspect_err(|err| {
        tracing::warn!(path = %path.display(), %err, "unable to open hex file");
    })?;

    parse_hex_blob(registry, &path.display().to_string(), &file, space)
}

/// Decodes `blob` and registers each contiguous run of data as a region
/// named `name`.
///
/// Either all regions are registered or, on error, none are.
pub fn parse_hex_blob(
    registry: &mut RomRegistry,
    name: &str,
    blob: &[u8],
    space: AddressSpace,
) -> Result<ImageInfo, HexError> {
    let register = |registry: &mut RomRegistry| {
        let mut sink = |run: HexBlob| -> Result<(), HexError> {
            registry.add_blob_fixed_as(name, run.data, u64::from(run.address), space)?;
            Ok(())
        };

        let mut parser = HexParser::new();
        for &ch in blob {
            if parser.is_complete() {
                break;
            }

            parser.feed(ch, &mut sink)?;
        }

        parser.finish(&mut sink)
    };

    let result = if registry.in_transaction() {
        register(registry)
    }
    else {
        registry.transaction(register)
    };

    let info = result.inspect_err(|err| {
        tracing::warn!(name, %err, "unable to load hex file");
    })?;

    tracing::debug!(
        name,
        low = %info.low,
        high = %info.high,
        size = info.size,
        "hex file loaded"
    );

    Ok(info)
}
