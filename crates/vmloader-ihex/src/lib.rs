//! Intel HEX image loading.
//!
//! Records are decoded as a stream. Runs of contiguous data become separate
//! regions in the ROM registry, registered in a single transaction so that a
//! malformed file leaves nothing behind.
//!
//! ```no_run
//! # use vmloader_core::RomRegistry;
//! # fn main() -> Result<(), vmloader_ihex::HexError> {
//! let mut registry = RomRegistry::new();
//! let info = vmloader_ihex::load_targphys_hex(&mut registry, "firmware.hex")?;
//! println!("{} bytes, entry {:?}", info.size, info.entry);
//! # Ok(())
//! # }
//! ```

mod error;
mod load;
mod parser;
mod record;

pub use self::{
    error::HexError,
    load::{load_targphys_hex, load_targphys_hex_as, parse_hex_blob},
    parser::{HexBlob, HexParser},
    record::RecordType,
};
