mod address;
mod hex;
pub(crate) mod macros;
mod memory_access;

pub use self::{
    address::{AddressSpace, Pa, RegionHandle},
    hex::{Hex, HexDump},
    memory_access::MemoryAccess,
};
