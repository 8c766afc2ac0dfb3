use serde::{Deserialize, Serialize};

use super::macros::impl_ops;

impl_ops!(Pa, u64, "Guest Physical Address");

/// An address space identifier.
///
/// The registry treats address spaces as opaque, ordered partition keys.
/// Resolving an identifier to writable memory is the job of the
/// [`GuestMemory`] implementation.
///
/// [`GuestMemory`]: crate::GuestMemory
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AddressSpace(pub u16);

impl AddressSpace {
    /// The default system memory address space.
    pub const SYSTEM: Self = Self(0);
}

impl std::fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> ::std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A handle to an externally owned memory region.
///
/// Regions placed through a handle are not positioned in any address space
/// by the registry; the owner of the handle decides where the region lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionHandle(pub u32);

impl std::fmt::Display for RegionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> ::std::fmt::Result {
        write!(f, "region#{}", self.0)
    }
}
