//! Guest image loading for machine emulators.
//!
//! This crate re-exports the format crates selected by Cargo features on top
//! of the [`vmloader_core`] registry, and adds [`load_kernel`], which tries
//! the kernel formats a board typically accepts one after another.
//!
//! | Feature | Crate |
//! |---------|-------|
//! | `aout`  | [`aout`] |
//! | `elf`   | [`elf`] |
//! | `gzip`  | [`gzip`] |
//! | `ihex`  | [`ihex`] |
//! | `uboot` | [`uboot`] (implies `gzip`) |

mod probe;

pub use vmloader_core::*;
#[cfg(feature = "aout")]
pub use vmloader_aout as aout;
#[cfg(feature = "elf")]
pub use vmloader_elf as elf;
#[cfg(feature = "gzip")]
pub use vmloader_gzip as gzip;
#[cfg(feature = "ihex")]
pub use vmloader_ihex as ihex;
#[cfg(feature = "uboot")]
pub use vmloader_uboot as uboot;

pub use self::probe::{KernelFormat, KernelImage, ProbeOptions, load_kernel, load_kernel_mapped};
