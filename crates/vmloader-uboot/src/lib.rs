//! Legacy U-Boot image loading.
//!
//! A legacy image is a 64-byte big-endian header followed by a payload,
//! optionally gzip-compressed. Kernels are placed at the load address from
//! the header, ramdisks wherever the caller wants them.

mod error;
mod header;
mod load;

pub use self::{
    error::UbootError,
    header::{
        IH_ARCH_ARM64, IH_ARCH_PPC, IH_ARCH_RISCV, IH_COMP_GZIP, IH_COMP_NONE, IH_MAGIC,
        IH_OS_LINUX, IH_OS_VXWORKS, IH_TYPE_KERNEL, IH_TYPE_KERNEL_NOLOAD, IH_TYPE_RAMDISK,
        UbootHeader,
    },
    load::{UBOOT_MAX_GUNZIP_BYTES, UbootKernel, UbootLoader, load_ramdisk, load_uimage},
};
