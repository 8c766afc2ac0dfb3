//! gzip decompression for compressed guest images.
//!
//! Kernels and ramdisks are often shipped gzip-compressed, either bare or
//! wrapped in a container such as a U-Boot image or a Linux EFI zboot
//! executable. This crate skips the gzip member header and inflates the
//! raw DEFLATE stream behind it.

mod error;
mod inflate;
mod load;
mod zboot;

pub use self::{
    error::GzipError,
    inflate::{GZIP_MAGIC, gunzip, gunzip_vec, is_gzip, skip_gzip_header},
    load::{load_image_gzipped, load_image_gzipped_buffer},
    zboot::{ZbootHeader, unpack_efi_zboot_image},
};

/// Upper bound for decompressed images and EFI zboot payloads.
pub const MAX_GUNZIP_BYTES: usize = 256 << 20;
