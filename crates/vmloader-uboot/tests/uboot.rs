use std::path::PathBuf;

use vmloader_core::{AddressSpace, LoaderError, MappedFile, Pa, PagedMemory, ResetMode, RomRegistry};
use vmloader_uboot::{
    IH_ARCH_ARM64, IH_COMP_GZIP, IH_COMP_NONE, IH_MAGIC, IH_OS_LINUX, IH_OS_VXWORKS,
    IH_TYPE_KERNEL, IH_TYPE_KERNEL_NOLOAD, IH_TYPE_RAMDISK, UbootError, UbootHeader, UbootLoader,
    load_ramdisk, load_uimage,
};
use zerocopy::{IntoBytes as _, byteorder::U32};

///////////////////////////////////////////////////////////////////////////////
// Test Helpers
///////////////////////////////////////////////////////////////////////////////

/// A file under the temporary directory, removed on drop.
struct TempFile(PathBuf);

impl TempFile {
    fn new(name: &str, content: &[u8]) -> Result<Self, UbootError> {
        let path = std::env::temp_dir().join(format!(
            "vmloader-uboot-{}-{}",
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

struct Image {
    os: u8,
    arch: u8,
    kind: u8,
    comp: u8,
    load: u32,
    entry: u32,
}

impl Image {
    fn kernel(load: u32, entry: u32) -> Self {
        Self {
            os: IH_OS_LINUX,
            arch: IH_ARCH_ARM64,
            kind: IH_TYPE_KERNEL,
            comp: IH_COMP_NONE,
            load,
            entry,
        }
    }

    fn build(&self, payload: &[u8]) -> Vec<u8> {
        let mut ih_name = [0u8; 32];
        ih_name[..9].copy_from_slice(b"Linux-6.1");

        let header = UbootHeader {
            ih_magic: U32::new(IH_MAGIC),
            ih_hcrc: U32::new(0),
            ih_time: U32::new(0),
            ih_size: U32::new(payload.len() as u32),
            ih_load: U32::new(self.load),
            ih_ep: U32::new(self.entry),
            ih_dcrc: U32::new(0),
            ih_os: self.os,
            ih_arch: self.arch,
            ih_type: self.kind,
            ih_comp: self.comp,
            ih_name,
        };

        let mut result = header.as_bytes().to_vec();
        result.extend_from_slice(payload);
        result
    }
}

/// Wraps `data` in a gzip member made of stored DEFLATE blocks.
fn gzip(data: &[u8]) -> Vec<u8> {
    let mut out = vec![0x1f, 0x8b, 8, 0, 0, 0, 0, 0, 0, 0xff];

    let mut chunks = data.chunks(0xffff).peekable();
    while let Some(chunk) = chunks.next() {
        let len = chunk.len() as u16;

        out.push(u8::from(chunks.peek().is_none()));
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&(!len).to_le_bytes());
        out.extend_from_slice(chunk);
    }

    out.extend_from_slice(&[0; 8]);
    out
}

/// Boot log compressed with `gzip -9`, a single dynamic Huffman block.
const BOOT_LOG_GZ: [u8; 137] = [
    0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x03, 0x8d, 0x90,
    0x41, 0x0a, 0x83, 0x40, 0x10, 0x04, 0xef, 0x79, 0xc5, 0xbc, 0x20, 0x6c,
    0x8f, 0xce, 0xae, 0xe6, 0x2b, 0x92, 0x43, 0xd4, 0x20, 0x82, 0xc9, 0x8a,
    0x24, 0xbe, 0x3f, 0x2a, 0xc8, 0x9e, 0x36, 0x74, 0x9f, 0x8b, 0xa6, 0xa8,
    0x46, 0xb6, 0xb9, 0xab, 0x3b, 0x76, 0x97, 0xf5, 0x35, 0xc5, 0x47, 0xff,
    0x5c, 0x6e, 0xd2, 0xc6, 0xf8, 0x19, 0xdf, 0x83, 0x74, 0xf3, 0x57, 0xdc,
    0xa5, 0x39, 0x31, 0x14, 0xc1, 0x72, 0x18, 0x12, 0xa6, 0xc1, 0xb2, 0x6f,
    0x9a, 0xb0, 0x12, 0x9a, 0x7d, 0x2b, 0x12, 0x66, 0x46, 0xb9, 0xf9, 0x8a,
    0x72, 0xab, 0x94, 0x72, 0xab, 0x3d, 0xe3, 0x06, 0x50, 0xdd, 0xa0, 0x54,
    0xb7, 0xbd, 0x2e, 0xe1, 0x06, 0xa3, 0xba, 0xc1, 0x53, 0xdd, 0x10, 0xa8,
    0x6e, 0xa8, 0xa9, 0x6e, 0xea, 0xfe, 0x76, 0xfb, 0x01, 0x96, 0x34, 0xa4,
    0xc2, 0x70, 0x02, 0x00, 0x00,
];

fn boot_log() -> String {
    (0..16)
        .map(|i| format!("[    0.{:06}] vmloader: booting cpu {}\n", i * 1375, i % 4))
        .collect()
}

fn kernel_text(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn materialize(registry: &mut RomRegistry) -> Result<PagedMemory, LoaderError> {
    let mut memory = PagedMemory::new();
    registry.check_and_register_reset(&memory)?;
    registry.reset(&mut memory, ResetMode::Normal)?;
    Ok(memory)
}

///////////////////////////////////////////////////////////////////////////////
// Kernels
///////////////////////////////////////////////////////////////////////////////

#[test]
fn kernel_at_header_load_address() -> Result<(), UbootError> {
    let text = kernel_text(0x1234);
    let file = TempFile::new("uImage", &Image::kernel(0x4008_0000, 0x4008_0000).build(&text))?;

    let mut registry = RomRegistry::new();
    let kernel = load_uimage(&mut registry, &file.0)?;

    assert_eq!(kernel.info.entry, Some(Pa(0x4008_0000)));
    assert_eq!(kernel.info.low, Pa(0x4008_0000));
    assert_eq!(kernel.info.size, 0x1234);
    assert_eq!(kernel.load_address, Pa(0x4008_0000));
    assert_eq!(kernel.name, "Linux-6.1");
    assert!(kernel.is_linux);

    let memory = materialize(&mut registry)?;
    assert_eq!(memory.read_vec(AddressSpace::SYSTEM, Pa(0x4008_0000), 0x1234), text);
    Ok(())
}

#[test]
fn gzip_kernel_is_decompressed() -> Result<(), UbootError> {
    let text = kernel_text(0x1_8123);
    let image = Image {
        comp: IH_COMP_GZIP,
        ..Image::kernel(0x8000, 0x8000)
    };

    let mut registry = RomRegistry::new();
    let kernel = UbootLoader::new().load_kernel_mapped(
        &mut registry,
        "uImage.gz",
        &MappedFile::new(image.build(&gzip(&text))),
    )?;

    assert_eq!(kernel.info.size, text.len() as u64);

    let memory = materialize(&mut registry)?;
    assert_eq!(memory.read_vec(AddressSpace::SYSTEM, Pa(0x8000), text.len()), text);
    Ok(())
}

#[test]
fn huffman_coded_gzip_kernel() -> Result<(), UbootError> {
    // BTYPE of the first block is 2, not a stored block.
    assert_eq!((BOOT_LOG_GZ[10] >> 1) & 3, 2);

    let text = boot_log();
    let image = Image {
        comp: IH_COMP_GZIP,
        ..Image::kernel(0x8000, 0x8000)
    };

    let mut registry = RomRegistry::new();
    let kernel = UbootLoader::new().load_kernel_mapped(
        &mut registry,
        "uImage.gz",
        &MappedFile::new(image.build(&BOOT_LOG_GZ)),
    )?;

    assert_eq!(kernel.info.size, 624);
    assert_eq!(kernel.info.size, text.len() as u64);

    let memory = materialize(&mut registry)?;
    assert_eq!(
        memory.read_vec(AddressSpace::SYSTEM, Pa(0x8000), text.len()),
        text.as_bytes()
    );
    Ok(())
}

#[test]
fn corrupt_gzip_payload() {
    let image = Image {
        comp: IH_COMP_GZIP,
        ..Image::kernel(0x8000, 0x8000)
    };

    let mut payload = gzip(&kernel_text(0x100));
    payload[2] = 9;

    let mut registry = RomRegistry::new();
    let result = UbootLoader::new().load_kernel_mapped(
        &mut registry,
        "uImage.gz",
        &MappedFile::new(image.build(&payload)),
    );

    assert!(matches!(result, Err(UbootError::Gzip(_))));
    assert!(registry.is_empty());
}

#[test]
fn unsupported_compression() {
    let image = Image {
        comp: 3,
        ..Image::kernel(0x8000, 0x8000)
    };

    let mut registry = RomRegistry::new();
    let result = UbootLoader::new().load_kernel_mapped(
        &mut registry,
        "uImage.lzma",
        &MappedFile::new(image.build(b"payload")),
    );

    assert!(matches!(result, Err(UbootError::Compression(3))));
}

#[test]
fn translated_load_address() -> Result<(), UbootError> {
    let image = Image::kernel(0x8010_0000, 0x8010_0000);

    let mut registry = RomRegistry::new();
    let kernel = UbootLoader::new()
        .with_translate(|address| address & 0x1fff_ffff)
        .load_kernel_mapped(&mut registry, "uImage", &MappedFile::new(image.build(&[1; 16])))?;

    assert_eq!(kernel.info.low, Pa(0x0010_0000));
    assert_eq!(kernel.load_address, Pa(0x8010_0000));
    assert_eq!(kernel.info.entry, Some(Pa(0x8010_0000)));
    Ok(())
}

#[test]
fn kernel_noload_needs_an_address() -> Result<(), UbootError> {
    let image = Image {
        kind: IH_TYPE_KERNEL_NOLOAD,
        ..Image::kernel(0, 0x40)
    };
    let bytes = MappedFile::new(image.build(&[0xaa; 0x100]));

    let mut registry = RomRegistry::new();
    let result = UbootLoader::new().load_kernel_mapped(&mut registry, "uImage", &bytes);
    assert!(matches!(result, Err(UbootError::NoLoadAddress)));
    assert!(registry.is_empty());

    let kernel = UbootLoader::new()
        .with_load_address(0x4000_0000u64)
        .load_kernel_mapped(&mut registry, "uImage", &bytes)?;

    assert_eq!(kernel.load_address, Pa(0x4000_0040));
    assert_eq!(kernel.info.entry, Some(Pa(0x4000_0080)));
    assert_eq!(kernel.info.low, Pa(0x4000_0040));
    Ok(())
}

#[test]
fn vxworks_on_arm64_boots_like_linux() -> Result<(), UbootError> {
    let image = Image {
        os: IH_OS_VXWORKS,
        ..Image::kernel(0x8000, 0x8000)
    };

    let mut registry = RomRegistry::new();
    let kernel = load_kernel(&mut registry, &image)?;
    assert!(kernel.is_linux);

    let image = Image {
        os: IH_OS_VXWORKS,
        arch: 2,
        ..Image::kernel(0x8000, 0x8000)
    };

    let mut registry = RomRegistry::new();
    assert!(!load_kernel(&mut registry, &image)?.is_linux);
    Ok(())
}

fn load_kernel(
    registry: &mut RomRegistry,
    image: &Image,
) -> Result<vmloader_uboot::UbootKernel, UbootError> {
    UbootLoader::new().load_kernel_mapped(registry, "uImage", &MappedFile::new(image.build(&[0; 4])))
}

///////////////////////////////////////////////////////////////////////////////
// Validation
///////////////////////////////////////////////////////////////////////////////

#[test]
fn not_a_uboot_image() {
    let mut bytes = Image::kernel(0, 0).build(&[0; 4]);
    bytes[0] = 0;

    let mut registry = RomRegistry::new();
    let result = UbootLoader::new().load_kernel_mapped(&mut registry, "vmlinux", &MappedFile::new(bytes));

    assert!(matches!(result, Err(UbootError::NotUboot)));
}

#[test]
fn wrong_image_type() {
    let image = Image {
        kind: IH_TYPE_RAMDISK,
        ..Image::kernel(0, 0)
    };

    let mut registry = RomRegistry::new();
    let result = UbootLoader::new().load_kernel_mapped(&mut registry, "initrd", &MappedFile::new(image.build(&[0; 4])));

    assert!(matches!(
        result,
        Err(UbootError::WrongType {
            found: IH_TYPE_RAMDISK,
            expected: IH_TYPE_KERNEL,
        })
    ));
}

#[test]
fn truncated_payload() {
    let mut bytes = Image::kernel(0, 0).build(&[0; 0x100]);
    bytes.truncate(0x80);

    let mut registry = RomRegistry::new();
    let result = UbootLoader::new().load_kernel_mapped(&mut registry, "uImage", &MappedFile::new(bytes));

    assert!(matches!(result, Err(UbootError::Truncated)));
}

///////////////////////////////////////////////////////////////////////////////
// Ramdisks
///////////////////////////////////////////////////////////////////////////////

#[test]
fn ramdisk_at_caller_address() -> Result<(), UbootError> {
    let data = kernel_text(0x800);
    let image = Image {
        kind: IH_TYPE_RAMDISK,
        comp: IH_COMP_GZIP,
        ..Image::kernel(0xdead_0000, 0)
    };
    let file = TempFile::new("uInitrd", &image.build(&gzip(&data)))?;

    let mut registry = RomRegistry::new();
    let size = load_ramdisk(&mut registry, &file.0, 0x4800_0000u64, 0x1000)?;
    assert_eq!(size, 0x800);

    let memory = materialize(&mut registry)?;
    assert_eq!(memory.read_vec(AddressSpace::SYSTEM, Pa(0x4800_0000), 0x800), data);
    Ok(())
}

#[test]
fn ramdisk_size_limit() -> Result<(), UbootError> {
    let image = Image {
        kind: IH_TYPE_RAMDISK,
        ..Image::kernel(0, 0)
    };
    let file = TempFile::new("uInitrd-big", &image.build(&[0; 0x200]))?;

    let mut registry = RomRegistry::new();
    let result = load_ramdisk(&mut registry, &file.0, 0x4800_0000u64, 0x100);

    assert!(matches!(
        result,
        Err(UbootError::TooBig {
            size: 0x200,
            limit: 0x100
        })
    ));
    assert!(registry.is_empty());
    Ok(())
}

#[test]
fn kernel_is_not_a_ramdisk() -> Result<(), UbootError> {
    let file = TempFile::new("uImage-as-initrd", &Image::kernel(0, 0).build(&[0; 4]))?;

    let mut registry = RomRegistry::new();
    let result = load_ramdisk(&mut registry, &file.0, 0u64, 0x100);

    assert!(matches!(result, Err(UbootError::WrongType { .. })));
    Ok(())
}
