use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{BigEndian, U32},
};

/// Image magic.
pub const IH_MAGIC: u32 = 0x2705_1956;

/// Operating system: Linux.
pub const IH_OS_LINUX: u8 = 5;
/// Operating system: VxWorks.
pub const IH_OS_VXWORKS: u8 = 14;

/// CPU architecture: PowerPC.
pub const IH_ARCH_PPC: u8 = 7;
/// CPU architecture: AArch64.
pub const IH_ARCH_ARM64: u8 = 22;
/// CPU architecture: RISC-V.
pub const IH_ARCH_RISCV: u8 = 26;

/// Image type: OS kernel.
pub const IH_TYPE_KERNEL: u8 = 2;
/// Image type: ramdisk.
pub const IH_TYPE_RAMDISK: u8 = 3;
/// Image type: OS kernel that runs wherever it is loaded.
pub const IH_TYPE_KERNEL_NOLOAD: u8 = 14;

/// Compression: none.
pub const IH_COMP_NONE: u8 = 0;
/// Compression: gzip.
pub const IH_COMP_GZIP: u8 = 1;

/// Legacy U-Boot image header.
///
/// All fields are stored big-endian.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct UbootHeader {
    /// [`IH_MAGIC`].
    pub ih_magic: U32<BigEndian>,

    /// Header checksum.
    pub ih_hcrc: U32<BigEndian>,

    /// Creation timestamp.
    pub ih_time: U32<BigEndian>,

    /// Payload size.
    pub ih_size: U32<BigEndian>,

    /// Load address.
    pub ih_load: U32<BigEndian>,

    /// Entry point.
    pub ih_ep: U32<BigEndian>,

    /// Payload checksum.
    pub ih_dcrc: U32<BigEndian>,

    /// Operating system.
    pub ih_os: u8,

    /// CPU architecture.
    pub ih_arch: u8,

    /// Image type.
    pub ih_type: u8,

    /// Compression.
    pub ih_comp: u8,

    /// NUL-padded image name.
    pub ih_name: [u8; 32],
}

impl UbootHeader {
    /// Parses the header at the start of `image`.
    ///
    /// Returns `None` if `image` is too short or the magic does not match.
    pub fn parse(image: &[u8]) -> Option<&Self> {
        let (header, _) = Self::ref_from_prefix(image).ok()?;

        if header.ih_magic.get() != IH_MAGIC {
            return None;
        }

        Some(header)
    }

    /// Returns the image name.
    pub fn name(&self) -> String {
        let end = memchr::memchr(0, &self.ih_name).unwrap_or(self.ih_name.len());
        String::from_utf8_lossy(&self.ih_name[..end]).into_owned()
    }

    /// Returns `true` if the image boots with the Linux boot protocol.
    ///
    /// VxWorks kernels for some architectures use the same convention.
    pub fn is_linux(&self) -> bool {
        match self.ih_os {
            IH_OS_LINUX => true,
            IH_OS_VXWORKS => matches!(self.ih_arch, IH_ARCH_ARM64 | IH_ARCH_PPC | IH_ARCH_RISCV),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(os: u8, arch: u8, name: &[u8]) -> UbootHeader {
        let mut ih_name = [0u8; 32];
        ih_name[..name.len()].copy_from_slice(name);

        UbootHeader {
            ih_magic: U32::new(IH_MAGIC),
            ih_hcrc: U32::new(0),
            ih_time: U32::new(0),
            ih_size: U32::new(0),
            ih_load: U32::new(0),
            ih_ep: U32::new(0),
            ih_dcrc: U32::new(0),
            ih_os: os,
            ih_arch: arch,
            ih_type: IH_TYPE_KERNEL,
            ih_comp: IH_COMP_NONE,
            ih_name,
        }
    }

    #[test]
    fn layout() {
        assert_eq!(size_of::<UbootHeader>(), 64);
    }

    #[test]
    fn magic_is_big_endian() {
        let bytes = header(IH_OS_LINUX, IH_ARCH_ARM64, b"").as_bytes().to_vec();

        assert_eq!(bytes[..4], [0x27, 0x05, 0x19, 0x56]);
        assert!(UbootHeader::parse(&bytes).is_some());
        assert!(UbootHeader::parse(&bytes[..63]).is_none());
    }

    #[test]
    fn names() {
        assert_eq!(header(0, 0, b"Linux-6.1").name(), "Linux-6.1");
        assert_eq!(header(0, 0, &[b'x'; 32]).name().len(), 32);
    }

    #[test]
    fn linux_boot_protocol() {
        assert!(header(IH_OS_LINUX, 2, b"").is_linux());
        assert!(header(IH_OS_VXWORKS, IH_ARCH_ARM64, b"").is_linux());
        assert!(header(IH_OS_VXWORKS, IH_ARCH_RISCV, b"").is_linux());
        assert!(!header(IH_OS_VXWORKS, 2, b"").is_linux());
        assert!(!header(17, IH_ARCH_PPC, b"").is_linux());
    }
}
