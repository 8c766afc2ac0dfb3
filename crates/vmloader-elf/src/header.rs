//! On-disk ELF structures.
//!
//! Every structure is generic over the byte order of the file, so the
//! decoding of each field is part of its type.

use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    byteorder::{ByteOrder, I32, I64, U16, U32, U64},
};

/// Accessors shared by the 32-bit and 64-bit file headers.
pub trait FileHeader {
    /// Identification bytes.
    fn e_ident(&self) -> &[u8; 16];
    /// Object file type.
    fn e_type(&self) -> u16;
    /// Machine.
    fn e_machine(&self) -> u16;
    /// Entry point virtual address.
    fn e_entry(&self) -> u64;
    /// Program header table offset.
    fn e_phoff(&self) -> u64;
    /// Program header entry size.
    fn e_phentsize(&self) -> u16;
    /// Number of program headers.
    fn e_phnum(&self) -> u16;
    /// Section header table offset.
    fn e_shoff(&self) -> u64;
    /// Section header entry size.
    fn e_shentsize(&self) -> u16;
    /// Number of section headers.
    fn e_shnum(&self) -> u16;
}

/// Accessors shared by the 32-bit and 64-bit program headers.
pub trait ProgramHeader {
    /// Segment type.
    fn p_type(&self) -> u32;
    /// Segment flags.
    fn p_flags(&self) -> u32;
    /// Offset of the segment in the file.
    fn p_offset(&self) -> u64;
    /// Virtual address.
    fn p_vaddr(&self) -> u64;
    /// Physical address.
    fn p_paddr(&self) -> u64;
    /// Size in the file.
    fn p_filesz(&self) -> u64;
    /// Size in memory.
    fn p_memsz(&self) -> u64;
    /// Alignment.
    fn p_align(&self) -> u64;
}

/// Accessors shared by the 32-bit and 64-bit section headers.
pub trait SectionHeader {
    /// Section type.
    fn sh_type(&self) -> u32;
    /// Offset of the section in the file.
    fn sh_offset(&self) -> u64;
    /// Size of the section.
    fn sh_size(&self) -> u64;
    /// Size of each entry.
    fn sh_entsize(&self) -> u64;
}

/// Accessors shared by the 32-bit and 64-bit relocations with addend.
pub trait Relocation {
    /// Location to patch, as a link-time virtual address.
    fn r_offset(&self) -> u64;
    /// Relocation type.
    fn r_type(&self) -> u32;
    /// Addend.
    fn r_addend(&self) -> i64;
}

macro_rules! accessors {
    ($trait:ident for $name:ident { $($field:ident: $type:ty),* $(,)? }) => {
        impl<O: ByteOrder> $trait for $name<O> {
            $(
                fn $field(&self) -> $type {
                    self.$field.get().into()
                }
            )*
        }
    };
}

/// 32-bit ELF file header.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout, Unaligned)]
#[expect(missing_docs)]
pub struct Elf32Ehdr<O: ByteOrder> {
    pub e_ident: [u8; 16],
    pub e_type: U16<O>,
    pub e_machine: U16<O>,
    pub e_version: U32<O>,
    pub e_entry: U32<O>,
    pub e_phoff: U32<O>,
    pub e_shoff: U32<O>,
    pub e_flags: U32<O>,
    pub e_ehsize: U16<O>,
    pub e_phentsize: U16<O>,
    pub e_phnum: U16<O>,
    pub e_shentsize: U16<O>,
    pub e_shnum: U16<O>,
    pub e_shstrndx: U16<O>,
}

/// 64-bit ELF file header.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout, Unaligned)]
#[expect(missing_docs)]
pub struct Elf64Ehdr<O: ByteOrder> {
    pub e_ident: [u8; 16],
    pub e_type: U16<O>,
    pub e_machine: U16<O>,
    pub e_version: U32<O>,
    pub e_entry: U64<O>,
    pub e_phoff: U64<O>,
    pub e_shoff: U64<O>,
    pub e_flags: U32<O>,
    pub e_ehsize: U16<O>,
    pub e_phentsize: U16<O>,
    pub e_phnum: U16<O>,
    pub e_shentsize: U16<O>,
    pub e_shnum: U16<O>,
    pub e_shstrndx: U16<O>,
}

/// 32-bit program header.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout, Unaligned)]
#[expect(missing_docs)]
pub struct Elf32Phdr<O: ByteOrder> {
    pub p_type: U32<O>,
    pub p_offset: U32<O>,
    pub p_vaddr: U32<O>,
    pub p_paddr: U32<O>,
    pub p_filesz: U32<O>,
    pub p_memsz: U32<O>,
    pub p_flags: U32<O>,
    pub p_align: U32<O>,
}

/// 64-bit program header.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout, Unaligned)]
#[expect(missing_docs)]
pub struct Elf64Phdr<O: ByteOrder> {
    pub p_type: U32<O>,
    pub p_flags: U32<O>,
    pub p_offset: U64<O>,
    pub p_vaddr: U64<O>,
    pub p_paddr: U64<O>,
    pub p_filesz: U64<O>,
    pub p_memsz: U64<O>,
    pub p_align: U64<O>,
}

/// 32-bit section header.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout, Unaligned)]
#[expect(missing_docs)]
pub struct Elf32Shdr<O: ByteOrder> {
    pub sh_name: U32<O>,
    pub sh_type: U32<O>,
    pub sh_flags: U32<O>,
    pub sh_addr: U32<O>,
    pub sh_offset: U32<O>,
    pub sh_size: U32<O>,
    pub sh_link: U32<O>,
    pub sh_info: U32<O>,
    pub sh_addralign: U32<O>,
    pub sh_entsize: U32<O>,
}

/// 64-bit section header.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout, Unaligned)]
#[expect(missing_docs)]
pub struct Elf64Shdr<O: ByteOrder> {
    pub sh_name: U32<O>,
    pub sh_type: U32<O>,
    pub sh_flags: U64<O>,
    pub sh_addr: U64<O>,
    pub sh_offset: U64<O>,
    pub sh_size: U64<O>,
    pub sh_link: U32<O>,
    pub sh_info: U32<O>,
    pub sh_addralign: U64<O>,
    pub sh_entsize: U64<O>,
}

/// 32-bit relocation with addend.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout, Unaligned)]
#[expect(missing_docs)]
pub struct Elf32Rela<O: ByteOrder> {
    pub r_offset: U32<O>,
    pub r_info: U32<O>,
    pub r_addend: I32<O>,
}

/// 64-bit relocation with addend.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout, Unaligned)]
#[expect(missing_docs)]
pub struct Elf64Rela<O: ByteOrder> {
    pub r_offset: U64<O>,
    pub r_info: U64<O>,
    pub r_addend: I64<O>,
}

/// Note header, identical for both classes.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout, Unaligned)]
#[expect(missing_docs)]
pub struct ElfNhdr<O: ByteOrder> {
    pub n_namesz: U32<O>,
    pub n_descsz: U32<O>,
    pub n_type: U32<O>,
}

impl<O: ByteOrder> FileHeader for Elf32Ehdr<O> {
    fn e_ident(&self) -> &[u8; 16] {
        &self.e_ident
    }

    fn e_type(&self) -> u16 {
        self.e_type.get()
    }

    fn e_machine(&self) -> u16 {
        self.e_machine.get()
    }

    fn e_entry(&self) -> u64 {
        self.e_entry.get().into()
    }

    fn e_phoff(&self) -> u64 {
        self.e_phoff.get().into()
    }

    fn e_phentsize(&self) -> u16 {
        self.e_phentsize.get()
    }

    fn e_phnum(&self) -> u16 {
        self.e_phnum.get()
    }

    fn e_shoff(&self) -> u64 {
        self.e_shoff.get().into()
    }

    fn e_shentsize(&self) -> u16 {
        self.e_shentsize.get()
    }

    fn e_shnum(&self) -> u16 {
        self.e_shnum.get()
    }
}

impl<O: ByteOrder> FileHeader for Elf64Ehdr<O> {
    fn e_ident(&self) -> &[u8; 16] {
        &self.e_ident
    }

    fn e_type(&self) -> u16 {
        self.e_type.get()
    }

    fn e_machine(&self) -> u16 {
        self.e_machine.get()
    }

    fn e_entry(&self) -> u64 {
        self.e_entry.get()
    }

    fn e_phoff(&self) -> u64 {
        self.e_phoff.get()
    }

    fn e_phentsize(&self) -> u16 {
        self.e_phentsize.get()
    }

    fn e_phnum(&self) -> u16 {
        self.e_phnum.get()
    }

    fn e_shoff(&self) -> u64 {
        self.e_shoff.get()
    }

    fn e_shentsize(&self) -> u16 {
        self.e_shentsize.get()
    }

    fn e_shnum(&self) -> u16 {
        self.e_shnum.get()
    }
}

accessors!(ProgramHeader for Elf32Phdr {
    p_type: u32,
    p_flags: u32,
    p_offset: u64,
    p_vaddr: u64,
    p_paddr: u64,
    p_filesz: u64,
    p_memsz: u64,
    p_align: u64,
});

accessors!(ProgramHeader for Elf64Phdr {
    p_type: u32,
    p_flags: u32,
    p_offset: u64,
    p_vaddr: u64,
    p_paddr: u64,
    p_filesz: u64,
    p_memsz: u64,
    p_align: u64,
});

accessors!(SectionHeader for Elf32Shdr {
    sh_type: u32,
    sh_offset: u64,
    sh_size: u64,
    sh_entsize: u64,
});

accessors!(SectionHeader for Elf64Shdr {
    sh_type: u32,
    sh_offset: u64,
    sh_size: u64,
    sh_entsize: u64,
});

impl<O: ByteOrder> Relocation for Elf32Rela<O> {
    fn r_offset(&self) -> u64 {
        self.r_offset.get().into()
    }

    fn r_type(&self) -> u32 {
        self.r_info.get() & 0xff
    }

    fn r_addend(&self) -> i64 {
        self.r_addend.get().into()
    }
}

impl<O: ByteOrder> Relocation for Elf64Rela<O> {
    fn r_offset(&self) -> u64 {
        self.r_offset.get()
    }

    fn r_type(&self) -> u32 {
        self.r_info.get() as u32
    }

    fn r_addend(&self) -> i64 {
        self.r_addend.get()
    }
}

#[cfg(test)]
mod tests {
    use zerocopy::byteorder::{BigEndian, LittleEndian};

    use super::*;

    #[test]
    fn layout() {
        assert_eq!(size_of::<Elf32Ehdr<LittleEndian>>(), 52);
        assert_eq!(size_of::<Elf64Ehdr<BigEndian>>(), 64);
        assert_eq!(size_of::<Elf32Phdr<LittleEndian>>(), 32);
        assert_eq!(size_of::<Elf64Phdr<LittleEndian>>(), 56);
        assert_eq!(size_of::<Elf32Shdr<LittleEndian>>(), 40);
        assert_eq!(size_of::<Elf64Shdr<LittleEndian>>(), 64);
        assert_eq!(size_of::<Elf32Rela<LittleEndian>>(), 12);
        assert_eq!(size_of::<Elf64Rela<LittleEndian>>(), 24);
        assert_eq!(size_of::<ElfNhdr<LittleEndian>>(), 12);
    }

    #[test]
    fn fields_follow_byte_order() {
        let bytes = [0, 0, 0, 1, 0, 0, 0, 6, 0, 0, 0, 0];

        let (note, _) = ElfNhdr::<BigEndian>::read_from_prefix(&bytes).unwrap();
        assert_eq!(note.n_namesz.get(), 1);
        assert_eq!(note.n_descsz.get(), 6);

        let (note, _) = ElfNhdr::<LittleEndian>::read_from_prefix(&bytes).unwrap();
        assert_eq!(note.n_namesz.get(), 0x0100_0000);
    }
}
