use zerocopy::{
    FromBytes, Immutable, IntoBytes as _, KnownLayout, Unaligned,
    byteorder::{ByteOrder, U32, U64},
};

use crate::header::{
    Elf32Ehdr, Elf32Phdr, Elf32Rela, Elf32Shdr, Elf64Ehdr, Elf64Phdr, Elf64Rela, Elf64Shdr,
    FileHeader, ProgramHeader, Relocation, SectionHeader,
};

/// The word width of an ELF file.
///
/// The loader is written once against this trait and instantiated for
/// [`Elf32`] and [`Elf64`].
pub trait ElfClass {
    /// The `EI_CLASS` value.
    const CLASS: u8;

    /// Size of an address in bytes.
    const WORD_SIZE: usize;

    /// File header.
    type Ehdr<O: ByteOrder>: FileHeader + FromBytes + KnownLayout + Immutable + Unaligned;

    /// Program header.
    type Phdr<O: ByteOrder>: ProgramHeader + FromBytes + KnownLayout + Immutable + Unaligned;

    /// Section header.
    type Shdr<O: ByteOrder>: SectionHeader + FromBytes + KnownLayout + Immutable + Unaligned;

    /// Relocation with addend.
    type Rela<O: ByteOrder>: Relocation + FromBytes + KnownLayout + Immutable + Unaligned;

    /// Stores an address-sized `value` at the start of `dst`.
    ///
    /// Returns `None` if `dst` is too short.
    fn write_word<O: ByteOrder>(dst: &mut [u8], value: u64) -> Option<()>;
}

/// 32-bit ELF.
#[derive(Debug, Clone, Copy)]
pub struct Elf32;

/// 64-bit ELF.
#[derive(Debug, Clone, Copy)]
pub struct Elf64;

impl ElfClass for Elf32 {
    const CLASS: u8 = elf::abi::ELFCLASS32;
    const WORD_SIZE: usize = 4;

    type Ehdr<O: ByteOrder> = Elf32Ehdr<O>;
    type Phdr<O: ByteOrder> = Elf32Phdr<O>;
    type Shdr<O: ByteOrder> = Elf32Shdr<O>;
    type Rela<O: ByteOrder> = Elf32Rela<O>;

    fn write_word<O: ByteOrder>(dst: &mut [u8], value: u64) -> Option<()> {
        dst.get_mut(..Self::WORD_SIZE)?
            .copy_from_slice(U32::<O>::new(value as u32).as_bytes());
        Some(())
    }
}

impl ElfClass for Elf64 {
    const CLASS: u8 = elf::abi::ELFCLASS64;
    const WORD_SIZE: usize = 8;

    type Ehdr<O: ByteOrder> = Elf64Ehdr<O>;
    type Phdr<O: ByteOrder> = Elf64Phdr<O>;
    type Shdr<O: ByteOrder> = Elf64Shdr<O>;
    type Rela<O: ByteOrder> = Elf64Rela<O>;

    fn write_word<O: ByteOrder>(dst: &mut [u8], value: u64) -> Option<()> {
        dst.get_mut(..Self::WORD_SIZE)?
            .copy_from_slice(U64::<O>::new(value).as_bytes());
        Some(())
    }
}

/// Reads the `index`-th entry of a table of `T` starting at `offset`,
/// with entries `entry_size` bytes apart.
pub(crate) fn table_entry<T>(data: &[u8], offset: u64, entry_size: u64, index: u64) -> Option<&T>
where
    T: FromBytes + KnownLayout + Immutable + Unaligned,
{
    let start = index
        .checked_mul(entry_size)
        .and_then(|delta| delta.checked_add(offset))?;

    let start = usize::try_from(start).ok()?;
    let (entry, _) = T::ref_from_prefix(data.get(start..)?).ok()?;
    Some(entry)
}
