//! ELF image loading.
//!
//! The loader validates the identification block, then walks the program
//! header table and turns every `PT_LOAD` segment into a registry region.
//! The algorithm is written once, generic over the word width of the file
//! ([`Elf32`], [`Elf64`]) and its byte order, and instantiated for all
//! four combinations.
//!
//! Segments keep borrowing the memory mapped file unless their content has
//! to be modified (16-bit data swapping, relocation).

mod class;
mod error;
pub mod header;
mod load;
mod loader;
mod note;
mod reloc;

pub use self::{
    class::{Elf32, Elf64, ElfClass},
    error::ElfError,
    load::{ElfImage, ElfSegment},
    loader::{ElfEndian, ElfIdent, ElfLoader, LoadAddress, probe_elf},
    note::ElfNote,
};
