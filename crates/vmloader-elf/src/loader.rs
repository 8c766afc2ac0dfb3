use std::path::Path;

use elf::abi;
use vmloader_core::{AddressSpace, GuestMemory, ImageInfo, MappedFile, RomRegistry, Segment};
use zerocopy::byteorder::{BigEndian, LittleEndian};

use crate::{
    ElfError, ElfImage, ElfNote,
    class::{Elf32, Elf64},
    load::{ident, plan},
};

const ELFMAG: [u8; 4] = *b"\x7fELF";

/// Byte order of an ELF image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElfEndian {
    /// `ELFDATA2LSB`.
    Little,

    /// `ELFDATA2MSB`.
    Big,
}

/// Which program header address a segment is placed at.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadAddress {
    /// `p_paddr`.
    #[default]
    Physical,

    /// `p_vaddr`.
    Virtual,
}

/// Identification of an ELF image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfIdent {
    /// `true` for `ELFCLASS64`.
    pub is64: bool,

    /// Byte order.
    pub endian: ElfEndian,

    /// Object file type, e.g. `ET_EXEC`.
    pub e_type: u16,

    /// Machine.
    pub machine: u16,

    /// Entry point as written in the header.
    pub entry: u64,
}

/// Reads the identification of an ELF image without loading it.
pub fn probe_elf(image: &[u8]) -> Result<ElfIdent, ElfError> {
    match identify(image)? {
        (abi::ELFCLASS32, ElfEndian::Little) => ident::<Elf32, LittleEndian>(image, ElfEndian::Little),
        (abi::ELFCLASS32, ElfEndian::Big) => ident::<Elf32, BigEndian>(image, ElfEndian::Big),
        (abi::ELFCLASS64, ElfEndian::Little) => ident::<Elf64, LittleEndian>(image, ElfEndian::Little),
        (abi::ELFCLASS64, ElfEndian::Big) => ident::<Elf64, BigEndian>(image, ElfEndian::Big),
        _ => Err(ElfError::LoadFailed),
    }
}

/// Checks the magic and returns the class and byte order.
fn identify(image: &[u8]) -> Result<(u8, ElfEndian), ElfError> {
    if !image.starts_with(&ELFMAG) {
        return Err(ElfError::NotElf);
    }

    let (Some(&class), Some(&data)) = (image.get(abi::EI_CLASS), image.get(abi::EI_DATA))
    else {
        return Err(ElfError::LoadFailed);
    };

    let endian = match data {
        abi::ELFDATA2LSB => ElfEndian::Little,
        abi::ELFDATA2MSB => ElfEndian::Big,
        _ => return Err(ElfError::LoadFailed),
    };

    Ok((class, endian))
}

/// Loads ELF32 and ELF64 images.
///
/// The loader is configured like a builder and can then load any number
/// of images:
///
/// ```no_run
/// # use vmloader_core::RomRegistry;
/// # use vmloader_elf::{ElfError, ElfLoader};
/// # fn main() -> Result<(), ElfError> {
/// let mut registry = RomRegistry::new();
///
/// let info = ElfLoader::new(elf::abi::EM_MIPS)
///     .with_translate(|address| address & 0x1fff_ffff)
///     .load(&mut registry, "vmlinux")?;
///
/// println!("entry point: {:?}", info.entry);
/// # Ok(())
/// # }
/// ```
pub struct ElfLoader<'a> {
    pub(crate) machine: u16,
    pub(crate) endian: Option<ElfEndian>,
    pub(crate) clear_lsb: bool,
    pub(crate) data_swab: bool,
    pub(crate) space: AddressSpace,
    pub(crate) load_address: LoadAddress,
    pub(crate) max_size: u64,
    pub(crate) load_base: Option<u64>,
    pub(crate) translate: Option<Box<dyn Fn(u64) -> u64 + 'a>>,
    pub(crate) note: Option<Box<dyn FnMut(&ElfNote) + 'a>>,
}

impl<'a> ElfLoader<'a> {
    /// Default upper bound of the summed memory size of all segments.
    pub const DEFAULT_MAX_SIZE: u64 = i32::MAX as u64;

    /// Creates a loader accepting images for `machine`.
    ///
    /// `EM_NONE` accepts any machine.
    pub fn new(machine: u16) -> Self {
        Self {
            machine,
            endian: None,
            clear_lsb: false,
            data_swab: false,
            space: AddressSpace::SYSTEM,
            load_address: LoadAddress::Physical,
            max_size: Self::DEFAULT_MAX_SIZE,
            load_base: None,
            translate: None,
            note: None,
        }
    }

    /// Rejects images of the other byte order.
    pub fn with_endian(self, endian: ElfEndian) -> Self {
        Self {
            endian: Some(endian),
            ..self
        }
    }

    /// Clears bit 0 of the entry point.
    pub fn with_clear_lsb(self, clear_lsb: bool) -> Self {
        Self { clear_lsb, ..self }
    }

    /// Byte-swaps every 16-bit word of segment data.
    pub fn with_data_swab(self, data_swab: bool) -> Self {
        Self { data_swab, ..self }
    }

    /// Places segments in `space`.
    pub fn with_space(self, space: AddressSpace) -> Self {
        Self { space, ..self }
    }

    /// Selects the program header address segments are placed at.
    pub fn with_load_address(self, load_address: LoadAddress) -> Self {
        Self {
            load_address,
            ..self
        }
    }

    /// Limits the summed memory size of all segments.
    pub fn with_max_size(self, max_size: u64) -> Self {
        Self { max_size, ..self }
    }

    /// Moves the image so that its lowest segment starts at `base`,
    /// rounded up to the largest segment alignment.
    ///
    /// Position independent images get their relative relocations applied.
    pub fn with_load_base(self, base: u64) -> Self {
        Self {
            load_base: Some(base),
            ..self
        }
    }

    /// Maps every segment address and the entry point through `translate`.
    pub fn with_translate(self, translate: impl Fn(u64) -> u64 + 'a) -> Self {
        Self {
            translate: Some(Box::new(translate)),
            ..self
        }
    }

    /// Calls `handler` for every note of every `PT_NOTE` segment.
    pub fn with_note_handler(self, handler: impl FnMut(&ElfNote) + 'a) -> Self {
        Self {
            note: Some(Box::new(handler)),
            ..self
        }
    }

    /// Validates `file` and computes the placement of its segments.
    pub fn parse(&mut self, file: &MappedFile) -> Result<ElfImage, ElfError> {
        let (class, endian) = identify(file)?;

        if let Some(expected) = self.endian
            && expected != endian
        {
            tracing::debug!(?expected, found = ?endian, "ELF byte order mismatch");
            return Err(ElfError::WrongEndian);
        }

        match (class, endian) {
            (abi::ELFCLASS32, ElfEndian::Little) => plan::<Elf32, LittleEndian>(self, file, endian),
            (abi::ELFCLASS32, ElfEndian::Big) => plan::<Elf32, BigEndian>(self, file, endian),
            (abi::ELFCLASS64, ElfEndian::Little) => plan::<Elf64, LittleEndian>(self, file, endian),
            (abi::ELFCLASS64, ElfEndian::Big) => plan::<Elf64, BigEndian>(self, file, endian),
            _ => Err(ElfError::LoadFailed),
        }
    }

    /// Loads the image at `path` into `registry`.
    pub fn load(
        &mut self,
        registry: &mut RomRegistry,
        path: impl AsRef<Path>,
    ) -> Result<ImageInfo, ElfError> {
        let path = path.as_ref();

        let file = MappedFile::open(path).inspect_err(|err| {
            tracing::warn!(path = %path.display(), %err, "could not open ELF image");
        })?;

        self.load_mapped(registry, &path.display().to_string(), &file)
    }

    /// Loads an already mapped image into `registry`.
    ///
    /// Segment data borrows from `file` unless it had to be modified.
    /// Either every segment is registered or none is.
    pub fn load_mapped(
        &mut self,
        registry: &mut RomRegistry,
        name: &str,
        file: &MappedFile,
    ) -> Result<ImageInfo, ElfError> {
        let image = self.parse(file)?;
        let space = self.space;

        let register = |registry: &mut RomRegistry| -> Result<(), ElfError> {
            for segment in image.segments {
                let name = format!("phdr #{}: {}", segment.index, name);

                registry.add_elf_program(
                    &name,
                    segment.data,
                    space,
                    segment.segment.address,
                    segment.segment.mem_size,
                )?;
            }

            Ok(())
        };

        if registry.in_transaction() {
            register(registry)?;
        }
        else {
            registry.transaction(register)?;
        }

        tracing::debug!(
            name,
            entry = ?image.info.entry,
            low = %image.info.low,
            high = %image.info.high,
            size = image.info.size,
            "ELF image loaded"
        );

        Ok(image.info)
    }

    /// Writes the segments of `file` straight into guest memory, zero
    /// filling the part of each segment that is not backed by the file.
    pub fn write(
        &mut self,
        memory: &mut impl GuestMemory,
        file: &MappedFile,
    ) -> Result<ImageInfo, ElfError> {
        let image = self.parse(file)?;

        for segment in &image.segments {
            let Segment {
                address,
                file_size,
                mem_size,
                ..
            } = segment.segment;

            memory.write(self.space, address, segment.data.as_slice())?;

            if mem_size > file_size {
                memory.fill(self.space, address + file_size, 0, mem_size - file_size)?;
            }
        }

        Ok(image.info)
    }
}
