use elf::abi;
use vmloader_core::{
    HexDump, ImageInfo, MappedFile, MemoryAccess, Pa, RomData, Segment,
};
use zerocopy::{FromBytes as _, byteorder::ByteOrder};

use crate::{
    ElfEndian, ElfError, ElfIdent, ElfLoader, LoadAddress,
    class::{ElfClass, table_entry},
    header::{FileHeader, ProgramHeader},
    note::for_each_note,
    reloc::{EM_LOONGARCH, apply_relative},
};

const EM_MICROBLAZE_OLD: u16 = 0xbaab;
const EM_NANOMIPS: u16 = 249;

/// A `PT_LOAD` segment ready to be placed.
#[derive(Debug, Clone)]
pub struct ElfSegment {
    /// Position of the segment in the program header table.
    pub index: usize,

    /// The placed segment.
    pub segment: Segment,

    /// The first `segment.file_size` bytes of the segment.
    pub data: RomData,
}

/// A fully validated ELF image.
///
/// Nothing has been registered or written yet; see [`ElfLoader::load`] and
/// [`ElfLoader::write`].
#[derive(Debug, Clone)]
pub struct ElfImage {
    /// Identification of the image.
    pub ident: ElfIdent,

    /// Entry point, bias and extent.
    pub info: ImageInfo,

    /// Loadable segments in program header order.
    pub segments: Vec<ElfSegment>,
}

/// Returns `true` if an image for `found` may be loaded when `expected`
/// is requested.
pub(crate) fn machine_matches(expected: u16, found: u16) -> bool {
    if expected == abi::EM_NONE || expected == found {
        return true;
    }

    match expected {
        abi::EM_PPC64 => found == abi::EM_PPC,
        abi::EM_X86_64 => found == abi::EM_386,
        abi::EM_MICROBLAZE => found == EM_MICROBLAZE_OLD,
        abi::EM_MIPS => found == EM_NANOMIPS,
        EM_NANOMIPS => found == abi::EM_MIPS,
        _ => false,
    }
}

fn file_range(data: &[u8], offset: u64, size: u64) -> Option<&[u8]> {
    let start = usize::try_from(offset).ok()?;
    let end = start.checked_add(usize::try_from(size).ok()?)?;
    data.get(start..end)
}

fn align_down(value: u64, align: u64) -> u64 {
    value & !(align - 1)
}

fn align_up(value: u64, align: u64) -> u64 {
    align_down(value.wrapping_add(align - 1), align)
}

pub(crate) fn ident<C, O>(image: &[u8], endian: ElfEndian) -> Result<ElfIdent, ElfError>
where
    C: ElfClass,
    O: ByteOrder,
{
    let (header, _) = C::Ehdr::<O>::ref_from_prefix(image).map_err(|_| ElfError::LoadFailed)?;

    Ok(ElfIdent {
        is64: C::CLASS == abi::ELFCLASS64,
        endian,
        e_type: header.e_type(),
        machine: header.e_machine(),
        entry: header.e_entry(),
    })
}

/// Validates the image and computes the placement of its segments.
pub(crate) fn plan<C, O>(
    loader: &mut ElfLoader<'_>,
    file: &MappedFile,
    endian: ElfEndian,
) -> Result<ElfImage, ElfError>
where
    C: ElfClass,
    O: ByteOrder,
{
    let data: &[u8] = file;
    let ident = ident::<C, O>(data, endian)?;
    let (header, _) = C::Ehdr::<O>::ref_from_prefix(data).map_err(|_| ElfError::LoadFailed)?;

    if !machine_matches(loader.machine, ident.machine) {
        tracing::debug!(
            expected = loader.machine,
            found = ident.machine,
            "ELF machine mismatch"
        );

        return Err(ElfError::WrongArch {
            expected: loader.machine,
            found: ident.machine,
        });
    }

    let phentsize = u64::from(header.e_phentsize());
    if header.e_phnum() > 0 && phentsize < size_of::<C::Phdr<O>>() as u64 {
        return Err(ElfError::LoadFailed);
    }

    let headers = (0..u64::from(header.e_phnum()))
        .map(|index| {
            table_entry::<C::Phdr<O>>(data, header.e_phoff(), phentsize, index)
                .ok_or(ElfError::LoadFailed)
        })
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(note) = loader.note.as_mut() {
        for phdr in headers.iter().filter(|phdr| phdr.p_type() == abi::PT_NOTE) {
            let Some(bytes) = file_range(data, phdr.p_offset(), phdr.p_filesz())
            else {
                tracing::warn!(offset = phdr.p_offset(), "PT_NOTE outside of file");
                continue;
            };

            for_each_note::<O>(bytes, phdr.p_align(), ident.is64, endian, |entry| {
                note(entry)
            });
        }
    }

    let link_address = |phdr: &C::Phdr<O>| match loader.load_address {
        LoadAddress::Physical => phdr.p_paddr(),
        LoadAddress::Virtual => phdr.p_vaddr(),
    };

    let loads = headers
        .iter()
        .enumerate()
        .filter(|(_, phdr)| phdr.p_type() == abi::PT_LOAD)
        .filter(|(index, phdr)| {
            if phdr.p_memsz() == 0 {
                tracing::warn!(index, "skipping empty PT_LOAD segment");
                return false;
            }

            true
        })
        .collect::<Vec<_>>();

    let bias = match loader.load_base {
        Some(base) => {
            let align = loads
                .iter()
                .map(|(_, phdr)| phdr.p_align())
                .filter(|align| align.is_power_of_two())
                .max()
                .unwrap_or(1);

            let lowest = loads
                .iter()
                .map(|(_, phdr)| link_address(phdr))
                .min()
                .unwrap_or(0);

            align_up(base, align).wrapping_sub(align_down(lowest, align)) as i64
        }
        None => 0,
    };

    let mut segments = Vec::with_capacity(loads.len());
    let mut total = 0u64;
    let mut low = u64::MAX;
    let mut high = 0u64;

    for &(index, phdr) in &loads {
        let file_size = phdr.p_filesz();
        let mem_size = phdr.p_memsz();

        if file_size > mem_size {
            tracing::debug!(index, file_size, mem_size, "segment larger in file than in memory");
            return Err(ElfError::LoadFailed);
        }

        if mem_size > loader.max_size.saturating_sub(total) {
            return Err(ElfError::TooBig {
                size: total.saturating_add(mem_size),
                limit: loader.max_size,
            });
        }

        total += mem_size;

        let mut address = link_address(phdr).wrapping_add_signed(bias);
        if let Some(translate) = &loader.translate {
            address = translate(address);
        }

        let end = address.checked_add(mem_size).ok_or(ElfError::LoadFailed)?;

        let offset = usize::try_from(phdr.p_offset()).map_err(|_| ElfError::LoadFailed)?;
        let len = usize::try_from(file_size).map_err(|_| ElfError::LoadFailed)?;
        let slice = file.slice(offset, len).ok_or(ElfError::LoadFailed)?;

        let mut content = RomData::from(slice);
        if loader.data_swab {
            for pair in content.make_mut().chunks_exact_mut(2) {
                pair.swap(0, 1);
            }
        }

        tracing::trace!(
            index,
            address = %Pa(address),
            file_size,
            mem_size,
            data = %HexDump(content.as_slice()),
            "segment planned"
        );

        low = low.min(address);
        high = high.max(end);

        segments.push(ElfSegment {
            index,
            segment: Segment {
                vaddr: phdr.p_vaddr(),
                paddr: phdr.p_paddr(),
                address: Pa(address),
                offset: phdr.p_offset(),
                file_size,
                mem_size,
                access: MemoryAccess::from_elf_flags(phdr.p_flags()),
                align: phdr.p_align(),
            },
            data: content,
        });
    }

    if ident.e_type == abi::ET_DYN && bias != 0 {
        let count = apply_relative::<C, O>(data, header, &mut segments, bias)?;
        tracing::debug!(count, bias, "relative relocations applied");
    }

    let mut entry = ident.entry.wrapping_add_signed(bias);
    match &loader.translate {
        Some(translate) => entry = translate(entry),
        None if loader.load_address == LoadAddress::Physical => {
            let segment = loads.iter().find(|(_, phdr)| {
                phdr.p_flags() & abi::PF_X != 0
                    && phdr.p_vaddr() != phdr.p_paddr()
                    && ident.entry >= phdr.p_vaddr()
                    && ident.entry - phdr.p_vaddr() < phdr.p_filesz()
            });

            if let Some((_, phdr)) = segment {
                entry = entry.wrapping_add(phdr.p_paddr().wrapping_sub(phdr.p_vaddr()));
            }
        }
        None => {}
    }

    if loader.clear_lsb {
        entry &= !1;
    }

    if segments.is_empty() {
        low = 0;
    }

    Ok(ElfImage {
        ident,
        info: ImageInfo {
            entry: Some(Pa(entry)),
            bias,
            low: Pa(low),
            high: Pa(high),
            size: total,
        },
        segments,
    })
}
