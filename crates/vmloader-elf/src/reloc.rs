use elf::abi;
use vmloader_core::Hex;
use zerocopy::byteorder::ByteOrder;

use crate::{
    ElfError, ElfSegment,
    class::{ElfClass, table_entry},
    header::{FileHeader, Relocation, SectionHeader},
};

pub(crate) const EM_LOONGARCH: u16 = 258;

const R_X86_64_RELATIVE: u32 = 8;
const R_AARCH64_RELATIVE: u32 = 1027;
const R_RISCV_RELATIVE: u32 = 3;
const R_390_RELATIVE: u32 = 12;
const R_PPC64_RELATIVE: u32 = 22;
const R_LARCH_RELATIVE: u32 = 3;

/// Returns the `*_RELATIVE` relocation type of `machine`.
fn relative_type(machine: u16) -> Option<u32> {
    match machine {
        abi::EM_X86_64 => Some(R_X86_64_RELATIVE),
        abi::EM_AARCH64 => Some(R_AARCH64_RELATIVE),
        abi::EM_RISCV => Some(R_RISCV_RELATIVE),
        abi::EM_S390 => Some(R_390_RELATIVE),
        abi::EM_PPC64 => Some(R_PPC64_RELATIVE),
        EM_LOONGARCH => Some(R_LARCH_RELATIVE),
        _ => None,
    }
}

/// Applies the relative relocations of every `SHT_RELA` section to the
/// file content of the loaded segments.
///
/// Each relocated word becomes `addend + bias`, stored with the width and
/// byte order of the file. Returns the number of applied relocations.
pub(crate) fn apply_relative<C, O>(
    file: &[u8],
    header: &C::Ehdr<O>,
    segments: &mut [ElfSegment],
    bias: i64,
) -> Result<usize, ElfError>
where
    C: ElfClass,
    O: ByteOrder,
{
    let Some(relative) = relative_type(header.e_machine())
    else {
        tracing::debug!(
            machine = header.e_machine(),
            "relative relocations not supported for machine"
        );
        return Ok(0);
    };

    if header.e_shnum() == 0 {
        return Ok(0);
    }

    let shentsize = u64::from(header.e_shentsize());
    if shentsize < size_of::<C::Shdr<O>>() as u64 {
        return Err(ElfError::LoadFailed);
    }

    let mut count = 0;

    for index in 0..u64::from(header.e_shnum()) {
        let section = table_entry::<C::Shdr<O>>(file, header.e_shoff(), shentsize, index)
            .ok_or(ElfError::LoadFailed)?;

        if section.sh_type() != abi::SHT_RELA {
            continue;
        }

        let entsize = section.sh_entsize();
        if entsize < size_of::<C::Rela<O>>() as u64 {
            return Err(ElfError::LoadFailed);
        }

        for entry in 0..section.sh_size() / entsize {
            let rela = table_entry::<C::Rela<O>>(file, section.sh_offset(), entsize, entry)
                .ok_or(ElfError::LoadFailed)?;

            if rela.r_type() != relative {
                continue;
            }

            let target = rela.r_offset();
            let Some(segment) = segments.iter_mut().find(|segment| {
                target
                    .checked_sub(segment.segment.vaddr)
                    .and_then(|offset| offset.checked_add(C::WORD_SIZE as u64))
                    .is_some_and(|end| end <= segment.segment.file_size)
            })
            else {
                tracing::warn!(
                    offset = %Hex(target),
                    "relocation outside of loaded data"
                );
                continue;
            };

            let offset = (target - segment.segment.vaddr) as usize;
            let value = rela.r_addend().wrapping_add(bias) as u64;

            C::write_word::<O>(&mut segment.data.make_mut()[offset..], value)
                .ok_or(ElfError::LoadFailed)?;

            count += 1;
        }
    }

    Ok(count)
}
