use zerocopy::{FromBytes as _, byteorder::ByteOrder};

use crate::{ElfEndian, header::ElfNhdr};

/// An entry of a `PT_NOTE` segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfNote<'a> {
    /// Owner name without the terminating NUL.
    pub name: &'a [u8],

    /// Note type.
    pub kind: u32,

    /// Descriptor bytes.
    pub desc: &'a [u8],

    /// `true` if the note comes from a 64-bit image.
    pub is64: bool,

    /// Byte order of the image.
    pub endian: ElfEndian,
}

/// Walks the notes of a `PT_NOTE` segment.
///
/// Name and descriptor are padded to 4 bytes, or to 8 bytes when the
/// segment is 8-byte aligned. Parsing stops silently at the first entry
/// that does not fit.
pub(crate) fn for_each_note<O: ByteOrder>(
    data: &[u8],
    p_align: u64,
    is64: bool,
    endian: ElfEndian,
    mut f: impl FnMut(&ElfNote),
) {
    let align = if p_align == 8 { 8 } else { 4 };
    let pad = |len: usize| len.checked_next_multiple_of(align);

    let mut rest = data;
    while let Ok((header, tail)) = ElfNhdr::<O>::ref_from_prefix(rest) {
        let namesz = header.n_namesz.get() as usize;
        let descsz = header.n_descsz.get() as usize;

        let Some((desc_start, desc_padded)) = pad(namesz).zip(pad(descsz))
        else {
            return;
        };

        let Some(next) = desc_start
            .checked_add(desc_padded)
            .filter(|&end| end <= tail.len())
        else {
            return;
        };

        let name = &tail[..namesz];
        let name = name.strip_suffix(b"\0").unwrap_or(name);

        f(&ElfNote {
            name,
            kind: header.n_type.get(),
            desc: &tail[desc_start..desc_start + descsz],
            is64,
            endian,
        });

        rest = &tail[next..];
    }
}
