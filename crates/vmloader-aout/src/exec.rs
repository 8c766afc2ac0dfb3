use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    byteorder::{ByteOrder, U32},
};

/// Impure executable: text and data are contiguous and writable.
pub const OMAGIC: u16 = 0o407;

/// Pure executable: data starts on the page following the text.
pub const NMAGIC: u16 = 0o410;

/// Demand paged executable: text starts at file offset 1024.
pub const ZMAGIC: u16 = 0o413;

/// Demand paged executable with the header inside the text.
pub const QMAGIC: u16 = 0o314;

/// The a.out `exec` header.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout, Unaligned)]
#[expect(missing_docs)]
pub struct Exec<O: ByteOrder> {
    pub a_info: U32<O>,
    pub a_text: U32<O>,
    pub a_data: U32<O>,
    pub a_bss: U32<O>,
    pub a_syms: U32<O>,
    pub a_entry: U32<O>,
    pub a_trsize: U32<O>,
    pub a_drsize: U32<O>,
}

impl<O: ByteOrder> Exec<O> {
    /// Returns the magic number.
    pub fn magic(&self) -> u16 {
        self.a_info.get() as u16
    }

    /// Returns the file offset of the text section.
    pub fn text_offset(&self) -> u64 {
        match self.magic() {
            ZMAGIC => 1024,
            QMAGIC => 0,
            _ => size_of::<Self>() as u64,
        }
    }

    /// Returns the load offset of the data section relative to the text.
    pub fn data_offset(&self, page_size: u64) -> u64 {
        let text_end = match self.magic() {
            QMAGIC => page_size + u64::from(self.a_text.get()),
            _ => u64::from(self.a_text.get()),
        };

        match self.magic() {
            OMAGIC => text_end,
            _ => text_end.next_multiple_of(page_size.max(1)),
        }
    }
}
