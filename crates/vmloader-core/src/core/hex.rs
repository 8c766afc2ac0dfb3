macro_rules! impl_hex {
    ($($type:ty),* $(,)?) => {
        $(
            impl ::std::fmt::Debug for Hex<$type> {
                fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                    fmt_padded(f, self.0)
                }
            }

            impl ::std::fmt::Display for Hex<$type> {
                fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                    fmt_padded(f, self.0)
                }
            }
        )*
    };
}

fn fmt_padded<T>(f: &mut ::std::fmt::Formatter, value: T) -> ::std::fmt::Result
where
    T: Copy + ::std::fmt::LowerHex,
{
    match size_of::<T>() {
        1 => write!(f, "0x{:02x}", value),
        2 => write!(f, "0x{:04x}", value),
        4 => write!(f, "0x{:08x}", value),
        8 => write!(f, "0x{:016x}", value),
        _ => write!(f, "0x{:x}", value),
    }
}

/// A hexadecimal representation of a value.
///
/// The value is zero-padded to the width of its type, which keeps columns
/// aligned in region listings and overlap reports.
///
/// # Examples
///
/// ```
/// # use vmloader_core::Hex;
/// assert_eq!(format!("{}", Hex(42u16)), "0x002a");
/// assert_eq!(format!("{}", Hex(0x1000u64)), "0x0000000000001000");
/// ```
pub struct Hex<T>(pub T);

impl_hex!(u8, u16, u32, u64, usize);

/// A short hexadecimal dump of a byte slice, used in trace output.
///
/// At most [`HexDump::LIMIT`] bytes are printed.
///
/// ```
/// # use vmloader_core::HexDump;
/// assert_eq!(format!("{}", HexDump(&[0x7f, b'E', b'L', b'F'])), "7f 45 4c 46");
/// ```
pub struct HexDump<'a>(pub &'a [u8]);

impl HexDump<'_> {
    /// Maximum number of bytes rendered.
    pub const LIMIT: usize = 16;
}

impl ::std::fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        for (index, byte) in self.0.iter().take(Self::LIMIT).enumerate() {
            if index > 0 {
                write!(f, " ")?;
            }

            write!(f, "{:02x}", byte)?;
        }

        if self.0.len() > Self::LIMIT {
            write!(f, " ...")?;
        }

        Ok(())
    }
}

impl ::std::fmt::Debug for HexDump<'_> {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        write!(f, "[{}]", self)
    }
}
