//! a.out image loading.
//!
//! Supports the OMAGIC, NMAGIC, ZMAGIC and QMAGIC variants. The format has
//! no segment permissions, so text and data are loaded as plain bytes.

mod error;
mod exec;
mod load;

pub use self::{
    error::AoutError,
    exec::{Exec, NMAGIC, OMAGIC, QMAGIC, ZMAGIC},
    load::{AoutOptions, load_aout, load_aout_mapped},
};
