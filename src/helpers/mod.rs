//! Low-level container plumbing: byte sources, ZIP and XML access for the
//! modern format, CFB and BIFF8 readers for the legacy one.

pub(crate) mod biff8;
pub(crate) mod cfb;
pub(crate) mod source;
pub(crate) mod string;
pub(crate) mod xml;
pub(crate) mod zip;
