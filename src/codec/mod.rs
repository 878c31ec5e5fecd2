//! Variable-byte codec: the atomic encoding every on-disk record builds on.

pub mod vbyte;
