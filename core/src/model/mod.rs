//! Top-level emulator models.

pub mod gba;
