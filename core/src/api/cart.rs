//! Cartridge API.

/// Cartridge support.
pub trait Support {
    /// Cartridge interface.
    type Cartridge: Cartridge;

    /// Gets the inserted cartridge.
    fn cart(&self) -> &Self::Cartridge;

    /// Mutably gets the inserted cartridge.
    fn cart_mut(&mut self) -> &mut Self::Cartridge;
}

/// Cartridge interface.
pub trait Cartridge {
    /// Parsed header title (ASCII, trimmed of trailing NUL padding).
    #[must_use]
    fn title(&self) -> &str;
}
