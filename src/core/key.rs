//! Variable identifiers.
//!
//! A [`Key`] is an opaque 64-bit handle for one unknown in a factor graph. Keys are totally
//! ordered so every map keyed by them iterates deterministically.
//!
//! Keys are usually built as *symbols*: a character tag in the most significant byte and an
//! index in the remaining 56 bits, so `Key::symbol('x', 3)` prints as `x3`. Plain integer keys
//! (`Key::new(42)`) are also supported and print as their number.

use std::fmt::{self, Display, Formatter};

const CHR_BITS: u64 = 8;
const INDEX_BITS: u64 = 64 - CHR_BITS;
const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;

/// Unique identifier of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(u64);

impl Key {
    /// Wrap a raw 64-bit identifier.
    pub const fn new(raw: u64) -> Self {
        Key(raw)
    }

    /// Build a symbol key from an ASCII tag and an index.
    ///
    /// Only the low byte of `chr` is kept and the index is truncated to 56 bits.
    ///
    /// ```
    /// use subgraph_solver::core::Key;
    ///
    /// let key = Key::symbol('x', 3);
    /// assert_eq!(key.chr(), Some('x'));
    /// assert_eq!(key.index(), 3);
    /// assert_eq!(key.to_string(), "x3");
    /// ```
    pub const fn symbol(chr: char, index: u64) -> Self {
        Key((((chr as u32) as u64 & 0xFF) << INDEX_BITS) | (index & INDEX_MASK))
    }

    /// The raw 64-bit value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// The symbol tag, if this key carries a printable ASCII one.
    pub fn chr(self) -> Option<char> {
        let byte = (self.0 >> INDEX_BITS) as u8;
        if byte.is_ascii_graphic() {
            Some(byte as char)
        } else {
            None
        }
    }

    /// The symbol index (lower 56 bits).
    pub const fn index(self) -> u64 {
        self.0 & INDEX_MASK
    }
}

impl From<u64> for Key {
    fn from(raw: u64) -> Self {
        Key(raw)
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.chr() {
            Some(chr) => write!(f, "{}{}", chr, self.index()),
            None => write!(f, "{}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_roundtrip() {
        let key = Key::symbol('l', 1234);
        assert_eq!(key.chr(), Some('l'));
        assert_eq!(key.index(), 1234);
        assert_eq!(format!("{key}"), "l1234");
    }

    #[test]
    fn test_plain_key_display() {
        let key = Key::new(42);
        assert_eq!(key.chr(), None);
        assert_eq!(key.to_string(), "42");
        assert_eq!(Key::from(42), key);
    }

    #[test]
    fn test_symbol_ordering() {
        // Same tag orders by index, different tags order by tag
        assert!(Key::symbol('x', 1) < Key::symbol('x', 2));
        assert!(Key::symbol('l', 100) < Key::symbol('x', 0));
    }
}
