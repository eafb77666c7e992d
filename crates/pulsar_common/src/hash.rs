//! Symbol hashing for generated-artifact disambiguation.
//!
//! When several external hardware blocks share a top-module name, the FFI
//! bridge generator needs globally unique C symbol prefixes and library
//! names. A [`SymbolHash`] of the block's source path and instance name
//! provides a short, stable discriminator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 64-bit XXH3 hash used to disambiguate generated symbols.
///
/// Two identical inputs always produce the same hash, so re-elaborating an
/// unchanged system reproduces identical artifact names.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolHash(u64);

impl SymbolHash {
    /// Computes the hash of a byte slice.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(xxhash_rust::xxh3::xxh3_64(data))
    }

    /// Computes the hash of several parts joined with a separator byte.
    ///
    /// Joining prevents `("ab", "c")` and `("a", "bc")` from colliding.
    pub fn from_parts(parts: &[&str]) -> Self {
        let mut buf = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                buf.push(0);
            }
            buf.extend_from_slice(part.as_bytes());
        }
        Self::from_bytes(&buf)
    }

    /// Returns the low 32 bits as 8 hex characters, the form embedded in
    /// symbol prefixes.
    pub fn short_hex(self) -> String {
        format!("{:08x}", self.0 as u32)
    }
}

impl fmt::Display for SymbolHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for SymbolHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolHash({})", self.short_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = SymbolHash::from_bytes(b"adder.sv");
        let b = SymbolHash::from_bytes(b"adder.sv");
        assert_eq!(a, b);
    }

    #[test]
    fn different_inputs_differ() {
        let a = SymbolHash::from_bytes(b"adder.sv");
        let b = SymbolHash::from_bytes(b"shifter.sv");
        assert_ne!(a, b);
    }

    #[test]
    fn parts_are_separated() {
        let a = SymbolHash::from_parts(&["ab", "c"]);
        let b = SymbolHash::from_parts(&["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn short_hex_is_eight_chars() {
        let h = SymbolHash::from_bytes(b"x");
        let s = h.short_hex();
        assert_eq!(s.len(), 8);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn display_is_sixteen_chars() {
        let h = SymbolHash::from_bytes(b"x");
        assert_eq!(format!("{h}").len(), 16);
    }

    #[test]
    fn serde_roundtrip() {
        let h = SymbolHash::from_parts(&["adder", "1"]);
        let json = serde_json::to_string(&h).unwrap();
        let back: SymbolHash = serde_json::from_str(&json).unwrap();
        assert_eq!(h, back);
    }
}
