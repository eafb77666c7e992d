//! Scalar data types with explicit bit widths.
//!
//! Every value in the IR carries a [`DataType`]: a signedness class plus an
//! exact bit width. Widths above 64 are legal; the simulator backend routes
//! them through arbitrary-precision arithmetic.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar hardware type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Unsigned integer of the given width.
    UInt(u32),
    /// Two's-complement signed integer of the given width.
    Int(u32),
    /// Raw bit vector of the given width; arithmetic treats it as unsigned.
    Bits(u32),
}

impl DataType {
    /// Returns the bit width.
    pub fn bits(self) -> u32 {
        match self {
            DataType::UInt(w) | DataType::Int(w) | DataType::Bits(w) => w,
        }
    }

    /// Returns `true` for signed types.
    pub fn is_signed(self) -> bool {
        matches!(self, DataType::Int(_))
    }

    /// Returns a type of the same signedness class with a different width.
    pub fn with_bits(self, bits: u32) -> Self {
        match self {
            DataType::UInt(_) => DataType::UInt(bits),
            DataType::Int(_) => DataType::Int(bits),
            DataType::Bits(_) => DataType::Bits(bits),
        }
    }

    /// A single-bit raw value, the type of all comparison results.
    pub fn bit() -> Self {
        DataType::Bits(1)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::UInt(w) => write!(f, "u{w}"),
            DataType::Int(w) => write!(f, "i{w}"),
            DataType::Bits(w) => write!(f, "b{w}"),
        }
    }
}
