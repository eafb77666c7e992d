//! Shared foundational types for the Pulsar hardware compiler.
//!
//! This crate provides interned identifiers with Rust-identifier
//! sanitization, symbol hashing for generated-artifact disambiguation,
//! and the common internal-error result type.

#![warn(missing_docs)]

pub mod hash;
pub mod ident;
pub mod result;

pub use hash::SymbolHash;
pub use ident::{sanitize_ident, Ident, Interner};
pub use result::{InternalError, PulsarResult};
