//! Interned identifiers and identifier sanitization.
//!
//! Every named IR entity (module, port, array, wire) stores an [`Ident`],
//! a `u32` index into the [`Interner`] owned by the enclosing system.
//! Because generated simulator code uses these names as Rust identifiers,
//! [`sanitize_ident`] normalizes arbitrary user strings into valid,
//! keyword-safe identifiers before interning.

use lasso::ThreadedRodeo;
use serde::{Deserialize, Serialize};

/// An interned name for a named entity in a system.
///
/// `Ident` is a thin index into an [`Interner`], giving O(1) equality and
/// copy semantics. The same string interned twice yields the same `Ident`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Ident(u32);

impl Ident {
    /// Creates an `Ident` from a raw index. Intended for deserialization
    /// and tests; normal construction goes through [`Interner::intern`].
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index of this identifier.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

// SAFETY: `Ident` wraps a `u32`, which always fits in a `usize` on the
// platforms we support; `try_from_usize` rejects indices above `u32::MAX`.
unsafe impl lasso::Key for Ident {
    fn into_usize(self) -> usize {
        self.0 as usize
    }

    fn try_from_usize(int: usize) -> Option<Self> {
        u32::try_from(int).ok().map(Ident)
    }
}

/// String interner for entity names, backed by [`lasso::ThreadedRodeo`].
pub struct Interner {
    rodeo: ThreadedRodeo<Ident>,
}

impl Interner {
    /// Creates a new empty interner.
    pub fn new() -> Self {
        Self {
            rodeo: ThreadedRodeo::new(),
        }
    }

    /// Interns a string after sanitizing it into a valid Rust identifier.
    ///
    /// All IR names flow through this method, so every name that later
    /// appears in generated code is already identifier-safe.
    pub fn intern(&self, s: &str) -> Ident {
        self.rodeo.get_or_intern(sanitize_ident(s))
    }

    /// Interns a string verbatim, without sanitization.
    ///
    /// Used for strings that are not emitted as identifiers (format
    /// strings, file names).
    pub fn intern_raw(&self, s: &str) -> Ident {
        self.rodeo.get_or_intern(s)
    }

    /// Resolves an [`Ident`] back to its string.
    ///
    /// # Panics
    ///
    /// Panics if the `Ident` was not produced by this interner.
    pub fn resolve(&self, ident: Ident) -> &str {
        self.rodeo.resolve(&ident)
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

/// Rust keywords that must not collide with generated identifiers.
const KEYWORDS: &[&str] = &[
    "as", "break", "const", "continue", "crate", "dyn", "else", "enum", "extern", "false", "fn",
    "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref",
    "return", "self", "static", "struct", "super", "trait", "true", "type", "unsafe", "use",
    "where", "while",
];

/// Normalizes an arbitrary string into a valid Rust identifier.
///
/// Non-alphanumeric characters become `_`, a leading digit gets a `v`
/// prefix, keywords get a trailing `_`, and an empty input becomes `_`.
pub fn sanitize_ident(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        out.push('_');
    }
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, 'v');
    }
    if KEYWORDS.contains(&out.as_str()) {
        out.push('_');
    }
    out
}
