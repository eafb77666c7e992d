//! Common result and error types for the Pulsar toolchain.

/// The result type for fallible internal operations.
///
/// `Err` indicates a bug in Pulsar itself, never a problem with the user's
/// design. Design errors are reported through the per-crate error enums
/// (for example `pulsar_simgen::SimGenError`).
pub type PulsarResult<T> = Result<T, InternalError>;

/// An internal compiler error: a broken invariant inside Pulsar.
#[derive(Debug, thiserror::Error)]
#[error("internal compiler error: {message}")]
pub struct InternalError {
    /// Description of the broken invariant.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let err = InternalError::new("dangling expression id");
        assert_eq!(
            format!("{err}"),
            "internal compiler error: dangling expression id"
        );
    }

    #[test]
    fn from_string() {
        let err: InternalError = "oops".to_string().into();
        assert_eq!(err.message, "oops");
    }
}
