// In: src/error.rs

//! This module defines the single, unified error type for the entire digit2raw tool.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RawError {
    // =========================================================================
    // === High-Level, Semantic Errors (Specific to our tool's logic)
    // =========================================================================
    /// Invalid or contradictory configuration, including an unknown RDH version.
    /// Always fatal and always detected before any digit is processed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A digit's addressing fields map to no known link destination.
    /// Recoverable: the caller drops the digit and counts it.
    #[error("Addressing error: {0}")]
    Addressing(String),

    /// The digit input file is malformed, truncated, or violates time ordering.
    #[error("Digit stream format error: {0}")]
    DigitFormat(String),

    /// A frame would exceed the configured super-page size even on its own.
    /// Fatal: truncating a frame silently is never acceptable.
    #[error("Framing invariant violated: {0}")]
    FramingInvariant(String),

    /// RDH encoding/decoding failed (bad magic, version, or truncation).
    #[error("RDH format error: {0}")]
    HeaderFormat(String),

    #[error("Internal logic error (this is a bug): {0}")]
    Internal(String),

    // =========================================================================
    // === External Error Wrappers (Using #[from] for automatic conversion)
    // =========================================================================
    /// An error originating from the underlying I/O subsystem (e.g., cannot
    /// create the output directory, cannot open a link file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from the Serde JSON library, typically during manifest serialization.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// An error from a safe byte-casting operation failing.
    #[error("Byte slice casting error: {0}")]
    PodCast(String), // Manual `From` impl is needed as bytemuck::PodCastError doesn't impl Error
}

// =============================================================================
// === Manual `From` Implementations ===
// =============================================================================

impl From<bytemuck::PodCastError> for RawError {
    fn from(err: bytemuck::PodCastError) -> Self {
        RawError::PodCast(err.to_string())
    }
}
