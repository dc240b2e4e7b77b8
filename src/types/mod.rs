//! This module defines the core, strongly-typed data representations used
//! throughout the digit2raw pipeline.
//!
//! It currently includes the canonical `Digit` record and the `LinkId`
//! newtype that replaces fragile raw-integer link addressing.

pub mod digit;

// Re-export the main types for easier access.
pub use digit::{Digit, LinkId, MAX_MODULES, SIDES_PER_MODULE};
