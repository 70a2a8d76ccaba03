// Security module for input sanitization
//
// This module provides utilities to ensure that externally supplied text and
// registry identifiers are normalized before they reach the registry client
// or are echoed back in error messages.

pub mod sanitize;

pub use sanitize::{MAX_ARGUMENT_LENGTH, normalize_identifier, sanitize_string, validate_digits};
