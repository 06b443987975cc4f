//! Error types for the clfus library.
//!
//! ## Key Components
//!
//! - [`InvariantError`]: Returned when internal cache invariants are violated
//!   (`check_invariants` on the cache core).
//! - [`ConfigError`]: Returned when cache configuration parameters are invalid
//!   (e.g. a compression percentage above 100).
//! - [`CodecError`]: Returned by codec compress/decompress operations. Never
//!   surfaces through the cache API; the engine converts codec failures into
//!   incompressible markings or entry destruction.
//!
//! Cache outcomes themselves (miss, refused admission, not-found) are not
//! errors and are expressed through `Option`/outcome enums.

use std::fmt;

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal cache invariants are violated.
///
/// Produced by [`ClfusCache::check_invariants`](crate::cache::ClfusCache::check_invariants).
/// Carries a human-readable description of which invariant failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvariantError {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when cache configuration parameters are invalid.
///
/// Produced by [`RamCacheBuilder::try_build`](crate::builder::RamCacheBuilder::try_build).
///
/// # Example
///
/// ```
/// use clfus::builder::RamCacheBuilder;
/// use clfus::codec::CodecKind;
///
/// let err = RamCacheBuilder::new(1 << 20)
///     .compression(CodecKind::Fast, 150)
///     .try_build()
///     .unwrap_err();
/// assert!(err.to_string().contains("percent"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// CodecError
// ---------------------------------------------------------------------------

/// Error returned when a compression codec fails to encode or decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecError(String);

impl CodecError {
    /// Creates a new `CodecError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for CodecError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
