// WRT - wrt-error
// Module: Error taxonomy for the component-model core
//
// Copyright (c) 2024 The WRT Project Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

#![cfg_attr(not(feature = "std"), no_std)]

//! Error handling for the WebAssembly Component Model core.
//!
//! The core never panics its way out of parsing, resolution or the
//! canonical ABI engine. Every fallible entry point returns [`Result`],
//! whose error is a single [`Error`] carrying a closed [`ErrorCategory`],
//! a numeric [`codes`] constant, and a human-readable message.

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(feature = "alloc")]
mod message {
    #[cfg(feature = "std")]
    pub use std::string::String;
    #[cfg(not(feature = "std"))]
    pub use alloc::string::String;
}

pub mod codes;

use core::fmt;

/// The six kinds of failure the core can produce (see the error handling
/// design in the specification): a malformed binary, a recognized-but-
/// unsupported feature, a link/resolution failure, a type mismatch, an
/// ABI violation, or a guest trap surfaced verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Parse-time failure: truncation, bad LEB128, unknown discriminant.
    Malformed,
    /// A recognized but unimplemented feature (async, streams, ...).
    Unsupported,
    /// Missing import/export, sort mismatch, bad outer-alias count.
    Resolution,
    /// Structural or nominal type mismatch.
    Type,
    /// Canonical ABI invariant violated at run time.
    Abi,
    /// The core engine reported a guest trap.
    Trap,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Malformed => "malformed binary",
            Self::Unsupported => "unsupported feature",
            Self::Resolution => "resolution error",
            Self::Type => "type mismatch",
            Self::Abi => "ABI violation",
            Self::Trap => "guest trap",
        };
        f.write_str(s)
    }
}

/// The single error type produced by every fallible operation in the core.
///
/// Carries a category for coarse-grained `match`, a numeric code for
/// exact diagnostics, and (when the `alloc` feature is enabled, which it
/// is by default) a formatted message for humans.
#[derive(Debug, Clone)]
pub struct Error {
    /// Coarse failure kind.
    pub category: ErrorCategory,
    /// Specific failure code, see [`codes`].
    pub code: u16,
    /// Human-readable detail.
    #[cfg(feature = "alloc")]
    pub message: message::String,
}

impl Error {
    /// Build an error from a category, code and message.
    #[cfg(feature = "alloc")]
    pub fn new<S: Into<message::String>>(category: ErrorCategory, code: u16, message: S) -> Self {
        Self { category, code, message: message.into() }
    }

    /// Build an error from a category and code only (no_std, no alloc).
    #[cfg(not(feature = "alloc"))]
    pub fn new(category: ErrorCategory, code: u16) -> Self {
        Self { category, code }
    }

    /// True if this error's category is [`ErrorCategory::Malformed`].
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        self.category == ErrorCategory::Malformed
    }

    /// True if this error's category is [`ErrorCategory::Resolution`].
    #[must_use]
    pub fn is_resolution(&self) -> bool {
        self.category == ErrorCategory::Resolution
    }

    /// True if this error's category is [`ErrorCategory::Abi`].
    #[must_use]
    pub fn is_abi(&self) -> bool {
        self.category == ErrorCategory::Abi
    }

    /// True if this error's category is [`ErrorCategory::Unsupported`].
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        self.category == ErrorCategory::Unsupported
    }
}

impl fmt::Display for Error {
    #[cfg(feature = "alloc")]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.category, self.code, self.message)
    }

    #[cfg(not(feature = "alloc"))]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.category, self.code)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Crate-local result alias used throughout the component-model core.
pub type Result<T> = core::result::Result<T, Error>;

/// Construct an [`Error`], threading through `alloc`/no-`alloc` signatures.
#[cfg(feature = "alloc")]
#[must_use]
pub fn err<S: Into<message::String>>(category: ErrorCategory, code: u16, message: S) -> Error {
    Error::new(category, code, message)
}

#[cfg(not(feature = "alloc"))]
#[must_use]
pub fn err(category: ErrorCategory, code: u16) -> Error {
    Error::new(category, code)
}
