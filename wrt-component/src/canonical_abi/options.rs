//! `canonopt`: the small bundle of options a `canon lift`/`canon lower`
//! definition carries (string encoding, and which core exports supply
//! memory/realloc/post-return).

use crate::prelude::*;

/// The string encoding a lifted/lowered `string` is transcoded through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    Utf8,
    Utf16,
    Latin1OrUtf16,
}

impl Default for StringEncoding {
    fn default() -> Self {
        StringEncoding::Utf8
    }
}

/// Canonical options attached to a `canon lift` or `canon lower`
/// definition. `memory`/`realloc` name the core exports to use; absent
/// when the function signature never needs linear memory (all-scalar,
/// within the flat-parameter/result budget).
#[derive(Debug, Clone, Default)]
pub struct CanonicalOptions {
    pub string_encoding: StringEncoding,
    pub memory: Option<String>,
    pub realloc: Option<String>,
    pub post_return: Option<String>,
}

impl CanonicalOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_memory(&self) -> Result<&str> {
        self.memory.as_deref().ok_or_else(|| errors::incomplete_canon_options("missing memory"))
    }

    pub fn require_realloc(&self) -> Result<&str> {
        self.realloc.as_deref().ok_or_else(|| errors::incomplete_canon_options("missing realloc"))
    }
}

use crate::errors;
