//! Numeric error codes, grouped by [`crate::ErrorCategory`] in
//! hundreds-blocks so the code alone identifies the neighborhood.

// --- 1000s: malformed binary -------------------------------------------

/// Preamble magic/version/layer mismatch.
pub const INVALID_PREAMBLE: u16 = 1000;
/// A LEB128 integer exceeded its maximum encoded width.
pub const LEB128_TOO_LONG: u16 = 1001;
/// A count or section size ran past the end of its bounded buffer.
pub const TRUNCATED_SECTION: u16 = 1002;
/// A type-constructor discriminant byte was not recognized at all.
pub const UNKNOWN_TYPE_CONSTRUCTOR: u16 = 1003;
/// A section's declared size did not match the bytes actually available.
pub const SECTION_SIZE_MISMATCH: u16 = 1004;
/// Invalid UTF-8 in a length-prefixed name.
pub const INVALID_UTF8: u16 = 1005;
/// A section id byte was not one of the recognized ids.
pub const UNKNOWN_SECTION_ID: u16 = 1006;

// --- 2000s: unsupported feature -----------------------------------------

/// A recognized but not-implemented type constructor (stream, future,
/// error-context, fixed-length list) or async function/resource.
pub const UNSUPPORTED_FEATURE: u16 = 2000;

// --- 3000s: link / resolution --------------------------------------------

/// `instantiate` was called without a required import.
pub const MISSING_IMPORT: u16 = 3000;
/// The value supplied for an import did not match the declared sort.
pub const IMPORT_SORT_MISMATCH: u16 = 3001;
/// An instance export lookup found no entry under the requested name.
pub const MISSING_EXPORT: u16 = 3002;
/// An export existed but was not of the requested sort.
pub const EXPORT_SORT_MISMATCH: u16 = 3003;
/// `resolve(sort, idx)` was called with `idx` out of range.
pub const INDEX_OUT_OF_RANGE: u16 = 3004;
/// `outer(count, ...)` exceeded the actual nesting depth.
pub const INVALID_OUTER_ALIAS_COUNT: u16 = 3005;
/// A canonical lift/lower option set was incomplete for the function type
/// it adapts (e.g. a string/list parameter without a realloc option).
pub const INCOMPLETE_CANON_OPTIONS: u16 = 3006;

// --- 4000s: type mismatch -------------------------------------------------

/// Structural value-type comparison failed.
pub const TYPE_MISMATCH: u16 = 4000;
/// Nominal resource-type comparison failed.
pub const RESOURCE_TYPE_MISMATCH: u16 = 4001;
/// Function type parameter/result comparison failed.
pub const FUNC_TYPE_MISMATCH: u16 = 4002;

// --- 5000s: ABI violation --------------------------------------------------

/// A variant discriminant read from memory named no declared case.
pub const INVALID_DISCRIMINANT: u16 = 5000;
/// A handle index was out of range for its table.
pub const HANDLE_OUT_OF_RANGE: u16 = 5001;
/// A handle was used after being dropped.
pub const HANDLE_USE_AFTER_DROP: u16 = 5002;
/// An `own` handle was lifted while it still had active borrows.
pub const OWN_LIFT_WHILE_BORROWED: u16 = 5003;
/// `realloc` returned a null or misaligned pointer.
pub const REALLOC_INVALID_POINTER: u16 = 5004;
/// `resource.drop`/`resource.rep` used a handle not owned by the caller.
pub const HANDLE_NOT_OWNED: u16 = 5005;
/// `resource.new` was asked for a representation other than `i32`.
pub const UNSUPPORTED_RESOURCE_REPRESENTATION: u16 = 5006;
/// A resource with active borrows was dropped.
pub const DROP_WHILE_BORROWED: u16 = 5007;

// --- 6000s: guest trap ------------------------------------------------------

/// The core engine reported a trap during a call.
pub const GUEST_TRAP: u16 = 6000;
