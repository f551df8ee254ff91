//! Constructors for the error messages the specification pins down
//! verbatim (missing import, sort mismatch, missing export, ...).

use crate::prelude::*;

pub fn malformed(code: u16, msg: impl Into<String>) -> Error {
    Error::new(ErrorCategory::Malformed, code, msg.into())
}

pub fn unsupported(feature: &str) -> Error {
    Error::new(ErrorCategory::Unsupported, codes::UNSUPPORTED_FEATURE, format!("unsupported feature: {feature}"))
}

pub fn index_out_of_range(sort: &str, idx: u32, len: usize) -> Error {
    Error::new(
        ErrorCategory::Resolution,
        codes::INDEX_OUT_OF_RANGE,
        format!("{sort} index {idx} out of range (have {len})"),
    )
}

pub fn invalid_outer_alias_count(count: u32, depth: u32) -> Error {
    Error::new(
        ErrorCategory::Resolution,
        codes::INVALID_OUTER_ALIAS_COUNT,
        format!("invalid outer alias count {count} (nesting depth {depth})"),
    )
}

pub fn missing_import(name: &str) -> Error {
    Error::new(
        ErrorCategory::Resolution,
        codes::MISSING_IMPORT,
        format!("missing import named `{name}`"),
    )
}

pub fn import_sort_mismatch(expected: &str, found: &str) -> Error {
    Error::new(
        ErrorCategory::Resolution,
        codes::IMPORT_SORT_MISMATCH,
        format!("expected {expected}, found {found}"),
    )
}

pub fn missing_export(name: &str) -> Error {
    Error::new(
        ErrorCategory::Resolution,
        codes::MISSING_EXPORT,
        format!("missing expected export `{name}`"),
    )
}

pub fn export_sort_mismatch(expected: &str, found: &str) -> Error {
    Error::new(
        ErrorCategory::Resolution,
        codes::EXPORT_SORT_MISMATCH,
        format!("expected {expected}, found {found}"),
    )
}

pub fn incomplete_canon_options(detail: &str) -> Error {
    Error::new(ErrorCategory::Resolution, codes::INCOMPLETE_CANON_OPTIONS, format!("incomplete canonical options: {detail}"))
}

pub fn type_mismatch(detail: impl Into<String>) -> Error {
    Error::new(ErrorCategory::Type, codes::TYPE_MISMATCH, detail.into())
}

pub fn func_type_mismatch(detail: impl Into<String>) -> Error {
    Error::new(ErrorCategory::Type, codes::FUNC_TYPE_MISMATCH, detail.into())
}

pub fn resource_type_mismatch(detail: impl Into<String>) -> Error {
    Error::new(ErrorCategory::Type, codes::RESOURCE_TYPE_MISMATCH, detail.into())
}

pub fn invalid_discriminant(value: u32, case_count: usize) -> Error {
    Error::new(
        ErrorCategory::Abi,
        codes::INVALID_DISCRIMINANT,
        format!("invalid variant discriminant {value} ({case_count} cases declared)"),
    )
}

pub fn handle_out_of_range(idx: u32) -> Error {
    Error::new(ErrorCategory::Abi, codes::HANDLE_OUT_OF_RANGE, format!("handle index {idx} out of range"))
}

pub fn handle_use_after_drop(idx: u32) -> Error {
    Error::new(ErrorCategory::Abi, codes::HANDLE_USE_AFTER_DROP, format!("handle index {idx} used after drop"))
}

pub fn own_lift_while_borrowed(idx: u32) -> Error {
    Error::new(
        ErrorCategory::Abi,
        codes::OWN_LIFT_WHILE_BORROWED,
        format!("cannot lift handle {idx} as own while borrows are active"),
    )
}

pub fn drop_while_borrowed(idx: u32) -> Error {
    Error::new(
        ErrorCategory::Abi,
        codes::DROP_WHILE_BORROWED,
        format!("cannot drop handle {idx} while borrows are active"),
    )
}

pub fn handle_not_owned(idx: u32) -> Error {
    Error::new(ErrorCategory::Abi, codes::HANDLE_NOT_OWNED, format!("handle {idx} is not an owned handle"))
}

pub fn realloc_invalid_pointer(ptr: u32) -> Error {
    Error::new(ErrorCategory::Abi, codes::REALLOC_INVALID_POINTER, format!("realloc returned invalid pointer {ptr}"))
}

pub fn guest_trap(detail: impl Into<String>) -> Error {
    Error::new(ErrorCategory::Trap, codes::GUEST_TRAP, detail.into())
}
