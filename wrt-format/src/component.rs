//! Fixed byte-level vocabularies of the component binary format: the
//! preamble, section ids, type-constructor discriminants, import/export
//! name-prefix bytes, canonical-option ids, and the eleven [`Sort`]s.

/// `00 61 73 6D 0D 00 01 00` — magic, version 0x0d, layer 1 (component).
pub const PREAMBLE: [u8; 8] = [0x00, 0x61, 0x73, 0x6D, 0x0D, 0x00, 0x01, 0x00];

/// Section ids recognized in a component binary (§4.1 of the spec).
pub mod section_id {
    pub const CUSTOM: u8 = 0;
    pub const CORE_MODULE: u8 = 1;
    pub const CORE_INSTANCE: u8 = 2;
    pub const CORE_TYPE: u8 = 3;
    pub const COMPONENT: u8 = 4;
    pub const INSTANCE: u8 = 5;
    pub const ALIAS: u8 = 6;
    pub const TYPE: u8 = 7;
    pub const CANON: u8 = 8;
    pub const START: u8 = 9;
    pub const IMPORT: u8 = 10;
    pub const EXPORT: u8 = 11;
}

/// Leading discriminant byte of an import/export name.
pub mod name_prefix {
    /// A plain name follows with no version suffix.
    pub const PLAIN: u8 = 0x00;
    /// A name followed by a version string (consumed, not interpreted).
    pub const VERSIONED: u8 = 0x01;
}

/// Canonical-option discriminant bytes, as carried by `canon lift`/`canon
/// lower` definitions.
pub mod canon_option {
    pub const STRING_UTF8: u8 = 0x00;
    pub const STRING_UTF16: u8 = 0x01;
    pub const STRING_LATIN1_UTF16: u8 = 0x02;
    pub const MEMORY: u8 = 0x03;
    pub const REALLOC: u8 = 0x04;
    pub const POST_RETURN: u8 = 0x05;
}

/// Discriminant byte identifying a value-type constructor, or (when it
/// falls outside this table's range) signaling that the byte is instead
/// the start of an LEB128 type-index reference. See §4.1.
pub mod type_discriminant {
    pub const BOOL: u8 = 0x7f;
    pub const S8: u8 = 0x7e;
    pub const U8: u8 = 0x7d;
    pub const S16: u8 = 0x7c;
    pub const U16: u8 = 0x7b;
    pub const S32: u8 = 0x7a;
    pub const U32: u8 = 0x79;
    pub const S64: u8 = 0x78;
    pub const U64: u8 = 0x77;
    pub const F32: u8 = 0x76;
    pub const F64: u8 = 0x75;
    pub const CHAR: u8 = 0x74;
    pub const STRING: u8 = 0x73;
    pub const RECORD: u8 = 0x72;
    pub const VARIANT: u8 = 0x71;
    pub const LIST: u8 = 0x70;
    pub const TUPLE: u8 = 0x6f;
    pub const FLAGS: u8 = 0x6e;
    pub const ENUM: u8 = 0x6d;
    pub const OPTION: u8 = 0x6b;
    pub const RESULT: u8 = 0x6a;
    pub const OWN: u8 = 0x69;
    pub const BORROW: u8 = 0x68;
    pub const FUNC: u8 = 0x40;
    pub const COMPONENT: u8 = 0x41;
    pub const INSTANCE: u8 = 0x42;
    pub const RESOURCE: u8 = 0x3f;

    /// Discriminants recognized as belonging to the (unsupported)
    /// async/stream/future/fixed-length-list/error-context family —
    /// reported as `Unsupported`, never silently reinterpreted.
    pub fn is_unsupported(byte: u8) -> bool {
        matches!(byte, 0x64..=0x67 | 0x3e | 0x43 | 0x65 | 0x66)
    }

    /// True if `byte` is one of the recognized type-constructor
    /// discriminants listed above (the 0x3f..=0x7f range, minus gaps).
    pub fn is_constructor(byte: u8) -> bool {
        (0x3f..=0x7f).contains(&byte)
    }
}

/// The eleven index spaces a component maintains, one growable array
/// per sort, per nesting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sort {
    CoreFunc,
    CoreTable,
    CoreMemory,
    CoreGlobal,
    CoreType,
    CoreModule,
    CoreInstance,
    Func,
    Type,
    Component,
    Instance,
}

impl Sort {
    /// All eleven sorts, in a stable order used to size per-sort arrays.
    pub const ALL: [Sort; 11] = [
        Sort::CoreFunc,
        Sort::CoreTable,
        Sort::CoreMemory,
        Sort::CoreGlobal,
        Sort::CoreType,
        Sort::CoreModule,
        Sort::CoreInstance,
        Sort::Func,
        Sort::Type,
        Sort::Component,
        Sort::Instance,
    ];

    /// Decode a sort from the single byte [`Sort::slot`] produces.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Sort> {
        Sort::ALL.get(byte as usize).copied()
    }

    /// Index into a dense `[T; 11]` array of per-sort state.
    #[must_use]
    pub fn slot(self) -> usize {
        match self {
            Sort::CoreFunc => 0,
            Sort::CoreTable => 1,
            Sort::CoreMemory => 2,
            Sort::CoreGlobal => 3,
            Sort::CoreType => 4,
            Sort::CoreModule => 5,
            Sort::CoreInstance => 6,
            Sort::Func => 7,
            Sort::Type => 8,
            Sort::Component => 9,
            Sort::Instance => 10,
        }
    }

    /// Lowercase name used in error messages (`"expected module, found
    /// instance"` style diagnostics).
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Sort::CoreFunc => "core func",
            Sort::CoreTable => "core table",
            Sort::CoreMemory => "core memory",
            Sort::CoreGlobal => "core global",
            Sort::CoreType => "core type",
            Sort::CoreModule => "module",
            Sort::CoreInstance => "core instance",
            Sort::Func => "func",
            Sort::Type => "type",
            Sort::Component => "component",
            Sort::Instance => "instance",
        }
    }
}

impl core::fmt::Display for Sort {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_byte_round_trips() {
        for sort in Sort::ALL {
            assert_eq!(Sort::from_byte(sort.slot() as u8), Some(sort));
        }
        assert_eq!(Sort::from_byte(11), None);
    }

    #[test]
    fn all_sorts_have_distinct_slots() {
        let mut slots: Vec<usize> = Sort::ALL.iter().map(|s| s.slot()).collect();
        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots.len(), Sort::ALL.len());
    }

    #[test]
    fn unsupported_discriminants_do_not_overlap_constructors() {
        for b in 0x3fu8..=0x7f {
            if type_discriminant::is_unsupported(b) {
                // unsupported bytes are still inside the constructor byte
                // range but must not collide with a *recognized* one.
                let recognized = matches!(
                    b,
                    0x7f | 0x7e | 0x7d | 0x7c | 0x7b | 0x7a | 0x79 | 0x78 | 0x77 | 0x76 | 0x75
                        | 0x74 | 0x73 | 0x72 | 0x71 | 0x70 | 0x6f | 0x6e | 0x6d | 0x6b | 0x6a
                        | 0x69 | 0x68 | 0x40 | 0x41 | 0x42 | 0x3f
                );
                assert!(!recognized, "byte {b:#x} is both recognized and unsupported");
            }
        }
    }
}
