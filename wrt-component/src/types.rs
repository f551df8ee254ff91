//! The component-level value and type model.
//!
//! [`ValType`] is the sum type of primitive and compound component types;
//! [`Value`] is its corresponding sum of runtime values. Layout queries
//! (`align`, `elem_size`, `flatten`) live as methods on `ValType` — see
//! `canonical_abi` for the lift/lower/load/store operations that use them.

use crate::prelude::*;
use crate::resources::ResourceTypeId;

/// One labeled case of a `variant` type.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantCase {
    pub name: String,
    pub ty: Option<ValType>,
}

/// A component-level type, per §3's type universe table.
#[derive(Debug, Clone, PartialEq)]
pub enum ValType {
    Bool,
    S8,
    U8,
    S16,
    U16,
    S32,
    U32,
    S64,
    U64,
    F32,
    F64,
    Char,
    String,
    List(Box<ValType>),
    Record(Vec<(String, ValType)>),
    Tuple(Vec<ValType>),
    Variant(Vec<VariantCase>),
    Flags(Vec<String>),
    Enum(Vec<String>),
    Option(Box<ValType>),
    Result(Option<Box<ValType>>, Option<Box<ValType>>),
    Own(ResourceTypeId),
    Borrow(ResourceTypeId),
}

/// The primitive lane kinds core values are encoded into; used only to
/// describe `flatten()`'s shape, never to hold an actual call-time value
/// (those travel as `u64`-encoded lanes, see `canonical_abi`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreType {
    I32,
    I64,
    F32,
    F64,
}

impl CoreType {
    /// Join rule for joining two case-payload lanes at the same position
    /// in a variant's flat shape: equal types stay the same, `{i32,f32}`
    /// joins to `i32`, anything else joins to `i64`.
    #[must_use]
    pub fn join(a: CoreType, b: CoreType) -> CoreType {
        if a == b {
            return a;
        }
        match (a, b) {
            (CoreType::I32, CoreType::F32) | (CoreType::F32, CoreType::I32) => CoreType::I32,
            _ => CoreType::I64,
        }
    }
}

fn align_up(offset: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    (offset + align - 1) & !(align - 1)
}

/// Smallest of {1,2,4} bytes that can represent `case_count` distinct
/// discriminant values.
#[must_use]
pub fn discriminant_size(case_count: usize) -> u32 {
    if case_count <= 1 {
        return 1;
    }
    let bits = (usize::BITS - (case_count - 1).leading_zeros()).max(1);
    if bits <= 8 {
        1
    } else if bits <= 16 {
        2
    } else {
        4
    }
}

/// Number of `i32` words needed to hold `label_count` flag bits.
#[must_use]
pub fn flags_word_count(label_count: usize) -> u32 {
    (label_count as u32).div_ceil(32).max(1)
}

impl ValType {
    /// Linear-memory alignment, in bytes.
    #[must_use]
    pub fn align(&self) -> u32 {
        match self {
            ValType::Bool | ValType::S8 | ValType::U8 => 1,
            ValType::S16 | ValType::U16 => 2,
            ValType::S32 | ValType::U32 | ValType::Char => 4,
            ValType::S64 | ValType::U64 => 8,
            ValType::F32 => 4,
            ValType::F64 => 8,
            ValType::String | ValType::List(_) => 4,
            ValType::Record(fields) => fields.iter().map(|(_, t)| t.align()).max().unwrap_or(1),
            ValType::Tuple(fields) => fields.iter().map(ValType::align).max().unwrap_or(1),
            ValType::Variant(cases) => variant_align(cases),
            ValType::Flags(_) => 4,
            ValType::Enum(labels) => discriminant_size(labels.len()),
            ValType::Option(inner) => variant_align(&option_cases(inner)),
            ValType::Result(ok, err) => variant_align(&result_cases(ok, err)),
            ValType::Own(_) | ValType::Borrow(_) => 4,
        }
    }

    /// Linear-memory footprint, in bytes; always a multiple of `align()`.
    #[must_use]
    pub fn elem_size(&self) -> u32 {
        match self {
            ValType::Bool | ValType::S8 | ValType::U8 => 1,
            ValType::S16 | ValType::U16 => 2,
            ValType::S32 | ValType::U32 | ValType::Char => 4,
            ValType::S64 | ValType::U64 => 8,
            ValType::F32 => 4,
            ValType::F64 => 8,
            ValType::String | ValType::List(_) => 8,
            ValType::Record(fields) => record_size(fields.iter().map(|(_, t)| t)),
            ValType::Tuple(fields) => record_size(fields.iter()),
            ValType::Variant(cases) => variant_size(cases),
            ValType::Flags(labels) => 4 * flags_word_count(labels.len()),
            ValType::Enum(labels) => discriminant_size(labels.len()),
            ValType::Option(inner) => variant_size(&option_cases(inner)),
            ValType::Result(ok, err) => variant_size(&result_cases(ok, err)),
            ValType::Own(_) | ValType::Borrow(_) => 4,
        }
    }

    /// The ordered sequence of core lane kinds used to pass/return a
    /// value of this type by value across a call boundary.
    #[must_use]
    pub fn flatten(&self) -> Vec<CoreType> {
        match self {
            ValType::Bool
            | ValType::S8
            | ValType::U8
            | ValType::S16
            | ValType::U16
            | ValType::S32
            | ValType::U32
            | ValType::Char => vec![CoreType::I32],
            ValType::S64 | ValType::U64 => vec![CoreType::I64],
            ValType::F32 => vec![CoreType::F32],
            ValType::F64 => vec![CoreType::F64],
            ValType::String | ValType::List(_) => vec![CoreType::I32, CoreType::I32],
            ValType::Record(fields) => fields.iter().flat_map(|(_, t)| t.flatten()).collect(),
            ValType::Tuple(fields) => fields.iter().flat_map(ValType::flatten).collect(),
            ValType::Variant(cases) => variant_flatten(cases),
            ValType::Flags(labels) => vec![CoreType::I32; flags_word_count(labels.len()) as usize],
            ValType::Enum(_) => vec![CoreType::I32],
            ValType::Option(inner) => variant_flatten(&option_cases(inner)),
            ValType::Result(ok, err) => variant_flatten(&result_cases(ok, err)),
            ValType::Own(_) | ValType::Borrow(_) => vec![CoreType::I32],
        }
    }

    /// Structural equality used for import/export type-checking: records
    /// compare pointwise (name, type); resources compare by identity.
    #[must_use]
    pub fn structurally_equals(&self, other: &ValType) -> bool {
        self == other
    }
}

fn option_cases(inner: &ValType) -> Vec<VariantCase> {
    vec![
        VariantCase { name: "none".into(), ty: None },
        VariantCase { name: "some".into(), ty: Some(inner.clone()) },
    ]
}

fn result_cases(ok: &Option<Box<ValType>>, err: &Option<Box<ValType>>) -> Vec<VariantCase> {
    vec![
        VariantCase { name: "ok".into(), ty: ok.as_deref().cloned() },
        VariantCase { name: "error".into(), ty: err.as_deref().cloned() },
    ]
}

fn variant_align(cases: &[VariantCase]) -> u32 {
    let disc = discriminant_size(cases.len());
    let payload = cases.iter().filter_map(|c| c.ty.as_ref()).map(ValType::align).max().unwrap_or(1);
    disc.max(payload)
}

fn variant_size(cases: &[VariantCase]) -> u32 {
    let disc_size = discriminant_size(cases.len());
    let payload_align = cases.iter().filter_map(|c| c.ty.as_ref()).map(ValType::align).max().unwrap_or(1);
    let payload_size = cases.iter().filter_map(|c| c.ty.as_ref()).map(ValType::elem_size).max().unwrap_or(0);
    let payload_offset = align_up(disc_size, payload_align);
    let total = payload_offset + payload_size;
    align_up(total, variant_align(cases))
}

fn variant_flatten(cases: &[VariantCase]) -> Vec<CoreType> {
    let case_flats: Vec<Vec<CoreType>> = cases.iter().map(|c| c.ty.as_ref().map(ValType::flatten).unwrap_or_default()).collect();
    let max_len = case_flats.iter().map(Vec::len).max().unwrap_or(0);
    let mut joined = Vec::with_capacity(1 + max_len);
    joined.push(CoreType::I32); // discriminant
    for i in 0..max_len {
        let mut lane: Option<CoreType> = None;
        for flat in &case_flats {
            if let Some(t) = flat.get(i) {
                lane = Some(match lane {
                    None => *t,
                    Some(acc) => CoreType::join(acc, *t),
                });
            }
        }
        // at least one case has a lane at position i since i < max_len
        joined.push(lane.expect("max_len computed from case_flats"));
    }
    joined
}

fn record_size<'a>(fields: impl Iterator<Item = &'a ValType>) -> u32 {
    let mut offset = 0u32;
    let mut max_align = 1u32;
    for ty in fields {
        let align = ty.align();
        max_align = max_align.max(align);
        offset = align_up(offset, align) + ty.elem_size();
    }
    align_up(offset, max_align)
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValType::Bool => write!(f, "bool"),
            ValType::S8 => write!(f, "s8"),
            ValType::U8 => write!(f, "u8"),
            ValType::S16 => write!(f, "s16"),
            ValType::U16 => write!(f, "u16"),
            ValType::S32 => write!(f, "s32"),
            ValType::U32 => write!(f, "u32"),
            ValType::S64 => write!(f, "s64"),
            ValType::U64 => write!(f, "u64"),
            ValType::F32 => write!(f, "f32"),
            ValType::F64 => write!(f, "f64"),
            ValType::Char => write!(f, "char"),
            ValType::String => write!(f, "string"),
            ValType::List(elem) => write!(f, "list<{elem}>"),
            ValType::Record(fields) => {
                write!(f, "record {{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                write!(f, "}}")
            }
            ValType::Tuple(fields) => {
                write!(f, "tuple<")?;
                for (i, ty) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{ty}")?;
                }
                write!(f, ">")
            }
            ValType::Variant(cases) => {
                write!(f, "variant {{")?;
                for (i, case) in cases.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match &case.ty {
                        Some(ty) => write!(f, "{}({ty})", case.name)?,
                        None => write!(f, "{}", case.name)?,
                    }
                }
                write!(f, "}}")
            }
            ValType::Flags(labels) => write!(f, "flags {{{}}}", labels.join(", ")),
            ValType::Enum(labels) => write!(f, "enum {{{}}}", labels.join(", ")),
            ValType::Option(inner) => write!(f, "option<{inner}>"),
            ValType::Result(ok, err) => {
                write!(f, "result")?;
                match (ok, err) {
                    (None, None) => Ok(()),
                    (ok, err) => {
                        write!(f, "<")?;
                        match ok {
                            Some(ty) => write!(f, "{ty}")?,
                            None => write!(f, "_")?,
                        }
                        if let Some(ty) = err {
                            write!(f, ", {ty}")?;
                        }
                        write!(f, ">")
                    }
                }
            }
            ValType::Own(id) => write!(f, "own<{}>", id.as_u64()),
            ValType::Borrow(id) => write!(f, "borrow<{}>", id.as_u64()),
        }
    }
}

/// A runtime component-level value, mirroring [`ValType`]'s shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    S8(i8),
    U8(u8),
    S16(i16),
    U16(u16),
    S32(i32),
    U32(u32),
    S64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Char(char),
    String(String),
    List(Vec<Value>),
    Record(Vec<(String, Value)>),
    Tuple(Vec<Value>),
    /// `(case index, case name, optional payload)`.
    Variant(usize, String, Option<Box<Value>>),
    /// The set of raised flag labels.
    Flags(Vec<String>),
    Enum(String),
    OptionSome(Option<Box<Value>>),
    /// `Ok`/`Err` payloads of a `result` value.
    Result(core::result::Result<Option<Box<Value>>, Option<Box<Value>>>),
    /// A move-only owning handle index.
    Own(u32),
    /// A call-scoped borrowed handle index.
    Borrow(u32),
}
