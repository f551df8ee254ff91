//! `store`/`load`: reading and writing a component-level value's linear
//! memory representation, at a caller-supplied (already-aligned) offset.
//!
//! This is the representation used for list elements, record/tuple
//! fields, and anything flattened out of the flat lane budget — as
//! opposed to `lanes`, which handles the direct-register representation
//! used when a value travels as call arguments/results.

use crate::canonical_abi::checked_realloc;
use crate::canonical_abi::options::{CanonicalOptions, StringEncoding};
use crate::canonical_abi::ResourceCtx;
use crate::host::GuestAllocator;
use crate::prelude::*;
use crate::types::{discriminant_size, flags_word_count, ValType, Value, VariantCase};

fn align_up(offset: u32, align: u32) -> u32 {
    (offset + align - 1) & !(align - 1)
}

fn case_for(cases: &[VariantCase], name: &str) -> Result<(usize, &VariantCase)> {
    cases
        .iter()
        .enumerate()
        .find(|(_, c)| c.name == name)
        .ok_or_else(|| errors::type_mismatch(format!("no variant case named `{name}`")))
}

/// Write `value`'s in-memory representation at `offset`. `offset` must
/// already be aligned to `ty.align()`. A `borrow<T>` payload registers a
/// call-scoped borrow against `ctx`'s handle table, queuing its release.
pub fn store(ty: &ValType, value: &Value, alloc: &mut dyn GuestAllocator, options: &CanonicalOptions, offset: u32, ctx: &mut ResourceCtx) -> Result<()> {
    match (ty, value) {
        (ValType::Bool, Value::Bool(b)) => alloc.write_u8(offset, u8::from(*b)),
        (ValType::S8, Value::S8(v)) => alloc.write_u8(offset, *v as u8),
        (ValType::U8, Value::U8(v)) => alloc.write_u8(offset, *v),
        (ValType::S16, Value::S16(v)) => alloc.write_u16_le(offset, *v as u16),
        (ValType::U16, Value::U16(v)) => alloc.write_u16_le(offset, *v),
        (ValType::S32, Value::S32(v)) => alloc.write_u32_le(offset, *v as u32),
        (ValType::U32, Value::U32(v)) => alloc.write_u32_le(offset, *v),
        (ValType::S64, Value::S64(v)) => alloc.write_u64_le(offset, *v as u64),
        (ValType::U64, Value::U64(v)) => alloc.write_u64_le(offset, *v),
        (ValType::F32, Value::F32(v)) => alloc.write_u32_le(offset, v.to_bits()),
        (ValType::F64, Value::F64(v)) => alloc.write_u64_le(offset, v.to_bits()),
        (ValType::Char, Value::Char(c)) => alloc.write_u32_le(offset, *c as u32),
        (ValType::String, Value::String(s)) => store_string(s, alloc, options, offset),
        (ValType::List(elem), Value::List(items)) => store_list(elem, items, alloc, options, offset, ctx),
        (ValType::Record(fields), Value::Record(values)) => store_record(fields.iter().map(|(_, t)| t), values.iter().map(|(_, v)| v), alloc, options, offset, ctx),
        (ValType::Tuple(fields), Value::Tuple(values)) => store_record(fields.iter(), values.iter(), alloc, options, offset, ctx),
        (ValType::Variant(cases), Value::Variant(_, name, payload)) => store_variant(cases, name, payload.as_deref(), alloc, options, offset, ctx),
        (ValType::Flags(labels), Value::Flags(set)) => store_flags(labels, set, alloc, offset),
        (ValType::Enum(labels), Value::Enum(name)) => {
            let idx = labels.iter().position(|l| l == name).ok_or_else(|| errors::type_mismatch(format!("no enum label `{name}`")))?;
            store_discriminant(idx as u32, discriminant_size(labels.len()), alloc, offset)
        }
        (ValType::Option(inner), Value::OptionSome(payload)) => {
            let cases = option_cases_owned(inner);
            let name = if payload.is_some() { "some" } else { "none" };
            store_variant(&cases, name, payload.as_deref(), alloc, options, offset, ctx)
        }
        (ValType::Result(ok, err), Value::Result(r)) => {
            let cases = result_cases_owned(ok, err);
            match r {
                Ok(payload) => store_variant(&cases, "ok", payload.as_deref(), alloc, options, offset, ctx),
                Err(payload) => store_variant(&cases, "error", payload.as_deref(), alloc, options, offset, ctx),
            }
        }
        (ValType::Own(_), Value::Own(idx)) => alloc.write_u32_le(offset, *idx),
        (ValType::Borrow(resource_type), Value::Borrow(owner_idx)) => alloc.write_u32_le(offset, ctx.register_borrow(*resource_type, *owner_idx)?),
        _ => Err(errors::type_mismatch("value does not match declared type")),
    }
}

/// Read a value of type `ty` out of its in-memory representation at `offset`.
pub fn load(ty: &ValType, alloc: &dyn GuestAllocator, options: &CanonicalOptions, offset: u32, ctx: &mut ResourceCtx) -> Result<Value> {
    match ty {
        ValType::Bool => Ok(Value::Bool(alloc.read_u8(offset)? != 0)),
        ValType::S8 => Ok(Value::S8(alloc.read_u8(offset)? as i8)),
        ValType::U8 => Ok(Value::U8(alloc.read_u8(offset)?)),
        ValType::S16 => Ok(Value::S16(alloc.read_u16_le(offset)? as i16)),
        ValType::U16 => Ok(Value::U16(alloc.read_u16_le(offset)?)),
        ValType::S32 => Ok(Value::S32(alloc.read_u32_le(offset)? as i32)),
        ValType::U32 => Ok(Value::U32(alloc.read_u32_le(offset)?)),
        ValType::S64 => Ok(Value::S64(alloc.read_u64_le(offset)? as i64)),
        ValType::U64 => Ok(Value::U64(alloc.read_u64_le(offset)?)),
        ValType::F32 => Ok(Value::F32(f32::from_bits(alloc.read_u32_le(offset)?))),
        ValType::F64 => Ok(Value::F64(f64::from_bits(alloc.read_u64_le(offset)?))),
        ValType::Char => {
            let bits = alloc.read_u32_le(offset)?;
            char::from_u32(bits).map(Value::Char).ok_or_else(|| errors::type_mismatch(format!("invalid char scalar value {bits}")))
        }
        ValType::String => load_string(alloc, options, offset),
        ValType::List(elem) => load_list(elem, alloc, options, offset, ctx),
        ValType::Record(fields) => Ok(Value::Record(load_record(fields, alloc, options, offset, ctx)?.into_iter().zip(fields.iter().map(|(n, _)| n.clone())).map(|(v, n)| (n, v)).collect())),
        ValType::Tuple(fields) => {
            let labeled: Vec<(String, ValType)> = fields.iter().map(|t| (String::new(), t.clone())).collect();
            Ok(Value::Tuple(load_record(&labeled, alloc, options, offset, ctx)?))
        }
        ValType::Variant(cases) => load_variant(cases, alloc, options, offset, ctx),
        ValType::Flags(labels) => load_flags(labels, alloc, offset),
        ValType::Enum(labels) => {
            let idx = load_discriminant(discriminant_size(labels.len()), alloc, offset)? as usize;
            let name = labels.get(idx).ok_or_else(|| errors::invalid_discriminant(idx as u32, labels.len()))?;
            Ok(Value::Enum(name.clone()))
        }
        ValType::Option(inner) => {
            let cases = option_cases_owned(inner);
            let (name, payload) = load_variant_raw(&cases, alloc, options, offset, ctx)?;
            Ok(Value::OptionSome(if name == "some" { payload.map(Box::new) } else { None }))
        }
        ValType::Result(ok, err) => {
            let cases = result_cases_owned(ok, err);
            let (name, payload) = load_variant_raw(&cases, alloc, options, offset, ctx)?;
            Ok(Value::Result(if name == "ok" { Ok(payload.map(Box::new)) } else { Err(payload.map(Box::new)) }))
        }
        ValType::Own(_) => Ok(Value::Own(alloc.read_u32_le(offset)?)),
        ValType::Borrow(resource_type) => Ok(Value::Borrow(ctx.register_borrow(*resource_type, alloc.read_u32_le(offset)?)?)),
    }
}

fn store_string(s: &str, alloc: &mut dyn GuestAllocator, options: &CanonicalOptions, offset: u32) -> Result<()> {
    let (ptr, len) = write_string_to_memory(s, alloc, options)?;
    alloc.write_u32_le(offset, ptr)?;
    alloc.write_u32_le(offset + 4, len)
}

fn load_string(alloc: &dyn GuestAllocator, options: &CanonicalOptions, offset: u32) -> Result<Value> {
    let ptr = alloc.read_u32_le(offset)?;
    let len = alloc.read_u32_le(offset + 4)?;
    Ok(Value::String(read_string_from_memory(ptr, len, alloc, options)?))
}

/// Allocate and write `s`'s encoded bytes, returning `(ptr, code-unit len)`.
/// Shared by the in-memory `string` representation and the flat
/// `(ptr, len)` lane pair a string lowers to directly.
pub(crate) fn write_string_to_memory(s: &str, alloc: &mut dyn GuestAllocator, options: &CanonicalOptions) -> Result<(u32, u32)> {
    let bytes = encode_string(s, options.string_encoding);
    let ptr = if bytes.is_empty() { 0 } else { checked_realloc(alloc, 0, 0, 1, bytes.len() as u32)? };
    if !bytes.is_empty() {
        alloc.write_bytes(ptr, &bytes)?;
    }
    Ok((ptr, encoded_len(s, options.string_encoding)))
}

/// `latin1+utf16`'s length field flags its own encoding: the top bit set
/// means the stored bytes are utf16 code units (2 bytes each); clear means
/// latin1 bytes (1 byte each), and the rest of the field is the code-unit
/// count either way.
const UTF16_FLAG: u32 = 0x8000_0000;

pub(crate) fn read_string_from_memory(ptr: u32, len: u32, alloc: &dyn GuestAllocator, options: &CanonicalOptions) -> Result<String> {
    let (code_units, is_utf16) = match options.string_encoding {
        StringEncoding::Utf8 => (len, false),
        StringEncoding::Utf16 => (len, true),
        StringEncoding::Latin1OrUtf16 => (len & !UTF16_FLAG, len & UTF16_FLAG != 0),
    };
    let byte_len = if is_utf16 { code_units * 2 } else { code_units };
    let bytes = alloc.read_bytes(ptr, byte_len)?;
    decode_string(&bytes, options.string_encoding, is_utf16)
}

fn is_latin1(s: &str) -> bool {
    s.chars().all(|c| (c as u32) <= 0xFF)
}

fn utf16_le_bytes(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() * 2);
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

fn encoded_len(s: &str, enc: StringEncoding) -> u32 {
    match enc {
        StringEncoding::Utf8 => s.len() as u32,
        StringEncoding::Utf16 => s.encode_utf16().count() as u32,
        StringEncoding::Latin1OrUtf16 => {
            if is_latin1(s) {
                s.chars().count() as u32
            } else {
                UTF16_FLAG | s.encode_utf16().count() as u32
            }
        }
    }
}

fn encode_string(s: &str, enc: StringEncoding) -> Vec<u8> {
    match enc {
        StringEncoding::Utf8 => s.as_bytes().to_vec(),
        StringEncoding::Utf16 => utf16_le_bytes(s),
        StringEncoding::Latin1OrUtf16 => {
            if is_latin1(s) {
                s.chars().map(|c| c as u8).collect()
            } else {
                utf16_le_bytes(s)
            }
        }
    }
}

fn decode_utf16_bytes(bytes: &[u8]) -> Result<String> {
    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
    String::from_utf16(&units).map_err(|_| errors::malformed(codes::INVALID_UTF8, "invalid utf-16 string payload"))
}

fn decode_string(bytes: &[u8], enc: StringEncoding, is_utf16: bool) -> Result<String> {
    match enc {
        StringEncoding::Utf8 => core::str::from_utf8(bytes).map(ToString::to_string).map_err(|_| errors::malformed(codes::INVALID_UTF8, "invalid utf-8 string payload")),
        StringEncoding::Utf16 => decode_utf16_bytes(bytes),
        StringEncoding::Latin1OrUtf16 => {
            if is_utf16 {
                decode_utf16_bytes(bytes)
            } else {
                Ok(bytes.iter().map(|&b| b as char).collect())
            }
        }
    }
}

fn store_list(elem: &ValType, items: &[Value], alloc: &mut dyn GuestAllocator, options: &CanonicalOptions, offset: u32, ctx: &mut ResourceCtx) -> Result<()> {
    let (ptr, len) = write_list_to_memory(elem, items, alloc, options, ctx)?;
    alloc.write_u32_le(offset, ptr)?;
    alloc.write_u32_le(offset + 4, len)
}

fn load_list(elem: &ValType, alloc: &dyn GuestAllocator, options: &CanonicalOptions, offset: u32, ctx: &mut ResourceCtx) -> Result<Value> {
    let ptr = alloc.read_u32_le(offset)?;
    let len = alloc.read_u32_le(offset + 4)?;
    Ok(Value::List(read_list_from_memory(elem, ptr, len, alloc, options, ctx)?))
}

pub(crate) fn write_list_to_memory(elem: &ValType, items: &[Value], alloc: &mut dyn GuestAllocator, options: &CanonicalOptions, ctx: &mut ResourceCtx) -> Result<(u32, u32)> {
    let elem_size = elem.elem_size();
    let total = elem_size * items.len() as u32;
    let ptr = if items.is_empty() { 0 } else { checked_realloc(alloc, 0, 0, elem.align(), total)? };
    for (i, item) in items.iter().enumerate() {
        store(elem, item, alloc, options, ptr + elem_size * i as u32, ctx)?;
    }
    Ok((ptr, items.len() as u32))
}

pub(crate) fn read_list_from_memory(elem: &ValType, ptr: u32, len: u32, alloc: &dyn GuestAllocator, options: &CanonicalOptions, ctx: &mut ResourceCtx) -> Result<Vec<Value>> {
    let elem_size = elem.elem_size();
    let mut items = Vec::with_capacity(len as usize);
    for i in 0..len {
        items.push(load(elem, alloc, options, ptr + elem_size * i, ctx)?);
    }
    Ok(items)
}

fn store_record<'a>(
    types: impl Iterator<Item = &'a ValType>,
    values: impl Iterator<Item = &'a Value>,
    alloc: &mut dyn GuestAllocator,
    options: &CanonicalOptions,
    base: u32,
    ctx: &mut ResourceCtx,
) -> Result<()> {
    let mut offset = base;
    for (ty, value) in types.zip(values) {
        offset = align_up(offset, ty.align());
        store(ty, value, alloc, options, offset, ctx)?;
        offset += ty.elem_size();
    }
    Ok(())
}

fn load_record(fields: &[(String, ValType)], alloc: &dyn GuestAllocator, options: &CanonicalOptions, base: u32, ctx: &mut ResourceCtx) -> Result<Vec<Value>> {
    let mut offset = base;
    let mut out = Vec::with_capacity(fields.len());
    for (_, ty) in fields {
        offset = align_up(offset, ty.align());
        out.push(load(ty, alloc, options, offset, ctx)?);
        offset += ty.elem_size();
    }
    Ok(out)
}

fn store_discriminant(value: u32, size: u32, alloc: &mut dyn GuestAllocator, offset: u32) -> Result<()> {
    match size {
        1 => alloc.write_u8(offset, value as u8),
        2 => alloc.write_u16_le(offset, value as u16),
        _ => alloc.write_u32_le(offset, value),
    }
}

fn load_discriminant(size: u32, alloc: &dyn GuestAllocator, offset: u32) -> Result<u32> {
    match size {
        1 => Ok(alloc.read_u8(offset)? as u32),
        2 => Ok(alloc.read_u16_le(offset)? as u32),
        _ => alloc.read_u32_le(offset),
    }
}

fn payload_offset(cases: &[VariantCase], base: u32) -> u32 {
    let disc_size = discriminant_size(cases.len());
    let payload_align = cases.iter().filter_map(|c| c.ty.as_ref()).map(ValType::align).max().unwrap_or(1);
    align_up(base + disc_size, payload_align)
}

fn store_variant(cases: &[VariantCase], name: &str, payload: Option<&Value>, alloc: &mut dyn GuestAllocator, options: &CanonicalOptions, base: u32, ctx: &mut ResourceCtx) -> Result<()> {
    let (idx, case) = case_for(cases, name)?;
    store_discriminant(idx as u32, discriminant_size(cases.len()), alloc, base)?;
    if let (Some(ty), Some(value)) = (&case.ty, payload) {
        store(ty, value, alloc, options, payload_offset(cases, base), ctx)?;
    }
    Ok(())
}

fn load_variant(cases: &[VariantCase], alloc: &dyn GuestAllocator, options: &CanonicalOptions, base: u32, ctx: &mut ResourceCtx) -> Result<Value> {
    let (idx, name, payload) = load_variant_raw(cases, alloc, options, base, ctx)?;
    Ok(Value::Variant(idx, name, payload.map(Box::new)))
}

fn load_variant_raw(cases: &[VariantCase], alloc: &dyn GuestAllocator, options: &CanonicalOptions, base: u32, ctx: &mut ResourceCtx) -> Result<(usize, String, Option<Value>)> {
    let idx = load_discriminant(discriminant_size(cases.len()), alloc, base)? as usize;
    let case = cases.get(idx).ok_or_else(|| errors::invalid_discriminant(idx as u32, cases.len()))?;
    let payload = match &case.ty {
        Some(ty) => Some(load(ty, alloc, options, payload_offset(cases, base), ctx)?),
        None => None,
    };
    Ok((idx, case.name.clone(), payload))
}

fn store_flags(labels: &[String], set: &[String], alloc: &mut dyn GuestAllocator, offset: u32) -> Result<()> {
    let words = flags_word_count(labels.len());
    let mut bits = vec![0u32; words as usize];
    for label in set {
        let idx = labels.iter().position(|l| l == label).ok_or_else(|| errors::type_mismatch(format!("no flag named `{label}`")))?;
        bits[idx / 32] |= 1 << (idx % 32);
    }
    for (i, word) in bits.into_iter().enumerate() {
        alloc.write_u32_le(offset + 4 * i as u32, word)?;
    }
    Ok(())
}

fn load_flags(labels: &[String], alloc: &dyn GuestAllocator, offset: u32) -> Result<Value> {
    let words = flags_word_count(labels.len());
    let mut set = Vec::new();
    for (i, label) in labels.iter().enumerate() {
        let word = alloc.read_u32_le(offset + 4 * ((i / 32) as u32))?;
        if words > 0 && (word >> (i % 32)) & 1 != 0 {
            set.push(label.clone());
        }
    }
    Ok(Value::Flags(set))
}

fn option_cases_owned(inner: &ValType) -> Vec<VariantCase> {
    vec![
        VariantCase { name: "none".into(), ty: None },
        VariantCase { name: "some".into(), ty: Some(inner.clone()) },
    ]
}

fn result_cases_owned(ok: &Option<Box<ValType>>, err: &Option<Box<ValType>>) -> Vec<VariantCase> {
    vec![
        VariantCase { name: "ok".into(), ty: ok.as_deref().cloned() },
        VariantCase { name: "error".into(), ty: err.as_deref().cloned() },
    ]
}

use crate::errors;
