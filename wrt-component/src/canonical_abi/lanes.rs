//! `lower_flat`/`lift_flat`: the direct-register representation used
//! when a value travels as call arguments/results rather than through
//! linear memory.
//!
//! Every lane is carried as a `u64`: scalar lanes hold their bit pattern
//! zero-extended, so joining two lanes of different static core types
//! (the `{i32,f32} -> i32`, `else -> i64` rule in [`CoreType::join`])
//! never needs an actual bit-width cast here, only bookkeeping about how
//! many lanes a case contributes.

use crate::canonical_abi::memory_repr::{read_list_from_memory, read_string_from_memory, write_list_to_memory, write_string_to_memory};
use crate::canonical_abi::options::CanonicalOptions;
use crate::canonical_abi::ResourceCtx;
use crate::host::GuestAllocator;
use crate::prelude::*;
use crate::types::{flags_word_count, ValType, Value, VariantCase};

fn case_for<'a>(cases: &'a [VariantCase], name: &str) -> Result<(usize, &'a VariantCase)> {
    cases.iter().enumerate().find(|(_, c)| c.name == name).ok_or_else(|| errors::type_mismatch(format!("no variant case named `{name}`")))
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

/// Append `value`'s flattened lanes to `lanes`. `String`/`List` payloads
/// are written out-of-line through `alloc`, contributing only their
/// `(ptr, len)` pair. A `borrow<T>` payload registers a call-scoped
/// borrow against `ctx`'s handle table, queuing its release.
pub fn lower_flat(ty: &ValType, value: &Value, lanes: &mut Vec<u64>, alloc: &mut dyn GuestAllocator, options: &CanonicalOptions, ctx: &mut ResourceCtx) -> Result<()> {
    match (ty, value) {
        (ValType::Bool, Value::Bool(b)) => lanes.push(u64::from(*b)),
        (ValType::S8, Value::S8(v)) => lanes.push(*v as u8 as u64),
        (ValType::U8, Value::U8(v)) => lanes.push(*v as u64),
        (ValType::S16, Value::S16(v)) => lanes.push(*v as u16 as u64),
        (ValType::U16, Value::U16(v)) => lanes.push(*v as u64),
        (ValType::S32, Value::S32(v)) => lanes.push(*v as u32 as u64),
        (ValType::U32, Value::U32(v)) => lanes.push(*v as u64),
        (ValType::S64, Value::S64(v)) => lanes.push(*v as u64),
        (ValType::U64, Value::U64(v)) => lanes.push(*v),
        (ValType::F32, Value::F32(v)) => lanes.push(v.to_bits() as u64),
        (ValType::F64, Value::F64(v)) => lanes.push(v.to_bits()),
        (ValType::Char, Value::Char(c)) => lanes.push(*c as u64),
        (ValType::String, Value::String(s)) => {
            let (ptr, len) = write_string_to_memory(s, alloc, options)?;
            lanes.push(ptr as u64);
            lanes.push(len as u64);
        }
        (ValType::List(elem), Value::List(items)) => {
            let (ptr, len) = write_list_to_memory(elem, items, alloc, options, ctx)?;
            lanes.push(ptr as u64);
            lanes.push(len as u64);
        }
        (ValType::Record(fields), Value::Record(values)) => {
            for ((_, ty), (_, value)) in fields.iter().zip(values.iter()) {
                lower_flat(ty, value, lanes, alloc, options, ctx)?;
            }
        }
        (ValType::Tuple(fields), Value::Tuple(values)) => {
            for (ty, value) in fields.iter().zip(values.iter()) {
                lower_flat(ty, value, lanes, alloc, options, ctx)?;
            }
        }
        (ValType::Variant(cases), Value::Variant(_, name, payload)) => lower_variant(cases, name, payload.as_deref(), lanes, alloc, options, ctx)?,
        (ValType::Flags(labels), Value::Flags(set)) => lower_flags(labels, set, lanes)?,
        (ValType::Enum(labels), Value::Enum(name)) => {
            let idx = labels.iter().position(|l| l == name).ok_or_else(|| errors::type_mismatch(format!("no enum label `{name}`")))?;
            lanes.push(idx as u64);
        }
        (ValType::Option(inner), Value::OptionSome(payload)) => {
            let cases = option_cases_owned(inner);
            let name = if payload.is_some() { "some" } else { "none" };
            lower_variant(&cases, name, payload.as_deref(), lanes, alloc, options, ctx)?;
        }
        (ValType::Result(ok, err), Value::Result(r)) => {
            let cases = result_cases_owned(ok, err);
            match r {
                Ok(payload) => lower_variant(&cases, "ok", payload.as_deref(), lanes, alloc, options, ctx)?,
                Err(payload) => lower_variant(&cases, "error", payload.as_deref(), lanes, alloc, options, ctx)?,
            }
        }
        (ValType::Own(_), Value::Own(idx)) => lanes.push(*idx as u64),
        (ValType::Borrow(resource_type), Value::Borrow(owner_idx)) => lanes.push(ctx.register_borrow(*resource_type, *owner_idx)? as u64),
        _ => return Err(errors::type_mismatch("value does not match declared type")),
    }
    Ok(())
}

fn lower_variant(cases: &[VariantCase], name: &str, payload: Option<&Value>, lanes: &mut Vec<u64>, alloc: &mut dyn GuestAllocator, options: &CanonicalOptions, ctx: &mut ResourceCtx) -> Result<()> {
    let (idx, case) = case_for(cases, name)?;
    lanes.push(idx as u64);
    let payload_lane_count = cases.iter().map(|c| c.ty.as_ref().map(ValType::flatten).map(|f| f.len()).unwrap_or(0)).max().unwrap_or(0);
    let mut payload_lanes = Vec::new();
    if let (Some(ty), Some(value)) = (&case.ty, payload) {
        lower_flat(ty, value, &mut payload_lanes, alloc, options, ctx)?;
    }
    payload_lanes.resize(payload_lane_count, 0);
    lanes.extend(payload_lanes);
    Ok(())
}

fn lower_flags(labels: &[String], set: &[String], lanes: &mut Vec<u64>) -> Result<()> {
    let words = flags_word_count(labels.len());
    let mut bits = vec![0u32; words as usize];
    for label in set {
        let idx = labels.iter().position(|l| l == label).ok_or_else(|| errors::type_mismatch(format!("no flag named `{label}`")))?;
        bits[idx / 32] |= 1 << (idx % 32);
    }
    lanes.extend(bits.into_iter().map(u64::from));
    Ok(())
}

/// Consume `value`'s flattened lanes from `lanes`, in the same order
/// [`lower_flat`] produces them. A `borrow<T>` payload registers a
/// call-scoped borrow against `ctx`'s handle table, same as [`lower_flat`].
pub fn lift_flat(ty: &ValType, lanes: &mut core::slice::Iter<'_, u64>, alloc: &dyn GuestAllocator, options: &CanonicalOptions, ctx: &mut ResourceCtx) -> Result<Value> {
    let next = |lanes: &mut core::slice::Iter<'_, u64>| -> Result<u64> { lanes.next().copied().ok_or_else(|| errors::type_mismatch("ran out of lanes while lifting value")) };
    Ok(match ty {
        ValType::Bool => Value::Bool(next(lanes)? != 0),
        ValType::S8 => Value::S8(next(lanes)? as u8 as i8),
        ValType::U8 => Value::U8(next(lanes)? as u8),
        ValType::S16 => Value::S16(next(lanes)? as u16 as i16),
        ValType::U16 => Value::U16(next(lanes)? as u16),
        ValType::S32 => Value::S32(next(lanes)? as u32 as i32),
        ValType::U32 => Value::U32(next(lanes)? as u32),
        ValType::S64 => Value::S64(next(lanes)? as i64),
        ValType::U64 => Value::U64(next(lanes)?),
        ValType::F32 => Value::F32(f32::from_bits(next(lanes)? as u32)),
        ValType::F64 => Value::F64(f64::from_bits(next(lanes)?)),
        ValType::Char => {
            let bits = next(lanes)? as u32;
            char::from_u32(bits).map(Value::Char).ok_or_else(|| errors::type_mismatch(format!("invalid char scalar value {bits}")))?
        }
        ValType::String => {
            let ptr = next(lanes)? as u32;
            let len = next(lanes)? as u32;
            Value::String(read_string_from_memory(ptr, len, alloc, options)?)
        }
        ValType::List(elem) => {
            let ptr = next(lanes)? as u32;
            let len = next(lanes)? as u32;
            Value::List(read_list_from_memory(elem, ptr, len, alloc, options, ctx)?)
        }
        ValType::Record(fields) => {
            let mut values = Vec::with_capacity(fields.len());
            for (name, ty) in fields {
                values.push((name.clone(), lift_flat(ty, lanes, alloc, options, ctx)?));
            }
            Value::Record(values)
        }
        ValType::Tuple(fields) => {
            let mut values = Vec::with_capacity(fields.len());
            for ty in fields {
                values.push(lift_flat(ty, lanes, alloc, options, ctx)?);
            }
            Value::Tuple(values)
        }
        ValType::Variant(cases) => lift_variant(cases, lanes, alloc, options, ctx).map(|(idx, name, payload)| Value::Variant(idx, name, payload.map(Box::new)))?,
        ValType::Flags(labels) => lift_flags(labels, lanes)?,
        ValType::Enum(labels) => {
            let idx = next(lanes)? as usize;
            let name = labels.get(idx).ok_or_else(|| errors::invalid_discriminant(idx as u32, labels.len()))?;
            Value::Enum(name.clone())
        }
        ValType::Option(inner) => {
            let cases = option_cases_owned(inner);
            let (_, name, payload) = lift_variant(&cases, lanes, alloc, options, ctx)?;
            Value::OptionSome(if name == "some" { payload.map(Box::new) } else { None })
        }
        ValType::Result(ok, err) => {
            let cases = result_cases_owned(ok, err);
            let (_, name, payload) = lift_variant(&cases, lanes, alloc, options, ctx)?;
            Value::Result(if name == "ok" { Ok(payload.map(Box::new)) } else { Err(payload.map(Box::new)) })
        }
        ValType::Own(_) => Value::Own(next(lanes)? as u32),
        ValType::Borrow(resource_type) => Value::Borrow(ctx.register_borrow(*resource_type, next(lanes)? as u32)?),
    })
}

fn lift_variant(cases: &[VariantCase], lanes: &mut core::slice::Iter<'_, u64>, alloc: &dyn GuestAllocator, options: &CanonicalOptions, ctx: &mut ResourceCtx) -> Result<(usize, String, Option<Value>)> {
    let idx = lanes.next().copied().ok_or_else(|| errors::type_mismatch("ran out of lanes while lifting variant discriminant"))? as usize;
    let case = cases.get(idx).ok_or_else(|| errors::invalid_discriminant(idx as u32, cases.len()))?;
    let payload_lane_count = cases.iter().map(|c| c.ty.as_ref().map(ValType::flatten).map(|f| f.len()).unwrap_or(0)).max().unwrap_or(0);
    let raw: Vec<u64> = lanes.by_ref().take(payload_lane_count).copied().collect();
    if raw.len() != payload_lane_count {
        return Err(errors::type_mismatch("ran out of lanes while lifting variant payload"));
    }
    let payload = match &case.ty {
        Some(ty) => {
            let needed = ty.flatten().len();
            let mut case_lanes = raw[..needed].iter();
            Some(lift_flat(ty, &mut case_lanes, alloc, options, ctx)?)
        }
        None => None,
    };
    Ok((idx, case.name.clone(), payload))
}

fn lift_flags(labels: &[String], lanes: &mut core::slice::Iter<'_, u64>) -> Result<Value> {
    let words = flags_word_count(labels.len());
    let mut raw = Vec::with_capacity(words as usize);
    for _ in 0..words {
        raw.push(lanes.next().copied().ok_or_else(|| errors::type_mismatch("ran out of lanes while lifting flags"))? as u32);
    }
    let mut set = Vec::new();
    for (i, label) in labels.iter().enumerate() {
        if (raw[i / 32] >> (i % 32)) & 1 != 0 {
            set.push(label.clone());
        }
    }
    Ok(Value::Flags(set))
}

use crate::errors;

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct FakeMemory {
        bytes: RefCell<Vec<u8>>,
        next_alloc: RefCell<u32>,
    }

    impl FakeMemory {
        fn new(size: usize) -> Self {
            Self { bytes: RefCell::new(vec![0; size]), next_alloc: RefCell::new(size as u32) }
        }
    }

    impl GuestAllocator for FakeMemory {
        fn size(&self) -> u32 {
            self.bytes.borrow().len() as u32
        }
        fn read_bytes(&self, offset: u32, len: u32) -> Result<Vec<u8>> {
            let b = self.bytes.borrow();
            Ok(b[offset as usize..(offset + len) as usize].to_vec())
        }
        fn write_bytes(&mut self, offset: u32, data: &[u8]) -> Result<()> {
            let mut b = self.bytes.borrow_mut();
            if (offset as usize + data.len()) > b.len() {
                b.resize(offset as usize + data.len(), 0);
            }
            b[offset as usize..offset as usize + data.len()].copy_from_slice(data);
            Ok(())
        }
        fn realloc(&mut self, _old_ptr: u32, _old_size: u32, _align: u32, new_size: u32) -> Result<u32> {
            let mut next = self.next_alloc.borrow_mut();
            let ptr = *next;
            *next += new_size;
            self.bytes.borrow_mut().resize(*next as usize, 0);
            Ok(ptr)
        }
    }

    #[test]
    fn scalar_lanes_round_trip() {
        let mut mem = FakeMemory::new(16);
        let opts = CanonicalOptions::new();
        let mut lanes = Vec::new();
        lower_flat(&ValType::S32, &Value::S32(-7), &mut lanes, &mut mem, &opts, &mut ResourceCtx::none()).unwrap();
        assert_eq!(lanes.len(), 1);
        let mut it = lanes.iter();
        assert_eq!(lift_flat(&ValType::S32, &mut it, &mem, &opts, &mut ResourceCtx::none()).unwrap(), Value::S32(-7));
    }

    #[test]
    fn string_lowers_to_ptr_len_pair() {
        let mut mem = FakeMemory::new(16);
        let opts = CanonicalOptions::new();
        let mut lanes = Vec::new();
        lower_flat(&ValType::String, &Value::String("hi".into()), &mut lanes, &mut mem, &opts, &mut ResourceCtx::none()).unwrap();
        assert_eq!(lanes.len(), 2);
        let mut it = lanes.iter();
        assert_eq!(lift_flat(&ValType::String, &mut it, &mem, &opts, &mut ResourceCtx::none()).unwrap(), Value::String("hi".into()));
    }

    #[test]
    fn variant_payload_lanes_padded_to_widest_case() {
        let mut mem = FakeMemory::new(16);
        let opts = CanonicalOptions::new();
        let ty = ValType::Variant(vec![
            VariantCase { name: "a".into(), ty: None },
            VariantCase { name: "b".into(), ty: Some(ValType::U64) },
        ]);
        let value = Value::Variant(0, "a".into(), None);
        let mut lanes = Vec::new();
        lower_flat(&ty, &value, &mut lanes, &mut mem, &opts, &mut ResourceCtx::none()).unwrap();
        assert_eq!(lanes.len(), ty.flatten().len());
        let mut it = lanes.iter();
        assert_eq!(lift_flat(&ty, &mut it, &mem, &opts, &mut ResourceCtx::none()).unwrap(), value);
    }

    #[test]
    fn record_flattens_fields_in_order() {
        let mut mem = FakeMemory::new(16);
        let opts = CanonicalOptions::new();
        let ty = ValType::Record(vec![("a".into(), ValType::U8), ("b".into(), ValType::U64)]);
        let value = Value::Record(vec![("a".into(), Value::U8(3)), ("b".into(), Value::U64(9))]);
        let mut lanes = Vec::new();
        lower_flat(&ty, &value, &mut lanes, &mut mem, &opts, &mut ResourceCtx::none()).unwrap();
        assert_eq!(lanes, vec![3, 9]);
        let mut it = lanes.iter();
        assert_eq!(lift_flat(&ty, &mut it, &mem, &opts, &mut ResourceCtx::none()).unwrap(), value);
    }

    #[test]
    fn borrow_lowering_registers_against_the_handle_table() {
        use crate::resources::{HandleTableSet, Representation, ResourceTypeId};
        use core::cell::RefCell;

        let mut mem = FakeMemory::new(16);
        let opts = CanonicalOptions::new();
        let handles = RefCell::new(HandleTableSet::new());
        let rt = ResourceTypeId::new();
        let owner_idx = handles.borrow_mut().table_mut(rt).new_own(rt, Representation::I32(1));

        let mut ctx = ResourceCtx::new(&handles);
        let mut lanes = Vec::new();
        lower_flat(&ValType::Borrow(rt), &Value::Borrow(owner_idx), &mut lanes, &mut mem, &opts, &mut ctx).unwrap();
        let borrow_idx = lanes[0] as u32;
        assert_ne!(borrow_idx, owner_idx);
        assert_eq!(handles.borrow().table(rt).unwrap().borrow_count(owner_idx).unwrap(), 1);

        ctx.release_all();
        assert_eq!(handles.borrow().table(rt).unwrap().borrow_count(owner_idx).unwrap(), 0);
    }
}
