//! Programmatic construction of [`ValType`]/[`Value`] trees.
//!
//! This is the only supported way to hand the core a component-level
//! type from host code — there is no WIT front-end or reflective
//! binding layer here (Design Note 9 picks explicit bindings over
//! reflection); a host that wants to describe `record { x: u32, y: u32
//! }` builds it with [`TypeBuilder::record`] the same way it would hand
//! write the `ValType::Record` variant directly, just with a few
//! ergonomic helpers for the recursive cases.

use crate::prelude::*;
use crate::resources::ResourceTypeId;
use crate::types::{ValType, Value, VariantCase};

/// Fluent construction of [`ValType`] trees.
#[derive(Debug, Clone, Default)]
pub struct TypeBuilder;

impl TypeBuilder {
    #[must_use]
    pub fn record(fields: impl IntoIterator<Item = (impl Into<String>, ValType)>) -> ValType {
        ValType::Record(fields.into_iter().map(|(name, ty)| (name.into(), ty)).collect())
    }

    #[must_use]
    pub fn tuple(fields: impl IntoIterator<Item = ValType>) -> ValType {
        ValType::Tuple(fields.into_iter().collect())
    }

    #[must_use]
    pub fn variant(cases: impl IntoIterator<Item = (impl Into<String>, Option<ValType>)>) -> ValType {
        ValType::Variant(cases.into_iter().map(|(name, ty)| VariantCase { name: name.into(), ty }).collect())
    }

    #[must_use]
    pub fn flags(labels: impl IntoIterator<Item = impl Into<String>>) -> ValType {
        ValType::Flags(labels.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn enum_(labels: impl IntoIterator<Item = impl Into<String>>) -> ValType {
        ValType::Enum(labels.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn list(element: ValType) -> ValType {
        ValType::List(Box::new(element))
    }

    #[must_use]
    pub fn option(inner: ValType) -> ValType {
        ValType::Option(Box::new(inner))
    }

    #[must_use]
    pub fn result(ok: Option<ValType>, err: Option<ValType>) -> ValType {
        ValType::Result(ok.map(Box::new), err.map(Box::new))
    }

    #[must_use]
    pub fn own(resource_type: ResourceTypeId) -> ValType {
        ValType::Own(resource_type)
    }

    #[must_use]
    pub fn borrow(resource_type: ResourceTypeId) -> ValType {
        ValType::Borrow(resource_type)
    }
}

/// Fluent construction of [`Value`] trees matching [`TypeBuilder`]'s shapes.
#[derive(Debug, Clone, Default)]
pub struct ValueBuilder;

impl ValueBuilder {
    #[must_use]
    pub fn record(fields: impl IntoIterator<Item = (impl Into<String>, Value)>) -> Value {
        Value::Record(fields.into_iter().map(|(name, v)| (name.into(), v)).collect())
    }

    #[must_use]
    pub fn tuple(fields: impl IntoIterator<Item = Value>) -> Value {
        Value::Tuple(fields.into_iter().collect())
    }

    #[must_use]
    pub fn variant(index: usize, name: impl Into<String>, payload: Option<Value>) -> Value {
        Value::Variant(index, name.into(), payload.map(Box::new))
    }

    #[must_use]
    pub fn flags(raised: impl IntoIterator<Item = impl Into<String>>) -> Value {
        Value::Flags(raised.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn enum_(label: impl Into<String>) -> Value {
        Value::Enum(label.into())
    }

    #[must_use]
    pub fn list(elements: impl IntoIterator<Item = Value>) -> Value {
        Value::List(elements.into_iter().collect())
    }

    #[must_use]
    pub fn option_some(inner: Value) -> Value {
        Value::OptionSome(Some(Box::new(inner)))
    }

    #[must_use]
    pub fn option_none() -> Value {
        Value::OptionSome(None)
    }

    #[must_use]
    pub fn ok(payload: Option<Value>) -> Value {
        Value::Result(Ok(payload.map(Box::new)))
    }

    #[must_use]
    pub fn err(payload: Option<Value>) -> Value {
        Value::Result(Err(payload.map(Box::new)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_builder_matches_hand_written_valtype() {
        let built = TypeBuilder::record([("x", ValType::U32), ("y", ValType::U32)]);
        assert_eq!(built, ValType::Record(vec![("x".to_string(), ValType::U32), ("y".to_string(), ValType::U32)]));
    }

    #[test]
    fn option_value_builders_round_trip_through_equality() {
        assert_eq!(ValueBuilder::option_some(Value::U32(9)), Value::OptionSome(Some(Box::new(Value::U32(9)))));
        assert_eq!(ValueBuilder::option_none(), Value::OptionSome(None));
    }

    #[test]
    fn variant_builder_produces_indexed_case_with_payload() {
        let v = ValueBuilder::variant(1, "err", Some(Value::String("boom".to_string())));
        assert_eq!(v, Value::Variant(1, "err".to_string(), Some(Box::new(Value::String("boom".to_string())))));
    }
}
