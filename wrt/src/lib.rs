// WRT - wrt
// Module: WebAssembly Component Model host runtime facade
//
// Copyright (c) 2024 The WRT Project Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

#![cfg_attr(not(feature = "std"), no_std)]

//! Host-facing facade over the component-model core: parse a binary,
//! instantiate it against a core-Wasm engine and host-supplied imports,
//! call its exported functions, and manage resource handles.
//!
//! This crate adds no behavior of its own. Everything here is a
//! re-export, or a thin rename, of [`wrt_component`] — split out so a
//! host depends on one stable surface (`parse_component`, `instantiate`,
//! [`Function`], the handle tables) without reaching into the core's
//! internal module layout.
//!
//! A host embeds this crate by implementing [`CoreEngine`] over whatever
//! already compiles and runs core Wasm for it; [`instantiate`] takes that
//! engine and a map of values for the component's declared imports and
//! returns an [`Instance`] whose [`Instance::export`] hands back
//! callable [`Function`]s, nested instances, or plain type exports.

#[cfg(not(feature = "std"))]
extern crate alloc;

pub use wrt_component::{
    instantiate, parse_component, CanonLift, CanonLower, CanonLowerFn, Component, ComponentFunc, CompiledModule,
    CoreEngine, CoreImportValue, CoreInstance, CoreType, ExportValue, GuestAllocator, HandleTable, HandleTableSet,
    HostFunc, ImportValue, ImportValues, Instance, Representation, ResourceType, ResourceTypeId, RuntimeFunc,
    SharedFunc, ValType, Value, VariantCase,
};
pub use wrt_component::builder::{TypeBuilder, ValueBuilder};
pub use wrt_component::canon::{resource_drop, resource_new, resource_rep};
pub use wrt_error::{codes, Error, ErrorCategory, Result};

/// A callable component-level export: the result of either `canon lift`
/// binding a core export, or a host function supplied as an import and
/// exported back out unchanged. Named `Function` at this layer since a
/// host never needs to see the lift/host-func/resource-intrinsic
/// distinction [`RuntimeFunc`] draws internally.
pub type Function<E> = SharedFunc<E>;
