// WRT - wrt-component
// Module: WebAssembly Component Model core
//
// Copyright (c) 2024 The WRT Project Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

#![cfg_attr(not(feature = "std"), no_std)]

//! WebAssembly Component Model core: binary parser, definition-scope
//! resolver, canonical ABI engine, resource handle tables, and the
//! instantiation engine that glues them together.
//!
//! The core never compiles or runs core Wasm itself — see [`host`] for
//! the traits an embedding core-Wasm engine implements to collaborate
//! with it.

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod builder;
pub mod canon;
pub mod canonical_abi;
pub mod errors;
pub mod host;
pub mod instantiate;
pub mod parser;
pub mod prelude;
pub mod resources;
#[cfg(test)]
mod roundtrip;
pub mod scope;
pub mod types;

pub use canon::{CanonLift, CanonLower, CanonLowerFn, ComponentFunc};
pub use host::{CompiledModule, CoreEngine, CoreImportValue, CoreInstance, GuestAllocator, HostFunc, ImportValues};
pub use instantiate::{instantiate, ExportValue, ImportValue, Instance, RuntimeFunc, SharedFunc};
pub use parser::{parse_component, Component};
pub use resources::{HandleTable, HandleTableSet, Representation, ResourceType, ResourceTypeId};
pub use types::{CoreType, ValType, Value, VariantCase};
