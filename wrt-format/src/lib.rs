// WRT - wrt-format
// Module: Component Model wire-format primitives
//
// Copyright (c) 2024 The WRT Project Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

#![cfg_attr(not(feature = "std"), no_std)]

//! Binary-level building blocks for the WebAssembly Component Model format:
//! LEB128 integers, length-prefixed names, section headers, and the fixed
//! tables of discriminant/section/option byte values the binary format
//! assigns meaning to. Nothing in this crate understands component
//! *semantics* (that's `wrt-component`); it only understands bytes.

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod binary;
pub mod component;

pub use wrt_error::{codes, Error, ErrorCategory, Result};
