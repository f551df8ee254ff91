//! Consistent `alloc`/`std` imports used throughout this crate.
//!
//! Every other module does `use crate::prelude::*;` instead of reaching
//! for `std`/`alloc` directly, so the crate builds the same way under
//! `std` or under `no_std` + `alloc`.

#[cfg(feature = "std")]
pub use std::{
    boxed::Box,
    cell::RefCell,
    collections::HashMap as Map,
    format,
    rc::Rc,
    string::{String, ToString},
    vec,
    vec::Vec,
};

#[cfg(all(not(feature = "std"), feature = "alloc"))]
pub use alloc::{
    boxed::Box,
    collections::BTreeMap as Map,
    format,
    rc::Rc,
    string::{String, ToString},
    vec,
    vec::Vec,
};

#[cfg(all(not(feature = "std"), feature = "alloc"))]
pub use core::cell::RefCell;

pub use core::fmt;

pub use wrt_error::{codes, Error, ErrorCategory, Result};

// Structured log points at control-flow boundaries (section parsed,
// definition forced, instance created, call entered/exited, handle
// dropped), gated behind the optional `logging` feature. Expanding to
// nothing when the feature is off keeps call sites free of their own
// `#[cfg]`.
#[cfg(feature = "logging")]
macro_rules! log_trace {
    ($($arg:tt)*) => { ::log::trace!($($arg)*) };
}
#[cfg(not(feature = "logging"))]
macro_rules! log_trace {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($($arg:tt)*) => { ::log::debug!($($arg)*) };
}
#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "logging")]
macro_rules! log_warn {
    ($($arg:tt)*) => { ::log::warn!($($arg)*) };
}
#[cfg(not(feature = "logging"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {};
}

pub(crate) use log_debug;
pub(crate) use log_trace;
pub(crate) use log_warn;
