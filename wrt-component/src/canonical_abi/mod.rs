//! The canonical ABI engine: lifting and lowering component-level
//! values across a call boundary, in both their flat (register) and
//! linear-memory representations.
//!
//! `lanes` implements the direct flat representation; `memory_repr`
//! implements the linear-memory representation list/record elements
//! always use; `options` carries the small bundle of encoding/export
//! choices a `canon lift`/`canon lower` definition attaches. This module
//! ties them together into the two operations a call actually performs:
//! [`lower_for_call`] on the way in, [`lift_from_return`] on the way out.

mod lanes;
mod memory_repr;
mod options;

pub use lanes::{lift_flat, lower_flat};
pub use memory_repr::{load, store};
pub use options::{CanonicalOptions, StringEncoding};

use crate::host::GuestAllocator;
use crate::prelude::*;
use crate::resources::{HandleTableSet, ResourceTypeId};
use crate::types::{Value, ValType};

/// A core function signature accepts at most this many flattened
/// parameter lanes before the canonical ABI spills the whole parameter
/// tuple through linear memory instead.
pub const MAX_FLAT_PARAMS: usize = 16;

/// A core function signature returns at most this many flattened result
/// lanes before results are written through linear memory and a single
/// pointer lane is returned instead.
pub const MAX_FLAT_RESULTS: usize = 1;

/// Describes a linear-memory allocation made while lowering a call's
/// arguments, in case the caller wants to reclaim it once the callee is
/// known to have finished consuming it (e.g. after `post-return`).
#[derive(Debug, Clone, Copy)]
pub struct CleanupRecord {
    pub ptr: u32,
    pub size: u32,
    pub align: u32,
}

/// Calls `alloc.realloc`, then rejects a null or misaligned result for a
/// non-zero request — "realloc returned null or unaligned pointer" is a
/// guest ABI violation, not a value this engine ever hands back to a caller.
pub(crate) fn checked_realloc(alloc: &mut dyn GuestAllocator, old_ptr: u32, old_size: u32, align: u32, new_size: u32) -> Result<u32> {
    let ptr = alloc.realloc(old_ptr, old_size, align, new_size)?;
    if new_size > 0 && (ptr == 0 || ptr % align != 0) {
        return Err(errors::realloc_invalid_pointer(ptr));
    }
    Ok(ptr)
}

/// A borrow handle registered during one call's lift/lower pass, queued
/// for release once the call finishes — in the order created, released
/// in reverse (§5's LIFO cleanup ordering).
#[derive(Debug, Clone, Copy)]
struct BorrowRelease {
    resource_type: ResourceTypeId,
    borrow_idx: u32,
}

/// Resource-handle bookkeeping threaded through a single lift/lower pass:
/// the owning instance's handle tables, plus the borrow releases this
/// call has registered so far. [`Self::none`] stands in for a pass with
/// no handle table to reach into (a `canon lower` binding's target isn't
/// wired to one); `own`/`borrow` lanes then pass through as raw indices,
/// same as before this bookkeeping existed.
pub struct ResourceCtx<'h> {
    handles: Option<&'h RefCell<HandleTableSet>>,
    cleanup: Vec<BorrowRelease>,
}

impl<'h> ResourceCtx<'h> {
    #[must_use]
    pub fn new(handles: &'h RefCell<HandleTableSet>) -> Self {
        Self { handles: Some(handles), cleanup: Vec::new() }
    }

    #[must_use]
    pub fn none() -> Self {
        Self { handles: None, cleanup: Vec::new() }
    }

    /// Create a call-scoped borrow over `owner_idx`, queuing its release.
    /// With no handle table to register against, `owner_idx` passes
    /// through unchanged.
    pub(crate) fn register_borrow(&mut self, resource_type: ResourceTypeId, owner_idx: u32) -> Result<u32> {
        let Some(handles) = self.handles else { return Ok(owner_idx) };
        let borrow_idx = handles.borrow_mut().table_mut(resource_type).borrow(owner_idx)?;
        self.cleanup.push(BorrowRelease { resource_type, borrow_idx });
        Ok(borrow_idx)
    }

    /// Release every borrow this pass registered, LIFO. Run unconditionally
    /// once the call is done, whether it succeeded or failed.
    pub fn release_all(&mut self) {
        let Some(handles) = self.handles else { return };
        while let Some(release) = self.cleanup.pop() {
            let _ = handles.borrow_mut().table_mut(release.resource_type).release_borrow(release.borrow_idx);
        }
    }
}

/// Lower a call's argument list to the lane sequence a core function
/// actually receives: flat lanes if the whole parameter tuple fits
/// within [`MAX_FLAT_PARAMS`], otherwise a single pointer lane into a
/// freshly allocated parameter-tuple buffer.
pub fn lower_for_call(param_types: &[ValType], args: &[Value], alloc: &mut dyn GuestAllocator, options: &CanonicalOptions, ctx: &mut ResourceCtx) -> Result<(Vec<u64>, Option<CleanupRecord>)> {
    if param_types.len() != args.len() {
        let err = errors::func_type_mismatch(format!("expected {} arguments, got {}", param_types.len(), args.len()));
        log_warn!("{err}");
        return Err(err);
    }
    let tuple_ty = ValType::Tuple(param_types.to_vec());
    let flat_len = tuple_ty.flatten().len();
    if flat_len <= MAX_FLAT_PARAMS {
        let tuple_val = Value::Tuple(args.to_vec());
        let mut lanes = Vec::with_capacity(flat_len);
        lower_flat(&tuple_ty, &tuple_val, &mut lanes, alloc, options, ctx)?;
        Ok((lanes, None))
    } else {
        let align = tuple_ty.align();
        let size = tuple_ty.elem_size();
        let ptr = if size == 0 { 0 } else { checked_realloc(alloc, 0, 0, align, size)? };
        let tuple_val = Value::Tuple(args.to_vec());
        store(&tuple_ty, &tuple_val, alloc, options, ptr, ctx)?;
        Ok((vec![ptr as u64], Some(CleanupRecord { ptr, size, align })))
    }
}

/// Lift a core function's returned lanes back into component-level
/// results, mirroring [`lower_for_call`]'s flat-vs-memory choice.
pub fn lift_from_return(result_types: &[ValType], lanes: &[u64], alloc: &dyn GuestAllocator, options: &CanonicalOptions, ctx: &mut ResourceCtx) -> Result<Vec<Value>> {
    let tuple_ty = ValType::Tuple(result_types.to_vec());
    let flat_len = tuple_ty.flatten().len();
    if flat_len <= MAX_FLAT_RESULTS {
        let mut it = lanes.iter();
        let tuple_val = lift_flat(&tuple_ty, &mut it, alloc, options, ctx)?;
        unwrap_tuple(tuple_val)
    } else {
        let ptr = *lanes.first().ok_or_else(|| errors::func_type_mismatch("missing return pointer lane"))? as u32;
        let tuple_val = load(&tuple_ty, alloc, options, ptr, ctx)?;
        unwrap_tuple(tuple_val)
    }
}

fn unwrap_tuple(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Tuple(values) => Ok(values),
        other => Err(errors::type_mismatch(format!("expected a tuple-shaped return value, found {other:?}"))),
    }
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
    fn small_arg_list_passes_as_flat_lanes() {
        let mut mem = FakeMemory::new(16);
        let opts = CanonicalOptions::new();
        let params = vec![ValType::U32, ValType::U32];
        let args = vec![Value::U32(1), Value::U32(2)];
        let (lanes, cleanup) = lower_for_call(&params, &args, &mut mem, &opts, &mut ResourceCtx::none()).unwrap();
        assert_eq!(lanes, vec![1, 2]);
        assert!(cleanup.is_none());
    }

    #[test]
    fn oversized_arg_list_spills_to_memory() {
        let mut mem = FakeMemory::new(16);
        let opts = CanonicalOptions::new();
        let params: Vec<ValType> = (0..20).map(|_| ValType::S64).collect();
        let args: Vec<Value> = (0..20).map(|i| Value::S64(i)).collect();
        let (lanes, cleanup) = lower_for_call(&params, &args, &mut mem, &opts, &mut ResourceCtx::none()).unwrap();
        assert_eq!(lanes.len(), 1);
        assert!(cleanup.is_some());
    }

    #[test]
    fn single_scalar_result_round_trips_as_flat_lane() {
        let mem = FakeMemory::new(16);
        let opts = CanonicalOptions::new();
        let lanes = vec![42u64];
        let results = lift_from_return(&[ValType::U32], &lanes, &mem, &opts, &mut ResourceCtx::none()).unwrap();
        assert_eq!(results, vec![Value::U32(42)]);
    }

    #[test]
    fn multiple_results_round_trip_through_call_and_return() {
        let mut mem = FakeMemory::new(16);
        let opts = CanonicalOptions::new();
        let result_types = vec![ValType::U32, ValType::U32];
        let tuple_ty = ValType::Tuple(result_types.clone());
        let values = Value::Tuple(vec![Value::U32(5), Value::U32(6)]);
        let align = tuple_ty.align();
        let size = tuple_ty.elem_size();
        let ptr = mem.realloc(0, 0, align, size).unwrap();
        store(&tuple_ty, &values, &mut mem, &opts, ptr, &mut ResourceCtx::none()).unwrap();
        let lanes = vec![ptr as u64];
        let results = lift_from_return(&result_types, &lanes, &mem, &opts, &mut ResourceCtx::none()).unwrap();
        assert_eq!(results, vec![Value::U32(5), Value::U32(6)]);
    }
}
