//! Canonical definitions: the bindings that adapt a core function to a
//! component-level one (`canon lift`), a component-level function to a
//! core import (`canon lower`), and the resource intrinsics
//! (`resource.new`/`resource.drop`/`resource.rep`).
//!
//! [`canonical_abi::lower_for_call`] and [`canonical_abi::lift_from_return`]
//! are direction-agnostic — encoding/decoding a typed value list against
//! the flat-or-memory convention doesn't care which side of a call it's
//! on — so both [`CanonLift`] and [`CanonLower`] reuse the same pair in
//! opposite roles.

use crate::canonical_abi::{self, CanonicalOptions};
use crate::errors;
use crate::host::{CoreInstance, GuestAllocator};
use crate::prelude::*;
use crate::resources::{HandleTableSet, Representation, ResourceTypeId};
use crate::types::{ValType, Value};

/// A component-level function backed by a core export, produced by
/// `canon lift`. `memory_export`/`realloc_export` are absent exactly
/// when the signature is all-scalar and never touches linear memory.
pub struct CanonLift {
    pub core_func_name: String,
    pub memory_export: Option<String>,
    pub realloc_export: Option<String>,
    pub param_types: Vec<ValType>,
    pub result_types: Vec<ValType>,
    pub options: CanonicalOptions,
    pub handles: Rc<RefCell<HandleTableSet>>,
}

/// Stands in for a guest allocator on an all-scalar call, where lift/lower
/// never reach for memory; touching it anyway is a bug, not a recoverable
/// runtime condition.
struct NullAllocator;

impl GuestAllocator for NullAllocator {
    fn size(&self) -> u32 {
        0
    }
    fn read_bytes(&self, _offset: u32, _len: u32) -> Result<Vec<u8>> {
        Err(errors::incomplete_canon_options("call touched memory but no memory option was declared"))
    }
    fn write_bytes(&mut self, _offset: u32, _data: &[u8]) -> Result<()> {
        Err(errors::incomplete_canon_options("call touched memory but no memory option was declared"))
    }
    fn realloc(&mut self, _old_ptr: u32, _old_size: u32, _align: u32, _new_size: u32) -> Result<u32> {
        Err(errors::incomplete_canon_options("call touched memory but no memory option was declared"))
    }
}

impl CanonLift {
    /// Invoke the wrapped core export with component-level arguments,
    /// returning component-level results. Runs `post-return` (if
    /// declared) once the results have been lifted out of memory.
    pub fn call(&self, instance: &mut dyn CoreInstance, args: &[Value]) -> Result<Vec<Value>> {
        log_trace!("canon lift call entered: {}", self.core_func_name);
        let mut ctx = canonical_abi::ResourceCtx::new(&self.handles);
        let result = self.call_inner(instance, args, &mut ctx);
        ctx.release_all();
        match &result {
            Ok(_) => log_trace!("canon lift call exited: {}", self.core_func_name),
            Err(e) => log_warn!("canon lift call exited with error: {e}"),
        }
        result
    }

    fn call_inner(&self, instance: &mut dyn CoreInstance, args: &[Value], ctx: &mut canonical_abi::ResourceCtx) -> Result<Vec<Value>> {
        let mut null_alloc = NullAllocator;
        let arg_lanes = match (&self.memory_export, &self.realloc_export) {
            (Some(mem), Some(realloc)) => {
                let alloc = instance.allocator(mem, realloc)?;
                canonical_abi::lower_for_call(&self.param_types, args, alloc, &self.options, ctx)?.0
            }
            _ => canonical_abi::lower_for_call(&self.param_types, args, &mut null_alloc, &self.options, ctx)?.0,
        };
        let result_lanes = instance.call(&self.core_func_name, &arg_lanes)?;
        let results = match (&self.memory_export, &self.realloc_export) {
            (Some(mem), Some(realloc)) => {
                let alloc = instance.allocator(mem, realloc)?;
                canonical_abi::lift_from_return(&self.result_types, &result_lanes, alloc, &self.options, ctx)?
            }
            _ => canonical_abi::lift_from_return(&self.result_types, &result_lanes, &null_alloc, &self.options, ctx)?,
        };
        if let Some(post_return) = &self.options.post_return {
            if instance.has_export(post_return) {
                instance.call(post_return, &result_lanes)?;
            }
        }
        Ok(results)
    }
}

/// A component-level callable a `canon lower` definition wraps to
/// produce a core import. Typically another `CanonLift`, a resource
/// intrinsic, or a host-native function supplied at instantiation time.
pub trait ComponentFunc {
    fn call(&mut self, args: &[Value]) -> Result<Vec<Value>>;
}

/// A core import backed by a component-level function, produced by
/// `canon lower`.
pub struct CanonLower<'a> {
    pub target: &'a mut dyn ComponentFunc,
    pub param_types: Vec<ValType>,
    pub result_types: Vec<ValType>,
    pub options: CanonicalOptions,
}

impl CanonLower<'_> {
    /// Invoked by the core engine (through whatever mechanism it models
    /// calling a host-synthesized import) with the lanes a core caller
    /// produced; lifts them, calls the wrapped component function,
    /// lowers the results back to lanes.
    pub fn call_from_core(&mut self, lanes: &[u64], alloc: &mut dyn GuestAllocator) -> Result<Vec<u64>> {
        let mut ctx = canonical_abi::ResourceCtx::none();
        let args = canonical_abi::lift_from_return(&self.param_types, lanes, alloc, &self.options, &mut ctx)?;
        let results = self.target.call(&args)?;
        let (result_lanes, _cleanup) = canonical_abi::lower_for_call(&self.result_types, &results, alloc, &self.options, &mut ctx)?;
        ctx.release_all();
        Ok(result_lanes)
    }
}

/// [`CanonLower`]'s owning counterpart: holds its target instead of
/// borrowing it, so it can be registered in a host function table and
/// outlive the call that created it.
pub struct CanonLowerFn {
    pub target: Box<dyn ComponentFunc>,
    pub param_types: Vec<ValType>,
    pub result_types: Vec<ValType>,
    pub options: CanonicalOptions,
}

impl crate::host::HostFunc for CanonLowerFn {
    fn call(&mut self, lanes: &[u64], alloc: &mut dyn GuestAllocator) -> Result<Vec<u64>> {
        let mut borrowed = CanonLower { target: self.target.as_mut(), param_types: self.param_types.clone(), result_types: self.result_types.clone(), options: self.options.clone() };
        borrowed.call_from_core(lanes, alloc)
    }
}

/// `canon resource.new`: store a fresh representation in the owning
/// instance's handle table for `resource_type`, returning its index.
pub fn resource_new(handles: &mut HandleTableSet, resource_type: ResourceTypeId, representation: i32) -> u32 {
    handles.table_mut(resource_type).new_own(resource_type, Representation::I32(representation))
}

/// `canon resource.drop`: drop an owned handle, returning the
/// representation so the caller can run the resource's destructor.
pub fn resource_drop(handles: &mut HandleTableSet, resource_type: ResourceTypeId, idx: u32) -> Result<Representation> {
    handles.table_mut(resource_type).drop_own(idx)
}

/// `canon resource.rep`: read back the representation of a live handle.
pub fn resource_rep(handles: &HandleTableSet, resource_type: ResourceTypeId, idx: u32) -> Result<Representation> {
    handles.table(resource_type).ok_or_else(|| errors::handle_out_of_range(idx))?.rep(idx)
}
