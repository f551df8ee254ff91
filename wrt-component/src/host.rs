//! The interfaces the core consumes from its external collaborator: an
//! already-compiled, already-running core-Wasm engine (§6, "Host-provided
//! interfaces"). The core never compiles or executes core Wasm itself —
//! it only reads/writes linear memory and invokes named exports through
//! these traits.

use crate::prelude::*;

/// Read/write access to one core instance's linear memory, plus its
/// declared `realloc` export — bundled together because a canonical
/// lift/lower pair must use a memory and a realloc from the same core
/// instance (§3's cross-cutting invariant).
pub trait GuestAllocator {
    fn size(&self) -> u32;
    fn read_bytes(&self, offset: u32, len: u32) -> Result<Vec<u8>>;
    fn write_bytes(&mut self, offset: u32, data: &[u8]) -> Result<()>;

    /// `(old_ptr, old_size, align, new_size) -> new_ptr`. `old_ptr` and
    /// `old_size` are `0` on a fresh allocation.
    fn realloc(&mut self, old_ptr: u32, old_size: u32, align: u32, new_size: u32) -> Result<u32>;

    fn read_u8(&self, offset: u32) -> Result<u8> {
        Ok(self.read_bytes(offset, 1)?[0])
    }
    fn read_u16_le(&self, offset: u32) -> Result<u16> {
        let b = self.read_bytes(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }
    fn read_u32_le(&self, offset: u32) -> Result<u32> {
        let b = self.read_bytes(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
    fn read_u64_le(&self, offset: u32) -> Result<u64> {
        let b = self.read_bytes(offset, 8)?;
        Ok(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }
    fn write_u8(&mut self, offset: u32, value: u8) -> Result<()> {
        self.write_bytes(offset, &[value])
    }
    fn write_u16_le(&mut self, offset: u32, value: u16) -> Result<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }
    fn write_u32_le(&mut self, offset: u32, value: u32) -> Result<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }
    fn write_u64_le(&mut self, offset: u32, value: u64) -> Result<()> {
        self.write_bytes(offset, &value.to_le_bytes())
    }
}

/// An instantiated core module: invoke an export by name with u64-encoded
/// lanes, and reach its declared memories/allocators by export name.
pub trait CoreInstance {
    /// Invoke a core export by name, passing/returning lanes exactly as
    /// the canonical ABI engine produces/consumes them.
    fn call(&mut self, func_name: &str, args: &[u64]) -> Result<Vec<u64>>;

    /// Borrow the named memory/realloc pair for the duration of one ABI
    /// operation.
    fn allocator(&mut self, memory_name: &str, realloc_name: &str) -> Result<&mut dyn GuestAllocator>;

    /// True if the instance exports a function under this name (used to
    /// resolve optional canonical options like `post-return`).
    fn has_export(&self, name: &str) -> bool;
}

/// An already-compiled core module, opaque to the component-model core.
pub trait CompiledModule {}

/// A host-synthesized function a core import resolves to — what a `canon
/// lower` definition, or a directly host-provided function, looks like
/// once it's bound into a core instance's import map. Takes/returns
/// lanes exactly as [`CoreInstance::call`] does, plus the allocator the
/// concrete core instance is making the call against (needed to lift the
/// incoming arguments and lower the outgoing results).
pub trait HostFunc {
    fn call(&mut self, lanes: &[u64], alloc: &mut dyn GuestAllocator) -> Result<Vec<u64>>;
}

/// The core-Wasm engine collaborator: compiles modules and instantiates
/// them against a host-synthesized import map. Import/export values
/// crossing this boundary are represented as `u64` lanes by the caller;
/// the engine itself only needs to thread them through to the module.
pub trait CoreEngine {
    type Module: CompiledModule + 'static;
    type Instance: CoreInstance + 'static;

    /// Compile a core module from its raw bytes. Implementations are
    /// expected to cache by content so repeated occurrences of
    /// byte-identical modules compile once.
    fn compile(&mut self, bytes: &[u8]) -> Result<Self::Module>;

    /// Instantiate a compiled module against a synthesized import map:
    /// `(module_name, field_name) -> u64 lanes for a function value, or
    /// an opaque reference for a memory/table/global import`. For the
    /// scope of this core, imports are modeled simply as named callables;
    /// richer table/memory/global imports are an engine detail.
    fn instantiate(&mut self, module: &Self::Module, imports: &ImportValues) -> Result<Self::Instance>;

    /// Register a host-callable function under a fresh id, returned for
    /// use as a [`CoreImportValue::Func`]. A module instantiated with
    /// that id in its import map dispatches calls to it through here
    /// rather than into another compiled module.
    fn bind_host_func(&mut self, func: Box<dyn HostFunc>) -> u32;
}

/// A named set of values supplied as a core instance's imports, grouped
/// by the two-level `(module, field)` core-Wasm import namespace.
#[derive(Debug, Default, Clone)]
pub struct ImportValues {
    entries: Map<(String, String), CoreImportValue>,
}

/// One value a core module can import: a callable function, named by
/// the id [`CoreEngine::bind_host_func`] returned for it, or an opaque
/// reference standing in for a global/table/memory the engine already
/// knows how to wire up.
#[derive(Debug, Clone)]
pub enum CoreImportValue {
    Func(u32),
    Opaque,
}

impl ImportValues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, module: impl Into<String>, field: impl Into<String>, value: CoreImportValue) {
        self.entries.insert((module.into(), field.into()), value);
    }

    #[must_use]
    pub fn get(&self, module: &str, field: &str) -> Option<&CoreImportValue> {
        self.entries.get(&(module.to_string(), field.to_string()))
    }
}
