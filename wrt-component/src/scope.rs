//! A definition scope is one nesting level's set of per-sort index
//! spaces, plus the export table that level makes available to whatever
//! encloses it.
//!
//! The parser keeps a stack of these, one per component currently being
//! descended into; `outer` alias resolution walks up that stack rather
//! than through parent pointers, so a scope never borrows another.

use crate::parser::{CanonLiftDecl, CanonLowerDecl, CoreInstantiateArgs, ComponentInstantiateArgs, ExternDesc};
use crate::prelude::*;
use crate::resources::ResourceTypeId;
use crate::types::ValType;
use wrt_format::component::Sort;

/// Where a `CoreFunc`/`CoreTable`/`CoreMemory`/`CoreGlobal` slot actually
/// comes from. Nothing in this engine introspects core module internals,
/// so every value in these four sorts arises from a `core export` alias —
/// there is no second "native" source to distinguish it from.
#[derive(Debug, Clone)]
pub struct CoreExportRef {
    pub core_instance_idx: u32,
    pub name: String,
}

/// What a `CoreFunc` slot actually is: a genuine core export alias, or the
/// synthetic core-func side of a `canon lower` definition, which lives for
/// real in the `Func` sort under `func_idx` — `CoreFunc` and `Func` are
/// independently counted index spaces, so the slot needs an explicit
/// pointer back rather than assuming they advance in lockstep.
#[derive(Debug, Clone)]
pub enum CoreFuncSource {
    Export(CoreExportRef),
    Lowered { func_idx: u32 },
}

/// What a `Func` sort slot is bound to.
#[derive(Debug, Clone)]
pub enum FuncSource {
    Lift(CanonLiftDecl),
    Lower(CanonLowerDecl),
    ResourceNew { resource_type_idx: u32 },
    ResourceDrop { resource_type_idx: u32 },
    ResourceRep { resource_type_idx: u32 },
    Imported(ExternDesc),
    /// An `alias export $instance "name" (func)` — resolved against
    /// `instance_idx`'s export table once that instance has been forced.
    ExportOf { instance_idx: u32, name: String },
}

/// What an `Instance` sort slot is bound to.
#[derive(Debug, Clone)]
pub enum InstanceSource {
    Instantiate(ComponentInstantiateArgs),
    Imported(Vec<(String, ExternDesc)>),
    /// An `alias export $instance "name" (instance)`.
    ExportOf { instance_idx: u32, name: String },
}

/// One thing a sort index can resolve to. Module/component sorts carry
/// only an opaque arena id — the actual module bytes or nested component
/// AST live on [`crate::parser::Component`], not in the scope itself.
/// `Instance`/`CoreInstance`/`Func` carry the recipe instantiation needs
/// to actually build the runtime object, not the object itself — scopes
/// are built once, bottom-up, during parsing, well before any core
/// engine exists to run against.
#[derive(Debug, Clone)]
pub enum Definition {
    CoreFunc(CoreFuncSource),
    CoreTable(CoreExportRef),
    CoreMemory(CoreExportRef),
    CoreGlobal(CoreExportRef),
    CoreType,
    /// `Some(idx)` for a locally declared module; `None` when the slot is
    /// an import awaiting a value supplied at instantiation time.
    CoreModule(Option<u32>),
    CoreInstance(CoreInstantiateArgs),
    Func(FuncSource),
    Type(ValType),
    ResourceType(ResourceTypeId),
    /// `Some(idx)` for a locally declared nested component; `None` for an
    /// imported one.
    Component(Option<u32>),
    Instance(InstanceSource),
}

impl Definition {
    #[must_use]
    pub fn sort(&self) -> Sort {
        match self {
            Definition::CoreFunc(_) => Sort::CoreFunc,
            Definition::CoreTable(_) => Sort::CoreTable,
            Definition::CoreMemory(_) => Sort::CoreMemory,
            Definition::CoreGlobal(_) => Sort::CoreGlobal,
            Definition::CoreType => Sort::CoreType,
            Definition::CoreModule(_) => Sort::CoreModule,
            Definition::CoreInstance(_) => Sort::CoreInstance,
            Definition::Func(_) => Sort::Func,
            Definition::Type(_) | Definition::ResourceType(_) => Sort::Type,
            Definition::Component(_) => Sort::Component,
            Definition::Instance(_) => Sort::Instance,
        }
    }
}

/// The compatibility prefix a versioned export name falls back to when
/// no exact match exists: `base@major.` normally, `base@major.minor.`
/// when major is `0`, or the full `base@major.minor.patch` (no further
/// fallback) when major and minor are both `0`. A pre-release suffix on
/// the patch component (`0.0.5-rc1`) rides along as part of that last,
/// most specific segment, so it only ever matches exactly.
pub(crate) fn compatibility_prefix(base: &str, version: &str) -> String {
    let mut parts = version.splitn(3, '.');
    let major = parts.next().unwrap_or("0");
    let minor = parts.next().unwrap_or("0");
    let patch = parts.next().unwrap_or("0");
    if major != "0" {
        format!("{base}@{major}.")
    } else if minor != "0" {
        format!("{base}@{major}.{minor}.")
    } else {
        format!("{base}@{major}.{minor}.{patch}")
    }
}

#[derive(Debug, Clone)]
struct ExportEntry {
    name: String,
    definition: Definition,
}

/// One nesting level's index spaces and exports.
#[derive(Debug)]
pub struct DefinitionScope {
    sorts: [Vec<Definition>; 11],
    exports: Vec<ExportEntry>,
}

impl Default for DefinitionScope {
    fn default() -> Self {
        Self { sorts: core::array::from_fn(|_| Vec::new()), exports: Vec::new() }
    }
}

impl DefinitionScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a definition to its sort's index space, returning the
    /// index it was assigned.
    pub fn append(&mut self, definition: Definition) -> u32 {
        let slot = &mut self.sorts[definition.sort().slot()];
        slot.push(definition);
        (slot.len() - 1) as u32
    }

    /// Resolve `idx` within `sort`'s index space at this level.
    pub fn resolve(&self, sort: Sort, idx: u32) -> Result<&Definition> {
        self.sorts[sort.slot()].get(idx as usize).ok_or_else(|| errors::index_out_of_range(sort.name(), idx, self.sorts[sort.slot()].len()))
    }

    /// Record an export under `name` (may carry an `@version` suffix).
    pub fn add_export(&mut self, name: &str, definition: Definition) {
        self.exports.push(ExportEntry { name: name.to_string(), definition });
    }

    /// Look up an export by exact name; if that fails and the requested
    /// name carries a `@version` suffix, retry against the first export
    /// (by insertion order) whose name shares the compatibility prefix.
    pub fn export_alias(&self, requested_name: &str) -> Result<&Definition> {
        if let Some(entry) = self.exports.iter().find(|e| e.name == requested_name) {
            return Ok(&entry.definition);
        }
        if let Some((base, version)) = requested_name.split_once('@') {
            let prefix = compatibility_prefix(base, version);
            if let Some(entry) = self.exports.iter().find(|e| e.name.starts_with(prefix.as_str())) {
                return Ok(&entry.definition);
            }
        }
        Err(errors::missing_export(requested_name))
    }
}

use crate::errors;
