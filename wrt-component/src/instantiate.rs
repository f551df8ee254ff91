//! The instantiation engine: forces a parsed [`Component`]'s lazy scope
//! bindings into a live [`Instance`], given concrete values for its
//! declared imports and a core-Wasm engine collaborator (§4.6).
//!
//! Every [`Definition`] is forced on demand and memoized per `(Sort,
//! index)` within the component currently being instantiated — there is
//! no eager walk over every declared slot, since [`DefinitionScope`]
//! exposes no length/iteration API, only `resolve(sort, idx)`. A
//! definition that nothing exports and nothing else depends on is simply
//! never forced; this also reproduces the documented "aliasing a
//! instance/core instance does not share a runtime singleton" behavior,
//! since an alias and its original occupy distinct scope slots and are
//! memoized independently.

use crate::canon::{resource_drop, resource_new, resource_rep, CanonLift, CanonLowerFn, ComponentFunc};
use crate::errors;
use crate::host::{CoreEngine, CoreImportValue, CoreInstance, GuestAllocator, HostFunc, ImportValues};
use crate::parser::{Component, ComponentInstantiateArgs, CoreInstantiateArgs, ExternDesc, ImportDecl};
use crate::prelude::*;
use crate::resources::{HandleTableSet, Representation, ResourceTypeId};
use crate::scope::{compatibility_prefix, CoreFuncSource, Definition, FuncSource, InstanceSource};
use crate::types::{ValType, Value};
use wrt_format::component::Sort;

/// One value a host can supply for a declared import.
pub enum ImportValue<E: CoreEngine> {
    CoreModule(Rc<E::Module>),
    Func(Box<dyn ComponentFunc>),
    Instance(Map<String, ImportValue<E>>),
    Type(ValType),
    Component,
    CoreInstance,
    CoreFunc,
    CoreTable,
    CoreMemory,
    CoreGlobal,
    CoreType,
}

impl<E: CoreEngine> ImportValue<E> {
    fn sort_name(&self) -> &'static str {
        match self {
            ImportValue::CoreModule(_) => "module",
            ImportValue::Func(_) => "func",
            ImportValue::Instance(_) => "instance",
            ImportValue::Type(_) => "type",
            ImportValue::Component => "component",
            ImportValue::CoreInstance => "core instance",
            ImportValue::CoreFunc => "core func",
            ImportValue::CoreTable => "core table",
            ImportValue::CoreMemory => "core memory",
            ImportValue::CoreGlobal => "core global",
            ImportValue::CoreType => "core type",
        }
    }
}

/// One entry in an [`Instance`]'s export map, or a resolved import value
/// threaded down into a nested component's instantiation.
pub enum ExportValue<E: CoreEngine> {
    Function(SharedFunc<E>),
    Instance(Rc<Instance<E>>),
    /// A plain value-type export.
    Type(ValType),
    /// An abstract resource-type export — also an instance of the
    /// "Type" export kind, just not representable as a bare [`ValType`].
    ResourceType(ResourceTypeId),
    Module(Rc<E::Module>),
}

impl<E: CoreEngine> Clone for ExportValue<E> {
    fn clone(&self) -> Self {
        match self {
            ExportValue::Function(f) => ExportValue::Function(f.clone()),
            ExportValue::Instance(i) => ExportValue::Instance(i.clone()),
            ExportValue::Type(t) => ExportValue::Type(t.clone()),
            ExportValue::ResourceType(id) => ExportValue::ResourceType(*id),
            ExportValue::Module(m) => ExportValue::Module(m.clone()),
        }
    }
}

fn export_value_sort_name<E: CoreEngine>(v: &ExportValue<E>) -> &'static str {
    match v {
        ExportValue::Function(_) => "func",
        ExportValue::Instance(_) => "instance",
        ExportValue::Type(_) | ExportValue::ResourceType(_) => "type",
        ExportValue::Module(_) => "module",
    }
}

/// A live instance: its exports, and the handle tables it owns for
/// whatever resource types it declares (§5, "linear memory and handle
/// tables are owned by exactly one instance").
pub struct Instance<E: CoreEngine> {
    exports: Map<String, ExportValue<E>>,
    handles: Rc<RefCell<HandleTableSet>>,
}

impl<E: CoreEngine> Instance<E> {
    #[must_use]
    pub fn export(&self, name: &str) -> Option<&ExportValue<E>> {
        self.exports.get(name)
    }

    #[must_use]
    pub fn handles(&self) -> Rc<RefCell<HandleTableSet>> {
        self.handles.clone()
    }
}

/// A callable component-level function backed by one of: a lifted core
/// export, a host-native function, or a resource intrinsic bound to a
/// concrete instance's handle tables.
pub enum RuntimeFunc<E: CoreEngine> {
    Lifted { decl: CanonLift, instance: Rc<RefCell<E::Instance>> },
    Host(Box<dyn ComponentFunc>),
    ResourceNew { resource_type: ResourceTypeId, handles: Rc<RefCell<HandleTableSet>> },
    ResourceDrop { resource_type: ResourceTypeId, handles: Rc<RefCell<HandleTableSet>> },
    ResourceRep { resource_type: ResourceTypeId, handles: Rc<RefCell<HandleTableSet>> },
}

fn handle_arg(args: &[Value]) -> Result<u32> {
    match args.first() {
        Some(Value::Own(idx)) | Some(Value::Borrow(idx)) => Ok(*idx),
        other => Err(errors::type_mismatch(format!("expected a resource handle argument, found {other:?}"))),
    }
}

impl<E: CoreEngine> ComponentFunc for RuntimeFunc<E> {
    fn call(&mut self, args: &[Value]) -> Result<Vec<Value>> {
        match self {
            RuntimeFunc::Lifted { decl, instance } => decl.call(&mut *instance.borrow_mut(), args),
            RuntimeFunc::Host(f) => f.call(args),
            RuntimeFunc::ResourceNew { resource_type, handles } => {
                let rep = match args.first() {
                    Some(Value::S32(v)) => *v,
                    other => return Err(errors::type_mismatch(format!("resource.new expects an i32 representation, found {other:?}"))),
                };
                let idx = resource_new(&mut handles.borrow_mut(), *resource_type, rep);
                Ok(vec![Value::Own(idx)])
            }
            RuntimeFunc::ResourceDrop { resource_type, handles } => {
                let idx = handle_arg(args)?;
                resource_drop(&mut handles.borrow_mut(), *resource_type, idx)?;
                Ok(Vec::new())
            }
            RuntimeFunc::ResourceRep { resource_type, handles } => {
                let idx = handle_arg(args)?;
                let Representation::I32(v) = resource_rep(&handles.borrow(), *resource_type, idx)?;
                Ok(vec![Value::S32(v)])
            }
        }
    }
}

/// A shared, reference-counted [`RuntimeFunc`] — the handle stored in
/// export maps and passed around as a plain [`ComponentFunc`]. Cloning
/// shares the same underlying function rather than duplicating it,
/// which is what lets an aliased export still observe e.g. a stateful
/// host function's side effects from every alias.
pub struct SharedFunc<E: CoreEngine> {
    inner: Rc<RefCell<RuntimeFunc<E>>>,
}

impl<E: CoreEngine> Clone for SharedFunc<E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<E: CoreEngine> ComponentFunc for SharedFunc<E> {
    fn call(&mut self, args: &[Value]) -> Result<Vec<Value>> {
        self.inner.borrow_mut().call(args)
    }
}

impl<E: CoreEngine> SharedFunc<E> {
    /// Invoke through a shared reference — the entry point [`Function::invoke`]
    /// of §6's host API ultimately calls.
    pub fn invoke(&self, args: &[Value]) -> Result<Vec<Value>> {
        log_trace!("call entered: {} arg(s)", args.len());
        let result = self.inner.borrow_mut().call(args);
        match &result {
            Ok(results) => log_trace!("call exited: {} result(s)", results.len()),
            Err(e) => log_warn!("call exited with error: {e}"),
        }
        result
    }
}

fn wrap_func<E: CoreEngine>(f: RuntimeFunc<E>) -> SharedFunc<E> {
    SharedFunc { inner: Rc::new(RefCell::new(f)) }
}

/// A core-level function a core instance can import, bound lazily the
/// first time something wires it into a `with` argument.
enum CoreFuncBinding<E: CoreEngine> {
    /// A genuine core export, re-exposed as an import to a sibling core
    /// instance — calling it just proxies into the instance it came from.
    Export { instance: Rc<RefCell<E::Instance>>, name: String },
    /// The synthesized core side of a `canon lower` definition.
    Lowered(Rc<RefCell<CanonLowerFn>>),
}

impl<E: CoreEngine> Clone for CoreFuncBinding<E> {
    fn clone(&self) -> Self {
        match self {
            CoreFuncBinding::Export { instance, name } => CoreFuncBinding::Export { instance: instance.clone(), name: name.clone() },
            CoreFuncBinding::Lowered(l) => CoreFuncBinding::Lowered(l.clone()),
        }
    }
}

struct CoreReexport<E: CoreEngine> {
    instance: Rc<RefCell<E::Instance>>,
    name: String,
}

impl<E: CoreEngine> HostFunc for CoreReexport<E> {
    fn call(&mut self, lanes: &[u64], _alloc: &mut dyn GuestAllocator) -> Result<Vec<u64>> {
        self.instance.borrow_mut().call(&self.name, lanes)
    }
}

struct SharedLowering(Rc<RefCell<CanonLowerFn>>);

impl HostFunc for SharedLowering {
    fn call(&mut self, lanes: &[u64], alloc: &mut dyn GuestAllocator) -> Result<Vec<u64>> {
        self.0.borrow_mut().call(lanes, alloc)
    }
}

impl<E: CoreEngine> CoreFuncBinding<E> {
    fn bind(self, engine: &mut E) -> u32 {
        match self {
            CoreFuncBinding::Export { instance, name } => engine.bind_host_func(Box::new(CoreReexport { instance, name })),
            CoreFuncBinding::Lowered(lowering) => engine.bind_host_func(Box::new(SharedLowering(lowering))),
        }
    }
}

/// Everything a scope slot can force into, one variant per sort.
enum Forced<E: CoreEngine> {
    CoreFunc(CoreFuncBinding<E>),
    CoreTable,
    CoreMemory,
    CoreGlobal,
    CoreType,
    CoreModule(Rc<E::Module>),
    CoreInstance(Rc<RefCell<E::Instance>>),
    Func(SharedFunc<E>),
    Type(ValType),
    ResourceType(ResourceTypeId),
    Component,
    Instance(Rc<Instance<E>>),
}

impl<E: CoreEngine> Clone for Forced<E> {
    fn clone(&self) -> Self {
        match self {
            Forced::CoreFunc(b) => Forced::CoreFunc(b.clone()),
            Forced::CoreTable => Forced::CoreTable,
            Forced::CoreMemory => Forced::CoreMemory,
            Forced::CoreGlobal => Forced::CoreGlobal,
            Forced::CoreType => Forced::CoreType,
            Forced::CoreModule(m) => Forced::CoreModule(m.clone()),
            Forced::CoreInstance(i) => Forced::CoreInstance(i.clone()),
            Forced::Func(f) => Forced::Func(f.clone()),
            Forced::Type(t) => Forced::Type(t.clone()),
            Forced::ResourceType(id) => Forced::ResourceType(*id),
            Forced::Component => Forced::Component,
            Forced::Instance(i) => Forced::Instance(i.clone()),
        }
    }
}

fn forced_sort_name<E: CoreEngine>(forced: &Forced<E>) -> &'static str {
    match forced {
        Forced::CoreFunc(_) => "core func",
        Forced::CoreTable => "core table",
        Forced::CoreMemory => "core memory",
        Forced::CoreGlobal => "core global",
        Forced::CoreType => "core type",
        Forced::CoreModule(_) => "module",
        Forced::CoreInstance(_) => "core instance",
        Forced::Func(_) => "func",
        Forced::Type(_) | Forced::ResourceType(_) => "type",
        Forced::Component => "component",
        Forced::Instance(_) => "instance",
    }
}

fn forced_to_export_value<E: CoreEngine>(forced: Forced<E>) -> Result<ExportValue<E>> {
    match forced {
        Forced::Func(f) => Ok(ExportValue::Function(f)),
        Forced::Instance(i) => Ok(ExportValue::Instance(i)),
        Forced::Type(t) => Ok(ExportValue::Type(t)),
        Forced::ResourceType(id) => Ok(ExportValue::ResourceType(id)),
        Forced::CoreModule(m) => Ok(ExportValue::Module(m)),
        other => Err(errors::export_sort_mismatch("func, instance, type, or module", forced_sort_name(&other))),
    }
}

fn forced_to_import_value<E: CoreEngine>(forced: Forced<E>) -> Result<ImportValue<E>> {
    match forced {
        Forced::CoreModule(m) => Ok(ImportValue::CoreModule(m)),
        Forced::Func(f) => Ok(ImportValue::Func(Box::new(f))),
        Forced::Instance(i) => export_value_to_import_value(&ExportValue::Instance(i)),
        Forced::Type(t) => Ok(ImportValue::Type(t)),
        other => Err(errors::unsupported(forced_sort_name(&other))),
    }
}

fn export_value_to_import_value<E: CoreEngine>(v: &ExportValue<E>) -> Result<ImportValue<E>> {
    match v {
        ExportValue::Function(f) => Ok(ImportValue::Func(Box::new(f.clone()))),
        ExportValue::Instance(inst) => {
            let mut map = Map::new();
            for (name, export) in &inst.exports {
                map.insert(name.clone(), export_value_to_import_value(export)?);
            }
            Ok(ImportValue::Instance(map))
        }
        ExportValue::Type(t) => Ok(ImportValue::Type(t.clone())),
        ExportValue::ResourceType(_) => Err(errors::unsupported("passing a resource type through a nested instantiation's `with` arguments")),
        ExportValue::Module(m) => Ok(ImportValue::CoreModule(m.clone())),
    }
}

fn option_to_vec(ty: Option<ValType>) -> Vec<ValType> {
    ty.map(|t| vec![t]).unwrap_or_default()
}

fn find_import<E: CoreEngine>(imports: &mut Map<String, ImportValue<E>>, name: &str) -> Option<ImportValue<E>> {
    if imports.contains_key(name) {
        return imports.remove(name);
    }
    let (base, version) = name.split_once('@')?;
    let prefix = compatibility_prefix(base, version);
    let matched = imports.keys().find(|k| k.starts_with(prefix.as_str())).cloned()?;
    imports.remove(&matched)
}

/// Per-component forcing state: the component's own definitions, the
/// (still being consumed) host-supplied import values, the per-sort
/// memoization caches, and a separate cache of compiled core modules
/// keyed by their content-arena index (so an aliased module slot still
/// compiles its bytes only once, per §4.6 step 2).
struct Forcer<'e, E: CoreEngine> {
    component: &'e Component,
    engine: &'e mut E,
    handles: Rc<RefCell<HandleTableSet>>,
    imports: Map<String, ImportValue<E>>,
    cache: [Map<u32, Forced<E>>; 11],
    compiled_modules: Map<u32, Rc<E::Module>>,
}

impl<'e, E: CoreEngine> Forcer<'e, E> {
    fn seed_import(&mut self, decl: &ImportDecl) -> Result<()> {
        let value = find_import(&mut self.imports, &decl.name).ok_or_else(|| errors::missing_import(&decl.name))?;
        let forced = self.check_and_convert(&decl.desc, value, &decl.name)?;
        self.cache[decl.sort.slot()].insert(decl.idx, forced);
        Ok(())
    }

    fn check_and_convert(&mut self, desc: &ExternDesc, value: ImportValue<E>, name: &str) -> Result<Forced<E>> {
        match desc {
            ExternDesc::CoreModule => match value {
                ImportValue::CoreModule(m) => Ok(Forced::CoreModule(m)),
                other => Err(errors::import_sort_mismatch("module", other.sort_name())),
            },
            ExternDesc::Type(expected) => match value {
                ImportValue::Type(ty) if ty.structurally_equals(expected) => Ok(Forced::Type(ty)),
                ImportValue::Type(ty) => Err(errors::type_mismatch(format!("import `{name}` expected type {expected:?}, found {ty:?}"))),
                other => Err(errors::import_sort_mismatch("type", other.sort_name())),
            },
            ExternDesc::Func { params, result } => match value {
                ImportValue::Func(f) => {
                    let _ = (params, result);
                    Ok(Forced::Func(wrap_func(RuntimeFunc::Host(f))))
                }
                other => Err(errors::import_sort_mismatch("func", other.sort_name())),
            },
            ExternDesc::Instance(expected_exports) => match value {
                ImportValue::Instance(mut map) => {
                    let mut exports = Map::new();
                    for (export_name, export_desc) in expected_exports {
                        let v = find_import(&mut map, export_name).ok_or_else(|| errors::missing_export(export_name))?;
                        let forced = self.check_and_convert(export_desc, v, export_name)?;
                        exports.insert(export_name.clone(), forced_to_export_value(forced)?);
                    }
                    Ok(Forced::Instance(Rc::new(Instance { exports, handles: Rc::new(RefCell::new(HandleTableSet::new())) })))
                }
                other => Err(errors::import_sort_mismatch("instance", other.sort_name())),
            },
            ExternDesc::Component => Err(errors::unsupported("importing a component directly")),
            ExternDesc::CoreInstance => Err(errors::unsupported("importing a core instance directly")),
            ExternDesc::CoreFunc => Err(errors::unsupported("importing a core func directly")),
            ExternDesc::CoreTable => Err(errors::unsupported("importing a core table directly")),
            ExternDesc::CoreMemory => Err(errors::unsupported("importing a core memory directly")),
            ExternDesc::CoreGlobal => Err(errors::unsupported("importing a core global directly")),
            ExternDesc::CoreType => Err(errors::unsupported("importing a core type directly")),
        }
    }

    fn force(&mut self, sort: Sort, idx: u32) -> Result<Forced<E>> {
        if let Some(existing) = self.cache[sort.slot()].get(&idx) {
            return Ok(existing.clone());
        }
        log_trace!("forcing {} #{idx}", sort.name());
        let definition = self.component.scope.resolve(sort, idx)?.clone();
        let forced = self.force_definition(&definition)?;
        self.cache[sort.slot()].insert(idx, forced.clone());
        Ok(forced)
    }

    fn force_definition(&mut self, definition: &Definition) -> Result<Forced<E>> {
        match definition {
            Definition::CoreFunc(source) => self.force_core_func(source).map(Forced::CoreFunc),
            Definition::CoreTable(_) => Ok(Forced::CoreTable),
            Definition::CoreMemory(_) => Ok(Forced::CoreMemory),
            Definition::CoreGlobal(_) => Ok(Forced::CoreGlobal),
            Definition::CoreType => Ok(Forced::CoreType),
            Definition::CoreModule(idx) => self.force_core_module(*idx).map(Forced::CoreModule),
            Definition::CoreInstance(args) => self.force_core_instance(args).map(Forced::CoreInstance),
            Definition::Func(source) => self.force_func(source).map(Forced::Func),
            Definition::Type(ty) => Ok(Forced::Type(ty.clone())),
            Definition::ResourceType(id) => Ok(Forced::ResourceType(*id)),
            Definition::Component(_) => Ok(Forced::Component),
            Definition::Instance(source) => self.force_instance(source).map(Forced::Instance),
        }
    }

    fn force_core_func(&mut self, source: &CoreFuncSource) -> Result<CoreFuncBinding<E>> {
        match source {
            CoreFuncSource::Export(reference) => {
                let Forced::CoreInstance(instance) = self.force(Sort::CoreInstance, reference.core_instance_idx)? else {
                    return Err(errors::export_sort_mismatch("core instance", "something else"));
                };
                Ok(CoreFuncBinding::Export { instance, name: reference.name.clone() })
            }
            CoreFuncSource::Lowered { func_idx } => {
                let Definition::Func(FuncSource::Lower(decl)) = self.component.scope.resolve(Sort::Func, *func_idx)?.clone() else {
                    return Err(errors::type_mismatch("CoreFunc(Lowered) does not point at a canon lower definition"));
                };
                let Forced::Func(target) = self.force(Sort::Func, decl.func_idx)? else {
                    return Err(errors::export_sort_mismatch("func", "something else"));
                };
                let lower = CanonLowerFn {
                    target: Box::new(target),
                    param_types: decl.param_types,
                    result_types: option_to_vec(decl.result_type),
                    options: decl.options,
                };
                Ok(CoreFuncBinding::Lowered(Rc::new(RefCell::new(lower))))
            }
        }
    }

    fn force_core_module(&mut self, idx: Option<u32>) -> Result<Rc<E::Module>> {
        let idx = idx.ok_or_else(|| errors::unsupported("a core module import has no compiled value bound to it"))?;
        if let Some(cached) = self.compiled_modules.get(&idx) {
            return Ok(cached.clone());
        }
        let bytes = self
            .component
            .core_modules
            .get(idx as usize)
            .ok_or_else(|| errors::index_out_of_range("module", idx, self.component.core_modules.len()))?;
        let module = self.engine.compile(bytes)?;
        let rc = Rc::new(module);
        self.compiled_modules.insert(idx, rc.clone());
        Ok(rc)
    }

    fn force_core_instance(&mut self, args: &CoreInstantiateArgs) -> Result<Rc<RefCell<E::Instance>>> {
        let Forced::CoreModule(module) = self.force(Sort::CoreModule, args.module_idx)? else {
            return Err(errors::export_sort_mismatch("module", "something else"));
        };
        let mut import_values = ImportValues::new();
        for (module_name, field_name, sort, idx) in &args.args {
            match sort {
                Sort::CoreFunc => {
                    let Forced::CoreFunc(binding) = self.force(Sort::CoreFunc, *idx)? else {
                        return Err(errors::export_sort_mismatch("core func", "something else"));
                    };
                    let id = binding.bind(self.engine);
                    import_values.insert(module_name.clone(), field_name.clone(), CoreImportValue::Func(id));
                }
                _ => import_values.insert(module_name.clone(), field_name.clone(), CoreImportValue::Opaque),
            }
        }
        let instance = self.engine.instantiate(&module, &import_values)?;
        Ok(Rc::new(RefCell::new(instance)))
    }

    fn resource_type_id(&self, idx: u32) -> Result<ResourceTypeId> {
        match self.component.scope.resolve(Sort::Type, idx)? {
            Definition::ResourceType(id) => Ok(*id),
            other => Err(errors::type_mismatch(format!("type index does not refer to a resource type, found {other:?}"))),
        }
    }

    fn force_func(&mut self, source: &FuncSource) -> Result<SharedFunc<E>> {
        match source {
            FuncSource::Lift(decl) => {
                let Forced::CoreInstance(instance) = self.force(Sort::CoreInstance, decl.core_instance_idx)? else {
                    return Err(errors::export_sort_mismatch("core instance", "something else"));
                };
                let lift = CanonLift {
                    core_func_name: decl.core_func_name.clone(),
                    memory_export: decl.options.memory.clone(),
                    realloc_export: decl.options.realloc.clone(),
                    param_types: decl.param_types.clone(),
                    result_types: option_to_vec(decl.result_type.clone()),
                    options: decl.options.clone(),
                    handles: self.handles.clone(),
                };
                Ok(wrap_func(RuntimeFunc::Lifted { decl: lift, instance }))
            }
            FuncSource::Lower(_) => Err(errors::unsupported("a canon lower definition cannot be referenced as a plain func")),
            FuncSource::ResourceNew { resource_type_idx } => {
                let resource_type = self.resource_type_id(*resource_type_idx)?;
                Ok(wrap_func(RuntimeFunc::ResourceNew { resource_type, handles: self.handles.clone() }))
            }
            FuncSource::ResourceDrop { resource_type_idx } => {
                let resource_type = self.resource_type_id(*resource_type_idx)?;
                Ok(wrap_func(RuntimeFunc::ResourceDrop { resource_type, handles: self.handles.clone() }))
            }
            FuncSource::ResourceRep { resource_type_idx } => {
                let resource_type = self.resource_type_id(*resource_type_idx)?;
                Ok(wrap_func(RuntimeFunc::ResourceRep { resource_type, handles: self.handles.clone() }))
            }
            FuncSource::Imported(_) => Err(errors::unsupported("an imported func's scope slot should already be seeded")),
            FuncSource::ExportOf { instance_idx, name } => {
                let Forced::Instance(instance) = self.force(Sort::Instance, *instance_idx)? else {
                    return Err(errors::export_sort_mismatch("instance", "something else"));
                };
                match instance.export(name) {
                    Some(ExportValue::Function(f)) => Ok(f.clone()),
                    Some(other) => Err(errors::export_sort_mismatch("func", export_value_sort_name(other))),
                    None => Err(errors::missing_export(name)),
                }
            }
        }
    }

    fn force_instance(&mut self, source: &InstanceSource) -> Result<Rc<Instance<E>>> {
        match source {
            InstanceSource::Instantiate(args) => self.instantiate_nested(args),
            InstanceSource::Imported(_) => Err(errors::unsupported("an imported instance's scope slot should already be seeded")),
            InstanceSource::ExportOf { instance_idx, name } => {
                let Forced::Instance(instance) = self.force(Sort::Instance, *instance_idx)? else {
                    return Err(errors::export_sort_mismatch("instance", "something else"));
                };
                match instance.export(name) {
                    Some(ExportValue::Instance(inner)) => Ok(inner.clone()),
                    Some(other) => Err(errors::export_sort_mismatch("instance", export_value_sort_name(other))),
                    None => Err(errors::missing_export(name)),
                }
            }
        }
    }

    fn instantiate_nested(&mut self, args: &ComponentInstantiateArgs) -> Result<Rc<Instance<E>>> {
        let nested = self
            .component
            .nested_components
            .get(args.component_idx as usize)
            .ok_or_else(|| errors::index_out_of_range("component", args.component_idx, self.component.nested_components.len()))?;
        let mut imports = Map::new();
        for (name, sort, idx) in &args.args {
            let forced = self.force(*sort, *idx)?;
            imports.insert(name.clone(), forced_to_import_value(forced)?);
        }
        let instance = run(nested, imports, &mut *self.engine)?;
        Ok(Rc::new(instance))
    }
}

fn run<E: CoreEngine>(component: &Component, imports: Map<String, ImportValue<E>>, engine: &mut E) -> Result<Instance<E>> {
    let handles = Rc::new(RefCell::new(HandleTableSet::new()));
    let mut forcer = Forcer {
        component,
        engine,
        handles: handles.clone(),
        imports,
        cache: core::array::from_fn(|_| Map::new()),
        compiled_modules: Map::new(),
    };
    for decl in &component.imports {
        forcer.seed_import(decl)?;
    }
    let mut exports = Map::new();
    for export in &component.exports {
        let forced = forcer.force(export.sort, export.idx)?;
        exports.insert(export.name.clone(), forced_to_export_value(forced)?);
    }
    log_debug!("instantiated component: {} export(s)", exports.len());
    Ok(Instance { exports, handles })
}

/// Instantiate `component` against host-supplied `imports`, running the
/// three-step algorithm of §4.6: check and type-check every declared
/// import, force every definition the exports transitively reach, and
/// populate the resulting instance's export map. Any failure aborts the
/// whole instantiation — a partial [`Instance`] is never returned.
pub fn instantiate<E: CoreEngine>(component: &Component, imports: Map<String, ImportValue<E>>, engine: &mut E) -> Result<Instance<E>> {
    let result = run(component, imports, engine);
    if let Err(e) = &result {
        log_warn!("instantiation failed: {e}");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical_abi::CanonicalOptions;
    use crate::parser::{CanonLiftDecl, ExportDecl};
    use crate::scope::DefinitionScope;

    struct NoInstance;
    impl CoreInstance for NoInstance {
        fn call(&mut self, _func_name: &str, _args: &[u64]) -> Result<Vec<u64>> {
            Ok(Vec::new())
        }
        fn allocator(&mut self, _memory_name: &str, _realloc_name: &str) -> Result<&mut dyn GuestAllocator> {
            Err(errors::unsupported("no allocator in this fake"))
        }
        fn has_export(&self, _name: &str) -> bool {
            false
        }
    }
    struct NoModule;
    impl crate::host::CompiledModule for NoModule {}
    struct FakeEngine;
    impl CoreEngine for FakeEngine {
        type Module = NoModule;
        type Instance = NoInstance;
        fn compile(&mut self, _bytes: &[u8]) -> Result<Self::Module> {
            Ok(NoModule)
        }
        fn instantiate(&mut self, _module: &Self::Module, _imports: &ImportValues) -> Result<Self::Instance> {
            Ok(NoInstance)
        }
        fn bind_host_func(&mut self, _func: Box<dyn HostFunc>) -> u32 {
            0
        }
    }

    fn empty_component() -> Component {
        Component {
            scope: DefinitionScope::new(),
            core_modules: Vec::new(),
            nested_components: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
        }
    }

    #[test]
    fn missing_import_is_reported_by_name() {
        let mut component = empty_component();
        let idx = component.scope.append(Definition::CoreModule(None));
        component.imports.push(ImportDecl { name: "x".to_string(), desc: ExternDesc::CoreModule, sort: Sort::CoreModule, idx });
        let mut engine = FakeEngine;
        let err = instantiate::<FakeEngine>(&component, Map::new(), &mut engine).unwrap_err();
        assert!(err.to_string().contains("missing import named `x`"));
    }

    #[test]
    fn import_sort_mismatch_names_both_sides() {
        let mut component = empty_component();
        let idx = component.scope.append(Definition::CoreModule(None));
        component.imports.push(ImportDecl { name: "i".to_string(), desc: ExternDesc::CoreModule, sort: Sort::CoreModule, idx });
        let mut imports: Map<String, ImportValue<FakeEngine>> = Map::new();
        imports.insert("i".to_string(), ImportValue::Instance(Map::new()));
        let mut engine = FakeEngine;
        let err = instantiate(&component, imports, &mut engine).unwrap_err();
        assert!(err.to_string().contains("expected module, found instance"));
    }

    #[test]
    fn missing_export_on_a_supplied_instance_import_is_reported() {
        let mut component = empty_component();
        let idx = component.scope.append(Definition::Instance(InstanceSource::Imported(vec![("x".to_string(), ExternDesc::Func { params: vec![], result: None })])));
        component.imports.push(ImportDecl {
            name: "i".to_string(),
            desc: ExternDesc::Instance(vec![("x".to_string(), ExternDesc::Func { params: vec![], result: None })]),
            sort: Sort::Instance,
            idx,
        });
        let mut imports: Map<String, ImportValue<FakeEngine>> = Map::new();
        imports.insert("i".to_string(), ImportValue::Instance(Map::new()));
        let mut engine = FakeEngine;
        let err = instantiate(&component, imports, &mut engine).unwrap_err();
        assert!(err.to_string().contains("missing expected export `x`"));
    }

    #[test]
    fn supplied_host_func_import_is_exported_back_out_under_a_new_name() {
        struct DoubleIt;
        impl ComponentFunc for DoubleIt {
            fn call(&mut self, args: &[Value]) -> Result<Vec<Value>> {
                match args.first() {
                    Some(Value::U32(v)) => Ok(vec![Value::U32(v * 2)]),
                    _ => Err(errors::type_mismatch("expected a u32")),
                }
            }
        }
        let mut component = empty_component();
        let idx = component.scope.append(Definition::Func(FuncSource::Imported(ExternDesc::Func { params: vec![("n".to_string(), ValType::U32)], result: Some(ValType::U32) })));
        component.imports.push(ImportDecl {
            name: "double".to_string(),
            desc: ExternDesc::Func { params: vec![("n".to_string(), ValType::U32)], result: Some(ValType::U32) },
            sort: Sort::Func,
            idx,
        });
        component.exports.push(ExportDecl { name: "double-out".to_string(), sort: Sort::Func, idx });

        let mut imports: Map<String, ImportValue<FakeEngine>> = Map::new();
        imports.insert("double".to_string(), ImportValue::Func(Box::new(DoubleIt)));
        let mut engine = FakeEngine;
        let instance = instantiate(&component, imports, &mut engine).unwrap();
        match instance.export("double-out") {
            Some(ExportValue::Function(f)) => {
                let out = f.invoke(&[Value::U32(21)]).unwrap();
                assert_eq!(out, vec![Value::U32(42)]);
            }
            other => panic!("expected a function export, got {other:?}"),
        }
    }

    #[test]
    fn resource_new_drop_rep_round_trip_through_an_instance() {
        let mut component = empty_component();
        let rt_idx = component.scope.append(Definition::ResourceType(ResourceTypeId::new()));
        let new_idx = component.scope.append(Definition::Func(FuncSource::ResourceNew { resource_type_idx: rt_idx }));
        let rep_idx = component.scope.append(Definition::Func(FuncSource::ResourceRep { resource_type_idx: rt_idx }));
        let drop_idx = component.scope.append(Definition::Func(FuncSource::ResourceDrop { resource_type_idx: rt_idx }));
        component.exports.push(ExportDecl { name: "new".to_string(), sort: Sort::Func, idx: new_idx });
        component.exports.push(ExportDecl { name: "rep".to_string(), sort: Sort::Func, idx: rep_idx });
        component.exports.push(ExportDecl { name: "drop".to_string(), sort: Sort::Func, idx: drop_idx });

        let mut engine = FakeEngine;
        let instance = instantiate::<FakeEngine>(&component, Map::new(), &mut engine).unwrap();
        let Some(ExportValue::Function(new_fn)) = instance.export("new") else { panic!("missing new") };
        let Some(ExportValue::Function(rep_fn)) = instance.export("rep") else { panic!("missing rep") };
        let Some(ExportValue::Function(drop_fn)) = instance.export("drop") else { panic!("missing drop") };

        let handle = new_fn.invoke(&[Value::S32(7)]).unwrap();
        let Value::Own(handle_idx) = handle[0] else { panic!("expected an own handle") };
        let rep = rep_fn.invoke(&[Value::Own(handle_idx)]).unwrap();
        assert_eq!(rep, vec![Value::S32(7)]);
        assert!(drop_fn.invoke(&[Value::Own(handle_idx)]).unwrap().is_empty());
        assert!(rep_fn.invoke(&[Value::Own(handle_idx)]).is_err());
    }

    #[test]
    fn canon_lift_export_calls_through_to_the_core_instance() {
        struct CountingInstance {
            calls: Vec<String>,
        }
        impl CoreInstance for CountingInstance {
            fn call(&mut self, func_name: &str, args: &[u64]) -> Result<Vec<u64>> {
                self.calls.push(func_name.to_string());
                Ok(args.to_vec())
            }
            fn allocator(&mut self, _memory_name: &str, _realloc_name: &str) -> Result<&mut dyn GuestAllocator> {
                Err(errors::unsupported("no memory needed for scalar lift"))
            }
            fn has_export(&self, _name: &str) -> bool {
                false
            }
        }
        struct CountingModule;
        impl crate::host::CompiledModule for CountingModule {}
        struct CountingEngine;
        impl CoreEngine for CountingEngine {
            type Module = CountingModule;
            type Instance = CountingInstance;
            fn compile(&mut self, _bytes: &[u8]) -> Result<Self::Module> {
                Ok(CountingModule)
            }
            fn instantiate(&mut self, _module: &Self::Module, _imports: &ImportValues) -> Result<Self::Instance> {
                Ok(CountingInstance { calls: Vec::new() })
            }
            fn bind_host_func(&mut self, _func: Box<dyn HostFunc>) -> u32 {
                0
            }
        }

        let mut component = empty_component();
        let module_idx = component.core_modules.len() as u32;
        component.core_modules.push(vec![0u8; 4]);
        let module_slot = component.scope.append(Definition::CoreModule(Some(module_idx)));
        let core_instance_slot = component.scope.append(Definition::CoreInstance(CoreInstantiateArgs { module_idx: module_slot, args: Vec::new() }));
        let func_idx = component.scope.append(Definition::Func(FuncSource::Lift(CanonLiftDecl {
            core_instance_idx: core_instance_slot,
            core_func_name: "add-one".to_string(),
            param_types: vec![ValType::U32],
            result_type: Some(ValType::U32),
            options: CanonicalOptions::new(),
        })));
        component.exports.push(ExportDecl { name: "add-one".to_string(), sort: Sort::Func, idx: func_idx });

        let mut engine = CountingEngine;
        let instance = instantiate::<CountingEngine>(&component, Map::new(), &mut engine).unwrap();
        let Some(ExportValue::Function(f)) = instance.export("add-one") else { panic!("missing export") };
        let out = f.invoke(&[Value::U32(5)]).unwrap();
        assert_eq!(out, vec![Value::U32(5)]);
    }
}
