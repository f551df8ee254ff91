//! Binary parser: turns a component binary into an AST of [`Definition`]s
//! recorded in a [`DefinitionScope`], one per nesting level.
//!
//! Section bodies are always decoded from a `bounded_slice` of the whole
//! buffer, so a malformed inner count can never walk past its own
//! section into the next one.
//!
//! A handful of encoding choices here are simplifications the textual
//! encoding left unstated (exact `core instance`/`canon`/alias payload
//! shapes): canonical options name their memory/realloc/post-return
//! core exports directly by string rather than through an intermediate
//! aliased-index indirection, since the host-facing [`crate::host::CoreInstance`]
//! already addresses exports by name. These choices are recorded in
//! this crate's design notes, not re-derived here.

use crate::canonical_abi::{CanonicalOptions, StringEncoding};
use crate::prelude::*;
use crate::resources::ResourceTypeId;
use crate::scope::{CoreExportRef, CoreFuncSource, Definition, DefinitionScope, FuncSource, InstanceSource};
use crate::types::{ValType, VariantCase};
use wrt_format::binary;
use wrt_format::component::{canon_option, name_prefix, section_id, type_discriminant, Sort, PREAMBLE};

/// One parsed component: its own scope, its raw core module bytes, and
/// its fully parsed nested components.
#[derive(Debug)]
pub struct Component {
    pub scope: DefinitionScope,
    pub core_modules: Vec<Vec<u8>>,
    pub nested_components: Vec<Component>,
    pub imports: Vec<ImportDecl>,
    pub exports: Vec<ExportDecl>,
}

impl Component {
    fn new() -> Self {
        Self { scope: DefinitionScope::new(), core_modules: Vec::new(), nested_components: Vec::new(), imports: Vec::new(), exports: Vec::new() }
    }
}

/// A declared import: a name (possibly `name@version`) and the shape of
/// extern it requires.
#[derive(Debug, Clone)]
pub struct ImportDecl {
    pub name: String,
    pub desc: ExternDesc,
    pub sort: Sort,
    pub idx: u32,
}

/// A declared export: a name and which already-defined item it refers to.
#[derive(Debug, Clone)]
pub struct ExportDecl {
    pub name: String,
    pub sort: Sort,
    pub idx: u32,
}

/// The shape of value an import/export slot expects, enough to
/// type-check a supplied value against it.
#[derive(Debug, Clone)]
pub enum ExternDesc {
    CoreModule,
    CoreInstance,
    CoreFunc,
    CoreTable,
    CoreMemory,
    CoreGlobal,
    CoreType,
    Func { params: Vec<(String, ValType)>, result: Option<ValType> },
    Type(ValType),
    Component,
    Instance(Vec<(String, ExternDesc)>),
}

impl ExternDesc {
    #[must_use]
    pub fn sort_name(&self) -> &'static str {
        match self {
            ExternDesc::CoreModule => "module",
            ExternDesc::CoreInstance => "core instance",
            ExternDesc::CoreFunc => "core func",
            ExternDesc::CoreTable => "core table",
            ExternDesc::CoreMemory => "core memory",
            ExternDesc::CoreGlobal => "core global",
            ExternDesc::CoreType => "core type",
            ExternDesc::Func { .. } => "func",
            ExternDesc::Type(_) => "type",
            ExternDesc::Component => "component",
            ExternDesc::Instance(_) => "instance",
        }
    }
}

/// `(core instance $i (instantiate $module (with "module" "field" ...)))`.
#[derive(Debug, Clone)]
pub struct CoreInstantiateArgs {
    pub module_idx: u32,
    pub args: Vec<(String, String, Sort, u32)>,
}

/// `(instance $i (instantiate $component (with "name" ...)))`.
#[derive(Debug, Clone)]
pub struct ComponentInstantiateArgs {
    pub component_idx: u32,
    pub args: Vec<(String, Sort, u32)>,
}

/// A bound `canon lift` definition.
#[derive(Debug, Clone)]
pub struct CanonLiftDecl {
    pub core_instance_idx: u32,
    pub core_func_name: String,
    pub param_types: Vec<ValType>,
    pub result_type: Option<ValType>,
    pub options: CanonicalOptions,
}

/// A bound `canon lower` definition.
#[derive(Debug, Clone)]
pub struct CanonLowerDecl {
    pub func_idx: u32,
    pub param_types: Vec<ValType>,
    pub result_type: Option<ValType>,
    pub options: CanonicalOptions,
}

/// Parse a complete component binary, preamble through final section.
pub fn parse_component(bytes: &[u8]) -> Result<Component> {
    let mut owners: Vec<Component> = Vec::new();
    let result = parse_component_bytes(bytes, &mut owners);
    match &result {
        Ok(component) => log_debug!("parsed component: {} core module(s), {} nested component(s)", component.core_modules.len(), component.nested_components.len()),
        Err(e) => log_warn!("component parse failed: {e}"),
    }
    result
}

fn parse_component_bytes(bytes: &[u8], owners: &mut Vec<Component>) -> Result<Component> {
    if bytes.len() < PREAMBLE.len() || bytes[..PREAMBLE.len()] != PREAMBLE {
        return Err(errors::malformed(codes::INVALID_PREAMBLE, "preamble magic/version/layer mismatch"));
    }
    let mut component = Component::new();
    let mut pos = PREAMBLE.len();
    while pos < bytes.len() {
        let (id, size, body_start) = binary::read_section_header(bytes, pos)?;
        let body = binary::bounded_slice(bytes, body_start, size as usize)?;
        log_trace!("parsing section id={id} size={size}");
        parse_section(id, body, &mut component, owners)?;
        pos = body_start + size as usize;
    }
    Ok(component)
}

fn parse_section(id: u8, body: &[u8], component: &mut Component, owners: &mut Vec<Component>) -> Result<()> {
    match id {
        section_id::CUSTOM => Ok(()),
        section_id::CORE_MODULE => {
            let idx = component.core_modules.len() as u32;
            component.core_modules.push(body.to_vec());
            component.scope.append(Definition::CoreModule(Some(idx)));
            Ok(())
        }
        section_id::CORE_TYPE => {
            let (count, mut pos) = binary::read_leb128_u32(body, 0)?;
            for _ in 0..count {
                // Core function/table/memory/global signatures are opaque
                // to this core; only the declaration count matters for
                // index-space bookkeeping.
                let (_discarded_len, next) = binary::read_leb128_u32(body, pos)?;
                pos = next;
                component.scope.append(Definition::CoreType);
            }
            Ok(())
        }
        section_id::COMPONENT => {
            owners.push(core::mem::replace(component, Component::new()));
            let child = parse_component_bytes(body, owners)?;
            *component = owners.pop().expect("just pushed");
            let idx = component.nested_components.len() as u32;
            component.nested_components.push(child);
            component.scope.append(Definition::Component(Some(idx)));
            Ok(())
        }
        section_id::INSTANCE => parse_instance_section(body, component),
        section_id::ALIAS => parse_alias_section(body, component, owners),
        section_id::TYPE => parse_type_section(body, component),
        section_id::CANON => parse_canon_section(body, component),
        section_id::CORE_INSTANCE => parse_core_instance_section(body, component),
        section_id::START => Ok(()), // reserved, not implemented
        section_id::IMPORT => parse_import_section(body, component),
        section_id::EXPORT => parse_export_section(body, component),
        other => Err(errors::malformed(codes::UNKNOWN_SECTION_ID, format!("unknown section id {other}"))),
    }
}

fn read_name_with_version<'a>(bytes: &'a [u8], pos: usize) -> Result<(String, usize)> {
    let (prefix, pos) = binary::read_u8(bytes, pos)?;
    let (name, pos) = binary::read_name(bytes, pos)?;
    match prefix {
        p if p == name_prefix::PLAIN => Ok((name.to_string(), pos)),
        p if p == name_prefix::VERSIONED => {
            let (version, pos) = binary::read_name(bytes, pos)?;
            Ok((format!("{name}@{version}"), pos))
        }
        other => Err(errors::malformed(codes::UNKNOWN_TYPE_CONSTRUCTOR, format!("unknown name prefix byte {other:#x}"))),
    }
}

fn read_sort(bytes: &[u8], pos: usize) -> Result<(Sort, usize)> {
    let (byte, pos) = binary::read_u8(bytes, pos)?;
    let sort = Sort::from_byte(byte).ok_or_else(|| errors::malformed(codes::UNKNOWN_TYPE_CONSTRUCTOR, format!("unknown sort byte {byte:#x}")))?;
    Ok((sort, pos))
}

// --- type section --------------------------------------------------------

fn parse_type_section(body: &[u8], component: &mut Component) -> Result<()> {
    let (count, mut pos) = binary::read_leb128_u32(body, 0)?;
    for _ in 0..count {
        let (byte, _) = binary::read_u8(body, pos)?;
        if byte == type_discriminant::RESOURCE {
            let (_, mut p) = binary::read_u8(body, pos)?;
            let (rep, next) = binary::read_u8(body, p)?;
            p = next;
            if rep != type_discriminant::S32 {
                return Err(Error::new(ErrorCategory::Abi, codes::UNSUPPORTED_RESOURCE_REPRESENTATION, format!("resource representation {rep:#x} is not i32")));
            }
            let (has_destructor, next) = binary::read_u8(body, p)?;
            p = next;
            if has_destructor != 0 {
                let (_destructor_idx, next) = binary::read_leb128_u32(body, p)?;
                p = next;
            }
            pos = p;
            component.scope.append(Definition::ResourceType(ResourceTypeId::new()));
        } else {
            let (ty, next) = read_valtype(body, pos, &component.scope)?;
            pos = next;
            component.scope.append(Definition::Type(ty));
        }
    }
    Ok(())
}

fn read_valtype(bytes: &[u8], pos: usize, scope: &DefinitionScope) -> Result<(ValType, usize)> {
    let (byte, _) = binary::read_u8(bytes, pos)?;
    if type_discriminant::is_unsupported(byte) {
        return Err(errors::unsupported(&format!("type constructor {byte:#x}")));
    }
    if !type_discriminant::is_constructor(byte) {
        let (idx, next) = binary::read_leb128_u32(bytes, pos)?;
        return match scope.resolve(Sort::Type, idx)? {
            Definition::Type(ty) => Ok((ty.clone(), next)),
            Definition::ResourceType(_) => Err(errors::type_mismatch("type index refers to a resource type, not a value type")),
            _ => Err(errors::type_mismatch("type index does not refer to a value type")),
        };
    }
    use type_discriminant as td;
    match byte {
        b if b == td::BOOL => Ok((ValType::Bool, pos + 1)),
        b if b == td::S8 => Ok((ValType::S8, pos + 1)),
        b if b == td::U8 => Ok((ValType::U8, pos + 1)),
        b if b == td::S16 => Ok((ValType::S16, pos + 1)),
        b if b == td::U16 => Ok((ValType::U16, pos + 1)),
        b if b == td::S32 => Ok((ValType::S32, pos + 1)),
        b if b == td::U32 => Ok((ValType::U32, pos + 1)),
        b if b == td::S64 => Ok((ValType::S64, pos + 1)),
        b if b == td::U64 => Ok((ValType::U64, pos + 1)),
        b if b == td::F32 => Ok((ValType::F32, pos + 1)),
        b if b == td::F64 => Ok((ValType::F64, pos + 1)),
        b if b == td::CHAR => Ok((ValType::Char, pos + 1)),
        b if b == td::STRING => Ok((ValType::String, pos + 1)),
        b if b == td::LIST => {
            let (elem, next) = read_valtype(bytes, pos + 1, scope)?;
            Ok((ValType::List(Box::new(elem)), next))
        }
        b if b == td::OPTION => {
            let (inner, next) = read_valtype(bytes, pos + 1, scope)?;
            Ok((ValType::Option(Box::new(inner)), next))
        }
        b if b == td::OWN || b == td::BORROW => {
            let (idx, next) = binary::read_leb128_u32(bytes, pos + 1)?;
            match scope.resolve(Sort::Type, idx)? {
                Definition::ResourceType(id) => {
                    let id = *id;
                    Ok((if byte == td::OWN { ValType::Own(id) } else { ValType::Borrow(id) }, next))
                }
                _ => Err(errors::type_mismatch("own/borrow index does not refer to a resource type")),
            }
        }
        b if b == td::RECORD => {
            let (count, mut p) = binary::read_leb128_u32(bytes, pos + 1)?;
            let mut fields = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let (name, next) = binary::read_name(bytes, p)?;
                let (ty, next) = read_valtype(bytes, next, scope)?;
                fields.push((name.to_string(), ty));
                p = next;
            }
            Ok((ValType::Record(fields), p))
        }
        b if b == td::TUPLE => {
            let (count, mut p) = binary::read_leb128_u32(bytes, pos + 1)?;
            let mut fields = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let (ty, next) = read_valtype(bytes, p, scope)?;
                fields.push(ty);
                p = next;
            }
            Ok((ValType::Tuple(fields), p))
        }
        b if b == td::VARIANT => {
            let (count, mut p) = binary::read_leb128_u32(bytes, pos + 1)?;
            let mut cases = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let (name, next) = binary::read_name(bytes, p)?;
                let (has_payload, next) = binary::read_u8(bytes, next)?;
                let (ty, next) = if has_payload != 0 { let (t, n) = read_valtype(bytes, next, scope)?; (Some(t), n) } else { (None, next) };
                cases.push(VariantCase { name: name.to_string(), ty });
                p = next;
            }
            Ok((ValType::Variant(cases), p))
        }
        b if b == td::RESULT => {
            let (has_ok, mut p) = binary::read_u8(bytes, pos + 1)?;
            let ok = if has_ok != 0 { let (t, n) = read_valtype(bytes, p, scope)?; p = n; Some(Box::new(t)) } else { None };
            let (has_err, next) = binary::read_u8(bytes, p)?;
            p = next;
            let err = if has_err != 0 { let (t, n) = read_valtype(bytes, p, scope)?; p = n; Some(Box::new(t)) } else { None };
            Ok((ValType::Result(ok, err), p))
        }
        b if b == td::FLAGS => {
            let (count, mut p) = binary::read_leb128_u32(bytes, pos + 1)?;
            let mut labels = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let (name, next) = binary::read_name(bytes, p)?;
                labels.push(name.to_string());
                p = next;
            }
            Ok((ValType::Flags(labels), p))
        }
        b if b == td::ENUM => {
            let (count, mut p) = binary::read_leb128_u32(bytes, pos + 1)?;
            let mut labels = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let (name, next) = binary::read_name(bytes, p)?;
                labels.push(name.to_string());
                p = next;
            }
            Ok((ValType::Enum(labels), p))
        }
        other => Err(errors::malformed(codes::UNKNOWN_TYPE_CONSTRUCTOR, format!("unknown type constructor {other:#x}"))),
    }
}

// --- extern descriptors (import/export shapes) ---------------------------

fn read_extern_desc(bytes: &[u8], pos: usize, scope: &DefinitionScope) -> Result<(ExternDesc, usize)> {
    let (sort, pos) = read_sort(bytes, pos)?;
    match sort {
        Sort::CoreModule => Ok((ExternDesc::CoreModule, pos)),
        Sort::CoreInstance => Ok((ExternDesc::CoreInstance, pos)),
        Sort::CoreFunc => Ok((ExternDesc::CoreFunc, pos)),
        Sort::CoreTable => Ok((ExternDesc::CoreTable, pos)),
        Sort::CoreMemory => Ok((ExternDesc::CoreMemory, pos)),
        Sort::CoreGlobal => Ok((ExternDesc::CoreGlobal, pos)),
        Sort::CoreType => Ok((ExternDesc::CoreType, pos)),
        Sort::Component => Ok((ExternDesc::Component, pos)),
        Sort::Type => {
            let (ty, next) = read_valtype(bytes, pos, scope)?;
            Ok((ExternDesc::Type(ty), next))
        }
        Sort::Func => {
            let (param_count, mut p) = binary::read_leb128_u32(bytes, pos)?;
            let mut params = Vec::with_capacity(param_count as usize);
            for _ in 0..param_count {
                let (name, next) = binary::read_name(bytes, p)?;
                let (ty, next) = read_valtype(bytes, next, scope)?;
                params.push((name.to_string(), ty));
                p = next;
            }
            let (has_result, next) = binary::read_u8(bytes, p)?;
            p = next;
            let result = if has_result != 0 {
                let (ty, next) = read_valtype(bytes, p, scope)?;
                p = next;
                Some(ty)
            } else {
                None
            };
            Ok((ExternDesc::Func { params, result }, p))
        }
        Sort::Instance => {
            let (count, mut p) = binary::read_leb128_u32(bytes, pos)?;
            let mut exports = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let (name, next) = read_name_with_version(bytes, p)?;
                let (desc, next) = read_extern_desc(bytes, next, scope)?;
                exports.push((name, desc));
                p = next;
            }
            Ok((ExternDesc::Instance(exports), p))
        }
    }
}

// --- import / export sections ---------------------------------------------

fn parse_import_section(body: &[u8], component: &mut Component) -> Result<()> {
    let (count, mut pos) = binary::read_leb128_u32(body, 0)?;
    for _ in 0..count {
        let (name, next) = read_name_with_version(body, pos)?;
        let (desc, next) = read_extern_desc(body, next, &component.scope)?;
        pos = next;
        let definition = match &desc {
            ExternDesc::CoreModule => Definition::CoreModule(None),
            ExternDesc::CoreInstance => Definition::CoreInstance(CoreInstantiateArgs { module_idx: u32::MAX, args: Vec::new() }),
            ExternDesc::CoreFunc => Definition::CoreFunc(CoreFuncSource::Export(CoreExportRef { core_instance_idx: u32::MAX, name: String::new() })),
            ExternDesc::CoreTable => Definition::CoreTable(CoreExportRef { core_instance_idx: u32::MAX, name: String::new() }),
            ExternDesc::CoreMemory => Definition::CoreMemory(CoreExportRef { core_instance_idx: u32::MAX, name: String::new() }),
            ExternDesc::CoreGlobal => Definition::CoreGlobal(CoreExportRef { core_instance_idx: u32::MAX, name: String::new() }),
            ExternDesc::CoreType => Definition::CoreType,
            ExternDesc::Type(ty) => Definition::Type(ty.clone()),
            ExternDesc::Component => Definition::Component(None),
            ExternDesc::Func { .. } => Definition::Func(FuncSource::Imported(desc.clone())),
            ExternDesc::Instance(_) => Definition::Instance(InstanceSource::Imported(match &desc {
                ExternDesc::Instance(exports) => exports.clone(),
                _ => unreachable!(),
            })),
        };
        let sort = definition.sort();
        let idx = component.scope.append(definition);
        component.imports.push(ImportDecl { name, desc, sort, idx });
    }
    Ok(())
}

fn parse_export_section(body: &[u8], component: &mut Component) -> Result<()> {
    let (count, mut pos) = binary::read_leb128_u32(body, 0)?;
    for _ in 0..count {
        let (name, next) = read_name_with_version(body, pos)?;
        let (sort, next) = read_sort(body, next)?;
        let (idx, next) = binary::read_leb128_u32(body, next)?;
        pos = next;
        let definition = component.scope.resolve(sort, idx)?.clone();
        component.scope.add_export(&name, definition);
        component.exports.push(ExportDecl { name, sort, idx });
    }
    Ok(())
}

// --- core instance / component instance sections ---------------------------

fn parse_core_instance_section(body: &[u8], component: &mut Component) -> Result<()> {
    let (count, mut pos) = binary::read_leb128_u32(body, 0)?;
    for _ in 0..count {
        let (module_idx, mut p) = binary::read_leb128_u32(body, pos)?;
        let (arg_count, next) = binary::read_leb128_u32(body, p)?;
        p = next;
        let mut args = Vec::with_capacity(arg_count as usize);
        for _ in 0..arg_count {
            let (module_name, next) = binary::read_name(body, p)?;
            let (field_name, next) = binary::read_name(body, next)?;
            let (sort, next) = read_sort(body, next)?;
            let (idx, next) = binary::read_leb128_u32(body, next)?;
            args.push((module_name.to_string(), field_name.to_string(), sort, idx));
            p = next;
        }
        pos = p;
        component.scope.append(Definition::CoreInstance(CoreInstantiateArgs { module_idx, args }));
    }
    Ok(())
}

fn parse_instance_section(body: &[u8], component: &mut Component) -> Result<()> {
    let (count, mut pos) = binary::read_leb128_u32(body, 0)?;
    for _ in 0..count {
        let (component_idx, mut p) = binary::read_leb128_u32(body, pos)?;
        let (arg_count, next) = binary::read_leb128_u32(body, p)?;
        p = next;
        let mut args = Vec::with_capacity(arg_count as usize);
        for _ in 0..arg_count {
            let (name, next) = binary::read_name(body, p)?;
            let (sort, next) = read_sort(body, next)?;
            let (idx, next) = binary::read_leb128_u32(body, next)?;
            args.push((name.to_string(), sort, idx));
            p = next;
        }
        pos = p;
        component.scope.append(Definition::Instance(InstanceSource::Instantiate(ComponentInstantiateArgs { component_idx, args })));
    }
    Ok(())
}

// --- alias section -----------------------------------------------------------

const ALIAS_OUTER: u8 = 0;
const ALIAS_EXPORT: u8 = 1;
const ALIAS_CORE_EXPORT: u8 = 2;

const MAX_ALIAS_CHAIN: u32 = 64;

/// Type/resource-type exports are pure data, so (unlike `Func`/`Instance`
/// export aliases, which need a live instance to dereference) they can be
/// resolved right away: either the target instance is a nested
/// component-instantiate, whose own declared exports are already parsed,
/// or an imported instance, whose declared shape names the type inline.
fn resolve_static_export_type(component: &Component, instance_idx: u32, name: &str, depth: u32) -> Result<Definition> {
    if depth > MAX_ALIAS_CHAIN {
        return Err(errors::unsupported("export alias chain too deep"));
    }
    let instance_def = component.scope.resolve(Sort::Instance, instance_idx)?;
    let Definition::Instance(source) = instance_def else {
        return Err(errors::export_sort_mismatch("instance", instance_def.sort().name()));
    };
    match source {
        InstanceSource::Instantiate(args) => {
            let nested = component
                .nested_components
                .get(args.component_idx as usize)
                .ok_or_else(|| errors::index_out_of_range("component", args.component_idx, component.nested_components.len()))?;
            nested.scope.export_alias(name).map(Clone::clone)
        }
        InstanceSource::Imported(exports) => {
            let (_, desc) = exports.iter().find(|(n, _)| n == name).ok_or_else(|| errors::missing_export(name))?;
            match desc {
                ExternDesc::Type(ty) => Ok(Definition::Type(ty.clone())),
                _ => Err(errors::type_mismatch("export alias expected a type")),
            }
        }
        InstanceSource::ExportOf { instance_idx: inner_idx, name: inner_name } => {
            let inner_idx = *inner_idx;
            let inner_name = inner_name.clone();
            resolve_static_export_type(component, inner_idx, &inner_name, depth + 1)
        }
    }
}

fn parse_alias_section(body: &[u8], component: &mut Component, owners: &mut [Component]) -> Result<()> {
    let (count, mut pos) = binary::read_leb128_u32(body, 0)?;
    for _ in 0..count {
        let (kind, next) = binary::read_u8(body, pos)?;
        pos = match kind {
            k if k == ALIAS_OUTER => {
                let (depth, p) = binary::read_leb128_u32(body, next)?;
                let (sort, p) = read_sort(body, p)?;
                let (idx, p) = binary::read_leb128_u32(body, p)?;
                let target = if depth == 0 {
                    component.scope.resolve(sort, idx)?.clone()
                } else {
                    let owner_pos = owners.len().checked_sub(depth as usize).ok_or_else(|| errors::invalid_outer_alias_count(depth, owners.len() as u32))?;
                    owners[owner_pos].scope.resolve(sort, idx)?.clone()
                };
                component.scope.append(target);
                p
            }
            k if k == ALIAS_EXPORT => {
                let (instance_idx, p) = binary::read_leb128_u32(body, next)?;
                let (sort, p) = read_sort(body, p)?;
                let (name, p) = binary::read_name(body, p)?;
                let definition = match sort {
                    Sort::Func => Definition::Func(FuncSource::ExportOf { instance_idx, name: name.to_string() }),
                    Sort::Instance => Definition::Instance(InstanceSource::ExportOf { instance_idx, name: name.to_string() }),
                    Sort::Type => resolve_static_export_type(component, instance_idx, name, 0)?,
                    other => return Err(errors::unsupported(&format!("export alias of sort {other}"))),
                };
                component.scope.append(definition);
                p
            }
            k if k == ALIAS_CORE_EXPORT => {
                let (core_instance_idx, p) = binary::read_leb128_u32(body, next)?;
                let (sort, p) = read_sort(body, p)?;
                let (name, p) = binary::read_name(body, p)?;
                let reference = CoreExportRef { core_instance_idx, name: name.to_string() };
                let definition = match sort {
                    Sort::CoreFunc => Definition::CoreFunc(CoreFuncSource::Export(reference)),
                    Sort::CoreTable => Definition::CoreTable(reference),
                    Sort::CoreMemory => Definition::CoreMemory(reference),
                    Sort::CoreGlobal => Definition::CoreGlobal(reference),
                    other => return Err(errors::unsupported(&format!("core export alias of sort {other}"))),
                };
                component.scope.append(definition);
                p
            }
            other => return Err(errors::malformed(codes::UNKNOWN_TYPE_CONSTRUCTOR, format!("unknown alias kind {other}"))),
        };
    }
    Ok(())
}

// --- canon section -------------------------------------------------------

fn parse_canon_option_set(bytes: &[u8], pos: usize) -> Result<(CanonicalOptions, usize)> {
    let (count, mut p) = binary::read_leb128_u32(bytes, pos)?;
    let mut options = CanonicalOptions::new();
    for _ in 0..count {
        let (tag, next) = binary::read_u8(bytes, p)?;
        p = match tag {
            t if t == canon_option::STRING_UTF8 => {
                options.string_encoding = StringEncoding::Utf8;
                next
            }
            t if t == canon_option::STRING_UTF16 => {
                options.string_encoding = StringEncoding::Utf16;
                next
            }
            t if t == canon_option::STRING_LATIN1_UTF16 => {
                options.string_encoding = StringEncoding::Latin1OrUtf16;
                next
            }
            t if t == canon_option::MEMORY => {
                let (name, p) = binary::read_name(bytes, next)?;
                options.memory = Some(name.to_string());
                p
            }
            t if t == canon_option::REALLOC => {
                let (name, p) = binary::read_name(bytes, next)?;
                options.realloc = Some(name.to_string());
                p
            }
            t if t == canon_option::POST_RETURN => {
                let (name, p) = binary::read_name(bytes, next)?;
                options.post_return = Some(name.to_string());
                p
            }
            other => return Err(errors::malformed(codes::UNKNOWN_TYPE_CONSTRUCTOR, format!("unknown canon option {other:#x}"))),
        };
    }
    Ok((options, p))
}

const CANON_LIFT: u8 = 0;
const CANON_LOWER: u8 = 1;
const CANON_RESOURCE_NEW: u8 = 2;
const CANON_RESOURCE_DROP: u8 = 3;
const CANON_RESOURCE_REP: u8 = 4;

fn requires_memory(ty: &ValType) -> bool {
    match ty {
        ValType::String | ValType::List(_) => true,
        ValType::Record(fields) => fields.iter().any(|(_, t)| requires_memory(t)),
        ValType::Tuple(fields) => fields.iter().any(requires_memory),
        ValType::Variant(cases) => cases.iter().any(|c| c.ty.as_ref().is_some_and(requires_memory)),
        ValType::Option(inner) => requires_memory(inner),
        ValType::Result(ok, err) => ok.as_deref().is_some_and(requires_memory) || err.as_deref().is_some_and(requires_memory),
        _ => false,
    }
}

fn check_options_complete(param_types: &[ValType], result_type: &Option<ValType>, options: &CanonicalOptions) -> Result<()> {
    let needs_memory = param_types.iter().any(requires_memory) || result_type.as_ref().is_some_and(requires_memory);
    if needs_memory && (options.memory.is_none() || options.realloc.is_none()) {
        return Err(errors::incomplete_canon_options("string/list-bearing signature requires memory and realloc"));
    }
    Ok(())
}

fn parse_canon_section(body: &[u8], component: &mut Component) -> Result<()> {
    let (count, mut pos) = binary::read_leb128_u32(body, 0)?;
    for _ in 0..count {
        let (kind, next) = binary::read_u8(body, pos)?;
        pos = match kind {
            k if k == CANON_LIFT => {
                let (core_instance_idx, p) = binary::read_leb128_u32(body, next)?;
                let (core_func_name, p) = binary::read_name(body, p)?;
                let core_func_name = core_func_name.to_string();
                let (param_count, mut p) = binary::read_leb128_u32(body, p)?;
                let mut param_types = Vec::with_capacity(param_count as usize);
                for _ in 0..param_count {
                    let (ty, next) = read_valtype(body, p, &component.scope)?;
                    param_types.push(ty);
                    p = next;
                }
                let (has_result, next) = binary::read_u8(body, p)?;
                p = next;
                let result_type = if has_result != 0 {
                    let (ty, next) = read_valtype(body, p, &component.scope)?;
                    p = next;
                    Some(ty)
                } else {
                    None
                };
                let (options, p) = parse_canon_option_set(body, p)?;
                check_options_complete(&param_types, &result_type, &options)?;
                component.scope.append(Definition::Func(FuncSource::Lift(CanonLiftDecl { core_instance_idx, core_func_name, param_types, result_type, options })));
                p
            }
            k if k == CANON_LOWER => {
                let (func_idx, p) = binary::read_leb128_u32(body, next)?;
                let (param_count, mut p) = binary::read_leb128_u32(body, p)?;
                let mut param_types = Vec::with_capacity(param_count as usize);
                for _ in 0..param_count {
                    let (ty, next) = read_valtype(body, p, &component.scope)?;
                    param_types.push(ty);
                    p = next;
                }
                let (has_result, next) = binary::read_u8(body, p)?;
                p = next;
                let result_type = if has_result != 0 {
                    let (ty, next) = read_valtype(body, p, &component.scope)?;
                    p = next;
                    Some(ty)
                } else {
                    None
                };
                let (options, p) = parse_canon_option_set(body, p)?;
                check_options_complete(&param_types, &result_type, &options)?;
                // the lowering's behavior lives on the Func sort; the
                // CoreFunc slot callers actually reference just points
                // back at it.
                let lowered_func_idx = component.scope.append(Definition::Func(FuncSource::Lower(CanonLowerDecl { func_idx, param_types, result_type, options })));
                component.scope.append(Definition::CoreFunc(CoreFuncSource::Lowered { func_idx: lowered_func_idx }));
                p
            }
            k if k == CANON_RESOURCE_NEW => {
                let (resource_type_idx, p) = binary::read_leb128_u32(body, next)?;
                component.scope.append(Definition::Func(FuncSource::ResourceNew { resource_type_idx }));
                p
            }
            k if k == CANON_RESOURCE_DROP => {
                let (resource_type_idx, p) = binary::read_leb128_u32(body, next)?;
                component.scope.append(Definition::Func(FuncSource::ResourceDrop { resource_type_idx }));
                p
            }
            k if k == CANON_RESOURCE_REP => {
                let (resource_type_idx, p) = binary::read_leb128_u32(body, next)?;
                component.scope.append(Definition::Func(FuncSource::ResourceRep { resource_type_idx }));
                p
            }
            other => return Err(errors::malformed(codes::UNKNOWN_TYPE_CONSTRUCTOR, format!("unknown canon definition kind {other}"))),
        };
    }
    Ok(())
}

use crate::errors;
