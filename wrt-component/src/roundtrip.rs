//! Test-only re-emitter for the subset of sections the parser accepts.
//!
//! Exists solely to drive the parser round-trip property test: given a
//! [`Component`] that came out of [`crate::parser::parse_component`],
//! re-emit the sections it actually used and compare against the
//! original bytes. Encoding an arbitrary host-built AST back to bytes
//! is not a goal — only what the parser itself already produced needs
//! to round-trip, so only the shapes the test below exercises are
//! implemented (no standalone `(type ...)` section, no resource
//! handles, no nested components).

use crate::parser::{Component, ExternDesc, ImportDecl};
use crate::prelude::*;
use crate::types::ValType;
use wrt_format::binary::{write_leb128_u32, write_name, write_section};
use wrt_format::component::{name_prefix, section_id, type_discriminant as td, Sort, PREAMBLE};

pub(crate) fn emit_component(component: &Component) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&PREAMBLE);
    for module in &component.core_modules {
        out.extend_from_slice(&write_section(section_id::CORE_MODULE, module));
    }
    if !component.imports.is_empty() {
        out.extend_from_slice(&write_section(section_id::IMPORT, &emit_import_section(&component.imports)));
    }
    if !component.exports.is_empty() {
        out.extend_from_slice(&write_section(section_id::EXPORT, &emit_export_section(component)));
    }
    out
}

fn emit_import_section(imports: &[ImportDecl]) -> Vec<u8> {
    let mut body = write_leb128_u32(imports.len() as u32);
    for import in imports {
        body.push(name_prefix::PLAIN);
        body.extend_from_slice(&write_name(&import.name));
        body.extend_from_slice(&emit_extern_desc(&import.desc));
    }
    body
}

fn emit_export_section(component: &Component) -> Vec<u8> {
    let mut body = write_leb128_u32(component.exports.len() as u32);
    for export in &component.exports {
        body.push(name_prefix::PLAIN);
        body.extend_from_slice(&write_name(&export.name));
        body.push(export.sort.slot() as u8);
        body.extend_from_slice(&write_leb128_u32(export.idx));
    }
    body
}

fn emit_sort_byte(sort: Sort) -> u8 {
    sort.slot() as u8
}

fn emit_extern_desc(desc: &ExternDesc) -> Vec<u8> {
    let mut out = Vec::new();
    match desc {
        ExternDesc::CoreModule => out.push(emit_sort_byte(Sort::CoreModule)),
        ExternDesc::CoreInstance => out.push(emit_sort_byte(Sort::CoreInstance)),
        ExternDesc::CoreFunc => out.push(emit_sort_byte(Sort::CoreFunc)),
        ExternDesc::CoreTable => out.push(emit_sort_byte(Sort::CoreTable)),
        ExternDesc::CoreMemory => out.push(emit_sort_byte(Sort::CoreMemory)),
        ExternDesc::CoreGlobal => out.push(emit_sort_byte(Sort::CoreGlobal)),
        ExternDesc::CoreType => out.push(emit_sort_byte(Sort::CoreType)),
        ExternDesc::Component => out.push(emit_sort_byte(Sort::Component)),
        ExternDesc::Type(ty) => {
            out.push(emit_sort_byte(Sort::Type));
            out.extend_from_slice(&emit_valtype(ty));
        }
        ExternDesc::Func { params, result } => {
            out.push(emit_sort_byte(Sort::Func));
            out.extend_from_slice(&write_leb128_u32(params.len() as u32));
            for (name, ty) in params {
                out.extend_from_slice(&write_name(name));
                out.extend_from_slice(&emit_valtype(ty));
            }
            match result {
                Some(ty) => {
                    out.push(1);
                    out.extend_from_slice(&emit_valtype(ty));
                }
                None => out.push(0),
            }
        }
        ExternDesc::Instance(exports) => {
            out.push(emit_sort_byte(Sort::Instance));
            out.extend_from_slice(&write_leb128_u32(exports.len() as u32));
            for (name, desc) in exports {
                out.push(name_prefix::PLAIN);
                out.extend_from_slice(&write_name(name));
                out.extend_from_slice(&emit_extern_desc(desc));
            }
        }
    }
    out
}

fn emit_valtype(ty: &ValType) -> Vec<u8> {
    match ty {
        ValType::Bool => vec![td::BOOL],
        ValType::S8 => vec![td::S8],
        ValType::U8 => vec![td::U8],
        ValType::S16 => vec![td::S16],
        ValType::U16 => vec![td::U16],
        ValType::S32 => vec![td::S32],
        ValType::U32 => vec![td::U32],
        ValType::S64 => vec![td::S64],
        ValType::U64 => vec![td::U64],
        ValType::F32 => vec![td::F32],
        ValType::F64 => vec![td::F64],
        ValType::Char => vec![td::CHAR],
        ValType::String => vec![td::STRING],
        ValType::List(elem) => {
            let mut out = vec![td::LIST];
            out.extend_from_slice(&emit_valtype(elem));
            out
        }
        ValType::Option(inner) => {
            let mut out = vec![td::OPTION];
            out.extend_from_slice(&emit_valtype(inner));
            out
        }
        ValType::Record(fields) => {
            let mut out = vec![td::RECORD];
            out.extend_from_slice(&write_leb128_u32(fields.len() as u32));
            for (name, ty) in fields {
                out.extend_from_slice(&write_name(name));
                out.extend_from_slice(&emit_valtype(ty));
            }
            out
        }
        ValType::Tuple(fields) => {
            let mut out = vec![td::TUPLE];
            out.extend_from_slice(&write_leb128_u32(fields.len() as u32));
            for ty in fields {
                out.extend_from_slice(&emit_valtype(ty));
            }
            out
        }
        ValType::Variant(cases) => {
            let mut out = vec![td::VARIANT];
            out.extend_from_slice(&write_leb128_u32(cases.len() as u32));
            for case in cases {
                out.extend_from_slice(&write_name(&case.name));
                match &case.ty {
                    Some(ty) => {
                        out.push(1);
                        out.extend_from_slice(&emit_valtype(ty));
                    }
                    None => out.push(0),
                }
            }
            out
        }
        ValType::Result(ok, err) => {
            let mut out = vec![td::RESULT];
            match ok {
                Some(ty) => {
                    out.push(1);
                    out.extend_from_slice(&emit_valtype(ty));
                }
                None => out.push(0),
            }
            match err {
                Some(ty) => {
                    out.push(1);
                    out.extend_from_slice(&emit_valtype(ty));
                }
                None => out.push(0),
            }
            out
        }
        ValType::Flags(labels) => {
            let mut out = vec![td::FLAGS];
            out.extend_from_slice(&write_leb128_u32(labels.len() as u32));
            for label in labels {
                out.extend_from_slice(&write_name(label));
            }
            out
        }
        ValType::Enum(labels) => {
            let mut out = vec![td::ENUM];
            out.extend_from_slice(&write_leb128_u32(labels.len() as u32));
            for label in labels {
                out.extend_from_slice(&write_name(label));
            }
            out
        }
        ValType::Own(_) | ValType::Borrow(_) => {
            panic!("round-trip re-emitter does not support resource handle types")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_component;
    use wrt_format::component::section_id as sid;

    fn module_binary(body: &[u8]) -> Vec<u8> {
        let mut bytes = PREAMBLE.to_vec();
        bytes.extend_from_slice(&write_section(sid::CORE_MODULE, body));
        bytes
    }

    #[test]
    fn a_lone_core_module_section_round_trips_byte_identically() {
        let original = module_binary(&[0, 1, 2, 3, 4]);
        let component = parse_component(&original).unwrap();
        assert_eq!(emit_component(&component), original);
    }

    #[test]
    fn import_and_export_sections_round_trip_byte_identically() {
        let mut body = PREAMBLE.to_vec();
        let mut import_body = write_leb128_u32(1);
        import_body.push(name_prefix::PLAIN);
        import_body.extend_from_slice(&write_name("add"));
        import_body.extend_from_slice(&emit_extern_desc(&ExternDesc::Func { params: vec![("a".to_string(), ValType::U32), ("b".to_string(), ValType::U32)], result: Some(ValType::U32) }));
        body.extend_from_slice(&write_section(sid::IMPORT, &import_body));

        let mut export_body = write_leb128_u32(1);
        export_body.push(name_prefix::PLAIN);
        export_body.extend_from_slice(&write_name("add"));
        export_body.push(Sort::Func.slot() as u8);
        export_body.extend_from_slice(&write_leb128_u32(0));
        body.extend_from_slice(&write_section(sid::EXPORT, &export_body));

        let component = parse_component(&body).unwrap();
        assert_eq!(emit_component(&component), body);
    }
}
