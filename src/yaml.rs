// Purpose: Bidirectional mapping between the in-memory stores and the YAML artifact.
// Inputs/Outputs: Writes the six-section document; reloads it for incremental merge.
// Invariants: Section order is returnValues, types, functions, sockets,
//             configurations, errors; the types sequence is registration order;
//             configurations/errors/sockets are sorted+deduplicated before writing.
// Gotchas: Type references resolve against the registry on load; an unknown id
//          is a load error, not a silent skip.

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use serde_yaml_ng::{Mapping, Number, Value};

use crate::registry::{
    EnumConstant, FileLocation, InterfaceType, StructField, TypeId, TypeKind, TypeRegistry,
};
use crate::result::{
    Annotation, Configuration, Direction, ErrorDescriptor, FunctionKind, Invokee, Parameter,
    ParseResult, ReturnType, RpcFunction, Socket, TypeRefWithVersion,
};

// ----- writing ------------------------------------------------------------

#[derive(Serialize)]
struct ReturnValueEntry<'a> {
    name: &'a str,
    value: i64,
}

pub fn write_document(registry: &TypeRegistry, result: &ParseResult) -> Result<String> {
    let mut root = Mapping::new();

    let mut return_values = Vec::new();
    for (value, name) in &result.return_values {
        let entry = ReturnValueEntry {
            name,
            value: *value,
        };
        return_values.push(serde_yaml_ng::to_value(&entry).context("serialize return value")?);
    }
    root.insert(key("returnValues"), Value::Sequence(return_values));

    let types = registry
        .user_defined()
        .iter()
        .map(|id| type_definition(registry, *id))
        .collect();
    root.insert(key("types"), Value::Sequence(types));

    let functions = result
        .rpc_functions
        .iter()
        .map(|fun| function_entry(registry, fun))
        .collect();
    root.insert(key("functions"), Value::Sequence(functions));

    let mut sockets = result.sockets.clone();
    sockets.sort();
    sockets.dedup();
    root.insert(
        key("sockets"),
        Value::Sequence(sockets.iter().map(|s| socket_entry(registry, s)).collect()),
    );

    let mut configurations = result.configurations.clone();
    configurations.sort();
    configurations.dedup();
    root.insert(
        key("configurations"),
        Value::Sequence(
            configurations
                .iter()
                .map(|c| configuration_entry(registry, c))
                .collect(),
        ),
    );

    let mut errors = result.error_descriptors.clone();
    errors.sort();
    errors.dedup();
    root.insert(
        key("errors"),
        Value::Sequence(errors.iter().map(error_entry).collect()),
    );

    serde_yaml_ng::to_string(&Value::Mapping(root)).context("serialize output document")
}

fn key(name: &str) -> Value {
    Value::String(name.to_string())
}

fn text(value: &str) -> Value {
    Value::String(value.to_string())
}

fn int(value: i64) -> Value {
    Value::Number(Number::from(value))
}

fn uint(value: u64) -> Value {
    Value::Number(Number::from(value))
}

fn hex32(value: u32) -> Value {
    Value::String(format!("0x{:08X}", value))
}

/// A type reference embedded in a function, field or declarator: named
/// kinds shrink to their id, container kinds expand inline.
fn type_ref(registry: &TypeRegistry, id: TypeId) -> Value {
    let ty = registry.get(id);
    let mut map = Mapping::new();
    map.insert(key("kind"), text(ty.kind.label()));
    match &ty.kind {
        TypeKind::BuiltIn | TypeKind::Enum { .. } | TypeKind::Struct { .. } => {
            map.insert(key("id"), text(&ty.id));
        }
        TypeKind::FixedArray { element, size } => {
            map.insert(key("elementType"), type_ref(registry, *element));
            map.insert(key("size"), int(*size));
        }
        TypeKind::BoundedArray {
            element,
            size_type,
            min_size,
            max_size,
        } => {
            map.insert(key("elementType"), type_ref(registry, *element));
            map.insert(key("sizeType"), type_ref(registry, *size_type));
            map.insert(key("minSize"), int(*min_size));
            map.insert(key("maxSize"), int(*max_size));
        }
        TypeKind::FixedString { element, size } => {
            map.insert(key("charType"), type_ref(registry, *element));
            map.insert(key("size"), int(*size));
        }
        TypeKind::BoundedString {
            element,
            size_type,
            min_size,
            max_size,
        } => {
            map.insert(key("charType"), type_ref(registry, *element));
            map.insert(key("sizeType"), type_ref(registry, *size_type));
            map.insert(key("minSize"), int(*min_size));
            map.insert(key("maxSize"), int(*max_size));
        }
        TypeKind::Optional { underlying } | TypeKind::Future { underlying } => {
            map.insert(key("underlyingType"), type_ref(registry, *underlying));
        }
        TypeKind::Variant { underlying } => {
            map.insert(
                key("underlyingTypes"),
                Value::Sequence(
                    underlying
                        .iter()
                        .map(|arm| type_ref(registry, *arm))
                        .collect(),
                ),
            );
        }
    }
    Value::Mapping(map)
}

fn location_value(loc: &FileLocation) -> Value {
    let mut map = Mapping::new();
    map.insert(key("file"), text(&loc.file));
    map.insert(key("line"), uint(loc.line as u64));
    Value::Mapping(map)
}

/// Full form of a user-defined type in the `types` sequence.
fn type_definition(registry: &TypeRegistry, id: TypeId) -> Value {
    let ty = registry.get(id);
    let mut map = Mapping::new();
    map.insert(key("kind"), text(ty.kind.label()));
    map.insert(key("id"), text(&ty.id));
    map.insert(key("code"), hex32(ty.kind.hash()));
    match &ty.kind {
        TypeKind::Enum {
            underlying,
            constants,
            ..
        } => {
            map.insert(key("underlyingType"), type_ref(registry, *underlying));
            let constants = constants
                .iter()
                .map(|c| {
                    let mut entry = Mapping::new();
                    entry.insert(key("name"), text(&c.name));
                    entry.insert(key("value"), int(c.value));
                    Value::Mapping(entry)
                })
                .collect();
            map.insert(key("constants"), Value::Sequence(constants));
        }
        TypeKind::Struct {
            fields,
            configuration_version,
            ..
        } => {
            let fields = fields
                .iter()
                .map(|f| {
                    let mut entry = Mapping::new();
                    entry.insert(key("name"), text(&f.name));
                    entry.insert(key("type"), type_ref(registry, f.ty));
                    Value::Mapping(entry)
                })
                .collect();
            map.insert(key("fields"), Value::Sequence(fields));
            if *configuration_version != 0 {
                map.insert(
                    key("configurationVersion"),
                    uint(*configuration_version as u64),
                );
            }
        }
        _ => {}
    }
    map.insert(key("fullyQualifiedName"), text(&ty.fully_qualified_name));
    if !ty.declaration_location.is_empty() {
        map.insert(key("declaredAt"), location_value(&ty.declaration_location));
    }
    if !ty.exposition_location.is_empty() {
        map.insert(key("exposedAt"), location_value(&ty.exposition_location));
    }
    Value::Mapping(map)
}

fn return_type_value(registry: &TypeRegistry, ret: &ReturnType) -> Value {
    let mut map = Mapping::new();
    map.insert(key("type"), type_ref(registry, ret.interface_type));
    map.insert(key("fullyQualifiedType"), text(&ret.fully_qualified_type));
    map.insert(key("decayedType"), text(&ret.decayed_type));
    Value::Mapping(map)
}

fn parameter_value(registry: &TypeRegistry, param: &Parameter) -> Value {
    let mut map = Mapping::new();
    map.insert(key("name"), text(&param.name));
    map.insert(key("direction"), text(param.direction.label()));
    map.insert(key("type"), type_ref(registry, param.interface_type));
    map.insert(key("fullyQualifiedType"), text(&param.fully_qualified_type));
    map.insert(key("decayedType"), text(&param.decayed_type));
    Value::Mapping(map)
}

fn string_sequence(items: &[String]) -> Value {
    Value::Sequence(items.iter().map(|s| text(s)).collect())
}

fn function_entry(registry: &TypeRegistry, fun: &RpcFunction) -> Value {
    let mut map = Mapping::new();
    map.insert(key("id"), text(&fun.id));
    map.insert(key("code"), hex32(fun.annotation.code));
    if !fun.annotation.via.is_empty() {
        map.insert(key("via"), text(&fun.annotation.via));
    }
    map.insert(key("return"), return_type_value(registry, &fun.return_type));
    map.insert(
        key("parameters"),
        Value::Sequence(
            fun.parameters
                .iter()
                .map(|p| parameter_value(registry, p))
                .collect(),
        ),
    );
    map.insert(key("doc"), text(&fun.doc_string));
    map.insert(key("tags"), string_sequence(&fun.annotation.tags));
    if !fun.annotation.return_name.is_empty() {
        map.insert(key("returnName"), text(&fun.annotation.return_name));
    }
    map.insert(key("kind"), text(fun.kind.label()));
    map.insert(key("fullyQualifiedName"), text(&fun.fully_qualified_name));
    map.insert(key("file"), text(&fun.file_name));
    map.insert(key("line"), uint(fun.line as u64));
    map.insert(key("noexcept"), Value::Bool(fun.is_noexcept));
    if !fun.qualifiers.is_empty() {
        map.insert(key("qualifiers"), string_sequence(&fun.qualifiers));
    }
    if fun.kind == FunctionKind::Member {
        if let Some(invokee) = &fun.invokee {
            let mut instance = Mapping::new();
            instance.insert(key("getter"), text(&invokee.expression));
            instance.insert(key("pointer"), Value::Bool(invokee.is_pointer));
            map.insert(key("instance"), Value::Mapping(instance));
        }
    }
    if fun.registerable {
        map.insert(key("registerable"), Value::Bool(true));
    }

    let params = fun
        .parameters
        .iter()
        .map(|p| p.fully_qualified_type.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let signature = format!(
        "{} {}({})",
        fun.return_type.fully_qualified_type, fun.fully_qualified_name, params
    );
    map.insert(key("signature"), text(&signature));

    Value::Mapping(map)
}

fn socket_entry(registry: &TypeRegistry, socket: &Socket) -> Value {
    let mut map = Mapping::new();
    map.insert(key("id"), text(&socket.id));
    map.insert(key("port"), uint(socket.port));
    map.insert(key("packetType"), type_ref(registry, socket.packet_type));
    if !socket.tags.is_empty() {
        map.insert(key("tags"), string_sequence(&socket.tags));
    }
    Value::Mapping(map)
}

fn configuration_entry(registry: &TypeRegistry, config: &Configuration) -> Value {
    let mut map = Mapping::new();
    map.insert(key("id"), text(&config.id));
    map.insert(
        key("versionTypes"),
        Value::Sequence(
            config
                .version_types
                .iter()
                .map(|vt| {
                    let mut entry = Mapping::new();
                    entry.insert(key("version"), uint(vt.version as u64));
                    entry.insert(key("type"), type_ref(registry, vt.ty));
                    Value::Mapping(entry)
                })
                .collect(),
        ),
    );
    if config.set_code != 0 {
        map.insert(key("setCode"), hex32(config.set_code));
    }
    if config.get_code != 0 {
        map.insert(key("getCode"), hex32(config.get_code));
    }
    if config.version_code != 0 {
        map.insert(key("versionCode"), hex32(config.version_code));
    }
    map.insert(key("tags"), string_sequence(&config.tags));
    map.insert(key("file"), text(&config.file_name));
    map.insert(key("line"), uint(config.line as u64));
    Value::Mapping(map)
}

fn error_entry(err: &ErrorDescriptor) -> Value {
    let mut map = Mapping::new();
    if !err.id.is_empty() {
        map.insert(key("id"), text(&err.id));
    } else {
        map.insert(key("value"), hex32(err.value));
    }
    map.insert(key("description"), text(&err.description));
    if !err.service_text.is_empty() {
        map.insert(key("serviceText"), text(&err.service_text));
    }
    if !err.user_text.is_empty() {
        map.insert(key("userText"), text(&err.user_text));
    }
    if !err.comment.is_empty() {
        map.insert(key("comment"), text(&err.comment));
    }
    Value::Mapping(map)
}

// ----- loading ------------------------------------------------------------

/// Load a previously written document back into the registry and result
/// store (incremental mode).
pub fn load_document(
    text: &str,
    registry: &mut TypeRegistry,
    result: &mut ParseResult,
) -> Result<()> {
    let root: Value = serde_yaml_ng::from_str(text).context("parse output document")?;
    let root = root
        .as_mapping()
        .ok_or_else(|| anyhow!("expected a mapping at the document root"))?;

    for entry in expect_sequence(root, "returnValues")? {
        let map = expect_mapping(entry)?;
        let name = expect_str(map, "name")?.to_string();
        let value = expect_i64(map, "value")?;
        result.return_values.insert(value, name);
    }

    for entry in expect_sequence(root, "types")? {
        load_type_definition(expect_mapping(entry)?, registry)?;
    }

    for entry in expect_sequence(root, "functions")? {
        let function = load_function(expect_mapping(entry)?, registry)?;
        result
            .processed_functions
            .insert(function.fully_qualified_name.clone());
        result.rpc_functions.push(function);
    }

    for entry in expect_sequence(root, "sockets")? {
        let map = expect_mapping(entry)?;
        result.sockets.push(Socket {
            packet_type: load_type_ref(get(map, "packetType").ok_or_else(|| {
                anyhow!("socket entry is missing `packetType`")
            })?, registry)?,
            id: expect_str(map, "id")?.to_string(),
            port: expect_i64(map, "port")? as u64,
            tags: load_string_list(map, "tags")?,
            file_name: String::new(),
            line: 0,
        });
    }
    result.sockets.sort();
    result.sockets.dedup();

    for entry in expect_sequence(root, "configurations")? {
        let map = expect_mapping(entry)?;
        let mut version_types = Vec::new();
        for vt in expect_sequence(map, "versionTypes")? {
            let vt = expect_mapping(vt)?;
            version_types.push(TypeRefWithVersion {
                ty: load_type_ref(
                    get(vt, "type")
                        .ok_or_else(|| anyhow!("version type entry is missing `type`"))?,
                    registry,
                )?,
                version: expect_i64(vt, "version")? as u32,
            });
        }
        result.configurations.push(Configuration {
            version_types,
            id: expect_str(map, "id")?.to_string(),
            set_code: opt_hex32(map, "setCode")?.unwrap_or(0),
            get_code: opt_hex32(map, "getCode")?.unwrap_or(0),
            version_code: opt_hex32(map, "versionCode")?.unwrap_or(0),
            tags: load_string_list(map, "tags")?,
            file_name: opt_str(map, "file").unwrap_or_default(),
            line: opt_i64(map, "line").unwrap_or(0) as u32,
        });
    }
    result.configurations.sort();
    result.configurations.dedup();

    for entry in expect_sequence(root, "errors")? {
        let map = expect_mapping(entry)?;
        result.error_descriptors.push(ErrorDescriptor {
            id: opt_str(map, "id").unwrap_or_default(),
            value: opt_hex32(map, "value")?.unwrap_or(0),
            description: expect_str(map, "description")?.to_string(),
            service_text: opt_str(map, "serviceText").unwrap_or_default(),
            user_text: opt_str(map, "userText").unwrap_or_default(),
            comment: opt_str(map, "comment").unwrap_or_default(),
        });
    }
    result.error_descriptors.sort();
    result.error_descriptors.dedup();

    Ok(())
}

fn load_type_definition(map: &Mapping, registry: &mut TypeRegistry) -> Result<()> {
    let kind = expect_str(map, "kind")?;
    let id = expect_str(map, "id")?.to_string();
    let fqn = expect_str(map, "fullyQualifiedName")?.to_string();

    let kind = match kind {
        "enum" => {
            let underlying = load_type_ref(
                get(map, "underlyingType")
                    .ok_or_else(|| anyhow!("enum `{}` is missing `underlyingType`", fqn))?,
                registry,
            )?;
            let mut constants = Vec::new();
            for constant in expect_sequence(map, "constants")? {
                let constant = expect_mapping(constant)?;
                constants.push(EnumConstant {
                    name: expect_str(constant, "name")?.to_string(),
                    value: expect_i64(constant, "value")?,
                });
            }
            TypeKind::Enum {
                underlying,
                constants,
                hash: 0,
            }
        }
        "struct" => {
            let mut fields = Vec::new();
            for field in expect_sequence(map, "fields")? {
                let field = expect_mapping(field)?;
                fields.push(StructField {
                    name: expect_str(field, "name")?.to_string(),
                    ty: load_type_ref(
                        get(field, "type")
                            .ok_or_else(|| anyhow!("field entry is missing `type`"))?,
                        registry,
                    )?,
                });
            }
            TypeKind::Struct {
                fields,
                configuration_version: opt_i64(map, "configurationVersion").unwrap_or(0) as u32,
                hash: 0,
            }
        }
        other => bail!("unexpected type kind `{}` in types section", other),
    };

    let declaration_location = load_location(map, "declaredAt");
    let exposition_location = load_location(map, "exposedAt");

    registry.register(
        &fqn,
        InterfaceType {
            kind,
            id: id.clone(),
            fully_qualified_name: fqn.clone(),
            declaration_location,
            exposition_location: exposition_location.clone(),
        },
    );
    if id != fqn {
        registry.set_alias(&fqn, &id, exposition_location);
    }
    Ok(())
}

fn load_location(map: &Mapping, name: &str) -> FileLocation {
    let Some(value) = get(map, name).and_then(Value::as_mapping) else {
        return FileLocation::default();
    };
    FileLocation {
        file: opt_str(value, "file").unwrap_or_default(),
        line: opt_i64(value, "line").unwrap_or(0) as u32,
    }
}

fn load_type_ref(value: &Value, registry: &mut TypeRegistry) -> Result<TypeId> {
    let map = expect_mapping(value)?;
    let kind = expect_str(map, "kind")?;
    match kind {
        "builtin" | "enum" | "struct" => {
            let id = expect_str(map, "id")?;
            registry
                .lookup(id)
                .ok_or_else(|| anyhow!("unknown type '{}'", id))
        }
        "fixedArray" => {
            let element = load_type_ref(
                get(map, "elementType")
                    .ok_or_else(|| anyhow!("fixedArray reference is missing `elementType`"))?,
                registry,
            )?;
            let size = expect_i64(map, "size")?;
            Ok(registry.alloc(InterfaceType::unnamed(TypeKind::FixedArray {
                element,
                size,
            })))
        }
        "boundedArray" | "boundedString" => {
            let element_key = if kind == "boundedArray" {
                "elementType"
            } else {
                "charType"
            };
            let element = load_type_ref(
                get(map, element_key)
                    .ok_or_else(|| anyhow!("{} reference is missing `{}`", kind, element_key))?,
                registry,
            )?;
            let size_type = load_type_ref(
                get(map, "sizeType")
                    .ok_or_else(|| anyhow!("{} reference is missing `sizeType`", kind))?,
                registry,
            )?;
            let min_size = expect_i64(map, "minSize")?;
            let max_size = expect_i64(map, "maxSize")?;
            let ty = if kind == "boundedArray" {
                TypeKind::BoundedArray {
                    element,
                    size_type,
                    min_size,
                    max_size,
                }
            } else {
                TypeKind::BoundedString {
                    element,
                    size_type,
                    min_size,
                    max_size,
                }
            };
            Ok(registry.alloc(InterfaceType::unnamed(ty)))
        }
        "fixedString" => {
            let element = load_type_ref(
                get(map, "charType")
                    .ok_or_else(|| anyhow!("fixedString reference is missing `charType`"))?,
                registry,
            )?;
            let size = expect_i64(map, "size")?;
            Ok(registry.alloc(InterfaceType::unnamed(TypeKind::FixedString {
                element,
                size,
            })))
        }
        "optional" | "future" => {
            let underlying = load_type_ref(
                get(map, "underlyingType")
                    .ok_or_else(|| anyhow!("{} reference is missing `underlyingType`", kind))?,
                registry,
            )?;
            let ty = if kind == "optional" {
                TypeKind::Optional { underlying }
            } else {
                TypeKind::Future { underlying }
            };
            Ok(registry.alloc(InterfaceType::unnamed(ty)))
        }
        "variant" => {
            let mut underlying = Vec::new();
            for arm in get(map, "underlyingTypes")
                .and_then(Value::as_sequence)
                .ok_or_else(|| anyhow!("variant reference is missing `underlyingTypes`"))?
            {
                underlying.push(load_type_ref(arm, registry)?);
            }
            Ok(registry.alloc(InterfaceType::unnamed(TypeKind::Variant { underlying })))
        }
        other => bail!("unexpected type reference kind `{}`", other),
    }
}

fn load_function(map: &Mapping, registry: &mut TypeRegistry) -> Result<RpcFunction> {
    let kind = match expect_str(map, "kind")? {
        "free" => FunctionKind::Free,
        "static" => FunctionKind::Static,
        "member" => FunctionKind::Member,
        other => bail!("unexpected function kind `{}`", other),
    };

    let ret_map = get(map, "return")
        .and_then(Value::as_mapping)
        .ok_or_else(|| anyhow!("function entry is missing `return`"))?;
    let return_type = ReturnType {
        fully_qualified_type: expect_str(ret_map, "fullyQualifiedType")?.to_string(),
        decayed_type: expect_str(ret_map, "decayedType")?.to_string(),
        interface_type: load_type_ref(
            get(ret_map, "type").ok_or_else(|| anyhow!("return entry is missing `type`"))?,
            registry,
        )?,
    };

    let mut parameters = Vec::new();
    for param in expect_sequence(map, "parameters")? {
        let param = expect_mapping(param)?;
        parameters.push(Parameter {
            name: expect_str(param, "name")?.to_string(),
            fully_qualified_type: expect_str(param, "fullyQualifiedType")?.to_string(),
            decayed_type: expect_str(param, "decayedType")?.to_string(),
            direction: match expect_str(param, "direction")? {
                "out" => Direction::Out,
                _ => Direction::In,
            },
            interface_type: load_type_ref(
                get(param, "type").ok_or_else(|| anyhow!("parameter entry is missing `type`"))?,
                registry,
            )?,
        });
    }

    let invokee = get(map, "instance").and_then(Value::as_mapping).map(|inst| {
        Invokee {
            expression: opt_str(inst, "getter").unwrap_or_default(),
            is_pointer: get(inst, "pointer").and_then(Value::as_bool).unwrap_or(false),
        }
    });

    Ok(RpcFunction {
        kind,
        id: expect_str(map, "id")?.to_string(),
        fully_qualified_name: expect_str(map, "fullyQualifiedName")?.to_string(),
        file_name: opt_str(map, "file").unwrap_or_default(),
        line: opt_i64(map, "line").unwrap_or(0) as u32,
        return_type,
        parameters,
        is_noexcept: get(map, "noexcept").and_then(Value::as_bool).unwrap_or(false),
        qualifiers: load_string_list(map, "qualifiers")?,
        invokee,
        registerable: get(map, "registerable")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        annotation: Annotation {
            code: opt_hex32(map, "code")?.unwrap_or(0),
            alias: opt_str(map, "id").unwrap_or_default(),
            tags: load_string_list(map, "tags")?,
            return_name: opt_str(map, "returnName").unwrap_or_default(),
            via: opt_str(map, "via").unwrap_or_default(),
        },
        doc_string: opt_str(map, "doc").unwrap_or_default(),
    })
}

// ----- value helpers ------------------------------------------------------

fn get<'v>(map: &'v Mapping, name: &str) -> Option<&'v Value> {
    map.get(name)
}

fn expect_mapping(value: &Value) -> Result<&Mapping> {
    value
        .as_mapping()
        .ok_or_else(|| anyhow!("expected a mapping"))
}

fn expect_sequence<'v>(map: &'v Mapping, name: &str) -> Result<&'v Vec<Value>> {
    get(map, name)
        .and_then(Value::as_sequence)
        .ok_or_else(|| anyhow!("missing sequence `{}`", name))
}

fn expect_str<'v>(map: &'v Mapping, name: &str) -> Result<&'v str> {
    get(map, name)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("missing string `{}`", name))
}

fn opt_str(map: &Mapping, name: &str) -> Option<String> {
    get(map, name).and_then(Value::as_str).map(str::to_string)
}

fn expect_i64(map: &Mapping, name: &str) -> Result<i64> {
    get(map, name)
        .and_then(Value::as_i64)
        .ok_or_else(|| anyhow!("missing integer `{}`", name))
}

fn opt_i64(map: &Mapping, name: &str) -> Option<i64> {
    get(map, name).and_then(Value::as_i64)
}

/// Hex quantities are written as `0x%08X` strings but load from plain
/// integers as well.
fn opt_hex32(map: &Mapping, name: &str) -> Result<Option<u32>> {
    let Some(value) = get(map, name) else {
        return Ok(None);
    };
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(|v| Some(v as u32))
            .ok_or_else(|| anyhow!("`{}` is not an unsigned integer", name)),
        Value::String(s) => {
            let digits = s
                .strip_prefix("0x")
                .or_else(|| s.strip_prefix("0X"))
                .unwrap_or(s);
            u32::from_str_radix(digits, 16)
                .map(Some)
                .map_err(|_| anyhow!("`{}` is not a hex quantity: {}", name, s))
        }
        _ => bail!("`{}` is neither integer nor hex string", name),
    }
}

fn load_string_list(map: &Mapping, name: &str) -> Result<Vec<String>> {
    let Some(value) = get(map, name) else {
        return Ok(Vec::new());
    };
    let seq = value
        .as_sequence()
        .ok_or_else(|| anyhow!("`{}` is not a sequence", name))?;
    let mut out = Vec::new();
    for item in seq {
        out.push(
            item.as_str()
                .ok_or_else(|| anyhow!("`{}` contains a non-string entry", name))?
                .to_string(),
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_context() -> (TypeRegistry, ParseResult) {
        let mut registry = TypeRegistry::new();
        let bool_id = registry.lookup("bool").unwrap();
        let u16_id = registry.lookup("uint16_t").unwrap();
        let i32_id = registry.lookup("int32_t").unwrap();

        let mut packet = InterfaceType::unnamed(TypeKind::Struct {
            fields: vec![
                StructField {
                    name: "a".into(),
                    ty: bool_id,
                },
                StructField {
                    name: "b".into(),
                    ty: u16_id,
                },
            ],
            configuration_version: 0,
            hash: 0,
        });
        packet.id = "B::A".into();
        packet.fully_qualified_name = "B::A".into();
        packet.declaration_location = FileLocation {
            file: "demo.hpp".into(),
            line: 4,
        };
        let packet_id = registry.register("B::A", packet);

        let mut color = InterfaceType::unnamed(TypeKind::Enum {
            underlying: registry.lookup("uint8_t").unwrap(),
            constants: vec![
                EnumConstant {
                    name: "Red".into(),
                    value: 0,
                },
                EnumConstant {
                    name: "Green".into(),
                    value: 5,
                },
            ],
            hash: 0,
        });
        color.id = "Color".into();
        color.fully_qualified_name = "Color".into();
        let _ = registry.register("Color", color);

        let bounded = registry.alloc(InterfaceType::unnamed(TypeKind::BoundedArray {
            element: i32_id,
            size_type: u16_id,
            min_size: 2,
            max_size: 8,
        }));

        let mut result = ParseResult::new();
        result.return_values.insert(0, "Success".into());
        result.return_values.insert(-256, "ServiceNotAvailable".into());

        result.rpc_functions.push(RpcFunction {
            kind: FunctionKind::Member,
            id: "Foo".into(),
            fully_qualified_name: "Runlevel::Manager::demo".into(),
            file_name: "demo.hpp".into(),
            line: 12,
            return_type: ReturnType {
                fully_qualified_type: "bool".into(),
                decayed_type: "bool".into(),
                interface_type: bool_id,
            },
            parameters: vec![
                Parameter {
                    name: "input".into(),
                    fully_qualified_type: "const B::A&".into(),
                    decayed_type: "B::A".into(),
                    direction: Direction::In,
                    interface_type: packet_id,
                },
                Parameter {
                    name: "values".into(),
                    fully_qualified_type: "frem::BoundedArray<int32_t, 2, 8>".into(),
                    decayed_type: "frem::BoundedArray<int32_t, 2, 8>".into(),
                    direction: Direction::Out,
                    interface_type: bounded,
                },
            ],
            is_noexcept: true,
            qualifiers: vec!["const".into()],
            invokee: Some(Invokee {
                expression: "Runlevel::Manager::m_fremSelf.load()".into(),
                is_pointer: true,
            }),
            registerable: false,
            annotation: Annotation {
                code: 0x1234,
                alias: "Foo".into(),
                tags: vec!["motor".into()],
                return_name: String::new(),
                via: String::new(),
            },
            doc_string: "/// Frobnicates.".into(),
        });

        result.configurations.push(Configuration {
            version_types: vec![TypeRefWithVersion {
                ty: packet_id,
                version: 0,
            }],
            id: "cfg".into(),
            set_code: 10,
            get_code: 11,
            version_code: 12,
            tags: vec!["x".into(), "y".into()],
            file_name: "demo.hpp".into(),
            line: 20,
        });

        result.sockets.push(Socket {
            packet_type: packet_id,
            id: "telemetry".into(),
            port: 4711,
            tags: Vec::new(),
            file_name: "demo.hpp".into(),
            line: 30,
        });

        result.error_descriptors.push(ErrorDescriptor {
            id: "E_TIMEOUT".into(),
            value: 0,
            description: "operation timed out".into(),
            service_text: String::new(),
            user_text: String::new(),
            comment: String::new(),
        });
        result.error_descriptors.push(ErrorDescriptor {
            id: String::new(),
            value: 0x80001001,
            description: "raw failure".into(),
            service_text: "svc".into(),
            user_text: String::new(),
            comment: String::new(),
        });

        (registry, result)
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let (registry, result) = sample_context();
        let yaml = write_document(&registry, &result).unwrap();
        let positions: Vec<usize> = [
            "returnValues:",
            "types:",
            "functions:",
            "sockets:",
            "configurations:",
            "errors:",
        ]
        .iter()
        .map(|section| yaml.find(section).expect(section))
        .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }

    #[test]
    fn hex_quantities_are_eight_digit_hex() {
        let (registry, result) = sample_context();
        let yaml = write_document(&registry, &result).unwrap();
        assert!(yaml.contains("0x00001234"));
        assert!(yaml.contains("0x0000000A"));
        assert!(yaml.contains("0x80001001"));
    }

    #[test]
    fn member_functions_carry_instance_and_signature() {
        let (registry, result) = sample_context();
        let yaml = write_document(&registry, &result).unwrap();
        assert!(yaml.contains("getter: Runlevel::Manager::m_fremSelf.load()"));
        assert!(yaml.contains("pointer: true"));
        assert!(yaml.contains(
            "signature: bool Runlevel::Manager::demo(const B::A&, frem::BoundedArray<int32_t, 2, 8>)"
        ));
    }

    #[test]
    fn round_trip_preserves_the_store() {
        let (registry, result) = sample_context();
        let yaml = write_document(&registry, &result).unwrap();

        let mut registry2 = TypeRegistry::new();
        let mut result2 = ParseResult::new();
        load_document(&yaml, &mut registry2, &mut result2).unwrap();

        let yaml2 = write_document(&registry2, &result2).unwrap();
        assert_eq!(yaml, yaml2);

        assert_eq!(result2.return_values.len(), 2);
        assert_eq!(result2.rpc_functions.len(), 1);
        assert_eq!(result2.configurations.len(), 1);
        assert_eq!(result2.sockets.len(), 1);
        assert_eq!(result2.error_descriptors.len(), 2);
        assert!(result2
            .processed_functions
            .contains("Runlevel::Manager::demo"));
        // Struct hashes are recomputed from the name on registration.
        let packet = registry2.get(registry2.lookup("B::A").unwrap());
        assert_eq!(packet.kind.hash(), crate::hash::type_hash("B::A"));
    }

    #[test]
    fn loading_twice_is_idempotent_for_deduplicated_sections() {
        let (registry, result) = sample_context();
        let yaml = write_document(&registry, &result).unwrap();

        let mut registry2 = TypeRegistry::new();
        let mut result2 = ParseResult::new();
        load_document(&yaml, &mut registry2, &mut result2).unwrap();
        load_document(&yaml, &mut registry2, &mut result2).unwrap();

        assert_eq!(result2.configurations.len(), 1);
        assert_eq!(result2.sockets.len(), 1);
        assert_eq!(result2.error_descriptors.len(), 2);
        assert_eq!(registry2.user_defined().len(), 2);
    }

    #[test]
    fn unknown_type_reference_is_a_load_error() {
        let yaml = "\
returnValues: []
types: []
functions:
  - id: f
    code: 0x00000001
    return:
      type: {kind: struct, id: Vanished}
      fullyQualifiedType: Vanished
      decayedType: Vanished
    parameters: []
    doc: ''
    tags: []
    kind: free
    fullyQualifiedName: f
    file: x.hpp
    line: 1
    noexcept: false
    signature: Vanished f()
sockets: []
configurations: []
errors: []
";
        let mut registry = TypeRegistry::new();
        let mut result = ParseResult::new();
        let err = load_document(yaml, &mut registry, &mut result).unwrap_err();
        assert!(err.to_string().contains("unknown type 'Vanished'"));
    }

    #[test]
    fn missing_section_is_a_load_error() {
        let mut registry = TypeRegistry::new();
        let mut result = ParseResult::new();
        let err = load_document("returnValues: []\n", &mut registry, &mut result).unwrap_err();
        assert!(err.to_string().contains("missing sequence `types`"));
    }

    #[test]
    fn dedup_sorts_by_the_canonical_tuple_order() {
        let registry = TypeRegistry::new();
        let mut result = ParseResult::new();
        for name in ["zeta", "alpha", "zeta"] {
            result.error_descriptors.push(ErrorDescriptor {
                id: name.into(),
                description: "d".into(),
                ..Default::default()
            });
        }
        let yaml = write_document(&registry, &result).unwrap();
        let alpha = yaml.find("alpha").unwrap();
        let zeta = yaml.find("zeta").unwrap();
        assert!(alpha < zeta);
        assert_eq!(yaml.matches("zeta").count(), 1);
    }
}
