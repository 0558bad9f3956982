// Purpose: Canonical store of interface types keyed by fully-qualified name.
// Inputs/Outputs: Registers/looks up types for the harvester; enumerated by the YAML layer.
// Invariants: Registration is write-once per name; enum/struct hashes derive from the name.
// Gotchas: Container types (arrays, strings, optionals, ...) live in the arena unnamed;
//          only named types participate in lookup and output enumeration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::hash::type_hash;

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileLocation {
    pub file: String,
    pub line: u32,
}

impl FileLocation {
    pub fn is_empty(&self) -> bool {
        self.file.is_empty() && self.line == 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumConstant {
    pub name: String,
    pub value: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructField {
    pub name: String,
    pub ty: TypeId,
}

/// Handle into the registry arena. Allocation order doubles as the
/// deterministic total order used when deduplicated sequences are sorted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub u32);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeKind {
    BuiltIn,
    Enum {
        underlying: TypeId,
        constants: Vec<EnumConstant>,
        hash: u32,
    },
    Struct {
        fields: Vec<StructField>,
        configuration_version: u32,
        hash: u32,
    },
    FixedArray {
        element: TypeId,
        size: i64,
    },
    BoundedArray {
        element: TypeId,
        size_type: TypeId,
        min_size: i64,
        max_size: i64,
    },
    FixedString {
        element: TypeId,
        size: i64,
    },
    BoundedString {
        element: TypeId,
        size_type: TypeId,
        min_size: i64,
        max_size: i64,
    },
    Optional {
        underlying: TypeId,
    },
    Variant {
        underlying: Vec<TypeId>,
    },
    Future {
        underlying: TypeId,
    },
}

impl TypeKind {
    pub fn label(&self) -> &'static str {
        match self {
            TypeKind::BuiltIn => "builtin",
            TypeKind::Enum { .. } => "enum",
            TypeKind::Struct { .. } => "struct",
            TypeKind::FixedArray { .. } => "fixedArray",
            TypeKind::BoundedArray { .. } => "boundedArray",
            TypeKind::FixedString { .. } => "fixedString",
            TypeKind::BoundedString { .. } => "boundedString",
            TypeKind::Optional { .. } => "optional",
            TypeKind::Variant { .. } => "variant",
            TypeKind::Future { .. } => "future",
        }
    }

    pub fn hash(&self) -> u32 {
        match self {
            TypeKind::Enum { hash, .. } | TypeKind::Struct { hash, .. } => *hash,
            _ => 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct InterfaceType {
    pub kind: TypeKind,
    /// Display name: the alias when one is set, otherwise the
    /// fully-qualified name.
    pub id: String,
    pub fully_qualified_name: String,
    pub declaration_location: FileLocation,
    pub exposition_location: FileLocation,
}

impl InterfaceType {
    pub fn unnamed(kind: TypeKind) -> Self {
        InterfaceType {
            kind,
            id: String::new(),
            fully_qualified_name: String::new(),
            declaration_location: FileLocation::default(),
            exposition_location: FileLocation::default(),
        }
    }
}

struct ForwardTypeAlias {
    alias: String,
    exposition: FileLocation,
}

/// Outcome of an alias registration; a displaced mapping means two distinct
/// fully-qualified names received the same alias.
pub struct AliasOutcome {
    pub displaced_fqn: Option<String>,
}

pub struct TypeRegistry {
    types: Vec<InterfaceType>,
    user_defined_in_order: Vec<TypeId>,
    by_name: HashMap<String, TypeId>,
    aliases: HashMap<String, String>,
    forward_aliases: HashMap<String, ForwardTypeAlias>,
}

pub const BUILTIN_NAMES: &[&str] = &[
    "void", "bool", "char", "int8_t", "int16_t", "int32_t", "int64_t", "uint8_t", "uint16_t",
    "uint32_t", "uint64_t", "float", "double", "frem::RpcResult",
];

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut registry = TypeRegistry {
            types: Vec::new(),
            user_defined_in_order: Vec::new(),
            by_name: HashMap::new(),
            aliases: HashMap::new(),
            forward_aliases: HashMap::new(),
        };
        for name in BUILTIN_NAMES {
            registry.register(
                name,
                InterfaceType {
                    kind: TypeKind::BuiltIn,
                    id: name.to_string(),
                    fully_qualified_name: name.to_string(),
                    declaration_location: FileLocation::default(),
                    exposition_location: FileLocation::default(),
                },
            );
            // Make std::intX_t a synonym for intX_t on the interface.
            if name.contains("int") && !name.contains("::") {
                registry.set_internal_alias(name, &format!("std::{}", name));
            }
        }
        registry
    }

    /// Place a type in the arena without naming it. Used for container
    /// shapes that are spelled inline and never looked up.
    pub fn alloc(&mut self, ty: InterfaceType) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    /// Register a type under its fully-qualified name. Registration is
    /// write-once: a second registration of the same name returns the
    /// existing handle unchanged.
    pub fn register(&mut self, fully_qualified_name: &str, mut ty: InterfaceType) -> TypeId {
        if let Some(existing) = self.by_name.get(fully_qualified_name) {
            return *existing;
        }
        match &mut ty.kind {
            TypeKind::Enum { hash, .. } | TypeKind::Struct { hash, .. } => {
                *hash = type_hash(fully_qualified_name);
                if let Some(fwd) = self.forward_aliases.remove(fully_qualified_name) {
                    ty.id = fwd.alias.clone();
                    ty.exposition_location = fwd.exposition;
                    self.aliases
                        .insert(fwd.alias, fully_qualified_name.to_string());
                }
            }
            _ => {}
        }
        let is_builtin = matches!(ty.kind, TypeKind::BuiltIn);
        let id = self.alloc(ty);
        if !is_builtin {
            self.user_defined_in_order.push(id);
        }
        self.by_name.insert(fully_qualified_name.to_string(), id);
        id
    }

    /// Resolve a name to a registered type, going through the alias map
    /// first.
    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        let canonical = self.aliases.get(name).map(|s| s.as_str()).unwrap_or(name);
        self.by_name.get(canonical).copied()
    }

    pub fn get(&self, id: TypeId) -> &InterfaceType {
        &self.types[id.0 as usize]
    }

    /// Expose a registered type under an alias. If the type is not known
    /// yet, the alias is parked and applied on registration.
    pub fn set_alias(
        &mut self,
        fully_qualified_name: &str,
        alias: &str,
        exposition: FileLocation,
    ) -> AliasOutcome {
        let Some(&id) = self.by_name.get(fully_qualified_name) else {
            self.forward_aliases.insert(
                fully_qualified_name.to_string(),
                ForwardTypeAlias {
                    alias: alias.to_string(),
                    exposition,
                },
            );
            return AliasOutcome {
                displaced_fqn: None,
            };
        };

        let ty = &mut self.types[id.0 as usize];
        if !matches!(ty.kind, TypeKind::Enum { .. } | TypeKind::Struct { .. }) {
            return AliasOutcome {
                displaced_fqn: None,
            };
        }
        ty.id = alias.to_string();
        ty.exposition_location = exposition;
        let displaced = self
            .aliases
            .insert(alias.to_string(), fully_qualified_name.to_string())
            .filter(|previous| previous.as_str() != fully_qualified_name);
        AliasOutcome {
            displaced_fqn: displaced,
        }
    }

    /// Install a synonym without touching the display name.
    pub fn set_internal_alias(&mut self, fully_qualified_name: &str, alias: &str) {
        self.aliases
            .insert(alias.to_string(), fully_qualified_name.to_string());
    }

    /// User-defined types in registration order; this is the `types`
    /// sequence of the output document.
    pub fn user_defined(&self) -> &[TypeId] {
        &self.user_defined_in_order
    }
}
