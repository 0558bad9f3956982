// Purpose: Accumulate everything one extraction run harvests from its inputs.
// Inputs/Outputs: Filled by the harvester, merged from YAML in incremental mode,
//                 drained by the YAML writer.
// Invariants: Ord on Configuration/ErrorDescriptor/Socket mirrors the dedup sort
//             order of the output document; field order is load-bearing.
// Gotchas: processed_functions spans all inputs of a run, not one translation unit.

use std::collections::{BTreeMap, HashSet};

use crate::registry::TypeId;

/// One reassembled annotation group.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Annotation {
    pub code: u32,
    pub alias: String,
    pub tags: Vec<String>,
    pub return_name: String,
    pub via: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReturnType {
    pub fully_qualified_type: String,
    pub decayed_type: String,
    pub interface_type: TypeId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub fully_qualified_type: String,
    pub decayed_type: String,
    pub direction: Direction,
    pub interface_type: TypeId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    Free,
    Static,
    Member,
}

impl FunctionKind {
    pub fn label(self) -> &'static str {
        match self {
            FunctionKind::Free => "free",
            FunctionKind::Static => "static",
            FunctionKind::Member => "member",
        }
    }
}

/// How to reach an instance of the class a member RPC belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invokee {
    pub expression: String,
    pub is_pointer: bool,
}

/// Meta-data of a function declared as a remote procedure call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcFunction {
    pub kind: FunctionKind,
    pub id: String,
    pub fully_qualified_name: String,
    pub file_name: String,
    pub line: u32,
    pub return_type: ReturnType,
    pub parameters: Vec<Parameter>,
    pub is_noexcept: bool,
    pub qualifiers: Vec<String>,
    pub invokee: Option<Invokee>,
    pub registerable: bool,
    pub annotation: Annotation,
    pub doc_string: String,
}

/// A (type, version) pair; every version of a configuration has an
/// associated type, so the type may change when the version is raised.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TypeRefWithVersion {
    pub ty: TypeId,
    pub version: u32,
}

// Field order is the comparison order used for dedup sorting.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Configuration {
    pub version_types: Vec<TypeRefWithVersion>,
    pub id: String,
    pub set_code: u32,
    pub get_code: u32,
    pub version_code: u32,
    pub tags: Vec<String>,
    pub file_name: String,
    pub line: u32,
}

impl Configuration {
    /// If any of set/get/version is present, fill the missing ones by
    /// counting on from the current maximum, in set, get, version order.
    pub fn backfill_codes(&mut self) {
        let mut max_code = self.set_code.max(self.get_code).max(self.version_code);
        if max_code == 0 {
            return;
        }
        if self.set_code == 0 {
            max_code += 1;
            self.set_code = max_code;
        }
        if self.get_code == 0 {
            max_code += 1;
            self.get_code = max_code;
        }
        if self.version_code == 0 {
            max_code += 1;
            self.version_code = max_code;
        }
    }
}

// Exactly one of `id` (non-empty) or `value` identifies the error.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ErrorDescriptor {
    pub id: String,
    pub value: u32,
    pub description: String,
    pub service_text: String,
    pub user_text: String,
    pub comment: String,
}

#[derive(Clone, Debug)]
pub struct Socket {
    pub packet_type: TypeId,
    pub id: String,
    pub port: u64,
    pub tags: Vec<String>,
    pub file_name: String,
    pub line: u32,
}

impl Socket {
    // The declaration location is not part of the serialized value, so it
    // must not take part in the dedup comparison either; an incremental
    // reload would otherwise never collapse with a re-harvested socket.
    fn value_tuple(&self) -> (TypeId, &str, u64, &[String]) {
        (self.packet_type, &self.id, self.port, &self.tags)
    }
}

impl PartialEq for Socket {
    fn eq(&self, other: &Self) -> bool {
        self.value_tuple() == other.value_tuple()
    }
}

impl Eq for Socket {}

impl PartialOrd for Socket {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Socket {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value_tuple().cmp(&other.value_tuple())
    }
}

#[derive(Default)]
pub struct ParseResult {
    pub processed_functions: HashSet<String>,
    pub rpc_functions: Vec<RpcFunction>,
    pub return_values: BTreeMap<i64, String>,
    pub configurations: Vec<Configuration>,
    pub error_descriptors: Vec<ErrorDescriptor>,
    pub sockets: Vec<Socket>,
}

impl ParseResult {
    pub fn new() -> Self {
        Self::default()
    }
}
