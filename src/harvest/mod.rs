// Purpose: Walk the parsed declaration tree and harvest interface facts.
// Inputs/Outputs: Consumes one rewritten/parsed unit; fills the type registry and
//                 the parse result store; reports through the diagnostics channel.
// Invariants: Annotation fragments are visited before the declaration they
//             annotate (the rewriter injects them ahead of it).
// Gotchas: Annotation groups live only for the duration of one unit; the
//          registry and result store persist across all inputs of a run.

mod resolve;

use std::collections::HashMap;

use crate::frontend::ast::*;
use crate::frontend::diagnostic::{Diagnostics, SourceMap};
use crate::frontend::rewrite::{AnnotationOrigin, RPC_ATTR_PREFIX};
use crate::frontend::suggest;
use crate::registry::{FileLocation, TypeId, TypeKind, TypeRegistry};
use crate::result::{
    Annotation, Configuration, Direction, ErrorDescriptor, FunctionKind, Invokee, Parameter,
    ParseResult, ReturnType, RpcFunction, Socket, TypeRefWithVersion,
};

const ANNOTATION_KINDS: &[&str] = &["Code", "Alias", "Tags", "Via", "ReturnName"];
const CONFIG_ARG_KINDS: &[&str] = &["SetCode", "GetCode", "VersionCode", "Tags"];

// User declarations of these names inside top-level std get a warning.
const WATCHED_STD_RECORDS: &[&str] = &["threadex", "thread_accessor"];
const WATCHED_STD_FUNCTIONS: &[&str] = &[
    "clear_signals",
    "current_stack_usage",
    "get_priority",
    "max_stack_usage",
    "set_priority",
    "sleep_for_busy",
    "try_wait_for_all_signals",
    "try_wait_for_all_signals_for",
    "try_wait_for_all_signals_until",
    "try_wait_for_any_signal",
    "try_wait_for_any_signal_for",
    "try_wait_for_any_signal_until",
    "wait_for_all_signals",
];

#[derive(Clone, Copy)]
pub(crate) enum IndexedDecl<'a> {
    Record(&'a RecordDecl),
    Enum(&'a EnumDecl),
}

struct IndexEntry<'a> {
    decl: IndexedDecl<'a>,
    // Enclosing (non-inline) namespace/record path of the declaration.
    scope: Vec<String>,
}

#[derive(Default)]
struct DeclIndex<'a> {
    entries: HashMap<String, IndexEntry<'a>>,
}

impl<'a> DeclIndex<'a> {
    fn build(unit: &'a SourceUnit) -> Self {
        let mut index = DeclIndex::default();
        let mut scope = Vec::new();
        index.add_decls(&unit.decls, &mut scope);
        index
    }

    fn add_decls(&mut self, decls: &'a [Decl], scope: &mut Vec<String>) {
        for decl in decls {
            match decl {
                Decl::Namespace(ns) => {
                    // Inline-namespace components do not appear in
                    // fully-qualified names.
                    if ns.is_inline || ns.name.is_empty() {
                        self.add_decls(&ns.decls, scope);
                    } else {
                        scope.push(ns.name.clone());
                        self.add_decls(&ns.decls, scope);
                        scope.pop();
                    }
                }
                Decl::Record(rec) => {
                    self.insert(scope, rec.name.clone(), IndexedDecl::Record(rec));
                    scope.push(rec.name.clone());
                    self.add_decls(&rec.members, scope);
                    scope.pop();
                }
                Decl::Enum(en) => {
                    self.insert(scope, en.name.clone(), IndexedDecl::Enum(en));
                }
                _ => {}
            }
        }
    }

    fn insert(&mut self, scope: &[String], name: String, decl: IndexedDecl<'a>) {
        let fqn = if scope.is_empty() {
            name
        } else {
            format!("{}::{}", scope.join("::"), name)
        };
        match self.entries.get(&fqn) {
            // A definition wins over an earlier forward declaration.
            Some(existing) => {
                let existing_defined = match existing.decl {
                    IndexedDecl::Record(r) => r.has_definition,
                    IndexedDecl::Enum(_) => true,
                };
                let new_defined = match decl {
                    IndexedDecl::Record(r) => r.has_definition,
                    IndexedDecl::Enum(_) => true,
                };
                if existing_defined || !new_defined {
                    return;
                }
            }
            None => {}
        }
        self.entries.insert(
            fqn,
            IndexEntry {
                decl,
                scope: scope.to_vec(),
            },
        );
    }

    fn get(&self, fqn: &str) -> Option<&IndexEntry<'a>> {
        self.entries.get(fqn)
    }
}

pub struct Harvester<'a> {
    pub(crate) registry: &'a mut TypeRegistry,
    pub(crate) result: &'a mut ParseResult,
    pub(crate) diags: &'a mut Diagnostics,
    pub(crate) sources: &'a SourceMap,
    origins: &'a HashMap<String, AnnotationOrigin>,
    index: DeclIndex<'a>,
    annotations: HashMap<u32, Annotation>,
    write_rpcs: bool,
}

/// Harvest one translation unit into the registry and the result store.
/// `write_rpcs` is false for type-only sources, which suppress RPC output
/// but still register everything else.
#[allow(clippy::too_many_arguments)]
pub fn harvest_unit<'a>(
    unit: &'a SourceUnit,
    origins: &'a HashMap<String, AnnotationOrigin>,
    registry: &'a mut TypeRegistry,
    result: &'a mut ParseResult,
    diags: &'a mut Diagnostics,
    sources: &'a SourceMap,
    write_rpcs: bool,
) {
    let mut harvester = Harvester {
        registry,
        result,
        diags,
        sources,
        origins,
        index: DeclIndex::build(unit),
        annotations: HashMap::new(),
        write_rpcs,
    };
    let mut scope = Vec::new();
    harvester.visit_decls(&unit.decls, &mut scope);
}

impl<'a> Harvester<'a> {
    pub(crate) fn file_location(&self, span: Span) -> FileLocation {
        FileLocation {
            file: self.sources.name(span.file).to_string(),
            line: span.line as u32,
        }
    }

    fn visit_decls(&mut self, decls: &'a [Decl], scope: &mut Vec<String>) {
        for decl in decls {
            match decl {
                Decl::Namespace(ns) => {
                    if ns.is_inline || ns.name.is_empty() {
                        self.visit_decls(&ns.decls, scope);
                    } else {
                        scope.push(ns.name.clone());
                        self.visit_decls(&ns.decls, scope);
                        scope.pop();
                    }
                }
                Decl::Record(rec) => self.visit_record(rec, scope),
                Decl::Var(var) => self.visit_var(var, scope),
                Decl::Function(fun) => self.visit_function(fun, scope, None),
                Decl::Enum(_) => {}
            }
        }
    }

    fn visit_record(&mut self, rec: &'a RecordDecl, scope: &mut Vec<String>) {
        if scope.len() == 1 && scope[0] == "std" && WATCHED_STD_RECORDS.contains(&rec.name.as_str())
        {
            self.diags.warning(
                "declaration of user-defined record in std namespace",
                Some(rec.span),
            );
        }

        let record_fqn = if scope.is_empty() {
            rec.name.clone()
        } else {
            format!("{}::{}", scope.join("::"), rec.name)
        };

        scope.push(rec.name.clone());
        for member in &rec.members {
            match member {
                Decl::Var(var) => self.visit_var(var, scope),
                Decl::Function(fun) => {
                    self.visit_function(fun, scope, Some((rec, record_fqn.as_str())))
                }
                Decl::Record(nested) => self.visit_record(nested, scope),
                _ => {}
            }
        }
        scope.pop();
    }

    // ----- variable declarations ----------------------------------------

    fn visit_var(&mut self, var: &VarDecl, scope: &[String]) {
        if let Some(origin) = self.origins.get(&var.name).copied() {
            self.handle_annotation_fragment(var, origin);
            return;
        }
        // The sizeof-forcing synthetic and other deduced declarations carry
        // no harvestable type.
        if var.ty.last_name() == "auto" {
            return;
        }

        let (declared_fqn, _) = self.resolve_type_name(&var.ty, scope);

        if var.init.len() == 1 {
            if declared_fqn == "frem::RpcResultDecl" {
                if let Some(value) = var.init[0].as_int() {
                    self.register_return_value(value, &var.name);
                }
                return;
            }
            if self.matches_family(&var.ty, scope, "frem", "TypeAlias") {
                self.handle_type_alias(var, scope);
                return;
            }
        }

        if var.init.len() >= 2
            && (declared_fqn == "nsp::DiagnosticDescriptor" || declared_fqn == "nsp::ErrorDescriptor")
        {
            self.handle_error_descriptor(var);
            return;
        }

        if self.matches_family(&var.ty, scope, "frem", "ConfigurationDeclarator") {
            self.handle_configuration(var, scope);
            return;
        }

        if self.matches_family(&var.ty, scope, "frem", "DatagramSocketDeclarator") {
            self.handle_socket(var, scope);
        }
    }

    fn handle_annotation_fragment(&mut self, var: &VarDecl, origin: AnnotationOrigin) {
        let span = origin.span;
        let mut annotation = self
            .annotations
            .get(&origin.group)
            .cloned()
            .unwrap_or_default();

        match var.ty.last_name() {
            "Code" => {
                if var.init.len() != 1 {
                    self.diags.error("expected an argument", Some(span));
                    return;
                }
                let Some(code) = var.init[0].as_int() else {
                    self.diags.error("expected an integer", Some(span));
                    return;
                };
                annotation.code = code as u32;
            }
            "Alias" => {
                let Some(text) = self.single_string_argument(var, span) else {
                    return;
                };
                annotation.alias = text;
            }
            "Via" => {
                let Some(text) = self.single_string_argument(var, span) else {
                    return;
                };
                annotation.via = text;
            }
            "ReturnName" => {
                let Some(text) = self.single_string_argument(var, span) else {
                    return;
                };
                annotation.return_name = text;
            }
            "Tags" => {
                let Some(tags) = self.collect_tags(&var.init, span) else {
                    return;
                };
                annotation.tags = tags;
            }
            other => {
                let mut message = format!("unknown annotation kind `{}`", other);
                if let Some(hint) = suggest::did_you_mean(other, ANNOTATION_KINDS) {
                    message.push_str("; ");
                    message.push_str(&hint);
                }
                self.diags.error(message, Some(span));
                return;
            }
        }
        self.annotations.insert(origin.group, annotation);
    }

    fn single_string_argument(&mut self, var: &VarDecl, span: Span) -> Option<String> {
        if var.init.len() != 1 {
            self.diags.error("expected an argument", Some(span));
            return None;
        }
        match var.init[0].as_str() {
            Some(text) => Some(text.to_string()),
            None => {
                self.diags.error("expected a string literal", Some(span));
                None
            }
        }
    }

    fn collect_tags(&mut self, args: &[InitArg], span: Span) -> Option<Vec<String>> {
        if args.is_empty() {
            self.diags.error("expected an argument", Some(span));
            return None;
        }
        let mut tags = Vec::new();
        for arg in args {
            match arg.as_str() {
                Some(text) => tags.push(text.to_string()),
                None => {
                    self.diags.error("expected a string literal", Some(span));
                    return None;
                }
            }
        }
        Some(tags)
    }

    fn register_return_value(&mut self, value: i64, identifier: &str) {
        self.result
            .return_values
            .insert(value, identifier.to_string());
    }

    fn handle_type_alias(&mut self, var: &VarDecl, scope: &[String]) {
        let [TemplateArg::Type(original)] = var.ty.template_args() else {
            return;
        };
        let original = original.clone();
        let Some(alias) = var.init[0].as_str().map(str::to_string) else {
            self.diags
                .error("alias name must be a string", Some(var.span));
            return;
        };

        let mut stack = Vec::new();
        if self
            .register_type(var.span, &original, scope, &mut stack)
            .is_none()
        {
            return;
        }
        let (fqn, _) = self.resolve_type_name(&original, scope);
        let exposition = self.file_location(var.span);
        let outcome = self.registry.set_alias(&fqn, &alias, exposition);
        if let Some(displaced) = outcome.displaced_fqn {
            self.diags.warning(
                format!(
                    "alias `{}` now refers to `{}` and no longer to `{}`",
                    alias, fqn, displaced
                ),
                Some(var.span),
            );
        }
    }

    fn handle_error_descriptor(&mut self, var: &VarDecl) {
        let mut desc = ErrorDescriptor::default();

        match &var.init[0] {
            InitArg::Str(id, _) => desc.id = id.clone(),
            InitArg::Int(value, _) => desc.value = *value as u32,
            other => {
                self.diags
                    .error("id must be integer or string literal", Some(other.span()));
                return;
            }
        }

        match var.init[1].as_str() {
            Some(text) => desc.description = text.to_string(),
            None => {
                self.diags
                    .error("description must be a string", Some(var.init[1].span()));
                return;
            }
        }

        if let Some(text) = var.init.get(2).and_then(InitArg::as_str) {
            desc.service_text = text.to_string();
        }
        if let Some(text) = var.init.get(3).and_then(InitArg::as_str) {
            desc.user_text = text.to_string();
        }
        if let Some(text) = var.init.get(4).and_then(InitArg::as_str) {
            desc.comment = text.to_string();
        }

        self.result.error_descriptors.push(desc);
    }

    fn handle_configuration(&mut self, var: &VarDecl, scope: &[String]) {
        let mut config = Configuration {
            version_types: Vec::new(),
            id: String::new(),
            set_code: 0,
            get_code: 0,
            version_code: 0,
            tags: Vec::new(),
            file_name: self.sources.name(var.span.file).to_string(),
            line: var.span.line as u32,
        };

        for arg in var.ty.template_args().to_vec() {
            let TemplateArg::Type(arg_ty) = arg else {
                continue;
            };
            let mut stack = Vec::new();
            if let Some(id) = self.register_type(var.span, &arg_ty, scope, &mut stack) {
                let version = match &self.registry.get(id).kind {
                    TypeKind::Struct {
                        configuration_version,
                        ..
                    } => *configuration_version,
                    _ => 0,
                };
                config
                    .version_types
                    .push(TypeRefWithVersion { ty: id, version });
            }
        }

        match var.init.first().and_then(InitArg::as_str) {
            Some(id) => config.id = id.to_string(),
            None => {
                let span = var.init.first().map(|a| a.span()).unwrap_or(var.span);
                self.diags.error("alias must be a string", Some(span));
                return;
            }
        }

        // A configuration id is registered only once.
        if self
            .result
            .configurations
            .iter()
            .any(|existing| existing.id == config.id)
        {
            return;
        }

        for arg in &var.init[1..] {
            let InitArg::Call { name, args, span } = arg else {
                continue;
            };
            match name.as_str() {
                "SetCode" => {
                    if let Some(value) = args.first().and_then(InitArg::as_int) {
                        config.set_code = value as u32;
                    }
                }
                "GetCode" => {
                    if let Some(value) = args.first().and_then(InitArg::as_int) {
                        config.get_code = value as u32;
                    }
                }
                "VersionCode" => {
                    if let Some(value) = args.first().and_then(InitArg::as_int) {
                        config.version_code = value as u32;
                    }
                }
                "Tags" if !args.is_empty() => {
                    if let Some(tags) = self.collect_tags(args, *span) {
                        config.tags = tags;
                    }
                }
                other => {
                    let mut message = format!("unknown configuration argument `{}`", other);
                    if let Some(hint) = suggest::did_you_mean(other, CONFIG_ARG_KINDS) {
                        message.push_str("; ");
                        message.push_str(&hint);
                    }
                    self.diags.warning(message, Some(*span));
                }
            }
        }

        config.backfill_codes();
        self.result.configurations.push(config);
    }

    fn handle_socket(&mut self, var: &VarDecl, scope: &[String]) {
        let mut packet_type = None;
        for arg in var.ty.template_args().to_vec() {
            let TemplateArg::Type(arg_ty) = arg else {
                continue;
            };
            let mut stack = Vec::new();
            if let Some(id) = self.register_type(var.span, &arg_ty, scope, &mut stack) {
                packet_type = Some(id);
            }
        }
        let Some(packet_type) = packet_type else {
            return;
        };

        let port = match var.init.get(1).and_then(InitArg::as_int) {
            Some(value) => value as u64,
            None => {
                let span = var.init.get(1).map(|a| a.span()).unwrap_or(var.span);
                self.diags
                    .error("port must be an integer literal", Some(span));
                return;
            }
        };

        let id = match var.init.first().and_then(InitArg::as_str) {
            Some(text) => text.to_string(),
            None => {
                let span = var.init.first().map(|a| a.span()).unwrap_or(var.span);
                self.diags.error("id must be a string", Some(span));
                return;
            }
        };

        let mut socket = Socket {
            packet_type,
            id,
            port,
            tags: Vec::new(),
            file_name: self.sources.name(var.span.file).to_string(),
            line: var.span.line as u32,
        };

        for arg in var.init.iter().skip(2) {
            let InitArg::Call { name, args, span } = arg else {
                continue;
            };
            if name == "Tags" && !args.is_empty() {
                if let Some(tags) = self.collect_tags(args, *span) {
                    socket.tags = tags;
                }
            }
        }

        self.result.sockets.push(socket);
    }

    // ----- function declarations ----------------------------------------

    fn visit_function(
        &mut self,
        fun: &FunctionDecl,
        scope: &[String],
        record: Option<(&'a RecordDecl, &str)>,
    ) {
        if scope.len() == 1
            && scope[0] == "std"
            && WATCHED_STD_FUNCTIONS.contains(&fun.name.as_str())
        {
            self.diags.warning(
                "declaration of user-defined function in std namespace",
                Some(fun.span),
            );
        }

        // Members of a class template carry no concrete type information;
        // only instantiations are handled.
        if fun.is_template || record.map(|(rec, _)| rec.is_template).unwrap_or(false) {
            return;
        }

        let mut annotation = None;
        for (payload, attr_span) in &fun.annotations {
            let Some(group_text) = payload.strip_prefix(RPC_ATTR_PREFIX) else {
                continue;
            };
            // Only consider the function if it lives in the same file as
            // the annotation.
            if attr_span.file != fun.span.file {
                continue;
            }
            let Ok(group) = group_text.trim().parse::<u32>() else {
                continue;
            };
            match self.annotations.get(&group) {
                Some(found) => annotation = Some(found.clone()),
                None => {
                    self.diags.error("missing annotation", Some(fun.span));
                    return;
                }
            }
            break;
        }
        let Some(annotation) = annotation else {
            return;
        };

        let mut function = RpcFunction {
            kind: FunctionKind::Free,
            id: String::new(),
            fully_qualified_name: String::new(),
            file_name: self.sources.name(fun.span.file).to_string(),
            line: fun.span.line as u32,
            return_type: ReturnType {
                fully_qualified_type: String::new(),
                decayed_type: String::new(),
                interface_type: TypeId(0),
            },
            parameters: Vec::new(),
            is_noexcept: fun.is_noexcept,
            qualifiers: Vec::new(),
            invokee: None,
            registerable: false,
            annotation,
            doc_string: fun.doc.clone().unwrap_or_default(),
        };

        if let Some((rec, record_fqn)) = record {
            function.fully_qualified_name = format!("{}::{}", record_fqn, fun.name);
            if fun.is_static {
                function.kind = FunctionKind::Static;
            } else {
                function.kind = FunctionKind::Member;
                match self.find_instance_getter(rec, record_fqn, scope) {
                    Some(invokee) => {
                        function.invokee = Some(invokee);
                        if fun.is_const {
                            function.qualifiers.push("const".to_string());
                        }
                    }
                    None => {
                        self.diags
                            .error("class has no instance getter", Some(rec.span));
                        return;
                    }
                }
            }
        } else {
            function.kind = FunctionKind::Free;
            function.fully_qualified_name = if scope.is_empty() {
                fun.name.clone()
            } else {
                format!("{}::{}", scope.join("::"), fun.name)
            };
        }

        if self
            .result
            .processed_functions
            .contains(&function.fully_qualified_name)
        {
            return;
        }
        self.result
            .processed_functions
            .insert(function.fully_qualified_name.clone());

        let Some(return_type) = self.get_return_type(fun.span, &fun.ret, scope) else {
            return;
        };
        function.return_type = return_type;

        for param in &fun.params {
            let Some(mut parameter) = self.get_parameter(param.span, &param.ty, scope) else {
                return;
            };
            parameter.name = param.name.clone();
            function.parameters.push(parameter);
        }

        function.id = if function.annotation.alias.is_empty() {
            function.fully_qualified_name.clone()
        } else {
            function.annotation.alias.clone()
        };

        if self.write_rpcs {
            self.result.rpc_functions.push(function);
        }
    }

    fn get_return_type(
        &mut self,
        span: Span,
        ty: &TypeExpr,
        scope: &[String],
    ) -> Option<ReturnType> {
        let fully_qualified_type = ty.written_name();
        let decayed = ty.decayed();
        let decayed_type = decayed.written_name();

        let mut stack = Vec::new();
        let Some(interface_type) = self.register_type(span, &decayed, scope, &mut stack) else {
            self.diags
                .error("return type is not serializable", Some(span));
            return None;
        };

        Some(ReturnType {
            fully_qualified_type,
            decayed_type,
            interface_type,
        })
    }

    fn get_parameter(
        &mut self,
        span: Span,
        ty: &TypeExpr,
        scope: &[String],
    ) -> Option<Parameter> {
        let fully_qualified_type = ty.written_name();
        let direction = if ty.ref_kind == RefKind::LValue && !ty.is_const {
            Direction::Out
        } else {
            Direction::In
        };
        if ty.pointer_depth > 0 {
            self.diags
                .error("cannot serialize a pointer type", Some(span));
            return None;
        }

        let decayed = ty.decayed();
        let decayed_type = decayed.written_name();

        let mut stack = Vec::new();
        let Some(interface_type) = self.register_type(span, &decayed, scope, &mut stack) else {
            self.diags.note("from this parameter", Some(span));
            return None;
        };

        Some(Parameter {
            name: String::new(),
            fully_qualified_type,
            decayed_type,
            direction,
            interface_type,
        })
    }

    /// How to reach an instance of the class: the published self pointer of
    /// the service base, or any parameterless static member returning a
    /// reference or pointer to the class itself.
    fn find_instance_getter(
        &mut self,
        rec: &RecordDecl,
        record_fqn: &str,
        scope: &[String],
    ) -> Option<Invokee> {
        for base in &rec.bases {
            if self.matches_family(base, scope, "frem", "RpcService") {
                return Some(Invokee {
                    expression: format!("{}::m_fremSelf.load()", record_fqn),
                    is_pointer: true,
                });
            }
        }

        for method in rec.methods() {
            if !method.is_static {
                continue;
            }
            if method.params.iter().any(|p| !p.has_default) {
                continue;
            }
            let ret = &method.ret;
            let is_pointer = match (ret.ref_kind, ret.pointer_depth) {
                (RefKind::LValue, 0) => false,
                (RefKind::None, 1) => true,
                _ => continue,
            };
            let (ret_fqn, _) = self.resolve_type_name(ret, scope);
            if ret_fqn == record_fqn {
                return Some(Invokee {
                    expression: format!("{}::{}()", record_fqn, method.name),
                    is_pointer,
                });
            }
        }

        None
    }

    // ----- name resolution ----------------------------------------------

    /// Resolve a spelled type to its fully-qualified name by searching the
    /// enclosing scopes from the inside out. Falls back to the canonical
    /// spelling for names the index does not know (builtins and friends).
    pub(crate) fn resolve_type_name(
        &self,
        ty: &TypeExpr,
        scope: &[String],
    ) -> (String, Option<(IndexedDecl<'a>, Vec<String>)>) {
        let canonical = ty.canonical_name();
        if ty.rooted {
            if let Some(entry) = self.index.get(&canonical) {
                return (canonical, Some((entry.decl, entry.scope.clone())));
            }
            return (canonical, None);
        }
        for depth in (0..=scope.len()).rev() {
            let candidate = if depth == 0 {
                canonical.clone()
            } else {
                format!("{}::{}", scope[..depth].join("::"), canonical)
            };
            if let Some(entry) = self.index.get(&candidate) {
                return (candidate, Some((entry.decl, entry.scope.clone())));
            }
        }
        (canonical, None)
    }

    /// Resolve the primary template declaration for an instantiated name
    /// (the spelled name minus its template arguments).
    pub(crate) fn resolve_primary_template(
        &self,
        ty: &TypeExpr,
        scope: &[String],
    ) -> Option<(&'a RecordDecl, Vec<String>)> {
        let base_name = ty
            .segments
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join("::");
        for depth in (0..=scope.len()).rev() {
            let candidate = if depth == 0 {
                base_name.clone()
            } else {
                format!("{}::{}", scope[..depth].join("::"), base_name)
            };
            if let Some(entry) = self.index.get(&candidate) {
                if let IndexedDecl::Record(rec) = entry.decl {
                    if rec.has_definition {
                        return Some((rec, entry.scope.clone()));
                    }
                }
            }
        }
        None
    }

    /// A recognized template family is a name in a recognized namespace:
    /// spelled with the namespace qualifier, or spelled bare inside that
    /// namespace.
    pub(crate) fn matches_family(
        &self,
        ty: &TypeExpr,
        scope: &[String],
        family_ns: &str,
        family_name: &str,
    ) -> bool {
        if ty.last_name() != family_name {
            return false;
        }
        let qualifier = ty.qualifier();
        if qualifier == family_ns {
            return true;
        }
        qualifier.is_empty() && scope.first().map(String::as_str) == Some(family_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;
    use crate::frontend::rewrite::MacroRewriter;
    use crate::hash::type_hash;
    use crate::registry::InterfaceType;

    struct Harvested {
        registry: TypeRegistry,
        result: ParseResult,
        diags: Diagnostics,
    }

    fn harvest_with(src: &str, write_rpcs: bool) -> Harvested {
        let mut sources = SourceMap::default();
        let file = sources.add("demo.hpp", src);
        let tokens = Lexer::new(src, file).lex_all();
        let mut diags = Diagnostics::default();
        let rewritten = MacroRewriter::new().rewrite(tokens, &mut diags);
        let mut parser = Parser::new(rewritten.tokens);
        let unit = parser.parse_unit();
        diags.items.extend(parser.diags.items);

        let mut registry = TypeRegistry::new();
        let mut result = ParseResult::new();
        harvest_unit(
            &unit,
            &rewritten.origins,
            &mut registry,
            &mut result,
            &mut diags,
            &sources,
            write_rpcs,
        );
        Harvested {
            registry,
            result,
            diags,
        }
    }

    fn harvest(src: &str) -> Harvested {
        harvest_with(src, true)
    }

    fn the_function(h: &Harvested) -> &RpcFunction {
        assert_eq!(
            h.result.rpc_functions.len(),
            1,
            "diags: {:?}",
            h.diags.items
        );
        &h.result.rpc_functions[0]
    }

    fn kind_of<'r>(h: &'r Harvested, id: TypeId) -> &'r InterfaceType {
        h.registry.get(id)
    }

    #[test]
    fn simple_member_rpc() {
        let h = harvest(
            "namespace Runlevel {\n\
             class Manager : public frem::RpcService<Manager> {\n\
             public:\n\
               FREM_RPC(Code(0x1234), Alias(\"Foo\"))\n\
               bool demo();\n\
             };\n\
             }\n",
        );
        assert!(!h.diags.has_errors(), "diags: {:?}", h.diags.items);
        let fun = the_function(&h);
        assert_eq!(fun.id, "Foo");
        assert_eq!(fun.annotation.code, 0x00001234);
        assert_eq!(fun.kind, FunctionKind::Member);
        assert_eq!(fun.fully_qualified_name, "Runlevel::Manager::demo");
        let invokee = fun.invokee.as_ref().unwrap();
        assert!(invokee.expression.ends_with("::m_fremSelf.load()"));
        assert!(invokee.is_pointer);
        let ret = kind_of(&h, fun.return_type.interface_type);
        assert_eq!(ret.kind.label(), "builtin");
        assert_eq!(ret.id, "bool");
        assert!(fun.parameters.is_empty());
        assert_eq!(fun.file_name, "demo.hpp");
        assert_eq!(fun.line, 5);
    }

    #[test]
    fn struct_parameter_registers_the_struct() {
        let h = harvest(
            "struct S { bool a; uint16_t b; };\n\
             namespace Runlevel {\n\
             class Manager : public frem::RpcService<Manager> {\n\
             public:\n\
               FREM_RPC(Code(1))\n\
               void update(const S& s);\n\
             };\n\
             }\n",
        );
        assert!(!h.diags.has_errors(), "diags: {:?}", h.diags.items);
        let fun = the_function(&h);
        assert_eq!(fun.parameters.len(), 1);
        let param = &fun.parameters[0];
        assert_eq!(param.direction, Direction::In);
        assert_eq!(param.name, "s");
        assert_eq!(param.fully_qualified_type, "const S&");
        assert_eq!(param.decayed_type, "S");

        let s = kind_of(&h, param.interface_type);
        assert_eq!(s.fully_qualified_name, "S");
        let TypeKind::Struct { fields, hash, .. } = &s.kind else {
            panic!("expected struct, got {:?}", s.kind.label());
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "a");
        assert_eq!(fields[1].name, "b");
        assert_eq!(*hash, type_hash("S"));
        assert_ne!(*hash, 0);
    }

    #[test]
    fn mutable_reference_parameter_is_out() {
        let h = harvest(
            "namespace Runlevel {\n\
             class Manager : public frem::RpcService<Manager> {\n\
             public:\n\
               FREM_RPC(Code(1))\n\
               void fetch(int32_t& value);\n\
             };\n\
             }\n",
        );
        let fun = the_function(&h);
        assert_eq!(fun.parameters[0].direction, Direction::Out);
    }

    #[test]
    fn bounded_array_parameter_expands_inline() {
        let h = harvest(
            "namespace Runlevel {\n\
             class Manager : public frem::RpcService<Manager> {\n\
             public:\n\
               FREM_RPC(Code(1))\n\
               void store(const frem::BoundedArray<int32_t, 2, 8>& values);\n\
             };\n\
             }\n",
        );
        assert!(!h.diags.has_errors(), "diags: {:?}", h.diags.items);
        let fun = the_function(&h);
        let param = kind_of(&h, fun.parameters[0].interface_type);
        let TypeKind::BoundedArray {
            element,
            size_type,
            min_size,
            max_size,
        } = param.kind
        else {
            panic!("expected boundedArray, got {:?}", param.kind.label());
        };
        assert_eq!(kind_of(&h, element).id, "int32_t");
        assert_eq!(kind_of(&h, size_type).id, "uint16_t");
        assert_eq!(min_size, 2);
        assert_eq!(max_size, 8);
    }

    #[test]
    fn configuration_declarator_backfills_codes() {
        let h = harvest(
            "struct A { bool x; };\n\
             struct B { uint8_t y; };\n\
             frem::ConfigurationDeclarator<A, B> g_cfg(\"cfg\", frem::SetCode(10), frem::Tags(\"x\", \"y\"));\n",
        );
        assert!(!h.diags.has_errors(), "diags: {:?}", h.diags.items);
        assert_eq!(h.result.configurations.len(), 1);
        let cfg = &h.result.configurations[0];
        assert_eq!(cfg.id, "cfg");
        assert_eq!(cfg.version_types.len(), 2);
        assert_eq!(cfg.version_types[0].version, 0);
        assert_eq!(
            kind_of(&h, cfg.version_types[0].ty).fully_qualified_name,
            "A"
        );
        assert_eq!(
            kind_of(&h, cfg.version_types[1].ty).fully_qualified_name,
            "B"
        );
        assert_eq!(cfg.set_code, 0x0A);
        assert_eq!(cfg.get_code, 0x0B);
        assert_eq!(cfg.version_code, 0x0C);
        assert_eq!(cfg.tags, vec!["x", "y"]);
    }

    #[test]
    fn type_cycle_is_an_error_with_no_partial_registration() {
        let h = harvest(
            "struct B;\n\
             struct A { B b; };\n\
             struct B { A a; };\n\
             FREM_TYPE_ALIAS(A, \"Cyclic\")\n",
        );
        assert!(h.diags.has_errors());
        assert!(h
            .diags
            .items
            .iter()
            .any(|d| d.message.contains("detected a cycle in the type system")));
        assert!(h.registry.lookup("A").is_none());
        assert!(h.registry.lookup("B").is_none());
        assert!(h.registry.user_defined().is_empty());
    }

    #[test]
    fn type_alias_sets_display_name_and_exposition() {
        let h = harvest(
            "namespace B { struct A { bool flag; }; }\n\
             FREM_TYPE_ALIAS(B::A, \"Packet\")\n",
        );
        assert!(!h.diags.has_errors(), "diags: {:?}", h.diags.items);
        let id = h.registry.lookup("Packet").expect("alias resolves");
        let ty = h.registry.get(id);
        assert_eq!(ty.id, "Packet");
        assert_eq!(ty.fully_qualified_name, "B::A");
        assert_eq!(ty.exposition_location.file, "demo.hpp");
        assert_eq!(ty.exposition_location.line, 2);
        assert_eq!(h.registry.lookup("B::A"), Some(id));
    }

    #[test]
    fn enum_parameter_captures_underlying_type_and_constants() {
        let h = harvest(
            "enum class Color : uint8_t { Red, Green = 5, Blue };\n\
             namespace Runlevel {\n\
             class Manager : public frem::RpcService<Manager> {\n\
             public:\n\
               FREM_RPC(Code(1))\n\
               void paint(Color color);\n\
             };\n\
             }\n",
        );
        assert!(!h.diags.has_errors(), "diags: {:?}", h.diags.items);
        let fun = the_function(&h);
        let color = kind_of(&h, fun.parameters[0].interface_type);
        let TypeKind::Enum {
            underlying,
            constants,
            hash,
        } = &color.kind
        else {
            panic!("expected enum");
        };
        assert_eq!(kind_of(&h, *underlying).id, "uint8_t");
        assert_eq!(
            constants
                .iter()
                .map(|c| (c.name.as_str(), c.value))
                .collect::<Vec<_>>(),
            vec![("Red", 0), ("Green", 5), ("Blue", 6)]
        );
        assert_eq!(*hash, type_hash("Color"));
    }

    #[test]
    fn enum_without_underlying_type_is_rejected_with_a_note() {
        let h = harvest(
            "enum class Broken { A, B };\n\
             namespace Runlevel {\n\
             class Manager : public frem::RpcService<Manager> {\n\
             public:\n\
               FREM_RPC(Code(1))\n\
               void paint(Broken broken);\n\
             };\n\
             }\n",
        );
        assert!(h.diags.has_errors());
        assert!(h.diags.items.iter().any(|d| d
            .message
            .contains("integral type of undetermined size")));
        assert!(h
            .diags
            .items
            .iter()
            .any(|d| d.message.contains("add ': std::uint16_t' for example")));
        assert!(h.result.rpc_functions.is_empty());
    }

    #[test]
    fn optional_variant_and_future_wrappers() {
        let h = harvest(
            "namespace Runlevel {\n\
             class Manager : public frem::RpcService<Manager> {\n\
             public:\n\
               FREM_RPC(Code(1))\n\
               nsp::Future<bool> begin(std::optional<int32_t> seed, std::variant<bool, int64_t> setting);\n\
             };\n\
             }\n",
        );
        assert!(!h.diags.has_errors(), "diags: {:?}", h.diags.items);
        let fun = the_function(&h);
        let ret = kind_of(&h, fun.return_type.interface_type);
        assert!(matches!(ret.kind, TypeKind::Future { .. }));
        let opt = kind_of(&h, fun.parameters[0].interface_type);
        let TypeKind::Optional { underlying } = opt.kind else {
            panic!("expected optional");
        };
        assert_eq!(kind_of(&h, underlying).id, "int32_t");
        let var = kind_of(&h, fun.parameters[1].interface_type);
        let TypeKind::Variant { ref underlying } = var.kind else {
            panic!("expected variant");
        };
        assert_eq!(underlying.len(), 2);
        assert_eq!(kind_of(&h, underlying[0]).id, "bool");
        assert_eq!(kind_of(&h, underlying[1]).id, "int64_t");
    }

    #[test]
    fn generic_array_with_policy_arguments() {
        let h = harvest(
            "namespace Runlevel {\n\
             class Manager : public frem::RpcService<Manager> {\n\
             public:\n\
               FREM_RPC(Code(1))\n\
               void a(const frem::Array<int32_t, frem::Fixed<4>>& fixed,\n\
                      const frem::Array<int32_t, frem::Bounded<1, 6>>& bounded);\n\
             };\n\
             }\n",
        );
        assert!(!h.diags.has_errors(), "diags: {:?}", h.diags.items);
        let fun = the_function(&h);
        let fixed = kind_of(&h, fun.parameters[0].interface_type);
        let TypeKind::FixedArray { size, .. } = fixed.kind else {
            panic!("expected fixedArray");
        };
        assert_eq!(size, 4);
        let bounded = kind_of(&h, fun.parameters[1].interface_type);
        let TypeKind::BoundedArray {
            min_size, max_size, ..
        } = bounded.kind
        else {
            panic!("expected boundedArray");
        };
        assert_eq!((min_size, max_size), (1, 6));
    }

    #[test]
    fn static_member_and_free_function_kinds() {
        let h = harvest(
            "namespace Runlevel {\n\
             class Manager : public frem::RpcService<Manager> {\n\
             public:\n\
               FREM_RPC(Code(1))\n\
               static bool ping();\n\
             };\n\
             FREM_RPC(Code(2))\n\
             bool reset();\n\
             }\n",
        );
        assert!(!h.diags.has_errors(), "diags: {:?}", h.diags.items);
        assert_eq!(h.result.rpc_functions.len(), 2);
        let stat = &h.result.rpc_functions[0];
        assert_eq!(stat.kind, FunctionKind::Static);
        assert!(stat.invokee.is_none());
        let free = &h.result.rpc_functions[1];
        assert_eq!(free.kind, FunctionKind::Free);
        assert_eq!(free.fully_qualified_name, "Runlevel::reset");
    }

    #[test]
    fn instance_getter_through_static_accessor() {
        let h = harvest(
            "namespace Runlevel {\n\
             class Manager {\n\
             public:\n\
               static Manager& instance();\n\
               FREM_RPC(Code(1))\n\
               bool demo();\n\
             };\n\
             class Pool {\n\
             public:\n\
               static Pool* get();\n\
               FREM_RPC(Code(2))\n\
               bool drain();\n\
             };\n\
             }\n",
        );
        assert!(!h.diags.has_errors(), "diags: {:?}", h.diags.items);
        let by_ref = &h.result.rpc_functions[0];
        let invokee = by_ref.invokee.as_ref().unwrap();
        assert_eq!(invokee.expression, "Runlevel::Manager::instance()");
        assert!(!invokee.is_pointer);
        let by_ptr = &h.result.rpc_functions[1];
        let invokee = by_ptr.invokee.as_ref().unwrap();
        assert_eq!(invokee.expression, "Runlevel::Pool::get()");
        assert!(invokee.is_pointer);
    }

    #[test]
    fn member_without_instance_getter_is_skipped() {
        let h = harvest(
            "namespace Runlevel {\n\
             class Orphan {\n\
             public:\n\
               FREM_RPC(Code(1))\n\
               bool demo();\n\
             };\n\
             }\n",
        );
        assert!(h.diags.has_errors());
        assert!(h
            .diags
            .items
            .iter()
            .any(|d| d.message.contains("class has no instance getter")));
        assert!(h.result.rpc_functions.is_empty());
    }

    #[test]
    fn const_noexcept_and_doc_are_captured() {
        let h = harvest(
            "namespace Runlevel {\n\
             class Manager : public frem::RpcService<Manager> {\n\
             public:\n\
               /// Reads the temperature.\n\
               FREM_RPC(Code(1), Via(\"can0\"), ReturnName(\"celsius\"), Tags(\"sensor\", \"slow\"))\n\
               int32_t temperature() const noexcept;\n\
             };\n\
             }\n",
        );
        assert!(!h.diags.has_errors(), "diags: {:?}", h.diags.items);
        let fun = the_function(&h);
        assert!(fun.is_noexcept);
        assert_eq!(fun.qualifiers, vec!["const"]);
        assert_eq!(fun.doc_string, "/// Reads the temperature.");
        assert_eq!(fun.annotation.via, "can0");
        assert_eq!(fun.annotation.return_name, "celsius");
        assert_eq!(fun.annotation.tags, vec!["sensor", "slow"]);
        // No alias: the id falls back to the fully-qualified name.
        assert_eq!(fun.id, "Runlevel::Manager::temperature");
    }

    #[test]
    fn duplicate_fully_qualified_names_are_processed_once() {
        let h = harvest(
            "namespace Runlevel {\n\
             class Manager : public frem::RpcService<Manager> {\n\
             public:\n\
               FREM_RPC(Code(1))\n\
               bool demo();\n\
               FREM_RPC(Code(2))\n\
               bool demo();\n\
             };\n\
             }\n",
        );
        assert_eq!(h.result.rpc_functions.len(), 1);
        assert_eq!(h.result.rpc_functions[0].annotation.code, 1);
    }

    #[test]
    fn duplicate_configuration_ids_are_discarded() {
        let h = harvest(
            "struct A { bool x; };\n\
             frem::ConfigurationDeclarator<A> one(\"cfg\", frem::SetCode(1));\n\
             frem::ConfigurationDeclarator<A> two(\"cfg\", frem::SetCode(9));\n",
        );
        assert_eq!(h.result.configurations.len(), 1);
        assert_eq!(h.result.configurations[0].set_code, 1);
    }

    #[test]
    fn datagram_socket_declarator() {
        let h = harvest(
            "struct Packet { uint8_t data; };\n\
             frem::DatagramSocketDeclarator<Packet> g_socket(\"telemetry\", 4711, frem::Tags(\"net\"));\n",
        );
        assert!(!h.diags.has_errors(), "diags: {:?}", h.diags.items);
        assert_eq!(h.result.sockets.len(), 1);
        let socket = &h.result.sockets[0];
        assert_eq!(socket.id, "telemetry");
        assert_eq!(socket.port, 4711);
        assert_eq!(socket.tags, vec!["net"]);
        assert_eq!(
            kind_of(&h, socket.packet_type).fully_qualified_name,
            "Packet"
        );
    }

    #[test]
    fn error_descriptors_by_id_and_by_value() {
        let h = harvest(
            "nsp::ErrorDescriptor byId(\"E_TIMEOUT\", \"operation timed out\", \"svc\", \"usr\", \"note\");\n\
             nsp::DiagnosticDescriptor byValue(0x8000, \"raw failure\");\n",
        );
        assert!(!h.diags.has_errors(), "diags: {:?}", h.diags.items);
        assert_eq!(h.result.error_descriptors.len(), 2);
        let by_id = &h.result.error_descriptors[0];
        assert_eq!(by_id.id, "E_TIMEOUT");
        assert_eq!(by_id.description, "operation timed out");
        assert_eq!(by_id.service_text, "svc");
        assert_eq!(by_id.user_text, "usr");
        assert_eq!(by_id.comment, "note");
        let by_value = &h.result.error_descriptors[1];
        assert!(by_value.id.is_empty());
        assert_eq!(by_value.value, 0x8000);
    }

    #[test]
    fn return_value_declarations_accumulate() {
        let h = harvest(
            "class RpcResult {\n\
             public:\n\
               static constexpr frem::RpcResultDecl Success{0};\n\
               static constexpr frem::RpcResultDecl ServiceNotAvailable{-256};\n\
             };\n",
        );
        assert_eq!(h.result.return_values.len(), 2);
        assert_eq!(h.result.return_values[&0], "Success");
        assert_eq!(h.result.return_values[&-256], "ServiceNotAvailable");
    }

    #[test]
    fn unknown_annotation_kind_suggests_the_nearest() {
        let h = harvest(
            "namespace Runlevel {\n\
             class Manager : public frem::RpcService<Manager> {\n\
             public:\n\
               FREM_RPC(Cod(1))\n\
               bool demo();\n\
             };\n\
             }\n",
        );
        assert!(h.diags.has_errors());
        assert!(h.diags.items.iter().any(|d| {
            d.message.contains("unknown annotation kind `Cod`")
                && d.message.contains("did you mean `Code`?")
        }));
        assert!(h.result.rpc_functions.is_empty());
    }

    #[test]
    fn raw_pointer_parameter_is_rejected() {
        let h = harvest(
            "namespace Runlevel {\n\
             class Manager : public frem::RpcService<Manager> {\n\
             public:\n\
               FREM_RPC(Code(1))\n\
               void poke(bool* target);\n\
             };\n\
             }\n",
        );
        assert!(h.diags.has_errors());
        assert!(h
            .diags
            .items
            .iter()
            .any(|d| d.message.contains("cannot serialize a pointer type")));
        assert!(h.result.rpc_functions.is_empty());
    }

    #[test]
    fn sizeless_integer_parameter_is_rejected() {
        let h = harvest(
            "namespace Runlevel {\n\
             class Manager : public frem::RpcService<Manager> {\n\
             public:\n\
               FREM_RPC(Code(1))\n\
               void count(unsigned value);\n\
             };\n\
             }\n",
        );
        assert!(h.diags.has_errors());
        assert!(h.diags.items.iter().any(|d| d
            .message
            .contains("integral type of undetermined size")));
    }

    #[test]
    fn non_trivially_copyable_payload_warns() {
        let h = harvest(
            "struct Tricky { Tricky(const Tricky& other); bool x; };\n\
             namespace Runlevel {\n\
             class Manager : public frem::RpcService<Manager> {\n\
             public:\n\
               FREM_RPC(Code(1))\n\
               void take(const Tricky& t);\n\
             };\n\
             }\n",
        );
        assert!(!h.diags.has_errors(), "diags: {:?}", h.diags.items);
        assert!(h
            .diags
            .items
            .iter()
            .any(|d| d.message.contains("record is not trivially copyable")));
        assert_eq!(h.result.rpc_functions.len(), 1);
    }

    #[test]
    fn configuration_version_base_imprints_the_version() {
        let h = harvest(
            "struct Settings : frem::ConfigurationVersion<3> { bool flag; };\n\
             frem::ConfigurationDeclarator<Settings> g_cfg(\"settings\");\n",
        );
        assert!(!h.diags.has_errors(), "diags: {:?}", h.diags.items);
        let cfg = &h.result.configurations[0];
        assert_eq!(cfg.version_types.len(), 1);
        assert_eq!(cfg.version_types[0].version, 3);
    }

    #[test]
    fn base_class_fields_precede_own_fields() {
        let h = harvest(
            "struct Header { uint8_t tag; };\n\
             struct Message : Header { uint16_t payload; };\n\
             FREM_TYPE_ALIAS(Message, \"Msg\")\n",
        );
        assert!(!h.diags.has_errors(), "diags: {:?}", h.diags.items);
        let id = h.registry.lookup("Message").unwrap();
        let TypeKind::Struct { fields, .. } = &h.registry.get(id).kind else {
            panic!("expected struct");
        };
        assert_eq!(
            fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            vec!["tag", "payload"]
        );
    }

    #[test]
    fn alias_collision_warns_and_last_write_wins() {
        let h = harvest(
            "struct A { bool x; };\n\
             struct B { bool y; };\n\
             FREM_TYPE_ALIAS(A, \"Shared\")\n\
             FREM_TYPE_ALIAS(B, \"Shared\")\n",
        );
        assert!(!h.diags.has_errors());
        assert!(h
            .diags
            .items
            .iter()
            .any(|d| d.message.contains("alias `Shared` now refers to `B`")));
        let id = h.registry.lookup("Shared").unwrap();
        assert_eq!(h.registry.get(id).fully_qualified_name, "B");
    }

    #[test]
    fn type_only_mode_registers_types_without_functions() {
        let h = harvest_with(
            "struct S { bool a; };\n\
             namespace Runlevel {\n\
             class Manager : public frem::RpcService<Manager> {\n\
             public:\n\
               FREM_RPC(Code(1))\n\
               void update(const S& s);\n\
             };\n\
             }\n",
            false,
        );
        assert!(!h.diags.has_errors(), "diags: {:?}", h.diags.items);
        assert!(h.result.rpc_functions.is_empty());
        assert!(h.registry.lookup("S").is_some());
        assert!(h
            .result
            .processed_functions
            .contains("Runlevel::Manager::update"));
    }

    #[test]
    fn class_template_members_are_not_harvested() {
        let h = harvest(
            "template <typename T>\n\
             class Generic : public frem::RpcService<Generic<T>> {\n\
             public:\n\
               FREM_RPC(Code(1))\n\
               bool demo();\n\
             };\n",
        );
        assert!(h.result.rpc_functions.is_empty());
    }

    #[test]
    fn annotation_attribute_without_fragments_is_an_error() {
        let h = harvest("__attribute__((annotate(\"_frem_rpc:9\"))) void f();\n");
        assert!(h.diags.has_errors());
        assert!(h
            .diags
            .items
            .iter()
            .any(|d| d.message.contains("missing annotation")));
    }

    #[test]
    fn fixed_string_and_bounded_string_families() {
        let h = harvest(
            "namespace Runlevel {\n\
             class Manager : public frem::RpcService<Manager> {\n\
             public:\n\
               FREM_RPC(Code(1))\n\
               void name(const frem::FixedBasicString<char, 16>& fixed,\n\
                         const frem::BoundedBasicString<char, 0, 32>& bounded);\n\
             };\n\
             }\n",
        );
        assert!(!h.diags.has_errors(), "diags: {:?}", h.diags.items);
        let fun = the_function(&h);
        let fixed = kind_of(&h, fun.parameters[0].interface_type);
        let TypeKind::FixedString { element, size } = fixed.kind else {
            panic!("expected fixedString");
        };
        assert_eq!(kind_of(&h, element).id, "char");
        assert_eq!(size, 16);
        let bounded = kind_of(&h, fun.parameters[1].interface_type);
        let TypeKind::BoundedString {
            min_size, max_size, ..
        } = bounded.kind
        else {
            panic!("expected boundedString");
        };
        assert_eq!((min_size, max_size), (0, 32));
    }

    #[test]
    fn std_array_parameter_is_a_fixed_array() {
        let h = harvest(
            "namespace Runlevel {\n\
             class Manager : public frem::RpcService<Manager> {\n\
             public:\n\
               FREM_RPC(Code(1))\n\
               void axes(const std::array<int16_t, 3>& position);\n\
             };\n\
             }\n",
        );
        assert!(!h.diags.has_errors(), "diags: {:?}", h.diags.items);
        let fun = the_function(&h);
        let arr = kind_of(&h, fun.parameters[0].interface_type);
        let TypeKind::FixedArray { element, size } = arr.kind else {
            panic!("expected fixedArray");
        };
        assert_eq!(kind_of(&h, element).id, "int16_t");
        assert_eq!(size, 3);
    }

    #[test]
    fn std_int_synonyms_resolve_to_the_plain_builtin() {
        let h = harvest(
            "namespace Runlevel {\n\
             class Manager : public frem::RpcService<Manager> {\n\
             public:\n\
               FREM_RPC(Code(1))\n\
               void set(std::uint16_t value);\n\
             };\n\
             }\n",
        );
        assert!(!h.diags.has_errors(), "diags: {:?}", h.diags.items);
        let fun = the_function(&h);
        let ty = kind_of(&h, fun.parameters[0].interface_type);
        assert_eq!(ty.id, "uint16_t");
    }
}
