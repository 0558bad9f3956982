use crate::frontend::ast::{RecordDecl, Span, TemplateArg, TypeExpr};
use crate::registry::{EnumConstant, InterfaceType, StructField, TypeId, TypeKind};

use super::{Harvester, IndexedDecl};

impl<'a> Harvester<'a> {
    /// Map a spelled type to a registered canonical interface type,
    /// registering it (and everything it references) on first sight. The
    /// stack detects cycles in the containment graph.
    pub(crate) fn register_type(
        &mut self,
        loc: Span,
        ty: &TypeExpr,
        scope: &[String],
        stack: &mut Vec<String>,
    ) -> Option<TypeId> {
        let (fqn, resolved) = self.resolve_type_name(ty, scope);
        if let Some(existing) = self.registry.lookup(&fqn) {
            return Some(existing);
        }

        if stack.contains(&fqn) {
            self.diags
                .error("detected a cycle in the type system", Some(loc));
            return None;
        }
        stack.push(fqn.clone());
        let result = self.register_unseen(loc, ty, scope, &fqn, resolved, stack);
        stack.pop();
        result
    }

    fn register_unseen(
        &mut self,
        loc: Span,
        ty: &TypeExpr,
        scope: &[String],
        fqn: &str,
        resolved: Option<(IndexedDecl<'a>, Vec<String>)>,
        stack: &mut Vec<String>,
    ) -> Option<TypeId> {
        if ty.pointer_depth > 0 {
            self.diags.error("not a known built-in type", Some(loc));
            return None;
        }

        if let Some(id) = self.try_template_family(loc, ty, scope, stack) {
            return id.into_option();
        }

        match resolved {
            Some((IndexedDecl::Record(rec), rec_scope)) => {
                self.register_record(ty, scope, fqn, rec, &rec_scope, stack)
            }
            Some((IndexedDecl::Enum(en), en_scope)) => self.register_enum(fqn, en, &en_scope),
            None => {
                // An instantiated template spelled with arguments resolves
                // through its primary template's definition.
                if ty.has_template_args() {
                    if let Some((rec, rec_scope)) = self.resolve_primary_template(ty, scope) {
                        return self.register_record(ty, scope, fqn, rec, &rec_scope, stack);
                    }
                }
                self.report_unserializable(loc, ty);
                None
            }
        }
    }

    fn register_record(
        &mut self,
        ty: &TypeExpr,
        scope: &[String],
        fqn: &str,
        rec: &'a RecordDecl,
        rec_scope: &[String],
        stack: &mut Vec<String>,
    ) -> Option<TypeId> {
        let mut rec = rec;
        let mut rec_scope = rec_scope.to_vec();
        if !rec.has_definition {
            // A forward declaration of a template name: reach through to
            // the primary template's definition.
            match self.resolve_primary_template(ty, scope) {
                Some((primary, primary_scope)) => {
                    rec = primary;
                    rec_scope = primary_scope;
                }
                None => return None,
            }
        }
        if !rec.has_definition {
            return None;
        }
        if rec.keyword == crate::frontend::ast::RecordKeyword::Union {
            return None;
        }

        // Payload records travel by copy over the interface.
        if rec.has_user_special || rec.has_virtual {
            self.diags
                .warning("record is not trivially copyable", Some(rec.span));
        }
        if rec.fields().count() == 0 && rec.bases.is_empty() {
            self.diags.error("record is empty", Some(rec.span));
        }

        let mut member_scope = rec_scope.clone();
        member_scope.push(rec.name.clone());

        let mut fields = Vec::new();
        let mut configuration_version = 0u32;

        // Base classes contribute their fields ahead of the record's own,
        // one level deep.
        for base in &rec.bases {
            if self.matches_family(base, &member_scope, "frem", "ConfigurationVersion") {
                if let Some(TemplateArg::Int(version)) = base.template_args().first() {
                    configuration_version = *version as u32;
                }
                continue;
            }
            let (_, base_entry) = self.resolve_type_name(base, &member_scope);
            let Some((IndexedDecl::Record(base_rec), base_scope)) = base_entry else {
                continue;
            };
            let mut base_member_scope = base_scope.clone();
            base_member_scope.push(base_rec.name.clone());
            for field in base_rec.fields() {
                let field_ty =
                    self.register_field(field, &base_member_scope, stack)?;
                fields.push(StructField {
                    name: field.name.clone(),
                    ty: field_ty,
                });
            }
        }

        for field in rec.fields() {
            let field_ty = self.register_field(field, &member_scope, stack)?;
            fields.push(StructField {
                name: field.name.clone(),
                ty: field_ty,
            });
        }

        let declaration_location = self.file_location(rec.span);
        let mut interface = InterfaceType::unnamed(TypeKind::Struct {
            fields,
            configuration_version,
            hash: 0,
        });
        interface.id = fqn.to_string();
        interface.fully_qualified_name = fqn.to_string();
        interface.declaration_location = declaration_location;
        Some(self.registry.register(fqn, interface))
    }

    fn register_field(
        &mut self,
        field: &crate::frontend::ast::VarDecl,
        member_scope: &[String],
        stack: &mut Vec<String>,
    ) -> Option<TypeId> {
        if field.has_array_suffix {
            self.diags
                .error("non-scalar type cannot be serialized", Some(field.span));
            return None;
        }
        self.register_type(field.span, &field.ty, member_scope, stack)
    }

    fn register_enum(
        &mut self,
        fqn: &str,
        en: &'a crate::frontend::ast::EnumDecl,
        en_scope: &[String],
    ) -> Option<TypeId> {
        let underlying_ty = en
            .underlying
            .clone()
            .unwrap_or_else(|| TypeExpr::simple("int", en.span));
        let mut stack = Vec::new();
        let Some(underlying) = self.register_type(en.span, &underlying_ty, en_scope, &mut stack)
        else {
            self.diags
                .note("add ': std::uint16_t' for example", Some(en.span));
            return None;
        };

        let mut constants = Vec::new();
        let mut next_value = 0i64;
        for enumerator in &en.enumerators {
            let value = enumerator.value.unwrap_or(next_value);
            next_value = value + 1;
            constants.push(EnumConstant {
                name: enumerator.name.clone(),
                value,
            });
        }

        let mut interface = InterfaceType::unnamed(TypeKind::Enum {
            underlying,
            constants,
            hash: 0,
        });
        interface.id = fqn.to_string();
        interface.fully_qualified_name = fqn.to_string();
        interface.declaration_location = self.file_location(en.span);
        Some(self.registry.register(fqn, interface))
    }

    // ----- template families --------------------------------------------

    /// Dispatch over the recognized (namespace, template-name) families.
    /// Returns None when the type is not a recognized family at all.
    fn try_template_family(
        &mut self,
        loc: Span,
        ty: &TypeExpr,
        scope: &[String],
        stack: &mut Vec<String>,
    ) -> Option<FamilyOutcome> {
        if !ty.has_template_args() {
            return None;
        }

        if self.matches_family(ty, scope, "std", "array") {
            return Some(self.family_fixed_array(loc, ty, scope, stack, 2));
        }
        if self.matches_family(ty, scope, "frem", "BoundedArray") {
            return Some(self.family_bounded(loc, ty, scope, stack, false));
        }
        if self.matches_family(ty, scope, "frem", "FixedBasicString") {
            return Some(self.family_fixed_string(loc, ty, scope, stack));
        }
        if self.matches_family(ty, scope, "frem", "BoundedBasicString") {
            return Some(self.family_bounded(loc, ty, scope, stack, true));
        }
        if self.matches_family(ty, scope, "frem", "Array") {
            return Some(self.family_generic_array(loc, ty, scope, stack));
        }
        let is_future = self.matches_family(ty, scope, "std", "future")
            || self.matches_family(ty, scope, "std", "shared_future")
            || self.matches_family(ty, scope, "nsp", "Future")
            || self.matches_family(ty, scope, "nsp", "SharedFuture");
        if is_future {
            return Some(self.family_wrapper(loc, ty, scope, stack, WrapperKind::Future));
        }
        if self.matches_family(ty, scope, "std", "optional") {
            return Some(self.family_wrapper(loc, ty, scope, stack, WrapperKind::Optional));
        }
        if self.matches_family(ty, scope, "std", "variant") {
            return Some(self.family_variant(loc, ty, scope, stack));
        }
        None
    }

    fn family_fixed_array(
        &mut self,
        loc: Span,
        ty: &TypeExpr,
        scope: &[String],
        stack: &mut Vec<String>,
        arity: usize,
    ) -> FamilyOutcome {
        let args = ty.template_args().to_vec();
        if args.len() != arity {
            self.diags
                .error(format!("expected {} template arguments", arity), Some(loc));
            return FamilyOutcome::Failed;
        }
        let TemplateArg::Type(element_ty) = &args[0] else {
            return FamilyOutcome::Failed;
        };
        let Some(element) = self.register_type(loc, element_ty, scope, stack) else {
            return FamilyOutcome::Failed;
        };
        let TemplateArg::Int(size) = args[1] else {
            return FamilyOutcome::Failed;
        };
        let id = self
            .registry
            .alloc(InterfaceType::unnamed(TypeKind::FixedArray { element, size }));
        FamilyOutcome::Registered(id)
    }

    fn family_fixed_string(
        &mut self,
        loc: Span,
        ty: &TypeExpr,
        scope: &[String],
        stack: &mut Vec<String>,
    ) -> FamilyOutcome {
        let args = ty.template_args().to_vec();
        if args.len() != 2 {
            self.diags
                .error("expected 2 template arguments", Some(loc));
            return FamilyOutcome::Failed;
        }
        let TemplateArg::Type(element_ty) = &args[0] else {
            return FamilyOutcome::Failed;
        };
        let Some(element) = self.register_type(loc, element_ty, scope, stack) else {
            return FamilyOutcome::Failed;
        };
        let TemplateArg::Int(size) = args[1] else {
            return FamilyOutcome::Failed;
        };
        let id = self
            .registry
            .alloc(InterfaceType::unnamed(TypeKind::FixedString { element, size }));
        FamilyOutcome::Registered(id)
    }

    fn family_bounded(
        &mut self,
        loc: Span,
        ty: &TypeExpr,
        scope: &[String],
        stack: &mut Vec<String>,
        is_string: bool,
    ) -> FamilyOutcome {
        let args = ty.template_args().to_vec();
        if args.len() != 3 {
            self.diags
                .error("expected 3 template arguments", Some(loc));
            return FamilyOutcome::Failed;
        }
        let TemplateArg::Type(element_ty) = &args[0] else {
            return FamilyOutcome::Failed;
        };
        let Some(element) = self.register_type(loc, element_ty, scope, stack) else {
            return FamilyOutcome::Failed;
        };
        let (TemplateArg::Int(min_size), TemplateArg::Int(max_size)) = (&args[1], &args[2])
        else {
            let what = if is_string { "string" } else { "array" };
            self.diags.error(
                format!("could not determine {} bounds", what),
                Some(loc),
            );
            return FamilyOutcome::Failed;
        };
        let size_type = self.uint16_size_type();
        let kind = if is_string {
            TypeKind::BoundedString {
                element,
                size_type,
                min_size: *min_size,
                max_size: *max_size,
            }
        } else {
            TypeKind::BoundedArray {
                element,
                size_type,
                min_size: *min_size,
                max_size: *max_size,
            }
        };
        FamilyOutcome::Registered(self.registry.alloc(InterfaceType::unnamed(kind)))
    }

    /// `Array<T, Fixed<N>>` and `Array<T, Bounded<MIN, MAX>>`; the size
    /// policy must itself be a recognized template.
    fn family_generic_array(
        &mut self,
        loc: Span,
        ty: &TypeExpr,
        scope: &[String],
        stack: &mut Vec<String>,
    ) -> FamilyOutcome {
        let args = ty.template_args().to_vec();
        if args.len() != 2 {
            return FamilyOutcome::Failed;
        }
        let TemplateArg::Type(element_ty) = &args[0] else {
            return FamilyOutcome::Failed;
        };
        let Some(element) = self.register_type(loc, element_ty, scope, stack) else {
            return FamilyOutcome::Failed;
        };
        let TemplateArg::Type(policy) = &args[1] else {
            return FamilyOutcome::Failed;
        };

        if self.matches_family(policy, scope, "frem", "Fixed") {
            let policy_args = policy.template_args();
            if policy_args.len() != 1 {
                return FamilyOutcome::Failed;
            }
            let TemplateArg::Int(size) = policy_args[0] else {
                return FamilyOutcome::Failed;
            };
            let id = self
                .registry
                .alloc(InterfaceType::unnamed(TypeKind::FixedArray { element, size }));
            return FamilyOutcome::Registered(id);
        }
        if self.matches_family(policy, scope, "frem", "Bounded") {
            let policy_args = policy.template_args();
            if policy_args.len() != 2 {
                return FamilyOutcome::Failed;
            }
            let (TemplateArg::Int(min_size), TemplateArg::Int(max_size)) =
                (&policy_args[0], &policy_args[1])
            else {
                return FamilyOutcome::Failed;
            };
            let min_size = *min_size;
            let max_size = *max_size;
            let size_type = self.uint16_size_type();
            let id = self
                .registry
                .alloc(InterfaceType::unnamed(TypeKind::BoundedArray {
                    element,
                    size_type,
                    min_size,
                    max_size,
                }));
            return FamilyOutcome::Registered(id);
        }
        FamilyOutcome::Failed
    }

    fn family_wrapper(
        &mut self,
        loc: Span,
        ty: &TypeExpr,
        scope: &[String],
        stack: &mut Vec<String>,
        wrapper: WrapperKind,
    ) -> FamilyOutcome {
        let args = ty.template_args().to_vec();
        let Some(TemplateArg::Type(underlying_ty)) = args.first() else {
            return FamilyOutcome::Failed;
        };
        let Some(underlying) = self.register_type(loc, underlying_ty, scope, stack) else {
            return FamilyOutcome::Failed;
        };
        let kind = match wrapper {
            WrapperKind::Optional => TypeKind::Optional { underlying },
            WrapperKind::Future => TypeKind::Future { underlying },
        };
        FamilyOutcome::Registered(self.registry.alloc(InterfaceType::unnamed(kind)))
    }

    fn family_variant(
        &mut self,
        loc: Span,
        ty: &TypeExpr,
        scope: &[String],
        stack: &mut Vec<String>,
    ) -> FamilyOutcome {
        let args = ty.template_args().to_vec();
        if args.is_empty() {
            return FamilyOutcome::Failed;
        }
        let mut underlying = Vec::new();
        for arg in &args {
            let TemplateArg::Type(arm_ty) = arg else {
                return FamilyOutcome::Failed;
            };
            let Some(arm) = self.register_type(loc, arm_ty, scope, stack) else {
                return FamilyOutcome::Failed;
            };
            underlying.push(arm);
        }
        FamilyOutcome::Registered(
            self.registry
                .alloc(InterfaceType::unnamed(TypeKind::Variant { underlying })),
        )
    }

    fn uint16_size_type(&self) -> TypeId {
        self.registry
            .lookup("uint16_t")
            .unwrap_or(TypeId(0))
    }

    // ----- diagnostics ---------------------------------------------------

    fn report_unserializable(&mut self, loc: Span, ty: &TypeExpr) {
        if is_sizeless_integer_spelling(ty) {
            self.diags.error(
                "integral type of undetermined size cannot be serialized",
                Some(loc),
            );
        } else if is_scalar_spelling(ty) {
            self.diags.error("not a known built-in type", Some(loc));
        } else {
            self.diags
                .error("non-scalar type cannot be serialized", Some(loc));
        }
    }
}

enum WrapperKind {
    Optional,
    Future,
}

enum FamilyOutcome {
    Registered(TypeId),
    Failed,
}

impl FamilyOutcome {
    fn into_option(self) -> Option<TypeId> {
        match self {
            FamilyOutcome::Registered(id) => Some(id),
            FamilyOutcome::Failed => None,
        }
    }
}

/// `int`, `unsigned long` and friends: integer spellings whose serialized
/// width is target-dependent.
fn is_sizeless_integer_spelling(ty: &TypeExpr) -> bool {
    if ty.segments.len() != 1 || ty.has_template_args() {
        return false;
    }
    let name = ty.last_name();
    !name.is_empty()
        && name
            .split_whitespace()
            .all(|word| matches!(word, "int" | "long" | "short" | "signed" | "unsigned" | "char"))
}

fn is_scalar_spelling(ty: &TypeExpr) -> bool {
    if ty.segments.len() != 1 || ty.has_template_args() {
        return false;
    }
    let name = ty.last_name();
    name.split_whitespace()
        .all(|word| matches!(word, "float" | "double" | "long" | "auto"))
        || matches!(name, "wchar_t" | "char16_t" | "char32_t" | "nullptr_t")
}
