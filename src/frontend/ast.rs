#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub file: usize,
    pub line: usize,
    pub column: usize,
}

#[derive(Clone, Debug, Default)]
pub struct SourceUnit {
    pub decls: Vec<Decl>,
}

#[derive(Clone, Debug)]
pub enum Decl {
    Namespace(NamespaceDecl),
    Record(RecordDecl),
    Enum(EnumDecl),
    Var(VarDecl),
    Function(FunctionDecl),
}

#[derive(Clone, Debug)]
pub struct NamespaceDecl {
    pub name: String,
    pub is_inline: bool,
    pub decls: Vec<Decl>,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKeyword {
    Struct,
    Class,
    Union,
}

#[derive(Clone, Debug)]
pub struct RecordDecl {
    pub keyword: RecordKeyword,
    pub name: String,
    pub bases: Vec<TypeExpr>,
    pub members: Vec<Decl>,
    pub is_template: bool,
    pub has_definition: bool,
    // User-declared destructor/copy operations or virtual members; used for
    // the trivially-copyable warning.
    pub has_user_special: bool,
    pub has_virtual: bool,
    pub span: Span,
}

impl RecordDecl {
    pub fn fields(&self) -> impl Iterator<Item = &VarDecl> {
        self.members.iter().filter_map(|m| match m {
            Decl::Var(v) if !v.is_static => Some(v),
            _ => None,
        })
    }

    pub fn methods(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.members.iter().filter_map(|m| match m {
            Decl::Function(f) => Some(f),
            _ => None,
        })
    }
}

#[derive(Clone, Debug)]
pub struct EnumDecl {
    pub name: String,
    pub is_scoped: bool,
    pub underlying: Option<TypeExpr>,
    pub enumerators: Vec<Enumerator>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct Enumerator {
    pub name: String,
    pub value: Option<i64>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct VarDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub init: Vec<InitArg>,
    pub is_static: bool,
    pub is_constexpr: bool,
    // `T name[N];` array declarators are carried as a flag; the resolver
    // rejects them like any other non-scalar, non-aggregate shape.
    pub has_array_suffix: bool,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum InitArg {
    Int(i64, Span),
    Str(String, Span),
    Call {
        name: String,
        args: Vec<InitArg>,
        span: Span,
    },
    Ident(String, Span),
    Other(Span),
}

impl InitArg {
    pub fn span(&self) -> Span {
        match self {
            InitArg::Int(_, s)
            | InitArg::Str(_, s)
            | InitArg::Ident(_, s)
            | InitArg::Other(s) => *s,
            InitArg::Call { span, .. } => *span,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            InitArg::Str(s, _) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            InitArg::Int(v, _) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FunctionDecl {
    pub name: String,
    pub ret: TypeExpr,
    pub params: Vec<ParamDecl>,
    pub is_static: bool,
    pub is_const: bool,
    pub is_noexcept: bool,
    pub is_template: bool,
    // Payloads of __attribute__((annotate("..."))) preceding the declaration.
    pub annotations: Vec<(String, Span)>,
    pub doc: Option<String>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ParamDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub has_default: bool,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefKind {
    None,
    LValue,
    RValue,
}

#[derive(Clone, Debug)]
pub struct TypeExpr {
    pub is_const: bool,
    pub rooted: bool,
    pub segments: Vec<TypeSegment>,
    pub ref_kind: RefKind,
    pub pointer_depth: usize,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct TypeSegment {
    pub name: String,
    pub args: Vec<TemplateArg>,
}

#[derive(Clone, Debug)]
pub enum TemplateArg {
    Type(TypeExpr),
    Int(i64),
    Other,
}

impl TypeExpr {
    pub fn simple(name: &str, span: Span) -> Self {
        TypeExpr {
            is_const: false,
            rooted: false,
            segments: vec![TypeSegment {
                name: name.to_string(),
                args: Vec::new(),
            }],
            ref_kind: RefKind::None,
            pointer_depth: 0,
            span,
        }
    }

    pub fn last_name(&self) -> &str {
        self.segments
            .last()
            .map(|s| s.name.as_str())
            .unwrap_or("")
    }

    /// Name of the namespace qualifier as written, e.g. `frem` for
    /// `::frem::BoundedArray<...>`. Empty for unqualified names.
    pub fn qualifier(&self) -> String {
        let n = self.segments.len();
        if n < 2 {
            return String::new();
        }
        self.segments[..n - 1]
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join("::")
    }

    pub fn template_args(&self) -> &[TemplateArg] {
        self.segments
            .last()
            .map(|s| s.args.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_template_args(&self) -> bool {
        !self.template_args().is_empty()
    }

    /// The canonical spelled name: qualifiers and template arguments, no
    /// leading separator, no const/ref/pointer decoration.
    pub fn canonical_name(&self) -> String {
        let mut out = String::new();
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                out.push_str("::");
            }
            out.push_str(&seg.name);
            if !seg.args.is_empty() {
                out.push('<');
                for (j, arg) in seg.args.iter().enumerate() {
                    if j > 0 {
                        out.push_str(", ");
                    }
                    match arg {
                        TemplateArg::Type(t) => out.push_str(&t.canonical_name()),
                        TemplateArg::Int(v) => out.push_str(&v.to_string()),
                        TemplateArg::Other => out.push('?'),
                    }
                }
                out.push('>');
            }
        }
        out
    }

    /// The type as written in the signature, with const/reference/pointer
    /// decoration but without the leading scope separator.
    pub fn written_name(&self) -> String {
        let mut out = String::new();
        if self.is_const {
            out.push_str("const ");
        }
        out.push_str(&self.canonical_name());
        for _ in 0..self.pointer_depth {
            out.push('*');
        }
        match self.ref_kind {
            RefKind::None => {}
            RefKind::LValue => out.push('&'),
            RefKind::RValue => out.push_str("&&"),
        }
        out
    }

    /// The decayed form: no const, no reference. Pointers stay, since they
    /// are rejected with their own diagnostic.
    pub fn decayed(&self) -> TypeExpr {
        let mut out = self.clone();
        out.is_const = false;
        out.ref_kind = RefKind::None;
        out
    }
}
