use super::ast::*;
use super::diagnostic::Diagnostics;
use super::lexer::{Keyword, Symbol, Token, TokenKind};

/// Tolerant recursive-descent parser for the declaration subset. Function
/// bodies are skipped balanced; constructs outside the subset are skipped to
/// the next `;` at brace depth zero. The type checker lives elsewhere, so
/// skipping is recovery, not rejection.
pub struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    pub diags: Diagnostics,
}

struct RecordMeta {
    name: String,
    has_user_special: bool,
    has_virtual: bool,
}

struct Pending {
    doc: Option<String>,
    annotations: Vec<(String, Span)>,
    is_template: bool,
}

impl Pending {
    fn new() -> Self {
        Pending {
            doc: None,
            annotations: Vec::new(),
            is_template: false,
        }
    }

    fn reset_decl_state(&mut self) {
        self.annotations.clear();
        self.is_template = false;
    }
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        // The cursor relies on a trailing Eof token.
        if !matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Eof)) {
            let span = tokens.last().map(|t| t.span).unwrap_or(Span {
                file: 0,
                line: 1,
                column: 1,
            });
            tokens.push(Token {
                kind: TokenKind::Eof,
                span,
            });
        }
        Self {
            tokens,
            idx: 0,
            diags: Diagnostics::default(),
        }
    }

    pub fn parse_unit(&mut self) -> SourceUnit {
        let decls = self.parse_decls(None, None);
        SourceUnit { decls }
    }

    // ----- token helpers -------------------------------------------------

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.idx)
            .unwrap_or_else(|| &self.tokens[self.tokens.len() - 1])
    }

    fn kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn nth_kind(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.idx + n)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn span_here(&self) -> Span {
        self.peek().span
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.idx < self.tokens.len() {
            self.idx += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        matches!(self.kind(), TokenKind::Eof)
    }

    fn at_sym(&self, sym: Symbol) -> bool {
        matches!(self.kind(), TokenKind::Symbol(s) if *s == sym)
    }

    fn at_kw(&self, kw: Keyword) -> bool {
        matches!(self.kind(), TokenKind::Keyword(k) if *k == kw)
    }

    fn eat_sym(&mut self, sym: Symbol) -> bool {
        if self.at_sym(sym) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: Keyword) -> bool {
        if self.at_kw(kw) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn ident_text(&self) -> Option<&str> {
        match self.kind() {
            TokenKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Skip to the next `;` at depth zero, or stop in front of a `}` that
    /// would close the surrounding scope. Consumes the semicolon.
    fn skip_to_semi(&mut self) {
        let mut depth = 0i32;
        while !self.at_eof() {
            match self.kind() {
                TokenKind::Symbol(Symbol::LParen)
                | TokenKind::Symbol(Symbol::LBrace)
                | TokenKind::Symbol(Symbol::LBracket) => depth += 1,
                TokenKind::Symbol(Symbol::RBrace) if depth == 0 => return,
                TokenKind::Symbol(Symbol::RParen)
                | TokenKind::Symbol(Symbol::RBrace)
                | TokenKind::Symbol(Symbol::RBracket) => depth -= 1,
                TokenKind::Symbol(Symbol::Semi) if depth == 0 => {
                    self.bump();
                    return;
                }
                _ => {}
            }
            self.bump();
        }
    }

    /// Consume from the current opening symbol through its matching closer.
    fn skip_balanced(&mut self, open: Symbol, close: Symbol) {
        if !self.eat_sym(open) {
            return;
        }
        let mut depth = 1i32;
        while !self.at_eof() && depth > 0 {
            if self.at_sym(open) {
                depth += 1;
            } else if self.at_sym(close) {
                depth -= 1;
            }
            self.bump();
        }
    }

    /// Consume a `<...>` group, counting parens so that `Fixed<(2)>` and
    /// friends survive.
    fn skip_angles(&mut self) {
        if !self.eat_sym(Symbol::Lt) {
            return;
        }
        let mut angles = 1i32;
        let mut parens = 0i32;
        while !self.at_eof() && angles > 0 {
            match self.kind() {
                TokenKind::Symbol(Symbol::Lt) if parens == 0 => angles += 1,
                TokenKind::Symbol(Symbol::Gt) if parens == 0 => angles -= 1,
                TokenKind::Symbol(Symbol::LParen) => parens += 1,
                TokenKind::Symbol(Symbol::RParen) => parens -= 1,
                _ => {}
            }
            self.bump();
        }
    }

    // ----- declarations --------------------------------------------------

    fn parse_decls(
        &mut self,
        terminator: Option<Symbol>,
        mut record: Option<&mut RecordMeta>,
    ) -> Vec<Decl> {
        let mut out = Vec::new();
        let mut pending = Pending::new();

        loop {
            if self.at_eof() {
                if terminator.is_some() {
                    self.diags
                        .error("unexpected end of file", Some(self.span_here()));
                }
                break;
            }
            if let Some(term) = terminator {
                if self.at_sym(term) {
                    break;
                }
            }

            let rec = record.as_mut().map(|r| &mut **r);
            match self.kind().clone() {
                TokenKind::Symbol(Symbol::Semi) => {
                    self.bump();
                    pending.reset_decl_state();
                }
                TokenKind::DocComment(text) => {
                    self.bump();
                    match &mut pending.doc {
                        Some(doc) => {
                            doc.push('\n');
                            doc.push_str(&text);
                        }
                        None => pending.doc = Some(text),
                    }
                }
                TokenKind::Directive(_) | TokenKind::Unknown(_) => {
                    self.bump();
                }
                TokenKind::Ident(name) if name == "__attribute__" => {
                    self.parse_attribute(&mut pending.annotations);
                }
                TokenKind::Symbol(Symbol::LBracket)
                    if matches!(self.nth_kind(1), TokenKind::Symbol(Symbol::LBracket)) =>
                {
                    self.skip_double_bracket_attribute();
                }
                TokenKind::Keyword(Keyword::Public)
                | TokenKind::Keyword(Keyword::Private)
                | TokenKind::Keyword(Keyword::Protected) => {
                    self.bump();
                    self.eat_sym(Symbol::Colon);
                }
                TokenKind::Keyword(Keyword::Template) => {
                    self.bump();
                    self.skip_angles();
                    pending.is_template = true;
                }
                TokenKind::Keyword(Keyword::Namespace) => {
                    if let Some(ns) = self.parse_namespace(false) {
                        out.push(Decl::Namespace(ns));
                    }
                    pending = Pending::new();
                }
                TokenKind::Keyword(Keyword::Inline)
                    if matches!(self.nth_kind(1), TokenKind::Keyword(Keyword::Namespace)) =>
                {
                    self.bump();
                    self.bump();
                    if let Some(ns) = self.parse_namespace(true) {
                        out.push(Decl::Namespace(ns));
                    }
                    pending = Pending::new();
                }
                TokenKind::Keyword(Keyword::Using)
                | TokenKind::Keyword(Keyword::Typedef)
                | TokenKind::Keyword(Keyword::StaticAssert)
                | TokenKind::Keyword(Keyword::Friend) => {
                    self.skip_to_semi();
                    pending.reset_decl_state();
                }
                TokenKind::Keyword(Keyword::Extern)
                    if matches!(self.nth_kind(1), TokenKind::StringLit(_)) =>
                {
                    self.bump();
                    self.bump();
                    if self.at_sym(Symbol::LBrace) {
                        self.bump();
                        let inner = self.parse_decls(Some(Symbol::RBrace), None);
                        self.eat_sym(Symbol::RBrace);
                        out.extend(inner);
                    }
                    pending.reset_decl_state();
                }
                TokenKind::Keyword(Keyword::Struct)
                | TokenKind::Keyword(Keyword::Class)
                | TokenKind::Keyword(Keyword::Union) => {
                    if let Some(decl) = self.parse_record(pending.is_template) {
                        out.push(decl);
                    }
                    pending = Pending::new();
                }
                TokenKind::Keyword(Keyword::Enum) => {
                    if let Some(decl) = self.parse_enum() {
                        out.push(Decl::Enum(decl));
                    }
                    pending = Pending::new();
                }
                TokenKind::Symbol(Symbol::Tilde) if rec.is_some() => {
                    if let Some(r) = rec {
                        self.parse_special_member(r, true);
                    }
                    pending.reset_decl_state();
                }
                TokenKind::Ident(name)
                    if rec.as_ref().map(|r| r.name == name).unwrap_or(false)
                        && matches!(self.nth_kind(1), TokenKind::Symbol(Symbol::LParen)) =>
                {
                    if let Some(r) = rec {
                        self.parse_special_member(r, false);
                    }
                    pending.reset_decl_state();
                }
                _ => {
                    let decls = self.parse_declaration(rec, &mut pending);
                    out.extend(decls);
                    pending.reset_decl_state();
                }
            }
        }
        out
    }

    fn parse_namespace(&mut self, is_inline: bool) -> Option<NamespaceDecl> {
        // The namespace keyword is consumed for the plain form only.
        if self.at_kw(Keyword::Namespace) {
            self.bump();
        }
        let span = self.span_here();
        let mut names = Vec::new();
        while let Some(name) = self.ident_text() {
            names.push(name.to_string());
            self.bump();
            if self.at_sym(Symbol::ColonColon) {
                self.bump();
            } else {
                break;
            }
        }
        if names.is_empty() {
            // Anonymous namespace: contents are still visited.
            names.push(String::new());
        }
        if !self.at_sym(Symbol::LBrace) {
            // Namespace alias or similar.
            self.skip_to_semi();
            return None;
        }
        self.bump();
        let decls = self.parse_decls(Some(Symbol::RBrace), None);
        self.eat_sym(Symbol::RBrace);

        let mut node = NamespaceDecl {
            name: names.pop().unwrap_or_default(),
            is_inline,
            decls,
            span,
        };
        while let Some(name) = names.pop() {
            node = NamespaceDecl {
                name,
                is_inline: false,
                decls: vec![Decl::Namespace(node)],
                span,
            };
        }
        Some(node)
    }

    fn parse_record(&mut self, is_template: bool) -> Option<Decl> {
        let span = self.span_here();
        let keyword = match self.bump().kind {
            TokenKind::Keyword(Keyword::Struct) => RecordKeyword::Struct,
            TokenKind::Keyword(Keyword::Class) => RecordKeyword::Class,
            _ => RecordKeyword::Union,
        };
        // alignas / attributes between the keyword and the name.
        while matches!(self.kind(), TokenKind::Ident(n) if n == "__attribute__" || n == "alignas")
        {
            let mut sink = Vec::new();
            self.parse_attribute(&mut sink);
        }

        let Some(name) = self.ident_text().map(str::to_string) else {
            // Anonymous record: skip the body.
            if self.at_sym(Symbol::LBrace) {
                self.skip_balanced(Symbol::LBrace, Symbol::RBrace);
            }
            self.skip_to_semi();
            return None;
        };
        self.bump();
        self.eat_kw(Keyword::Final);
        // Template-id in the declarator (explicit specialization).
        if self.at_sym(Symbol::Lt) {
            self.skip_angles();
        }

        let mut bases = Vec::new();
        if self.eat_sym(Symbol::Colon) {
            loop {
                while self.at_kw(Keyword::Virtual)
                    || self.at_kw(Keyword::Public)
                    || self.at_kw(Keyword::Private)
                    || self.at_kw(Keyword::Protected)
                {
                    self.bump();
                }
                match self.parse_type() {
                    Some(base) => bases.push(base),
                    None => {
                        while !self.at_eof()
                            && !self.at_sym(Symbol::Comma)
                            && !self.at_sym(Symbol::LBrace)
                            && !self.at_sym(Symbol::Semi)
                        {
                            self.bump();
                        }
                    }
                }
                if !self.eat_sym(Symbol::Comma) {
                    break;
                }
            }
        }

        if self.at_sym(Symbol::Semi) {
            self.bump();
            return Some(Decl::Record(RecordDecl {
                keyword,
                name,
                bases,
                members: Vec::new(),
                is_template,
                has_definition: false,
                has_user_special: false,
                has_virtual: false,
                span,
            }));
        }
        if !self.at_sym(Symbol::LBrace) {
            // Elaborated type in a declaration we do not model.
            self.skip_to_semi();
            return None;
        }
        self.bump();

        let mut meta = RecordMeta {
            name: name.clone(),
            has_user_special: false,
            has_virtual: false,
        };
        let members = self.parse_decls(Some(Symbol::RBrace), Some(&mut meta));
        self.eat_sym(Symbol::RBrace);
        // `} instance;` declarators after the body are not modelled.
        self.skip_to_semi();

        Some(Decl::Record(RecordDecl {
            keyword,
            name,
            bases,
            members,
            is_template,
            has_definition: true,
            has_user_special: meta.has_user_special,
            has_virtual: meta.has_virtual,
            span,
        }))
    }

    /// Constructor or destructor; only the effect on trivial copyability is
    /// recorded.
    fn parse_special_member(&mut self, rec: &mut RecordMeta, is_destructor: bool) {
        if is_destructor {
            self.bump(); // '~'
            self.bump(); // name
        } else {
            self.bump(); // name
        }
        let mut is_copy_like = false;
        if self.at_sym(Symbol::LParen) {
            let start = self.idx;
            self.skip_balanced(Symbol::LParen, Symbol::RParen);
            let params = &self.tokens[start..self.idx];
            let mentions_self = params
                .iter()
                .any(|t| matches!(&t.kind, TokenKind::Ident(n) if *n == rec.name));
            let takes_ref = params
                .iter()
                .any(|t| matches!(t.kind, TokenKind::Symbol(Symbol::Amp) | TokenKind::Symbol(Symbol::AmpAmp)));
            is_copy_like = mentions_self && takes_ref;
        }
        // Member initializer list and/or body.
        let mut defaulted = false;
        while !self.at_eof() {
            if self.at_sym(Symbol::Semi) {
                self.bump();
                break;
            }
            if self.at_sym(Symbol::LBrace) {
                self.skip_balanced(Symbol::LBrace, Symbol::RBrace);
                break;
            }
            if self.at_sym(Symbol::Eq) {
                self.bump();
                defaulted = self.at_kw(Keyword::Default);
                continue;
            }
            self.bump();
        }
        if (is_destructor || is_copy_like) && !defaulted {
            rec.has_user_special = true;
        }
    }

    fn parse_enum(&mut self) -> Option<EnumDecl> {
        let span = self.span_here();
        self.bump(); // enum
        let is_scoped = self.eat_kw(Keyword::Class) || self.eat_kw(Keyword::Struct);
        let Some(name) = self.ident_text().map(str::to_string) else {
            self.skip_to_semi();
            return None;
        };
        self.bump();

        let underlying = if self.eat_sym(Symbol::Colon) {
            self.parse_type()
        } else {
            None
        };

        if !self.at_sym(Symbol::LBrace) {
            // Opaque enum declaration.
            self.skip_to_semi();
            return Some(EnumDecl {
                name,
                is_scoped,
                underlying,
                enumerators: Vec::new(),
                span,
            });
        }
        self.bump();

        let mut enumerators = Vec::new();
        while !self.at_eof() && !self.at_sym(Symbol::RBrace) {
            let espan = self.span_here();
            let Some(ename) = self.ident_text().map(str::to_string) else {
                self.bump();
                continue;
            };
            self.bump();
            let mut value = None;
            if self.eat_sym(Symbol::Eq) {
                value = self.parse_literal_int();
                if value.is_none() {
                    // Arbitrary constant expressions keep the running value.
                    let mut depth = 0i32;
                    while !self.at_eof() {
                        match self.kind() {
                            TokenKind::Symbol(Symbol::LParen) => depth += 1,
                            TokenKind::Symbol(Symbol::RParen) => depth -= 1,
                            TokenKind::Symbol(Symbol::Comma) if depth == 0 => break,
                            TokenKind::Symbol(Symbol::RBrace) if depth == 0 => break,
                            _ => {}
                        }
                        self.bump();
                    }
                }
            }
            enumerators.push(Enumerator {
                name: ename,
                value,
                span: espan,
            });
            if !self.eat_sym(Symbol::Comma) {
                break;
            }
        }
        self.eat_sym(Symbol::RBrace);
        self.skip_to_semi();

        Some(EnumDecl {
            name,
            is_scoped,
            underlying,
            enumerators,
            span,
        })
    }

    fn parse_literal_int(&mut self) -> Option<i64> {
        let negative = self.at_sym(Symbol::Minus);
        let offset = if negative { 1 } else { 0 };
        let magnitude = match self.nth_kind(offset) {
            TokenKind::IntLit(v) => *v,
            TokenKind::CharLit(c) => *c as i64,
            _ => return None,
        };
        self.bump();
        if negative {
            self.bump();
        }
        Some(if negative { -magnitude } else { magnitude })
    }

    /// A variable or function declaration, or something we skip.
    fn parse_declaration(
        &mut self,
        rec: Option<&mut RecordMeta>,
        pending: &mut Pending,
    ) -> Vec<Decl> {
        let span = self.span_here();
        let mut is_static = false;
        let mut is_constexpr = false;
        let mut is_virtual = false;

        loop {
            match self.kind() {
                TokenKind::Keyword(Keyword::Static) => {
                    is_static = true;
                    self.bump();
                }
                TokenKind::Keyword(Keyword::Constexpr) => {
                    is_constexpr = true;
                    self.bump();
                }
                TokenKind::Keyword(Keyword::Virtual) => {
                    is_virtual = true;
                    self.bump();
                }
                TokenKind::Keyword(Keyword::Inline)
                | TokenKind::Keyword(Keyword::Mutable)
                | TokenKind::Keyword(Keyword::Explicit)
                | TokenKind::Keyword(Keyword::Extern) => {
                    self.bump();
                }
                _ => break,
            }
        }

        let Some(ty) = self.parse_type() else {
            self.skip_to_semi();
            return Vec::new();
        };

        // Conversion operators and friends.
        if self.at_kw(Keyword::Operator) {
            self.parse_operator_member(rec);
            return Vec::new();
        }

        // Declarator name, possibly qualified (out-of-line definition).
        let mut segments: Vec<String> = Vec::new();
        while let Some(name) = self.ident_text().map(str::to_string) {
            self.bump();
            segments.push(name);
            if self.at_sym(Symbol::ColonColon) && matches!(self.nth_kind(1), TokenKind::Ident(_)) {
                self.bump();
            } else {
                break;
            }
        }
        if segments.is_empty() {
            self.skip_to_semi();
            return Vec::new();
        }
        let qualified = segments.len() > 1;
        let name = segments.pop().unwrap_or_default();

        if self.at_sym(Symbol::LParen) {
            let var_init = matches!(
                self.nth_kind(1),
                TokenKind::StringLit(_)
                    | TokenKind::IntLit(_)
                    | TokenKind::CharLit(_)
                    | TokenKind::Symbol(Symbol::Minus)
            );
            if qualified || !var_init {
                let function = self.parse_function_tail(span, name, ty, is_static, pending);
                if qualified {
                    // Out-of-line member definitions are not harvested.
                    return Vec::new();
                }
                if let (true, Some(r)) = (is_virtual, rec) {
                    r.has_virtual = true;
                }
                return match function {
                    Some(f) => vec![Decl::Function(f)],
                    None => Vec::new(),
                };
            }
        }

        // Variable path. Doc comments stay pending across rewriter-generated
        // constants so they still reach the function they were written for.
        if !name.starts_with("_frem_") {
            pending.doc = None;
        }
        let mut out = Vec::new();
        let mut current_name = name;
        loop {
            let mut has_array_suffix = false;
            while self.at_sym(Symbol::LBracket) {
                has_array_suffix = true;
                self.skip_balanced(Symbol::LBracket, Symbol::RBracket);
            }
            // Bit-field width.
            if self.at_sym(Symbol::Colon) {
                self.bump();
                self.parse_literal_int();
            }

            let init = if self.at_sym(Symbol::LParen) {
                self.bump();
                self.parse_init_args(Symbol::RParen)
            } else if self.at_sym(Symbol::LBrace) {
                self.bump();
                self.parse_init_args(Symbol::RBrace)
            } else if self.at_sym(Symbol::Eq) {
                self.bump();
                let ospan = self.span_here();
                let mut depth = 0i32;
                while !self.at_eof() {
                    match self.kind() {
                        TokenKind::Symbol(Symbol::LParen)
                        | TokenKind::Symbol(Symbol::LBrace) => depth += 1,
                        TokenKind::Symbol(Symbol::RParen)
                        | TokenKind::Symbol(Symbol::RBrace) if depth > 0 => depth -= 1,
                        TokenKind::Symbol(Symbol::Semi) if depth == 0 => break,
                        TokenKind::Symbol(Symbol::Comma) if depth == 0 => break,
                        TokenKind::Symbol(Symbol::RBrace) if depth == 0 => break,
                        _ => {}
                    }
                    self.bump();
                }
                vec![InitArg::Other(ospan)]
            } else {
                Vec::new()
            };

            out.push(Decl::Var(VarDecl {
                name: current_name,
                ty: ty.clone(),
                init,
                is_static,
                is_constexpr,
                has_array_suffix,
                span,
            }));

            if self.eat_sym(Symbol::Comma) {
                match self.ident_text().map(str::to_string) {
                    Some(next) => {
                        current_name = next;
                        self.bump();
                    }
                    None => {
                        self.skip_to_semi();
                        break;
                    }
                }
            } else {
                self.eat_sym(Symbol::Semi);
                break;
            }
        }
        out
    }

    fn parse_operator_member(&mut self, rec: Option<&mut RecordMeta>) {
        self.bump(); // operator
        let is_assign = self.at_sym(Symbol::Eq);
        let mut defaulted = false;
        let mut depth = 0i32;
        while !self.at_eof() {
            match self.kind() {
                TokenKind::Symbol(Symbol::LParen) | TokenKind::Symbol(Symbol::LBrace) => {
                    depth += 1
                }
                TokenKind::Symbol(Symbol::RParen) => depth -= 1,
                TokenKind::Symbol(Symbol::RBrace) => {
                    depth -= 1;
                    if depth == 0 {
                        self.bump();
                        break;
                    }
                }
                TokenKind::Keyword(Keyword::Default) => defaulted = true,
                TokenKind::Symbol(Symbol::Semi) if depth == 0 => {
                    self.bump();
                    break;
                }
                _ => {}
            }
            self.bump();
        }
        if is_assign && !defaulted {
            if let Some(r) = rec {
                r.has_user_special = true;
            }
        }
    }

    fn parse_function_tail(
        &mut self,
        span: Span,
        name: String,
        ret: TypeExpr,
        is_static: bool,
        pending: &mut Pending,
    ) -> Option<FunctionDecl> {
        let params = self.parse_params()?;

        let mut is_const = false;
        let mut is_noexcept = false;
        loop {
            match self.kind() {
                TokenKind::Keyword(Keyword::Const) => {
                    is_const = true;
                    self.bump();
                }
                TokenKind::Keyword(Keyword::Noexcept) => {
                    is_noexcept = true;
                    self.bump();
                    if self.at_sym(Symbol::LParen) {
                        self.skip_balanced(Symbol::LParen, Symbol::RParen);
                    }
                }
                TokenKind::Keyword(Keyword::Override)
                | TokenKind::Keyword(Keyword::Final)
                | TokenKind::Keyword(Keyword::Volatile)
                | TokenKind::Symbol(Symbol::Amp)
                | TokenKind::Symbol(Symbol::AmpAmp) => {
                    self.bump();
                }
                TokenKind::Keyword(Keyword::Throw) => {
                    self.bump();
                    if self.at_sym(Symbol::LParen) {
                        self.skip_balanced(Symbol::LParen, Symbol::RParen);
                    }
                }
                TokenKind::Symbol(Symbol::Arrow) => {
                    self.bump();
                    let _ = self.parse_type();
                }
                _ => break,
            }
        }

        if self.at_sym(Symbol::Eq) {
            // Pure virtual, defaulted or deleted.
            self.skip_to_semi();
        } else if self.at_sym(Symbol::LBrace) {
            // Bodies carry nothing the extraction needs.
            self.skip_balanced(Symbol::LBrace, Symbol::RBrace);
        } else {
            self.eat_sym(Symbol::Semi);
        }

        Some(FunctionDecl {
            name,
            ret,
            params,
            is_static,
            is_const,
            is_noexcept,
            is_template: pending.is_template,
            annotations: std::mem::take(&mut pending.annotations),
            doc: pending.doc.take(),
            span,
        })
    }

    fn parse_params(&mut self) -> Option<Vec<ParamDecl>> {
        if !self.eat_sym(Symbol::LParen) {
            return None;
        }
        let mut params = Vec::new();
        if self.eat_sym(Symbol::RParen) {
            return Some(params);
        }
        // `(void)` parameter lists are empty.
        if self.at_kw(Keyword::Void)
            && matches!(self.nth_kind(1), TokenKind::Symbol(Symbol::RParen))
        {
            self.bump();
            self.bump();
            return Some(params);
        }

        loop {
            if self.at_sym(Symbol::Ellipsis) {
                self.bump();
            } else {
                let pspan = self.span_here();
                match self.parse_type() {
                    Some(ty) => {
                        let name = match self.ident_text() {
                            Some(name) => {
                                let name = name.to_string();
                                self.bump();
                                name
                            }
                            None => String::new(),
                        };
                        while self.at_sym(Symbol::LBracket) {
                            self.skip_balanced(Symbol::LBracket, Symbol::RBracket);
                        }
                        let mut has_default = false;
                        if self.at_sym(Symbol::Eq) {
                            has_default = true;
                            self.bump();
                            self.skip_param_default();
                        }
                        params.push(ParamDecl {
                            name,
                            ty,
                            has_default,
                            span: pspan,
                        });
                    }
                    None => {
                        self.skip_param_default();
                    }
                }
            }
            if self.eat_sym(Symbol::Comma) {
                continue;
            }
            break;
        }
        self.eat_sym(Symbol::RParen);
        Some(params)
    }

    fn skip_param_default(&mut self) {
        let mut depth = 0i32;
        while !self.at_eof() {
            match self.kind() {
                TokenKind::Symbol(Symbol::LParen)
                | TokenKind::Symbol(Symbol::LBrace)
                | TokenKind::Symbol(Symbol::LBracket) => depth += 1,
                TokenKind::Symbol(Symbol::RParen) if depth == 0 => return,
                TokenKind::Symbol(Symbol::Comma) if depth == 0 => return,
                TokenKind::Symbol(Symbol::RParen)
                | TokenKind::Symbol(Symbol::RBrace)
                | TokenKind::Symbol(Symbol::RBracket) => depth -= 1,
                _ => {}
            }
            self.bump();
        }
    }

    fn parse_init_args(&mut self, close: Symbol) -> Vec<InitArg> {
        let mut args = Vec::new();
        loop {
            if self.at_eof() || self.eat_sym(close) {
                break;
            }
            args.push(self.parse_init_arg(close));
            if self.eat_sym(Symbol::Comma) {
                continue;
            }
            if self.eat_sym(close) {
                break;
            }
            // Tolerant recovery: drop tokens until a separator.
            let mut depth = 0i32;
            while !self.at_eof() {
                match self.kind() {
                    TokenKind::Symbol(Symbol::LParen)
                    | TokenKind::Symbol(Symbol::LBrace) => depth += 1,
                    TokenKind::Symbol(s) if *s == close && depth == 0 => break,
                    TokenKind::Symbol(Symbol::Comma) if depth == 0 => break,
                    TokenKind::Symbol(Symbol::RParen)
                    | TokenKind::Symbol(Symbol::RBrace) => depth -= 1,
                    _ => {}
                }
                self.bump();
            }
            self.eat_sym(Symbol::Comma);
        }
        args
    }

    fn parse_init_arg(&mut self, close: Symbol) -> InitArg {
        let span = self.span_here();
        if let Some(value) = self.parse_literal_int() {
            return InitArg::Int(value, span);
        }
        if let TokenKind::StringLit(first) = self.kind().clone() {
            self.bump();
            let mut text = first;
            while let TokenKind::StringLit(next) = self.kind().clone() {
                text.push_str(&next);
                self.bump();
            }
            return InitArg::Str(text, span);
        }
        if self.at_kw(Keyword::True) {
            self.bump();
            return InitArg::Int(1, span);
        }
        if self.at_kw(Keyword::False) {
            self.bump();
            return InitArg::Int(0, span);
        }
        if matches!(self.kind(), TokenKind::Ident(_)) || self.at_sym(Symbol::ColonColon) {
            self.eat_sym(Symbol::ColonColon);
            let mut segments = Vec::new();
            while let Some(name) = self.ident_text().map(str::to_string) {
                segments.push(name);
                self.bump();
                if self.at_sym(Symbol::ColonColon) {
                    self.bump();
                } else {
                    break;
                }
            }
            if !segments.is_empty() {
                if self.at_sym(Symbol::LParen) {
                    self.bump();
                    let args = self.parse_init_args(Symbol::RParen);
                    return InitArg::Call {
                        name: segments.pop().unwrap_or_default(),
                        args,
                        span,
                    };
                }
                if self.at_sym(Symbol::LBrace) {
                    self.bump();
                    let args = self.parse_init_args(Symbol::RBrace);
                    return InitArg::Call {
                        name: segments.pop().unwrap_or_default(),
                        args,
                        span,
                    };
                }
                return InitArg::Ident(segments.join("::"), span);
            }
        }

        // Anything else: swallow one argument's worth of tokens.
        let mut depth = 0i32;
        while !self.at_eof() {
            match self.kind() {
                TokenKind::Symbol(Symbol::LParen)
                | TokenKind::Symbol(Symbol::LBrace)
                | TokenKind::Symbol(Symbol::LBracket) => depth += 1,
                TokenKind::Symbol(s) if *s == close && depth == 0 => break,
                TokenKind::Symbol(Symbol::Comma) if depth == 0 => break,
                TokenKind::Symbol(Symbol::RParen)
                | TokenKind::Symbol(Symbol::RBrace)
                | TokenKind::Symbol(Symbol::RBracket) => depth -= 1,
                _ => {}
            }
            self.bump();
        }
        InitArg::Other(span)
    }

    fn parse_attribute(&mut self, out: &mut Vec<(String, Span)>) {
        let attr_span = self.span_here();
        self.bump(); // __attribute__ or alignas
        if !self.at_sym(Symbol::LParen) {
            return;
        }
        self.bump();
        let mut depth = 1i32;
        while !self.at_eof() && depth > 0 {
            match self.kind().clone() {
                TokenKind::Symbol(Symbol::LParen) => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::Symbol(Symbol::RParen) => {
                    depth -= 1;
                    self.bump();
                }
                TokenKind::Ident(name) if name == "annotate" => {
                    self.bump();
                    if self.at_sym(Symbol::LParen) {
                        self.bump();
                        depth += 1;
                        let mut payload = String::new();
                        while let TokenKind::StringLit(text) = self.kind().clone() {
                            payload.push_str(&text);
                            self.bump();
                        }
                        if !payload.is_empty() {
                            out.push((payload, attr_span));
                        }
                    }
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn skip_double_bracket_attribute(&mut self) {
        self.bump();
        self.bump();
        let mut depth = 2i32;
        while !self.at_eof() && depth > 0 {
            match self.kind() {
                TokenKind::Symbol(Symbol::LBracket) => depth += 1,
                TokenKind::Symbol(Symbol::RBracket) => depth -= 1,
                _ => {}
            }
            self.bump();
        }
    }

    // ----- types ---------------------------------------------------------

    /// Speculative: restores the cursor and returns None when the tokens do
    /// not form a type. Never emits diagnostics.
    fn parse_type(&mut self) -> Option<TypeExpr> {
        let start = self.idx;
        let span = self.span_here();
        let mut is_const = false;
        let mut rooted = false;

        loop {
            match self.kind() {
                TokenKind::Keyword(Keyword::Const) => {
                    is_const = true;
                    self.bump();
                }
                TokenKind::Keyword(Keyword::Volatile) | TokenKind::Keyword(Keyword::Typename) => {
                    self.bump();
                }
                TokenKind::Keyword(Keyword::Struct)
                | TokenKind::Keyword(Keyword::Class)
                | TokenKind::Keyword(Keyword::Enum)
                    if matches!(self.nth_kind(1), TokenKind::Ident(_)) =>
                {
                    // Elaborated type specifier.
                    self.bump();
                }
                _ => break,
            }
        }
        if self.at_sym(Symbol::ColonColon) {
            rooted = true;
            self.bump();
        }

        let mut segments = Vec::new();
        if matches!(self.kind(), TokenKind::Keyword(k) if k.is_fundamental()) {
            let mut words = Vec::new();
            while let TokenKind::Keyword(k) = self.kind() {
                if !k.is_fundamental() {
                    break;
                }
                words.push(k.text().to_string());
                self.bump();
            }
            segments.push(TypeSegment {
                name: words.join(" "),
                args: Vec::new(),
            });
        } else {
            loop {
                let Some(name) = self.ident_text().map(str::to_string) else {
                    break;
                };
                self.bump();
                let args = if self.at_sym(Symbol::Lt) {
                    match self.parse_template_args() {
                        Some(args) => args,
                        None => {
                            self.idx = start;
                            return None;
                        }
                    }
                } else {
                    Vec::new()
                };
                segments.push(TypeSegment { name, args });
                if self.at_sym(Symbol::ColonColon)
                    && matches!(self.nth_kind(1), TokenKind::Ident(_))
                {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if segments.is_empty() {
            self.idx = start;
            return None;
        }

        loop {
            match self.kind() {
                TokenKind::Keyword(Keyword::Const) => {
                    is_const = true;
                    self.bump();
                }
                TokenKind::Keyword(Keyword::Volatile) => {
                    self.bump();
                }
                _ => break,
            }
        }

        let mut pointer_depth = 0usize;
        while self.at_sym(Symbol::Star) {
            pointer_depth += 1;
            self.bump();
            while self.at_kw(Keyword::Const) || self.at_kw(Keyword::Volatile) {
                self.bump();
            }
        }
        let ref_kind = if self.eat_sym(Symbol::Amp) {
            RefKind::LValue
        } else if self.eat_sym(Symbol::AmpAmp) {
            RefKind::RValue
        } else {
            RefKind::None
        };

        Some(TypeExpr {
            is_const,
            rooted,
            segments,
            ref_kind,
            pointer_depth,
            span,
        })
    }

    fn parse_template_args(&mut self) -> Option<Vec<TemplateArg>> {
        self.bump(); // '<'
        let mut args = Vec::new();
        if self.eat_sym(Symbol::Gt) {
            return Some(args);
        }
        loop {
            if let Some(value) = self.parse_literal_int() {
                args.push(TemplateArg::Int(value));
            } else if self.at_kw(Keyword::True) {
                self.bump();
                args.push(TemplateArg::Int(1));
            } else if self.at_kw(Keyword::False) {
                self.bump();
                args.push(TemplateArg::Int(0));
            } else if let Some(ty) = self.parse_type() {
                args.push(TemplateArg::Type(ty));
            } else {
                // Swallow one unevaluable argument.
                args.push(TemplateArg::Other);
                let mut angles = 0i32;
                let mut parens = 0i32;
                while !self.at_eof() {
                    match self.kind() {
                        TokenKind::Symbol(Symbol::Lt) => angles += 1,
                        TokenKind::Symbol(Symbol::Gt) if angles == 0 && parens == 0 => break,
                        TokenKind::Symbol(Symbol::Gt) => angles -= 1,
                        TokenKind::Symbol(Symbol::LParen) => parens += 1,
                        TokenKind::Symbol(Symbol::RParen) => parens -= 1,
                        TokenKind::Symbol(Symbol::Comma) if angles == 0 && parens == 0 => break,
                        _ => {}
                    }
                    self.bump();
                }
            }
            if self.eat_sym(Symbol::Comma) {
                continue;
            }
            if self.eat_sym(Symbol::Gt) {
                return Some(args);
            }
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    fn parse(src: &str) -> SourceUnit {
        let tokens = Lexer::new(src, 0).lex_all();
        let mut parser = Parser::new(tokens);
        parser.parse_unit()
    }

    fn only_record(unit: &SourceUnit) -> &RecordDecl {
        match &unit.decls[0] {
            Decl::Record(rec) => rec,
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn parses_struct_with_fields() {
        let unit = parse("struct S { bool a; uint16_t b; };");
        let rec = only_record(&unit);
        assert_eq!(rec.name, "S");
        assert!(rec.has_definition);
        let fields: Vec<_> = rec.fields().collect();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "a");
        assert_eq!(fields[0].ty.canonical_name(), "bool");
        assert_eq!(fields[1].ty.canonical_name(), "uint16_t");
    }

    #[test]
    fn parses_class_with_base_and_methods() {
        let unit = parse(
            "class Manager : public frem::RpcService<Manager> {\n\
             public:\n\
               Manager();\n\
               Manager(const Manager& other) = delete;\n\
               bool demo();\n\
               static Manager& instance();\n\
               void update(const S& s) const noexcept;\n\
             };",
        );
        let rec = only_record(&unit);
        assert_eq!(rec.bases.len(), 1);
        assert_eq!(
            rec.bases[0].canonical_name(),
            "frem::RpcService<Manager>"
        );
        let methods: Vec<_> = rec.methods().collect();
        assert_eq!(methods.len(), 3);
        assert_eq!(methods[0].name, "demo");
        assert!(methods[1].is_static);
        assert_eq!(methods[1].ret.written_name(), "Manager&");
        assert!(methods[2].is_const);
        assert!(methods[2].is_noexcept);
        assert_eq!(methods[2].params[0].ty.written_name(), "const S&");
    }

    #[test]
    fn scoped_enum_with_underlying_type() {
        let unit = parse("enum class Color : uint8_t { Red, Green = 5, Blue };");
        let Decl::Enum(decl) = &unit.decls[0] else {
            panic!("expected enum");
        };
        assert!(decl.is_scoped);
        assert_eq!(
            decl.underlying.as_ref().unwrap().canonical_name(),
            "uint8_t"
        );
        assert_eq!(decl.enumerators.len(), 3);
        assert_eq!(decl.enumerators[1].value, Some(5));
        assert_eq!(decl.enumerators[2].value, None);
    }

    #[test]
    fn namespaces_nest_and_inline_is_flagged() {
        let unit = parse("namespace A::B { struct S { bool x; }; } inline namespace V { }");
        let Decl::Namespace(a) = &unit.decls[0] else {
            panic!("expected namespace");
        };
        assert_eq!(a.name, "A");
        let Decl::Namespace(b) = &a.decls[0] else {
            panic!("expected nested namespace");
        };
        assert_eq!(b.name, "B");
        assert!(matches!(b.decls[0], Decl::Record(_)));
        let Decl::Namespace(v) = &unit.decls[1] else {
            panic!("expected inline namespace");
        };
        assert!(v.is_inline);
    }

    #[test]
    fn synthetic_constant_parses_as_static_member_var() {
        let unit = parse(
            "struct R { static constexpr ::frem::Code _frem_rpc_arg_1_1_0_3{0x1234}; };",
        );
        let rec = only_record(&unit);
        let Decl::Var(var) = &rec.members[0] else {
            panic!("expected var");
        };
        assert!(var.is_static && var.is_constexpr);
        assert_eq!(var.ty.canonical_name(), "frem::Code");
        assert!(var.ty.rooted);
        assert_eq!(var.init.len(), 1);
        assert_eq!(var.init[0].as_int(), Some(0x1234));
        assert_eq!(rec.fields().count(), 0);
    }

    #[test]
    fn declarator_var_with_paren_init_and_calls() {
        let unit = parse(
            "frem::ConfigurationDeclarator<A, B> cfg(\"cfg\", frem::SetCode(10), frem::Tags(\"x\", \"y\"));",
        );
        let Decl::Var(var) = &unit.decls[0] else {
            panic!("expected var, got {:?}", unit.decls);
        };
        assert_eq!(var.ty.last_name(), "ConfigurationDeclarator");
        assert_eq!(var.ty.template_args().len(), 2);
        assert_eq!(var.init.len(), 3);
        assert_eq!(var.init[0].as_str(), Some("cfg"));
        let InitArg::Call { name, args, .. } = &var.init[1] else {
            panic!("expected call");
        };
        assert_eq!(name, "SetCode");
        assert_eq!(args[0].as_int(), Some(10));
        let InitArg::Call { name, args, .. } = &var.init[2] else {
            panic!("expected call");
        };
        assert_eq!(name, "Tags");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn annotate_attribute_attaches_to_following_function() {
        let unit = parse(
            "__attribute__((annotate(\"_frem_rpc:3\"))) bool demo(int32_t& out);",
        );
        let Decl::Function(fun) = &unit.decls[0] else {
            panic!("expected function, got {:?}", unit.decls);
        };
        assert_eq!(fun.annotations.len(), 1);
        assert_eq!(fun.annotations[0].0, "_frem_rpc:3");
        assert_eq!(fun.params.len(), 1);
        assert_eq!(fun.params[0].ty.ref_kind, RefKind::LValue);
        assert!(!fun.params[0].ty.is_const);
    }

    #[test]
    fn doc_comment_survives_interleaved_synthetic_vars() {
        let unit = parse(
            "/// Frobnicates the motor.\n\
             static constexpr ::frem::Code _frem_rpc_arg_1_1_0_2{1};\n\
             __attribute__((annotate(\"_frem_rpc:1\"))) bool demo();",
        );
        let fun = unit
            .decls
            .iter()
            .find_map(|d| match d {
                Decl::Function(f) => Some(f),
                _ => None,
            })
            .expect("function");
        assert_eq!(fun.doc.as_deref(), Some("/// Frobnicates the motor."));
    }

    #[test]
    fn template_records_and_functions_are_flagged() {
        let unit = parse(
            "template <typename T> struct Wrapper { T value; };\n\
             template <typename T> T passthrough(T v);",
        );
        let rec = only_record(&unit);
        assert!(rec.is_template);
        let Decl::Function(fun) = &unit.decls[1] else {
            panic!("expected function");
        };
        assert!(fun.is_template);
    }

    #[test]
    fn user_special_members_mark_the_record() {
        let unit = parse(
            "struct A { A(const A& other); bool x; };\n\
             struct B { ~B(); bool x; };\n\
             struct C { C() = default; bool x; };\n\
             struct D { virtual void f(); bool x; };",
        );
        let recs: Vec<_> = unit
            .decls
            .iter()
            .filter_map(|d| match d {
                Decl::Record(r) => Some(r),
                _ => None,
            })
            .collect();
        assert!(recs[0].has_user_special);
        assert!(recs[1].has_user_special);
        assert!(!recs[2].has_user_special);
        assert!(recs[3].has_virtual);
    }

    #[test]
    fn skips_unsupported_constructs_and_keeps_going() {
        let unit = parse(
            "using Alias = int;\n\
             typedef unsigned long weird_t;\n\
             struct Keep { bool k; };",
        );
        assert_eq!(unit.decls.len(), 1);
        assert_eq!(only_record(&unit).name, "Keep");
    }

    #[test]
    fn nested_template_arguments_parse() {
        let unit = parse("std::optional<std::array<int32_t, 4>> v;");
        let Decl::Var(var) = &unit.decls[0] else {
            panic!("expected var");
        };
        assert_eq!(
            var.ty.canonical_name(),
            "std::optional<std::array<int32_t, 4>>"
        );
    }

    #[test]
    fn function_bodies_are_skipped() {
        let unit = parse("bool helper() { if (true) { return false; } return true; } bool after;");
        assert_eq!(unit.decls.len(), 2);
        assert!(matches!(unit.decls[0], Decl::Function(_)));
        assert!(matches!(unit.decls[1], Decl::Var(_)));
    }
}
