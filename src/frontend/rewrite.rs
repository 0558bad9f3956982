use std::collections::HashMap;

use super::ast::Span;
use super::diagnostic::Diagnostics;
use super::lexer::{Keyword, Symbol, Token, TokenKind};

pub const RPC_MACRO: &str = "FREM_RPC";
pub const TYPE_ALIAS_MACRO: &str = "FREM_TYPE_ALIAS";

/// Annotation attribute prefix carried on the declaration that follows a
/// rewritten RPC macro.
pub const RPC_ATTR_PREFIX: &str = "_frem_rpc:";

const RPC_ARG_PREFIX: &str = "_frem_rpc_arg";
const VAR_PREFIX: &str = "_frem_var";

/// Side channel from the rewriter to the harvester: synthetic variable name
/// to the annotation group it belongs to and the source location the
/// annotation piece was written at.
#[derive(Clone, Copy, Debug)]
pub struct AnnotationOrigin {
    pub group: u32,
    pub span: Span,
}

pub struct RewriteOutput {
    pub tokens: Vec<Token>,
    pub origins: HashMap<String, AnnotationOrigin>,
}

/// Intercepts the annotation macros in a preprocessed token stream and
/// splices in well-formed synthetic declarations in their place.
pub struct MacroRewriter {
    // One group per recognized macro expansion; the link that reunites the
    // scattered pieces in the harvester.
    annotation_group: u32,
    // Unique across the whole translation unit to avoid name clashes.
    var_counter: u32,
}

impl Default for MacroRewriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MacroRewriter {
    pub fn new() -> Self {
        Self {
            annotation_group: 0,
            var_counter: 0,
        }
    }

    pub fn rewrite(&mut self, tokens: Vec<Token>, diags: &mut Diagnostics) -> RewriteOutput {
        let mut out = Vec::with_capacity(tokens.len());
        let mut origins = HashMap::new();
        let mut idx = 0;

        while idx < tokens.len() {
            let token = &tokens[idx];
            let macro_name = match &token.kind {
                TokenKind::Ident(name)
                    if (name == RPC_MACRO || name == TYPE_ALIAS_MACRO)
                        && matches!(
                            tokens.get(idx + 1).map(|t| &t.kind),
                            Some(TokenKind::Symbol(Symbol::LParen))
                        ) =>
                {
                    name.clone()
                }
                _ => {
                    out.push(token.clone());
                    idx += 1;
                    continue;
                }
            };

            let macro_span = token.span;
            let (args, next) = collect_macro_args(&tokens, idx + 2);
            idx = next;
            self.annotation_group += 1;

            if macro_name == RPC_MACRO {
                self.rewrite_rpc(macro_span, &args, diags, &mut out, &mut origins);
            } else {
                self.rewrite_type_alias(macro_span, &args, diags, &mut out);
            }
        }

        RewriteOutput {
            tokens: out,
            origins,
        }
    }

    fn unique_name(&mut self, prefix: &str, group: u32, span: Span) -> String {
        self.var_counter += 1;
        format!(
            "{}_{}_{}_{}_{}",
            prefix, self.var_counter, group, span.file, span.line
        )
    }

    /// Turn `FREM_RPC(Code(123), Alias("Foo"))` into one synthetic constant
    /// per piece plus the annotate attribute for the following declaration.
    fn rewrite_rpc(
        &mut self,
        macro_span: Span,
        args: &[Token],
        diags: &mut Diagnostics,
        out: &mut Vec<Token>,
        origins: &mut HashMap<String, AnnotationOrigin>,
    ) {
        let pieces = match split_annotation_pieces(args, diags) {
            Some(pieces) => pieces,
            None => return,
        };
        if pieces.is_empty() {
            diags.error("annotation cannot be empty", Some(macro_span));
            return;
        }

        let group = self.annotation_group;
        for piece in &pieces {
            let mut piece = piece.clone();
            // Rewrite `Kind(...)` to `Kind{...}` so the piece cannot parse
            // as a declaration of a function.
            if piece.len() >= 3
                && matches!(piece[1].kind, TokenKind::Symbol(Symbol::LParen))
                && matches!(
                    piece.last().map(|t| &t.kind),
                    Some(TokenKind::Symbol(Symbol::RParen))
                )
            {
                let last = piece.len() - 1;
                piece[1].kind = TokenKind::Symbol(Symbol::LBrace);
                piece[last].kind = TokenKind::Symbol(Symbol::RBrace);
            }

            let piece_span = piece[0].span;
            let var_name = self.unique_name(RPC_ARG_PREFIX, group, piece_span);
            origins.insert(
                var_name.clone(),
                AnnotationOrigin {
                    group,
                    span: piece_span,
                },
            );

            // static constexpr ::frem::<Kind> <var>{...};
            push_tokens(
                out,
                piece_span,
                &[
                    TokenKind::Keyword(Keyword::Static),
                    TokenKind::Keyword(Keyword::Constexpr),
                    TokenKind::Symbol(Symbol::ColonColon),
                    TokenKind::Ident("frem".to_string()),
                    TokenKind::Symbol(Symbol::ColonColon),
                ],
            );
            out.push(piece[0].clone());
            push_tokens(out, piece_span, &[TokenKind::Ident(var_name)]);
            out.extend(piece[1..].iter().cloned());
            push_tokens(out, piece_span, &[TokenKind::Symbol(Symbol::Semi)]);
        }

        // __attribute__((annotate("_frem_rpc:<group>"))) tags the next
        // declaration, the annotated function.
        push_tokens(
            out,
            macro_span,
            &[
                TokenKind::Ident("__attribute__".to_string()),
                TokenKind::Symbol(Symbol::LParen),
                TokenKind::Symbol(Symbol::LParen),
                TokenKind::Ident("annotate".to_string()),
                TokenKind::Symbol(Symbol::LParen),
                TokenKind::StringLit(format!("{}{}", RPC_ATTR_PREFIX, group)),
                TokenKind::Symbol(Symbol::RParen),
                TokenKind::Symbol(Symbol::RParen),
                TokenKind::Symbol(Symbol::RParen),
            ],
        );
    }

    /// Turn `FREM_TYPE_ALIAS(Type, "Alias")` into a sizeof-forcing constant
    /// (full template instantiation) and the alias carrier declaration.
    fn rewrite_type_alias(
        &mut self,
        macro_span: Span,
        args: &[Token],
        diags: &mut Diagnostics,
        out: &mut Vec<Token>,
    ) {
        let halves = split_top_level(args);
        if halves.len() != 2 || halves[0].is_empty() || halves[1].is_empty() {
            diags.error("expected a type and an alias string", Some(macro_span));
            return;
        }
        let (type_tokens, alias_tokens) = (&halves[0], &halves[1]);
        let type_span = type_tokens[0].span;
        let group = self.annotation_group;

        let sizeof_var = self.unique_name(VAR_PREFIX, group, type_span);
        let alias_var = self.unique_name(VAR_PREFIX, group, type_span);

        // constexpr auto <v1>{ sizeof(<type>) };
        push_tokens(
            out,
            type_span,
            &[
                TokenKind::Keyword(Keyword::Constexpr),
                TokenKind::Keyword(Keyword::Auto),
                TokenKind::Ident(sizeof_var),
                TokenKind::Symbol(Symbol::LBrace),
                TokenKind::Keyword(Keyword::Sizeof),
                TokenKind::Symbol(Symbol::LParen),
            ],
        );
        out.extend(type_tokens.iter().cloned());
        push_tokens(
            out,
            type_span,
            &[
                TokenKind::Symbol(Symbol::RParen),
                TokenKind::Symbol(Symbol::RBrace),
                TokenKind::Symbol(Symbol::Semi),
            ],
        );

        // constexpr ::frem::TypeAlias<<type>> <v2>{<alias>};
        push_tokens(
            out,
            type_span,
            &[
                TokenKind::Keyword(Keyword::Constexpr),
                TokenKind::Symbol(Symbol::ColonColon),
                TokenKind::Ident("frem".to_string()),
                TokenKind::Symbol(Symbol::ColonColon),
                TokenKind::Ident("TypeAlias".to_string()),
                TokenKind::Symbol(Symbol::Lt),
            ],
        );
        out.extend(type_tokens.iter().cloned());
        push_tokens(
            out,
            type_span,
            &[
                TokenKind::Symbol(Symbol::Gt),
                TokenKind::Ident(alias_var),
                TokenKind::Symbol(Symbol::LBrace),
            ],
        );
        out.extend(alias_tokens.iter().cloned());
        push_tokens(
            out,
            type_span,
            &[
                TokenKind::Symbol(Symbol::RBrace),
                TokenKind::Symbol(Symbol::Semi),
            ],
        );
    }
}

fn push_tokens(out: &mut Vec<Token>, span: Span, kinds: &[TokenKind]) {
    for kind in kinds {
        out.push(Token {
            kind: kind.clone(),
            span,
        });
    }
}

/// Collect the argument tokens of a macro call, starting just past the
/// opening parenthesis. Returns the tokens and the index after the closing
/// parenthesis.
fn collect_macro_args(tokens: &[Token], mut idx: usize) -> (Vec<Token>, usize) {
    let mut depth = 1usize;
    let mut args = Vec::new();
    while idx < tokens.len() {
        match &tokens[idx].kind {
            TokenKind::Symbol(Symbol::LParen) => depth += 1,
            TokenKind::Symbol(Symbol::RParen) => {
                depth -= 1;
                if depth == 0 {
                    return (args, idx + 1);
                }
            }
            TokenKind::Eof => break,
            _ => {}
        }
        args.push(tokens[idx].clone());
        idx += 1;
    }
    (args, idx)
}

/// Split macro argument tokens into annotation pieces. Each piece must
/// begin with an identifier; nesting counts parentheses and braces together,
/// tolerating mismatched closers (the downstream parser reports those).
fn split_annotation_pieces(args: &[Token], diags: &mut Diagnostics) -> Option<Vec<Vec<Token>>> {
    let mut pieces: Vec<Vec<Token>> = Vec::new();
    let mut iter = args.iter().peekable();

    while let Some(first) = iter.next() {
        if !matches!(first.kind, TokenKind::Ident(_) | TokenKind::Keyword(_)) {
            diags.error("expected identifier", Some(first.span));
            return None;
        }
        let mut piece = vec![first.clone()];

        // Advance to the opening parenthesis or brace.
        let mut opened = false;
        for token in iter.by_ref() {
            let is_open = matches!(
                token.kind,
                TokenKind::Symbol(Symbol::LParen) | TokenKind::Symbol(Symbol::LBrace)
            );
            piece.push(token.clone());
            if is_open {
                opened = true;
                break;
            }
        }
        if !opened {
            pieces.push(piece);
            break;
        }

        let mut open = 1i32;
        for token in iter.by_ref() {
            match token.kind {
                TokenKind::Symbol(Symbol::LParen) | TokenKind::Symbol(Symbol::LBrace) => open += 1,
                TokenKind::Symbol(Symbol::RParen) | TokenKind::Symbol(Symbol::RBrace) => open -= 1,
                _ => {}
            }
            piece.push(token.clone());
            if open == 0 {
                if matches!(
                    iter.peek().map(|t| &t.kind),
                    Some(TokenKind::Symbol(Symbol::Comma))
                ) {
                    iter.next();
                }
                break;
            }
        }
        pieces.push(piece);
    }

    Some(pieces)
}

/// Split tokens on top-level commas (parentheses, braces, brackets and
/// template angles all nest).
fn split_top_level(args: &[Token]) -> Vec<Vec<Token>> {
    let mut parts: Vec<Vec<Token>> = vec![Vec::new()];
    let mut depth = 0i32;
    for token in args {
        match token.kind {
            TokenKind::Symbol(Symbol::LParen)
            | TokenKind::Symbol(Symbol::LBrace)
            | TokenKind::Symbol(Symbol::LBracket)
            | TokenKind::Symbol(Symbol::Lt) => depth += 1,
            TokenKind::Symbol(Symbol::RParen)
            | TokenKind::Symbol(Symbol::RBrace)
            | TokenKind::Symbol(Symbol::RBracket)
            | TokenKind::Symbol(Symbol::Gt) => depth -= 1,
            TokenKind::Symbol(Symbol::Comma) if depth == 0 => {
                parts.push(Vec::new());
                continue;
            }
            _ => {}
        }
        if let Some(part) = parts.last_mut() {
            part.push(token.clone());
        }
    }
    if parts.len() == 1 && parts[0].is_empty() {
        parts.clear();
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    fn rewrite(src: &str) -> (RewriteOutput, Diagnostics) {
        let tokens = Lexer::new(src, 0).lex_all();
        let mut diags = Diagnostics::default();
        let out = MacroRewriter::new().rewrite(tokens, &mut diags);
        (out, diags)
    }

    fn render(tokens: &[Token]) -> String {
        let mut out = String::new();
        for t in tokens {
            match &t.kind {
                TokenKind::Ident(s) => {
                    out.push_str(s);
                    out.push(' ');
                }
                TokenKind::Keyword(k) => {
                    out.push_str(k.text());
                    out.push(' ');
                }
                TokenKind::IntLit(v) => {
                    out.push_str(&v.to_string());
                    out.push(' ');
                }
                TokenKind::StringLit(s) => {
                    out.push_str(&format!("{:?} ", s));
                }
                TokenKind::Symbol(sym) => {
                    out.push_str(&format!("{:?} ", sym));
                }
                _ => {}
            }
        }
        out
    }

    #[test]
    fn rpc_macro_produces_one_constant_per_piece_and_the_attribute() {
        let (out, diags) = rewrite("FREM_RPC(Code(0x1234), Alias(\"Foo\"))\nbool demo();");
        assert!(diags.is_empty());
        assert_eq!(out.origins.len(), 2);

        let text = render(&out.tokens);
        // Parens become braces to avoid the ambiguous-declaration parse.
        assert!(text.contains("static constexpr ColonColon frem ColonColon Code"));
        assert!(text.contains("LBrace 4660 RBrace"));
        assert!(text.contains("static constexpr ColonColon frem ColonColon Alias"));
        assert!(text.contains("LBrace \"Foo\" RBrace"));
        assert!(text.contains("annotate LParen \"_frem_rpc:1\" RParen"));
        // The annotated function follows the injected attribute.
        let attr_pos = text.find("_frem_rpc:1").unwrap();
        let fn_pos = text.find("demo").unwrap();
        assert!(attr_pos < fn_pos);

        for origin in out.origins.values() {
            assert_eq!(origin.group, 1);
        }
    }

    #[test]
    fn group_counter_advances_per_macro_expansion() {
        let (out, diags) = rewrite(
            "FREM_RPC(Code(1))\nvoid a();\nFREM_RPC(Code(2))\nvoid b();",
        );
        assert!(diags.is_empty());
        let mut groups: Vec<u32> = out.origins.values().map(|o| o.group).collect();
        groups.sort_unstable();
        assert_eq!(groups, vec![1, 2]);
        let text = render(&out.tokens);
        assert!(text.contains("_frem_rpc:1"));
        assert!(text.contains("_frem_rpc:2"));
    }

    #[test]
    fn empty_rpc_macro_is_an_error() {
        let (_, diags) = rewrite("FREM_RPC()\nvoid a();");
        assert!(diags.has_errors());
        assert!(diags.items[0].message.contains("annotation cannot be empty"));
    }

    #[test]
    fn piece_without_leading_identifier_is_an_error() {
        let (_, diags) = rewrite("FREM_RPC((123))\nvoid a();");
        assert!(diags.has_errors());
        assert!(diags.items[0].message.contains("expected identifier"));
    }

    #[test]
    fn nested_commas_do_not_split_pieces() {
        let (out, diags) = rewrite("FREM_RPC(Tags(\"a\", \"b\"), Code(7))\nvoid a();");
        assert!(diags.is_empty());
        assert_eq!(out.origins.len(), 2);
    }

    #[test]
    fn type_alias_macro_emits_sizeof_and_carrier() {
        let (out, diags) = rewrite("FREM_TYPE_ALIAS(B::A, \"Packet\")");
        assert!(diags.is_empty());
        let text = render(&out.tokens);
        assert!(text.contains("constexpr auto"));
        assert!(text.contains("sizeof LParen B ColonColon A RParen"));
        assert!(text.contains(
            "constexpr ColonColon frem ColonColon TypeAlias Lt B ColonColon A Gt"
        ));
        assert!(text.contains("LBrace \"Packet\" RBrace"));
    }

    #[test]
    fn type_alias_macro_requires_two_arguments() {
        let (_, diags) = rewrite("FREM_TYPE_ALIAS(B::A)");
        assert!(diags.has_errors());
    }

    #[test]
    fn unrelated_tokens_pass_through_untouched() {
        let (out, diags) = rewrite("namespace frem { struct Code; }");
        assert!(diags.is_empty());
        assert_eq!(out.origins.len(), 0);
        let text = render(&out.tokens);
        assert!(text.contains("namespace frem LBrace struct Code Semi RBrace"));
    }
}
