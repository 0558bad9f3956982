use super::ast::Span;

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Ident(String),
    IntLit(i64),
    StringLit(String),
    CharLit(char),
    DocComment(String),
    Directive(String),
    Keyword(Keyword),
    Symbol(Symbol),
    Unknown(char),
    Eof,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keyword {
    Namespace,
    Struct,
    Class,
    Union,
    Enum,
    Static,
    Constexpr,
    Const,
    Volatile,
    Mutable,
    Inline,
    Virtual,
    Explicit,
    Extern,
    Template,
    Typename,
    Using,
    Typedef,
    Friend,
    Operator,
    Public,
    Private,
    Protected,
    Noexcept,
    Sizeof,
    Auto,
    Void,
    Bool,
    Char,
    Int,
    Float,
    Double,
    Long,
    Short,
    Signed,
    Unsigned,
    True,
    False,
    Nullptr,
    StaticAssert,
    Decltype,
    Throw,
    Override,
    Final,
    Delete,
    Default,
}

impl Keyword {
    /// Keywords that begin or continue a fundamental type name.
    pub fn is_fundamental(self) -> bool {
        matches!(
            self,
            Keyword::Void
                | Keyword::Bool
                | Keyword::Char
                | Keyword::Int
                | Keyword::Float
                | Keyword::Double
                | Keyword::Long
                | Keyword::Short
                | Keyword::Signed
                | Keyword::Unsigned
                | Keyword::Auto
        )
    }

    pub fn text(self) -> &'static str {
        match self {
            Keyword::Namespace => "namespace",
            Keyword::Struct => "struct",
            Keyword::Class => "class",
            Keyword::Union => "union",
            Keyword::Enum => "enum",
            Keyword::Static => "static",
            Keyword::Constexpr => "constexpr",
            Keyword::Const => "const",
            Keyword::Volatile => "volatile",
            Keyword::Mutable => "mutable",
            Keyword::Inline => "inline",
            Keyword::Virtual => "virtual",
            Keyword::Explicit => "explicit",
            Keyword::Extern => "extern",
            Keyword::Template => "template",
            Keyword::Typename => "typename",
            Keyword::Using => "using",
            Keyword::Typedef => "typedef",
            Keyword::Friend => "friend",
            Keyword::Operator => "operator",
            Keyword::Public => "public",
            Keyword::Private => "private",
            Keyword::Protected => "protected",
            Keyword::Noexcept => "noexcept",
            Keyword::Sizeof => "sizeof",
            Keyword::Auto => "auto",
            Keyword::Void => "void",
            Keyword::Bool => "bool",
            Keyword::Char => "char",
            Keyword::Int => "int",
            Keyword::Float => "float",
            Keyword::Double => "double",
            Keyword::Long => "long",
            Keyword::Short => "short",
            Keyword::Signed => "signed",
            Keyword::Unsigned => "unsigned",
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::Nullptr => "nullptr",
            Keyword::StaticAssert => "static_assert",
            Keyword::Decltype => "decltype",
            Keyword::Throw => "throw",
            Keyword::Override => "override",
            Keyword::Final => "final",
            Keyword::Delete => "delete",
            Keyword::Default => "default",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Symbol {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Lt,
    Gt,
    Comma,
    Semi,
    Colon,
    ColonColon,
    Star,
    Amp,
    AmpAmp,
    Tilde,
    Eq,
    Plus,
    Minus,
    Dot,
    Ellipsis,
    Arrow,
    Slash,
    Percent,
    Bang,
    Question,
    Pipe,
}

#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Lexer for the declaration subset. Template closers are never fused, so
/// `>>` always lexes as two `Gt` tokens. A `#` that opens a line swallows the
/// whole directive (with backslash continuations) into one `Directive` token.
pub struct Lexer<'a> {
    bytes: &'a [u8],
    idx: usize,
    line: usize,
    col: usize,
    file: usize,
    at_line_start: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str, file: usize) -> Self {
        Self {
            bytes: src.as_bytes(),
            idx: 0,
            line: 1,
            col: 1,
            file,
            at_line_start: true,
        }
    }

    pub fn lex_all(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            let is_eof = matches!(tok.kind, TokenKind::Eof);
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        tokens
    }

    fn span_here(&self) -> Span {
        Span {
            file: self.file,
            line: self.line,
            column: self.col,
        }
    }

    fn next_token(&mut self) -> Token {
        loop {
            self.skip_whitespace();
            if self.idx >= self.bytes.len() {
                return Token {
                    kind: TokenKind::Eof,
                    span: self.span_here(),
                };
            }
            let span = self.span_here();
            let ch = self.peek_char();

            if ch == '#' && self.at_line_start {
                let text = self.read_directive_line();
                return Token {
                    kind: TokenKind::Directive(text),
                    span,
                };
            }

            if ch == '/' && self.peek_next_char() == '/' {
                let is_doc = self.peek_at(2) == '/' || self.peek_at(2) == '!';
                let text = self.read_line_comment();
                if is_doc {
                    return Token {
                        kind: TokenKind::DocComment(text),
                        span,
                    };
                }
                continue;
            }
            if ch == '/' && self.peek_next_char() == '*' {
                let is_doc = self.peek_at(2) == '*' && self.peek_at(3) != '/';
                let text = self.read_block_comment();
                if is_doc {
                    return Token {
                        kind: TokenKind::DocComment(text),
                        span,
                    };
                }
                continue;
            }

            self.at_line_start = false;

            if is_ident_start(ch) {
                let ident = self.read_while(is_ident_continue);
                let kind = match keyword_from_str(&ident) {
                    Some(kw) => TokenKind::Keyword(kw),
                    None => TokenKind::Ident(ident),
                };
                return Token { kind, span };
            }

            if ch.is_ascii_digit() {
                let value = self.read_number();
                return Token {
                    kind: TokenKind::IntLit(value),
                    span,
                };
            }

            let kind = match ch {
                '"' => TokenKind::StringLit(self.read_string()),
                '\'' => TokenKind::CharLit(self.read_char_lit()),
                '(' => self.single(Symbol::LParen),
                ')' => self.single(Symbol::RParen),
                '{' => self.single(Symbol::LBrace),
                '}' => self.single(Symbol::RBrace),
                '[' => self.single(Symbol::LBracket),
                ']' => self.single(Symbol::RBracket),
                '<' => self.single(Symbol::Lt),
                '>' => self.single(Symbol::Gt),
                ',' => self.single(Symbol::Comma),
                ';' => self.single(Symbol::Semi),
                '*' => self.single(Symbol::Star),
                '~' => self.single(Symbol::Tilde),
                '=' => self.single(Symbol::Eq),
                '+' => self.single(Symbol::Plus),
                '/' => self.single(Symbol::Slash),
                '%' => self.single(Symbol::Percent),
                '!' => self.single(Symbol::Bang),
                '?' => self.single(Symbol::Question),
                '|' => self.single(Symbol::Pipe),
                ':' => {
                    self.advance();
                    if self.peek_char() == ':' {
                        self.advance();
                        TokenKind::Symbol(Symbol::ColonColon)
                    } else {
                        TokenKind::Symbol(Symbol::Colon)
                    }
                }
                '&' => {
                    self.advance();
                    if self.peek_char() == '&' {
                        self.advance();
                        TokenKind::Symbol(Symbol::AmpAmp)
                    } else {
                        TokenKind::Symbol(Symbol::Amp)
                    }
                }
                '-' => {
                    self.advance();
                    if self.peek_char() == '>' {
                        self.advance();
                        TokenKind::Symbol(Symbol::Arrow)
                    } else {
                        TokenKind::Symbol(Symbol::Minus)
                    }
                }
                '.' => {
                    self.advance();
                    if self.peek_char() == '.' && self.peek_next_char() == '.' {
                        self.advance();
                        self.advance();
                        TokenKind::Symbol(Symbol::Ellipsis)
                    } else {
                        TokenKind::Symbol(Symbol::Dot)
                    }
                }
                _ => {
                    self.advance();
                    TokenKind::Unknown(ch)
                }
            };
            return Token { kind, span };
        }
    }

    fn single(&mut self, sym: Symbol) -> TokenKind {
        self.advance();
        TokenKind::Symbol(sym)
    }

    fn skip_whitespace(&mut self) {
        while self.idx < self.bytes.len() {
            match self.peek_char() {
                ' ' | '\t' | '\r' => self.advance(),
                '\n' => {
                    self.advance();
                    self.at_line_start = true;
                }
                _ => return,
            }
        }
    }

    fn read_directive_line(&mut self) -> String {
        self.advance(); // '#'
        let mut text = String::new();
        while self.idx < self.bytes.len() {
            let ch = self.peek_char();
            if ch == '\n' {
                break;
            }
            if ch == '\\' && self.peek_next_char() == '\n' {
                self.advance();
                self.advance();
                text.push(' ');
                continue;
            }
            if ch == '/' && self.peek_next_char() == '/' {
                while self.idx < self.bytes.len() && self.peek_char() != '\n' {
                    self.advance();
                }
                break;
            }
            text.push(ch);
            self.advance();
        }
        text.trim().to_string()
    }

    fn read_line_comment(&mut self) -> String {
        let mut text = String::new();
        while self.idx < self.bytes.len() && self.peek_char() != '\n' {
            text.push(self.peek_char());
            self.advance();
        }
        text
    }

    fn read_block_comment(&mut self) -> String {
        let mut text = String::new();
        text.push(self.peek_char());
        self.advance();
        text.push(self.peek_char());
        self.advance();
        while self.idx < self.bytes.len() {
            if self.peek_char() == '*' && self.peek_next_char() == '/' {
                text.push('*');
                text.push('/');
                self.advance();
                self.advance();
                break;
            }
            text.push(self.peek_char());
            self.advance();
        }
        text
    }

    fn read_string(&mut self) -> String {
        self.advance(); // opening quote
        let mut s = String::new();
        while self.idx < self.bytes.len() {
            let ch = self.peek_char();
            if ch == '"' {
                self.advance();
                break;
            }
            if ch == '\\' {
                self.advance();
                if self.idx >= self.bytes.len() {
                    break;
                }
                let esc = self.peek_char();
                self.advance();
                s.push(unescape(esc));
            } else {
                s.push(ch);
                self.advance();
            }
        }
        s
    }

    fn read_char_lit(&mut self) -> char {
        self.advance();
        let ch = if self.peek_char() == '\\' {
            self.advance();
            let esc = self.peek_char();
            self.advance();
            unescape(esc)
        } else {
            let c = self.peek_char();
            self.advance();
            c
        };
        if self.peek_char() == '\'' {
            self.advance();
        }
        ch
    }

    fn read_number(&mut self) -> i64 {
        let mut digits = String::new();
        let mut radix = 10u32;
        if self.peek_char() == '0' && matches!(self.peek_next_char(), 'x' | 'X') {
            self.advance();
            self.advance();
            radix = 16;
        } else if self.peek_char() == '0' && matches!(self.peek_next_char(), 'b' | 'B') {
            self.advance();
            self.advance();
            radix = 2;
        } else if self.peek_char() == '0' && self.peek_next_char().is_ascii_digit() {
            self.advance();
            radix = 8;
        }
        while self.idx < self.bytes.len() {
            let ch = self.peek_char();
            if ch.to_digit(radix).is_some() {
                digits.push(ch);
                self.advance();
            } else if ch == '\'' {
                // digit separator
                self.advance();
            } else {
                break;
            }
        }
        // Integer suffixes carry no information for extraction.
        while matches!(self.peek_char(), 'u' | 'U' | 'l' | 'L' | 'z' | 'Z') {
            self.advance();
        }
        if digits.is_empty() {
            return 0;
        }
        u64::from_str_radix(&digits, radix).map(|v| v as i64).unwrap_or(0)
    }

    fn read_while<F>(&mut self, f: F) -> String
    where
        F: Fn(char) -> bool,
    {
        let mut s = String::new();
        while self.idx < self.bytes.len() {
            let ch = self.peek_char();
            if !f(ch) {
                break;
            }
            s.push(ch);
            self.advance();
        }
        s
    }

    fn advance(&mut self) {
        if self.idx >= self.bytes.len() {
            return;
        }
        let ch = self.peek_char();
        self.idx += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
    }

    fn peek_char(&self) -> char {
        self.bytes.get(self.idx).copied().unwrap_or(b'\0') as char
    }

    fn peek_next_char(&self) -> char {
        self.bytes.get(self.idx + 1).copied().unwrap_or(b'\0') as char
    }

    fn peek_at(&self, offset: usize) -> char {
        self.bytes.get(self.idx + offset).copied().unwrap_or(b'\0') as char
    }
}

fn unescape(esc: char) -> char {
    match esc {
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        '0' => '\0',
        '\\' => '\\',
        '"' => '"',
        '\'' => '\'',
        _ => esc,
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn keyword_from_str(ident: &str) -> Option<Keyword> {
    let kw = match ident {
        "namespace" => Keyword::Namespace,
        "struct" => Keyword::Struct,
        "class" => Keyword::Class,
        "union" => Keyword::Union,
        "enum" => Keyword::Enum,
        "static" => Keyword::Static,
        "constexpr" => Keyword::Constexpr,
        "const" => Keyword::Const,
        "volatile" => Keyword::Volatile,
        "mutable" => Keyword::Mutable,
        "inline" => Keyword::Inline,
        "virtual" => Keyword::Virtual,
        "explicit" => Keyword::Explicit,
        "extern" => Keyword::Extern,
        "template" => Keyword::Template,
        "typename" => Keyword::Typename,
        "using" => Keyword::Using,
        "typedef" => Keyword::Typedef,
        "friend" => Keyword::Friend,
        "operator" => Keyword::Operator,
        "public" => Keyword::Public,
        "private" => Keyword::Private,
        "protected" => Keyword::Protected,
        "noexcept" => Keyword::Noexcept,
        "sizeof" => Keyword::Sizeof,
        "auto" => Keyword::Auto,
        "void" => Keyword::Void,
        "bool" => Keyword::Bool,
        "char" => Keyword::Char,
        "int" => Keyword::Int,
        "float" => Keyword::Float,
        "double" => Keyword::Double,
        "long" => Keyword::Long,
        "short" => Keyword::Short,
        "signed" => Keyword::Signed,
        "unsigned" => Keyword::Unsigned,
        "true" => Keyword::True,
        "false" => Keyword::False,
        "nullptr" => Keyword::Nullptr,
        "static_assert" => Keyword::StaticAssert,
        "decltype" => Keyword::Decltype,
        "throw" => Keyword::Throw,
        "override" => Keyword::Override,
        "final" => Keyword::Final,
        "delete" => Keyword::Delete,
        "default" => Keyword::Default,
        _ => return None,
    };
    Some(kw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src, 0)
            .lex_all()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_scope_and_template_punctuation() {
        let toks = kinds("::frem::Code x{0x1234};");
        assert_eq!(
            toks,
            vec![
                TokenKind::Symbol(Symbol::ColonColon),
                TokenKind::Ident("frem".into()),
                TokenKind::Symbol(Symbol::ColonColon),
                TokenKind::Ident("Code".into()),
                TokenKind::Ident("x".into()),
                TokenKind::Symbol(Symbol::LBrace),
                TokenKind::IntLit(0x1234),
                TokenKind::Symbol(Symbol::RBrace),
                TokenKind::Symbol(Symbol::Semi),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn never_fuses_template_closers() {
        let toks = kinds("optional<array<int32_t, 4>>");
        let gts = toks
            .iter()
            .filter(|k| matches!(k, TokenKind::Symbol(Symbol::Gt)))
            .count();
        assert_eq!(gts, 2);
    }

    #[test]
    fn directives_consume_whole_line() {
        let toks = kinds("#include \"demo.hpp\"\nbool b;\n");
        assert_eq!(toks[0], TokenKind::Directive("include \"demo.hpp\"".into()));
        assert_eq!(toks[1], TokenKind::Keyword(Keyword::Bool));
    }

    #[test]
    fn doc_comments_are_tokens_and_plain_comments_are_not() {
        let toks = kinds("/// Frobnicates.\n// plain\nbool b;\n");
        assert_eq!(toks[0], TokenKind::DocComment("/// Frobnicates.".into()));
        assert_eq!(toks[1], TokenKind::Keyword(Keyword::Bool));
    }

    #[test]
    fn integer_bases_and_suffixes() {
        assert_eq!(kinds("42")[0], TokenKind::IntLit(42));
        assert_eq!(kinds("0x2A")[0], TokenKind::IntLit(42));
        assert_eq!(kinds("052")[0], TokenKind::IntLit(42));
        assert_eq!(kinds("42u")[0], TokenKind::IntLit(42));
        assert_eq!(kinds("1'000")[0], TokenKind::IntLit(1000));
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds("\"a\\\"b\"")[0],
            TokenKind::StringLit("a\"b".into())
        );
    }

    #[test]
    fn tracks_line_numbers_across_newlines() {
        let toks = Lexer::new("bool a;\nbool b;\n", 7).lex_all();
        let second_bool = &toks[3];
        assert_eq!(second_bool.span.line, 2);
        assert_eq!(second_bool.span.file, 7);
    }
}
