use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use super::ast::Span;
use super::diagnostic::{Diagnostics, SourceMap};
use super::lexer::{Lexer, Token, TokenKind};

/// Macro name predefined for every unit, so sources can hide regions from
/// the extraction run.
pub const PREDEFINED_MACRO: &str = "FREM_GEN_RUN";

/// Where include resolution looks for files: system include directories,
/// overlaid with in-memory contents (the header archive relocated under its
/// synthetic root).
#[derive(Default)]
pub struct IncludeEnv {
    pub system_dirs: Vec<PathBuf>,
    pub overlay: HashMap<PathBuf, String>,
}

impl IncludeEnv {
    fn read(&self, path: &Path) -> Option<String> {
        if let Some(content) = self.overlay.get(path) {
            return Some(content.clone());
        }
        fs::read_to_string(path).ok()
    }

    fn exists(&self, path: &Path) -> bool {
        self.overlay.contains_key(path) || path.is_file()
    }
}

struct CondFrame {
    parent_active: bool,
    taken: bool,
    active: bool,
}

/// Splices includes and evaluates the restricted conditional forms, turning
/// one entry file into a flat token stream for the rewriter.
pub struct Preprocessor<'a> {
    env: &'a IncludeEnv,
    sources: &'a mut SourceMap,
    diags: &'a mut Diagnostics,
    defines: HashSet<String>,
    pragma_once: HashSet<PathBuf>,
    conditions: Vec<CondFrame>,
}

impl<'a> Preprocessor<'a> {
    pub fn new(
        env: &'a IncludeEnv,
        sources: &'a mut SourceMap,
        diags: &'a mut Diagnostics,
    ) -> Self {
        let mut defines = HashSet::new();
        defines.insert(PREDEFINED_MACRO.to_string());
        Self {
            env,
            sources,
            diags,
            defines,
            pragma_once: HashSet::new(),
            conditions: Vec::new(),
        }
    }

    /// Process one entry file. The returned stream carries a single
    /// trailing Eof token.
    pub fn run(&mut self, path: &Path) -> Vec<Token> {
        let mut out = Vec::new();
        self.process_file(path, None, &mut out);
        let end = out
            .last()
            .map(|t| t.span)
            .unwrap_or(Span {
                file: 0,
                line: 1,
                column: 1,
            });
        out.push(Token {
            kind: TokenKind::Eof,
            span: end,
        });
        out
    }

    fn active(&self) -> bool {
        self.conditions.iter().all(|c| c.active)
    }

    fn process_file(&mut self, path: &Path, include_span: Option<Span>, out: &mut Vec<Token>) {
        let Some(text) = self.env.read(path) else {
            self.diags.error(
                format!("'{}' file not found", path.display()),
                include_span,
            );
            return;
        };
        let file_id = self.sources.add(path.display().to_string(), text.clone());
        let tokens = Lexer::new(&text, file_id).lex_all();
        let cond_depth = self.conditions.len();

        for token in tokens {
            match &token.kind {
                TokenKind::Eof => break,
                TokenKind::Directive(text) => {
                    self.handle_directive(text, token.span, path, out);
                }
                _ => {
                    if self.active() {
                        out.push(token);
                    }
                }
            }
        }

        // Unterminated conditionals do not leak into the including file.
        self.conditions.truncate(cond_depth);
    }

    fn handle_directive(&mut self, text: &str, span: Span, current: &Path, out: &mut Vec<Token>) {
        let mut parts = text.splitn(2, char::is_whitespace);
        let directive = parts.next().unwrap_or("");
        let rest = parts.next().unwrap_or("").trim();

        match directive {
            "include" => {
                if self.active() {
                    self.handle_include(rest, span, current, out);
                }
            }
            "pragma" => {
                if self.active() && rest == "once" {
                    self.pragma_once.insert(current.to_path_buf());
                }
            }
            "define" => {
                if self.active() {
                    let name = rest.split(|c: char| !is_macro_char(c)).next().unwrap_or("");
                    if !name.is_empty() {
                        self.defines.insert(name.to_string());
                    }
                }
            }
            "undef" => {
                if self.active() {
                    self.defines.remove(rest);
                }
            }
            "ifdef" => {
                let value = self.defines.contains(rest);
                self.push_condition(value);
            }
            "ifndef" => {
                let value = !self.defines.contains(rest);
                self.push_condition(value);
            }
            "if" => {
                let value = self.eval_condition(rest);
                self.push_condition(value);
            }
            "elif" => {
                let value = self.eval_condition(rest);
                if let Some(frame) = self.conditions.last_mut() {
                    frame.active = frame.parent_active && !frame.taken && value;
                    frame.taken |= frame.active;
                } else {
                    self.diags.error("#elif without #if", Some(span));
                }
            }
            "else" => {
                if let Some(frame) = self.conditions.last_mut() {
                    frame.active = frame.parent_active && !frame.taken;
                    frame.taken = true;
                } else {
                    self.diags.error("#else without #if", Some(span));
                }
            }
            "endif" => {
                if self.conditions.pop().is_none() {
                    self.diags.error("#endif without #if", Some(span));
                }
            }
            // Expansion of ordinary macros is not performed; unknown
            // directives are dropped with the rest of the line.
            _ => {}
        }
    }

    fn push_condition(&mut self, value: bool) {
        let parent_active = self.active();
        self.conditions.push(CondFrame {
            parent_active,
            taken: parent_active && value,
            active: parent_active && value,
        });
    }

    /// Restricted condition grammar: 0, 1, NAME, defined(NAME), !defined(NAME).
    /// Anything richer is taken as true; the downstream front-end owns full
    /// preprocessing.
    fn eval_condition(&self, expr: &str) -> bool {
        let expr = expr.trim();
        match expr {
            "0" => false,
            "1" => true,
            _ => {
                if let Some(inner) = strip_defined(expr) {
                    return self.defines.contains(inner);
                }
                if let Some(negated) = expr.strip_prefix('!') {
                    if let Some(inner) = strip_defined(negated.trim()) {
                        return !self.defines.contains(inner);
                    }
                }
                if expr.chars().all(is_macro_char) {
                    return self.defines.contains(expr);
                }
                true
            }
        }
    }

    fn handle_include(&mut self, spec: &str, span: Span, current: &Path, out: &mut Vec<Token>) {
        let (name, is_system) = match parse_include_spec(spec) {
            Some(v) => v,
            None => {
                self.diags
                    .error(format!("malformed #include '{}'", spec), Some(span));
                return;
            }
        };

        let mut candidates: Vec<PathBuf> = Vec::new();
        if !is_system {
            if let Some(dir) = current.parent() {
                candidates.push(dir.join(&name));
            }
        }
        for dir in &self.env.system_dirs {
            candidates.push(dir.join(&name));
        }

        let Some(resolved) = candidates.into_iter().find(|c| self.env.exists(c)) else {
            self.diags
                .error(format!("'{}' file not found", name), Some(span));
            return;
        };

        if self.pragma_once.contains(&resolved) {
            return;
        }
        self.process_file(&resolved, Some(span), out);
    }
}

fn is_macro_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn strip_defined(expr: &str) -> Option<&str> {
    let rest = expr.strip_prefix("defined")?.trim();
    let inner = rest
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .map(str::trim)
        .unwrap_or(rest);
    if !inner.is_empty() && inner.chars().all(is_macro_char) {
        Some(inner)
    } else {
        None
    }
}

fn parse_include_spec(spec: &str) -> Option<(String, bool)> {
    let spec = spec.trim();
    if let Some(rest) = spec.strip_prefix('"') {
        let end = rest.find('"')?;
        return Some((rest[..end].to_string(), false));
    }
    if let Some(rest) = spec.strip_prefix('<') {
        let end = rest.find('>')?;
        return Some((rest[..end].to_string(), true));
    }
    None
}
