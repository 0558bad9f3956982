use super::ast::Span;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            severity,
            message: message.into(),
            span,
        }
    }
}

#[derive(Default)]
pub struct Diagnostics {
    pub items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn error(&mut self, message: impl Into<String>, span: Option<Span>) {
        self.items
            .push(Diagnostic::new(Severity::Error, message, span));
    }

    pub fn warning(&mut self, message: impl Into<String>, span: Option<Span>) {
        self.items
            .push(Diagnostic::new(Severity::Warning, message, span));
    }

    pub fn note(&mut self, message: impl Into<String>, span: Option<Span>) {
        self.items
            .push(Diagnostic::new(Severity::Note, message, span));
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.items
            .iter()
            .any(|d| d.severity == Severity::Error)
    }
}

/// Text of every source file seen by one extraction, indexed by the file id
/// carried in token spans.
#[derive(Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

struct SourceFile {
    name: String,
    text: String,
}

impl SourceMap {
    pub fn add(&mut self, name: impl Into<String>, text: impl Into<String>) -> usize {
        self.files.push(SourceFile {
            name: name.into(),
            text: text.into(),
        });
        self.files.len() - 1
    }

    pub fn name(&self, file: usize) -> &str {
        self.files.get(file).map(|f| f.name.as_str()).unwrap_or("")
    }

    fn line_text(&self, file: usize, line: usize) -> &str {
        self.files
            .get(file)
            .and_then(|f| f.text.lines().nth(line.saturating_sub(1)))
            .unwrap_or("")
    }
}

pub fn format_diagnostic(diag: &Diagnostic, sources: &SourceMap) -> String {
    if let Some(span) = &diag.span {
        let line_text = sources.line_text(span.file, span.line);
        format!(
            "{}:{}:{}: {}: {}\n  {}\n  {}^",
            sources.name(span.file),
            span.line,
            span.column,
            diag.severity.label(),
            diag.message,
            line_text,
            " ".repeat(span.column.saturating_sub(1))
        )
    } else {
        format!("{}: {}", diag.severity.label(), diag.message)
    }
}

pub fn render_all(diags: &Diagnostics, sources: &SourceMap) -> String {
    let mut out = String::new();
    for diag in &diags.items {
        out.push_str(&format_diagnostic(diag, sources));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_location_and_caret() {
        let mut sources = SourceMap::default();
        let file = sources.add("demo.hpp", "bool demo();\n");
        let diag = Diagnostic::new(
            Severity::Error,
            "missing annotation",
            Some(Span {
                file,
                line: 1,
                column: 6,
            }),
        );
        let rendered = format_diagnostic(&diag, &sources);
        assert!(rendered.starts_with("demo.hpp:1:6: error: missing annotation"));
        assert!(rendered.ends_with("     ^"));
    }

    #[test]
    fn has_errors_ignores_warnings() {
        let mut diags = Diagnostics::default();
        diags.warning("record is not trivially copyable", None);
        assert!(!diags.has_errors());
        diags.error("record is empty", None);
        assert!(diags.has_errors());
    }
}
