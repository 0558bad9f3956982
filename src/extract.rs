// Purpose: Drive the extraction pipeline for one invocation's input files.
// Inputs/Outputs: Preprocess → rewrite → parse → harvest per file; shares one
//                 extraction context (registry + result store) across all inputs.
// Invariants: Inputs are processed strictly in command-line order; a file whose
//             extraction produced error diagnostics fails the invocation.
// Gotchas: Warnings are returned to the caller for printing, not swallowed.

use std::path::Path;

use crate::frontend::diagnostic::{render_all, Diagnostics, SourceMap};
use crate::frontend::parser::Parser;
use crate::frontend::preprocess::{IncludeEnv, Preprocessor};
use crate::frontend::rewrite::MacroRewriter;
use crate::harvest::harvest_unit;
use crate::registry::TypeRegistry;
use crate::result::ParseResult;

/// State shared across all input files of one CLI run.
pub struct ExtractionContext {
    pub registry: TypeRegistry,
    pub result: ParseResult,
}

impl Default for ExtractionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionContext {
    pub fn new() -> Self {
        Self {
            registry: TypeRegistry::new(),
            result: ParseResult::new(),
        }
    }
}

/// Extract one source file. `write_rpcs` is false for type-only sources.
/// Returns the rendered non-fatal diagnostics on success and the rendered
/// diagnostics on failure.
pub fn extract_file(
    ctx: &mut ExtractionContext,
    env: &IncludeEnv,
    path: &Path,
    write_rpcs: bool,
) -> Result<String, String> {
    trace(&format!(
        "extracting {} (rpcs: {})",
        path.display(),
        write_rpcs
    ));

    let mut sources = SourceMap::default();
    let mut diags = Diagnostics::default();

    let tokens = Preprocessor::new(env, &mut sources, &mut diags).run(path);
    let rewritten = MacroRewriter::new().rewrite(tokens, &mut diags);

    let mut parser = Parser::new(rewritten.tokens);
    let unit = parser.parse_unit();
    diags.items.extend(parser.diags.items);

    harvest_unit(
        &unit,
        &rewritten.origins,
        &mut ctx.registry,
        &mut ctx.result,
        &mut diags,
        &sources,
        write_rpcs,
    );

    let rendered = render_all(&diags, &sources);
    if diags.has_errors() {
        Err(rendered)
    } else {
        Ok(rendered)
    }
}

pub fn trace_enabled() -> bool {
    std::env::var("FREMGEN_TRACE")
        .ok()
        .as_deref()
        .map(|v| v == "1")
        .unwrap_or(false)
}

pub fn trace(msg: &str) {
    if trace_enabled() {
        eprintln!("[fremgen] {}", msg);
    }
}
