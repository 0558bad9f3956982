// Purpose: Frontend module hub that wires lexer/preprocessor/rewriter/parser together.
// Inputs/Outputs: Exposes frontend components used by the extraction pipeline and tests.
// Invariants: Public frontend API should remain a thin composition over specialized modules.
// Gotchas: The rewriter must run on the preprocessed token stream, before parsing.

pub mod ast;
pub mod diagnostic;
pub mod lexer;
pub mod parser;
pub mod preprocess;
pub mod rewrite;
pub mod suggest;
