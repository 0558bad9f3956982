// Purpose: Define crate-level module surface for the interface-extraction pipeline.
// Inputs/Outputs: Re-exports internal modules for the binary and integration tests.
// Invariants: Public module boundaries should remain stable for internal callers.
// Gotchas: Keep module wiring consistent with the src/main.rs entry path.

pub mod archive;
pub mod cli;
pub mod extract;
pub mod frontend;
pub mod harvest;
pub mod hash;
pub mod registry;
pub mod result;
pub mod yaml;
