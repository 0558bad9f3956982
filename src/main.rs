// Purpose: Provide the binary entry for the fremgen extraction tool.
// Inputs/Outputs: Reads process args and returns the process exit code from the CLI dispatcher.
// Invariants: Main must not bypass centralized CLI argument/diagnostic handling.
// Gotchas: Exit codes are negative on failure; all behavior belongs in cli/mod.rs.

fn main() {
    let code = fremgen::cli::run_cli(std::env::args().skip(1));
    std::process::exit(code);
}
