// Purpose: Parse the command line and run one extraction invocation.
// Inputs/Outputs: Consumes argv; writes the YAML artifact to --out or stdout;
//                 returns the process exit code.
// Invariants: 0 on success; -1 argument errors, -2 archive errors, -3 extraction
//             failures. No output is written on failure.
// Gotchas: Unrecognized non-`--` arguments are front-end arguments; only the
//          include-directory forms are meaningful to the embedded front-end.

use std::fs;
use std::path::PathBuf;

use crate::archive;
use crate::extract::{extract_file, ExtractionContext};
use crate::frontend::preprocess::IncludeEnv;
use crate::yaml;

fn version_string() -> String {
    format!("FremGen v{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ParserState {
    Option,
    InputFile,
    TypeInputFile,
    OutputFile,
    HeaderArchiveFile,
    IncludeDir,
}

#[derive(Debug)]
struct InputFileSpec {
    name: PathBuf,
    is_type_source: bool,
}

#[derive(Default, Debug)]
struct Options {
    output_file: Option<PathBuf>,
    header_archive_file: Option<PathBuf>,
    append_output: bool,
    inputs: Vec<InputFileSpec>,
    include_dirs: Vec<PathBuf>,
}

pub fn run_cli<I>(args: I) -> i32
where
    I: IntoIterator<Item = String>,
{
    println!("{} starting.", version_string());

    let options = match parse_args(args) {
        Ok(Some(options)) => options,
        Ok(None) => return 0,
        Err(message) => {
            eprintln!("{}", message);
            return -1;
        }
    };

    let mut env = IncludeEnv {
        system_dirs: options.include_dirs.clone(),
        overlay: Default::default(),
    };

    if let Some(archive_path) = &options.header_archive_file {
        let archive = match archive::read_archive(archive_path) {
            Ok(archive) => archive,
            Err(err) => {
                eprintln!("{:#}", err);
                return -2;
            }
        };
        // Archive include directories become system includes at the
        // synthetic root, searched ahead of any user-provided directory.
        let mut dirs: Vec<PathBuf> = archive
            .include_dirs
            .iter()
            .map(|d| archive::relocated(d))
            .collect();
        dirs.extend(std::mem::take(&mut env.system_dirs));
        env.system_dirs = dirs;
        for (name, content) in archive.files {
            env.overlay.insert(
                archive::relocated(&name),
                String::from_utf8_lossy(&content).into_owned(),
            );
        }
    }

    let mut ctx = ExtractionContext::new();

    // Incremental mode merges into the previous artifact.
    if options.append_output {
        if let Some(out) = &options.output_file {
            if let Ok(previous) = fs::read_to_string(out) {
                if let Err(err) =
                    yaml::load_document(&previous, &mut ctx.registry, &mut ctx.result)
                {
                    eprintln!("failed to load '{}': {:#}", out.display(), err);
                    return -3;
                }
            }
        }
    }

    for input in &options.inputs {
        match extract_file(&mut ctx, &env, &input.name, !input.is_type_source) {
            Ok(warnings) => {
                if !warnings.is_empty() {
                    eprint!("{}", warnings);
                }
            }
            Err(rendered) => {
                eprint!("{}", rendered);
                return -3;
            }
        }
    }

    let document = match yaml::write_document(&ctx.registry, &ctx.result) {
        Ok(document) => document,
        Err(err) => {
            eprintln!("{:#}", err);
            return -3;
        }
    };
    match &options.output_file {
        Some(out) => {
            if let Err(err) = fs::write(out, &document) {
                eprintln!("failed to write {}: {}", out.display(), err);
                return -3;
            }
        }
        None => print!("{}", document),
    }

    0
}

fn parse_args<I>(args: I) -> Result<Option<Options>, String>
where
    I: IntoIterator<Item = String>,
{
    let mut options = Options::default();
    let mut state = ParserState::Option;

    for arg in args {
        if arg == "--version" {
            println!("{}", version_string());
            return Ok(None);
        }

        // Input-file lists run until the next option.
        if matches!(state, ParserState::InputFile | ParserState::TypeInputFile) {
            if arg.starts_with('-') {
                state = ParserState::Option;
            } else {
                options.inputs.push(InputFileSpec {
                    name: PathBuf::from(&arg),
                    is_type_source: state == ParserState::TypeInputFile,
                });
                continue;
            }
        }

        match state {
            ParserState::Option => {
                if let Some(rest) = arg.strip_prefix("--") {
                    match rest {
                        "source" => state = ParserState::InputFile,
                        "type-source" => state = ParserState::TypeInputFile,
                        "out" => state = ParserState::OutputFile,
                        "header-archive" => state = ParserState::HeaderArchiveFile,
                        "incremental" => options.append_output = true,
                        _ => return Err(format!("Unknown argument '{}'", arg)),
                    }
                } else if let Some(dir) = arg.strip_prefix("-I") {
                    if dir.is_empty() {
                        state = ParserState::IncludeDir;
                    } else {
                        options.include_dirs.push(PathBuf::from(dir));
                    }
                } else if arg == "-isystem" {
                    state = ParserState::IncludeDir;
                } else {
                    // Other front-end arguments are accepted and ignored by
                    // the embedded front-end.
                }
            }
            ParserState::OutputFile => {
                options.output_file = Some(PathBuf::from(arg));
                state = ParserState::Option;
            }
            ParserState::HeaderArchiveFile => {
                options.header_archive_file = Some(PathBuf::from(arg));
                state = ParserState::Option;
            }
            ParserState::IncludeDir => {
                options.include_dirs.push(PathBuf::from(arg));
                state = ParserState::Option;
            }
            // Handled above; these states always transition out first.
            ParserState::InputFile | ParserState::TypeInputFile => {}
        }
    }

    if options.inputs.is_empty() {
        print_usage();
        return Err("No input files".to_string());
    }
    Ok(Some(options))
}

fn print_usage() {
    eprintln!(
        "usage: fremgen --source <files...> [--type-source <files...>] [--out <path>]"
    );
    eprintln!("               [--header-archive <path>] [--incremental] [--version]");
}
