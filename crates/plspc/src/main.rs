use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use plsp_contracts::PLSPC_REPORT_SCHEMA_VERSION;
use plspc::compile::{self, CompileOptions, CompileResult, CompilerError};
use plspc::descriptor;
use plspc::language;

#[derive(Parser)]
#[command(name = "plspc")]
#[command(about = "Procedural routine compiler (routine AST -> Rust).", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    LangId,
    Compile {
        #[arg(long)]
        input: PathBuf,
        /// Revision tag folded into the artifact name.
        #[arg(long, default_value = "0")]
        revision: String,
        /// Output directory; the source goes to stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        emit_descriptor: bool,
        #[arg(long)]
        report_json: bool,
    },
}

#[derive(Debug, Serialize)]
struct Diagnostic {
    code: &'static str,
    line: u32,
    column: u32,
    message: String,
}

impl From<&CompilerError> for Diagnostic {
    fn from(err: &CompilerError) -> Self {
        Self {
            code: err.kind.code(),
            line: err.line,
            column: err.column,
            message: err.message.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PlspcToolReport {
    schema_version: &'static str,
    command: &'static str,
    ok: bool,
    r#in: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifact_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    decl: Option<String>,
    diagnostics_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    diagnostics: Vec<Diagnostic>,
    exit_code: u8,
}

fn main() -> std::process::ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<std::process::ExitCode> {
    let cli = Cli::parse();

    let Some(cmd) = cli.cmd else {
        anyhow::bail!("missing subcommand (try --help)");
    };

    match cmd {
        Cmd::LangId => {
            println!("{}", language::LANG_ID);
            Ok(std::process::ExitCode::SUCCESS)
        }
        Cmd::Compile {
            input,
            revision,
            out,
            emit_descriptor,
            report_json,
        } => {
            let bytes = std::fs::read(&input)
                .with_context(|| format!("read input: {}", input.display()))?;
            let options = CompileOptions {
                revision,
                ..CompileOptions::default()
            };

            let output = match compile::compile_unit(&bytes, &options) {
                CompileResult::Ok(output) => output,
                CompileResult::Err(err) => {
                    if report_json {
                        print_json(&PlspcToolReport {
                            schema_version: PLSPC_REPORT_SCHEMA_VERSION,
                            command: "compile",
                            ok: false,
                            r#in: input.display().to_string(),
                            artifact_name: None,
                            decl: None,
                            diagnostics_count: 1,
                            diagnostics: vec![Diagnostic::from(&err)],
                            exit_code: 1,
                        })?;
                    } else {
                        eprintln!(
                            "{}: {}:{}:{}: {}",
                            err.kind.code(),
                            input.display(),
                            err.line,
                            err.column,
                            err.message
                        );
                    }
                    return Ok(std::process::ExitCode::from(1));
                }
            };

            match &out {
                Some(dir) => {
                    std::fs::create_dir_all(dir)
                        .with_context(|| format!("create output dir: {}", dir.display()))?;
                    let src_path = dir.join(format!("{}.rs", output.artifact_name));
                    std::fs::write(&src_path, output.source.as_bytes())
                        .with_context(|| format!("write: {}", src_path.display()))?;
                    let map_path = dir.join(format!("{}.map.json", output.artifact_name));
                    write_json_file(&map_path, &output.code_range_markers)?;
                    if emit_descriptor {
                        let desc = descriptor::descriptor_for(&output)
                            .map_err(|e| anyhow::anyhow!("descriptor: {}: {}", e.kind.code(), e))?;
                        let path = dir.join(format!("{}.artifact.json", output.artifact_name));
                        write_json_file(&path, &desc)?;
                    }
                }
                None => {
                    if emit_descriptor {
                        anyhow::bail!("--emit-descriptor requires --out");
                    }
                    if !report_json {
                        print!("{}", output.source);
                    }
                }
            }

            if report_json {
                print_json(&PlspcToolReport {
                    schema_version: PLSPC_REPORT_SCHEMA_VERSION,
                    command: "compile",
                    ok: true,
                    r#in: input.display().to_string(),
                    artifact_name: Some(output.artifact_name.clone()),
                    decl: Some(output.decl_text.clone()),
                    diagnostics_count: 0,
                    diagnostics: Vec::new(),
                    exit_code: 0,
                })?;
            }
            Ok(std::process::ExitCode::SUCCESS)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn write_json_file(path: &Path, value: &impl Serialize) -> Result<()> {
    let out = serde_json::to_string_pretty(value)? + "\n";
    std::fs::write(path, out.as_bytes()).with_context(|| format!("write: {}", path.display()))?;
    Ok(())
}
