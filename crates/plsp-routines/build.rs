// Compiles every `units/*.unit.json` into Rust source and an artifact
// descriptor under OUT_DIR, then writes `routines.rs`, which the library
// includes to get one module per unit plus the registration table.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use plspc::{compile_unit, descriptor_for, CompileOptions, CompileResult};

const UNIT_SUFFIX: &str = ".unit.json";
const REVISION: &str = "1";

fn main() -> Result<()> {
    let units = Path::new("units");
    println!("cargo:rerun-if-changed={}", units.display());
    let out_dir = PathBuf::from(std::env::var("OUT_DIR").context("OUT_DIR not set")?);

    let mut paths = Vec::new();
    for entry in fs::read_dir(units).with_context(|| format!("read {}", units.display()))? {
        let path = entry?.path();
        if path.to_string_lossy().ends_with(UNIT_SUFFIX) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut modules = String::new();
    let mut register = String::from("fn register_all(table: &mut SymbolTable) {\n");
    let mut descriptors = String::from("pub const DESCRIPTORS: &[Descriptor] = &[\n");
    for path in &paths {
        println!("cargo:rerun-if-changed={}", path.display());
        let file = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let stem = file.trim_end_matches(UNIT_SUFFIX);

        let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let output = match compile_unit(&bytes, &CompileOptions::with_revision(REVISION)) {
            CompileResult::Ok(output) => output,
            CompileResult::Err(e) => return Err(anyhow!("{}: line {}: {e}", path.display(), e.line)),
        };
        let descriptor =
            descriptor_for(&output).map_err(|e| anyhow!("{}: descriptor: {e}", path.display()))?;

        fs::write(out_dir.join(format!("{stem}.rs")), &output.source)?;
        fs::write(
            out_dir.join(format!("{stem}.artifact.json")),
            serde_json::to_string_pretty(&descriptor)?,
        )?;

        let artifact = &output.artifact_name;
        writeln!(
            modules,
            "pub mod {stem} {{\n    include!(concat!(env!(\"OUT_DIR\"), \"/{stem}.rs\"));\n}}\n"
        )?;
        writeln!(
            register,
            "    table.register({:?}, Arc::new({stem}::{artifact}));",
            descriptor.entry
        )?;
        writeln!(
            descriptors,
            "    Descriptor {{\n        unit: {stem:?},\n        signature: {:?},\n        json: include_str!(concat!(env!(\"OUT_DIR\"), \"/{stem}.artifact.json\")),\n    }},",
            descriptor.signature()
        )?;
    }
    register.push_str("}\n");
    descriptors.push_str("];\n");

    fs::write(
        out_dir.join("routines.rs"),
        format!("{modules}{register}\n{descriptors}"),
    )?;
    Ok(())
}
