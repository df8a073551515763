//! Routines compiled from `units/` at build time.
//!
//! Each unit becomes a module holding the generated `Routine` impl; the
//! descriptors the server's loader reads are embedded next to them.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use plsp_server::SymbolTable;

/// Embedded artifact descriptor of one compiled unit.
pub struct Descriptor {
    /// File stem under `units/`; also the module name.
    pub unit: &'static str,
    /// Signature the engine invokes the routine under.
    pub signature: &'static str,
    pub json: &'static str,
}

include!(concat!(env!("OUT_DIR"), "/routines.rs"));

/// Symbol table with every compiled routine under its entry name.
pub fn symbols() -> SymbolTable {
    let mut table = SymbolTable::new();
    register_all(&mut table);
    table
}

pub fn descriptor(unit: &str) -> Option<&'static Descriptor> {
    DESCRIPTORS.iter().find(|d| d.unit == unit)
}

/// Writes every descriptor into `dir` for a static or dynamic scope.
pub fn write_descriptors(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    for d in DESCRIPTORS {
        fs::write(dir.join(format!("{}.artifact.json", d.unit)), d.json)?;
    }
    Ok(())
}
