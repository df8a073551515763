//! Routines the host provides without any artifact on disk.
//!
//! They are registered twice: as the builtin scope under fixed `'plsp'`
//! signatures, and as symbols so descriptors can bind other signatures to
//! the same callables.

use std::sync::Arc;

use plsp_rt::routine::{CallContext, FnRoutine, Routine};
use plsp_rt::{PlFault, PlResult};
use plsp_wire::{HostType, HostValue, ScalarKind};

use crate::loader::{Artifact, ArtifactScope, SymbolTable};
use crate::signature::Signature;

pub const QUALIFIER: &str = "plsp";

fn version(_: &mut dyn CallContext, _: &mut [HostValue]) -> PlResult<HostValue> {
    Ok(HostValue::String(env!("CARGO_PKG_VERSION").to_string()))
}

fn server_name(ctx: &mut dyn CallContext, _: &mut [HostValue]) -> PlResult<HostValue> {
    Ok(HostValue::String(ctx.server_name().to_string()))
}

fn echo(_: &mut dyn CallContext, args: &mut [HostValue]) -> PlResult<HostValue> {
    args.first()
        .cloned()
        .ok_or_else(|| PlFault::ProgramError("echo takes one argument".to_string()))
}

/// `count(n)`: counts rows of `SELECT COUNT(*) FROM <n>` through the nested
/// engine connection.
fn count(ctx: &mut dyn CallContext, args: &mut [HostValue]) -> PlResult<HostValue> {
    let Some(HostValue::String(table)) = args.first() else {
        return Err(PlFault::ValueError("table name required".to_string()));
    };
    let sql = format!("SELECT COUNT(*) FROM {table}");
    let conn = ctx.connection(false)?;
    let mut stmt = conn.prepare(&sql)?;
    let mut row_count = 0i64;
    let mut total = None;
    plsp_rt::sql::execute_into(stmt.as_mut(), &mut row_count, |row| {
        total = row.first().cloned();
        Ok(())
    })?;
    match total {
        Some(plsp_wire::Datum::Bigint(n)) => Ok(HostValue::I64(n)),
        Some(plsp_wire::Datum::Int(n)) => Ok(HostValue::I64(i64::from(n))),
        Some(other) => Err(PlFault::ValueError(format!(
            "count returned {}",
            other.kind_name()
        ))),
        None => Ok(HostValue::Null),
    }
}

type BuiltinFn = fn(&mut dyn CallContext, &mut [HostValue]) -> PlResult<HostValue>;

struct Builtin {
    entry: &'static str,
    name: &'static str,
    params: &'static [ScalarKind],
    returns: ScalarKind,
    call: BuiltinFn,
}

const BUILTINS: &[Builtin] = &[
    Builtin {
        entry: "plsp_version",
        name: "version",
        params: &[],
        returns: ScalarKind::String,
        call: version,
    },
    Builtin {
        entry: "plsp_server_name",
        name: "server_name",
        params: &[],
        returns: ScalarKind::String,
        call: server_name,
    },
    Builtin {
        entry: "plsp_echo",
        name: "echo",
        params: &[ScalarKind::String],
        returns: ScalarKind::String,
        call: echo,
    },
    Builtin {
        entry: "plsp_count",
        name: "count",
        params: &[ScalarKind::String],
        returns: ScalarKind::I64,
        call: count,
    },
];

fn routine(b: &Builtin) -> Arc<dyn Routine> {
    Arc::new(FnRoutine(b.call))
}

pub fn register_symbols(symbols: &mut SymbolTable) {
    for b in BUILTINS {
        symbols.register(b.entry, routine(b));
    }
}

pub fn scope() -> anyhow::Result<ArtifactScope> {
    let mut scope = ArtifactScope::new(0);
    for b in BUILTINS {
        let params = b.params.iter().map(|k| HostType::scalar(*k)).collect();
        scope.insert(Artifact::new(
            Signature::new(QUALIFIER, b.name, params),
            Some(HostType::boxed(b.returns)),
            b.entry,
            routine(b),
        ))?;
    }
    Ok(scope)
}
