use plsp_wire::Datum;
use tracing::debug;

use crate::convert::{from_datum, PlType};
use crate::cursor::open_rows;
use crate::fault::{PlFault, PlResult};
use crate::sql::SqlConnection;

pub fn builtin_query(name: &str, argc: usize) -> String {
    if argc == 0 {
        return format!("SELECT {name} FROM dual");
    }
    format!("SELECT {name}({}) FROM dual", placeholders(argc))
}

fn placeholders(argc: usize) -> String {
    vec!["?"; argc].join(", ")
}

/// Calls a stored procedure that lives in the engine rather than in this
/// routine. Only IN arguments can be passed this way.
pub fn call_external(conn: &mut dyn SqlConnection, name: &str, args: Vec<Datum>) -> PlResult<()> {
    let query = format!("CALL {name}({})", placeholders(args.len()));
    debug!(procedure = name, argc = args.len(), "calling engine procedure");
    let mut stmt = conn.prepare(&query)?;
    for (i, arg) in args.into_iter().enumerate() {
        stmt.bind(i + 1, arg)?;
    }
    stmt.execute()?;
    Ok(())
}

/// Evaluates an engine builtin function by selecting it through the routine's
/// own connection. The query yields exactly one row.
pub fn invoke_builtin<T: PlType>(
    conn: &mut dyn SqlConnection,
    name: &str,
    args: Vec<Datum>,
) -> PlResult<Option<T>> {
    let query = builtin_query(name, args.len());
    debug!(builtin = name, argc = args.len(), "evaluating builtin through the engine");
    let mut stmt = conn.prepare(&query)?;
    for (i, arg) in args.into_iter().enumerate() {
        stmt.bind(i + 1, arg)?;
    }
    let mut rows = open_rows(&mut *stmt)?;
    let Some(row) = rows.next_row()? else {
        return Err(PlFault::ProgramError(format!("builtin {name} returned no row")));
    };
    let first = row
        .first()
        .ok_or_else(|| PlFault::ProgramError(format!("builtin {name} returned no column")))?;
    from_datum(first)
}
