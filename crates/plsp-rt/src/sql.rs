use plsp_wire::{ColumnInfo, Datum};

use crate::fault::{PlFault, PlResult};

/// Rows produced by an executed query, pulled one at a time.
pub trait ResultRows {
    fn columns(&self) -> &[ColumnInfo];
    fn next_row(&mut self) -> PlResult<Option<Vec<Datum>>>;
}

pub enum Execution {
    Rows(Box<dyn ResultRows>),
    Updated(i64),
}

pub trait PreparedStatement {
    /// Result columns of the prepared form; zero for anything but a query.
    fn column_count(&self) -> usize;

    /// Binds a host variable; `index` is 1-based.
    fn bind(&mut self, index: usize, value: Datum) -> PlResult<()>;

    fn execute(&mut self) -> PlResult<Execution>;
}

/// Engine-side connection a routine issues SQL through.
pub trait SqlConnection {
    fn prepare(&mut self, sql: &str) -> PlResult<Box<dyn PreparedStatement + '_>>;
    fn commit(&mut self) -> PlResult<()>;
    fn rollback(&mut self) -> PlResult<()>;
}

/// Binds host variables evaluated before the statement was prepared.
pub fn bind_all(stmt: &mut dyn PreparedStatement, values: Vec<Datum>) -> PlResult<()> {
    for (i, v) in values.into_iter().enumerate() {
        stmt.bind(i + 1, v)?;
    }
    Ok(())
}

/// Column of a fetched row by select-list position.
pub fn row_column(row: &[Datum], index: usize) -> PlResult<&Datum> {
    row.get(index).ok_or_else(|| {
        PlFault::ValueError(format!(
            "INTO list names column {} but the row has {}",
            index + 1,
            row.len()
        ))
    })
}

const INTO_WITHOUT_SELECT: &str = "INTO clause must be used with a SELECT statement";

/// Dynamic statements are only known at run time; a statement whose prepared
/// form returns no columns cannot fill INTO targets.
pub fn ban_into_without_columns(stmt: &dyn PreparedStatement) -> PlResult<()> {
    if stmt.column_count() < 1 {
        return Err(PlFault::SqlError(INTO_WITHOUT_SELECT.to_string()));
    }
    Ok(())
}

/// Runs a statement without INTO. A query leaves the row count at zero, an
/// update records the number of affected rows.
pub fn execute_plain(stmt: &mut dyn PreparedStatement, row_count: &mut i64) -> PlResult<()> {
    match stmt.execute()? {
        Execution::Rows(_) => *row_count = 0,
        Execution::Updated(n) => *row_count = n,
    }
    Ok(())
}

/// Runs a SELECT ... INTO. Exactly one row is expected.
///
/// With more than one row the first row is still assigned and the row count
/// still set to 1 before `TooManyRows` is raised; handlers observe those
/// values.
pub fn execute_into(
    stmt: &mut dyn PreparedStatement,
    row_count: &mut i64,
    assign: impl FnOnce(&[Datum]) -> PlResult<()>,
) -> PlResult<()> {
    let mut rows = match stmt.execute()? {
        Execution::Rows(rows) => rows,
        Execution::Updated(_) => {
            return Err(PlFault::SqlError(INTO_WITHOUT_SELECT.to_string()));
        }
    };
    *row_count = 0;
    let Some(first) = rows.next_row()? else {
        return Err(PlFault::NoDataFound);
    };
    *row_count = 1;
    assign(&first)?;
    if rows.next_row()?.is_some() {
        return Err(PlFault::TooManyRows);
    }
    Ok(())
}
