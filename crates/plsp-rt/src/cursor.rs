use plsp_wire::{ColumnInfo, Datum};

use crate::convert::{from_datum, PlType};
use crate::fault::{PlFault, PlResult};
use crate::sql::{Execution, PreparedStatement, ResultRows, SqlConnection};

/// One fetched row: field names in select-list order with their values.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Vec<(String, Datum)>,
}

impl Record {
    pub fn from_row(columns: &[ColumnInfo], row: Vec<Datum>) -> Self {
        let fields = row
            .into_iter()
            .enumerate()
            .map(|(i, d)| {
                let name = columns
                    .get(i)
                    .map(|c| c.name.to_ascii_uppercase())
                    .unwrap_or_default();
                (name, d)
            })
            .collect();
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Field by select-list position, known at compile time for static SQL.
    pub fn field_at(&self, index: usize) -> PlResult<&Datum> {
        self.fields
            .get(index)
            .map(|(_, d)| d)
            .ok_or_else(|| PlFault::ValueError(format!("record has no field #{}", index + 1)))
    }

    /// Field by name, resolved at run time for dynamic SQL.
    pub fn field(&self, name: &str) -> PlResult<&Datum> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, d)| d)
            .ok_or_else(|| PlFault::ValueError(format!("record has no field {name}")))
    }

    pub fn get_at<T: PlType>(&self, index: usize) -> PlResult<Option<T>> {
        from_datum(self.field_at(index)?)
    }

    pub fn get<T: PlType>(&self, name: &str) -> PlResult<Option<T>> {
        from_datum(self.field(name)?)
    }
}

pub fn open_rows(stmt: &mut dyn PreparedStatement) -> PlResult<Box<dyn ResultRows>> {
    match stmt.execute()? {
        Execution::Rows(rows) => Ok(rows),
        Execution::Updated(_) => Err(PlFault::SqlError(
            "cursor query must be a SELECT statement".to_string(),
        )),
    }
}

pub fn next_record(rows: &mut dyn ResultRows) -> PlResult<Option<Record>> {
    let Some(row) = rows.next_row()? else {
        return Ok(None);
    };
    Ok(Some(Record::from_row(rows.columns(), row)))
}

/// Explicit cursor declared by a routine.
pub struct Cursor {
    sql: String,
    rows: Option<Box<dyn ResultRows>>,
    row_count: i64,
    found: Option<bool>,
}

impl Cursor {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            rows: None,
            row_count: 0,
            found: None,
        }
    }

    pub fn open(&mut self, conn: &mut dyn SqlConnection, args: Vec<Datum>) -> PlResult<()> {
        if self.rows.is_some() {
            return Err(PlFault::CursorAlreadyOpen);
        }
        let mut stmt = conn.prepare(&self.sql)?;
        for (i, arg) in args.into_iter().enumerate() {
            stmt.bind(i + 1, arg)?;
        }
        self.rows = Some(open_rows(&mut *stmt)?);
        self.row_count = 0;
        self.found = None;
        Ok(())
    }

    pub fn fetch(&mut self) -> PlResult<Option<Record>> {
        let rows = self.rows.as_mut().ok_or(PlFault::InvalidCursor)?;
        let rec = next_record(rows.as_mut())?;
        self.found = Some(rec.is_some());
        if rec.is_some() {
            self.row_count += 1;
        }
        Ok(rec)
    }

    pub fn close(&mut self) -> PlResult<()> {
        if self.rows.take().is_none() {
            return Err(PlFault::InvalidCursor);
        }
        Ok(())
    }

    pub fn attr_isopen(&self) -> Option<bool> {
        Some(self.rows.is_some())
    }

    pub fn attr_found(&self) -> PlResult<Option<bool>> {
        if self.rows.is_none() {
            return Err(PlFault::InvalidCursor);
        }
        Ok(self.found)
    }

    pub fn attr_notfound(&self) -> PlResult<Option<bool>> {
        Ok(self.attr_found()?.map(|f| !f))
    }

    pub fn attr_rowcount(&self) -> PlResult<Option<i64>> {
        if self.rows.is_none() {
            return Err(PlFault::InvalidCursor);
        }
        Ok(Some(self.row_count))
    }
}
