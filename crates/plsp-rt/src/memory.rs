//! In-memory engine connection with scripted statement outcomes. Used by
//! tests and by hosts that run routines without an engine attached.

use std::collections::{HashMap, VecDeque};

use plsp_wire::{ColumnInfo, Datum};

use crate::fault::{PlFault, PlResult};
use crate::sql::{Execution, PreparedStatement, ResultRows, SqlConnection};

#[derive(Debug, Clone)]
pub enum Scripted {
    Rows {
        columns: Vec<ColumnInfo>,
        rows: Vec<Vec<Datum>>,
    },
    Updated(i64),
    Fail(String),
}

#[derive(Debug, Default)]
pub struct MemoryConnection {
    scripts: HashMap<String, Scripted>,
    /// Every executed statement with its bound values, in order.
    pub executed: Vec<(String, Vec<Datum>)>,
    pub commits: usize,
    pub rollbacks: usize,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&mut self, sql: &str, outcome: Scripted) -> &mut Self {
        self.scripts.insert(sql.to_string(), outcome);
        self
    }

    pub fn rows(&mut self, sql: &str, columns: &[&str], rows: Vec<Vec<Datum>>) -> &mut Self {
        let columns = columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let db_type = rows
                    .first()
                    .and_then(|r| r.get(i))
                    .map(Datum::wire_type)
                    .unwrap_or(plsp_wire::DbType::Null);
                ColumnInfo::new(*name, db_type)
            })
            .collect();
        self.script(sql, Scripted::Rows { columns, rows })
    }

    pub fn updated(&mut self, sql: &str, n: i64) -> &mut Self {
        self.script(sql, Scripted::Updated(n))
    }
}

impl SqlConnection for MemoryConnection {
    fn prepare(&mut self, sql: &str) -> PlResult<Box<dyn PreparedStatement + '_>> {
        let outcome = self
            .scripts
            .get(sql)
            .cloned()
            .ok_or_else(|| PlFault::SqlError(format!("unknown statement: {sql}")))?;
        Ok(Box::new(MemoryStatement {
            conn: self,
            sql: sql.to_string(),
            outcome,
            binds: Vec::new(),
        }))
    }

    fn commit(&mut self) -> PlResult<()> {
        self.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> PlResult<()> {
        self.rollbacks += 1;
        Ok(())
    }
}

struct MemoryStatement<'c> {
    conn: &'c mut MemoryConnection,
    sql: String,
    outcome: Scripted,
    binds: Vec<Datum>,
}

impl PreparedStatement for MemoryStatement<'_> {
    fn column_count(&self) -> usize {
        match &self.outcome {
            Scripted::Rows { columns, .. } => columns.len(),
            _ => 0,
        }
    }

    fn bind(&mut self, index: usize, value: Datum) -> PlResult<()> {
        if index == 0 {
            return Err(PlFault::SqlError("bind index is 1-based".to_string()));
        }
        if self.binds.len() < index {
            self.binds.resize(index, Datum::Null);
        }
        self.binds[index - 1] = value;
        Ok(())
    }

    fn execute(&mut self) -> PlResult<Execution> {
        self.conn.executed.push((self.sql.clone(), self.binds.clone()));
        match &self.outcome {
            Scripted::Rows { columns, rows } => Ok(Execution::Rows(Box::new(MemoryRows {
                columns: columns.clone(),
                rows: rows.iter().cloned().collect(),
            }))),
            Scripted::Updated(n) => Ok(Execution::Updated(*n)),
            Scripted::Fail(msg) => Err(PlFault::SqlError(msg.clone())),
        }
    }
}

struct MemoryRows {
    columns: Vec<ColumnInfo>,
    rows: VecDeque<Vec<Datum>>,
}

impl ResultRows for MemoryRows {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn next_row(&mut self) -> PlResult<Option<Vec<Datum>>> {
        Ok(self.rows.pop_front())
    }
}
