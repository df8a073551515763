//! Frame bodies. Each body follows the 16-byte header in the same payload.

use plsp_contracts::ERROR_MARKER;

use crate::codec::{Packer, Unpacker};
use crate::db_type::DbType;
use crate::error::WireError;
use crate::frame::Opcode;
use crate::value::{ColumnInfo, Value};

fn expect_trailer(u: &mut Unpacker<'_>, op: Opcode) -> Result<(), WireError> {
    let got = u.unpack_u32()?;
    if got != op.code() {
        return Err(WireError::Malformed(format!(
            "{} body ends with 0x{got:02X}, expected 0x{:02X}",
            op.as_str(),
            op.code()
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvokeRequest {
    pub signature: String,
    pub args: Vec<Value>,
    pub return_type: DbType,
}

impl InvokeRequest {
    pub fn pack(&self, p: &mut Packer) -> Result<(), WireError> {
        p.pack_string(&self.signature)?;
        p.pack_count(self.args.len())?;
        for arg in &self.args {
            arg.pack(p)?;
        }
        p.pack_i32(self.return_type.tag());
        p.pack_u32(Opcode::Invoke.code());
        Ok(())
    }

    pub fn unpack(u: &mut Unpacker<'_>) -> Result<Self, WireError> {
        let signature = u.unpack_string()?;
        let n = u.unpack_count()?;
        let mut args = Vec::with_capacity(n.min(u.remaining()));
        for _ in 0..n {
            args.push(Value::unpack(u)?);
        }
        let return_type = DbType::from_tag(u.unpack_i32()?)?;
        expect_trailer(u, Opcode::Invoke)?;
        Ok(Self {
            signature,
            args,
            return_type,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultReply {
    pub value: Value,
    pub out_params: Vec<Value>,
}

impl ResultReply {
    pub fn pack(&self, p: &mut Packer) -> Result<(), WireError> {
        self.value.pack(p)?;
        p.pack_count(self.out_params.len())?;
        for v in &self.out_params {
            v.pack(p)?;
        }
        p.pack_u32(Opcode::Result.code());
        Ok(())
    }

    pub fn unpack(u: &mut Unpacker<'_>) -> Result<Self, WireError> {
        let value = Value::unpack(u)?;
        let n = u.unpack_count()?;
        let mut out_params = Vec::with_capacity(n.min(u.remaining()));
        for _ in 0..n {
            out_params.push(Value::unpack(u)?);
        }
        expect_trailer(u, Opcode::Result)?;
        Ok(Self { value, out_params })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReply {
    pub message: String,
}

impl ErrorReply {
    pub fn pack(&self, p: &mut Packer) -> Result<(), WireError> {
        p.pack_i32(ERROR_MARKER);
        p.pack_string(&self.message)?;
        p.pack_u32(Opcode::Error.code());
        Ok(())
    }

    pub fn unpack(u: &mut Unpacker<'_>) -> Result<Self, WireError> {
        let marker = u.unpack_i32()?;
        if marker != ERROR_MARKER {
            return Err(WireError::Malformed(format!("error marker {marker}")));
        }
        let message = u.unpack_string()?;
        expect_trailer(u, Opcode::Error)?;
        Ok(Self { message })
    }
}

/// Administrative status: listening port, process name, startup options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReply {
    pub port: i32,
    pub name: String,
    pub options: Vec<String>,
}

impl StatusReply {
    pub fn pack(&self, p: &mut Packer) -> Result<(), WireError> {
        p.pack_i32(self.port);
        p.pack_string(&self.name)?;
        p.pack_count(self.options.len())?;
        for opt in &self.options {
            p.pack_string(opt)?;
        }
        Ok(())
    }

    pub fn unpack(u: &mut Unpacker<'_>) -> Result<Self, WireError> {
        let port = u.unpack_i32()?;
        let name = u.unpack_string()?;
        let n = u.unpack_count()?;
        let mut options = Vec::with_capacity(n.min(u.remaining()));
        for _ in 0..n {
            options.push(u.unpack_string()?);
        }
        Ok(Self {
            port,
            name,
            options,
        })
    }
}

/// What a running routine asks of the engine over a nested callback. The
/// engine answers each call with a RESULT frame carrying a [`NestedReply`],
/// or with an ERROR frame.
#[derive(Debug, Clone, PartialEq)]
pub enum NestedCall {
    Open { autonomous: bool },
    Prepare { sql: String },
    Execute { handle: i32, binds: Vec<Value> },
    Commit,
    Rollback,
    Close,
}

impl NestedCall {
    pub fn code(&self) -> i32 {
        match self {
            NestedCall::Open { .. } => 0,
            NestedCall::Prepare { .. } => 1,
            NestedCall::Execute { .. } => 2,
            NestedCall::Commit => 3,
            NestedCall::Rollback => 4,
            NestedCall::Close => 5,
        }
    }

    pub fn pack(&self, p: &mut Packer) -> Result<(), WireError> {
        p.pack_i32(self.code());
        match self {
            NestedCall::Open { autonomous } => p.pack_bool(*autonomous),
            NestedCall::Prepare { sql } => p.pack_string(sql)?,
            NestedCall::Execute { handle, binds } => {
                p.pack_i32(*handle);
                p.pack_count(binds.len())?;
                for v in binds {
                    v.pack(p)?;
                }
            }
            NestedCall::Commit | NestedCall::Rollback | NestedCall::Close => {}
        }
        p.pack_u32(Opcode::NestedCallback.code());
        Ok(())
    }

    pub fn unpack(u: &mut Unpacker<'_>) -> Result<Self, WireError> {
        let call = match u.unpack_i32()? {
            0 => NestedCall::Open {
                autonomous: u.unpack_bool()?,
            },
            1 => NestedCall::Prepare {
                sql: u.unpack_string()?,
            },
            2 => {
                let handle = u.unpack_i32()?;
                let n = u.unpack_count()?;
                let mut binds = Vec::with_capacity(n.min(u.remaining()));
                for _ in 0..n {
                    binds.push(Value::unpack(u)?);
                }
                NestedCall::Execute { handle, binds }
            }
            3 => NestedCall::Commit,
            4 => NestedCall::Rollback,
            5 => NestedCall::Close,
            other => {
                return Err(WireError::Malformed(format!("nested call code {other}")));
            }
        };
        expect_trailer(u, Opcode::NestedCallback)?;
        Ok(call)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NestedReply {
    Ack,
    Prepared {
        handle: i32,
        columns: Vec<ColumnInfo>,
    },
    Updated(i64),
    Rows {
        columns: Vec<ColumnInfo>,
        rows: Vec<Vec<Value>>,
    },
}

impl NestedReply {
    pub fn pack(&self, p: &mut Packer) -> Result<(), WireError> {
        match self {
            NestedReply::Ack => p.pack_i32(0),
            NestedReply::Prepared { handle, columns } => {
                p.pack_i32(1);
                p.pack_i32(*handle);
                pack_columns(p, columns)?;
            }
            NestedReply::Updated(n) => {
                p.pack_i32(2);
                p.pack_i64(*n);
            }
            NestedReply::Rows { columns, rows } => {
                p.pack_i32(3);
                pack_columns(p, columns)?;
                p.pack_count(rows.len())?;
                for row in rows {
                    for v in row.iter().take(columns.len()) {
                        v.pack(p)?;
                    }
                }
            }
        }
        p.pack_u32(Opcode::Result.code());
        Ok(())
    }

    pub fn unpack(u: &mut Unpacker<'_>) -> Result<Self, WireError> {
        let reply = match u.unpack_i32()? {
            0 => NestedReply::Ack,
            1 => NestedReply::Prepared {
                handle: u.unpack_i32()?,
                columns: unpack_columns(u)?,
            },
            2 => NestedReply::Updated(u.unpack_i64()?),
            3 => {
                let columns = unpack_columns(u)?;
                let n = u.unpack_count()?;
                let mut rows = Vec::with_capacity(n.min(u.remaining()));
                for _ in 0..n {
                    let mut row = Vec::with_capacity(columns.len());
                    for _ in 0..columns.len() {
                        row.push(Value::unpack(u)?);
                    }
                    rows.push(row);
                }
                NestedReply::Rows { columns, rows }
            }
            other => {
                return Err(WireError::Malformed(format!("nested reply kind {other}")));
            }
        };
        expect_trailer(u, Opcode::Result)?;
        Ok(reply)
    }
}

fn pack_columns(p: &mut Packer, columns: &[ColumnInfo]) -> Result<(), WireError> {
    p.pack_count(columns.len())?;
    for c in columns {
        c.pack(p)?;
    }
    Ok(())
}

fn unpack_columns(u: &mut Unpacker<'_>) -> Result<Vec<ColumnInfo>, WireError> {
    let n = u.unpack_count()?;
    let mut columns = Vec::with_capacity(n.min(u.remaining()));
    for _ in 0..n {
        columns.push(ColumnInfo::unpack(u)?);
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Datum, ParamMode};

    #[test]
    fn invoke_request_round_trips() {
        let req = InvokeRequest {
            signature: "'util'.add(i32,i32[])".to_string(),
            args: vec![
                Value::of(Datum::Int(2)),
                Value::null(DbType::Int).with_mode(ParamMode::Out),
            ],
            return_type: DbType::Int,
        };
        let mut p = Packer::new();
        req.pack(&mut p).unwrap();
        let mut u = Unpacker::new(p.as_slice());
        assert_eq!(InvokeRequest::unpack(&mut u).unwrap(), req);
        assert!(u.is_empty());
    }

    #[test]
    fn wrong_trailer_is_malformed_not_fatal() {
        let mut p = Packer::new();
        p.pack_i32(ERROR_MARKER);
        p.pack_string("boom").unwrap();
        p.pack_u32(Opcode::Result.code());
        let err = ErrorReply::unpack(&mut Unpacker::new(p.as_slice())).unwrap_err();
        assert!(matches!(err, WireError::Malformed(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn nested_rows_reply_keeps_column_count_per_row() {
        let reply = NestedReply::Rows {
            columns: vec![
                ColumnInfo::new("id", DbType::Int),
                ColumnInfo::new("name", DbType::String),
            ],
            rows: vec![
                vec![Value::of(Datum::Int(1)), Value::of(Datum::String("a".into()))],
                vec![Value::of(Datum::Int(2)), Value::null(DbType::String)],
            ],
        };
        let mut p = Packer::new();
        reply.pack(&mut p).unwrap();
        let mut u = Unpacker::new(p.as_slice());
        assert_eq!(NestedReply::unpack(&mut u).unwrap(), reply);
        assert!(u.is_empty());
    }

    #[test]
    fn unknown_nested_call_code_is_malformed() {
        let mut p = Packer::new();
        p.pack_i32(42);
        p.pack_u32(Opcode::NestedCallback.code());
        let err = NestedCall::unpack(&mut Unpacker::new(p.as_slice())).unwrap_err();
        assert!(matches!(err, WireError::Malformed(_)));
    }
}
