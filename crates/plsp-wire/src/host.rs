use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::value::{CursorHandle, Decimal, Oid};

/// Scalar representations a routine parameter can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    Decimal,
    String,
    Date,
    Time,
    Timestamp,
    Datetime,
    Oid,
    Cursor,
    Object,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 15] = [
        ScalarKind::Bool,
        ScalarKind::I16,
        ScalarKind::I32,
        ScalarKind::I64,
        ScalarKind::F32,
        ScalarKind::F64,
        ScalarKind::Decimal,
        ScalarKind::String,
        ScalarKind::Date,
        ScalarKind::Time,
        ScalarKind::Timestamp,
        ScalarKind::Datetime,
        ScalarKind::Oid,
        ScalarKind::Cursor,
        ScalarKind::Object,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::I16 => "i16",
            ScalarKind::I32 => "i32",
            ScalarKind::I64 => "i64",
            ScalarKind::F32 => "f32",
            ScalarKind::F64 => "f64",
            ScalarKind::Decimal => "decimal",
            ScalarKind::String => "string",
            ScalarKind::Date => "date",
            ScalarKind::Time => "time",
            ScalarKind::Timestamp => "timestamp",
            ScalarKind::Datetime => "datetime",
            ScalarKind::Oid => "oid",
            ScalarKind::Cursor => "cursor",
            ScalarKind::Object => "object",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        ScalarKind::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Primitive kinds have a zero value; everything else is an object that
    /// may be absent.
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            ScalarKind::Bool
                | ScalarKind::I16
                | ScalarKind::I32
                | ScalarKind::I64
                | ScalarKind::F32
                | ScalarKind::F64
        )
    }
}

pub const MAX_ARRAY_DIMS: u8 = 2;

/// Declared host representation of one parameter or return slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostType {
    pub kind: ScalarKind,
    /// Boxed primitive: accepts null instead of collapsing it to zero.
    pub nullable: bool,
    pub dims: u8,
}

impl HostType {
    pub fn scalar(kind: ScalarKind) -> Self {
        Self {
            kind,
            nullable: !kind.is_primitive(),
            dims: 0,
        }
    }

    pub fn boxed(kind: ScalarKind) -> Self {
        Self {
            kind,
            nullable: true,
            dims: 0,
        }
    }

    pub fn array_of(self, dims: u8) -> Self {
        Self { dims, ..self }
    }

    pub fn is_array(&self) -> bool {
        self.dims > 0
    }

    /// Type of one element of an array type.
    pub fn element(&self) -> Self {
        Self {
            dims: self.dims.saturating_sub(1),
            ..*self
        }
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.as_str())?;
        if self.nullable && self.kind.is_primitive() {
            f.write_str("?")?;
        }
        for _ in 0..self.dims {
            f.write_str("[]")?;
        }
        Ok(())
    }
}

/// A value in the form routines consume and produce.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    String(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Datetime(NaiveDateTime),
    Oid(Oid),
    Cursor(CursorHandle),
    Array(Vec<HostValue>),
    /// A host object the wire has no representation for.
    Opaque(String),
}

impl HostValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            HostValue::Null => "null",
            HostValue::Bool(_) => "bool",
            HostValue::I16(_) => "i16",
            HostValue::I32(_) => "i32",
            HostValue::I64(_) => "i64",
            HostValue::F32(_) => "f32",
            HostValue::F64(_) => "f64",
            HostValue::Decimal(_) => "decimal",
            HostValue::String(_) => "string",
            HostValue::Date(_) => "date",
            HostValue::Time(_) => "time",
            HostValue::Timestamp(_) => "timestamp",
            HostValue::Datetime(_) => "datetime",
            HostValue::Oid(_) => "oid",
            HostValue::Cursor(_) => "cursor",
            HostValue::Array(_) => "array",
            HostValue::Opaque(_) => "opaque",
        }
    }

    /// First slot of an OUT-parameter container.
    pub fn out_slot(&self) -> Option<&HostValue> {
        match self {
            HostValue::Array(items) => items.first(),
            _ => None,
        }
    }

    pub fn out_slot_mut(&mut self) -> Option<&mut HostValue> {
        match self {
            HostValue::Array(items) => items.first_mut(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_signature_spelling() {
        assert_eq!(HostType::scalar(ScalarKind::I32).to_string(), "i32");
        assert_eq!(HostType::boxed(ScalarKind::I32).to_string(), "i32?");
        assert_eq!(
            HostType::scalar(ScalarKind::String).array_of(2).to_string(),
            "string[][]"
        );
        assert_eq!(
            HostType::scalar(ScalarKind::F64).array_of(2).element().element(),
            HostType::scalar(ScalarKind::F64)
        );
    }
}
