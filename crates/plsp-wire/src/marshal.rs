//! Conversions between wire values and host representations.
//!
//! `coerce_arg` is the fixed table used before a call, `wrap_host` inspects
//! what a routine handed back, and `to_db_type` conforms a result to the DB
//! type the engine asked for.

use thiserror::Error;

use crate::db_type::DbType;
use crate::error::TypeMismatch;
use crate::host::{HostType, HostValue, ScalarKind};
use crate::value::{Datum, Decimal, ParamMode, Value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalError {
    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatch),

    #[error("unsupported host value kind: {0}")]
    NotSupported(String),
}

/// Converts one wire value to the exact declared host representation.
/// Array types take the value's elements, so a scalar becomes a one-element
/// container.
pub fn coerce_arg(value: &Value, ty: &HostType) -> Result<HostValue, TypeMismatch> {
    if ty.is_array() {
        let elem = ty.element();
        let items = value
            .elements()
            .iter()
            .map(|v| coerce_arg(v, &elem))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(HostValue::Array(items));
    }
    if ty.nullable && value.is_null() {
        return Ok(HostValue::Null);
    }
    coerce_scalar(value, ty.kind)
}

fn or_null<T>(v: Option<T>, f: impl FnOnce(T) -> HostValue) -> HostValue {
    v.map(f).unwrap_or(HostValue::Null)
}

fn coerce_scalar(value: &Value, kind: ScalarKind) -> Result<HostValue, TypeMismatch> {
    Ok(match kind {
        ScalarKind::Bool => HostValue::Bool(value.to_bool()?),
        ScalarKind::I16 => HostValue::I16(value.to_i16()?),
        ScalarKind::I32 => HostValue::I32(value.to_i32()?),
        ScalarKind::I64 => HostValue::I64(value.to_i64()?),
        ScalarKind::F32 => HostValue::F32(value.to_f32()?),
        ScalarKind::F64 => HostValue::F64(value.to_f64()?),
        ScalarKind::Decimal => or_null(value.to_decimal()?, HostValue::Decimal),
        ScalarKind::String => or_null(value.to_text()?, HostValue::String),
        ScalarKind::Date => or_null(value.to_date()?, HostValue::Date),
        ScalarKind::Time => or_null(value.to_time()?, HostValue::Time),
        ScalarKind::Timestamp => or_null(value.to_timestamp()?, HostValue::Timestamp),
        ScalarKind::Datetime => or_null(value.to_datetime()?, HostValue::Datetime),
        ScalarKind::Oid => or_null(value.to_oid()?, HostValue::Oid),
        ScalarKind::Cursor => or_null(value.to_cursor()?, HostValue::Cursor),
        ScalarKind::Object => natural_host(value)?,
    })
}

/// The host value a datum maps to when the routine accepts any object.
fn natural_host(value: &Value) -> Result<HostValue, TypeMismatch> {
    Ok(match &value.datum {
        Datum::Null => HostValue::Null,
        Datum::Short(v) => HostValue::I16(*v),
        Datum::Int(v) => HostValue::I32(*v),
        Datum::Bigint(v) => HostValue::I64(*v),
        Datum::Float(v) => HostValue::F32(*v),
        Datum::Double(v) => HostValue::F64(*v),
        Datum::Numeric(v) => HostValue::Decimal(v.clone()),
        Datum::String(v) => HostValue::String(v.clone()),
        Datum::Date(v) => HostValue::Date(*v),
        Datum::Time(v) => HostValue::Time(*v),
        Datum::Timestamp(v) => HostValue::Timestamp(*v),
        Datum::Datetime(v) => HostValue::Datetime(*v),
        Datum::Oid(v) => HostValue::Oid(*v),
        Datum::ResultSet(v) => HostValue::Cursor(*v),
        Datum::Collection(items) => HostValue::Array(
            items
                .iter()
                .map(natural_host)
                .collect::<Result<Vec<_>, _>>()?,
        ),
    })
}

/// Wraps a host value back into a wire value by inspecting its runtime kind.
pub fn wrap_host(value: &HostValue) -> Result<Value, MarshalError> {
    let datum = match value {
        HostValue::Null => Datum::Null,
        HostValue::Bool(v) => Datum::Int(i32::from(*v)),
        HostValue::I16(v) => Datum::Short(*v),
        HostValue::I32(v) => Datum::Int(*v),
        HostValue::I64(v) => Datum::Bigint(*v),
        HostValue::F32(v) => Datum::Float(*v),
        HostValue::F64(v) => Datum::Double(*v),
        HostValue::Decimal(v) => Datum::Numeric(v.clone()),
        HostValue::String(v) => Datum::String(v.clone()),
        HostValue::Date(v) => Datum::Date(*v),
        HostValue::Time(v) => Datum::Time(*v),
        HostValue::Timestamp(v) => Datum::Timestamp(*v),
        HostValue::Datetime(v) => Datum::Datetime(*v),
        HostValue::Oid(v) => Datum::Oid(*v),
        HostValue::Cursor(v) => Datum::ResultSet(*v),
        HostValue::Array(items) => Datum::Collection(
            items
                .iter()
                .map(wrap_host)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        HostValue::Opaque(name) => return Err(MarshalError::NotSupported(name.clone())),
    };
    Ok(Value::of(datum))
}

/// Converts a result to the DB type the engine declared for the slot. Nulls
/// stay null under the declared type.
pub fn to_db_type(db_type: DbType, value: &Value) -> Result<Value, TypeMismatch> {
    let mode = value.mode;
    if value.is_null() {
        return Ok(Value::null(db_type).with_mode(mode));
    }
    let datum = match db_type {
        DbType::Null => value.datum.clone(),
        DbType::Short => Datum::Short(value.to_i16()?),
        DbType::Int => Datum::Int(value.to_i32()?),
        DbType::Bigint => Datum::Bigint(value.to_i64()?),
        DbType::Float => Datum::Float(value.to_f32()?),
        DbType::Double | DbType::Monetary => Datum::Double(value.to_f64()?),
        DbType::Numeric => Datum::Numeric(value.to_decimal()?.unwrap_or_else(Decimal::zero)),
        DbType::String | DbType::Char => Datum::String(value.to_text()?.unwrap_or_default()),
        DbType::Date => opt_datum(value.to_date()?, Datum::Date),
        DbType::Time => opt_datum(value.to_time()?, Datum::Time),
        DbType::Timestamp => opt_datum(value.to_timestamp()?, Datum::Timestamp),
        DbType::Datetime => opt_datum(value.to_datetime()?, Datum::Datetime),
        DbType::Object => opt_datum(value.to_oid()?, Datum::Oid),
        DbType::ResultSet => opt_datum(value.to_cursor()?, Datum::ResultSet),
        DbType::Set | DbType::Multiset | DbType::Sequence => Datum::Collection(value.elements()),
    };
    Ok(Value::new(datum, db_type).with_mode(mode))
}

fn opt_datum<T>(v: Option<T>, f: impl FnOnce(T) -> Datum) -> Datum {
    v.map(f).unwrap_or(Datum::Null)
}

/// Wraps the single element of an OUT-parameter container and conforms it to
/// the parameter's declared DB type.
pub fn out_value(container: &HostValue, db_type: DbType, mode: ParamMode) -> Result<Value, MarshalError> {
    let slot = container.out_slot().unwrap_or(&HostValue::Null);
    let wrapped = wrap_host(slot)?;
    Ok(to_db_type(db_type, &wrapped)?.with_mode(mode))
}
