use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use plsp_wire::marshal::wrap_host;
use plsp_wire::{CursorHandle, Datum, Decimal, HostValue, Oid, TypeMismatch, Value};

use crate::fault::{PlFault, PlResult};
use crate::ops::round_decimal;

/// A scalar type compiled routines hold in variables, always as `Option<T>`
/// so that SQL null is representable.
pub trait PlType: Sized + Clone {
    fn from_value(v: &Value) -> Result<Option<Self>, TypeMismatch>;
    fn into_datum(self) -> Datum;
    fn into_host(self) -> HostValue;
}

macro_rules! pl_type {
    ($t:ty, $getter:ident, $datum:expr, $host:expr) => {
        impl PlType for $t {
            fn from_value(v: &Value) -> Result<Option<Self>, TypeMismatch> {
                v.$getter()
            }

            fn into_datum(self) -> Datum {
                ($datum)(self)
            }

            fn into_host(self) -> HostValue {
                ($host)(self)
            }
        }
    };
}

pl_type!(i16, to_i16_opt, Datum::Short, HostValue::I16);
pl_type!(i32, to_i32_opt, Datum::Int, HostValue::I32);
pl_type!(i64, to_i64_opt, Datum::Bigint, HostValue::I64);
pl_type!(f32, to_f32_opt, Datum::Float, HostValue::F32);
pl_type!(f64, to_f64_opt, Datum::Double, HostValue::F64);
pl_type!(bool, to_bool_opt, |b: bool| Datum::Int(i32::from(b)), HostValue::Bool);
pl_type!(Decimal, to_decimal, Datum::Numeric, HostValue::Decimal);
pl_type!(String, to_text, Datum::String, HostValue::String);
pl_type!(NaiveDate, to_date, Datum::Date, HostValue::Date);
pl_type!(NaiveTime, to_time, Datum::Time, HostValue::Time);
pl_type!(NaiveDateTime, to_datetime, Datum::Datetime, HostValue::Datetime);
pl_type!(Oid, to_oid, Datum::Oid, HostValue::Oid);
pl_type!(CursorHandle, to_cursor, Datum::ResultSet, HostValue::Cursor);

impl PlType for Datum {
    fn from_value(v: &Value) -> Result<Option<Self>, TypeMismatch> {
        if v.is_null() {
            return Ok(None);
        }
        Ok(Some(v.datum.clone()))
    }

    fn into_datum(self) -> Datum {
        self
    }

    fn into_host(self) -> HostValue {
        match self {
            Datum::Null => HostValue::Null,
            Datum::Short(v) => HostValue::I16(v),
            Datum::Int(v) => HostValue::I32(v),
            Datum::Bigint(v) => HostValue::I64(v),
            Datum::Float(v) => HostValue::F32(v),
            Datum::Double(v) => HostValue::F64(v),
            Datum::Numeric(v) => HostValue::Decimal(v),
            Datum::String(v) => HostValue::String(v),
            Datum::Date(v) => HostValue::Date(v),
            Datum::Time(v) => HostValue::Time(v),
            Datum::Timestamp(v) => HostValue::Timestamp(v),
            Datum::Datetime(v) => HostValue::Datetime(v),
            Datum::Oid(v) => HostValue::Oid(v),
            Datum::ResultSet(v) => HostValue::Cursor(v),
            Datum::Collection(items) => {
                HostValue::Array(items.into_iter().map(|v| v.datum.into_host()).collect())
            }
        }
    }
}

pub fn to_datum<T: PlType>(v: Option<T>) -> Datum {
    v.map(PlType::into_datum).unwrap_or(Datum::Null)
}

pub fn from_datum<T: PlType>(d: &Datum) -> PlResult<Option<T>> {
    Ok(T::from_value(&Value::of(d.clone()))?)
}

/// Explicit conversion between two variable types.
pub fn conv<S: PlType, D: PlType>(v: Option<S>) -> PlResult<Option<D>> {
    from_datum(&to_datum(v))
}

/// Literal written as text in the source routine (temporal and numeric).
pub fn lit<T: PlType>(text: &str) -> PlResult<Option<T>> {
    from_datum(&Datum::String(text.to_string()))
}

fn host_to_value(h: &HostValue) -> PlResult<Value> {
    wrap_host(h).map_err(|e| PlFault::ValueError(e.to_string()))
}

pub fn expect_args(args: &[HostValue], n: usize) -> PlResult<()> {
    if args.len() != n {
        return Err(PlFault::ProgramError(format!(
            "routine expects {n} arguments, got {}",
            args.len()
        )));
    }
    Ok(())
}

pub fn arg_in<T: PlType>(h: &HostValue) -> PlResult<Option<T>> {
    Ok(T::from_value(&host_to_value(h)?)?)
}

/// Current content of an INOUT parameter's slot.
pub fn arg_inout<T: PlType>(h: &HostValue) -> PlResult<Option<T>> {
    match h.out_slot() {
        Some(slot) => arg_in(slot),
        None => arg_in(h),
    }
}

pub fn put_out<T: PlType>(h: &mut HostValue, v: Option<T>) {
    let value = ret_host(v);
    match h.out_slot_mut() {
        Some(slot) => *slot = value,
        None => *h = HostValue::Array(vec![value]),
    }
}

pub fn ret_host<T: PlType>(v: Option<T>) -> HostValue {
    v.map(PlType::into_host).unwrap_or(HostValue::Null)
}

/// Rounds to `scale` fraction digits and rejects values that then need more
/// than `precision` digits.
pub fn check_precision(v: Option<Decimal>, precision: usize, scale: usize) -> PlResult<Option<Decimal>> {
    let Some(d) = v else {
        return Ok(None);
    };
    let rounded = round_decimal(&d, scale)?;
    if rounded.precision() > precision {
        return Err(PlFault::ValueError(format!(
            "numeric value {d} does not fit NUMERIC({precision}, {scale})"
        )));
    }
    Ok(Some(rounded))
}

/// Length check for CHAR/VARCHAR targets; CHAR values are blank-padded.
pub fn check_str_length(v: Option<String>, length: usize, is_char: bool) -> PlResult<Option<String>> {
    let Some(s) = v else {
        return Ok(None);
    };
    let n = s.chars().count();
    if n > length {
        let kind = if is_char { "CHAR" } else { "VARCHAR" };
        return Err(PlFault::ValueError(format!(
            "string of length {n} does not fit {kind}({length})"
        )));
    }
    if is_char && n < length {
        let mut padded = s;
        padded.extend(std::iter::repeat(' ').take(length - n));
        return Ok(Some(padded));
    }
    Ok(Some(s))
}
