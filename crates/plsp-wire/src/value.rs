use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::codec::{Packer, Unpacker};
use crate::db_type::DbType;
use crate::error::{TypeMismatch, WireError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParamMode {
    #[default]
    In,
    Out,
    InOut,
}

impl ParamMode {
    pub fn code(self) -> i32 {
        match self {
            ParamMode::In => 1,
            ParamMode::Out => 2,
            ParamMode::InOut => 3,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, WireError> {
        match code {
            1 => Ok(ParamMode::In),
            2 => Ok(ParamMode::Out),
            3 => Ok(ParamMode::InOut),
            _ => Err(WireError::UnknownMode(code)),
        }
    }

    pub fn is_out(self) -> bool {
        matches!(self, ParamMode::Out | ParamMode::InOut)
    }
}

/// Row identifier: page, slot and volume of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Oid {
    pub page: i32,
    pub slot: i16,
    pub volume: i16,
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OID:@{}|{}|{}", self.page, self.slot, self.volume)
    }
}

/// Engine-side query handle of an open result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorHandle(pub i64);

/// Decimal number kept in its canonical text form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal(String);

impl Decimal {
    pub fn zero() -> Self {
        Decimal("0".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn parts(&self) -> (bool, &str, &str) {
        let (neg, digits) = match self.0.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, self.0.as_str()),
        };
        match digits.split_once('.') {
            Some((int, frac)) => (neg, int, frac),
            None => (neg, digits, ""),
        }
    }

    /// Number of significant digits.
    pub fn precision(&self) -> usize {
        let (_, int, frac) = self.parts();
        let int = int.trim_start_matches('0');
        let n = int.len() + frac.len();
        n.max(1)
    }

    pub fn scale(&self) -> usize {
        self.parts().2.len()
    }

    pub fn from_i64(v: i64) -> Self {
        Decimal(v.to_string())
    }

    pub fn from_f64(v: f64) -> Result<Self, TypeMismatch> {
        if !v.is_finite() {
            return Err(TypeMismatch::new("double", "decimal"));
        }
        v.to_string().parse()
    }

    pub fn to_f64(&self) -> f64 {
        self.0.parse().unwrap_or(0.0)
    }

    /// Integer part, truncated toward zero; out-of-range values are a mismatch.
    pub fn to_i64(&self) -> Result<i64, TypeMismatch> {
        let (neg, int, _) = self.parts();
        let int = if int.is_empty() { "0" } else { int };
        let text = if neg { format!("-{int}") } else { int.to_string() };
        text.parse::<i64>()
            .map_err(|_| TypeMismatch::new("decimal", "bigint"))
    }
}

impl FromStr for Decimal {
    type Err = TypeMismatch;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || TypeMismatch::new("string", "decimal");
        let s = s.trim();
        let (neg, body) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        let (int, frac) = body.split_once('.').unwrap_or((body, ""));
        if int.is_empty() && frac.is_empty() {
            return Err(err());
        }
        if !int.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let int = int.trim_start_matches('0');
        let int = if int.is_empty() { "0" } else { int };
        let is_zero = int == "0" && frac.bytes().all(|b| b == b'0');
        let mut out = String::with_capacity(s.len() + 1);
        if neg && !is_zero {
            out.push('-');
        }
        out.push_str(int);
        if !frac.is_empty() {
            out.push('.');
            out.push_str(frac);
        }
        Ok(Decimal(out))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M:%S";
const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S";
const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Short(i16),
    Int(i32),
    Bigint(i64),
    Float(f32),
    Double(f64),
    Numeric(Decimal),
    String(String),
    Date(NaiveDate),
    /// Whole seconds travel on the wire; accessors drop the fraction.
    Time(NaiveTime),
    /// Whole seconds, like `Time`.
    Timestamp(NaiveDateTime),
    /// Millisecond precision.
    Datetime(NaiveDateTime),
    Oid(Oid),
    ResultSet(CursorHandle),
    Collection(Vec<Value>),
}

impl Datum {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Datum::Null => "null",
            Datum::Short(_) => "short",
            Datum::Int(_) => "int",
            Datum::Bigint(_) => "bigint",
            Datum::Float(_) => "float",
            Datum::Double(_) => "double",
            Datum::Numeric(_) => "numeric",
            Datum::String(_) => "string",
            Datum::Date(_) => "date",
            Datum::Time(_) => "time",
            Datum::Timestamp(_) => "timestamp",
            Datum::Datetime(_) => "datetime",
            Datum::Oid(_) => "oid",
            Datum::ResultSet(_) => "resultset",
            Datum::Collection(_) => "collection",
        }
    }

    /// Tag written on the wire ahead of the payload.
    pub fn wire_type(&self) -> DbType {
        match self {
            Datum::Null => DbType::Null,
            Datum::Short(_) => DbType::Short,
            Datum::Int(_) => DbType::Int,
            Datum::Bigint(_) => DbType::Bigint,
            Datum::Float(_) => DbType::Float,
            Datum::Double(_) => DbType::Double,
            Datum::Numeric(_) => DbType::Numeric,
            Datum::String(_) => DbType::String,
            Datum::Date(_) => DbType::Date,
            Datum::Time(_) => DbType::Time,
            Datum::Timestamp(_) => DbType::Timestamp,
            Datum::Datetime(_) => DbType::Datetime,
            Datum::Oid(_) => DbType::Object,
            Datum::ResultSet(_) => DbType::ResultSet,
            Datum::Collection(_) => DbType::Sequence,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    fn mismatch(&self, to: &'static str) -> TypeMismatch {
        TypeMismatch::new(self.kind_name(), to)
    }

    fn to_i64_in(&self, to: &'static str) -> Result<i64, TypeMismatch> {
        match self {
            Datum::Null => Ok(0),
            Datum::Short(v) => Ok(i64::from(*v)),
            Datum::Int(v) => Ok(i64::from(*v)),
            Datum::Bigint(v) => Ok(*v),
            Datum::Float(v) => float_to_i64(f64::from(*v)).ok_or(self.mismatch(to)),
            Datum::Double(v) => float_to_i64(*v).ok_or(self.mismatch(to)),
            Datum::Numeric(d) => d.to_i64().map_err(|_| self.mismatch(to)),
            Datum::String(s) => s
                .parse::<Decimal>()
                .and_then(|d| d.to_i64())
                .map_err(|_| self.mismatch(to)),
            _ => Err(self.mismatch(to)),
        }
    }

    fn to_f64_in(&self, to: &'static str) -> Result<f64, TypeMismatch> {
        match self {
            Datum::Null => Ok(0.0),
            Datum::Short(v) => Ok(f64::from(*v)),
            Datum::Int(v) => Ok(f64::from(*v)),
            Datum::Bigint(v) => Ok(*v as f64),
            Datum::Float(v) => Ok(f64::from(*v)),
            Datum::Double(v) => Ok(*v),
            Datum::Numeric(d) => Ok(d.to_f64()),
            Datum::String(s) => s.trim().parse::<f64>().map_err(|_| self.mismatch(to)),
            _ => Err(self.mismatch(to)),
        }
    }
}

fn float_to_i64(v: f64) -> Option<i64> {
    if !v.is_finite() {
        return None;
    }
    let t = v.trunc();
    if t < i64::MIN as f64 || t >= i64::MAX as f64 {
        return None;
    }
    Some(t as i64)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, DATE_FMT)
        .ok()
        .or_else(|| parse_datetime(s).map(|dt| dt.date()))
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .ok()
        .or_else(|| parse_datetime(s).map(|dt| dt.time()))
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, DATE_FMT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn whole_seconds(t: NaiveTime) -> NaiveTime {
    t.with_nanosecond(0).unwrap_or(t)
}

fn truncate_to_seconds(dt: NaiveDateTime) -> NaiveDateTime {
    dt.with_nanosecond(0).unwrap_or(dt)
}

fn truncate_to_millis(dt: NaiveDateTime) -> NaiveDateTime {
    let ms = dt.nanosecond() / 1_000_000;
    dt.with_nanosecond(ms * 1_000_000).unwrap_or(dt)
}

fn midnight(d: NaiveDate) -> NaiveDateTime {
    d.and_time(NaiveTime::MIN)
}

/// Nested SET/MULTISET/SEQUENCE levels accepted from a peer.
pub const MAX_COLLECTION_DEPTH: usize = 64;

/// One argument or result as it travels on the wire: the datum, the parameter
/// mode and the DB type the engine declared for the slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub datum: Datum,
    pub mode: ParamMode,
    pub db_type: DbType,
}

impl Value {
    pub fn new(datum: Datum, db_type: DbType) -> Self {
        Self {
            datum,
            mode: ParamMode::In,
            db_type,
        }
    }

    /// Uses the datum's own wire type as the declared type.
    pub fn of(datum: Datum) -> Self {
        let db_type = datum.wire_type();
        Self::new(datum, db_type)
    }

    pub fn null(db_type: DbType) -> Self {
        Self::new(Datum::Null, db_type)
    }

    pub fn with_mode(mut self, mode: ParamMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn is_null(&self) -> bool {
        self.datum.is_null()
    }

    pub fn to_i16(&self) -> Result<i16, TypeMismatch> {
        let v = self.datum.to_i64_in("short")?;
        i16::try_from(v).map_err(|_| self.datum.mismatch("short"))
    }

    pub fn to_i32(&self) -> Result<i32, TypeMismatch> {
        let v = self.datum.to_i64_in("int")?;
        i32::try_from(v).map_err(|_| self.datum.mismatch("int"))
    }

    pub fn to_i64(&self) -> Result<i64, TypeMismatch> {
        self.datum.to_i64_in("bigint")
    }

    pub fn to_f32(&self) -> Result<f32, TypeMismatch> {
        let v = self.datum.to_f64_in("float")?;
        let out = v as f32;
        if v.is_finite() && !out.is_finite() {
            return Err(self.datum.mismatch("float"));
        }
        Ok(out)
    }

    pub fn to_f64(&self) -> Result<f64, TypeMismatch> {
        self.datum.to_f64_in("double")
    }

    pub fn to_bool(&self) -> Result<bool, TypeMismatch> {
        match &self.datum {
            Datum::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(self.datum.mismatch("bool")),
            },
            _ => Ok(self.datum.to_f64_in("bool")? != 0.0),
        }
    }

    pub fn to_i16_opt(&self) -> Result<Option<i16>, TypeMismatch> {
        self.nullable(Self::to_i16)
    }

    pub fn to_i32_opt(&self) -> Result<Option<i32>, TypeMismatch> {
        self.nullable(Self::to_i32)
    }

    pub fn to_i64_opt(&self) -> Result<Option<i64>, TypeMismatch> {
        self.nullable(Self::to_i64)
    }

    pub fn to_f32_opt(&self) -> Result<Option<f32>, TypeMismatch> {
        self.nullable(Self::to_f32)
    }

    pub fn to_f64_opt(&self) -> Result<Option<f64>, TypeMismatch> {
        self.nullable(Self::to_f64)
    }

    pub fn to_bool_opt(&self) -> Result<Option<bool>, TypeMismatch> {
        self.nullable(Self::to_bool)
    }

    fn nullable<T>(
        &self,
        f: impl FnOnce(&Self) -> Result<T, TypeMismatch>,
    ) -> Result<Option<T>, TypeMismatch> {
        if self.is_null() {
            return Ok(None);
        }
        f(self).map(Some)
    }

    pub fn to_decimal(&self) -> Result<Option<Decimal>, TypeMismatch> {
        let d = &self.datum;
        let out = match d {
            Datum::Null => return Ok(None),
            Datum::Short(v) => Decimal::from_i64(i64::from(*v)),
            Datum::Int(v) => Decimal::from_i64(i64::from(*v)),
            Datum::Bigint(v) => Decimal::from_i64(*v),
            Datum::Float(v) => Decimal::from_f64(f64::from(*v)).map_err(|_| d.mismatch("decimal"))?,
            Datum::Double(v) => Decimal::from_f64(*v).map_err(|_| d.mismatch("decimal"))?,
            Datum::Numeric(v) => v.clone(),
            Datum::String(s) => s.parse().map_err(|_| d.mismatch("decimal"))?,
            _ => return Err(d.mismatch("decimal")),
        };
        Ok(Some(out))
    }

    pub fn to_text(&self) -> Result<Option<String>, TypeMismatch> {
        let out = match &self.datum {
            Datum::Null => return Ok(None),
            Datum::Short(v) => v.to_string(),
            Datum::Int(v) => v.to_string(),
            Datum::Bigint(v) => v.to_string(),
            Datum::Float(v) => v.to_string(),
            Datum::Double(v) => v.to_string(),
            Datum::Numeric(v) => v.to_string(),
            Datum::String(s) => s.clone(),
            Datum::Date(v) => v.format(DATE_FMT).to_string(),
            Datum::Time(v) => v.format(TIME_FMT).to_string(),
            Datum::Timestamp(v) => v.format(TIMESTAMP_FMT).to_string(),
            Datum::Datetime(v) => v.format(DATETIME_FMT).to_string(),
            Datum::Oid(v) => v.to_string(),
            Datum::ResultSet(_) | Datum::Collection(_) => {
                return Err(self.datum.mismatch("string"))
            }
        };
        Ok(Some(out))
    }

    pub fn to_date(&self) -> Result<Option<NaiveDate>, TypeMismatch> {
        let d = &self.datum;
        match d {
            Datum::Null => Ok(None),
            Datum::Date(v) => Ok(Some(*v)),
            Datum::Timestamp(v) | Datum::Datetime(v) => Ok(Some(v.date())),
            Datum::String(s) => parse_date(s).map(Some).ok_or(d.mismatch("date")),
            _ => Err(d.mismatch("date")),
        }
    }

    pub fn to_time(&self) -> Result<Option<NaiveTime>, TypeMismatch> {
        let d = &self.datum;
        match d {
            Datum::Null => Ok(None),
            Datum::Time(v) => Ok(Some(whole_seconds(*v))),
            Datum::Timestamp(v) | Datum::Datetime(v) => Ok(Some(whole_seconds(v.time()))),
            Datum::String(s) => parse_time(s)
                .map(|v| Some(whole_seconds(v)))
                .ok_or(d.mismatch("time")),
            _ => Err(d.mismatch("time")),
        }
    }

    pub fn to_timestamp(&self) -> Result<Option<NaiveDateTime>, TypeMismatch> {
        let d = &self.datum;
        match d {
            Datum::Null => Ok(None),
            Datum::Timestamp(v) | Datum::Datetime(v) => Ok(Some(truncate_to_seconds(*v))),
            Datum::Date(v) => Ok(Some(midnight(*v))),
            Datum::String(s) => parse_datetime(s)
                .map(|v| Some(truncate_to_seconds(v)))
                .ok_or(d.mismatch("timestamp")),
            _ => Err(d.mismatch("timestamp")),
        }
    }

    pub fn to_datetime(&self) -> Result<Option<NaiveDateTime>, TypeMismatch> {
        let d = &self.datum;
        match d {
            Datum::Null => Ok(None),
            Datum::Timestamp(v) | Datum::Datetime(v) => Ok(Some(truncate_to_millis(*v))),
            Datum::Date(v) => Ok(Some(midnight(*v))),
            Datum::String(s) => parse_datetime(s)
                .map(|v| Some(truncate_to_millis(v)))
                .ok_or(d.mismatch("datetime")),
            _ => Err(d.mismatch("datetime")),
        }
    }

    pub fn to_oid(&self) -> Result<Option<Oid>, TypeMismatch> {
        match &self.datum {
            Datum::Null => Ok(None),
            Datum::Oid(v) => Ok(Some(*v)),
            d => Err(d.mismatch("oid")),
        }
    }

    pub fn to_cursor(&self) -> Result<Option<CursorHandle>, TypeMismatch> {
        match &self.datum {
            Datum::Null => Ok(None),
            Datum::ResultSet(v) => Ok(Some(*v)),
            d => Err(d.mismatch("cursor")),
        }
    }

    /// Elements of a collection. Any other value, a null included, is wrapped
    /// as a one-element container so OUT parameters always have a slot.
    pub fn elements(&self) -> Vec<Value> {
        match &self.datum {
            Datum::Collection(items) => items.clone(),
            _ => vec![Value::new(self.datum.clone(), self.db_type)],
        }
    }

    pub fn pack(&self, p: &mut Packer) -> Result<(), WireError> {
        p.pack_i32(self.mode.code());
        p.pack_i32(self.db_type.tag());
        p.pack_i32(self.datum.wire_type().tag());
        match &self.datum {
            Datum::Null => {}
            Datum::Short(v) => p.pack_i16(*v),
            Datum::Int(v) => p.pack_i32(*v),
            Datum::Bigint(v) => p.pack_i64(*v),
            Datum::Float(v) => p.pack_f32(*v),
            Datum::Double(v) => p.pack_f64(*v),
            Datum::Numeric(v) => p.pack_string(v.as_str())?,
            Datum::String(v) => p.pack_string(v)?,
            Datum::Date(v) => pack_date(p, *v),
            Datum::Time(v) => pack_time(p, *v),
            Datum::Timestamp(v) => {
                pack_date(p, v.date());
                pack_time(p, v.time());
            }
            Datum::Datetime(v) => {
                pack_date(p, v.date());
                pack_time(p, v.time());
                p.pack_i32((v.nanosecond() / 1_000_000) as i32);
            }
            Datum::Oid(v) => {
                p.pack_i32(v.page);
                p.pack_i16(v.slot);
                p.pack_i16(v.volume);
            }
            Datum::ResultSet(v) => p.pack_i64(v.0),
            Datum::Collection(items) => {
                p.pack_count(items.len())?;
                for item in items {
                    item.pack(p)?;
                }
            }
        }
        Ok(())
    }

    pub fn unpack(u: &mut Unpacker<'_>) -> Result<Value, WireError> {
        Self::unpack_nested(u, 0)
    }

    fn unpack_nested(u: &mut Unpacker<'_>, depth: usize) -> Result<Value, WireError> {
        let mode = ParamMode::from_code(u.unpack_i32()?)?;
        let db_type = DbType::from_tag(u.unpack_i32()?)?;
        let wire_type = DbType::from_tag(u.unpack_i32()?)?;
        let datum = match wire_type {
            DbType::Null => Datum::Null,
            DbType::Short => Datum::Short(u.unpack_i16()?),
            DbType::Int => Datum::Int(u.unpack_i32()?),
            DbType::Bigint => Datum::Bigint(u.unpack_i64()?),
            DbType::Float => Datum::Float(u.unpack_f32()?),
            DbType::Double | DbType::Monetary => Datum::Double(u.unpack_f64()?),
            DbType::Numeric => {
                let text = u.unpack_string()?;
                let d = text
                    .parse::<Decimal>()
                    .map_err(|_| WireError::Malformed(format!("bad numeric text {text:?}")))?;
                Datum::Numeric(d)
            }
            DbType::String | DbType::Char => Datum::String(u.unpack_string()?),
            DbType::Date => Datum::Date(unpack_date(u)?),
            DbType::Time => Datum::Time(unpack_time(u)?),
            DbType::Timestamp => Datum::Timestamp(unpack_date(u)?.and_time(unpack_time(u)?)),
            DbType::Datetime => {
                let date = unpack_date(u)?;
                let time = unpack_time(u)?;
                let ms = u.unpack_i32()?;
                let time = u32::try_from(ms)
                    .ok()
                    .filter(|ms| *ms < 1000)
                    .and_then(|ms| time.with_nanosecond(ms * 1_000_000))
                    .ok_or_else(|| WireError::Malformed(format!("bad millisecond {ms}")))?;
                Datum::Datetime(date.and_time(time))
            }
            DbType::Object => {
                let page = u.unpack_i32()?;
                let slot = u.unpack_i16()?;
                let volume = u.unpack_i16()?;
                Datum::Oid(Oid { page, slot, volume })
            }
            DbType::ResultSet => Datum::ResultSet(CursorHandle(u.unpack_i64()?)),
            DbType::Set | DbType::Multiset | DbType::Sequence => {
                if depth >= MAX_COLLECTION_DEPTH {
                    return Err(WireError::Malformed(format!(
                        "collection nesting too deep (max {MAX_COLLECTION_DEPTH})"
                    )));
                }
                let n = u.unpack_count()?;
                let mut items = Vec::with_capacity(n.min(u.remaining()));
                for _ in 0..n {
                    items.push(Value::unpack_nested(u, depth + 1)?);
                }
                Datum::Collection(items)
            }
        };
        Ok(Value {
            datum,
            mode,
            db_type,
        })
    }
}

fn pack_date(p: &mut Packer, d: NaiveDate) {
    p.pack_i32(d.year());
    p.pack_i32(d.month() as i32);
    p.pack_i32(d.day() as i32);
}

fn pack_time(p: &mut Packer, t: NaiveTime) {
    p.pack_i32(t.hour() as i32);
    p.pack_i32(t.minute() as i32);
    p.pack_i32(t.second() as i32);
}

fn unpack_date(u: &mut Unpacker<'_>) -> Result<NaiveDate, WireError> {
    let (y, m, d) = (u.unpack_i32()?, u.unpack_i32()?, u.unpack_i32()?);
    u32::try_from(m)
        .ok()
        .zip(u32::try_from(d).ok())
        .and_then(|(m, d)| NaiveDate::from_ymd_opt(y, m, d))
        .ok_or_else(|| WireError::Malformed(format!("bad date {y}-{m}-{d}")))
}

fn unpack_time(u: &mut Unpacker<'_>) -> Result<NaiveTime, WireError> {
    let (h, m, s) = (u.unpack_i32()?, u.unpack_i32()?, u.unpack_i32()?);
    let time = match (u32::try_from(h), u32::try_from(m), u32::try_from(s)) {
        (Ok(h), Ok(m), Ok(s)) => NaiveTime::from_hms_opt(h, m, s),
        _ => None,
    };
    time.ok_or_else(|| WireError::Malformed(format!("bad time {h}:{m}:{s}")))
}

/// Result-column metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub table: String,
    pub db_type: DbType,
    pub precision: i32,
    pub scale: i16,
    pub nullable: bool,
    pub display_size: i32,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, db_type: DbType) -> Self {
        Self {
            name: name.into(),
            table: String::new(),
            db_type,
            precision: 0,
            scale: 0,
            nullable: true,
            display_size: 0,
        }
    }

    pub fn pack(&self, p: &mut Packer) -> Result<(), WireError> {
        p.pack_i32(self.db_type.tag());
        p.pack_i32(self.precision);
        p.pack_i16(self.scale);
        p.pack_bool(self.nullable);
        p.pack_i32(self.display_size);
        p.pack_string(&self.name)?;
        p.pack_string(&self.table)
    }

    pub fn unpack(u: &mut Unpacker<'_>) -> Result<Self, WireError> {
        Ok(Self {
            db_type: DbType::from_tag(u.unpack_i32()?)?,
            precision: u.unpack_i32()?,
            scale: u.unpack_i16()?,
            nullable: u.unpack_bool()?,
            display_size: u.unpack_i32()?,
            name: u.unpack_string()?,
            table: u.unpack_string()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_normalizes_text() {
        let d: Decimal = "+007.250".parse().unwrap();
        assert_eq!(d.as_str(), "7.250");
        assert_eq!(d.scale(), 3);
        assert_eq!(d.precision(), 4);
        assert_eq!("-0.00".parse::<Decimal>().unwrap().as_str(), "0.00");
        assert!("1.2.3".parse::<Decimal>().is_err());
        assert!("".parse::<Decimal>().is_err());
        assert_eq!("-12.9".parse::<Decimal>().unwrap().to_i64().unwrap(), -12);
    }

    #[test]
    fn narrowing_out_of_range_is_a_mismatch() {
        let v = Value::of(Datum::Int(70_000));
        assert_eq!(v.to_i16(), Err(TypeMismatch::new("int", "short")));
        assert_eq!(v.to_i64().unwrap(), 70_000);
        let big = Value::of(Datum::Double(1e300));
        assert!(big.to_f32().is_err());
        assert!(big.to_i64().is_err());
    }

    #[test]
    fn null_is_zero_for_primitives_and_none_for_boxed() {
        let v = Value::null(DbType::Int);
        assert_eq!(v.to_i32().unwrap(), 0);
        assert_eq!(v.to_i32_opt().unwrap(), None);
        assert_eq!(v.to_text().unwrap(), None);
        assert!(!v.to_bool().unwrap());
    }

    #[test]
    fn text_parses_to_temporals() {
        let v = Value::of(Datum::String("2024-02-29 13:45:07.250".to_string()));
        let dt = v.to_datetime().unwrap().unwrap();
        assert_eq!(dt.nanosecond(), 250_000_000);
        let ts = v.to_timestamp().unwrap().unwrap();
        assert_eq!(ts.nanosecond(), 0);
        assert_eq!(v.to_date().unwrap().unwrap(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(v.to_time().unwrap().unwrap().hour(), 13);
        assert!(Value::of(Datum::String("noon".into())).to_date().is_err());
    }

    #[test]
    fn scalar_elements_wrap_as_single_slot() {
        let v = Value::null(DbType::Int).with_mode(ParamMode::Out);
        let elems = v.elements();
        assert_eq!(elems.len(), 1);
        assert!(elems[0].is_null());

        let coll = Value::of(Datum::Collection(vec![
            Value::of(Datum::Int(1)),
            Value::of(Datum::Int(2)),
        ]));
        assert_eq!(coll.elements().len(), 2);
    }

    #[test]
    fn column_info_round_trips() {
        let mut c = ColumnInfo::new("amount", DbType::Numeric);
        c.precision = 10;
        c.scale = 2;
        c.table = "ledger".to_string();
        let mut p = Packer::new();
        c.pack(&mut p).unwrap();
        let mut u = Unpacker::new(p.as_slice());
        assert_eq!(ColumnInfo::unpack(&mut u).unwrap(), c);
    }

    fn nested_sets(levels: usize) -> Value {
        let mut v = Value::of(Datum::Int(7));
        for _ in 0..levels {
            v = Value::new(Datum::Collection(vec![v]), DbType::Set);
        }
        v
    }

    #[test]
    fn collection_nesting_is_capped() {
        let mut p = Packer::new();
        nested_sets(MAX_COLLECTION_DEPTH).pack(&mut p).unwrap();
        let mut u = Unpacker::new(p.as_slice());
        assert!(Value::unpack(&mut u).is_ok());

        let mut p = Packer::new();
        nested_sets(MAX_COLLECTION_DEPTH + 1).pack(&mut p).unwrap();
        let mut u = Unpacker::new(p.as_slice());
        let err = Value::unpack(&mut u).unwrap_err();
        assert!(matches!(err, WireError::Malformed(_)), "{err:?}");
    }

    #[test]
    fn deeply_nested_headers_fail_without_recursing() {
        // mode, db_type=SET, wire tag, count=1, repeated far past the cap
        let mut p = Packer::new();
        for _ in 0..100_000 {
            p.pack_i32(ParamMode::In.code());
            p.pack_i32(DbType::Set.tag());
            p.pack_i32(DbType::Set.tag());
            p.pack_i32(1);
        }
        let mut u = Unpacker::new(p.as_slice());
        assert!(matches!(
            Value::unpack(&mut u),
            Err(WireError::Malformed(_))
        ));
    }

    #[test]
    fn time_accessor_drops_sub_second_part() {
        let t = NaiveTime::from_hms_milli_opt(12, 30, 5, 750).unwrap();
        let v = Value::of(Datum::Time(t));
        assert_eq!(
            v.to_time().unwrap().unwrap(),
            NaiveTime::from_hms_opt(12, 30, 5).unwrap()
        );
        let dt = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_time(t);
        let v = Value::of(Datum::Datetime(dt));
        assert_eq!(v.to_time().unwrap().unwrap().nanosecond(), 0);
    }
}
