use std::collections::HashMap;

use plsp_wire::ScalarKind;

use crate::compile::{CompileErrorKind, CompilerError};

pub const IDX_NULL: usize = 0;
pub const IDX_OBJECT: usize = 1;
pub const IDX_BOOLEAN: usize = 2;
pub const IDX_STRING: usize = 3;
pub const IDX_SHORT: usize = 4;
pub const IDX_INT: usize = 5;
pub const IDX_BIGINT: usize = 6;
pub const IDX_NUMERIC: usize = 7;
pub const IDX_FLOAT: usize = 8;
pub const IDX_DOUBLE: usize = 9;
pub const IDX_DATE: usize = 10;
pub const IDX_TIME: usize = 11;
pub const IDX_DATETIME: usize = 12;
pub const IDX_TIMESTAMP: usize = 13;
pub const IDX_CURSOR: usize = 14;

const SIMPLE: [(&str, &str, ScalarKind); 15] = [
    ("NULL", "Datum", ScalarKind::Object),
    ("OBJECT", "Datum", ScalarKind::Object),
    ("BOOLEAN", "bool", ScalarKind::Bool),
    ("STRING", "String", ScalarKind::String),
    ("SHORT", "i16", ScalarKind::I16),
    ("INT", "i32", ScalarKind::I32),
    ("BIGINT", "i64", ScalarKind::I64),
    ("NUMERIC", "Decimal", ScalarKind::Decimal),
    ("FLOAT", "f32", ScalarKind::F32),
    ("DOUBLE", "f64", ScalarKind::F64),
    ("DATE", "NaiveDate", ScalarKind::Date),
    ("TIME", "NaiveTime", ScalarKind::Time),
    ("DATETIME", "NaiveDateTime", ScalarKind::Datetime),
    ("TIMESTAMP", "NaiveDateTime", ScalarKind::Timestamp),
    ("CURSOR", "CursorHandle", ScalarKind::Cursor),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeParam {
    None,
    Length { is_char: bool, length: u32 },
    Precision { precision: u32, scale: u32 },
}

#[derive(Debug, Clone)]
pub struct TypeSpec {
    /// Canonical PL name, e.g. `VARCHAR(20)`.
    pub name: String,
    /// Rust type held inside the variable's `Option`.
    pub rust: &'static str,
    pub host: ScalarKind,
    pub param: TypeParam,
    /// Index of the simple type this one refines.
    pub base: usize,
}

impl TypeSpec {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self.base,
            IDX_SHORT | IDX_INT | IDX_BIGINT | IDX_NUMERIC | IDX_FLOAT | IDX_DOUBLE
        )
    }

    pub fn is_string(&self) -> bool {
        self.base == IDX_STRING
    }
}

/// Every type the compiler knows, the simple ones first at fixed indices and
/// parameterized ones appended on first use. Built once per compilation and
/// passed by reference.
#[derive(Debug)]
pub struct TypeTable {
    specs: Vec<TypeSpec>,
    cache: HashMap<(usize, TypeParam), TypeId>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    pub fn new() -> Self {
        let specs = SIMPLE
            .iter()
            .enumerate()
            .map(|(i, (name, rust, host))| TypeSpec {
                name: name.to_string(),
                rust,
                host: *host,
                param: TypeParam::None,
                base: i,
            })
            .collect();
        Self {
            specs,
            cache: HashMap::new(),
        }
    }

    pub fn simple(&self, idx: usize) -> TypeId {
        debug_assert!(idx < SIMPLE.len());
        TypeId(idx as u32)
    }

    pub fn get(&self, id: TypeId) -> &TypeSpec {
        &self.specs[id.index()]
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    fn parameterized(&mut self, base: usize, param: TypeParam) -> TypeId {
        if let Some(id) = self.cache.get(&(base, param)) {
            return *id;
        }
        let (name, rust, host) = SIMPLE[base];
        let name = match param {
            TypeParam::None => name.to_string(),
            TypeParam::Length { is_char, length } => {
                format!("{}({length})", if is_char { "CHAR" } else { "VARCHAR" })
            }
            TypeParam::Precision { precision, scale } => format!("NUMERIC({precision},{scale})"),
        };
        let id = TypeId(self.specs.len() as u32);
        self.specs.push(TypeSpec {
            name,
            rust,
            host,
            param,
            base,
        });
        self.cache.insert((base, param), id);
        id
    }

    /// Parses a PL type name such as `INTEGER`, `VARCHAR(20)` or
    /// `NUMERIC(10, 2)`.
    pub fn resolve(&mut self, text: &str) -> Result<TypeId, CompilerError> {
        let upper = text.trim().to_ascii_uppercase();
        let (head, args) = match upper.find('(') {
            Some(open) => {
                let Some(inner) = upper[open + 1..].strip_suffix(')') else {
                    return Err(bad_type(text));
                };
                let args = inner
                    .split(',')
                    .map(|a| a.trim().parse::<u32>().map_err(|_| bad_type(text)))
                    .collect::<Result<Vec<_>, _>>()?;
                (upper[..open].trim().to_string(), args)
            }
            None => (upper, Vec::new()),
        };
        let head = head.split_whitespace().collect::<Vec<_>>().join(" ");

        let simple = match head.as_str() {
            "NULL" => Some(IDX_NULL),
            "OBJECT" => Some(IDX_OBJECT),
            "BOOLEAN" => Some(IDX_BOOLEAN),
            "STRING" => Some(IDX_STRING),
            "SHORT" | "SMALLINT" => Some(IDX_SHORT),
            "INT" | "INTEGER" => Some(IDX_INT),
            "BIGINT" => Some(IDX_BIGINT),
            "FLOAT" | "REAL" => Some(IDX_FLOAT),
            "DOUBLE" | "DOUBLE PRECISION" => Some(IDX_DOUBLE),
            "DATE" => Some(IDX_DATE),
            "TIME" => Some(IDX_TIME),
            "DATETIME" => Some(IDX_DATETIME),
            "TIMESTAMP" => Some(IDX_TIMESTAMP),
            "CURSOR" | "SYS_REFCURSOR" => Some(IDX_CURSOR),
            _ => None,
        };
        if let Some(idx) = simple {
            if !args.is_empty() {
                return Err(bad_type(text));
            }
            return Ok(self.simple(idx));
        }

        match (head.as_str(), args.as_slice()) {
            ("NUMERIC" | "DECIMAL", []) => Ok(self.simple(IDX_NUMERIC)),
            ("NUMERIC" | "DECIMAL", [p]) => Ok(self.numeric(*p, 0, text)?),
            ("NUMERIC" | "DECIMAL", [p, s]) => Ok(self.numeric(*p, *s, text)?),
            ("VARCHAR" | "VARCHAR2" | "CHARACTER VARYING", []) => Ok(self.simple(IDX_STRING)),
            ("VARCHAR" | "VARCHAR2" | "CHARACTER VARYING", [n]) => self.string(false, *n, text),
            ("CHAR" | "CHARACTER", []) => self.string(true, 1, text),
            ("CHAR" | "CHARACTER", [n]) => self.string(true, *n, text),
            _ => Err(bad_type(text)),
        }
    }

    fn numeric(&mut self, precision: u32, scale: u32, text: &str) -> Result<TypeId, CompilerError> {
        if precision == 0 || precision > 38 || scale > precision {
            return Err(bad_type(text));
        }
        Ok(self.parameterized(IDX_NUMERIC, TypeParam::Precision { precision, scale }))
    }

    fn string(&mut self, is_char: bool, length: u32, text: &str) -> Result<TypeId, CompilerError> {
        if length == 0 {
            return Err(bad_type(text));
        }
        Ok(self.parameterized(IDX_STRING, TypeParam::Length { is_char, length }))
    }
}

fn bad_type(text: &str) -> CompilerError {
    CompilerError::new(CompileErrorKind::Typing, format!("unknown type name: {text:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_types_sit_at_fixed_indices() {
        let mut t = TypeTable::new();
        assert_eq!(t.resolve("integer").unwrap(), t.simple(IDX_INT));
        assert_eq!(t.resolve("Double Precision").unwrap(), t.simple(IDX_DOUBLE));
        assert_eq!(t.resolve("varchar").unwrap(), t.simple(IDX_STRING));
        assert_eq!(t.get(t.simple(IDX_CURSOR)).rust, "CursorHandle");
        assert_eq!(t.len(), 15);
    }

    #[test]
    fn parameterized_types_are_cached() {
        let mut t = TypeTable::new();
        let a = t.resolve("VARCHAR(20)").unwrap();
        let b = t.resolve("varchar( 20 )").unwrap();
        let c = t.resolve("CHAR(20)").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        let n = t.resolve("numeric(10, 2)").unwrap();
        assert_eq!(
            t.get(n).param,
            TypeParam::Precision {
                precision: 10,
                scale: 2
            }
        );
        assert_eq!(t.get(n).name, "NUMERIC(10,2)");
        assert_eq!(t.len(), 18);
    }

    #[test]
    fn bad_names_are_typing_errors() {
        let mut t = TypeTable::new();
        for bad in ["BLOB", "INT(3)", "NUMERIC(2,5)", "VARCHAR(0)", "CHAR(x)"] {
            let err = t.resolve(bad).unwrap_err();
            assert_eq!(err.kind, CompileErrorKind::Typing, "{bad}");
        }
    }
}
