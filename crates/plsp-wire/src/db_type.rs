use crate::error::WireError;

/// DB type tags as the engine numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbType {
    Null,
    Int,
    Float,
    Double,
    String,
    Object,
    Set,
    Multiset,
    Sequence,
    Time,
    Timestamp,
    Date,
    Monetary,
    Short,
    Numeric,
    Char,
    ResultSet,
    Bigint,
    Datetime,
}

impl DbType {
    pub const ALL: [DbType; 19] = [
        DbType::Null,
        DbType::Int,
        DbType::Float,
        DbType::Double,
        DbType::String,
        DbType::Object,
        DbType::Set,
        DbType::Multiset,
        DbType::Sequence,
        DbType::Time,
        DbType::Timestamp,
        DbType::Date,
        DbType::Monetary,
        DbType::Short,
        DbType::Numeric,
        DbType::Char,
        DbType::ResultSet,
        DbType::Bigint,
        DbType::Datetime,
    ];

    pub fn tag(self) -> i32 {
        match self {
            DbType::Null => 0,
            DbType::Int => 1,
            DbType::Float => 2,
            DbType::Double => 3,
            DbType::String => 4,
            DbType::Object => 5,
            DbType::Set => 6,
            DbType::Multiset => 7,
            DbType::Sequence => 8,
            DbType::Time => 10,
            DbType::Timestamp => 11,
            DbType::Date => 12,
            DbType::Monetary => 13,
            DbType::Short => 18,
            DbType::Numeric => 22,
            DbType::Char => 25,
            DbType::ResultSet => 28,
            DbType::Bigint => 31,
            DbType::Datetime => 32,
        }
    }

    pub fn from_tag(tag: i32) -> Result<Self, WireError> {
        DbType::ALL
            .into_iter()
            .find(|t| t.tag() == tag)
            .ok_or(WireError::UnknownDbType(tag))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DbType::Null => "NULL",
            DbType::Int => "INTEGER",
            DbType::Float => "FLOAT",
            DbType::Double => "DOUBLE",
            DbType::String => "STRING",
            DbType::Object => "OBJECT",
            DbType::Set => "SET",
            DbType::Multiset => "MULTISET",
            DbType::Sequence => "SEQUENCE",
            DbType::Time => "TIME",
            DbType::Timestamp => "TIMESTAMP",
            DbType::Date => "DATE",
            DbType::Monetary => "MONETARY",
            DbType::Short => "SHORT",
            DbType::Numeric => "NUMERIC",
            DbType::Char => "CHAR",
            DbType::ResultSet => "RESULTSET",
            DbType::Bigint => "BIGINT",
            DbType::Datetime => "DATETIME",
        }
    }

    pub fn is_collection(self) -> bool {
        matches!(self, DbType::Set | DbType::Multiset | DbType::Sequence)
    }
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
