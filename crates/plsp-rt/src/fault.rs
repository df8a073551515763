use plsp_wire::TypeMismatch;
use thiserror::Error;

/// Faults a compiled routine can raise. Codes are stable and reported to the
/// engine alongside the message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlFault {
    #[error("case not found")]
    CaseNotFound,

    #[error("cursor already open")]
    CursorAlreadyOpen,

    #[error("invalid cursor")]
    InvalidCursor,

    #[error("no data found")]
    NoDataFound,

    #[error("internal server error: {0}")]
    ProgramError(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("SQL error: {0}")]
    SqlError(String),

    #[error("too many rows")]
    TooManyRows,

    #[error("value error: {0}")]
    ValueError(String),

    #[error("division by zero")]
    ZeroDivide,

    /// Exception declared by the routine itself.
    #[error("user defined exception {name}")]
    User { name: String },

    #[error("{message}")]
    App { code: i32, message: String },
}

pub type PlResult<T> = Result<T, PlFault>;

impl PlFault {
    pub fn code(&self) -> i32 {
        match self {
            PlFault::CaseNotFound => 0,
            PlFault::CursorAlreadyOpen => 1,
            PlFault::InvalidCursor => 2,
            PlFault::NoDataFound => 3,
            PlFault::ProgramError(_) => 4,
            PlFault::StorageError(_) => 5,
            PlFault::SqlError(_) => 6,
            PlFault::TooManyRows => 7,
            PlFault::ValueError(_) => 8,
            PlFault::ZeroDivide => 9,
            PlFault::User { .. } => 99,
            PlFault::App { code, .. } => *code,
        }
    }

    /// Exception name as written in a handler's WHEN clause.
    pub fn name(&self) -> &str {
        match self {
            PlFault::CaseNotFound => "CASE_NOT_FOUND",
            PlFault::CursorAlreadyOpen => "CURSOR_ALREADY_OPEN",
            PlFault::InvalidCursor => "INVALID_CURSOR",
            PlFault::NoDataFound => "NO_DATA_FOUND",
            PlFault::ProgramError(_) => "PROGRAM_ERROR",
            PlFault::StorageError(_) => "STORAGE_ERROR",
            PlFault::SqlError(_) => "SQL_ERROR",
            PlFault::TooManyRows => "TOO_MANY_ROWS",
            PlFault::ValueError(_) => "VALUE_ERROR",
            PlFault::ZeroDivide => "ZERO_DIVIDE",
            PlFault::User { name } => name,
            PlFault::App { .. } => "APP_ERROR",
        }
    }

    /// Builds the fault a `RAISE name` statement throws.
    pub fn named(name: &str) -> Self {
        match name {
            "CASE_NOT_FOUND" => PlFault::CaseNotFound,
            "CURSOR_ALREADY_OPEN" => PlFault::CursorAlreadyOpen,
            "INVALID_CURSOR" => PlFault::InvalidCursor,
            "NO_DATA_FOUND" => PlFault::NoDataFound,
            "PROGRAM_ERROR" => PlFault::ProgramError(String::new()),
            "STORAGE_ERROR" => PlFault::StorageError(String::new()),
            "SQL_ERROR" => PlFault::SqlError(String::new()),
            "TOO_MANY_ROWS" => PlFault::TooManyRows,
            "VALUE_ERROR" => PlFault::ValueError(String::new()),
            "ZERO_DIVIDE" => PlFault::ZeroDivide,
            other => PlFault::User {
                name: other.to_string(),
            },
        }
    }

    /// True when a handler listing `names` catches this fault. `OTHERS`
    /// catches everything.
    pub fn matches(&self, names: &[&str]) -> bool {
        names
            .iter()
            .any(|n| *n == "OTHERS" || n.eq_ignore_ascii_case(self.name()))
    }
}

impl From<TypeMismatch> for PlFault {
    fn from(e: TypeMismatch) -> Self {
        PlFault::ValueError(e.to_string())
    }
}

/// Outcome of a statement sequence run inside an exception-handled block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Next,
    Return,
}

/// Raised when a CASE has no matching WHEN and no ELSE.
pub fn case_not_found<T>() -> PlResult<T> {
    Err(PlFault::CaseNotFound)
}

pub fn check_not_null<T>(v: Option<T>, what: &str) -> PlResult<T> {
    v.ok_or_else(|| PlFault::ValueError(format!("{what} must not be null")))
}

pub fn check_for_loop_step(step: Option<i32>) -> PlResult<usize> {
    match step {
        Some(s) if s > 0 => Ok(s as usize),
        _ => Err(PlFault::ValueError(
            "FOR loop iteration steps must be positive integers".to_string(),
        )),
    }
}

/// Joins the pieces of a string literal that was split at compile time.
pub fn concat_chunks(chunks: &[&str]) -> String {
    chunks.concat()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handlers_match_by_name_or_others() {
        let f = PlFault::NoDataFound;
        assert!(f.matches(&["TOO_MANY_ROWS", "NO_DATA_FOUND"]));
        assert!(f.matches(&["OTHERS"]));
        assert!(!f.matches(&["ZERO_DIVIDE"]));
        let user = PlFault::named("E_LIMIT");
        assert_eq!(user.code(), 99);
        assert!(user.matches(&["e_limit"]));
    }

    #[test]
    fn loop_step_must_be_positive() {
        assert_eq!(check_for_loop_step(Some(3)).unwrap(), 3);
        assert!(check_for_loop_step(Some(0)).is_err());
        assert!(check_for_loop_step(None).is_err());
    }

    #[test]
    fn case_without_else_faults_at_evaluation() {
        let r: PlResult<i32> = case_not_found();
        assert_eq!(r.unwrap_err().code(), 0);
    }
}
