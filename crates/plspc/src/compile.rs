use serde::Serialize;
use thiserror::Error;

use plsp_contracts::PLSP_UNIT_SCHEMA_VERSION;

use crate::ast::{DeclRoutine, RoutineKind, Unit};
use crate::language;
use crate::template::CodeRangeMarker;
use crate::types::TypeTable;
use crate::writer;

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Tag distinguishing successive compilations of the same routine.
    pub revision: String,
    pub max_literal_chunk: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            revision: "0".to_string(),
            max_literal_chunk: language::limits::max_literal_chunk(),
        }
    }
}

impl CompileOptions {
    pub fn with_revision(revision: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileErrorKind {
    Parse,
    Schema,
    Typing,
    Unsupported,
    Budget,
    Internal,
}

impl CompileErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            CompileErrorKind::Parse => "PLSPC-PARSE",
            CompileErrorKind::Schema => "PLSPC-SCHEMA",
            CompileErrorKind::Typing => "PLSPC-TYPING",
            CompileErrorKind::Unsupported => "PLSPC-UNSUPPORTED",
            CompileErrorKind::Budget => "PLSPC-BUDGET",
            CompileErrorKind::Internal => "PLSPC-INTERNAL",
        }
    }
}

#[derive(Debug, Clone, Error, Serialize)]
#[error("{message}")]
pub struct CompilerError {
    pub kind: CompileErrorKind,
    /// Source line of the offending node, 0 when unknown.
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl CompilerError {
    pub fn new(kind: CompileErrorKind, message: String) -> Self {
        Self {
            kind,
            line: 0,
            column: 0,
            message,
        }
    }

    /// Attaches a source position unless a more precise one is already set.
    pub fn at(mut self, line: u32, column: u32) -> Self {
        if self.line == 0 {
            self.line = line;
            self.column = column;
        }
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompileOutput {
    pub source: String,
    /// Top-level declaration, e.g. `FUNCTION F(X IN INT) RETURN INT`.
    pub decl_text: String,
    pub artifact_name: String,
    /// Generated line ranges (1-based, end exclusive) mapped to source positions.
    pub code_range_markers: Vec<CodeRangeMarker>,
    #[serde(skip)]
    pub unit: Unit,
}

#[derive(Debug, Clone)]
pub enum CompileResult {
    Ok(CompileOutput),
    Err(CompilerError),
}

impl CompileResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, CompileResult::Ok(_))
    }

    pub fn into_result(self) -> Result<CompileOutput, CompilerError> {
        match self {
            CompileResult::Ok(out) => Ok(out),
            CompileResult::Err(err) => Err(err),
        }
    }
}

impl From<Result<CompileOutput, CompilerError>> for CompileResult {
    fn from(r: Result<CompileOutput, CompilerError>) -> Self {
        match r {
            Ok(out) => CompileResult::Ok(out),
            Err(err) => CompileResult::Err(err),
        }
    }
}

pub fn compile_unit(input: &[u8], options: &CompileOptions) -> CompileResult {
    compile_unit_inner(input, options).into()
}

fn compile_unit_inner(input: &[u8], options: &CompileOptions) -> Result<CompileOutput, CompilerError> {
    let max = language::limits::max_unit_bytes();
    if input.len() > max {
        return Err(CompilerError::new(
            CompileErrorKind::Budget,
            format!("unit too large: max_unit_bytes={max} got {}", input.len()),
        ));
    }

    let unit: Unit = serde_json::from_slice(input).map_err(|e| {
        CompilerError::new(CompileErrorKind::Parse, format!("unit JSON: {e}"))
    })?;
    if unit.schema_version != PLSP_UNIT_SCHEMA_VERSION {
        return Err(CompilerError::new(
            CompileErrorKind::Schema,
            format!(
                "unit schema_version must be {PLSP_UNIT_SCHEMA_VERSION:?}, got {:?}",
                unit.schema_version
            ),
        ));
    }
    if options.max_literal_chunk == 0 {
        return Err(CompilerError::new(
            CompileErrorKind::Schema,
            "max_literal_chunk must be positive".to_string(),
        ));
    }

    let artifact_name = artifact_name(unit.routine.kind, &unit.routine.name, &options.revision)?;
    let decl_text = decl_text(&unit.routine);

    let mut types = TypeTable::new();
    let fragment = writer::write_unit(
        &unit,
        &artifact_name,
        &decl_text,
        &mut types,
        options.max_literal_chunk,
    )?;

    let code_range_markers = fragment
        .markers
        .iter()
        .map(|m| CodeRangeMarker {
            start_line: m.start_line + 1,
            end_line: m.end_line + 1,
            ..*m
        })
        .collect();

    Ok(CompileOutput {
        source: fragment.into_source(),
        decl_text,
        artifact_name,
        code_range_markers,
        unit,
    })
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// `{Proc|Func}_{NAME}_{revision}`; both parts are reduced to `[A-Za-z0-9_]`.
pub fn artifact_name(kind: RoutineKind, name: &str, revision: &str) -> Result<String, CompilerError> {
    let name = sanitize(&name.trim().to_ascii_uppercase());
    let revision = sanitize(revision.trim());
    if name.is_empty() || revision.is_empty() {
        return Err(CompilerError::new(
            CompileErrorKind::Schema,
            "routine name and revision tag must not be empty".to_string(),
        ));
    }
    let prefix = match kind {
        RoutineKind::Procedure => "Proc",
        RoutineKind::Function => "Func",
    };
    Ok(format!("{prefix}_{name}_{revision}"))
}

pub fn decl_text(r: &DeclRoutine) -> String {
    let kind = match r.kind {
        RoutineKind::Procedure => "PROCEDURE",
        RoutineKind::Function => "FUNCTION",
    };
    let params = r
        .params
        .iter()
        .map(|p| {
            format!(
                "{} {} {}",
                p.name.to_ascii_uppercase(),
                p.mode.as_str(),
                p.type_name.to_ascii_uppercase()
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    let mut out = format!("{kind} {}({params})", r.name.to_ascii_uppercase());
    if let Some(ret) = &r.ret_type {
        out.push_str(" RETURN ");
        out.push_str(&ret.to_ascii_uppercase());
    }
    out
}
