//! Type-resolved routine AST, as produced by the semantic pass.
//!
//! Every expression carries its resolved type name (`type`) and the coercion the
//! semantic pass chose for the context it appears in; the compiler trusts
//! both and does no type inference of its own.

use serde::{Deserialize, Serialize};

use crate::coercion::Coercion;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub schema_version: String,
    #[serde(default)]
    pub autonomous_transaction: bool,
    #[serde(default)]
    pub connection_required: bool,
    pub routine: DeclRoutine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutineKind {
    Procedure,
    Function,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclRoutine {
    pub kind: RoutineKind,
    pub name: String,
    #[serde(default)]
    pub params: Vec<DeclParam>,
    #[serde(default)]
    pub ret_type: Option<String>,
    #[serde(default)]
    pub decls: Vec<Decl>,
    pub body: Body,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamMode {
    #[default]
    In,
    Out,
    #[serde(rename = "inout")]
    InOut,
}

impl ParamMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamMode::In => "IN",
            ParamMode::Out => "OUT",
            ParamMode::InOut => "IN OUT",
        }
    }

    pub fn is_out(self) -> bool {
        !matches!(self, ParamMode::In)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclParam {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub mode: ParamMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "decl", rename_all = "snake_case")]
pub enum Decl {
    Var {
        name: String,
        #[serde(rename = "type")]
        type_name: String,
        #[serde(default)]
        not_null: bool,
        #[serde(default)]
        init: Option<Expr>,
        #[serde(default)]
        line: u32,
    },
    Const {
        name: String,
        #[serde(rename = "type")]
        type_name: String,
        value: Expr,
        #[serde(default)]
        line: u32,
    },
    /// Explicit cursor; parameters bind to the `?` markers of `sql` in order.
    Cursor {
        name: String,
        #[serde(default)]
        params: Vec<DeclParam>,
        sql: String,
        #[serde(default)]
        columns: Vec<RecordField>,
    },
    Exception {
        name: String,
    },
    Routine(DeclRoutine),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Body {
    #[serde(default)]
    pub label: Option<String>,
    pub stmts: Vec<Stmt>,
    #[serde(default)]
    pub handlers: Vec<ExHandler>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExHandler {
    /// Exception names; `OTHERS` catches everything.
    pub names: Vec<String>,
    pub stmts: Vec<Stmt>,
    #[serde(default)]
    pub line: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntoTarget {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub coercion: Coercion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SqlSource {
    /// Text known at compile time, host variables already replaced by `?`.
    Static {
        text: String,
        #[serde(default)]
        host_vars: Vec<Expr>,
    },
    /// Text computed at run time (EXECUTE IMMEDIATE / OPEN FOR).
    Dynamic {
        text: Box<Expr>,
        #[serde(default)]
        using: Vec<Expr>,
    },
}

impl SqlSource {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, SqlSource::Dynamic { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CondBranch {
    pub cond: Expr,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseWhen {
    pub value: Expr,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stmt {
    Null,
    Assign {
        target: String,
        value: Expr,
        #[serde(default)]
        line: u32,
    },
    If {
        branches: Vec<CondBranch>,
        #[serde(default)]
        else_stmts: Option<Vec<Stmt>>,
        #[serde(default)]
        line: u32,
    },
    /// Simple CASE when `selector` is present, searched CASE otherwise.
    Case {
        #[serde(default)]
        selector: Option<Expr>,
        whens: Vec<CaseWhen>,
        #[serde(default)]
        else_stmts: Option<Vec<Stmt>>,
        #[serde(default)]
        line: u32,
    },
    Loop {
        #[serde(default)]
        label: Option<String>,
        stmts: Vec<Stmt>,
    },
    While {
        #[serde(default)]
        label: Option<String>,
        cond: Expr,
        stmts: Vec<Stmt>,
    },
    ForIter {
        #[serde(default)]
        label: Option<String>,
        iter: String,
        #[serde(default)]
        reverse: bool,
        low: Expr,
        high: Expr,
        #[serde(default)]
        step: Option<Expr>,
        stmts: Vec<Stmt>,
        #[serde(default)]
        line: u32,
    },
    ForCursor {
        #[serde(default)]
        label: Option<String>,
        record: String,
        cursor: String,
        #[serde(default)]
        args: Vec<Expr>,
        stmts: Vec<Stmt>,
        #[serde(default)]
        line: u32,
    },
    ForSql {
        #[serde(default)]
        label: Option<String>,
        record: String,
        sql: SqlSource,
        /// Select-list fields of a static query; empty for dynamic SQL.
        #[serde(default)]
        columns: Vec<RecordField>,
        stmts: Vec<Stmt>,
        #[serde(default)]
        line: u32,
    },
    Exit {
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        when: Option<Expr>,
    },
    Continue {
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        when: Option<Expr>,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
        #[serde(default)]
        line: u32,
    },
    /// `RAISE name`, or a bare `RAISE` re-raising inside a handler.
    Raise {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        line: u32,
    },
    Block {
        #[serde(default)]
        decls: Vec<Decl>,
        body: Body,
    },
    Sql {
        sql: SqlSource,
        #[serde(default)]
        into: Vec<IntoTarget>,
        #[serde(default)]
        line: u32,
    },
    Call {
        name: String,
        #[serde(default)]
        args: Vec<Expr>,
        #[serde(default)]
        line: u32,
    },
    Open {
        cursor: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    Fetch {
        cursor: String,
        into: Vec<IntoTarget>,
    },
    Close {
        cursor: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Like,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorAttr {
    IsOpen,
    Found,
    NotFound,
    RowCount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseExprWhen {
    pub value: Expr,
    pub result: Expr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    #[serde(flatten)]
    pub node: ExprNode,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub coercion: Coercion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExprNode {
    Null,
    Bool {
        value: bool,
    },
    Int {
        value: i64,
    },
    Float {
        value: f64,
    },
    /// Numeric and temporal literals keep their source text.
    Numeric {
        value: String,
    },
    Str {
        value: String,
    },
    Date {
        value: String,
    },
    Time {
        value: String,
    },
    Timestamp {
        value: String,
    },
    Datetime {
        value: String,
    },
    Id {
        name: String,
    },
    /// `record.field`; `index` is the select-list position when known.
    Field {
        record: String,
        field: String,
        #[serde(default)]
        index: Option<usize>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    IsNull {
        operand: Box<Expr>,
        #[serde(default)]
        negated: bool,
    },
    Between {
        operand: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    In {
        operand: Box<Expr>,
        list: Vec<Expr>,
    },
    Case {
        #[serde(default)]
        selector: Option<Box<Expr>>,
        whens: Vec<CaseExprWhen>,
        #[serde(default)]
        else_expr: Option<Box<Expr>>,
    },
    Builtin {
        name: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    LocalCall {
        name: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    SqlRowCount,
    CursorAttr {
        cursor: String,
        attr: CursorAttr,
    },
}
