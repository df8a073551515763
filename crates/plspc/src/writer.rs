use std::collections::{HashMap, HashSet};

use crate::ast::{
    BinaryOp, Body, CursorAttr, Decl, DeclRoutine, Expr, ExprNode, IntoTarget, ParamMode,
    RecordField, RoutineKind, SqlSource, Stmt, UnaryOp, Unit,
};
use crate::compile::{CompileErrorKind, CompilerError};
use crate::language::{limits, LANG_ID};
use crate::template::{CodeRangeMarker, CodeTemplate, CodeTemplateList, Fragment};
use crate::types::{TypeId, TypeTable, IDX_NULL};

type WResult<T> = Result<T, CompilerError>;

const UNIT: &str = "// Generated by plspc (%'LANG'%) from %'DECL'%. Do not edit.

use plsp_rt::prelude::*;

#[allow(non_camel_case_types)]
pub struct %'ARTIFACT'%;

impl Routine for %'ARTIFACT'% {
    #[allow(unused_variables, unused_mut)]
    fn call(&self, ctx: &mut dyn CallContext, args: &mut [HostValue]) -> PlResult<HostValue> {
        expect_args(args, %'ARGC'%)?;
        %'+CONN'%
        %'+READ_ARGS'%
        let result = run(%'CALL_ARGS'%);
        %'+FINISH_TX'%
        %'+TAKE_RESULT'%
        %'+WRITE_OUT'%
        %'RETURN'%
    }
}

%'+ROUTINES'%";

const FINISH_TX: &str = "match &result {
    Ok(_) => conn.commit()?,
    Err(_) => conn.rollback()?,
}";

const ROUTINE: &str = "#[allow(
    unused_mut,
    unused_variables,
    unused_assignments,
    unreachable_code,
    unused_labels,
    unused_braces,
    unused_parens,
    clippy::all
)]
fn %'FN'%(%'PARAMS'%) -> PlResult<%'RET'%> {
    let mut sql_rowcount: i64 = -1;
    %'+RET_SLOT'%
    %'+DECLS'%
    %'+BODY'%
    %'+FALLTHROUGH'%
}";

const HANDLED: &str = "let %'FLOW'% = (|| -> PlResult<Flow> {
    %'+STMTS'%
    Ok(Flow::Next)
})();
let %'FLOW'% = match %'FLOW'% {
    Ok(flow) => flow,
    %'+HANDLERS'%
    Err(e) => return Err(e),
};
if %'FLOW'% == Flow::Return {
    %'PROPAGATE'%
}";

const HANDLER: &str = "Err(e) if e.matches(&[%'NAMES'%]) => {
    %'+STMTS'%
    Flow::Next
}";

const BLOCK: &str = "{
    %'+BODY'%
}";

const IF: &str = "%'+BRANCHES'%
}";
const IF_HEAD: &str = "if truthy(%'COND'%) {
    %'+STMTS'%";
const IF_ELSIF: &str = "} else if truthy(%'COND'%) {
    %'+STMTS'%";
const IF_ELSE: &str = "} else {
    %'+STMTS'%";

const CASE_SELECTOR: &str = "{
    let %'SEL'% = %'SELECTOR'%;
    %'+CHAIN'%
}";

const LOOP: &str = "%'LABEL'%: loop {
    %'+STMTS'%
}";

const WHILE: &str = "%'LABEL'%: while truthy(%'COND'%) {
    %'+STMTS'%
}";

const FOR_ITER: &str = "%'LABEL'%: for %'I'% in %'RANGE'% {
    let mut %'VAR'%: Option<i32> = Some(%'I'%);
    %'+STMTS'%
}";

const FOR_ROWS: &str = "{
    let sql = %'SQL'%;
    let binds = vec![%'BINDS'%];
    let mut %'ROWS'% = {
        let mut stmt = conn.prepare(&sql)?;
        bind_all(&mut *stmt, binds)?;
        open_rows(&mut *stmt)?
    };
    %'LABEL'%: while let Some(%'REC'%) = next_record(%'ROWS'%.as_mut())? {
        %'+STMTS'%
    }
}";

const SQL_EXEC: &str = "{
    let sql = %'SQL'%;
    let binds = vec![%'BINDS'%];
    let mut stmt = conn.prepare(&sql)?;
    bind_all(&mut *stmt, binds)?;
    %'+BAN'%
    %'+EXEC'%
}";

const EXEC_INTO: &str = "execute_into(&mut *stmt, &mut sql_rowcount, |row| {
    %'+ASSIGNS'%
    Ok(())
})?;";

const FETCH: &str = "if let Some(rec) = %'CUR'%.fetch()? {
    %'+ASSIGNS'%
}";

const OPEN: &str = "{
    let args = vec![%'ARGS'%];
    %'CUR'%.open(conn, args)?;
}";

const CALL: &str = "{
    %'+LETS'%
    %'CALL'%;
}";

const JUMP_WHEN: &str = "if truthy(%'COND'%) {
    %'JUMP'%
}";

const RETURN_FROM_CLOSURE: &str = "ret_val = %'VALUE'%;
return Ok(Flow::Return);";

const PREDEFINED_EXCEPTIONS: [&str; 10] = [
    "CASE_NOT_FOUND",
    "CURSOR_ALREADY_OPEN",
    "INVALID_CURSOR",
    "NO_DATA_FOUND",
    "PROGRAM_ERROR",
    "STORAGE_ERROR",
    "SQL_ERROR",
    "TOO_MANY_ROWS",
    "VALUE_ERROR",
    "ZERO_DIVIDE",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarKind {
    Local,
    /// OUT / IN OUT parameter, held as `&mut Option<T>`.
    OutParam,
}

#[derive(Debug, Clone)]
struct VarInfo {
    rust: String,
    kind: VarKind,
    not_null: bool,
    constant: bool,
    level: usize,
}

impl VarInfo {
    fn read(&self) -> String {
        match self.kind {
            VarKind::Local => format!("{}.clone()", self.rust),
            VarKind::OutParam => format!("(*{}).clone()", self.rust),
        }
    }

    fn lvalue(&self) -> String {
        match self.kind {
            VarKind::Local => self.rust.clone(),
            VarKind::OutParam => format!("*{}", self.rust),
        }
    }

    fn borrow_mut(&self) -> String {
        match self.kind {
            VarKind::Local => format!("&mut {}", self.rust),
            VarKind::OutParam => format!("&mut *{}", self.rust),
        }
    }
}

#[derive(Debug, Clone)]
struct CursorInfo {
    rust: String,
    sql: String,
    columns: Vec<RecordField>,
    level: usize,
}

#[derive(Debug, Clone)]
struct RecordInfo {
    rust: String,
    /// Select-list names for static SQL; `None` means run-time lookup.
    columns: Option<Vec<String>>,
    level: usize,
}

#[derive(Debug, Clone)]
struct LocalRoutine {
    fn_name: String,
    modes: Vec<ParamMode>,
}

#[derive(Debug, Default)]
struct Scope {
    vars: HashMap<String, VarInfo>,
    cursors: HashMap<String, CursorInfo>,
    records: HashMap<String, RecordInfo>,
    routines: HashMap<String, LocalRoutine>,
    exceptions: HashSet<String>,
}

struct LoopFrame {
    name: Option<String>,
    rust: String,
    closure_depth: usize,
}

struct RoutineFrame {
    fn_name: String,
    returns: bool,
}

fn key(name: &str) -> String {
    name.trim().to_ascii_uppercase()
}

fn ident(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn rust_str(s: &str) -> String {
    format!("{s:?}")
}

fn split_chunks(s: &str, max: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = s;
    while rest.len() > max {
        let mut cut = max;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            cut = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
        }
        out.push(&rest[..cut]);
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

fn err(kind: CompileErrorKind, message: String) -> CompilerError {
    CompilerError::new(kind, message)
}

fn internal(message: String) -> CompilerError {
    err(CompileErrorKind::Internal, message)
}

fn typing(message: String) -> CompilerError {
    err(CompileErrorKind::Typing, message)
}

fn unsupported(message: String) -> CompilerError {
    err(CompileErrorKind::Unsupported, message)
}

fn stmt_line(s: &Stmt) -> u32 {
    match s {
        Stmt::Assign { line, .. }
        | Stmt::If { line, .. }
        | Stmt::Case { line, .. }
        | Stmt::ForIter { line, .. }
        | Stmt::ForCursor { line, .. }
        | Stmt::ForSql { line, .. }
        | Stmt::Return { line, .. }
        | Stmt::Raise { line, .. }
        | Stmt::Sql { line, .. }
        | Stmt::Call { line, .. } => *line,
        _ => 0,
    }
}

struct Writer<'t> {
    types: &'t mut TypeTable,
    connection: bool,
    literal_chunk: usize,
    scopes: Vec<Scope>,
    loops: Vec<LoopFrame>,
    routines: Vec<RoutineFrame>,
    closure_depth: usize,
    handler_depth: usize,
    nesting: usize,
    counter: usize,
    fn_names: HashSet<String>,
    local_fns: Vec<Fragment>,
}

/// Renders a whole unit: the `Routine` impl named after the artifact, the
/// routine body as `run`, and one module-level fn per local routine.
pub(crate) fn write_unit(
    unit: &Unit,
    artifact: &str,
    decl_text: &str,
    types: &mut TypeTable,
    literal_chunk: usize,
) -> WResult<Fragment> {
    let r = &unit.routine;
    let connection = unit.connection_required || unit.autonomous_transaction;
    let mut w = Writer {
        types,
        connection,
        literal_chunk,
        scopes: vec![Scope::default()],
        loops: Vec::new(),
        routines: Vec::new(),
        closure_depth: 0,
        handler_depth: 0,
        nesting: 0,
        counter: 0,
        fn_names: HashSet::from(["run".to_string()]),
        local_fns: Vec::new(),
    };
    w.scopes[0].routines.insert(
        key(&r.name),
        LocalRoutine {
            fn_name: "run".to_string(),
            modes: r.params.iter().map(|p| p.mode).collect(),
        },
    );

    let mut read_args = CodeTemplateList::new();
    let mut write_out = CodeTemplateList::new();
    let mut call_args = Vec::new();
    if connection {
        call_args.push("conn".to_string());
    }
    for (i, p) in r.params.iter().enumerate() {
        let ty = w.types.resolve(&p.type_name)?;
        let rust = w.types.get(ty).rust;
        let v = format!("v_{}", ident(&p.name));
        match p.mode {
            ParamMode::In => {
                read_args.push(format!("let {v} = arg_in::<{rust}>(&args[{i}])?;"));
                call_args.push(v);
            }
            ParamMode::Out => {
                read_args.push(format!("let mut {v}: Option<{rust}> = None;"));
                call_args.push(format!("&mut {v}"));
                write_out.push(format!("put_out(&mut args[{i}], {v});"));
            }
            ParamMode::InOut => {
                read_args.push(format!("let mut {v} = arg_inout::<{rust}>(&args[{i}])?;"));
                call_args.push(format!("&mut {v}"));
                write_out.push(format!("put_out(&mut args[{i}], {v});"));
            }
        }
    }

    let main = w.routine(r, "run")?;
    let mut routines = main;
    for f in std::mem::take(&mut w.local_fns) {
        routines.append(Fragment::text(""));
        routines.append(f);
    }

    let conn = if connection {
        format!("let conn = ctx.connection({})?;", unit.autonomous_transaction)
    } else {
        String::new()
    };
    let finish = if unit.autonomous_transaction {
        FINISH_TX
    } else {
        ""
    };
    let (take, ret) = match r.kind {
        RoutineKind::Function => ("let result = result?;", "Ok(ret_host(result))"),
        RoutineKind::Procedure => ("result?;", "Ok(HostValue::Null)"),
    };

    CodeTemplate::new(UNIT)
        .fill("LANG", LANG_ID)
        .fill("DECL", decl_text)
        .fill("ARTIFACT", artifact)
        .fill("ARGC", r.params.len().to_string())
        .fill("CONN", conn)
        .fill("READ_ARGS", read_args)
        .fill("CALL_ARGS", call_args.join(", "))
        .fill("FINISH_TX", finish)
        .fill("TAKE_RESULT", take)
        .fill("WRITE_OUT", write_out)
        .fill("RETURN", ret)
        .fill("ROUTINES", routines)
        .render()
}

impl<'t> Writer<'t> {
    fn fresh(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}{}", self.counter)
    }

    fn level(&self) -> usize {
        self.routines.len().saturating_sub(1)
    }

    fn scope_mut(&mut self) -> &mut Scope {
        if self.scopes.is_empty() {
            self.scopes.push(Scope::default());
        }
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    fn rust_type(&mut self, name: &str) -> WResult<&'static str> {
        let id = self.types.resolve(name)?;
        Ok(self.types.get(id).rust)
    }

    /// Rust type of an expression once its coercion has been applied.
    fn result_rust(&mut self, e: &Expr) -> WResult<&'static str> {
        match e.coercion.target() {
            Some(to) => self.rust_type(to),
            None => self.rust_type(&e.type_name),
        }
    }

    fn need_connection(&self, what: &str) -> WResult<()> {
        if self.connection {
            return Ok(());
        }
        Err(unsupported(format!(
            "{what} needs an engine connection but the unit is not marked connection_required"
        )))
    }

    fn same_level(&self, level: usize, name: &str) -> WResult<()> {
        if level != self.level() {
            return Err(unsupported(format!(
                "{name} belongs to an enclosing routine; local routines may only use their own parameters and declarations"
            )));
        }
        Ok(())
    }

    fn declare_var(&mut self, name: &str, kind: VarKind, not_null: bool, constant: bool) -> String {
        let rust = format!("v_{}", ident(name));
        let level = self.level();
        self.scope_mut().vars.insert(
            key(name),
            VarInfo {
                rust: rust.clone(),
                kind,
                not_null,
                constant,
                level,
            },
        );
        rust
    }

    fn var(&self, name: &str) -> WResult<VarInfo> {
        let k = key(name);
        let v = self
            .scopes
            .iter()
            .rev()
            .find_map(|s| s.vars.get(&k))
            .ok_or_else(|| internal(format!("unresolved identifier {name}")))?;
        self.same_level(v.level, name)?;
        Ok(v.clone())
    }

    fn cursor(&self, name: &str) -> WResult<CursorInfo> {
        let k = key(name);
        let c = self
            .scopes
            .iter()
            .rev()
            .find_map(|s| s.cursors.get(&k))
            .ok_or_else(|| internal(format!("unresolved cursor {name}")))?;
        self.same_level(c.level, name)?;
        Ok(c.clone())
    }

    fn record(&self, name: &str) -> WResult<RecordInfo> {
        let k = key(name);
        let r = self
            .scopes
            .iter()
            .rev()
            .find_map(|s| s.records.get(&k))
            .ok_or_else(|| internal(format!("unresolved record {name}")))?;
        self.same_level(r.level, name)?;
        Ok(r.clone())
    }

    fn local_routine(&self, name: &str) -> Option<LocalRoutine> {
        let k = key(name);
        self.scopes
            .iter()
            .rev()
            .find_map(|s| s.routines.get(&k))
            .cloned()
    }

    fn exception_known(&self, name: &str) -> bool {
        let k = key(name);
        PREDEFINED_EXCEPTIONS.contains(&k.as_str())
            || self.scopes.iter().any(|s| s.exceptions.contains(&k))
    }

    fn conn_prefix(&self) -> Vec<String> {
        if self.connection {
            vec!["conn".to_string()]
        } else {
            Vec::new()
        }
    }

    // ---- routines and declarations ----

    fn routine(&mut self, r: &DeclRoutine, fn_name: &str) -> WResult<Fragment> {
        let returns = match (r.kind, &r.ret_type) {
            (RoutineKind::Function, Some(_)) => true,
            (RoutineKind::Procedure, None) => false,
            (RoutineKind::Function, None) => {
                return Err(typing(format!("function {} has no return type", r.name)).at(r.line, r.column))
            }
            (RoutineKind::Procedure, Some(_)) => {
                return Err(typing(format!("procedure {} declares a return type", r.name)).at(r.line, r.column))
            }
        };

        let saved_loops = std::mem::take(&mut self.loops);
        let saved_closure = std::mem::replace(&mut self.closure_depth, 0);
        let saved_handler = std::mem::replace(&mut self.handler_depth, 0);
        self.routines.push(RoutineFrame {
            fn_name: fn_name.to_string(),
            returns,
        });
        self.scopes.push(Scope::default());

        let result = self.routine_inner(r, fn_name);

        self.scopes.pop();
        self.routines.pop();
        self.loops = saved_loops;
        self.closure_depth = saved_closure;
        self.handler_depth = saved_handler;
        result.map_err(|e| e.at(r.line, r.column))
    }

    fn routine_inner(&mut self, r: &DeclRoutine, fn_name: &str) -> WResult<Fragment> {
        let mut params = self.conn_prefix();
        if let Some(first) = params.first_mut() {
            *first = "conn: &mut dyn SqlConnection".to_string();
        }
        for p in &r.params {
            let rust = self.rust_type(&p.type_name)?;
            if p.mode.is_out() {
                let v = self.declare_var(&p.name, VarKind::OutParam, false, false);
                params.push(format!("{v}: &mut Option<{rust}>"));
            } else {
                let v = self.declare_var(&p.name, VarKind::Local, false, false);
                params.push(format!("mut {v}: Option<{rust}>"));
            }
        }

        let (ret, ret_slot, fallthrough) = match &r.ret_type {
            Some(t) => {
                let rust = self.rust_type(t)?;
                let msg = format!("function {} ended without RETURN", r.name.to_ascii_uppercase());
                (
                    format!("Option<{rust}>"),
                    format!("let mut ret_val: Option<{rust}> = None;"),
                    format!("Err(PlFault::ProgramError({}.to_string()))", rust_str(&msg)),
                )
            }
            None => ("()".to_string(), String::new(), "Ok(())".to_string()),
        };

        let decls = self.decls(&r.decls)?;
        let body = self.body(&r.body)?;

        CodeTemplate::new(ROUTINE)
            .at(r.line, r.column)
            .fill("FN", fn_name)
            .fill("PARAMS", params.join(", "))
            .fill("RET", ret)
            .fill("RET_SLOT", ret_slot)
            .fill("DECLS", decls)
            .fill("BODY", body)
            .fill("FALLTHROUGH", fallthrough)
            .render()
    }

    fn declare_local_routine(&mut self, r: &DeclRoutine) -> WResult<()> {
        let parent = self
            .routines
            .last()
            .map(|f| f.fn_name.clone())
            .unwrap_or_else(|| "run".to_string());
        let base = format!("{parent}_{}", ident(&r.name));
        let mut fn_name = base.clone();
        let mut n = 1;
        while self.fn_names.contains(&fn_name) {
            n += 1;
            fn_name = format!("{base}_{n}");
        }
        self.fn_names.insert(fn_name.clone());
        self.scope_mut().routines.insert(
            key(&r.name),
            LocalRoutine {
                fn_name: fn_name.clone(),
                modes: r.params.iter().map(|p| p.mode).collect(),
            },
        );
        let frag = self.routine(r, &fn_name)?;
        self.local_fns.push(frag);
        Ok(())
    }

    fn decls(&mut self, decls: &[Decl]) -> WResult<CodeTemplateList> {
        let mut list = CodeTemplateList::new();
        for d in decls {
            match d {
                Decl::Var {
                    name,
                    type_name,
                    not_null,
                    init,
                    line,
                } => {
                    let rust = self.rust_type(type_name)?;
                    let init_code = match init {
                        Some(e) => self.expr(e).map_err(|e| e.at(*line, 0))?,
                        None if *not_null => {
                            return Err(typing(format!(
                                "NOT NULL variable {name} needs an initial value"
                            ))
                            .at(*line, 0))
                        }
                        None => "None".to_string(),
                    };
                    let init_code = if *not_null {
                        format!(
                            "Some(check_not_null({init_code}, {})?)",
                            rust_str(&key(name))
                        )
                    } else {
                        init_code
                    };
                    let v = self.declare_var(name, VarKind::Local, *not_null, false);
                    list.push(
                        CodeTemplate::new("let mut %'VAR'%: Option<%'TY'%> = %'INIT'%;")
                            .at(*line, 0)
                            .fill("VAR", v)
                            .fill("TY", rust)
                            .fill("INIT", init_code),
                    );
                }
                Decl::Const {
                    name,
                    type_name,
                    value,
                    line,
                } => {
                    let rust = self.rust_type(type_name)?;
                    let code = self.expr(value).map_err(|e| e.at(*line, 0))?;
                    let v = self.declare_var(name, VarKind::Local, false, true);
                    list.push(
                        CodeTemplate::new("let %'VAR'%: Option<%'TY'%> = %'INIT'%;")
                            .at(*line, 0)
                            .fill("VAR", v)
                            .fill("TY", rust)
                            .fill("INIT", code),
                    );
                }
                Decl::Cursor {
                    name, sql, columns, ..
                } => {
                    let rust = format!("c_{}", ident(name));
                    let level = self.level();
                    self.scope_mut().cursors.insert(
                        key(name),
                        CursorInfo {
                            rust: rust.clone(),
                            sql: sql.clone(),
                            columns: columns.clone(),
                            level,
                        },
                    );
                    list.push(format!("let mut {rust} = Cursor::new({});", rust_str(sql)));
                }
                Decl::Exception { name } => {
                    self.scope_mut().exceptions.insert(key(name));
                }
                Decl::Routine(r) => self.declare_local_routine(r)?,
            }
        }
        Ok(list)
    }

    // ---- bodies and statements ----

    /// Statements of a body; with handlers they run inside a closure whose
    /// fault is matched against each handler in order.
    fn body(&mut self, body: &Body) -> WResult<Fragment> {
        if body.handlers.is_empty() {
            return self.stmts(&body.stmts);
        }
        let flow = self.fresh("flow");

        self.closure_depth += 1;
        let inner = self.stmts(&body.stmts);
        self.closure_depth -= 1;
        let inner = inner?;

        let mut handlers = CodeTemplateList::new();
        for h in &body.handlers {
            let names = h
                .names
                .iter()
                .map(|n| rust_str(&key(n)))
                .collect::<Vec<_>>()
                .join(", ");
            self.handler_depth += 1;
            let stmts = self.stmts(&h.stmts);
            self.handler_depth -= 1;
            handlers.push(
                CodeTemplate::new(HANDLER)
                    .at(h.line, 0)
                    .fill("NAMES", names)
                    .fill("STMTS", stmts.map_err(|e| e.at(h.line, 0))?),
            );
        }

        CodeTemplate::new(HANDLED)
            .fill("FLOW", flow)
            .fill("STMTS", inner)
            .fill("HANDLERS", handlers)
            .fill("PROPAGATE", self.return_propagation())
            .render()
    }

    fn return_propagation(&self) -> String {
        if self.closure_depth > 0 {
            return "return Ok(Flow::Return);".to_string();
        }
        match self.routines.last() {
            Some(f) if f.returns => "return Ok(ret_val);".to_string(),
            _ => "return Ok(());".to_string(),
        }
    }

    fn stmts(&mut self, stmts: &[Stmt]) -> WResult<Fragment> {
        self.nesting += 1;
        let result = if self.nesting > limits::MAX_NESTING {
            Err(err(
                CompileErrorKind::Budget,
                format!("statement nesting exceeds {}", limits::MAX_NESTING),
            ))
        } else {
            self.stmts_inner(stmts)
        };
        self.nesting -= 1;
        result
    }

    fn stmts_inner(&mut self, stmts: &[Stmt]) -> WResult<Fragment> {
        let mut out = Fragment::default();
        for s in stmts {
            let frag = self.stmt(s).map_err(|e| e.at(stmt_line(s), 0))?;
            out.append(frag);
        }
        Ok(out)
    }

    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> WResult<T>) -> WResult<T> {
        self.scopes.push(Scope::default());
        let r = f(self);
        self.scopes.pop();
        r
    }

    fn in_loop(
        &mut self,
        label: &Option<String>,
        f: impl FnOnce(&mut Self) -> WResult<Fragment>,
    ) -> WResult<(String, Fragment)> {
        let rust = format!("'{}", self.fresh("l"));
        self.loops.push(LoopFrame {
            name: label.as_deref().map(key),
            rust: rust.clone(),
            closure_depth: self.closure_depth,
        });
        let r = f(self);
        self.loops.pop();
        Ok((rust, r?))
    }

    fn stmt(&mut self, s: &Stmt) -> WResult<Fragment> {
        match s {
            Stmt::Null => Ok(Fragment::text("{}")),
            Stmt::Assign {
                target,
                value,
                line,
            } => {
                let v = self.var(target)?;
                if v.constant {
                    return Err(typing(format!("cannot assign to constant {target}")));
                }
                let code = self.expr(value)?;
                let code = if v.not_null {
                    format!("Some(check_not_null({code}, {})?)", rust_str(&key(target)))
                } else {
                    code
                };
                CodeTemplate::new("%'LHS'% = %'RHS'%;")
                    .at(*line, 0)
                    .fill("LHS", v.lvalue())
                    .fill("RHS", code)
                    .render()
            }
            Stmt::If {
                branches,
                else_stmts,
                line,
            } => {
                let mut arms = Vec::new();
                for b in branches {
                    let cond = self.expr(&b.cond)?;
                    let stmts = self.scoped(|w| w.stmts(&b.stmts))?;
                    arms.push((cond, stmts));
                }
                let otherwise = match else_stmts {
                    Some(stmts) => Some(self.scoped(|w| w.stmts(stmts))?),
                    None => None,
                };
                Ok(mark_line(self.if_chain(arms, otherwise)?, *line))
            }
            Stmt::Case {
                selector,
                whens,
                else_stmts,
                line,
            } => {
                let sel = match selector {
                    Some(e) => Some((self.fresh("sel"), self.expr(e)?)),
                    None => None,
                };
                let mut arms = Vec::new();
                for w in whens {
                    let value = self.expr(&w.value)?;
                    let cond = match &sel {
                        Some((name, _)) => format!("op_eq({name}.clone(), {value})"),
                        None => value,
                    };
                    let stmts = self.scoped(|wr| wr.stmts(&w.stmts))?;
                    arms.push((cond, stmts));
                }
                let otherwise = match else_stmts {
                    Some(stmts) => self.scoped(|w| w.stmts(stmts))?,
                    None => Fragment::text("case_not_found::<()>()?;"),
                };
                let chain = self.if_chain(arms, Some(otherwise))?;
                let frag = match sel {
                    Some((name, code)) => CodeTemplate::new(CASE_SELECTOR)
                        .fill("SEL", name)
                        .fill("SELECTOR", code)
                        .fill("CHAIN", chain)
                        .render()?,
                    None => chain,
                };
                Ok(mark_line(frag, *line))
            }
            Stmt::Loop { label, stmts } => {
                let (rust, body) = self.in_loop(label, |w| w.scoped(|w| w.stmts(stmts)))?;
                CodeTemplate::new(LOOP)
                    .fill("LABEL", rust)
                    .fill("STMTS", body)
                    .render()
            }
            Stmt::While { label, cond, stmts } => {
                let cond = self.expr(cond)?;
                let (rust, body) = self.in_loop(label, |w| w.scoped(|w| w.stmts(stmts)))?;
                CodeTemplate::new(WHILE)
                    .fill("LABEL", rust)
                    .fill("COND", cond)
                    .fill("STMTS", body)
                    .render()
            }
            Stmt::ForIter {
                label,
                iter,
                reverse,
                low,
                high,
                step,
                stmts,
                line,
            } => {
                let lo = self.int_bound(low, "FOR loop lower bound")?;
                let hi = self.int_bound(high, "FOR loop upper bound")?;
                let step = match step {
                    Some(s) => self.int_expr(s)?,
                    None => "Some(1i32)".to_string(),
                };
                let rev = if *reverse { ".rev()" } else { "" };
                let range = format!("({lo}..={hi}){rev}.step_by(check_for_loop_step({step})?)");
                let i = self.fresh("i");
                let (rust, (var, body)) = {
                    let mut var = String::new();
                    let (rust, body) = self.in_loop(label, |w| {
                        w.scoped(|w| {
                            var = w.declare_var(iter, VarKind::Local, false, false);
                            w.stmts(stmts)
                        })
                    })?;
                    (rust, (var, body))
                };
                CodeTemplate::new(FOR_ITER)
                    .at(*line, 0)
                    .fill("LABEL", rust)
                    .fill("I", i)
                    .fill("RANGE", range)
                    .fill("VAR", var)
                    .fill("STMTS", body)
                    .render()
            }
            Stmt::ForCursor {
                label,
                record,
                cursor,
                args,
                stmts,
                line,
            } => {
                self.need_connection("cursor FOR loop")?;
                let c = self.cursor(cursor)?;
                let binds = self.datum_list(args)?;
                let columns = Some(c.columns.iter().map(|f| key(&f.name)).collect());
                self.row_loop(label, record, rust_str(&c.sql), binds, columns, stmts, *line)
            }
            Stmt::ForSql {
                label,
                record,
                sql,
                columns,
                stmts,
                line,
            } => {
                self.need_connection("SQL FOR loop")?;
                let (sql_code, binds) = self.sql_source(sql)?;
                let columns = if sql.is_dynamic() || columns.is_empty() {
                    None
                } else {
                    Some(columns.iter().map(|f| key(&f.name)).collect())
                };
                self.row_loop(label, record, sql_code, binds, columns, stmts, *line)
            }
            Stmt::Exit { label, when } => self.jump("break", label, when),
            Stmt::Continue { label, when } => self.jump("continue", label, when),
            Stmt::Return { value, line } => self.return_stmt(value.as_ref(), *line),
            Stmt::Raise { name, line } => {
                let code = match name {
                    Some(n) => {
                        if !self.exception_known(n) {
                            return Err(typing(format!("undeclared exception {n}")));
                        }
                        format!("return Err(PlFault::named({}));", rust_str(&key(n)))
                    }
                    None => {
                        if self.handler_depth == 0 {
                            return Err(typing(
                                "RAISE without an exception name outside a handler".to_string(),
                            ));
                        }
                        "return Err(e.clone());".to_string()
                    }
                };
                CodeTemplate::new("%'CODE'%").at(*line, 0).fill("CODE", code).render()
            }
            Stmt::Block { decls, body } => {
                let inner = self.scoped(|w| {
                    let decls = w.decls(decls)?;
                    let body = w.body(body)?;
                    let mut list = CodeTemplateList::new();
                    list.push(decls);
                    list.push(body);
                    list.render()
                })?;
                CodeTemplate::new(BLOCK).fill("BODY", inner).render()
            }
            Stmt::Sql { sql, into, line } => {
                self.need_connection("SQL statement")?;
                let (sql_code, binds) = self.sql_source(sql)?;
                let ban = if !into.is_empty() && sql.is_dynamic() {
                    "ban_into_without_columns(&*stmt)?;"
                } else {
                    ""
                };
                let exec = if into.is_empty() {
                    Fragment::text("execute_plain(&mut *stmt, &mut sql_rowcount)?;")
                } else {
                    let assigns = self.into_assigns(into, |i, rust| {
                        format!("from_datum::<{rust}>(row_column(row, {i})?)?")
                    })?;
                    CodeTemplate::new(EXEC_INTO)
                        .fill("ASSIGNS", assigns)
                        .render()?
                };
                CodeTemplate::new(SQL_EXEC)
                    .at(*line, 0)
                    .fill("SQL", sql_code)
                    .fill("BINDS", binds)
                    .fill("BAN", ban)
                    .fill("EXEC", exec)
                    .render()
            }
            Stmt::Call { name, args, line } => {
                let frag = match self.local_routine(name) {
                    Some(lr) => {
                        let (lets, call) = self.local_call(&lr, name, args)?;
                        CodeTemplate::new(CALL)
                            .fill("LETS", lets.join("\n"))
                            .fill("CALL", format!("{call}?"))
                            .render()?
                    }
                    None => {
                        self.need_connection("call to an engine procedure")?;
                        let binds = self.datum_list(args)?;
                        CodeTemplate::new(CALL)
                            .fill("LETS", format!("let args = vec![{binds}];"))
                            .fill(
                                "CALL",
                                format!("call_external(conn, {}, args)?", rust_str(&key(name))),
                            )
                            .render()?
                    }
                };
                Ok(mark_line(frag, *line))
            }
            Stmt::Open { cursor, args } => {
                self.need_connection("OPEN")?;
                let c = self.cursor(cursor)?;
                let args = self.datum_list(args)?;
                CodeTemplate::new(OPEN)
                    .fill("ARGS", args)
                    .fill("CUR", c.rust)
                    .render()
            }
            Stmt::Fetch { cursor, into } => {
                let c = self.cursor(cursor)?;
                let assigns = self.into_assigns(into, |i, rust| format!("rec.get_at::<{rust}>({i})?"))?;
                CodeTemplate::new(FETCH)
                    .fill("CUR", c.rust)
                    .fill("ASSIGNS", assigns)
                    .render()
            }
            Stmt::Close { cursor } => {
                let c = self.cursor(cursor)?;
                Ok(Fragment::text(&format!("{}.close()?;", c.rust)))
            }
        }
    }

    fn if_chain(
        &mut self,
        arms: Vec<(String, Fragment)>,
        otherwise: Option<Fragment>,
    ) -> WResult<Fragment> {
        if arms.is_empty() {
            let body = otherwise.unwrap_or_default();
            return CodeTemplate::new(BLOCK).fill("BODY", body).render();
        }
        let mut branches = CodeTemplateList::new();
        for (i, (cond, stmts)) in arms.into_iter().enumerate() {
            let tmpl = if i == 0 { IF_HEAD } else { IF_ELSIF };
            branches.push(
                CodeTemplate::new(tmpl)
                    .fill("COND", cond)
                    .fill("STMTS", stmts),
            );
        }
        if let Some(stmts) = otherwise {
            branches.push(CodeTemplate::new(IF_ELSE).fill("STMTS", stmts));
        }
        CodeTemplate::new(IF).fill("BRANCHES", branches).render()
    }

    #[allow(clippy::too_many_arguments)]
    fn row_loop(
        &mut self,
        label: &Option<String>,
        record: &str,
        sql_code: String,
        binds: String,
        columns: Option<Vec<String>>,
        stmts: &[Stmt],
        line: u32,
    ) -> WResult<Fragment> {
        let rows = self.fresh("rows");
        let rec = format!("r_{}", ident(record));
        let level = self.level();
        let rec_info = RecordInfo {
            rust: rec.clone(),
            columns,
            level,
        };
        let (rust, body) = self.in_loop(label, |w| {
            w.scoped(|w| {
                w.scope_mut().records.insert(key(record), rec_info);
                w.stmts(stmts)
            })
        })?;
        CodeTemplate::new(FOR_ROWS)
            .at(line, 0)
            .fill("SQL", sql_code)
            .fill("BINDS", binds)
            .fill("ROWS", rows)
            .fill("LABEL", rust)
            .fill("REC", rec)
            .fill("STMTS", body)
            .render()
    }

    fn jump(&mut self, kw: &str, label: &Option<String>, when: &Option<Expr>) -> WResult<Fragment> {
        let frame = match label {
            Some(l) => {
                let k = key(l);
                self.loops
                    .iter()
                    .rev()
                    .find(|f| f.name.as_deref() == Some(k.as_str()))
            }
            None => self.loops.last(),
        };
        let Some(frame) = frame else {
            return Err(typing(format!(
                "{} outside of a matching loop",
                if kw == "break" { "EXIT" } else { "CONTINUE" }
            )));
        };
        if frame.closure_depth != self.closure_depth {
            return Err(unsupported(format!(
                "{} out of an exception-handled block into an enclosing loop",
                if kw == "break" { "EXIT" } else { "CONTINUE" }
            )));
        }
        let jump = format!("{kw} {};", frame.rust);
        match when {
            Some(c) => {
                let cond = self.expr(c)?;
                CodeTemplate::new(JUMP_WHEN)
                    .fill("COND", cond)
                    .fill("JUMP", jump)
                    .render()
            }
            None => Ok(Fragment::text(&jump)),
        }
    }

    fn return_stmt(&mut self, value: Option<&Expr>, line: u32) -> WResult<Fragment> {
        let returns = self.routines.last().map(|f| f.returns).unwrap_or(false);
        let code = match (returns, value) {
            (true, None) => return Err(typing("RETURN in a function needs a value".to_string())),
            (false, Some(_)) => {
                return Err(typing("RETURN with a value in a procedure".to_string()))
            }
            (true, Some(e)) => {
                let v = self.expr(e)?;
                if self.closure_depth == 0 {
                    Fragment::text(&format!("return Ok({v});"))
                } else {
                    CodeTemplate::new(RETURN_FROM_CLOSURE)
                        .fill("VALUE", v)
                        .render()?
                }
            }
            (false, None) => {
                if self.closure_depth == 0 {
                    Fragment::text("return Ok(());")
                } else {
                    Fragment::text("return Ok(Flow::Return);")
                }
            }
        };
        Ok(mark_line(code, line))
    }

    fn sql_source(&mut self, sql: &SqlSource) -> WResult<(String, String)> {
        match sql {
            SqlSource::Static { text, host_vars } => {
                Ok((rust_str(text), self.datum_list(host_vars)?))
            }
            SqlSource::Dynamic { text, using } => {
                let code = self.expr(text)?;
                let rust = self.result_rust(text)?;
                let code = if rust == "String" {
                    code
                } else {
                    format!("conv::<{rust}, String>({code})?")
                };
                Ok((
                    format!("check_not_null({code}, \"dynamic SQL text\")?"),
                    self.datum_list(using)?,
                ))
            }
        }
    }

    fn into_assigns(
        &mut self,
        targets: &[IntoTarget],
        source: impl Fn(usize, &str) -> String,
    ) -> WResult<CodeTemplateList> {
        let mut list = CodeTemplateList::new();
        for (i, t) in targets.iter().enumerate() {
            let v = self.var(&t.name)?;
            if v.constant {
                return Err(typing(format!("cannot fetch into constant {}", t.name)));
            }
            let rust = self.rust_type(&t.type_name)?;
            let code = t.coercion.render(source(i, rust), self.types)?;
            let code = if v.not_null {
                format!("Some(check_not_null({code}, {})?)", rust_str(&key(&t.name)))
            } else {
                code
            };
            list.push(format!("{} = {code};", v.lvalue()));
        }
        Ok(list)
    }

    /// Arguments of a local routine call: IN values are evaluated into fresh
    /// bindings first so no argument borrows the connection mid-call.
    fn local_call(
        &mut self,
        lr: &LocalRoutine,
        name: &str,
        args: &[Expr],
    ) -> WResult<(Vec<String>, String)> {
        if args.len() != lr.modes.len() {
            return Err(typing(format!(
                "{name} takes {} arguments, {} given",
                lr.modes.len(),
                args.len()
            )));
        }
        let mut lets = Vec::new();
        let mut call_args = self.conn_prefix();
        for (arg, mode) in args.iter().zip(&lr.modes) {
            if mode.is_out() {
                let ExprNode::Id { name: target } = &arg.node else {
                    return Err(typing(format!(
                        "OUT argument of {name} must be a variable"
                    )));
                };
                let v = self.var(target)?;
                if v.constant {
                    return Err(typing(format!("constant {target} passed as OUT argument")));
                }
                call_args.push(v.borrow_mut());
            } else {
                let code = self.expr(arg)?;
                let a = self.fresh("a");
                lets.push(format!("let {a} = {code};"));
                call_args.push(a);
            }
        }
        Ok((lets, format!("{}({})", lr.fn_name, call_args.join(", "))))
    }

    // ---- expressions ----

    fn int_expr(&mut self, e: &Expr) -> WResult<String> {
        let code = self.expr(e)?;
        let rust = self.result_rust(e)?;
        Ok(if rust == "i32" {
            code
        } else {
            format!("conv::<{rust}, i32>({code})?")
        })
    }

    fn int_bound(&mut self, e: &Expr, what: &str) -> WResult<String> {
        let code = self.int_expr(e)?;
        Ok(format!("check_not_null({code}, {})?", rust_str(what)))
    }

    /// Comma-separated `Datum` values for binding or passing to the engine.
    fn datum_list(&mut self, exprs: &[Expr]) -> WResult<String> {
        let mut out = Vec::with_capacity(exprs.len());
        for e in exprs {
            if matches!(e.node, ExprNode::Null) && e.coercion.cast_target().is_none() {
                out.push("Datum::Null".to_string());
                continue;
            }
            out.push(format!("to_datum({})", self.expr(e)?));
        }
        Ok(out.join(", "))
    }

    fn expr(&mut self, e: &Expr) -> WResult<String> {
        self.nesting += 1;
        let result = if self.nesting > limits::MAX_NESTING {
            Err(err(
                CompileErrorKind::Budget,
                format!("expression nesting exceeds {}", limits::MAX_NESTING),
            ))
        } else {
            self.expr_inner(e)
        };
        self.nesting -= 1;
        result
    }

    fn expr_inner(&mut self, e: &Expr) -> WResult<String> {
        let ty = self.types.resolve(&e.type_name)?;
        let rust = self.types.get(ty).rust;
        let code = match &e.node {
            ExprNode::Null => self.null_literal(e, ty)?,
            ExprNode::Bool { value } => format!("Some({value})"),
            ExprNode::Int { value } => int_literal(*value, rust)?,
            ExprNode::Float { value } => float_literal(*value, rust)?,
            ExprNode::Numeric { value } => format!("lit::<{rust}>({})?", rust_str(value)),
            ExprNode::Str { value } => {
                if rust == "String" {
                    self.string_literal(value)
                } else {
                    format!("lit::<{rust}>({})?", rust_str(value))
                }
            }
            ExprNode::Date { value }
            | ExprNode::Time { value }
            | ExprNode::Timestamp { value }
            | ExprNode::Datetime { value } => format!("lit::<{rust}>({})?", rust_str(value)),
            ExprNode::Id { name } => self.var(name)?.read(),
            ExprNode::Field {
                record,
                field,
                index,
            } => {
                let r = self.record(record)?;
                match &r.columns {
                    Some(cols) => {
                        let k = key(field);
                        let idx = index
                            .or_else(|| cols.iter().position(|c| *c == k))
                            .ok_or_else(|| {
                                typing(format!("record {record} has no field {field}"))
                            })?;
                        format!("{}.get_at::<{rust}>({idx})?", r.rust)
                    }
                    None => format!("{}.get::<{rust}>({})?", r.rust, rust_str(&key(field))),
                }
            }
            ExprNode::Unary { op, operand } => {
                let x = self.expr(operand)?;
                match op {
                    UnaryOp::Neg => format!("op_neg({x})?"),
                    UnaryOp::Not => format!("op_not({x})"),
                }
            }
            ExprNode::Binary { op, left, right } => {
                let l = self.expr(left)?;
                let r = self.expr(right)?;
                let (f, fallible) = match op {
                    BinaryOp::Add => ("op_add", true),
                    BinaryOp::Sub => ("op_sub", true),
                    BinaryOp::Mul => ("op_mul", true),
                    BinaryOp::Div => ("op_div", true),
                    BinaryOp::Mod => ("op_mod", true),
                    BinaryOp::Concat => ("op_concat", false),
                    BinaryOp::Eq => ("op_eq", false),
                    BinaryOp::Ne => ("op_ne", false),
                    BinaryOp::Lt => ("op_lt", false),
                    BinaryOp::Le => ("op_le", false),
                    BinaryOp::Gt => ("op_gt", false),
                    BinaryOp::Ge => ("op_ge", false),
                    BinaryOp::And => ("op_and", false),
                    BinaryOp::Or => ("op_or", false),
                    BinaryOp::Like => ("op_like", false),
                };
                let q = if fallible { "?" } else { "" };
                format!("{f}({l}, {r}){q}")
            }
            ExprNode::IsNull { operand, negated } => {
                let x = self.expr(operand)?;
                if *negated {
                    format!("op_not(op_is_null({x}))")
                } else {
                    format!("op_is_null({x})")
                }
            }
            ExprNode::Between { operand, low, high } => {
                let x = self.expr(operand)?;
                let lo = self.expr(low)?;
                let hi = self.expr(high)?;
                format!("op_between({x}, {lo}, {hi})")
            }
            ExprNode::In { operand, list } => {
                let x = self.expr(operand)?;
                let items = list
                    .iter()
                    .map(|i| self.expr(i))
                    .collect::<WResult<Vec<_>>>()?;
                format!("op_in({x}, vec![{}])", items.join(", "))
            }
            ExprNode::Case {
                selector,
                whens,
                else_expr,
            } => {
                let sel = match selector {
                    Some(s) => Some((self.fresh("sel"), self.expr(s)?)),
                    None => None,
                };
                let mut arms = Vec::new();
                for w in whens {
                    let v = self.expr(&w.value)?;
                    let r = self.expr(&w.result)?;
                    let cond = match &sel {
                        Some((n, _)) => format!("op_eq({n}.clone(), {v})"),
                        None => v,
                    };
                    arms.push(format!("if truthy({cond}) {{ {r} }}"));
                }
                let otherwise = match else_expr {
                    Some(x) => self.expr(x)?,
                    None => "case_not_found()?".to_string(),
                };
                let chain = if arms.is_empty() {
                    otherwise
                } else {
                    format!("{} else {{ {otherwise} }}", arms.join(" else "))
                };
                match sel {
                    Some((n, code)) => format!("{{ let {n} = {code}; {chain} }}"),
                    None => format!("({chain})"),
                }
            }
            ExprNode::Builtin { name, args } => {
                self.need_connection("builtin function call")?;
                let name = rust_str(&key(name));
                if args.is_empty() {
                    format!("invoke_builtin::<{rust}>(conn, {name}, Vec::new())?")
                } else {
                    let args = self.datum_list(args)?;
                    format!("{{ let args = vec![{args}]; invoke_builtin::<{rust}>(conn, {name}, args)? }}")
                }
            }
            ExprNode::LocalCall { name, args } => {
                let lr = self
                    .local_routine(name)
                    .ok_or_else(|| internal(format!("unresolved function {name}")))?;
                let (lets, call) = self.local_call(&lr, name, args)?;
                if lets.is_empty() {
                    format!("{call}?")
                } else {
                    format!("{{ {} {call}? }}", lets.join(" "))
                }
            }
            ExprNode::SqlRowCount => "Some(sql_rowcount)".to_string(),
            ExprNode::CursorAttr { cursor, attr } => {
                let c = self.cursor(cursor)?;
                match attr {
                    CursorAttr::IsOpen => format!("{}.attr_isopen()", c.rust),
                    CursorAttr::Found => format!("{}.attr_found()?", c.rust),
                    CursorAttr::NotFound => format!("{}.attr_notfound()?", c.rust),
                    CursorAttr::RowCount => format!("{}.attr_rowcount()?", c.rust),
                }
            }
        };
        e.coercion.render(code, self.types)
    }

    fn null_literal(&mut self, e: &Expr, ty: TypeId) -> WResult<String> {
        if let Some(to) = e.coercion.cast_target() {
            let rust = self.rust_type(to)?;
            return Ok(format!("None::<{rust}>"));
        }
        if ty.index() == IDX_NULL {
            return Ok("None".to_string());
        }
        Ok(format!("None::<{}>", self.types.get(ty).rust))
    }

    fn string_literal(&self, s: &str) -> String {
        if s.len() <= self.literal_chunk {
            return format!("Some(String::from({}))", rust_str(s));
        }
        let chunks = split_chunks(s, self.literal_chunk)
            .into_iter()
            .map(rust_str)
            .collect::<Vec<_>>()
            .join(", ");
        format!("Some(concat_chunks(&[{chunks}]))")
    }
}

fn int_literal(value: i64, rust: &str) -> WResult<String> {
    let out_of_range = || typing(format!("integer literal {value} does not fit {rust}"));
    Ok(match rust {
        "i16" => format!("Some({}i16)", i16::try_from(value).map_err(|_| out_of_range())?),
        "i32" => format!("Some({}i32)", i32::try_from(value).map_err(|_| out_of_range())?),
        "i64" => format!("Some({value}i64)"),
        "f32" | "f64" => format!("Some({value}{rust})"),
        "Decimal" => format!("lit::<Decimal>(\"{value}\")?"),
        other => return Err(typing(format!("integer literal typed as {other}"))),
    })
}

fn float_literal(value: f64, rust: &str) -> WResult<String> {
    if !value.is_finite() {
        return Err(typing(format!("float literal {value} is not finite")));
    }
    Ok(match rust {
        "f32" | "f64" => format!("Some({value:?}{rust})"),
        "Decimal" => format!("lit::<Decimal>(\"{value:?}\")?"),
        other => return Err(typing(format!("float literal typed as {other}"))),
    })
}

/// Marks every line of a rendered statement with its source line.
fn mark_line(mut frag: Fragment, line: u32) -> Fragment {
    if line > 0 {
        frag.markers.insert(
            0,
            CodeRangeMarker {
                start_line: 0,
                end_line: frag.lines.len(),
                source_line: line,
                source_column: 0,
            },
        );
    }
    frag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_respect_char_boundaries() {
        let s = "aé".repeat(5);
        let chunks = split_chunks(&s, 4);
        assert_eq!(chunks.concat(), s);
        assert!(chunks.iter().all(|c| c.len() <= 4));
    }

    #[test]
    fn literals_follow_the_resolved_type() {
        assert_eq!(int_literal(-5, "i32").unwrap(), "Some(-5i32)");
        assert_eq!(int_literal(7, "f64").unwrap(), "Some(7f64)");
        assert!(int_literal(70_000, "i16").is_err());
        assert_eq!(float_literal(1.5, "f32").unwrap(), "Some(1.5f32)");
        assert!(float_literal(f64::NAN, "f64").is_err());
    }
}
