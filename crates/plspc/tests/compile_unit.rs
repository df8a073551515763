use serde_json::{json, Value};

use plspc::{compile_unit, descriptor_for, CompileErrorKind, CompileOptions, CompileResult};

fn int(v: i64) -> Value {
    json!({"kind": "int", "value": v, "type": "INT"})
}

fn id(name: &str, ty: &str) -> Value {
    json!({"kind": "id", "name": name, "type": ty})
}

fn unit(routine: Value) -> Vec<u8> {
    unit_with(routine, false, false)
}

fn unit_with(routine: Value, connection_required: bool, autonomous: bool) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "schema_version": "plsp.unit@0.1.0",
        "connection_required": connection_required,
        "autonomous_transaction": autonomous,
        "routine": routine,
    }))
    .unwrap()
}

fn compile_ok(bytes: &[u8], rev: &str) -> plspc::CompileOutput {
    match compile_unit(bytes, &CompileOptions::with_revision(rev)) {
        CompileResult::Ok(out) => out,
        CompileResult::Err(err) => panic!("{:?}: {} at {}", err.kind, err.message, err.line),
    }
}

fn compile_err(bytes: &[u8]) -> plspc::CompilerError {
    match compile_unit(bytes, &CompileOptions::default()) {
        CompileResult::Ok(out) => panic!("expected failure, got:\n{}", out.source),
        CompileResult::Err(err) => err,
    }
}

fn add_one() -> Value {
    json!({
        "kind": "function",
        "name": "add_one",
        "params": [{"name": "x", "type": "INT"}],
        "ret_type": "INT",
        "line": 1,
        "body": {"stmts": [
            {"kind": "return", "line": 3, "value": {
                "kind": "binary", "op": "add", "type": "INT",
                "left": id("x", "INT"),
                "right": int(1),
            }},
        ]},
    })
}

#[test]
fn function_renders_routine_impl_and_body() {
    let out = compile_ok(&unit(add_one()), "r1");
    assert_eq!(out.artifact_name, "Func_ADD_ONE_r1");
    assert_eq!(out.decl_text, "FUNCTION ADD_ONE(X IN INT) RETURN INT");
    assert!(out.source.contains("pub struct Func_ADD_ONE_r1;"));
    assert!(out.source.contains("impl Routine for Func_ADD_ONE_r1 {"));
    assert!(out.source.contains("let v_x = arg_in::<i32>(&args[0])?;"));
    assert!(out.source.contains("fn run(mut v_x: Option<i32>) -> PlResult<Option<i32>> {"));
    assert!(out.source.contains("return Ok(op_add(v_x.clone(), Some(1i32))?);"));
    assert!(out.source.contains("Ok(ret_host(result))"));
    assert!(!out.source.contains("ctx.connection"));
}

#[test]
fn revisions_yield_distinct_artifacts() {
    let a = compile_ok(&unit(add_one()), "r1");
    let b = compile_ok(&unit(add_one()), "r2");
    assert_ne!(a.artifact_name, b.artifact_name);
}

#[test]
fn markers_point_back_to_source_lines() {
    let out = compile_ok(&unit(add_one()), "r1");
    let lines: Vec<&str> = out.source.lines().collect();
    let ret = out
        .code_range_markers
        .iter()
        .find(|m| m.source_line == 3)
        .expect("marker for the RETURN");
    assert!(lines[ret.start_line - 1].contains("return Ok("));
    assert!(out.code_range_markers.iter().any(|m| m.source_line == 1));
}

#[test]
fn out_parameters_are_written_back() {
    let routine = json!({
        "kind": "procedure",
        "name": "split",
        "params": [
            {"name": "total", "type": "BIGINT"},
            {"name": "half", "type": "BIGINT", "mode": "out"},
            {"name": "acc", "type": "VARCHAR(10)", "mode": "inout"},
        ],
        "body": {"stmts": [
            {"kind": "assign", "target": "half", "line": 2, "value": {
                "kind": "binary", "op": "div", "type": "BIGINT",
                "left": id("total", "BIGINT"),
                "right": {"kind": "int", "value": 2, "type": "BIGINT"},
            }},
            {"kind": "assign", "target": "acc", "line": 3, "value": {
                "kind": "str", "value": "done", "type": "STRING",
                "coercion": {"kind": "check_str_length", "is_char": false, "length": 10},
            }},
        ]},
    });
    let out = compile_ok(&unit(routine), "1");
    assert_eq!(out.artifact_name, "Proc_SPLIT_1");
    assert!(out.source.contains("let mut v_half: Option<i64> = None;"));
    assert!(out.source.contains("let mut v_acc = arg_inout::<String>(&args[2])?;"));
    assert!(out.source.contains("let result = run(v_total, &mut v_half, &mut v_acc);"));
    assert!(out.source.contains("v_half: &mut Option<i64>"));
    assert!(out.source.contains("*v_half = op_div(v_total.clone(), Some(2i64))?;"));
    assert!(out
        .source
        .contains("*v_acc = check_str_length(Some(String::from(\"done\")), 10, false)?;"));
    assert!(out.source.contains("put_out(&mut args[1], v_half);"));
    assert!(out.source.contains("Ok(HostValue::Null)"));

    let desc = descriptor_for(&out).unwrap();
    assert_eq!(desc.params, vec!["i64?", "i64?[]", "string[]"]);
    assert_eq!(desc.returns, None);
    assert_eq!(desc.signature(), "'Proc_SPLIT_1'.SPLIT(i64?,i64?[],string[])");
    assert_eq!(desc.entry, "Proc_SPLIT_1");
    assert_eq!(desc.digest.len(), 64);
}

#[test]
fn case_without_else_faults_at_run_time() {
    let routine = json!({
        "kind": "function",
        "name": "grade",
        "params": [{"name": "n", "type": "INT"}],
        "ret_type": "STRING",
        "body": {"stmts": [
            {"kind": "return", "value": {
                "kind": "case", "type": "STRING",
                "selector": id("n", "INT"),
                "whens": [{"value": int(1), "result": {"kind": "str", "value": "one", "type": "STRING"}}],
            }},
        ]},
    });
    let out = compile_ok(&unit(routine), "0");
    assert!(out.source.contains("case_not_found()?"));
    assert!(out.source.contains("op_eq(sel1.clone(), Some(1i32))"));
}

#[test]
fn case_statement_without_else_emits_fault_branch() {
    let routine = json!({
        "kind": "procedure",
        "name": "p",
        "params": [{"name": "n", "type": "INT"}],
        "body": {"stmts": [
            {"kind": "case", "selector": id("n", "INT"), "whens": [
                {"value": int(1), "stmts": [{"kind": "null"}]},
            ]},
        ]},
    });
    let out = compile_ok(&unit(routine), "0");
    assert!(out.source.contains("case_not_found::<()>()?;"));
}

#[test]
fn long_string_literals_are_chunked() {
    let text = "x".repeat(40);
    let routine = json!({
        "kind": "function",
        "name": "s",
        "ret_type": "STRING",
        "body": {"stmts": [
            {"kind": "return", "value": {"kind": "str", "value": text, "type": "STRING"}},
        ]},
    });
    let options = CompileOptions {
        max_literal_chunk: 16,
        ..CompileOptions::default()
    };
    let CompileResult::Ok(out) = compile_unit(&unit(routine), &options) else {
        panic!("compile failed");
    };
    let chunk = format!("\"{}\"", "x".repeat(16));
    let tail = format!("\"{}\"", "x".repeat(8));
    assert!(out
        .source
        .contains(&format!("concat_chunks(&[{chunk}, {chunk}, {tail}])")));
}

#[test]
fn static_select_into_uses_exactly_one_row_helper() {
    let routine = json!({
        "kind": "function",
        "name": "salary_of",
        "params": [{"name": "emp", "type": "INT"}],
        "ret_type": "NUMERIC(10,2)",
        "decls": [{"decl": "var", "name": "s", "type": "NUMERIC(10,2)"}],
        "body": {"stmts": [
            {"kind": "sql", "line": 4,
             "sql": {"mode": "static", "text": "SELECT sal FROM emp WHERE id = ?",
                     "host_vars": [id("emp", "INT")]},
             "into": [{"name": "s", "type": "NUMERIC"}]},
            {"kind": "return", "value": id("s", "NUMERIC(10,2)")},
        ]},
    });
    let out = compile_ok(&unit_with(routine, true, false), "0");
    assert!(out.source.contains("let conn = ctx.connection(false)?;"));
    assert!(out.source.contains("let sql = \"SELECT sal FROM emp WHERE id = ?\";"));
    assert!(out.source.contains("let binds = vec![to_datum(v_emp.clone())];"));
    assert!(out.source.contains("execute_into(&mut *stmt, &mut sql_rowcount, |row| {"));
    assert!(out
        .source
        .contains("v_s = from_datum::<Decimal>(row_column(row, 0)?)?;"));
    assert!(!out.source.contains("ban_into_without_columns"));
}

#[test]
fn dynamic_into_checks_result_columns_first() {
    let routine = json!({
        "kind": "procedure",
        "name": "dyn",
        "params": [{"name": "q", "type": "STRING"}, {"name": "n", "type": "INT", "mode": "out"}],
        "body": {"stmts": [
            {"kind": "sql",
             "sql": {"mode": "dynamic", "text": id("q", "STRING")},
             "into": [{"name": "n", "type": "BIGINT",
                       "coercion": {"kind": "conversion", "from": "BIGINT", "to": "INT"}}]},
        ]},
    });
    let out = compile_ok(&unit_with(routine, true, false), "0");
    assert!(out
        .source
        .contains("let sql = check_not_null(v_q.clone(), \"dynamic SQL text\")?;"));
    assert!(out.source.contains("ban_into_without_columns(&*stmt)?;"));
    assert!(out
        .source
        .contains("*v_n = conv::<i64, i32>(from_datum::<i64>(row_column(row, 0)?)?)?;"));
}

#[test]
fn cursor_loop_records_use_index_for_static_and_name_for_dynamic_sql() {
    let routine = json!({
        "kind": "function",
        "name": "total",
        "params": [{"name": "q", "type": "STRING"}],
        "ret_type": "BIGINT",
        "decls": [
            {"decl": "var", "name": "acc", "type": "BIGINT",
             "init": {"kind": "int", "value": 0, "type": "BIGINT"}},
            {"decl": "cursor", "name": "c", "sql": "SELECT id, amount FROM t",
             "columns": [{"name": "id", "type": "INT"}, {"name": "amount", "type": "BIGINT"}]},
        ],
        "body": {"stmts": [
            {"kind": "for_cursor", "record": "r", "cursor": "c", "stmts": [
                {"kind": "assign", "target": "acc", "value": {
                    "kind": "binary", "op": "add", "type": "BIGINT",
                    "left": id("acc", "BIGINT"),
                    "right": {"kind": "field", "record": "r", "field": "amount", "type": "BIGINT"},
                }},
            ]},
            {"kind": "for_sql", "record": "d",
             "sql": {"mode": "dynamic", "text": id("q", "STRING")},
             "stmts": [
                {"kind": "assign", "target": "acc", "value": {
                    "kind": "binary", "op": "add", "type": "BIGINT",
                    "left": id("acc", "BIGINT"),
                    "right": {"kind": "field", "record": "d", "field": "amount", "type": "BIGINT"},
                }},
            ]},
            {"kind": "return", "value": id("acc", "BIGINT")},
        ]},
    });
    let out = compile_ok(&unit_with(routine, true, false), "0");
    assert!(out.source.contains("let mut c_c = Cursor::new(\"SELECT id, amount FROM t\");"));
    assert!(out.source.contains("r_r.get_at::<i64>(1)?"));
    assert!(out.source.contains("r_d.get::<i64>(\"AMOUNT\")?"));
    assert!(out.source.contains("while let Some(r_r) = next_record("));
}

#[test]
fn handlers_run_body_in_closure_and_propagate_return() {
    let routine = json!({
        "kind": "function",
        "name": "safe_div",
        "params": [{"name": "a", "type": "INT"}, {"name": "b", "type": "INT"}],
        "ret_type": "INT",
        "body": {
            "stmts": [
                {"kind": "return", "value": {
                    "kind": "binary", "op": "div", "type": "INT",
                    "left": id("a", "INT"), "right": id("b", "INT"),
                }},
            ],
            "handlers": [
                {"names": ["ZERO_DIVIDE"], "stmts": [
                    {"kind": "return", "value": {"kind": "null", "type": "INT"}},
                ]},
                {"names": ["OTHERS"], "stmts": [{"kind": "raise"}]},
            ],
        },
    });
    let out = compile_ok(&unit(routine), "0");
    let src = &out.source;
    assert!(src.contains("let flow1 = (|| -> PlResult<Flow> {"));
    assert!(src.contains("ret_val = op_div(v_a.clone(), v_b.clone())?;"));
    assert!(src.contains("return Ok(Flow::Return);"));
    assert!(src.contains("Err(e) if e.matches(&[\"ZERO_DIVIDE\"]) => {"));
    assert!(src.contains("return Ok(None::<i32>);"));
    assert!(src.contains("return Err(e.clone());"));
    assert!(src.contains("return Ok(ret_val);"));
}

#[test]
fn local_routines_become_module_functions() {
    let routine = json!({
        "kind": "function",
        "name": "outer",
        "params": [{"name": "x", "type": "INT"}],
        "ret_type": "INT",
        "decls": [{"decl": "routine",
            "kind": "function", "name": "twice",
            "params": [{"name": "y", "type": "INT"}],
            "ret_type": "INT",
            "body": {"stmts": [
                {"kind": "return", "value": {
                    "kind": "binary", "op": "mul", "type": "INT",
                    "left": id("y", "INT"), "right": int(2),
                }},
            ]},
        }],
        "body": {"stmts": [
            {"kind": "return", "value": {
                "kind": "local_call", "name": "twice", "type": "INT", "args": [id("x", "INT")],
            }},
        ]},
    });
    let out = compile_ok(&unit(routine), "0");
    assert!(out.source.contains("fn run_twice(mut v_y: Option<i32>) -> PlResult<Option<i32>> {"));
    assert!(out.source.contains("let a1 = v_x.clone();"));
    assert!(out.source.contains("run_twice(a1)?"));
}

#[test]
fn local_routines_cannot_reach_outer_variables() {
    let routine = json!({
        "kind": "procedure",
        "name": "outer",
        "decls": [
            {"decl": "var", "name": "n", "type": "INT"},
            {"decl": "routine", "kind": "procedure", "name": "inner", "line": 5,
             "body": {"stmts": [
                {"kind": "assign", "target": "n", "value": int(1), "line": 6},
             ]}},
        ],
        "body": {"stmts": [{"kind": "null"}]},
    });
    let err = compile_err(&unit(routine));
    assert_eq!(err.kind, CompileErrorKind::Unsupported);
    assert_eq!(err.line, 6);
}

#[test]
fn loops_use_fresh_labels_and_checked_bounds() {
    let routine = json!({
        "kind": "function",
        "name": "sum_to",
        "params": [{"name": "n", "type": "INT"}],
        "ret_type": "INT",
        "decls": [{"decl": "var", "name": "s", "type": "INT", "init": int(0)}],
        "body": {"stmts": [
            {"kind": "for_iter", "label": "outer", "iter": "i", "reverse": true,
             "low": int(1), "high": id("n", "INT"), "stmts": [
                {"kind": "exit", "label": "outer", "when": {
                    "kind": "binary", "op": "gt", "type": "BOOLEAN",
                    "left": id("s", "INT"), "right": int(100),
                }},
                {"kind": "assign", "target": "s", "value": {
                    "kind": "binary", "op": "add", "type": "INT",
                    "left": id("s", "INT"), "right": id("i", "INT"),
                }},
            ]},
            {"kind": "return", "value": id("s", "INT")},
        ]},
    });
    let out = compile_ok(&unit(routine), "0");
    let src = &out.source;
    assert!(src.contains("'l2: for i1 in (check_not_null(Some(1i32), \"FOR loop lower bound\")?..=check_not_null(v_n.clone(), \"FOR loop upper bound\")?).rev().step_by(check_for_loop_step(Some(1i32))?) {"));
    assert!(src.contains("let mut v_i: Option<i32> = Some(i1);"));
    assert!(src.contains("break 'l2;"));
}

#[test]
fn connection_use_needs_the_unit_flag() {
    let routine = json!({
        "kind": "procedure",
        "name": "p",
        "body": {"stmts": [
            {"kind": "sql", "line": 2, "sql": {"mode": "static", "text": "DELETE FROM t"}},
        ]},
    });
    let err = compile_err(&unit(routine));
    assert_eq!(err.kind, CompileErrorKind::Unsupported);
    assert_eq!(err.line, 2);
}

#[test]
fn autonomous_units_commit_or_roll_back() {
    let routine = json!({
        "kind": "procedure",
        "name": "audit",
        "body": {"stmts": [
            {"kind": "sql", "sql": {"mode": "static", "text": "INSERT INTO log VALUES (1)"}},
        ]},
    });
    let out = compile_ok(&unit_with(routine, false, true), "0");
    assert!(out.source.contains("let conn = ctx.connection(true)?;"));
    assert!(out.source.contains("Ok(_) => conn.commit()?,"));
    assert!(out.source.contains("Err(_) => conn.rollback()?,"));
    assert!(out.source.contains("execute_plain(&mut *stmt, &mut sql_rowcount)?;"));
}

#[test]
fn builtins_go_through_the_connection() {
    let routine = json!({
        "kind": "function",
        "name": "now_len",
        "params": [{"name": "s", "type": "STRING"}],
        "ret_type": "INT",
        "body": {"stmts": [
            {"kind": "return", "value": {
                "kind": "builtin", "name": "length", "type": "INT", "args": [id("s", "STRING")],
            }},
        ]},
    });
    let out = compile_ok(&unit_with(routine, true, false), "0");
    assert!(out.source.contains(
        "{ let args = vec![to_datum(v_s.clone())]; invoke_builtin::<i32>(conn, \"LENGTH\", args)? }"
    ));
}

#[test]
fn rejects_bad_input() {
    assert_eq!(compile_err(b"{not json").kind, CompileErrorKind::Parse);

    let wrong_schema = serde_json::to_vec(&json!({
        "schema_version": "plsp.unit@9",
        "routine": add_one(),
    }))
    .unwrap();
    assert_eq!(compile_err(&wrong_schema).kind, CompileErrorKind::Schema);

    let bad_type = json!({
        "kind": "procedure",
        "name": "p",
        "params": [{"name": "x", "type": "BLOB"}],
        "body": {"stmts": []},
    });
    assert_eq!(compile_err(&unit(bad_type)).kind, CompileErrorKind::Typing);

    let no_return_type = json!({
        "kind": "function",
        "name": "f",
        "body": {"stmts": []},
    });
    assert_eq!(compile_err(&unit(no_return_type)).kind, CompileErrorKind::Typing);
}
