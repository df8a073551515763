use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use plsp_rt::memory::MemoryConnection;
use plsp_rt::routine::{CallContext, FnRoutine, Routine};
use plsp_rt::sql::SqlConnection;
use plsp_rt::{PlFault, PlResult};
use plsp_server::{Artifact, InvokeError, Invoker, Signature};
use plsp_wire::{Datum, DbType, HostValue, ParamMode, Value};

struct MemoryContext {
    conn: MemoryConnection,
}

impl CallContext for MemoryContext {
    fn connection(&mut self, _autonomous: bool) -> PlResult<&mut dyn SqlConnection> {
        Ok(&mut self.conn)
    }

    fn server_name(&self) -> &str {
        "test-host"
    }
}

fn ctx() -> MemoryContext {
    MemoryContext {
        conn: MemoryConnection::new(),
    }
}

fn artifact(sig: &str, routine: Arc<dyn Routine>) -> Artifact {
    Artifact::new(Signature::parse(sig).expect("signature"), None, "test", routine)
}

#[test]
fn argument_count_mismatch_never_calls_the_routine() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let add = artifact(
        "'m'.add(i32,i32)",
        Arc::new(FnRoutine(
            move |_: &mut dyn CallContext, args: &mut [HostValue]| -> PlResult<HostValue> {
                seen.fetch_add(1, Ordering::SeqCst);
                match (&args[0], &args[1]) {
                    (HostValue::I32(a), HostValue::I32(b)) => Ok(HostValue::I32(a + b)),
                    _ => Err(PlFault::ValueError("ints expected".to_string())),
                }
            },
        )),
    );

    let mut invoker = Invoker::new();
    let args: Vec<Value> = (1..=3).map(|i| Value::of(Datum::Int(i))).collect();
    let err = invoker
        .invoke(&add, &args, DbType::Int, &mut ctx())
        .unwrap_err();
    assert_eq!(
        err,
        InvokeError::ArgumentCountMismatch {
            expected: 2,
            got: 3
        }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let ok = invoker
        .invoke(&add, &args[..2], DbType::Bigint, &mut ctx())
        .unwrap();
    assert_eq!(ok.value, Value::new(Datum::Bigint(3), DbType::Bigint));
    assert!(ok.out_params.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn out_and_inout_slots_stream_after_the_result() {
    let split = artifact(
        "'m'.split(string,i32[],string[])",
        Arc::new(FnRoutine(
            |_: &mut dyn CallContext, args: &mut [HostValue]| -> PlResult<HostValue> {
                let HostValue::String(s) = &args[0] else {
                    return Err(PlFault::ValueError("string expected".to_string()));
                };
                let n = i32::try_from(s.len()).unwrap_or(i32::MAX);
                let upper = s.to_uppercase();
                if let Some(slot) = args[1].out_slot_mut() {
                    *slot = HostValue::I32(n);
                }
                if let Some(slot) = args[2].out_slot_mut() {
                    *slot = HostValue::String(upper);
                }
                Ok(HostValue::Null)
            },
        )),
    );

    let args = vec![
        Value::of(Datum::String("abc".to_string())),
        Value::null(DbType::Int).with_mode(ParamMode::Out),
        Value::of(Datum::String("old".to_string())).with_mode(ParamMode::InOut),
    ];
    let inv = Invoker::new()
        .invoke(&split, &args, DbType::Null, &mut ctx())
        .unwrap();
    assert!(inv.value.is_null());
    assert_eq!(
        inv.out_params,
        vec![
            Value::new(Datum::Int(3), DbType::Int).with_mode(ParamMode::Out),
            Value::new(Datum::String("ABC".to_string()), DbType::String)
                .with_mode(ParamMode::InOut),
        ]
    );
}

#[test]
fn coercion_failure_is_a_type_mismatch() {
    let id = artifact(
        "'m'.id(i32)",
        Arc::new(FnRoutine(
            |_: &mut dyn CallContext, args: &mut [HostValue]| -> PlResult<HostValue> {
                Ok(args[0].clone())
            },
        )),
    );
    let err = Invoker::new()
        .invoke(
            &id,
            &[Value::of(Datum::String("not a number".to_string()))],
            DbType::Int,
            &mut ctx(),
        )
        .unwrap_err();
    let InvokeError::TypeMismatch(msg) = err else {
        panic!("expected type mismatch, got {err:?}");
    };
    assert!(msg.starts_with("argument 1:"), "{msg}");
}

#[test]
fn opaque_return_is_not_supported() {
    let handle = artifact(
        "'m'.handle()",
        Arc::new(FnRoutine(|_: &mut dyn CallContext, _: &mut [HostValue]| -> PlResult<HostValue> {
            Ok(HostValue::Opaque("Socket".to_string()))
        })),
    );
    let err = Invoker::new()
        .invoke(&handle, &[], DbType::Object, &mut ctx())
        .unwrap_err();
    assert_eq!(err, InvokeError::NotSupported("Socket".to_string()));
}

#[test]
fn routine_faults_carry_their_code() {
    let boom = artifact(
        "'m'.boom()",
        Arc::new(FnRoutine(|_: &mut dyn CallContext, _: &mut [HostValue]| -> PlResult<HostValue> {
            Err(PlFault::NoDataFound)
        })),
    );
    let err = Invoker::new()
        .invoke(&boom, &[], DbType::Int, &mut ctx())
        .unwrap_err();
    assert_eq!(err.to_string(), "routine fault 3: no data found");
}

#[test]
fn repeated_inputs_reuse_the_coerced_arguments() {
    let len = artifact(
        "'m'.len(string)",
        Arc::new(FnRoutine(
            |ctx: &mut dyn CallContext, args: &mut [HostValue]| -> PlResult<HostValue> {
                let HostValue::String(s) = &args[0] else {
                    return Ok(HostValue::Null);
                };
                Ok(HostValue::String(format!("{}:{}", ctx.server_name(), s.len())))
            },
        )),
    );
    let mut invoker = Invoker::new();
    let args = [Value::of(Datum::String("four".to_string()))];
    for _ in 0..3 {
        let inv = invoker
            .invoke(&len, &args, DbType::String, &mut ctx())
            .unwrap();
        assert_eq!(inv.value.datum, Datum::String("test-host:4".to_string()));
    }
    assert_eq!(invoker.cache_hits(), 2);

    invoker
        .invoke(
            &len,
            &[Value::of(Datum::String("five!".to_string()))],
            DbType::String,
            &mut ctx(),
        )
        .unwrap();
    assert_eq!(invoker.cache_hits(), 2);
}

#[test]
fn routines_reach_sql_through_the_context() {
    let count = artifact(
        "'m'.count()",
        Arc::new(FnRoutine(
            |ctx: &mut dyn CallContext, _: &mut [HostValue]| -> PlResult<HostValue> {
                let conn = ctx.connection(false)?;
                let mut stmt = conn.prepare("SELECT COUNT(*) FROM t")?;
                let mut row_count = 0i64;
                let mut n = 0i64;
                plsp_rt::sql::execute_into(stmt.as_mut(), &mut row_count, |row| {
                    if let Some(Datum::Bigint(v)) = row.first() {
                        n = *v;
                    }
                    Ok(())
                })?;
                Ok(HostValue::I64(n))
            },
        )),
    );
    let mut c = ctx();
    c.conn
        .rows("SELECT COUNT(*) FROM t", &["n"], vec![vec![Datum::Bigint(42)]]);
    let inv = Invoker::new()
        .invoke(&count, &[], DbType::Int, &mut c)
        .unwrap();
    assert_eq!(inv.value, Value::new(Datum::Int(42), DbType::Int));
    assert_eq!(c.conn.executed.len(), 1);
}
