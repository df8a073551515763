//! Runtime support for compiled routines.
//!
//! Generated routine source only talks to the engine through the traits in
//! [`sql`] and to the host through [`routine`]; everything else here is the
//! fault model and small helpers the generated code calls inline.

pub mod builtin;
pub mod convert;
pub mod cursor;
pub mod fault;
pub mod memory;
pub mod ops;
pub mod routine;
pub mod sql;

pub use fault::{PlFault, PlResult};

pub mod prelude {
    pub use crate::builtin::{call_external, invoke_builtin};
    pub use crate::convert::{
        arg_in, arg_inout, check_precision, check_str_length, conv, expect_args, from_datum,
        lit, put_out, ret_host, to_datum, PlType,
    };
    pub use crate::cursor::{next_record, open_rows, Cursor, Record};
    pub use crate::fault::{
        case_not_found, check_for_loop_step, check_not_null, concat_chunks, Flow, PlFault,
        PlResult,
    };
    pub use crate::ops::*;
    pub use crate::routine::{CallContext, FnRoutine, Routine};
    pub use crate::sql::{
        ban_into_without_columns, bind_all, execute_into, execute_plain, row_column, Execution,
        PreparedStatement, ResultRows, SqlConnection,
    };
    pub use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
    pub use plsp_wire::{CursorHandle, Datum, Decimal, HostValue, Oid};
}
