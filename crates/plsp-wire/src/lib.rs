//! Wire format shared by the routine host and the database engine.
//!
//! Everything the peer reads is laid out with native struct alignment measured
//! from the start of the frame payload, so every scalar write pads first.

pub mod codec;
pub mod db_type;
pub mod error;
pub mod frame;
pub mod host;
pub mod marshal;
pub mod message;
pub mod value;

pub use codec::{Charset, Packer, Unpacker};
pub use db_type::DbType;
pub use error::{TypeMismatch, WireError};
pub use frame::{FrameHeader, Opcode};
pub use host::{HostType, HostValue, ScalarKind};
pub use message::{ErrorReply, InvokeRequest, NestedCall, NestedReply, ResultReply, StatusReply};
pub use value::{ColumnInfo, CursorHandle, Datum, Decimal, Oid, ParamMode, Value};
