//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for the wire protocol spoken
//! between the database engine and the routine host, and for the schema/version
//! strings that appear in machine-readable I/O.

pub const PLSP_UNIT_SCHEMA_VERSION: &str = "plsp.unit@0.1.0";
pub const PLSP_ARTIFACT_SCHEMA_VERSION: &str = "plsp.artifact@0.1.0";
pub const PLSPC_REPORT_SCHEMA_VERSION: &str = "plspc.report@0.1.0";
pub const PLSP_SERVER_STATUS_SCHEMA_VERSION: &str = "plsp-server.status@0.1.0";
pub const PLSP_SERVER_CONFIG_SCHEMA_VERSION: &str = "plsp-server.config@0.1.0";

/// Size of the fixed frame header: session id (8), opcode (4), request id (4).
pub const HEADER_SIZE: usize = 16;

/// Length byte announcing the long (4-byte length) string form.
pub const STRING_SENTINEL: u8 = 0xFF;

/// Error-count marker written at the head of every error frame body.
pub const ERROR_MARKER: i32 = 1;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

pub mod opcode {
    pub const INVOKE: u32 = 0x01;
    pub const RESULT: u32 = 0x02;
    pub const ERROR: u32 = 0x04;
    pub const NESTED_CALLBACK: u32 = 0x08;
    pub const DESTROY: u32 = 0x10;
    pub const END: u32 = 0x20;
    pub const PING: u32 = 0xDE;
    pub const STATUS: u32 = 0xEE;
    pub const TERMINATE_WORKER: u32 = 0xFE;
    pub const TERMINATE_SERVER: u32 = 0xFF;
}
