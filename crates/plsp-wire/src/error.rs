use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("read past end of buffer: need {need} bytes at offset {offset}, buffer holds {len}")]
    Truncated {
        offset: usize,
        need: usize,
        len: usize,
    },

    #[error("unknown db type tag {0}")]
    UnknownDbType(i32),

    #[error("unknown opcode 0x{0:02X}")]
    UnknownOpcode(u32),

    #[error("unknown parameter mode {0}")]
    UnknownMode(i32),

    #[error("payload is not valid {0} text")]
    InvalidText(&'static str),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("{what} of {len} exceeds the i32 length prefix")]
    TooLong { what: &'static str, len: usize },
}

impl WireError {
    /// Reading past the supplied buffer desynchronizes the peer; nothing after
    /// it on the same connection can be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WireError::Truncated { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("type mismatch: cannot convert {from} to {to}")]
pub struct TypeMismatch {
    pub from: &'static str,
    pub to: &'static str,
}

impl TypeMismatch {
    pub fn new(from: &'static str, to: &'static str) -> Self {
        Self { from, to }
    }
}
