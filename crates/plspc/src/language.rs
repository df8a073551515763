pub const LANG_ID: &str = "plsp-proc@0.1.0";

pub mod limits {
    pub const MAX_UNIT_BYTES: usize = 8 * 1024 * 1024;

    /// Longest string literal emitted as a single Rust literal.
    pub const MAX_LITERAL_CHUNK: usize = 16 * 1024;

    pub const MAX_NESTING: usize = 256;

    pub fn max_unit_bytes() -> usize {
        match std::env::var("PLSPC_MAX_UNIT_BYTES") {
            Ok(v) => v
                .parse::<usize>()
                .ok()
                .filter(|v| *v > 0)
                .unwrap_or(MAX_UNIT_BYTES),
            Err(_) => MAX_UNIT_BYTES,
        }
    }

    pub fn max_literal_chunk() -> usize {
        match std::env::var("PLSPC_MAX_LITERAL_CHUNK") {
            Ok(v) => v
                .parse::<usize>()
                .ok()
                .filter(|v| *v > 0)
                .unwrap_or(MAX_LITERAL_CHUNK),
            Err(_) => MAX_LITERAL_CHUNK,
        }
    }
}
