use std::io::{self, Read, Write};

use plsp_contracts::{opcode, HEADER_SIZE};

use crate::codec::{Packer, Unpacker};
use crate::error::WireError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Invoke,
    Result,
    Error,
    NestedCallback,
    Destroy,
    End,
    Ping,
    Status,
    TerminateWorker,
    TerminateServer,
}

impl Opcode {
    pub fn code(self) -> u32 {
        match self {
            Opcode::Invoke => opcode::INVOKE,
            Opcode::Result => opcode::RESULT,
            Opcode::Error => opcode::ERROR,
            Opcode::NestedCallback => opcode::NESTED_CALLBACK,
            Opcode::Destroy => opcode::DESTROY,
            Opcode::End => opcode::END,
            Opcode::Ping => opcode::PING,
            Opcode::Status => opcode::STATUS,
            Opcode::TerminateWorker => opcode::TERMINATE_WORKER,
            Opcode::TerminateServer => opcode::TERMINATE_SERVER,
        }
    }

    pub fn from_code(code: u32) -> Result<Self, WireError> {
        Ok(match code {
            opcode::INVOKE => Opcode::Invoke,
            opcode::RESULT => Opcode::Result,
            opcode::ERROR => Opcode::Error,
            opcode::NESTED_CALLBACK => Opcode::NestedCallback,
            opcode::DESTROY => Opcode::Destroy,
            opcode::END => Opcode::End,
            opcode::PING => Opcode::Ping,
            opcode::STATUS => Opcode::Status,
            opcode::TERMINATE_WORKER => Opcode::TerminateWorker,
            opcode::TERMINATE_SERVER => Opcode::TerminateServer,
            other => return Err(WireError::UnknownOpcode(other)),
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Opcode::Invoke => "invoke",
            Opcode::Result => "result",
            Opcode::Error => "error",
            Opcode::NestedCallback => "nested-callback",
            Opcode::Destroy => "destroy",
            Opcode::End => "end",
            Opcode::Ping => "ping",
            Opcode::Status => "status",
            Opcode::TerminateWorker => "terminate-worker",
            Opcode::TerminateServer => "terminate-server",
        }
    }
}

/// Fixed 16-byte header at the start of every frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    pub session_id: u64,
    pub opcode: u32,
    pub request_id: u32,
}

impl FrameHeader {
    pub fn new(session_id: u64, op: Opcode, request_id: u32) -> Self {
        Self {
            session_id,
            opcode: op.code(),
            request_id,
        }
    }

    /// Header for a reply: same session and request, new opcode.
    pub fn reply(&self, op: Opcode) -> Self {
        Self::new(self.session_id, op, self.request_id)
    }

    pub fn opcode(&self) -> Result<Opcode, WireError> {
        Opcode::from_code(self.opcode)
    }

    pub fn pack(&self, p: &mut Packer) {
        p.pack_i64(self.session_id as i64);
        p.pack_u32(self.opcode);
        p.pack_u32(self.request_id);
    }

    pub fn unpack(u: &mut Unpacker<'_>) -> Result<Self, WireError> {
        if u.remaining() < HEADER_SIZE {
            return Err(WireError::Truncated {
                offset: u.position(),
                need: HEADER_SIZE,
                len: u.position() + u.remaining(),
            });
        }
        Ok(Self {
            session_id: u.unpack_i64()? as u64,
            opcode: u.unpack_u32()?,
            request_id: u.unpack_u32()?,
        })
    }
}

/// `None` when the peer closed the stream between frames.
fn read_len_prefix(reader: &mut impl Read) -> io::Result<Option<usize>> {
    let mut prefix = [0u8; 4];
    let mut filled = 0usize;
    while filled < prefix.len() {
        match reader.read(&mut prefix[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("truncated length prefix: got {filled} of 4 bytes"),
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(Some(
        usize::try_from(u32::from_be_bytes(prefix)).unwrap_or(usize::MAX),
    ))
}

/// Reads one length-delimited frame into `buf`, replacing its contents.
/// Returns `false` on a clean end of stream before the length prefix.
pub fn read_frame(reader: &mut impl Read, buf: &mut Vec<u8>, max_len: usize) -> io::Result<bool> {
    let Some(len) = read_len_prefix(reader)? else {
        return Ok(false);
    };
    if len > max_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} > {max_len}"),
        ));
    }
    if len < HEADER_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame shorter than header: {len}"),
        ));
    }
    buf.clear();
    buf.resize(len, 0);
    reader.read_exact(buf)?;
    Ok(true)
}

pub fn write_frame(writer: &mut impl Write, payload: &[u8]) -> io::Result<()> {
    let len: u32 = payload
        .len()
        .try_into()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_sixteen_bytes() {
        let mut p = Packer::new();
        FrameHeader::new(0x0102_0304_0506_0708, Opcode::Ping, 9).pack(&mut p);
        assert_eq!(p.len(), HEADER_SIZE);
        let mut u = Unpacker::new(p.as_slice());
        let h = FrameHeader::unpack(&mut u).unwrap();
        assert_eq!(h.opcode().unwrap(), Opcode::Ping);
        assert_eq!(h.request_id, 9);
        assert_eq!(h.session_id, 0x0102_0304_0506_0708);
    }

    #[test]
    fn frames_round_trip_through_a_stream() {
        let mut p = Packer::new();
        FrameHeader::new(1, Opcode::Status, 2).pack(&mut p);
        p.pack_string("hello").unwrap();
        let mut wire = Vec::new();
        write_frame(&mut wire, p.as_slice()).unwrap();
        write_frame(&mut wire, p.as_slice()).unwrap();

        let mut r = wire.as_slice();
        let mut buf = Vec::new();
        assert!(read_frame(&mut r, &mut buf, 1024).unwrap());
        assert_eq!(buf, p.as_slice());
        assert!(read_frame(&mut r, &mut buf, 1024).unwrap());
        assert!(!read_frame(&mut r, &mut buf, 1024).unwrap());
    }

    #[test]
    fn oversized_and_partial_frames_fail() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&100u32.to_be_bytes());
        wire.extend_from_slice(&[0u8; 20]);
        let mut buf = Vec::new();
        let err = read_frame(&mut wire.as_slice(), &mut buf, 64).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let err = read_frame(&mut wire.as_slice(), &mut buf, 1024).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(Opcode::from_code(0x77), Err(WireError::UnknownOpcode(0x77)));
    }

    #[test]
    fn stream_closing_inside_the_length_prefix_is_an_error() {
        let wire = [0u8, 0];
        let mut buf = Vec::new();
        let err = read_frame(&mut wire.as_slice(), &mut buf, 1024).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(err.to_string().contains("got 2 of 4"), "{err}");
    }
}
