//! Per-connection request dispatch.
//!
//! A worker reads one frame at a time into its own buffer and answers it on
//! the same stream. Invocations may call back into the engine: the routine
//! asks its [`CallContext`] for a connection, and each SQL operation on it
//! becomes a NESTED_CALLBACK frame the peer answers before the outer RESULT
//! is written.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use plsp_contracts::HEADER_SIZE;
use plsp_rt::routine::CallContext;
use plsp_rt::sql::{Execution, PreparedStatement, ResultRows, SqlConnection};
use plsp_rt::{PlFault, PlResult};
use plsp_wire::frame::{read_frame, write_frame};
use plsp_wire::{
    Charset, ColumnInfo, Datum, ErrorReply, FrameHeader, InvokeRequest, NestedCall, NestedReply,
    Opcode, Packer, ResultReply, StatusReply, Unpacker, Value, WireError,
};

use crate::invoke::{InvokeError, Invoker};
use crate::server::ServerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum WorkerStatus {
    Idle = 0,
    Parse = 1,
    Invoke = 2,
    Call = 3,
    Result = 4,
    Destroy = 5,
    Error = 6,
    End = 7,
}

impl WorkerStatus {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerStatus::Idle,
            1 => WorkerStatus::Parse,
            2 => WorkerStatus::Invoke,
            3 => WorkerStatus::Call,
            4 => WorkerStatus::Result,
            5 => WorkerStatus::Destroy,
            6 => WorkerStatus::Error,
            _ => WorkerStatus::End,
        }
    }

    pub fn load(cell: &AtomicU8) -> Self {
        Self::from_u8(cell.load(Ordering::Acquire))
    }

    fn store(self, cell: &AtomicU8) {
        cell.store(self as u8, Ordering::Release);
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("transport: {0}")]
    Transport(#[from] io::Error),

    #[error("protocol: {0}")]
    Protocol(WireError),

    #[error("encode: {0}")]
    Encode(WireError),
}

enum Control {
    Continue,
    Stop,
}

/// Engine-side connection state that outlives a single invocation.
#[derive(Default)]
struct NestedSession {
    open: bool,
    autonomous: bool,
    /// Set when the stream failed mid-callback; the worker closes the
    /// connection once the routine returns.
    lost: Option<io::Error>,
}

pub struct Worker<S> {
    id: u64,
    stream: S,
    state: Arc<ServerState>,
    status: Arc<AtomicU8>,
    buf: Vec<u8>,
    packer: Packer,
    invoker: Invoker,
    nested: NestedSession,
}

impl<S> Drop for Worker<S> {
    fn drop(&mut self) {
        self.state.unregister_worker(self.id);
    }
}

impl<S: Read + Write> Worker<S> {
    pub fn new(id: u64, stream: S, state: Arc<ServerState>) -> Self {
        let status = state.register_worker(id);
        Self {
            id,
            stream,
            packer: Packer::with_charset(state.charset),
            state,
            status,
            buf: Vec::new(),
            invoker: Invoker::new(),
            nested: NestedSession::default(),
        }
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus::load(&self.status)
    }

    /// Serves frames until the peer disconnects, the transport fails, or a
    /// terminate opcode arrives.
    pub fn run(mut self) {
        debug!(worker = self.id, "worker started");
        loop {
            self.set_status(WorkerStatus::Idle);
            match read_frame(&mut self.stream, &mut self.buf, self.state.max_frame_bytes) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(worker = self.id, "peer closed connection");
                    break;
                }
                Err(e) => {
                    warn!(worker = self.id, error = %e, "read failed; closing connection");
                    break;
                }
            }
            match self.dispatch() {
                Ok(Control::Continue) => {}
                Ok(Control::Stop) => break,
                Err(HandlerError::Transport(e)) => {
                    warn!(worker = self.id, error = %e, "write failed; closing connection");
                    break;
                }
                Err(HandlerError::Protocol(e)) => {
                    error!(worker = self.id, error = %e, "unreadable frame; closing connection");
                    break;
                }
                Err(HandlerError::Encode(e)) => {
                    error!(worker = self.id, error = %e, "reply cannot be encoded; closing connection");
                    break;
                }
            }
            if self.state.is_shutting_down() {
                break;
            }
        }
        self.set_status(WorkerStatus::End);
        debug!(worker = self.id, "worker stopped");
    }

    fn set_status(&self, status: WorkerStatus) {
        status.store(&self.status);
    }

    fn send_frame(
        stream: &mut S,
        packer: &mut Packer,
        header: FrameHeader,
        body: impl FnOnce(&mut Packer) -> Result<(), WireError>,
    ) -> Result<(), HandlerError> {
        packer.clear();
        header.pack(packer);
        body(packer).map_err(HandlerError::Encode)?;
        write_frame(stream, packer.as_slice())?;
        Ok(())
    }

    fn dispatch(&mut self) -> Result<Control, HandlerError> {
        let header =
            FrameHeader::unpack(&mut Unpacker::new(&self.buf)).map_err(HandlerError::Protocol)?;
        self.state.stats.record_request();

        let op = match header.opcode() {
            Ok(op) => op,
            Err(e) => return self.fail(&header, e.to_string()),
        };
        debug!(
            worker = self.id,
            session = header.session_id,
            request_id = header.request_id,
            opcode = op.as_str(),
            "dispatch"
        );

        match op {
            Opcode::Invoke => self.handle_invoke(&header),
            Opcode::Destroy => self.handle_destroy(&header),
            Opcode::Ping => {
                let name = &self.state.name;
                Self::send_frame(
                    &mut self.stream,
                    &mut self.packer,
                    header.reply(Opcode::Ping),
                    |p| {
                        p.pack_cstring(name);
                        Ok(())
                    },
                )?;
                Ok(Control::Continue)
            }
            Opcode::Status => {
                let reply = StatusReply {
                    port: self.state.port,
                    name: self.state.name.clone(),
                    options: self.state.startup_options.clone(),
                };
                Self::send_frame(
                    &mut self.stream,
                    &mut self.packer,
                    header.reply(Opcode::Status),
                    |p| reply.pack(p),
                )?;
                Ok(Control::Continue)
            }
            Opcode::TerminateWorker => {
                info!(worker = self.id, "terminate-worker requested");
                Self::send_frame(
                    &mut self.stream,
                    &mut self.packer,
                    header.reply(Opcode::End),
                    |_| Ok(()),
                )?;
                Ok(Control::Stop)
            }
            Opcode::TerminateServer => {
                warn!(worker = self.id, "terminate-server requested");
                self.state.request_shutdown();
                Self::send_frame(
                    &mut self.stream,
                    &mut self.packer,
                    header.reply(Opcode::End),
                    |_| Ok(()),
                )?;
                Ok(Control::Stop)
            }
            Opcode::Result | Opcode::Error | Opcode::NestedCallback | Opcode::End => self.fail(
                &header,
                format!("unexpected {} frame outside a nested call", op.as_str()),
            ),
        }
    }

    fn handle_invoke(&mut self, header: &FrameHeader) -> Result<Control, HandlerError> {
        self.set_status(WorkerStatus::Parse);
        let charset = self.state.charset;
        let parsed =
            InvokeRequest::unpack(&mut Unpacker::with_charset(&self.buf[HEADER_SIZE..], charset));
        let req = match parsed {
            Ok(req) => req,
            Err(e) if e.is_fatal() => return Err(HandlerError::Protocol(e)),
            Err(e) => return self.fail(header, e.to_string()),
        };

        let artifact = match self.state.registry.lookup(&req.signature) {
            Ok(artifact) => artifact,
            Err(e) => return self.fail(header, InvokeError::Load(e.to_string()).to_string()),
        };

        self.set_status(WorkerStatus::Invoke);
        let outcome = {
            let mut ctx = WorkerContext {
                link: NestedLink {
                    stream: &mut self.stream,
                    buf: &mut self.buf,
                    packer: &mut self.packer,
                    session: &mut self.nested,
                    status: &self.status,
                    header: *header,
                    max_frame: self.state.max_frame_bytes,
                    charset,
                },
                server_name: &self.state.name,
            };
            self.invoker
                .invoke(&artifact, &req.args, req.return_type, &mut ctx)
        };
        if let Some(e) = self.nested.lost.take() {
            return Err(HandlerError::Transport(e));
        }

        match outcome {
            Ok(inv) => {
                self.set_status(WorkerStatus::Result);
                let reply = ResultReply {
                    value: inv.value,
                    out_params: inv.out_params,
                };
                match Self::send_frame(
                    &mut self.stream,
                    &mut self.packer,
                    header.reply(Opcode::Result),
                    |p| reply.pack(p),
                ) {
                    Ok(()) => Ok(Control::Continue),
                    Err(HandlerError::Encode(e)) => {
                        self.fail(header, format!("result cannot be encoded: {e}"))
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => self.fail(header, e.to_string()),
        }
    }

    /// Releases the nested connection when one is open and acknowledges with
    /// DESTROY; otherwise ends the session with END.
    fn handle_destroy(&mut self, header: &FrameHeader) -> Result<Control, HandlerError> {
        self.set_status(WorkerStatus::Destroy);
        let reply = if self.nested.open {
            self.close_nested(header);
            if let Some(e) = self.nested.lost.take() {
                return Err(HandlerError::Transport(e));
            }
            debug!(worker = self.id, "nested connection released");
            Opcode::Destroy
        } else {
            Opcode::End
        };
        Self::send_frame(&mut self.stream, &mut self.packer, header.reply(reply), |_| Ok(()))?;
        Ok(Control::Continue)
    }

    fn close_nested(&mut self, header: &FrameHeader) {
        if !self.nested.open {
            return;
        }
        let mut link = NestedLink {
            stream: &mut self.stream,
            buf: &mut self.buf,
            packer: &mut self.packer,
            session: &mut self.nested,
            status: &self.status,
            header: *header,
            max_frame: self.state.max_frame_bytes,
            charset: self.state.charset,
        };
        if let Err(fault) = link.exchange(&NestedCall::Close) {
            warn!(worker = self.id, error = %fault, "closing nested connection failed");
        }
        self.nested.open = false;
    }

    /// Logs the failure, drops any nested connection, and answers with an
    /// error frame. The connection stays up unless the transport failed.
    fn fail(&mut self, header: &FrameHeader, message: String) -> Result<Control, HandlerError> {
        error!(
            worker = self.id,
            session = header.session_id,
            request_id = header.request_id,
            opcode = header.opcode,
            "{message}"
        );
        self.state.stats.record_error();
        self.close_nested(header);
        if let Some(e) = self.nested.lost.take() {
            return Err(HandlerError::Transport(e));
        }
        self.set_status(WorkerStatus::Error);
        let reply = ErrorReply { message };
        Self::send_frame(
            &mut self.stream,
            &mut self.packer,
            header.reply(Opcode::Error),
            |p| reply.pack(p),
        )?;
        Ok(Control::Continue)
    }
}

struct NestedLink<'a, S> {
    stream: &'a mut S,
    buf: &'a mut Vec<u8>,
    packer: &'a mut Packer,
    session: &'a mut NestedSession,
    status: &'a AtomicU8,
    header: FrameHeader,
    max_frame: usize,
    charset: Charset,
}

impl<S: Read + Write> NestedLink<'_, S> {
    /// One nested round trip. The worker shows CALL while waiting on the
    /// peer.
    fn exchange(&mut self, call: &NestedCall) -> PlResult<NestedReply> {
        if self.session.lost.is_some() {
            return Err(PlFault::SqlError("nested connection lost".to_string()));
        }
        WorkerStatus::Call.store(self.status);
        let result = self.round_trip(call);
        WorkerStatus::Invoke.store(self.status);
        match result {
            Ok(reply) => reply,
            Err(e) => {
                let message = format!("nested call failed: {e}");
                self.session.lost = Some(e);
                Err(PlFault::SqlError(message))
            }
        }
    }

    fn round_trip(&mut self, call: &NestedCall) -> io::Result<PlResult<NestedReply>> {
        self.packer.clear();
        self.header.reply(Opcode::NestedCallback).pack(self.packer);
        if let Err(e) = call.pack(self.packer) {
            return Ok(Err(PlFault::SqlError(format!(
                "nested call cannot be encoded: {e}"
            ))));
        }
        write_frame(&mut *self.stream, self.packer.as_slice())?;

        if !read_frame(&mut *self.stream, self.buf, self.max_frame)? {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed during nested call",
            ));
        }
        let mut u = Unpacker::with_charset(self.buf.as_slice(), self.charset);
        let header = FrameHeader::unpack(&mut u).map_err(invalid_data)?;
        match header.opcode().map_err(invalid_data)? {
            Opcode::Result => Ok(Ok(NestedReply::unpack(&mut u).map_err(invalid_data)?)),
            Opcode::Error => {
                let reply = ErrorReply::unpack(&mut u).map_err(invalid_data)?;
                Ok(Err(PlFault::SqlError(reply.message)))
            }
            other => Err(invalid_data(format!(
                "unexpected {} frame during nested call",
                other.as_str()
            ))),
        }
    }

    fn expect_ack(&mut self, call: NestedCall) -> PlResult<()> {
        match self.exchange(&call)? {
            NestedReply::Ack => Ok(()),
            other => Err(unexpected_reply(&call, &other)),
        }
    }
}

fn invalid_data(e: impl fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}

fn unexpected_reply(call: &NestedCall, reply: &NestedReply) -> PlFault {
    PlFault::ProgramError(format!(
        "nested call {} answered with {reply:?}",
        call.code()
    ))
}

impl<S: Read + Write> SqlConnection for NestedLink<'_, S> {
    fn prepare(&mut self, sql: &str) -> PlResult<Box<dyn PreparedStatement + '_>> {
        let call = NestedCall::Prepare {
            sql: sql.to_string(),
        };
        match self.exchange(&call)? {
            NestedReply::Prepared { handle, columns } => Ok(Box::new(NestedStatement {
                link: self,
                handle,
                column_count: columns.len(),
                binds: Vec::new(),
            })),
            other => Err(unexpected_reply(&call, &other)),
        }
    }

    fn commit(&mut self) -> PlResult<()> {
        self.expect_ack(NestedCall::Commit)
    }

    fn rollback(&mut self) -> PlResult<()> {
        self.expect_ack(NestedCall::Rollback)
    }
}

struct NestedStatement<'l, 'a, S> {
    link: &'l mut NestedLink<'a, S>,
    handle: i32,
    column_count: usize,
    binds: Vec<Datum>,
}

impl<S: Read + Write> PreparedStatement for NestedStatement<'_, '_, S> {
    fn column_count(&self) -> usize {
        self.column_count
    }

    fn bind(&mut self, index: usize, value: Datum) -> PlResult<()> {
        if index == 0 {
            return Err(PlFault::SqlError("bind index is 1-based".to_string()));
        }
        if self.binds.len() < index {
            self.binds.resize(index, Datum::Null);
        }
        self.binds[index - 1] = value;
        Ok(())
    }

    fn execute(&mut self) -> PlResult<Execution> {
        let call = NestedCall::Execute {
            handle: self.handle,
            binds: self.binds.iter().cloned().map(Value::of).collect(),
        };
        match self.link.exchange(&call)? {
            NestedReply::Updated(n) => Ok(Execution::Updated(n)),
            NestedReply::Rows { columns, rows } => Ok(Execution::Rows(Box::new(FetchedRows {
                columns,
                rows: rows
                    .into_iter()
                    .map(|row| row.into_iter().map(|v| v.datum).collect())
                    .collect(),
            }))),
            other => Err(unexpected_reply(&call, &other)),
        }
    }
}

/// Rows the peer sent in one reply.
struct FetchedRows {
    columns: Vec<ColumnInfo>,
    rows: VecDeque<Vec<Datum>>,
}

impl ResultRows for FetchedRows {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn next_row(&mut self) -> PlResult<Option<Vec<Datum>>> {
        Ok(self.rows.pop_front())
    }
}

struct WorkerContext<'a, S> {
    link: NestedLink<'a, S>,
    server_name: &'a str,
}

impl<S: Read + Write> CallContext for WorkerContext<'_, S> {
    fn connection(&mut self, autonomous: bool) -> PlResult<&mut dyn SqlConnection> {
        if !self.link.session.open || self.link.session.autonomous != autonomous {
            self.link.expect_ack(NestedCall::Open { autonomous })?;
            self.link.session.open = true;
            self.link.session.autonomous = autonomous;
        }
        Ok(&mut self.link)
    }

    fn server_name(&self) -> &str {
        self.server_name
    }
}
