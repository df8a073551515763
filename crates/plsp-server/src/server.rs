//! Listeners, worker threads, and shutdown.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use plsp_contracts::PLSP_SERVER_STATUS_SCHEMA_VERSION;
use plsp_wire::Charset;

use crate::config::ServerConfig;
use crate::handler::{Worker, WorkerStatus};
use crate::registry::{Registry, RegistryStats};

const ACCEPT_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Default)]
pub struct ServerStats {
    active_workers: AtomicU64,
    connections: AtomicU64,
    requests: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub active_workers: u64,
    pub connections: u64,
    pub requests: u64,
    pub errors: u64,
}

impl ServerStats {
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            active_workers: self.active_workers.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Everything workers share. Per-request state never lives here.
pub struct ServerState {
    pub name: String,
    pub port: i32,
    pub charset: Charset,
    pub max_frame_bytes: usize,
    pub startup_options: Vec<String>,
    pub registry: Arc<Registry>,
    pub stats: ServerStats,
    shutdown: AtomicBool,
    next_worker: AtomicU64,
    workers: Mutex<BTreeMap<u64, Arc<AtomicU8>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub schema_version: &'static str,
    pub name: String,
    pub port: i32,
    pub shutting_down: bool,
    pub stats: StatsSnapshot,
    pub registry: RegistryStats,
    pub workers: BTreeMap<u64, WorkerStatus>,
}

impl ServerState {
    pub fn new(config: &ServerConfig, port: i32, registry: Arc<Registry>) -> Self {
        Self {
            name: config.name.clone(),
            port,
            charset: config.charset,
            max_frame_bytes: config.max_frame_bytes,
            startup_options: config.startup_options.clone(),
            registry,
            stats: ServerStats::default(),
            shutdown: AtomicBool::new(false),
            next_worker: AtomicU64::new(1),
            workers: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn next_worker_id(&self) -> u64 {
        self.next_worker.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn register_worker(&self, id: u64) -> Arc<AtomicU8> {
        let status = Arc::new(AtomicU8::new(WorkerStatus::Idle as u8));
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, status.clone());
        self.stats.active_workers.fetch_add(1, Ordering::Relaxed);
        self.stats.connections.fetch_add(1, Ordering::Relaxed);
        status
    }

    pub(crate) fn unregister_worker(&self, id: u64) {
        let removed = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if removed.is_some() {
            self.stats.active_workers.fetch_sub(1, Ordering::Relaxed);
        }
    }

    pub fn status_report(&self) -> StatusReport {
        let workers = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, status)| (*id, WorkerStatus::load(status)))
            .collect();
        StatusReport {
            schema_version: PLSP_SERVER_STATUS_SCHEMA_VERSION,
            name: self.name.clone(),
            port: self.port,
            shutting_down: self.is_shutting_down(),
            stats: self.stats.snapshot(),
            registry: self.registry.stats(),
            workers,
        }
    }
}

#[derive(Clone)]
pub struct ShutdownHandle(Arc<ServerState>);

impl ShutdownHandle {
    /// Stops the accept loops. Workers finish their current request and exit
    /// when their peer next sends something or disconnects.
    pub fn shutdown(&self) {
        self.0.request_shutdown();
    }

    pub fn is_shutdown(&self) -> bool {
        self.0.is_shutting_down()
    }
}

pub struct Server {
    state: Arc<ServerState>,
    tcp: TcpListener,
    local_addr: SocketAddr,
    #[cfg(unix)]
    unix: Option<(std::os::unix::net::UnixListener, PathBuf)>,
}

impl Server {
    pub fn bind(config: &ServerConfig, registry: Arc<Registry>) -> Result<Self> {
        config.validate()?;
        let addrs: Vec<SocketAddr> = config
            .tcp_addr
            .to_socket_addrs()
            .with_context(|| format!("resolve tcp_addr: {}", config.tcp_addr))?
            .collect();
        let tcp = TcpListener::bind(addrs.as_slice())
            .with_context(|| format!("bind tcp: {}", config.tcp_addr))?;
        let local_addr = tcp.local_addr().context("tcp local_addr")?;

        #[cfg(unix)]
        let unix = match &config.unix_socket {
            Some(path) => Some((bind_unix(path)?, path.clone())),
            None => None,
        };
        #[cfg(not(unix))]
        if config.unix_socket.is_some() {
            anyhow::bail!("unix_socket is not supported on this platform");
        }

        let state = Arc::new(ServerState::new(
            config,
            i32::from(local_addr.port()),
            registry,
        ));
        info!(name = %state.name, addr = %local_addr, "listening");
        Ok(Self {
            state,
            tcp,
            local_addr,
            #[cfg(unix)]
            unix,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> Arc<ServerState> {
        self.state.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.state.clone())
    }

    /// Runs the accept loops until shutdown is requested. Each transport
    /// gets its own named thread; this call blocks until both return.
    pub fn run(self) -> Result<()> {
        let Server {
            state,
            tcp,
            #[cfg(unix)]
            unix,
            ..
        } = self;

        tcp.set_nonblocking(true).context("tcp set_nonblocking")?;
        let mut loops = Vec::new();

        let tcp_state = state.clone();
        loops.push(
            thread::Builder::new()
                .name("plsp-accept-tcp".to_string())
                .spawn(move || {
                    accept_loop(&tcp_state, || {
                        let (stream, peer) = tcp.accept()?;
                        stream.set_nonblocking(false)?;
                        stream.set_nodelay(true)?;
                        tracing::debug!(%peer, "accepted tcp connection");
                        Ok(stream)
                    })
                })
                .context("spawn tcp accept loop")?,
        );

        #[cfg(unix)]
        let unix_path = match unix {
            Some((listener, path)) => {
                listener.set_nonblocking(true).context("unix set_nonblocking")?;
                let unix_state = state.clone();
                loops.push(
                    thread::Builder::new()
                        .name("plsp-accept-unix".to_string())
                        .spawn(move || {
                            accept_loop(&unix_state, || {
                                let (stream, _) = listener.accept()?;
                                stream.set_nonblocking(false)?;
                                Ok(stream)
                            })
                        })
                        .context("spawn unix accept loop")?,
                );
                Some(path)
            }
            None => None,
        };

        for handle in loops {
            if handle.join().is_err() {
                warn!("accept loop panicked");
            }
        }

        #[cfg(unix)]
        if let Some(path) = unix_path {
            let _ = std::fs::remove_file(&path);
        }
        info!(name = %state.name, "server stopped");
        Ok(())
    }
}

#[cfg(unix)]
fn bind_unix(path: &std::path::Path) -> Result<std::os::unix::net::UnixListener> {
    use std::os::unix::fs::FileTypeExt;

    if let Ok(meta) = std::fs::symlink_metadata(path) {
        if !meta.file_type().is_socket() {
            anyhow::bail!("unix_socket path exists and is not a socket: {}", path.display());
        }
        std::fs::remove_file(path)
            .with_context(|| format!("remove stale socket: {}", path.display()))?;
    }
    std::os::unix::net::UnixListener::bind(path)
        .with_context(|| format!("bind unix socket: {}", path.display()))
}

fn accept_loop<S>(state: &Arc<ServerState>, mut accept: impl FnMut() -> io::Result<S>)
where
    S: Read + Write + Send + 'static,
{
    while !state.is_shutting_down() {
        match accept() {
            Ok(stream) => {
                if let Err(e) = spawn_worker(state, stream) {
                    warn!(error = %e, "spawn worker failed");
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                warn!(error = %e, "accept failed");
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

/// One thread per connection, no admission limit.
pub fn spawn_worker<S>(state: &Arc<ServerState>, stream: S) -> io::Result<()>
where
    S: Read + Write + Send + 'static,
{
    let id = state.next_worker_id();
    let worker = Worker::new(id, stream, state.clone());
    thread::Builder::new()
        .name(format!("plsp-worker-{id}"))
        .spawn(move || worker.run())?;
    Ok(())
}
