//! Routine host: resolves signatures to loaded artifacts and serves invoke
//! requests from the database engine over the framed binary protocol.

pub mod builtins;
pub mod cli;
pub mod config;
pub mod handler;
pub mod invoke;
pub mod loader;
pub mod logging;
pub mod registry;
pub mod server;
pub mod signature;

pub use config::ServerConfig;
pub use handler::{Worker, WorkerStatus};
pub use invoke::{Invocation, InvokeError, Invoker};
pub use loader::{Artifact, ArtifactLoader, ArtifactScope, DescriptorLoader, SymbolTable};
pub use registry::{LookupError, Registry, RegistryConfig};
pub use server::{Server, ServerState, ShutdownHandle, StatusReport};
pub use signature::Signature;
