//! Command-line entry point shared by the `plsp-server` binary and hosts
//! that link their own compiled routines.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use plsp_wire::Charset;

use crate::logging::{self, LogFormat};
use crate::{
    builtins, DescriptorLoader, Registry, RegistryConfig, Server, ServerConfig, StatusReport,
    SymbolTable,
};

#[derive(Parser)]
#[command(name = "plsp-server")]
#[command(about = "Routine host serving invoke requests from the database engine.", long_about = None)]
struct Cli {
    /// JSON config file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    name: Option<String>,

    #[arg(long, value_name = "HOST:PORT")]
    tcp_addr: Option<String>,

    #[arg(long)]
    unix_socket: Option<PathBuf>,

    #[arg(long)]
    dynamic_dir: Option<PathBuf>,

    #[arg(long)]
    static_dir: Option<PathBuf>,

    #[arg(long)]
    charset: Option<String>,

    #[arg(long, value_name = "BYTES")]
    max_frame_bytes: Option<usize>,

    #[arg(long)]
    log_level: Option<String>,

    #[arg(long)]
    log_format: Option<String>,

    /// Repeatable; echoed by the status reply. Values may start with `-`.
    #[arg(long = "startup-option", allow_hyphen_values = true)]
    startup_options: Vec<String>,

    #[arg(long)]
    reload_lock: bool,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,
}

/// Parses the command line and serves until shutdown. `symbols` holds the
/// compiled routines of the embedding binary; descriptors bind to them by
/// entry name. Builtins are added here.
pub fn run(symbols: SymbolTable) -> std::process::ExitCode {
    match try_run(symbols) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

fn try_run(symbols: SymbolTable) -> Result<std::process::ExitCode> {
    let cli = Cli::parse();
    let config = effective_config(&cli)?;

    if cli.print_config {
        print_json(&config)?;
        return Ok(std::process::ExitCode::SUCCESS);
    }

    let level = logging::resolve_level(cli.log_level.as_deref(), &config.log_level);
    logging::init(&level, config.log_format)?;

    let report = serve(&config, symbols)?;
    print_json(&report)?;
    Ok(std::process::ExitCode::SUCCESS)
}

/// Registry over `config`'s artifact directories, with descriptors bound
/// through `symbols` plus the builtins.
pub fn open_registry(config: &ServerConfig, mut symbols: SymbolTable) -> Result<Registry> {
    builtins::register_symbols(&mut symbols);
    let loader = Arc::new(DescriptorLoader::new(Arc::new(symbols)));
    Registry::open(
        &RegistryConfig {
            dynamic_dir: config.dynamic_dir.clone(),
            static_dir: config.static_dir.clone(),
            reload_lock: config.reload_lock,
        },
        loader,
        builtins::scope()?,
    )
}

/// Binds, serves until a terminate-server request, and returns the final
/// status.
pub fn serve(config: &ServerConfig, symbols: SymbolTable) -> Result<StatusReport> {
    let registry = open_registry(config, symbols)?;
    let server = Server::bind(config, Arc::new(registry))?;
    let state = server.state();
    server.run()?;
    Ok(state.status_report())
}

fn effective_config(cli: &Cli) -> Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    config.apply_env();

    if let Some(v) = &cli.name {
        config.name = v.clone();
    }
    if let Some(v) = &cli.tcp_addr {
        config.tcp_addr = v.clone();
    }
    if let Some(v) = &cli.unix_socket {
        config.unix_socket = Some(v.clone());
    }
    if let Some(v) = &cli.dynamic_dir {
        config.dynamic_dir = Some(v.clone());
    }
    if let Some(v) = &cli.static_dir {
        config.static_dir = Some(v.clone());
    }
    if let Some(v) = &cli.charset {
        config.charset =
            Charset::parse(v).with_context(|| format!("unsupported charset: {v:?}"))?;
    }
    if let Some(v) = cli.max_frame_bytes {
        config.max_frame_bytes = v;
    }
    if let Some(v) = &cli.log_level {
        config.log_level = v.clone();
    }
    if let Some(v) = &cli.log_format {
        config.log_format = LogFormat::parse(v);
    }
    if !cli.startup_options.is_empty() {
        config.startup_options = cli.startup_options.clone();
    }
    if cli.reload_lock {
        config.reload_lock = true;
    }

    config.validate()?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
