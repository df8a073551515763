use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use plsp_contracts::{DEFAULT_MAX_FRAME_BYTES, HEADER_SIZE, PLSP_SERVER_CONFIG_SCHEMA_VERSION};
use plsp_wire::Charset;

use crate::logging::LogFormat;

pub const DYNAMIC_DIR_ENV: &str = "PLSP_DYNAMIC_DIR";
pub const STATIC_DIR_ENV: &str = "PLSP_STATIC_DIR";
pub const RELOAD_LOCK_ENV: &str = "PLSP_RELOAD_LOCK";
pub const MAX_FRAME_ENV: &str = "PLSP_MAX_FRAME_BYTES";

/// Server settings. Built from defaults, then a JSON file, then the
/// environment, then command-line flags; later sources win.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub schema_version: String,
    /// Reported by ping and status.
    pub name: String,
    pub tcp_addr: String,
    pub unix_socket: Option<PathBuf>,
    /// Hot-reloaded artifact directory.
    pub dynamic_dir: Option<PathBuf>,
    /// Loaded once at startup.
    pub static_dir: Option<PathBuf>,
    pub charset: Charset,
    pub max_frame_bytes: usize,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Echoed verbatim by the status reply.
    pub startup_options: Vec<String>,
    /// Serializes dynamic-scope rebuilds instead of letting racing workers
    /// rebuild side by side.
    pub reload_lock: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            schema_version: PLSP_SERVER_CONFIG_SCHEMA_VERSION.to_string(),
            name: "plsp-server".to_string(),
            tcp_addr: "127.0.0.1:0".to_string(),
            unix_socket: None,
            dynamic_dir: None,
            static_dir: None,
            charset: Charset::Utf8,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            startup_options: Vec::new(),
            reload_lock: false,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read config: {}", path.display()))?;
        let cfg: ServerConfig = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse config JSON: {}", path.display()))?;
        if cfg.schema_version != PLSP_SERVER_CONFIG_SCHEMA_VERSION {
            anyhow::bail!(
                "config schema_version mismatch: expected {} got {:?}",
                PLSP_SERVER_CONFIG_SCHEMA_VERSION,
                cfg.schema_version
            );
        }
        Ok(cfg)
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    pub fn apply_env_with(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = env_path(&var, DYNAMIC_DIR_ENV) {
            self.dynamic_dir = Some(dir);
        }
        if let Some(dir) = env_path(&var, STATIC_DIR_ENV) {
            self.static_dir = Some(dir);
        }
        self.reload_lock = env_bool(&var, RELOAD_LOCK_ENV, self.reload_lock);
        self.max_frame_bytes = env_usize_nonzero(&var, MAX_FRAME_ENV, self.max_frame_bytes);
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_frame_bytes < HEADER_SIZE {
            anyhow::bail!(
                "max_frame_bytes must be at least {HEADER_SIZE}, got {}",
                self.max_frame_bytes
            );
        }
        if self.name.trim().is_empty() {
            anyhow::bail!("server name must not be empty");
        }
        Ok(())
    }
}

fn env_path(var: &impl Fn(&str) -> Option<String>, name: &str) -> Option<PathBuf> {
    var(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn env_bool(var: &impl Fn(&str) -> Option<String>, name: &str, default: bool) -> bool {
    var(name)
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_usize_nonzero(var: &impl Fn(&str) -> Option<String>, name: &str, default: usize) -> usize {
    var(name)
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|&v| v != 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        std::fs::write(
            &path,
            format!(
                r#"{{"schema_version":"{PLSP_SERVER_CONFIG_SCHEMA_VERSION}","name":"db1","reload_lock":true}}"#
            ),
        )
        .unwrap();
        let cfg = ServerConfig::load(&path).unwrap();
        assert_eq!(cfg.name, "db1");
        assert!(cfg.reload_lock);
        assert_eq!(cfg.tcp_addr, "127.0.0.1:0");
        assert_eq!(cfg.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
    }

    #[test]
    fn unknown_fields_and_wrong_schema_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        std::fs::write(&path, r#"{"port": 1}"#).unwrap();
        assert!(ServerConfig::load(&path).is_err());
        std::fs::write(&path, r#"{"schema_version":"plsp-server.config@9"}"#).unwrap();
        let err = ServerConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("schema_version mismatch"));
    }

    #[test]
    fn env_overrides_directories_and_flags() {
        let vars: HashMap<&str, &str> = [
            (DYNAMIC_DIR_ENV, "/srv/dyn"),
            (STATIC_DIR_ENV, "  "),
            (RELOAD_LOCK_ENV, "yes"),
            (MAX_FRAME_ENV, "0"),
        ]
        .into_iter()
        .collect();
        let mut cfg = ServerConfig::default();
        cfg.apply_env_with(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.dynamic_dir.as_deref(), Some(Path::new("/srv/dyn")));
        assert_eq!(cfg.static_dir, None);
        assert!(cfg.reload_lock);
        assert_eq!(cfg.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
    }

    #[test]
    fn charset_and_frame_limit_are_checked() {
        let cfg: ServerConfig =
            serde_json::from_str(r#"{"charset":"latin1","log_format":"json"}"#).unwrap();
        assert_eq!(cfg.charset, Charset::Latin1);
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert!(serde_json::from_str::<ServerConfig>(r#"{"charset":"ebcdic"}"#).is_err());

        let cfg = ServerConfig {
            max_frame_bytes: 8,
            ..ServerConfig::default()
        };
        assert!(cfg.validate().is_err());
        assert!(ServerConfig::default().validate().is_ok());
    }
}
