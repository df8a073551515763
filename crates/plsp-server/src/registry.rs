//! Signature → artifact resolution over three scopes.
//!
//! The dynamic scope is rebuilt whenever its directory's modification time
//! differs from the one it was built at; the static scope is loaded once; the
//! builtin scope holds host-registered routines. Lookups try them in that
//! order. A dynamic scope that fails to load is skipped; its error is
//! reported only when no other scope has the signature.
//!
//! Without `reload_lock`, two workers that observe a stale dynamic scope at
//! the same time both rebuild it and the last one to finish is kept. Both
//! builds read the same directory, so either result is valid.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::SystemTime;

use anyhow::Context;
use serde::Serialize;
use thiserror::Error;

use crate::loader::{Artifact, ArtifactLoader, ArtifactScope};
use crate::signature::{Signature, SignatureError};

#[derive(Debug, Error)]
pub enum LookupError {
    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("no artifact for signature {0}")]
    NotFound(String),

    #[error("load artifact scope {dir}: {message}")]
    Load { dir: String, message: String },
}

#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    pub dynamic_dir: Option<PathBuf>,
    pub static_dir: Option<PathBuf>,
    pub reload_lock: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub lookups: u64,
    pub rebuilds: u64,
    pub generation: u64,
    pub dynamic_artifacts: usize,
    pub static_artifacts: usize,
    pub builtin_artifacts: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub dynamic_digest: String,
}

type Stamp = Option<SystemTime>;

struct DynamicScope {
    dir: PathBuf,
    cached: RwLock<Option<(Stamp, Arc<ArtifactScope>)>>,
    stale: AtomicBool,
}

impl DynamicScope {
    fn current(&self, stamp: Stamp) -> Option<Arc<ArtifactScope>> {
        if self.stale.load(Ordering::Acquire) {
            return None;
        }
        let cached = self.cached.read().unwrap_or_else(PoisonError::into_inner);
        match cached.as_ref() {
            Some((at, scope)) if *at == stamp => Some(scope.clone()),
            _ => None,
        }
    }

    fn snapshot(&self) -> Option<Arc<ArtifactScope>> {
        let cached = self.cached.read().unwrap_or_else(PoisonError::into_inner);
        cached.as_ref().map(|(_, scope)| scope.clone())
    }
}

pub struct Registry {
    loader: Arc<dyn ArtifactLoader>,
    dynamic: Option<DynamicScope>,
    static_scope: Arc<ArtifactScope>,
    builtin: Arc<ArtifactScope>,
    reload_lock: Option<Mutex<()>>,
    generation: AtomicU64,
    lookups: AtomicU64,
    rebuilds: AtomicU64,
}

impl Registry {
    /// Loads the static scope now; the dynamic scope is built on first lookup.
    pub fn open(
        config: &RegistryConfig,
        loader: Arc<dyn ArtifactLoader>,
        builtin: ArtifactScope,
    ) -> anyhow::Result<Self> {
        let static_scope = match &config.static_dir {
            Some(dir) => loader
                .load_scope(dir, 0)
                .with_context(|| format!("load static artifacts: {}", dir.display()))?,
            None => ArtifactScope::new(0),
        };
        tracing::info!(
            static_artifacts = static_scope.len(),
            builtin_artifacts = builtin.len(),
            dynamic_dir = ?config.dynamic_dir,
            "artifact registry opened"
        );
        Ok(Self {
            loader,
            dynamic: config.dynamic_dir.as_ref().map(|dir| DynamicScope {
                dir: dir.clone(),
                cached: RwLock::new(None),
                stale: AtomicBool::new(false),
            }),
            static_scope: Arc::new(static_scope),
            builtin: Arc::new(builtin),
            reload_lock: config.reload_lock.then(|| Mutex::new(())),
            generation: AtomicU64::new(0),
            lookups: AtomicU64::new(0),
            rebuilds: AtomicU64::new(0),
        })
    }

    pub fn lookup(&self, signature: &str) -> Result<Arc<Artifact>, LookupError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let key = Signature::parse(signature)?.key();

        let load_error = match self.dynamic_scope() {
            Ok(Some(scope)) => match scope.get(&key) {
                Some(found) => return Ok(found),
                None => None,
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "dynamic scope unavailable; trying static and builtin");
                Some(e)
            }
        };
        if let Some(found) = self.static_scope.get(&key).or_else(|| self.builtin.get(&key)) {
            return Ok(found);
        }
        Err(load_error.unwrap_or(LookupError::NotFound(key)))
    }

    /// Forces the next lookup to rebuild the dynamic scope.
    pub fn invalidate(&self) {
        if let Some(dynamic) = &self.dynamic {
            dynamic.stale.store(true, Ordering::Release);
        }
    }

    pub fn stats(&self) -> RegistryStats {
        let dynamic = self.dynamic.as_ref().and_then(DynamicScope::snapshot);
        RegistryStats {
            lookups: self.lookups.load(Ordering::Relaxed),
            rebuilds: self.rebuilds.load(Ordering::Relaxed),
            generation: self.generation.load(Ordering::Relaxed),
            dynamic_artifacts: dynamic.as_ref().map_or(0, |s| s.len()),
            static_artifacts: self.static_scope.len(),
            builtin_artifacts: self.builtin.len(),
            dynamic_digest: dynamic.map(|s| s.digest().to_string()).unwrap_or_default(),
        }
    }

    fn dynamic_scope(&self) -> Result<Option<Arc<ArtifactScope>>, LookupError> {
        let Some(dynamic) = &self.dynamic else {
            return Ok(None);
        };
        let stamp = dir_stamp(&dynamic.dir)?;
        if let Some(scope) = dynamic.current(stamp) {
            return Ok(Some(scope));
        }

        let guard = self
            .reload_lock
            .as_ref()
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner));
        if guard.is_some() {
            if let Some(scope) = dynamic.current(stamp) {
                return Ok(Some(scope));
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let scope = match stamp {
            Some(_) => self
                .loader
                .load_scope(&dynamic.dir, generation)
                .map_err(|e| LookupError::Load {
                    dir: dynamic.dir.display().to_string(),
                    message: format!("{e:#}"),
                })?,
            None => ArtifactScope::new(generation),
        };
        let scope = Arc::new(scope);
        self.rebuilds.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            dir = %dynamic.dir.display(),
            generation,
            artifacts = scope.len(),
            "dynamic artifact scope rebuilt"
        );

        let mut cached = dynamic.cached.write().unwrap_or_else(PoisonError::into_inner);
        *cached = Some((stamp, scope.clone()));
        // Cleared only once a rebuild succeeded so a failed one is retried.
        dynamic.stale.store(false, Ordering::Release);
        Ok(Some(scope))
    }
}

/// Modification time of the directory; `None` when it does not exist, which
/// resolves to an empty scope.
fn dir_stamp(dir: &Path) -> Result<Stamp, LookupError> {
    match std::fs::metadata(dir).and_then(|m| m.modified()) {
        Ok(t) => Ok(Some(t)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LookupError::Load {
            dir: dir.display().to_string(),
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use plsp_rt::routine::{CallContext, FnRoutine};
    use plsp_rt::PlResult;
    use plsp_wire::HostValue;

    use super::*;

    struct CountingLoader {
        calls: AtomicUsize,
    }

    impl ArtifactLoader for CountingLoader {
        fn load_scope(&self, _dir: &Path, generation: u64) -> anyhow::Result<ArtifactScope> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ArtifactScope::new(generation))
        }
    }

    /// Serves one artifact until `broken` is set, then fails every load.
    struct FlakyLoader {
        broken: AtomicBool,
    }

    impl ArtifactLoader for FlakyLoader {
        fn load_scope(&self, _dir: &Path, generation: u64) -> anyhow::Result<ArtifactScope> {
            if self.broken.load(Ordering::SeqCst) {
                anyhow::bail!("descriptor unreadable");
            }
            let mut scope = ArtifactScope::new(generation);
            scope.insert(artifact("'x'.f()"))?;
            Ok(scope)
        }
    }

    fn artifact(signature: &str) -> Artifact {
        Artifact::new(
            Signature::parse(signature).unwrap(),
            None,
            "noop",
            Arc::new(FnRoutine(
                |_: &mut dyn CallContext, _: &mut [HostValue]| -> PlResult<HostValue> {
                    Ok(HostValue::Null)
                },
            )),
        )
    }

    fn flaky_registry(dir: &Path, builtin: ArtifactScope) -> (Arc<FlakyLoader>, Registry) {
        let loader = Arc::new(FlakyLoader {
            broken: AtomicBool::new(false),
        });
        let registry = Registry::open(
            &RegistryConfig {
                dynamic_dir: Some(dir.to_path_buf()),
                ..RegistryConfig::default()
            },
            loader.clone(),
            builtin,
        )
        .unwrap();
        (loader, registry)
    }

    #[test]
    fn missing_dynamic_dir_is_an_empty_scope() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
        });
        let registry = Registry::open(
            &RegistryConfig {
                dynamic_dir: Some(dir.path().join("absent")),
                ..RegistryConfig::default()
            },
            loader.clone(),
            ArtifactScope::new(0),
        )
        .unwrap();

        let err = registry.lookup("'x'.f()").unwrap_err();
        assert!(matches!(err, LookupError::NotFound(_)));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(registry.stats().rebuilds, 1);

        registry.lookup("'x'.f()").unwrap_err();
        assert_eq!(registry.stats().rebuilds, 1);
        assert_eq!(registry.stats().lookups, 2);
    }

    #[test]
    fn invalidate_forces_a_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
        });
        let registry = Registry::open(
            &RegistryConfig {
                dynamic_dir: Some(dir.path().to_path_buf()),
                ..RegistryConfig::default()
            },
            loader.clone(),
            ArtifactScope::new(0),
        )
        .unwrap();

        registry.lookup("'x'.f()").unwrap_err();
        registry.lookup("'x'.f()").unwrap_err();
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);

        registry.invalidate();
        registry.lookup("'x'.f()").unwrap_err();
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
        assert_eq!(registry.stats().generation, 2);
    }

    #[test]
    fn failed_rebuild_does_not_serve_the_invalidated_scope() {
        let dir = tempfile::tempdir().unwrap();
        let (loader, registry) = flaky_registry(dir.path(), ArtifactScope::new(0));
        assert!(registry.lookup("'x'.f()").is_ok());

        registry.invalidate();
        loader.broken.store(true, Ordering::SeqCst);
        for _ in 0..2 {
            let err = registry.lookup("'x'.f()").unwrap_err();
            assert!(matches!(err, LookupError::Load { .. }), "{err:?}");
        }

        loader.broken.store(false, Ordering::SeqCst);
        assert!(registry.lookup("'x'.f()").is_ok());
        assert_eq!(registry.stats().rebuilds, 2);
    }

    #[test]
    fn broken_dynamic_scope_still_resolves_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let mut builtin = ArtifactScope::new(0);
        builtin.insert(artifact("'plsp'.version()")).unwrap();
        let (loader, registry) = flaky_registry(dir.path(), builtin);
        loader.broken.store(true, Ordering::SeqCst);

        assert_eq!(registry.lookup("'plsp'.version()").unwrap().entry, "noop");
        let err = registry.lookup("'x'.f()").unwrap_err();
        assert!(matches!(err, LookupError::Load { .. }), "{err:?}");
        let err = registry.lookup("'x'.g()").unwrap_err();
        assert!(matches!(err, LookupError::Load { .. }), "{err:?}");
    }

    #[test]
    fn malformed_signature_is_reported_before_any_load() {
        let registry = Registry::open(
            &RegistryConfig::default(),
            Arc::new(CountingLoader {
                calls: AtomicUsize::new(0),
            }),
            ArtifactScope::new(0),
        )
        .unwrap();
        assert!(matches!(
            registry.lookup("no parens"),
            Err(LookupError::Signature(_))
        ));
    }
}
