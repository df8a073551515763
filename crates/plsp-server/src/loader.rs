//! Artifact scopes and the descriptor-driven loader that builds them.
//!
//! A scope is immutable once built. The registry swaps whole scopes; nothing
//! edits one in place.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use plsp_contracts::PLSP_ARTIFACT_SCHEMA_VERSION;
use plsp_rt::routine::Routine;
use plsp_wire::HostType;
use plspc::ArtifactDescriptor;

use crate::signature::{parse_host_type, Signature};

pub const DESCRIPTOR_SUFFIX: &str = ".artifact.json";

/// A loadable routine bound to the signature the engine calls it under.
pub struct Artifact {
    pub signature: Signature,
    pub key: String,
    pub returns: Option<HostType>,
    /// Symbol the routine was bound through.
    pub entry: String,
    pub routine: Arc<dyn Routine>,
}

impl Artifact {
    pub fn new(
        signature: Signature,
        returns: Option<HostType>,
        entry: impl Into<String>,
        routine: Arc<dyn Routine>,
    ) -> Self {
        Self {
            key: signature.key(),
            signature,
            returns,
            entry: entry.into(),
            routine,
        }
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("key", &self.key)
            .field("returns", &self.returns)
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct ArtifactScope {
    generation: u64,
    artifacts: HashMap<String, Arc<Artifact>>,
    digest: String,
}

impl ArtifactScope {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            ..Self::default()
        }
    }

    pub fn insert(&mut self, artifact: Artifact) -> Result<()> {
        if let Some(prev) = self.artifacts.get(&artifact.key) {
            anyhow::bail!(
                "duplicate artifact for {}: entries {:?} and {:?}",
                artifact.key,
                prev.entry,
                artifact.entry
            );
        }
        self.artifacts.insert(artifact.key.clone(), Arc::new(artifact));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<Arc<Artifact>> {
        self.artifacts.get(key).cloned()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// sha256 over the descriptor bytes the scope was built from.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.artifacts.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Turns an artifact directory into a scope. The registry treats this as an
/// opaque collaborator and only decides when to call it.
pub trait ArtifactLoader: Send + Sync {
    fn load_scope(&self, dir: &Path, generation: u64) -> Result<ArtifactScope>;
}

/// Host-registered callables that descriptors bind to by entry name.
#[derive(Default, Clone)]
pub struct SymbolTable {
    entries: HashMap<String, Arc<dyn Routine>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, routine: Arc<dyn Routine>) -> &mut Self {
        self.entries.insert(name.into(), routine);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Routine>> {
        self.entries.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reads `*.artifact.json` descriptors from a directory tree and from
/// `*.zip` bundles inside it, binding each through a [`SymbolTable`].
pub struct DescriptorLoader {
    symbols: Arc<SymbolTable>,
}

impl DescriptorLoader {
    pub fn new(symbols: Arc<SymbolTable>) -> Self {
        Self { symbols }
    }

    fn bind(&self, bytes: &[u8], origin: &str) -> Result<Artifact> {
        let desc: ArtifactDescriptor = serde_json::from_slice(bytes)
            .with_context(|| format!("parse artifact descriptor: {origin}"))?;
        if desc.schema_version != PLSP_ARTIFACT_SCHEMA_VERSION {
            anyhow::bail!(
                "{origin}: schema_version mismatch: expected {} got {:?}",
                PLSP_ARTIFACT_SCHEMA_VERSION,
                desc.schema_version
            );
        }
        let signature = Signature::parse(&desc.signature()).with_context(|| origin.to_string())?;
        let returns = desc
            .returns
            .as_deref()
            .map(parse_host_type)
            .transpose()
            .with_context(|| format!("{origin}: return type"))?;
        let routine = self
            .symbols
            .get(&desc.entry)
            .with_context(|| format!("{origin}: unknown entry symbol {:?}", desc.entry))?;
        Ok(Artifact::new(signature, returns, desc.entry, routine))
    }

    fn load_bundle(
        &self,
        path: &Path,
        scope: &mut ArtifactScope,
        hasher: &mut Sha256,
    ) -> Result<()> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("open bundle: {}", path.display()))?;
        let mut archive = zip::ZipArchive::new(file)
            .with_context(|| format!("read bundle: {}", path.display()))?;
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .with_context(|| format!("read bundle entry {i}: {}", path.display()))?;
            if !entry.is_file() || !entry.name().ends_with(DESCRIPTOR_SUFFIX) {
                continue;
            }
            let origin = format!("{}!{}", path.display(), entry.name());
            let mut bytes = Vec::new();
            entry
                .read_to_end(&mut bytes)
                .with_context(|| format!("read: {origin}"))?;
            hasher.update(&bytes);
            scope.insert(self.bind(&bytes, &origin)?)?;
        }
        Ok(())
    }
}

impl ArtifactLoader for DescriptorLoader {
    fn load_scope(&self, dir: &Path, generation: u64) -> Result<ArtifactScope> {
        let mut scope = ArtifactScope::new(generation);
        let mut hasher = Sha256::new();

        for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.with_context(|| format!("walk: {}", dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let name = entry.file_name().to_string_lossy();
            if name.ends_with(DESCRIPTOR_SUFFIX) {
                let bytes =
                    std::fs::read(path).with_context(|| format!("read: {}", path.display()))?;
                hasher.update(&bytes);
                scope.insert(self.bind(&bytes, &path.display().to_string())?)?;
            } else if path.extension().is_some_and(|ext| ext == "zip") {
                self.load_bundle(path, &mut scope, &mut hasher)?;
            }
        }

        scope.digest = hex(&hasher.finalize());
        tracing::debug!(
            dir = %dir.display(),
            generation,
            artifacts = scope.len(),
            "artifact scope loaded"
        );
        Ok(scope)
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
