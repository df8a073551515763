use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use plsp_contracts::PLSP_ARTIFACT_SCHEMA_VERSION;
use plsp_wire::HostType;

use crate::compile::{CompileOutput, CompilerError};
use crate::types::TypeTable;

/// What the server's loader reads to bind a compiled routine: the signature
/// the engine will call it under and the symbol of the host-registered
/// implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub schema_version: String,
    /// Qualifier of the call signature; the artifact name for compiled units.
    pub name: String,
    pub routine: String,
    /// Host type names (`i32?`, `string[]`, ...) in declaration order.
    pub params: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
    pub entry: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub decl: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub digest: String,
}

impl ArtifactDescriptor {
    /// Signature text the engine sends in an invoke request.
    pub fn signature(&self) -> String {
        format!("'{}'.{}({})", self.name, self.routine, self.params.join(","))
    }
}

pub fn descriptor_for(output: &CompileOutput) -> Result<ArtifactDescriptor, CompilerError> {
    let routine = &output.unit.routine;
    let mut types = TypeTable::new();

    let mut params = Vec::with_capacity(routine.params.len());
    for p in &routine.params {
        let id = types.resolve(&p.type_name)?;
        let mut host = HostType::boxed(types.get(id).host);
        if p.mode.is_out() {
            host = host.array_of(1);
        }
        params.push(host.to_string());
    }
    let returns = match &routine.ret_type {
        Some(t) => {
            let id = types.resolve(t)?;
            Some(HostType::boxed(types.get(id).host).to_string())
        }
        None => None,
    };

    Ok(ArtifactDescriptor {
        schema_version: PLSP_ARTIFACT_SCHEMA_VERSION.to_string(),
        name: output.artifact_name.clone(),
        routine: routine.name.trim().to_ascii_uppercase(),
        params,
        returns,
        entry: output.artifact_name.clone(),
        decl: output.decl_text.clone(),
        digest: sha256_hex(output.source.as_bytes()),
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    let digest = h.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
