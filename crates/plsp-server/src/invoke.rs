use thiserror::Error;

use plsp_rt::routine::CallContext;
use plsp_rt::PlFault;
use plsp_wire::marshal::{coerce_arg, out_value, to_db_type, wrap_host, MarshalError};
use plsp_wire::{DbType, HostValue, TypeMismatch, Value};

use crate::loader::Artifact;

/// Per-request failures. Each becomes an error frame; the connection stays up.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvokeError {
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("argument count mismatch: expected {expected}, got {got}")]
    ArgumentCountMismatch { expected: usize, got: usize },

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("load failed: {0}")]
    Load(String),

    #[error("routine fault {code}: {0}", code = .0.code())]
    Routine(PlFault),
}

impl From<TypeMismatch> for InvokeError {
    fn from(e: TypeMismatch) -> Self {
        InvokeError::TypeMismatch(e.to_string())
    }
}

impl From<MarshalError> for InvokeError {
    fn from(e: MarshalError) -> Self {
        match e {
            MarshalError::TypeMismatch(m) => m.into(),
            MarshalError::NotSupported(kind) => InvokeError::NotSupported(kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub value: Value,
    /// One value per OUT/INOUT argument, in argument order.
    pub out_params: Vec<Value>,
}

struct ArgCache {
    key: String,
    inputs: Vec<Value>,
    coerced: Vec<HostValue>,
}

/// Coerces, calls, and wraps. One per worker; the argument cache remembers
/// the last coercion so a repeated call with identical inputs skips it.
#[derive(Default)]
pub struct Invoker {
    cache: Option<ArgCache>,
    cache_hits: u64,
}

impl Invoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invoke(
        &mut self,
        artifact: &Artifact,
        args: &[Value],
        return_type: DbType,
        ctx: &mut dyn CallContext,
    ) -> Result<Invocation, InvokeError> {
        let expected = artifact.signature.params.len();
        if args.len() != expected {
            return Err(InvokeError::ArgumentCountMismatch {
                expected,
                got: args.len(),
            });
        }

        let mut host_args = self.coerce(artifact, args)?;
        let returned = artifact
            .routine
            .call(ctx, &mut host_args)
            .map_err(InvokeError::Routine)?;

        let value = to_db_type(return_type, &wrap_host(&returned)?)?;
        let mut out_params = Vec::new();
        for (arg, host) in args.iter().zip(&host_args) {
            if arg.mode.is_out() {
                out_params.push(out_value(host, arg.db_type, arg.mode)?);
            }
        }
        Ok(Invocation { value, out_params })
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }

    fn coerce(&mut self, artifact: &Artifact, args: &[Value]) -> Result<Vec<HostValue>, InvokeError> {
        if let Some(cache) = &self.cache {
            if cache.key == artifact.key && cache.inputs == args {
                self.cache_hits += 1;
                return Ok(cache.coerced.clone());
            }
        }

        let coerced = args
            .iter()
            .zip(&artifact.signature.params)
            .enumerate()
            .map(|(i, (value, ty))| {
                coerce_arg(value, ty)
                    .map_err(|e| InvokeError::TypeMismatch(format!("argument {}: {e}", i + 1)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.cache = Some(ArgCache {
            key: artifact.key.clone(),
            inputs: args.to_vec(),
            coerced: coerced.clone(),
        });
        Ok(coerced)
    }
}
