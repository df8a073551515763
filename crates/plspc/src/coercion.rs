use serde::{Deserialize, Serialize};

use crate::compile::CompilerError;
use crate::types::TypeTable;

/// Conversion the semantic pass attached to an expression for the context it
/// is used in. Rendering wraps the expression's code; nested checks apply
/// innermost first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Coercion {
    #[default]
    Identity,
    /// Same runtime representation, only the static type changes (typed NULL).
    Cast { to: String },
    Conversion { from: String, to: String },
    CheckPrecision {
        precision: u32,
        scale: u32,
        #[serde(default)]
        inner: Option<Box<Coercion>>,
    },
    CheckStrLength {
        is_char: bool,
        length: u32,
        #[serde(default)]
        inner: Option<Box<Coercion>>,
    },
}

impl Coercion {
    pub fn is_identity(&self) -> bool {
        matches!(self, Coercion::Identity)
    }

    /// Target type of a typed-NULL cast, looked through nested checks.
    pub fn cast_target(&self) -> Option<&str> {
        match self {
            Coercion::Cast { to } => Some(to),
            Coercion::CheckPrecision { inner, .. } | Coercion::CheckStrLength { inner, .. } => {
                inner.as_deref().and_then(Coercion::cast_target)
            }
            _ => None,
        }
    }

    /// Type the coerced expression ends up with, when different from the
    /// expression's own.
    pub fn target(&self) -> Option<&str> {
        match self {
            Coercion::Identity => None,
            Coercion::Cast { to } | Coercion::Conversion { to, .. } => Some(to),
            Coercion::CheckPrecision { inner, .. } | Coercion::CheckStrLength { inner, .. } => {
                inner.as_deref().and_then(Coercion::target)
            }
        }
    }

    pub fn render(&self, code: String, types: &mut TypeTable) -> Result<String, CompilerError> {
        Ok(match self {
            Coercion::Identity => code,
            Coercion::Cast { to } => {
                let to = types.resolve(to)?;
                format!("Option::<{}>::from({code})", types.get(to).rust)
            }
            Coercion::Conversion { from, to } => {
                let from = types.resolve(from)?;
                let to = types.resolve(to)?;
                format!(
                    "conv::<{}, {}>({code})?",
                    types.get(from).rust,
                    types.get(to).rust
                )
            }
            Coercion::CheckPrecision {
                precision,
                scale,
                inner,
            } => {
                let code = render_inner(inner, code, types)?;
                format!("check_precision({code}, {precision}, {scale})?")
            }
            Coercion::CheckStrLength {
                is_char,
                length,
                inner,
            } => {
                let code = render_inner(inner, code, types)?;
                format!("check_str_length({code}, {length}, {is_char})?")
            }
        })
    }
}

fn render_inner(
    inner: &Option<Box<Coercion>>,
    code: String,
    types: &mut TypeTable,
) -> Result<String, CompilerError> {
    match inner {
        Some(c) => c.render(code, types),
        None => Ok(code),
    }
}
