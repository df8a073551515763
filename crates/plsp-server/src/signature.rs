//! Textual routine signatures: `['qualifier'.]name(type, ...)`.
//!
//! Parameter types use the host spelling (`i32`, `i32?`, `string[]`,
//! `decimal[][]`). Anything after the closing parenthesis, such as a
//! ` return T` tail, does not take part in resolution.

use std::fmt;

use thiserror::Error;

use plsp_wire::host::MAX_ARRAY_DIMS;
use plsp_wire::{HostType, ScalarKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("malformed signature {text:?}: {reason}")]
    Malformed { text: String, reason: &'static str },

    #[error("unknown parameter type {0:?}")]
    UnknownType(String),

    #[error("parameter type {0:?} has more than two array dimensions")]
    TooManyDimensions(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub qualifier: String,
    pub name: String,
    pub params: Vec<HostType>,
}

impl Signature {
    pub fn new(qualifier: impl Into<String>, name: impl Into<String>, params: Vec<HostType>) -> Self {
        Self {
            qualifier: qualifier.into(),
            name: name.into(),
            params,
        }
    }

    pub fn parse(text: &str) -> Result<Self, SignatureError> {
        let malformed = |reason| SignatureError::Malformed {
            text: text.to_string(),
            reason,
        };
        let s = text.trim();

        let (qualifier, rest) = if let Some(quoted) = s.strip_prefix('\'') {
            let end = quoted.find('\'').ok_or_else(|| malformed("unterminated qualifier"))?;
            let rest = quoted[end + 1..]
                .trim_start()
                .strip_prefix('.')
                .ok_or_else(|| malformed("expected '.' after quoted qualifier"))?;
            (quoted[..end].to_string(), rest.trim_start())
        } else {
            let open = s.find('(').ok_or_else(|| malformed("missing '('"))?;
            match s[..open].rfind('.') {
                Some(dot) => (s[..dot].trim().to_string(), &s[dot + 1..]),
                None => (String::new(), s),
            }
        };

        let open = rest.find('(').ok_or_else(|| malformed("missing '('"))?;
        let name = rest[..open].trim();
        if name.is_empty() {
            return Err(malformed("empty routine name"));
        }
        let close = rest.rfind(')').ok_or_else(|| malformed("missing ')'"))?;
        if close < open {
            return Err(malformed("')' before '('"));
        }
        let tail = rest[close + 1..].trim();
        if !tail.is_empty() && !tail.to_ascii_lowercase().starts_with("return") {
            return Err(malformed("unexpected text after ')'"));
        }

        let list = rest[open + 1..close].trim();
        let params = if list.is_empty() {
            Vec::new()
        } else {
            list.split(',')
                .map(|t| parse_host_type(t.trim()))
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(Self {
            qualifier,
            name: name.to_string(),
            params,
        })
    }

    /// Canonical registry key: unquoted qualifier, name, canonical type
    /// spellings without whitespace.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.qualifier.is_empty() {
            write!(f, "'{}'.", self.qualifier)?;
        }
        write!(f, "{}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{p}")?;
        }
        f.write_str(")")
    }
}

/// Parses one host type spelling: a scalar name, an optional `?` boxing
/// suffix, then up to two `[]` suffixes.
pub fn parse_host_type(text: &str) -> Result<HostType, SignatureError> {
    let mut base = text.trim();
    let mut dims = 0u8;
    while let Some(inner) = base.strip_suffix("[]") {
        dims = dims.saturating_add(1);
        base = inner.trim_end();
    }
    if dims > MAX_ARRAY_DIMS {
        return Err(SignatureError::TooManyDimensions(text.to_string()));
    }
    let (base, boxed) = match base.strip_suffix('?') {
        Some(b) => (b, true),
        None => (base, false),
    };
    let kind = ScalarKind::parse(base).ok_or_else(|| SignatureError::UnknownType(text.to_string()))?;
    let ty = if boxed {
        HostType::boxed(kind)
    } else {
        HostType::scalar(kind)
    };
    Ok(ty.array_of(dims))
}
