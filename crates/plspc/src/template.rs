//! Fixed code templates with named holes.
//!
//! A small hole `%'NAME'%` takes single-line text in place. A big hole
//! `%'+NAME'%` takes any number of lines: the first lands at the hole, the
//! rest are indented to the hole's column, and whatever follows the hole on
//! the template line is appended to the last inserted line. A template line
//! holding only big holes that expand to nothing is dropped.

use std::collections::HashMap;

use serde::Serialize;

use crate::compile::{CompileErrorKind, CompilerError};

/// Maps a range of generated lines back to the source routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CodeRangeMarker {
    /// First generated line, inclusive.
    pub start_line: usize,
    /// Last generated line, exclusive.
    pub end_line: usize,
    pub source_line: u32,
    pub source_column: u32,
}

impl CodeRangeMarker {
    fn shifted(self, by: usize) -> Self {
        Self {
            start_line: self.start_line + by,
            end_line: self.end_line + by,
            ..self
        }
    }
}

/// Rendered lines plus the markers recorded while rendering them, with line
/// numbers relative to the fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub lines: Vec<String>,
    pub markers: Vec<CodeRangeMarker>,
}

impl Fragment {
    pub fn text(s: &str) -> Self {
        Self {
            lines: s.split('\n').map(str::to_string).collect(),
            markers: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn append(&mut self, other: Fragment) {
        let base = self.lines.len();
        self.markers
            .extend(other.markers.into_iter().map(|m| m.shifted(base)));
        self.lines.extend(other.lines);
    }

    pub fn into_source(self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

pub enum Hole {
    Fragment(Fragment),
    Template(CodeTemplate),
    List(CodeTemplateList),
}

impl Hole {
    fn render(self) -> Result<Fragment, CompilerError> {
        match self {
            Hole::Fragment(f) => Ok(f),
            Hole::Template(t) => t.render(),
            Hole::List(l) => l.render(),
        }
    }
}

impl From<String> for Hole {
    fn from(s: String) -> Self {
        Hole::Fragment(Fragment::text(&s))
    }
}

impl From<&str> for Hole {
    fn from(s: &str) -> Self {
        Hole::Fragment(Fragment::text(s))
    }
}

impl From<Fragment> for Hole {
    fn from(f: Fragment) -> Self {
        Hole::Fragment(f)
    }
}

impl From<CodeTemplate> for Hole {
    fn from(t: CodeTemplate) -> Self {
        Hole::Template(t)
    }
}

impl From<CodeTemplateList> for Hole {
    fn from(l: CodeTemplateList) -> Self {
        Hole::List(l)
    }
}

pub struct CodeTemplate {
    text: &'static str,
    origin: Option<(u32, u32)>,
    holes: Vec<(&'static str, Hole)>,
}

impl CodeTemplate {
    pub fn new(text: &'static str) -> Self {
        Self {
            text,
            origin: None,
            holes: Vec::new(),
        }
    }

    /// Records a marker covering everything this template renders. Line 0
    /// means the node carries no position.
    pub fn at(mut self, line: u32, column: u32) -> Self {
        if line > 0 {
            self.origin = Some((line, column));
        }
        self
    }

    pub fn fill(mut self, name: &'static str, hole: impl Into<Hole>) -> Self {
        self.holes.push((name, hole.into()));
        self
    }

    pub fn render(self) -> Result<Fragment, CompilerError> {
        let mut filled: HashMap<&'static str, Fragment> = HashMap::new();
        for (name, hole) in self.holes {
            if filled.insert(name, hole.render()?).is_some() {
                return Err(internal(format!("template hole {name} filled twice")));
            }
        }

        let mut out = Fragment::default();
        for tline in self.text.split('\n') {
            let mut acc: Vec<String> = vec![String::new()];
            let mut pending: Vec<CodeRangeMarker> = Vec::new();
            let mut has_big = false;
            let mut rest = tline;
            while let Some(start) = rest.find("%'") {
                let cur = acc.len() - 1;
                acc[cur].push_str(&rest[..start]);
                let after = &rest[start + 2..];
                let Some(end) = after.find("'%") else {
                    return Err(internal(format!("unterminated hole in {tline:?}")));
                };
                let raw = &after[..end];
                rest = &after[end + 2..];
                let (big, name) = match raw.strip_prefix('+') {
                    Some(name) => (true, name),
                    None => (false, raw),
                };
                let frag = filled
                    .get(name)
                    .ok_or_else(|| internal(format!("template hole {name} not filled")))?;
                if big {
                    has_big = true;
                    let indent = " ".repeat(acc[cur].chars().count());
                    pending.extend(frag.markers.iter().map(|m| m.shifted(cur)));
                    for (i, l) in frag.lines.iter().enumerate() {
                        if i == 0 {
                            acc[cur].push_str(l);
                        } else if l.is_empty() {
                            acc.push(String::new());
                        } else {
                            acc.push(format!("{indent}{l}"));
                        }
                    }
                } else {
                    match frag.lines.as_slice() {
                        [] => {}
                        [one] => acc[cur].push_str(one),
                        _ => {
                            return Err(internal(format!(
                                "small hole {name} received multi-line text"
                            )))
                        }
                    }
                }
            }
            let cur = acc.len() - 1;
            acc[cur].push_str(rest);
            if has_big && acc.len() == 1 && acc[0].trim().is_empty() {
                continue;
            }
            let base = out.lines.len();
            out.markers
                .extend(pending.into_iter().map(|m| m.shifted(base)));
            out.lines.extend(acc);
        }

        if let Some((line, column)) = self.origin {
            out.markers.insert(
                0,
                CodeRangeMarker {
                    start_line: 0,
                    end_line: out.lines.len(),
                    source_line: line,
                    source_column: column,
                },
            );
        }
        Ok(out)
    }
}

/// Sequence of rendered items; a delimiter, when set, is appended to the last
/// line of every item but the final one.
#[derive(Default)]
pub struct CodeTemplateList {
    items: Vec<Hole>,
    delimiter: Option<&'static str>,
}

impl CodeTemplateList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(delimiter: &'static str) -> Self {
        Self {
            items: Vec::new(),
            delimiter: Some(delimiter),
        }
    }

    pub fn push(&mut self, item: impl Into<Hole>) {
        self.items.push(item.into());
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn render(self) -> Result<Fragment, CompilerError> {
        let mut out = Fragment::default();
        let n = self.items.len();
        for (i, item) in self.items.into_iter().enumerate() {
            let mut frag = item.render()?;
            if let (Some(d), true) = (self.delimiter, i + 1 < n) {
                match frag.lines.last_mut() {
                    Some(last) => last.push_str(d),
                    None => frag.lines.push(d.to_string()),
                }
            }
            out.append(frag);
        }
        Ok(out)
    }
}

fn internal(message: String) -> CompilerError {
    CompilerError::new(CompileErrorKind::Internal, message)
}
