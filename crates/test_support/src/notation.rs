//! Indented tree notation for fixtures.
//!
//! ```text
//! root
//!   view ["red"]
//!     #text ["hello"]
//!   list
//! ```
//!
//! Each line is a type (`#text` for raw text) optionally followed by a JSON
//! array of values. Children are indented two spaces deeper than their
//! parent. Blank lines and lines starting with `//` are ignored.

use serde_json::Value as JsonValue;
use std::fmt;

pub const TEXT_TYPE: &str = "#text";
const INDENT_STEP: usize = 2;

#[derive(Clone, Debug, PartialEq)]
pub struct TreeSpec {
    /// `None` for raw text.
    pub ty: Option<String>,
    pub values: Option<Vec<JsonValue>>,
    pub children: Vec<TreeSpec>,
}

impl TreeSpec {
    pub fn new(ty: Option<String>) -> Self {
        Self {
            ty,
            values: None,
            children: Vec::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        self.ty.as_deref().unwrap_or(TEXT_TYPE)
    }

    /// Renders back into the notation, one line per node.
    pub fn render(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.render_into(0, &mut out);
        out
    }

    fn render_into(&self, depth: usize, out: &mut Vec<String>) {
        let mut line = " ".repeat(depth * INDENT_STEP);
        line.push_str(self.type_name());
        if let Some(values) = self.values.as_ref().filter(|values| !values.is_empty()) {
            line.push(' ');
            line.push_str(&JsonValue::Array(values.clone()).to_string());
        }
        out.push(line);
        for child in &self.children {
            child.render_into(depth + 1, out);
        }
    }

    pub fn count(&self) -> usize {
        1 + self.children.iter().map(TreeSpec::count).sum::<usize>()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotationError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for NotationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for NotationError {}

pub fn parse_tree(src: &str) -> Result<TreeSpec, NotationError> {
    let mut stack: Vec<TreeSpec> = Vec::new();
    let mut saw_root = false;

    for (idx, raw) in src.lines().enumerate() {
        let line_no = idx + 1;
        let err = |message: String| NotationError {
            line: line_no,
            message,
        };
        let trimmed = raw.trim_end();
        let content = trimmed.trim_start();
        if content.is_empty() || content.starts_with("//") {
            continue;
        }
        let indent = trimmed.len() - content.len();
        if indent % INDENT_STEP != 0 {
            return Err(err(format!("indent of {indent} is not a multiple of {INDENT_STEP}")));
        }
        let depth = indent / INDENT_STEP;

        while stack.len() > depth {
            let node = stack.pop().ok_or_else(|| err("empty stack".to_string()))?;
            match stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => return Err(err("more than one root".to_string())),
            }
        }
        if stack.len() != depth {
            return Err(err(format!("depth {depth} skips a level")));
        }
        if depth == 0 && saw_root {
            return Err(err("more than one root".to_string()));
        }
        saw_root = true;
        stack.push(parse_node(content).map_err(err)?);
    }

    while stack.len() > 1 {
        if let Some(node) = stack.pop()
            && let Some(parent) = stack.last_mut()
        {
            parent.children.push(node);
        }
    }
    stack.pop().ok_or(NotationError {
        line: 0,
        message: "no root".to_string(),
    })
}

fn parse_node(content: &str) -> Result<TreeSpec, String> {
    let (name, rest) = match content.find(|c: char| c.is_whitespace()) {
        Some(at) => (&content[..at], content[at..].trim()),
        None => (content, ""),
    };
    let ty = (name != TEXT_TYPE).then(|| name.to_string());
    let mut node = TreeSpec::new(ty);
    if !rest.is_empty() {
        let values: Vec<JsonValue> = serde_json::from_str(rest)
            .map_err(|e| format!("values of '{name}' are not a JSON array: {e}"))?;
        node.values = Some(values);
    }
    Ok(node)
}
