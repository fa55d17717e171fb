use crate::serialized::SerializedSnapshot;
use crate::value::json_equal;
use std::fmt::{self, Write};
use std::sync::OnceLock;

/// Deterministic rendering and equality rules for serialized instance trees.
/// Intended for test comparisons only.
///
/// Equivalence rules:
/// - Types must match.
/// - Values compare numerically for numbers and structurally otherwise.
/// - An absent value list equals an empty one.
/// - Child order is significant.
/// - Ids can be ignored by options, since the two runtimes allocate them
///   from different spaces.
#[derive(Clone, Copy, Debug)]
pub struct TreeSnapshotOptions {
    pub ignore_ids: bool,
}

impl Default for TreeSnapshotOptions {
    fn default() -> Self {
        Self { ignore_ids: true }
    }
}

#[derive(Debug)]
pub struct TreeSnapshot {
    lines: Vec<String>,
}

impl TreeSnapshot {
    pub fn new(root: &SerializedSnapshot, options: TreeSnapshotOptions) -> Self {
        let mut lines = Vec::new();
        walk_snapshot(root, &options, 0, &mut lines);
        Self { lines }
    }

    pub fn as_lines(&self) -> &[String] {
        &self.lines
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

impl fmt::Display for TreeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[derive(Debug)]
pub struct TreeMismatch<'a> {
    path: String,
    detail: String,
    expected: &'a SerializedSnapshot,
    actual: &'a SerializedSnapshot,
    options: TreeSnapshotOptions,
    expected_subtree: OnceLock<String>,
    actual_subtree: OnceLock<String>,
}

impl fmt::Display for TreeMismatch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expected_subtree = self
            .expected_subtree
            .get_or_init(|| TreeSnapshot::new(self.expected, self.options).render());
        let actual_subtree = self
            .actual_subtree
            .get_or_init(|| TreeSnapshot::new(self.actual, self.options).render());
        writeln!(f, "tree mismatch at {}: {}", self.path, self.detail)?;
        writeln!(f, "expected subtree:\n{expected_subtree}")?;
        writeln!(f, "actual subtree:\n{actual_subtree}")?;
        Ok(())
    }
}

impl std::error::Error for TreeMismatch<'_> {}

pub fn assert_tree_eq(
    expected: &SerializedSnapshot,
    actual: &SerializedSnapshot,
    options: TreeSnapshotOptions,
) {
    if let Err(mismatch) = compare_trees(expected, actual, options) {
        panic!("{mismatch}");
    }
}

pub fn compare_trees<'a>(
    expected: &'a SerializedSnapshot,
    actual: &'a SerializedSnapshot,
    options: TreeSnapshotOptions,
) -> Result<(), Box<TreeMismatch<'a>>> {
    let mut path = vec![expected.ty.to_string()];
    compare_nodes(expected, actual, &options, &mut path)
}

fn compare_nodes<'a>(
    expected: &'a SerializedSnapshot,
    actual: &'a SerializedSnapshot,
    options: &TreeSnapshotOptions,
    path: &mut Vec<String>,
) -> Result<(), Box<TreeMismatch<'a>>> {
    let fail = |path: &[String], detail: String| {
        Box::new(TreeMismatch {
            path: format!("/{}", path.join("/")),
            detail,
            expected,
            actual,
            options: *options,
            expected_subtree: OnceLock::new(),
            actual_subtree: OnceLock::new(),
        })
    };

    if !options.ignore_ids && expected.id != actual.id {
        return Err(fail(&path[..], format!("id ({} vs {})", expected.id, actual.id)));
    }
    if expected.ty != actual.ty {
        return Err(fail(&path[..], format!("type ({} vs {})", expected.ty, actual.ty)));
    }
    let expected_values = expected.values.as_deref().unwrap_or_default();
    let actual_values = actual.values.as_deref().unwrap_or_default();
    if expected_values.len() != actual_values.len() {
        return Err(fail(&path[..], "value count".to_string()));
    }
    for (i, (exp, act)) in expected_values.iter().zip(actual_values).enumerate() {
        if !json_equal(exp, act) {
            return Err(fail(&path[..], format!("value {i} ({exp} vs {act})")));
        }
    }

    let expected_children = expected.children();
    let actual_children = actual.children();
    if expected_children.len() != actual_children.len() {
        return Err(fail(
            &path[..],
            format!(
                "child count (expected {}, actual {})",
                expected_children.len(),
                actual_children.len()
            ),
        ));
    }
    for (idx, (exp, act)) in expected_children.iter().zip(actual_children).enumerate() {
        path.push(format!("{}[{idx}]", exp.ty));
        let result = compare_nodes(exp, act, options, path);
        path.pop();
        result?;
    }
    Ok(())
}

fn walk_snapshot(
    node: &SerializedSnapshot,
    options: &TreeSnapshotOptions,
    depth: usize,
    out: &mut Vec<String>,
) {
    const INDENT_STEP: usize = 2;
    let mut line = " ".repeat(depth * INDENT_STEP);
    line.push_str(&node.ty.to_string());
    if !options.ignore_ids {
        let _ = write!(&mut line, " #{}", node.id);
    }
    for value in node.values.as_deref().unwrap_or_default() {
        let _ = write!(&mut line, " {value}");
    }
    out.push(line);
    for child in node.children() {
        walk_snapshot(child, options, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeType;
    use core_types::InstanceId;
    use serde_json::json;

    fn tree(root: i32, text: i32, value: serde_json::Value) -> SerializedSnapshot {
        SerializedSnapshot::new(InstanceId(root), NodeType::root()).with_children(vec![
            SerializedSnapshot::new(InstanceId(text), NodeType::Text).with_values(vec![value]),
        ])
    }

    #[test]
    fn ids_are_ignored_by_default() {
        assert!(compare_trees(&tree(-1, -2, json!(1)), &tree(1, 2, json!(1.0)), Default::default()).is_ok());
        assert!(
            compare_trees(
                &tree(-1, -2, json!(1)),
                &tree(1, 2, json!(1)),
                TreeSnapshotOptions { ignore_ids: false }
            )
            .is_err()
        );
    }

    #[test]
    fn mismatch_names_the_path() {
        let expected = tree(-1, -2, json!("a"));
        let actual = tree(-1, -2, json!("b"));
        let err = compare_trees(&expected, &actual, Default::default()).expect_err("mismatch");
        let message = err.to_string();
        assert!(message.contains("/root/#text[0]"), "{message}");
        assert!(message.contains("value 0"), "{message}");
    }
}
