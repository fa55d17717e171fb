use crate::serialized::SerializedSnapshot;
use serde_json::Value as JsonValue;
use std::fmt::Write;

const PREVIEW_CHARS: usize = 40;
const PREVIEW_VALUES: usize = 3;

/// Renders the first few values of an instance for a one-line preview.
pub fn first_values(values: &[JsonValue]) -> String {
    let mut out = String::new();
    for (index, value) in values.iter().take(PREVIEW_VALUES).enumerate() {
        if index > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{index}={value}");
    }
    out
}

/// Appends at most `max_chars` of `text` on one line.
fn push_clipped(out: &mut String, text: &str, max_chars: usize) {
    let mut chars = text.chars();
    for ch in chars.by_ref().take(max_chars) {
        out.push(if ch == '\n' { ' ' } else { ch });
    }
    if chars.next().is_some() {
        out.push('…');
    }
}

fn outline_line(node: &SerializedSnapshot, depth: usize) -> String {
    let mut line = "  ".repeat(depth);
    match node.ty.as_str() {
        None => {
            let text = node.value(0).and_then(JsonValue::as_str).unwrap_or_default();
            line.push('"');
            push_clipped(&mut line, text, PREVIEW_CHARS);
            let _ = write!(line, "\"  #{}", node.id);
        }
        Some(name) => {
            let _ = write!(line, "<{name} #{}>", node.id);
            let values = first_values(node.values.as_deref().unwrap_or_default());
            if !values.is_empty() {
                line.push_str("  /* ");
                push_clipped(&mut line, &values, PREVIEW_CHARS * 2);
                line.push_str(" */");
            }
        }
    }
    line
}

/// Indented outline of a serialized tree, capped at `cap` lines.
pub fn outline_from_snapshot(root: &SerializedSnapshot, cap: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![(root, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        if out.len() == cap {
            break;
        }
        out.push(outline_line(node, depth));
        stack.extend(node.children().iter().rev().map(|child| (child, depth + 1)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeType;
    use core_types::InstanceId;
    use serde_json::json;

    #[test]
    fn outline_indents_and_caps() {
        let tree = SerializedSnapshot::new(InstanceId(-1), NodeType::root()).with_children(vec![
            SerializedSnapshot::new(InstanceId(-2), "view")
                .with_values(vec![json!("red")])
                .with_children(vec![
                    SerializedSnapshot::new(InstanceId(-3), NodeType::Text)
                        .with_values(vec![json!("hello\nworld")]),
                ]),
            SerializedSnapshot::new(InstanceId(-4), "view"),
        ]);
        assert_eq!(
            outline_from_snapshot(&tree, 10),
            vec![
                "<root #-1>".to_string(),
                "  <view #-2>  /* 0=\"red\" */".to_string(),
                "    \"hello world\"  #-3".to_string(),
                "  <view #-4>".to_string(),
            ]
        );
        assert_eq!(outline_from_snapshot(&tree, 2).len(), 2);
    }

    #[test]
    fn long_text_is_clipped() {
        let text = "x".repeat(PREVIEW_CHARS + 5);
        let node = SerializedSnapshot::new(InstanceId(-7), NodeType::Text).with_values(vec![json!(text)]);
        let line = &outline_from_snapshot(&node, 1)[0];
        assert!(line.ends_with("…\"  #-7"), "{line}");
    }
}
