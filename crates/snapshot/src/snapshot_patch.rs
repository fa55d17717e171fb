//! Snapshot patch operations and their flat wire form.
//!
//! On the wire a patch is one flat JSON array: each operation is its opcode
//! followed by exactly its arguments, with no separators. Arity is fixed per
//! opcode, so the decoder knows where the next opcode starts.

use core_types::InstanceId;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::fmt;

use crate::types::NodeType;

pub mod opcode {
    pub const CREATE_ELEMENT: u64 = 0;
    pub const INSERT_BEFORE: u64 = 1;
    pub const REMOVE_CHILD: u64 = 2;
    pub const SET_ATTRIBUTE: u64 = 3;
    pub const SET_ATTRIBUTES: u64 = 4;

    /// Number of arguments following each opcode, indexed by opcode.
    pub const ARITY: [usize; 5] = [2, 3, 2, 3, 2];
}

#[derive(Clone, Debug, PartialEq)]
pub enum SnapshotOperation {
    CreateElement {
        ty: NodeType,
        id: InstanceId,
    },
    InsertBefore {
        parent: InstanceId,
        child: InstanceId,
        before: Option<InstanceId>,
    },
    RemoveChild {
        parent: InstanceId,
        child: InstanceId,
    },
    SetAttribute {
        id: InstanceId,
        index: usize,
        value: JsonValue,
    },
    SetAttributes {
        id: InstanceId,
        values: Vec<JsonValue>,
    },
}

impl SnapshotOperation {
    pub fn opcode(&self) -> u64 {
        match self {
            SnapshotOperation::CreateElement { .. } => opcode::CREATE_ELEMENT,
            SnapshotOperation::InsertBefore { .. } => opcode::INSERT_BEFORE,
            SnapshotOperation::RemoveChild { .. } => opcode::REMOVE_CHILD,
            SnapshotOperation::SetAttribute { .. } => opcode::SET_ATTRIBUTE,
            SnapshotOperation::SetAttributes { .. } => opcode::SET_ATTRIBUTES,
        }
    }

    fn write_wire(&self, out: &mut Vec<JsonValue>) {
        out.push(JsonValue::from(self.opcode()));
        match self {
            SnapshotOperation::CreateElement { ty, id } => {
                out.push(node_type_to_wire(ty));
                out.push(JsonValue::from(id.0));
            }
            SnapshotOperation::InsertBefore {
                parent,
                child,
                before,
            } => {
                out.push(JsonValue::from(parent.0));
                out.push(JsonValue::from(child.0));
                out.push(before.map_or(JsonValue::Null, |b| JsonValue::from(b.0)));
            }
            SnapshotOperation::RemoveChild { parent, child } => {
                out.push(JsonValue::from(parent.0));
                out.push(JsonValue::from(child.0));
            }
            SnapshotOperation::SetAttribute { id, index, value } => {
                out.push(JsonValue::from(id.0));
                out.push(JsonValue::from(*index));
                out.push(value.clone());
            }
            SnapshotOperation::SetAttributes { id, values } => {
                out.push(JsonValue::from(id.0));
                out.push(JsonValue::Array(values.clone()));
            }
        }
    }
}

impl fmt::Display for SnapshotOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotOperation::CreateElement { ty, id } => write!(f, "CreateElement({ty}, {id})"),
            SnapshotOperation::InsertBefore {
                parent,
                child,
                before: Some(before),
            } => write!(f, "InsertBefore({parent}, {child}, {before})"),
            SnapshotOperation::InsertBefore { parent, child, .. } => {
                write!(f, "InsertBefore({parent}, {child}, null)")
            }
            SnapshotOperation::RemoveChild { parent, child } => {
                write!(f, "RemoveChild({parent}, {child})")
            }
            SnapshotOperation::SetAttribute { id, index, value } => {
                write!(f, "SetAttribute({id}, {index}, {value})")
            }
            SnapshotOperation::SetAttributes { id, values } => {
                write!(f, "SetAttributes({id}, {})", JsonValue::Array(values.clone()))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireError {
    UnknownOpcode { offset: usize, opcode: JsonValue },
    Truncated { offset: usize, opcode: u64 },
    InvalidArgument { offset: usize, expected: &'static str },
    NotAnArray,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::UnknownOpcode { offset, opcode } => {
                write!(f, "unknown opcode {opcode} at offset {offset}")
            }
            WireError::Truncated { offset, opcode } => write!(
                f,
                "opcode {opcode} at offset {offset} is missing arguments"
            ),
            WireError::InvalidArgument { offset, expected } => {
                write!(f, "argument at offset {offset} is not {expected}")
            }
            WireError::NotAnArray => f.write_str("patch is not a JSON array"),
        }
    }
}

impl std::error::Error for WireError {}

/// Ordered list of operations; one `take()` of the recorder.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SnapshotPatch {
    ops: Vec<SnapshotOperation>,
}

impl SnapshotPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: SnapshotOperation) {
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[SnapshotOperation] {
        &self.ops
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SnapshotOperation> {
        self.ops.iter()
    }

    pub fn to_wire(&self) -> Vec<JsonValue> {
        let mut out = Vec::with_capacity(self.ops.len() * 3);
        for op in &self.ops {
            op.write_wire(&mut out);
        }
        out
    }

    pub fn to_wire_value(&self) -> JsonValue {
        JsonValue::Array(self.to_wire())
    }

    pub fn from_wire(wire: &[JsonValue]) -> Result<Self, WireError> {
        let mut ops = Vec::new();
        let mut offset = 0;
        while offset < wire.len() {
            let (code, arity) = wire[offset]
                .as_u64()
                .and_then(|code| {
                    let arity = usize::try_from(code).ok().and_then(|i| opcode::ARITY.get(i))?;
                    Some((code, *arity))
                })
                .ok_or_else(|| WireError::UnknownOpcode {
                    offset,
                    opcode: wire[offset].clone(),
                })?;
            let args = wire
                .get(offset + 1..offset + 1 + arity)
                .ok_or(WireError::Truncated {
                    offset,
                    opcode: code,
                })?;
            let arg = |i: usize| ArgReader {
                value: &args[i],
                offset: offset + 1 + i,
            };
            let op = match code {
                opcode::CREATE_ELEMENT => SnapshotOperation::CreateElement {
                    ty: arg(0).node_type()?,
                    id: arg(1).id()?,
                },
                opcode::INSERT_BEFORE => SnapshotOperation::InsertBefore {
                    parent: arg(0).id()?,
                    child: arg(1).id()?,
                    before: arg(2).optional_id()?,
                },
                opcode::REMOVE_CHILD => SnapshotOperation::RemoveChild {
                    parent: arg(0).id()?,
                    child: arg(1).id()?,
                },
                opcode::SET_ATTRIBUTE => SnapshotOperation::SetAttribute {
                    id: arg(0).id()?,
                    index: arg(1).index()?,
                    value: args[2].clone(),
                },
                _ => SnapshotOperation::SetAttributes {
                    id: arg(0).id()?,
                    values: arg(1).array()?,
                },
            };
            ops.push(op);
            offset += 1 + arity;
        }
        Ok(Self { ops })
    }

    pub fn from_wire_value(wire: &JsonValue) -> Result<Self, WireError> {
        match wire {
            JsonValue::Array(items) => Self::from_wire(items),
            _ => Err(WireError::NotAnArray),
        }
    }
}

struct ArgReader<'a> {
    value: &'a JsonValue,
    offset: usize,
}

impl ArgReader<'_> {
    fn invalid(&self, expected: &'static str) -> WireError {
        WireError::InvalidArgument {
            offset: self.offset,
            expected,
        }
    }

    fn id(&self) -> Result<InstanceId, WireError> {
        self.value
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(InstanceId)
            .ok_or_else(|| self.invalid("an instance id"))
    }

    fn optional_id(&self) -> Result<Option<InstanceId>, WireError> {
        if self.value.is_null() {
            Ok(None)
        } else {
            self.id().map(Some)
        }
    }

    fn index(&self) -> Result<usize, WireError> {
        self.value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| self.invalid("an attribute index"))
    }

    fn node_type(&self) -> Result<NodeType, WireError> {
        match self.value {
            JsonValue::Null => Ok(NodeType::Text),
            JsonValue::String(s) => Ok(NodeType::from(s.as_str())),
            _ => Err(self.invalid("a snapshot type")),
        }
    }

    fn array(&self) -> Result<Vec<JsonValue>, WireError> {
        self.value
            .as_array()
            .cloned()
            .ok_or_else(|| self.invalid("an array of values"))
    }
}

fn node_type_to_wire(ty: &NodeType) -> JsonValue {
    match ty {
        NodeType::Text => JsonValue::Null,
        NodeType::Template(name) => JsonValue::String(name.to_string()),
    }
}

impl Serialize for SnapshotPatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SnapshotPatch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = Vec::<JsonValue>::deserialize(deserializer)?;
        SnapshotPatch::from_wire(&wire).map_err(D::Error::custom)
    }
}

impl IntoIterator for SnapshotPatch {
    type Item = SnapshotOperation;
    type IntoIter = std::vec::IntoIter<SnapshotOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

impl<'a> IntoIterator for &'a SnapshotPatch {
    type Item = &'a SnapshotOperation;
    type IntoIter = std::slice::Iter<'a, SnapshotOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

impl FromIterator<SnapshotOperation> for SnapshotPatch {
    fn from_iter<I: IntoIterator<Item = SnapshotOperation>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

impl Extend<SnapshotOperation> for SnapshotPatch {
    fn extend<I: IntoIterator<Item = SnapshotOperation>>(&mut self, iter: I) {
        self.ops.extend(iter);
    }
}
