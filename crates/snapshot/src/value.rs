//! Attribute values as seen by the background runtime.
//!
//! Background values may carry markers (refs, spreads, worklets, gestures,
//! timing flags, event handlers) that never cross the runtime boundary as-is.
//! Everything that is committed into a patch is plain JSON.

use serde_json::{Map, Number, Value as JsonValue};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

pub type JsonMap = Map<String, JsonValue>;

/// Event handler (or any other function value) held by the background tree.
///
/// Equality is identity: two callbacks are equal only if they share the same
/// allocation.
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn(&JsonValue)>);

impl Callback {
    pub fn new(f: impl Fn(&JsonValue) + 'static) -> Self {
        Callback(Rc::new(f))
    }

    pub fn call(&self, payload: &JsonValue) {
        (self.0)(payload)
    }

    pub fn ptr_eq(&self, other: &Callback) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", Rc::as_ptr(&self.0))
    }
}

/// A ref payload. The main thread only ever sees `handle`.
#[derive(Clone, Debug, PartialEq)]
pub struct RefValue {
    pub handle: JsonValue,
}

impl RefValue {
    pub fn new(handle: impl Into<JsonValue>) -> Self {
        Self {
            handle: handle.into(),
        }
    }
}

/// A main-thread function reference. Resolution assigns an execution id once;
/// clones share it.
#[derive(Clone, Debug)]
pub struct Worklet {
    pub id: String,
    pub captures: JsonMap,
    exec_id: Rc<Cell<Option<u64>>>,
}

impl Worklet {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            captures: JsonMap::new(),
            exec_id: Rc::new(Cell::new(None)),
        }
    }

    pub fn with_capture(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.captures.insert(key.into(), value.into());
        self
    }

    pub fn exec_id(&self) -> Option<u64> {
        self.exec_id.get()
    }

    pub(crate) fn assign_exec_id(&self, id: u64) {
        self.exec_id.set(Some(id));
    }

    pub fn to_json(&self) -> JsonValue {
        let mut map = self.captures.clone();
        map.insert("_wkltId".into(), JsonValue::String(self.id.clone()));
        if let Some(exec_id) = self.exec_id() {
            map.insert("_execId".into(), JsonValue::from(exec_id));
        }
        JsonValue::Object(map)
    }
}

impl PartialEq for Worklet {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.captures == other.captures
    }
}

/// Gesture descriptor; its callbacks are worklets resolved on commit.
#[derive(Clone, Debug, PartialEq)]
pub struct Gesture {
    pub id: u32,
    pub kind: String,
    pub callbacks: BTreeMap<String, Worklet>,
}

impl Gesture {
    pub fn new(id: u32, kind: impl Into<String>) -> Self {
        Self {
            id,
            kind: kind.into(),
            callbacks: BTreeMap::new(),
        }
    }

    pub fn with_callback(mut self, name: impl Into<String>, worklet: Worklet) -> Self {
        self.callbacks.insert(name.into(), worklet);
        self
    }

    pub fn to_json(&self) -> JsonValue {
        let callbacks = self
            .callbacks
            .iter()
            .map(|(name, worklet)| (name.clone(), worklet.to_json()))
            .collect::<JsonMap>();
        let mut map = JsonMap::new();
        map.insert("id".into(), JsonValue::from(self.id));
        map.insert("type".into(), JsonValue::String(self.kind.clone()));
        map.insert("callbacks".into(), JsonValue::Object(callbacks));
        map.insert("__isSerialized".into(), JsonValue::Bool(true));
        JsonValue::Object(map)
    }
}

/// Spread attribute bag. `expanded` caches the last expansion so the next
/// write can be diffed against it.
#[derive(Clone, Debug, Default)]
pub struct Spread {
    pub props: BTreeMap<String, Value>,
    pub(crate) expanded: Option<BTreeMap<String, Value>>,
}

impl Spread {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn expanded(&self) -> Option<&BTreeMap<String, Value>> {
        self.expanded.as_ref()
    }
}

impl PartialEq for Spread {
    fn eq(&self, other: &Self) -> bool {
        self.props == other.props
    }
}

#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Function(Callback),
    Ref(RefValue),
    Spread(Spread),
    Worklet(Worklet),
    Gesture(Gesture),
    TimingFlag(String),
}

/// Classification of a value, computed once per attribute write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Falsy,
    Spread,
    Ref,
    Worklet,
    Gesture,
    TimingFlag,
    Event,
    Plain,
}

impl Value {
    pub fn function(f: impl Fn(&JsonValue) + 'static) -> Self {
        Value::Function(Callback::new(f))
    }

    pub fn object<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn kind(&self) -> ValueKind {
        if !self.is_truthy() {
            return ValueKind::Falsy;
        }
        match self {
            Value::Spread(_) => ValueKind::Spread,
            Value::Ref(_) => ValueKind::Ref,
            Value::Worklet(_) => ValueKind::Worklet,
            Value::Gesture(_) => ValueKind::Gesture,
            Value::TimingFlag(_) => ValueKind::TimingFlag,
            Value::Function(_) => ValueKind::Event,
            _ => ValueKind::Plain,
        }
    }

    /// JavaScript truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, Value::Ref(_))
    }

    /// Plain JSON form. Functions have no JSON form and become `null`;
    /// markers serialize their wire payload without resolving anything.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null | Value::Function(_) => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Array(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => JsonValue::Object(map_to_json(map)),
            Value::Ref(r) => r.handle.clone(),
            Value::Spread(spread) => {
                JsonValue::Object(map_to_json(spread.expanded.as_ref().unwrap_or(&spread.props)))
            }
            Value::Worklet(w) => w.to_json(),
            Value::Gesture(g) => g.to_json(),
            Value::TimingFlag(flag) => {
                let mut map = JsonMap::new();
                map.insert("__ltf".into(), JsonValue::String(flag.clone()));
                JsonValue::Object(map)
            }
        }
    }

    pub fn from_json(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Value::String(s.clone()),
            JsonValue::Array(items) => Value::Array(items.iter().map(Value::from_json).collect()),
            JsonValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Direct-or-deep equality: containers compare structurally, functions by
/// identity, everything else by value.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Ref(a), Value::Ref(b)) => a == b,
            (Value::Spread(a), Value::Spread(b)) => a == b,
            (Value::Worklet(a), Value::Worklet(b)) => a == b,
            (Value::Gesture(a), Value::Gesture(b)) => a == b,
            (Value::TimingFlag(a), Value::TimingFlag(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<RefValue> for Value {
    fn from(value: RefValue) -> Self {
        Value::Ref(value)
    }
}

impl From<Spread> for Value {
    fn from(value: Spread) -> Self {
        Value::Spread(value)
    }
}

impl From<Worklet> for Value {
    fn from(value: Worklet) -> Self {
        Value::Worklet(value)
    }
}

impl From<Gesture> for Value {
    fn from(value: Gesture) -> Self {
        Value::Gesture(value)
    }
}

impl From<Callback> for Value {
    fn from(value: Callback) -> Self {
        Value::Function(value)
    }
}

pub(crate) fn map_to_json(map: &BTreeMap<String, Value>) -> JsonMap {
    map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
}

/// Integral numbers are encoded as JSON integers so they compare equal to
/// values parsed back from the wire.
pub fn number_to_json(n: f64) -> JsonValue {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        return JsonValue::from(n as i64);
    }
    Number::from_f64(n)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

pub fn is_truthy_json(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(_) | JsonValue::Object(_) => true,
    }
}

/// Structural equality for committed values. Numbers compare numerically so
/// `1` and `1.0` are the same value.
pub fn json_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        (JsonValue::Array(x), JsonValue::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| json_equal(a, b))
        }
        (JsonValue::Object(x), JsonValue::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| json_equal(v, other)))
        }
        _ => a == b,
    }
}
