use core_types::InstanceId;
use std::collections::BTreeMap;

use crate::value::Value;

/// Attributes whose presence forces the element out of flattening.
const NO_FLATTEN_ATTRIBUTES: [&str; 5] = ["name", "clip-radius", "overlap", "exposure-scene", "exposure-id"];

/// Expands spread props into the attribute bag the main thread applies.
///
/// `class` is normalised to `className`, refs become their handle and
/// functions become the handler key `"{id}:{index}:{key}"`.
pub fn transform_spread(
    id: InstanceId,
    index: usize,
    props: &BTreeMap<String, Value>,
) -> BTreeMap<String, Value> {
    let mut result = BTreeMap::new();
    let mut no_flatten = false;
    for (key, value) in props {
        match (key.as_str(), value) {
            ("class" | "className", Value::Null) => {
                result.insert("className".to_owned(), Value::from(""));
            }
            ("class" | "className", _) => {
                result.insert("className".to_owned(), value.clone());
            }
            ("ref", Value::Ref(r)) => {
                result.insert(key.clone(), Value::from_json(&r.handle));
            }
            (_, Value::Function(_)) => {
                result.insert(key.clone(), Value::String(format!("{id}:{index}:{key}")));
            }
            _ => {
                no_flatten |= NO_FLATTEN_ATTRIBUTES.contains(&key.as_str());
                result.insert(key.clone(), value.clone());
            }
        }
    }
    if no_flatten {
        result.insert("flatten".to_owned(), Value::Bool(false));
    }
    result
}
