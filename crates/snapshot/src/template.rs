//! Snapshot template registry.
//!
//! A template is the static shape of one compiled snapshot: a factory that
//! builds its native subtree, per-attribute update functions and the slot
//! table describing its dynamic child positions. Templates are produced by
//! the compiler and only read here.

use core_types::{ElementRef, InstanceId};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::host::ElementHost;
use crate::types::{NodeType, SlotKind};

pub type CreateFn = Arc<dyn Fn(&mut dyn ElementHost) -> Vec<ElementRef> + Send + Sync>;
pub type UpdateFn = Arc<dyn Fn(&mut dyn ElementHost, &UpdateContext<'_>) + Send + Sync>;

/// Everything an update function may read about the attribute being pushed.
pub struct UpdateContext<'a> {
    pub id: InstanceId,
    pub index: usize,
    pub elements: &'a [ElementRef],
    pub value: &'a JsonValue,
    pub old: Option<&'a JsonValue>,
}

impl UpdateContext<'_> {
    pub fn element(&self, element_index: usize) -> Option<ElementRef> {
        self.elements.get(element_index).copied()
    }
}

pub struct SnapshotTemplate {
    id: NodeType,
    create: Option<CreateFn>,
    update: Vec<Option<UpdateFn>>,
    slot: Vec<(SlotKind, usize)>,
    is_list_holder: bool,
}

impl SnapshotTemplate {
    pub fn new(id: impl Into<NodeType>) -> Self {
        Self {
            id: id.into(),
            create: None,
            update: Vec::new(),
            slot: Vec::new(),
            is_list_holder: false,
        }
    }

    pub fn text() -> Self {
        Self::new(NodeType::Text)
    }

    pub fn create(
        mut self,
        f: impl Fn(&mut dyn ElementHost) -> Vec<ElementRef> + Send + Sync + 'static,
    ) -> Self {
        self.create = Some(Arc::new(f));
        self
    }

    /// Registers the update function for attribute `index`.
    pub fn update(mut self, index: usize, f: UpdateFn) -> Self {
        if self.update.len() <= index {
            self.update.resize(index + 1, None);
        }
        self.update[index] = Some(f);
        self
    }

    pub fn slot(mut self, kind: SlotKind, element_index: usize) -> Self {
        if self.slot.is_empty() && kind == SlotKind::ListChildren {
            self.is_list_holder = true;
        }
        self.slot.push((kind, element_index));
        self
    }

    pub fn id(&self) -> &NodeType {
        &self.id
    }

    pub fn create_fn(&self) -> Option<&CreateFn> {
        self.create.as_ref()
    }

    pub fn update_fn(&self, index: usize) -> Option<&UpdateFn> {
        self.update.get(index).and_then(Option::as_ref)
    }

    pub fn slots(&self) -> &[(SlotKind, usize)] {
        &self.slot
    }

    pub fn is_list_holder(&self) -> bool {
        self.is_list_holder
    }
}

impl fmt::Debug for SnapshotTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotTemplate")
            .field("id", &self.id)
            .field("has_create", &self.create.is_some())
            .field("update_count", &self.update.len())
            .field("slot", &self.slot)
            .field("is_list_holder", &self.is_list_holder)
            .finish()
    }
}

/// Template lookup shared by both runtimes. Cloning is cheap.
#[derive(Clone, Debug)]
pub struct TemplateRegistry {
    templates: HashMap<NodeType, Arc<SnapshotTemplate>>,
}

impl TemplateRegistry {
    /// A registry holding the built-in `root`, `wrapper` and text templates.
    pub fn new() -> Self {
        let mut registry = Self {
            templates: HashMap::new(),
        };
        registry.register(
            SnapshotTemplate::new(NodeType::ROOT)
                .create(|host| vec![host.page()])
                .slot(SlotKind::Children, 0),
        );
        registry.register(
            SnapshotTemplate::new(NodeType::WRAPPER)
                .create(|host| vec![host.create_element("wrapper")])
                .slot(SlotKind::Children, 0),
        );
        registry.register(
            SnapshotTemplate::text()
                .create(|host| vec![host.create_element("raw-text")])
                .update(0, update::text(0)),
        );
        registry
    }

    /// Registers `template`, replacing any template with the same id.
    pub fn register(&mut self, template: SnapshotTemplate) -> NodeType {
        let id = template.id.clone();
        log::trace!(target: "snapshot.template", "register {id}");
        self.templates.insert(id.clone(), Arc::new(template));
        id
    }

    pub fn get(&self, id: &NodeType) -> Option<&Arc<SnapshotTemplate>> {
        self.templates.get(id)
    }

    pub fn contains(&self, id: &NodeType) -> bool {
        self.templates.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Update functions compiled templates are built from.
pub mod update {
    use super::{UpdateContext, UpdateFn};
    use crate::host::ElementHost;
    use crate::value::{JsonMap, is_truthy_json, json_equal};
    use serde_json::Value as JsonValue;
    use std::sync::Arc;

    pub fn attribute(element_index: usize, name: &'static str) -> UpdateFn {
        Arc::new(move |host: &mut dyn ElementHost, ctx: &UpdateContext<'_>| {
            if let Some(element) = ctx.element(element_index) {
                host.set_attribute(element, name, ctx.value);
            }
        })
    }

    pub fn text(element_index: usize) -> UpdateFn {
        attribute(element_index, "text")
    }

    /// Event binding. The handler key is `"{id}:{index}:"`.
    pub fn event(element_index: usize, event_type: &'static str, name: &'static str) -> UpdateFn {
        Arc::new(move |host: &mut dyn ElementHost, ctx: &UpdateContext<'_>| {
            let Some(element) = ctx.element(element_index) else {
                return;
            };
            if is_truthy_json(ctx.value) {
                let key = format!("{}:{}:", ctx.id, ctx.index);
                host.set_event(element, event_type, name, Some(&key));
            } else {
                host.set_event(element, event_type, name, None);
            }
        })
    }

    /// Key-wise application of an expanded spread object.
    pub fn spread(element_index: usize) -> UpdateFn {
        Arc::new(move |host: &mut dyn ElementHost, ctx: &UpdateContext<'_>| {
            if let Some(element) = ctx.element(element_index) {
                apply_spread(host, element, ctx);
            }
        })
    }

    fn apply_spread(host: &mut dyn ElementHost, element: core_types::ElementRef, ctx: &UpdateContext<'_>) {
        let empty = JsonMap::new();
        let old = ctx.old.and_then(JsonValue::as_object).unwrap_or(&empty);
        let new = ctx.value.as_object().unwrap_or(&empty);

        let mut dataset = JsonMap::new();
        for (key, value) in new {
            if let Some(data_key) = key.strip_prefix("data-") {
                dataset.insert(data_key.to_owned(), value.clone());
                continue;
            }
            if old.get(key).is_some_and(|prev| json_equal(prev, value)) {
                continue;
            }
            match key.as_str() {
                "className" => host.set_attribute(element, "class", value),
                "style" | "id" | "ref" => host.set_attribute(element, key, value),
                _ => match parse_event_key(key) {
                    Some(event) => {
                        let handler = value
                            .as_str()
                            .map(str::to_owned)
                            .unwrap_or_else(|| format!("{}:{}:{key}", ctx.id, ctx.index));
                        let handler = is_truthy_json(value).then_some(handler.as_str());
                        host.set_event(element, event.event_type, event.name, handler);
                    }
                    None => host.set_attribute(element, key, value),
                },
            }
        }

        let mut had_dataset = false;
        for key in old.keys() {
            if key.starts_with("data-") {
                had_dataset = true;
                continue;
            }
            if new.contains_key(key) {
                continue;
            }
            match key.as_str() {
                "className" => host.set_attribute(element, "class", &JsonValue::from("")),
                "style" => host.set_attribute(element, "style", &JsonValue::from("")),
                _ => match parse_event_key(key) {
                    Some(event) => host.set_event(element, event.event_type, event.name, None),
                    None => host.set_attribute(element, key, &JsonValue::Null),
                },
            }
        }

        if had_dataset || !dataset.is_empty() {
            host.set_dataset(element, &dataset);
        }
    }

    #[derive(Debug, PartialEq, Eq)]
    pub struct EventKey<'a> {
        pub worklet: Option<&'a str>,
        pub event_type: &'static str,
        pub name: &'a str,
    }

    /// Parses `[<worklet>:](bind|catch|capture-bind|capture-catch|global-bind)<Name>`.
    pub fn parse_event_key(key: &str) -> Option<EventKey<'_>> {
        const PREFIXES: [(&str, &str); 5] = [
            ("capture-bind", "capture-bind"),
            ("capture-catch", "capture-catch"),
            ("global-bind", "global-bindEvent"),
            ("bind", "bindEvent"),
            ("catch", "catchEvent"),
        ];
        let (worklet, rest) = match key.split_once(':') {
            Some((worklet, rest)) => {
                if !worklet.chars().all(|c| c.is_ascii_alphabetic() || c == '-') {
                    return None;
                }
                (Some(worklet), rest)
            }
            None => (None, key),
        };
        PREFIXES.iter().find_map(|(prefix, event_type)| {
            let name = rest.strip_prefix(prefix)?;
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphabetic()) {
                return None;
            }
            Some(EventKey {
                worklet,
                event_type,
                name,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::update::{EventKey, parse_event_key};
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let registry = TemplateRegistry::new();
        assert!(registry.contains(&NodeType::root()));
        assert!(registry.contains(&NodeType::wrapper()));
        assert!(registry.contains(&NodeType::Text));
        let text = registry.get(&NodeType::Text).expect("text template");
        assert!(text.slots().is_empty());
        assert!(text.update_fn(0).is_some());
    }

    #[test]
    fn list_holder_is_derived_from_first_slot() {
        let list = SnapshotTemplate::new("list").slot(SlotKind::ListChildren, 0);
        assert!(list.is_list_holder());
        let view = SnapshotTemplate::new("view")
            .slot(SlotKind::Slot, 1)
            .slot(SlotKind::ListChildren, 2);
        assert!(!view.is_list_holder());
    }

    #[test]
    fn event_keys_parse() {
        assert_eq!(
            parse_event_key("bindtap"),
            Some(EventKey {
                worklet: None,
                event_type: "bindEvent",
                name: "tap"
            })
        );
        assert_eq!(
            parse_event_key("main-thread:catchscroll"),
            Some(EventKey {
                worklet: Some("main-thread"),
                event_type: "catchEvent",
                name: "scroll"
            })
        );
        assert_eq!(
            parse_event_key("capture-bindtouchstart").map(|e| e.event_type),
            Some("capture-bind")
        );
        assert_eq!(parse_event_key("className"), None);
        assert_eq!(parse_event_key("bind"), None);
    }
}
