use core_types::ElementRef;
use serde_json::Value as JsonValue;
use snapshot::{ElementHost, JsonMap};
use std::collections::BTreeMap;
use std::fmt::Write;

/// In-process element host. Elements live in an arena indexed by
/// `ElementRef`; nothing is ever freed, detached elements just lose their
/// parent.
#[derive(Debug, Default)]
pub struct MemoryHost {
    elements: Vec<ElementRecord>,
    page: Option<ElementRef>,
    calls: usize,
}

#[derive(Debug, Default)]
pub struct ElementRecord {
    pub tag: String,
    pub attributes: BTreeMap<String, JsonValue>,
    /// `(event_type, name) -> handler key`.
    pub events: BTreeMap<(String, String), String>,
    pub dataset: JsonMap,
    pub parent: Option<ElementRef>,
    pub children: Vec<ElementRef>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn element(&self, element: ElementRef) -> Option<&ElementRecord> {
        self.elements.get(element.0 as usize)
    }

    pub fn children(&self, element: ElementRef) -> &[ElementRef] {
        self.element(element).map_or(&[], |record| &record.children)
    }

    pub fn attribute(&self, element: ElementRef, key: &str) -> Option<&JsonValue> {
        self.element(element)?.attributes.get(key)
    }

    /// Number of host calls made so far, `page` and `tag` excluded.
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Markup outline of the page subtree, one element per line.
    pub fn render(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(page) = self.page {
            self.render_into(page, 0, &mut out);
        }
        out
    }

    fn render_into(&self, element: ElementRef, depth: usize, out: &mut Vec<String>) {
        let Some(record) = self.element(element) else {
            return;
        };
        let mut line = "  ".repeat(depth);
        if record.tag == "raw-text" {
            let text = record.attributes.get("text").cloned().unwrap_or(JsonValue::Null);
            let _ = write!(&mut line, "{text}");
            out.push(line);
            return;
        }
        let _ = write!(&mut line, "<{}", record.tag);
        for (key, value) in &record.attributes {
            let _ = write!(&mut line, " {key}={value}");
        }
        for ((event_type, name), handler) in &record.events {
            let _ = write!(&mut line, " {event_type}:{name}=\"{handler}\"");
        }
        for (key, value) in &record.dataset {
            let _ = write!(&mut line, " data-{key}={value}");
        }
        line.push('>');
        out.push(line);
        for &child in &record.children {
            self.render_into(child, depth + 1, out);
        }
    }

    fn record_mut(&mut self, element: ElementRef) -> Option<&mut ElementRecord> {
        let record = self.elements.get_mut(element.0 as usize);
        if record.is_none() {
            log::warn!(target: "main_thread.host", "unknown element {}", element.0);
        }
        record
    }

    fn detach(&mut self, child: ElementRef) {
        let Some(parent) = self.element(child).and_then(|record| record.parent) else {
            return;
        };
        if let Some(record) = self.elements.get_mut(parent.0 as usize) {
            record.children.retain(|c| *c != child);
        }
        if let Some(record) = self.elements.get_mut(child.0 as usize) {
            record.parent = None;
        }
    }

    fn is_ancestor_or_self(&self, ancestor: ElementRef, mut node: ElementRef) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.element(node).and_then(|record| record.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn link(&mut self, parent: ElementRef, child: ElementRef, at: Option<usize>) {
        if self.is_ancestor_or_self(child, parent) {
            log::warn!(
                target: "main_thread.host",
                "refusing to insert element {} under its descendant {}",
                child.0,
                parent.0
            );
            return;
        }
        if self.element(parent).is_none() || self.element(child).is_none() {
            log::warn!(target: "main_thread.host", "link of unknown element {} -> {}", parent.0, child.0);
            return;
        }
        self.detach(child);
        if let Some(record) = self.elements.get_mut(parent.0 as usize) {
            let at = at.unwrap_or(record.children.len()).min(record.children.len());
            record.children.insert(at, child);
        }
        if let Some(record) = self.elements.get_mut(child.0 as usize) {
            record.parent = Some(parent);
        }
    }
}

impl ElementHost for MemoryHost {
    fn page(&mut self) -> ElementRef {
        if let Some(page) = self.page {
            return page;
        }
        let page = self.create_element("page");
        self.calls -= 1;
        self.page = Some(page);
        page
    }

    fn create_element(&mut self, tag: &str) -> ElementRef {
        self.calls += 1;
        let element = ElementRef(self.elements.len() as u32);
        self.elements.push(ElementRecord {
            tag: tag.to_string(),
            ..ElementRecord::default()
        });
        element
    }

    fn append_element(&mut self, parent: ElementRef, child: ElementRef) {
        self.calls += 1;
        self.link(parent, child, None);
    }

    fn insert_element_before(
        &mut self,
        parent: ElementRef,
        child: ElementRef,
        before: Option<ElementRef>,
    ) {
        self.calls += 1;
        if before == Some(child) {
            return;
        }
        self.detach(child);
        let at = before.and_then(|before| {
            let position = self.children(parent).iter().position(|c| *c == before);
            if position.is_none() {
                log::warn!(
                    target: "main_thread.host",
                    "element {} is not a child of {}, appending",
                    before.0,
                    parent.0
                );
            }
            position
        });
        self.link(parent, child, at);
    }

    fn remove_element(&mut self, parent: ElementRef, child: ElementRef) {
        self.calls += 1;
        if self.element(child).and_then(|record| record.parent) != Some(parent) {
            log::warn!(
                target: "main_thread.host",
                "element {} is not a child of {}",
                child.0,
                parent.0
            );
            return;
        }
        self.detach(child);
    }

    fn replace_element(&mut self, new: ElementRef, old: ElementRef) {
        self.calls += 1;
        if new == old {
            return;
        }
        let Some(parent) = self.element(old).and_then(|record| record.parent) else {
            log::warn!(target: "main_thread.host", "replaced element {} has no parent", old.0);
            return;
        };
        self.detach(new);
        let at = self.children(parent).iter().position(|c| *c == old);
        self.detach(old);
        self.link(parent, new, at);
    }

    fn set_attribute(&mut self, element: ElementRef, key: &str, value: &JsonValue) {
        self.calls += 1;
        if let Some(record) = self.record_mut(element) {
            if value.is_null() {
                record.attributes.remove(key);
            } else {
                record.attributes.insert(key.to_string(), value.clone());
            }
        }
    }

    fn set_event(
        &mut self,
        element: ElementRef,
        event_type: &str,
        name: &str,
        handler: Option<&str>,
    ) {
        self.calls += 1;
        if let Some(record) = self.record_mut(element) {
            let key = (event_type.to_string(), name.to_string());
            match handler {
                Some(handler) => {
                    record.events.insert(key, handler.to_string());
                }
                None => {
                    record.events.remove(&key);
                }
            }
        }
    }

    fn set_dataset(&mut self, element: ElementRef, dataset: &JsonMap) {
        self.calls += 1;
        if let Some(record) = self.record_mut(element) {
            record.dataset = dataset.clone();
        }
    }

    fn tag(&self, element: ElementRef) -> Option<&str> {
        self.element(element).map(|record| record.tag.as_str())
    }
}
