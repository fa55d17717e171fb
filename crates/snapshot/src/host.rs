use core_types::ElementRef;
use serde_json::Value as JsonValue;

use crate::value::JsonMap;

/// Native element API the main thread drives.
///
/// Every call takes effect synchronously; the host never batches.
pub trait ElementHost {
    /// The page element that anchors the `root` template.
    fn page(&mut self) -> ElementRef;

    fn create_element(&mut self, tag: &str) -> ElementRef;

    fn append_element(&mut self, parent: ElementRef, child: ElementRef);

    /// Inserts `child` before `before`, or appends when `before` is `None`.
    fn insert_element_before(
        &mut self,
        parent: ElementRef,
        child: ElementRef,
        before: Option<ElementRef>,
    );

    fn remove_element(&mut self, parent: ElementRef, child: ElementRef);

    /// Puts `new` at the position currently held by `old`, detaching `old`.
    fn replace_element(&mut self, new: ElementRef, old: ElementRef);

    fn set_attribute(&mut self, element: ElementRef, key: &str, value: &JsonValue);

    /// Binds (or unbinds, when `handler` is `None`) an event. `handler` is the
    /// lookup key the background runtime resolves back to a function.
    fn set_event(
        &mut self,
        element: ElementRef,
        event_type: &str,
        name: &str,
        handler: Option<&str>,
    );

    fn set_dataset(&mut self, element: ElementRef, dataset: &JsonMap);

    fn tag(&self, element: ElementRef) -> Option<&str>;
}
