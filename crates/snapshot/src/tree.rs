//! Arena-backed instance tree shared by both runtime variants.
//!
//! Nodes live in a slot vector; tree links are slot indices, and `live` maps
//! instance ids to slots. Remapping an id therefore never touches the links.
//!
//! Invariants:
//! - a node's parent is set iff it is in exactly one child list;
//! - sibling links are mutually consistent and bounded by first/last child;
//! - no node is its own ancestor;
//! - an id maps to at most one live slot.

use core_types::InstanceId;
use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeError {
    UnknownInstance(InstanceId),
    DuplicateInstance(InstanceId),
    /// `child` is not currently a child of `parent` (invalid operand).
    NotAChild { parent: InstanceId, child: InstanceId },
    Cycle { parent: InstanceId, child: InstanceId },
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeError::UnknownInstance(id) => write!(f, "unknown instance {id}"),
            TreeError::DuplicateInstance(id) => write!(f, "instance {id} already exists"),
            TreeError::NotAChild { parent, child } => write!(
                f,
                "invalid operand: instance {child} is not a child of instance {parent}"
            ),
            TreeError::Cycle { parent, child } => write!(
                f,
                "inserting instance {child} under instance {parent} would create a cycle"
            ),
        }
    }
}

impl std::error::Error for TreeError {}

#[derive(Clone, Copy, Debug, Default)]
struct Links {
    parent: Option<usize>,
    first_child: Option<usize>,
    last_child: Option<usize>,
    previous_sibling: Option<usize>,
    next_sibling: Option<usize>,
}

#[derive(Debug)]
struct NodeSlot<T> {
    id: InstanceId,
    links: Links,
    data: T,
}

#[derive(Debug)]
pub struct InstanceTree<T> {
    nodes: Vec<Option<NodeSlot<T>>>,
    live: HashMap<InstanceId, usize>,
}

impl<T> InstanceTree<T> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            live: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.live.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.live.keys().copied()
    }

    pub fn insert(&mut self, id: InstanceId, data: T) -> Result<(), TreeError> {
        if self.live.contains_key(&id) {
            return Err(TreeError::DuplicateInstance(id));
        }
        let index = self.nodes.len();
        self.nodes.push(Some(NodeSlot {
            id,
            links: Links::default(),
            data,
        }));
        self.live.insert(id, index);
        Ok(())
    }

    pub fn get(&self, id: InstanceId) -> Option<&T> {
        let index = *self.live.get(&id)?;
        self.slot(index).map(|slot| &slot.data)
    }

    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut T> {
        let index = *self.live.get(&id)?;
        self.nodes[index].as_mut().map(|slot| &mut slot.data)
    }

    pub fn try_get(&self, id: InstanceId) -> Result<&T, TreeError> {
        self.get(id).ok_or(TreeError::UnknownInstance(id))
    }

    pub fn try_get_mut(&mut self, id: InstanceId) -> Result<&mut T, TreeError> {
        self.get_mut(id).ok_or(TreeError::UnknownInstance(id))
    }

    pub fn parent(&self, id: InstanceId) -> Option<InstanceId> {
        self.link(id, |links| links.parent)
    }

    pub fn first_child(&self, id: InstanceId) -> Option<InstanceId> {
        self.link(id, |links| links.first_child)
    }

    pub fn last_child(&self, id: InstanceId) -> Option<InstanceId> {
        self.link(id, |links| links.last_child)
    }

    pub fn next_sibling(&self, id: InstanceId) -> Option<InstanceId> {
        self.link(id, |links| links.next_sibling)
    }

    pub fn previous_sibling(&self, id: InstanceId) -> Option<InstanceId> {
        self.link(id, |links| links.previous_sibling)
    }

    pub fn contains_child(&self, parent: InstanceId, child: InstanceId) -> bool {
        match (self.live.get(&parent), self.live.get(&child)) {
            (Some(&p), Some(&c)) => self.links(c).parent == Some(p),
            _ => false,
        }
    }

    /// Children of `id` in order, walking from the first child.
    pub fn child_ids(&self, id: InstanceId) -> Vec<InstanceId> {
        let mut out = Vec::new();
        let Some(&index) = self.live.get(&id) else {
            return out;
        };
        let mut cursor = self.links(index).first_child;
        while let Some(child) = cursor {
            let Some(slot) = self.slot(child) else {
                break;
            };
            out.push(slot.id);
            cursor = slot.links.next_sibling;
        }
        out
    }

    /// `id` and all of its descendants, pre-order.
    pub fn subtree_ids(&self, id: InstanceId) -> Vec<InstanceId> {
        let mut out = Vec::new();
        let Some(&index) = self.live.get(&id) else {
            return out;
        };
        let mut stack = vec![index];
        while let Some(current) = stack.pop() {
            let Some(slot) = self.slot(current) else {
                continue;
            };
            out.push(slot.id);
            let mut children = Vec::new();
            let mut cursor = slot.links.first_child;
            while let Some(child) = cursor {
                children.push(child);
                cursor = self.slot(child).and_then(|s| s.links.next_sibling);
            }
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Detaches `node` from any parent and splices it into `parent`'s child
    /// list before `before`, or at the end.
    pub fn insert_before(
        &mut self,
        parent: InstanceId,
        node: InstanceId,
        before: Option<InstanceId>,
    ) -> Result<(), TreeError> {
        let p = self.index_of(parent)?;
        let n = self.index_of(node)?;
        let b = match before {
            Some(before_id) => {
                let b = self.index_of(before_id)?;
                if self.links(b).parent != Some(p) {
                    return Err(TreeError::NotAChild {
                        parent,
                        child: before_id,
                    });
                }
                Some(b)
            }
            None => None,
        };
        if self.is_ancestor_or_self(n, p) {
            return Err(TreeError::Cycle {
                parent,
                child: node,
            });
        }
        if b == Some(n) {
            return Ok(());
        }

        if let Some(old_parent) = self.links(n).parent {
            self.unlink(old_parent, n);
        }

        match b {
            Some(b) => {
                let prev = self.links(b).previous_sibling;
                match prev {
                    Some(prev) => self.links_mut(prev).next_sibling = Some(n),
                    None => self.links_mut(p).first_child = Some(n),
                }
                let links = self.links_mut(n);
                links.previous_sibling = prev;
                links.next_sibling = Some(b);
                links.parent = Some(p);
                self.links_mut(b).previous_sibling = Some(n);
            }
            None => {
                let last = self.links(p).last_child;
                match last {
                    Some(last) => self.links_mut(last).next_sibling = Some(n),
                    None => self.links_mut(p).first_child = Some(n),
                }
                let links = self.links_mut(n);
                links.previous_sibling = last;
                links.next_sibling = None;
                links.parent = Some(p);
                self.links_mut(p).last_child = Some(n);
            }
        }
        Ok(())
    }

    pub fn append_child(&mut self, parent: InstanceId, node: InstanceId) -> Result<(), TreeError> {
        self.insert_before(parent, node, None)
    }

    /// Unlinks `node` from `parent`. Fails without touching any link when
    /// `node` is not a child of `parent`.
    pub fn remove_child(&mut self, parent: InstanceId, node: InstanceId) -> Result<(), TreeError> {
        let p = self.index_of(parent)?;
        let n = self.index_of(node)?;
        if self.links(n).parent != Some(p) {
            return Err(TreeError::NotAChild {
                parent,
                child: node,
            });
        }
        self.unlink(p, n);
        Ok(())
    }

    /// Re-keys `old` as `new` in the lookup table.
    pub fn update_id(&mut self, old: InstanceId, new: InstanceId) -> Result<(), TreeError> {
        if old == new {
            return Ok(());
        }
        if self.live.contains_key(&new) {
            return Err(TreeError::DuplicateInstance(new));
        }
        let index = self
            .live
            .remove(&old)
            .ok_or(TreeError::UnknownInstance(old))?;
        if let Some(slot) = self.nodes[index].as_mut() {
            slot.id = new;
        }
        self.live.insert(new, index);
        Ok(())
    }

    /// Drops `id` from the lookup table and frees its slot. The node is
    /// unlinked from its parent first and its children become detached roots.
    pub fn forget(&mut self, id: InstanceId) -> Option<T> {
        let index = *self.live.get(&id)?;
        if let Some(parent) = self.links(index).parent {
            self.unlink(parent, index);
        }
        let mut cursor = self.links(index).first_child;
        while let Some(child) = cursor {
            cursor = self.links(child).next_sibling;
            let links = self.links_mut(child);
            links.parent = None;
            links.previous_sibling = None;
            links.next_sibling = None;
        }
        self.live.remove(&id);
        self.nodes[index].take().map(|slot| slot.data)
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.live.clear();
    }

    fn index_of(&self, id: InstanceId) -> Result<usize, TreeError> {
        self.live
            .get(&id)
            .copied()
            .ok_or(TreeError::UnknownInstance(id))
    }

    fn slot(&self, index: usize) -> Option<&NodeSlot<T>> {
        self.nodes.get(index).and_then(Option::as_ref)
    }

    fn links(&self, index: usize) -> Links {
        self.slot(index).map(|slot| slot.links).unwrap_or_default()
    }

    fn links_mut(&mut self, index: usize) -> &mut Links {
        // Callers only pass indices resolved through `live` or read from the
        // links of a live slot.
        match self.nodes[index].as_mut() {
            Some(slot) => &mut slot.links,
            None => unreachable!("link to freed slot {index}"),
        }
    }

    fn link(&self, id: InstanceId, pick: impl Fn(&Links) -> Option<usize>) -> Option<InstanceId> {
        let index = *self.live.get(&id)?;
        let target = pick(&self.links(index))?;
        self.slot(target).map(|slot| slot.id)
    }

    fn is_ancestor_or_self(&self, ancestor: usize, mut node: usize) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.links(node).parent {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn unlink(&mut self, p: usize, n: usize) {
        let Links {
            previous_sibling,
            next_sibling,
            ..
        } = self.links(n);
        match previous_sibling {
            Some(prev) => self.links_mut(prev).next_sibling = next_sibling,
            None => self.links_mut(p).first_child = next_sibling,
        }
        match next_sibling {
            Some(next) => self.links_mut(next).previous_sibling = previous_sibling,
            None => self.links_mut(p).last_child = previous_sibling,
        }
        let links = self.links_mut(n);
        links.parent = None;
        links.previous_sibling = None;
        links.next_sibling = None;
    }
}

impl<T> Default for InstanceTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: i32) -> InstanceId {
        InstanceId(n)
    }

    fn tree_with(ids: &[i32]) -> InstanceTree<()> {
        let mut tree = InstanceTree::new();
        for &n in ids {
            tree.insert(id(n), ()).expect("insert");
        }
        tree
    }

    fn assert_consistent(tree: &InstanceTree<()>, parent: InstanceId) {
        let children = tree.child_ids(parent);
        assert_eq!(tree.first_child(parent), children.first().copied());
        assert_eq!(tree.last_child(parent), children.last().copied());
        for (i, child) in children.iter().enumerate() {
            assert_eq!(tree.parent(*child), Some(parent));
            let prev = i.checked_sub(1).map(|p| children[p]);
            assert_eq!(tree.previous_sibling(*child), prev);
            assert_eq!(tree.next_sibling(*child), children.get(i + 1).copied());
        }
    }

    #[test]
    fn insert_before_existing_child_prepends() {
        let mut tree = tree_with(&[1, 2, 3]);
        tree.insert_before(id(1), id(2), None).expect("append a");
        tree.insert_before(id(1), id(3), Some(id(2))).expect("insert b");
        assert_eq!(tree.child_ids(id(1)), vec![id(3), id(2)]);
        assert_consistent(&tree, id(1));
    }

    #[test]
    fn reinsertion_moves_node() {
        let mut tree = tree_with(&[1, 2, 3, 4]);
        for n in [2, 3, 4] {
            tree.append_child(id(1), id(n)).expect("append");
        }
        tree.insert_before(id(1), id(4), Some(id(2))).expect("move");
        assert_eq!(tree.child_ids(id(1)), vec![id(4), id(2), id(3)]);
        tree.append_child(id(1), id(4)).expect("move back");
        assert_eq!(tree.child_ids(id(1)), vec![id(2), id(3), id(4)]);
        assert_consistent(&tree, id(1));
    }

    #[test]
    fn moving_between_parents_detaches() {
        let mut tree = tree_with(&[1, 2, 3]);
        tree.append_child(id(1), id(3)).expect("append");
        tree.append_child(id(2), id(3)).expect("move");
        assert!(tree.child_ids(id(1)).is_empty());
        assert_eq!(tree.first_child(id(1)), None);
        assert_eq!(tree.parent(id(3)), Some(id(2)));
    }

    #[test]
    fn remove_non_child_fails_without_corruption() {
        let mut tree = tree_with(&[1, 2, 3]);
        tree.append_child(id(1), id(2)).expect("append");
        let err = tree.remove_child(id(1), id(3)).expect_err("not a child");
        assert_eq!(
            err,
            TreeError::NotAChild {
                parent: id(1),
                child: id(3)
            }
        );
        assert_eq!(tree.child_ids(id(1)), vec![id(2)]);
        tree.remove_child(id(1), id(2)).expect("remove");
        assert_eq!(tree.parent(id(2)), None);
        assert!(tree.remove_child(id(1), id(2)).is_err());
    }

    #[test]
    fn cycles_are_rejected() {
        let mut tree = tree_with(&[1, 2, 3]);
        tree.append_child(id(1), id(2)).expect("append");
        tree.append_child(id(2), id(3)).expect("append");
        assert!(matches!(
            tree.append_child(id(3), id(1)),
            Err(TreeError::Cycle { .. })
        ));
        assert!(matches!(
            tree.append_child(id(2), id(2)),
            Err(TreeError::Cycle { .. })
        ));
    }

    #[test]
    fn update_id_keeps_links() {
        let mut tree = tree_with(&[1, 2]);
        tree.append_child(id(1), id(2)).expect("append");
        tree.update_id(id(2), id(-5)).expect("remap");
        assert!(!tree.contains(id(2)));
        assert_eq!(tree.child_ids(id(1)), vec![id(-5)]);
        assert_eq!(tree.parent(id(-5)), Some(id(1)));
        assert_eq!(
            tree.update_id(id(1), id(-5)),
            Err(TreeError::DuplicateInstance(id(-5)))
        );
    }

    #[test]
    fn subtree_ids_are_preorder() {
        let mut tree = tree_with(&[1, 2, 3, 4, 5]);
        tree.append_child(id(1), id(2)).expect("append");
        tree.append_child(id(2), id(3)).expect("append");
        tree.append_child(id(1), id(4)).expect("append");
        tree.append_child(id(4), id(5)).expect("append");
        assert_eq!(
            tree.subtree_ids(id(1)),
            vec![id(1), id(2), id(3), id(4), id(5)]
        );
    }

    #[test]
    fn forget_detaches_parent_and_children() {
        let mut tree = tree_with(&[1, 2, 3, 4]);
        tree.append_child(id(1), id(2)).expect("append");
        tree.append_child(id(2), id(3)).expect("append");
        tree.append_child(id(2), id(4)).expect("append");
        assert!(tree.forget(id(2)).is_some());
        assert!(tree.child_ids(id(1)).is_empty());
        assert_eq!(tree.parent(id(3)), None);
        assert_eq!(tree.next_sibling(id(3)), None);
        tree.append_child(id(1), id(3)).expect("reattach orphan");
        assert_eq!(tree.child_ids(id(1)), vec![id(3)]);
        assert_eq!(tree.forget(id(2)), None);
    }

    #[test]
    fn random_edit_sequences_keep_links_consistent() {
        let ids: Vec<i32> = (1..=8).collect();
        let mut tree = tree_with(&ids);
        let mut seed = 0x2545_f491_u32;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };
        let root = id(1);
        for _ in 0..500 {
            let node = id(2 + (next() % 7) as i32);
            if next() % 3 == 0 {
                let _ = tree.remove_child(root, node);
            } else {
                let children = tree.child_ids(root);
                let before = if children.is_empty() || next() % 2 == 0 {
                    None
                } else {
                    Some(children[(next() as usize) % children.len()])
                };
                tree.insert_before(root, node, before).expect("insert");
            }
            assert_consistent(&tree, root);
            for n in 2..=8 {
                let in_list = tree.child_ids(root).contains(&id(n));
                assert_eq!(tree.parent(id(n)).is_some(), in_list);
            }
        }
    }
}
