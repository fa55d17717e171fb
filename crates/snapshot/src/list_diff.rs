//! Type-keyed sequence diff used for dynamic child runs.
//!
//! Matching is a forward scan: each `after` entry takes the first unmatched
//! `before` entry of the same type. There is no keyed LCS; the resulting move
//! sequence is part of the patch format and must stay stable.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::convert::Infallible;

use crate::types::NodeType;

pub trait Typed {
    fn node_type(&self) -> &NodeType;
}

/// Outcome of [`diff_array`].
#[derive(Clone, Debug, PartialEq)]
pub struct DiffResult<K> {
    /// New index -> item to create there.
    pub inserts: BTreeMap<usize, K>,
    /// Old indices to drop, ascending.
    pub removals: Vec<usize>,
    /// Old index -> new index for reused entries that have to move.
    pub moves: BTreeMap<usize, usize>,
}

impl<K> DiffResult<K> {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.removals.is_empty() && self.moves.is_empty()
    }
}

impl<K> Default for DiffResult<K> {
    fn default() -> Self {
        Self {
            inserts: BTreeMap::new(),
            removals: Vec::new(),
            moves: BTreeMap::new(),
        }
    }
}

/// Diffs `before` against `after`. `on_diff_children` is called for every
/// matched pair, in `after` order, before anything structural happens.
pub fn try_diff_array<A, B, E>(
    before: &[A],
    after: &[B],
    mut is_same_type: impl FnMut(&A, &B) -> bool,
    mut on_diff_children: impl FnMut(&A, &B, usize, usize) -> Result<(), E>,
) -> Result<DiffResult<B>, E>
where
    A: Typed,
    B: Typed + Clone,
{
    let mut result = DiffResult::default();
    let mut unmatched: HashMap<&NodeType, VecDeque<usize>> = HashMap::new();
    for (index, node) in before.iter().enumerate() {
        unmatched.entry(node.node_type()).or_default().push_back(index);
    }

    let mut last_placed = 0;
    for (new_index, after_node) in after.iter().enumerate() {
        let candidate = unmatched
            .get_mut(after_node.node_type())
            .and_then(|queue| queue.front().copied().map(|old| (queue, old)));
        match candidate {
            Some((queue, old_index)) if is_same_type(&before[old_index], after_node) => {
                queue.pop_front();
                on_diff_children(&before[old_index], after_node, old_index, new_index)?;
                if old_index < last_placed {
                    result.moves.insert(old_index, new_index);
                } else {
                    last_placed = old_index;
                }
            }
            _ => {
                result.inserts.insert(new_index, after_node.clone());
            }
        }
    }

    result.removals = unmatched.into_values().flatten().collect();
    result.removals.sort_unstable();
    Ok(result)
}

pub fn diff_array<A, B>(
    before: &[A],
    after: &[B],
    is_same_type: impl FnMut(&A, &B) -> bool,
    mut on_diff_children: impl FnMut(&A, &B, usize, usize),
) -> DiffResult<B>
where
    A: Typed,
    B: Typed + Clone,
{
    let result = try_diff_array(before, after, is_same_type, |a, b, i, j| {
        on_diff_children(a, b, i, j);
        Ok::<(), Infallible>(())
    });
    match result {
        Ok(result) => result,
        Err(never) => match never {},
    }
}

/// One structural step produced by [`diff_array_action`].
#[derive(Debug)]
pub enum ArrayAction<'a, T, K> {
    /// Create `item` and insert it before `target` (or at the end).
    Insert { item: &'a K, target: Option<&'a T> },
    Remove { node: &'a T },
    /// Reinsert an existing entry before `target` (or at the end).
    Move { node: &'a T, target: Option<&'a T> },
}

#[derive(Debug, PartialEq)]
pub enum Placement<'a, T, K> {
    Kept(&'a T),
    Inserted(&'a K),
}

/// Replays `diff` over `before`, reporting each structural step in the order
/// a child list has to be edited, and returns the resulting order.
pub fn diff_array_action<'a, T, K, E>(
    before: &'a [T],
    diff: &'a DiffResult<K>,
    mut on_action: impl FnMut(ArrayAction<'a, T, K>) -> Result<(), E>,
) -> Result<Vec<Placement<'a, T, K>>, E> {
    if diff.is_empty() {
        return Ok(before.iter().map(Placement::Kept).collect());
    }

    let mut parked: HashMap<usize, &'a T> = HashMap::new();
    let mut result = Vec::with_capacity(before.len() + diff.inserts.len());
    let mut old_index = 0;
    let mut new_index = 0;
    let mut remain = diff.inserts.len();
    // Each iteration either advances `old_index` or places one pending entry.
    let mut budget = 2 * (before.len() + diff.inserts.len() + diff.moves.len()) + 1;

    loop {
        let old = before.get(old_index);
        if old.is_none() && remain == 0 {
            break;
        }
        if budget == 0 {
            log::error!(target: "snapshot.list_diff", "array diff replay did not converge");
            break;
        }
        budget -= 1;

        let mut keep = false;
        match old {
            Some(node) if diff.removals.binary_search(&old_index).is_ok() => {
                on_action(ArrayAction::Remove { node })?;
            }
            Some(node) if diff.moves.contains_key(&old_index) => {
                if let Some(&target_index) = diff.moves.get(&old_index) {
                    parked.insert(target_index, node);
                    remain += 1;
                }
            }
            _ => {
                if let Some(node) = parked.remove(&new_index) {
                    on_action(ArrayAction::Move { node, target: old })?;
                    result.push(Placement::Kept(node));
                    keep = true;
                    remain -= 1;
                } else if let Some(item) = diff.inserts.get(&new_index) {
                    on_action(ArrayAction::Insert { item, target: old })?;
                    result.push(Placement::Inserted(item));
                    keep = true;
                    remain -= 1;
                } else if let Some(node) = old {
                    result.push(Placement::Kept(node));
                } else {
                    log::error!(
                        target: "snapshot.list_diff",
                        "nothing to place at index {new_index} with {remain} pending"
                    );
                    break;
                }
                new_index += 1;
            }
        }
        if old.is_some() && !keep {
            old_index += 1;
        }
    }

    Ok(result)
}
