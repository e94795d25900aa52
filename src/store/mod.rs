//! Variable store
//!
//! # Architecture
//!
//! The store is a binary search tree over entry names, byte-wise ordered,
//! living in an index-based [`arena`]:
//!
//! ```text
//! VariableStore
//!   ├─→ Arena (slab of Entry slots, NodeId links)
//!   ├─→ search / insert / remove   (tree maintenance)
//!   └─→ rebuild_from_sorted        (bulk load via the balanced builder)
//! ```
//!
//! The tree is rebuilt wholesale from sorted input at load time and then
//! maintained incrementally without rebalancing; lookups stay logarithmic as
//! long as the churn between reloads is modest, which is the intended usage.

pub mod arena;
mod builder;

pub use arena::{Arena, Entry, NodeId};

use std::cmp::Ordering;

use tracing::trace;

use crate::error::{Error, Result};

/// Which child slot of a parent a search fell off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Lower,
    Higher,
}

/// Result of a name search.
///
/// A miss carries the leaf under which an insert would attach, so callers
/// that insert right after searching do not descend twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    Found(NodeId),
    Empty,
    Miss { parent: NodeId, side: Side },
}

/// The in-memory index of all entries of one session.
#[derive(Debug, Default)]
pub struct VariableStore {
    arena: Arena,
    root: Option<NodeId>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn entry(&self, id: NodeId) -> &Entry {
        self.arena.get(id)
    }

    pub(crate) fn entry_mut(&mut self, id: NodeId) -> &mut Entry {
        self.arena.get_mut(id)
    }

    /// Descends the tree comparing names byte-wise.
    pub fn search(&self, name: &str) -> SearchOutcome {
        let Some(mut curr) = self.root else {
            return SearchOutcome::Empty;
        };
        loop {
            let entry = self.arena.get(curr);
            match name.cmp(entry.name()) {
                Ordering::Less => match entry.lower {
                    Some(next) => curr = next,
                    None => return SearchOutcome::Miss { parent: curr, side: Side::Lower },
                },
                Ordering::Greater => match entry.higher {
                    Some(next) => curr = next,
                    None => return SearchOutcome::Miss { parent: curr, side: Side::Higher },
                },
                Ordering::Equal => return SearchOutcome::Found(curr),
            }
        }
    }

    /// Attaches a new entry under its search position.
    pub fn insert(&mut self, entry: Entry) -> Result<NodeId> {
        match self.search(entry.name()) {
            SearchOutcome::Found(_) => Err(Error::AlreadyExists(entry.name().to_string())),
            SearchOutcome::Empty => {
                let id = self.arena.insert(entry);
                self.root = Some(id);
                Ok(id)
            }
            SearchOutcome::Miss { parent, side } => {
                trace!(name = entry.name(), parent = %parent, "attaching under parent");
                let id = self.arena.insert(entry);
                self.set_link(Some((parent, side)), Some(id));
                Ok(id)
            }
        }
    }

    /// Detaches the named entry from the tree and returns it.
    ///
    /// With zero or one child the remaining child is spliced into the
    /// parent's slot. With two children the in-order predecessor (rightmost
    /// node of the `lower` subtree) is promoted into the removed node's
    /// position, inheriting both of its children.
    pub fn remove(&mut self, name: &str) -> Result<Entry> {
        let mut parent: Option<(NodeId, Side)> = None;
        let mut curr = self.root;
        while let Some(id) = curr {
            let entry = self.arena.get(id);
            match name.cmp(entry.name()) {
                Ordering::Less => {
                    parent = Some((id, Side::Lower));
                    curr = entry.lower;
                }
                Ordering::Greater => {
                    parent = Some((id, Side::Higher));
                    curr = entry.higher;
                }
                Ordering::Equal => break,
            }
        }
        let Some(victim) = curr else {
            return Err(Error::NotFound(name.to_string()));
        };

        let (lower, higher) = {
            let entry = self.arena.get(victim);
            (entry.lower, entry.higher)
        };
        let replacement = match (lower, higher) {
            (None, child) | (child, None) => child,
            (Some(lower), Some(higher)) => {
                let mut above = None;
                let mut pred = lower;
                while let Some(next) = self.arena.get(pred).higher {
                    above = Some(pred);
                    pred = next;
                }
                if let Some(above) = above {
                    // detach the predecessor, handing its lower subtree to
                    // its old parent's higher slot
                    let orphaned = self.arena.get(pred).lower;
                    self.arena.get_mut(above).higher = orphaned;
                    self.arena.get_mut(pred).lower = Some(lower);
                }
                self.arena.get_mut(pred).higher = Some(higher);
                Some(pred)
            }
        };
        self.set_link(parent, replacement);

        let mut entry = self.arena.remove(victim);
        entry.lower = None;
        entry.higher = None;
        trace!(name, "removed entry");
        Ok(entry)
    }

    /// Drops the whole tree. Every entry's owned content is released here.
    pub fn clear(&mut self) {
        self.arena.clear();
        self.root = None;
    }

    /// Replaces the tree with the given entries, which must arrive in
    /// ascending name order. The entries are first chained through their
    /// `higher` links and then folded into a height-bounded tree.
    pub fn rebuild_from_sorted(&mut self, entries: impl IntoIterator<Item = Entry>) {
        self.clear();
        let mut head = None;
        let mut tail: Option<NodeId> = None;
        for entry in entries {
            let id = self.arena.insert(entry);
            match tail {
                None => head = Some(id),
                Some(tail) => self.arena.get_mut(tail).higher = Some(id),
            }
            tail = Some(id);
        }
        self.root = builder::build_index(&mut self.arena, head);
    }

    /// In-order traversal, ascending by name.
    pub fn iter(&self) -> InOrder<'_> {
        InOrder { store: self, stack: Vec::new(), curr: self.root }
    }

    /// Tree height; 0 for an empty tree.
    pub fn height(&self) -> usize {
        let mut max = 0;
        let mut stack = Vec::new();
        if let Some(root) = self.root {
            stack.push((root, 1));
        }
        while let Some((id, depth)) = stack.pop() {
            max = max.max(depth);
            let entry = self.arena.get(id);
            if let Some(lower) = entry.lower {
                stack.push((lower, depth + 1));
            }
            if let Some(higher) = entry.higher {
                stack.push((higher, depth + 1));
            }
        }
        max
    }

    fn set_link(&mut self, parent: Option<(NodeId, Side)>, child: Option<NodeId>) {
        match parent {
            None => self.root = child,
            Some((id, Side::Lower)) => self.arena.get_mut(id).lower = child,
            Some((id, Side::Higher)) => self.arena.get_mut(id).higher = child,
        }
    }
}

/// Iterative in-order iterator over the tree.
pub struct InOrder<'a> {
    store: &'a VariableStore,
    stack: Vec<NodeId>,
    curr: Option<NodeId>,
}

impl<'a> Iterator for InOrder<'a> {
    type Item = &'a Entry;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.curr {
            self.stack.push(id);
            self.curr = self.store.arena.get(id).lower;
        }
        let id = self.stack.pop()?;
        let entry = self.store.arena.get(id);
        self.curr = entry.higher;
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BuiltinCatalog, WidthClass};

    fn entry(name: &str) -> Entry {
        Entry::new(
            name,
            BuiltinCatalog::INT4,
            WidthClass::Fixed(4),
            false,
            None,
        )
    }

    fn store_of(names: &[&str]) -> VariableStore {
        let mut store = VariableStore::new();
        for name in names {
            store.insert(entry(name)).unwrap();
        }
        store
    }

    fn names(store: &VariableStore) -> Vec<&str> {
        store.iter().map(|e| e.name()).collect()
    }

    fn assert_sorted(store: &VariableStore) {
        let list = names(store);
        let mut sorted = list.clone();
        sorted.sort();
        assert_eq!(list, sorted);
    }

    #[test]
    fn test_search_empty_tree() {
        let store = VariableStore::new();
        assert_eq!(store.search("x"), SearchOutcome::Empty);
    }

    #[test]
    fn test_insert_then_search_finds_it() {
        let store = store_of(&["m", "d", "t"]);
        match store.search("d") {
            SearchOutcome::Found(id) => assert_eq!(store.entry(id).name(), "d"),
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[test]
    fn test_miss_reports_insertion_parent() {
        let store = store_of(&["m", "d", "t"]);
        match store.search("a") {
            SearchOutcome::Miss { parent, side } => {
                assert_eq!(store.entry(parent).name(), "d");
                assert_eq!(side, Side::Lower);
            }
            other => panic!("expected Miss, got {other:?}"),
        }
        match store.search("z") {
            SearchOutcome::Miss { parent, side } => {
                assert_eq!(store.entry(parent).name(), "t");
                assert_eq!(side, Side::Higher);
            }
            other => panic!("expected Miss, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_insert_fails() {
        let mut store = store_of(&["m"]);
        assert!(matches!(
            store.insert(entry("m")),
            Err(Error::AlreadyExists(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_missing_fails() {
        let mut store = store_of(&["m"]);
        assert!(matches!(store.remove("q"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_remove_leaf() {
        let mut store = store_of(&["m", "d", "t"]);
        let removed = store.remove("d").unwrap();
        assert_eq!(removed.name(), "d");
        assert_eq!(names(&store), vec!["m", "t"]);
        assert_sorted(&store);
    }

    #[test]
    fn test_remove_node_with_one_child() {
        let mut store = store_of(&["m", "d", "b"]);
        store.remove("d").unwrap();
        assert_eq!(names(&store), vec!["b", "m"]);
        assert!(matches!(store.search("b"), SearchOutcome::Found(_)));
    }

    #[test]
    fn test_remove_node_with_two_children_promotes_predecessor() {
        // the predecessor of "m" is "h", a direct child
        let mut store = store_of(&["m", "d", "t", "b", "h"]);
        store.remove("m").unwrap();
        assert_eq!(names(&store), vec!["b", "d", "h", "t"]);
        assert_sorted(&store);
    }

    #[test]
    fn test_remove_root_with_deep_predecessor() {
        // predecessor of "m" is "k", buried under "d" with a lower child "j"
        let mut store = store_of(&["m", "d", "t", "b", "k", "j", "z"]);
        store.remove("m").unwrap();
        assert_eq!(names(&store), vec!["b", "d", "j", "k", "t", "z"]);
        assert_sorted(&store);
        // everything is still reachable by search
        for name in ["b", "d", "j", "k", "t", "z"] {
            assert!(
                matches!(store.search(name), SearchOutcome::Found(_)),
                "{name} lost after remove"
            );
        }
    }

    #[test]
    fn test_remove_then_search_reports_not_found() {
        let mut store = store_of(&["m", "d", "t"]);
        store.remove("t").unwrap();
        assert!(!matches!(store.search("t"), SearchOutcome::Found(_)));
    }

    #[test]
    fn test_in_order_stays_sorted_through_churn() {
        let mut store = VariableStore::new();
        for i in [5, 3, 8, 1, 4, 7, 9, 2, 6, 0] {
            store.insert(entry(&format!("v{i}"))).unwrap();
        }
        store.remove("v5").unwrap();
        store.remove("v0").unwrap();
        store.insert(entry("v5")).unwrap();
        store.remove("v9").unwrap();
        assert_sorted(&store);
        assert_eq!(store.len(), 8);
    }

    #[test]
    fn test_rebuild_from_sorted_bounds_height() {
        let mut store = VariableStore::new();
        let entries: Vec<Entry> = (0..1000).map(|i| entry(&format!("var{i:05}"))).collect();
        store.rebuild_from_sorted(entries);
        assert_eq!(store.len(), 1000);
        assert_sorted(&store);
        // ceil(log2(1001)) = 10
        assert!(store.height() <= 10, "height {} too large", store.height());
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut store = store_of(&["a", "b", "c"]);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.search("a"), SearchOutcome::Empty);
    }
}
