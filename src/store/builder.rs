//! Balanced index builder.
//!
//! Turns a chain of entries already sorted by name (linked through `higher`,
//! the way a bulk load leaves them) into a binary search tree of height at
//! most ⌈log2(n+1)⌉, in one linear pass.
//!
//! The pass maintains up to 32 slots where slot `i` holds at most one
//! subtree of 2^i nodes whose root still has a free `higher` side. Each entry
//! enters as a singleton and is folded into the slot array the way a binary
//! counter increments: occupied slots are emptied from slot 0 upward, their
//! subtrees chained beneath the candidate's `lower` side (attaching to each
//! other through `higher`, which preserves sorted order), and the grown
//! candidate lands in the first empty slot. At the end the occupied slots are
//! linked together from smallest to largest through the roots' free `higher`
//! sides; the largest becomes the root of the whole tree.

use super::arena::{Arena, NodeId};

/// Rebuilds the tree from the sorted chain starting at `head`. Returns the
/// root of the new tree, or `None` for an empty chain.
pub(crate) fn build_index(arena: &mut Arena, head: Option<NodeId>) -> Option<NodeId> {
    let mut slots: [Option<NodeId>; 32] = [None; 32];

    let mut curr = head;
    while let Some(id) = curr {
        let next = arena.get(id).higher;
        arena.get_mut(id).higher = None;

        let mut lower = None;
        let mut i = 0;
        while let Some(subtree) = slots[i] {
            arena.get_mut(subtree).higher = lower;
            lower = Some(subtree);
            slots[i] = None;
            i += 1;
        }
        slots[i] = Some(id);
        arena.get_mut(id).lower = lower;

        curr = next;
    }

    let mut root = None;
    for slot in slots.into_iter().flatten() {
        if let Some(prev) = root {
            arena.get_mut(slot).higher = Some(prev);
        }
        root = Some(slot);
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::arena::Entry;
    use crate::types::{BuiltinCatalog, WidthClass};

    fn chain(arena: &mut Arena, n: usize) -> Option<NodeId> {
        let mut head = None;
        let mut tail: Option<NodeId> = None;
        for i in 0..n {
            let entry = Entry::new(
                &format!("var{i:05}"),
                BuiltinCatalog::INT4,
                WidthClass::Fixed(4),
                false,
                None,
            );
            let id = arena.insert(entry);
            match tail {
                None => head = Some(id),
                Some(t) => arena.get_mut(t).higher = Some(id),
            }
            tail = Some(id);
        }
        head
    }

    fn in_order(arena: &Arena, root: Option<NodeId>, out: &mut Vec<String>) {
        if let Some(id) = root {
            let entry = arena.get(id);
            in_order(arena, entry.lower, out);
            out.push(entry.name().to_string());
            in_order(arena, arena.get(id).higher, out);
        }
    }

    fn height(arena: &Arena, root: Option<NodeId>) -> usize {
        match root {
            None => 0,
            Some(id) => {
                let entry = arena.get(id);
                1 + height(arena, entry.lower).max(height(arena, entry.higher))
            }
        }
    }

    fn log2_bound(n: usize) -> usize {
        ((n + 1) as f64).log2().ceil() as usize
    }

    #[test]
    fn test_empty_chain() {
        let mut arena = Arena::new();
        assert_eq!(build_index(&mut arena, None), None);
    }

    #[test]
    fn test_in_order_matches_input_order() {
        for n in [1, 2, 3, 7, 8, 100] {
            let mut arena = Arena::new();
            let head = chain(&mut arena, n);
            let root = build_index(&mut arena, head);
            let mut names = Vec::new();
            in_order(&arena, root, &mut names);
            assert_eq!(names.len(), n);
            let mut sorted = names.clone();
            sorted.sort();
            assert_eq!(names, sorted, "in-order broken for n={n}");
        }
    }

    #[test]
    fn test_height_bound() {
        for n in [1, 2, 3, 4, 7, 8, 15, 16, 31, 33, 100, 1000] {
            let mut arena = Arena::new();
            let head = chain(&mut arena, n);
            let root = build_index(&mut arena, head);
            let h = height(&arena, root);
            assert!(
                h <= log2_bound(n),
                "height {h} exceeds bound {} for n={n}",
                log2_bound(n)
            );
        }
    }

    #[test]
    fn test_perfect_tree_for_power_of_two_minus_one() {
        let mut arena = Arena::new();
        let head = chain(&mut arena, 7);
        let root = build_index(&mut arena, head).unwrap();
        // 7 nodes build a perfect tree of height 3 rooted at the middle name
        assert_eq!(arena.get(root).name(), "var00003");
        assert_eq!(height(&arena, Some(root)), 3);
    }
}
