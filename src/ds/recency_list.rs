//! Recency-ordered doubly linked list backed by [`SlotArena`].
//!
//! Nodes are linked by [`SlotId`] rather than pointers, so the cache index can
//! hold a stable handle per entry and promote or unlink it in O(1).
//!
//! ```text
//!   head (MRU) ─► [id_4] ◄──► [id_1] ◄──► [id_7] ◄── tail (LRU)
//! ```
//!
//! New nodes enter at the head and eviction takes from the tail, so nodes
//! that were never touched again leave in insertion order.
//!
//! `debug_validate_invariants()` is available in debug/test builds.

use crate::ds::slot_arena::{SlotArena, SlotId};

#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

#[derive(Debug)]
pub struct RecencyList<T> {
    arena: SlotArena<Node<T>>,
    head: Option<SlotId>,
    tail: Option<SlotId>,
}

impl<T> RecencyList<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            arena: SlotArena::with_capacity(capacity),
            head: None,
            tail: None,
        }
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn contains(&self, id: SlotId) -> bool {
        self.arena.contains(id)
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.arena.get(id).map(|node| &node.value)
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.arena.get_mut(id).map(|node| &mut node.value)
    }

    /// Least recently used node.
    pub fn back_id(&self) -> Option<SlotId> {
        self.tail
    }

    /// Most recently used node.
    pub fn front_id(&self) -> Option<SlotId> {
        self.head
    }

    /// Inserts `value` as the most recently used node.
    pub fn push_front(&mut self, value: T) -> SlotId {
        let id = self.arena.insert(Node {
            value,
            prev: None,
            next: self.head,
        });
        match self.head {
            Some(head) => {
                if let Some(node) = self.arena.get_mut(head) {
                    node.prev = Some(id);
                }
            },
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        id
    }

    /// Unlinks `id` and returns its value.
    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        self.detach(id)?;
        self.arena.remove(id).map(|node| node.value)
    }

    /// Removes and returns the least recently used value.
    pub fn pop_back(&mut self) -> Option<T> {
        let id = self.tail?;
        self.remove(id)
    }

    /// Promotes `id` to most recently used; returns `false` if absent.
    pub fn move_to_front(&mut self, id: SlotId) -> bool {
        if !self.arena.contains(id) {
            return false;
        }
        if self.head == Some(id) {
            return true;
        }
        self.detach(id);
        self.attach_front(id);
        true
    }

    pub fn clear(&mut self) {
        self.arena.clear();
        self.head = None;
        self.tail = None;
    }

    /// Iterates ids from least to most recently used.
    pub fn iter_ids_lru(&self) -> LruIdIter<'_, T> {
        LruIdIter {
            list: self,
            current: self.tail,
        }
    }

    /// Iterates values from most to least recently used.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let mut current = self.head;
        std::iter::from_fn(move || {
            let node = self.arena.get(current?)?;
            current = node.next;
            Some(&node.value)
        })
    }

    fn detach(&mut self, id: SlotId) -> Option<()> {
        let (prev, next) = {
            let node = self.arena.get(id)?;
            (node.prev, node.next)
        };

        match prev {
            Some(prev_id) => {
                if let Some(prev_node) = self.arena.get_mut(prev_id) {
                    prev_node.next = next;
                }
            },
            None => self.head = next,
        }

        match next {
            Some(next_id) => {
                if let Some(next_node) = self.arena.get_mut(next_id) {
                    next_node.prev = prev;
                }
            },
            None => self.tail = prev,
        }

        let node = self.arena.get_mut(id)?;
        node.prev = None;
        node.next = None;
        Some(())
    }

    fn attach_front(&mut self, id: SlotId) -> Option<()> {
        let old_head = self.head;
        let node = self.arena.get_mut(id)?;
        node.prev = None;
        node.next = old_head;

        match old_head {
            Some(old_head) => {
                if let Some(head_node) = self.arena.get_mut(old_head) {
                    head_node.prev = Some(id);
                }
            },
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        Some(())
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        if self.head.is_none() || self.tail.is_none() {
            assert!(self.head.is_none());
            assert!(self.tail.is_none());
            assert_eq!(self.len(), 0);
            return;
        }

        let mut seen = std::collections::HashSet::new();
        let mut count = 0usize;
        let mut current = self.head;
        let mut prev = None;

        while let Some(id) = current {
            assert!(seen.insert(id), "cycle at {id:?}");
            let node = self.arena.get(id).expect("linked node missing from arena");
            assert_eq!(node.prev, prev);
            if node.next.is_none() {
                assert_eq!(self.tail, Some(id));
            }
            prev = Some(id);
            current = node.next;
            count += 1;
            assert!(count <= self.len());
        }

        assert_eq!(count, self.len());
    }
}

impl<T> Default for RecencyList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over ids from the tail (LRU) towards the head (MRU).
pub struct LruIdIter<'a, T> {
    list: &'a RecencyList<T>,
    current: Option<SlotId>,
}

impl<T> Iterator for LruIdIter<'_, T> {
    type Item = SlotId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        let node = self.list.arena.get(id)?;
        self.current = node.prev;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order<T: Clone>(list: &RecencyList<T>) -> Vec<T> {
        list.iter().cloned().collect()
    }

    #[test]
    fn push_front_orders_mru_first() {
        let mut list = RecencyList::new();
        list.push_front('a');
        list.push_front('b');
        list.push_front('c');
        assert_eq!(order(&list), vec!['c', 'b', 'a']);
        list.debug_validate_invariants();
    }

    #[test]
    fn pop_back_takes_oldest() {
        let mut list = RecencyList::new();
        for v in 1..=3 {
            list.push_front(v);
        }
        assert_eq!(list.pop_back(), Some(1));
        assert_eq!(list.pop_back(), Some(2));
        assert_eq!(list.pop_back(), Some(3));
        assert_eq!(list.pop_back(), None);
        list.debug_validate_invariants();
    }

    #[test]
    fn move_to_front_reorders() {
        let mut list = RecencyList::new();
        let a = list.push_front('a');
        let _b = list.push_front('b');
        let c = list.push_front('c');

        assert!(list.move_to_front(a));
        assert_eq!(order(&list), vec!['a', 'c', 'b']);
        assert!(list.move_to_front(a));
        assert_eq!(list.front_id(), Some(a));

        list.remove(c);
        assert!(!list.move_to_front(c));
        assert_eq!(order(&list), vec!['a', 'b']);
        list.debug_validate_invariants();
    }

    #[test]
    fn remove_middle_and_ends() {
        let mut list = RecencyList::new();
        let a = list.push_front(1);
        let b = list.push_front(2);
        let c = list.push_front(3);

        assert_eq!(list.remove(b), Some(2));
        list.debug_validate_invariants();
        assert_eq!(list.remove(c), Some(3));
        assert_eq!(list.front_id(), Some(a));
        assert_eq!(list.back_id(), Some(a));
        assert_eq!(list.remove(a), Some(1));
        assert!(list.is_empty());
        list.debug_validate_invariants();
    }

    #[test]
    fn iter_ids_lru_walks_tail_to_head() {
        let mut list = RecencyList::new();
        let a = list.push_front('a');
        let b = list.push_front('b');
        let c = list.push_front('c');
        assert_eq!(list.iter_ids_lru().collect::<Vec<_>>(), vec![a, b, c]);
    }
}
