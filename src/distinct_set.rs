//! An intrusive, dense-vector-backed disjoint set collection.
//!
//! Each element is either `Not` a member of any set (the default,
//! covering both true singletons and elements never linked), the `Head`
//! (the set's deterministic representative — always its numerically
//! smallest member), or `Tail` (any other member; `Tail` elements are
//! conventionally hidden from default iteration, since callers address
//! the whole set through its `Head`).
//!
//! Storage is a flat `Vec` of `(prev, next, opposite)` triples indexed by
//! the element's own `HandleId`, so every operation below — `link`,
//! `add`, `remove`, `merge`, `classify` — is O(1): no traversal is ever
//! needed to find a set's head, because callers are expected to track the
//! representative they were handed (mirroring how
//! [`crate::mutable_graph`] and [`crate::component_tracker`] cache the
//! component/merge-class handle on each element rather than recomputing
//! it).

use std::marker::PhantomData;

use crate::handle::HandleId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position {
    /// Not a member of any multi-element set.
    Not,
    /// The deterministic representative (numerically smallest member).
    Head,
    /// Any non-head member.
    Tail,
}

#[derive(Clone, Copy)]
struct Entry<K> {
    prev: HandleId<K>,
    next: HandleId<K>,
    /// Set only on the head (-> current far end) and the far end itself
    /// (-> head), giving O(1) access to "the other end of the chain"
    /// without walking it. Null on interior members.
    opposite: HandleId<K>,
}

impl<K> Default for Entry<K> {
    fn default() -> Self {
        Self {
            prev: HandleId::null(),
            next: HandleId::null(),
            opposite: HandleId::null(),
        }
    }
}

pub struct DistinctSetCollection<K> {
    entries: Vec<Entry<K>>,
    _kind: PhantomData<K>,
}

impl<K> Default for DistinctSetCollection<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> DistinctSetCollection<K> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            _kind: PhantomData,
        }
    }

    /// Grows backing storage so every handle up to `capacity - 1` has an
    /// entry. Newly added slots start as `Not`.
    pub fn ensure_capacity(&mut self, capacity: usize) {
        if self.entries.len() < capacity {
            self.entries.resize_with(capacity, Entry::default);
        }
    }

    fn entry(&self, h: HandleId<K>) -> &Entry<K> {
        &self.entries[h.index().expect("DistinctSetCollection: null handle")]
    }

    fn entry_mut(&mut self, h: HandleId<K>) -> &mut Entry<K> {
        &mut self.entries[h.index().expect("DistinctSetCollection: null handle")]
    }

    /// `Not` / `Head` / `Tail`, in O(1).
    pub fn classify(&self, h: HandleId<K>) -> Position {
        let e = self.entry(h);
        if e.prev.is_null() && e.next.is_null() && e.opposite.is_null() {
            Position::Not
        } else if e.prev.is_null() {
            Position::Head
        } else {
            Position::Tail
        }
    }

    pub fn is_grouped(&self, h: HandleId<K>) -> bool {
        self.classify(h) != Position::Not
    }

    /// Joins two previously-ungrouped elements (`classify` must be `Not`
    /// for both) into a new two-element set. Returns the set's head
    /// (the smaller of the two).
    pub fn link(&mut self, a: HandleId<K>, b: HandleId<K>) -> HandleId<K> {
        debug_assert_eq!(self.classify(a), Position::Not);
        debug_assert_eq!(self.classify(b), Position::Not);
        let (head, tail) = if a < b { (a, b) } else { (b, a) };
        *self.entry_mut(head) = Entry {
            prev: HandleId::null(),
            next: tail,
            opposite: tail,
        };
        *self.entry_mut(tail) = Entry {
            prev: head,
            next: HandleId::null(),
            opposite: head,
        };
        head
    }

    /// Adds a previously-ungrouped `elem` to the set represented by
    /// `head`. Returns the set's (possibly new) head.
    pub fn add(&mut self, head: HandleId<K>, elem: HandleId<K>) -> HandleId<K> {
        debug_assert_eq!(self.classify(head), Position::Head);
        debug_assert_eq!(self.classify(elem), Position::Not);

        let far_end = self.entry(head).opposite;

        if elem < head {
            let old_head_next = self.entry(head).next;
            *self.entry_mut(elem) = Entry {
                prev: HandleId::null(),
                next: head,
                opposite: far_end,
            };
            *self.entry_mut(head) = Entry {
                prev: elem,
                next: old_head_next,
                opposite: HandleId::null(),
            };
            self.entry_mut(far_end).opposite = elem;
            elem
        } else {
            let far_end_prev = self.entry(far_end).prev;
            *self.entry_mut(far_end) = Entry {
                prev: far_end_prev,
                next: elem,
                opposite: HandleId::null(),
            };
            *self.entry_mut(elem) = Entry {
                prev: far_end,
                next: HandleId::null(),
                opposite: head,
            };
            self.entry_mut(head).opposite = elem;
            head
        }
    }

    /// Removes `elem` from the set represented by `head`. Returns
    /// `Some(new_head)` if the set still has two or more members
    /// afterward (`new_head == head` unless `elem` was the head), or
    /// `None` if the set collapsed to a singleton (now `Not`).
    pub fn remove(&mut self, head: HandleId<K>, elem: HandleId<K>) -> Option<HandleId<K>> {
        debug_assert_eq!(self.classify(head), Position::Head);

        if elem == head {
            let far_end = self.entry(head).opposite;
            let new_head = self.entry(head).next;
            *self.entry_mut(head) = Entry::default();
            if new_head == far_end {
                *self.entry_mut(far_end) = Entry::default();
                None
            } else {
                self.entry_mut(new_head).prev = HandleId::null();
                self.entry_mut(new_head).opposite = far_end;
                self.entry_mut(far_end).opposite = new_head;
                Some(new_head)
            }
        } else if elem == self.entry(head).opposite {
            let far_end = elem;
            let new_far_end = self.entry(far_end).prev;
            *self.entry_mut(far_end) = Entry::default();
            if new_far_end == head {
                *self.entry_mut(head) = Entry::default();
                None
            } else {
                self.entry_mut(new_far_end).next = HandleId::null();
                self.entry_mut(new_far_end).opposite = head;
                self.entry_mut(head).opposite = new_far_end;
                Some(head)
            }
        } else {
            debug_assert_eq!(self.classify(elem), Position::Tail);
            let p = self.entry(elem).prev;
            let n = self.entry(elem).next;
            self.entry_mut(p).next = n;
            self.entry_mut(n).prev = p;
            *self.entry_mut(elem) = Entry::default();
            Some(head)
        }
    }

    /// Splices two multi-element sets (each `classify(head) == Head`)
    /// into one. Returns the merged set's head (the smaller of the two
    /// inputs).
    pub fn merge(&mut self, head_a: HandleId<K>, head_b: HandleId<K>) -> HandleId<K> {
        debug_assert_eq!(self.classify(head_a), Position::Head);
        debug_assert_eq!(self.classify(head_b), Position::Head);
        debug_assert_ne!(head_a, head_b);

        let (new_head, other_head) = if head_a < head_b {
            (head_a, head_b)
        } else {
            (head_b, head_a)
        };

        let tail_of_new_head = self.entry(new_head).opposite;
        let tail_of_other = self.entry(other_head).opposite;

        self.entry_mut(tail_of_new_head).next = other_head;
        self.entry_mut(tail_of_new_head).opposite = HandleId::null();
        self.entry_mut(other_head).prev = tail_of_new_head;
        self.entry_mut(other_head).opposite = HandleId::null();

        self.entry_mut(new_head).opposite = tail_of_other;
        self.entry_mut(tail_of_other).opposite = new_head;

        new_head
    }

    /// Iterates every member of the set represented by `head`, starting
    /// with the head itself.
    pub fn iter(&self, head: HandleId<K>) -> Iter<'_, K> {
        debug_assert_eq!(self.classify(head), Position::Head);
        Iter {
            set: self,
            next: Some(head),
        }
    }
}

pub struct Iter<'a, K> {
    set: &'a DistinctSetCollection<K>,
    next: Option<HandleId<K>>,
}

impl<'a, K> Iterator for Iter<'a, K> {
    type Item = HandleId<K>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        let nxt = self.set.entry(current).next;
        self.next = if nxt.is_null() { None } else { Some(nxt) };
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::NodeKind;

    type Set = DistinctSetCollection<NodeKind>;
    type H = HandleId<NodeKind>;

    fn h(v: i64) -> H {
        HandleId::new(v)
    }

    #[test]
    fn fresh_elements_are_not_grouped() {
        let mut s = Set::new();
        s.ensure_capacity(4);
        assert_eq!(s.classify(h(0)), Position::Not);
    }

    #[test]
    fn link_creates_head_and_tail() {
        let mut s = Set::new();
        s.ensure_capacity(4);
        let head = s.link(h(2), h(1));
        assert_eq!(head, h(1));
        assert_eq!(s.classify(h(1)), Position::Head);
        assert_eq!(s.classify(h(2)), Position::Tail);
        let members: Vec<_> = s.iter(head).collect();
        assert_eq!(members, vec![h(1), h(2)]);
    }

    #[test]
    fn add_smaller_element_becomes_new_head() {
        let mut s = Set::new();
        s.ensure_capacity(5);
        let head = s.link(h(3), h(4));
        let head = s.add(head, h(1));
        assert_eq!(head, h(1));
        assert_eq!(s.classify(h(1)), Position::Head);
        assert_eq!(s.classify(h(3)), Position::Tail);
        assert_eq!(s.classify(h(4)), Position::Tail);
        let members: Vec<_> = s.iter(head).collect();
        assert_eq!(members.len(), 3);
        assert!(members.contains(&h(3)));
        assert!(members.contains(&h(4)));
    }

    #[test]
    fn add_larger_element_keeps_head() {
        let mut s = Set::new();
        s.ensure_capacity(5);
        let head = s.link(h(1), h(2));
        let head2 = s.add(head, h(4));
        assert_eq!(head2, head);
        assert_eq!(s.classify(h(4)), Position::Tail);
    }

    #[test]
    fn remove_interior_keeps_head() {
        let mut s = Set::new();
        s.ensure_capacity(6);
        let head = s.link(h(1), h(2));
        let head = s.add(head, h(3));
        let head = s.add(head, h(4)); // 1,2,3,4 in some chain order
        let remaining = s.remove(head, h(3)).unwrap();
        assert_eq!(remaining, head);
        assert_eq!(s.classify(h(3)), Position::Not);
        let members: Vec<_> = s.iter(remaining).collect();
        assert_eq!(members.len(), 3);
    }

    #[test]
    fn remove_head_promotes_next() {
        let mut s = Set::new();
        s.ensure_capacity(4);
        let head = s.link(h(1), h(2));
        let head = s.add(head, h(3));
        let new_head = s.remove(head, h(1)).unwrap();
        assert_ne!(new_head, head);
        assert_eq!(s.classify(new_head), Position::Head);
        assert_eq!(s.classify(h(1)), Position::Not);
    }

    #[test]
    fn remove_down_to_singleton_clears_both() {
        let mut s = Set::new();
        s.ensure_capacity(4);
        let head = s.link(h(1), h(2));
        assert!(s.remove(head, h(1)).is_none());
        assert_eq!(s.classify(h(1)), Position::Not);
        assert_eq!(s.classify(h(2)), Position::Not);
    }

    #[test]
    fn merge_two_sets_picks_smaller_head() {
        let mut s = Set::new();
        s.ensure_capacity(8);
        let head_a = s.link(h(5), h(6));
        let head_b = s.link(h(1), h(2));
        let merged = s.merge(head_a, head_b);
        assert_eq!(merged, h(1));
        let members: Vec<_> = s.iter(merged).collect();
        assert_eq!(members.len(), 4);
        for x in [h(1), h(2), h(5), h(6)] {
            assert!(members.contains(&x));
            assert_ne!(s.classify(x), Position::Not);
        }
    }

    #[test]
    fn merge_then_drain_all_members_one_by_one() {
        let mut s = Set::new();
        s.ensure_capacity(8);
        let head_a = s.link(h(0), h(3));
        let head_b = s.link(h(1), h(2));
        let mut head = s.merge(head_a, head_b);

        for victim in [h(3), h(2)] {
            head = s.remove(head, victim).expect("still >= 2 members");
        }
        // exactly two members (h(0), h(1)) remain; removing the head
        // collapses the set to a singleton.
        assert!(s.remove(head, head).is_none());
        for x in [h(0), h(1), h(2), h(3)] {
            assert_eq!(s.classify(x), Position::Not);
        }
    }
}
