//! Storage block: the order sequence plus the key index over it.
//!
//! The order sequence is a generational arena of nodes threaded into a
//! doubly linked list, so positions are stable `SlotId`s rather than
//! addresses. The index maps a key's precomputed hash to the slot that
//! holds it. A block is shared between map instances behind an `Rc`;
//! everything here assumes the caller already holds it exclusively when
//! mutating.

use crate::reentrancy::ProbeGuard;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::iter::FusedIterator;
use hashbrown::HashTable;
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Stable position of an entry in the order sequence.
    pub(crate) struct SlotId;
}

#[derive(Clone, Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    hash: u64,
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

pub(crate) struct Storage<K, V, S> {
    hasher: S,
    order: SlotMap<SlotId, Node<K, V>>,
    head: Option<SlotId>,
    tail: Option<SlotId>,
    index: HashTable<SlotId>,
    probe: ProbeGuard,
}

impl<K, V, S> Clone for Storage<K, V, S>
where
    K: Clone,
    V: Clone,
    S: Clone,
{
    fn clone(&self) -> Self {
        // Order sequence first: the index stores slot ids, which the arena
        // copy preserves, so the copied index resolves into the copied arena.
        let order = self.order.clone();
        let index = self.index.clone();
        Self {
            hasher: self.hasher.clone(),
            order,
            head: self.head,
            tail: self.tail,
            index,
            probe: ProbeGuard::new(),
        }
    }
}

impl<K, V, S> Storage<K, V, S> {
    pub(crate) fn with_hasher(hasher: S) -> Self {
        Self {
            hasher,
            order: SlotMap::with_key(),
            head: None,
            tail: None,
            index: HashTable::new(),
            probe: ProbeGuard::new(),
        }
    }

    pub(crate) fn hasher(&self) -> &S {
        &self.hasher
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn value(&self, id: SlotId) -> &V {
        &self.order[id].value
    }

    pub(crate) fn value_mut(&mut self, id: SlotId) -> &mut V {
        &mut self.order[id].value
    }

    pub(crate) fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            order: &self.order,
            cursor: self.head,
            remaining: self.order.len(),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.index.clear();
        self.order.clear();
        self.head = None;
        self.tail = None;
    }

    fn push_back(&mut self, key: K, value: V, hash: u64) -> SlotId {
        let id = self.order.insert(Node {
            key,
            value,
            hash,
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(t) => self.order[t].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        let order = &self.order;
        self.index.insert_unique(hash, id, |&other| order[other].hash);
        id
    }

    fn unlink(&mut self, id: SlotId) {
        let (prev, next) = {
            let node = &self.order[id];
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.order[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.order[n].prev = prev,
            None => self.tail = prev,
        }
    }

    fn move_to_back(&mut self, id: SlotId) {
        if self.tail == Some(id) {
            return;
        }
        self.unlink(id);
        let tail = self.tail;
        {
            let node = &mut self.order[id];
            node.prev = tail;
            node.next = None;
        }
        match tail {
            Some(t) => self.order[t].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
    }
}

impl<K, V, S> Storage<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Hash `q` and probe the index. This is the only place user `Hash`/`Eq`
    /// code runs, so it is the guarded section.
    fn locate<Q>(&self, q: &Q) -> (u64, Option<SlotId>)
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _scope = self.probe.enter();
        let hash = self.hasher.hash_one(q);
        let order = &self.order;
        let found = self
            .index
            .find(hash, |&id| order[id].key.borrow() == q)
            .copied();
        (hash, found)
    }

    pub(crate) fn find<Q>(&self, q: &Q) -> Option<SlotId>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.locate(q).1
    }

    pub(crate) fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find(q).is_some()
    }

    /// Returns true when the key was new. An existing key gets the new value
    /// and moves to the back of the order.
    pub(crate) fn insert(&mut self, key: K, value: V) -> bool {
        let (hash, found) = self.locate(&key);
        match found {
            Some(id) => {
                self.order[id].value = value;
                self.move_to_back(id);
                false
            }
            None => {
                self.push_back(key, value, hash);
                true
            }
        }
    }

    /// Existing keys keep their value and position; `default` only runs on a miss.
    pub(crate) fn get_or_insert_with<F>(&mut self, key: K, default: F) -> SlotId
    where
        F: FnOnce() -> V,
    {
        let (hash, found) = self.locate(&key);
        match found {
            Some(id) => id,
            None => self.push_back(key, default(), hash),
        }
    }

    /// Merge step: a present key keeps its value and moves to the back;
    /// a missing key is appended with a copy of `value`. Returns true when
    /// the key was new.
    pub(crate) fn merge_entry(&mut self, key: &K, value: &V) -> bool
    where
        K: Clone,
        V: Clone,
    {
        let (hash, found) = self.locate(key);
        match found {
            Some(id) => {
                self.move_to_back(id);
                false
            }
            None => {
                self.push_back(key.clone(), value.clone(), hash);
                true
            }
        }
    }

    pub(crate) fn remove<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let id = self.locate(q).1?;
        self.unlink(id);
        let node = self.order.remove(id)?;
        if let Ok(entry) = self.index.find_entry(node.hash, |&other| other == id) {
            entry.remove();
        }
        Some((node.key, node.value))
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        assert_eq!(self.index.len(), self.order.len(), "index/order size");

        let mut seen = 0usize;
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let node = &self.order[id];
            assert_eq!(node.prev, prev, "broken back link");
            assert_eq!(node.hash, self.hasher.hash_one(&node.key), "stale hash");
            let indexed = self.index.find(node.hash, |&other| other == id);
            assert!(indexed.is_some(), "node missing from index");
            seen += 1;
            prev = Some(id);
            cursor = node.next;
        }
        assert_eq!(self.tail, prev, "tail does not end the list");
        assert_eq!(seen, self.order.len(), "list does not cover the arena");
    }
}

/// Iterator over entries in order-sequence order.
pub struct Iter<'a, K, V> {
    order: &'a SlotMap<SlotId, Node<K, V>>,
    cursor: Option<SlotId>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let node = &self.order[id];
        self.cursor = node.next;
        self.remaining -= 1;
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            order: self.order,
            cursor: self.cursor,
            remaining: self.remaining,
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}
