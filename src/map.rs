//! InsertionOrderedMap: copy-on-write handle over a shared storage block.
//!
//! Each map holds an `Rc` to a storage block plus an `exposed` flag. The
//! flag is set whenever a `&mut V` into the block is handed out and is
//! cleared by any operation that forks or discards the block. Clones
//! share the block only while the source is not exposed; an exposed
//! source is deep-copied so a mutable reference taken from it can never
//! be observed through the copy.

use crate::error::KeyNotFound;
use crate::storage::{Iter, Storage};
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::iter::FusedIterator;
use core::ops::Index;
use log::trace;
use std::collections::hash_map::RandomState;
use std::rc::Rc;

pub struct InsertionOrderedMap<K, V, S = RandomState> {
    storage: Rc<Storage<K, V, S>>,
    exposed: bool,
}

impl<K, V> InsertionOrderedMap<K, V> {
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }
}

impl<K, V, S: Default> Default for InsertionOrderedMap<K, V, S> {
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> InsertionOrderedMap<K, V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            storage: Rc::new(Storage::with_hasher(hasher)),
            exposed: false,
        }
    }

    pub fn hasher(&self) -> &S {
        self.storage.hasher()
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Entries in order: first insertion, or most recent re-insertion.
    pub fn iter(&self) -> Iter<'_, K, V> {
        self.storage.iter()
    }

    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// True when both maps currently read from the same storage block.
    pub fn shares_storage_with(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.storage, &other.storage)
    }

    #[cfg(test)]
    pub(crate) fn is_exposed(&self) -> bool {
        self.exposed
    }
}

#[cfg(test)]
impl<K, V, S> InsertionOrderedMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    pub(crate) fn assert_consistent(&self) {
        assert!(
            !self.exposed || Rc::strong_count(&self.storage) == 1,
            "exposed map shares its storage"
        );
        self.storage.assert_consistent();
    }
}

impl<K, V, S> InsertionOrderedMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.storage.contains_key(q)
    }

    /// Read-only lookup. Never forks and never marks the map exposed.
    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.storage.find(q).map(|id| self.storage.value(id))
    }

    /// Read-only lookup that fails with `KeyNotFound` on a missing key.
    pub fn at<Q>(&self, q: &Q) -> Result<&V, KeyNotFound>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get(q).ok_or(KeyNotFound)
    }
}

impl<K, V, S> InsertionOrderedMap<K, V, S>
where
    K: Eq + Hash + Clone,
    V: Clone,
    S: BuildHasher + Clone,
{
    /// Exclusive storage for a structural change: forks when the block is
    /// shared or when a `&mut V` previously escaped from this map.
    fn storage_for_write(&mut self) -> &mut Storage<K, V, S> {
        debug_assert!(
            !self.exposed || Rc::strong_count(&self.storage) == 1,
            "exposed map shares its storage"
        );
        if self.exposed || Rc::strong_count(&self.storage) > 1 {
            trace!(
                "forking storage for write (len={}, shared={}, exposed={})",
                self.storage.len(),
                Rc::strong_count(&self.storage) > 1,
                self.exposed
            );
            self.storage = Rc::new((*self.storage).clone());
            self.exposed = false;
        }
        Rc::make_mut(&mut self.storage)
    }

    /// Exclusive storage for handing out `&mut V`: forks only when shared.
    /// Slot ids are preserved by the fork.
    fn storage_for_access(&mut self) -> &mut Storage<K, V, S> {
        if Rc::strong_count(&self.storage) > 1 {
            trace!(
                "forking shared storage for mutable access (len={})",
                self.storage.len()
            );
        }
        Rc::make_mut(&mut self.storage)
    }

    /// Insert or re-insert `key`. Returns true if the key was new; otherwise
    /// the value is replaced and the key moves to the end of the order.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        self.storage_for_write().insert(key, value)
    }

    /// Remove `q` and return its value. A missing key leaves the map,
    /// including its sharing, untouched.
    pub fn remove<Q>(&mut self, q: &Q) -> Result<V, KeyNotFound>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        if !self.contains_key(q) {
            return Err(KeyNotFound);
        }
        let (_key, value) = self.storage_for_write().remove(q).ok_or(KeyNotFound)?;
        self.exposed = false;
        Ok(value)
    }

    /// Left-biased union. Every key of `other` ends up at the back of this
    /// map in `other`'s order; keys already present keep their own value.
    pub fn merge(&mut self, other: &Self) {
        if self.shares_storage_with(other) {
            // Same block means same entries in the same order, and a shared
            // block is never exposed.
            return;
        }
        let storage = self.storage_for_write();
        for (key, value) in other.iter() {
            storage.merge_entry(key, value);
        }
    }

    /// Drop every entry. A shared block is left to its other owners and
    /// replaced with a fresh one.
    pub fn clear(&mut self) {
        match Rc::get_mut(&mut self.storage) {
            Some(storage) => storage.clear(),
            None => {
                trace!("clear releases shared storage (len={})", self.storage.len());
                self.storage = Rc::new(Storage::with_hasher(self.storage.hasher().clone()));
            }
        }
        self.exposed = false;
    }

    /// Mutable lookup. Marks the map exposed: the next clone of this map
    /// deep-copies instead of sharing.
    pub fn at_mut<Q>(&mut self, q: &Q) -> Result<&mut V, KeyNotFound>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let id = self.storage.find(q).ok_or(KeyNotFound)?;
        self.exposed = true;
        Ok(self.storage_for_access().value_mut(id))
    }

    /// Indexed access: a missing key is first appended with `V::default()`.
    /// Marks the map exposed like `at_mut`.
    pub fn get_or_insert_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        let id = match self.storage.find(&key) {
            Some(id) => id,
            None => self
                .storage_for_write()
                .get_or_insert_with(key, V::default),
        };
        self.exposed = true;
        self.storage_for_access().value_mut(id)
    }
}

impl<K, V, S> Clone for InsertionOrderedMap<K, V, S>
where
    K: Clone,
    V: Clone,
    S: Clone,
{
    fn clone(&self) -> Self {
        let storage = if self.exposed {
            trace!(
                "source map is exposed, deep-copying storage (len={})",
                self.storage.len()
            );
            Rc::new((*self.storage).clone())
        } else {
            Rc::clone(&self.storage)
        };
        Self {
            storage,
            exposed: false,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        if Rc::ptr_eq(&self.storage, &source.storage) && !source.exposed {
            return;
        }
        *self = source.clone();
    }
}

impl<K, V, Q, S> Index<&Q> for InsertionOrderedMap<K, V, S>
where
    K: Eq + Hash + Borrow<Q>,
    Q: ?Sized + Hash + Eq,
    S: BuildHasher,
{
    type Output = V;

    /// Panics if the key is not present, like `HashMap`'s `Index`.
    fn index(&self, q: &Q) -> &V {
        self.get(q).expect("key does not exist")
    }
}

impl<K, V, S> PartialEq for InsertionOrderedMap<K, V, S>
where
    K: PartialEq,
    V: PartialEq,
{
    /// Order-sensitive: equal maps yield equal entry sequences.
    fn eq(&self, other: &Self) -> bool {
        if Rc::ptr_eq(&self.storage, &other.storage) {
            return true;
        }
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K: Eq, V: Eq, S> Eq for InsertionOrderedMap<K, V, S> {}

impl<K: fmt::Debug, V: fmt::Debug, S> fmt::Debug for InsertionOrderedMap<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> FromIterator<(K, V)> for InsertionOrderedMap<K, V, S>
where
    K: Eq + Hash + Clone,
    V: Clone,
    S: BuildHasher + Clone + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::default();
        map.extend(iter);
        map
    }
}

impl<K, V, S> Extend<(K, V)> for InsertionOrderedMap<K, V, S>
where
    K: Eq + Hash + Clone,
    V: Clone,
    S: BuildHasher + Clone,
{
    /// Same semantics as repeated `insert`, forking at most once.
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        let mut iter = iter.into_iter().peekable();
        if iter.peek().is_none() {
            return;
        }
        let storage = self.storage_for_write();
        for (key, value) in iter {
            storage.insert(key, value);
        }
    }
}

impl<'a, K, V, S> IntoIterator for &'a InsertionOrderedMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over keys in order.
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    #[inline]
    fn next(&mut self) -> Option<&'a K> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}
impl<K, V> FusedIterator for Keys<'_, K, V> {}

impl<K, V> Clone for Keys<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Iterator over values in key order.
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    #[inline]
    fn next(&mut self) -> Option<&'a V> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}
impl<K, V> FusedIterator for Values<'_, K, V> {}

impl<K, V> Clone for Values<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}
