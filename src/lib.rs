//! insertion-ordered-map: a single-threaded hash map that iterates in
//! insertion order and shares its storage between clones until one of
//! them writes.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: value semantics with O(1) clones, without letting a
//!   `&mut V` taken from one map be observed through another.
//! - Layers:
//!   - Storage<K, V, S>: the storage block. A generational arena of
//!     nodes linked into the order sequence, plus a hash index from key
//!     to slot id. Debug-only reentrancy guard around key probes.
//!   - InsertionOrderedMap<K, V, S>: public API. Holds `Rc<Storage>`
//!     and an `exposed` flag, and decides when a block must be forked.
//!
//! Sharing and exposure
//! - Clone shares the block (refcount bump) unless the source is
//!   exposed, in which case the clone receives a deep copy and the
//!   source keeps its block.
//! - Structural writes (`insert`, `remove`, `merge`, `extend`) fork the
//!   block first if it is shared or if this map is exposed. Forking
//!   clears the flag.
//! - `at_mut` and `get_or_insert_default` fork only if the block is
//!   shared, then set the flag.
//! - `clear` drops a shared block instead of mutating it and clears the
//!   flag.
//! - Reads (`get`, `at`, `contains_key`, iteration) never fork and never
//!   set the flag.
//!
//! Ordering
//! - Re-inserting an existing key replaces its value and moves it to the
//!   end of the order. If it is already last, the value is replaced in
//!   place.
//! - `merge` is a left-biased union: every key of the argument ends up
//!   at the back in the argument's order; keys already present keep
//!   their own value.
//!
//! Constraints
//! - Single-threaded: `!Send`/`!Sync` through `Rc`.
//! - Positions are slot ids, never addresses, so forking a block is a
//!   plain clone of the arena and the index.
//! - Each node stores its key's hash; `K: Hash` is not invoked again
//!   after insertion when the index grows.
//!
//! Errors
//! - `KeyNotFound` from `at`, `at_mut` and `remove`. A failing call
//!   neither forks nor mutates.

mod error;
mod map;
#[cfg(test)]
mod map_proptest;
mod reentrancy;
mod storage;

// Public surface
pub use error::KeyNotFound;
pub use map::{InsertionOrderedMap, Keys, Values};
pub use storage::Iter;
