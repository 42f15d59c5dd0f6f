//! Concurrency-safe container substrate.
//!
//! These containers are the contention-free sharing layer the rest of the
//! toolkit builds on:
//!
//! - [`LockFreeStack`]: Treiber stack, CAS retry loops on the head
//! - [`LockFreeList`]: singly-linked list with guarded traversal
//! - [`ShardedMap`]: hash map sharded across independent locks
//! - [`ConcurrentVec`]: growable vector behind a read-write lock
//!
//! # Reclamation
//!
//! The stack and list retire nodes through epoch-based reclamation
//! (`crossbeam-epoch`): a removed node is freed only after every thread
//! pinned at removal time has moved on. Unsafe code is confined to those
//! two modules.
//!
//! # Size Under Concurrency
//!
//! `len` on any of these containers reflects a recent state, not a strict
//! snapshot; only the map's full-lock iteration observes one instant.

mod list;
mod map;
mod stack;
mod vector;

pub use list::LockFreeList;
pub use map::ShardedMap;
pub use stack::LockFreeStack;
pub use vector::ConcurrentVec;
