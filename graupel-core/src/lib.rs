//! Memory-management core of an embeddable dynamic-language runtime.
//!
//! The collector is a hybrid: acyclic garbage is reclaimed promptly by
//! deferred reference counting, and reference cycles are reclaimed by a
//! synchronous Bacon–Rajan trial-deletion pass over a set of candidate
//! cycle roots. New objects start out in a small nursery where they are
//! not reference-counted at all; the ones that survive their first
//! collection cycle are promoted into reference-counted space.
//!
//! The embedding host does not need to understand object internals.
//! It interacts with the collector through a narrow boundary:
//! allocation, the write barrier, explicit collection triggers,
//! and the [`Host`] trait for root enumeration and finalizers.
//!
//! The collector is single-threaded and synchronous. A collection cycle
//! always runs to completion at a safe point chosen by the host;
//! it is never interleaved with mutation.

#![warn(missing_docs)]

pub use self::{
    heap::*,
    host::*,
    value::*,
};

mod heap;
mod host;
mod value;
