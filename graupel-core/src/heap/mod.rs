//! Garbage-collected heap.
//!
//! The heap is an explicit context object; there is no collector
//! singleton. Objects live in an index-based arena and are addressed by
//! plain [`Handle`] indices, so every collector buffer is a vector of
//! handles rather than a set of intrusive links, and the invariant that
//! every buffer is fully drained by the end of a cycle can be checked
//! independently of object layout.
//!
//! # Object lifecycle
//!
//! A new object starts in the nursery, where it has no valid reference
//! count and is invisible to the write barrier. The first collection
//! cycle that finds it reachable promotes it into reference-counted
//! space; this transition is one-directional and irreversible. Promoted
//! objects are destroyed exactly once, either by the ordinary decrement
//! path or by the cycle collector, never both.

pub use self::{
    arena::*,
    buffers::*,
    collect::*,
    finalize::*,
    header::*,
    heap::*,
    object::*,
};

mod arena;
mod buffers;
mod collect;
mod finalize;
mod header;
mod heap;
mod object;
mod trace;

#[cfg(test)]
pub (crate) mod testing;
