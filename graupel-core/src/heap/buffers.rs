use super::Handle;

/// The collector's work buffers.
///
/// Mutator-facing operations only ever append to these; all draining
/// happens inside a collection cycle. Root buffers come in pairs so
/// that roots recorded during the previous cycle can be retired one
/// cycle later, after the current enumeration has re-incremented
/// everything still rooted.
#[derive(Default)]
pub (super) struct Buffers
{
    /// Objects allocated since the last cycle, in allocation order.
    pub nursery: Vec<Handle>,

    /// Roots recorded by the current cycle's enumeration.
    pub roots_new: Vec<Handle>,

    /// Roots recorded by the previous cycle's enumeration,
    /// each still holding one reference count.
    pub roots_old: Vec<Handle>,

    /// Mutated objects whose pre-mutation children have already been
    /// queued as decrements.
    pub modification_log: Vec<Handle>,

    /// Pending reference-count decrements.
    pub decrements: Vec<Handle>,

    /// Candidate roots for the next cycle-detection pass.
    pub cycle_roots: Vec<Handle>,

    /// Objects whose finalizers must run.
    pub finalize: Vec<Handle>,
}

impl Buffers
{
    /// Retire the previous cycle's roots and promote the current
    /// enumeration in their place.
    ///
    /// Returns the retired buffer; the caller owes one decrement
    /// per entry.
    pub fn swap_roots(&mut self) -> Vec<Handle>
    {
        let retired = std::mem::take(&mut self.roots_old);
        self.roots_old = std::mem::take(&mut self.roots_new);
        retired
    }

    /// Whether every buffer a cycle is obliged to drain is empty.
    ///
    /// The root, cycle-root, and finalize buffers are intentionally
    /// exempt: roots persist across cycles by design, cycle candidates
    /// wait for a detection pass, and finalization runs after this
    /// check.
    pub fn drained(&self) -> bool
    {
        self.nursery.is_empty()
            && self.modification_log.is_empty()
            && self.decrements.is_empty()
    }
}
