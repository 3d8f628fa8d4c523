use crate::heap::{Handle, Heap};

/// Boundary contract with the embedding runtime.
///
/// The collector never inspects host state directly. Instead the host
/// hands an implementation of this trait to [`Heap::collect`] and
/// [`Heap::maybe_collect`], and the collector calls back into it at
/// well-defined points of the cycle.
///
/// [`Heap::collect`]: `crate::heap::Heap::collect`
/// [`Heap::maybe_collect`]: `crate::heap::Heap::maybe_collect`
pub trait Host
{
    /// Enumerate every object directly reachable from host-visible state.
    ///
    /// Must yield the global namespace, all live stack and register slots
    /// of all execution contexts, and any pinned singletons. Called once
    /// per collection cycle unless root visitation is suppressed.
    /// Duplicate handles are permitted; each occurrence is counted.
    fn enumerate_roots(&self, visitor: &mut dyn FnMut(Handle));

    /// Run the finalizer for a dying object.
    ///
    /// Invoked by the collector with collection disabled, outside the
    /// critical phase of the cycle. The finalizer may mutate the heap;
    /// storing the object somewhere reachable makes it legitimately
    /// survive. Whatever the outcome, the object is marked finalized and
    /// its finalizer never runs again. An error is wrapped into a
    /// [`FinalizeError`] and returned to the caller of `collect`.
    ///
    /// [`FinalizeError`]: `crate::heap::FinalizeError`
    fn finalize(&mut self, heap: &mut Heap, object: Handle)
        -> anyhow::Result<()>
    {
        let _ = (heap, object);
        Ok(())
    }
}
