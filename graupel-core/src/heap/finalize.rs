use {
    super::{Handle, HeaderFlags, Heap},
    crate::host::Host,
    thiserror::Error,
};

/// A finalizer returned an error.
///
/// The object's finalizer is not retried; the object is reclaimed on a
/// later cycle as if the finalizer had succeeded. Queued finalizers
/// behind the failed one stay queued.
#[derive(Debug, Error)]
#[error("finalizer failed for object {object:?}")]
pub struct FinalizeError
{
    /// The object whose finalizer failed.
    pub object: Handle,

    /// The host's error.
    #[source]
    pub source: anyhow::Error,
}

impl Heap
{
    /// Run queued finalizers, oldest first, with collection disabled.
    ///
    /// Each finalizer runs at most once per object ever; duplicate queue
    /// entries are skipped. The artificial count that kept the object
    /// alive is released as a queued decrement, so the object is
    /// reclaimed on the next cycle unless the finalizer resurrected it
    /// by storing it somewhere reachable.
    pub (super) fn drain_finalize_queue(&mut self, host: &mut dyn Host)
        -> Result<usize, FinalizeError>
    {
        let mut finalized = 0;
        let mut queue = std::mem::take(&mut self.buffers.finalize)
            .into_iter();
        while let Some(handle) = queue.next() {
            if self.arena.object(handle).header.flags
                .contains(HeaderFlags::FINALIZED)
            {
                continue;
            }

            // Flag first, and release the artificial count first, so a
            // failing finalizer cannot run twice or leak the object.
            self.arena.object_mut(handle).header.flags
                .insert(HeaderFlags::FINALIZED);
            self.queue_decrement(handle);

            if let Err(source) =
                self.with_gc_disabled(|heap| host.finalize(heap, handle))
            {
                self.buffers.finalize = queue.collect();
                return Err(FinalizeError{object: handle, source});
            }
            finalized += 1;
        }
        Ok(finalized)
    }
}
