//! Test doubles for the host side of the collector.

use {
    super::{Handle, Heap},
    crate::{host::Host, value::Value},
};

/// A host whose roots are an explicit list and whose finalizers record
/// what ran, optionally failing or resurrecting on request.
#[derive(Default)]
pub (crate) struct TestHost
{
    pub roots: Vec<Handle>,
    pub finalized: Vec<Handle>,

    /// Objects whose finalizer should return an error.
    pub fail: Vec<Handle>,

    /// A live cell to store each finalized object into, resurrecting it.
    pub resurrect_into: Option<Handle>,
}

impl Host for TestHost
{
    fn enumerate_roots(&self, visitor: &mut dyn FnMut(Handle))
    {
        for &root in &self.roots {
            visitor(root);
        }
    }

    fn finalize(&mut self, heap: &mut Heap, object: Handle)
        -> anyhow::Result<()>
    {
        self.finalized.push(object);
        if self.fail.contains(&object) {
            anyhow::bail!("finalizer exploded");
        }
        if let Some(cell) = self.resurrect_into {
            heap.cell_set(cell, Value::Object(object));
        }
        Ok(())
    }
}
