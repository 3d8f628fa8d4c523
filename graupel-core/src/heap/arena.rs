use {
    super::{ObjectHeader, Repr},
    std::fmt,
};

/// Handle to a managed object.
///
/// Handles are plain indices into the heap's object arena. A handle is
/// valid from allocation until the collector frees the object; slots are
/// reused afterwards, so holding on to a stale handle is a host bug with
/// the same severity as a dangling pointer.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct Handle(pub (crate) u32);

impl fmt::Debug for Handle
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "Handle({})", self.0)
    }
}

/// A managed object: collector metadata plus type-specific payload.
pub (super) struct Object
{
    /// Per-object collector metadata.
    pub header: ObjectHeader,

    /// Byte cost recorded at allocation time.
    ///
    /// Kept current by the mutation helpers when a payload grows.
    pub bytes: usize,

    /// The type-specific payload.
    pub repr: Repr,
}

/// Index-based object arena.
///
/// Freed slots go on a free list and are reused by later allocations.
/// The arena also keeps the live-byte total that the nursery threshold
/// and the heap limit are measured against.
#[derive(Default)]
pub (super) struct Arena
{
    slots: Vec<Option<Object>>,
    free_slots: Vec<u32>,
    bytes_live: usize,
    len: usize,
}

impl Arena
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Store an object and return its handle.
    pub fn insert(&mut self, object: Object) -> Handle
    {
        self.bytes_live += object.bytes;
        self.len += 1;

        match self.free_slots.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(object);
                Handle(index)
            },
            None => {
                let index = u32::try_from(self.slots.len())
                    .expect("Object arena exhausted");
                self.slots.push(Some(object));
                Handle(index)
            },
        }
    }

    /// Take an object out of the arena, freeing its slot.
    pub fn remove(&mut self, handle: Handle) -> Object
    {
        let slot = &mut self.slots[handle.0 as usize];
        let object = slot.take().expect("Double free of object slot");
        self.bytes_live -= object.bytes;
        self.len -= 1;
        self.free_slots.push(handle.0);
        object
    }

    pub fn get(&self, handle: Handle) -> Option<&Object>
    {
        self.slots.get(handle.0 as usize)?.as_ref()
    }

    /// The object behind a handle that must be live.
    pub fn object(&self, handle: Handle) -> &Object
    {
        self.get(handle).expect("Use of freed object handle")
    }

    /// The object behind a handle that must be live, mutably.
    pub fn object_mut(&mut self, handle: Handle) -> &mut Object
    {
        self.slots[handle.0 as usize].as_mut()
            .expect("Use of freed object handle")
    }

    pub fn contains(&self, handle: Handle) -> bool
    {
        self.get(handle).is_some()
    }

    /// Re-record an object's byte cost, adjusting the live total.
    /// Returns the previous cost.
    pub fn set_bytes(&mut self, handle: Handle, bytes: usize) -> usize
    {
        let object = self.slots[handle.0 as usize].as_mut()
            .expect("Use of freed object handle");
        let old = object.bytes;
        self.bytes_live -= old;
        self.bytes_live += bytes;
        object.bytes = bytes;
        old
    }

    pub fn bytes_live(&self) -> usize
    {
        self.bytes_live
    }

    pub fn len(&self) -> usize
    {
        self.len
    }
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        super::super::{Color, Kind},
    };

    fn string_object(bytes: &[u8]) -> Object
    {
        let repr = Repr::String(bytes.into());
        Object{
            header: ObjectHeader::new(Kind::String, Color::Green),
            bytes: repr.heap_size(),
            repr,
        }
    }

    #[test]
    fn insert_remove_accounting()
    {
        let mut arena = Arena::new();
        assert_eq!(arena.bytes_live(), 0);

        let a = arena.insert(string_object(b"aaaa"));
        let b = arena.insert(string_object(b"bb"));
        assert_eq!(arena.len(), 2);
        assert_ne!(a, b);

        let bytes_with_both = arena.bytes_live();
        let removed = arena.remove(a);
        assert_eq!(arena.bytes_live(), bytes_with_both - removed.bytes);
        assert_eq!(arena.len(), 1);
        assert!(!arena.contains(a));
        assert!(arena.contains(b));
    }

    #[test]
    fn freed_slots_are_reused()
    {
        let mut arena = Arena::new();
        let a = arena.insert(string_object(b"one"));
        arena.remove(a);
        let b = arena.insert(string_object(b"two"));
        assert_eq!(a, b);
    }

    #[test]
    #[should_panic (expected = "Double free of object slot")]
    fn double_remove_is_fatal()
    {
        let mut arena = Arena::new();
        let a = arena.insert(string_object(b"x"));
        arena.remove(a);
        arena.remove(a);
    }
}
