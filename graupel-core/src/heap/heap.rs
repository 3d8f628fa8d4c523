use {
    super::{
        Arena,
        Buffers,
        Color,
        Handle,
        HeaderFlags,
        Kind,
        Object,
        ObjectHeader,
        Repr,
    },
    crate::value::Value,
    std::{collections::HashMap, fmt, str::FromStr},
    thiserror::Error,
};

/* -------------------------------------------------------------------------- */
/*                                  Tunables                                  */
/* -------------------------------------------------------------------------- */

/// Identifies a collector tunable.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tunable
{
    /// Nursery byte budget; exceeding it makes [`Heap::maybe_collect`]
    /// run a collection cycle.
    NurseryLimit,

    /// Candidate-cycle-root count above which a cycle forces
    /// cycle detection.
    MetadataLimit,

    /// Number of collection cycles between periodic cycle-detection
    /// passes.
    CycleInterval,

    /// Allocation size at and above which an object is promoted
    /// immediately instead of waiting out a nursery generation.
    PromotionCutoff,

    /// Total live byte budget; exceeding it fails allocation.
    HeapLimit,
}

impl Tunable
{
    /// The configuration name of this tunable.
    pub fn name(self) -> &'static str
    {
        match self {
            Tunable::NurseryLimit    => "nursery-limit",
            Tunable::MetadataLimit   => "metadata-limit",
            Tunable::CycleInterval   => "cycle-interval",
            Tunable::PromotionCutoff => "promotion-cutoff",
            Tunable::HeapLimit       => "heap-limit",
        }
    }
}

impl fmt::Display for Tunable
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

impl FromStr for Tunable
{
    type Err = TunableError;

    fn from_str(name: &str) -> Result<Self, Self::Err>
    {
        match name {
            "nursery-limit"    => Ok(Tunable::NurseryLimit),
            "metadata-limit"   => Ok(Tunable::MetadataLimit),
            "cycle-interval"   => Ok(Tunable::CycleInterval),
            "promotion-cutoff" => Ok(Tunable::PromotionCutoff),
            "heap-limit"       => Ok(Tunable::HeapLimit),
            _ => Err(TunableError::UnknownName{name: name.into()}),
        }
    }
}

/// A tunable could not be read or written.
#[derive(Debug, Error)]
pub enum TunableError
{
    /// A tunable was set to a value outside its valid range.
    #[error("tunable out of range: {tunable} must be non-zero")]
    OutOfRange
    {
        /// The offending tunable.
        tunable: Tunable,
    },

    /// No tunable has the given name.
    #[error("unknown tunable name: {name}")]
    UnknownName
    {
        /// The unrecognized name.
        name: String,
    },
}

/// Collector tuning knobs. See [`Tunable`] for the meaning of each field.
#[derive(Clone, Copy, Debug)]
pub struct Tunables
{
    /// See [`Tunable::NurseryLimit`].
    pub nursery_limit: usize,

    /// See [`Tunable::MetadataLimit`].
    pub metadata_limit: usize,

    /// See [`Tunable::CycleInterval`].
    pub cycle_interval: u32,

    /// See [`Tunable::PromotionCutoff`].
    pub promotion_cutoff: usize,

    /// See [`Tunable::HeapLimit`].
    pub heap_limit: usize,
}

impl Default for Tunables
{
    fn default() -> Self
    {
        Self{
            nursery_limit: 256 * 1024,
            metadata_limit: 10_000,
            cycle_interval: 128,
            promotion_cutoff: 16 * 1024,
            heap_limit: usize::MAX,
        }
    }
}

/* -------------------------------------------------------------------------- */
/*                                   Errors                                   */
/* -------------------------------------------------------------------------- */

/// An allocation would push the heap past its byte budget.
#[derive(Debug, Error)]
#[error("heap limit exhausted: \
         {requested} bytes requested with {live} bytes live, limit {limit}")]
pub struct AllocError
{
    /// Size of the failed allocation.
    pub requested: usize,

    /// Live bytes at the time of the failure.
    pub live: usize,

    /// The configured limit.
    pub limit: usize,
}

/* -------------------------------------------------------------------------- */
/*                                    Heap                                    */
/* -------------------------------------------------------------------------- */

/// The managed heap.
///
/// All object allocation, mutation, and reading goes through methods on
/// this type; mutations of promoted objects pass through the coalescing
/// write barrier, which is what keeps deferred reference counts honest.
pub struct Heap
{
    pub (super) arena: Arena,
    pub (super) buffers: Buffers,
    pub (super) tunables: Tunables,

    /// Cycles remaining until the next periodic cycle-detection pass.
    pub (super) cycle_countdown: u32,

    /// Interning table mapping a weak target to its weak cell.
    pub (super) weak_table: HashMap<Handle, Handle>,

    /// Nesting depth of [`Heap::with_gc_disabled`] sections.
    pub (super) gc_disabled: u32,

    /// Bytes held by objects still on the nursery list.
    pub (super) nursery_bytes: usize,
}

impl Default for Heap
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl Heap
{
    /// Create an empty heap with default tunables.
    pub fn new() -> Self
    {
        Self::with_tunables(Tunables::default())
    }

    /// Create an empty heap with the given tunables.
    pub fn with_tunables(tunables: Tunables) -> Self
    {
        Self{
            arena: Arena::default(),
            buffers: Buffers::default(),
            cycle_countdown: tunables.cycle_interval,
            tunables,
            weak_table: HashMap::new(),
            gc_disabled: 0,
            nursery_bytes: 0,
        }
    }

    /* ---------------------------- Configuration --------------------------- */

    /// The current tunables.
    pub fn tunables(&self) -> &Tunables
    {
        &self.tunables
    }

    /// Set a tunable. Zero is out of range for every tunable.
    pub fn set_tunable(&mut self, tunable: Tunable, value: usize)
        -> Result<(), TunableError>
    {
        if value == 0 {
            return Err(TunableError::OutOfRange{tunable});
        }
        match tunable {
            Tunable::NurseryLimit    => self.tunables.nursery_limit = value,
            Tunable::MetadataLimit   => self.tunables.metadata_limit = value,
            Tunable::CycleInterval   => {
                self.tunables.cycle_interval = value as u32;
                self.cycle_countdown = self.cycle_countdown.min(value as u32);
            },
            Tunable::PromotionCutoff => self.tunables.promotion_cutoff = value,
            Tunable::HeapLimit       => self.tunables.heap_limit = value,
        }
        Ok(())
    }

    /// Set a tunable by its configuration name.
    pub fn set_tunable_by_name(&mut self, name: &str, value: usize)
        -> Result<(), TunableError>
    {
        self.set_tunable(name.parse()?, value)
    }

    /// Read a tunable by its configuration name.
    pub fn tunable_by_name(&self, name: &str) -> Result<usize, TunableError>
    {
        Ok(self.get_tunable(name.parse()?))
    }

    /// Read a tunable.
    pub fn get_tunable(&self, tunable: Tunable) -> usize
    {
        match tunable {
            Tunable::NurseryLimit    => self.tunables.nursery_limit,
            Tunable::MetadataLimit   => self.tunables.metadata_limit,
            Tunable::CycleInterval   => self.tunables.cycle_interval as usize,
            Tunable::PromotionCutoff => self.tunables.promotion_cutoff,
            Tunable::HeapLimit       => self.tunables.heap_limit,
        }
    }

    /* ----------------------------- Allocation ----------------------------- */

    /// Allocate a new object from its representation.
    ///
    /// The object lands in the nursery, except that allocations at or
    /// above the promotion cutoff are promoted on the spot. Either way
    /// it stays on the nursery list until the next cycle's sweep, so an
    /// object that never becomes reachable is reclaimed then.
    pub fn allocate(&mut self, repr: Repr) -> Result<Handle, AllocError>
    {
        let bytes = repr.heap_size();
        if self.arena.bytes_live().saturating_add(bytes)
            > self.tunables.heap_limit
        {
            return Err(AllocError{
                requested: bytes,
                live: self.arena.bytes_live(),
                limit: self.tunables.heap_limit,
            });
        }

        let header = ObjectHeader::new(repr.kind(), repr.initial_color());
        let handle = self.arena.insert(Object{header, bytes, repr});
        self.buffers.nursery.push(handle);
        self.nursery_bytes += bytes;

        if bytes >= self.tunables.promotion_cutoff {
            self.mark_promoted(handle);
        }

        Ok(handle)
    }

    /// Allocate a string.
    pub fn new_string(&mut self, bytes: &[u8]) -> Result<Handle, AllocError>
    {
        self.allocate(Repr::String(bytes.into()))
    }

    /// Allocate a list with the given initial elements.
    pub fn new_list(&mut self, values: Vec<Value>) -> Result<Handle, AllocError>
    {
        self.allocate(Repr::List(values))
    }

    /// Allocate a record with the given fields.
    pub fn new_record(&mut self, fields: impl IntoIterator<Item = Value>)
        -> Result<Handle, AllocError>
    {
        self.allocate(Repr::Record(fields.into_iter().collect()))
    }

    /// Allocate a cell with the given initial value.
    pub fn new_cell(&mut self, value: Value) -> Result<Handle, AllocError>
    {
        self.allocate(Repr::Cell(value))
    }

    /// Obtain the weak cell for a target, allocating it on first use.
    ///
    /// Weak cells are interned: repeated downgrades of one target yield
    /// one cell. The cell's reference to the target is not counted; when
    /// the target is freed the cell reads as null from then on.
    pub fn downgrade(&mut self, target: Handle) -> Result<Handle, AllocError>
    {
        if let Some(&cell) = self.weak_table.get(&target) {
            return Ok(cell);
        }
        let cell = self.allocate(Repr::Weak(Some(target)))?;
        self.weak_table.insert(target, cell);
        Ok(cell)
    }

    /* ---------------------------- Write barrier --------------------------- */

    /// The write barrier; must run before any mutation of an object's
    /// reference fields takes effect.
    ///
    /// On the first mutation of a promoted object per window, all of its
    /// current strong children are queued as decrements and the object is
    /// logged; when the log is drained at the start of the next cycle the
    /// then-current children are incremented. Edges that survive the
    /// window cancel out, edges that were overwritten net one decrement,
    /// and edges created in the window net one increment.
    ///
    /// Nursery objects carry no valid reference count and are invisible
    /// to the barrier.
    fn on_mutate(&mut self, handle: Handle)
    {
        {
            let header = &self.arena.object(handle).header;
            if !header.is_promoted()
                || header.flags.contains(HeaderFlags::MUTATION_LOGGED)
            {
                return;
            }
        }

        let children = self.arena.object(handle).repr.strong_children();
        self.buffers.decrements.extend(children);
        self.buffers.modification_log.push(handle);
        self.arena.object_mut(handle).header.flags
            .insert(HeaderFlags::MUTATION_LOGGED);
    }

    /* ------------------------------ Mutation ------------------------------ */

    /// Overwrite a cell's value, returning the previous one.
    pub fn cell_set(&mut self, cell: Handle, value: Value) -> Value
    {
        self.expect_kind(cell, Kind::Cell);
        self.on_mutate(cell);
        match &mut self.arena.object_mut(cell).repr {
            Repr::Cell(slot) => std::mem::replace(slot, value),
            _ => unreachable!(),
        }
    }

    /// Overwrite a list element, returning the previous one.
    pub fn list_set(&mut self, list: Handle, index: usize, value: Value)
        -> Value
    {
        self.expect_kind(list, Kind::List);
        self.on_mutate(list);
        match &mut self.arena.object_mut(list).repr {
            Repr::List(values) => {
                assert!(index < values.len(), "Fatal error: list index {} out of bounds", index);
                std::mem::replace(&mut values[index], value)
            },
            _ => unreachable!(),
        }
    }

    /// Append to a list.
    pub fn list_push(&mut self, list: Handle, value: Value)
    {
        self.expect_kind(list, Kind::List);
        self.on_mutate(list);
        match &mut self.arena.object_mut(list).repr {
            Repr::List(values) => values.push(value),
            _ => unreachable!(),
        }
        self.refresh_bytes(list);
    }

    /// Overwrite a record field, returning the previous one.
    pub fn record_set(&mut self, record: Handle, index: usize, value: Value)
        -> Value
    {
        self.expect_kind(record, Kind::Record);
        self.on_mutate(record);
        match &mut self.arena.object_mut(record).repr {
            Repr::Record(fields) => {
                assert!(index < fields.len(), "Fatal error: record field {} out of bounds", index);
                std::mem::replace(&mut fields[index], value)
            },
            _ => unreachable!(),
        }
    }

    /* ------------------------------- Reading ------------------------------ */

    /// The bytes of a string.
    pub fn string_bytes(&self, string: Handle) -> &[u8]
    {
        match &self.arena.object(string).repr {
            Repr::String(bytes) => bytes,
            _ => panic!("Fatal error: expected string object"),
        }
    }

    /// The number of elements in a list.
    pub fn list_len(&self, list: Handle) -> usize
    {
        match &self.arena.object(list).repr {
            Repr::List(values) => values.len(),
            _ => panic!("Fatal error: expected list object"),
        }
    }

    /// Read a list element.
    pub fn list_get(&self, list: Handle, index: usize) -> Value
    {
        match &self.arena.object(list).repr {
            Repr::List(values) => values[index],
            _ => panic!("Fatal error: expected list object"),
        }
    }

    /// Read a record field.
    pub fn record_get(&self, record: Handle, index: usize) -> Value
    {
        match &self.arena.object(record).repr {
            Repr::Record(fields) => fields[index],
            _ => panic!("Fatal error: expected record object"),
        }
    }

    /// Read a cell's value.
    pub fn cell_get(&self, cell: Handle) -> Value
    {
        match &self.arena.object(cell).repr {
            Repr::Cell(value) => *value,
            _ => panic!("Fatal error: expected cell object"),
        }
    }

    /// Read a weak cell; null once the target has been freed.
    pub fn weak_get(&self, weak: Handle) -> Value
    {
        match &self.arena.object(weak).repr {
            Repr::Weak(Some(target)) => Value::Object(*target),
            Repr::Weak(None) => Value::Null,
            _ => panic!("Fatal error: expected weak cell"),
        }
    }

    /* ---------------------------- Introspection --------------------------- */

    /// The type tag of an object.
    pub fn kind(&self, handle: Handle) -> Kind
    {
        self.arena.object(handle).header.kind
    }

    /// Whether the handle refers to a live object.
    pub fn contains(&self, handle: Handle) -> bool
    {
        self.arena.contains(handle)
    }

    /// The reference count of a promoted object.
    pub fn ref_count(&self, handle: Handle) -> u32
    {
        self.arena.object(handle).header.ref_count
    }

    /// The trial-deletion color of an object.
    pub fn color(&self, handle: Handle) -> Color
    {
        self.arena.object(handle).header.color
    }

    /// Whether an object has been promoted out of the nursery.
    pub fn is_promoted(&self, handle: Handle) -> bool
    {
        self.arena.object(handle).header.is_promoted()
    }

    /// Total bytes held by live objects.
    pub fn bytes_live(&self) -> usize
    {
        self.arena.bytes_live()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize
    {
        self.arena.len()
    }

    /// Whether the heap holds no objects.
    pub fn is_empty(&self) -> bool
    {
        self.arena.len() == 0
    }

    /* ----------------------------- Finalizers ----------------------------- */

    /// Mark an object as requiring finalization before it may be freed.
    ///
    /// Promotes the object immediately: finalizable objects need a
    /// valid reference count so that every path to reclamation passes
    /// through the finalizer queue.
    pub fn mark_finalizable(&mut self, handle: Handle)
    {
        self.mark_promoted(handle);
        self.arena.object_mut(handle).header.flags
            .insert(HeaderFlags::FINALIZABLE);
    }

    /// Run a closure with collection disabled, re-enabling it afterwards
    /// even on unwind. Sections nest.
    pub fn with_gc_disabled<R>(&mut self, body: impl FnOnce(&mut Heap) -> R)
        -> R
    {
        struct Reenable<'a>
        {
            heap: &'a mut Heap,
        }

        impl<'a> Drop for Reenable<'a>
        {
            fn drop(&mut self)
            {
                self.heap.gc_disabled -= 1;
            }
        }

        self.gc_disabled += 1;
        let guard = Reenable{heap: self};
        body(&mut *guard.heap)
    }

    /* ------------------------- Reference counting ------------------------- */

    /// Promote an object and, transitively, its nursery children.
    ///
    /// Each strong edge traversed is counted exactly once: into the
    /// child's reference count when the edge's source joins the promoted
    /// set. Promoted objects keep their nursery-list entry until the
    /// next sweep, flagged as just moved.
    pub (super) fn mark_promoted(&mut self, handle: Handle)
    {
        {
            let header = &mut self.arena.object_mut(handle).header;
            if header.is_promoted() {
                return;
            }
            header.flags.insert(
                HeaderFlags::REF_COUNTED | HeaderFlags::JUST_MOVED);
        }

        let mut worklist = vec![handle];
        while let Some(parent) = worklist.pop() {
            let children = self.arena.object(parent).repr.strong_children();
            for child in children {
                let header = &mut self.arena.object_mut(child).header;
                if header.is_promoted() {
                    header.ref_count += 1;
                    if header.color == Color::Purple {
                        header.color = Color::Black;
                    }
                } else {
                    header.flags.insert(
                        HeaderFlags::REF_COUNTED | HeaderFlags::JUST_MOVED);
                    header.ref_count = 1;
                    worklist.push(child);
                }
            }
        }
    }

    /// Increment a promoted object's reference count.
    ///
    /// A purple candidate that gains a reference is no longer a cycle
    /// suspect and is recolored black.
    pub (super) fn increment(&mut self, handle: Handle)
    {
        let header = &mut self.arena.object_mut(handle).header;
        assert!(header.is_promoted(),
                "Fatal error: reference count increment on nursery object");
        header.ref_count += 1;
        if header.color == Color::Purple {
            header.color = Color::Black;
        }
    }

    /// Queue a deferred decrement.
    pub (super) fn queue_decrement(&mut self, handle: Handle)
    {
        self.buffers.decrements.push(handle);
    }

    /// Queue one decrement per strong child of an object being freed.
    pub (super) fn queue_child_decrements(&mut self, handle: Handle)
    {
        let children = self.arena.object(handle).repr.strong_children();
        self.buffers.decrements.extend(children);
    }

    /* ----------------------------- Deallocation --------------------------- */

    /// Free an object whose outgoing edges were counted, cascading the
    /// counts into the decrement buffer.
    pub (super) fn free_counted(&mut self, handle: Handle)
    {
        self.queue_child_decrements(handle);
        self.release(handle);
    }

    /// Free an object whose outgoing edges were never counted.
    pub (super) fn free_uncounted(&mut self, handle: Handle)
    {
        self.release(handle);
    }

    /// Remove an object from the arena, detaching it from the weak table
    /// on both sides first.
    fn release(&mut self, handle: Handle)
    {
        self.detach_weak(handle);
        self.arena.remove(handle);
    }

    /// Null out the weak cell pointing at a dying object, and drop the
    /// interning entry if the dying object is itself a weak cell.
    fn detach_weak(&mut self, handle: Handle)
    {
        if let Some(cell) = self.weak_table.remove(&handle) {
            if self.arena.contains(cell) {
                if let Repr::Weak(target) =
                    &mut self.arena.object_mut(cell).repr
                {
                    *target = None;
                }
            }
        }

        if let Repr::Weak(Some(target)) = self.arena.object(handle).repr {
            self.weak_table.remove(&target);
        }
    }

    /* ------------------------------- Helpers ------------------------------ */

    /// Re-measure an object after a mutation that may have resized it.
    fn refresh_bytes(&mut self, handle: Handle)
    {
        let object = self.arena.object(handle);
        let bytes = object.repr.heap_size();
        let in_nursery = !object.header.is_promoted()
            || object.header.flags.contains(HeaderFlags::JUST_MOVED);
        let old = self.arena.set_bytes(handle, bytes);
        if in_nursery {
            self.nursery_bytes = self.nursery_bytes - old + bytes;
        }
    }

    fn expect_kind(&self, handle: Handle, kind: Kind)
    {
        assert_eq!(self.arena.object(handle).header.kind, kind,
                   "Fatal error: object has the wrong type for this operation");
    }
}
