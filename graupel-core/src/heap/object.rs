//! In-memory representations of objects.
//!
//! For each managed type there is one variant of [`Repr`], along with the
//! per-type capabilities the collector needs: the type tag, the starting
//! color, the byte cost used for nursery and heap accounting, and the
//! "visit children" operation. Visiting is the sole place a type's
//! internal layout leaks into the collector.

use {
    super::{Color, Handle, Kind, ObjectHeader},
    crate::value::Value,
    smallvec::SmallVec,
    std::mem::size_of,
};

/// Representation of a managed object.
pub enum Repr
{
    /// Immutable byte string. Green: no outgoing references.
    String(Box<[u8]>),

    /// Growable array of values.
    List(Vec<Value>),

    /// Fixed-arity field block.
    ///
    /// Stands in for class instances at the collector boundary;
    /// field layout logic lives in the host.
    Record(SmallVec<[Value; 4]>),

    /// Single mutable slot.
    Cell(Value),

    /// Weak-reference cell. Green: its outgoing edge is weak, not owning.
    ///
    /// The cell is nulled out by the collector when its target is freed.
    Weak(Option<Handle>),
}

impl Repr
{
    /// The type tag.
    pub fn kind(&self) -> Kind
    {
        match self {
            Repr::String(..) => Kind::String,
            Repr::List(..)   => Kind::List,
            Repr::Record(..) => Kind::Record,
            Repr::Cell(..)   => Kind::Cell,
            Repr::Weak(..)   => Kind::Weak,
        }
    }

    /// The color a fresh object of this type starts with.
    ///
    /// Types without strong outgoing references are acyclic by
    /// construction and start Green; everything else starts Black.
    pub fn initial_color(&self) -> Color
    {
        match self {
            Repr::String(..) | Repr::Weak(..) => Color::Green,
            _ => Color::Black,
        }
    }

    /// Byte cost for nursery and heap accounting.
    pub fn heap_size(&self) -> usize
    {
        let payload = match self {
            Repr::String(bytes)  => bytes.len(),
            Repr::List(values)   => values.capacity() * size_of::<Value>(),
            Repr::Record(fields) => fields.len() * size_of::<Value>(),
            Repr::Cell(..)       => size_of::<Value>(),
            Repr::Weak(..)       => size_of::<Option<Handle>>(),
        };
        size_of::<ObjectHeader>() + payload
    }

    /// Visit outgoing reference-type edges.
    ///
    /// With `include_weak`, the target of a weak cell is yielded as well;
    /// the collector itself only ever visits strong edges.
    pub fn visit_children(
        &self,
        include_weak: bool,
        visitor: &mut dyn FnMut(Handle),
    )
    {
        let visit_value = &mut |value: &Value| {
            if let Value::Object(handle) = value {
                visitor(*handle);
            }
        };

        match self {
            Repr::String(..) =>
                { },
            Repr::List(values) =>
                values.iter().for_each(visit_value),
            Repr::Record(fields) =>
                fields.iter().for_each(visit_value),
            Repr::Cell(value) =>
                visit_value(value),
            Repr::Weak(target) =>
                if include_weak {
                    if let Some(handle) = target {
                        visitor(*handle);
                    }
                },
        }
    }

    /// Collect the strong children into a scratch buffer.
    pub (super) fn strong_children(&self) -> SmallVec<[Handle; 8]>
    {
        let mut children = SmallVec::new();
        self.visit_children(false, &mut |handle| children.push(handle));
        children
    }
}
