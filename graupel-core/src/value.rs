use crate::heap::Handle;

/// Runtime value.
///
/// Value types are stored inline and are never garbage-collected.
/// Reference types are handles to managed heap objects; only these
/// slots are subject to write-barrier logging and child visiting.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value
{
    /// The null value.
    Null,

    /// A Boolean value.
    Boolean(bool),

    /// A signed integer value.
    Integer(i64),

    /// A floating-point value.
    Float(f64),

    /// An opaque host pointer. The collector never dereferences it.
    Native(*mut ()),

    /// A reference to a managed object.
    Object(Handle),
}

impl Value
{
    /// The handle, if this is a reference-type value.
    pub fn as_object(self) -> Option<Handle>
    {
        match self {
            Value::Object(handle) => Some(handle),
            _ => None,
        }
    }

    /// Whether this is a reference-type value.
    pub fn is_object(self) -> bool
    {
        self.as_object().is_some()
    }
}

impl Default for Value
{
    fn default() -> Self
    {
        Value::Null
    }
}
