use bitflags::bitflags;

/// Discriminant for the closed set of managed types.
///
/// The tag drives both child visiting and deallocation dispatch;
/// the set is closed, so both are exhaustive matches rather than
/// open-ended dynamic dispatch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind
{
    /// Immutable byte string.
    String,

    /// Growable array of values.
    List,

    /// Fixed-arity field block.
    Record,

    /// Single mutable slot.
    Cell,

    /// Weak-reference cell.
    Weak,
}

/// Trial-deletion color.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Color
{
    /// Acyclic by construction; reference-counted only, never cycle-scanned.
    Green,

    /// Believed live.
    Black,

    /// Tentatively garbage, pending confirmation.
    White,

    /// Under trial deletion; internal edges tentatively removed.
    Grey,

    /// Candidate cycle root awaiting the next detection pass.
    Purple,
}

bitflags!
{
    /// Per-object flag bits.
    pub struct HeaderFlags: u8
    {
        /// Promoted out of the nursery; `ref_count` is valid.
        const REF_COUNTED = 1 << 0;

        /// Present in the cycle-roots buffer.
        const CYCLE_LOGGED = 1 << 1;

        /// Present in the modification log.
        const MUTATION_LOGGED = 1 << 2;

        /// A finalizer must run before the object may be freed.
        const FINALIZABLE = 1 << 3;

        /// The finalizer has run; it never runs again.
        const FINALIZED = 1 << 4;

        /// Promoted during the current cycle; the nursery sweep still
        /// owns the object's fate.
        const JUST_MOVED = 1 << 5;
    }
}

/// Per-object collector metadata, embedded in every managed allocation.
#[derive(Clone, Debug)]
pub struct ObjectHeader
{
    /// Type tag.
    pub kind: Kind,

    /// Counted incoming edges from promoted objects,
    /// plus one per root-buffer occurrence.
    ///
    /// Meaningful only once [`HeaderFlags::REF_COUNTED`] is set.
    pub ref_count: u32,

    /// Trial-deletion color.
    pub color: Color,

    /// Flag bits.
    pub flags: HeaderFlags,
}

impl ObjectHeader
{
    /// Header for a freshly allocated nursery object.
    pub fn new(kind: Kind, color: Color) -> Self
    {
        Self{kind, ref_count: 0, color, flags: HeaderFlags::empty()}
    }

    /// Whether the object has been promoted into reference-counted space.
    pub fn is_promoted(&self) -> bool
    {
        self.flags.contains(HeaderFlags::REF_COUNTED)
    }

    /// Whether the object still owes a finalizer run.
    pub fn needs_finalizer(&self) -> bool
    {
        self.flags.contains(HeaderFlags::FINALIZABLE)
            && !self.flags.contains(HeaderFlags::FINALIZED)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn fresh_header_is_uncounted()
    {
        let header = ObjectHeader::new(Kind::List, Color::Black);
        assert_eq!(header.ref_count, 0);
        assert_eq!(header.color, Color::Black);
        assert!(!header.is_promoted());
        assert!(!header.needs_finalizer());
    }

    #[test]
    fn flags_are_independent()
    {
        let mut header = ObjectHeader::new(Kind::Record, Color::Black);
        header.flags.insert(HeaderFlags::REF_COUNTED);
        header.flags.insert(HeaderFlags::JUST_MOVED);
        assert!(header.is_promoted());
        assert!(!header.flags.contains(HeaderFlags::CYCLE_LOGGED));

        header.flags.remove(HeaderFlags::JUST_MOVED);
        assert!(header.is_promoted());
    }

    #[test]
    fn finalizer_runs_at_most_once()
    {
        let mut header = ObjectHeader::new(Kind::Record, Color::Black);
        header.flags.insert(HeaderFlags::FINALIZABLE);
        assert!(header.needs_finalizer());

        header.flags.insert(HeaderFlags::FINALIZED);
        assert!(!header.needs_finalizer());
    }
}
