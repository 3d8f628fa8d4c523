//! The collection cycle.
//!
//! A cycle runs in a fixed order: root enumeration, modification-log
//! drain, retirement of the previous cycle's roots, decrement drain,
//! nursery sweep, and (when due) cycle detection by trial deletion.
//! Finalizers run last, outside the critical phases, with collection
//! disabled. Every phase that frees objects only ever queues further
//! decrements; reference counts are never mutated behind a phase's back.

use {
    super::{trace, Color, Handle, HeaderFlags, Heap},
    crate::host::Host,
    super::FinalizeError,
};

/// How much work a collection cycle is asked to do.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CollectMode
{
    /// Run the ordinary cycle; cycle detection runs only when the
    /// countdown or the metadata limit says it is due.
    Normal,

    /// Run the ordinary cycle and force cycle detection.
    Full,

    /// Skip root enumeration and root retirement, keeping the previous
    /// cycle's root set pinned. For hosts whose roots are known not to
    /// have changed.
    NoRoots,
}

/// What a collection cycle accomplished.
#[derive(Clone, Copy, Debug, Default)]
pub struct CollectStats
{
    /// Objects freed in total, excluding the finalizer phase.
    pub freed: usize,

    /// Objects freed directly by the nursery sweep.
    pub nursery_freed: usize,

    /// Objects freed by cycle detection.
    pub cycle_freed: usize,

    /// Finalizers run.
    pub finalized: usize,

    /// Whether cycle detection ran.
    pub cycle_detection_ran: bool,
}

/// What to do with an object after a reference-count decrement.
enum Decremented
{
    Keep,
    Free,
    Finalize,
    Candidate,
}

impl Heap
{
    /// Run a collection cycle.
    ///
    /// Returns `Ok(None)`, and does nothing, while collection is
    /// disabled. Returns an error if a finalizer fails; the failed
    /// object is not retried, and any finalizers behind it stay queued
    /// for the next cycle.
    pub fn collect(&mut self, host: &mut dyn Host, mode: CollectMode)
        -> Result<Option<CollectStats>, FinalizeError>
    {
        if self.gc_disabled > 0 {
            return Ok(None);
        }

        trace::cycle_started(mode);
        let live_before = self.arena.len();
        let mut stats = CollectStats::default();

        if mode != CollectMode::NoRoots {
            self.visit_roots(host);
            let retired = self.buffers.swap_roots();
            self.buffers.decrements.extend(retired);
        }

        self.drain_modification_log();
        self.drain_decrements();

        stats.nursery_freed = self.sweep_nursery();
        self.drain_decrements();

        if self.should_detect_cycles(mode) {
            trace::cycle_detection_started(self.buffers.cycle_roots.len());
            stats.cycle_freed = self.detect_cycles();
            stats.cycle_detection_ran = true;
            self.drain_decrements();
        }

        assert!(self.buffers.drained(),
                "Fatal error: collection cycle left a buffer undrained");

        stats.freed = live_before - self.arena.len();
        stats.finalized = self.drain_finalize_queue(host)?;
        trace::cycle_finished(&stats);
        Ok(Some(stats))
    }

    /// Run a collection cycle if the nursery has outgrown its byte
    /// budget or the cycle-candidate buffer has outgrown the metadata
    /// limit.
    pub fn maybe_collect(&mut self, host: &mut dyn Host)
        -> Result<Option<CollectStats>, FinalizeError>
    {
        let nursery_due =
            self.nursery_bytes > self.tunables.nursery_limit;
        let metadata_due =
            self.buffers.cycle_roots.len() > self.tunables.metadata_limit;
        if self.gc_disabled > 0 || !(nursery_due || metadata_due) {
            return Ok(None);
        }
        self.collect(host, CollectMode::Normal)
    }

    /* -------------------------------- Roots ------------------------------- */

    /// Enumerate the host's roots, promoting each and granting it one
    /// reference count for its stay in the root buffer.
    fn visit_roots(&mut self, host: &mut dyn Host)
    {
        let mut roots = Vec::new();
        host.enumerate_roots(&mut |handle| roots.push(handle));

        for root in roots {
            self.mark_promoted(root);
            self.increment(root);
            self.buffers.roots_new.push(root);
        }
    }

    /* --------------------------- Deferred counts -------------------------- */

    /// Apply the increment half of the coalescing write barrier: each
    /// logged object's current strong children gain one count per edge,
    /// matching the decrements its pre-mutation children were queued at
    /// log time. Children still in the nursery are promoted first.
    fn drain_modification_log(&mut self)
    {
        let log = std::mem::take(&mut self.buffers.modification_log);
        for handle in log {
            self.arena.object_mut(handle).header.flags
                .remove(HeaderFlags::MUTATION_LOGGED);

            let children = self.arena.object(handle).repr.strong_children();
            for child in children {
                self.mark_promoted(child);
                self.increment(child);
            }
        }
    }

    /// Apply queued decrements until none remain, including those queued
    /// by the frees this causes.
    fn drain_decrements(&mut self)
    {
        while let Some(handle) = self.buffers.decrements.pop() {
            self.apply_decrement(handle);
        }
    }

    fn apply_decrement(&mut self, handle: Handle)
    {
        let after = {
            let header = &mut self.arena.object_mut(handle).header;
            assert!(header.is_promoted(),
                    "Fatal error: reference count decrement on nursery object");
            assert!(header.ref_count > 0,
                    "Fatal error: reference count underflow");
            header.ref_count -= 1;

            if header.ref_count > 0 {
                // A surviving object that lost a reference may head a
                // garbage cycle; log it for the next detection pass.
                if header.color == Color::Green
                    || header.flags.contains(HeaderFlags::CYCLE_LOGGED)
                {
                    Decremented::Keep
                } else {
                    header.color = Color::Purple;
                    Decremented::Candidate
                }
            } else if header.needs_finalizer() {
                Decremented::Finalize
            } else if header.flags.contains(HeaderFlags::CYCLE_LOGGED) {
                // Already a detection candidate; detection will free it.
                Decremented::Keep
            } else if header.flags.contains(HeaderFlags::JUST_MOVED) {
                // Still on the nursery list; the sweep owns its fate.
                Decremented::Keep
            } else {
                Decremented::Free
            }
        };

        match after {
            Decremented::Keep =>
                { },
            Decremented::Free =>
                self.free_counted(handle),
            Decremented::Finalize =>
                self.divert_to_finalize(handle),
            Decremented::Candidate => {
                self.arena.object_mut(handle).header.flags
                    .insert(HeaderFlags::CYCLE_LOGGED);
                self.buffers.cycle_roots.push(handle);
            },
        }
    }

    /// Keep a dead finalizable object alive on one artificial count
    /// until its finalizer has run; the finalizer phase queues the
    /// matching decrement.
    fn divert_to_finalize(&mut self, handle: Handle)
    {
        let header = &mut self.arena.object_mut(handle).header;
        header.ref_count = 1;
        header.color = Color::Black;
        header.flags.remove(HeaderFlags::JUST_MOVED);
        self.buffers.finalize.push(handle);
    }

    /* -------------------------------- Sweep ------------------------------- */

    /// Sweep the nursery list.
    ///
    /// Objects never promoted are freed outright; their outgoing edges
    /// were never counted, so no decrements cascade. Objects promoted
    /// during the window are freed if nothing counted them, otherwise
    /// they graduate off the list.
    fn sweep_nursery(&mut self) -> usize
    {
        let nursery = std::mem::take(&mut self.buffers.nursery);
        self.nursery_bytes = 0;

        let mut freed = 0;
        for handle in nursery {
            let (promoted, dead, finalize) = {
                let header = &self.arena.object(handle).header;
                let dead = header.ref_count == 0
                    && !header.flags.contains(HeaderFlags::CYCLE_LOGGED);
                (header.is_promoted(), dead, header.needs_finalizer())
            };

            if !promoted {
                self.free_uncounted(handle);
                freed += 1;
            } else if dead {
                if finalize {
                    self.divert_to_finalize(handle);
                } else {
                    self.free_counted(handle);
                    freed += 1;
                }
            } else {
                self.arena.object_mut(handle).header.flags
                    .remove(HeaderFlags::JUST_MOVED);
            }
        }
        freed
    }

    /* --------------------------- Cycle detection -------------------------- */

    /// Whether this cycle should run a detection pass; ticks the
    /// periodic countdown either way.
    fn should_detect_cycles(&mut self, mode: CollectMode) -> bool
    {
        self.cycle_countdown = self.cycle_countdown.saturating_sub(1);
        let due = mode == CollectMode::Full
            || self.cycle_countdown == 0
            || self.buffers.cycle_roots.len() > self.tunables.metadata_limit;
        if due {
            self.cycle_countdown = self.tunables.cycle_interval;
        }
        due
    }

    /// Trial deletion over the logged candidates.
    ///
    /// Mark-grey tentatively removes every internal edge, scan restores
    /// the subgraphs that still have external references, and whatever
    /// stays white is a dead cycle, freed en masse. Green objects keep
    /// their counts throughout; edges into them from the white set are
    /// settled with ordinary queued decrements afterwards.
    fn detect_cycles(&mut self) -> usize
    {
        let candidates = std::mem::take(&mut self.buffers.cycle_roots);
        let mut freed = 0;

        // Mark phase. Stale candidates fall out, and candidates with no
        // references left are ordinary garbage, not cycles. A candidate
        // already greyed by an earlier mark is left to that subgraph's
        // scan; its count is tentative and proves nothing here.
        let mut retained = Vec::new();
        for handle in candidates {
            let (color, dead, finalize) = {
                let header = &mut self.arena.object_mut(handle).header;
                header.flags.remove(HeaderFlags::CYCLE_LOGGED);
                (header.color,
                 header.ref_count == 0,
                 header.needs_finalizer())
            };

            if color == Color::Purple && !dead {
                self.arena.object_mut(handle).header.flags
                    .insert(HeaderFlags::CYCLE_LOGGED);
                self.mark_grey(handle);
                retained.push(handle);
            } else if dead && color != Color::Grey {
                if finalize {
                    self.divert_to_finalize(handle);
                } else {
                    self.free_counted(handle);
                    freed += 1;
                }
            }
        }

        // Scan phase.
        for &handle in &retained {
            self.scan(handle);
        }

        // Collect phase: gather the white set, then free it without
        // cascading, since mark-grey already removed every internal
        // and outgoing non-green count.
        let mut white = Vec::new();
        for handle in retained {
            self.arena.object_mut(handle).header.flags
                .remove(HeaderFlags::CYCLE_LOGGED);
            self.gather_white(handle, &mut white);
        }

        let mut green_children = Vec::new();
        for &handle in &white {
            let children = self.arena.object(handle).repr.strong_children();
            for child in children {
                if self.arena.object(child).header.color == Color::Green {
                    green_children.push(child);
                }
            }
        }
        for &handle in &white {
            self.free_uncounted(handle);
            freed += 1;
        }
        self.buffers.decrements.extend(green_children);

        freed
    }

    /// Tentatively delete every edge internal to the candidate's
    /// subgraph, turning the subgraph grey.
    fn mark_grey(&mut self, handle: Handle)
    {
        let mut worklist = vec![handle];
        while let Some(handle) = worklist.pop() {
            {
                let header = &mut self.arena.object_mut(handle).header;
                if header.color == Color::Grey {
                    continue;
                }
                header.color = Color::Grey;
            }

            let children = self.arena.object(handle).repr.strong_children();
            for child in children {
                let header = &mut self.arena.object_mut(child).header;
                if header.color == Color::Green {
                    continue;
                }
                assert!(header.ref_count > 0,
                        "Fatal error: reference count underflow in trial deletion");
                header.ref_count -= 1;
                worklist.push(child);
            }
        }
    }

    /// Decide the fate of a grey subgraph: externally referenced parts
    /// are restored black, the rest turns white. A dead finalizable
    /// object is diverted to the finalizer queue and its subgraph
    /// restored, since it must outlive its finalizer.
    fn scan(&mut self, handle: Handle)
    {
        let mut worklist = vec![handle];
        while let Some(handle) = worklist.pop() {
            let (grey, externally_referenced, finalize) = {
                let header = &self.arena.object(handle).header;
                (header.color == Color::Grey,
                 header.ref_count > 0,
                 header.needs_finalizer())
            };
            if !grey {
                continue;
            }

            if externally_referenced {
                self.scan_black(handle);
            } else if finalize {
                self.arena.object_mut(handle).header.ref_count = 1;
                self.scan_black(handle);
                self.buffers.finalize.push(handle);
            } else {
                self.arena.object_mut(handle).header.color = Color::White;
                let children =
                    self.arena.object(handle).repr.strong_children();
                for child in children {
                    if self.arena.object(child).header.color != Color::Green {
                        worklist.push(child);
                    }
                }
            }
        }
    }

    /// Restore a live subgraph: recolor it black and re-add the counts
    /// mark-grey removed, one per edge.
    fn scan_black(&mut self, handle: Handle)
    {
        let mut worklist = vec![handle];
        while let Some(handle) = worklist.pop() {
            {
                let header = &mut self.arena.object_mut(handle).header;
                if header.color == Color::Black {
                    continue;
                }
                header.color = Color::Black;
            }

            let children = self.arena.object(handle).repr.strong_children();
            for child in children {
                let header = &mut self.arena.object_mut(child).header;
                if header.color == Color::Green {
                    continue;
                }
                header.ref_count += 1;
                if header.color != Color::Black {
                    worklist.push(child);
                }
            }
        }
    }

    /// Gather a white subgraph into the free list, recoloring it black
    /// so shared members are gathered only once.
    fn gather_white(&mut self, handle: Handle, white: &mut Vec<Handle>)
    {
        let mut worklist = vec![handle];
        while let Some(handle) = worklist.pop() {
            {
                let header = &mut self.arena.object_mut(handle).header;
                if header.color != Color::White {
                    continue;
                }
                header.color = Color::Black;
            }
            white.push(handle);

            let children = self.arena.object(handle).repr.strong_children();
            for child in children {
                if self.arena.object(child).header.color != Color::Green {
                    worklist.push(child);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        crate::heap::{testing::TestHost, Tunables},
        crate::value::Value,
        proptest::prelude::*,
    };

    fn cycle_pair(heap: &mut Heap) -> (Handle, Handle)
    {
        let a = heap.new_cell(Value::Null).unwrap();
        let b = heap.new_cell(Value::Object(a)).unwrap();
        heap.cell_set(a, Value::Object(b));
        (a, b)
    }

    #[test]
    fn unrooted_nursery_objects_are_swept()
    {
        let mut heap = Heap::new();
        let mut host = TestHost::default();
        heap.new_list(Vec::new()).unwrap();
        heap.new_string(b"doomed").unwrap();

        let stats = heap.collect(&mut host, CollectMode::Normal).unwrap().unwrap();
        assert_eq!(stats.nursery_freed, 2);
        assert!(heap.is_empty());
        assert_eq!(heap.bytes_live(), 0);
    }

    #[test]
    fn rooted_objects_survive_and_are_promoted()
    {
        let mut heap = Heap::new();
        let mut host = TestHost::default();
        let string = heap.new_string(b"kept").unwrap();
        let list = heap.new_list(vec![Value::Object(string)]).unwrap();
        host.roots.push(list);

        heap.collect(&mut host, CollectMode::Normal).unwrap();
        assert!(heap.is_promoted(list));
        assert!(heap.is_promoted(string));
        assert_eq!(heap.ref_count(list), 1);
        assert_eq!(heap.ref_count(string), 1);
        assert_eq!(heap.len(), 2);
    }

    #[test]
    fn dropping_a_root_frees_on_the_next_cycle()
    {
        let mut heap = Heap::new();
        let mut host = TestHost::default();
        let string = heap.new_string(b"kept").unwrap();
        let list = heap.new_list(vec![Value::Object(string)]).unwrap();
        host.roots.push(list);

        heap.collect(&mut host, CollectMode::Normal).unwrap();
        host.roots.clear();
        let stats = heap.collect(&mut host, CollectMode::Normal).unwrap().unwrap();
        assert_eq!(stats.freed, 2);
        assert!(heap.is_empty());
    }

    #[test]
    fn no_roots_mode_keeps_the_previous_root_set()
    {
        let mut heap = Heap::new();
        let mut host = TestHost::default();
        let list = heap.new_list(Vec::new()).unwrap();
        host.roots.push(list);

        heap.collect(&mut host, CollectMode::Normal).unwrap();
        host.roots.clear();
        heap.collect(&mut host, CollectMode::NoRoots).unwrap();
        heap.collect(&mut host, CollectMode::NoRoots).unwrap();
        assert!(heap.contains(list));
        assert_eq!(heap.ref_count(list), 1);

        heap.collect(&mut host, CollectMode::Normal).unwrap();
        assert!(heap.is_empty());
    }

    #[test]
    fn reference_cycle_is_reclaimed_by_detection()
    {
        let mut heap = Heap::new();
        let mut host = TestHost::default();
        let (a, b) = cycle_pair(&mut heap);
        host.roots.push(a);

        heap.collect(&mut host, CollectMode::Full).unwrap();
        assert_eq!(heap.ref_count(a), 2);
        assert_eq!(heap.ref_count(b), 1);

        host.roots.clear();
        let stats = heap.collect(&mut host, CollectMode::Full).unwrap().unwrap();
        assert_eq!(stats.cycle_freed, 2);
        assert!(heap.is_empty());
    }

    #[test]
    fn self_referential_object_is_reclaimed()
    {
        let mut heap = Heap::new();
        let mut host = TestHost::default();
        let cell = heap.new_cell(Value::Null).unwrap();
        heap.cell_set(cell, Value::Object(cell));
        host.roots.push(cell);

        heap.collect(&mut host, CollectMode::Full).unwrap();
        host.roots.clear();
        let stats = heap.collect(&mut host, CollectMode::Full).unwrap().unwrap();
        assert_eq!(stats.cycle_freed, 1);
        assert!(heap.is_empty());
    }

    #[test]
    fn rooted_cycle_survives_detection()
    {
        let mut heap = Heap::new();
        let mut host = TestHost::default();
        let (a, b) = cycle_pair(&mut heap);
        host.roots.push(a);

        heap.collect(&mut host, CollectMode::Full).unwrap();
        // A lost reference logs a candidate, but the root keeps it live.
        heap.cell_set(b, Value::Null);
        heap.cell_set(b, Value::Object(a));
        let stats = heap.collect(&mut host, CollectMode::Full).unwrap().unwrap();
        assert!(stats.cycle_detection_ran);
        assert!(heap.contains(a));
        assert!(heap.contains(b));
        assert_eq!(heap.ref_count(a), 2);
    }

    #[test]
    fn detection_countdown_fires_periodically()
    {
        let tunables = Tunables{cycle_interval: 2, ..Tunables::default()};
        let mut heap = Heap::with_tunables(tunables);
        let mut host = TestHost::default();
        let (a, _) = cycle_pair(&mut heap);
        host.roots.push(a);

        let stats = heap.collect(&mut host, CollectMode::Normal).unwrap().unwrap();
        assert!(!stats.cycle_detection_ran);

        host.roots.clear();
        let stats = heap.collect(&mut host, CollectMode::Normal).unwrap().unwrap();
        assert!(stats.cycle_detection_ran);
        assert!(heap.is_empty());
    }

    #[test]
    fn metadata_limit_forces_detection()
    {
        let tunables = Tunables{metadata_limit: 1, ..Tunables::default()};
        let mut heap = Heap::with_tunables(tunables);
        let mut host = TestHost::default();
        let (a, _) = cycle_pair(&mut heap);
        let (c, _) = cycle_pair(&mut heap);
        host.roots.push(a);
        host.roots.push(c);

        let stats = heap.collect(&mut host, CollectMode::Normal).unwrap().unwrap();
        assert!(!stats.cycle_detection_ran);

        host.roots.clear();
        let stats = heap.collect(&mut host, CollectMode::Normal).unwrap().unwrap();
        assert!(stats.cycle_detection_ran);
        assert!(heap.is_empty());
    }

    #[test]
    fn maybe_collect_fires_on_the_metadata_threshold()
    {
        let tunables = Tunables{metadata_limit: 1, ..Tunables::default()};
        let mut heap = Heap::with_tunables(tunables);
        let mut host = TestHost::default();

        // Two parents whose mark-phase frees cascade onto doubly
        // referenced children, logging fresh candidates in the
        // post-detection drain.
        let x = heap.new_cell(Value::Null).unwrap();
        let a = heap
            .new_list(vec![Value::Object(x), Value::Object(x)])
            .unwrap();
        let y = heap.new_cell(Value::Null).unwrap();
        let b = heap
            .new_list(vec![Value::Object(y), Value::Object(y)])
            .unwrap();
        host.roots = vec![a, a, b, b];

        heap.collect(&mut host, CollectMode::Full).unwrap();
        host.roots.clear();
        heap.collect(&mut host, CollectMode::Full).unwrap();
        assert!(heap.contains(x));
        assert!(heap.contains(y));

        // Nursery is empty; only the candidate backlog is over budget.
        let stats = heap.maybe_collect(&mut host).unwrap();
        assert!(stats.is_some());
        assert!(heap.is_empty());
    }

    #[test]
    fn collect_while_disabled_returns_none()
    {
        let mut heap = Heap::new();
        let mut host = TestHost::default();
        let list = heap.new_list(Vec::new()).unwrap();

        heap.with_gc_disabled(|heap| {
            assert!(heap.collect(&mut host, CollectMode::Full)
                .unwrap()
                .is_none());
        });
        assert!(heap.contains(list));

        let stats = heap.collect(&mut host, CollectMode::Full).unwrap();
        assert!(stats.is_some());
        assert!(heap.is_empty());
    }

    #[test]
    fn failed_finalizer_leaves_the_rest_queued()
    {
        let mut heap = Heap::new();
        let mut host = TestHost::default();
        let a = heap.new_cell(Value::Null).unwrap();
        let b = heap.new_cell(Value::Null).unwrap();
        heap.mark_finalizable(a);
        heap.mark_finalizable(b);
        host.roots = vec![a, b];
        host.fail = vec![a, b];

        heap.collect(&mut host, CollectMode::Normal).unwrap();
        host.roots.clear();

        // Both die this cycle; the first finalizer fails, so the second
        // stays queued and its object stays alive.
        let first = heap.collect(&mut host, CollectMode::Normal).unwrap_err();
        assert_eq!(host.finalized.len(), 1);
        assert!(heap.contains(a));
        assert!(heap.contains(b));

        let second = heap.collect(&mut host, CollectMode::Normal).unwrap_err();
        assert_ne!(first.object, second.object);
        assert_eq!(host.finalized.len(), 2);

        heap.collect(&mut host, CollectMode::Normal).unwrap();
        heap.collect(&mut host, CollectMode::Normal).unwrap();
        assert!(heap.is_empty());
    }

    #[test]
    fn maybe_collect_waits_for_the_nursery_budget()
    {
        let tunables = Tunables{nursery_limit: 64, ..Tunables::default()};
        let mut heap = Heap::with_tunables(tunables);
        let mut host = TestHost::default();

        heap.new_string(b"x").unwrap();
        assert!(heap.maybe_collect(&mut host).unwrap().is_none());

        heap.new_string(&[0; 128]).unwrap();
        let stats = heap.maybe_collect(&mut host).unwrap();
        assert!(stats.is_some());
        assert!(heap.is_empty());
    }

    #[test]
    fn weak_cell_nulls_out_when_the_target_dies()
    {
        let mut heap = Heap::new();
        let mut host = TestHost::default();
        let target = heap.new_list(Vec::new()).unwrap();
        let weak = heap.downgrade(target).unwrap();
        host.roots.push(weak);

        heap.collect(&mut host, CollectMode::Normal).unwrap();
        assert!(!heap.contains(target));
        assert_eq!(heap.weak_get(weak), Value::Null);
    }

    #[test]
    fn weak_cell_reads_the_target_while_it_lives()
    {
        let mut heap = Heap::new();
        let mut host = TestHost::default();
        let target = heap.new_list(Vec::new()).unwrap();
        let weak = heap.downgrade(target).unwrap();
        host.roots.push(weak);
        host.roots.push(target);

        heap.collect(&mut host, CollectMode::Normal).unwrap();
        assert_eq!(heap.weak_get(weak), Value::Object(target));

        // Downgrading again still yields the interned cell.
        assert_eq!(heap.downgrade(target).unwrap(), weak);
    }

    #[test]
    fn finalizer_runs_once_then_the_object_is_freed()
    {
        let mut heap = Heap::new();
        let mut host = TestHost::default();
        let object = heap.new_cell(Value::Null).unwrap();
        heap.mark_finalizable(object);
        host.roots.push(object);

        heap.collect(&mut host, CollectMode::Normal).unwrap();
        host.roots.clear();
        let stats = heap.collect(&mut host, CollectMode::Normal).unwrap().unwrap();
        assert_eq!(stats.finalized, 1);
        assert_eq!(host.finalized, vec![object]);
        assert!(heap.contains(object));

        heap.collect(&mut host, CollectMode::Normal).unwrap();
        assert!(!heap.contains(object));
        assert_eq!(host.finalized, vec![object]);
    }

    #[test]
    fn unrooted_finalizable_object_is_not_swept_silently()
    {
        let mut heap = Heap::new();
        let mut host = TestHost::default();
        let object = heap.new_cell(Value::Null).unwrap();
        heap.mark_finalizable(object);

        heap.collect(&mut host, CollectMode::Normal).unwrap();
        assert_eq!(host.finalized, vec![object]);

        heap.collect(&mut host, CollectMode::Normal).unwrap();
        assert!(heap.is_empty());
    }

    #[test]
    fn failing_finalizer_reports_once_then_the_object_is_reclaimed()
    {
        let mut heap = Heap::new();
        let mut host = TestHost::default();
        let object = heap.new_cell(Value::Null).unwrap();
        heap.mark_finalizable(object);
        host.roots.push(object);

        heap.collect(&mut host, CollectMode::Normal).unwrap();
        host.roots.clear();
        let error = heap.collect(&mut host, CollectMode::Normal).unwrap_err();
        assert_eq!(error.object, object);

        heap.collect(&mut host, CollectMode::Normal).unwrap();
        assert!(!heap.contains(object));
        assert_eq!(host.finalized, vec![object]);
    }

    #[test]
    fn finalizer_in_a_dead_cycle_runs_before_reclamation()
    {
        let mut heap = Heap::new();
        let mut host = TestHost::default();
        let (a, b) = cycle_pair(&mut heap);
        heap.mark_finalizable(b);
        host.roots.push(a);

        heap.collect(&mut host, CollectMode::Full).unwrap();
        host.roots.clear();
        let stats = heap.collect(&mut host, CollectMode::Full).unwrap().unwrap();
        assert_eq!(stats.finalized, 1);
        assert_eq!(host.finalized, vec![b]);
        assert!(heap.contains(b));

        heap.collect(&mut host, CollectMode::Full).unwrap();
        heap.collect(&mut host, CollectMode::Full).unwrap();
        assert!(heap.is_empty());
    }

    #[test]
    fn resurrected_object_survives_its_finalizer()
    {
        let mut heap = Heap::new();
        let mut host = TestHost::default();
        let keeper = heap.new_cell(Value::Null).unwrap();
        let object = heap.new_cell(Value::Null).unwrap();
        heap.mark_finalizable(object);
        host.roots.push(keeper);
        host.roots.push(object);

        heap.collect(&mut host, CollectMode::Normal).unwrap();
        host.roots.retain(|&root| root != object);
        host.resurrect_into = Some(keeper);
        heap.collect(&mut host, CollectMode::Normal).unwrap();
        assert_eq!(host.finalized, vec![object]);

        host.resurrect_into = None;
        heap.collect(&mut host, CollectMode::Normal).unwrap();
        assert!(heap.contains(object));
        assert_eq!(heap.cell_get(keeper), Value::Object(object));

        // Dropping the resurrected object frees it without a second
        // finalizer run.
        heap.cell_set(keeper, Value::Null);
        heap.collect(&mut host, CollectMode::Full).unwrap();
        heap.collect(&mut host, CollectMode::Full).unwrap();
        assert!(!heap.contains(object));
        assert_eq!(host.finalized, vec![object]);
    }

    #[test]
    fn heap_bytes_return_to_baseline_after_a_deep_chain()
    {
        let mut heap = Heap::new();
        let mut host = TestHost::default();

        let mut head = heap.new_cell(Value::Null).unwrap();
        for _ in 0..999 {
            head = heap.new_cell(Value::Object(head)).unwrap();
        }
        host.roots.push(head);
        heap.collect(&mut host, CollectMode::Normal).unwrap();
        assert_eq!(heap.len(), 1000);

        host.roots.clear();
        heap.collect(&mut host, CollectMode::Normal).unwrap();
        assert!(heap.is_empty());
        assert_eq!(heap.bytes_live(), 0);
    }

    proptest!
    {
        #[test]
        fn reachable_objects_survive_collection(
            edges in proptest::collection::vec((0..8usize, 0..8usize), 0..24),
            roots in proptest::collection::vec(0..8usize, 0..4),
        )
        {
            let mut heap = Heap::new();
            let mut host = TestHost::default();
            let handles = (0..8)
                .map(|_| heap.new_list(Vec::new()).unwrap())
                .collect::<Vec<_>>();
            for &(from, to) in &edges {
                heap.list_push(handles[from], Value::Object(handles[to]));
            }
            host.roots = roots.iter().map(|&index| handles[index]).collect();

            heap.collect(&mut host, CollectMode::Full).unwrap();

            let mut reachable = [false; 8];
            let mut stack = roots.clone();
            while let Some(index) = stack.pop() {
                if reachable[index] {
                    continue;
                }
                reachable[index] = true;
                for &(from, to) in &edges {
                    if from == index {
                        stack.push(to);
                    }
                }
            }

            for index in 0..8 {
                prop_assert_eq!(heap.contains(handles[index]), reachable[index]);
            }
            prop_assert_eq!(
                heap.len(),
                reachable.iter().filter(|&&live| live).count(),
            );

            host.roots.clear();
            for _ in 0..8 {
                heap.collect(&mut host, CollectMode::Full).unwrap();
            }
            prop_assert!(heap.is_empty());
        }

        /// Mutating promoted objects through the write barrier,
        /// interleaved with heuristic collections, never frees an
        /// object a shadow reachability model still reaches.
        #[test]
        fn no_premature_free_under_interleaved_mutation(
            ops in proptest::collection::vec((0..6usize, 0..8usize), 0..48),
            roots in proptest::collection::vec(0..6usize, 1..4),
        )
        {
            let tunables = Tunables{nursery_limit: 1, ..Tunables::default()};
            let mut heap = Heap::with_tunables(tunables);
            let mut host = TestHost::default();

            // Three cells and three one-slot lists; each holds at most
            // one outgoing edge, mirrored in the shadow model.
            let objects = (0..6)
                .map(|index| {
                    if index < 3 {
                        heap.new_cell(Value::Null)
                    } else {
                        heap.new_list(vec![Value::Null])
                    }
                })
                .collect::<Result<Vec<_>, _>>()
                .unwrap();
            host.roots = roots.iter().map(|&index| objects[index]).collect();
            heap.collect(&mut host, CollectMode::Full).unwrap();

            let reachable = |edges: &[Option<usize>; 6]| {
                let mut live = [false; 6];
                let mut stack = roots.clone();
                while let Some(index) = stack.pop() {
                    if live[index] {
                        continue;
                    }
                    live[index] = true;
                    if let Some(target) = edges[index] {
                        stack.push(target);
                    }
                }
                live
            };

            let mut edges: [Option<usize>; 6] = [None; 6];
            for (slot, target) in ops {
                let live = reachable(&edges);

                if target == 7 {
                    // Scratch garbage pushes the nursery over budget so
                    // the heuristic trigger actually fires.
                    heap.new_string(b"scratch").unwrap();
                    prop_assert!(
                        heap.maybe_collect(&mut host).unwrap().is_some());
                    for index in 0..6 {
                        if live[index] {
                            prop_assert!(heap.contains(objects[index]));
                        }
                    }
                    continue;
                }

                // Only model-live objects are touched; a dead one may
                // already have been legitimately reclaimed.
                if !live[slot] || (target < 6 && !live[target]) {
                    continue;
                }
                let value = match target {
                    0..=5 => Value::Object(objects[target]),
                    _ => Value::Null,
                };
                if slot < 3 {
                    heap.cell_set(objects[slot], value);
                } else {
                    heap.list_set(objects[slot], 0, value);
                }
                edges[slot] = if target < 6 { Some(target) } else { None };
            }

            let live = reachable(&edges);
            for index in 0..6 {
                if live[index] {
                    prop_assert!(heap.contains(objects[index]));
                }
            }

            host.roots.clear();
            for _ in 0..8 {
                heap.collect(&mut host, CollectMode::Full).unwrap();
            }
            prop_assert!(heap.is_empty());
        }

        /// On acyclic graphs the count of a live promoted object equals
        /// its live incoming edges plus one per root-buffer occurrence.
        #[test]
        fn refcounts_match_an_acyclic_oracle(
            edges in proptest::collection::vec((0..8usize, 0..8usize), 0..24),
            roots in proptest::collection::vec(0..8usize, 0..4),
        )
        {
            // Edges only point from lower to higher index, so the graph
            // cannot contain a cycle.
            let edges = edges.iter()
                .copied()
                .filter(|&(from, to)| from < to)
                .collect::<Vec<_>>();

            let mut heap = Heap::new();
            let mut host = TestHost::default();
            let handles = (0..8)
                .map(|_| heap.new_list(Vec::new()).unwrap())
                .collect::<Vec<_>>();
            for &(from, to) in &edges {
                heap.list_push(handles[from], Value::Object(handles[to]));
            }
            host.roots = roots.iter().map(|&index| handles[index]).collect();

            heap.collect(&mut host, CollectMode::Full).unwrap();

            let mut reachable = [false; 8];
            let mut stack = roots.clone();
            while let Some(index) = stack.pop() {
                if reachable[index] {
                    continue;
                }
                reachable[index] = true;
                for &(from, to) in &edges {
                    if from == index {
                        stack.push(to);
                    }
                }
            }

            for index in 0..8 {
                if !reachable[index] {
                    prop_assert!(!heap.contains(handles[index]));
                    continue;
                }
                let incoming = edges.iter()
                    .filter(|&&(from, to)| to == index && reachable[from])
                    .count();
                let rooted = roots.iter()
                    .filter(|&&root| root == index)
                    .count();
                prop_assert_eq!(
                    heap.ref_count(handles[index]) as usize,
                    incoming + rooted,
                );
            }
        }
    }
}
