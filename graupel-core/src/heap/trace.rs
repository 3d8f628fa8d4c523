//! Collection-cycle trace points, compiled to no-ops unless the
//! `tracing` feature is enabled.

use super::{CollectMode, CollectStats};

#[cfg(feature = "tracing")]
pub (super) fn cycle_started(mode: CollectMode)
{
    tracing::debug!(?mode, "collection cycle started");
}

#[cfg(not(feature = "tracing"))]
pub (super) fn cycle_started(_mode: CollectMode)
{
}

#[cfg(feature = "tracing")]
pub (super) fn cycle_detection_started(candidates: usize)
{
    tracing::debug!(candidates, "cycle detection started");
}

#[cfg(not(feature = "tracing"))]
pub (super) fn cycle_detection_started(_candidates: usize)
{
}

#[cfg(feature = "tracing")]
pub (super) fn cycle_finished(stats: &CollectStats)
{
    tracing::debug!(
        freed = stats.freed,
        cycle_freed = stats.cycle_freed,
        finalized = stats.finalized,
        "collection cycle finished",
    );
}

#[cfg(not(feature = "tracing"))]
pub (super) fn cycle_finished(_stats: &CollectStats)
{
}
