//! Ingestion core: classification, episode reduction, and the backfill and
//! update pipelines.
//!
//! The core speaks to the outside world through two seams: the
//! [`HazardFeed`](stormtrack_feed::HazardFeed) trait upstream and the
//! [`EventSink`] trait downstream. Everything between them is deterministic
//! given the fetched snapshots, which is what the tests lean on.

pub mod classify;
pub mod pipeline;
pub mod reducer;
pub mod sink;
pub mod track;
pub mod update;

#[cfg(test)]
pub(crate) mod testutil;

pub use classify::{Classified, build_buffers, classify};
pub use pipeline::{
    BackfillOptions, BackfillResult, ProgressReporter, SilentProgress, compute_event,
    run_backfill,
};
pub use reducer::{ReducedEvent, reduce_event};
pub use sink::{EventSink, EventState};
pub use track::build_track;
pub use update::{
    ReconcileOutcome, UpdateResult, collect_notices, reconcile_event, run_update,
};
