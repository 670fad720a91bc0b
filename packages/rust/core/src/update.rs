//! Incremental reconciliation against the stored episode cursor.
//!
//! An update run works from episode notices (event id, newest episode id).
//! An event whose stored cursor is already at or past the noticed episode is
//! skipped without touching the feed, which makes repeated runs over the
//! same notices idempotent. Everything else goes through the same reduction
//! path as a backfill, so both modes converge on identical stored state.

use tracing::{debug, info, instrument, warn};

use stormtrack_feed::{HazardFeed, event_id_from_path, order_episodes};
use stormtrack_shared::{EpisodeNotice, Result};

use crate::pipeline::{ProgressReporter, compute_event};
use crate::sink::EventSink;

/// What a single reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Stored cursor already covers the noticed episode; no fetch was made.
    Skipped,
    /// Event state was recomputed and swapped in.
    Replaced { nodes: usize },
    /// Recomputation produced no storable event; nothing was written.
    Discarded,
}

/// Outcome tallies for an update run.
#[derive(Debug, Default)]
pub struct UpdateResult {
    pub replaced: usize,
    pub skipped: usize,
    pub discarded: usize,
    /// Per-event failures: (event id, error message).
    pub errors: Vec<(i64, String)>,
}

/// Reconcile one event against a notice.
#[instrument(skip(feed, sink), fields(event_id = notice.event_id, episode_id = notice.episode_id))]
pub async fn reconcile_event<F, S>(
    feed: &F,
    sink: &S,
    notice: EpisodeNotice,
) -> Result<ReconcileOutcome>
where
    F: HazardFeed,
    S: EventSink,
{
    if let Some(stored) = sink.last_stored_episode(notice.event_id).await? {
        if stored >= notice.episode_id {
            debug!(stored, "cursor already current, skipping");
            return Ok(ReconcileOutcome::Skipped);
        }
    }

    let locator = feed.event_locator(notice.event_id);
    match compute_event(feed, &locator).await? {
        Some(state) => {
            let nodes = state.nodes.len();
            sink.replace_event(&state).await?;
            debug!(nodes, "event state replaced");
            Ok(ReconcileOutcome::Replaced { nodes })
        }
        None => Ok(ReconcileOutcome::Discarded),
    }
}

/// Reconcile a batch of notices sequentially. A failing event is recorded
/// and never aborts the batch; its stored state is left as it was.
#[instrument(skip_all, fields(notices = notices.len()))]
pub async fn run_update<F, S>(
    feed: &F,
    sink: &S,
    notices: &[EpisodeNotice],
    progress: &dyn ProgressReporter,
) -> UpdateResult
where
    F: HazardFeed,
    S: EventSink,
{
    progress.begin(notices.len());

    let mut result = UpdateResult::default();
    for notice in notices {
        match reconcile_event(feed, sink, *notice).await {
            Ok(ReconcileOutcome::Skipped) => result.skipped += 1,
            Ok(ReconcileOutcome::Replaced { .. }) => result.replaced += 1,
            Ok(ReconcileOutcome::Discarded) => result.discarded += 1,
            Err(e) => {
                warn!(event_id = notice.event_id, error = %e, "reconciliation failed");
                result.errors.push((notice.event_id, e.to_string()));
            }
        }
        progress.event_done(&notice.event_id.to_string());
    }
    progress.finish();

    info!(
        replaced = result.replaced,
        skipped = result.skipped,
        discarded = result.discarded,
        errors = result.errors.len(),
        "update finished"
    );
    result
}

/// Derive episode notices from the live feed: one per listed event, carrying
/// its newest episode sequence. Events whose listing cannot be read or holds
/// no episodes are left out.
#[instrument(skip(feed))]
pub async fn collect_notices<F: HazardFeed>(feed: &F) -> Result<Vec<EpisodeNotice>> {
    let mut notices = Vec::new();
    for event_path in feed.list_events().await? {
        let Some(event_id) = event_id_from_path(&event_path) else {
            continue;
        };
        let names = match feed.list_episode_files(&event_path).await {
            Ok(names) => names,
            Err(e) => {
                warn!(event_path, error = %e, "skipping unreadable event listing");
                continue;
            }
        };
        if let Some(newest) = order_episodes(&names).last() {
            notices.push(EpisodeNotice {
                event_id,
                episode_id: newest.sequence,
            });
        }
    }
    Ok(notices)
}
