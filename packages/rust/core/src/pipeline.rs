//! Backfill pipeline: enumerate every event, reduce each one concurrently,
//! persist serially.
//!
//! Per-event computation is pure fetching and reduction, so it fans out over
//! a bounded set of tasks; all sink writes happen on the collecting task, so
//! the store never sees concurrent replacements. A failure in one event is
//! recorded and never aborts the run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

use stormtrack_feed::{HazardFeed, order_episodes};
use stormtrack_shared::Result;

use crate::classify::build_buffers;
use crate::reducer::reduce_event;
use crate::sink::{EventSink, EventState};
use crate::track::build_track;

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

/// Tuning knobs for a backfill run.
#[derive(Debug, Clone)]
pub struct BackfillOptions {
    /// Concurrent per-event computations.
    pub concurrency: usize,
    /// Process at most this many events; 0 means all.
    pub event_limit: usize,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            event_limit: 0,
        }
    }
}

/// Outcome tallies for a backfill run.
#[derive(Debug, Default)]
pub struct BackfillResult {
    pub events_persisted: usize,
    pub events_discarded: usize,
    /// Per-event failures: (event locator, error message).
    pub errors: Vec<(String, String)>,
    pub duration: Duration,
}

/// Observer for long-running ingest progress; the CLI renders this as a
/// progress bar.
pub trait ProgressReporter: Send + Sync {
    fn begin(&self, _total_events: usize) {}
    fn event_done(&self, _event_path: &str) {}
    fn finish(&self) {}
}

/// No-op reporter for tests and embedded use.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {}

// ---------------------------------------------------------------------------
// Per-event computation
// ---------------------------------------------------------------------------

/// Compute one event's canonical state: list its episodes, reduce them, and
/// assemble the rows to store. `Ok(None)` means the event is discarded.
#[instrument(skip(feed))]
pub async fn compute_event<F: HazardFeed>(
    feed: &F,
    event_path: &str,
) -> Result<Option<EventState>> {
    let names = feed.list_episode_files(event_path).await?;
    let episodes = order_episodes(&names);
    if episodes.is_empty() {
        debug!(event_path, "no episode files, skipping");
        return Ok(None);
    }

    let Some(reduced) = reduce_event(feed, &episodes).await? else {
        return Ok(None);
    };

    let track = build_track(&reduced.latest.lines, &reduced.nodes, &reduced.meta);
    let buffers = build_buffers(&reduced.latest.polygons, &reduced.meta);

    Ok(Some(EventState {
        meta: reduced.meta,
        nodes: reduced.nodes,
        track,
        buffers,
    }))
}

// ---------------------------------------------------------------------------
// Backfill run
// ---------------------------------------------------------------------------

/// Reduce and persist every event the feed lists.
///
/// Computation fans out up to `options.concurrency` tasks; persistence is
/// serialized here on the collector. Individual event failures are tallied
/// in the result, not raised.
#[instrument(skip_all, fields(concurrency = options.concurrency))]
pub async fn run_backfill<F, S>(
    feed: Arc<F>,
    sink: &S,
    options: &BackfillOptions,
    progress: &dyn ProgressReporter,
) -> Result<BackfillResult>
where
    F: HazardFeed + 'static,
    S: EventSink,
{
    let started = Instant::now();

    let mut events = feed.list_events().await?;
    if options.event_limit > 0 {
        events.truncate(options.event_limit);
    }
    info!(events = events.len(), "starting backfill");
    progress.begin(events.len());

    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut tasks: JoinSet<(String, Result<Option<EventState>>)> = JoinSet::new();
    for event_path in events {
        let feed = Arc::clone(&feed);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                // Never closed in practice; surface it as a per-event error.
                Err(_) => {
                    let err = stormtrack_shared::StormtrackError::validation(
                        "ingest task pool closed",
                    );
                    return (event_path, Err(err));
                }
            };
            let outcome = compute_event(feed.as_ref(), &event_path).await;
            (event_path, outcome)
        });
    }

    let mut result = BackfillResult::default();
    while let Some(joined) = tasks.join_next().await {
        let (event_path, outcome) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "event task aborted");
                result.errors.push(("<task>".to_string(), e.to_string()));
                continue;
            }
        };

        match outcome {
            Ok(Some(state)) => match sink.replace_event(&state).await {
                Ok(()) => {
                    debug!(
                        event_id = state.meta.event_id,
                        episode_id = state.meta.episode_id,
                        nodes = state.nodes.len(),
                        "event persisted"
                    );
                    result.events_persisted += 1;
                }
                Err(e) => {
                    error!(event_path, error = %e, "failed to persist event");
                    result.errors.push((event_path.clone(), e.to_string()));
                }
            },
            Ok(None) => result.events_discarded += 1,
            Err(e) => {
                error!(event_path, error = %e, "event computation failed");
                result.errors.push((event_path.clone(), e.to_string()));
            }
        }
        progress.event_done(&event_path);
    }
    progress.finish();

    result.duration = started.elapsed();
    info!(
        persisted = result.events_persisted,
        discarded = result.events_discarded,
        errors = result.errors.len(),
        elapsed_ms = result.duration.as_millis() as u64,
        "backfill finished"
    );
    Ok(result)
}
