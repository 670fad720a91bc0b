//! The sink seam between reconciliation and persistence.
//!
//! Components receive an [`EventSink`] rather than a database handle, so
//! tests can observe writes and the storage mapping stays behind one
//! implementation.

use std::future::Future;

use stormtrack_shared::{Buffer, EventMeta, Node, Result, Track};
use stormtrack_storage::Storage;

/// The reconciled canonical state for one event: everything the sink swaps
/// in as a single unit.
#[derive(Debug, Clone)]
pub struct EventState {
    pub meta: EventMeta,
    pub nodes: Vec<Node>,
    pub track: Track,
    pub buffers: Vec<Buffer>,
}

/// Persistence contract consumed by the pipeline and the reconciler.
pub trait EventSink: Send + Sync {
    /// The per-event episode cursor: newest episode with stored rows.
    fn last_stored_episode(&self, event_id: i64)
    -> impl Future<Output = Result<Option<i64>>> + Send;

    /// Atomically replace the event's stored rows with `state`.
    /// Must never delete before the replacement rows are at hand.
    fn replace_event(&self, state: &EventState) -> impl Future<Output = Result<()>> + Send;
}

impl EventSink for Storage {
    async fn last_stored_episode(&self, event_id: i64) -> Result<Option<i64>> {
        Storage::last_stored_episode(self, event_id).await
    }

    async fn replace_event(&self, state: &EventState) -> Result<()> {
        Storage::replace_event(
            self,
            &state.meta,
            &state.nodes,
            &state.track,
            &state.buffers,
        )
        .await
    }
}
