//! Applies decoded push events to the board store.

use tracing::{debug, warn};

use super::{InboundFrame, RealtimeEvent};
use crate::models::UserId;
use crate::store::{BoardStore, Patch};

/// What handling one frame did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerOutcome {
    /// Sent by this viewer; already applied optimistically
    EchoSuppressed,
    Applied,
    Unchanged,
    /// Inconsistent with local state and dropped; prior state kept
    Discarded,
    /// The store cannot be patched; reload the board
    RefetchRequired,
    /// Unknown type or undecodable payload
    Ignored,
}

/// Feed dispatcher for one viewer. Writes only to the store.
#[derive(Debug, Clone)]
pub struct FeedListener {
    viewer_id: UserId,
}

impl FeedListener {
    pub fn new(viewer_id: impl Into<UserId>) -> Self {
        Self { viewer_id: viewer_id.into() }
    }

    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    pub fn is_echo(&self, frame: &InboundFrame) -> bool {
        frame.sender_id.as_deref() == Some(self.viewer_id.as_str())
    }

    pub fn handle(&self, frame: &InboundFrame, store: &mut BoardStore) -> ListenerOutcome {
        if self.is_echo(frame) {
            debug!(kind = %frame.kind, "own broadcast suppressed");
            return ListenerOutcome::EchoSuppressed;
        }

        let event = match frame.decode() {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(kind = %frame.kind, "unknown realtime event ignored");
                return ListenerOutcome::Ignored;
            }
            Err(e) => {
                warn!(kind = %frame.kind, error = %e, "undecodable realtime payload ignored");
                return ListenerOutcome::Ignored;
            }
        };

        let patch = match event {
            RealtimeEvent::CardCreated(card) | RealtimeEvent::CardUpdated(card) => store.upsert_card(card),
            RealtimeEvent::CardDeleted { card_id } => store.remove_card(card_id),
            RealtimeEvent::CardMoved { card, old_column_id } => {
                debug!(card_id = card.id, ?old_column_id, to = card.column_id, "remote card move");
                store.place_card(card)
            }
            RealtimeEvent::ColumnsReordered { ordered_column_ids } => store.apply_column_order(&ordered_column_ids),
            RealtimeEvent::Structural(change) => {
                debug!(?change, "structural change, reloading board");
                Patch::RefetchRequired
            }
        };

        match patch {
            Patch::Applied => ListenerOutcome::Applied,
            Patch::Unchanged => ListenerOutcome::Unchanged,
            Patch::Rejected => ListenerOutcome::Discarded,
            Patch::RefetchRequired => ListenerOutcome::RefetchRequired,
        }
    }
}
