//! Realtime Feed
//!
//! Inbound push frames, their decoding into typed events, the listener that
//! applies them to the store, and the two transports that deliver them
//! (websocket subscription and interval polling).

mod listener;
mod polling;
mod socket;

pub use listener::{FeedListener, ListenerOutcome};
pub use polling::Poller;
pub use socket::{Subscription, SubscriptionEvent};

use serde::Deserialize;
use serde_json::Value;

use crate::error::SyncResult;
use crate::models::{Card, CardId, ColumnId, UserId};

/// Raw push message: `{type, payload, sender_id}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub sender_id: Option<UserId>,
}

/// Events that always force a full reload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralChange {
    BoardStateUpdated,
    ColumnCreated,
    ColumnUpdated,
    ColumnDeleted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    CardCreated(Card),
    CardUpdated(Card),
    CardDeleted { card_id: CardId },
    CardMoved { card: Card, old_column_id: Option<ColumnId> },
    ColumnsReordered { ordered_column_ids: Vec<ColumnId> },
    Structural(StructuralChange),
}

#[derive(Deserialize)]
struct CardDeletedPayload {
    card_id: CardId,
}

#[derive(Deserialize)]
struct CardMovedPayload {
    card: Card,
    #[serde(default)]
    old_column_id: Option<ColumnId>,
}

#[derive(Deserialize)]
struct ColumnsReorderedPayload {
    ordered_column_ids: Vec<ColumnId>,
}

impl InboundFrame {
    pub fn parse(text: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// `CARD_MOVED` and `card-moved` name the same event
    pub fn normalized_kind(&self) -> String {
        self.kind.trim().to_lowercase().replace('_', "-")
    }

    /// Typed event, or `None` for a type this client does not know
    pub fn decode(&self) -> SyncResult<Option<RealtimeEvent>> {
        let payload = || self.payload.clone();
        let event = match self.normalized_kind().as_str() {
            "card-created" => RealtimeEvent::CardCreated(serde_json::from_value(payload())?),
            "card-updated" => RealtimeEvent::CardUpdated(serde_json::from_value(payload())?),
            "card-deleted" => {
                let p: CardDeletedPayload = serde_json::from_value(payload())?;
                RealtimeEvent::CardDeleted { card_id: p.card_id }
            }
            "card-moved" => {
                let p: CardMovedPayload = serde_json::from_value(payload())?;
                RealtimeEvent::CardMoved { card: p.card, old_column_id: p.old_column_id }
            }
            "columns-reordered" => {
                let p: ColumnsReorderedPayload = serde_json::from_value(payload())?;
                RealtimeEvent::ColumnsReordered { ordered_column_ids: p.ordered_column_ids }
            }
            "board-state-updated" => RealtimeEvent::Structural(StructuralChange::BoardStateUpdated),
            "column-created" => RealtimeEvent::Structural(StructuralChange::ColumnCreated),
            "column-updated" => RealtimeEvent::Structural(StructuralChange::ColumnUpdated),
            "column-deleted" => RealtimeEvent::Structural(StructuralChange::ColumnDeleted),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}
