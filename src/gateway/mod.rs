//! Persistence Gateway
//!
//! The server-authoritative side of the board. The core only talks to it
//! through [`PersistenceGateway`]; [`HttpGateway`] is the REST implementation.

mod http;

pub use http::HttpGateway;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::models::{Board, BoardId, Card, CardId, Column, ColumnId, Priority, UserId, Visibility};
use crate::store::BoardSnapshot;

// ========================
// Request Bodies
// ========================

/// Complete editable field set of a card, sent on create and update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardFields {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub assigned_to: Option<UserId>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

impl CardFields {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            assigned_to: None,
            priority: Priority::default(),
            due_date: None,
        }
    }
}

impl From<&Card> for CardFields {
    fn from(card: &Card) -> Self {
        Self {
            title: card.title.clone(),
            description: card.description.clone(),
            assigned_to: card.assigned_to.clone(),
            priority: card.priority,
            due_date: card.due_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewColumn {
    pub title: String,
    pub color: String,
    pub board_id: BoardId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnUpdate {
    pub title: String,
    pub color: String,
}

/// Persistence commit of a card drag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCardRequest {
    pub card_id: CardId,
    pub new_column_id: ColumnId,
    pub new_position: i32,
}

/// Persistence commit of a column drag: the full ordered id list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderColumnsRequest {
    #[serde(skip)]
    pub board_id: BoardId,
    pub ordered_column_ids: Vec<ColumnId>,
}

// ========================
// Gateway Contract
// ========================

/// REST contract for board reads and card/column writes.
///
/// Implementations never touch the board store; they only return the
/// server's acknowledgement or canonical entity.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn list_boards(&self, visibility: Visibility) -> SyncResult<Vec<Board>>;
    async fn list_columns(&self, board_id: BoardId) -> SyncResult<Vec<Column>>;
    async fn list_cards(&self, column_id: ColumnId) -> SyncResult<Vec<Card>>;

    async fn create_card(&self, column_id: ColumnId, fields: &CardFields) -> SyncResult<Card>;
    async fn update_card(&self, card_id: CardId, fields: &CardFields) -> SyncResult<Card>;
    async fn delete_card(&self, card_id: CardId) -> SyncResult<()>;
    async fn move_card(&self, request: &MoveCardRequest) -> SyncResult<()>;

    async fn create_column(&self, column: &NewColumn) -> SyncResult<Column>;
    async fn update_column(&self, column_id: ColumnId, update: &ColumnUpdate) -> SyncResult<Column>;
    async fn delete_column(&self, column_id: ColumnId) -> SyncResult<()>;
    async fn reorder_columns(&self, request: &ReorderColumnsRequest) -> SyncResult<()>;
}

/// Read the full state of one board: the board from its visibility listing,
/// its columns, then the cards of every column concurrently.
pub async fn load_snapshot(
    gateway: &dyn PersistenceGateway,
    board_id: BoardId,
    visibility: Visibility,
) -> SyncResult<BoardSnapshot> {
    let board = gateway
        .list_boards(visibility)
        .await?
        .into_iter()
        .find(|b| b.id == board_id)
        .ok_or_else(|| SyncError::NotFound(format!("board {}", board_id)))?;

    let columns = gateway.list_columns(board_id).await?;
    let per_column = try_join_all(columns.iter().map(|c| gateway.list_cards(c.id))).await?;
    let cards: Vec<Card> = per_column.into_iter().flatten().collect();

    debug!(board_id, columns = columns.len(), cards = cards.len(), "snapshot loaded");
    Ok(BoardSnapshot { board, columns, cards })
}
