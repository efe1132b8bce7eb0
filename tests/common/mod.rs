//! In-memory stand-in for the board server.
//!
//! Applies writes the way the server does (dense positions, non-empty
//! column deletes refused) and records every call for assertions.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use kanban_sync::gateway::{
    CardFields, ColumnUpdate, MoveCardRequest, NewColumn, PersistenceGateway, ReorderColumnsRequest,
};
use kanban_sync::models::{Board, BoardId, Card, CardId, Column, ColumnId, Priority, Visibility};
use kanban_sync::realtime::InboundFrame;
use kanban_sync::{BoardSession, FeedMode, SyncConfig, SyncError, SyncResult};

pub const BOARD_ID: BoardId = 1;
pub const VIEWER: &str = "viewer-me";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ListBoards,
    ListColumns(BoardId),
    ListCards(ColumnId),
    CreateCard(ColumnId, CardFields),
    UpdateCard(CardId, CardFields),
    DeleteCard(CardId),
    MoveCard(MoveCardRequest),
    CreateColumn(NewColumn),
    UpdateColumn(ColumnId, ColumnUpdate),
    DeleteColumn(ColumnId),
    ReorderColumns(ReorderColumnsRequest),
}

impl Call {
    pub fn is_write(&self) -> bool {
        !matches!(self, Call::ListBoards | Call::ListColumns(_) | Call::ListCards(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    Never,
    /// Every write fails as if the connection dropped
    Transport,
    /// Every write is refused with this status
    Reject(u16),
}

#[derive(Debug, Default)]
pub struct ServerState {
    pub board: Option<Board>,
    pub columns: Vec<Column>,
    /// Cards per column id, in order
    pub cards: Vec<(ColumnId, Vec<Card>)>,
    pub next_id: i64,
}

impl ServerState {
    fn lane_mut(&mut self, column_id: ColumnId) -> Option<&mut Vec<Card>> {
        self.cards.iter_mut().find(|(id, _)| *id == column_id).map(|(_, cards)| cards)
    }

    pub fn take_card(&mut self, card_id: CardId) -> Option<Card> {
        for (_, cards) in self.cards.iter_mut() {
            if let Some(index) = cards.iter().position(|c| c.id == card_id) {
                let card = cards.remove(index);
                reindex(cards);
                return Some(card);
            }
        }
        None
    }

    pub fn ids(&self, column_id: ColumnId) -> Vec<CardId> {
        self.cards
            .iter()
            .find(|(id, _)| *id == column_id)
            .map(|(_, cards)| cards.iter().map(|c| c.id).collect())
            .unwrap_or_default()
    }
}

fn reindex(cards: &mut [Card]) {
    for (index, card) in cards.iter_mut().enumerate() {
        card.position = index as i32;
    }
}

pub fn card(id: CardId, column_id: ColumnId, position: i32) -> Card {
    serde_json::from_value(json!({
        "id": id, "column_id": column_id, "title": format!("Card {}", id),
        "description": "", "priority": "medium", "position": position
    }))
    .unwrap()
}

pub struct RecordingGateway {
    state: Mutex<ServerState>,
    calls: Mutex<Vec<Call>>,
    fail: Mutex<FailMode>,
    /// Card updates are applied at once but answered after this delay
    update_reply_delay: Mutex<Option<Duration>>,
}

impl RecordingGateway {
    /// Public board 1 with the given `(column id, title, card ids)` lanes
    pub fn with_board(lanes: Vec<(ColumnId, &str, Vec<CardId>)>) -> Arc<Self> {
        let mut state = ServerState { next_id: 1000, ..ServerState::default() };
        state.board = Some(
            serde_json::from_value(json!({
                "id": BOARD_ID, "title": "Support", "description": "",
                "owner_id": "owner", "is_public": true
            }))
            .unwrap(),
        );
        for (position, (column_id, title, card_ids)) in lanes.into_iter().enumerate() {
            state.columns.push(Column {
                id: column_id,
                board_id: BOARD_ID,
                title: title.to_string(),
                color: "#ddd".into(),
                position: position as i32,
            });
            let cards = card_ids
                .iter()
                .enumerate()
                .map(|(i, id)| card(*id, column_id, i as i32))
                .collect();
            state.cards.push((column_id, cards));
        }
        Arc::new(Self {
            state: Mutex::new(state),
            calls: Mutex::new(Vec::new()),
            fail: Mutex::new(FailMode::Never),
            update_reply_delay: Mutex::new(None),
        })
    }

    /// Column 10 "Todo" = [1, 2, 3], column 20 "Doing" = [4]
    pub fn scenario() -> Arc<Self> {
        Self::with_board(vec![(10, "Todo", vec![1, 2, 3]), (20, "Doing", vec![4])])
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_write).collect()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| matches(c)).count()
    }

    pub fn set_fail(&self, mode: FailMode) {
        *self.fail.lock().unwrap() = mode;
    }

    pub fn delay_update_replies(&self, delay: Duration) {
        *self.update_reply_delay.lock().unwrap() = Some(delay);
    }

    /// Change server state behind the client's back (another viewer)
    pub fn server<R>(&self, change: impl FnOnce(&mut ServerState) -> R) -> R {
        change(&mut self.state.lock().unwrap())
    }

    fn record(&self, call: Call) -> SyncResult<()> {
        let write = call.is_write();
        self.calls.lock().unwrap().push(call);
        if !write {
            return Ok(());
        }
        match *self.fail.lock().unwrap() {
            FailMode::Never => Ok(()),
            FailMode::Transport => Err(SyncError::Transport("connection reset".into())),
            FailMode::Reject(status) => Err(SyncError::Rejected { status, message: "refused".into() }),
        }
    }
}

#[async_trait]
impl PersistenceGateway for RecordingGateway {
    async fn list_boards(&self, visibility: Visibility) -> SyncResult<Vec<Board>> {
        self.record(Call::ListBoards)?;
        let state = self.state.lock().unwrap();
        Ok(state.board.iter().filter(|b| b.visibility() == visibility).cloned().collect())
    }

    async fn list_columns(&self, board_id: BoardId) -> SyncResult<Vec<Column>> {
        self.record(Call::ListColumns(board_id))?;
        Ok(self.state.lock().unwrap().columns.clone())
    }

    async fn list_cards(&self, column_id: ColumnId) -> SyncResult<Vec<Card>> {
        self.record(Call::ListCards(column_id))?;
        let state = self.state.lock().unwrap();
        Ok(state
            .cards
            .iter()
            .find(|(id, _)| *id == column_id)
            .map(|(_, cards)| cards.clone())
            .unwrap_or_default())
    }

    async fn create_card(&self, column_id: ColumnId, fields: &CardFields) -> SyncResult<Card> {
        self.record(Call::CreateCard(column_id, fields.clone()))?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        let lane = state
            .lane_mut(column_id)
            .ok_or_else(|| SyncError::Rejected { status: 404, message: "column not found".into() })?;
        let mut created = card(id, column_id, lane.len() as i32);
        created.title = fields.title.clone();
        created.priority = fields.priority;
        lane.push(created.clone());
        Ok(created)
    }

    async fn update_card(&self, card_id: CardId, fields: &CardFields) -> SyncResult<Card> {
        self.record(Call::UpdateCard(card_id, fields.clone()))?;
        let updated = {
            let mut state = self.state.lock().unwrap();
            state
                .cards
                .iter_mut()
                .flat_map(|(_, cards)| cards.iter_mut())
                .find(|c| c.id == card_id)
                .map(|card| {
                    card.title = fields.title.clone();
                    card.description = fields.description.clone();
                    card.assigned_to = fields.assigned_to.clone();
                    card.priority = fields.priority;
                    card.due_date = fields.due_date;
                    card.clone()
                })
        };
        let delay = *self.update_reply_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        updated.ok_or_else(|| SyncError::Rejected { status: 404, message: "card not found".into() })
    }

    async fn delete_card(&self, card_id: CardId) -> SyncResult<()> {
        self.record(Call::DeleteCard(card_id))?;
        self.state.lock().unwrap().take_card(card_id);
        Ok(())
    }

    async fn move_card(&self, request: &MoveCardRequest) -> SyncResult<()> {
        self.record(Call::MoveCard(*request))?;
        let mut state = self.state.lock().unwrap();
        let mut moved = state
            .take_card(request.card_id)
            .ok_or_else(|| SyncError::Rejected { status: 404, message: "card not found".into() })?;
        moved.column_id = request.new_column_id;
        let lane = state
            .lane_mut(request.new_column_id)
            .ok_or_else(|| SyncError::Rejected { status: 404, message: "column not found".into() })?;
        let index = (request.new_position.max(0) as usize).min(lane.len());
        lane.insert(index, moved);
        reindex(lane);
        Ok(())
    }

    async fn create_column(&self, column: &NewColumn) -> SyncResult<Column> {
        self.record(Call::CreateColumn(column.clone()))?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let created = Column {
            id: state.next_id,
            board_id: column.board_id,
            title: column.title.clone(),
            color: column.color.clone(),
            position: state.columns.len() as i32,
        };
        state.columns.push(created.clone());
        state.cards.push((created.id, Vec::new()));
        Ok(created)
    }

    async fn update_column(&self, column_id: ColumnId, update: &ColumnUpdate) -> SyncResult<Column> {
        self.record(Call::UpdateColumn(column_id, update.clone()))?;
        let mut state = self.state.lock().unwrap();
        let column = state
            .columns
            .iter_mut()
            .find(|c| c.id == column_id)
            .ok_or_else(|| SyncError::Rejected { status: 404, message: "column not found".into() })?;
        column.title = update.title.clone();
        column.color = update.color.clone();
        Ok(column.clone())
    }

    async fn delete_column(&self, column_id: ColumnId) -> SyncResult<()> {
        self.record(Call::DeleteColumn(column_id))?;
        let mut state = self.state.lock().unwrap();
        if !state.ids(column_id).is_empty() {
            return Err(SyncError::Rejected { status: 409, message: "column is not empty".into() });
        }
        state.columns.retain(|c| c.id != column_id);
        state.cards.retain(|(id, _)| *id != column_id);
        for (index, column) in state.columns.iter_mut().enumerate() {
            column.position = index as i32;
        }
        Ok(())
    }

    async fn reorder_columns(&self, request: &ReorderColumnsRequest) -> SyncResult<()> {
        self.record(Call::ReorderColumns(request.clone()))?;
        let mut state = self.state.lock().unwrap();
        for column in state.columns.iter_mut() {
            if let Some(index) = request.ordered_column_ids.iter().position(|id| *id == column.id) {
                column.position = index as i32;
            }
        }
        state.columns.sort_by_key(|c| c.position);
        Ok(())
    }
}

pub fn test_config() -> SyncConfig {
    SyncConfig {
        viewer_id: VIEWER.into(),
        feed_mode: FeedMode::External,
        autosave_delay_ms: 1000,
        ..SyncConfig::default()
    }
}

pub async fn open(gateway: &Arc<RecordingGateway>) -> BoardSession {
    BoardSession::open(test_config(), gateway.clone(), BOARD_ID, Visibility::Public)
        .await
        .unwrap()
}

pub fn ids(session: &BoardSession, column_id: ColumnId) -> Vec<CardId> {
    session.view(|store| store.lane(column_id).map(|l| l.card_ids()).unwrap_or_default())
}

pub fn positions(session: &BoardSession, column_id: ColumnId) -> Vec<(CardId, i32)> {
    session.view(|store| {
        store
            .lane(column_id)
            .map(|l| l.cards.iter().map(|c| (c.id, c.position)).collect())
            .unwrap_or_default()
    })
}

pub fn frame(kind: &str, payload: serde_json::Value, sender: Option<&str>) -> InboundFrame {
    InboundFrame { kind: kind.to_string(), payload, sender_id: sender.map(str::to_string) }
}

pub fn card_json(card: &Card) -> serde_json::Value {
    serde_json::to_value(card).unwrap()
}

pub fn fields(title: &str) -> CardFields {
    CardFields { priority: Priority::Medium, ..CardFields::titled(title) }
}
