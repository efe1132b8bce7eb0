//! Board Store
//!
//! The in-memory canonical snapshot of one open board. Every mutation keeps
//! columns and the cards inside each column densely positioned; a mutation
//! that cannot guarantee that reports [`Patch::RefetchRequired`] and leaves
//! the store untouched.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::models::{Board, Card, CardId, Column, ColumnId};
use crate::positioning::{self, Allocation};

/// Result of a full-state read: everything needed to rebuild the store
#[derive(Debug, Clone)]
pub struct BoardSnapshot {
    pub board: Board,
    pub columns: Vec<Column>,
    pub cards: Vec<Card>,
}

/// A column together with its ordered cards
#[derive(Debug, Clone, PartialEq)]
pub struct Lane {
    pub column: Column,
    pub cards: Vec<Card>,
}

impl Lane {
    pub fn card_ids(&self) -> Vec<CardId> {
        self.cards.iter().map(|c| c.id).collect()
    }
}

/// What a mutation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Patch {
    Applied,
    /// Already in the requested state
    Unchanged,
    /// Refused as inconsistent with local state; prior state kept
    Rejected,
    /// Cannot be patched safely; caller must reload the whole board
    RefetchRequired,
}

impl Patch {
    pub fn is_applied(self) -> bool {
        self == Patch::Applied
    }
}

/// Owned board state, created when a board is opened and dropped on close
#[derive(Debug, Clone)]
pub struct BoardStore {
    board: Board,
    lanes: Vec<Lane>,
    version: u64,
}

impl BoardStore {
    pub fn new(snapshot: BoardSnapshot) -> Self {
        let mut store = Self { board: snapshot.board.clone(), lanes: Vec::new(), version: 0 };
        store.replace_all(snapshot);
        store
    }

    // ========================
    // Reads
    // ========================

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Columns in display order
    pub fn lanes(&self) -> &[Lane] {
        &self.lanes
    }

    pub fn lane(&self, column_id: ColumnId) -> Option<&Lane> {
        self.lanes.iter().find(|l| l.column.id == column_id)
    }

    pub fn column_ids(&self) -> Vec<ColumnId> {
        self.lanes.iter().map(|l| l.column.id).collect()
    }

    pub fn column_index(&self, column_id: ColumnId) -> Option<usize> {
        self.lanes.iter().position(|l| l.column.id == column_id)
    }

    /// `(column id, index)` of a card
    pub fn locate_card(&self, card_id: CardId) -> Option<(ColumnId, usize)> {
        self.lanes.iter().find_map(|lane| {
            lane.cards
                .iter()
                .position(|c| c.id == card_id)
                .map(|index| (lane.column.id, index))
        })
    }

    pub fn card(&self, card_id: CardId) -> Option<&Card> {
        self.lanes
            .iter()
            .flat_map(|l| l.cards.iter())
            .find(|c| c.id == card_id)
    }

    pub fn card_count(&self) -> usize {
        self.lanes.iter().map(|l| l.cards.len()).sum()
    }

    /// Incremented by every applied mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Dense positions everywhere and every card exactly once
    pub fn is_consistent(&self) -> bool {
        let columns: Vec<&Column> = self.lanes.iter().map(|l| &l.column).collect();
        let columns_dense = columns.iter().enumerate().all(|(i, c)| c.position == i as i32);

        let mut seen = HashSet::new();
        let cards_ok = self.lanes.iter().all(|lane| {
            positioning::is_dense(&lane.cards)
                && lane
                    .cards
                    .iter()
                    .all(|c| c.column_id == lane.column.id && seen.insert(c.id))
        });
        columns_dense && cards_ok
    }

    // ========================
    // Mutations
    // ========================

    /// Replace everything with a freshly fetched snapshot
    pub fn replace_all(&mut self, snapshot: BoardSnapshot) {
        let BoardSnapshot { board, mut columns, cards } = snapshot;
        columns.sort_by_key(|c| (c.position, c.id));

        let mut lanes: Vec<Lane> = columns
            .into_iter()
            .map(|column| Lane { column, cards: Vec::new() })
            .collect();

        let mut seen = HashSet::new();
        for card in cards {
            if !seen.insert(card.id) {
                warn!(card_id = card.id, "duplicate card in snapshot, keeping first");
                continue;
            }
            match lanes.iter_mut().find(|l| l.column.id == card.column_id) {
                Some(lane) => lane.cards.push(card),
                None => warn!(card_id = card.id, column_id = card.column_id, "card references unknown column"),
            }
        }

        for lane in lanes.iter_mut() {
            lane.cards.sort_by_key(|c| (c.position, c.id));
            positioning::reindex(&mut lane.cards);
        }
        self.reindex_columns_of(&mut lanes);

        self.board = board;
        self.lanes = lanes;
        self.bump();
        debug!(board_id = self.board.id, columns = self.lanes.len(), cards = self.card_count(), "store replaced");
    }

    /// Insert or replace a card.
    ///
    /// Known card in the same column: replaced in place, keeping its index.
    /// Known card in another column: moved, landing at its `position`.
    /// Unknown card: appended to its column.
    pub fn upsert_card(&mut self, mut card: Card) -> Patch {
        let Some(target) = self.column_index(card.column_id) else {
            return Patch::RefetchRequired;
        };

        match self.locate_card(card.id) {
            Some((column_id, index)) if column_id == card.column_id => {
                card.position = index as i32;
                let slot = &mut self.lanes[target].cards[index];
                if *slot == card {
                    return Patch::Unchanged;
                }
                *slot = card;
            }
            Some((column_id, index)) => {
                let Some(origin) = self.column_index(column_id) else {
                    return Patch::RefetchRequired;
                };
                self.lanes[origin].cards.remove(index);
                positioning::reindex(&mut self.lanes[origin].cards);
                self.insert_card(target, card);
            }
            None => {
                let cards = &mut self.lanes[target].cards;
                card.position = cards.len() as i32;
                cards.push(card);
            }
        }
        self.bump();
        Patch::Applied
    }

    /// Upsert a card the store still holds; unknown ids are left out
    pub fn refresh_card(&mut self, card: Card) -> Patch {
        if self.locate_card(card.id).is_none() {
            debug!(card_id = card.id, "refresh for a card no longer on the board ignored");
            return Patch::Unchanged;
        }
        self.upsert_card(card)
    }

    /// Remove a card from whichever column holds it
    pub fn remove_card(&mut self, card_id: CardId) -> Patch {
        let Some((column_id, index)) = self.locate_card(card_id) else {
            return Patch::Unchanged;
        };
        if let Some(lane) = self.lanes.iter_mut().find(|l| l.column.id == column_id) {
            lane.cards.remove(index);
            positioning::reindex(&mut lane.cards);
        }
        self.bump();
        Patch::Applied
    }

    /// Remove the card from every column, then splice it into its
    /// `column_id` at its `position`. Siblings are only re-indexed.
    pub fn place_card(&mut self, card: Card) -> Patch {
        let Some(target) = self.column_index(card.column_id) else {
            return Patch::RefetchRequired;
        };
        if self.locate_card(card.id) == Some((card.column_id, card.position.max(0) as usize))
            && self.card(card.id) == Some(&card)
        {
            return Patch::Unchanged;
        }

        for lane in self.lanes.iter_mut() {
            let before = lane.cards.len();
            lane.cards.retain(|c| c.id != card.id);
            if lane.cards.len() != before {
                positioning::reindex(&mut lane.cards);
            }
        }
        self.insert_card(target, card);
        self.bump();
        Patch::Applied
    }

    /// Write an allocator result for a card drag into the two lanes.
    ///
    /// The allocation must describe exactly the cards currently held by the
    /// lanes; otherwise the store changed underneath the gesture.
    pub fn apply_card_allocation(
        &mut self,
        allocation: &Allocation<CardId>,
        from_column: ColumnId,
        to_column: ColumnId,
    ) -> Patch {
        let (Some(from), Some(to)) = (self.column_index(from_column), self.column_index(to_column)) else {
            return Patch::RefetchRequired;
        };
        if (from == to) != allocation.destination.is_none() {
            return Patch::RefetchRequired;
        }

        let other: &[Card] = if from == to { &[] } else { &self.lanes[to].cards };
        let mut pool: HashMap<CardId, Card> = self.lanes[from]
            .cards
            .iter()
            .chain(other.iter())
            .map(|c| (c.id, c.clone()))
            .collect();
        let expected = allocation.source.len() + allocation.destination.as_ref().map_or(0, |d| d.len());
        if pool.len() != expected {
            return Patch::RefetchRequired;
        }

        let mut take = |ids: &[CardId], column_id: ColumnId| -> Option<Vec<Card>> {
            let mut cards = Vec::with_capacity(ids.len());
            for id in ids {
                let mut card = pool.remove(id)?;
                card.column_id = column_id;
                cards.push(card);
            }
            positioning::reindex(&mut cards);
            Some(cards)
        };

        let Some(source_cards) = take(&allocation.source, from_column) else {
            return Patch::RefetchRequired;
        };
        let destination_cards = match &allocation.destination {
            Some(ids) => match take(ids, to_column) {
                Some(cards) => Some(cards),
                None => return Patch::RefetchRequired,
            },
            None => None,
        };

        self.lanes[from].cards = source_cards;
        if let Some(cards) = destination_cards {
            self.lanes[to].cards = cards;
        }
        self.bump();
        Patch::Applied
    }

    /// Rebuild the column order from a complete ordered id list.
    ///
    /// Anything other than a permutation of the known ids is rejected.
    pub fn apply_column_order(&mut self, ordered_ids: &[ColumnId]) -> Patch {
        if ordered_ids.len() != self.lanes.len() {
            warn!(received = ordered_ids.len(), known = self.lanes.len(), "column order size mismatch, keeping prior state");
            return Patch::Rejected;
        }
        if ordered_ids == self.column_ids().as_slice() {
            return Patch::Unchanged;
        }

        let mut by_id: HashMap<ColumnId, Lane> = self.lanes.iter().map(|l| (l.column.id, l.clone())).collect();
        let mut lanes = Vec::with_capacity(ordered_ids.len());
        for id in ordered_ids {
            match by_id.remove(id) {
                Some(lane) => lanes.push(lane),
                None => {
                    warn!(column_id = id, "column order references unknown or repeated column");
                    return Patch::Rejected;
                }
            }
        }

        self.reindex_columns_of(&mut lanes);
        self.lanes = lanes;
        self.bump();
        Patch::Applied
    }

    /// Add a column at its `position` (or update it if already known)
    pub fn add_column(&mut self, column: Column) -> Patch {
        if self.column_index(column.id).is_some() {
            return self.update_column(column);
        }
        if column.board_id != self.board.id {
            return Patch::Rejected;
        }
        let index = (column.position.max(0) as usize).min(self.lanes.len());
        self.lanes.insert(index, Lane { column, cards: Vec::new() });
        let mut lanes = std::mem::take(&mut self.lanes);
        self.reindex_columns_of(&mut lanes);
        self.lanes = lanes;
        self.bump();
        Patch::Applied
    }

    /// Update title and color; position and cards are left alone
    pub fn update_column(&mut self, column: Column) -> Patch {
        let Some(lane) = self.lanes.iter_mut().find(|l| l.column.id == column.id) else {
            return Patch::RefetchRequired;
        };
        if lane.column.title == column.title && lane.column.color == column.color {
            return Patch::Unchanged;
        }
        lane.column.title = column.title;
        lane.column.color = column.color;
        self.bump();
        Patch::Applied
    }

    /// Remove an empty column
    pub fn remove_column(&mut self, column_id: ColumnId) -> SyncResult<Patch> {
        let Some(index) = self.column_index(column_id) else {
            return Ok(Patch::Unchanged);
        };
        if !self.lanes[index].cards.is_empty() {
            return Err(SyncError::Validation(format!(
                "column {} still holds {} cards",
                column_id,
                self.lanes[index].cards.len()
            )));
        }
        self.lanes.remove(index);
        let mut lanes = std::mem::take(&mut self.lanes);
        self.reindex_columns_of(&mut lanes);
        self.lanes = lanes;
        self.bump();
        Ok(Patch::Applied)
    }

    // ========================
    // Helpers
    // ========================

    fn insert_card(&mut self, lane_index: usize, mut card: Card) {
        let lane = &mut self.lanes[lane_index];
        let index = (card.position.max(0) as usize).min(lane.cards.len());
        card.column_id = lane.column.id;
        lane.cards.insert(index, card);
        positioning::reindex(&mut lane.cards);
    }

    fn reindex_columns_of(&self, lanes: &mut [Lane]) {
        for (index, lane) in lanes.iter_mut().enumerate() {
            lane.column.position = index as i32;
        }
    }

    fn bump(&mut self) {
        self.version += 1;
    }
}
