//! Card and column writes that go to the server first, plus the status
//! column shortcuts.

use tracing::info;

use super::BoardSession;
use crate::drag::{self, DropOutcome, PersistCommit};
use crate::error::{SyncError, SyncResult};
use crate::gateway::{CardFields, ColumnUpdate, NewColumn};
use crate::models::{Card, CardId, Column, ColumnId};
use crate::store::{BoardStore, Patch};

impl BoardSession {
    // ========================
    // Cards
    // ========================

    pub async fn create_card(&self, column_id: ColumnId, fields: CardFields) -> SyncResult<Card> {
        if fields.title.trim().is_empty() {
            return Err(SyncError::Validation("card title is empty".into()));
        }
        self.require_column(column_id)?;

        let card = match self.inner.gateway.create_card(column_id, &fields).await {
            Ok(card) => card,
            Err(e) => return Err(self.inner.mutation_failed("Could not create the card", e).await),
        };
        self.write_back(|store| store.upsert_card(card.clone()));
        Ok(card)
    }

    pub async fn delete_card(&self, card_id: CardId) -> SyncResult<()> {
        if self.card(card_id).is_none() {
            return Err(SyncError::NotFound(format!("card {}", card_id)));
        }
        if let Err(e) = self.inner.gateway.delete_card(card_id).await {
            return Err(self.inner.mutation_failed("Could not delete the card", e).await);
        }
        self.write_back(|store| store.remove_card(card_id));
        Ok(())
    }

    // ========================
    // Columns
    // ========================

    pub async fn create_column(&self, title: &str, color: &str) -> SyncResult<Column> {
        if title.trim().is_empty() {
            return Err(SyncError::Validation("column title is empty".into()));
        }
        let request = NewColumn { title: title.to_string(), color: color.to_string(), board_id: self.board_id() };
        let column = match self.inner.gateway.create_column(&request).await {
            Ok(column) => column,
            Err(e) => return Err(self.inner.mutation_failed("Could not create the column", e).await),
        };
        self.write_back(|store| store.add_column(column.clone()));
        Ok(column)
    }

    pub async fn update_column(&self, column_id: ColumnId, update: ColumnUpdate) -> SyncResult<Column> {
        if update.title.trim().is_empty() {
            return Err(SyncError::Validation("column title is empty".into()));
        }
        self.require_column(column_id)?;
        let column = match self.inner.gateway.update_column(column_id, &update).await {
            Ok(column) => column,
            Err(e) => return Err(self.inner.mutation_failed("Could not update the column", e).await),
        };
        self.write_back(|store| store.update_column(column.clone()));
        Ok(column)
    }

    /// Delete an empty column. Non-empty columns are refused before any
    /// request is sent.
    pub async fn delete_column(&self, column_id: ColumnId) -> SyncResult<()> {
        let held = self
            .view(|store| store.lane(column_id).map(|lane| lane.cards.len()))
            .ok_or_else(|| SyncError::NotFound(format!("column {}", column_id)))?;
        if held > 0 {
            let error = SyncError::Validation(format!("column still holds {} cards; move or delete them first", held));
            self.inner.report("Could not delete the column", &error);
            return Err(error);
        }

        if let Err(e) = self.inner.gateway.delete_column(column_id).await {
            return Err(self.inner.mutation_failed("Could not delete the column", e).await);
        }
        // a card may have landed in the column while the request was out
        if self.inner.mutate(|store| store.remove_column(column_id)).is_err() {
            self.inner.spawn_refetch();
        }
        Ok(())
    }

    // ========================
    // Status columns
    // ========================

    /// Move a card to the top of the solved (or unsolved) column, then
    /// reload and close its editor.
    pub async fn resolve_card(&self, card_id: CardId, solved: bool) -> SyncResult<()> {
        let config = self.config();
        let title = if solved { &config.solved_column_title } else { &config.unsolved_column_title };
        let wanted = title.trim().to_lowercase();
        let target = self
            .view(|store| {
                store
                    .lanes()
                    .iter()
                    .find(|lane| lane.column.title.trim().to_lowercase() == wanted)
                    .map(|lane| lane.column.id)
            })
            .ok_or_else(|| SyncError::NotFound(format!("column \"{}\"", title)))?;

        self.relocate(card_id, target).await?;
        if self.inner.editor.card_id() == Some(card_id) {
            self.inner.editor.close().await?;
        }
        info!(card_id, solved, "card resolved");
        Ok(())
    }

    /// Move a resolved card back to the top of the first regular column
    pub async fn return_card_to_board(&self, card_id: CardId) -> SyncResult<()> {
        let config = self.config();
        let target = self
            .view(|store| {
                store
                    .lanes()
                    .iter()
                    .find(|lane| !config.is_status_column(&lane.column.title))
                    .map(|lane| lane.column.id)
            })
            .ok_or_else(|| SyncError::NotFound("a column outside the status columns".into()))?;

        self.relocate(card_id, target).await?;
        info!(card_id, column_id = target, "card returned to board");
        Ok(())
    }

    /// Save pending edits, move to position 0 and reload
    async fn relocate(&self, card_id: CardId, column_id: ColumnId) -> SyncResult<()> {
        if self.inner.editor.card_id() == Some(card_id) {
            self.inner.editor.save().await?;
        }

        let outcome = self.inner.mutate(|store| drag::move_card(store, card_id, column_id, 0));
        match outcome {
            DropOutcome::Committed(commit @ PersistCommit::Card(_)) => {
                self.inner.resync_editor();
                self.inner.persist(&commit).await?;
            }
            DropOutcome::NoOp => {}
            _ => return Err(SyncError::NotFound(format!("card {}", card_id))),
        }
        self.inner.refetch().await
    }

    // ========================
    // Helpers
    // ========================

    fn require_column(&self, column_id: ColumnId) -> SyncResult<()> {
        if self.view(|store| store.column_index(column_id).is_none()) {
            return Err(SyncError::NotFound(format!("column {}", column_id)));
        }
        Ok(())
    }

    /// Write a server-confirmed entity into the store
    fn write_back(&self, change: impl FnOnce(&mut BoardStore) -> Patch) {
        if self.inner.mutate(change) == Patch::RefetchRequired {
            self.inner.spawn_refetch();
        }
        self.inner.resync_editor();
    }
}
