//! Drag Session Controller
//!
//! Pointer-gesture state machine for cards and columns. A press only turns
//! into a drag once the pointer travels past the threshold, so clicks stay
//! clicks. Release writes the optimistic result into the store and hands
//! back the persistence commit for the caller to send.

use tracing::{debug, warn};

use crate::gateway::{MoveCardRequest, ReorderColumnsRequest};
use crate::models::{CardId, ColumnId};
use crate::positioning::{self, Destination};
use crate::store::BoardStore;

/// Movement threshold in pixels to start dragging
pub const DRAG_THRESHOLD_PX: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The entity under the pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragEntity {
    Card(CardId),
    Column(ColumnId),
}

/// Where a drag started, captured from the store on activation.
/// For columns the container is the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragPayload {
    pub entity: DragEntity,
    pub origin_container: i64,
    pub origin_index: usize,
}

/// Candidate insertion point, as an index into the container with the
/// dragged entity already removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropTarget {
    pub container: i64,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DragState {
    Idle,
    /// Pressed, below the movement threshold
    Pending { entity: DragEntity, start: Point },
    Dragging { payload: DragPayload, target: Option<DropTarget> },
}

/// Network call owed for an applied drop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistCommit {
    Card(MoveCardRequest),
    Columns(ReorderColumnsRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    /// Released before the threshold was crossed
    Click(DragEntity),
    /// Released with nothing to drop onto
    Cancelled,
    /// Dropped onto its own slot; nothing written, nothing sent
    NoOp,
    /// Store updated optimistically; the commit must be persisted
    Committed(PersistCommit),
    /// The store no longer matches the captured origin; refetch
    Abandoned,
}

pub struct DragController {
    threshold: f64,
    state: DragState,
}

impl DragController {
    pub fn new(threshold_px: f64) -> Self {
        Self { threshold: threshold_px.max(0.0), state: DragState::Idle }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    /// Primary button went down on an entity
    pub fn press(&mut self, entity: DragEntity, at: Point) {
        self.state = DragState::Pending { entity, start: at };
    }

    /// Pointer moved; activates a pending press past the threshold.
    /// Returns true when the drag starts.
    pub fn pointer_move(&mut self, store: &BoardStore, at: Point) -> bool {
        let DragState::Pending { entity, start } = self.state else {
            return false;
        };
        let dx = (at.x - start.x).abs();
        let dy = (at.y - start.y).abs();
        if dx <= self.threshold && dy <= self.threshold {
            return false;
        }

        let origin = match entity {
            DragEntity::Card(card_id) => store.locate_card(card_id),
            DragEntity::Column(column_id) => store.column_index(column_id).map(|i| (store.board().id, i)),
        };
        match origin {
            Some((origin_container, origin_index)) => {
                let payload = DragPayload { entity, origin_container, origin_index };
                debug!(?payload, "drag started");
                self.state = DragState::Dragging { payload, target: None };
                true
            }
            None => {
                self.state = DragState::Idle;
                false
            }
        }
    }

    /// Pointer over a column's card list. `layout` holds the vertical
    /// midpoint of every card in display order; the dragged card is skipped.
    pub fn drag_over_cards(&mut self, column_id: ColumnId, layout: &[(CardId, f64)], pointer_y: f64) {
        let DragState::Dragging { payload, target } = &mut self.state else {
            return;
        };
        let DragEntity::Card(dragged) = payload.entity else {
            return;
        };
        let index = layout
            .iter()
            .filter(|(id, _)| *id != dragged)
            .filter(|(_, midpoint)| *midpoint < pointer_y)
            .count();
        *target = Some(DropTarget { container: column_id, index });
    }

    /// Pointer over the column strip at a display index
    pub fn drag_over_column_slot(&mut self, index: usize) {
        let DragState::Dragging { payload, target } = &mut self.state else {
            return;
        };
        if let DragEntity::Column(_) = payload.entity {
            *target = Some(DropTarget { container: payload.origin_container, index });
        }
    }

    /// Pointer left every drop zone
    pub fn leave(&mut self) {
        if let DragState::Dragging { target, .. } = &mut self.state {
            *target = None;
        }
    }

    pub fn cancel(&mut self) {
        self.state = DragState::Idle;
    }

    /// Pointer released: resolve the drop and apply it to the store
    pub fn release(&mut self, store: &mut BoardStore) -> DropOutcome {
        match std::mem::replace(&mut self.state, DragState::Idle) {
            DragState::Idle => DropOutcome::Cancelled,
            DragState::Pending { entity, .. } => DropOutcome::Click(entity),
            DragState::Dragging { target: None, .. } => DropOutcome::Cancelled,
            DragState::Dragging { payload, target: Some(target) } => match payload.entity {
                DragEntity::Card(card_id) => drop_card(store, card_id, &payload, target),
                DragEntity::Column(column_id) => drop_column(store, column_id, &payload, target),
            },
        }
    }
}

impl Default for DragController {
    fn default() -> Self {
        Self::new(DRAG_THRESHOLD_PX)
    }
}

/// Move a card without a pointer gesture (keyboard, status columns).
/// Same allocation and commit as a completed drag.
pub fn move_card(store: &mut BoardStore, card_id: CardId, to_column: ColumnId, index: usize) -> DropOutcome {
    let Some((origin_container, origin_index)) = store.locate_card(card_id) else {
        return DropOutcome::Abandoned;
    };
    let payload = DragPayload { entity: DragEntity::Card(card_id), origin_container, origin_index };
    drop_card(store, card_id, &payload, DropTarget { container: to_column, index })
}

/// Move a column to a display index
pub fn move_column(store: &mut BoardStore, column_id: ColumnId, index: usize) -> DropOutcome {
    let Some(origin_index) = store.column_index(column_id) else {
        return DropOutcome::Abandoned;
    };
    let board_id = store.board().id;
    let payload = DragPayload { entity: DragEntity::Column(column_id), origin_container: board_id, origin_index };
    drop_column(store, column_id, &payload, DropTarget { container: board_id, index })
}

fn drop_card(store: &mut BoardStore, card_id: CardId, payload: &DragPayload, target: DropTarget) -> DropOutcome {
    if store.locate_card(card_id) != Some((payload.origin_container, payload.origin_index)) {
        warn!(card_id, "board changed during drag, dropping gesture");
        return DropOutcome::Abandoned;
    }
    let Some(source) = store.lane(payload.origin_container).map(|l| l.card_ids()) else {
        return DropOutcome::Abandoned;
    };

    let allocation = if target.container == payload.origin_container {
        positioning::allocate(&source, payload.origin_index, Destination::Within(target.index))
    } else {
        let Some(siblings) = store.lane(target.container).map(|l| l.card_ids()) else {
            return DropOutcome::Abandoned;
        };
        positioning::allocate(&source, payload.origin_index, Destination::Into(&siblings, target.index))
    };
    let Some(allocation) = allocation else {
        return DropOutcome::NoOp;
    };

    if !store
        .apply_card_allocation(&allocation, payload.origin_container, target.container)
        .is_applied()
    {
        return DropOutcome::Abandoned;
    }

    debug!(card_id, column_id = target.container, position = allocation.position, "card dropped");
    DropOutcome::Committed(PersistCommit::Card(MoveCardRequest {
        card_id,
        new_column_id: target.container,
        new_position: allocation.position as i32,
    }))
}

fn drop_column(store: &mut BoardStore, column_id: ColumnId, payload: &DragPayload, target: DropTarget) -> DropOutcome {
    if store.column_index(column_id) != Some(payload.origin_index) {
        warn!(column_id, "board changed during drag, dropping gesture");
        return DropOutcome::Abandoned;
    }
    let Some(ordered) = positioning::reorder(&store.column_ids(), payload.origin_index, target.index) else {
        return DropOutcome::NoOp;
    };
    if !store.apply_column_order(&ordered).is_applied() {
        return DropOutcome::Abandoned;
    }

    debug!(column_id, index = target.index, "column dropped");
    DropOutcome::Committed(PersistCommit::Columns(ReorderColumnsRequest {
        board_id: store.board().id,
        ordered_column_ids: ordered,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::sample_store;

    fn start(controller: &mut DragController, store: &BoardStore, entity: DragEntity) {
        controller.press(entity, Point::new(0.0, 0.0));
        assert!(controller.pointer_move(store, Point::new(0.0, 25.0)));
    }

    #[test]
    fn test_below_threshold_is_click() {
        let mut store = sample_store();
        let mut controller = DragController::default();
        controller.press(DragEntity::Card(2), Point::new(100.0, 100.0));
        assert!(!controller.pointer_move(&store, Point::new(104.0, 108.0)));

        let before = store.version();
        assert_eq!(controller.release(&mut store), DropOutcome::Click(DragEntity::Card(2)));
        assert_eq!(store.version(), before);
    }

    #[test]
    fn test_threshold_activates_and_captures_origin() {
        let store = sample_store();
        let mut controller = DragController::default();
        start(&mut controller, &store, DragEntity::Card(3));

        match controller.state() {
            DragState::Dragging { payload, target } => {
                assert_eq!(payload.origin_container, 10);
                assert_eq!(payload.origin_index, 2);
                assert!(target.is_none());
            }
            other => panic!("not dragging: {:?}", other),
        }
    }

    #[test]
    fn test_drop_card_at_end_of_other_column() {
        let mut store = sample_store();
        let mut controller = DragController::default();
        start(&mut controller, &store, DragEntity::Card(2));
        controller.drag_over_cards(20, &[(4, 20.0)], 80.0);

        let outcome = controller.release(&mut store);
        assert_eq!(
            outcome,
            DropOutcome::Committed(PersistCommit::Card(MoveCardRequest { card_id: 2, new_column_id: 20, new_position: 1 }))
        );
        assert_eq!(store.lane(10).unwrap().card_ids(), vec![1, 3]);
        assert_eq!(store.lane(20).unwrap().card_ids(), vec![4, 2]);
        assert_eq!(controller.state(), &DragState::Idle);
    }

    #[test]
    fn test_midpoint_skips_dragged_card() {
        let mut store = sample_store();
        let mut controller = DragController::default();
        start(&mut controller, &store, DragEntity::Card(1));
        // pointer between card 2 and card 3 of its own column
        controller.drag_over_cards(10, &[(1, 10.0), (2, 30.0), (3, 50.0)], 40.0);

        let outcome = controller.release(&mut store);
        assert!(matches!(outcome, DropOutcome::Committed(PersistCommit::Card(MoveCardRequest { new_position: 1, .. }))));
        assert_eq!(store.lane(10).unwrap().card_ids(), vec![2, 1, 3]);
    }

    #[test]
    fn test_drop_on_own_slot_is_noop() {
        let mut store = sample_store();
        let mut controller = DragController::default();
        start(&mut controller, &store, DragEntity::Card(2));
        controller.drag_over_cards(10, &[(1, 10.0), (2, 30.0), (3, 50.0)], 32.0);

        let before = store.version();
        assert_eq!(controller.release(&mut store), DropOutcome::NoOp);
        assert_eq!(store.version(), before);
    }

    #[test]
    fn test_refetch_mid_drag_abandons() {
        let mut store = sample_store();
        let mut controller = DragController::default();
        start(&mut controller, &store, DragEntity::Card(2));
        controller.drag_over_cards(20, &[(4, 20.0)], 80.0);

        store.remove_card(1);
        let before = store.version();
        assert_eq!(controller.release(&mut store), DropOutcome::Abandoned);
        assert_eq!(store.version(), before);
    }

    #[test]
    fn test_release_without_target_cancels() {
        let mut store = sample_store();
        let mut controller = DragController::default();
        start(&mut controller, &store, DragEntity::Card(2));
        controller.drag_over_cards(20, &[(4, 20.0)], 80.0);
        controller.leave();
        assert_eq!(controller.release(&mut store), DropOutcome::Cancelled);
    }

    #[test]
    fn test_column_drag_commits_full_order() {
        let mut store = sample_store();
        let mut controller = DragController::default();
        start(&mut controller, &store, DragEntity::Column(10));
        controller.drag_over_column_slot(1);

        let outcome = controller.release(&mut store);
        assert_eq!(
            outcome,
            DropOutcome::Committed(PersistCommit::Columns(ReorderColumnsRequest { board_id: 1, ordered_column_ids: vec![20, 10] }))
        );
        assert_eq!(store.column_ids(), vec![20, 10]);
        assert_eq!(store.lane(10).unwrap().column.position, 1);
    }

    #[test]
    fn test_round_trip_restores_order() {
        let mut store = sample_store();
        assert!(matches!(move_card(&mut store, 2, 20, 0), DropOutcome::Committed(_)));
        assert_eq!(store.lane(20).unwrap().card_ids(), vec![2, 4]);

        assert!(matches!(move_card(&mut store, 2, 10, 1), DropOutcome::Committed(_)));
        assert_eq!(store.lane(10).unwrap().card_ids(), vec![1, 2, 3]);
        assert_eq!(store.lane(20).unwrap().card_ids(), vec![4]);
        assert!(store.is_consistent());
    }

    #[test]
    fn test_move_unknown_card_abandons() {
        let mut store = sample_store();
        assert_eq!(move_card(&mut store, 99, 10, 0), DropOutcome::Abandoned);
        assert_eq!(move_column(&mut store, 99, 0), DropOutcome::Abandoned);
        assert_eq!(move_column(&mut store, 10, 0), DropOutcome::NoOp);
    }

    #[test]
    fn test_card_hover_ignored_while_dragging_column() {
        let store = sample_store();
        let mut controller = DragController::default();
        start(&mut controller, &store, DragEntity::Column(10));
        controller.drag_over_cards(20, &[(4, 20.0)], 80.0);
        assert!(matches!(controller.state(), DragState::Dragging { target: None, .. }));
    }
}
