mod common;

use common::{ids, open, positions, Call, FailMode, RecordingGateway, BOARD_ID};
use kanban_sync::drag::{DragEntity, DropOutcome, PersistCommit, Point};
use kanban_sync::gateway::{MoveCardRequest, ReorderColumnsRequest};
use kanban_sync::notify::NoticeLevel;

#[tokio::test]
async fn test_card_drag_into_other_column() {
    let gateway = RecordingGateway::scenario();
    let session = open(&gateway).await;
    let before = session.version();

    session.press(DragEntity::Card(2), Point::new(0.0, 0.0));
    assert!(session.pointer_move(Point::new(0.0, 20.0)));
    session.drag_over_cards(20, &[(4, 50.0)], 80.0);
    let outcome = session.release();

    let request = MoveCardRequest { card_id: 2, new_column_id: 20, new_position: 1 };
    assert_eq!(outcome, DropOutcome::Committed(PersistCommit::Card(request)));
    // visible before the network call finishes
    assert_eq!(positions(&session, 10), vec![(1, 0), (3, 1)]);
    assert_eq!(positions(&session, 20), vec![(4, 0), (2, 1)]);
    assert!(session.version() > before);

    session.settle().await;
    assert_eq!(gateway.writes(), vec![Call::MoveCard(request)]);
    assert_eq!(gateway.server(|s| s.ids(20)), vec![4, 2]);
}

#[tokio::test]
async fn test_reorder_within_column() {
    let gateway = RecordingGateway::scenario();
    let session = open(&gateway).await;

    // card 3 dragged above card 1
    session.press(DragEntity::Card(3), Point::new(0.0, 100.0));
    assert!(session.pointer_move(Point::new(0.0, 40.0)));
    session.drag_over_cards(10, &[(1, 20.0), (2, 60.0), (3, 100.0)], 10.0);
    let outcome = session.release();

    assert_eq!(
        outcome,
        DropOutcome::Committed(PersistCommit::Card(MoveCardRequest { card_id: 3, new_column_id: 10, new_position: 0 }))
    );
    assert_eq!(ids(&session, 10), vec![3, 1, 2]);
    session.settle().await;
    assert_eq!(gateway.server(|s| s.ids(10)), vec![3, 1, 2]);
}

#[tokio::test]
async fn test_drop_on_own_slot_sends_nothing() {
    let gateway = RecordingGateway::scenario();
    let session = open(&gateway).await;
    let before = session.version();

    session.press(DragEntity::Card(2), Point::new(0.0, 60.0));
    assert!(session.pointer_move(Point::new(15.0, 60.0)));
    session.drag_over_cards(10, &[(1, 20.0), (2, 60.0), (3, 100.0)], 65.0);

    assert_eq!(session.release(), DropOutcome::NoOp);
    session.settle().await;
    assert!(gateway.writes().is_empty());
    assert_eq!(session.version(), before);
    assert_eq!(ids(&session, 10), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_click_below_threshold_is_not_a_drag() {
    let gateway = RecordingGateway::scenario();
    let session = open(&gateway).await;

    session.press(DragEntity::Card(1), Point::new(0.0, 0.0));
    assert!(!session.pointer_move(Point::new(4.0, 6.0)));

    assert_eq!(session.release(), DropOutcome::Click(DragEntity::Card(1)));
    session.settle().await;
    assert!(gateway.writes().is_empty());
}

#[tokio::test]
async fn test_leaving_drop_zones_cancels() {
    let gateway = RecordingGateway::scenario();
    let session = open(&gateway).await;

    session.press(DragEntity::Card(1), Point::new(0.0, 0.0));
    assert!(session.pointer_move(Point::new(0.0, 30.0)));
    session.drag_over_cards(20, &[(4, 20.0)], 40.0);
    session.leave_drop_zone();

    assert_eq!(session.release(), DropOutcome::Cancelled);
    assert_eq!(ids(&session, 10), vec![1, 2, 3]);
    session.settle().await;
    assert!(gateway.writes().is_empty());
}

#[tokio::test]
async fn test_move_and_back_restores_order() {
    let gateway = RecordingGateway::scenario();
    let session = open(&gateway).await;

    assert!(matches!(session.move_card(2, 20, 0), DropOutcome::Committed(_)));
    assert!(matches!(session.move_card(2, 10, 1), DropOutcome::Committed(_)));

    assert_eq!(positions(&session, 10), vec![(1, 0), (2, 1), (3, 2)]);
    assert_eq!(positions(&session, 20), vec![(4, 0)]);
    session.settle().await;
    assert_eq!(gateway.count(|c| matches!(c, Call::MoveCard(_))), 2);
    assert_eq!(gateway.server(|s| s.ids(10)), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_column_drag_sends_full_order() {
    let gateway = RecordingGateway::with_board(vec![(10, "Todo", vec![1]), (20, "Doing", vec![]), (30, "Done", vec![])]);
    let session = open(&gateway).await;

    session.press(DragEntity::Column(30), Point::new(400.0, 0.0));
    assert!(session.pointer_move(Point::new(20.0, 0.0)));
    session.drag_over_column_slot(0);
    let outcome = session.release();

    let request = ReorderColumnsRequest { board_id: BOARD_ID, ordered_column_ids: vec![30, 10, 20] };
    assert_eq!(outcome, DropOutcome::Committed(PersistCommit::Columns(request.clone())));
    let order = session.view(|store| store.column_ids());
    assert_eq!(order, vec![30, 10, 20]);
    let column_positions: Vec<i32> = session.lanes().iter().map(|l| l.column.position).collect();
    assert_eq!(column_positions, vec![0, 1, 2]);

    session.settle().await;
    assert_eq!(gateway.writes(), vec![Call::ReorderColumns(request)]);
}

#[tokio::test]
async fn test_failed_persist_reloads_server_order() {
    let gateway = RecordingGateway::scenario();
    let session = open(&gateway).await;
    let mut notices = session.notices();
    gateway.set_fail(FailMode::Reject(500));
    let loads_before = gateway.count(|c| matches!(c, Call::ListColumns(_)));

    assert!(matches!(session.move_card(1, 20, 1), DropOutcome::Committed(_)));
    assert_eq!(ids(&session, 20), vec![4, 1]);
    session.settle().await;

    let notice = notices.try_recv().unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);
    assert!(notice.message.contains("Could not save the move"));
    assert_eq!(gateway.count(|c| matches!(c, Call::ListColumns(_))), loads_before + 1);
    assert_eq!(ids(&session, 10), vec![1, 2, 3]);
    assert_eq!(ids(&session, 20), vec![4]);
}

#[tokio::test]
async fn test_reload_during_drag_abandons_drop() {
    let gateway = RecordingGateway::scenario();
    let session = open(&gateway).await;

    session.press(DragEntity::Card(2), Point::new(0.0, 0.0));
    assert!(session.pointer_move(Point::new(0.0, 30.0)));
    session.drag_over_cards(20, &[(4, 20.0)], 40.0);

    // another viewer deletes card 1; card 2 is no longer where the drag began
    gateway.server(|s| {
        s.cards[0].1.remove(0);
        for (i, card) in s.cards[0].1.iter_mut().enumerate() {
            card.position = i as i32;
        }
    });
    session.refetch().await.unwrap();

    assert_eq!(session.release(), DropOutcome::Abandoned);
    session.settle().await;
    assert!(gateway.writes().is_empty());
    assert_eq!(ids(&session, 10), vec![2, 3]);
    assert_eq!(ids(&session, 20), vec![4]);
}

#[tokio::test]
async fn test_unknown_card_move_is_abandoned() {
    let gateway = RecordingGateway::scenario();
    let session = open(&gateway).await;

    assert_eq!(session.move_card(99, 20, 0), DropOutcome::Abandoned);
    session.settle().await;
    assert!(gateway.writes().is_empty());
}
