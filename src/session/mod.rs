//! Board Session
//!
//! One open board: owns its store for as long as the board is open, runs
//! the push/poll feed, and routes gestures, frames and edits into the store
//! through the components that own each concern.

mod crud;
mod shared;

use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::drag::{self, DragEntity, DropOutcome, Point};
use crate::editing::EditingSession;
use crate::error::{SyncError, SyncResult};
use crate::gateway::{load_snapshot, PersistenceGateway};
use crate::models::{BoardId, Card, CardId, ColumnId, Visibility};
use crate::notify::Notice;
use crate::realtime::{InboundFrame, ListenerOutcome, Poller, Subscription, SubscriptionEvent};
use crate::store::{BoardStore, Lane};

use shared::{lock, SessionInner};

#[derive(Default)]
struct FeedHandles {
    subscription: Option<Subscription>,
    pump: Option<JoinHandle<()>>,
    poller: Option<Poller>,
}

pub struct BoardSession {
    inner: Arc<SessionInner>,
    feed: Mutex<FeedHandles>,
}

impl BoardSession {
    /// Load the board and start its feed
    pub async fn open(
        config: SyncConfig,
        gateway: Arc<dyn PersistenceGateway>,
        board_id: BoardId,
        visibility: Visibility,
    ) -> SyncResult<Self> {
        let snapshot = load_snapshot(gateway.as_ref(), board_id, visibility).await?;
        let store = BoardStore::new(snapshot);
        let inner = Arc::new_cyclic(|this| SessionInner::new(this.clone(), config, gateway, board_id, visibility, store));

        let session = Self { inner, feed: Mutex::new(FeedHandles::default()) };
        session.start_feed()?;
        info!(board_id, feed = ?session.inner.config.feed_mode, "board opened");
        Ok(session)
    }

    fn start_feed(&self) -> SyncResult<()> {
        let mode = self.inner.config.feed_mode;
        let mut feed = lock(&self.feed);

        if mode.uses_push() {
            let url = self.inner.config.board_socket_url(self.inner.board_id)?;
            let (tx, rx) = mpsc::unbounded_channel();
            feed.subscription = Some(Subscription::spawn(url, tx));
            feed.pump = Some(tokio::spawn(pump(Arc::downgrade(&self.inner), rx)));
        }

        if mode.uses_poll() {
            let weak = Arc::downgrade(&self.inner);
            feed.poller = Some(Poller::spawn(self.inner.config.poll_interval(), move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(inner) => {
                            let _ = inner.refetch().await;
                            true
                        }
                        None => false,
                    }
                }
            }));
        }
        Ok(())
    }

    // ========================
    // Reads
    // ========================

    pub fn board_id(&self) -> BoardId {
        self.inner.board_id
    }

    pub fn visibility(&self) -> Visibility {
        self.inner.visibility
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Read the store under its lock
    pub fn view<R>(&self, view: impl FnOnce(&BoardStore) -> R) -> R {
        self.inner.read(view)
    }

    pub fn lanes(&self) -> Vec<Lane> {
        self.view(|store| store.lanes().to_vec())
    }

    pub fn card(&self, card_id: CardId) -> Option<Card> {
        self.view(|store| store.card(card_id).cloned())
    }

    pub fn version(&self) -> u64 {
        *self.inner.version.borrow()
    }

    /// Store version, updated after every applied mutation
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notifier.subscribe()
    }

    // ========================
    // Feed
    // ========================

    /// Apply one push frame (also the entry point for `FeedMode::External`)
    pub async fn handle_frame(&self, frame: &InboundFrame) -> ListenerOutcome {
        self.inner.handle_frame(frame).await
    }

    pub async fn refetch(&self) -> SyncResult<()> {
        self.inner.refetch().await
    }

    // ========================
    // Drag and drop
    // ========================

    pub fn press(&self, entity: DragEntity, at: Point) {
        lock(&self.inner.drag).press(entity, at);
    }

    pub fn pointer_move(&self, at: Point) -> bool {
        let mut drag = lock(&self.inner.drag);
        self.inner.read(|store| drag.pointer_move(store, at))
    }

    pub fn drag_over_cards(&self, column_id: ColumnId, layout: &[(CardId, f64)], pointer_y: f64) {
        lock(&self.inner.drag).drag_over_cards(column_id, layout, pointer_y);
    }

    pub fn drag_over_column_slot(&self, index: usize) {
        lock(&self.inner.drag).drag_over_column_slot(index);
    }

    pub fn leave_drop_zone(&self) {
        lock(&self.inner.drag).leave();
    }

    pub fn cancel_drag(&self) {
        lock(&self.inner.drag).cancel();
    }

    /// Finish the gesture. A committed drop is already visible in the store;
    /// its network call runs in the background.
    pub fn release(&self) -> DropOutcome {
        let outcome = {
            let mut drag = lock(&self.inner.drag);
            self.inner.mutate(|store| drag.release(store))
        };
        self.inner.after_drop(&outcome);
        outcome
    }

    /// Move a card without a gesture
    pub fn move_card(&self, card_id: CardId, to_column: ColumnId, index: usize) -> DropOutcome {
        let outcome = self.inner.mutate(|store| drag::move_card(store, card_id, to_column, index));
        self.inner.after_drop(&outcome);
        outcome
    }

    pub fn move_column(&self, column_id: ColumnId, index: usize) -> DropOutcome {
        let outcome = self.inner.mutate(|store| drag::move_column(store, column_id, index));
        self.inner.after_drop(&outcome);
        outcome
    }

    /// Wait for background persistence and reloads to finish
    pub async fn settle(&self) {
        self.inner.settle().await;
    }

    // ========================
    // Editing
    // ========================

    pub fn editor(&self) -> &EditingSession {
        &self.inner.editor
    }

    pub async fn open_card(&self, card_id: CardId) -> SyncResult<()> {
        let card = self.card(card_id).ok_or_else(|| SyncError::NotFound(format!("card {}", card_id)))?;
        self.inner.editor.open(&card).await
    }

    pub async fn close_card(&self) -> SyncResult<()> {
        self.inner.editor.close().await
    }

    // ========================
    // Teardown
    // ========================

    /// Stop the feed, save or cancel the pending autosave and wait for
    /// in-flight persistence. A failed final save is returned after teardown.
    pub async fn close(self) -> SyncResult<()> {
        let handles = std::mem::take(&mut *lock(&self.feed));
        if let Some(subscription) = handles.subscription {
            subscription.shutdown().await;
        }
        if let Some(pump) = handles.pump {
            pump.abort();
        }
        if let Some(poller) = handles.poller {
            poller.stop();
        }

        let saved = self.inner.editor.close().await;
        if let Err(e) = &saved {
            self.inner.report("Unsaved changes could not be stored", e);
        }
        self.inner.settle().await;
        info!(board_id = self.inner.board_id, "board closed");
        saved
    }
}

/// Forward subscription events into the session until either side goes away
async fn pump(session: Weak<SessionInner>, mut events: mpsc::UnboundedReceiver<SubscriptionEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = session.upgrade() else {
            break;
        };
        match event {
            SubscriptionEvent::Connected => debug!(board_id = inner.board_id, "live updates connected"),
            SubscriptionEvent::Frame(frame) => {
                inner.handle_frame(&frame).await;
            }
            SubscriptionEvent::Disconnected(reason) => {
                let message = match reason {
                    Some(reason) => format!("Live updates disconnected: {}", reason),
                    None => "Live updates disconnected".to_string(),
                };
                inner.notifier.warn(message);
            }
        }
    }
}
