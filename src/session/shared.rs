//! State shared between a board session and its background tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, Weak};

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::drag::{DragController, DropOutcome, PersistCommit};
use crate::editing::{EditingSession, EditorHooks};
use crate::error::{SyncError, SyncResult};
use crate::gateway::{load_snapshot, PersistenceGateway};
use crate::models::{BoardId, Card, CardId, Visibility};
use crate::notify::Notifier;
use crate::realtime::{FeedListener, InboundFrame, ListenerOutcome};
use crate::store::{BoardStore, Patch};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct SessionInner {
    pub(crate) this: Weak<SessionInner>,
    pub(crate) config: SyncConfig,
    pub(crate) gateway: std::sync::Arc<dyn PersistenceGateway>,
    pub(crate) board_id: BoardId,
    pub(crate) visibility: Visibility,
    pub(crate) store: RwLock<BoardStore>,
    pub(crate) listener: FeedListener,
    pub(crate) drag: Mutex<DragController>,
    pub(crate) editor: EditingSession,
    pub(crate) version: watch::Sender<u64>,
    pub(crate) notifier: Notifier,
    /// Persistence and refetch tasks still running
    pub(crate) inflight: Mutex<JoinSet<()>>,
    refetch_gate: tokio::sync::Mutex<()>,
    refetch_wanted: AtomicBool,
}

impl SessionInner {
    pub(crate) fn new(
        this: Weak<SessionInner>,
        config: SyncConfig,
        gateway: std::sync::Arc<dyn PersistenceGateway>,
        board_id: BoardId,
        visibility: Visibility,
        store: BoardStore,
    ) -> Self {
        let hooks: Weak<dyn EditorHooks> = this.clone();
        let (version, _) = watch::channel(store.version());
        Self {
            listener: FeedListener::new(config.viewer_id.clone()),
            drag: Mutex::new(DragController::new(config.drag_threshold_px)),
            editor: EditingSession::new(gateway.clone(), config.autosave_delay(), hooks),
            this,
            config,
            gateway,
            board_id,
            visibility,
            store: RwLock::new(store),
            version,
            notifier: Notifier::new(),
            inflight: Mutex::new(JoinSet::new()),
            refetch_gate: tokio::sync::Mutex::new(()),
            refetch_wanted: AtomicBool::new(false),
        }
    }

    // ========================
    // Store access
    // ========================

    pub(crate) fn read<R>(&self, view: impl FnOnce(&BoardStore) -> R) -> R {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        view(&store)
    }

    /// Run one mutation under the write lock, then publish the new version
    pub(crate) fn mutate<R>(&self, change: impl FnOnce(&mut BoardStore) -> R) -> R {
        let (result, version) = {
            let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
            let result = change(&mut store);
            (result, store.version())
        };
        self.version.send_if_modified(|current| {
            let changed = *current != version;
            *current = version;
            changed
        });
        result
    }

    /// Editor re-sync guard after any store change
    pub(crate) fn resync_editor(&self) {
        let Some(card_id) = self.editor.card_id() else {
            return;
        };
        let current = self.read(|store| store.card(card_id).cloned());
        if self.editor.resync(current.as_ref()) {
            self.notifier.info(format!("Card {} was removed; editor closed", card_id));
        }
    }

    // ========================
    // Refetch
    // ========================

    /// Reload the whole board. Requests arriving while a reload runs are
    /// folded into one more pass of that reload.
    pub(crate) async fn refetch(&self) -> SyncResult<()> {
        self.refetch_wanted.store(true, Ordering::SeqCst);
        loop {
            let Ok(gate) = self.refetch_gate.try_lock() else {
                return Ok(());
            };
            while self.refetch_wanted.swap(false, Ordering::SeqCst) {
                let snapshot = match load_snapshot(self.gateway.as_ref(), self.board_id, self.visibility).await {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        self.report("Could not reload the board", &e);
                        return Err(e);
                    }
                };
                self.mutate(|store| store.replace_all(snapshot));
                self.resync_editor();
                debug!(board_id = self.board_id, "board reloaded");
            }
            drop(gate);
            if !self.refetch_wanted.load(Ordering::SeqCst) {
                return Ok(());
            }
        }
    }

    pub(crate) fn spawn_refetch(&self) {
        let Some(inner) = self.this.upgrade() else {
            return;
        };
        self.track(async move {
            // failures are already reported
            let _ = inner.refetch().await;
        });
    }

    // ========================
    // Frames and drops
    // ========================

    pub(crate) async fn handle_frame(&self, frame: &InboundFrame) -> ListenerOutcome {
        let outcome = self.mutate(|store| self.listener.handle(frame, store));
        match outcome {
            ListenerOutcome::Applied => self.resync_editor(),
            ListenerOutcome::RefetchRequired => {
                let _ = self.refetch().await;
            }
            ListenerOutcome::Discarded => debug!(kind = %frame.kind, "realtime event discarded"),
            _ => {}
        }
        outcome
    }

    /// Follow-up for a drop that already touched the store
    pub(crate) fn after_drop(&self, outcome: &DropOutcome) {
        match outcome {
            DropOutcome::Committed(commit) => {
                self.resync_editor();
                self.spawn_persist(commit.clone());
            }
            DropOutcome::Abandoned => self.spawn_refetch(),
            _ => {}
        }
    }

    fn spawn_persist(&self, commit: PersistCommit) {
        let Some(inner) = self.this.upgrade() else {
            return;
        };
        self.track(async move {
            let _ = inner.persist(&commit).await;
        });
    }

    /// Send a drop to the server; on failure reload instead of undoing
    pub(crate) async fn persist(&self, commit: &PersistCommit) -> SyncResult<()> {
        let result = match commit {
            PersistCommit::Card(request) => self.gateway.move_card(request).await,
            PersistCommit::Columns(request) => self.gateway.reorder_columns(request).await,
        };
        if let Err(e) = &result {
            self.report("Could not save the move", e);
            if !matches!(e, SyncError::SessionExpired) {
                let _ = self.refetch().await;
            }
        }
        result
    }

    // ========================
    // Errors and tasks
    // ========================

    /// Notify, and reload when the server state is now uncertain
    pub(crate) async fn mutation_failed(&self, what: &str, error: SyncError) -> SyncError {
        self.report(what, &error);
        if error.is_transport() {
            let _ = self.refetch().await;
        }
        error
    }

    pub(crate) fn report(&self, what: &str, error: &SyncError) {
        match error {
            SyncError::SessionExpired => self.notifier.error("Session expired, please sign in again"),
            e if e.is_validation() => self.notifier.warn(format!("{}: {}", what, e)),
            e => self.notifier.error(format!("{}: {}", what, e)),
        }
    }

    fn track<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut inflight = lock(&self.inflight);
        while inflight.try_join_next().is_some() {}
        inflight.spawn(task);
    }

    /// Wait until every tracked task has finished
    pub(crate) async fn settle(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *lock(&self.inflight));
            if tasks.is_empty() {
                return;
            }
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "background task failed");
                }
            }
        }
    }
}

impl EditorHooks for SessionInner {
    fn saved(&self, card: Card) {
        let card_id = card.id;
        if self.mutate(|store| store.refresh_card(card)) == Patch::RefetchRequired {
            debug!(card_id, "saved card not placeable, reloading");
            self.spawn_refetch();
        }
    }

    fn save_failed(&self, card_id: CardId, error: &SyncError) {
        self.report(&format!("Could not save card {}", card_id), error);
        if error.is_transport() {
            self.spawn_refetch();
        }
    }
}
