//! Task Editing Session
//!
//! Form state for the single card open in the editor, saved through a
//! trailing-edge debounce. Incoming board refreshes only overwrite the form
//! while it holds no unsaved edits.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::debounce::ScheduledTask;
use crate::error::{SyncError, SyncResult};
use crate::gateway::{CardFields, PersistenceGateway};
use crate::models::{Card, CardDescription, CardId, Priority, Thread, UserId, Visibility};

/// Receives the outcome of every save
pub trait EditorHooks: Send + Sync {
    /// The server's canonical copy after a successful save
    fn saved(&self, card: Card);
    fn save_failed(&self, card_id: CardId, error: &SyncError);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditState {
    NotEditing,
    Editing { card_id: CardId, dirty: bool },
}

#[derive(Debug, Default)]
struct FormState {
    card_id: Option<CardId>,
    form: Option<CardFields>,
    dirty: bool,
    /// Bumped by every edit; a save only clears `dirty` if unchanged
    generation: u64,
}

struct EditorInner {
    gateway: Arc<dyn PersistenceGateway>,
    hooks: Weak<dyn EditorHooks>,
    state: Mutex<FormState>,
    /// Serializes saves so a close never races a timer-fired save
    save_lock: tokio::sync::Mutex<()>,
}

impl EditorInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, FormState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Submit the complete form if it holds unsaved edits
    async fn save_if_dirty(&self) -> SyncResult<()> {
        let _serial = self.save_lock.lock().await;

        let (card_id, fields, generation) = {
            let state = self.lock();
            let (Some(card_id), Some(form)) = (state.card_id, state.form.as_ref()) else {
                return Ok(());
            };
            if !state.dirty {
                return Ok(());
            }
            (card_id, form.clone(), state.generation)
        };

        match self.gateway.update_card(card_id, &fields).await {
            Ok(card) => {
                let still_open = {
                    let mut state = self.lock();
                    let still_open = state.card_id == Some(card_id);
                    if still_open && state.generation == generation {
                        state.dirty = false;
                    }
                    still_open
                };
                debug!(card_id, "card saved");
                if !still_open {
                    debug!(card_id, "editor left the card during save, acknowledgement dropped");
                    return Ok(());
                }
                if let Some(hooks) = self.hooks.upgrade() {
                    hooks.saved(card);
                }
                Ok(())
            }
            Err(e) => {
                warn!(card_id, error = %e, "card save failed");
                if let Some(hooks) = self.hooks.upgrade() {
                    hooks.save_failed(card_id, &e);
                }
                Err(e)
            }
        }
    }
}

/// Editor for at most one card at a time
pub struct EditingSession {
    inner: Arc<EditorInner>,
    autosave: ScheduledTask,
}

impl EditingSession {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, autosave_delay: Duration, hooks: Weak<dyn EditorHooks>) -> Self {
        Self {
            inner: Arc::new(EditorInner {
                gateway,
                hooks,
                state: Mutex::new(FormState::default()),
                save_lock: tokio::sync::Mutex::new(()),
            }),
            autosave: ScheduledTask::new(autosave_delay),
        }
    }

    pub fn state(&self) -> EditState {
        let state = self.inner.lock();
        match state.card_id {
            Some(card_id) => EditState::Editing { card_id, dirty: state.dirty },
            None => EditState::NotEditing,
        }
    }

    pub fn card_id(&self) -> Option<CardId> {
        self.inner.lock().card_id
    }

    /// Current form fields of the open card
    pub fn form(&self) -> Option<CardFields> {
        self.inner.lock().form.clone()
    }

    /// Open a card, closing (and saving) the previous one first
    pub async fn open(&self, card: &Card) -> SyncResult<()> {
        if let Some(current) = self.card_id() {
            if current == card.id {
                return Ok(());
            }
            self.close().await?;
        }

        let mut state = self.inner.lock();
        state.card_id = Some(card.id);
        state.form = Some(CardFields::from(card));
        state.dirty = false;
        info!(card_id = card.id, "editing card");
        Ok(())
    }

    /// Change form fields and (re)start the autosave timer
    pub fn edit(&self, change: impl FnOnce(&mut CardFields)) -> SyncResult<()> {
        {
            let mut state = self.inner.lock();
            let form = state.form.as_mut().ok_or(SyncError::NotEditing)?;
            change(form);
            state.dirty = true;
            state.generation += 1;
        }

        let inner = self.inner.clone();
        self.autosave.schedule(move || async move {
            // failures are reported through the hooks
            let _ = inner.save_if_dirty().await;
        });
        Ok(())
    }

    pub fn set_title(&self, title: &str) -> SyncResult<()> {
        if title.trim().is_empty() {
            return Err(SyncError::Validation("title is empty".into()));
        }
        self.edit(|form| form.title = title.to_string())
    }

    pub fn set_priority(&self, priority: Priority) -> SyncResult<()> {
        self.edit(|form| form.priority = priority)
    }

    pub fn set_assignee(&self, assignee: Option<UserId>) -> SyncResult<()> {
        self.edit(|form| form.assigned_to = assignee)
    }

    pub fn set_due_date(&self, due_date: Option<DateTime<Utc>>) -> SyncResult<()> {
        self.edit(|form| form.due_date = due_date)
    }

    /// Parsed description of the open card
    pub fn description(&self, visibility: Visibility) -> SyncResult<CardDescription> {
        let state = self.inner.lock();
        let form = state.form.as_ref().ok_or(SyncError::NotEditing)?;
        Ok(CardDescription::parse(&form.description, visibility))
    }

    /// Rewrite the description through a structured change
    pub fn edit_description(
        &self,
        visibility: Visibility,
        change: impl FnOnce(&mut CardDescription) -> SyncResult<()>,
    ) -> SyncResult<()> {
        let mut description = self.description(visibility)?;
        change(&mut description)?;
        let raw = description.to_json();
        self.edit(|form| form.description = raw)
    }

    pub fn add_comment(&self, visibility: Visibility, thread: Thread, text: &str, author: &str) -> SyncResult<()> {
        self.edit_description(visibility, |d| d.add_comment(thread, text, author, Utc::now()))
    }

    /// Save now if an autosave is waiting. Returns true when one ran.
    pub async fn flush(&self) -> bool {
        self.autosave.flush().await
    }

    /// Cancel the timer and save immediately.
    pub async fn save(&self) -> SyncResult<()> {
        self.autosave.cancel();
        self.inner.save_if_dirty().await
    }

    /// Save pending edits and leave the card. A failed save keeps the card
    /// open and dirty and returns the error.
    pub async fn close(&self) -> SyncResult<()> {
        self.save().await?;
        let mut state = self.inner.lock();
        if let Some(card_id) = state.card_id.take() {
            debug!(card_id, "editor closed");
        }
        state.form = None;
        state.dirty = false;
        Ok(())
    }

    /// Leave the card without saving
    pub fn discard(&self) {
        self.autosave.cancel();
        let mut state = self.inner.lock();
        state.card_id = None;
        state.form = None;
        state.dirty = false;
    }

    /// Re-sync guard for store refreshes. `current` is the store's copy of
    /// the open card. Returns true when the session closed because the card
    /// no longer exists.
    pub fn resync(&self, current: Option<&Card>) -> bool {
        let Some(card_id) = self.card_id() else {
            return false;
        };
        match current {
            None => {
                info!(card_id, "edited card removed, closing editor");
                self.discard();
                true
            }
            Some(card) => {
                let mut state = self.inner.lock();
                if state.card_id == Some(card.id) && !state.dirty {
                    state.form = Some(CardFields::from(card));
                }
                false
            }
        }
    }
}
