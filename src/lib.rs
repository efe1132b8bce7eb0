//! Kanban Sync
//!
//! Client-side synchronization engine for a column/card board: optimistic
//! drag-and-drop, a realtime invalidation feed and debounced card editing
//! on top of a server-authoritative REST backend.

pub mod config;
pub mod debounce;
pub mod drag;
pub mod editing;
pub mod error;
pub mod gateway;
pub mod models;
pub mod notify;
pub mod positioning;
pub mod realtime;
pub mod session;
pub mod store;

pub use config::{FeedMode, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use gateway::{HttpGateway, PersistenceGateway};
pub use session::BoardSession;
pub use store::{BoardSnapshot, BoardStore, Patch};
