//! Board Models
//!
//! Data structures matching the server's JSON entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{SyncError, SyncResult};

pub type BoardId = i64;
pub type ColumnId = i64;
pub type CardId = i64;
/// Viewer identities are opaque strings issued by the auth provider
pub type UserId = String;

/// Which listing a board is served from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

/// Board metadata (matches backend)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub id: BoardId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub owner_id: UserId,
    pub is_public: bool,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Board {
    pub fn visibility(&self) -> Visibility {
        if self.is_public {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }
}

/// Column data structure (matches backend)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub board_id: BoardId,
    pub title: String,
    #[serde(default)]
    pub color: String,
    pub position: i32,
}

/// Card priority; the legacy server spells these in Portuguese
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Priority {
    #[serde(rename = "low", alias = "baixa")]
    Low,
    #[default]
    #[serde(rename = "medium", alias = "media")]
    Medium,
    #[serde(rename = "high", alias = "alta")]
    High,
}

/// Card data structure (matches backend)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub column_id: ColumnId,
    pub title: String,
    /// Serialized [`CardDescription`]
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub assigned_to: Option<UserId>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    pub position: i32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// One author-tagged entry of a comment thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    pub author: String,
    #[serde(default)]
    pub timestamp: String,
}

/// Named comment threads inside a card description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Thread {
    Observations,
    ContactAttempts,
    Resolution,
    /// The single thread used by private boards
    Comments,
}

const PUBLIC_THREADS: [Thread; 3] = [Thread::Observations, Thread::ContactAttempts, Thread::Resolution];
const PRIVATE_THREADS: [Thread; 1] = [Thread::Comments];

/// Author used for descriptions that predate the structured format
pub const LEGACY_AUTHOR: &str = "System";

impl Thread {
    fn wire_key(self) -> &'static str {
        match self {
            Thread::Observations => "observacoes",
            Thread::ContactAttempts => "tentativas",
            Thread::Resolution => "resolucao",
            Thread::Comments => "comments",
        }
    }

    /// Threads a card carries on a board of the given visibility
    pub fn for_visibility(visibility: Visibility) -> &'static [Thread] {
        match visibility {
            Visibility::Public => &PUBLIC_THREADS,
            Visibility::Private => &PRIVATE_THREADS,
        }
    }
}

/// Structured card description: comment threads keyed by [`Thread`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardDescription {
    threads: Vec<(Thread, Vec<Comment>)>,
}

impl CardDescription {
    pub fn empty(visibility: Visibility) -> Self {
        Self {
            threads: Thread::for_visibility(visibility)
                .iter()
                .map(|t| (*t, Vec::new()))
                .collect(),
        }
    }

    /// Parse a stored description. Text that is not a JSON object becomes a
    /// single comment in the first thread.
    pub fn parse(raw: &str, visibility: Visibility) -> Self {
        let mut description = Self::empty(visibility);
        if raw.trim().is_empty() {
            return description;
        }

        match serde_json::from_str::<Map<String, Value>>(raw) {
            Ok(map) => {
                for (thread, comments) in description.threads.iter_mut() {
                    if let Some(value) = map.get(thread.wire_key()) {
                        *comments = serde_json::from_value(value.clone()).unwrap_or_default();
                    }
                }
            }
            Err(_) => {
                if let Some((_, comments)) = description.threads.first_mut() {
                    comments.push(Comment {
                        text: raw.to_string(),
                        author: LEGACY_AUTHOR.to_string(),
                        timestamp: String::new(),
                    });
                }
            }
        }
        description
    }

    pub fn to_json(&self) -> String {
        let map: Map<String, Value> = self
            .threads
            .iter()
            .map(|(thread, comments)| {
                let value = serde_json::to_value(comments).unwrap_or(Value::Array(Vec::new()));
                (thread.wire_key().to_string(), value)
            })
            .collect();
        Value::Object(map).to_string()
    }

    pub fn comments(&self, thread: Thread) -> &[Comment] {
        self.threads
            .iter()
            .find(|(t, _)| *t == thread)
            .map(|(_, c)| c.as_slice())
            .unwrap_or(&[])
    }

    fn thread_mut(&mut self, thread: Thread) -> SyncResult<&mut Vec<Comment>> {
        self.threads
            .iter_mut()
            .find(|(t, _)| *t == thread)
            .map(|(_, c)| c)
            .ok_or_else(|| SyncError::Validation(format!("{:?} thread not available on this board", thread)))
    }

    pub fn add_comment(&mut self, thread: Thread, text: &str, author: &str, at: DateTime<Utc>) -> SyncResult<()> {
        if text.trim().is_empty() {
            return Err(SyncError::Validation("comment text is empty".into()));
        }
        self.thread_mut(thread)?.push(Comment {
            text: text.to_string(),
            author: author.to_string(),
            timestamp: at.format("%d/%m/%Y, %H:%M:%S").to_string(),
        });
        Ok(())
    }

    /// Replace the text of a comment; only its author may do so
    pub fn edit_comment(&mut self, thread: Thread, index: usize, text: &str, author: &str) -> SyncResult<()> {
        if text.trim().is_empty() {
            return Err(SyncError::Validation("comment text is empty".into()));
        }
        let comment = owned_comment(self.thread_mut(thread)?, index, author)?;
        comment.text = text.to_string();
        Ok(())
    }

    /// Remove a comment; only its author may do so
    pub fn remove_comment(&mut self, thread: Thread, index: usize, author: &str) -> SyncResult<()> {
        let comments = self.thread_mut(thread)?;
        owned_comment(comments, index, author)?;
        comments.remove(index);
        Ok(())
    }
}

fn owned_comment<'a>(comments: &'a mut [Comment], index: usize, author: &str) -> SyncResult<&'a mut Comment> {
    let comment = comments
        .get_mut(index)
        .ok_or_else(|| SyncError::NotFound(format!("comment {}", index)))?;
    if comment.author != author {
        return Err(SyncError::Validation("only the author can change a comment".into()));
    }
    Ok(comment)
}
