//! REST implementation of the persistence gateway.
//!
//! Reads retry with exponential backoff on transport failures and 5xx/429
//! answers. Mutating calls are sent exactly once.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{CardFields, ColumnUpdate, MoveCardRequest, NewColumn, PersistenceGateway, ReorderColumnsRequest};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::models::{Board, BoardId, Card, CardId, Column, ColumnId, Visibility};

const BACKOFF_MULTIPLIER: u32 = 2;

/// Error body returned by the server on non-2xx responses
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base: String,
    token: Option<String>,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpGateway {
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let base = config.api_base()?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SyncError::Config(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            base: base.as_str().trim_end_matches('/').to_string(),
            token: config.token.clone(),
            max_retries: config.read_retries,
            base_delay: config.retry_base_delay(),
        })
    }

    fn endpoint(&self, path: &str) -> SyncResult<Url> {
        let raw = format!("{}/{}", self.base, path.trim_start_matches('/'));
        Url::parse(&raw).map_err(|e| SyncError::Config(format!("{}: {}", raw, e)))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Map non-2xx answers to errors, keeping the server's message
    async fn check_status(response: Response) -> SyncResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(SyncError::SessionExpired);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.error)
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or("request failed").to_string());
        Err(SyncError::Rejected { status: status.as_u16(), message })
    }

    async fn send<B: Serialize + ?Sized>(&self, method: Method, path: &str, body: Option<&B>) -> SyncResult<Response> {
        let url = self.endpoint(path)?;
        let mut request = self.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        Self::check_status(response).await
    }

    fn is_retryable(error: &SyncError) -> bool {
        match error {
            SyncError::Transport(_) => true,
            SyncError::Rejected { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Wait before retry number `attempt + 1`; saturates instead of overflowing
    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(BACKOFF_MULTIPLIER.saturating_pow(attempt))
    }

    /// GET with retry and exponential backoff
    #[instrument(skip(self), fields(max_retries = self.max_retries))]
    async fn read<T: DeserializeOwned>(&self, path: &str) -> SyncResult<T> {
        let mut attempt = 0;
        loop {
            match self.send::<()>(Method::GET, path, None).await {
                Ok(response) => return Ok(response.json::<T>().await?),
                Err(e) if attempt < self.max_retries && Self::is_retryable(&e) => {
                    let delay = self.backoff_delay(attempt);
                    debug!(attempt, ?delay, error = %e, "read failed, retrying");
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(path, error = %e, "read failed");
                    return Err(e);
                }
            }
        }
    }

    async fn write<B: Serialize + ?Sized, T: DeserializeOwned>(&self, method: Method, path: &str, body: &B) -> SyncResult<T> {
        let response = self.send(method, path, Some(body)).await?;
        Ok(response.json::<T>().await?)
    }

    async fn write_empty<B: Serialize + ?Sized>(&self, method: Method, path: &str, body: Option<&B>) -> SyncResult<()> {
        self.send(method, path, body).await.map(|_| ())
    }
}

#[async_trait]
impl PersistenceGateway for HttpGateway {
    async fn list_boards(&self, visibility: Visibility) -> SyncResult<Vec<Board>> {
        match visibility {
            Visibility::Public => self.read("boards/public").await,
            Visibility::Private => self.read("boards/private").await,
        }
    }

    async fn list_columns(&self, board_id: BoardId) -> SyncResult<Vec<Column>> {
        self.read(&format!("boards/{}/columns", board_id)).await
    }

    async fn list_cards(&self, column_id: ColumnId) -> SyncResult<Vec<Card>> {
        // the server answers `null` for an empty column
        let cards: Option<Vec<Card>> = self.read(&format!("columns/{}/cards", column_id)).await?;
        Ok(cards.unwrap_or_default())
    }

    async fn create_card(&self, column_id: ColumnId, fields: &CardFields) -> SyncResult<Card> {
        self.write(Method::POST, &format!("columns/{}/cards", column_id), fields).await
    }

    async fn update_card(&self, card_id: CardId, fields: &CardFields) -> SyncResult<Card> {
        self.write(Method::PUT, &format!("cards/{}", card_id), fields).await
    }

    async fn delete_card(&self, card_id: CardId) -> SyncResult<()> {
        self.write_empty::<()>(Method::DELETE, &format!("cards/{}", card_id), None).await
    }

    async fn move_card(&self, request: &MoveCardRequest) -> SyncResult<()> {
        self.write_empty(Method::POST, "cards/move", Some(request)).await
    }

    async fn create_column(&self, column: &NewColumn) -> SyncResult<Column> {
        self.write(Method::POST, "columns", column).await
    }

    async fn update_column(&self, column_id: ColumnId, update: &ColumnUpdate) -> SyncResult<Column> {
        self.write(Method::PUT, &format!("columns/{}", column_id), update).await
    }

    async fn delete_column(&self, column_id: ColumnId) -> SyncResult<()> {
        self.write_empty::<()>(Method::DELETE, &format!("columns/{}", column_id), None).await
    }

    async fn reorder_columns(&self, request: &ReorderColumnsRequest) -> SyncResult<()> {
        let path = format!("boards/{}/columns/reorder", request.board_id);
        self.write_empty(Method::POST, &path, Some(request)).await
    }
}
