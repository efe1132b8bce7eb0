//! Websocket push subscription for one open board.
//!
//! No reconnect loop: when the connection ends the subscription reports it
//! and stops. A fresh subscription is opened with the next board open.

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::{SinkExt, StreamExt};
use tokio::select;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use super::InboundFrame;
use crate::error::SyncResult;

/// What the subscription task reports to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Connected,
    Frame(InboundFrame),
    /// The connection ended; `Some` carries the failure
    Disconnected(Option<String>),
}

/// Handle of a running subscription task
pub struct Subscription {
    url: Url,
    shutdown: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Subscription {
    /// Start connecting in the background; events arrive on `events`
    pub fn spawn(url: Url, events: mpsc::UnboundedSender<SubscriptionEvent>) -> Self {
        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(run(url.clone(), shutdown.clone(), events));
        Self { url, shutdown, task: Mutex::new(Some(task)) }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Stop the task and wait for it to finish
    pub async fn shutdown(&self) {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            self.shutdown.notify_one();
            if let Err(e) = task.await {
                warn!(url = %self.url, "subscription task join error: {}", e);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
    }
}

async fn run(url: Url, shutdown: Arc<Notify>, events: mpsc::UnboundedSender<SubscriptionEvent>) {
    let result = select! {
        _ = shutdown.notified() => {
            debug!(%url, "subscription shut down");
            return;
        }
        result = connect_once(&url, &shutdown, &events) => result,
    };

    let reason = match result {
        Ok(()) => None,
        Err(e) => {
            warn!(%url, error = %e, "push channel failed");
            Some(e.to_string())
        }
    };
    let _ = events.send(SubscriptionEvent::Disconnected(reason));
}

/// Returns `Ok` when the server closed the stream or shutdown was requested
async fn connect_once(url: &Url, shutdown: &Notify, events: &mpsc::UnboundedSender<SubscriptionEvent>) -> SyncResult<()> {
    info!(%url, "connecting push channel");
    let (ws_stream, _) = connect_async(url.as_str()).await?;
    let (mut sink, mut stream) = ws_stream.split();
    let _ = events.send(SubscriptionEvent::Connected);

    loop {
        select! {
            _ = shutdown.notified() => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(());
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => match InboundFrame::parse(text.as_str()) {
                    Ok(frame) => {
                        if events.send(SubscriptionEvent::Frame(frame)).is_err() {
                            return Ok(());
                        }
                    }
                    Err(e) => warn!(error = %e, "undecodable push frame ignored"),
                },
                Some(Ok(Message::Ping(data))) => {
                    debug!("received ping, sending pong");
                    sink.send(Message::Pong(data)).await?;
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!(%url, "push channel closed by server");
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}
