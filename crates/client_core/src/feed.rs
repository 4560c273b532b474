//! Live feed connection: one WebSocket per active conversation, reopened
//! after a fixed delay whenever it drops.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use shared::{
    domain::ConversationRef,
    protocol::{decode_feed_frame, ChatMessage},
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::FeedConnectionError;

pub const RECONNECT_DELAY: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// Text frames of one open socket. The stream ends, or yields an error, when
/// the socket goes away.
pub type FeedSocket = BoxStream<'static, Result<String, FeedConnectionError>>;

#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn open(&self, url: &Url) -> Result<FeedSocket, FeedConnectionError>;
}

pub struct TungsteniteConnector;

#[async_trait]
impl FeedConnector for TungsteniteConnector {
    async fn open(&self, url: &Url) -> Result<FeedSocket, FeedConnectionError> {
        let (ws_stream, _) =
            connect_async(url.as_str())
                .await
                .map_err(|err| FeedConnectionError::Open {
                    url: redacted(url),
                    reason: err.to_string(),
                })?;

        let frames = ws_stream.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Close(_)) => Some(Err(FeedConnectionError::Closed)),
                Ok(_) => None,
                Err(err) => Some(Err(FeedConnectionError::Socket(err.to_string()))),
            }
        });
        Ok(frames.boxed())
    }
}

/// Feed URLs carry the bearer token in the query string.
pub(crate) fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

/// State shared between a connection handle and its task. Once closed, the
/// task can no longer publish; the check and the write happen under the
/// channel's lock.
struct SharedState {
    tx: watch::Sender<ConnectionState>,
    closed: AtomicBool,
}

impl SharedState {
    fn publish(&self, next: ConnectionState) {
        self.tx.send_if_modified(|current| {
            if self.closed.load(Ordering::SeqCst) || *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.tx.send_replace(ConnectionState::Disconnected);
    }
}

pub struct LiveFeedConnection {
    conversation: ConversationRef,
    state: Arc<SharedState>,
    task: Option<JoinHandle<()>>,
}

impl LiveFeedConnection {
    /// Spawns the connection task for `conversation`. Accepted messages are
    /// sent to `subscriber`; the task stops once the subscriber is dropped.
    pub fn connect(
        conversation: ConversationRef,
        url: Url,
        connector: Arc<dyn FeedConnector>,
        subscriber: mpsc::UnboundedSender<ChatMessage>,
    ) -> Self {
        let (tx, _) = watch::channel(ConnectionState::Connecting);
        let state = Arc::new(SharedState {
            tx,
            closed: AtomicBool::new(false),
        });
        let task = tokio::spawn(run_connection(
            conversation.clone(),
            url,
            connector,
            subscriber,
            Arc::clone(&state),
        ));
        Self {
            conversation,
            state,
            task: Some(task),
        }
    }

    pub fn conversation(&self) -> &ConversationRef {
        &self.conversation
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.tx.subscribe()
    }

    /// Tears the connection down. Any pending reconnect is cancelled with the
    /// task, so nothing reopens after this returns.
    pub fn close(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        self.state.publish(ConnectionState::Closing);
        self.state.close();
        task.abort();
        info!(conversation = %self.conversation, "live feed closed");
    }
}

impl Drop for LiveFeedConnection {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_connection(
    conversation: ConversationRef,
    url: Url,
    connector: Arc<dyn FeedConnector>,
    subscriber: mpsc::UnboundedSender<ChatMessage>,
    state: Arc<SharedState>,
) {
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        state.publish(ConnectionState::Connecting);

        match connector.open(&url).await {
            Ok(mut socket) => {
                state.publish(ConnectionState::Open);
                info!(%conversation, attempt, "live feed open");
                while let Some(frame) = socket.next().await {
                    match frame {
                        Ok(text) => match decode_feed_frame(&text, &conversation) {
                            Ok(message) => {
                                if subscriber.send(message).is_err() {
                                    return;
                                }
                            }
                            Err(err) => {
                                debug!(%conversation, error = %err, "discarding live feed frame");
                            }
                        },
                        Err(err) => {
                            debug!(%conversation, error = %err, "live feed dropped");
                            break;
                        }
                    }
                }
            }
            Err(err) => {
                warn!(%conversation, attempt, error = %err, "live feed failed to open");
            }
        }

        state.publish(ConnectionState::Disconnected);
        if subscriber.is_closed() {
            return;
        }
        debug!(%conversation, delay_ms = RECONNECT_DELAY.as_millis() as u64, "live feed reconnect scheduled");
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

#[cfg(test)]
#[path = "tests/feed_tests.rs"]
mod tests;
