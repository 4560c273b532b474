//! Scripted collaborators shared by the unit tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::{channel::mpsc as frame_channel, StreamExt};
use shared::{
    domain::{ConversationRef, MessageId, UserId},
    protocol::ChatMessage,
};
use tokio::sync::{mpsc, oneshot};
use url::Url;

use crate::{
    error::{FeedConnectionError, RequestError, TransportError},
    feed::{FeedConnector, FeedSocket},
    synchronizer::{ConversationSynchronizer, SyncEvent},
    transport::{feed_url_for, ChatApi},
};

pub fn message(id: i64, conversation: &ConversationRef) -> ChatMessage {
    ChatMessage {
        id: MessageId(id),
        conversation: conversation.clone(),
        sender_id: UserId(1),
        sender_display_name: "ada".into(),
        content: format!("message {id}"),
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + chrono::Duration::seconds(id),
    }
}

pub fn group_frame(id: i64, group_id: i64) -> String {
    format!(
        r#"{{"type":"message","data":{{"id":{id},"group_id":{group_id},"user_id":2,"sender_username":"bob","content":"frame {id}","created_at":"2024-05-01T10:00:00"}}}}"#
    )
}

pub fn ids(messages: &[ChatMessage]) -> Vec<i64> {
    messages.iter().map(|message| message.id.0).collect()
}

pub fn request_error(status: u16, message: &str) -> TransportError {
    TransportError::Request(RequestError::new(status, message))
}

pub async fn next_event(sync: &mut ConversationSynchronizer) -> SyncEvent {
    tokio::time::timeout(Duration::from_secs(5), sync.next_event())
        .await
        .expect("sync event timeout")
}

/// Gives aborted feed tasks a chance to drop their socket.
pub async fn wait_closed(socket: &OpenedSocket) -> bool {
    for _ in 0..50 {
        if socket.frames.is_closed() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    socket.frames.is_closed()
}

/// One socket handed out by [`ScriptedConnector`]. Dropping `frames` closes
/// the socket from the server side.
pub struct OpenedSocket {
    pub url: Url,
    pub at: tokio::time::Instant,
    pub frames: frame_channel::UnboundedSender<Result<String, FeedConnectionError>>,
}

impl OpenedSocket {
    pub fn push(&self, text: String) {
        let _ = self.frames.unbounded_send(Ok(text));
    }
}

pub struct ScriptedConnector {
    refusals: AtomicUsize,
    opens: mpsc::UnboundedSender<OpenedSocket>,
    attempts: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new() -> (std::sync::Arc<Self>, mpsc::UnboundedReceiver<OpenedSocket>) {
        let (opens, opens_rx) = mpsc::unbounded_channel();
        (
            std::sync::Arc::new(Self {
                refusals: AtomicUsize::new(0),
                opens,
                attempts: AtomicUsize::new(0),
            }),
            opens_rx,
        )
    }

    /// The next `count` open attempts fail.
    pub fn refuse(&self, count: usize) {
        self.refusals.store(count, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedConnector for ScriptedConnector {
    async fn open(&self, url: &Url) -> Result<FeedSocket, FeedConnectionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        let (frames, socket) = frame_channel::unbounded();
        let _ = self.opens.send(OpenedSocket {
            url: url.clone(),
            at: tokio::time::Instant::now(),
            frames,
        });
        if refused {
            return Err(FeedConnectionError::Open {
                url: url.to_string(),
                reason: "connection refused".into(),
            });
        }
        Ok(socket.boxed())
    }
}

type HistoryReply = oneshot::Receiver<Result<Vec<ChatMessage>, TransportError>>;
type SendReply = oneshot::Receiver<Result<ChatMessage, TransportError>>;

#[derive(Default)]
pub struct ScriptedApi {
    histories: Mutex<HashMap<ConversationRef, VecDeque<HistoryReply>>>,
    sends: Mutex<VecDeque<SendReply>>,
    sent: Mutex<Vec<(ConversationRef, String)>>,
    history_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::default())
    }

    pub fn reply_history(
        &self,
        conversation: &ConversationRef,
        result: Result<Vec<ChatMessage>, TransportError>,
    ) {
        let _ = self.gated_history(conversation).send(result);
    }

    pub fn gated_history(
        &self,
        conversation: &ConversationRef,
    ) -> oneshot::Sender<Result<Vec<ChatMessage>, TransportError>> {
        let (tx, rx) = oneshot::channel();
        self.histories
            .lock()
            .unwrap()
            .entry(conversation.clone())
            .or_default()
            .push_back(rx);
        tx
    }

    pub fn reply_send(&self, result: Result<ChatMessage, TransportError>) {
        let _ = self.gated_send().send(result);
    }

    pub fn gated_send(&self) -> oneshot::Sender<Result<ChatMessage, TransportError>> {
        let (tx, rx) = oneshot::channel();
        self.sends.lock().unwrap().push_back(rx);
        tx
    }

    pub fn sent(&self) -> Vec<(ConversationRef, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatApi for ScriptedApi {
    async fn load_history(
        &self,
        conversation: &ConversationRef,
    ) -> Result<Vec<ChatMessage>, TransportError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .histories
            .lock()
            .unwrap()
            .get_mut(conversation)
            .and_then(VecDeque::pop_front);
        match reply {
            Some(reply) => reply
                .await
                .unwrap_or_else(|_| Err(request_error(599, "history reply dropped"))),
            None => Ok(Vec::new()),
        }
    }

    async fn send_message(
        &self,
        conversation: &ConversationRef,
        content: &str,
    ) -> Result<ChatMessage, TransportError> {
        self.sent
            .lock()
            .unwrap()
            .push((conversation.clone(), content.to_string()));
        let reply = self.sends.lock().unwrap().pop_front();
        match reply {
            Some(reply) => reply
                .await
                .unwrap_or_else(|_| Err(request_error(599, "send reply dropped"))),
            None => Err(request_error(500, "no scripted send reply")),
        }
    }

    fn feed_url(&self, conversation: &ConversationRef) -> Result<Url, TransportError> {
        let base = Url::parse("http://chat.test")?;
        feed_url_for(&base, "test-token", conversation)
    }
}
