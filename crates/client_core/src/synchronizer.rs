//! Keeps the displayed message list of the active conversation consistent
//! with the REST snapshot, the live feed and locally sent messages.
//!
//! The synchronizer has a single owner and is driven through `&mut self`.
//! REST calls run as spawned tasks and report back through a channel; their
//! results, like feed deliveries, are applied inside [`ConversationSynchronizer::next_event`].
//! It must therefore be used from within a tokio runtime.

use std::sync::Arc;

use shared::{
    domain::{ConversationRef, GroupId, Membership, MessageId},
    protocol::ChatMessage,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    error::TransportError,
    feed::{ConnectionState, FeedConnector, LiveFeedConnection},
    store::{ConversationStore, MessageSequence},
    transport::{ChatApi, LOAD_MESSAGES_FALLBACK, SEND_MESSAGE_FALLBACK},
};

/// Identifies one activation of a conversation. Results tagged with an older
/// token are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionToken(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    HistoryLoaded {
        conversation: ConversationRef,
        count: usize,
    },
    MessageAppended {
        conversation: ConversationRef,
        message_id: MessageId,
    },
    MessageSent {
        conversation: ConversationRef,
        message_id: MessageId,
    },
    Error {
        conversation: ConversationRef,
        message: String,
    },
}

enum Completion {
    HistoryLoaded {
        selection: SelectionToken,
        conversation: ConversationRef,
        result: Result<Vec<ChatMessage>, TransportError>,
    },
    MessageSent {
        conversation: ConversationRef,
        result: Result<ChatMessage, TransportError>,
    },
}

enum Incoming {
    Completion(Completion),
    Feed(Option<ChatMessage>),
}

struct ActiveConversation {
    conversation: ConversationRef,
    selection: SelectionToken,
    membership: Membership,
    feed: Option<LiveFeedConnection>,
    feed_rx: Option<mpsc::UnboundedReceiver<ChatMessage>>,
}

impl ActiveConversation {
    fn is_live(&self) -> bool {
        self.membership == Membership::Member
    }

    fn disconnect(&mut self) {
        if let Some(mut feed) = self.feed.take() {
            feed.close();
        }
        self.feed_rx = None;
    }
}

pub struct ConversationSynchronizer {
    api: Arc<dyn ChatApi>,
    connector: Arc<dyn FeedConnector>,
    store: ConversationStore,
    displayed: MessageSequence,
    compose: String,
    active: Option<ActiveConversation>,
    next_selection: u64,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl ConversationSynchronizer {
    pub fn new(api: Arc<dyn ChatApi>, connector: Arc<dyn FeedConnector>) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            api,
            connector,
            store: ConversationStore::default(),
            displayed: MessageSequence::default(),
            compose: String::new(),
            active: None,
            next_selection: 0,
            completions_tx,
            completions_rx,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.displayed.as_slice()
    }

    pub fn cached(&self, conversation: &ConversationRef) -> Option<&[ChatMessage]> {
        self.store.get(conversation).map(MessageSequence::as_slice)
    }

    pub fn active_conversation(&self) -> Option<&ConversationRef> {
        self.active.as_ref().map(|active| &active.conversation)
    }

    pub fn membership(&self) -> Option<Membership> {
        self.active.as_ref().map(|active| active.membership)
    }

    pub fn feed_state(&self) -> ConnectionState {
        self.active
            .as_ref()
            .and_then(|active| active.feed.as_ref())
            .map(LiveFeedConnection::state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn compose_text(&self) -> &str {
        &self.compose
    }

    pub fn set_compose_text(&mut self, text: impl Into<String>) {
        self.compose = text.into();
    }

    /// Groups start with unknown membership; direct threads are always live.
    pub fn select_conversation(&mut self, conversation: ConversationRef) {
        let membership = if conversation.is_group() {
            Membership::Unknown
        } else {
            Membership::Member
        };
        self.select(conversation, membership);
    }

    pub fn select_group(&mut self, group_id: GroupId, membership: Membership) {
        self.select(ConversationRef::Group(group_id), membership);
    }

    pub fn select_direct(&mut self, username: impl Into<String>) {
        self.select(ConversationRef::Direct(username.into()), Membership::Member);
    }

    /// Updates the membership of the active group. Has no effect when `group_id`
    /// is not the active conversation or the membership did not change.
    pub fn resolve_membership(&mut self, group_id: GroupId, membership: Membership) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.conversation != ConversationRef::Group(group_id) || active.membership == membership
        {
            return;
        }

        info!(group_id = group_id.0, ?membership, "group membership resolved");
        active.disconnect();
        active.membership = membership;
        self.next_selection += 1;
        active.selection = SelectionToken(self.next_selection);
        self.displayed.clear();
        if membership == Membership::Member {
            self.activate();
        }
    }

    pub fn clear_selection(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.disconnect();
            debug!(conversation = %active.conversation, "conversation deselected");
        }
        self.displayed.clear();
        self.compose.clear();
    }

    fn bump_selection(&mut self) -> SelectionToken {
        self.next_selection += 1;
        SelectionToken(self.next_selection)
    }

    fn select(&mut self, conversation: ConversationRef, membership: Membership) {
        if let Some(mut previous) = self.active.take() {
            previous.disconnect();
            if previous.conversation != conversation {
                self.compose.clear();
            }
        }
        self.displayed.clear();

        let selection = self.bump_selection();
        info!(%conversation, ?membership, "conversation selected");
        self.active = Some(ActiveConversation {
            conversation,
            selection,
            membership,
            feed: None,
            feed_rx: None,
        });

        if membership == Membership::Member {
            self.activate();
        }
    }

    /// Shows the cached sequence, starts the history load and opens the feed.
    fn activate(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };

        if let Some(cached) = self.store.get(&active.conversation) {
            self.displayed = cached.clone();
        }

        let api = Arc::clone(&self.api);
        let completions = self.completions_tx.clone();
        let conversation = active.conversation.clone();
        let selection = active.selection;
        tokio::spawn(async move {
            let result = api.load_history(&conversation).await;
            let _ = completions.send(Completion::HistoryLoaded {
                selection,
                conversation,
                result,
            });
        });

        match self.api.feed_url(&active.conversation) {
            Ok(url) => {
                let (feed_tx, feed_rx) = mpsc::unbounded_channel();
                active.feed = Some(LiveFeedConnection::connect(
                    active.conversation.clone(),
                    url,
                    Arc::clone(&self.connector),
                    feed_tx,
                ));
                active.feed_rx = Some(feed_rx);
            }
            Err(err) => {
                warn!(conversation = %active.conversation, error = %err, "cannot derive live feed url");
            }
        }
    }

    fn displays(&self, conversation: &ConversationRef) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.is_live() && active.conversation == *conversation)
    }

    /// Sends the trimmed compose text to the active conversation. Returns
    /// whether a send was started; empty text, no selection and unconfirmed
    /// group membership are silently ignored.
    pub fn compose_and_send(&mut self) -> bool {
        let content = self.compose.trim();
        if content.is_empty() {
            return false;
        }
        let Some(active) = self.active.as_ref().filter(|active| active.is_live()) else {
            return false;
        };

        let api = Arc::clone(&self.api);
        let completions = self.completions_tx.clone();
        let conversation = active.conversation.clone();
        let content = content.to_string();
        debug!(%conversation, "sending message");
        tokio::spawn(async move {
            let result = api.send_message(&conversation, &content).await;
            let _ = completions.send(Completion::MessageSent {
                conversation,
                result,
            });
        });
        true
    }

    /// Merges a live-feed message. Returns `None` when its id is already
    /// displayed.
    pub fn on_feed_message(&mut self, message: ChatMessage) -> Option<SyncEvent> {
        let conversation = message.conversation.clone();
        let message_id = message.id;
        self.store.merge(&conversation, message.clone());
        if !self.displays(&conversation) || !self.displayed.push_unique(message) {
            return None;
        }
        Some(SyncEvent::MessageAppended {
            conversation,
            message_id,
        })
    }

    /// Waits for the next load/send completion or feed delivery, applies it,
    /// and reports the resulting change.
    pub async fn next_event(&mut self) -> SyncEvent {
        loop {
            let incoming = {
                let feed_rx = self
                    .active
                    .as_mut()
                    .and_then(|active| active.feed_rx.as_mut());
                tokio::select! {
                    Some(completion) = self.completions_rx.recv() => Incoming::Completion(completion),
                    message = recv_feed(feed_rx) => Incoming::Feed(message),
                }
            };

            let event = match incoming {
                Incoming::Completion(completion) => self.apply_completion(completion),
                Incoming::Feed(Some(message)) => self.on_feed_message(message),
                Incoming::Feed(None) => {
                    if let Some(active) = self.active.as_mut() {
                        active.feed_rx = None;
                    }
                    None
                }
            };
            if let Some(event) = event {
                return event;
            }
        }
    }

    fn apply_completion(&mut self, completion: Completion) -> Option<SyncEvent> {
        match completion {
            Completion::HistoryLoaded {
                selection,
                conversation,
                result,
            } => {
                let current = self.active.as_ref().map(|active| active.selection);
                if current != Some(selection) {
                    debug!(%conversation, "discarding stale history load");
                    return None;
                }
                match result {
                    Ok(snapshot) => {
                        let sequence = MessageSequence::from_snapshot(snapshot);
                        let count = sequence.len();
                        self.store.replace(conversation.clone(), sequence.clone());
                        self.displayed = sequence;
                        Some(SyncEvent::HistoryLoaded {
                            conversation,
                            count,
                        })
                    }
                    Err(err) => {
                        warn!(%conversation, error = %err, "history load failed");
                        Some(SyncEvent::Error {
                            conversation,
                            message: err.display_message(LOAD_MESSAGES_FALLBACK),
                        })
                    }
                }
            }
            Completion::MessageSent {
                conversation,
                result,
            } => match result {
                Ok(message) => {
                    let message_id = message.id;
                    self.store.merge(&conversation, message.clone());
                    if self.displays(&conversation) {
                        self.displayed.push_unique(message);
                    }
                    // Switching away already cleared the buffer; text in it
                    // now belongs to another conversation.
                    if self.active_conversation() == Some(&conversation) {
                        self.compose.clear();
                    }
                    Some(SyncEvent::MessageSent {
                        conversation,
                        message_id,
                    })
                }
                Err(err) => {
                    warn!(%conversation, error = %err, "send failed");
                    Some(SyncEvent::Error {
                        conversation,
                        message: err.display_message(SEND_MESSAGE_FALLBACK),
                    })
                }
            },
        }
    }
}

async fn recv_feed(rx: Option<&mut mpsc::UnboundedReceiver<ChatMessage>>) -> Option<ChatMessage> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "tests/synchronizer_tests.rs"]
mod tests;
