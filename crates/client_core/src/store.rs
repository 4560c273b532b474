use std::collections::{HashMap, HashSet};

use shared::{
    domain::{ConversationRef, MessageId},
    protocol::ChatMessage,
};

/// Insertion-ordered messages of one conversation, unique by id.
#[derive(Debug, Clone, Default)]
pub struct MessageSequence {
    messages: Vec<ChatMessage>,
    ids: HashSet<MessageId>,
}

impl MessageSequence {
    /// Keeps snapshot order; a repeated id keeps its first occurrence.
    pub fn from_snapshot(snapshot: Vec<ChatMessage>) -> Self {
        let mut sequence = Self::default();
        for message in snapshot {
            sequence.push_unique(message);
        }
        sequence
    }

    /// Appends `message` unless its id is already present. Returns whether it
    /// was appended.
    pub fn push_unique(&mut self, message: ChatMessage) -> bool {
        if !self.ids.insert(message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.ids.contains(&id)
    }

    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn ids(&self) -> impl Iterator<Item = MessageId> + '_ {
        self.messages.iter().map(|message| message.id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }
}

/// Per-conversation message cache. Only the synchronizer mutates it.
#[derive(Debug, Default)]
pub struct ConversationStore {
    sequences: HashMap<ConversationRef, MessageSequence>,
}

impl ConversationStore {
    pub fn get(&self, conversation: &ConversationRef) -> Option<&MessageSequence> {
        self.sequences.get(conversation)
    }

    pub fn replace(&mut self, conversation: ConversationRef, sequence: MessageSequence) {
        self.sequences.insert(conversation, sequence);
    }

    /// Merges one message into the conversation's cache, creating the entry
    /// when the conversation has never been loaded.
    pub fn merge(&mut self, conversation: &ConversationRef, message: ChatMessage) -> bool {
        self.sequences
            .entry(conversation.clone())
            .or_default()
            .push_unique(message)
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use shared::domain::UserId;

    use super::*;

    fn message(id: i64) -> ChatMessage {
        ChatMessage {
            id: MessageId(id),
            conversation: ConversationRef::group(7),
            sender_id: UserId(1),
            sender_display_name: "ada".into(),
            content: format!("m{id}"),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn snapshot_keeps_order_and_first_duplicate() {
        let mut second = message(2);
        second.content = "first".into();
        let mut duplicate = message(2);
        duplicate.content = "second".into();

        let sequence = MessageSequence::from_snapshot(vec![message(5), second, message(1), duplicate]);
        assert_eq!(
            sequence.ids().collect::<Vec<_>>(),
            vec![MessageId(5), MessageId(2), MessageId(1)]
        );
        assert_eq!(sequence.as_slice()[1].content, "first");
    }

    #[test]
    fn push_unique_is_idempotent() {
        let mut sequence = MessageSequence::default();
        assert!(sequence.push_unique(message(3)));
        assert!(!sequence.push_unique(message(3)));
        assert_eq!(sequence.len(), 1);
    }

    #[test]
    fn merge_creates_missing_entry() {
        let mut store = ConversationStore::default();
        let conversation = ConversationRef::direct("bob");
        assert!(store.merge(&conversation, message(1)));
        assert!(!store.merge(&conversation, message(1)));
        assert_eq!(store.get(&conversation).map(MessageSequence::len), Some(1));
    }
}
