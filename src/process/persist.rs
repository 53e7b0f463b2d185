//! Conversation messages as stored rows, built from UI events.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::{ToolGroupItem, UiEvent, UiPayload};
use crate::error::Result;

/// Which side of the transcript a message renders on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePosition {
    Left,
    Right,
    Center,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum StoredContent {
    Text(String),
    ToolGroup(Vec<ToolGroupItem>),
    Tips(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub msg_id: String,
    pub position: MessagePosition,
    pub content: StoredContent,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    fn new(
        conversation_id: &str,
        msg_id: &str,
        position: MessagePosition,
        content: StoredContent,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            msg_id: msg_id.to_string(),
            position,
            content,
            created_at: Utc::now(),
        }
    }

    /// The user's own message.
    pub fn user(conversation_id: &str, msg_id: &str, text: impl Into<String>) -> Self {
        Self::new(
            conversation_id,
            msg_id,
            MessagePosition::Right,
            StoredContent::Text(text.into()),
        )
    }

    /// Row for a UI event, if the event is persisted at all.
    ///
    /// Lifecycle markers, thoughts and previews are transient.
    pub fn from_event(conversation_id: &str, event: &UiEvent) -> Option<Self> {
        let (position, content) = match &event.payload {
            UiPayload::Content(text) => (MessagePosition::Left, StoredContent::Text(text.clone())),
            UiPayload::ToolGroup(items) => {
                (MessagePosition::Left, StoredContent::ToolGroup(items.clone()))
            }
            UiPayload::Error(message) => {
                (MessagePosition::Center, StoredContent::Tips(message.clone()))
            }
            UiPayload::Start
            | UiPayload::Finish(_)
            | UiPayload::Thought(_)
            | UiPayload::PreviewOpen { .. } => return None,
        };
        Some(Self::new(conversation_id, &event.msg_id, position, content))
    }

    fn same_slot(&self, other: &StoredMessage) -> bool {
        self.msg_id == other.msg_id
            && self.position == other.position
            && matches!(
                (&self.content, &other.content),
                (StoredContent::Text(_), StoredContent::Text(_))
                    | (StoredContent::ToolGroup(_), StoredContent::ToolGroup(_))
            )
    }
}

/// Fold `incoming` into `messages`.
///
/// Streamed text for one message accumulates into a single row; tool-group
/// items merge by call id so status updates replace earlier snapshots; tips
/// always get their own row.
pub fn compose_message(messages: &mut Vec<StoredMessage>, incoming: StoredMessage) {
    let Some(existing) = messages.iter_mut().rev().find(|m| m.same_slot(&incoming)) else {
        messages.push(incoming);
        return;
    };
    match (&mut existing.content, incoming.content) {
        (StoredContent::Text(text), StoredContent::Text(more)) => text.push_str(&more),
        (StoredContent::ToolGroup(items), StoredContent::ToolGroup(updates)) => {
            for update in updates {
                match items.iter_mut().find(|i| i.call_id == update.call_id) {
                    Some(item) => *item = update,
                    None => items.push(update),
                }
            }
        }
        (current, content) => *current = content,
    }
}

/// Message persistence used by the process manager.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn record(&self, message: StoredMessage) -> Result<()>;

    async fn messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>>;

    async fn clear(&self, conversation_id: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    conversations: Mutex<HashMap<String, Vec<StoredMessage>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn record(&self, message: StoredMessage) -> Result<()> {
        let mut conversations = self.conversations.lock()?;
        let messages = conversations
            .entry(message.conversation_id.clone())
            .or_default();
        compose_message(messages, message);
        Ok(())
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        Ok(self
            .conversations
            .lock()?
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        self.conversations.lock()?.remove(conversation_id);
        Ok(())
    }
}
