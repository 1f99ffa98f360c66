use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type MessageId = i64;

/// Counterpart identity as returned by the backend (thread header, search results,
/// conversation entries).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub organization_name: Option<String>,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl UserSummary {
    /// Blood banks and hospitals are shown by organization name, donors by their own.
    pub fn display_name(&self) -> &str {
        match self.organization_name.as_deref() {
            Some(org) if !org.trim().is_empty() => org,
            _ => &self.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub body: String,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    /// Set only on optimistic entries; `id` is then a local placeholder.
    #[serde(skip)]
    pub pending: bool,
}

impl ChatMessage {
    /// Builds the local entry shown while a send is in flight.
    pub fn optimistic(placeholder: MessageId, from: UserId, to: UserId, body: String) -> Self {
        Self {
            id: placeholder,
            from_user_id: from,
            to_user_id: to,
            body,
            is_read: false,
            created_at: Utc::now(),
            pending: true,
        }
    }

    /// True when this message belongs to the thread between `a` and `b`, in either direction.
    pub fn is_between(&self, a: UserId, b: UserId) -> bool {
        (self.from_user_id == a && self.to_user_id == b)
            || (self.from_user_id == b && self.to_user_id == a)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(alias = "other_user")]
    pub user: UserSummary,
    #[serde(default)]
    pub last_message: Option<ChatMessage>,
    #[serde(default)]
    pub unread_count: u32,
}

/// `{ "data": ... }` wrapper used by the list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadResponse {
    pub data: Vec<ChatMessage>,
    pub other_user: UserSummary,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct UnreadCount {
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest<'a> {
    pub body: &'a str,
}
