use crate::client::models::api_types::{Conversation, MessageId, ThreadResponse, UserId, UserSummary};
use crate::client::services::messaging_api::ApiError;

/// Why a thread fetch was issued; decides how its result is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// User opened a chat: blocking loader, replaces the active chat on success.
    Select,
    /// Background or manual refresh: applied only when the thread changed.
    Refresh { show_loading: bool },
    /// Follow-up of a successful send: replaces the thread with server truth.
    Reconcile,
}

/// Tag carried by every thread fetch. A result is applied only while its
/// generation is still the current one and its user is still the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadTicket {
    pub generation: u64,
    pub user_id: UserId,
    pub kind: FetchKind,
}

#[derive(Debug, Clone)]
pub enum Message {
    // Conversation list
    LoadConversations { show_loading: bool },
    ConversationsLoaded { seq: u64, result: Result<Vec<Conversation>, ApiError> },
    // Active chat
    SelectChat(UserId),
    RefreshActiveThread { show_loading: bool },
    ThreadLoaded { ticket: ThreadTicket, result: Result<ThreadResponse, ApiError> },
    InputChanged(String),
    SendMessage(String),
    /// Sends whatever is currently in the composer.
    SendDraft,
    SendCompleted { to: UserId, placeholder: MessageId, draft: String, result: Result<(), ApiError> },
    // User search
    SearchQueryChanged(String),
    SearchTimerElapsed { seq: u64 },
    SearchCompleted { seq: u64, result: Result<Vec<UserSummary>, ApiError> },
    SelectSearchResult(UserSummary),
    // Read state
    MarkAllRead,
    MarkAllReadCompleted(Result<(), ApiError>),
    RefreshUnreadCount,
    UnreadCountLoaded(Result<u32, ApiError>),
    // Fired by the polling interval while the view is mounted
    PollTick,
}
