use std::collections::{BTreeSet, HashSet};

use chrono::Utc;
use log::{debug, info, warn};

use crate::client::config::ClientConfig;
use crate::client::models::api_types::{ChatMessage, Conversation, MessageId, ThreadResponse, UserId, UserSummary};
use crate::client::models::messages::{FetchKind, Message, ThreadTicket};
use crate::client::models::ui_state::Notice;
use crate::client::services::messaging_api::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatPhase {
    #[default]
    Closed,
    Loading,
    Open,
}

/// Side effects requested by `MessagingState::update`. The runtime in
/// `chat_service` executes them and feeds the outcome back as a `Message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    FetchConversations { seq: u64 },
    /// Cancel in-flight thread fetches of the previous chat session.
    StartChatSession,
    FetchThread { ticket: ThreadTicket },
    SendMessage { to: UserId, placeholder: MessageId, body: String, draft: String },
    ScheduleSearch { seq: u64 },
    CancelSearchTimer,
    SearchUsers { seq: u64, query: String },
    MarkAllRead,
    FetchUnreadCount,
    Notify(Notice),
}

/// Cheap change detector for silent refreshes: length alone misses read-flag
/// flips and edits of the tail message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadFingerprint {
    count: usize,
    last_id: Option<MessageId>,
    last_read: Option<bool>,
}

impl ThreadFingerprint {
    pub fn of<'a>(messages: impl IntoIterator<Item = &'a ChatMessage>) -> Self {
        let mut count = 0;
        let mut last = None;
        for msg in messages {
            count += 1;
            last = Some(msg);
        }
        Self {
            count,
            last_id: last.map(|m| m.id),
            last_read: last.map(|m| m.is_read),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessagingState {
    current_user: UserId,
    min_search_len: usize,

    conversations: Vec<Conversation>,
    conversations_loading: bool,
    conversations_issued: u64,
    conversations_applied: u64,
    conversations_loading_seq: u64,

    phase: ChatPhase,
    active_user: Option<UserSummary>,
    loading_target: Option<UserId>,
    messages: Vec<ChatMessage>,
    thread_loading: bool,
    generation: u64,
    input: String,
    in_flight: BTreeSet<MessageId>,
    last_placeholder: MessageId,

    query: String,
    search_results: Vec<UserSummary>,
    is_searching: bool,
    search_seq: u64,

    unread_total: Option<u32>,
}

impl MessagingState {
    pub fn new(current_user: UserId, config: &ClientConfig) -> Self {
        Self {
            current_user,
            min_search_len: config.min_search_len,
            conversations: Vec::new(),
            conversations_loading: false,
            conversations_issued: 0,
            conversations_applied: 0,
            conversations_loading_seq: 0,
            phase: ChatPhase::Closed,
            active_user: None,
            loading_target: None,
            messages: Vec::new(),
            thread_loading: false,
            generation: 0,
            input: String::new(),
            in_flight: BTreeSet::new(),
            last_placeholder: 0,
            query: String::new(),
            search_results: Vec::new(),
            is_searching: false,
            search_seq: 0,
            unread_total: None,
        }
    }

    pub fn current_user(&self) -> UserId {
        self.current_user
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversations_loading(&self) -> bool {
        self.conversations_loading
    }

    /// The list as shown: narrowed by the query while no search dropdown is open.
    pub fn visible_conversations(&self) -> Vec<&Conversation> {
        let needle = self.query.trim().to_lowercase();
        if needle.is_empty() || !self.search_results.is_empty() {
            return self.conversations.iter().collect();
        }
        self.conversations
            .iter()
            .filter(|c| c.user.display_name().to_lowercase().contains(&needle))
            .collect()
    }

    pub fn phase(&self) -> ChatPhase {
        self.phase
    }

    pub fn active_user(&self) -> Option<&UserSummary> {
        self.active_user.as_ref()
    }

    pub fn loading_target(&self) -> Option<UserId> {
        self.loading_target
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn thread_loading(&self) -> bool {
        self.thread_loading
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn search_results(&self) -> &[UserSummary] {
        &self.search_results
    }

    pub fn is_searching(&self) -> bool {
        self.is_searching
    }

    pub fn unread_total(&self) -> Option<u32> {
        self.unread_total
    }

    pub fn update(&mut self, message: Message) -> Vec<Command> {
        match message {
            Message::LoadConversations { show_loading } => self.load_conversations(show_loading),
            Message::ConversationsLoaded { seq, result } => {
                if self.conversations_loading && seq >= self.conversations_loading_seq {
                    self.conversations_loading = false;
                }
                if seq <= self.conversations_applied {
                    debug!("Dropping conversation list #{} (already applied #{})", seq, self.conversations_applied);
                    return Vec::new();
                }
                match result {
                    Ok(list) => {
                        self.conversations = list;
                        self.conversations_applied = seq;
                    }
                    Err(e) => warn!("Failed to load conversations: {}", e),
                }
                Vec::new()
            }
            Message::SelectChat(user_id) => self.select_chat(user_id),
            Message::RefreshActiveThread { show_loading } => self.refresh_active_thread(show_loading),
            Message::ThreadLoaded { ticket, result } => self.apply_thread(ticket, result),
            Message::InputChanged(text) => {
                self.input = text;
                Vec::new()
            }
            Message::SendMessage(draft) => self.send_message(draft),
            Message::SendDraft => {
                let draft = self.input.clone();
                self.send_message(draft)
            }
            Message::SendCompleted { to, placeholder, draft, result } => {
                self.in_flight.remove(&placeholder);
                match result {
                    Ok(()) => {
                        let mut commands = Vec::new();
                        if self.phase == ChatPhase::Open && self.active_id() == Some(to) {
                            commands.push(Command::FetchThread {
                                ticket: self.ticket(to, FetchKind::Reconcile),
                            });
                        }
                        commands.extend(self.load_conversations(false));
                        commands
                    }
                    Err(e) => {
                        warn!("Send to user {} failed: {}", to, e);
                        self.messages.retain(|m| !(m.pending && m.id == placeholder));
                        // the draft belongs to `to`; never hand it to another chat's composer
                        let same_chat = self.phase == ChatPhase::Open && self.active_id() == Some(to);
                        if same_chat && self.input.is_empty() {
                            self.input = draft;
                        } else {
                            info!("Dropping failed draft for user {}", to);
                        }
                        vec![Command::Notify(Notice::error("Message could not be sent. Please try again."))]
                    }
                }
            }
            Message::SearchQueryChanged(text) => {
                self.query = text;
                self.search_seq += 1;
                if self.query.trim().chars().count() < self.min_search_len {
                    self.search_results.clear();
                    self.is_searching = false;
                    return vec![Command::CancelSearchTimer];
                }
                vec![Command::ScheduleSearch { seq: self.search_seq }]
            }
            Message::SearchTimerElapsed { seq } => {
                let query = self.query.trim();
                if seq != self.search_seq || query.chars().count() < self.min_search_len {
                    return Vec::new();
                }
                self.is_searching = true;
                vec![Command::SearchUsers { seq, query: query.to_string() }]
            }
            Message::SearchCompleted { seq, result } => {
                if seq != self.search_seq {
                    debug!("Dropping results of superseded search #{}", seq);
                    return Vec::new();
                }
                self.is_searching = false;
                match result {
                    Ok(users) => {
                        let me = self.current_user;
                        self.search_results = users.into_iter().filter(|u| u.id != me).collect();
                    }
                    Err(e) => warn!("User search failed: {}", e),
                }
                Vec::new()
            }
            Message::SelectSearchResult(user) => {
                self.query.clear();
                self.search_results.clear();
                self.is_searching = false;
                self.search_seq += 1;
                let mut commands = vec![Command::CancelSearchTimer];
                commands.extend(self.select_chat(user.id));
                commands
            }
            Message::MarkAllRead => vec![Command::MarkAllRead],
            Message::MarkAllReadCompleted(result) => match result {
                Ok(()) => {
                    let mut commands = vec![Command::Notify(Notice::success("All messages marked as read"))];
                    commands.extend(self.load_conversations(false));
                    commands.push(Command::FetchUnreadCount);
                    commands
                }
                Err(e) => {
                    warn!("Mark all read failed: {}", e);
                    vec![Command::Notify(Notice::error("Could not mark messages as read"))]
                }
            },
            Message::RefreshUnreadCount => vec![Command::FetchUnreadCount],
            Message::UnreadCountLoaded(result) => {
                match result {
                    Ok(count) => self.unread_total = Some(count),
                    Err(e) => warn!("Failed to load unread count: {}", e),
                }
                Vec::new()
            }
            Message::PollTick => {
                let mut commands = self.load_conversations(false);
                commands.push(Command::FetchUnreadCount);
                commands.extend(self.refresh_active_thread(false));
                commands
            }
        }
    }

    fn active_id(&self) -> Option<UserId> {
        self.active_user.as_ref().map(|u| u.id)
    }

    fn ticket(&self, user_id: UserId, kind: FetchKind) -> ThreadTicket {
        ThreadTicket { generation: self.generation, user_id, kind }
    }

    fn load_conversations(&mut self, show_loading: bool) -> Vec<Command> {
        self.conversations_issued += 1;
        let seq = self.conversations_issued;
        if show_loading {
            self.conversations_loading = true;
            self.conversations_loading_seq = seq;
        }
        vec![Command::FetchConversations { seq }]
    }

    fn select_chat(&mut self, user_id: UserId) -> Vec<Command> {
        self.generation += 1;
        self.phase = ChatPhase::Loading;
        self.loading_target = Some(user_id);
        self.thread_loading = true;
        info!("Opening chat with user {}", user_id);
        vec![
            Command::StartChatSession,
            Command::FetchThread { ticket: self.ticket(user_id, FetchKind::Select) },
        ]
    }

    fn refresh_active_thread(&mut self, show_loading: bool) -> Vec<Command> {
        let Some(user_id) = self.active_id() else {
            return Vec::new();
        };
        if self.phase != ChatPhase::Open {
            return Vec::new();
        }
        if show_loading {
            self.thread_loading = true;
        }
        vec![Command::FetchThread {
            ticket: self.ticket(user_id, FetchKind::Refresh { show_loading }),
        }]
    }

    fn send_message(&mut self, draft: String) -> Vec<Command> {
        let body = draft.trim().to_string();
        if body.is_empty() {
            return Vec::new();
        }
        if self.phase != ChatPhase::Open {
            return Vec::new();
        }
        let Some(to) = self.active_id() else {
            return Vec::new();
        };

        self.input.clear();
        let placeholder = self.next_placeholder();
        self.messages.push(ChatMessage::optimistic(placeholder, self.current_user, to, body.clone()));
        self.in_flight.insert(placeholder);

        vec![Command::SendMessage { to, placeholder, body, draft }]
    }

    /// Millisecond clock, bumped so that two sends in the same millisecond differ.
    fn next_placeholder(&mut self) -> MessageId {
        let now = Utc::now().timestamp_millis();
        self.last_placeholder = now.max(self.last_placeholder + 1);
        self.last_placeholder
    }

    fn apply_thread(&mut self, ticket: ThreadTicket, result: Result<ThreadResponse, ApiError>) -> Vec<Command> {
        if ticket.generation != self.generation {
            debug!("Dropping stale thread for user {} (generation {} != {})", ticket.user_id, ticket.generation, self.generation);
            return Vec::new();
        }

        match ticket.kind {
            FetchKind::Select => {
                if self.loading_target != Some(ticket.user_id) {
                    return Vec::new();
                }
                self.loading_target = None;
                self.thread_loading = false;
                match result {
                    Ok(resp) => {
                        let me = self.current_user;
                        self.messages.retain(|m| m.is_between(me, ticket.user_id));
                        self.replace_messages(normalize_thread(resp.data));
                        self.active_user = Some(resp.other_user);
                        self.phase = ChatPhase::Open;
                        // the server zeroes the unread count once the thread is read
                        self.load_conversations(false)
                    }
                    Err(e) => {
                        warn!("Failed to open chat with user {}: {}", ticket.user_id, e);
                        self.phase = if self.active_user.is_some() { ChatPhase::Open } else { ChatPhase::Closed };
                        vec![Command::Notify(Notice::error("Could not load this conversation"))]
                    }
                }
            }
            FetchKind::Refresh { .. } | FetchKind::Reconcile => {
                if let FetchKind::Refresh { show_loading: true } = ticket.kind {
                    self.thread_loading = false;
                }
                if self.phase != ChatPhase::Open || self.active_id() != Some(ticket.user_id) {
                    return Vec::new();
                }
                match result {
                    Ok(resp) => {
                        let fresh = normalize_thread(resp.data);
                        if ticket.kind == FetchKind::Reconcile || self.thread_changed(&fresh) {
                            self.replace_messages(fresh);
                        }
                    }
                    Err(e) => warn!("Failed to refresh chat with user {}: {}", ticket.user_id, e),
                }
                Vec::new()
            }
        }
    }

    fn thread_changed(&self, fresh: &[ChatMessage]) -> bool {
        let shown = ThreadFingerprint::of(self.messages.iter().filter(|m| !m.pending));
        let stale_pending = self.messages.iter().any(|m| m.pending && !self.in_flight.contains(&m.id));
        stale_pending || shown != ThreadFingerprint::of(fresh)
    }

    /// Server truth plus the optimistic entries whose sends are still in flight.
    fn replace_messages(&mut self, fresh: Vec<ChatMessage>) {
        let in_flight = &self.in_flight;
        let still_pending: Vec<ChatMessage> = self
            .messages
            .drain(..)
            .filter(|m| m.pending && in_flight.contains(&m.id))
            .collect();
        self.messages = fresh;
        self.messages.extend(still_pending);
    }
}

/// Orders a server thread by creation time and drops repeated ids.
fn normalize_thread(mut messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut seen = HashSet::new();
    messages.retain(|m| seen.insert(m.id));
    messages.sort_by_key(|m| m.created_at);
    messages
}
