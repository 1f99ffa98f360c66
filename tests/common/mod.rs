#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::oneshot;

use donor_chat::client::config::ClientConfig;
use donor_chat::client::models::api_types::{ChatMessage, Conversation, ThreadResponse, UserId, UserSummary};
use donor_chat::client::models::app_state::MessagingState;
use donor_chat::client::models::ui_state::Notice;
use donor_chat::client::services::chat_service::MessagingView;
use donor_chat::client::services::messaging_api::{ApiError, MessagingApi};
use donor_chat::client::services::notifier::Notifier;
use donor_chat::client::session::SessionContext;

pub const ME: UserId = 1;
pub const BANK: UserId = 2;
pub const HOSPITAL: UserId = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Conversations,
    Thread(UserId),
    Send(UserId, String),
    MarkAllRead,
    UnreadCount,
    Search(String),
}

#[derive(Default)]
struct Backend {
    users: Vec<UserSummary>,
    messages: Vec<ChatMessage>,
    next_id: i64,
    calls: Vec<Call>,
    failing_threads: Vec<UserId>,
    thread_delays: HashMap<UserId, Duration>,
}

/// In-memory stand-in for the REST backend. Opening a thread marks the
/// counterpart's messages as read, as the real server does.
#[derive(Default)]
pub struct FakeApi {
    backend: Mutex<Backend>,
    send_gate: Mutex<Option<oneshot::Receiver<bool>>>,
}

pub fn user(id: UserId, name: &str, org: Option<&str>) -> UserSummary {
    UserSummary {
        id,
        name: name.to_string(),
        organization_name: org.map(str::to_string),
        role: if org.is_some() { "blood_bank".into() } else { "donor".into() },
        avatar: None,
    }
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        let api = Self::default();
        {
            let mut b = api.backend.lock().unwrap();
            b.next_id = 100;
            b.users = vec![
                user(ME, "Dana Donor", None),
                user(BANK, "Ana", Some("City Blood Bank")),
                user(HOSPITAL, "Luca", Some("St. Mary Hospital")),
                user(4, "Blanca Ruiz", None),
            ];
        }
        Arc::new(api)
    }

    /// Stores a message as if it had been persisted earlier.
    pub fn seed(&self, from: UserId, to: UserId, body: &str, is_read: bool) {
        let mut b = self.backend.lock().unwrap();
        b.next_id += 1;
        let id = b.next_id;
        b.messages.push(ChatMessage {
            id,
            from_user_id: from,
            to_user_id: to,
            body: body.to_string(),
            is_read,
            created_at: Utc.timestamp_opt(1_700_000_000 + id, 0).unwrap(),
            pending: false,
        });
    }

    /// The next send waits until the returned sender decides its outcome.
    pub fn hold_next_send(&self) -> oneshot::Sender<bool> {
        let (tx, rx) = oneshot::channel();
        *self.send_gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn fail_thread(&self, user_id: UserId) {
        self.backend.lock().unwrap().failing_threads.push(user_id);
    }

    pub fn delay_thread(&self, user_id: UserId, delay: Duration) {
        self.backend.lock().unwrap().thread_delays.insert(user_id, delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.backend.lock().unwrap().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.backend.lock().unwrap().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn searches(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Search(q) => Some(q),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.backend.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl MessagingApi for FakeApi {
    async fn conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        self.record(Call::Conversations);
        let b = self.backend.lock().unwrap();
        let mut out: Vec<Conversation> = Vec::new();
        for other in b.users.iter().filter(|u| u.id != ME) {
            let thread: Vec<&ChatMessage> = b.messages.iter().filter(|m| m.is_between(ME, other.id)).collect();
            let Some(last) = thread.last() else { continue };
            out.push(Conversation {
                user: other.clone(),
                last_message: Some((*last).clone()),
                unread_count: thread.iter().filter(|m| m.to_user_id == ME && !m.is_read).count() as u32,
            });
        }
        Ok(out)
    }

    async fn thread(&self, other_user: UserId) -> Result<ThreadResponse, ApiError> {
        self.record(Call::Thread(other_user));
        let delay = self.backend.lock().unwrap().thread_delays.get(&other_user).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut b = self.backend.lock().unwrap();
        if b.failing_threads.contains(&other_user) {
            return Err(ApiError::Status { status: 500, body: "boom".into() });
        }
        let other = b
            .users
            .iter()
            .find(|u| u.id == other_user)
            .cloned()
            .ok_or(ApiError::Status { status: 404, body: "no such user".into() })?;
        for m in b.messages.iter_mut().filter(|m| m.from_user_id == other_user && m.to_user_id == ME) {
            m.is_read = true;
        }
        let data = b.messages.iter().filter(|m| m.is_between(ME, other_user)).cloned().collect();
        Ok(ThreadResponse { data, other_user: other })
    }

    async fn send_message(&self, to: UserId, body: &str) -> Result<(), ApiError> {
        self.record(Call::Send(to, body.to_string()));
        let gate = self.send_gate.lock().unwrap().take();
        let accepted = match gate {
            Some(rx) => rx.await.unwrap_or(false),
            None => true,
        };
        if !accepted {
            return Err(ApiError::Transport("connection reset".into()));
        }
        self.seed(ME, to, body, false);
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.record(Call::MarkAllRead);
        let mut b = self.backend.lock().unwrap();
        for m in b.messages.iter_mut().filter(|m| m.to_user_id == ME) {
            m.is_read = true;
        }
        Ok(())
    }

    async fn unread_count(&self) -> Result<u32, ApiError> {
        self.record(Call::UnreadCount);
        let b = self.backend.lock().unwrap();
        Ok(b.messages.iter().filter(|m| m.to_user_id == ME && !m.is_read).count() as u32)
    }

    async fn search_users(&self, query: &str) -> Result<Vec<UserSummary>, ApiError> {
        self.record(Call::Search(query.to_string()));
        let needle = query.to_lowercase();
        let b = self.backend.lock().unwrap();
        Ok(b.users
            .iter()
            .filter(|u| u.display_name().to_lowercase().contains(&needle) || u.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

pub fn mount(api: &Arc<FakeApi>) -> (MessagingView, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let view = MessagingView::mount(
        &SessionContext::new(ME, "test-token"),
        api.clone(),
        notifier.clone(),
        &ClientConfig::default(),
    );
    (view, notifier)
}

/// Waits (on the paused test clock) until the published state satisfies `pred`.
pub async fn settle(view: &MessagingView, pred: impl FnMut(&MessagingState) -> bool) -> MessagingState {
    let mut rx = view.watch();
    let state = tokio::time::timeout(Duration::from_secs(60), rx.wait_for(pred))
        .await
        .expect("state did not settle in time")
        .expect("view stopped");
    let snapshot = state.clone();
    drop(state);
    snapshot
}
