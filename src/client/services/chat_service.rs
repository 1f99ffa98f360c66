use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::config::ClientConfig;
use crate::client::models::api_types::{UserId, UserSummary};
use crate::client::models::app_state::{Command, MessagingState};
use crate::client::models::messages::Message;
use crate::client::services::messaging_api::MessagingApi;
use crate::client::services::notifier::Notifier;
use crate::client::session::SessionContext;

/// A mounted Messages view.
///
/// All state lives in a single background task that applies `Message`s to a
/// `MessagingState` one at a time; network calls run as separate tasks and
/// report back through the same channel. Every public method only enqueues a
/// message, so callers never wait on the network. Snapshots of the state are
/// published after each update and can be read with [`MessagingView::state`]
/// or observed with [`MessagingView::watch`].
pub struct MessagingView {
    tx: mpsc::UnboundedSender<Message>,
    state: watch::Receiver<MessagingState>,
    shutdown: CancellationToken,
    bg: Option<JoinHandle<()>>,
    poll: Option<JoinHandle<()>>,
}

impl MessagingView {
    /// Starts the view: initial (visible) conversation load, unread counter,
    /// and the background poll. Must be called inside a tokio runtime.
    pub fn mount(
        session: &SessionContext,
        api: Arc<dyn MessagingApi>,
        notifier: Arc<dyn Notifier>,
        config: &ClientConfig,
    ) -> Self {
        let state = MessagingState::new(session.user_id, config);
        let (state_tx, state_rx) = watch::channel(state.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let executor = Executor {
            api,
            notifier,
            tx: tx.clone(),
            chat_session: shutdown.child_token(),
            shutdown: shutdown.clone(),
            search_timer: None,
            debounce: config.search_debounce,
        };

        let bg = tokio::spawn(run(state, rx, state_tx, executor));
        let poll = tokio::spawn(poll_loop(tx.clone(), config.poll_interval, shutdown.clone()));
        info!("Messages view mounted for user {} (poll every {:?})", session.user_id, config.poll_interval);

        let view = Self { tx, state: state_rx, shutdown, bg: Some(bg), poll: Some(poll) };
        view.post(Message::LoadConversations { show_loading: true });
        view.post(Message::RefreshUnreadCount);
        view
    }

    fn post(&self, message: Message) {
        if self.tx.send(message).is_err() {
            debug!("Messages view already stopped, dropping event");
        }
    }

    pub fn state(&self) -> MessagingState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<MessagingState> {
        self.state.clone()
    }

    pub fn load_conversations(&self, show_loading: bool) {
        self.post(Message::LoadConversations { show_loading });
    }

    pub fn select_chat(&self, user_id: UserId) {
        self.post(Message::SelectChat(user_id));
    }

    pub fn refresh_active_thread(&self, show_loading: bool) {
        self.post(Message::RefreshActiveThread { show_loading });
    }

    pub fn set_input(&self, text: impl Into<String>) {
        self.post(Message::InputChanged(text.into()));
    }

    pub fn send_message(&self, body: impl Into<String>) {
        self.post(Message::SendMessage(body.into()));
    }

    pub fn send_draft(&self) {
        self.post(Message::SendDraft);
    }

    pub fn set_query(&self, text: impl Into<String>) {
        self.post(Message::SearchQueryChanged(text.into()));
    }

    pub fn select_result(&self, user: UserSummary) {
        self.post(Message::SelectSearchResult(user));
    }

    pub fn mark_all_read(&self) {
        self.post(Message::MarkAllRead);
    }

    pub fn refresh_unread_count(&self) {
        self.post(Message::RefreshUnreadCount);
    }

    /// Unmounts the view: stops polling, cancels in-flight requests and the
    /// pending search timer, and waits for the state task to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(bg) = self.bg.take() {
            let _ = bg.await;
        }
        info!("Messages view unmounted");
    }

    fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(poll) = self.poll.take() {
            poll.abort();
        }
    }
}

impl Drop for MessagingView {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    mut state: MessagingState,
    mut rx: mpsc::UnboundedReceiver<Message>,
    state_tx: watch::Sender<MessagingState>,
    mut executor: Executor,
) {
    loop {
        let message = tokio::select! {
            _ = executor.shutdown.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let commands = state.update(message);
        state_tx.send_replace(state.clone());
        for command in commands {
            executor.execute(command);
        }
    }

    executor.cancel_search_timer();
    debug!("Messages state loop stopped");
}

async fn poll_loop(tx: mpsc::UnboundedSender<Message>, period: Duration, shutdown: CancellationToken) {
    // first tick one period after mount; the mount itself already loads
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if tx.send(Message::PollTick).is_err() {
                    break;
                }
            }
        }
    }
}

struct Executor {
    api: Arc<dyn MessagingApi>,
    notifier: Arc<dyn Notifier>,
    tx: mpsc::UnboundedSender<Message>,
    shutdown: CancellationToken,
    /// Child of `shutdown`, replaced on every chat selection.
    chat_session: CancellationToken,
    search_timer: Option<JoinHandle<()>>,
    debounce: Duration,
}

impl Executor {
    fn execute(&mut self, command: Command) {
        match command {
            Command::FetchConversations { seq } => {
                let api = self.api.clone();
                self.spawn(self.shutdown.clone(), async move {
                    Message::ConversationsLoaded { seq, result: api.conversations().await }
                });
            }
            Command::StartChatSession => {
                self.chat_session.cancel();
                self.chat_session = self.shutdown.child_token();
            }
            Command::FetchThread { ticket } => {
                let api = self.api.clone();
                self.spawn(self.chat_session.clone(), async move {
                    Message::ThreadLoaded { ticket, result: api.thread(ticket.user_id).await }
                });
            }
            Command::SendMessage { to, placeholder, body, draft } => {
                // a send outlives chat switches; only unmount stops it
                let api = self.api.clone();
                self.spawn(self.shutdown.clone(), async move {
                    let result = api.send_message(to, &body).await;
                    Message::SendCompleted { to, placeholder, draft, result }
                });
            }
            Command::ScheduleSearch { seq } => {
                self.cancel_search_timer();
                let tx = self.tx.clone();
                let delay = self.debounce;
                let shutdown = self.shutdown.clone();
                self.search_timer = Some(tokio::spawn(async move {
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        _ = sleep(delay) => {
                            let _ = tx.send(Message::SearchTimerElapsed { seq });
                        }
                    }
                }));
            }
            Command::CancelSearchTimer => self.cancel_search_timer(),
            Command::SearchUsers { seq, query } => {
                let api = self.api.clone();
                self.spawn(self.shutdown.clone(), async move {
                    Message::SearchCompleted { seq, result: api.search_users(&query).await }
                });
            }
            Command::MarkAllRead => {
                let api = self.api.clone();
                self.spawn(self.shutdown.clone(), async move {
                    Message::MarkAllReadCompleted(api.mark_all_read().await)
                });
            }
            Command::FetchUnreadCount => {
                let api = self.api.clone();
                self.spawn(self.shutdown.clone(), async move {
                    Message::UnreadCountLoaded(api.unread_count().await)
                });
            }
            Command::Notify(notice) => self.notifier.notify(notice),
        }
    }

    /// Runs `request` until it resolves or `token` is cancelled; only a
    /// resolved request reports back.
    fn spawn<F>(&self, token: CancellationToken, request: F)
    where
        F: Future<Output = Message> + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => debug!("Request cancelled"),
                message = request => {
                    let _ = tx.send(message);
                }
            }
        });
    }

    fn cancel_search_timer(&mut self) {
        if let Some(timer) = self.search_timer.take() {
            timer.abort();
        }
    }
}
