use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

use donor_chat::client::config::ClientConfig;
use donor_chat::client::models::app_state::{ChatPhase, MessagingState};
use donor_chat::client::models::ui_state::Notice;
use donor_chat::client::services::chat_service::MessagingView;
use donor_chat::client::services::messaging_api::HttpMessagingApi;
use donor_chat::client::services::notifier::Notifier;
use donor_chat::client::session::SessionContext;
use donor_chat::client::utils::session_store;

struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        println!("{} {}", notice.emoji(), notice.message);
    }
}

const HELP: &str = "\
Commands:
  /list              show conversations
  /open <user_id>    open a chat
  /search <text>     search users to start a chat
  /pick <n>          open the n-th search result
  /refresh           reload conversations and the open chat
  /read-all          mark every message as read
  /unread            show the unread counter
  /logout            forget the stored session and quit
  /quit              exit
Anything else is sent to the open chat.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ClientConfig::from_env();
    std::env::set_var("RUST_LOG", &config.log_level);
    env_logger::init();

    let session = resolve_session(&config)?;
    let api = HttpMessagingApi::new(config.api_base_url.clone(), session.clone(), config.request_timeout)
        .context("building HTTP client")?;
    let view = MessagingView::mount(&session, Arc::new(api), Arc::new(ConsoleNotifier), &config);

    let printer = tokio::spawn(print_updates(view.watch()));
    println!("Connected to {} as user {}. Type /help for commands.", config.api_base_url, session.user_id);

    let mut input = BufReader::new(stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        let Some(line) = input.next_line().await? else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, arg) = line.split_once(' ').map(|(c, a)| (c, a.trim())).unwrap_or((line, ""));
        match command {
            "/help" => println!("{}", HELP),
            "/quit" => break,
            "/logout" => {
                session_store::clear_session()?;
                println!("Session cleared.");
                break;
            }
            "/list" => print_conversations(&view.state()),
            "/open" => match arg.parse() {
                Ok(id) => view.select_chat(id),
                Err(_) => println!("Usage: /open <user_id>"),
            },
            "/search" => view.set_query(arg),
            "/pick" => {
                let state = view.state();
                let picked = arg
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| state.search_results().get(i).cloned());
                match picked {
                    Some(user) => view.select_result(user),
                    None => println!("No such search result."),
                }
            }
            "/refresh" => {
                view.load_conversations(true);
                view.refresh_active_thread(true);
                view.refresh_unread_count();
            }
            "/read-all" => view.mark_all_read(),
            "/unread" => {
                match view.state().unread_total() {
                    Some(n) => println!("Unread messages: {}", n),
                    None => println!("Unread counter not loaded yet."),
                }
                // next /unread shows the fresh value
                view.refresh_unread_count();
            }
            _ if command.starts_with('/') => println!("Unknown command. Type /help."),
            _ => {
                if view.state().active_user().is_none() {
                    println!("Open a chat first (/open <user_id> or /search).");
                    continue;
                }
                view.send_message(line);
            }
        }
    }

    view.shutdown().await;
    printer.abort();
    Ok(())
}

fn resolve_session(config: &ClientConfig) -> anyhow::Result<SessionContext> {
    if let (Some(user_id), Some(token)) = (config.current_user_id, config.api_token.as_ref()) {
        let session = SessionContext::new(user_id, token.clone());
        if let Err(e) = session_store::save_session(&session) {
            log::warn!("Could not persist session: {}", e);
        }
        return Ok(session);
    }
    session_store::load_session()
        .context("no stored session; set CURRENT_USER_ID and API_TOKEN to sign in")
}

fn print_conversations(state: &MessagingState) {
    if state.conversations_loading() {
        println!("(loading conversations...)");
    }
    let visible = state.visible_conversations();
    if visible.is_empty() {
        println!("No conversations.");
        return;
    }
    for conv in visible {
        let active = state.active_user().map(|u| u.id) == Some(conv.user.id);
        let preview = conv.last_message.as_ref().map(|m| m.body.as_str()).unwrap_or("");
        println!(
            "{} [{}] {} ({}) {}{}",
            if active { "*" } else { " " },
            conv.user.id,
            conv.user.display_name(),
            conv.user.role,
            preview,
            if conv.unread_count > 0 { format!("  [{} unread]", conv.unread_count) } else { String::new() },
        );
    }
}

/// Echoes thread changes and search results as they land.
async fn print_updates(mut rx: tokio::sync::watch::Receiver<MessagingState>) {
    let mut shown: HashSet<i64> = HashSet::new();
    let mut open_with = None;
    let mut last_results = Vec::new();

    while rx.changed().await.is_ok() {
        let state = rx.borrow_and_update().clone();

        let active = state.active_user().map(|u| u.id);
        if state.phase() == ChatPhase::Open && active != open_with {
            open_with = active;
            shown.clear();
            if let Some(user) = state.active_user() {
                println!("--- chat with {} ---", user.display_name());
            }
        }

        for msg in state.messages().iter().filter(|m| !m.pending) {
            if shown.insert(msg.id) {
                let who = if msg.from_user_id == state.current_user() { "you" } else { "them" };
                println!("[{}] {}: {}", msg.created_at.format("%H:%M"), who, msg.body);
            }
        }

        let results: Vec<i64> = state.search_results().iter().map(|u| u.id).collect();
        if results != last_results {
            for (i, user) in state.search_results().iter().enumerate() {
                println!("  {}. {} ({})", i + 1, user.display_name(), user.role);
            }
            last_results = results;
        }
    }
}
