use anyhow::Context;
use donor_chat::client::config::ClientConfig;
use donor_chat::client::services::messaging_api::{HttpMessagingApi, MessagingApi};
use donor_chat::client::session::SessionContext;
use donor_chat::client::utils::session_store;

/// Checks the messaging endpoints against a live backend with the stored
/// (or env-provided) credential. Optional first argument: a search query.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = ClientConfig::from_env();
    std::env::set_var("RUST_LOG", &cfg.log_level);
    env_logger::init();

    let session = match (cfg.current_user_id, cfg.api_token.clone()) {
        (Some(id), Some(token)) => SessionContext::new(id, token),
        _ => session_store::load_session().context("no session available")?,
    };
    println!("Using {} as user {}", cfg.api_base_url, session.user_id);

    let api = HttpMessagingApi::new(cfg.api_base_url.clone(), session, cfg.request_timeout)?;

    let conversations = api.conversations().await.context("listing conversations")?;
    println!("CONVERSATIONS -> {}", conversations.len());
    for conv in &conversations {
        println!("  {} {} unread={}", conv.user.id, conv.user.display_name(), conv.unread_count);
    }

    let unread = api.unread_count().await.context("fetching unread count")?;
    println!("UNREAD -> {}", unread);

    if let Some(query) = std::env::args().nth(1) {
        let users = api.search_users(&query).await.context("searching users")?;
        println!("SEARCH '{}' -> {}", query, users.len());
        for user in users {
            println!("  {} {} ({})", user.id, user.display_name(), user.role);
        }
    }

    Ok(())
}
