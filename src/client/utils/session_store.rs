use std::path::PathBuf;

use anyhow::Context;
use keyring::Entry;

use crate::client::session::SessionContext;

const SERVICE: &str = "donor_chat";
const USER: &str = "donor_chat_session";

fn fallback_enabled() -> bool {
    std::env::var("KEYRING_FALLBACK").unwrap_or_default() == "true"
}

fn fallback_path() -> PathBuf {
    PathBuf::from("data").join("session_token.txt")
}

/// Stored form is `<user_id>:<token>` so the messaging view can be mounted
/// without another round-trip to the backend.
fn encode(session: &SessionContext) -> String {
    format!("{}:{}", session.user_id, session.bearer_token())
}

fn decode(raw: &str) -> Option<SessionContext> {
    let (id, token) = raw.trim().split_once(':')?;
    let user_id = id.parse().ok()?;
    if token.is_empty() {
        return None;
    }
    Some(SessionContext::new(user_id, token))
}

pub fn save_session(session: &SessionContext) -> anyhow::Result<()> {
    let value = encode(session);
    let entry = Entry::new(SERVICE, USER);
    match entry.set_password(&value) {
        Ok(()) => Ok(()),
        Err(e) => {
            // only fall back to a plain file when explicitly allowed
            if !fallback_enabled() {
                return Err(anyhow::anyhow!("keyring unavailable ({}) and file fallback disabled", e));
            }
            let path = fallback_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).context("creating session fallback directory")?;
            }
            std::fs::write(&path, value).context("writing session fallback file")?;
            log::warn!("Keyring unavailable, persisted session to fallback file");
            Ok(())
        }
    }
}

pub fn load_session() -> Option<SessionContext> {
    let entry = Entry::new(SERVICE, USER);
    match entry.get_password() {
        Ok(raw) => decode(&raw),
        Err(_) if fallback_enabled() => {
            let raw = std::fs::read_to_string(fallback_path()).ok()?;
            decode(&raw)
        }
        Err(_) => None,
    }
}

pub fn clear_session() -> anyhow::Result<()> {
    let entry = Entry::new(SERVICE, USER);
    let _ = entry.delete_password();
    if fallback_enabled() {
        let path = fallback_path();
        if path.exists() {
            std::fs::remove_file(&path).context("removing session fallback file")?;
        }
    }
    Ok(())
}
