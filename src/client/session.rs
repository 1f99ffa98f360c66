use crate::client::models::api_types::UserId;

/// Signed-in identity handed to the messaging core. Built once at sign-in and
/// dropped at sign-out; nothing in the core reads credentials from globals.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: UserId,
    token: String,
}

impl SessionContext {
    pub fn new(user_id: UserId, token: impl Into<String>) -> Self {
        Self { user_id, token: token.into() }
    }

    pub fn bearer_token(&self) -> &str {
        &self.token
    }
}

// keep tokens out of logs
impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_token() {
        let session = SessionContext::new(4, "secret-token");
        let out = format!("{:?}", session);
        assert!(out.contains("user_id: 4"));
        assert!(!out.contains("secret-token"));
    }
}
