//! User credentials resolved once per run at admission time.

use std::collections::HashMap;

/// Credentials used to authorize resource operations during execution.
///
/// Resolved by an injected resolver when a run is admitted; never
/// persisted by the scheduler.
#[derive(Clone, Default)]
pub struct UserCredentials {
    /// Email of the user the credentials belong to.
    pub owner: String,
    /// Opaque per-provider secrets (API keys, tokens).
    secrets: HashMap<String, String>,
}

impl UserCredentials {
    pub fn for_owner(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            secrets: HashMap::new(),
        }
    }

    pub fn with_secret(mut self, provider: &str, secret: &str) -> Self {
        self.secrets.insert(provider.to_string(), secret.to_string());
        self
    }

    /// Secret for a provider, if one was supplied.
    pub fn secret(&self, provider: &str) -> Option<&str> {
        self.secrets.get(provider).map(String::as_str)
    }
}

// Secrets stay out of log output.
impl std::fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentials")
            .field("owner", &self.owner)
            .field("secrets", &format_args!("[{} redacted]", self.secrets.len()))
            .finish()
    }
}
