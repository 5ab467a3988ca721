//! Realtime credential source.

use std::sync::RwLock;

/// Token the relay authenticates a session with, plus the principal whose
/// sessions share the pairing topic.
#[derive(Clone, PartialEq, Eq)]
pub struct RealtimeCredential {
    pub token: String,
    pub principal_id: String,
}

impl RealtimeCredential {
    pub fn new(token: impl Into<String>, principal_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            principal_id: principal_id.into(),
        }
    }
}

impl std::fmt::Debug for RealtimeCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeCredential")
            .field("token", &"[REDACTED]")
            .field("principal_id", &self.principal_id)
            .finish()
    }
}

/// Session state the relay manager reads its credential from.
pub trait CredentialSource: Send + Sync {
    /// The current realtime credential, or `None` when signed out.
    fn realtime_credential(&self) -> Option<RealtimeCredential>;
}

/// In-memory credential holder, updated by whoever owns the login state.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    current: RwLock<Option<RealtimeCredential>>,
}

impl StaticCredentials {
    pub fn new(credential: Option<RealtimeCredential>) -> Self {
        Self {
            current: RwLock::new(credential),
        }
    }

    pub fn set(&self, credential: RealtimeCredential) {
        if let Ok(mut current) = self.current.write() {
            *current = Some(credential);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut current) = self.current.write() {
            *current = None;
        }
    }
}

impl CredentialSource for StaticCredentials {
    fn realtime_credential(&self) -> Option<RealtimeCredential> {
        self.current.read().ok().and_then(|c| c.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let cred = RealtimeCredential::new("eyJhbGciOi.secret", "user-1");
        let dbg = format!("{cred:?}");
        assert!(!dbg.contains("secret"));
        assert!(dbg.contains("user-1"));
    }

    #[test]
    fn static_credentials_set_and_clear() {
        let creds = StaticCredentials::default();
        assert!(creds.realtime_credential().is_none());

        creds.set(RealtimeCredential::new("t1", "p1"));
        assert_eq!(
            creds.realtime_credential(),
            Some(RealtimeCredential::new("t1", "p1"))
        );

        creds.clear();
        assert!(creds.realtime_credential().is_none());
    }
}
