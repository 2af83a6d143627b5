use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Bearer token plus the expiry the provider announced for it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    /// Build a credential from a provider's `expiresIn` seconds, counted from now.
    pub fn with_lifetime(token: impl Into<String>, expires_in_secs: Option<i64>) -> Self {
        Self {
            token: token.into(),
            expires_at: expires_in_secs.map(|secs| Utc::now() + Duration::seconds(secs)),
        }
    }

    /// A credential without an expiry hint never counts as expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|at| Utc::now() >= at).unwrap_or(false)
    }

    /// Minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> Option<i64> {
        self.expires_at
            .map(|at| (at - Utc::now()).num_minutes().max(0))
    }
}

// Tokens must never end up in logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Who is signed in. Stored next to the token as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    #[serde(rename = "displayName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "avatarUrl", default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl Identity {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            display_name: None,
            avatar_url: None,
        }
    }

    pub fn display(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// Username (or email) and password typed by the user.
#[derive(Clone)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

impl LoginCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// What a provider hands back after a successful login.
#[derive(Clone)]
pub struct Grant {
    pub credential: Credential,
    pub identity: Identity,
    /// Provider-side renewal secret. Handed back to the provider through
    /// `IdentityProvider::adopt` once the session has been committed.
    pub refresh_token: Option<String>,
}

impl Grant {
    pub fn new(credential: Credential, identity: Identity) -> Self {
        Self {
            credential,
            identity,
            refresh_token: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: Option<String>) -> Self {
        self.refresh_token = refresh_token;
        self
    }
}

impl fmt::Debug for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grant")
            .field("credential", &self.credential)
            .field("identity", &self.identity)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_json_omits_absent_fields() {
        let identity = Identity::new("alice");
        assert_eq!(serde_json::to_string(&identity).unwrap(), r#"{"username":"alice"}"#);

        let full = Identity {
            username: "bob@example.com".into(),
            display_name: Some("Bob".into()),
            avatar_url: None,
        };
        assert_eq!(
            serde_json::to_string(&full).unwrap(),
            r#"{"username":"bob@example.com","displayName":"Bob"}"#
        );
        assert_eq!(full.display(), "Bob");
        assert_eq!(identity.display(), "alice");
    }

    #[test]
    fn test_expiry_hint() {
        assert!(!Credential::new("T1").is_expired());
        assert!(!Credential::with_lifetime("T1", Some(3600)).is_expired());
        assert!(Credential::with_lifetime("T1", Some(-1)).is_expired());
        assert_eq!(Credential::new("T1").minutes_until_expiry(), None);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!("{:?}", Credential::new("super-secret"));
        assert!(!debug.contains("super-secret"));

        let debug = format!("{:?}", LoginCredentials::new("alice", "hunter2"));
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }
}
