//! Optional bearer token for the gateway.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque bearer token, possibly absent.
///
/// `Debug` never prints the token; use [`Credentials::fingerprint`] when a
/// log line needs to tell tokens apart.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials {
    token: Option<String>,
}

impl Credentials {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// The token, if one was supplied and is non-empty.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn is_present(&self) -> bool {
        self.token().is_some()
    }

    /// Short, log-safe description of the token.
    pub fn fingerprint(&self) -> String {
        match self.token() {
            None => "none".to_string(),
            Some(t) if t.chars().count() <= 8 => "***".to_string(),
            Some(t) => format!("{}***", t.chars().take(4).collect::<String>()),
        }
    }
}

impl From<Option<String>> for Credentials {
    fn from(token: Option<String>) -> Self {
        Self { token }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_present() {
            f.write_str("Credentials(<redacted>)")
        } else {
            f.write_str("Credentials(None)")
        }
    }
}
