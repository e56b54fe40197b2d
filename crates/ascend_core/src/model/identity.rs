//! Authenticated identity as seen by the core.

use serde::{Deserialize, Serialize};

/// Stable identity handed out by the identity provider.
///
/// The core only consumes the stable `uid` (profile key, mentor `userId`)
/// and the optional email for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl AuthenticatedUser {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }
}
