//! Identity provider seam and email sign-in flow.
//!
//! # Responsibility
//! - Define the identity provider contract consumed by core.
//! - Sign in by email, registering the account when sign-in is refused.
//!
//! # Invariants
//! - Auth failures never mutate local or remote state.
//! - Credentials never reach the logs.

use crate::model::identity::AuthenticatedUser;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Email or password was blank.
    MissingCredentials,
    /// The provider refused the credentials or the registration.
    Rejected(String),
    /// The provider could not be reached.
    Unavailable(String),
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCredentials => write!(f, "email and password are required"),
            Self::Rejected(message) => write!(f, "{message}"),
            Self::Unavailable(message) => write!(f, "identity provider unavailable: {message}"),
        }
    }
}

impl Error for AuthError {}

/// Remote identity provider.
pub trait IdentityProvider {
    fn sign_in(&self, email: &str, password: &str) -> Result<AuthenticatedUser, AuthError>;
    fn create_account(&self, email: &str, password: &str)
        -> Result<AuthenticatedUser, AuthError>;
    fn sign_out(&self) -> Result<(), AuthError>;
    fn current_identity(&self) -> Option<AuthenticatedUser>;
}

/// Signs in with email, falling back to account creation.
///
/// An unreachable provider is reported as is, without attempting creation.
pub fn sign_in_with_email(
    provider: &dyn IdentityProvider,
    email: &str,
    password: &str,
) -> Result<AuthenticatedUser, AuthError> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(AuthError::MissingCredentials);
    }

    match provider.sign_in(email, password) {
        Ok(user) => {
            info!("event=sign_in module=auth status=ok method=email");
            Ok(user)
        }
        Err(AuthError::Rejected(_)) => {
            let user = provider.create_account(email, password).map_err(|err| {
                warn!("event=sign_in module=auth status=error method=email_register");
                err
            })?;
            info!("event=sign_in module=auth status=ok method=email_register");
            Ok(user)
        }
        Err(err) => {
            warn!("event=sign_in module=auth status=error method=email");
            Err(err)
        }
    }
}
