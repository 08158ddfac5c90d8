//! Bearer-token credentials used to authenticate key reads.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

/// Failure to produce an access token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CredentialError(pub String);

/// A bearer token ready to be sent in an `Authorization` header.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken").field("token", &"<redacted>").finish()
    }
}

pub type TokenFuture<'a> =
    Pin<Box<dyn Future<Output = Result<AccessToken, CredentialError>> + Send + 'a>>;

/// Opaque token provider.
///
/// Implementations own acquisition and refresh; the probe only asks for a
/// token before each read.
pub trait TokenCredential: Send + Sync + fmt::Debug {
    fn get_token(&self) -> TokenFuture<'_>;
}

/// A credential that always returns the same token.
#[derive(Clone)]
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Read the token from an environment variable.
    pub fn from_env(var: &str) -> Result<Self, CredentialError> {
        match std::env::var(var) {
            Ok(token) if !token.trim().is_empty() => Ok(Self::new(token.trim())),
            Ok(_) => Err(CredentialError(format!("environment variable {var} is empty"))),
            Err(e) => Err(CredentialError(format!("environment variable {var}: {e}"))),
        }
    }
}

impl fmt::Debug for StaticTokenCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenCredential")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl TokenCredential for StaticTokenCredential {
    fn get_token(&self) -> TokenFuture<'_> {
        Box::pin(async move {
            Ok(AccessToken {
                token: self.token.clone(),
            })
        })
    }
}
