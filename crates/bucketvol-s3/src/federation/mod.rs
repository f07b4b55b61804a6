//! Web identity federation.
//!
//! Exchanges a projected identity token for temporary S3 credentials and
//! turns a [`SecretBundle`](crate::SecretBundle) into an
//! [`S3Config`](crate::S3Config).

mod error;
mod resolver;
mod sts;

pub use error::FederationError;
pub use resolver::{CredentialResolver, ROLE_SESSION_NAME, WEB_IDENTITY_TOKEN_FILE_ENV};
pub use sts::StsFederation;

/// Temporary credentials issued by a federation exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct TemporaryCredentials {
    /// Temporary access key ID.
    pub access_key_id: String,
    /// Temporary secret access key.
    pub secret_access_key: String,
    /// Session token that must accompany every request.
    pub session_token: String,
}

impl std::fmt::Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporaryCredentials").finish_non_exhaustive()
    }
}

/// Exchange of a web identity token for temporary credentials.
#[async_trait::async_trait]
pub trait WebIdentityFederation: Send + Sync {
    /// Assumes `role_arn` on behalf of the bearer of `token`.
    async fn assume_role_with_web_identity(
        &self,
        role_arn: &str,
        session_name: &str,
        token: &str,
    ) -> Result<TemporaryCredentials, FederationError>;
}
