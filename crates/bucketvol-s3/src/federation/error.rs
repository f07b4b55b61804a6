//! Named failures of the web identity exchange.

use strum::AsRefStr;

/// Failure of an `AssumeRoleWithWebIdentity` exchange.
///
/// Every named variant carries the message returned by the token service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, AsRefStr)]
pub enum FederationError {
    /// The session policy is not a valid policy document.
    #[error("Malformed policy document: {0}")]
    #[strum(serialize = "MalformedPolicyDocument")]
    MalformedPolicyDocument(String),

    /// The compressed session policies exceed the allowed size.
    #[error("Packed policy too large: {0}")]
    #[strum(serialize = "PackedPolicyTooLarge")]
    PackedPolicyTooLarge(String),

    /// The identity provider rejected a claim in the token.
    #[error("Identity provider rejected claim: {0}")]
    #[strum(serialize = "IDPRejectedClaim")]
    IdpRejectedClaim(String),

    /// The token service could not reach the identity provider.
    #[error("Identity provider communication error: {0}")]
    #[strum(serialize = "IDPCommunicationError")]
    IdpCommunicationError(String),

    /// The token is not a valid identity token.
    #[error("Invalid identity token: {0}")]
    #[strum(serialize = "InvalidIdentityToken")]
    InvalidIdentityToken(String),

    /// The token has expired.
    #[error("Expired token: {0}")]
    #[strum(serialize = "ExpiredTokenException")]
    ExpiredToken(String),

    /// The token service is not activated in the requested region.
    #[error("Region disabled: {0}")]
    #[strum(serialize = "RegionDisabledException")]
    RegionDisabled(String),

    /// Any other failure, with the backend message verbatim.
    #[error("{message}")]
    #[strum(serialize = "Unknown")]
    Other {
        /// Backend error code, when the service returned one.
        code: Option<String>,
        /// Backend message.
        message: String,
    },
}

impl FederationError {
    /// Creates a catch-all error without a backend code.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            code: None,
            message: message.into(),
        }
    }

    /// Returns the error code used by the token service for this condition.
    pub fn code(&self) -> &str {
        match self {
            Self::Other {
                code: Some(code), ..
            } => code,
            _ => self.as_ref(),
        }
    }

    /// Returns the backend message.
    pub fn message(&self) -> &str {
        match self {
            Self::MalformedPolicyDocument(m)
            | Self::PackedPolicyTooLarge(m)
            | Self::IdpRejectedClaim(m)
            | Self::IdpCommunicationError(m)
            | Self::InvalidIdentityToken(m)
            | Self::ExpiredToken(m)
            | Self::RegionDisabled(m) => m,
            Self::Other { message, .. } => message,
        }
    }

    /// Returns whether repeating the exchange may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::IdpCommunicationError(_) | Self::Other { .. })
    }
}
