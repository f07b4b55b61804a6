//! Federation through the AWS Security Token Service.

use aws_config::BehaviorVersion;
use aws_sdk_sts::Client;
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sts::operation::assume_role_with_web_identity::AssumeRoleWithWebIdentityError;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use super::{FederationError, TemporaryCredentials, WebIdentityFederation};
use crate::TRACING_TARGET_CREDENTIALS;

/// [`WebIdentityFederation`] backed by `aws-sdk-sts`.
///
/// The SDK configuration is loaded from the environment on the first
/// exchange, so constructing this type never touches AWS configuration.
#[derive(Debug, Default)]
pub struct StsFederation {
    region: Option<String>,
    client: OnceCell<Client>,
}

impl StsFederation {
    /// Creates a federation client that resolves its region from the environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the token service region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    async fn client(&self) -> &Client {
        self.client
            .get_or_init(|| async {
                let mut loader = aws_config::defaults(BehaviorVersion::latest());
                if let Some(region) = &self.region {
                    loader = loader.region(aws_config::Region::new(region.clone()));
                }
                let sdk_config = loader.load().await;

                debug!(
                    target: TRACING_TARGET_CREDENTIALS,
                    region = ?sdk_config.region(),
                    "Token service client initialized"
                );
                Client::new(&sdk_config)
            })
            .await
    }

    fn from_sdk_error(error: SdkError<AssumeRoleWithWebIdentityError>) -> FederationError {
        match error {
            SdkError::ServiceError(context) => Self::from_service_error(context.into_err()),
            other => FederationError::other(DisplayErrorContext(&other).to_string()),
        }
    }

    fn from_service_error(error: AssumeRoleWithWebIdentityError) -> FederationError {
        fn text(message: Option<&str>) -> String {
            message.unwrap_or_default().to_string()
        }

        match error {
            AssumeRoleWithWebIdentityError::MalformedPolicyDocumentException(e) => {
                FederationError::MalformedPolicyDocument(text(e.message()))
            }
            AssumeRoleWithWebIdentityError::PackedPolicyTooLargeException(e) => {
                FederationError::PackedPolicyTooLarge(text(e.message()))
            }
            AssumeRoleWithWebIdentityError::IdpRejectedClaimException(e) => {
                FederationError::IdpRejectedClaim(text(e.message()))
            }
            AssumeRoleWithWebIdentityError::IdpCommunicationErrorException(e) => {
                FederationError::IdpCommunicationError(text(e.message()))
            }
            AssumeRoleWithWebIdentityError::InvalidIdentityTokenException(e) => {
                FederationError::InvalidIdentityToken(text(e.message()))
            }
            AssumeRoleWithWebIdentityError::ExpiredTokenException(e) => {
                FederationError::ExpiredToken(text(e.message()))
            }
            AssumeRoleWithWebIdentityError::RegionDisabledException(e) => {
                FederationError::RegionDisabled(text(e.message()))
            }
            other => FederationError::Other {
                code: other.code().map(str::to_string),
                message: DisplayErrorContext(&other).to_string(),
            },
        }
    }
}

#[async_trait::async_trait]
impl WebIdentityFederation for StsFederation {
    #[instrument(skip(self, token), target = TRACING_TARGET_CREDENTIALS)]
    async fn assume_role_with_web_identity(
        &self,
        role_arn: &str,
        session_name: &str,
        token: &str,
    ) -> Result<TemporaryCredentials, FederationError> {
        let output = self
            .client()
            .await
            .assume_role_with_web_identity()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .web_identity_token(token)
            .send()
            .await
            .map_err(Self::from_sdk_error)?;

        let credentials = output
            .credentials()
            .ok_or_else(|| FederationError::other("Token service returned no credentials"))?;

        Ok(TemporaryCredentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_sts::types::error::{
        ExpiredTokenException, IdpRejectedClaimException, InvalidIdentityTokenException,
        RegionDisabledException,
    };

    use super::*;

    #[test]
    fn test_named_conditions() {
        let error = AssumeRoleWithWebIdentityError::ExpiredTokenException(
            ExpiredTokenException::builder()
                .message("token expired at 12:00")
                .build(),
        );
        let mapped = StsFederation::from_service_error(error);
        assert_eq!(
            mapped,
            FederationError::ExpiredToken("token expired at 12:00".into())
        );

        let error = AssumeRoleWithWebIdentityError::IdpRejectedClaimException(
            IdpRejectedClaimException::builder().message("aud").build(),
        );
        assert_eq!(
            StsFederation::from_service_error(error).code(),
            "IDPRejectedClaim"
        );

        let error = AssumeRoleWithWebIdentityError::InvalidIdentityTokenException(
            InvalidIdentityTokenException::builder().build(),
        );
        assert_eq!(
            StsFederation::from_service_error(error),
            FederationError::InvalidIdentityToken(String::new())
        );

        let error = AssumeRoleWithWebIdentityError::RegionDisabledException(
            RegionDisabledException::builder().message("eu-south-2").build(),
        );
        assert_eq!(StsFederation::from_service_error(error).message(), "eu-south-2");
    }

    #[test]
    fn test_construction_is_lazy() {
        let federation = StsFederation::new().with_region("us-east-1");
        assert!(federation.client.get().is_none());
    }
}
