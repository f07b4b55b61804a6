//! Secret bundle to client configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, instrument};

use super::WebIdentityFederation;
use crate::{Error, Result, S3Config, S3Credentials, SecretBundle, TRACING_TARGET_CREDENTIALS};

/// Environment variable naming the projected identity token file.
pub const WEB_IDENTITY_TOKEN_FILE_ENV: &str = "AWS_WEB_IDENTITY_TOKEN_FILE";

/// Session name sent with every role assumption.
pub const ROLE_SESSION_NAME: &str = "bucketvol";

/// Produces client configurations from secret bundles.
///
/// Static keys are used as they are. When the bundle names an IAM role, the
/// identity token is read from the configured token file and exchanged for
/// temporary credentials.
#[derive(Clone)]
pub struct CredentialResolver {
    federation: Arc<dyn WebIdentityFederation>,
    token_file: Option<PathBuf>,
}

impl CredentialResolver {
    /// Creates a resolver without a token file.
    pub fn new(federation: Arc<dyn WebIdentityFederation>) -> Self {
        Self {
            federation,
            token_file: None,
        }
    }

    /// Creates a resolver taking the token file from
    /// [`WEB_IDENTITY_TOKEN_FILE_ENV`].
    pub fn from_env(federation: Arc<dyn WebIdentityFederation>) -> Self {
        let token_file = std::env::var_os(WEB_IDENTITY_TOKEN_FILE_ENV)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        Self {
            federation,
            token_file,
        }
    }

    /// Sets the identity token file.
    #[must_use]
    pub fn with_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = Some(path.into());
        self
    }

    /// Returns the identity token file, if one is bound.
    pub fn token_file(&self) -> Option<&Path> {
        self.token_file.as_deref()
    }

    /// Resolves `bundle` into a client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a role is named but no token file is
    /// bound, [`Error::Io`] if the token file cannot be read, and
    /// [`Error::Federation`] if the exchange fails.
    #[instrument(
        skip_all,
        target = TRACING_TARGET_CREDENTIALS,
        fields(federated = bundle.iam_role_arn().is_some())
    )]
    pub async fn resolve(&self, bundle: &SecretBundle) -> Result<S3Config> {
        let credentials = match bundle.iam_role_arn() {
            None => S3Credentials::new(&bundle.access_key_id, &bundle.secret_access_key),
            Some(role_arn) => self.federate(role_arn).await?,
        };

        Ok(S3Config::new(
            credentials,
            &bundle.region,
            &bundle.endpoint,
        ))
    }

    async fn federate(&self, role_arn: &str) -> Result<S3Credentials> {
        let Some(token_file) = &self.token_file else {
            error!(
                target: TRACING_TARGET_CREDENTIALS,
                role_arn = %role_arn,
                "No identity token file bound"
            );
            return Err(Error::Config(format!(
                "{WEB_IDENTITY_TOKEN_FILE_ENV} must be set to assume role '{role_arn}'"
            )));
        };

        let token = tokio::fs::read_to_string(token_file).await.map_err(|e| {
            error!(
                target: TRACING_TARGET_CREDENTIALS,
                path = %token_file.display(),
                error = %e,
                "Failed to read identity token"
            );
            Error::Io(e)
        })?;

        debug!(
            target: TRACING_TARGET_CREDENTIALS,
            role_arn = %role_arn,
            session = ROLE_SESSION_NAME,
            "Assuming role with web identity"
        );

        let start = std::time::Instant::now();
        let temporary = self
            .federation
            .assume_role_with_web_identity(role_arn, ROLE_SESSION_NAME, &token)
            .await
            .map_err(|e| {
                error!(
                    target: TRACING_TARGET_CREDENTIALS,
                    role_arn = %role_arn,
                    code = e.code(),
                    error = %e,
                    elapsed = ?start.elapsed(),
                    "Web identity federation failed"
                );
                Error::Federation(e)
            })?;

        info!(
            target: TRACING_TARGET_CREDENTIALS,
            role_arn = %role_arn,
            elapsed = ?start.elapsed(),
            "Obtained temporary credentials"
        );

        Ok(S3Credentials::with_session_token(
            temporary.access_key_id,
            temporary.secret_access_key,
            temporary.session_token,
        ))
    }
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("token_file", &self.token_file)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use super::*;
    use crate::federation::{FederationError, TemporaryCredentials};

    #[derive(Default)]
    struct RecordingFederation {
        calls: Mutex<Vec<(String, String, String)>>,
        failure: Option<FederationError>,
    }

    impl RecordingFederation {
        fn failing(error: FederationError) -> Self {
            Self {
                calls: Mutex::default(),
                failure: Some(error),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl WebIdentityFederation for RecordingFederation {
        async fn assume_role_with_web_identity(
            &self,
            role_arn: &str,
            session_name: &str,
            token: &str,
        ) -> Result<TemporaryCredentials, FederationError> {
            self.calls.lock().unwrap().push((
                role_arn.to_string(),
                session_name.to_string(),
                token.to_string(),
            ));

            if let Some(error) = &self.failure {
                return Err(error.clone());
            }

            Ok(TemporaryCredentials {
                access_key_id: "ASIATEMP".into(),
                secret_access_key: "temp-secret".into(),
                session_token: "session".into(),
            })
        }
    }

    const ROLE: &str = "arn:aws:iam::123456789012:role/volumes";

    fn bundle() -> SecretBundle {
        SecretBundle::new("AKIA", "secret", "eu-west-1", "https://s3.eu-west-1.amazonaws.com")
    }

    fn token_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_static_keys_skip_federation() {
        let federation = Arc::new(RecordingFederation::default());
        let resolver = CredentialResolver::new(federation.clone())
            .with_token_file("/nonexistent/bucketvol/token");

        let config = resolver.resolve(&bundle()).await.unwrap();

        assert_eq!(config.credentials.access_key(), "AKIA");
        assert_eq!(config.credentials.secret_key(), "secret");
        assert!(config.credentials.session_token().is_none());
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.endpoint, "https://s3.eu-west-1.amazonaws.com");
        assert_eq!(federation.call_count(), 0);
    }

    #[tokio::test]
    async fn test_role_without_token_file_is_config_error() {
        let federation = Arc::new(RecordingFederation::default());
        let resolver = CredentialResolver::new(federation.clone());

        let result = resolver.resolve(&bundle().with_iam_role_arn(ROLE)).await;

        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(federation.call_count(), 0);
    }

    #[tokio::test]
    #[allow(unsafe_code)]
    async fn test_from_env_without_token_file_binding() {
        let federation = Arc::new(RecordingFederation::default());
        let bundle = bundle().with_iam_role_arn(ROLE);

        // Only this test touches the variable.
        unsafe { std::env::remove_var(WEB_IDENTITY_TOKEN_FILE_ENV) };
        let resolver = CredentialResolver::from_env(federation.clone());
        assert!(resolver.token_file().is_none());
        let unset = resolver.resolve(&bundle).await;

        unsafe { std::env::set_var(WEB_IDENTITY_TOKEN_FILE_ENV, "") };
        let resolver = CredentialResolver::from_env(federation.clone());
        assert!(resolver.token_file().is_none());
        let empty = resolver.resolve(&bundle).await;

        let file = token_file("token");
        unsafe { std::env::set_var(WEB_IDENTITY_TOKEN_FILE_ENV, file.path()) };
        let resolver = CredentialResolver::from_env(federation.clone());
        unsafe { std::env::remove_var(WEB_IDENTITY_TOKEN_FILE_ENV) };
        assert_eq!(resolver.token_file(), Some(file.path()));

        assert!(matches!(unset, Err(Error::Config(_))));
        assert!(matches!(empty, Err(Error::Config(_))));
        assert_eq!(federation.call_count(), 0);
    }

    #[tokio::test]
    async fn test_role_with_token_file() {
        let file = token_file("eyJhbGciOi.jwt");
        let federation = Arc::new(RecordingFederation::default());
        let resolver = CredentialResolver::new(federation.clone()).with_token_file(file.path());

        let config = resolver
            .resolve(&bundle().with_iam_role_arn(ROLE))
            .await
            .unwrap();

        assert_eq!(config.credentials.access_key(), "ASIATEMP");
        assert_eq!(config.credentials.secret_key(), "temp-secret");
        assert_eq!(config.credentials.session_token(), Some("session"));
        assert_eq!(config.region, "eu-west-1");

        let calls = federation.calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            &[(
                ROLE.to_string(),
                ROLE_SESSION_NAME.to_string(),
                "eyJhbGciOi.jwt".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_unreadable_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let federation = Arc::new(RecordingFederation::default());
        let resolver = CredentialResolver::new(federation.clone())
            .with_token_file(dir.path().join("missing"));

        let result = resolver.resolve(&bundle().with_iam_role_arn(ROLE)).await;

        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(federation.call_count(), 0);
    }

    #[tokio::test]
    async fn test_federation_error_is_surfaced() {
        let file = token_file("token");
        let federation = Arc::new(RecordingFederation::failing(
            FederationError::ExpiredToken("expired".into()),
        ));
        let resolver = CredentialResolver::new(federation).with_token_file(file.path());

        let result = resolver.resolve(&bundle().with_iam_role_arn(ROLE)).await;

        match result {
            Err(Error::Federation(e)) => assert_eq!(e.code(), "ExpiredTokenException"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
