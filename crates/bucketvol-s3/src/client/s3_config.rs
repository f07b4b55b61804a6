//! S3 client configuration.

use serde::{Deserialize, Serialize};
use url::Url;

use super::s3_credentials::S3Credentials;
use crate::{Error, Result};

/// Default ceiling on concurrent per-object deletes during eviction fallback.
pub const DEFAULT_DELETE_PARALLELISM: usize = 16;

/// Configuration a [`S3Client`](crate::S3Client) is built from.
///
/// Immutable once a client has been constructed from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// Authentication credentials.
    pub credentials: S3Credentials,

    /// Region buckets are created in.
    pub region: String,

    /// Endpoint URL, e.g. "https://s3.amazonaws.com" or "http://minio:9000".
    pub endpoint: String,

    /// Mounter identifier, passed through to volume metadata.
    #[serde(default)]
    pub mounter: String,

    /// Ceiling on concurrent per-object deletes during eviction fallback.
    #[serde(default = "default_delete_parallelism")]
    pub delete_parallelism: usize,
}

fn default_delete_parallelism() -> usize {
    DEFAULT_DELETE_PARALLELISM
}

impl S3Config {
    /// Creates a configuration for `endpoint` in `region`.
    ///
    /// The endpoint is only parsed when a client is built from it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bucketvol_s3::{S3Config, S3Credentials};
    ///
    /// let credentials = S3Credentials::new("access_key", "secret_key");
    /// let config = S3Config::new(credentials, "us-east-1", "http://localhost:9000");
    /// assert_eq!(config.endpoint_host().unwrap(), "localhost:9000");
    /// assert!(!config.is_secure().unwrap());
    /// ```
    pub fn new(
        credentials: S3Credentials,
        region: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            region: region.into(),
            endpoint: endpoint.into(),
            mounter: String::new(),
            delete_parallelism: DEFAULT_DELETE_PARALLELISM,
        }
    }

    /// Sets the mounter identifier.
    #[must_use]
    pub fn with_mounter(mut self, mounter: impl Into<String>) -> Self {
        self.mounter = mounter.into();
        self
    }

    /// Sets the ceiling on concurrent per-object deletes.
    #[must_use]
    pub fn with_delete_parallelism(mut self, parallelism: usize) -> Self {
        self.delete_parallelism = parallelism;
        self
    }

    /// Returns the credentials.
    #[inline]
    pub fn credentials(&self) -> &S3Credentials {
        &self.credentials
    }

    /// Parses the endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the endpoint is not a URL or has no host.
    pub fn endpoint_url(&self) -> Result<Url> {
        let url = Url::parse(&self.endpoint).map_err(|e| {
            Error::Config(format!("Invalid endpoint URL '{}': {}", self.endpoint, e))
        })?;

        if url.host_str().is_none_or(str::is_empty) {
            return Err(Error::Config(format!(
                "Endpoint '{}' must include a valid hostname",
                self.endpoint
            )));
        }

        Ok(url)
    }

    /// Returns whether TLS is used, which is the case iff the scheme is `https`.
    pub fn is_secure(&self) -> Result<bool> {
        Ok(self.endpoint_url()?.scheme() == "https")
    }

    /// Returns `hostname[:port]`; the port only when the URL spells one out.
    pub fn endpoint_host(&self) -> Result<String> {
        let url = self.endpoint_url()?;
        let host = url.host_str().unwrap_or_default();

        Ok(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    /// Returns a masked version of the endpoint for logging.
    ///
    /// Any credentials embedded in the URL are removed.
    pub fn endpoint_masked(&self) -> String {
        match Url::parse(&self.endpoint) {
            Ok(mut url) => {
                let _ = url.set_username("");
                let _ = url.set_password(None);
                url.to_string()
            }
            Err(_) => "<invalid endpoint>".to_string(),
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if:
    /// - The endpoint does not parse or has no host
    /// - The access key or secret key is empty
    /// - The delete parallelism is zero
    pub fn validate(&self) -> Result<()> {
        self.endpoint_url()?;

        if self.credentials.access_key.is_empty() {
            return Err(Error::Config("Access key cannot be empty".to_string()));
        }

        if self.credentials.secret_key.is_empty() {
            return Err(Error::Config("Secret key cannot be empty".to_string()));
        }

        if self.delete_parallelism == 0 {
            return Err(Error::Config(
                "Delete parallelism must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
