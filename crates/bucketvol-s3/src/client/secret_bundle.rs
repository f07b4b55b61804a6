//! Secret bundle supplied by the provisioning layer.

use std::collections::HashMap;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// Keys of the provisioning layer's secret map.
const KEY_ACCESS_KEY_ID: &str = "accessKeyID";
const KEY_SECRET_ACCESS_KEY: &str = "secretAccessKey";
const KEY_REGION: &str = "region";
const KEY_ENDPOINT: &str = "endpoint";
const KEY_IAM_ROLE_ARN: &str = "iamRoleArn";

/// Raw credentials and location of the object store.
///
/// Resolved into an [`S3Config`](crate::S3Config) by a
/// [`CredentialResolver`](crate::CredentialResolver).
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct SecretBundle {
    /// Static access key ID
    #[cfg_attr(
        feature = "config",
        arg(long = "access-key-id", env = "S3_ACCESS_KEY_ID", default_value = "")
    )]
    #[serde(rename = "accessKeyID", default)]
    pub access_key_id: String,

    /// Static secret access key
    #[cfg_attr(
        feature = "config",
        arg(
            long = "secret-access-key",
            env = "S3_SECRET_ACCESS_KEY",
            default_value = "",
            hide_env_values = true
        )
    )]
    #[serde(rename = "secretAccessKey", default)]
    pub secret_access_key: String,

    /// Region buckets are created in
    #[cfg_attr(
        feature = "config",
        arg(long = "region", env = "S3_REGION", default_value = "")
    )]
    #[serde(default)]
    pub region: String,

    /// Object store endpoint URL
    #[cfg_attr(feature = "config", arg(long = "endpoint", env = "S3_ENDPOINT"))]
    pub endpoint: String,

    /// IAM role to assume with the projected web identity token
    #[cfg_attr(
        feature = "config",
        arg(long = "iam-role-arn", env = "S3_IAM_ROLE_ARN")
    )]
    #[serde(rename = "iamRoleArn", default)]
    pub iam_role_arn: Option<String>,
}

impl SecretBundle {
    /// Creates a bundle with static credentials and no role to assume.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: region.into(),
            endpoint: endpoint.into(),
            iam_role_arn: None,
        }
    }

    /// Sets the IAM role to assume through web identity federation.
    #[must_use]
    pub fn with_iam_role_arn(mut self, role_arn: impl Into<String>) -> Self {
        self.iam_role_arn = Some(role_arn.into());
        self
    }

    /// Builds a bundle from the provisioning layer's secret map.
    ///
    /// Missing credential keys are read as empty strings; a missing
    /// `endpoint` makes the bundle malformed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the map has no `endpoint` entry.
    pub fn from_map(secret: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| secret.get(key).cloned().unwrap_or_default();

        let endpoint = secret
            .get(KEY_ENDPOINT)
            .filter(|e| !e.is_empty())
            .cloned()
            .ok_or_else(|| {
                Error::Config(format!("Secret is missing the '{KEY_ENDPOINT}' entry"))
            })?;

        Ok(Self {
            access_key_id: get(KEY_ACCESS_KEY_ID),
            secret_access_key: get(KEY_SECRET_ACCESS_KEY),
            region: get(KEY_REGION),
            endpoint,
            iam_role_arn: secret.get(KEY_IAM_ROLE_ARN).cloned(),
        })
    }

    /// Returns the role to assume, treating an empty ARN as absent.
    #[inline]
    pub fn iam_role_arn(&self) -> Option<&str> {
        self.iam_role_arn.as_deref().filter(|arn| !arn.is_empty())
    }
}

impl std::fmt::Debug for SecretBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBundle")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("iam_role_arn", &self.iam_role_arn)
            .finish_non_exhaustive()
    }
}
