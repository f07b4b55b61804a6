//! S3 client with configuration and credential management.

mod s3_client;
mod s3_config;
mod s3_credentials;
mod secret_bundle;

pub use s3_client::S3Client;
pub use s3_config::{DEFAULT_DELETE_PARALLELISM, S3Config};
pub use s3_credentials::S3Credentials;
pub use secret_bundle::SecretBundle;
