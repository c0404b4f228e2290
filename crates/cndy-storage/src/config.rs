use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{UploadError, UploadResult};

/// Hosted upload function that bundles files into Arweave transactions.
pub const DEFAULT_ARWEAVE_ENDPOINT: &str =
    "https://us-central1-principal-lane-200702.cloudfunctions.net/uploadFile4";
pub const DEFAULT_IPFS_API_URL: &str = "https://ipfs.infura.io:5001";
pub const DEFAULT_IPFS_GATEWAY: &str = "https://ipfs.io/ipfs";
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Which storage backend to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Arweave,
    Ipfs,
    Aws,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageKind::Arweave => "arweave",
            StorageKind::Ipfs => "ipfs",
            StorageKind::Aws => "aws",
        })
    }
}

impl FromStr for StorageKind {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arweave" => Ok(StorageKind::Arweave),
            "ipfs" => Ok(StorageKind::Ipfs),
            "aws" => Ok(StorageKind::Aws),
            other => Err(UploadError::Credentials(format!(
                "storage option must be 'arweave', 'ipfs', or 'aws', got '{other}'"
            ))),
        }
    }
}

/// Loose, all-optional settings as they arrive from flags, environment and
/// the config file. [`StorageConfig::resolve`] turns them into a validated
/// backend configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    pub arweave_endpoint: Option<String>,
    pub ipfs_project_id: Option<String>,
    pub ipfs_secret: Option<String>,
    pub ipfs_api_url: Option<String>,
    pub ipfs_gateway: Option<String>,
    pub aws_bucket: Option<String>,
    pub aws_region: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_session_token: Option<String>,
}

/// Validated configuration for exactly one backend.
#[derive(Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Arweave {
        endpoint: String,
        /// Cluster name forwarded to the upload function.
        env: String,
    },
    Ipfs {
        project_id: String,
        secret: String,
        api_url: String,
        gateway: String,
    },
    Aws {
        bucket: String,
        region: String,
        access_key_id: String,
        secret_access_key: String,
        session_token: Option<String>,
    },
}

impl StorageConfig {
    /// Validate the credentials the selected backend needs. Fails before any
    /// network call with a message naming the missing setting.
    pub fn resolve(kind: StorageKind, env: &str, opts: &StorageOptions) -> UploadResult<Self> {
        match kind {
            StorageKind::Arweave => Ok(StorageConfig::Arweave {
                endpoint: non_empty(&opts.arweave_endpoint)
                    .unwrap_or(DEFAULT_ARWEAVE_ENDPOINT)
                    .to_string(),
                env: env.to_string(),
            }),
            StorageKind::Ipfs => {
                let (Some(project_id), Some(secret)) =
                    (non_empty(&opts.ipfs_project_id), non_empty(&opts.ipfs_secret))
                else {
                    return Err(UploadError::Credentials(
                        "IPFS selected as storage option but Infura project id or secret key were not provided".into(),
                    ));
                };
                Ok(StorageConfig::Ipfs {
                    project_id: project_id.to_string(),
                    secret: secret.to_string(),
                    api_url: non_empty(&opts.ipfs_api_url)
                        .unwrap_or(DEFAULT_IPFS_API_URL)
                        .trim_end_matches('/')
                        .to_string(),
                    gateway: non_empty(&opts.ipfs_gateway)
                        .unwrap_or(DEFAULT_IPFS_GATEWAY)
                        .trim_end_matches('/')
                        .to_string(),
                })
            }
            StorageKind::Aws => {
                let Some(bucket) = non_empty(&opts.aws_bucket) else {
                    return Err(UploadError::Credentials(
                        "aws selected as storage option but existing bucket name (--aws-s3-bucket) not provided".into(),
                    ));
                };
                let (Some(access_key_id), Some(secret_access_key)) = (
                    non_empty(&opts.aws_access_key_id),
                    non_empty(&opts.aws_secret_access_key),
                ) else {
                    return Err(UploadError::Credentials(
                        "aws selected as storage option but AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY are not set".into(),
                    ));
                };
                Ok(StorageConfig::Aws {
                    bucket: bucket.to_string(),
                    region: non_empty(&opts.aws_region)
                        .unwrap_or(DEFAULT_AWS_REGION)
                        .to_string(),
                    access_key_id: access_key_id.to_string(),
                    secret_access_key: secret_access_key.to_string(),
                    session_token: non_empty(&opts.aws_session_token).map(str::to_string),
                })
            }
        }
    }

    pub fn kind(&self) -> StorageKind {
        match self {
            StorageConfig::Arweave { .. } => StorageKind::Arweave,
            StorageConfig::Ipfs { .. } => StorageKind::Ipfs,
            StorageConfig::Aws { .. } => StorageKind::Aws,
        }
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageConfig::Arweave { endpoint, env } => f
                .debug_struct("Arweave")
                .field("endpoint", endpoint)
                .field("env", env)
                .finish(),
            StorageConfig::Ipfs { project_id, api_url, gateway, .. } => f
                .debug_struct("Ipfs")
                .field("project_id", project_id)
                .field("secret", &"<redacted>")
                .field("api_url", api_url)
                .field("gateway", gateway)
                .finish(),
            StorageConfig::Aws { bucket, region, access_key_id, .. } => f
                .debug_struct("Aws")
                .field("bucket", bucket)
                .field("region", region)
                .field("access_key_id", access_key_id)
                .field("secret_access_key", &"<redacted>")
                .finish(),
        }
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
