//! Network storage backends.

mod arweave;
mod aws;
mod ipfs;

use std::time::Duration;

use async_trait::async_trait;
use cndy_types::ItemPayload;

pub use arweave::ArweaveUploader;
pub use aws::{S3Credentials, S3Uploader};
pub use ipfs::IpfsUploader;

use crate::config::StorageConfig;
use crate::error::{UploadError, UploadResult};
use crate::traits::StorageUploader;

/// The closed set of network backends, chosen once at startup.
#[derive(Debug)]
pub enum StorageBackend {
    Arweave(ArweaveUploader),
    Ipfs(IpfsUploader),
    Aws(S3Uploader),
}

impl StorageBackend {
    /// Build the backend for a validated configuration. `request_timeout`
    /// bounds each HTTP request.
    pub fn from_config(config: StorageConfig, request_timeout: Duration) -> UploadResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("cndy/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UploadError::Network(format!("cannot build HTTP client: {e}")))?;

        Ok(match config {
            StorageConfig::Arweave { endpoint, env } => {
                StorageBackend::Arweave(ArweaveUploader::new(client, endpoint, env))
            }
            StorageConfig::Ipfs { project_id, secret, api_url, gateway } => {
                StorageBackend::Ipfs(IpfsUploader::new(client, project_id, secret, api_url, gateway))
            }
            StorageConfig::Aws {
                bucket,
                region,
                access_key_id,
                secret_access_key,
                session_token,
            } => StorageBackend::Aws(S3Uploader::new(
                bucket,
                region,
                S3Credentials {
                    access_key_id,
                    secret_access_key,
                    session_token,
                },
                request_timeout,
            )?),
        })
    }
}

#[async_trait]
impl StorageUploader for StorageBackend {
    fn name(&self) -> &'static str {
        match self {
            StorageBackend::Arweave(_) => "arweave",
            StorageBackend::Ipfs(_) => "ipfs",
            StorageBackend::Aws(_) => "aws",
        }
    }

    async fn upload(&self, item: &ItemPayload) -> UploadResult<String> {
        match self {
            StorageBackend::Arweave(b) => b.upload(item).await,
            StorageBackend::Ipfs(b) => b.upload(item).await,
            StorageBackend::Aws(b) => b.upload(item).await,
        }
    }
}

/// MIME type for an asset file name.
pub(crate) fn mime_for(name: &str) -> String {
    mime_guess::from_path(name).first_or_octet_stream().to_string()
}

/// Turn a non-success response into an [`UploadError`].
pub(crate) async fn error_from_response(resp: reqwest::Response) -> UploadError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    UploadError::from_status(status, &body)
}
