use cndy_types::{ItemPayload, Manifest};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use super::{error_from_response, mime_for};
use crate::error::{UploadError, UploadResult};

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

/// Uploads through an authenticated IPFS pinning service (`/api/v0/add`).
#[derive(Debug)]
pub struct IpfsUploader {
    client: reqwest::Client,
    project_id: String,
    secret: String,
    api_url: String,
    gateway: String,
}

impl IpfsUploader {
    pub fn new(
        client: reqwest::Client,
        project_id: String,
        secret: String,
        api_url: String,
        gateway: String,
    ) -> Self {
        Self {
            client,
            project_id,
            secret,
            api_url,
            gateway,
        }
    }

    async fn add(&self, file_name: &str, bytes: Vec<u8>, mime: &str) -> UploadResult<String> {
        let part = Part::bytes(bytes).file_name(file_name.to_string()).mime_str(mime)?;
        let resp = self
            .client
            .post(format!("{}/api/v0/add?pin=true", self.api_url))
            .basic_auth(&self.project_id, Some(&self.secret))
            .multipart(Form::new().part("file", part))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        let added: AddResponse = resp.json().await?;
        if added.hash.is_empty() {
            return Err(UploadError::Network("pinning service returned an empty hash".into()));
        }
        Ok(added.hash)
    }

    fn gateway_url(&self, hash: &str) -> String {
        format!("{}/{hash}", self.gateway)
    }

    pub async fn upload(&self, item: &ItemPayload) -> UploadResult<String> {
        let manifest = Manifest::parse(&item.metadata)?;

        let image_hash = self
            .add(&item.asset_name, item.asset.clone(), &mime_for(&item.asset_name))
            .await?;
        let image_url = self.gateway_url(&image_hash);
        debug!(index = item.index, %image_url, "ipfs asset pinned");

        let manifest = manifest.with_image(&image_url);
        let manifest_hash = self
            .add(&format!("{}.json", item.index), manifest.to_bytes(), "application/json")
            .await?;
        Ok(self.gateway_url(&manifest_hash))
    }
}
