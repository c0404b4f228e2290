use cndy_types::{ItemPayload, Manifest};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use super::{error_from_response, mime_for};
use crate::error::{UploadError, UploadResult};

/// Name the asset is stored under inside the Arweave bundle. The manifest
/// refers to it relatively.
const BUNDLE_IMAGE_NAME: &str = "image.png";
const BUNDLE_METADATA_NAME: &str = "metadata.json";
const LINK_PREFIX: &str = "https://arweave.net";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    messages: Vec<UploadMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadMessage {
    filename: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Uploads through a hosted function that writes the asset and manifest as
/// Arweave transactions and reports their ids.
#[derive(Debug)]
pub struct ArweaveUploader {
    client: reqwest::Client,
    endpoint: String,
    env: String,
}

impl ArweaveUploader {
    pub fn new(client: reqwest::Client, endpoint: String, env: String) -> Self {
        Self { client, endpoint, env }
    }

    pub async fn upload(&self, item: &ItemPayload) -> UploadResult<String> {
        let manifest = Manifest::parse(&item.metadata)?.with_image(BUNDLE_IMAGE_NAME);

        let image = Part::bytes(item.asset.clone())
            .file_name(BUNDLE_IMAGE_NAME)
            .mime_str(&mime_for(&item.asset_name))?;
        let metadata = Part::bytes(manifest.to_bytes())
            .file_name(BUNDLE_METADATA_NAME)
            .mime_str("application/json")?;
        let form = Form::new()
            .text("env", self.env.clone())
            .part("file[]", image)
            .part("file[]", metadata);

        debug!(index = item.index, endpoint = %self.endpoint, "arweave upload");
        let resp = self.client.post(&self.endpoint).multipart(form).send().await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        let body: UploadResponse = resp.json().await?;
        manifest_link(body)
    }
}

fn manifest_link(body: UploadResponse) -> UploadResult<String> {
    if let Some(err) = body.error {
        return Err(UploadError::PayloadRejected(err));
    }
    let message = body
        .messages
        .iter()
        .find(|m| m.filename == "manifest.json")
        .or_else(|| body.messages.iter().find(|m| m.filename == BUNDLE_METADATA_NAME))
        .ok_or_else(|| UploadError::Network("upload response has no manifest entry".into()))?;

    if message.status != "success" {
        return Err(UploadError::PayloadRejected(format!(
            "{}: {}",
            message.filename,
            message.error.as_deref().unwrap_or(&message.status)
        )));
    }
    match message.transaction_id.as_deref() {
        Some(id) if !id.is_empty() => Ok(format!("{LINK_PREFIX}/{id}")),
        _ => Err(UploadError::Network("manifest entry has no transaction id".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> UploadResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn link_from_manifest_entry() {
        let body = parse(
            r#"{"messages": [
                {"filename": "image.png", "status": "success", "transactionId": "img"},
                {"filename": "manifest.json", "status": "success", "transactionId": "man"}
            ]}"#,
        );
        assert_eq!(manifest_link(body).unwrap(), "https://arweave.net/man");
    }

    #[test]
    fn falls_back_to_metadata_entry() {
        let body = parse(
            r#"{"messages": [{"filename": "metadata.json", "status": "success", "transactionId": "m"}]}"#,
        );
        assert_eq!(manifest_link(body).unwrap(), "https://arweave.net/m");
    }

    #[test]
    fn failed_entry_is_rejection() {
        let body = parse(
            r#"{"messages": [{"filename": "manifest.json", "status": "fail", "error": "too big"}]}"#,
        );
        let err = manifest_link(body).unwrap_err();
        assert!(matches!(err, UploadError::PayloadRejected(ref m) if m.contains("too big")));
    }

    #[test]
    fn missing_entry_is_retryable() {
        let err = manifest_link(parse(r#"{"messages": []}"#)).unwrap_err();
        assert!(err.is_retryable());
        let err = manifest_link(parse(r#"{"error": "payment not found"}"#)).unwrap_err();
        assert!(!err.is_retryable());
    }
}
