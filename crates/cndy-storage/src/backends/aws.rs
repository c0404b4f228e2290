use std::time::Duration;

use cndy_types::{ItemPayload, Manifest};
use opendal::layers::TimeoutLayer;
use opendal::services::S3;
use opendal::{ErrorKind, Operator};
use tracing::debug;

use super::mime_for;
use crate::error::{UploadError, UploadResult};

/// Access keys for the bucket.
#[derive(Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

/// Stores objects in an existing S3 bucket. The bucket policy must allow
/// public reads for the returned links to resolve.
#[derive(Debug)]
pub struct S3Uploader {
    operator: Operator,
    bucket: String,
    region: String,
}

impl S3Uploader {
    pub fn new(
        bucket: String,
        region: String,
        credentials: S3Credentials,
        request_timeout: Duration,
    ) -> UploadResult<Self> {
        let mut builder = S3::default()
            .bucket(&bucket)
            .region(&region)
            .access_key_id(&credentials.access_key_id)
            .secret_access_key(&credentials.secret_access_key);
        if let Some(token) = &credentials.session_token {
            builder = builder.session_token(token);
        }
        let operator = Operator::new(builder)
            .map_err(upload_error)?
            .layer(TimeoutLayer::new().with_timeout(request_timeout))
            .finish();
        Ok(Self {
            operator,
            bucket,
            region,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("https://{}.s3.{}.amazonaws.com/{key}", self.bucket, self.region)
    }

    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> UploadResult<String> {
        self.operator
            .write_with(key, body)
            .content_type(content_type)
            .await
            .map_err(upload_error)?;
        Ok(self.object_url(key))
    }

    pub async fn upload(&self, item: &ItemPayload) -> UploadResult<String> {
        let manifest = Manifest::parse(&item.metadata)?;

        let image_url = self
            .put_object(&item.asset_name, item.asset.clone(), &mime_for(&item.asset_name))
            .await?;
        debug!(index = item.index, %image_url, "s3 asset stored");

        let manifest = manifest.with_image(&image_url);
        self.put_object(
            &format!("{}.json", item.index),
            manifest.to_bytes(),
            "application/json",
        )
        .await
    }
}

fn upload_error(e: opendal::Error) -> UploadError {
    if e.is_temporary() {
        return UploadError::Network(e.to_string());
    }
    match e.kind() {
        ErrorKind::RateLimited => UploadError::RateLimited(e.to_string()),
        ErrorKind::PermissionDenied | ErrorKind::ConfigInvalid => UploadError::Credentials(e.to_string()),
        ErrorKind::Unexpected => UploadError::Network(e.to_string()),
        _ => UploadError::PayloadRejected(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uploader() -> S3Uploader {
        S3Uploader::new(
            "drops".into(),
            "eu-west-1".into(),
            S3Credentials {
                access_key_id: "k".into(),
                secret_access_key: "s".into(),
                session_token: None,
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn object_urls() {
        assert_eq!(
            uploader().object_url("7.json"),
            "https://drops.s3.eu-west-1.amazonaws.com/7.json"
        );
    }

    #[test]
    fn error_classes() {
        let denied = opendal::Error::new(ErrorKind::PermissionDenied, "access denied");
        assert!(matches!(upload_error(denied), UploadError::Credentials(_)));

        let slow = opendal::Error::new(ErrorKind::RateLimited, "slow down");
        assert!(upload_error(slow).is_retryable());

        let flaky = opendal::Error::new(ErrorKind::Unexpected, "reset").set_temporary();
        assert!(matches!(upload_error(flaky), UploadError::Network(_)));

        let exists = opendal::Error::new(ErrorKind::AlreadyExists, "exists");
        assert!(!upload_error(exists).is_retryable());
    }

    #[test]
    fn credentials_are_not_printed() {
        let creds = S3Credentials {
            access_key_id: "AKIA".into(),
            secret_access_key: "very-secret".into(),
            session_token: Some("token".into()),
        };
        let shown = format!("{creds:?}");
        assert!(shown.contains("AKIA"));
        assert!(!shown.contains("very-secret"));
    }
}
