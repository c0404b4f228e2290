use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use cndy_types::{ItemIndex, ItemPayload, Manifest};

use crate::error::{UploadError, UploadResult};
use crate::traits::StorageUploader;

const LINK_SCHEME: &str = "mem://";

#[derive(Debug, Clone)]
struct ScriptedFailure {
    error: UploadError,
    /// `None` fails forever.
    remaining: Option<usize>,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<String, Vec<u8>>,
    failures: HashMap<ItemIndex, ScriptedFailure>,
    calls: HashMap<ItemIndex, usize>,
}

/// Content-addressed in-memory uploader.
///
/// Links are `mem://<blake3 hex>` of the stored bytes, so uploading the
/// same item twice yields the same link. Failures and latency can be
/// scripted per item.
pub struct InMemoryUploader {
    inner: RwLock<Inner>,
    latency: Option<Duration>,
}

impl InMemoryUploader {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            latency: None,
        }
    }

    /// Every upload sleeps for `latency` before completing.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next `times` uploads of `index` with `error`.
    pub fn fail_next(&self, index: ItemIndex, error: UploadError, times: usize) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.failures.insert(
            index,
            ScriptedFailure {
                error,
                remaining: Some(times),
            },
        );
    }

    /// Fail every upload of `index` with `error`.
    pub fn fail_always(&self, index: ItemIndex, error: UploadError) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.failures.insert(index, ScriptedFailure { error, remaining: None });
    }

    /// Total upload attempts across all items.
    pub fn upload_count(&self) -> usize {
        let inner = self.inner.read().expect("lock poisoned");
        inner.calls.values().sum()
    }

    /// Upload attempts for one item.
    pub fn attempts(&self, index: ItemIndex) -> usize {
        let inner = self.inner.read().expect("lock poisoned");
        inner.calls.get(&index).copied().unwrap_or(0)
    }

    /// Stored bytes behind a link.
    pub fn get(&self, link: &str) -> Option<Vec<u8>> {
        let inner = self.inner.read().expect("lock poisoned");
        inner.objects.get(link).cloned()
    }

    fn store(inner: &mut Inner, bytes: Vec<u8>) -> String {
        let link = format!("{LINK_SCHEME}{}", blake3::hash(&bytes).to_hex());
        inner.objects.insert(link.clone(), bytes);
        link
    }

    fn take_failure(inner: &mut Inner, index: ItemIndex) -> Option<UploadError> {
        let scripted = inner.failures.get_mut(&index)?;
        let error = scripted.error.clone();
        match scripted.remaining.as_mut() {
            None => Some(error),
            Some(0) => {
                inner.failures.remove(&index);
                None
            }
            Some(n) => {
                *n -= 1;
                if *n == 0 {
                    inner.failures.remove(&index);
                }
                Some(error)
            }
        }
    }
}

impl Default for InMemoryUploader {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("lock poisoned");
        f.debug_struct("InMemoryUploader")
            .field("objects", &inner.objects.len())
            .field("scripted_failures", &inner.failures.len())
            .finish()
    }
}

#[async_trait]
impl StorageUploader for InMemoryUploader {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upload(&self, item: &ItemPayload) -> UploadResult<String> {
        {
            let mut inner = self.inner.write().expect("lock poisoned");
            *inner.calls.entry(item.index).or_insert(0) += 1;
            if let Some(error) = Self::take_failure(&mut inner, item.index) {
                return Err(error);
            }
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let manifest = Manifest::parse(&item.metadata)?;
        let mut inner = self.inner.write().expect("lock poisoned");
        let image_link = Self::store(&mut inner, item.asset.clone());
        let manifest = manifest.with_image(&image_link);
        Ok(Self::store(&mut inner, manifest.to_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(index: ItemIndex) -> ItemPayload {
        ItemPayload {
            index,
            asset_name: format!("{index}.png"),
            asset: vec![index as u8; 16],
            metadata: format!(r#"{{"name": "Item #{index}", "image": "{index}.png"}}"#).into_bytes(),
        }
    }

    #[tokio::test]
    async fn links_are_content_addressed() {
        let up = InMemoryUploader::new();
        let a = up.upload(&payload(0)).await.unwrap();
        let b = up.upload(&payload(0)).await.unwrap();
        let c = up.upload(&payload(1)).await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("mem://"));
        assert_eq!(up.attempts(0), 2);
        assert_eq!(up.upload_count(), 3);
    }

    #[tokio::test]
    async fn stored_manifest_points_at_asset() {
        let up = InMemoryUploader::new();
        let link = up.upload(&payload(2)).await.unwrap();
        let stored: serde_json::Value = serde_json::from_slice(&up.get(&link).unwrap()).unwrap();
        let image = stored["image"].as_str().unwrap();
        assert_eq!(up.get(image).unwrap(), vec![2u8; 16]);
    }

    #[tokio::test]
    async fn scripted_failures_run_out() {
        let up = InMemoryUploader::new();
        up.fail_next(0, UploadError::RateLimited("slow down".into()), 2);
        assert!(up.upload(&payload(0)).await.is_err());
        assert!(up.upload(&payload(0)).await.is_err());
        assert!(up.upload(&payload(0)).await.is_ok());
    }

    #[tokio::test]
    async fn permanent_failure_persists() {
        let up = InMemoryUploader::new();
        up.fail_always(1, UploadError::PayloadRejected("too large".into()));
        for _ in 0..3 {
            assert_eq!(
                up.upload(&payload(1)).await.unwrap_err(),
                UploadError::PayloadRejected("too large".into())
            );
        }
        assert!(up.upload(&payload(0)).await.is_ok());
    }

    #[tokio::test]
    async fn bad_metadata_is_rejected() {
        let up = InMemoryUploader::new();
        let mut item = payload(0);
        item.metadata = b"not json".to_vec();
        let err = up.upload(&item).await.unwrap_err();
        assert!(matches!(err, UploadError::InvalidMetadata(_)));
        assert!(!err.is_retryable());
    }
}
