use async_trait::async_trait;
use cndy_types::ItemPayload;

use crate::error::UploadResult;

/// Uploads one item and returns the content link of its metadata.
///
/// Callers never upload an item twice once its link is cached; backends that
/// content-address their data deduplicate repeated uploads on their own.
#[async_trait]
pub trait StorageUploader: Send + Sync {
    /// Short backend name for logs and reports.
    fn name(&self) -> &'static str;

    async fn upload(&self, item: &ItemPayload) -> UploadResult<String>;
}

#[async_trait]
impl<T: StorageUploader + ?Sized> StorageUploader for std::sync::Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn upload(&self, item: &ItemPayload) -> UploadResult<String> {
        (**self).upload(item).await
    }
}
