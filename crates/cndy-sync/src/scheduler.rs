//! Chunked, concurrent uploads with bounded retry.

use std::sync::Arc;
use std::time::Duration;

use cndy_storage::{StorageUploader, UploadError, UploadResult};
use cndy_types::{ItemIndex, ItemPayload, RetryPolicy};
use futures::future::join_all;
use tracing::{debug, warn};

/// Split `indexes` into ascending chunks of at most `chunk_size`.
///
/// Input order does not matter; duplicates are dropped. A `chunk_size` of 0
/// is treated as 1.
pub fn plan(indexes: &[ItemIndex], chunk_size: usize) -> Vec<Vec<ItemIndex>> {
    let mut sorted = indexes.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
        .chunks(chunk_size.max(1))
        .map(|c| c.to_vec())
        .collect()
}

/// Result of uploading one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub index: ItemIndex,
    pub result: UploadResult<String>,
    /// Attempts made, including the first.
    pub attempts: u32,
}

/// Drives a [`StorageUploader`] one chunk at a time.
pub struct UploadScheduler {
    uploader: Arc<dyn StorageUploader>,
    retry: RetryPolicy,
    upload_timeout: Duration,
}

impl UploadScheduler {
    pub fn new(uploader: Arc<dyn StorageUploader>, retry: RetryPolicy, upload_timeout: Duration) -> Self {
        Self {
            uploader,
            retry,
            upload_timeout,
        }
    }

    pub fn uploader_name(&self) -> &'static str {
        self.uploader.name()
    }

    /// Upload every payload of a chunk concurrently. One outcome per
    /// payload, in index order. A failing item never stops its siblings.
    pub async fn run_chunk(&self, payloads: &[ItemPayload]) -> Vec<ItemOutcome> {
        let mut outcomes = join_all(payloads.iter().map(|p| self.upload_one(p))).await;
        outcomes.sort_by_key(|o| o.index);
        outcomes
    }

    async fn upload_one(&self, payload: &ItemPayload) -> ItemOutcome {
        let max = self.retry.attempts();
        let mut backoff = self.retry.backoff();
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.upload_timeout, self.uploader.upload(payload)).await {
                Ok(result) => result,
                Err(_) => Err(UploadError::Timeout(self.upload_timeout.as_millis() as u64)),
            };
            match result {
                Ok(link) => {
                    debug!(index = payload.index, attempt, %link, "uploaded");
                    return ItemOutcome {
                        index: payload.index,
                        result: Ok(link),
                        attempts: attempt,
                    };
                }
                Err(e) if e.is_retryable() && attempt < max => {
                    let delay = backoff.next_delay();
                    warn!(index = payload.index, attempt, error = %e, ?delay, "upload failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(index = payload.index, attempt, error = %e, "upload failed");
                    return ItemOutcome {
                        index: payload.index,
                        result: Err(e),
                        attempts: attempt,
                    };
                }
            }
        }
    }
}

impl std::fmt::Debug for UploadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadScheduler")
            .field("uploader", &self.uploader.name())
            .field("retry", &self.retry)
            .field("upload_timeout", &self.upload_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cndy_storage::InMemoryUploader;
    use proptest::prelude::*;

    fn payload(index: ItemIndex) -> ItemPayload {
        ItemPayload {
            index,
            asset_name: format!("{index}.png"),
            asset: format!("asset-{index}").into_bytes(),
            metadata: format!(r##"{{"name": "#{index}", "image": "{index}.png"}}"##).into_bytes(),
        }
    }

    fn scheduler(uploader: Arc<InMemoryUploader>, attempts: u32) -> UploadScheduler {
        UploadScheduler::new(uploader, RetryPolicy::immediate(attempts), Duration::from_secs(5))
    }

    #[test]
    fn plan_sorts_and_chunks() {
        assert_eq!(plan(&[4, 0, 2, 1, 3], 2), vec![vec![0, 1], vec![2, 3], vec![4]]);
        assert_eq!(plan(&[], 3), Vec::<Vec<ItemIndex>>::new());
        assert_eq!(plan(&[1, 1, 0], 0), vec![vec![0], vec![1]]);
    }

    proptest! {
        #[test]
        fn plan_preserves_items_in_order(
            indexes in proptest::collection::vec(0u32..500, 0..200),
            chunk in 1usize..20,
        ) {
            let chunks = plan(&indexes, chunk);
            let flat: Vec<ItemIndex> = chunks.iter().flatten().copied().collect();

            let mut expected = indexes.clone();
            expected.sort_unstable();
            expected.dedup();
            prop_assert_eq!(flat, expected);
            prop_assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= chunk));
        }
    }

    #[tokio::test]
    async fn chunk_results_come_back_in_index_order() {
        let uploader = Arc::new(InMemoryUploader::new().with_latency(Duration::from_millis(5)));
        let sched = scheduler(uploader.clone(), 1);
        let payloads: Vec<_> = [3, 1, 2].into_iter().map(payload).collect();

        let outcomes = sched.run_chunk(&payloads).await;
        let order: Vec<_> = outcomes.iter().map(|o| o.index).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert!(outcomes.iter().all(|o| o.result.is_ok() && o.attempts == 1));
    }

    #[tokio::test]
    async fn transient_failure_retried_within_bound() {
        let uploader = Arc::new(InMemoryUploader::new());
        uploader.fail_next(0, UploadError::RateLimited("slow down".into()), 2);
        let sched = scheduler(uploader.clone(), 3);

        let outcomes = sched.run_chunk(&[payload(0)]).await;
        assert!(outcomes[0].result.is_ok());
        assert_eq!(outcomes[0].attempts, 3);
        assert_eq!(uploader.attempts(0), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_item_but_not_siblings() {
        let uploader = Arc::new(InMemoryUploader::new());
        uploader.fail_always(1, UploadError::Network("connection reset".into()));
        let sched = scheduler(uploader.clone(), 3);

        let outcomes = sched.run_chunk(&[payload(0), payload(1), payload(2)]).await;
        assert!(outcomes[0].result.is_ok());
        assert_eq!(outcomes[1].result, Err(UploadError::Network("connection reset".into())));
        assert_eq!(outcomes[1].attempts, 3);
        assert!(outcomes[2].result.is_ok());
        assert_eq!(uploader.attempts(1), 3);
    }

    #[tokio::test]
    async fn fatal_failure_is_not_retried() {
        let uploader = Arc::new(InMemoryUploader::new());
        uploader.fail_always(0, UploadError::PayloadRejected("too large".into()));
        let sched = scheduler(uploader.clone(), 5);

        let outcomes = sched.run_chunk(&[payload(0)]).await;
        assert!(matches!(outcomes[0].result, Err(UploadError::PayloadRejected(_))));
        assert_eq!(uploader.attempts(0), 1);
    }

    #[tokio::test]
    async fn slow_upload_times_out_as_retryable() {
        let uploader = Arc::new(InMemoryUploader::new().with_latency(Duration::from_millis(200)));
        let sched = UploadScheduler::new(uploader.clone(), RetryPolicy::immediate(2), Duration::from_millis(10));

        let outcomes = sched.run_chunk(&[payload(0)]).await;
        assert_eq!(outcomes[0].result, Err(UploadError::Timeout(10)));
        assert_eq!(outcomes[0].attempts, 2);
    }
}
