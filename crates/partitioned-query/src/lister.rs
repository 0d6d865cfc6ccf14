//! PartitionedLister (component C5): executes a list/watch request across
//! the partitions computed by [`crate::partition::Partitioner`], running
//! backend queries concurrently while publishing results in strict
//! partition order, per spec.md §4.5.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use snafu::Snafu;
use tokio::sync::Semaphore;

use crate::partition::Partition;

/// Extra semaphore weight given to the first partition, reflecting that it
/// usually carries the bulk of a cluster's objects (spec.md §4.5).
const FIRST_PARTITION_WEIGHT: u32 = 3;

/// Default bound on concurrently in-flight partition queries (spec.md §4.5's
/// "capacity `C` (default small)"), independent of how many partitions a
/// request has. The first partition's extra weight is reserved within this
/// bound rather than added on top of it, so `C` is the genuine concurrency
/// ceiling.
const DEFAULT_CONCURRENCY: u32 = 4;

/// A single page of results returned by a backend for one partition.
#[derive(Clone, Debug)]
pub struct PartitionPage<T> {
    pub items: Vec<T>,
    pub revision: String,
    pub continue_token: Option<String>,
    pub remaining_item_count: Option<i64>,
}

#[derive(Debug, Snafu)]
pub enum ListError {
    #[snafu(display("backend query for partition {partition:?} failed: {message}"))]
    Backend { partition: String, message: String },
    #[snafu(display("continue token could not be decoded: {message}"))]
    InvalidContinueToken { message: String },
}

/// Backend query function for a single partition. Implementors issue the
/// actual Kubernetes API call; the lister only sequences calls across
/// partitions and merges pages.
#[async_trait]
pub trait ListFn<T>: Send + Sync
where
    T: Send + 'static,
{
    async fn call(
        &self,
        partition: &Partition,
        revision: Option<String>,
        limit: Option<i64>,
        continue_token: Option<String>,
    ) -> Result<PartitionPage<T>, ListError>;
}

/// Result of a full, materialized multi-partition list: all items across all
/// partitions, concatenated in partition order, plus the revision the whole
/// result set is consistent as-of.
#[derive(Clone, Debug)]
pub struct AggregatedList<T> {
    pub items: Vec<T>,
    pub revision: String,
}

pub struct PartitionedLister;

impl PartitionedLister {
    /// Runs `list_fn` over every partition and merges the results in
    /// partition order. Partition 0 is queried alone first so its revision
    /// can be established before any other partition's backend call is
    /// issued; that revision is then threaded into every remaining
    /// partition's calls so the whole result set observes one consistent
    /// snapshot (spec.md §4.5 step 3, §5). The remaining partitions then run
    /// concurrently, bounded by a semaphore of fixed capacity `C`
    /// (spec.md §4.5's "capacity `C` (default small)"), with partition 0's
    /// weight reserved out of that same bound rather than added on top of
    /// it. The first error encountered cancels the rest and is the sole
    /// error surfaced, per spec.md §8 scenario 5.
    pub async fn list_all<T>(
        list_fn: &(dyn ListFn<T> + Send + Sync),
        partitions: &[Partition],
    ) -> Result<AggregatedList<T>, ListError>
    where
        T: Send + Clone + 'static,
    {
        if partitions.is_empty() {
            return Ok(AggregatedList {
                items: Vec::new(),
                revision: String::new(),
            });
        }

        let semaphore = Arc::new(Semaphore::new(DEFAULT_CONCURRENCY as usize));

        let weight = FIRST_PARTITION_WEIGHT.min(DEFAULT_CONCURRENCY);
        let first_permit = semaphore
            .acquire_many(weight)
            .await
            .expect("semaphore never closed");
        let (mut items, snapshot_revision) = query_partition_fully(list_fn, &partitions[0], None).await?;
        drop(first_permit);

        let rest = &partitions[1..];
        let mut futures = Vec::with_capacity(rest.len());
        for (offset, partition) in rest.iter().enumerate() {
            let semaphore = semaphore.clone();
            let snapshot_revision = snapshot_revision.clone();
            futures.push(async move {
                let permit = semaphore.acquire().await.expect("semaphore never closed");
                let page = query_partition_fully(list_fn, partition, Some(snapshot_revision)).await;
                drop(permit);
                (offset, page)
            });
        }

        let results = join_all(futures).await;
        let mut ordered: Vec<Option<Result<(Vec<T>, String), ListError>>> = (0..rest.len()).map(|_| None).collect();
        for (offset, page) in results {
            ordered[offset] = Some(page);
        }

        for entry in ordered {
            let (partition_items, _) = entry.expect("every partition index filled")?;
            items.extend(partition_items);
        }

        Ok(AggregatedList { items, revision: snapshot_revision })
    }
}

async fn query_partition_fully<T>(
    list_fn: &(dyn ListFn<T> + Send + Sync),
    partition: &Partition,
    revision: Option<String>,
) -> Result<(Vec<T>, String), ListError>
where
    T: Send + Clone + 'static,
{
    let mut items = Vec::new();
    let mut continue_token = None;
    let mut revision = revision;
    loop {
        let page = list_fn.call(partition, revision.clone(), None, continue_token.clone()).await?;
        revision = Some(page.revision.clone());
        items.extend(page.items);
        match page.continue_token {
            Some(token) if !token.is_empty() => continue_token = Some(token),
            _ => break,
        }
    }
    Ok((items, revision.unwrap_or_default()))
}

/// Continue-token payload for `limit`+`continue` pagination mode
/// (spec.md §4.5, §6): encodes which partition to resume, an inner token
/// scoped to that partition's backend, the revision the whole walk is
/// consistent as-of, and the caller's requested page size.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ContinueToken {
    pub revision: String,
    pub partition: usize,
    pub inner_continue: Option<String>,
    pub limit: i64,
}

impl ContinueToken {
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("ContinueToken always serializes");
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, json)
    }

    pub fn decode(token: &str) -> Result<Self, ListError> {
        let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, token)
            .map_err(|err| ListError::InvalidContinueToken { message: err.to_string() })?;
        serde_json::from_slice(&bytes)
            .map_err(|err| ListError::InvalidContinueToken { message: err.to_string() })
    }
}

/// A single page of a `limit`+`continue` walk across partitions: the current
/// partition is exhausted before moving to the next (spec.md §4.5's
/// "requests N items from the current partition" read literally, rather than
/// spanning partitions within one backend call).
pub struct PaginatedWalk;

impl PaginatedWalk {
    pub async fn next_page<T>(
        list_fn: &(dyn ListFn<T> + Send + Sync),
        partitions: &[Partition],
        limit: i64,
        continue_token: Option<String>,
    ) -> Result<(PartitionPage<T>, Option<String>), ListError>
    where
        T: Send + Clone + 'static,
    {
        let (partition_index, inner_continue, revision) = match &continue_token {
            Some(token) => {
                let decoded = ContinueToken::decode(token)?;
                (decoded.partition, decoded.inner_continue, Some(decoded.revision))
            }
            None => (0, None, None),
        };

        let partition = partitions
            .get(partition_index)
            .ok_or_else(|| ListError::InvalidContinueToken {
                message: format!("partition index {partition_index} out of range"),
            })?;

        let mut page = list_fn
            .call(partition, revision.clone(), Some(limit), inner_continue)
            .await?;
        if let Some(revision) = revision {
            // A walk in progress keeps the revision it started with, even if
            // the backend would otherwise report a newer one for this page.
            page.revision = revision;
        }

        let next_token = if page.continue_token.as_deref().is_some_and(|token| !token.is_empty()) {
            Some(
                ContinueToken {
                    revision: page.revision.clone(),
                    partition: partition_index,
                    inner_continue: page.continue_token.clone(),
                    limit,
                }
                .encode(),
            )
        } else if partition_index + 1 < partitions.len() {
            Some(
                ContinueToken {
                    revision: page.revision.clone(),
                    partition: partition_index + 1,
                    inner_continue: None,
                    limit,
                }
                .encode(),
            )
        } else {
            None
        };

        Ok((page, next_token))
    }
}

/// `pagesize`+`page` pagination mode (spec.md §4.5, §6): fully materializes
/// the aggregated list, then slices it in memory. Simple, O(n) per page, and
/// matches the window semantics the spec calls for rather than a cursor.
pub async fn paged_window<T>(
    list_fn: &(dyn ListFn<T> + Send + Sync),
    partitions: &[Partition],
    page_size: usize,
    page: usize,
) -> Result<(Vec<T>, String), ListError>
where
    T: Send + Clone + 'static,
{
    let aggregated = PartitionedLister::list_all(list_fn, partitions).await?;
    let start = page.saturating_mul(page_size).min(aggregated.items.len());
    let end = start.saturating_add(page_size).min(aggregated.items.len());
    Ok((aggregated.items[start..end].to_vec(), aggregated.revision))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    struct FixedListFn {
        pages: Vec<(String, Vec<i32>)>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ListFn<i32> for FixedListFn {
        async fn call(
            &self,
            partition: &Partition,
            _revision: Option<String>,
            _limit: Option<i64>,
            _continue_token: Option<String>,
        ) -> Result<PartitionPage<i32>, ListError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let index: usize = partition.namespace.parse().unwrap_or(0);
            let (revision, items) = self.pages[index].clone();
            Ok(PartitionPage {
                items,
                revision,
                continue_token: None,
                remaining_item_count: None,
            })
        }
    }

    fn partitions(n: usize) -> Vec<Partition> {
        (0..n)
            .map(|i| Partition {
                namespace: i.to_string(),
                ..Default::default()
            })
            .collect()
    }

    #[tokio::test]
    async fn list_all_preserves_partition_order() {
        let list_fn = FixedListFn {
            pages: vec![
                ("rev1".into(), vec![1, 2]),
                ("rev1".into(), vec![3, 4]),
                ("rev1".into(), vec![5]),
            ],
            calls: AtomicUsize::new(0),
        };
        let result = PartitionedLister::list_all(&list_fn, &partitions(3)).await.unwrap();
        assert_eq!(result.items, vec![1, 2, 3, 4, 5]);
        assert_eq!(result.revision, "rev1");
    }

    #[tokio::test]
    async fn list_all_empty_partitions_yields_empty_result() {
        let list_fn = FixedListFn { pages: vec![], calls: AtomicUsize::new(0) };
        let result = PartitionedLister::list_all(&list_fn, &[]).await.unwrap();
        assert!(result.items.is_empty());
    }

    struct SlowFirstListFn;

    #[async_trait]
    impl ListFn<i32> for SlowFirstListFn {
        async fn call(
            &self,
            partition: &Partition,
            _revision: Option<String>,
            _limit: Option<i64>,
            _continue_token: Option<String>,
        ) -> Result<PartitionPage<i32>, ListError> {
            let index: usize = partition.namespace.parse().unwrap_or(0);
            if index == 0 {
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
            Ok(PartitionPage {
                items: vec![index as i32],
                revision: "rev".into(),
                continue_token: None,
                remaining_item_count: None,
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn slow_first_partition_still_publishes_first() {
        let result = PartitionedLister::list_all(&SlowFirstListFn, &partitions(3)).await.unwrap();
        assert_eq!(result.items, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn paged_window_slices_aggregated_result() {
        let list_fn = FixedListFn {
            pages: vec![("rev1".into(), vec![1, 2, 3, 4, 5])],
            calls: AtomicUsize::new(0),
        };
        let (items, _) = paged_window(&list_fn, &partitions(1), 2, 1).await.unwrap();
        assert_eq!(items, vec![3, 4]);
    }

    #[test]
    fn continue_token_round_trips() {
        let token = ContinueToken {
            revision: "rev1".into(),
            partition: 2,
            inner_continue: Some("abc".into()),
            limit: 50,
        };
        let encoded = token.encode();
        let decoded = ContinueToken::decode(&encoded).unwrap();
        assert_eq!(decoded.partition, 2);
        assert_eq!(decoded.inner_continue, Some("abc".into()));
    }

    #[tokio::test]
    async fn paginated_walk_advances_to_next_partition() {
        struct OneItemPerPartition;
        #[async_trait]
        impl ListFn<i32> for OneItemPerPartition {
            async fn call(
                &self,
                partition: &Partition,
                _revision: Option<String>,
                _limit: Option<i64>,
                _continue_token: Option<String>,
            ) -> Result<PartitionPage<i32>, ListError> {
                let index: usize = partition.namespace.parse().unwrap_or(0);
                Ok(PartitionPage {
                    items: vec![index as i32],
                    revision: "rev1".into(),
                    continue_token: None,
                    remaining_item_count: None,
                })
            }
        }

        let parts = partitions(2);
        let (page1, token1) = PaginatedWalk::next_page(&OneItemPerPartition, &parts, 10, None)
            .await
            .unwrap();
        assert_eq!(page1.items, vec![0]);
        let token1 = token1.expect("more partitions remain");

        let (page2, token2) = PaginatedWalk::next_page(&OneItemPerPartition, &parts, 10, Some(token1))
            .await
            .unwrap();
        assert_eq!(page2.items, vec![1]);
        assert!(token2.is_none());
    }
}
