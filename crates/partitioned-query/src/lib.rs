//! Splits list/watch requests into per-namespace partitions sized to a
//! caller's RBAC grants, executes them concurrently against a backend, and
//! caches the aggregated result.
//!
//! This crate implements components C4–C6 of the aggregation layer:
//! [`partition::Partitioner`] (turns an `AccessSet` into a partition list),
//! [`lister::PartitionedLister`] (runs backend queries across partitions,
//! concurrently but in published order), and [`list_cache::ListCache`]
//! (caches the aggregated result).

pub mod list_cache;
pub mod lister;
pub mod partition;

pub use list_cache::{CacheBackend, ListCache, ListCacheKey};
pub use lister::{
    AggregatedList, ContinueToken, ListError, ListFn, PaginatedWalk, PartitionPage, PartitionedLister,
};
pub use partition::{ObjectId, Partition, PartitionRequest, PartitionWarning, Partitioner, Verb};
