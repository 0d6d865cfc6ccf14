//! Generic CRUD/watch façade over user-supplied storage backends, bridging
//! them into authorization-enforced, status-coded operations.
//!
//! This crate implements components C7 ([`delegate::ResourceDelegate`]) and
//! C8 ([`watch::Watcher`]/[`watch::forward`]).

pub mod delegate;
pub mod status_error;
pub mod watch;

pub use delegate::{Backend, ListOptions, RequestContext, ResourceDelegate, TableRow, UpdateResult, Validation};
pub use status_error::{StatusError, StatusErrorKind};
pub use watch::{forward, WatchEvent, Watcher};
