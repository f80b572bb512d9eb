//! Unified infrastructure error.

use thiserror::Error;

use crate::config::ConfigError;
use crate::router::RouteError;
use crate::store::StoreError;

/// The error type returned by moc's fallible startup and serving operations.
///
/// Request-level failures are [`HttpError`](crate::HttpError)s and end up
/// as responses. This type covers what stops the process instead: a bad
/// configuration, a route table that does not build, a store that cannot be
/// opened, a port that cannot be bound.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("routes: {0}")]
    Route(#[from] RouteError),

    #[error("storage: {0}")]
    Store(#[from] StoreError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),
}
