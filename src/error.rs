use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The caller-supplied fetch function failed. Propagated unchanged,
    /// never retried or suppressed by this crate.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// A cached query was executed with no fetch function configured.
    #[error("no fetch function configured for cached query")]
    MissingFetch,

    #[error("event build error: {0}")]
    Event(String),

    #[error("event parse error: {0}")]
    Parse(String),

    /// The shared sync state mutex was poisoned by a prior panic.
    #[error("sync state mutex poisoned by a prior panic")]
    StatePoisoned,
}

pub type Result<T> = std::result::Result<T, Error>;
