use thiserror::Error;

/// Returned by lookups and removals that require the key to be present.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Error)]
#[error("key does not exist")]
pub struct KeyNotFound;
