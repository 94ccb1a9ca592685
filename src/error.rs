//! Error taxonomy for the indexer core
//!
//! Each variant maps to one failure class with its own recovery rule:
//! - `Decode` - malformed payload, transaction skipped, no state touched
//! - `Validation` - precondition failed, error text persisted on the operation row
//! - `ChainNetwork` - node RPC failure, scan tick aborted and retried on the next timer fire
//! - `Consistency` - invariant broken mid-mutation, chain transaction rolled back
//! - `ForkReplay` - rollback itself failed, indexer refuses to advance until it succeeds

#[derive(Debug)]
pub enum IndexerError {
    Decode(String),
    Validation(String),
    ChainNetwork(String),
    Consistency(String),
    ForkReplay(String),
    Database(rusqlite::Error),
    Serialization(serde_json::Error),
    Io(std::io::Error),
    Config(String),
}

impl IndexerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        IndexerError::Validation(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        IndexerError::Consistency(msg.into())
    }

    /// True when the failure should be retried on the next scan tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, IndexerError::ChainNetwork(_) | IndexerError::ForkReplay(_))
    }

    /// True when the failure is a permanent rejection of one operation.
    pub fn is_rejection(&self) -> bool {
        matches!(self, IndexerError::Validation(_) | IndexerError::Consistency(_))
    }
}

impl From<rusqlite::Error> for IndexerError {
    fn from(err: rusqlite::Error) -> Self {
        IndexerError::Database(err)
    }
}

impl From<serde_json::Error> for IndexerError {
    fn from(err: serde_json::Error) -> Self {
        IndexerError::Serialization(err)
    }
}

impl From<std::io::Error> for IndexerError {
    fn from(err: std::io::Error) -> Self {
        IndexerError::Io(err)
    }
}

impl From<reqwest::Error> for IndexerError {
    fn from(err: reqwest::Error) -> Self {
        IndexerError::ChainNetwork(err.to_string())
    }
}

impl std::fmt::Display for IndexerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexerError::Decode(e) => write!(f, "decode error: {}", e),
            IndexerError::Validation(e) => write!(f, "{}", e),
            IndexerError::ChainNetwork(e) => write!(f, "chain network error: {}", e),
            IndexerError::Consistency(e) => write!(f, "consistency error: {}", e),
            IndexerError::ForkReplay(e) => write!(f, "fork replay failed: {}", e),
            IndexerError::Database(e) => write!(f, "database error: {}", e),
            IndexerError::Serialization(e) => write!(f, "serialization error: {}", e),
            IndexerError::Io(e) => write!(f, "IO error: {}", e),
            IndexerError::Config(e) => write!(f, "config error: {}", e),
        }
    }
}

impl std::error::Error for IndexerError {}

pub type IndexerResult<T> = Result<T, IndexerError>;
