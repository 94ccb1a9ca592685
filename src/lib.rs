//! Inscription ledger indexer
//!
//! Scans a Dogecoin-family chain block by block, decodes meta-protocol inscriptions
//! (`drc-20`, `meme-20`, `wdoge`, `pair-v1`, `pair-v2`, `pump`, `invite`, `stake-v1`, `box-v1`,
//! `order-v1`) and applies them to a SQLite ledger with AMM pools, bonding curves, escrowed
//! sales and fork rollback.

pub mod address;
pub mod amm;
pub mod amount;
pub mod chain;
pub mod config;
pub mod decoder;
pub mod error;
pub mod fork;
pub mod invite;
pub mod ledger;
pub mod order;
pub mod protocol;
pub mod pump;
pub mod sale;
pub mod scanner;
pub mod stake;
pub mod store;
pub mod summary;
pub mod verify;
pub mod wdoge;

pub use amount::Amount;
pub use error::{IndexerError, IndexerResult};
