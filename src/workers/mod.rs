//! Polling workers for the two pipeline stages.
//!
//! Each worker owns an independent 1-second polling loop. Cross-worker
//! coordination happens only through the queue's atomic reservation, so
//! any number of worker processes can share one database.

pub mod embed;
pub mod ingest;

use std::time::Duration;

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
