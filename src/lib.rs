//! Chain-reorg monitor library surface, shared by `main.rs` and the
//! integration tests in `tests/`. Split out of the binary the way the
//! teacher keeps its modules directly reachable for testing rather than
//! burying everything behind `mod` declarations private to `main.rs`.
pub mod aggregator;
pub mod alert;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod metrics;
pub mod monitor;
pub mod processor;
pub mod rpc;
pub mod telemetry;
pub mod tick;
pub mod types;
