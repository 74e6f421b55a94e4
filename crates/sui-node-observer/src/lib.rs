// Numan Thabit 2025
//! Polls Sui RPC servers, full nodes, validators and peers, derives rates,
//! sync percentages and health per host, and publishes per-group snapshots.

pub mod address;
pub mod config;
pub mod controller;
pub mod error;
pub mod geo;
pub mod health;
pub mod host;
pub mod http;
pub mod metrics;
pub mod poller;
pub mod rpc;
pub mod scrape;
pub mod state;
pub mod store;
pub mod system;
pub mod watch;

pub use address::Group;
pub use controller::{Controller, RoundReport};
pub use error::{ObserverError, Result};
pub use health::Status;
pub use state::SnapshotBoard;
pub use watch::{WatchLoop, WatchState};
