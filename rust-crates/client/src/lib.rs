pub mod chain;
pub mod config;
pub mod controller;
pub mod identity;
pub mod leaderboard;
pub mod network_switch;
pub mod orchestrator;
pub mod preflight;
pub mod reconciler;
pub mod rpc;
pub mod types;
pub mod wallets;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use deployments;
