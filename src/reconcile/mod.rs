//! Reconciliation of the stored lead set against the chat channel history.
//!
//! A scan replays every message and re-derives each lead's status and agent
//! from its current reactions. Running it twice over the same history leaves
//! the store and the sales counters exactly as they were.

pub mod poller;
pub mod scanner;

pub use scanner::{reconcile_message, resolve_reactions, run_scan, ScanReport};
