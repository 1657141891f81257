//! RocketLead: turns a chat channel of lead notifications into a lead
//! database, and emoji reactions on those messages into call and sale
//! outcomes per agent.
//!
//! The reconciliation scanner replays channel history into the store; the
//! services layer answers dashboard and leaderboard queries from it.

pub mod db;
pub mod error;
mod migrations;
pub mod parser;
pub mod reconcile;
pub mod services;
pub mod source;
pub mod state;
pub mod status;
pub mod types;
