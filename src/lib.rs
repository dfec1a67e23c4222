//! Tessera: event-ticketing backend.
//!
//! The interesting parts live in [`services`]: the atomic purchase
//! transaction, the ticket lifecycle state machine, the flash-sale
//! redemption counter and the replay guard. Everything else is the
//! HTTP/store plumbing around them.

pub mod config;
pub mod credential;
pub mod handlers;
pub mod models;
pub mod notify;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
