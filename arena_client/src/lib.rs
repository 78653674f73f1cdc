//! `arena_client`
//!
//! Client-side systems:
//! - Connection handshake over the custom UDP protocol
//! - Input sampling and redundant transmission
//! - Prediction and server reconciliation
//! - Interpolation for remote entity states

pub mod client;
pub mod input;
pub mod interp;
pub mod predict;

pub use client::GameClient;
