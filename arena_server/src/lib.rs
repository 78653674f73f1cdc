//! `arena_server`
//!
//! The authoritative half of the engine:
//! - fixed-timestep simulation loop
//! - client lifecycle (connect, timeout, disconnect)
//! - snapshot replication

pub mod client_manager;
pub mod server;

pub use server::GameServer;
