//! docgate-daemon: TCP daemon for the docgate document processing service
//!
//! This crate provides:
//! - The framed wire protocol (headers, length-prefixed strings and payloads)
//! - The per-connection worker state machine (handshake, dispatch, teardown)
//! - The TCP acceptor and shared server state
//! - TOML configuration loading
//! - A synchronous client for control scripts and integration tests

pub mod client;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;

// Re-exports for convenience
pub use client::{AliveStatus, Client};
pub use config::{load_config, Config, DEFAULT_HOST, DEFAULT_PORT};
pub use protocol::{Header, ProtocolError};
pub use server::{Server, ServerState};
