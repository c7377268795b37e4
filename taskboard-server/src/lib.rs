//! Taskboard server library.
//!
//! Exposes the server for use in tests and embedding. The server keeps a
//! shared set of task records behind a small REST API and pushes every change
//! to all connected WebSocket clients through a single ordered broadcast
//! channel drained by one dispatcher.

pub mod api;
pub mod broadcast;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod registry;
pub mod server;
pub mod store;
