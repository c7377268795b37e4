//! Shared definitions for the Taskboard wire format.
//!
//! A [`task::Task`] is both the stored record and the real-time event: every
//! WebSocket frame exchanged with the server carries exactly one task, encoded
//! with [`codec`].

pub mod codec;
pub mod task;
