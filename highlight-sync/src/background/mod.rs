// Background process: message routing, delivery and the offline queue
// Shared between the daemon and in-process page tests

pub mod api;
pub mod auth;
pub mod config;
pub mod persistence;
pub mod protocol;
pub mod queue;
pub mod router;
pub mod scheduler;
pub mod screenshot;
