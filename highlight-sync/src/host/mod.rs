// Hosting for the background process: paths, the socket server and its client
// Unix only for now

pub mod config;

#[cfg(unix)]
pub mod client;
#[cfg(unix)]
pub mod server;
