//! Runtime surface: admin console and process bootstrap.

pub mod admin;
#[cfg(unix)]
pub mod server;

pub use admin::{AdminCommand, AdminOutcome};
#[cfg(unix)]
pub use server::serve;
