//! CLI command implementations

mod config;
mod server;
mod session;

pub use config::*;
pub use server::*;
pub use session::*;
