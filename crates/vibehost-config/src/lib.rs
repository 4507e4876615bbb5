//! Configuration for vibehost
//!
//! This crate handles:
//! - Client configuration (`~/.config/vibehost/config.json`)
//! - The ambient session environment, captured once at process start

mod client;
mod env;
mod error;

pub use client::*;
pub use env::*;
pub use error::*;
