//! Core session and state orchestration for vibehost
//!
//! The client side resolves a target and assembles one ssh invocation; the
//! server side keeps the port state, drives the app container and snapshots.
//! The two only share the command line encoded in [`protocol`].

pub mod auth;
mod error;
pub mod lifecycle;
pub mod naming;
pub mod open_bridge;
pub mod prompt;
pub mod protocol;
pub mod server;
pub mod snapshot;
pub mod state;
pub mod target;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use auth::AuthBundle;
pub use error::*;
pub use lifecycle::{ContainerLifecycle, APP_PORT, DEFAULT_IMAGE};
pub use naming::AppName;
pub use open_bridge::{DesktopOpener, OpenBridge, UrlOpener};
pub use protocol::{AgentProvider, RemoteAction, RemoteCommand, SERVER_BINARY};
pub use server::{Server, ServerOptions};
pub use snapshot::{SnapshotManager, SnapshotRef};
pub use state::PortStateStore;
pub use target::{resolve_host, resolve_target, Target};
pub use transport::{LocalForward, RemoteSocketForward, SessionSpec, SshTransport};
