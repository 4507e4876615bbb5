//! Ambient process environment, captured once at the binary boundary
//!
//! Components never call `std::env::var` themselves; they receive a
//! [`SessionEnv`] built by `main`.

use std::collections::HashMap;
use std::ffi::OsString;

/// Relays a desktop-open socket path into the container
pub const ENV_XDG_OPEN_SOCKET: &str = "VIBEHOST_XDG_OPEN_SOCKET";
/// Marks that the client already confirmed container creation
pub const ENV_AUTO_CREATE: &str = "VIBEHOST_AUTO_CREATE";
/// Base64 credential bundle staged by the client
pub const ENV_AUTH_BUNDLE: &str = "VIBEHOST_AUTH_BUNDLE";
/// Opaque agent health-check marker forwarded to the container
pub const ENV_AGENT_CHECK: &str = "VIBEHOST_AGENT_CHECK";
/// Overrides the base image used for new app containers
pub const ENV_IMAGE: &str = "VIBEHOST_IMAGE";

/// Snapshot of the environment variables vibehost cares about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionEnv {
    pub term: Option<String>,
    pub colorterm: Option<String>,
    pub agent_check: Option<String>,
    pub xdg_open_socket: Option<String>,
    pub auto_create: bool,
    pub auth_bundle: Option<String>,
    pub image: Option<String>,
}

impl SessionEnv {
    /// Capture from the current process environment
    pub fn from_env() -> Self {
        Self::from_os_vars(std::env::vars_os())
    }

    /// Build from raw OS variables. Pairs that are not valid UTF-8 are
    /// skipped rather than aborting the process.
    pub fn from_os_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        Self::from_vars(
            vars.into_iter()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
        )
    }

    /// Build from an explicit set of variables
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            term: get("TERM"),
            colorterm: get("COLORTERM"),
            agent_check: get(ENV_AGENT_CHECK),
            xdg_open_socket: get(ENV_XDG_OPEN_SOCKET),
            auto_create: get(ENV_AUTO_CREATE).is_some_and(|v| v == "1"),
            auth_bundle: get(ENV_AUTH_BUNDLE),
            image: get(ENV_IMAGE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_trims_and_drops_empty() {
        let env = SessionEnv::from_vars([
            ("TERM", " xterm-ghostty "),
            ("COLORTERM", "   "),
            (ENV_AGENT_CHECK, "vibehost-agent-check"),
        ]);
        assert_eq!(env.term.as_deref(), Some("xterm-ghostty"));
        assert_eq!(env.colorterm, None);
        assert_eq!(env.agent_check.as_deref(), Some("vibehost-agent-check"));
        assert!(!env.auto_create);
    }

    #[test]
    fn test_auto_create_requires_literal_one() {
        assert!(SessionEnv::from_vars([(ENV_AUTO_CREATE, "1")]).auto_create);
        assert!(!SessionEnv::from_vars([(ENV_AUTO_CREATE, "yes")]).auto_create);
        assert!(!SessionEnv::from_vars(Vec::<(String, String)>::new()).auto_create);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_variables_are_skipped() {
        use std::os::unix::ffi::OsStringExt;

        let env = SessionEnv::from_os_vars([
            (OsString::from("TERM"), OsString::from_vec(vec![0x78, 0xff, 0xfe])),
            (OsString::from_vec(vec![0xff]), OsString::from("junk")),
            (OsString::from(ENV_IMAGE), OsString::from("vibehost:dev")),
            (OsString::from(ENV_AUTO_CREATE), OsString::from("1")),
        ]);
        assert_eq!(env.term, None);
        assert_eq!(env.image.as_deref(), Some("vibehost:dev"));
        assert!(env.auto_create);
    }
}
