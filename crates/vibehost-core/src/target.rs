//! Target resolution: `app` or `app@host` against the client config

use crate::{AppName, CoreError, Result};
use vibehost_config::ClientConfig;

/// A fully resolved target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub app: AppName,
    /// ssh destination, after alias expansion
    pub host: String,
}

/// Resolve `app` or `app@host`.
///
/// Splits on the last `@`. The host token is looked up in the alias table and
/// used literally when no alias matches; aliases are how a `user@host`
/// destination is expressed.
pub fn resolve_target(raw: &str, config: &ClientConfig) -> Result<Target> {
    let raw = raw.trim();
    let (app_part, host_part) = match raw.rsplit_once('@') {
        Some((app, host)) => (app, Some(host)),
        None => (raw, None),
    };

    let app = AppName::parse(app_part)
        .map_err(|_| CoreError::InvalidTarget(format!("app name is required in {:?}", raw)))?;

    let host = match host_part {
        Some(host) => {
            let host = host.trim();
            if host.is_empty() {
                return Err(CoreError::InvalidTarget(format!(
                    "host is empty in {:?}",
                    raw
                )));
            }
            config.resolve_alias(host).to_string()
        }
        None => resolve_host(None, config)?,
    };

    Ok(Target { app, host })
}

/// Resolve a bare host argument, defaulting to the configured default host
pub fn resolve_host(host: Option<&str>, config: &ClientConfig) -> Result<String> {
    let candidate = host
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| config.default_host.trim());
    if candidate.is_empty() {
        return Err(CoreError::MissingHost);
    }
    Ok(config.resolve_alias(candidate).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        let mut cfg = ClientConfig {
            default_host: "box".to_string(),
            ..Default::default()
        };
        cfg.set_host_mapping("box=root@box.internal").unwrap();
        cfg.set_host_mapping("lab=deploy@10.0.0.4").unwrap();
        cfg
    }

    #[test]
    fn test_app_only_uses_default_host() {
        let target = resolve_target("myapp", &config()).unwrap();
        assert_eq!(target.app.as_str(), "myapp");
        assert_eq!(target.host, "root@box.internal");
    }

    #[test]
    fn test_app_at_alias() {
        let target = resolve_target("myapp@lab", &config()).unwrap();
        assert_eq!(target.host, "deploy@10.0.0.4");
    }

    #[test]
    fn test_app_at_literal_host() {
        let target = resolve_target("myapp@example.com", &config()).unwrap();
        assert_eq!(target.host, "example.com");
    }

    #[test]
    fn test_splits_on_last_at() {
        let target = resolve_target("my@app@lab", &config()).unwrap();
        assert_eq!(target.app.as_str(), "my@app");
        assert_eq!(target.host, "deploy@10.0.0.4");
    }

    #[test]
    fn test_empty_app_is_invalid() {
        let err = resolve_target("  @lab", &config()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTarget(_)));
    }

    #[test]
    fn test_empty_host_is_invalid() {
        let err = resolve_target("myapp@ ", &config()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTarget(_)));
    }

    #[test]
    fn test_missing_default_host() {
        let err = resolve_target("myapp", &ClientConfig::default()).unwrap_err();
        assert!(matches!(err, CoreError::MissingHost));
    }

    #[test]
    fn test_resolve_host_prefers_argument() {
        assert_eq!(resolve_host(Some("lab"), &config()).unwrap(), "deploy@10.0.0.4");
        assert_eq!(resolve_host(None, &config()).unwrap(), "root@box.internal");
    }
}
