//! Point-in-time snapshots of app containers
//!
//! A snapshot is an image committed from the container into the app's own
//! repository (`snapshot-<app>`), tagged with a sortable UTC timestamp.

use crate::{AppName, ContainerLifecycle, CoreError, Result};
use chrono::{DateTime, Utc};
use vibehost_provider::ContainerEngine;

/// Reserved alias resolving to the newest tag
pub const LATEST_ALIAS: &str = "latest";

/// Tag format; lexicographic order equals chronological order
pub const TAG_FORMAT: &str = "%Y%m%d-%H%M%S";

/// An image reference `repo:tag`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRef {
    pub repo: String,
    pub tag: String,
}

impl SnapshotRef {
    pub fn new(repo: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            tag: tag.into(),
        }
    }

    /// Split an explicit `repo:tag` reference on its last separator
    fn from_reference(reference: &str) -> Option<Self> {
        let (repo, tag) = reference.rsplit_once(':')?;
        if repo.is_empty() || tag.is_empty() {
            return None;
        }
        Some(Self::new(repo, tag))
    }
}

impl std::fmt::Display for SnapshotRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repo, self.tag)
    }
}

/// Tag for a snapshot taken at `now`
pub fn snapshot_tag(now: DateTime<Utc>) -> String {
    now.format(TAG_FORMAT).to_string()
}

/// Drop untagged placeholders, then sort and dedup
fn clean_tags(raw: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = raw
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && t != "<none>")
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

pub struct SnapshotManager<'a> {
    engine: &'a dyn ContainerEngine,
}

impl<'a> SnapshotManager<'a> {
    pub fn new(engine: &'a dyn ContainerEngine) -> Self {
        Self { engine }
    }

    /// Commit the container into a new timestamped snapshot
    pub async fn create(&self, name: &str, app: &AppName) -> Result<SnapshotRef> {
        self.create_at(name, app, Utc::now()).await
    }

    pub async fn create_at(
        &self,
        name: &str,
        app: &AppName,
        now: DateTime<Utc>,
    ) -> Result<SnapshotRef> {
        let reference = SnapshotRef::new(app.snapshot_repo(), snapshot_tag(now));
        tracing::info!("Committing {} to {}", name, reference);
        self.engine.commit(name, &reference.to_string()).await?;
        Ok(reference)
    }

    /// All tags of the app's snapshots, ascending
    pub async fn list(&self, app: &AppName) -> Result<Vec<String>> {
        let raw = self.engine.image_tags(&app.snapshot_repo()).await?;
        Ok(clean_tags(raw))
    }

    /// Resolve `latest`, a bare tag, or an explicit `repo:tag`
    pub async fn resolve_ref(&self, app: &AppName, name: &str) -> Result<SnapshotRef> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Usage("snapshot reference is required".to_string()));
        }

        if name == LATEST_ALIAS {
            let tags = self.list(app).await?;
            let tag = tags
                .into_iter()
                .max()
                .ok_or_else(|| CoreError::NoSnapshots(app.to_string()))?;
            return Ok(SnapshotRef::new(app.snapshot_repo(), tag));
        }

        if name.contains(':') {
            return SnapshotRef::from_reference(name).ok_or_else(|| {
                CoreError::Snapshot(format!("invalid snapshot reference {:?}", name))
            });
        }

        Ok(SnapshotRef::new(app.snapshot_repo(), name))
    }

    /// Replace the app container with one created from `reference`
    pub async fn restore(
        &self,
        lifecycle: &ContainerLifecycle<'_>,
        name: &str,
        app: &AppName,
        port: u16,
        reference: &SnapshotRef,
    ) -> Result<()> {
        match self.engine.remove(name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!("No container to replace for {}: {}", name, e);
            }
            Err(e) => return Err(e.into()),
        }
        lifecycle
            .create_from_image(name, app, port, &reference.to_string())
            .await
    }

    /// Remove every snapshot image of the app. Returns how many were removed.
    pub async fn delete_all(&self, app: &AppName) -> Result<usize> {
        let repo = app.snapshot_repo();
        let mut removed = 0;
        for tag in self.list(app).await? {
            let reference = SnapshotRef::new(repo.clone(), tag);
            match self.engine.remove_image(&reference.to_string()).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("failed to remove snapshot {}: {}", reference, e),
            }
        }
        Ok(removed)
    }
}
