//! Test support utilities for vibehost-core
//!
//! Provides an in-memory [`MockEngine`] so lifecycle, snapshot and server
//! flows can be exercised without a container runtime.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use vibehost_provider::*;

/// Records which methods were called on the mock
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Exists { name: String },
    IsRunning { name: String },
    PublishedPort { name: String },
    ListNames,
    Run { name: String, image: String },
    Start { name: String },
    Remove { name: String },
    Commit { name: String, reference: String },
    ImageTags { repo: String },
    RemoveImage { reference: String },
    CopyInto { name: String, dest: String },
    Exec { name: String, cmd: Vec<String>, tty: bool },
}

/// A container known to the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockContainer {
    pub running: bool,
    pub port: Option<u16>,
    pub image: String,
}

/// Configurable in-memory container engine
#[derive(Default)]
pub struct MockEngine {
    pub calls: Mutex<Vec<MockCall>>,
    pub containers: Mutex<BTreeMap<String, MockContainer>>,
    /// repo -> raw tag column, as `docker images` would print it
    pub images: Mutex<BTreeMap<String, Vec<String>>>,
    /// Last configuration passed to `run`
    pub last_run: Mutex<Option<RunConfig>>,
    /// Last configuration passed to `exec_interactive`
    pub last_exec: Mutex<Option<ExecConfig>>,
    /// Files seen by `copy_into`, relative to the copied directory
    pub copied_files: Mutex<Vec<(String, Vec<u8>)>>,
    pub exec_exit_code: Mutex<i32>,
    pub inspect_error: Mutex<Option<String>>,
    pub create_error: Mutex<Option<String>>,
    pub start_error: Mutex<Option<String>>,
    /// Daemon failure returned by `remove`; the container is kept
    pub remove_error: Mutex<Option<String>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_container(&self, name: &str, running: bool, port: Option<u16>) {
        self.containers.lock().unwrap().insert(
            name.to_string(),
            MockContainer {
                running,
                port,
                image: "vibehost:latest".to_string(),
            },
        );
    }

    pub fn add_image_tag(&self, repo: &str, tag: &str) {
        self.images
            .lock()
            .unwrap()
            .entry(repo.to_string())
            .or_default()
            .push(tag.to_string());
    }

    pub fn container(&self, name: &str) -> Option<MockContainer> {
        self.containers.lock().unwrap().get(name).cloned()
    }

    pub fn tags(&self, repo: &str) -> Vec<String> {
        self.images
            .lock()
            .unwrap()
            .get(repo)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn was_called(&self, call: &MockCall) -> bool {
        self.calls.lock().unwrap().contains(call)
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn not_found(name: &str) -> String {
        format!("Error: No such object: {}", name)
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<(String, Vec<u8>)>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out);
        } else if let Ok(content) = std::fs::read(&path) {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .to_string();
            out.push((rel, content));
        }
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn exists(&self, name: &str) -> Result<bool> {
        self.record(MockCall::Exists {
            name: name.to_string(),
        });
        if let Some(err) = self.inspect_error.lock().unwrap().clone() {
            return Err(ProviderError::Inspect(err));
        }
        Ok(self.containers.lock().unwrap().contains_key(name))
    }

    async fn is_running(&self, name: &str) -> Result<bool> {
        self.record(MockCall::IsRunning {
            name: name.to_string(),
        });
        self.container(name)
            .map(|c| c.running)
            .ok_or_else(|| ProviderError::Inspect(Self::not_found(name)))
    }

    async fn published_port(&self, name: &str, _container_port: u16) -> Result<Option<u16>> {
        self.record(MockCall::PublishedPort {
            name: name.to_string(),
        });
        self.container(name)
            .map(|c| c.port)
            .ok_or_else(|| ProviderError::Inspect(Self::not_found(name)))
    }

    async fn list_names(&self) -> Result<Vec<String>> {
        self.record(MockCall::ListNames);
        Ok(self.containers.lock().unwrap().keys().cloned().collect())
    }

    async fn run(&self, config: &RunConfig) -> Result<()> {
        self.record(MockCall::Run {
            name: config.name.clone(),
            image: config.image.clone(),
        });
        if let Some(err) = self.create_error.lock().unwrap().clone() {
            return Err(ProviderError::Create(err));
        }
        let mut containers = self.containers.lock().unwrap();
        if containers.contains_key(&config.name) {
            return Err(ProviderError::Create(format!(
                "Conflict. The container name \"/{}\" is already in use",
                config.name
            )));
        }
        containers.insert(
            config.name.clone(),
            MockContainer {
                running: true,
                port: config.ports.first().map(|p| p.host_port),
                image: config.image.clone(),
            },
        );
        *self.last_run.lock().unwrap() = Some(config.clone());
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.record(MockCall::Start {
            name: name.to_string(),
        });
        if let Some(err) = self.start_error.lock().unwrap().clone() {
            return Err(ProviderError::Start(err));
        }
        match self.containers.lock().unwrap().get_mut(name) {
            Some(c) => {
                c.running = true;
                Ok(())
            }
            None => Err(ProviderError::Start(Self::not_found(name))),
        }
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.record(MockCall::Remove {
            name: name.to_string(),
        });
        if let Some(err) = self.remove_error.lock().unwrap().clone() {
            return Err(ProviderError::Runtime(err));
        }
        match self.containers.lock().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(ProviderError::NotFound(format!(
                "Error response from daemon: No such container: {}",
                name
            ))),
        }
    }

    async fn commit(&self, name: &str, reference: &str) -> Result<()> {
        self.record(MockCall::Commit {
            name: name.to_string(),
            reference: reference.to_string(),
        });
        if self.container(name).is_none() {
            return Err(ProviderError::Commit(format!(
                "Error response from daemon: No such container: {}",
                name
            )));
        }
        let (repo, tag) = reference
            .rsplit_once(':')
            .unwrap_or((reference, "latest"));
        self.add_image_tag(repo, tag);
        Ok(())
    }

    async fn image_tags(&self, repo: &str) -> Result<Vec<String>> {
        self.record(MockCall::ImageTags {
            repo: repo.to_string(),
        });
        Ok(self.tags(repo))
    }

    async fn remove_image(&self, reference: &str) -> Result<()> {
        self.record(MockCall::RemoveImage {
            reference: reference.to_string(),
        });
        let (repo, tag) = reference
            .rsplit_once(':')
            .unwrap_or((reference, "latest"));
        if let Some(tags) = self.images.lock().unwrap().get_mut(repo) {
            tags.retain(|t| t != tag);
        }
        Ok(())
    }

    async fn copy_into(&self, name: &str, src: &Path, dest: &str) -> Result<()> {
        self.record(MockCall::CopyInto {
            name: name.to_string(),
            dest: dest.to_string(),
        });
        let mut files = Vec::new();
        collect_files(src, src, &mut files);
        self.copied_files.lock().unwrap().extend(files);
        Ok(())
    }

    async fn exec_interactive(&self, name: &str, config: &ExecConfig) -> Result<i32> {
        self.record(MockCall::Exec {
            name: name.to_string(),
            cmd: config.cmd.clone(),
            tty: config.tty,
        });
        *self.last_exec.lock().unwrap() = Some(config.clone());
        Ok(*self.exec_exit_code.lock().unwrap())
    }

    fn info(&self) -> EngineInfo {
        EngineInfo {
            engine_type: EngineType::Docker,
            program: "mock".to_string(),
        }
    }
}
