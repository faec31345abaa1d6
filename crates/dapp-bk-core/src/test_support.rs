//! Test support utilities for dapp-bk-core
//!
//! Provides MockProvider and MockRunner for unit testing the StackManager and
//! network repair without requiring a real Docker engine or host shell.

use crate::network_fix::{CommandRunner, StepOutput};
use async_trait::async_trait;
use dapp_bk_config::ProjectEnv;
use dapp_bk_provider::*;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Records which methods were called on the mock
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    InspectNetwork { name: String },
    CreateNetwork { name: String },
    InspectContainer { name: String },
    Build { tag: String },
    BuildWithProgress { tag: String },
    Create { image: String, name: Option<String> },
    Start { id: String },
    Stop { id: String },
    Remove { id: String, remove_volumes: bool },
    Exec { id: String, cmd: Vec<String> },
    ExecWithProgress {
        id: String,
        cmd: Vec<String>,
        working_dir: Option<String>,
    },
}

/// In-memory container engine.
///
/// Networks and containers live in shared maps so that a create followed by
/// an inspect behaves like a real engine. Errors can be injected per method.
pub struct MockProvider {
    pub calls: Arc<Mutex<Vec<MockCall>>>,
    pub networks: Arc<Mutex<HashSet<String>>>,
    /// Containers keyed by name
    pub containers: Arc<Mutex<HashMap<String, ContainerDetails>>>,
    /// Last create config seen
    pub last_create: Arc<Mutex<Option<CreateContainerConfig>>>,
    /// Last build config seen
    pub last_build: Arc<Mutex<Option<BuildConfig>>>,
    /// Exit codes for exec calls, matched by command prefix (joined with spaces)
    pub exec_exit_codes: Arc<Mutex<Vec<(String, i64)>>>,
    /// Chunks streamed by exec_with_progress
    pub exec_output: Arc<Mutex<Vec<String>>>,
    /// Lines streamed by build_with_progress
    pub build_output: Arc<Mutex<Vec<String>>>,
    pub create_network_error: Arc<Mutex<Option<String>>>,
    pub build_error: Arc<Mutex<Option<String>>>,
    pub create_error: Arc<Mutex<Option<String>>>,
    pub start_error: Arc<Mutex<Option<String>>>,
    pub stop_error: Arc<Mutex<Option<String>>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create an empty engine where every call succeeds
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            networks: Arc::new(Mutex::new(HashSet::new())),
            containers: Arc::new(Mutex::new(HashMap::new())),
            last_create: Arc::new(Mutex::new(None)),
            last_build: Arc::new(Mutex::new(None)),
            exec_exit_codes: Arc::new(Mutex::new(Vec::new())),
            exec_output: Arc::new(Mutex::new(Vec::new())),
            build_output: Arc::new(Mutex::new(vec!["Step 1/1 : FROM scratch\n".to_string()])),
            create_network_error: Arc::new(Mutex::new(None)),
            build_error: Arc::new(Mutex::new(None)),
            create_error: Arc::new(Mutex::new(None)),
            start_error: Arc::new(Mutex::new(None)),
            stop_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Pre-populate a network
    pub fn with_network(self, name: &str) -> Self {
        self.networks.lock().unwrap().insert(name.to_string());
        self
    }

    /// Pre-populate a container
    pub fn with_container(self, name: &str, status: ContainerStatus) -> Self {
        self.containers.lock().unwrap().insert(
            name.to_string(),
            mock_container_details(&format!("{}-id", name), name, status),
        );
        self
    }

    /// Make exec calls whose command starts with `prefix` exit with `code`
    pub fn with_exec_exit_code(self, prefix: &str, code: i64) -> Self {
        self.exec_exit_codes
            .lock()
            .unwrap()
            .push((prefix.to_string(), code));
        self
    }

    /// Record a call
    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn exit_code_for(&self, cmd: &[String]) -> i64 {
        let joined = cmd.join(" ");
        self.exec_exit_codes
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| joined.starts_with(prefix.as_str()))
            .map(|(_, code)| *code)
            .unwrap_or(0)
    }

    fn set_status(&self, id: &ContainerId, status: ContainerStatus) {
        let mut containers = self.containers.lock().unwrap();
        if let Some(c) = containers.values_mut().find(|c| &c.id == id) {
            c.status = status;
        }
    }
}

/// Take an injected error, if any, as a runtime error
fn injected(slot: &Arc<Mutex<Option<String>>>) -> Result<()> {
    match slot.lock().unwrap().as_ref() {
        Some(msg) => Err(ProviderError::RuntimeError(msg.clone())),
        None => Ok(()),
    }
}

/// Build a ProjectEnv from literal `KEY=value` pairs
pub fn project_env(pairs: &[(&str, &str)]) -> ProjectEnv {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    ProjectEnv::from_vars(vars).unwrap()
}

/// Create a mock ContainerDetails
pub fn mock_container_details(id: &str, name: &str, status: ContainerStatus) -> ContainerDetails {
    ContainerDetails {
        id: ContainerId::new(id),
        name: name.to_string(),
        image: name.to_string(),
        status,
    }
}

#[async_trait]
impl ContainerProvider for MockProvider {
    async fn inspect_network(&self, name: &str) -> Result<Option<NetworkDetails>> {
        self.record(MockCall::InspectNetwork {
            name: name.to_string(),
        });
        Ok(self
            .networks
            .lock()
            .unwrap()
            .contains(name)
            .then(|| NetworkDetails {
                id: format!("{}-id", name),
                name: name.to_string(),
                driver: "bridge".to_string(),
            }))
    }

    async fn create_network(&self, name: &str) -> Result<String> {
        self.record(MockCall::CreateNetwork {
            name: name.to_string(),
        });
        injected(&self.create_network_error)?;
        self.networks.lock().unwrap().insert(name.to_string());
        Ok(format!("{}-id", name))
    }

    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerDetails>> {
        self.record(MockCall::InspectContainer {
            name: name.to_string(),
        });
        Ok(self.containers.lock().unwrap().get(name).cloned())
    }

    async fn build(&self, config: &BuildConfig) -> Result<ImageId> {
        self.record(MockCall::Build {
            tag: config.tag.clone(),
        });
        *self.last_build.lock().unwrap() = Some(config.clone());
        if let Some(msg) = self.build_error.lock().unwrap().as_ref() {
            return Err(ProviderError::BuildError(msg.clone()));
        }
        Ok(ImageId::new("sha256:mock_image_id"))
    }

    async fn build_with_progress(
        &self,
        config: &BuildConfig,
        progress: mpsc::UnboundedSender<String>,
    ) -> Result<ImageId> {
        self.record(MockCall::BuildWithProgress {
            tag: config.tag.clone(),
        });
        *self.last_build.lock().unwrap() = Some(config.clone());
        for line in self.build_output.lock().unwrap().iter() {
            let _ = progress.send(line.clone());
        }
        if let Some(msg) = self.build_error.lock().unwrap().as_ref() {
            return Err(ProviderError::BuildError(msg.clone()));
        }
        Ok(ImageId::new("sha256:mock_image_id"))
    }

    async fn create(&self, config: &CreateContainerConfig) -> Result<ContainerId> {
        self.record(MockCall::Create {
            image: config.image.clone(),
            name: config.name.clone(),
        });
        *self.last_create.lock().unwrap() = Some(config.clone());
        injected(&self.create_error)?;

        let name = config.name.clone().unwrap_or_else(|| "anonymous".to_string());
        let id = format!("{}-new-id", name);
        let mut details = mock_container_details(&id, &name, ContainerStatus::Created);
        details.image = config.image.clone();
        self.containers.lock().unwrap().insert(name, details);
        Ok(ContainerId::new(id))
    }

    async fn start(&self, id: &ContainerId) -> Result<()> {
        self.record(MockCall::Start { id: id.0.clone() });
        injected(&self.start_error)?;
        self.set_status(id, ContainerStatus::Running);
        Ok(())
    }

    async fn stop(&self, id: &ContainerId, _timeout: Option<u32>) -> Result<()> {
        self.record(MockCall::Stop { id: id.0.clone() });
        injected(&self.stop_error)?;
        self.set_status(id, ContainerStatus::Exited);
        Ok(())
    }

    async fn remove(&self, id: &ContainerId, remove_volumes: bool) -> Result<()> {
        self.record(MockCall::Remove {
            id: id.0.clone(),
            remove_volumes,
        });
        self.containers.lock().unwrap().retain(|_, c| &c.id != id);
        Ok(())
    }

    async fn exec(&self, id: &ContainerId, config: &ExecConfig) -> Result<ExecResult> {
        self.record(MockCall::Exec {
            id: id.0.clone(),
            cmd: config.cmd.clone(),
        });
        Ok(ExecResult {
            exit_code: self.exit_code_for(&config.cmd),
            output: String::new(),
        })
    }

    async fn exec_with_progress(
        &self,
        id: &ContainerId,
        config: &ExecConfig,
        output: mpsc::UnboundedSender<String>,
    ) -> Result<i64> {
        self.record(MockCall::ExecWithProgress {
            id: id.0.clone(),
            cmd: config.cmd.clone(),
            working_dir: config.working_dir.clone(),
        });
        for chunk in self.exec_output.lock().unwrap().iter() {
            let _ = output.send(chunk.clone());
        }
        Ok(self.exit_code_for(&config.cmd))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            provider_type: ProviderType::Docker,
            api_version: "mock".to_string(),
        }
    }
}

/// Host command runner that records invocations and fails on demand
#[derive(Default)]
pub struct MockRunner {
    /// Every `program args...` line run, in order
    pub runs: Arc<Mutex<Vec<String>>>,
    /// Command lines (exact) that exit non-zero
    pub failing: Arc<Mutex<HashSet<String>>>,
    /// Command lines (exact) that exit non-zero printing only to stdout
    pub failing_quietly: Arc<Mutex<HashMap<String, String>>>,
    /// Command lines (exact) that cannot be spawned at all
    pub unspawnable: Arc<Mutex<HashSet<String>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `line` exit non-zero with a stderr message
    pub fn failing_on(self, line: &str) -> Self {
        self.failing.lock().unwrap().insert(line.to_string());
        self
    }

    /// Make `line` exit non-zero with `stdout` and an empty stderr
    pub fn failing_quietly_on(self, line: &str, stdout: &str) -> Self {
        self.failing_quietly
            .lock()
            .unwrap()
            .insert(line.to_string(), stdout.to_string());
        self
    }

    /// Make `line` fail to spawn
    pub fn unspawnable(self, line: &str) -> Self {
        self.unspawnable.lock().unwrap().insert(line.to_string());
        self
    }

    pub fn get_runs(&self) -> Vec<String> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, program: &str, args: &[&str]) -> std::io::Result<StepOutput> {
        let mut line = program.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.runs.lock().unwrap().push(line.clone());

        if self.unspawnable.lock().unwrap().contains(&line) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}: command not found", program),
            ));
        }

        if self.failing.lock().unwrap().contains(&line) {
            return Ok(StepOutput {
                success: false,
                stdout: String::new(),
                stderr: format!("{} failed", line),
            });
        }

        if let Some(stdout) = self.failing_quietly.lock().unwrap().get(&line) {
            return Ok(StepOutput {
                success: false,
                stdout: stdout.clone(),
                stderr: String::new(),
            });
        }

        Ok(StepOutput {
            success: true,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}
