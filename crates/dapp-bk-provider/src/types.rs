//! Common types for container providers

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Container ID wrapper
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(pub String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ContainerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Image ID wrapper
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageId(pub String);

impl ImageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Container engine flavour behind the Docker-compatible API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Docker,
    Podman,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Docker => write!(f, "docker"),
            Self::Podman => write!(f, "podman"),
        }
    }
}

impl std::str::FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            _ => Err(format!("Unknown provider type: {}", s)),
        }
    }
}

/// Container status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Unknown,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Restarting => write!(f, "restarting"),
            Self::Removing => write!(f, "removing"),
            Self::Exited => write!(f, "exited"),
            Self::Dead => write!(f, "dead"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl From<&str> for ContainerStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }
}

/// Build configuration for creating images
#[derive(Debug, Clone, Default)]
pub struct BuildConfig {
    /// Path to the build context
    pub context: PathBuf,
    /// Dockerfile path (relative to context)
    pub dockerfile: String,
    /// Image tag
    pub tag: String,
    /// Build arguments
    pub build_args: HashMap<String, String>,
}

/// Configuration for creating a container
#[derive(Debug, Clone, Default)]
pub struct CreateContainerConfig {
    /// Image to use
    pub image: String,
    /// Container name
    pub name: Option<String>,
    /// Network to attach to
    pub network: Option<String>,
    /// Volume mounts
    pub mounts: Vec<MountConfig>,
    /// Port mappings
    pub ports: Vec<PortConfig>,
}

/// Bind mount from the host into the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountConfig {
    /// Host path
    pub source: String,
    /// Target path in container
    pub target: String,
    pub read_only: bool,
}

/// Port configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConfig {
    pub host_port: u16,
    pub container_port: u16,
    /// Protocol (tcp/udp)
    pub protocol: String,
}

impl PortConfig {
    pub fn tcp(host_port: u16, container_port: u16) -> Self {
        Self {
            host_port,
            container_port,
            protocol: "tcp".to_string(),
        }
    }
}

/// Exec configuration
#[derive(Debug, Clone, Default)]
pub struct ExecConfig {
    /// Command to execute
    pub cmd: Vec<String>,
    /// Working directory
    pub working_dir: Option<String>,
}

impl ExecConfig {
    pub fn new<I, S>(cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cmd: cmd.into_iter().map(Into::into).collect(),
            working_dir: None,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Result of exec command
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Exit code
    pub exit_code: i64,
    /// Combined stdout/stderr output
    pub output: String,
}

/// Container as seen by the engine
#[derive(Debug, Clone)]
pub struct ContainerDetails {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
}

/// Network as seen by the engine
#[derive(Debug, Clone)]
pub struct NetworkDetails {
    pub id: String,
    pub name: String,
    pub driver: String,
}

/// Provider information
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub provider_type: ProviderType,
    pub api_version: String,
}
