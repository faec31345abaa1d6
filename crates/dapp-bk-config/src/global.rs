//! User-level settings: which container engine to talk to, and where its
//! API socket lives.
//!
//! Read from `config.toml` in the platform config dir for `dapp-bk`. The file
//! and each of its tables are optional.

use crate::{ConfigError, Result};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub defaults: Defaults,
    pub providers: Providers,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// `docker` or `podman`
    pub provider: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            provider: "docker".into(),
        }
    }
}

/// Socket settings per engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Providers {
    pub docker: EngineSocket,
    pub podman: EngineSocket,
}

impl Default for Providers {
    fn default() -> Self {
        Self {
            docker: EngineSocket::new(docker_socket()),
            podman: EngineSocket::new(podman_socket()),
        }
    }
}

/// Where an engine's Docker-compatible API listens: a unix socket path,
/// a Windows named pipe, or an `http(s)://` URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSocket {
    pub socket: String,
}

impl EngineSocket {
    fn new(socket: String) -> Self {
        Self { socket }
    }
}

fn docker_socket() -> String {
    if cfg!(windows) {
        "//./pipe/docker_engine".into()
    } else {
        "/var/run/docker.sock".into()
    }
}

fn podman_socket() -> String {
    if cfg!(windows) {
        return "//./pipe/podman-machine-default".into();
    }
    if cfg!(target_os = "macos") {
        if let Some(base) = BaseDirs::new() {
            return base
                .home_dir()
                .join(".local/share/containers/podman/machine/podman-machine-default/podman.sock")
                .to_string_lossy()
                .into_owned();
        }
    }
    if cfg!(target_os = "linux") {
        // Rootless podman listens under the user's runtime dir
        let runtime = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/run/user/1000".into());
        return format!("{}/podman/podman.sock", runtime);
    }
    "/var/run/podman.sock".into()
}

impl GlobalConfig {
    /// Read the config file from its platform location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Read `path`, falling back to defaults when it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No global config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::ReadError {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::TomlParseError {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Global config {}: provider={}", path.display(), config.defaults.provider);
        Ok(config)
    }

    pub fn config_path() -> Result<PathBuf> {
        ProjectDirs::from("", "", "dapp-bk")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
            .ok_or(ConfigError::NoConfigDir)
    }
}
