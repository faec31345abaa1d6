//! Docker provider implementation using bollard

use crate::error::is_not_found;
use crate::{
    BuildConfig, ContainerDetails, ContainerId, ContainerProvider, ContainerStatus,
    CreateContainerConfig, ExecConfig, ExecResult, ImageId, NetworkDetails, ProviderError,
    ProviderInfo, ProviderType, Result,
};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::BuildImageOptions;
use bollard::network::{CreateNetworkOptions, InspectNetworkOptions};
use bollard::service::{HostConfig, Mount, MountTypeEnum, PortBinding};
use bollard::Docker;
use futures::StreamExt;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tokio::sync::mpsc;

/// Directories never sent to the engine as part of a build context
const CONTEXT_EXCLUDES: &[&str] = &[".git", "node_modules", "target"];

/// Exclusion rules read from the context root
const DOCKERIGNORE: &str = ".dockerignore";

/// Archive name for a Dockerfile that lives outside the build context
const INLINED_DOCKERFILE: &str = ".dapp-bk.Dockerfile";

/// Docker provider using bollard crate
pub struct DockerProvider {
    client: Docker,
    provider_type: ProviderType,
}

impl DockerProvider {
    /// Create a new Docker provider. Nothing is sent to the engine until
    /// the first call.
    pub fn new(socket_path: &str) -> Result<Self> {
        let client = if socket_path.starts_with("http://") || socket_path.starts_with("https://")
        {
            Docker::connect_with_http(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| ProviderError::ConnectionError(e.to_string()))?
        } else {
            let path = socket_path.trim_start_matches("unix://");
            Docker::connect_with_socket(path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| ProviderError::ConnectionError(e.to_string()))?
        };

        Ok(Self {
            client,
            provider_type: ProviderType::Docker,
        })
    }

    /// Create a new provider for Podman (uses Docker-compatible API)
    pub fn new_podman(socket_path: &str) -> Result<Self> {
        let mut provider = Self::new(socket_path)?;
        provider.provider_type = ProviderType::Podman;
        Ok(provider)
    }

    async fn run_build(
        &self,
        config: &BuildConfig,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> Result<ImageId> {
        let context = create_build_context(&config.context, &config.dockerfile)?;

        let options = BuildImageOptions {
            dockerfile: context.dockerfile,
            t: config.tag.clone(),
            buildargs: config.build_args.clone(),
            rm: true,
            ..Default::default()
        };

        tracing::debug!("Building {} from {}", config.tag, config.dockerfile);
        let mut stream = self
            .client
            .build_image(options, None, Some(context.tar.into()));

        let mut image_id = None;
        while let Some(result) = stream.next().await {
            match result {
                Ok(output) => {
                    if let Some(error) = output.error {
                        return Err(ProviderError::BuildError(error));
                    }
                    if let Some(aux) = output.aux {
                        if let Some(id) = aux.id {
                            image_id = Some(id);
                        }
                    }
                    if let Some(line) = output.stream {
                        match progress {
                            Some(tx) => {
                                let _ = tx.send(line);
                            }
                            None => tracing::debug!("{}", line.trim_end()),
                        }
                    }
                }
                Err(e) => return Err(ProviderError::BuildError(e.to_string())),
            }
        }

        // Older engines only report the tag, not the aux image ID
        Ok(ImageId::new(image_id.unwrap_or_else(|| config.tag.clone())))
    }

    async fn start_exec(
        &self,
        id: &ContainerId,
        config: &ExecConfig,
        sink: &mut (dyn FnMut(String) + Send),
    ) -> Result<i64> {
        let options = CreateExecOptions {
            cmd: Some(config.cmd.clone()),
            working_dir: config.working_dir.clone(),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self
            .client
            .create_exec(&id.0, options)
            .await
            .map_err(|e| ProviderError::ExecError(e.to_string()))?;

        let start_options = StartExecOptions {
            detach: false,
            ..Default::default()
        };

        let result = self
            .client
            .start_exec(&exec.id, Some(start_options))
            .await
            .map_err(|e| ProviderError::ExecError(e.to_string()))?;

        if let StartExecResults::Attached { mut output, .. } = result {
            // Bytes of a character split across two frames
            let mut pending = Vec::new();
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) | Ok(LogOutput::StdErr { message }) => {
                        pending.extend_from_slice(&message);
                        let text = take_complete_utf8(&mut pending);
                        if !text.is_empty() {
                            sink(text);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => return Err(ProviderError::ExecError(e.to_string())),
                }
            }
            if !pending.is_empty() {
                sink(String::from_utf8_lossy(&pending).into_owned());
            }
        }

        // Get exit code
        let inspect = self.client.inspect_exec(&exec.id).await?;
        Ok(inspect.exit_code.unwrap_or(0))
    }
}

#[async_trait]
impl ContainerProvider for DockerProvider {
    async fn inspect_network(&self, name: &str) -> Result<Option<NetworkDetails>> {
        match self
            .client
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(network) => Ok(Some(NetworkDetails {
                id: network.id.unwrap_or_default(),
                name: network.name.unwrap_or_else(|| name.to_string()),
                driver: network.driver.unwrap_or_default(),
            })),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_network(&self, name: &str) -> Result<String> {
        let options = CreateNetworkOptions {
            name: name.to_string(),
            driver: "bridge".to_string(),
            ..Default::default()
        };
        let response = self.client.create_network(options).await?;
        Ok(response.id.unwrap_or_default())
    }

    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerDetails>> {
        let info = match self.client.inspect_container(name, None).await {
            Ok(info) => info,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let status = info
            .state
            .as_ref()
            .and_then(|s| s.status)
            .map(|s| ContainerStatus::from(format!("{:?}", s).to_lowercase().as_str()))
            .unwrap_or(ContainerStatus::Unknown);

        Ok(Some(ContainerDetails {
            id: ContainerId::new(info.id.unwrap_or_else(|| name.to_string())),
            name: info
                .name
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            image: info
                .config
                .and_then(|c| c.image)
                .unwrap_or_default(),
            status,
        }))
    }

    async fn build(&self, config: &BuildConfig) -> Result<ImageId> {
        self.run_build(config, None).await
    }

    async fn build_with_progress(
        &self,
        config: &BuildConfig,
        progress: mpsc::UnboundedSender<String>,
    ) -> Result<ImageId> {
        self.run_build(config, Some(&progress)).await
    }

    async fn create(&self, config: &CreateContainerConfig) -> Result<ContainerId> {
        let options = config.name.as_ref().map(|name| CreateContainerOptions {
            name: name.as_str(),
            platform: None,
        });

        // Build port bindings
        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();

        for port in &config.ports {
            let container_port = format!("{}/{}", port.container_port, port.protocol);
            exposed_ports.insert(container_port.clone(), HashMap::new());

            let binding = PortBinding {
                host_ip: None,
                host_port: Some(port.host_port.to_string()),
            };
            port_bindings.insert(container_port, Some(vec![binding]));
        }

        let mounts: Vec<Mount> = config
            .mounts
            .iter()
            .map(|m| Mount {
                target: Some(m.target.clone()),
                source: Some(m.source.clone()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();

        let host_config = HostConfig {
            mounts: if mounts.is_empty() {
                None
            } else {
                Some(mounts)
            },
            port_bindings: if port_bindings.is_empty() {
                None
            } else {
                Some(port_bindings)
            },
            network_mode: config.network.clone(),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(config.image.clone()),
            exposed_ports: if exposed_ports.is_empty() {
                None
            } else {
                Some(exposed_ports)
            },
            host_config: Some(host_config),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(options, container_config)
            .await?;

        for warning in &response.warnings {
            tracing::warn!("{}", warning);
        }

        Ok(ContainerId::new(response.id))
    }

    async fn start(&self, id: &ContainerId) -> Result<()> {
        self.client
            .start_container(&id.0, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop(&self, id: &ContainerId, timeout: Option<u32>) -> Result<()> {
        let options = StopContainerOptions {
            t: timeout.unwrap_or(10) as i64,
        };
        self.client.stop_container(&id.0, Some(options)).await?;
        Ok(())
    }

    async fn remove(&self, id: &ContainerId, remove_volumes: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            v: remove_volumes,
            ..Default::default()
        };
        self.client.remove_container(&id.0, Some(options)).await?;
        Ok(())
    }

    async fn exec(&self, id: &ContainerId, config: &ExecConfig) -> Result<ExecResult> {
        let mut output = String::new();
        let exit_code = self
            .start_exec(id, config, &mut |chunk| output.push_str(&chunk))
            .await?;
        Ok(ExecResult { exit_code, output })
    }

    async fn exec_with_progress(
        &self,
        id: &ContainerId,
        config: &ExecConfig,
        output: mpsc::UnboundedSender<String>,
    ) -> Result<i64> {
        self.start_exec(id, config, &mut |chunk| {
            let _ = output.send(chunk);
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .ping()
            .await
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;
        Ok(())
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            provider_type: self.provider_type,
            api_version: bollard::API_DEFAULT_VERSION.to_string(),
        }
    }
}

/// Split off the decodable front of `buf`, leaving an incomplete trailing
/// character behind for the next frame. Invalid bytes become U+FFFD.
fn take_complete_utf8(buf: &mut Vec<u8>) -> String {
    let complete = match std::str::from_utf8(buf) {
        Ok(_) => buf.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => buf.len(),
    };
    let rest = buf.split_off(complete);
    let text = String::from_utf8_lossy(buf).into_owned();
    *buf = rest;
    text
}

/// A tar build context and the Dockerfile path inside it
struct BuildContext {
    tar: Vec<u8>,
    dockerfile: String,
}

/// Decides which context entries are sent to the engine
struct ContextFilter {
    ignore: Gitignore,
    /// Dockerfile relative to the context root, when it lives there
    dockerfile: Option<PathBuf>,
}

impl ContextFilter {
    fn new(context: &Path, dockerfile: &str) -> Result<Self> {
        let dockerfile = Path::new(dockerfile);
        Ok(Self {
            ignore: load_dockerignore(context)?,
            dockerfile: if dockerfile.is_absolute() {
                None
            } else {
                Some(
                    dockerfile
                        .components()
                        .filter(|c| !matches!(c, Component::CurDir))
                        .collect(),
                )
            },
        })
    }

    fn skips(&self, rel: &Path, is_dir: bool) -> bool {
        // The engine needs these even when the rules exclude them
        if rel == Path::new(DOCKERIGNORE) {
            return false;
        }
        if let Some(ref dockerfile) = self.dockerfile {
            if dockerfile.as_path() == rel || (is_dir && dockerfile.starts_with(rel)) {
                return false;
            }
        }

        let excluded_dir = rel
            .file_name()
            .map(|n| CONTEXT_EXCLUDES.contains(&n.to_string_lossy().as_ref()))
            .unwrap_or(false);
        if is_dir && excluded_dir {
            return true;
        }

        let matched = self.ignore.matched_path_or_any_parents(rel, is_dir);
        if is_dir {
            // `!` rules can re-include files below an ignored directory
            matched.is_ignore() && self.ignore.num_whitelists() == 0
        } else {
            matched.is_ignore()
        }
    }
}

/// Read `<context>/.dockerignore`.
///
/// Its patterns are relative to the context root, so each one is anchored
/// with a leading `/` before it reaches the gitignore matcher.
fn load_dockerignore(context: &Path) -> Result<Gitignore> {
    let path = context.join(DOCKERIGNORE);
    if !path.is_file() {
        return Ok(Gitignore::empty());
    }

    let invalid = |e: ignore::Error| {
        ProviderError::BuildError(format!("Invalid {}: {}", path.display(), e))
    };

    let mut builder = GitignoreBuilder::new(context);
    for line in std::fs::read_to_string(&path)?.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (negate, pattern) = match line.strip_prefix('!') {
            Some(rest) => ("!", rest.trim()),
            None => ("", line),
        };
        let pattern = pattern.trim_start_matches("./").trim_start_matches('/');
        if pattern.is_empty() {
            continue;
        }
        builder
            .add_line(Some(path.clone()), &format!("{}/{}", negate, pattern))
            .map_err(invalid)?;
    }

    let rules = builder.build().map_err(invalid)?;
    tracing::debug!("Loaded {} rules from {}", rules.len(), path.display());
    Ok(rules)
}

/// Create a tar archive from the build context.
///
/// A Dockerfile given as an absolute path is added under a generated name so
/// the engine can find it inside the archive.
fn create_build_context(context: &Path, dockerfile: &str) -> Result<BuildContext> {
    use std::io::Cursor;
    use tar::Builder;

    let filter = ContextFilter::new(context, dockerfile)?;

    let mut tar_data = Vec::new();
    let dockerfile = {
        let cursor = Cursor::new(&mut tar_data);
        let mut builder = Builder::new(cursor);

        add_dir_to_tar(&mut builder, &filter, context, Path::new(""))?;

        let name = if filter.dockerfile.is_none() {
            builder.append_path_with_name(dockerfile, INLINED_DOCKERFILE)?;
            INLINED_DOCKERFILE.to_string()
        } else {
            dockerfile.to_string()
        };

        builder.finish()?;
        name
    };

    Ok(BuildContext {
        tar: tar_data,
        dockerfile,
    })
}

/// Recursively add directory contents to tar
fn add_dir_to_tar<W: Write>(
    builder: &mut tar::Builder<W>,
    filter: &ContextFilter,
    base: &Path,
    prefix: &Path,
) -> Result<()> {
    for entry in std::fs::read_dir(base)? {
        let entry = entry?;
        let path = entry.path();
        let name = prefix.join(entry.file_name());

        if path.is_dir() {
            if !filter.skips(&name, true) {
                add_dir_to_tar(builder, filter, &path, &name)?;
            }
        } else if path.is_file() && !filter.skips(&name, false) {
            builder.append_path_with_name(&path, &name)?;
        }
    }

    Ok(())
}
