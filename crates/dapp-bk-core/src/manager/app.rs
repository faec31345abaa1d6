//! App container lifecycle: reuse, start, or (re)build and run

use crate::{CoreError, Result};
use dapp_bk_config::ProjectEnv;
use dapp_bk_provider::{
    BuildConfig, ContainerId, ContainerProvider, ContainerStatus, CreateContainerConfig, ImageId,
    MountConfig, PortConfig, ProviderError,
};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::mpsc;

use super::{send_progress, StackManager};

// Grace period before the engine kills a container being replaced
const STOP_TIMEOUT_SECS: u32 = 10;

/// What `ensure_app_container` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppOutcome {
    /// Container existed and was running; nothing changed
    AlreadyRunning,
    /// Container existed but was stopped; it was started
    Started,
    /// A fresh image was built and a new container is running
    Built {
        image: ImageId,
        container: ContainerId,
        /// An existing container was removed first
        replaced: bool,
    },
}

// Dispatch a build to the provider, using progress-streaming or plain build.
async fn dispatch_build(
    provider: &dyn ContainerProvider,
    config: &BuildConfig,
    progress: Option<&mpsc::UnboundedSender<String>>,
) -> std::result::Result<ImageId, ProviderError> {
    if let Some(tx) = progress {
        provider.build_with_progress(config, tx.clone()).await
    } else {
        provider.build(config).await
    }
}

/// Check that the Dockerfile exists and name it for the build.
///
/// A Dockerfile under the project root is given relative to it, with `/`
/// separators. One anywhere else (absolute, or reached through `..`) keeps
/// its absolute path and is shipped alongside the build context.
fn resolve_dockerfile(project_root: &Path, dockerfile: &str) -> Result<String> {
    let path = project_root.join(dockerfile);
    if !path.is_file() {
        return Err(CoreError::DockerfileNotFound(path));
    }

    let path = std::fs::canonicalize(&path)?;
    let root = std::fs::canonicalize(project_root)?;
    match path.strip_prefix(&root) {
        Ok(relative) => Ok(relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")),
        Err(_) => {
            tracing::debug!("Dockerfile {} is outside {}", path.display(), root.display());
            Ok(path.to_string_lossy().into_owned())
        }
    }
}

impl StackManager {
    /// Make sure `<project>-app-container` exists and is running.
    ///
    /// - exists, running, no rebuild: no-op
    /// - exists, stopped, no rebuild: start
    /// - exists, rebuild: stop (if running), remove with volumes, build
    /// - absent: build
    pub async fn ensure_app_container(
        &self,
        env: &ProjectEnv,
        project_root: &Path,
        rebuild: bool,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> Result<AppOutcome> {
        let name = env.app_container_name();
        let existing = self.provider.inspect_container(&name).await?;
        if let Some(ref container) = existing {
            tracing::debug!(
                "Found container {} from image {} ({})",
                container.name,
                container.image,
                container.status
            );
        }

        let replaced = match existing {
            Some(container) if !rebuild => {
                if container.status == ContainerStatus::Running {
                    send_progress(progress, &format!("Container {} is already running", name));
                    return Ok(AppOutcome::AlreadyRunning);
                }
                send_progress(progress, &format!("Starting container {}", name));
                self.provider.start(&container.id).await?;
                return Ok(AppOutcome::Started);
            }
            Some(container) => {
                send_progress(progress, "Removing existing container for rebuild");
                if container.status == ContainerStatus::Running {
                    self.provider.stop(&container.id, Some(STOP_TIMEOUT_SECS)).await?;
                }
                self.provider.remove(&container.id, true).await?;
                true
            }
            None => false,
        };

        let (image, container) = self
            .build_app_container(env, project_root, &name, progress)
            .await?;

        Ok(AppOutcome::Built {
            image,
            container,
            replaced,
        })
    }

    /// Build the app image from the project root and run it.
    ///
    /// The image is tagged with the container name. Nothing is rolled back on
    /// failure: an image that built but failed to run stays behind.
    pub async fn build_app_container(
        &self,
        env: &ProjectEnv,
        project_root: &Path,
        container_name: &str,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> Result<(ImageId, ContainerId)> {
        let app_type = env.app_type();
        let dockerfile = resolve_dockerfile(project_root, &env.dockerfile())?;

        send_progress(
            progress,
            &format!("Building app container from: {}", env.dockerfile()),
        );

        let mut build_args = HashMap::new();
        if let Some(ref base) = env.app_base_image {
            build_args.insert("BASE_IMAGE".to_string(), base.clone());
        }

        let build_config = BuildConfig {
            context: project_root.to_path_buf(),
            dockerfile,
            tag: container_name.to_string(),
            build_args,
        };

        let image = dispatch_build(self.provider.as_ref(), &build_config, progress)
            .await
            .map_err(CoreError::BuildFailed)?;
        tracing::debug!("Built image {} for {}", image, container_name);

        let mut mounts = Vec::new();
        if let Some(ref host) = env.app_volume_host {
            let host_path = Path::new(host);
            let source = if host_path.is_relative() {
                project_root.join(host_path)
            } else {
                host_path.to_path_buf()
            };
            mounts.push(MountConfig {
                source: source.to_string_lossy().into_owned(),
                target: env.app_volume_container.clone(),
                read_only: false,
            });
        }

        let create_config = CreateContainerConfig {
            image: container_name.to_string(),
            name: Some(container_name.to_string()),
            network: Some(env.network_name()),
            ports: vec![PortConfig::tcp(env.app_host_port, app_type.container_port())],
            mounts,
        };

        send_progress(
            progress,
            &format!("Starting container on port {}", env.app_host_port),
        );

        let container = self
            .provider
            .create(&create_config)
            .await
            .map_err(CoreError::BuildFailed)?;
        self.provider
            .start(&container)
            .await
            .map_err(CoreError::BuildFailed)?;

        send_progress(
            progress,
            &format!("✓ Container {} started successfully", container_name),
        );
        send_progress(
            progress,
            &format!("Access at: http://localhost:{}", env.app_host_port),
        );

        Ok((image, container))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::{drain, env, project_with_dockerfile};
    use super::*;
    use crate::test_support::{MockCall, MockProvider};

    const PHP_DOCKERFILE: &str = "docker/app/Dockerfile-app-php";

    fn position(calls: &[MockCall], pred: impl Fn(&MockCall) -> bool) -> Option<usize> {
        calls.iter().position(pred)
    }

    #[tokio::test]
    async fn test_running_container_is_noop() {
        let mock = MockProvider::new().with_container("shop-app-container", ContainerStatus::Running);
        let calls = mock.calls.clone();
        let manager = StackManager::new(Box::new(mock));
        let root = tempfile::tempdir().unwrap();

        let outcome = manager
            .ensure_app_container(&env(&[("PROJECT_NAME", "shop")]), root.path(), false, None)
            .await
            .unwrap();

        assert_eq!(outcome, AppOutcome::AlreadyRunning);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![MockCall::InspectContainer {
                name: "shop-app-container".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_stopped_container_is_started() {
        let mock = MockProvider::new().with_container("shop-app-container", ContainerStatus::Exited);
        let calls = mock.calls.clone();
        let manager = StackManager::new(Box::new(mock));
        let root = tempfile::tempdir().unwrap();

        let outcome = manager
            .ensure_app_container(&env(&[("PROJECT_NAME", "shop")]), root.path(), false, None)
            .await
            .unwrap();

        assert_eq!(outcome, AppOutcome::Started);
        let calls = calls.lock().unwrap();
        assert!(calls.contains(&MockCall::Start {
            id: "shop-app-container-id".into()
        }));
        assert!(!calls.iter().any(|c| matches!(c, MockCall::Build { .. } | MockCall::BuildWithProgress { .. } | MockCall::Create { .. })));
    }

    #[tokio::test]
    async fn test_rebuild_running_stops_then_removes_before_build() {
        let root = project_with_dockerfile(PHP_DOCKERFILE);
        let mock = MockProvider::new().with_container("shop-app-container", ContainerStatus::Running);
        let calls = mock.calls.clone();
        let manager = StackManager::new(Box::new(mock));

        let outcome = manager
            .ensure_app_container(&env(&[("PROJECT_NAME", "shop")]), root.path(), true, None)
            .await
            .unwrap();

        assert!(matches!(outcome, AppOutcome::Built { replaced: true, .. }));

        let calls = calls.lock().unwrap();
        let stop = position(&calls, |c| matches!(c, MockCall::Stop { .. })).unwrap();
        let remove = position(&calls, |c| {
            matches!(c, MockCall::Remove { remove_volumes: true, .. })
        })
        .unwrap();
        let build = position(&calls, |c| matches!(c, MockCall::Build { .. })).unwrap();
        assert!(stop < remove && remove < build, "order was {:?}", *calls);
    }

    #[tokio::test]
    async fn test_rebuild_stopped_skips_stop() {
        let root = project_with_dockerfile(PHP_DOCKERFILE);
        let mock = MockProvider::new().with_container("shop-app-container", ContainerStatus::Exited);
        let calls = mock.calls.clone();
        let manager = StackManager::new(Box::new(mock));

        manager
            .ensure_app_container(&env(&[("PROJECT_NAME", "shop")]), root.path(), true, None)
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        assert!(!calls.iter().any(|c| matches!(c, MockCall::Stop { .. })));
        let remove = position(&calls, |c| matches!(c, MockCall::Remove { .. })).unwrap();
        let build = position(&calls, |c| matches!(c, MockCall::Build { .. })).unwrap();
        assert!(remove < build);
    }

    #[tokio::test]
    async fn test_absent_container_builds_and_runs() {
        let root = project_with_dockerfile("docker/app/Dockerfile-app-node");
        let mock = MockProvider::new();
        let calls = mock.calls.clone();
        let last_create = mock.last_create.clone();
        let last_build = mock.last_build.clone();
        let manager = StackManager::new(Box::new(mock));

        let env = env(&[
            ("PROJECT_NAME", "shop"),
            ("APP_TYPE", "node"),
            ("APP_HOST_PORT", "8081"),
            ("APP_BASE_IMAGE", "node:20-alpine"),
            ("APP_VOLUME_HOST", "src"),
            ("APP_VOLUME_CONTAINER", "/usr/src/app"),
        ]);

        let outcome = manager
            .ensure_app_container(&env, root.path(), false, None)
            .await
            .unwrap();
        assert!(matches!(outcome, AppOutcome::Built { replaced: false, .. }));

        let build = last_build.lock().unwrap().clone().unwrap();
        assert_eq!(build.tag, "shop-app-container");
        assert_eq!(build.dockerfile, "docker/app/Dockerfile-app-node");
        assert_eq!(build.context, root.path());
        assert_eq!(
            build.build_args.get("BASE_IMAGE").map(String::as_str),
            Some("node:20-alpine")
        );

        let create = last_create.lock().unwrap().clone().unwrap();
        assert_eq!(create.image, "shop-app-container");
        assert_eq!(create.name.as_deref(), Some("shop-app-container"));
        assert_eq!(create.network.as_deref(), Some("shop-network"));
        assert_eq!(create.ports, vec![PortConfig::tcp(8081, 3000)]);
        assert_eq!(
            create.mounts,
            vec![MountConfig {
                source: root.path().join("src").to_string_lossy().into_owned(),
                target: "/usr/src/app".into(),
                read_only: false,
            }]
        );

        let calls = calls.lock().unwrap();
        assert!(calls.contains(&MockCall::Start {
            id: "shop-app-container-new-id".into()
        }));
    }

    #[tokio::test]
    async fn test_no_volume_without_host_path() {
        let root = project_with_dockerfile(PHP_DOCKERFILE);
        let mock = MockProvider::new();
        let last_create = mock.last_create.clone();
        let last_build = mock.last_build.clone();
        let manager = StackManager::new(Box::new(mock));

        manager
            .ensure_app_container(&env(&[("PROJECT_NAME", "shop")]), root.path(), false, None)
            .await
            .unwrap();

        let create = last_create.lock().unwrap().clone().unwrap();
        assert!(create.mounts.is_empty());
        assert_eq!(create.ports, vec![PortConfig::tcp(8080, 80)]);
        assert!(last_build.lock().unwrap().as_ref().unwrap().build_args.is_empty());
    }

    #[tokio::test]
    async fn test_missing_dockerfile_aborts_before_build() {
        let root = tempfile::tempdir().unwrap();
        let mock = MockProvider::new();
        let calls = mock.calls.clone();
        let manager = StackManager::new(Box::new(mock));

        let err = manager
            .ensure_app_container(&env(&[("PROJECT_NAME", "shop")]), root.path(), false, None)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::DockerfileNotFound(_)));
        assert!(!calls
            .lock()
            .unwrap()
            .iter()
            .any(|c| matches!(c, MockCall::Build { .. } | MockCall::BuildWithProgress { .. })));
    }

    #[tokio::test]
    async fn test_absolute_dockerfile_inside_root_becomes_relative() {
        let root = project_with_dockerfile(PHP_DOCKERFILE);
        let absolute = root.path().join(PHP_DOCKERFILE);
        let mock = MockProvider::new();
        let last_build = mock.last_build.clone();
        let manager = StackManager::new(Box::new(mock));

        let env = env(&[
            ("PROJECT_NAME", "shop"),
            ("APP_DOCKERFILE", absolute.to_str().unwrap()),
        ]);
        manager
            .ensure_app_container(&env, root.path(), false, None)
            .await
            .unwrap();

        let build = last_build.lock().unwrap().clone().unwrap();
        assert_eq!(build.dockerfile, PHP_DOCKERFILE);
    }

    #[tokio::test]
    async fn test_dockerfile_outside_root_passed_as_absolute_path() {
        let root = tempfile::tempdir().unwrap();
        let elsewhere = project_with_dockerfile("Dockerfile");
        let outside = elsewhere.path().join("Dockerfile");
        let mock = MockProvider::new();
        let last_build = mock.last_build.clone();
        let manager = StackManager::new(Box::new(mock));

        let env = env(&[
            ("PROJECT_NAME", "shop"),
            ("APP_DOCKERFILE", outside.to_str().unwrap()),
        ]);
        manager
            .ensure_app_container(&env, root.path(), false, None)
            .await
            .unwrap();

        let build = last_build.lock().unwrap().clone().unwrap();
        assert_eq!(build.context, root.path());
        assert_eq!(
            Path::new(&build.dockerfile),
            std::fs::canonicalize(&outside).unwrap()
        );
    }

    #[tokio::test]
    async fn test_parent_relative_dockerfile_resolved_outside_root() {
        let parent = project_with_dockerfile("Dockerfile.shared");
        let root = parent.path().join("shop");
        std::fs::create_dir_all(&root).unwrap();
        let mock = MockProvider::new();
        let last_build = mock.last_build.clone();
        let manager = StackManager::new(Box::new(mock));

        let env = env(&[
            ("PROJECT_NAME", "shop"),
            ("APP_DOCKERFILE", "../Dockerfile.shared"),
        ]);
        manager
            .ensure_app_container(&env, &root, false, None)
            .await
            .unwrap();

        let build = last_build.lock().unwrap().clone().unwrap();
        assert!(Path::new(&build.dockerfile).is_absolute());
        assert_eq!(
            Path::new(&build.dockerfile),
            std::fs::canonicalize(parent.path().join("Dockerfile.shared")).unwrap()
        );
    }

    #[tokio::test]
    async fn test_start_failure_on_stopped_container_is_fatal() {
        let mock = MockProvider::new().with_container("shop-app-container", ContainerStatus::Exited);
        *mock.start_error.lock().unwrap() = Some("cannot start container".into());
        let calls = mock.calls.clone();
        let manager = StackManager::new(Box::new(mock));
        let root = project_with_dockerfile(PHP_DOCKERFILE);

        let err = manager
            .ensure_app_container(&env(&[("PROJECT_NAME", "shop")]), root.path(), false, None)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Provider(_)));
        assert!(err.to_string().contains("cannot start container"));
        assert!(!calls.lock().unwrap().iter().any(|c| matches!(
            c,
            MockCall::Remove { .. } | MockCall::Build { .. } | MockCall::Create { .. }
        )));
    }

    #[tokio::test]
    async fn test_stop_failure_aborts_rebuild_before_remove() {
        let root = project_with_dockerfile(PHP_DOCKERFILE);
        let mock = MockProvider::new().with_container("shop-app-container", ContainerStatus::Running);
        *mock.stop_error.lock().unwrap() = Some("container is paused".into());
        let calls = mock.calls.clone();
        let manager = StackManager::new(Box::new(mock));

        let err = manager
            .ensure_app_container(&env(&[("PROJECT_NAME", "shop")]), root.path(), true, None)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("container is paused"));
        let calls = calls.lock().unwrap();
        assert!(calls.contains(&MockCall::Stop {
            id: "shop-app-container-id".into()
        }));
        assert!(!calls.iter().any(|c| matches!(
            c,
            MockCall::Remove { .. } | MockCall::Build { .. } | MockCall::BuildWithProgress { .. }
        )));
    }

    #[tokio::test]
    async fn test_build_failure_surfaces_engine_message() {
        let root = project_with_dockerfile(PHP_DOCKERFILE);
        let mock = MockProvider::new();
        *mock.build_error.lock().unwrap() = Some("unknown instruction: FORM".into());
        let calls = mock.calls.clone();
        let manager = StackManager::new(Box::new(mock));

        let err = manager
            .ensure_app_container(&env(&[("PROJECT_NAME", "shop")]), root.path(), false, None)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("unknown instruction: FORM"));
        assert!(!calls
            .lock()
            .unwrap()
            .iter()
            .any(|c| matches!(c, MockCall::Create { .. })));
    }

    #[tokio::test]
    async fn test_run_failure_surfaces_engine_message() {
        let root = project_with_dockerfile(PHP_DOCKERFILE);
        let mock = MockProvider::new();
        *mock.create_error.lock().unwrap() = Some("port is already allocated".into());
        let manager = StackManager::new(Box::new(mock));

        let err = manager
            .ensure_app_container(&env(&[("PROJECT_NAME", "shop")]), root.path(), false, None)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::BuildFailed(_)));
        assert!(err.to_string().contains("port is already allocated"));
    }

    #[tokio::test]
    async fn test_build_log_streamed_to_progress() {
        let root = project_with_dockerfile(PHP_DOCKERFILE);
        let mock = MockProvider::new();
        *mock.build_output.lock().unwrap() = vec![
            "Step 1/2 : FROM php:8.2-apache\n".into(),
            "Step 2/2 : COPY . /var/www/html\n".into(),
        ];
        let manager = StackManager::new(Box::new(mock));
        let (tx, rx) = mpsc::unbounded_channel();

        manager
            .ensure_app_container(&env(&[("PROJECT_NAME", "shop")]), root.path(), false, Some(&tx))
            .await
            .unwrap();
        drop(tx);

        let out = drain(rx);
        assert!(out.contains("Building app container from: docker/app/Dockerfile-app-php\n"));
        assert!(out.contains("Step 2/2 : COPY . /var/www/html\n"));
        assert!(out.contains("Access at: http://localhost:8080"));
    }
}
